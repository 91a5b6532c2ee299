//! Core types for channels, memberships and messages.

use crate::error::{DirectoryError, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Collection names used in the backing store.
pub mod collections {
    use super::ChannelId;

    pub const CHANNELS: &str = "channels";
    pub const CHANNEL_PROFILES: &str = "channel_profiles";
    pub const MEMBERSHIPS: &str = "memberships";
    pub const USER_PROFILES: &str = "user_profiles";

    /// Message sub-collection of a channel.
    pub fn messages(channel_id: &ChannelId) -> String {
        format!("{}/{}/messages", CHANNELS, channel_id)
    }
}

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                $name(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                $name(id.to_string())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                $name(id)
            }
        }
    };
}

string_id!(
    /// Store-assigned channel identifier.
    ChannelId
);
string_id!(
    /// User identifier, owned by the external auth system.
    UserId
);
string_id!(
    /// Deterministic key of a (user, channel) membership.
    MembershipId
);
string_id!(
    /// Store-assigned message identifier, scoped to a channel.
    MessageId
);

impl MembershipId {
    /// Derive the membership key for a (user, channel) pair.
    ///
    /// Both parts are length-prefixed before hashing so that no two distinct
    /// pairs can produce the same key, whatever characters the IDs contain.
    pub fn for_pair(user_id: &UserId, channel_id: &ChannelId) -> Self {
        let mut hasher = Sha256::new();
        for part in [user_id.as_str(), channel_id.as_str()] {
            hasher.update((part.len() as u64).to_be_bytes());
            hasher.update(part.as_bytes());
        }
        MembershipId(hex::encode(hasher.finalize()))
    }
}

/// Microseconds since Unix epoch.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// Current time.
    pub fn now() -> Self {
        let micros = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros() as i64)
            .unwrap_or_default();
        Timestamp(micros)
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({})", self.0)
    }
}

/// Identity of whoever is invoking an operation, as established upstream.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum Caller {
    #[default]
    Anonymous,
    User(UserId),
}

impl Caller {
    pub fn user(id: impl Into<UserId>) -> Self {
        Caller::User(id.into())
    }

    /// The caller's user ID, or `Unauthenticated`.
    pub fn require(&self) -> Result<&UserId> {
        match self {
            Caller::User(id) => Ok(id),
            Caller::Anonymous => Err(DirectoryError::Unauthenticated),
        }
    }
}

/// Role of a user within a channel.
///
/// Decoding never fails: anything other than `"owner"` is a plain member.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Role {
    Owner,
    Member,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Owner => "owner",
            Role::Member => "member",
        }
    }

    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "owner" => Role::Owner,
            "member" => Role::Member,
            other => {
                tracing::warn!(role = other, "unknown membership role, treating as member");
                Role::Member
            }
        }
    }
}

impl From<String> for Role {
    fn from(raw: String) -> Self {
        Role::parse(&raw)
    }
}

impl From<Role> for String {
    fn from(role: Role) -> Self {
        role.as_str().to_string()
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Base channel record, as written at creation time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    /// Document ID (not stored in the fields).
    #[serde(skip)]
    pub id: ChannelId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    pub owner_id: UserId,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub is_public: bool,
    #[serde(default)]
    pub created_at: Timestamp,
}

/// Input for creating a channel (before an ID is assigned).
#[derive(Clone, Debug, Default)]
pub struct NewChannel {
    pub name: String,
    pub description: String,
    pub is_public: bool,
    pub image_url: Option<String>,
}

impl NewChannel {
    pub fn new(name: impl Into<String>, description: impl Into<String>, is_public: bool) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            is_public,
            image_url: None,
        }
    }

    pub fn with_image_url(mut self, url: impl Into<String>) -> Self {
        self.image_url = Some(url.into());
        self
    }
}

/// Field-level replacement of base channel fields. `None` leaves a field untouched.
#[derive(Clone, Debug, Default, Serialize)]
pub struct ChannelUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_public: Option<bool>,
}

impl ChannelUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.image_url.is_none()
            && self.description.is_none()
            && self.is_public.is_none()
    }
}

/// A field that the profile overlay can carry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OverlayField {
    Name,
    ImageUrl,
    Description,
}

impl OverlayField {
    pub fn field_name(&self) -> &'static str {
        match self {
            OverlayField::Name => "name",
            OverlayField::ImageUrl => "image_url",
            OverlayField::Description => "description",
        }
    }
}

/// Editable profile overlay for a channel. Shares the channel's ID.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelProfile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ChannelProfile {
    /// A complete overlay seeded with the base channel's current values.
    pub fn seeded_from(channel: &Channel) -> Self {
        Self {
            name: Some(channel.name.clone()),
            image_url: channel.image_url.clone(),
            description: Some(channel.description.clone()),
        }
    }

    pub fn get(&self, field: OverlayField) -> Option<&str> {
        match field {
            OverlayField::Name => self.name.as_deref(),
            OverlayField::ImageUrl => self.image_url.as_deref(),
            OverlayField::Description => self.description.as_deref(),
        }
    }

    pub fn set(&mut self, field: OverlayField, value: impl Into<String>) {
        let value = Some(value.into());
        match field {
            OverlayField::Name => self.name = value,
            OverlayField::ImageUrl => self.image_url = value,
            OverlayField::Description => self.description = value,
        }
    }

    /// Copy every field present in `patch` over this overlay.
    pub fn apply(&mut self, patch: &ChannelProfile) {
        if let Some(ref name) = patch.name {
            self.name = Some(name.clone());
        }
        if let Some(ref url) = patch.image_url {
            self.image_url = Some(url.clone());
        }
        if let Some(ref description) = patch.description {
            self.description = Some(description.clone());
        }
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.image_url.is_none() && self.description.is_none()
    }
}

/// A (channel, user) relationship.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Membership {
    #[serde(skip)]
    pub id: MembershipId,
    pub channel_id: ChannelId,
    pub user_id: UserId,
    pub role: Role,
    #[serde(default)]
    pub joined_at: Timestamp,
}

impl Membership {
    pub fn new(channel_id: ChannelId, user_id: UserId, role: Role) -> Self {
        Self {
            id: MembershipId::for_pair(&user_id, &channel_id),
            channel_id,
            user_id,
            role,
            joined_at: Timestamp::now(),
        }
    }
}

/// Display data for a user, read from the user profile collection.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfileSummary {
    #[serde(skip)]
    pub user_id: UserId,
    #[serde(default)]
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

/// A message posted to a channel.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    #[serde(skip)]
    pub id: MessageId,
    pub author_id: UserId,
    pub text: String,
    pub timestamp: Timestamp,
}

/// True if the value is absent or only whitespace.
pub(crate) fn is_blank(value: Option<&str>) -> bool {
    value.map_or(true, |v| v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_membership_id_is_deterministic() {
        let a = MembershipId::for_pair(&"u1".into(), &"c1".into());
        let b = MembershipId::for_pair(&"u1".into(), &"c1".into());
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 64);
    }

    #[test]
    fn test_membership_id_separator_ambiguity() {
        // "a_b" + "c" must not collide with "a" + "b_c".
        let a = MembershipId::for_pair(&"a_b".into(), &"c".into());
        let b = MembershipId::for_pair(&"a".into(), &"b_c".into());
        assert_ne!(a, b);
    }

    #[test]
    fn test_membership_id_is_ordered() {
        let a = MembershipId::for_pair(&"u1".into(), &"c1".into());
        let b = MembershipId::for_pair(&"c1".into(), &"u1".into());
        assert_ne!(a, b);
    }

    #[test]
    fn test_role_parse_fallback() {
        assert_eq!(Role::parse("owner"), Role::Owner);
        assert_eq!(Role::parse(" OWNER "), Role::Owner);
        assert_eq!(Role::parse("member"), Role::Member);
        assert_eq!(Role::parse("moderator"), Role::Member);
        assert_eq!(Role::parse(""), Role::Member);
    }

    #[test]
    fn test_role_serde_round_trip() {
        let json = serde_json::to_string(&Role::Owner).unwrap();
        assert_eq!(json, "\"owner\"");
        let role: Role = serde_json::from_str("\"admin\"").unwrap();
        assert_eq!(role, Role::Member);
    }

    #[test]
    fn test_caller_require() {
        assert!(matches!(
            Caller::Anonymous.require(),
            Err(DirectoryError::Unauthenticated)
        ));
        let caller = Caller::user("u1");
        assert_eq!(caller.require().unwrap().as_str(), "u1");
    }

    #[test]
    fn test_seeded_profile_is_complete() {
        let channel = Channel {
            id: "c1".into(),
            name: "Retro Films".to_string(),
            image_url: None,
            owner_id: "u1".into(),
            description: "old movies".to_string(),
            is_public: true,
            created_at: Timestamp(1),
        };
        let mut profile = ChannelProfile::seeded_from(&channel);
        profile.set(OverlayField::Name, "Classic Films");

        assert_eq!(profile.get(OverlayField::Name), Some("Classic Films"));
        assert_eq!(profile.get(OverlayField::Description), Some("old movies"));
        assert_eq!(profile.get(OverlayField::ImageUrl), None);
    }

    #[test]
    fn test_is_blank() {
        assert!(is_blank(None));
        assert!(is_blank(Some("  ")));
        assert!(!is_blank(Some("x")));
    }

    proptest! {
        #[test]
        fn prop_membership_id_distinguishes_pairs(
            u1 in "[a-z_]{0,8}",
            c1 in "[a-z_]{0,8}",
            u2 in "[a-z_]{0,8}",
            c2 in "[a-z_]{0,8}",
        ) {
            let a = MembershipId::for_pair(&UserId::from(u1.as_str()), &ChannelId::from(c1.as_str()));
            let b = MembershipId::for_pair(&UserId::from(u2.as_str()), &ChannelId::from(c2.as_str()));
            prop_assert_eq!(a == b, u1 == u2 && c1 == c2);
        }
    }
}
