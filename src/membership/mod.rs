//! Channel memberships.
//!
//! Each (user, channel) pair has at most one membership record, keyed by
//! [`MembershipId::for_pair`](crate::types::MembershipId::for_pair). Following
//! writes that key, unfollowing deletes it.

mod directory;

pub use directory::{ChannelMember, MembershipDirectory};
