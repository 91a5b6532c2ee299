//! Configuration for the channel subsystem.

/// Directory configuration.
#[derive(Clone, Debug)]
pub struct DirectoryConfig {
    /// Max identity lookups in flight during `list_members`.
    pub max_concurrent_lookups: usize,

    /// Characters of a user ID kept in a placeholder display name.
    pub placeholder_id_len: usize,

    /// Resolved profile cache size (number of users, 0 disables).
    pub identity_cache_size: usize,

    /// Display name for users whose profile cannot be resolved.
    pub unknown_user_name: String,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            max_concurrent_lookups: 16,
            placeholder_id_len: 6,
            identity_cache_size: 256,
            unknown_user_name: "Unknown User".to_string(),
        }
    }
}

impl DirectoryConfig {
    /// Fan-out limit, never zero.
    pub(crate) fn lookup_concurrency(&self) -> usize {
        self.max_concurrent_lookups.max(1)
    }
}
