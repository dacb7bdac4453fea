//! Runtime configuration for the contacts sync engine.

pub const DEFAULT_FEED_BASE_URL: &str = "https://www.google.com/m8/feeds";
pub const DEFAULT_PROJECTION: &str = "full-sync";
pub const DEFAULT_MAX_ENTRIES_PER_SYNC: usize = 200;
pub const DEFAULT_MAX_MEDIA_ENTRIES_PER_SYNC: usize = 10;
pub const DEFAULT_LEGACY_CLEANUP_TITLE: &str = "Starred in Android";

const ENV_FEED_BASE_URL: &str = "CONTACTS_FEED_BASE_URL";
const ENV_MAX_ENTRIES: &str = "CONTACTS_SYNC_MAX_ENTRIES";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    pub feed_base_url: String,
    pub projection: String,
    /// Cap on entries applied per feed per pull.
    pub max_entries_per_sync: usize,
    /// Cap on photo downloads per pass.
    pub max_media_entries_per_sync: usize,
    /// Entries with this exact title are deleted server-side when seen.
    pub legacy_cleanup_title: Option<String>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            feed_base_url: DEFAULT_FEED_BASE_URL.to_string(),
            projection: DEFAULT_PROJECTION.to_string(),
            max_entries_per_sync: DEFAULT_MAX_ENTRIES_PER_SYNC,
            max_media_entries_per_sync: DEFAULT_MAX_MEDIA_ENTRIES_PER_SYNC,
            legacy_cleanup_title: Some(DEFAULT_LEGACY_CLEANUP_TITLE.to_string()),
        }
    }
}

impl SyncConfig {
    /// Defaults overridden by `CONTACTS_FEED_BASE_URL` and
    /// `CONTACTS_SYNC_MAX_ENTRIES` when set.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(url) = lookup(ENV_FEED_BASE_URL)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
        {
            config.feed_base_url = url;
        }

        if let Some(raw) = lookup(ENV_MAX_ENTRIES) {
            match raw.trim().parse::<usize>() {
                Ok(value) if value > 0 => config.max_entries_per_sync = value,
                _ => log::warn!(
                    "[ContactsSync] Ignoring invalid {}={:?}, using {}",
                    ENV_MAX_ENTRIES,
                    raw,
                    config.max_entries_per_sync
                ),
            }
        }

        config
    }
}
