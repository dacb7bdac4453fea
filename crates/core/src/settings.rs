//! Per-account sync settings.

use async_trait::async_trait;

use crate::errors::Result;

/// Setting that selects the full contacts feed instead of per-group feeds.
pub const SYNC_EVERYTHING: &str = "sync_everything";

#[async_trait]
pub trait SettingsRepositoryTrait: Send + Sync {
    fn get_setting(&self, account: &str, key: &str) -> Result<Option<String>>;
    async fn set_setting(&self, account: &str, key: &str, value: &str) -> Result<()>;
}

/// Interprets a stored flag value. Missing, empty and `"0"` mean false.
pub fn is_flag_set(value: Option<&str>) -> bool {
    matches!(value, Some(v) if !v.is_empty() && v != "0")
}

/// Whether the account syncs every contact rather than selected groups.
pub fn should_sync_everything(settings: &dyn SettingsRepositoryTrait, account: &str) -> Result<bool> {
    let value = settings.get_setting(account, SYNC_EVERYTHING)?;
    Ok(is_flag_set(value.as_deref()))
}
