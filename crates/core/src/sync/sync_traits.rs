//! Repository contract for persisted sync state.

use async_trait::async_trait;

use super::sync_model::{FeedWatermark, Subscription};
use crate::errors::Result;

/// Watermarks and feed subscriptions.
#[async_trait]
pub trait SyncStateRepositoryTrait: Send + Sync {
    fn get_watermark(&self, account: &str, feed: &str) -> Result<Option<FeedWatermark>>;
    fn list_watermarks(&self, account: &str) -> Result<Vec<FeedWatermark>>;
    async fn save_watermark(&self, watermark: FeedWatermark) -> Result<()>;
    async fn delete_watermark(&self, account: &str, feed: &str) -> Result<()>;

    fn list_subscriptions(&self, account: &str) -> Result<Vec<Subscription>>;
    async fn add_subscription(&self, subscription: Subscription) -> Result<()>;
    async fn remove_subscription(&self, account: &str, feed: &str) -> Result<()>;
}
