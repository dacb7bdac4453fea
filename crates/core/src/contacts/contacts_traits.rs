use async_trait::async_trait;

use super::model::{DeletedRecord, Group, InboundRecord, LocalRecord, Photo, RecordKind};
use crate::errors::Result;
use crate::sync::FeedWatermark;

/// Local store of contacts and groups as seen by the sync engine.
#[async_trait]
pub trait ContactRepositoryTrait: Send + Sync {
    /// Dirty records of one kind, oldest first.
    fn list_dirty(&self, kind: RecordKind, account: &str) -> Result<Vec<LocalRecord>>;

    /// Records deleted locally whose delete has not been pushed.
    fn list_deleted(&self, kind: RecordKind, account: &str) -> Result<Vec<DeletedRecord>>;

    fn get_group_sync_id(&self, group_id: i64) -> Result<Option<String>>;

    fn list_groups(&self, account: &str) -> Result<Vec<Group>>;

    /// Upserts (or deletes) one server record keyed by sync id and stores the
    /// advanced watermark in the same transaction.
    async fn apply_server_record(
        &self,
        account: &str,
        record: InboundRecord,
        watermark: FeedWatermark,
    ) -> Result<()>;

    /// Records the server identity after a push. The dirty flag is cleared
    /// only while the row is still at `revision`, the revision that was sent.
    async fn mark_pushed(
        &self,
        kind: RecordKind,
        local_id: i64,
        revision: i64,
        sync_id: String,
        sync_version: Option<String>,
    ) -> Result<()>;

    /// Drops a pending change the server refused: clears dirty and keeps the
    /// reason on the row. A row edited again since `revision` is left pending.
    async fn mark_dropped(
        &self,
        kind: RecordKind,
        local_id: i64,
        revision: i64,
        reason: String,
    ) -> Result<()>;

    /// Removes a pushed (or dropped) local tombstone.
    async fn purge_deleted(&self, kind: RecordKind, deleted_id: i64) -> Result<()>;

    /// Deletes clean contacts that belong to no synced group. Returns the count.
    async fn purge_unsynced_contacts(&self, account: &str) -> Result<usize>;
}

/// Local photo rows.
#[async_trait]
pub trait PhotoRepositoryTrait: Send + Sync {
    /// Rows flagged download-required without a sync error, ordered by id.
    fn list_photos_to_download(&self, account: &str) -> Result<Vec<Photo>>;

    fn list_dirty_photos(&self, account: &str) -> Result<Vec<Photo>>;

    fn has_pending_downloads(&self, account: &str) -> Result<bool>;

    /// Stores a downloaded body with `local_version = sync_version`. Returns
    /// false and leaves the row untouched when it is locally dirty.
    async fn save_downloaded_photo(
        &self,
        photo_id: i64,
        data: Vec<u8>,
        version: Option<String>,
    ) -> Result<bool>;

    async fn mark_photo_download_failed(&self, photo_id: i64, error: String) -> Result<()>;

    async fn mark_photo_pushed(&self, photo_id: i64, exists_on_server: bool) -> Result<()>;

    /// Abandons a local photo change the server refused. Clears dirty and
    /// keeps the reason on the row.
    async fn mark_photo_dropped(&self, photo_id: i64, reason: String) -> Result<()>;
}
