//! Photo downloads and uploads.
//!
//! Photos are addressed by the owning contact's sync id, so a photo whose
//! contact never reached the server waits until the contact is pushed.

use contactsync_core::sync::{FeedWatermark, SyncFailureKind, SyncResult};
use contactsync_core::Result;
use log::{debug, info, warn};

use super::{ContactsSyncEngine, FailureAction};

impl ContactsSyncEngine {
    /// Uploads local photo changes, then downloads pending server photos.
    pub async fn sync_photos(&self, account: &str) -> Result<SyncResult> {
        self.begin();
        let mut result = SyncResult::default();
        if let Some(token) = self.auth_token(account, &mut result).await {
            self.push_photos(account, &token, &mut result).await?;
            if !result.has_hard_error() && !result.canceled {
                self.pull_photos(account, &token, &mut result).await?;
            }
        }
        Ok(result)
    }

    pub(super) async fn pull_photos(
        &self,
        account: &str,
        token: &str,
        result: &mut SyncResult,
    ) -> Result<()> {
        let feed = self.feeds.photos_feed(account);
        let eligible = self.ports.photos.list_photos_to_download(account)?;
        let mut fetched = 0usize;

        for photo in eligible.iter().take(self.config.max_media_entries_per_sync) {
            if self.check_canceled(result) {
                break;
            }
            let Some(contact_sync_id) = photo.contact_sync_id.as_deref() else {
                debug!("[ContactsSync] Photo {} has no contact sync id", photo.id);
                continue;
            };
            let url = self.feeds.photo_url(account, contact_sync_id);

            match self.ports.transport.get_media(token, &url).await {
                Ok(data) => {
                    fetched += 1;
                    let saved = self
                        .ports
                        .photos
                        .save_downloaded_photo(photo.id, data, photo.sync_version.clone())
                        .await?;
                    if saved {
                        result.photo_downloads += 1;
                        result.num_updates += 1;
                    } else {
                        debug!("[ContactsSync] Photo {} changed locally, kept", photo.id);
                    }
                }
                Err(err) => match err.failure_kind() {
                    SyncFailureKind::Unauthorized => {
                        self.react_to_failure(&err, token, result).await;
                        break;
                    }
                    kind if kind.drops_change() => {
                        fetched += 1;
                        kind.record(result);
                        warn!("[ContactsSync] Photo {} unavailable: {}", url, err);
                        self.ports
                            .photos
                            .mark_photo_download_failed(photo.id, err.to_string())
                            .await?;
                    }
                    _ => {
                        warn!("[ContactsSync] Downloading {} failed: {}", url, err);
                        result.num_io_exceptions += 1;
                        break;
                    }
                },
            }
        }

        let watermark = FeedWatermark {
            entries_consumed: fetched as i64,
            has_more: fetched < eligible.len(),
            ..FeedWatermark::new(account, &feed)
        };
        info!(
            "[ContactsSync] Fetched {} of {} photos for {}",
            fetched,
            eligible.len(),
            account
        );
        self.ports.sync_state.save_watermark(watermark).await
    }

    pub(super) async fn push_photos(
        &self,
        account: &str,
        token: &str,
        result: &mut SyncResult,
    ) -> Result<()> {
        for photo in self.ports.photos.list_dirty_photos(account)? {
            if self.check_canceled(result) {
                break;
            }
            let Some(contact_sync_id) = photo.contact_sync_id.as_deref() else {
                debug!(
                    "[ContactsSync] Photo {} waits for its contact to sync",
                    photo.id
                );
                continue;
            };

            let data = photo.data.clone().filter(|data| !data.is_empty());
            let has_data = data.is_some();
            if !has_data && !photo.exists_on_server {
                self.ports.photos.mark_photo_pushed(photo.id, false).await?;
                continue;
            }

            let edit_url =
                self.feeds
                    .photo_edit_url(account, contact_sync_id, photo.sync_version.as_deref());
            let sent = match data {
                Some(data) => self.ports.transport.update_media(token, &edit_url, data).await,
                None => self.ports.transport.delete_entry(token, &edit_url).await,
            };

            match sent {
                Ok(()) => {
                    self.ports.photos.mark_photo_pushed(photo.id, has_data).await?;
                    result.photo_uploads += 1;
                    result.num_updates += 1;
                }
                Err(err) => {
                    warn!("[ContactsSync] Pushing photo {} failed: {}", edit_url, err);
                    match self.react_to_failure(&err, token, result).await {
                        FailureAction::Keep => {}
                        FailureAction::Drop => {
                            self.ports
                                .photos
                                .mark_photo_dropped(photo.id, err.to_string())
                                .await?;
                        }
                        FailureAction::Abort => break,
                    }
                }
            }
        }
        Ok(())
    }
}
