//! Server-to-local pull, resumable through per-feed watermarks.

use contactsync_core::contacts::{Entry, RecordKind};
use contactsync_core::sync::{FeedPhase, FeedWatermark, SyncResult};
use contactsync_core::{Error, Result};
use log::{debug, info, warn};

use super::ContactsSyncEngine;
use crate::types::{FeedItem, FeedQuery};

fn entry_record_kind(entry: &Entry) -> Option<RecordKind> {
    match entry {
        Entry::Contact(_) => Some(RecordKind::Contact),
        Entry::Group(_) => Some(RecordKind::Group),
        Entry::Media(_) => None,
    }
}

impl ContactsSyncEngine {
    /// Pulls `feed`, or every feed the account should sync when `feed` is
    /// `None`.
    pub async fn pull_server_diffs(&self, account: &str, feed: Option<&str>) -> Result<SyncResult> {
        self.begin();
        let mut result = SyncResult::default();
        let Some(token) = self.auth_token(account, &mut result).await else {
            return Ok(result);
        };

        match feed {
            Some(feed) => self.pull_one(account, feed, &token, &mut result).await?,
            None => self.pull_all(account, &token, &mut result).await?,
        }
        Ok(result)
    }

    pub(super) async fn pull_all(
        &self,
        account: &str,
        token: &str,
        result: &mut SyncResult,
    ) -> Result<()> {
        let feeds = self.desired_feeds(account)?;
        for feed in &feeds {
            debug!("[ContactsSync] {:?} {}", FeedPhase::Pending, feed);
        }
        for feed in feeds {
            if self.check_canceled(result) {
                break;
            }
            self.pull_one(account, &feed, token, result).await?;
            if result.has_hard_error() {
                warn!(
                    "[ContactsSync] Stopping pull for {} after {}",
                    account, feed
                );
                return Ok(());
            }
        }

        if !result.canceled && self.ports.photos.has_pending_downloads(account)? {
            let photos_feed = self.feeds.photos_feed(account);
            info!(
                "[ContactsSync] Photos still pending for {}, requesting {}",
                account, photos_feed
            );
            self.ports.requester.request_sync(account, &photos_feed);
        }
        Ok(())
    }

    async fn pull_one(
        &self,
        account: &str,
        feed: &str,
        token: &str,
        result: &mut SyncResult,
    ) -> Result<()> {
        let Some(feed_kind) = self.feeds.kind_of(account, feed) else {
            warn!("[ContactsSync] Ignoring unknown feed {}", feed);
            return Ok(());
        };

        match feed_kind.record_kind() {
            Some(kind) => {
                let phase = self
                    .pull_record_feed(account, feed, kind, token, result)
                    .await?;
                debug!("[ContactsSync] Feed {} ended in {:?}", feed, phase);
                Ok(())
            }
            None => self.pull_photos(account, token, result).await,
        }
    }

    /// Pages through one groups or contacts feed until the server runs dry,
    /// the per-run cap is reached, or a page brings nothing new.
    async fn pull_record_feed(
        &self,
        account: &str,
        feed: &str,
        kind: RecordKind,
        token: &str,
        result: &mut SyncResult,
    ) -> Result<FeedPhase> {
        let cap = self.config.max_entries_per_sync.max(1);
        let mut watermark = self
            .ports
            .sync_state
            .get_watermark(account, feed)?
            .unwrap_or_else(|| FeedWatermark::new(account, feed));
        let mut applied = 0usize;

        loop {
            if self.check_canceled(result) {
                return Ok(FeedPhase::PartialFailure);
            }

            // Entries at the boundary instant come back with an inclusive updated-min.
            let page_size = cap - applied + watermark.redelivered();
            let query = FeedQuery::since(watermark.last_updated.as_deref(), page_size);
            debug!(
                "[ContactsSync] {:?} {} from {:?}",
                FeedPhase::Fetching,
                feed,
                query.updated_min
            );
            let page = match self.ports.transport.fetch_feed(token, feed, &query).await {
                Ok(page) => page,
                Err(err) => {
                    warn!("[ContactsSync] Fetching {} failed: {}", feed, err);
                    self.react_to_failure(&err, token, result).await;
                    return Ok(FeedPhase::PartialFailure);
                }
            };

            debug!(
                "[ContactsSync] {:?} {} entries from {}",
                FeedPhase::Applying,
                page.entries.len(),
                feed
            );
            let mut applied_in_page = 0usize;
            let mut cap_hit = false;
            for item in &page.entries {
                if self.check_canceled(result) {
                    return Ok(FeedPhase::PartialFailure);
                }
                if applied >= cap {
                    cap_hit = true;
                    break;
                }
                match item {
                    FeedItem::Entry(entry) => {
                        if self
                            .apply_entry(account, kind, entry, token, &mut watermark, result)
                            .await?
                        {
                            applied += 1;
                            applied_in_page += 1;
                        }
                    }
                    FeedItem::Malformed { id, error } => {
                        warn!(
                            "[ContactsSync] Skipping unreadable entry {:?} in {}: {}",
                            id, feed, error
                        );
                        result.num_parse_exceptions += 1;
                    }
                }
            }

            if applied >= cap {
                watermark.has_more = cap_hit || page.has_more;
                break;
            }
            if !page.has_more || applied_in_page == 0 {
                watermark.has_more = false;
                break;
            }
        }

        self.ports.sync_state.save_watermark(watermark.clone()).await?;
        info!(
            "[ContactsSync] Pulled {} entries from {} (more: {})",
            applied, feed, watermark.has_more
        );
        Ok(FeedPhase::Done)
    }

    /// Applies one entry with its advanced watermark. Returns whether the
    /// entry changed local state.
    async fn apply_entry(
        &self,
        account: &str,
        kind: RecordKind,
        entry: &Entry,
        token: &str,
        watermark: &mut FeedWatermark,
        result: &mut SyncResult,
    ) -> Result<bool> {
        let meta = entry.meta();
        if watermark.already_applied(meta.id.as_deref(), meta.updated.as_deref()) {
            debug!("[ContactsSync] Already applied {:?}", meta.id);
            return Ok(false);
        }
        if entry_record_kind(entry) != Some(kind) {
            return Err(Error::sync(format!(
                "{} entry {:?} found in a {} feed",
                entry.kind_name(),
                meta.id,
                kind.as_str()
            )));
        }

        if kind == RecordKind::Contact && !meta.deleted {
            self.delete_legacy_entry(token, entry.title(), meta.edit_uri.as_deref())
                .await;
        }

        let translated = match self.translator.entry_to_record(entry, account) {
            Ok(translated) => translated,
            Err(Error::Translate(err)) => {
                warn!(
                    "[ContactsSync] Skipping entry {:?} that does not translate: {}",
                    meta.id, err
                );
                result.num_parse_exceptions += 1;
                return Ok(false);
            }
            Err(err) => return Err(err),
        };

        let next = watermark.advanced(meta.id.as_deref(), meta.updated.as_deref());
        self.ports
            .contacts
            .apply_server_record(account, translated.record, next.clone())
            .await?;
        *watermark = next;
        result.num_updates += 1;
        Ok(true)
    }
}
