//! Contacts sync domain models: watermarks, subscriptions and pass results.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

/// Persisted pull position for one `(account, feed)` pair.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedWatermark {
    pub account: String,
    pub feed: String,
    /// `updated` timestamp of the last applied entry.
    pub last_updated: Option<String>,
    pub entries_consumed: i64,
    pub has_more: bool,
    /// Ids of the entries already applied at `last_updated`. Several entries
    /// can share one timestamp and an inclusive `updated-min` returns all of
    /// them again.
    pub boundary_ids: Vec<String>,
}

impl FeedWatermark {
    pub fn new(account: &str, feed: &str) -> Self {
        Self {
            account: account.to_string(),
            feed: feed.to_string(),
            ..Default::default()
        }
    }

    /// Watermark after applying one more entry.
    pub fn advanced(&self, entry_id: Option<&str>, updated: Option<&str>) -> Self {
        let same_instant = match (updated, self.last_updated.as_deref()) {
            (Some(updated), Some(last)) => compare_timestamps(updated, last) == Ordering::Equal,
            (None, _) => true,
            (Some(_), None) => false,
        };
        let mut boundary_ids = if same_instant {
            self.boundary_ids.clone()
        } else {
            Vec::new()
        };
        if let Some(id) = entry_id {
            if !boundary_ids.iter().any(|known| known == id) {
                boundary_ids.push(id.to_string());
            }
        }

        Self {
            account: self.account.clone(),
            feed: self.feed.clone(),
            last_updated: updated
                .map(str::to_string)
                .or_else(|| self.last_updated.clone()),
            entries_consumed: self.entries_consumed + 1,
            has_more: self.has_more,
            boundary_ids,
        }
    }

    /// True when an entry was already applied under this watermark: either it
    /// is older than the watermark or it is one of the entries applied at the
    /// watermark's own timestamp.
    pub fn already_applied(&self, entry_id: Option<&str>, updated: Option<&str>) -> bool {
        let (Some(last_updated), Some(updated)) = (self.last_updated.as_deref(), updated) else {
            return false;
        };
        match compare_timestamps(updated, last_updated) {
            Ordering::Less => true,
            Ordering::Equal => {
                entry_id.is_some_and(|id| self.boundary_ids.iter().any(|known| known == id))
            }
            Ordering::Greater => false,
        }
    }

    /// Entries an inclusive `updated-min` query re-delivers before new ones.
    pub fn redelivered(&self) -> usize {
        if self.last_updated.is_some() {
            self.boundary_ids.len().max(1)
        } else {
            0
        }
    }
}

/// Compares two feed timestamps by instant, falling back to lexical order
/// when either is not RFC 3339.
pub fn compare_timestamps(left: &str, right: &str) -> Ordering {
    let left_parsed = chrono::DateTime::parse_from_rfc3339(left).map(|dt| dt.timestamp_millis());
    let right_parsed =
        chrono::DateTime::parse_from_rfc3339(right).map(|dt| dt.timestamp_millis());

    if let (Ok(left_ts), Ok(right_ts)) = (left_parsed, right_parsed) {
        return left_ts.cmp(&right_ts);
    }
    left.cmp(right)
}

/// A feed that requires periodic sync triggers for an account.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    pub account: String,
    pub feed: String,
}

/// Lifecycle of one feed within a pull.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedPhase {
    Pending,
    Fetching,
    Applying,
    Done,
    PartialFailure,
}

/// Counters for one sync pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResult {
    pub num_updates: u32,
    pub num_conflicts: u32,
    pub num_auth_exceptions: u32,
    pub num_io_exceptions: u32,
    pub num_parse_exceptions: u32,
    pub num_skipped: u32,
    pub photo_uploads: u32,
    pub photo_downloads: u32,
    pub canceled: bool,
}

impl SyncResult {
    /// At least one change was applied or pushed.
    pub fn made_progress(&self) -> bool {
        self.num_updates > 0
    }

    /// The pass stopped on an auth or I/O failure.
    pub fn has_hard_error(&self) -> bool {
        self.num_auth_exceptions > 0 || self.num_io_exceptions > 0
    }

    pub fn merge(&mut self, other: &SyncResult) {
        self.num_updates += other.num_updates;
        self.num_conflicts += other.num_conflicts;
        self.num_auth_exceptions += other.num_auth_exceptions;
        self.num_io_exceptions += other.num_io_exceptions;
        self.num_parse_exceptions += other.num_parse_exceptions;
        self.num_skipped += other.num_skipped;
        self.photo_uploads += other.photo_uploads;
        self.photo_downloads += other.photo_downloads;
        self.canceled |= other.canceled;
    }

    /// Compact summary, e.g. `u3c1p2P4`. Zero counters are omitted.
    pub fn stats_string(&self) -> String {
        let mut out = String::new();
        let counters = [
            ("u", self.num_updates),
            ("c", self.num_conflicts),
            ("a", self.num_auth_exceptions),
            ("io", self.num_io_exceptions),
            ("pe", self.num_parse_exceptions),
            ("s", self.num_skipped),
            ("p", self.photo_uploads),
            ("P", self.photo_downloads),
        ];
        for (tag, value) in counters {
            if value > 0 {
                out.push_str(tag);
                out.push_str(&value.to_string());
            }
        }
        if self.canceled {
            out.push('!');
        }
        out
    }
}
