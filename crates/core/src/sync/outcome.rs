//! Classification of server responses into sync outcomes.

use serde::{Deserialize, Serialize};

use super::sync_model::SyncResult;

/// How a failed request affects the current pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncFailureKind {
    /// Credential rejected. Invalidate it and stop the pass.
    Unauthorized,
    /// Server holds a newer version. Keep the local change for the next run.
    Conflict,
    NotFound,
    Forbidden,
    /// Request or payload rejected as malformed. Skip the item.
    Malformed,
    /// Network or server failure. Stop the pass and retry on the next trigger.
    Transient,
}

impl SyncFailureKind {
    /// True when the remaining work of the pass must be abandoned.
    pub fn stops_pass(&self) -> bool {
        matches!(self, SyncFailureKind::Unauthorized | SyncFailureKind::Transient)
    }

    /// True when the pending local change should be dropped.
    pub fn drops_change(&self) -> bool {
        matches!(self, SyncFailureKind::NotFound | SyncFailureKind::Forbidden)
    }

    /// Adds this failure to the pass counters.
    pub fn record(&self, result: &mut SyncResult) {
        match self {
            SyncFailureKind::Unauthorized => result.num_auth_exceptions += 1,
            SyncFailureKind::Conflict => result.num_conflicts += 1,
            SyncFailureKind::NotFound | SyncFailureKind::Forbidden => result.num_skipped += 1,
            SyncFailureKind::Malformed => result.num_parse_exceptions += 1,
            SyncFailureKind::Transient => result.num_io_exceptions += 1,
        }
    }
}

/// Classify a non-success HTTP status.
pub fn classify_http_status(status: u16) -> SyncFailureKind {
    match status {
        401 => SyncFailureKind::Unauthorized,
        403 => SyncFailureKind::Forbidden,
        404 | 410 => SyncFailureKind::NotFound,
        409 | 412 => SyncFailureKind::Conflict,
        400 | 422 => SyncFailureKind::Malformed,
        _ => SyncFailureKind::Transient,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_http_status_for_push_outcomes() {
        assert_eq!(classify_http_status(401), SyncFailureKind::Unauthorized);
        assert_eq!(classify_http_status(409), SyncFailureKind::Conflict);
        assert_eq!(classify_http_status(403), SyncFailureKind::Forbidden);
        assert_eq!(classify_http_status(404), SyncFailureKind::NotFound);
        assert_eq!(classify_http_status(400), SyncFailureKind::Malformed);
        assert_eq!(classify_http_status(503), SyncFailureKind::Transient);
        assert_eq!(classify_http_status(429), SyncFailureKind::Transient);
    }

    #[test]
    fn only_auth_and_io_stop_the_pass() {
        assert!(SyncFailureKind::Unauthorized.stops_pass());
        assert!(SyncFailureKind::Transient.stops_pass());
        assert!(!SyncFailureKind::Conflict.stops_pass());
        assert!(!SyncFailureKind::Forbidden.stops_pass());
    }

    #[test]
    fn record_updates_matching_counter() {
        let mut result = SyncResult::default();
        SyncFailureKind::Forbidden.record(&mut result);
        SyncFailureKind::Conflict.record(&mut result);
        SyncFailureKind::Transient.record(&mut result);
        assert_eq!(result.num_skipped, 1);
        assert_eq!(result.num_conflicts, 1);
        assert_eq!(result.num_io_exceptions, 1);
    }
}
