//! Wire types for the feed protocol.

use contactsync_core::contacts::Entry;
use serde::{Deserialize, Serialize};

/// Query parameters of one feed request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedQuery {
    /// Only entries modified at or after this timestamp.
    pub updated_min: Option<String>,
    /// Include tombstones. Only meaningful on incremental pulls.
    pub show_deleted: bool,
    pub max_results: Option<usize>,
}

impl FeedQuery {
    /// Query for a pull resuming at `updated_min`, if any.
    pub fn since(updated_min: Option<&str>, max_results: usize) -> Self {
        Self {
            updated_min: updated_min.map(str::to_string),
            show_deleted: updated_min.is_some(),
            max_results: Some(max_results),
        }
    }

    /// Query string parameters, always ordered by modification time ascending.
    pub fn to_params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("orderby", "lastmodified".to_string()),
            ("sortorder", "ascending".to_string()),
        ];
        if let Some(updated_min) = &self.updated_min {
            params.push(("updated-min", updated_min.clone()));
        }
        if self.show_deleted {
            params.push(("showdeleted", "true".to_string()));
        }
        if let Some(max_results) = self.max_results {
            params.push(("max-results", max_results.to_string()));
        }
        params
    }
}

/// One element of a feed page. Entries that fail to decode are kept so the
/// puller can count them without losing the rest of the page.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedItem {
    Entry(Entry),
    Malformed { id: Option<String>, error: String },
}

impl FeedItem {
    pub fn from_value(value: serde_json::Value) -> Self {
        let id = value
            .get("id")
            .and_then(serde_json::Value::as_str)
            .map(str::to_string);
        match serde_json::from_value::<Entry>(value) {
            Ok(entry) => FeedItem::Entry(entry),
            Err(err) => FeedItem::Malformed {
                id,
                error: err.to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeedPage {
    pub entries: Vec<FeedItem>,
    /// The server holds more entries matching the query.
    pub has_more: bool,
}

/// Feed page as sent by the server, before per-entry decoding.
#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RawFeedPage {
    #[serde(default)]
    pub entries: Vec<serde_json::Value>,
    #[serde(default)]
    pub has_more: bool,
}

impl From<RawFeedPage> for FeedPage {
    fn from(raw: RawFeedPage) -> Self {
        Self {
            entries: raw.entries.into_iter().map(FeedItem::from_value).collect(),
            has_more: raw.has_more,
        }
    }
}

/// Error body returned by the feed server.
#[derive(Debug, Deserialize)]
pub struct ApiErrorResponse {
    pub code: String,
    pub message: String,
}
