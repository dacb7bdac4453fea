use diesel::prelude::*;

use contactsync_core::sync::{FeedWatermark, Subscription};
use contactsync_core::{Error, Result};

#[derive(Queryable, Selectable, Insertable, Debug, Clone)]
#[diesel(table_name = crate::schema::sync_feed_state)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct FeedStateDB {
    pub account: String,
    pub feed: String,
    pub last_updated: Option<String>,
    pub entries_consumed: i64,
    pub has_more: bool,
    /// JSON array of entry ids.
    pub boundary_ids: String,
}

impl TryFrom<FeedStateDB> for FeedWatermark {
    type Error = Error;

    fn try_from(db: FeedStateDB) -> Result<Self> {
        Ok(Self {
            boundary_ids: serde_json::from_str(&db.boundary_ids)?,
            account: db.account,
            feed: db.feed,
            last_updated: db.last_updated,
            entries_consumed: db.entries_consumed,
            has_more: db.has_more,
        })
    }
}

impl TryFrom<&FeedWatermark> for FeedStateDB {
    type Error = Error;

    fn try_from(watermark: &FeedWatermark) -> Result<Self> {
        Ok(Self {
            account: watermark.account.clone(),
            feed: watermark.feed.clone(),
            last_updated: watermark.last_updated.clone(),
            entries_consumed: watermark.entries_consumed,
            has_more: watermark.has_more,
            boundary_ids: serde_json::to_string(&watermark.boundary_ids)?,
        })
    }
}

#[derive(Queryable, Selectable, Debug, Clone)]
#[diesel(table_name = crate::schema::subscriptions)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct SubscriptionDB {
    pub id: i64,
    pub account: String,
    pub feed: String,
}

impl From<SubscriptionDB> for Subscription {
    fn from(db: SubscriptionDB) -> Self {
        Self {
            account: db.account,
            feed: db.feed,
        }
    }
}
