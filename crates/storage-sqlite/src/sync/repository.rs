use std::sync::Arc;

use async_trait::async_trait;
use diesel::prelude::*;
use diesel::r2d2::{self, Pool};
use diesel::SqliteConnection;

use contactsync_core::sync::{FeedWatermark, Subscription, SyncStateRepositoryTrait};
use contactsync_core::Result;

use super::model::{FeedStateDB, SubscriptionDB};
use crate::db::{get_connection, WriteHandle};
use crate::errors::StorageError;
use crate::schema::{subscriptions, sync_feed_state};

pub(crate) fn upsert_watermark(conn: &mut SqliteConnection, watermark: &FeedWatermark) -> Result<()> {
    let row = FeedStateDB::try_from(watermark)?;
    diesel::insert_into(sync_feed_state::table)
        .values(&row)
        .on_conflict((sync_feed_state::account, sync_feed_state::feed))
        .do_update()
        .set((
            sync_feed_state::last_updated.eq(row.last_updated.clone()),
            sync_feed_state::entries_consumed.eq(row.entries_consumed),
            sync_feed_state::has_more.eq(row.has_more),
            sync_feed_state::boundary_ids.eq(row.boundary_ids.clone()),
        ))
        .execute(conn)
        .map_err(StorageError::from)?;
    Ok(())
}

pub struct SyncStateRepository {
    pool: Arc<Pool<r2d2::ConnectionManager<SqliteConnection>>>,
    writer: WriteHandle,
}

impl SyncStateRepository {
    pub fn new(
        pool: Arc<Pool<r2d2::ConnectionManager<SqliteConnection>>>,
        writer: WriteHandle,
    ) -> Self {
        Self { pool, writer }
    }
}

#[async_trait]
impl SyncStateRepositoryTrait for SyncStateRepository {
    fn get_watermark(&self, account: &str, feed: &str) -> Result<Option<FeedWatermark>> {
        let mut conn = get_connection(&self.pool)?;
        let row = sync_feed_state::table
            .filter(sync_feed_state::account.eq(account))
            .filter(sync_feed_state::feed.eq(feed))
            .select(FeedStateDB::as_select())
            .first::<FeedStateDB>(&mut conn)
            .optional()
            .map_err(StorageError::from)?;
        row.map(FeedWatermark::try_from).transpose()
    }

    fn list_watermarks(&self, account: &str) -> Result<Vec<FeedWatermark>> {
        let mut conn = get_connection(&self.pool)?;
        sync_feed_state::table
            .filter(sync_feed_state::account.eq(account))
            .order(sync_feed_state::feed.asc())
            .select(FeedStateDB::as_select())
            .load::<FeedStateDB>(&mut conn)
            .map_err(StorageError::from)?
            .into_iter()
            .map(FeedWatermark::try_from)
            .collect()
    }

    async fn save_watermark(&self, watermark: FeedWatermark) -> Result<()> {
        self.writer
            .exec(move |conn| upsert_watermark(conn, &watermark))
            .await
    }

    async fn delete_watermark(&self, account: &str, feed: &str) -> Result<()> {
        let account = account.to_string();
        let feed = feed.to_string();
        self.writer
            .exec(move |conn| {
                diesel::delete(
                    sync_feed_state::table
                        .filter(sync_feed_state::account.eq(&account))
                        .filter(sync_feed_state::feed.eq(&feed)),
                )
                .execute(conn)
                .map_err(StorageError::from)?;
                Ok(())
            })
            .await
    }

    fn list_subscriptions(&self, account: &str) -> Result<Vec<Subscription>> {
        let mut conn = get_connection(&self.pool)?;
        Ok(subscriptions::table
            .filter(subscriptions::account.eq(account))
            .order(subscriptions::id.asc())
            .select(SubscriptionDB::as_select())
            .load::<SubscriptionDB>(&mut conn)
            .map_err(StorageError::from)?
            .into_iter()
            .map(Subscription::from)
            .collect())
    }

    async fn add_subscription(&self, subscription: Subscription) -> Result<()> {
        self.writer
            .exec(move |conn| {
                diesel::insert_into(subscriptions::table)
                    .values((
                        subscriptions::account.eq(&subscription.account),
                        subscriptions::feed.eq(&subscription.feed),
                    ))
                    .on_conflict((subscriptions::account, subscriptions::feed))
                    .do_nothing()
                    .execute(conn)
                    .map_err(StorageError::from)?;
                Ok(())
            })
            .await
    }

    async fn remove_subscription(&self, account: &str, feed: &str) -> Result<()> {
        let account = account.to_string();
        let feed = feed.to_string();
        self.writer
            .exec(move |conn| {
                diesel::delete(
                    subscriptions::table
                        .filter(subscriptions::account.eq(&account))
                        .filter(subscriptions::feed.eq(&feed)),
                )
                .execute(conn)
                .map_err(StorageError::from)?;
                Ok(())
            })
            .await
    }
}
