use std::sync::Arc;

use async_trait::async_trait;
use diesel::prelude::*;
use diesel::r2d2::{self, Pool};
use diesel::SqliteConnection;

use contactsync_core::settings::SettingsRepositoryTrait;
use contactsync_core::Result;

use crate::db::{get_connection, WriteHandle};
use crate::errors::StorageError;
use crate::schema::settings;

pub struct SettingsRepository {
    pool: Arc<Pool<r2d2::ConnectionManager<SqliteConnection>>>,
    writer: WriteHandle,
}

impl SettingsRepository {
    pub fn new(
        pool: Arc<Pool<r2d2::ConnectionManager<SqliteConnection>>>,
        writer: WriteHandle,
    ) -> Self {
        Self { pool, writer }
    }
}

#[async_trait]
impl SettingsRepositoryTrait for SettingsRepository {
    fn get_setting(&self, account: &str, key: &str) -> Result<Option<String>> {
        let mut conn = get_connection(&self.pool)?;
        Ok(settings::table
            .filter(settings::account.eq(account))
            .filter(settings::setting_key.eq(key))
            .select(settings::setting_value)
            .first::<String>(&mut conn)
            .optional()
            .map_err(StorageError::from)?)
    }

    async fn set_setting(&self, account: &str, key: &str, value: &str) -> Result<()> {
        let account = account.to_string();
        let key = key.to_string();
        let value = value.to_string();
        self.writer
            .exec(move |conn| {
                diesel::insert_into(settings::table)
                    .values((
                        settings::account.eq(&account),
                        settings::setting_key.eq(&key),
                        settings::setting_value.eq(&value),
                    ))
                    .on_conflict((settings::account, settings::setting_key))
                    .do_update()
                    .set(settings::setting_value.eq(&value))
                    .execute(conn)
                    .map_err(StorageError::from)?;
                Ok(())
            })
            .await
    }
}
