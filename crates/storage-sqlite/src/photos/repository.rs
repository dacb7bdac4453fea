use std::sync::Arc;

use async_trait::async_trait;
use diesel::prelude::*;
use diesel::r2d2::{self, Pool};
use diesel::SqliteConnection;

use contactsync_core::contacts::{Photo, PhotoRepositoryTrait, PhotoState};
use contactsync_core::Result;

use super::model::{NewPhotoDB, PhotoDB};
use crate::db::{get_connection, WriteHandle};
use crate::errors::StorageError;
use crate::schema::{people, photos};

/// Records the server's photo state for a contact during a pull.
///
/// A download is required whenever the server has a photo whose version
/// differs from the one stored locally. A changed version clears any earlier
/// download error so the photo is retried.
pub(crate) fn apply_photo_state(
    conn: &mut SqliteConnection,
    account: &str,
    person_id: i64,
    state: &PhotoState,
) -> Result<()> {
    let existing = photos::table
        .filter(photos::person_id.eq(person_id))
        .select(PhotoDB::as_select())
        .first::<PhotoDB>(conn)
        .optional()
        .map_err(StorageError::from)?;

    let Some(row) = existing else {
        if !state.exists_on_server {
            return Ok(());
        }
        diesel::insert_into(photos::table)
            .values(NewPhotoDB {
                person_id,
                account: account.to_string(),
                data: None,
                local_version: None,
                sync_version: state.sync_version.clone(),
                download_required: state.sync_version.is_some(),
                dirty: false,
                exists_on_server: true,
                sync_error: None,
            })
            .execute(conn)
            .map_err(StorageError::from)?;
        return Ok(());
    };

    let version_changed = row.sync_version != state.sync_version;
    let sync_error = if version_changed { None } else { row.sync_error };
    let (data, local_version) = if !state.exists_on_server && !row.dirty {
        (None, None)
    } else {
        (row.data, row.local_version)
    };
    let download_required = state.exists_on_server
        && state.sync_version.is_some()
        && state.sync_version != local_version;

    diesel::update(photos::table.find(row.id))
        .set((
            photos::sync_version.eq(state.sync_version.clone()),
            photos::exists_on_server.eq(state.exists_on_server),
            photos::download_required.eq(download_required),
            photos::data.eq(data),
            photos::local_version.eq(local_version),
            photos::sync_error.eq(sync_error),
        ))
        .execute(conn)
        .map_err(StorageError::from)?;
    Ok(())
}

pub struct PhotoRepository {
    pool: Arc<Pool<r2d2::ConnectionManager<SqliteConnection>>>,
    writer: WriteHandle,
}

impl PhotoRepository {
    pub fn new(
        pool: Arc<Pool<r2d2::ConnectionManager<SqliteConnection>>>,
        writer: WriteHandle,
    ) -> Self {
        Self { pool, writer }
    }

    pub fn get_photo(&self, person_id: i64) -> Result<Option<Photo>> {
        let mut conn = get_connection(&self.pool)?;
        let row = photos::table
            .inner_join(people::table)
            .filter(photos::person_id.eq(person_id))
            .select((PhotoDB::as_select(), people::sync_id))
            .first::<(PhotoDB, Option<String>)>(&mut conn)
            .optional()
            .map_err(StorageError::from)?;
        Ok(row.map(|(photo, sync_id)| photo.into_photo(sync_id)))
    }

    /// Sets or clears a contact's photo locally and flags it for upload.
    pub async fn set_local_photo(&self, person_id: i64, data: Option<Vec<u8>>) -> Result<()> {
        self.writer
            .exec(move |conn| {
                let account = people::table
                    .find(person_id)
                    .select(people::account)
                    .first::<String>(conn)
                    .map_err(StorageError::from)?;
                diesel::insert_into(photos::table)
                    .values(NewPhotoDB {
                        person_id,
                        account,
                        data: data.clone(),
                        local_version: None,
                        sync_version: None,
                        download_required: false,
                        dirty: true,
                        exists_on_server: false,
                        sync_error: None,
                    })
                    .on_conflict(photos::person_id)
                    .do_update()
                    .set((
                        photos::data.eq(data),
                        photos::dirty.eq(true),
                        photos::download_required.eq(false),
                        photos::sync_error.eq(None::<String>),
                    ))
                    .execute(conn)
                    .map_err(StorageError::from)?;
                Ok(())
            })
            .await
    }

    fn list_photos(
        &self,
        account: &str,
        dirty: bool,
        pending_download: bool,
    ) -> Result<Vec<Photo>> {
        let mut conn = get_connection(&self.pool)?;
        let mut query = photos::table
            .inner_join(people::table)
            .select((PhotoDB::as_select(), people::sync_id))
            .filter(photos::account.eq(account))
            .filter(photos::dirty.eq(dirty))
            .into_boxed();
        if pending_download {
            query = query
                .filter(photos::download_required.eq(true))
                .filter(photos::sync_error.is_null());
        }
        let rows = query
            .order(photos::id.asc())
            .load::<(PhotoDB, Option<String>)>(&mut conn)
            .map_err(StorageError::from)?;
        Ok(rows
            .into_iter()
            .map(|(photo, sync_id)| photo.into_photo(sync_id))
            .collect())
    }
}

#[async_trait]
impl PhotoRepositoryTrait for PhotoRepository {
    fn list_photos_to_download(&self, account: &str) -> Result<Vec<Photo>> {
        self.list_photos(account, false, true)
    }

    fn list_dirty_photos(&self, account: &str) -> Result<Vec<Photo>> {
        self.list_photos(account, true, false)
    }

    fn has_pending_downloads(&self, account: &str) -> Result<bool> {
        let mut conn = get_connection(&self.pool)?;
        let pending = photos::table
            .filter(photos::account.eq(account))
            .filter(photos::dirty.eq(false))
            .filter(photos::download_required.eq(true))
            .filter(photos::sync_error.is_null())
            .count()
            .get_result::<i64>(&mut conn)
            .map_err(StorageError::from)?;
        Ok(pending > 0)
    }

    async fn save_downloaded_photo(
        &self,
        photo_id: i64,
        data: Vec<u8>,
        version: Option<String>,
    ) -> Result<bool> {
        self.writer
            .exec(move |conn| {
                let row = photos::table
                    .find(photo_id)
                    .select(PhotoDB::as_select())
                    .first::<PhotoDB>(conn)
                    .map_err(StorageError::from)?;
                if row.dirty {
                    return Ok(false);
                }
                // The server may have moved on while the body was in flight.
                let still_stale = row.sync_version != version;
                diesel::update(photos::table.find(photo_id))
                    .set((
                        photos::data.eq(Some(data)),
                        photos::local_version.eq(version),
                        photos::download_required.eq(still_stale),
                        photos::sync_error.eq(None::<String>),
                    ))
                    .execute(conn)
                    .map_err(StorageError::from)?;
                Ok(true)
            })
            .await
    }

    async fn mark_photo_download_failed(&self, photo_id: i64, error: String) -> Result<()> {
        self.writer
            .exec(move |conn| {
                diesel::update(photos::table.find(photo_id))
                    .set(photos::sync_error.eq(Some(error)))
                    .execute(conn)
                    .map_err(StorageError::from)?;
                Ok(())
            })
            .await
    }

    async fn mark_photo_pushed(&self, photo_id: i64, exists_on_server: bool) -> Result<()> {
        self.writer
            .exec(move |conn| {
                diesel::update(photos::table.find(photo_id))
                    .set((
                        photos::dirty.eq(false),
                        photos::exists_on_server.eq(exists_on_server),
                        photos::sync_error.eq(None::<String>),
                    ))
                    .execute(conn)
                    .map_err(StorageError::from)?;
                Ok(())
            })
            .await
    }

    async fn mark_photo_dropped(&self, photo_id: i64, reason: String) -> Result<()> {
        self.writer
            .exec(move |conn| {
                diesel::update(photos::table.find(photo_id))
                    .set((
                        photos::dirty.eq(false),
                        photos::sync_error.eq(Some(reason)),
                    ))
                    .execute(conn)
                    .map_err(StorageError::from)?;
                Ok(())
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contacts::ContactRepository;
    use crate::test_support::setup_db;
    use contactsync_core::contacts::{
        Contact, ContactChildren, ContactRecord, ContactRepositoryTrait, InboundRecord,
    };
    use contactsync_core::sync::FeedWatermark;

    const ACCOUNT: &str = "a@x.com";

    struct Fixture {
        _dir: tempfile::TempDir,
        contacts: ContactRepository,
        photos: PhotoRepository,
    }

    fn fixture() -> Fixture {
        let (dir, pool, writer) = setup_db();
        Fixture {
            _dir: dir,
            contacts: ContactRepository::new(pool.clone(), writer.clone()),
            photos: PhotoRepository::new(pool, writer),
        }
    }

    async fn pull_contact(fx: &Fixture, sync_id: &str, photo: PhotoState) -> i64 {
        let record = InboundRecord::Contact {
            record: ContactRecord {
                contact: Contact {
                    account: ACCOUNT.to_string(),
                    name: Some("Ada".to_string()),
                    sync_id: Some(sync_id.to_string()),
                    sync_version: Some("v1".to_string()),
                    ..Default::default()
                },
                children: ContactChildren::default(),
            },
            photo,
        };
        fx.contacts
            .apply_server_record(ACCOUNT, record, FeedWatermark::new(ACCOUNT, "feed"))
            .await
            .expect("apply contact");
        fx.contacts
            .find_contact_by_sync_id(ACCOUNT, sync_id)
            .expect("lookup")
            .and_then(|record| record.contact.id)
            .expect("stored contact")
    }

    fn server_photo(version: &str) -> PhotoState {
        PhotoState {
            sync_version: Some(version.to_string()),
            exists_on_server: true,
        }
    }

    #[tokio::test]
    async fn server_photo_is_queued_for_download() {
        let fx = fixture();
        pull_contact(&fx, "c1", server_photo("p1")).await;
        pull_contact(&fx, "c2", PhotoState::default()).await;

        let pending = fx.photos.list_photos_to_download(ACCOUNT).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].contact_sync_id.as_deref(), Some("c1"));
        assert!(fx.photos.has_pending_downloads(ACCOUNT).unwrap());
    }

    #[tokio::test]
    async fn saved_download_settles_the_row() {
        let fx = fixture();
        let person_id = pull_contact(&fx, "c1", server_photo("p1")).await;
        let pending = fx.photos.list_photos_to_download(ACCOUNT).unwrap();

        let saved = fx
            .photos
            .save_downloaded_photo(pending[0].id, vec![1, 2, 3], Some("p1".to_string()))
            .await
            .unwrap();
        assert!(saved);
        assert!(!fx.photos.has_pending_downloads(ACCOUNT).unwrap());

        let photo = fx.photos.get_photo(person_id).unwrap().unwrap();
        assert_eq!(photo.data, Some(vec![1, 2, 3]));
        assert_eq!(photo.local_version.as_deref(), Some("p1"));

        // Same version again: nothing to fetch.
        pull_contact(&fx, "c1", server_photo("p1")).await;
        assert!(!fx.photos.has_pending_downloads(ACCOUNT).unwrap());
        // New version: fetch again.
        pull_contact(&fx, "c1", server_photo("p2")).await;
        assert!(fx.photos.has_pending_downloads(ACCOUNT).unwrap());
    }

    #[tokio::test]
    async fn dirty_photo_is_not_overwritten_by_download() {
        let fx = fixture();
        let person_id = pull_contact(&fx, "c1", server_photo("p1")).await;
        let photo_id = fx.photos.get_photo(person_id).unwrap().unwrap().id;
        fx.photos
            .set_local_photo(person_id, Some(vec![9]))
            .await
            .unwrap();

        let saved = fx
            .photos
            .save_downloaded_photo(photo_id, vec![1], Some("p1".to_string()))
            .await
            .unwrap();
        assert!(!saved);
        let photo = fx.photos.get_photo(person_id).unwrap().unwrap();
        assert_eq!(photo.data, Some(vec![9]));
        assert_eq!(fx.photos.list_dirty_photos(ACCOUNT).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn failed_download_waits_for_a_new_version() {
        let fx = fixture();
        pull_contact(&fx, "c1", server_photo("p1")).await;
        let photo_id = fx.photos.list_photos_to_download(ACCOUNT).unwrap()[0].id;
        fx.photos
            .mark_photo_download_failed(photo_id, "HTTP 500".to_string())
            .await
            .unwrap();
        assert!(fx.photos.list_photos_to_download(ACCOUNT).unwrap().is_empty());

        pull_contact(&fx, "c1", server_photo("p2")).await;
        assert_eq!(fx.photos.list_photos_to_download(ACCOUNT).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn pushed_photo_is_clean() {
        let fx = fixture();
        let person_id = pull_contact(&fx, "c1", PhotoState::default()).await;
        fx.photos.set_local_photo(person_id, None).await.unwrap();
        let dirty = fx.photos.list_dirty_photos(ACCOUNT).unwrap();
        assert_eq!(dirty.len(), 1);

        fx.photos
            .mark_photo_pushed(dirty[0].id, false)
            .await
            .unwrap();
        assert!(fx.photos.list_dirty_photos(ACCOUNT).unwrap().is_empty());
        let photo = fx.photos.get_photo(person_id).unwrap().unwrap();
        assert!(!photo.exists_on_server);
    }
}
