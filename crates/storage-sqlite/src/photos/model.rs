use diesel::prelude::*;

use contactsync_core::contacts::Photo;

#[derive(Queryable, Selectable, Debug, Clone)]
#[diesel(table_name = crate::schema::photos)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct PhotoDB {
    pub id: i64,
    pub person_id: i64,
    pub account: String,
    pub data: Option<Vec<u8>>,
    pub local_version: Option<String>,
    pub sync_version: Option<String>,
    pub download_required: bool,
    pub dirty: bool,
    pub exists_on_server: bool,
    pub sync_error: Option<String>,
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = crate::schema::photos)]
pub struct NewPhotoDB {
    pub person_id: i64,
    pub account: String,
    pub data: Option<Vec<u8>>,
    pub local_version: Option<String>,
    pub sync_version: Option<String>,
    pub download_required: bool,
    pub dirty: bool,
    pub exists_on_server: bool,
    pub sync_error: Option<String>,
}

impl PhotoDB {
    pub fn into_photo(self, contact_sync_id: Option<String>) -> Photo {
        Photo {
            id: self.id,
            person_id: self.person_id,
            account: self.account,
            contact_sync_id,
            data: self.data,
            local_version: self.local_version,
            sync_version: self.sync_version,
            download_required: self.download_required,
            dirty: self.dirty,
            exists_on_server: self.exists_on_server,
            sync_error: self.sync_error,
        }
    }
}
