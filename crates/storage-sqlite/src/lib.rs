//! SQLite storage for the contacts sync engine.
//!
//! Reads go through the r2d2 pool; every write is funneled through the
//! single writer thread in [`db::write_actor`].

pub mod contacts;
pub mod db;
pub mod errors;
pub mod photos;
pub mod schema;
pub mod settings;
pub mod sync;

pub use contacts::ContactRepository;
pub use db::{create_pool, get_connection, init, run_migrations, DbPool, WriteHandle};
pub use db::write_actor::spawn_writer;
pub use errors::StorageError;
pub use photos::PhotoRepository;
pub use settings::SettingsRepository;
pub use sync::SyncStateRepository;

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use tempfile::{tempdir, TempDir};

    use crate::db::{create_pool, init, run_migrations, write_actor::spawn_writer, DbPool};
    use crate::WriteHandle;

    /// Fresh migrated database in a temp dir. Keep the dir alive for the test.
    pub fn setup_db() -> (TempDir, Arc<DbPool>, WriteHandle) {
        let dir = tempdir().expect("tempdir");
        let db_path = init(&dir.path().to_string_lossy()).expect("init db");
        run_migrations(&db_path).expect("migrate");
        let pool = create_pool(&db_path).expect("pool");
        let writer = spawn_writer(pool.as_ref().clone());
        (dir, pool, writer)
    }
}
