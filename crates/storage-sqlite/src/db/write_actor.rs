//! Single writer thread. Every write runs as one immediate transaction on a
//! dedicated connection, so writes never contend with each other.

use diesel::sqlite::SqliteConnection;
use log::error;
use tokio::sync::{mpsc, oneshot};

use contactsync_core::errors::{DatabaseError, Error, Result};

use super::DbPool;
use crate::errors::StorageError;

type Job = Box<dyn FnOnce(&mut SqliteConnection) + Send + 'static>;

/// Handle for submitting write closures to the writer thread.
#[derive(Clone, Debug)]
pub struct WriteHandle {
    tx: mpsc::UnboundedSender<Job>,
}

enum TxError {
    Core(Error),
    Diesel(diesel::result::Error),
}

impl From<diesel::result::Error> for TxError {
    fn from(err: diesel::result::Error) -> Self {
        TxError::Diesel(err)
    }
}

fn run_in_transaction<T, F>(conn: &mut SqliteConnection, job: F) -> Result<T>
where
    F: FnOnce(&mut SqliteConnection) -> Result<T>,
{
    conn.immediate_transaction::<T, TxError, _>(|tx| job(tx).map_err(TxError::Core))
        .map_err(|err| match err {
            TxError::Core(err) => err,
            TxError::Diesel(err) => StorageError::from(err).into(),
        })
}

impl WriteHandle {
    /// Runs `job` inside a transaction on the writer thread. The transaction
    /// rolls back when the closure returns an error.
    pub async fn exec<T, F>(&self, job: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut SqliteConnection) -> Result<T> + Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        let boxed: Job = Box::new(move |conn| {
            let result = run_in_transaction(conn, job);
            let _ = reply_tx.send(result);
        });

        self.tx.send(boxed).map_err(|_| {
            Error::Database(DatabaseError::Internal(
                "database writer has stopped".to_string(),
            ))
        })?;

        reply_rx.await.map_err(|_| {
            Error::Database(DatabaseError::Internal(
                "database writer dropped the request".to_string(),
            ))
        })?
    }
}

/// Starts the writer thread. It stops when every handle is dropped.
pub fn spawn_writer(pool: DbPool) -> WriteHandle {
    let (tx, mut rx) = mpsc::unbounded_channel::<Job>();

    let spawned = std::thread::Builder::new()
        .name("contacts-db-writer".to_string())
        .spawn(move || {
            while let Some(job) = rx.blocking_recv() {
                match pool.get() {
                    Ok(mut conn) => job(&mut *conn),
                    Err(err) => {
                        error!("[ContactsSync] Writer could not get a connection: {}", err);
                    }
                }
            }
        });
    if let Err(err) = spawned {
        error!("[ContactsSync] Failed to start database writer: {}", err);
    }

    WriteHandle { tx }
}
