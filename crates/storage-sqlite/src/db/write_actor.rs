//! Dedicated writer thread serializing all database writes.
//!
//! SQLite tolerates one writer at a time; every mutation goes through this
//! actor inside an immediate transaction, while reads keep using the pool.

use diesel::sqlite::SqliteConnection;
use tokio::sync::{mpsc, oneshot};

use pontual_core::errors::{DatabaseError, Error, Result};

use super::DbPool;

type WriteJob = Box<dyn FnOnce(&mut SqliteConnection) + Send + 'static>;

enum TxError {
    App(Error),
    Db(diesel::result::Error),
}

impl From<diesel::result::Error> for TxError {
    fn from(err: diesel::result::Error) -> Self {
        Self::Db(err)
    }
}

/// Cloneable handle submitting closures to the writer thread.
#[derive(Clone)]
pub struct WriteHandle {
    tx: mpsc::UnboundedSender<WriteJob>,
}

impl WriteHandle {
    /// Run a closure inside an immediate transaction on the writer thread.
    /// The transaction rolls back when the closure returns an error.
    pub async fn exec<T, F>(&self, job: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut SqliteConnection) -> Result<T> + Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(Box::new(move |conn| {
                let outcome = conn
                    .immediate_transaction::<T, TxError, _>(|tx| job(tx).map_err(TxError::App))
                    .map_err(|err| match err {
                        TxError::App(inner) => inner,
                        TxError::Db(db) => {
                            Error::Database(DatabaseError::QueryFailed(db.to_string()))
                        }
                    });
                let _ = reply_tx.send(outcome);
            }))
            .map_err(|_| {
                Error::Database(DatabaseError::Internal(
                    "Database writer thread is gone".to_string(),
                ))
            })?;

        reply_rx.await.map_err(|_| {
            Error::Database(DatabaseError::Internal(
                "Database writer dropped the reply".to_string(),
            ))
        })?
    }
}

/// Spawn the writer thread for the given pool.
pub fn spawn_writer(pool: DbPool) -> WriteHandle {
    let (tx, mut rx) = mpsc::unbounded_channel::<WriteJob>();

    std::thread::Builder::new()
        .name("pontual-db-writer".to_string())
        .spawn(move || {
            while let Some(job) = rx.blocking_recv() {
                match pool.get() {
                    Ok(mut conn) => job(&mut conn),
                    Err(err) => {
                        // The job's reply channel is dropped with it; the
                        // caller observes a writer error.
                        log::error!("[Storage] Writer failed to get a connection: {err}");
                    }
                }
            }
        })
        .expect("Failed to spawn database writer thread");

    WriteHandle { tx }
}
