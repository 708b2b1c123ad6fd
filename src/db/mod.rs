use rusqlite::{Connection, TransactionBehavior};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::task;
use crate::error::{Result, KbError};

pub mod migrate;
pub mod store;

// WAL mode lets readers proceed while a writer holds the lock, foreign keys
// drive the topic -> version/resource/child cascades.
const PRAGMAS: &str = "PRAGMA journal_mode = WAL; \
     PRAGMA synchronous = NORMAL; \
     PRAGMA foreign_keys = ON; \
     PRAGMA temp_store = MEMORY; \
     PRAGMA cache_size = -65536;";

const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_millis(5000);

/// Database connection manager
#[derive(Debug, Clone)]
pub struct Db {
    path: PathBuf,
    busy_timeout: Duration,
}

impl Db {
    /// Create a new database connection manager
    pub fn new<P: AsRef<Path>>(db_path: P) -> Self {
        Self {
            path: db_path.as_ref().to_path_buf(),
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
        }
    }

    /// Override how long a connection waits on a locked database
    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    /// Open a new database connection with pragmas applied
    pub fn open_connection(&self) -> Result<Connection> {
        open(&self.path, self.busy_timeout)
    }

    /// Execute a closure with a database connection in a blocking task
    pub async fn with_connection<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.clone();
        task::spawn_blocking(move || {
            let mut conn = db.open_connection()?;
            f(&mut conn)
        })
        .await
        .map_err(|e| {
            KbError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("database task failed: {}", e),
            ))
        })?
    }

    /// Execute a closure inside one all-or-nothing write transaction.
    ///
    /// The transaction starts with `BEGIN IMMEDIATE` so concurrent writers
    /// queue on the busy timeout instead of failing on lock upgrade. Any error
    /// returned by `f` rolls back every statement it issued.
    pub async fn with_transaction<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        self.with_connection(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let out = f(&tx)?;
            tx.commit()?;
            Ok(out)
        })
        .await
    }

    /// Execute a read-only closure against one consistent snapshot.
    ///
    /// Runs inside a deferred transaction: the snapshot is taken at the first
    /// read and held until `f` returns, so writers committing in the meantime
    /// stay invisible to the whole walk.
    pub async fn with_snapshot<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        self.with_connection(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Deferred)?;
            let out = f(&tx)?;
            tx.commit()?;
            Ok(out)
        })
        .await
    }
}

fn open(path: &Path, busy_timeout: Duration) -> Result<Connection> {
    let conn = Connection::open(path).map_err(KbError::Database)?;
    conn.busy_timeout(busy_timeout)?;
    conn.execute_batch(PRAGMAS)?;
    Ok(conn)
}
