//! Transactional catalog over SQLite: WAL mode, per-thread connections,
//! bounded busy retry, and post-commit hooks.
//!
//! Every mutation runs through [`CatalogConn::with_txn`], whose body must
//! be idempotent modulo post-commit hooks: on transient contention (or a
//! lost unique-constraint race) the whole body re-runs against refreshed
//! catalog state, and hooks registered by an aborted attempt are
//! discarded.

use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use rusqlite::{Connection, OpenFlags, TransactionBehavior};

use crate::core::errors::{Result, ScanError};

pub mod files;
pub mod folders;
pub mod schema;

pub use files::FileStore;
pub use folders::FolderStore;

const MAX_TXN_ATTEMPTS: usize = 5;
const INITIAL_BACKOFF: Duration = Duration::from_millis(20);

/// Connection factory for a catalog database file.
///
/// The walker and each reconciler worker hold their own [`CatalogConn`];
/// WAL mode plus busy retry lets their transactions interleave.
#[derive(Debug, Clone)]
pub struct Catalog {
    path: PathBuf,
}

impl Catalog {
    /// Open (or create) the catalog at `path`, applying schema and PRAGMAs.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|source| ScanError::io(parent, source))?;
        }
        let catalog = Self {
            path: path.to_path_buf(),
        };
        let conn = catalog.raw_connection()?;
        schema::apply_schema(&conn)?;
        Ok(catalog)
    }

    /// Path to the database file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Open a new connection for the calling thread.
    pub fn connect(&self) -> Result<CatalogConn> {
        Ok(CatalogConn {
            conn: self.raw_connection()?,
        })
    }

    fn raw_connection(&self) -> Result<Connection> {
        let conn = Connection::open_with_flags(
            &self.path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        schema::apply_pragmas(&conn)?;
        schema::register_functions(&conn)?;
        Ok(conn)
    }
}

/// One thread's handle on the catalog.
pub struct CatalogConn {
    conn: Connection,
}

impl CatalogConn {
    /// Run `body` in a write transaction, retrying the whole body on
    /// transient contention. Post-commit hooks fire exactly once, after a
    /// successful commit only.
    pub fn with_txn<T>(&mut self, body: impl FnMut(&ScanTxn<'_>) -> Result<T>) -> Result<T> {
        self.run_txn(TransactionBehavior::Immediate, body)
    }

    /// Run `body` in a read transaction.
    pub fn with_read_txn<T>(&mut self, body: impl FnMut(&ScanTxn<'_>) -> Result<T>) -> Result<T> {
        self.run_txn(TransactionBehavior::Deferred, body)
    }

    /// Non-transactional read probe.
    pub fn with_db<T>(&self, body: impl FnOnce(&ScanDb<'_>) -> Result<T>) -> Result<T> {
        body(&ScanDb { conn: &self.conn })
    }

    fn run_txn<T>(
        &mut self,
        behavior: TransactionBehavior,
        mut body: impl FnMut(&ScanTxn<'_>) -> Result<T>,
    ) -> Result<T> {
        let mut backoff = INITIAL_BACKOFF;
        let mut attempt = 0;
        loop {
            attempt += 1;
            let txn = match self.conn.transaction_with_behavior(behavior) {
                Ok(txn) => txn,
                Err(err) if is_busy(&err) && attempt < MAX_TXN_ATTEMPTS => {
                    thread::sleep(backoff);
                    backoff *= 2;
                    continue;
                }
                Err(err) => return Err(err.into()),
            };

            let scan_txn = ScanTxn {
                conn: &txn,
                hooks: RefCell::new(Vec::new()),
            };
            match body(&scan_txn) {
                Ok(value) => {
                    let hooks = scan_txn.hooks.into_inner();
                    match txn.commit() {
                        Ok(()) => {
                            for hook in hooks {
                                hook();
                            }
                            return Ok(value);
                        }
                        Err(err) if is_busy(&err) && attempt < MAX_TXN_ATTEMPTS => {
                            thread::sleep(backoff);
                            backoff *= 2;
                            continue;
                        }
                        Err(err) => return Err(err.into()),
                    }
                }
                Err(err) => {
                    drop(txn); // rollback; hooks from this attempt are discarded
                    if is_retryable_body_error(&err) && attempt < MAX_TXN_ATTEMPTS {
                        thread::sleep(backoff);
                        backoff *= 2;
                        continue;
                    }
                    return Err(err);
                }
            }
        }
    }
}

/// Transactional context handed to `with_txn` bodies and to handlers.
pub struct ScanTxn<'c> {
    conn: &'c Connection,
    hooks: RefCell<Vec<Box<dyn FnOnce() + Send>>>,
}

impl ScanTxn<'_> {
    /// Folder table operations.
    #[must_use]
    pub fn folders(&self) -> FolderStore<'_> {
        FolderStore { conn: self.conn }
    }

    /// File table operations.
    #[must_use]
    pub fn files(&self) -> FileStore<'_> {
        FileStore { conn: self.conn }
    }

    /// Register a side effect to run after a successful commit.
    ///
    /// Never runs on rollback or on an aborted retry attempt. The
    /// canonical use is logging, which must not duplicate under retry.
    pub fn on_commit(&self, hook: impl FnOnce() + Send + 'static) {
        self.hooks.borrow_mut().push(Box::new(hook));
    }
}

/// Read-only, non-transactional probe context.
pub struct ScanDb<'c> {
    conn: &'c Connection,
}

impl ScanDb<'_> {
    /// Folder table operations.
    #[must_use]
    pub fn folders(&self) -> FolderStore<'_> {
        FolderStore { conn: self.conn }
    }

    /// File table operations.
    #[must_use]
    pub fn files(&self) -> FileStore<'_> {
        FileStore { conn: self.conn }
    }
}

fn is_busy(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error {
                code: rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked,
                ..
            },
            _,
        )
    )
}

/// Body errors that warrant re-running the decision: contention, plus a
/// lost unique-constraint race (the rerun re-reads and re-decides).
fn is_retryable_body_error(err: &ScanError) -> bool {
    match err {
        ScanError::Sql { details, .. } => {
            details.contains("database is locked")
                || details.contains("database is busy")
                || details.contains("UNIQUE constraint failed")
        }
        _ => false,
    }
}
