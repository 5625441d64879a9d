//! SQLite persistence for Runplane.
//!
//! A [`Store`] owns one connection. Every mutation runs inside an IMMEDIATE
//! transaction so the write lock is taken up front; competing writers wait
//! on the busy timeout and surface as `TransientStore` if it expires.
//!
//! Row functions in the submodules take a `&Connection` so they compose
//! inside a caller's transaction:
//!
//! ```ignore
//! let store = Store::open(Path::new("runplane.db"))?;
//! let run = store.write(|tx| {
//!     let item = work_items::get(tx, 1)?.ok_or(PlaneError::not_found("work item", 1))?;
//!     runs::insert(tx, item.id, "trace", now)
//! })?;
//! ```

pub mod approvals;
pub mod info_requests;
pub mod observability;
pub mod projects;
pub mod quotas;
pub mod recipes;
pub mod runs;
mod schema;
pub mod tasks;
pub mod visions;
pub mod work_items;

use chrono::{DateTime, Utc};
use log::{debug, warn};
use rusqlite::types::Type;
use rusqlite::{Connection, OpenFlags, Row, Transaction, TransactionBehavior};
use std::path::Path;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use crate::error::{PlaneError, Result};

/// How long a connection waits on a locked database before giving up.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Handle to the control-plane database.
#[derive(Debug)]
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Open (creating if needed) the database at `path` and apply the schema.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Self::init(conn)
    }

    /// Open a private in-memory database. Used by tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        schema::apply(&conn)?;
        debug!("Store schema applied");
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| PlaneError::Storage("connection mutex poisoned".to_string()))
    }

    /// Run read-only queries against the connection.
    pub fn read<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.lock()?;
        f(&conn)
    }

    /// Run `f` inside an IMMEDIATE transaction; commits on `Ok`, rolls back on `Err`.
    pub fn write<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T>,
    {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let out = f(&tx)?;
        tx.commit()?;
        Ok(out)
    }

    /// Like [`Store::write`], retrying the whole transaction on transient failures.
    pub fn write_with_retry<T, F>(&self, attempts: u32, mut f: F) -> Result<T>
    where
        F: FnMut(&Transaction<'_>) -> Result<T>,
    {
        let attempts = attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.write(&mut f) {
                Err(e) if e.is_transient() && attempt < attempts => {
                    warn!("Transient store failure (attempt {}/{}): {}", attempt, attempts, e);
                    std::thread::sleep(Duration::from_millis(10 * attempt as u64));
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}

/// Timestamps are stored as Unix milliseconds.
pub(crate) fn to_ms(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

pub(crate) fn from_ms(ms: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp_millis(ms).unwrap_or_default()
}

pub(crate) fn opt_from_ms(ms: Option<i64>) -> Option<DateTime<Utc>> {
    ms.map(from_ms)
}

/// Read a text column and parse it into a domain enum.
pub(crate) fn parse_column<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr<Err = PlaneError>,
{
    let raw: String = row.get(idx)?;
    raw.parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Map `QueryReturnedNoRows` to `None`.
pub(crate) fn optional<T>(result: rusqlite::Result<T>) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}
