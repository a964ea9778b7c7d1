//! SQLite-backed catalog
//!
//! One `stores` table, one row per store. The connection is shared behind a
//! mutex and every statement runs on the blocking pool so request handlers
//! never stall the runtime on disk I/O.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use tracing::{debug, info};

use storefront_common::{Error, Result, Store, StoreId, StoreStatus};

use crate::{StatusWrite, StoreCatalog};

/// Busy timeout for concurrent writers
const BUSY_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS stores (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    namespace TEXT NOT NULL UNIQUE,
    status TEXT NOT NULL,
    helm_release TEXT NOT NULL,
    created_at TEXT NOT NULL,
    url TEXT,
    version INTEGER NOT NULL DEFAULT 1
);
CREATE INDEX IF NOT EXISTS stores_created_at ON stores (created_at);
";

const SELECT_COLUMNS: &str =
    "SELECT id, name, namespace, status, helm_release, created_at, version FROM stores";

/// Durable [`StoreCatalog`] on a single SQLite file
#[derive(Clone)]
pub struct SqliteCatalog {
    connection: Arc<Mutex<Connection>>,
}

impl SqliteCatalog {
    /// Open (creating if needed) the database at `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let connection = Connection::open(path).map_err(db_error("open"))?;
        info!(path = %path.display(), "opened store catalog");
        Self::from_connection(connection)
    }

    /// Open a private in-memory database
    pub fn open_in_memory() -> Result<Self> {
        let connection = Connection::open_in_memory().map_err(db_error("open"))?;
        Self::from_connection(connection)
    }

    fn from_connection(connection: Connection) -> Result<Self> {
        connection
            .busy_timeout(BUSY_TIMEOUT)
            .map_err(db_error("open"))?;
        connection
            .execute_batch(SCHEMA)
            .map_err(db_error("schema"))?;
        add_version_column(&connection)?;
        Ok(Self {
            connection: Arc::new(Mutex::new(connection)),
        })
    }

    /// Run `op` against the connection on the blocking pool
    async fn with_connection<T, F>(&self, context: &'static str, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
    {
        let connection = Arc::clone(&self.connection);
        tokio::task::spawn_blocking(move || {
            let mut guard = connection
                .lock()
                .map_err(|_| Error::catalog(context, "connection mutex poisoned"))?;
            op(&mut *guard)
        })
        .await
        .map_err(|e| Error::catalog(context, format!("blocking task failed: {}", e)))?
    }
}

/// Databases created before versioned writes lack the `version` column
fn add_version_column(connection: &Connection) -> Result<()> {
    let mut stmt = connection
        .prepare("PRAGMA table_info(stores)")
        .map_err(db_error("schema"))?;
    let has_version = stmt
        .query_map([], |row| row.get::<_, String>(1))
        .map_err(db_error("schema"))?
        .filter_map(|name| name.ok())
        .any(|name| name == "version");
    if !has_version {
        debug!("adding version column to stores table");
        connection
            .execute(
                "ALTER TABLE stores ADD COLUMN version INTEGER NOT NULL DEFAULT 1",
                [],
            )
            .map_err(db_error("schema"))?;
    }
    Ok(())
}

fn db_error(context: &'static str) -> impl Fn(rusqlite::Error) -> Error {
    move |e| Error::catalog(context, e.to_string())
}

/// Fixed-width UTC timestamps so `ORDER BY created_at` is chronological
fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Raw column values, converted to a [`Store`] outside rusqlite's row closure
struct StoreRow {
    id: String,
    name: String,
    namespace: String,
    status: String,
    release: String,
    created_at: String,
    version: i64,
}

impl StoreRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            namespace: row.get(2)?,
            status: row.get(3)?,
            release: row.get(4)?,
            created_at: row.get(5)?,
            version: row.get(6)?,
        })
    }

    fn into_store(self) -> Result<Store> {
        let status: StoreStatus = self
            .status
            .parse()
            .map_err(|e: Error| Error::catalog("decode", e.to_string()))?;
        let created_at = DateTime::parse_from_rfc3339(&self.created_at)
            .map_err(|e| {
                Error::catalog(
                    "decode",
                    format!("bad created_at '{}' for {}: {}", self.created_at, self.id, e),
                )
            })?
            .with_timezone(&Utc);
        let version = u64::try_from(self.version).map_err(|_| {
            Error::catalog(
                "decode",
                format!("bad version {} for {}", self.version, self.id),
            )
        })?;
        Ok(Store {
            id: StoreId::from(self.id),
            name: self.name,
            namespace: self.namespace,
            release: self.release,
            status,
            created_at,
            version,
        })
    }
}

fn select_by_id(connection: &Connection, id: &str) -> Result<Option<Store>> {
    connection
        .query_row(
            &format!("{SELECT_COLUMNS} WHERE id = ?1"),
            params![id],
            StoreRow::from_row,
        )
        .optional()
        .map_err(db_error("get_by_id"))?
        .map(StoreRow::into_store)
        .transpose()
}

#[async_trait]
impl StoreCatalog for SqliteCatalog {
    async fn create(&self, mut store: Store) -> Result<Store> {
        store.version = 1;
        self.with_connection("create", move |conn| {
            let result = conn.execute(
                "INSERT INTO stores (id, name, namespace, status, helm_release, created_at, url, version)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, NULL, ?7)",
                params![
                    store.id.as_str(),
                    store.name,
                    store.namespace,
                    store.status.as_str(),
                    store.release,
                    format_timestamp(&store.created_at),
                    store.version as i64,
                ],
            );
            match result {
                Ok(_) => Ok(store),
                Err(rusqlite::Error::SqliteFailure(err, _))
                    if err.code == ErrorCode::ConstraintViolation =>
                {
                    Err(Error::conflict(format!(
                        "store {} or namespace {} already exists",
                        store.id, store.namespace
                    )))
                }
                Err(e) => Err(Error::catalog("create", e.to_string())),
            }
        })
        .await
    }

    async fn get_all(&self) -> Result<Vec<Store>> {
        self.with_connection("get_all", |conn| {
            let mut stmt = conn
                .prepare(&format!(
                    "{SELECT_COLUMNS} ORDER BY created_at DESC, rowid DESC"
                ))
                .map_err(db_error("get_all"))?;
            let rows = stmt
                .query_map([], StoreRow::from_row)
                .map_err(db_error("get_all"))?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(db_error("get_all"))?;
            rows.into_iter().map(StoreRow::into_store).collect()
        })
        .await
    }

    async fn get_by_id(&self, id: &StoreId) -> Result<Option<Store>> {
        let id = id.as_str().to_string();
        self.with_connection("get_by_id", move |conn| select_by_id(conn, &id))
            .await
    }

    async fn update_status(
        &self,
        id: &StoreId,
        status: StoreStatus,
        expected_version: Option<u64>,
    ) -> Result<StatusWrite> {
        let id = id.as_str().to_string();
        self.with_connection("update_status", move |conn| {
            let tx = conn.transaction().map_err(db_error("update_status"))?;
            let changed = match expected_version {
                Some(version) => tx.execute(
                    "UPDATE stores SET status = ?1, version = version + 1
                     WHERE id = ?2 AND version = ?3",
                    params![status.as_str(), id, version as i64],
                ),
                None => tx.execute(
                    "UPDATE stores SET status = ?1, version = version + 1 WHERE id = ?2",
                    params![status.as_str(), id],
                ),
            }
            .map_err(db_error("update_status"))?;

            let current = select_by_id(&tx, &id)?;
            tx.commit().map_err(db_error("update_status"))?;

            Ok(match (changed, current) {
                (_, None) => StatusWrite::Missing,
                (0, Some(store)) => StatusWrite::Conflict(store),
                (_, Some(store)) => StatusWrite::Applied(store),
            })
        })
        .await
    }

    async fn delete(&self, id: &StoreId) -> Result<bool> {
        let id = id.as_str().to_string();
        self.with_connection("delete", move |conn| {
            let removed = conn
                .execute("DELETE FROM stores WHERE id = ?1", params![id])
                .map_err(db_error("delete"))?;
            Ok(removed > 0)
        })
        .await
    }
}
