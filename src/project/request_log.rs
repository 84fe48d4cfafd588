use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use tracing::{debug, info};

use crate::project::error::RequestLogError;
use crate::project::types::ProjectKey;

/// One served request
#[derive(Debug, Clone, PartialEq)]
pub struct RequestRecord {
    pub access_time: DateTime<Utc>,
    pub remote_addr: Option<String>,
    pub owner: String,
    pub repo: String,
    pub version: Option<String>,
    /// Whether the response came from a fresh cache record
    pub cached: bool,
    pub status: Option<u16>,
}

/// Append-only log of served requests, queried by the stats aggregator
#[async_trait::async_trait]
pub trait RequestLog: Send + Sync {
    async fn insert(&self, record: RequestRecord) -> Result<(), RequestLogError>;

    /// Records for `project` with `access_time >= since`, oldest first
    async fn query(
        &self,
        project: &ProjectKey,
        since: DateTime<Utc>,
    ) -> Result<Vec<RequestRecord>, RequestLogError>;
}

/// Request log backed by a SQLite database
pub struct SqliteRequestLog {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteRequestLog {
    pub fn new(db_path: &Path) -> Result<Self, RequestLogError> {
        info!("Initializing request log at {:?}", db_path);

        let conn = Connection::open(db_path)?;

        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;

        Self::with_connection(conn)
    }

    pub fn in_memory() -> Result<Self, RequestLogError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, RequestLogError> {
        Self::create_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn create_schema(conn: &Connection) -> Result<(), RequestLogError> {
        debug!("Creating request log schema");

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS requests (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                access_time INTEGER NOT NULL,
                remote_addr TEXT,
                owner TEXT NOT NULL,
                repository TEXT NOT NULL,
                version TEXT,
                cached INTEGER NOT NULL,
                status_code INTEGER
            )
            "#,
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_requests_project ON requests(owner, repository, access_time)",
            [],
        )?;

        Ok(())
    }

    fn lock_conn(conn: &Mutex<Connection>) -> Result<MutexGuard<'_, Connection>, RequestLogError> {
        conn.lock().map_err(|_| RequestLogError::LockPoisoned)
    }
}

#[async_trait::async_trait]
impl RequestLog for SqliteRequestLog {
    async fn insert(&self, record: RequestRecord) -> Result<(), RequestLogError> {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || -> Result<(), RequestLogError> {
            let conn = Self::lock_conn(&conn)?;
            conn.execute(
                r#"
                INSERT INTO requests
                    (access_time, remote_addr, owner, repository, version, cached, status_code)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                "#,
                (
                    record.access_time.timestamp(),
                    &record.remote_addr,
                    &record.owner,
                    &record.repo,
                    &record.version,
                    record.cached,
                    record.status,
                ),
            )?;
            debug!("Logged request for {}/{}", record.owner, record.repo);
            Ok(())
        })
        .await?
    }

    async fn query(
        &self,
        project: &ProjectKey,
        since: DateTime<Utc>,
    ) -> Result<Vec<RequestRecord>, RequestLogError> {
        let conn = Arc::clone(&self.conn);
        let project = project.clone();
        tokio::task::spawn_blocking(move || -> Result<Vec<RequestRecord>, RequestLogError> {
            let conn = Self::lock_conn(&conn)?;
            let mut stmt = conn.prepare(
                r#"
                SELECT access_time, remote_addr, owner, repository, version, cached, status_code
                FROM requests
                WHERE owner = ?1 AND repository = ?2 AND access_time >= ?3
                ORDER BY access_time, id
                "#,
            )?;

            let records = stmt
                .query_map((&project.owner, &project.repo, since.timestamp()), |row| {
                    let access_time: i64 = row.get(0)?;
                    Ok(RequestRecord {
                        access_time: DateTime::from_timestamp(access_time, 0).unwrap_or_default(),
                        remote_addr: row.get(1)?,
                        owner: row.get(2)?,
                        repo: row.get(3)?,
                        version: row.get(4)?,
                        cached: row.get(5)?,
                        status: row.get(6)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;

            Ok(records)
        })
        .await?
    }
}
