use std::time::Duration;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, OptionalExtension, params};

use crate::error::Result;
use super::{Collection, DocumentStore, Versioned};

pub type DbPool = Pool<SqliteConnectionManager>;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Initialize the documents table.
pub fn init_db(conn: &Connection) -> rusqlite::Result<()> {
    // WAL lets readers proceed while a writer holds the lock;
    // version doubles as the optimistic-concurrency token.
    conn.execute_batch(
        r#"
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;

        CREATE TABLE IF NOT EXISTS documents (
            collection TEXT NOT NULL,
            key TEXT NOT NULL,
            version INTEGER NOT NULL,
            body BLOB NOT NULL,
            updated_at INTEGER NOT NULL,
            PRIMARY KEY (collection, key)
        ) WITHOUT ROWID;
        "#,
    )
}

/// SQLite-backed document store.
#[derive(Clone)]
pub struct SqliteStore {
    pool: DbPool,
}

impl SqliteStore {
    pub fn open(database_path: &str) -> Result<Self> {
        let manager = SqliteConnectionManager::file(database_path)
            .with_init(|conn| conn.busy_timeout(BUSY_TIMEOUT));
        let pool = Pool::builder().max_size(10).build(manager)?;

        {
            let conn = pool.get()?;
            init_db(&conn)?;
        }

        Ok(Self { pool })
    }
}

impl DocumentStore for SqliteStore {
    fn get(&self, collection: Collection, key: &str) -> Result<Option<Versioned>> {
        let conn = self.pool.get()?;
        let stored = conn
            .query_row(
                "SELECT version, body FROM documents WHERE collection = ?1 AND key = ?2",
                params![collection.as_str(), key],
                |row| {
                    Ok(Versioned {
                        version: row.get(0)?,
                        body: row.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(stored)
    }

    fn create(&self, collection: Collection, key: &str, body: &[u8]) -> Result<bool> {
        let conn = self.pool.get()?;
        let inserted = conn.execute(
            "INSERT INTO documents (collection, key, version, body, updated_at)
             VALUES (?1, ?2, 1, ?3, ?4)
             ON CONFLICT (collection, key) DO NOTHING",
            params![collection.as_str(), key, body, chrono::Utc::now().timestamp()],
        )?;
        Ok(inserted == 1)
    }

    fn update(&self, collection: Collection, key: &str, expected_version: i64, body: &[u8]) -> Result<bool> {
        let conn = self.pool.get()?;
        let updated = conn.execute(
            "UPDATE documents SET body = ?1, version = version + 1, updated_at = ?2
             WHERE collection = ?3 AND key = ?4 AND version = ?5",
            params![
                body,
                chrono::Utc::now().timestamp(),
                collection.as_str(),
                key,
                expected_version
            ],
        )?;
        Ok(updated == 1)
    }
}
