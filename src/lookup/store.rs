//! SQLite cache of name embeddings, keyed by embedding model.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use rusqlite::{Connection, params};

use crate::error::AppError;

const SCHEMA_VERSION: i64 = 1;

#[derive(Debug, Clone)]
pub struct IndexStore {
    db_path: PathBuf,
}

impl IndexStore {
    pub fn open(db_path: &Path) -> Result<Self, AppError> {
        if let Some(parent) = db_path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                AppError::Lookup(format!("index: cannot create {}: {e}", parent.display()))
            })?;
        }
        let store = Self { db_path: db_path.to_path_buf() };
        store.init_db()?;
        Ok(store)
    }

    /// All cached vectors for `model`.
    pub fn load(&self, model: &str) -> Result<HashMap<String, Vec<f32>>, AppError> {
        let conn = self.open_conn()?;
        let mut stmt = conn
            .prepare("SELECT name, vector FROM embeddings WHERE model = ?1")
            .map_err(|e| AppError::Lookup(format!("index: prepare load: {e}")))?;
        let rows = stmt
            .query_map(params![model], |row| {
                let name: String = row.get(0)?;
                let blob: Vec<u8> = row.get(1)?;
                Ok((name, decode_vector(&blob)))
            })
            .map_err(|e| AppError::Lookup(format!("index: query load: {e}")))?;

        let mut out = HashMap::new();
        for row in rows {
            let (name, vector) = row.map_err(|e| AppError::Lookup(format!("index: map load row: {e}")))?;
            out.insert(name, vector);
        }
        Ok(out)
    }

    /// Insert or replace vectors for `model` in one transaction.
    pub fn insert(&self, model: &str, rows: &[(String, Vec<f32>)]) -> Result<(), AppError> {
        if rows.is_empty() {
            return Ok(());
        }
        let mut conn = self.open_conn()?;
        let tx = conn
            .transaction()
            .map_err(|e| AppError::Lookup(format!("index: begin tx: {e}")))?;
        for (name, vector) in rows {
            tx.execute(
                "INSERT OR REPLACE INTO embeddings (model, name, vector) VALUES (?1, ?2, ?3)",
                params![model, name, encode_vector(vector)],
            )
            .map_err(|e| AppError::Lookup(format!("index: insert {name}: {e}")))?;
        }
        tx.commit()
            .map_err(|e| AppError::Lookup(format!("index: commit: {e}")))?;
        Ok(())
    }

    fn init_db(&self) -> Result<(), AppError> {
        let conn = self.open_conn()?;
        let version: i64 = conn
            .query_row("PRAGMA user_version;", [], |row| row.get(0))
            .map_err(|e| AppError::Lookup(format!("index: read schema version: {e}")))?;

        if version == 0 {
            conn.execute_batch(
                "
                CREATE TABLE IF NOT EXISTS embeddings (
                    model TEXT NOT NULL,
                    name TEXT NOT NULL,
                    vector BLOB NOT NULL,
                    PRIMARY KEY (model, name)
                );

                PRAGMA user_version = 1;
                ",
            )
            .map_err(|e| AppError::Lookup(format!("index: initialize schema: {e}")))?;
            return Ok(());
        }

        if version != SCHEMA_VERSION {
            return Err(AppError::Lookup(format!(
                "index: unsupported schema version {version}, expected {SCHEMA_VERSION}"
            )));
        }
        Ok(())
    }

    fn open_conn(&self) -> Result<Connection, AppError> {
        let conn = Connection::open(&self.db_path)
            .map_err(|e| AppError::Lookup(format!("index: open {}: {e}", self.db_path.display())))?;
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(|e| AppError::Lookup(format!("index: set journal_mode WAL: {e}")))?;
        conn.pragma_update(None, "busy_timeout", 5000)
            .map_err(|e| AppError::Lookup(format!("index: set busy_timeout: {e}")))?;
        Ok(conn)
    }
}

fn encode_vector(v: &[f32]) -> Vec<u8> {
    v.iter().flat_map(|x| x.to_le_bytes()).collect()
}

fn decode_vector(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}
