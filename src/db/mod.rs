//! SQL database accessor over a single SQLite file.
//!
//! Exposes what the chain, agent tools and lookup index need: dialect, usable
//! table names, table descriptions with sample rows, and query execution that
//! renders rows as a list of tuples (`[(1, 'AC/DC'), (2, 'Accept')]`), the
//! shape models are prompted with.
//!
//! The connection is wrapped in a `Mutex` so the accessor can be shared behind
//! an `Arc`; every call is short and nothing runs concurrently in practice.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use rusqlite::types::Value;
use rusqlite::{Connection, OpenFlags, params};
use tracing::{debug, info};

use crate::config::DatabaseConfig;
use crate::error::AppError;

/// Characters kept per text cell in query output and sample rows.
const MAX_CELL_CHARS: usize = 100;

pub type SqlValue = Value;

pub struct Database {
    uri: String,
    path: PathBuf,
    sample_rows: usize,
    conn: Mutex<Connection>,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").field("uri", &self.uri).finish_non_exhaustive()
    }
}

impl Database {
    pub fn open(config: &DatabaseConfig) -> Result<Self, AppError> {
        Self::open_uri(&config.uri, config.read_only, config.sample_rows)
    }

    /// Open `uri` (`sqlite:///relative.db`, `sqlite:////abs/path.db` or a bare path).
    pub fn open_uri(uri: &str, read_only: bool, sample_rows: usize) -> Result<Self, AppError> {
        let path = path_from_uri(uri)?;
        if path != Path::new(":memory:") && !path.exists() {
            return Err(AppError::Database(format!("database file not found: {}", path.display())));
        }

        let flags = if read_only {
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX
        } else {
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX
        };
        let conn = Connection::open_with_flags(&path, flags)
            .map_err(|e| AppError::Database(format!("open {}: {e}", path.display())))?;
        conn.pragma_update(None, "busy_timeout", 5000)
            .map_err(|e| AppError::Database(format!("set busy_timeout: {e}")))?;

        info!(uri = %uri, read_only, "database opened");
        Ok(Self { uri: uri.to_string(), path, sample_rows, conn: Mutex::new(conn) })
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn dialect(&self) -> &'static str {
        "sqlite"
    }

    /// Dialect name as written in prompts.
    pub fn dialect_label(&self) -> &'static str {
        "SQLite"
    }

    /// User tables, sorted by name. SQLite internal tables are excluded.
    pub fn usable_table_names(&self) -> Result<Vec<String>, AppError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT name FROM sqlite_master
                 WHERE type = 'table' AND name NOT LIKE 'sqlite_%'
                 ORDER BY name",
            )
            .map_err(|e| AppError::Database(format!("prepare table list: {e}")))?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(|e| AppError::Database(format!("query table list: {e}")))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| AppError::Database(format!("read table list: {e}")))?;
        Ok(names)
    }

    /// `CREATE TABLE` statement plus sample rows for each requested table, or
    /// for every usable table when `tables` is `None`.
    ///
    /// Table names are matched exactly; unknown names fail the whole call.
    pub fn table_info(&self, tables: Option<&[String]>) -> Result<String, AppError> {
        let all = self.usable_table_names()?;
        let selected: Vec<String> = match tables {
            None => all,
            Some(requested) => {
                let missing: Vec<&str> = requested
                    .iter()
                    .map(String::as_str)
                    .filter(|t| !all.iter().any(|a| a == t))
                    .collect();
                if !missing.is_empty() {
                    let quoted: Vec<String> = missing.iter().map(|t| format!("'{t}'")).collect();
                    return Err(AppError::Database(format!(
                        "table_names {{{}}} not found in database",
                        quoted.join(", ")
                    )));
                }
                requested.to_vec()
            }
        };

        let conn = self.lock()?;
        let mut blocks = Vec::with_capacity(selected.len());
        for table in &selected {
            let create: String = conn
                .query_row(
                    "SELECT sql FROM sqlite_master WHERE type = 'table' AND name = ?1",
                    params![table],
                    |row| row.get(0),
                )
                .map_err(|e| AppError::Database(format!("read schema for {table}: {e}")))?;

            let mut block = format!("\n{}", create.trim());
            if self.sample_rows > 0 {
                block.push_str("\n\n");
                block.push_str(&sample_rows_block(&conn, table, self.sample_rows)?);
            }
            blocks.push(block);
        }
        Ok(blocks.join("\n\n"))
    }

    /// Execute `sql` and render the rows as a list of tuples.
    /// A statement that returns no rows renders as an empty string.
    pub fn run(&self, sql: &str) -> Result<String, AppError> {
        let rows = self.rows(sql)?;
        if rows.is_empty() {
            return Ok(String::new());
        }
        let tuples: Vec<String> = rows.iter().map(|r| render_tuple(r)).collect();
        Ok(format!("[{}]", tuples.join(", ")))
    }

    /// Execute `sql` and return the raw rows.
    pub fn rows(&self, sql: &str) -> Result<Vec<Vec<SqlValue>>, AppError> {
        let sql = sql.trim().trim_end_matches(';').trim();
        if sql.is_empty() {
            return Err(AppError::Database("empty query".into()));
        }
        debug!(%sql, "executing query");

        let conn = self.lock()?;
        let mut stmt = conn.prepare(sql).map_err(|e| AppError::Database(e.to_string()))?;
        let columns = stmt.column_count();
        let mut rows = stmt.query([]).map_err(|e| AppError::Database(e.to_string()))?;

        let mut out = Vec::new();
        while let Some(row) = rows.next().map_err(|e| AppError::Database(e.to_string()))? {
            let mut values = Vec::with_capacity(columns);
            for i in 0..columns {
                values.push(row.get::<_, Value>(i).map_err(|e| AppError::Database(e.to_string()))?);
            }
            out.push(values);
        }
        debug!(rows = out.len(), "query finished");
        Ok(out)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, AppError> {
        self.conn
            .lock()
            .map_err(|_| AppError::Database("connection lock poisoned".into()))
    }
}

fn path_from_uri(uri: &str) -> Result<PathBuf, AppError> {
    let uri = uri.trim();
    let rest = if let Some(rest) = uri.strip_prefix("sqlite:///") {
        rest
    } else if let Some(rest) = uri.strip_prefix("sqlite://") {
        if rest.is_empty() { ":memory:" } else { rest }
    } else if uri.contains("://") {
        return Err(AppError::Database(format!("unsupported database uri: {uri}")));
    } else {
        uri
    };
    if rest.is_empty() {
        return Err(AppError::Database(format!("database uri has no path: {uri}")));
    }
    Ok(PathBuf::from(rest))
}

fn sample_rows_block(conn: &Connection, table: &str, limit: usize) -> Result<String, AppError> {
    let sql = format!("SELECT * FROM {} LIMIT {limit}", quote_ident(table));
    let mut stmt = conn
        .prepare(&sql)
        .map_err(|e| AppError::Database(format!("sample rows for {table}: {e}")))?;
    let header = stmt.column_names().join("\t");
    let columns = stmt.column_count();

    let mut lines = vec![format!("/*\n{limit} rows from {table} table:"), header];
    let mut rows = stmt
        .query([])
        .map_err(|e| AppError::Database(format!("sample rows for {table}: {e}")))?;
    while let Some(row) = rows
        .next()
        .map_err(|e| AppError::Database(format!("sample rows for {table}: {e}")))?
    {
        let mut cells = Vec::with_capacity(columns);
        for i in 0..columns {
            let v: Value = row
                .get(i)
                .map_err(|e| AppError::Database(format!("sample rows for {table}: {e}")))?;
            cells.push(render_plain(&v));
        }
        lines.push(cells.join("\t"));
    }
    lines.push("*/".to_string());
    Ok(lines.join("\n"))
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn truncate(s: &str) -> String {
    if s.chars().count() > MAX_CELL_CHARS {
        let cut: String = s.chars().take(MAX_CELL_CHARS).collect();
        format!("{cut}...")
    } else {
        s.to_string()
    }
}

fn render_float(f: f64) -> String {
    if f.is_finite() && f.fract() == 0.0 {
        format!("{f:.1}")
    } else {
        f.to_string()
    }
}

/// Literal-style rendering used inside result tuples.
pub fn render_value(v: &SqlValue) -> String {
    match v {
        Value::Null => "None".to_string(),
        Value::Integer(i) => i.to_string(),
        Value::Real(f) => render_float(*f),
        Value::Text(s) => format!("'{}'", truncate(s).replace('\\', "\\\\").replace('\'', "\\'")),
        Value::Blob(b) => format!("<blob {} bytes>", b.len()),
    }
}

/// Unquoted rendering used in sample-row blocks.
pub fn render_plain(v: &SqlValue) -> String {
    match v {
        Value::Text(s) => truncate(s),
        other => render_value(other),
    }
}

fn render_tuple(row: &[SqlValue]) -> String {
    let cells: Vec<String> = row.iter().map(render_value).collect();
    if cells.len() == 1 {
        format!("({},)", cells[0])
    } else {
        format!("({})", cells.join(", "))
    }
}

// ── test fixture ─────────────────────────────────────────────────────────────

/// A small slice of the Chinook schema and data.
#[cfg(test)]
pub(crate) const FIXTURE_SQL: &str = "
CREATE TABLE Artist (ArtistId INTEGER PRIMARY KEY, Name NVARCHAR(120));
CREATE TABLE Album (AlbumId INTEGER PRIMARY KEY, Title NVARCHAR(160) NOT NULL, ArtistId INTEGER NOT NULL);
CREATE TABLE PlaylistTrack (PlaylistId INTEGER NOT NULL, TrackId INTEGER NOT NULL, PRIMARY KEY (PlaylistId, TrackId));
INSERT INTO Artist VALUES (1, 'AC/DC'), (2, 'Accept'), (3, 'Aerosmith'), (5, 'Alice In Chains'), (22, 'Led Zeppelin'), (23, NULL);
INSERT INTO Album VALUES
    (1, 'For Those About To Rock We Salute You', 1),
    (2, 'Balls to the Wall', 2),
    (4, 'Let There Be Rock', 1),
    (5, 'Big Ones', 3),
    (7, 'Facelift', 5),
    (8, 'Chronicle, Vol. 1', 22),
    (9, 'Chronicle, Vol. 2', 22),
    (10, '1984', 22);
INSERT INTO PlaylistTrack VALUES (1, 3402), (1, 3389), (8, 3402);
";

/// Create the fixture database at `dir/chinook.sqlite`; returns its `sqlite:///` uri.
#[cfg(test)]
pub(crate) fn create_fixture(dir: &Path) -> String {
    let path = dir.join("chinook.sqlite");
    let conn = Connection::open(&path).expect("create fixture db");
    conn.execute_batch(FIXTURE_SQL).expect("load fixture");
    format!("sqlite:///{}", path.display())
}
