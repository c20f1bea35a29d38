//! Query backend contract and the SQLite implementation behind it.
//!
//! Everything above this module talks to `dyn QueryBackend`; user values only
//! ever reach it as bound `QueryArg`s.
use crate::core::types::QueryArg;
use rusqlite::types::{ToSqlOutput, ValueRef};
use rusqlite::{Connection, ToSql, params_from_iter};
use std::fmt;
use std::path::Path;
use std::sync::Mutex;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("query failed: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("backend connection lock poisoned")]
    Poisoned,
}

/// One typed cell of a query result
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl CellValue {
    /// Integer view; text is parsed, reals are truncated
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            CellValue::Integer(i) => Some(*i),
            CellValue::Real(r) => Some(*r as i64),
            CellValue::Text(s) => s.trim().parse().ok(),
            CellValue::Null | CellValue::Blob(_) => None,
        }
    }

    /// Display text; `None` for NULL
    pub fn as_text(&self) -> Option<String> {
        match self {
            CellValue::Null => None,
            other => Some(other.to_string()),
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Null => write!(f, "NULL"),
            CellValue::Integer(i) => write!(f, "{i}"),
            CellValue::Real(r) => write!(f, "{r}"),
            CellValue::Text(s) => write!(f, "{s}"),
            CellValue::Blob(b) => write!(f, "<{} bytes>", b.len()),
        }
    }
}

impl From<ValueRef<'_>> for CellValue {
    fn from(value: ValueRef<'_>) -> Self {
        match value {
            ValueRef::Null => CellValue::Null,
            ValueRef::Integer(i) => CellValue::Integer(i),
            ValueRef::Real(r) => CellValue::Real(r),
            ValueRef::Text(t) => CellValue::Text(String::from_utf8_lossy(t).into_owned()),
            ValueRef::Blob(b) => CellValue::Blob(b.to_vec()),
        }
    }
}

/// Column names plus rows of typed cells
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<CellValue>>,
}

impl QueryResult {
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Anything that can run a `?`-parameterized statement and return rows
pub trait QueryBackend: Send + Sync {
    fn query(&self, sql: &str, args: &[QueryArg]) -> Result<QueryResult, BackendError>;
}

impl ToSql for QueryArg {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            QueryArg::Text(s) => ToSqlOutput::from(s.as_str()),
            QueryArg::Integer(i) => ToSqlOutput::from(*i),
        })
    }
}

/// SQLite database accessed through one serialized connection
pub struct SqliteBackend {
    conn: Mutex<Connection>,
}

impl SqliteBackend {
    pub fn open(path: &Path) -> Result<Self, BackendError> {
        let conn = Connection::open(path)?;
        Ok(Self::from_connection(conn))
    }

    pub fn open_in_memory() -> Result<Self, BackendError> {
        Ok(Self::from_connection(Connection::open_in_memory()?))
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self { conn: Mutex::new(conn) }
    }

    /// Run statements that return no rows (schema setup, seeding)
    pub fn execute_batch(&self, sql: &str) -> Result<(), BackendError> {
        let conn = self.conn.lock().map_err(|_| BackendError::Poisoned)?;
        conn.execute_batch(sql)?;
        Ok(())
    }
}

impl QueryBackend for SqliteBackend {
    fn query(&self, sql: &str, args: &[QueryArg]) -> Result<QueryResult, BackendError> {
        debug!(sql, args = args.len(), "running query");
        let conn = self.conn.lock().map_err(|_| BackendError::Poisoned)?;
        let mut stmt = conn.prepare(sql)?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let width = columns.len();

        let mut rows = stmt.query(params_from_iter(args.iter()))?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let mut cells = Vec::with_capacity(width);
            for i in 0..width {
                cells.push(CellValue::from(row.get_ref(i)?));
            }
            out.push(cells);
        }
        Ok(QueryResult { columns, rows: out })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn binds_text_and_integer_args() {
        let backend = SqliteBackend::open_in_memory().unwrap();
        backend
            .execute_batch(
                "CREATE TABLE t (name TEXT, n INTEGER);
                 INSERT INTO t VALUES ('a', 1), ('b', 2), ('c', NULL);",
            )
            .unwrap();
        let result = backend
            .query(
                "SELECT `name`, `n` FROM t WHERE `name` != ? AND `n` >= ? ORDER BY `name`",
                &[QueryArg::from("a"), QueryArg::Integer(1)],
            )
            .unwrap();
        assert_eq!(result.columns, vec!["name".to_string(), "n".to_string()]);
        assert_eq!(
            result.rows,
            vec![vec![CellValue::Text("b".into()), CellValue::Integer(2)]]
        );
    }

    #[test]
    fn values_never_splice_into_sql() {
        let backend = SqliteBackend::open_in_memory().unwrap();
        backend
            .execute_batch("CREATE TABLE t (name TEXT); INSERT INTO t VALUES ('x');")
            .unwrap();
        let result = backend
            .query("SELECT name FROM t WHERE name = ?", &[QueryArg::from("x' OR '1'='1")])
            .unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn bad_sql_surfaces_as_backend_error() {
        let backend = SqliteBackend::open_in_memory().unwrap();
        let err = backend.query("SELECT * FROM missing", &[]).unwrap_err();
        assert!(matches!(err, BackendError::Sqlite(_)));
    }

    #[test]
    fn cell_conversions() {
        assert_eq!(CellValue::Text(" 42 ".into()).as_i64(), Some(42));
        assert_eq!(CellValue::Null.as_text(), None);
        assert_eq!(CellValue::Integer(7).as_text(), Some("7".to_string()));
    }
}
