//! SQL statements and the per-backend statement cache.
//!
//! Each logical operation maps to exactly one statement. Statements are
//! rendered on first use and kept for the lifetime of the connection, so
//! sqlx can reuse the server-side prepared statement across calls.

use dashmap::DashMap;
use std::sync::Arc;

/// Largest `get_many` batch whose statement is kept in the cache.
///
/// Larger batches are rendered per call to keep the cache bounded.
pub const MAX_CACHED_BATCH: usize = 32;

/// Logical cache operation, used as the statement cache key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    Get,
    Has,
    Set,
    Remove,
    RemovePattern,
    CleanAll,
    CleanOld,
    GetTimeout,
    GetLastModified,
    /// Bulk read with the given number of keys.
    GetMany(usize),
    Stats,
    Ping,
}

/// SQL dialect of the target engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Dialect {
    Sqlite,
    MySql,
}

impl Dialect {
    /// Quote an identifier.
    pub fn quote(&self, ident: &str) -> String {
        match self {
            Dialect::Sqlite => format!("\"{}\"", ident),
            Dialect::MySql => format!("`{}`", ident),
        }
    }

    /// Render the statement for `op` against `table`.
    pub fn render(&self, op: Operation, table: &str) -> String {
        let t = self.quote(table);
        let key = self.quote("key");
        let data = self.quote("data");
        let timeout = self.quote("timeout");
        let modified = self.quote("last_modified");

        match op {
            Operation::Get => format!(
                "SELECT {data} FROM {t} WHERE {key} = ? AND {timeout} > ?"
            ),
            Operation::Has => format!(
                "SELECT COUNT(*) FROM {t} WHERE {key} = ? AND {timeout} > ?"
            ),
            Operation::Set => {
                let insert = format!(
                    "INSERT INTO {t} ({key}, {data}, {timeout}, {modified}) VALUES (?, ?, ?, ?)"
                );
                match self {
                    Dialect::Sqlite => format!(
                        "{insert} ON CONFLICT({key}) DO UPDATE SET \
                         {data} = excluded.{data}, \
                         {timeout} = excluded.{timeout}, \
                         {modified} = excluded.{modified}"
                    ),
                    Dialect::MySql => format!(
                        "{insert} ON DUPLICATE KEY UPDATE \
                         {data} = VALUES({data}), \
                         {timeout} = VALUES({timeout}), \
                         {modified} = VALUES({modified})"
                    ),
                }
            }
            Operation::Remove => format!("DELETE FROM {t} WHERE {key} = ?"),
            // LIKE narrows the candidate rows so REGEXP only runs on rough matches
            Operation::RemovePattern => format!(
                "DELETE FROM {t} WHERE {key} LIKE ? ESCAPE '{}' AND {key} REGEXP ?",
                crate::pattern::LIKE_ESCAPE
            ),
            Operation::CleanAll => format!("DELETE FROM {t}"),
            Operation::CleanOld => format!("DELETE FROM {t} WHERE {timeout} < ?"),
            Operation::GetTimeout => format!(
                "SELECT {timeout} FROM {t} WHERE {key} = ? AND {timeout} > ?"
            ),
            Operation::GetLastModified => format!(
                "SELECT {modified} FROM {t} WHERE {key} = ? AND {timeout} > ?"
            ),
            Operation::GetMany(n) => {
                let placeholders = vec!["?"; n.max(1)].join(", ");
                format!(
                    "SELECT {key}, {data} FROM {t} WHERE {key} IN ({placeholders}) AND {timeout} > ?"
                )
            }
            Operation::Stats => {
                let cast = |expr: String| match self {
                    Dialect::Sqlite => expr,
                    // MySQL SUM() yields DECIMAL
                    Dialect::MySql => format!("CAST({expr} AS SIGNED)"),
                };
                format!(
                    "SELECT COUNT(*), {}, {} FROM {t}",
                    cast(format!(
                        "COALESCE(SUM(CASE WHEN {timeout} <= ? THEN 1 ELSE 0 END), 0)"
                    )),
                    cast(format!("COALESCE(SUM(LENGTH({data})), 0)")),
                )
            }
            Operation::Ping => "SELECT 1".to_string(),
        }
    }
}

/// Map from operation to rendered statement, owned by one backend.
pub struct StatementCache {
    dialect: Dialect,
    table: String,
    statements: DashMap<Operation, Arc<str>>,
}

impl StatementCache {
    pub fn new(dialect: Dialect, table: impl Into<String>) -> Self {
        StatementCache {
            dialect,
            table: table.into(),
            statements: DashMap::new(),
        }
    }

    /// Statement for `op`, rendered on first use.
    pub fn get(&self, op: Operation) -> Arc<str> {
        if let Operation::GetMany(n) = op {
            if n > MAX_CACHED_BATCH {
                return Arc::from(self.dialect.render(op, &self.table));
            }
        }

        self.statements
            .entry(op)
            .or_insert_with(|| {
                debug!("✓ Prepared {:?} statement for table {}", op, self.table);
                Arc::from(self.dialect.render(op, &self.table))
            })
            .value()
            .clone()
    }

    /// Drop every cached statement. Called when the connection is replaced.
    pub fn clear(&self) {
        self.statements.clear();
    }

    pub fn len(&self) -> usize {
        self.statements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }
}
