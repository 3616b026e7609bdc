//! SQLite table sink with upsert semantics

use super::Sink;
use crate::error::SinkError;
use crate::model::Issue;
use rusqlite::{params, Connection};
use std::path::{Path, PathBuf};
use tracing::info;

/// Whether `name` can be used as a table name without escaping surprises
pub fn is_valid_table_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        },
        _ => false,
    }
}

/// Upserts issues into `(id TEXT PRIMARY KEY, key TEXT, fields TEXT)`
#[derive(Debug, Clone)]
pub struct SqliteSink {
    path: PathBuf,
    table: String,
}

impl SqliteSink {
    pub fn new(path: impl AsRef<Path>, table: impl Into<String>) -> Result<Self, SinkError> {
        let table = table.into();
        if !is_valid_table_name(&table) {
            return Err(SinkError::InvalidTableName(table));
        }

        Ok(Self {
            path: path.as_ref().to_path_buf(),
            table,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    fn db_err(&self, source: rusqlite::Error) -> SinkError {
        SinkError::Sqlite {
            path: self.path.clone(),
            source,
        }
    }

    fn create_table_sql(&self) -> String {
        format!(
            r#"CREATE TABLE IF NOT EXISTS "{}" (
                id TEXT PRIMARY KEY,
                key TEXT,
                fields TEXT
            )"#,
            self.table
        )
    }

    fn upsert_sql(&self) -> String {
        format!(
            r#"INSERT OR REPLACE INTO "{}" (id, key, fields) VALUES (?1, ?2, ?3)"#,
            self.table
        )
    }
}

impl Sink for SqliteSink {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn write(&self, issues: &[Issue]) -> Result<usize, SinkError> {
        info!(
            path = %self.path.display(),
            table = %self.table,
            issues = issues.len(),
            "Saving issues to database"
        );

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| SinkError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let mut conn = Connection::open(&self.path).map_err(|e| self.db_err(e))?;
        conn.execute(&self.create_table_sql(), [])
            .map_err(|e| self.db_err(e))?;

        // All rows land or none do.
        let tx = conn.transaction().map_err(|e| self.db_err(e))?;
        {
            let mut stmt = tx
                .prepare_cached(&self.upsert_sql())
                .map_err(|e| self.db_err(e))?;

            for issue in issues {
                let fields = issue.fields_json().map_err(|source| SinkError::Encode {
                    id: issue.id.clone(),
                    source,
                })?;
                stmt.execute(params![issue.id, issue.key, fields])
                    .map_err(|e| self.db_err(e))?;
            }
        }
        tx.commit().map_err(|e| self.db_err(e))?;

        Ok(issues.len())
    }
}
