use crate::{output_columns, SinkError, SinkResult, PROVENANCE_COLUMNS, SOURCES_COLUMNS, SOURCES_TABLE};
use anyhow::{Context, Result};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params_from_iter, Connection, ErrorCode};
use sqlcarve_engine::{CarvedRecord, FileReport, Value, ERROR_MARKER, ROWID_NOT_RECOVERED};
use sqlcarve_schema::TableSpec;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Surrogate key of every output table. Recovered rowids repeat across
/// scenarios and files, so they cannot be the key.
const CARVE_ID_COLUMN: &str = "_carve_id";

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

fn to_sql_value(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Integer(i) => SqlValue::Integer(*i),
        Value::Real(r) => SqlValue::Real(*r),
        Value::Text(s) => SqlValue::Text(s.clone()),
        Value::RowidNotRecovered => SqlValue::Text(ROWID_NOT_RECOVERED.to_string()),
        Value::Error => SqlValue::Text(ERROR_MARKER.to_string()),
    }
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation
    )
}

/// Errors that concern the database file itself rather than one table.
fn is_storage_failure(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if matches!(
            e.code,
            ErrorCode::SystemIoFailure
                | ErrorCode::DiskFull
                | ErrorCode::CannotOpen
                | ErrorCode::DatabaseBusy
                | ErrorCode::DatabaseLocked
                | ErrorCode::ReadOnly
                | ErrorCode::OutOfMemory
                | ErrorCode::DatabaseCorrupt
                | ErrorCode::NotADatabase
                | ErrorCode::FileLockingProtocolFailed
                | ErrorCode::PermissionDenied
        )
    )
}

fn clamp_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

struct InsertPlan {
    sql: String,
    width: usize,
}

/// SQLite sink writer.
///
/// Everything is written inside one transaction opened by `init`. A table
/// that cannot be created or inserted into is set aside and its records are
/// rejected; the other tables keep going.
pub struct SqliteSink {
    db_path: PathBuf,
    conn: Connection,
    inserts: HashMap<String, InsertPlan>,
    /// Tables set aside, with the reason.
    unusable: HashMap<String, String>,
    rows_written: u64,
    in_transaction: bool,
}

impl SqliteSink {
    pub fn new(db_path: PathBuf) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create database directory: {}", parent.display())
                })?;
            }
        }
        let conn = Connection::open(&db_path)
            .with_context(|| format!("Failed to open SQLite output: {}", db_path.display()))?;

        Ok(Self {
            db_path,
            conn,
            inserts: HashMap::new(),
            unusable: HashMap::new(),
            rows_written: 0,
            in_transaction: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    pub fn rows_written(&self) -> u64 {
        self.rows_written
    }

    pub fn init(&mut self, tables: &[TableSpec]) -> Result<()> {
        info!(
            "Initializing SQLite sink: {} ({} tables)",
            self.db_path.display(),
            tables.len()
        );

        self.conn
            .execute_batch("BEGIN IMMEDIATE")
            .context("Failed to begin SQLite transaction")?;
        self.in_transaction = true;

        let sources_sql = format!(
            "CREATE TABLE IF NOT EXISTS {} ({} TEXT NOT NULL, {} TEXT NOT NULL, {} INTEGER NOT NULL, {} INTEGER NOT NULL)",
            quote_ident(SOURCES_TABLE),
            quote_ident(SOURCES_COLUMNS[0]),
            quote_ident(SOURCES_COLUMNS[1]),
            quote_ident(SOURCES_COLUMNS[2]),
            quote_ident(SOURCES_COLUMNS[3]),
        );
        self.conn
            .execute(&sources_sql, [])
            .context("Failed to create sources table")?;

        for table in tables {
            match self.plan_table(table) {
                Ok(plan) => {
                    self.inserts.insert(table.name.clone(), plan);
                }
                Err(err) if is_storage_failure(&err) => {
                    return Err(anyhow::Error::new(err)
                        .context(format!("Failed to create output table '{}'", table.name)));
                }
                Err(err) => {
                    warn!(table = %table.name, "Skipping output table: {}", err);
                    self.unusable.insert(table.name.clone(), err.to_string());
                }
            }
        }
        Ok(())
    }

    /// Create the output table if missing and check the insert compiles
    /// against it, which catches name clashes and pre-existing tables of a
    /// different shape.
    fn plan_table(&self, table: &TableSpec) -> rusqlite::Result<InsertPlan> {
        let mut columns = vec![format!("{} INTEGER PRIMARY KEY", quote_ident(CARVE_ID_COLUMN))];
        columns.extend(table.columns.iter().map(|c| {
            format!("{} {}", quote_ident(&c.name), c.storage_class.sql_affinity())
        }));
        columns.push(format!("{} TEXT NOT NULL", quote_ident(PROVENANCE_COLUMNS[0])));
        columns.push(format!("{} INTEGER NOT NULL", quote_ident(PROVENANCE_COLUMNS[1])));
        columns.push(format!("{} TEXT NOT NULL", quote_ident(PROVENANCE_COLUMNS[2])));

        let target = quote_ident(&table.name);
        let create_sql = format!("CREATE TABLE IF NOT EXISTS {} ({})", target, columns.join(", "));
        debug!("CREATE TABLE: {}", create_sql);
        self.conn.execute(&create_sql, [])?;

        let names = output_columns(table);
        let column_list = names
            .iter()
            .map(|n| quote_ident(n))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            target,
            column_list,
            placeholders(names.len())
        );
        self.conn.prepare_cached(&sql)?;
        Ok(InsertPlan {
            sql,
            width: table.column_count(),
        })
    }

    pub fn write_record(&mut self, carved: &CarvedRecord) -> SinkResult<()> {
        let record = &carved.record;
        let table = carved.table.name.as_str();
        if let Some(reason) = self.unusable.get(table) {
            return Err(SinkError::rejected(table, reason.clone()));
        }
        let plan = self
            .inserts
            .get(table)
            .ok_or_else(|| SinkError::rejected(table, "no output table was created"))?;
        if record.values.len() != plan.width {
            return Err(SinkError::rejected(
                table,
                format!("expected {} values, got {}", plan.width, record.values.len()),
            ));
        }

        let mut row: Vec<SqlValue> = record.values.iter().map(to_sql_value).collect();
        row.push(SqlValue::Text(record.scenario_label()));
        row.push(SqlValue::Integer(clamp_i64(record.source_offset)));
        row.push(SqlValue::Text(record.source_file.to_string()));

        let result = self
            .conn
            .prepare_cached(&plan.sql)
            .and_then(|mut stmt| stmt.execute(params_from_iter(row)));
        match result {
            Ok(_) => {
                self.rows_written += 1;
                Ok(())
            }
            Err(err) if is_storage_failure(&err) => Err(anyhow::Error::new(err)
                .context(format!("Failed to insert record into '{}'", table))
                .into()),
            Err(err) if is_constraint_violation(&err) => {
                Err(SinkError::rejected(table, err.to_string()))
            }
            Err(err) => {
                // Anything else is about the table, so later records would fail too.
                let reason = err.to_string();
                self.inserts.remove(table);
                self.unusable.insert(table.to_string(), reason.clone());
                Err(SinkError::rejected(table, reason))
            }
        }
    }

    pub fn write_source(&mut self, report: &FileReport) -> Result<()> {
        let sql = format!(
            "INSERT INTO {} VALUES ({})",
            quote_ident(SOURCES_TABLE),
            placeholders(SOURCES_COLUMNS.len())
        );
        let row = [
            SqlValue::Text(report.path.display().to_string()),
            SqlValue::Text(report.blake3.clone()),
            SqlValue::Integer(clamp_i64(report.size)),
            SqlValue::Integer(clamp_i64(report.stats.accepted)),
        ];
        self.conn
            .execute(&sql, params_from_iter(row))
            .with_context(|| format!("Failed to record source {}", report.path.display()))?;
        Ok(())
    }

    pub fn prepare(&mut self) -> Result<()> {
        Ok(())
    }

    pub fn commit(&mut self) -> Result<()> {
        if !self.in_transaction {
            return Ok(());
        }
        self.conn
            .execute_batch("COMMIT")
            .context("Failed to commit SQLite transaction")?;
        self.in_transaction = false;
        info!(
            "Committed SQLite sink: {} ({} rows)",
            self.db_path.display(),
            self.rows_written
        );
        Ok(())
    }

    pub fn rollback(&mut self) -> Result<()> {
        if !self.in_transaction {
            return Ok(());
        }
        self.in_transaction = false;
        self.conn
            .execute_batch("ROLLBACK")
            .context("Failed to roll back SQLite transaction")?;
        warn!("Rolled back SQLite sink: {}", self.db_path.display());
        Ok(())
    }
}

impl Drop for SqliteSink {
    fn drop(&mut self) {
        if self.in_transaction {
            let _ = self.conn.execute_batch("ROLLBACK");
            warn!(
                "Discarded uncommitted SQLite output: {}",
                self.db_path.display()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("urls"), "\"urls\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn test_placeholders() {
        assert_eq!(placeholders(3), "?, ?, ?");
    }

    #[test]
    fn test_marker_values_are_text() {
        assert_eq!(
            to_sql_value(&Value::RowidNotRecovered),
            SqlValue::Text("rowid not recovered".into())
        );
        assert_eq!(to_sql_value(&Value::Error), SqlValue::Text("error".into()));
        assert_eq!(to_sql_value(&Value::Null), SqlValue::Null);
        assert_eq!(to_sql_value(&Value::Integer(7)), SqlValue::Integer(7));
    }

    #[test]
    fn test_storage_failures_are_not_table_errors() {
        let busy = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            None,
        );
        assert!(is_storage_failure(&busy));

        let conn = Connection::open_in_memory().unwrap();
        let err = conn
            .execute("CREATE TABLE t (a TEXT, a TEXT)", [])
            .unwrap_err();
        assert!(!is_storage_failure(&err));
        assert!(!is_constraint_violation(&err));
    }
}
