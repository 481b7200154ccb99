use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};
use serde::Serialize;
use tama_common::{Error, Result};
use tracing::{debug, error, warn};

pub const LEDGER_TABLE: &str = "tama_schema_history";

/// Record of which migration versions have been applied, kept in a table
/// inside the target database.
///
/// The ledger borrows a connection it does not own. Handing it a
/// `Transaction` (which derefs to `Connection`) makes every ledger write part
/// of that transaction.
pub struct Ledger<'conn> {
    conn: &'conn Connection,
}

/// A persisted ledger row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerRecord {
    pub version: String,
    pub applied_at: DateTime<Utc>,
}

impl<'conn> Ledger<'conn> {
    /// Bind to `conn` and create the bookkeeping table if needed. A failure
    /// to create the table is logged; later queries will report it again.
    pub fn new(conn: &'conn Connection) -> Self {
        let ledger = Self::attach(conn);
        if let Err(e) = ledger.ensure_table_exists() {
            error!("ledger init failed: {e}");
        }
        ledger
    }

    /// Bind to `conn` without touching the schema.
    pub fn attach(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    pub fn ensure_table_exists(&self) -> Result<()> {
        self.conn
            .execute_batch(&format!(
                "CREATE TABLE IF NOT EXISTS {LEDGER_TABLE} (
                    version TEXT PRIMARY KEY,
                    applied_at TEXT
                );"
            ))
            .map_err(|e| Error::Database(format!("failed to create ledger table: {e}")))?;
        Ok(())
    }

    pub fn applied_versions(&self) -> Result<BTreeSet<String>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT version FROM {LEDGER_TABLE}"))
            .map_err(|e| Error::Database(format!("ledger read failed: {e}")))?;

        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(|e| Error::Database(format!("ledger read failed: {e}")))?;

        let mut versions = BTreeSet::new();
        for row in rows {
            versions
                .insert(row.map_err(|e| Error::Database(format!("failed to read ledger row: {e}")))?);
        }
        Ok(versions)
    }

    /// Every ledger row, ordered by version.
    pub fn applied_records(&self) -> Result<Vec<LedgerRecord>> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT version, applied_at FROM {LEDGER_TABLE} ORDER BY version ASC"
            ))
            .map_err(|e| Error::Database(format!("failed to prepare query: {e}")))?;

        let rows = stmt
            .query_map([], |row| {
                let version: String = row.get(0)?;
                let applied_at = parse_datetime(&version, row.get::<_, Option<String>>(1)?);
                Ok(LedgerRecord {
                    version,
                    applied_at,
                })
            })
            .map_err(|e| Error::Database(format!("failed to query ledger: {e}")))?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row.map_err(|e| Error::Database(format!("failed to read ledger row: {e}")))?);
        }
        Ok(records)
    }

    /// Fails on duplicate versions; callers inside a transaction roll back.
    pub fn mark_version_applied(&self, version: &str) -> Result<()> {
        self.conn
            .execute(
                &format!(
                    "INSERT INTO {LEDGER_TABLE} (version, applied_at) VALUES (?1, datetime('now'))"
                ),
                params![version],
            )
            .map_err(|e| Error::Database(format!("failed to record version {version}: {e}")))?;
        debug!("ledger recorded {version}");
        Ok(())
    }

    /// Returns `false` (and warns) when the version was never recorded.
    pub fn remove_version(&self, version: &str) -> Result<bool> {
        let removed = self
            .conn
            .execute(
                &format!("DELETE FROM {LEDGER_TABLE} WHERE version = ?1"),
                params![version],
            )
            .map_err(|e| Error::Database(format!("failed to remove version {version}: {e}")))?;

        if removed == 0 {
            warn!("version {version} was not in the ledger");
            return Ok(false);
        }
        debug!("ledger removed {version}");
        Ok(true)
    }
}

fn parse_datetime(version: &str, s: Option<String>) -> DateTime<Utc> {
    let Some(s) = s else {
        warn!("version {version} has no applied_at, reporting epoch");
        return DateTime::<Utc>::UNIX_EPOCH;
    };
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| {
            // SQLite datetime('now') produces "YYYY-MM-DD HH:MM:SS"
            chrono::NaiveDateTime::parse_from_str(&s, "%Y-%m-%d %H:%M:%S")
                .map(|naive| naive.and_utc())
                .unwrap_or_else(|_| {
                    warn!("version {version} has unreadable applied_at {s:?}, reporting epoch");
                    DateTime::<Utc>::UNIX_EPOCH
                })
        })
}
