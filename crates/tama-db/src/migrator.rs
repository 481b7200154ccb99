//! Applies and reverts migration files against a SQLite database.
//!
//! Each file runs in its own transaction together with its ledger write, so
//! a failure leaves earlier files committed and later ones unattempted.
//! Runs are not guarded against each other: two migrators pointed at the same
//! database at the same time is unsupported.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, Transaction};
use serde::Serialize;
use tama_common::{Error, Result};
use tracing::{error, info, warn};

use crate::ledger::Ledger;
use crate::migrations::{self, MigrationFile};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Up => f.write_str("up"),
            Direction::Down => f.write_str("down"),
        }
    }
}

/// How many applied migrations `down` may revert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Steps {
    All,
    Count(usize),
}

impl Steps {
    /// `-1` means everything; other negative values are rejected.
    pub fn from_signed(n: i64) -> Option<Self> {
        match n {
            -1 => Some(Steps::All),
            n if n >= 0 => usize::try_from(n).ok().map(Steps::Count),
            _ => None,
        }
    }

    fn allows(&self, done: usize) -> bool {
        match self {
            Steps::All => true,
            Steps::Count(limit) => done < *limit,
        }
    }
}

impl FromStr for Steps {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("all") {
            return Ok(Steps::All);
        }
        s.parse::<i64>()
            .ok()
            .and_then(Steps::from_signed)
            .ok_or_else(|| format!("invalid step count '{s}': expected a number >= 0, 'all' or -1"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedMigration {
    pub version: String,
    pub reason: String,
}

/// Outcome of an `up` or `down` run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationReport {
    pub direction: Direction,
    /// Versions applied or reverted, in the order they ran.
    pub versions: Vec<String>,
    /// Versions passed over because the relevant block was empty.
    pub skipped: Vec<String>,
    /// The migration that stopped the run, if any.
    pub failed: Option<FailedMigration>,
}

impl MigrationReport {
    fn new(direction: Direction) -> Self {
        Self {
            direction,
            versions: Vec::new(),
            skipped: Vec::new(),
            failed: None,
        }
    }

    pub fn count(&self) -> usize {
        self.versions.len()
    }

    pub fn is_success(&self) -> bool {
        self.failed.is_none()
    }

    /// Nothing ran and nothing failed.
    pub fn is_up_to_date(&self) -> bool {
        self.versions.is_empty() && self.failed.is_none()
    }

    /// Turn a failed run into `Error::Migration`.
    pub fn into_result(self) -> Result<Self> {
        match self.failed {
            Some(FailedMigration { version, reason }) => Err(Error::Migration { version, reason }),
            None => Ok(self),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResetReport {
    pub reverted: MigrationReport,
    /// `None` when reverting failed and nothing was re-applied.
    pub applied: Option<MigrationReport>,
}

impl ResetReport {
    pub fn is_success(&self) -> bool {
        self.reverted.is_success() && self.applied.as_ref().is_some_and(|r| r.is_success())
    }
}

/// One row of `tama status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationStatus {
    pub version: String,
    /// `None` when the ledger knows the version but no file is on disk.
    pub name: Option<String>,
    pub applied: bool,
    pub applied_at: Option<DateTime<Utc>>,
}

pub struct Migrator {
    migration_dir: PathBuf,
    conn: Connection,
}

impl Migrator {
    pub fn open(migration_dir: impl Into<PathBuf>, db_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_path.as_ref();
        info!("opening database at {}", db_path.display());
        let conn = Connection::open(db_path).map_err(|e| {
            Error::Database(format!(
                "failed to open database {}: {e}",
                db_path.display()
            ))
        })?;
        Ok(Self::with_connection(migration_dir, conn))
    }

    pub fn in_memory(migration_dir: impl Into<PathBuf>) -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::Database(format!("failed to open in-memory database: {e}")))?;
        Ok(Self::with_connection(migration_dir, conn))
    }

    /// Take ownership of `conn` and make sure the ledger table exists.
    pub fn with_connection(migration_dir: impl Into<PathBuf>, conn: Connection) -> Self {
        Ledger::new(&conn);
        Self {
            migration_dir: migration_dir.into(),
            conn,
        }
    }

    pub fn migration_dir(&self) -> &Path {
        &self.migration_dir
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn ledger(&self) -> Ledger<'_> {
        Ledger::attach(&self.conn)
    }

    pub fn discover(&self) -> Result<Vec<MigrationFile>> {
        migrations::discover(&self.migration_dir)
    }

    /// Migrations on disk that the ledger has not recorded, oldest first.
    pub fn pending(&self) -> Result<Vec<MigrationFile>> {
        let applied = self.ledger().applied_versions()?;
        Ok(self
            .discover()?
            .into_iter()
            .filter(|m| !applied.contains(&m.version))
            .collect())
    }

    /// Apply every pending migration, oldest first, stopping at the first
    /// failure.
    pub fn up(&mut self) -> Result<MigrationReport> {
        let applied = self.ledger().applied_versions()?;
        let files = self.discover()?;
        let mut report = MigrationReport::new(Direction::Up);

        for file in files.iter().filter(|f| !applied.contains(&f.version)) {
            if !self.run_file(file, Direction::Up, &mut report) {
                break;
            }
        }

        if report.is_up_to_date() {
            info!("database is up to date");
        } else if report.is_success() {
            info!("applied {} migration(s)", report.count());
        }
        Ok(report)
    }

    /// Revert applied migrations, newest first, stopping at the first
    /// failure. Skipped files do not count towards `steps`.
    pub fn down(&mut self, steps: Steps) -> Result<MigrationReport> {
        let applied = self.ledger().applied_versions()?;
        let files = self.discover()?;
        let mut report = MigrationReport::new(Direction::Down);

        for file in files.iter().rev().filter(|f| applied.contains(&f.version)) {
            if !steps.allows(report.count()) {
                break;
            }
            if !self.run_file(file, Direction::Down, &mut report) {
                break;
            }
        }

        if report.is_up_to_date() {
            info!("nothing to revert");
        } else if report.is_success() {
            info!("reverted {} migration(s)", report.count());
        }
        Ok(report)
    }

    /// Revert everything, then apply everything again.
    pub fn reset(&mut self) -> Result<ResetReport> {
        let reverted = self.down(Steps::All)?;
        if !reverted.is_success() {
            return Ok(ResetReport {
                reverted,
                applied: None,
            });
        }
        let applied = self.up()?;
        Ok(ResetReport {
            reverted,
            applied: Some(applied),
        })
    }

    /// Every migration on disk joined with the ledger, plus ledger entries
    /// whose file has gone missing. Ordered by version.
    pub fn status(&self) -> Result<Vec<MigrationStatus>> {
        let records: BTreeMap<String, DateTime<Utc>> = self
            .ledger()
            .applied_records()?
            .into_iter()
            .map(|r| (r.version, r.applied_at))
            .collect();
        let files = self.discover()?;
        let on_disk: BTreeSet<&str> = files.iter().map(|f| f.version.as_str()).collect();

        let mut statuses: Vec<MigrationStatus> = files
            .iter()
            .map(|file| {
                let applied_at = records.get(&file.version).copied();
                MigrationStatus {
                    version: file.version.clone(),
                    name: Some(file.name.clone()),
                    applied: applied_at.is_some(),
                    applied_at,
                }
            })
            .collect();

        for (version, applied_at) in &records {
            if !on_disk.contains(version.as_str()) {
                warn!("version {version} is in the ledger but has no migration file");
                statuses.push(MigrationStatus {
                    version: version.clone(),
                    name: None,
                    applied: true,
                    applied_at: Some(*applied_at),
                });
            }
        }

        statuses.sort_by(|a, b| a.version.cmp(&b.version));
        Ok(statuses)
    }

    /// Run one file in `direction`, updating `report`. Returns `false` when
    /// the run must stop.
    fn run_file(
        &mut self,
        file: &MigrationFile,
        direction: Direction,
        report: &mut MigrationReport,
    ) -> bool {
        let parsed = match file.parse() {
            Ok(parsed) => parsed,
            Err(e) => {
                error!("{e}");
                report.failed = Some(FailedMigration {
                    version: file.version.clone(),
                    reason: e.to_string(),
                });
                return false;
            }
        };

        let sql = match direction {
            Direction::Up => &parsed.up_sql,
            Direction::Down => &parsed.down_sql,
        };
        if sql.trim().is_empty() {
            warn!("{} has no {direction} block, skipping", file.file_name());
            report.skipped.push(file.version.clone());
            return true;
        }

        match self.execute(file, sql, direction) {
            Ok(()) => {
                info!("{direction} {}", file.file_name());
                report.versions.push(file.version.clone());
                true
            }
            Err(e) => {
                report.failed = Some(FailedMigration {
                    version: file.version.clone(),
                    reason: e.to_string(),
                });
                false
            }
        }
    }

    /// User SQL and ledger write share one transaction; either failing rolls
    /// both back.
    fn execute(&mut self, file: &MigrationFile, sql: &str, direction: Direction) -> Result<()> {
        let tx = self
            .conn
            .transaction()
            .map_err(|e| Error::Database(format!("failed to begin transaction: {e}")))?;

        if let Err(e) = tx.execute_batch(sql) {
            error!("{direction} {} failed, rolling back: {e}", file.file_name());
            rollback(tx);
            return Err(Error::Database(e.to_string()));
        }

        let ledger = Ledger::attach(&tx);
        let recorded = match direction {
            Direction::Up => ledger.mark_version_applied(&file.version),
            Direction::Down => ledger.remove_version(&file.version).map(|_| ()),
        };
        if let Err(e) = recorded {
            error!("ledger update for {} failed, rolling back: {e}", file.version);
            rollback(tx);
            return Err(e);
        }

        tx.commit().map_err(|e| {
            error!("commit of {} failed: {e}", file.file_name());
            Error::Database(format!("commit failed: {e}"))
        })
    }
}

fn rollback(tx: Transaction<'_>) {
    if let Err(e) = tx.rollback() {
        error!("rollback failed: {e}");
    }
}
