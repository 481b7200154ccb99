use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tama_common::{Error, Result};
use tracing::info;

/// Contents of every freshly generated migration.
pub const MIGRATION_TEMPLATE: &str = "-- +tama up
SELECT 'up SQL query';

-- +tama down
SELECT 'down SQL query';
";

/// Write `<YYYYMMDDHHMMSS>_<label>.sql` into `dir`, creating the directory if
/// needed. Never overwrites an existing file.
pub fn create_migration(dir: &Path, label: &str, now: DateTime<Utc>) -> Result<PathBuf> {
    let label = normalize_label(label)?;

    fs::create_dir_all(dir)?;
    let path = dir.join(format!("{}_{label}.sql", now.format("%Y%m%d%H%M%S")));

    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&path)
        .map_err(|e| match e.kind() {
            ErrorKind::AlreadyExists => {
                Error::Other(format!("migration already exists: {}", path.display()))
            }
            _ => Error::Io(e),
        })?;
    file.write_all(MIGRATION_TEMPLATE.as_bytes())?;

    info!("created migration {}", path.display());
    Ok(path)
}

fn normalize_label(label: &str) -> Result<String> {
    let label = label.trim();
    if label.is_empty() {
        return Err(Error::Config("migration name must not be empty".into()));
    }
    if label.contains(['/', '\\']) {
        return Err(Error::Config(format!(
            "migration name must not contain path separators: {label}"
        )));
    }
    Ok(label.split_whitespace().collect::<Vec<_>>().join("_"))
}
