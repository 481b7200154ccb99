//! Migration files on disk.
//!
//! A migration is a `<version>_<name>.sql` file. The version is everything
//! before the first underscore and must be unique within the directory;
//! lexicographic order of file names is the order migrations are applied in.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use tama_common::{Error, Result};
use tracing::{debug, warn};

use crate::parser::{self, ParsedMigration};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationFile {
    pub version: String,
    pub name: String,
    pub path: PathBuf,
}

impl MigrationFile {
    /// Build from a file name such as `20240101000000_create_users.sql`.
    /// Returns `None` for names that are not `.sql` files or have no version.
    pub fn from_file_name(dir: &Path, file_name: &str) -> Option<Self> {
        let stem = file_name.strip_suffix(".sql")?;
        let (version, name) = match stem.split_once('_') {
            Some((version, name)) => (version, name),
            None => (stem, stem),
        };
        if version.is_empty() {
            return None;
        }

        Some(Self {
            version: version.to_string(),
            name: name.to_string(),
            path: dir.join(file_name),
        })
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn read(&self) -> Result<String> {
        fs::read_to_string(&self.path).map_err(|e| {
            Error::Other(format!(
                "failed to read migration {}: {e}",
                self.path.display()
            ))
        })
    }

    pub fn parse(&self) -> Result<ParsedMigration> {
        Ok(parser::parse(&self.read()?))
    }
}

/// List the migrations in `dir`, sorted ascending by file name.
pub fn discover(dir: &Path) -> Result<Vec<MigrationFile>> {
    if !dir.is_dir() {
        return Err(Error::Config(format!(
            "migration directory not found: {}",
            dir.display()
        )));
    }

    let mut names = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        // Follows symlinks; dangling links are skipped.
        if !entry.path().is_file() {
            continue;
        }
        match entry.file_name().into_string() {
            Ok(name) if name.ends_with(".sql") => names.push(name),
            Ok(_) => {}
            Err(raw) => warn!("skipping non UTF-8 file name {raw:?}"),
        }
    }
    names.sort();

    let mut seen: HashMap<String, String> = HashMap::new();
    let mut migrations = Vec::with_capacity(names.len());
    for name in names {
        let Some(migration) = MigrationFile::from_file_name(dir, &name) else {
            warn!("skipping {name}: file name has no version prefix");
            continue;
        };
        if let Some(first) = seen.insert(migration.version.clone(), name.clone()) {
            return Err(Error::DuplicateVersion {
                version: migration.version,
                first,
                second: name,
            });
        }
        migrations.push(migration);
    }

    debug!("found {} migrations in {}", migrations.len(), dir.display());
    Ok(migrations)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(dir: &Path, name: &str) {
        fs::write(dir.join(name), "-- +tama up\nSELECT 1;\n").unwrap();
    }

    #[test]
    fn version_is_prefix_before_first_underscore() {
        let m = MigrationFile::from_file_name(Path::new("m"), "20240101000000_create_users_table.sql")
            .unwrap();
        assert_eq!(m.version, "20240101000000");
        assert_eq!(m.name, "create_users_table");
        assert_eq!(m.path, Path::new("m").join("20240101000000_create_users_table.sql"));
        assert_eq!(m.file_name(), "20240101000000_create_users_table.sql");
    }

    #[test]
    fn name_without_underscore_is_its_own_version() {
        let m = MigrationFile::from_file_name(Path::new("."), "001.sql").unwrap();
        assert_eq!(m.version, "001");
        assert_eq!(m.name, "001");
    }

    #[test]
    fn rejects_non_sql_and_versionless_names() {
        assert!(MigrationFile::from_file_name(Path::new("."), "notes.txt").is_none());
        assert!(MigrationFile::from_file_name(Path::new("."), "_orphan.sql").is_none());
    }

    #[test]
    fn discover_sorts_and_filters() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "20240103000000_c.sql");
        touch(dir.path(), "20240101000000_a.sql");
        touch(dir.path(), "20240102000000_b.sql");
        fs::write(dir.path().join("README.md"), "docs").unwrap();
        fs::create_dir(dir.path().join("nested.sql")).unwrap();

        let versions: Vec<_> = discover(dir.path())
            .unwrap()
            .into_iter()
            .map(|m| m.version)
            .collect();
        assert_eq!(
            versions,
            vec!["20240101000000", "20240102000000", "20240103000000"]
        );
    }

    #[cfg(unix)]
    #[test]
    fn discover_follows_symlinked_files() {
        let dir = tempfile::tempdir().unwrap();
        let elsewhere = tempfile::tempdir().unwrap();
        touch(elsewhere.path(), "shared.sql");
        std::os::unix::fs::symlink(
            elsewhere.path().join("shared.sql"),
            dir.path().join("20240101000000_shared.sql"),
        )
        .unwrap();
        std::os::unix::fs::symlink(
            elsewhere.path().join("gone.sql"),
            dir.path().join("20240102000000_dangling.sql"),
        )
        .unwrap();

        let found = discover(dir.path()).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].version, "20240101000000");
        assert_eq!(found[0].parse().unwrap().up_sql, "\nSELECT 1;\n");
    }

    #[test]
    fn discover_rejects_duplicate_versions() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "20240101000000_a.sql");
        touch(dir.path(), "20240101000000_b.sql");

        match discover(dir.path()).unwrap_err() {
            Error::DuplicateVersion {
                version,
                first,
                second,
            } => {
                assert_eq!(version, "20240101000000");
                assert_eq!(first, "20240101000000_a.sql");
                assert_eq!(second, "20240101000000_b.sql");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn discover_missing_directory_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = discover(&dir.path().join("missing")).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn empty_directory_has_no_migrations() {
        let dir = tempfile::tempdir().unwrap();
        assert!(discover(dir.path()).unwrap().is_empty());
    }
}
