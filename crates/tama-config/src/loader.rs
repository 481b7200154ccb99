use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tama_common::{Error, Result};
use tracing::{debug, info};

use crate::model::TamaConfig;

/// Raw `KEY=VALUE` pairs read from an environment file.
pub type EnvMap = BTreeMap<String, String>;

/// Reads `.env`-style files without touching the process environment.
pub struct ConfigLoader {
    path: PathBuf,
}

impl ConfigLoader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Parse the file into a key/value map. Later duplicates win.
    pub fn load_env(&self) -> Result<EnvMap> {
        let iter = dotenvy::from_path_iter(&self.path).map_err(|e| {
            if e.not_found() {
                Error::Config(format!(
                    "environment file not found: {}",
                    self.path.display()
                ))
            } else {
                Error::Config(format!("failed to open {}: {e}", self.path.display()))
            }
        })?;

        let mut env = EnvMap::new();
        for item in iter {
            let (key, value) = item.map_err(|e| {
                Error::Config(format!("invalid line in {}: {e}", self.path.display()))
            })?;
            debug!("env key loaded: {key}");
            env.insert(key, value);
        }

        info!("loaded {} keys from {}", env.len(), self.path.display());
        Ok(env)
    }

    pub fn load(&self) -> Result<TamaConfig> {
        TamaConfig::from_env_map(&self.load_env()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_env(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn parses_keys_comments_and_blank_lines() {
        let file = write_env(
            "# tama settings\n\
             TAMA_DB_MIGRATION_DIR=migrations\n\
             \n\
             TAMA_DB_ENGINE=sqlite\n\
             TAMA_DB_URL=\"app.db\"\n",
        );

        let env = ConfigLoader::new(file.path()).load_env().unwrap();
        assert_eq!(env.len(), 3);
        assert_eq!(env["TAMA_DB_MIGRATION_DIR"], "migrations");
        assert_eq!(env["TAMA_DB_ENGINE"], "sqlite");
        assert_eq!(env["TAMA_DB_URL"], "app.db");
    }

    #[test]
    fn missing_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = ConfigLoader::new(dir.path().join("nope.env"))
            .load_env()
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn load_builds_typed_config() {
        let file = write_env("TAMA_DB_MIGRATION_DIR=db/migrations\nTAMA_DB_ENGINE=SQLite\n");

        let config = ConfigLoader::new(file.path()).load().unwrap();
        assert_eq!(config.migration_dir, PathBuf::from("db/migrations"));
        assert!(config.database_url.is_none());
    }
}
