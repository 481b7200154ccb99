use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use tama_common::{Error, Result};

use crate::loader::EnvMap;

pub const MIGRATION_DIR_KEY: &str = "TAMA_DB_MIGRATION_DIR";
pub const ENGINE_KEY: &str = "TAMA_DB_ENGINE";
pub const DATABASE_URL_KEY: &str = "TAMA_DB_URL";

/// Database engines tama knows how to drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbEngine {
    Sqlite,
}

impl FromStr for DbEngine {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sqlite" | "sqlite3" => Ok(DbEngine::Sqlite),
            other => Err(Error::Config(format!(
                "unsupported database engine: {other}"
            ))),
        }
    }
}

impl fmt::Display for DbEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DbEngine::Sqlite => f.write_str("sqlite"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TamaConfig {
    pub migration_dir: PathBuf,
    pub engine: DbEngine,
    /// Only needed by commands that open the database.
    pub database_url: Option<String>,
}

impl TamaConfig {
    pub fn from_env_map(env: &EnvMap) -> Result<Self> {
        let migration_dir = required(env, MIGRATION_DIR_KEY)?;
        let engine = required(env, ENGINE_KEY)?.parse()?;
        let database_url = env
            .get(DATABASE_URL_KEY)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
            .map(str::to_string);

        Ok(Self {
            migration_dir: PathBuf::from(migration_dir),
            engine,
            database_url,
        })
    }

    pub fn require_database_url(&self) -> Result<&str> {
        self.database_url.as_deref().ok_or_else(|| {
            Error::Config(format!("missing required key {DATABASE_URL_KEY}"))
        })
    }
}

fn required<'a>(env: &'a EnvMap, key: &str) -> Result<&'a str> {
    env.get(key)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| Error::Config(format!("missing required key {key}")))
}
