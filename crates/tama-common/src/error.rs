use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("database error: {0}")]
    Database(String),

    /// A single migration failed and its transaction was rolled back.
    #[error("migration {version} failed: {reason}")]
    Migration { version: String, reason: String },

    #[error("duplicate migration version {version}: {first} and {second}")]
    DuplicateVersion {
        version: String,
        first: String,
        second: String,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Version of the migration that failed, if this error came from one.
    pub fn failed_version(&self) -> Option<&str> {
        match self {
            Error::Migration { version, .. } => Some(version),
            _ => None,
        }
    }
}
