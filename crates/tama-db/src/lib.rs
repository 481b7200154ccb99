pub mod ledger;
pub mod migrations;
pub mod migrator;
pub mod parser;

pub use ledger::{LEDGER_TABLE, Ledger, LedgerRecord};
pub use migrations::MigrationFile;
pub use migrator::{
    Direction, FailedMigration, MigrationReport, MigrationStatus, Migrator, ResetReport, Steps,
};
pub use parser::{DOWN_MARKER, ParsedMigration, UP_MARKER};
