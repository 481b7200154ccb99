//! Splits a migration file into its up and down SQL blocks.
//!
//! A migration file carries two literal markers:
//!
//! ```text
//! -- +tama up
//! CREATE TABLE users (id INTEGER PRIMARY KEY);
//!
//! -- +tama down
//! DROP TABLE users;
//! ```
//!
//! The blocks are opaque text; SQLite decides whether they are valid.

pub const UP_MARKER: &str = "-- +tama up";
pub const DOWN_MARKER: &str = "-- +tama down";

/// The two SQL blocks of a migration file. Either may be empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedMigration {
    pub up_sql: String,
    pub down_sql: String,
}

impl ParsedMigration {
    /// True when the up block contains something other than whitespace.
    pub fn has_up(&self) -> bool {
        !self.up_sql.trim().is_empty()
    }

    pub fn has_down(&self) -> bool {
        !self.down_sql.trim().is_empty()
    }
}

/// Each marker is anchored on its first occurrence, independently of the
/// other. When the down marker comes first, the up block runs to the end of
/// the text and the down block contains the up marker.
pub fn parse(raw: &str) -> ParsedMigration {
    let Some(up_pos) = raw.find(UP_MARKER) else {
        return ParsedMigration::default();
    };
    let down_pos = raw.find(DOWN_MARKER);

    let up_start = up_pos + UP_MARKER.len();
    let up_end = match down_pos {
        Some(pos) if pos >= up_start => pos,
        _ => raw.len(),
    };

    let down_sql = down_pos
        .map(|pos| raw[pos + DOWN_MARKER.len()..].to_string())
        .unwrap_or_default();

    ParsedMigration {
        up_sql: raw[up_start..up_end].to_string(),
        down_sql,
    }
}
