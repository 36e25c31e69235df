//! Database schema constants, the persisted record type and the migration list.
//!
//! This module contains all SQL schema definitions and query templates
//! for the PostgreSQL storage backend.

use serde::{Deserialize, Serialize};

/// A completed todo item as stored in `teddy_360`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Teddy360 {
    pub id: i32,
    #[serde(rename = "userId")]
    #[sqlx(rename = "userId")]
    pub user_id: i32,
    pub title: String,
    pub completed: bool,
}

/// SQL schema for creating the teddy_360 table.
pub const CREATE_TEDDY_360_TABLE: &str = r#"
CREATE TABLE teddy_360 (
    id INTEGER PRIMARY KEY,
    "userId" INTEGER,
    title TEXT,
    completed BOOLEAN
)
"#;

/// SQL schema for the migration bookkeeping table.
pub const CREATE_MIGRATIONS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS _migrations (
    version VARCHAR(32) PRIMARY KEY,
    name VARCHAR(255) NOT NULL,
    applied_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
)
"#;

/// Insert-or-update of one record keyed by id. Every non-key column is overwritten.
pub const UPSERT_TEDDY_360: &str = r#"
INSERT INTO teddy_360 (id, "userId", title, completed)
VALUES ($1, $2, $3, $4)
ON CONFLICT (id) DO UPDATE SET
    "userId" = EXCLUDED."userId",
    title = EXCLUDED.title,
    completed = EXCLUDED.completed
"#;

/// Reads every stored record ordered by id.
pub const SELECT_TEDDY_360: &str =
    r#"SELECT id, "userId", title, completed FROM teddy_360 ORDER BY id"#;

/// One versioned schema change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Migration {
    /// Sortable version key, e.g. `0001`.
    pub version: &'static str,
    /// Short description.
    pub name: &'static str,
    /// Statements applied in order.
    pub statements: &'static [&'static str],
}

/// All migrations, oldest first.
pub const MIGRATIONS: &[Migration] = &[Migration {
    version: "0001",
    name: "create_teddy_360",
    statements: &[CREATE_TEDDY_360_TABLE],
}];

/// Table names referenced outside the SQL constants.
pub mod tables {
    /// Applied migration versions.
    pub const MIGRATIONS: &str = "_migrations";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_are_ordered_and_unique() {
        let versions: Vec<&str> = MIGRATIONS.iter().map(|m| m.version).collect();
        let mut sorted = versions.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(versions, sorted);
    }

    #[test]
    fn test_first_migration_creates_table() {
        let first = &MIGRATIONS[0];
        assert_eq!(first.version, "0001");
        assert!(first.statements[0].contains("CREATE TABLE teddy_360"));
        assert!(first.statements[0].contains("id INTEGER PRIMARY KEY"));
        assert!(first.statements[0].contains("\"userId\" INTEGER"));
    }

    #[test]
    fn test_upsert_overwrites_every_column() {
        for column in ["\"userId\"", "title", "completed"] {
            assert!(
                UPSERT_TEDDY_360.contains(&format!("{column} = EXCLUDED.{column}")),
                "{column} not overwritten"
            );
        }
        assert!(UPSERT_TEDDY_360.contains("ON CONFLICT (id)"));
    }

    #[test]
    fn test_record_json_uses_user_id_camel_case() {
        let record = Teddy360 {
            id: 1,
            user_id: 7,
            title: "a".to_string(),
            completed: true,
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["userId"], 7);
        assert!(json.get("user_id").is_none());
    }

    #[test]
    fn test_migrations_table_name() {
        assert_eq!(tables::MIGRATIONS, "_migrations");
    }
}
