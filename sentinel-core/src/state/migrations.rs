//! Database migrations

use rusqlite::Connection;

use crate::Result;

/// Run all migrations on the database
pub fn run_migrations(conn: &Connection) -> Result<()> {
    // WAL for concurrent readers alongside the single writer
    conn.execute_batch("PRAGMA journal_mode=WAL;")?;
    // Handle concurrent opens gracefully
    conn.busy_timeout(std::time::Duration::from_secs(5))?;
    // Relationship cascade depends on FK enforcement
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;

    conn.execute_batch(super::schema::SCHEMA)?;

    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn test_migrations_run_successfully() {
        let conn = Connection::open_in_memory().expect("should open in-memory db");
        run_migrations(&conn).expect("migrations should succeed");

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .expect("should prepare statement")
            .query_map([], |row| row.get(0))
            .expect("should execute query")
            .filter_map(|r| r.ok())
            .collect();

        assert!(tables.contains(&"entities".to_string()));
        assert!(tables.contains(&"entity_relationships".to_string()));
        assert!(tables.contains(&"tool_executions".to_string()));
    }

    #[test]
    fn test_foreign_keys_enabled() {
        let conn = Connection::open_in_memory().expect("should open in-memory db");
        run_migrations(&conn).expect("migrations should succeed");

        let fk_enabled: bool = conn
            .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
            .expect("should query pragma");
        assert!(fk_enabled, "foreign_keys should be enabled after migrations");
    }

    #[test]
    fn test_migrations_idempotent() {
        let conn = Connection::open_in_memory().expect("should open in-memory db");
        run_migrations(&conn).expect("first migration should succeed");
        run_migrations(&conn).expect("second migration should also succeed");
    }
}
