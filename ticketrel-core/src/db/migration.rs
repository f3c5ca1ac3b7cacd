//! Schema installation and upgrade
//!
//! Migrations are embedded in the binary and applied in version order. Each
//! applied migration is recorded in `schema_version`, so running the upgrade
//! on an up-to-date database is a no-op.

use rusqlite::{params, Connection};

use crate::error::Result;

/// A single embedded migration
struct Migration {
    version: i32,
    name: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "001_tickets",
        sql: include_str!("migrations/001_tickets.sql"),
    },
    Migration {
        version: 2,
        name: "002_relations",
        sql: include_str!("migrations/002_relations.sql"),
    },
];

/// Latest schema version known to this build
pub const SCHEMA_VERSION: i32 = 2;

fn ensure_version_table(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL
        )",
        [],
    )?;
    Ok(())
}

/// Returns the highest applied schema version, 0 for a fresh database
pub fn current_version(conn: &Connection) -> Result<i32> {
    ensure_version_table(conn)?;
    let version: Option<i32> =
        conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| {
            row.get(0)
        })?;
    Ok(version.unwrap_or(0))
}

/// True if any migration is still pending
pub fn needs_upgrade(conn: &Connection) -> Result<bool> {
    Ok(current_version(conn)? < SCHEMA_VERSION)
}

/// Applies all pending migrations, returning how many were applied
pub fn upgrade(conn: &mut Connection) -> Result<usize> {
    let current = current_version(conn)?;
    let mut applied = 0;

    for migration in MIGRATIONS.iter().filter(|m| m.version > current) {
        log::info!(
            "Applying migration: {} (version {})",
            migration.name,
            migration.version
        );

        let tx = conn.transaction()?;
        tx.execute_batch(migration.sql)?;
        tx.execute(
            "INSERT INTO schema_version (version, name, applied_at) VALUES (?1, ?2, ?3)",
            params![
                migration.version,
                migration.name,
                chrono::Utc::now().to_rfc3339()
            ],
        )?;
        tx.commit()?;
        applied += 1;
    }

    if applied > 0 {
        log::info!("Schema upgraded to version {}", SCHEMA_VERSION);
    } else {
        log::debug!("Schema already at version {}", current);
    }
    Ok(applied)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_exists(conn: &Connection, name: &str) -> bool {
        conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            [name],
            |row| row.get::<_, i64>(0),
        )
        .unwrap()
            == 1
    }

    #[test]
    fn test_fresh_install() {
        let mut conn = Connection::open_in_memory().unwrap();
        assert_eq!(current_version(&conn).unwrap(), 0);
        assert!(needs_upgrade(&conn).unwrap());

        let applied = upgrade(&mut conn).unwrap();
        assert_eq!(applied, MIGRATIONS.len());
        assert_eq!(current_version(&conn).unwrap(), SCHEMA_VERSION);
        assert!(table_exists(&conn, "relation"));
        assert!(table_exists(&conn, "ticket_custom"));
        assert!(!needs_upgrade(&conn).unwrap());
    }

    #[test]
    fn test_upgrade_is_idempotent() {
        let mut conn = Connection::open_in_memory().unwrap();
        upgrade(&mut conn).unwrap();
        assert_eq!(upgrade(&mut conn).unwrap(), 0);
    }

    #[test]
    fn test_reinstall_after_revert() {
        let mut conn = Connection::open_in_memory().unwrap();
        upgrade(&mut conn).unwrap();

        // Roll the relations schema back and upgrade again
        conn.execute_batch(
            "DROP TABLE relation; DELETE FROM schema_version WHERE version = 2;",
        )
        .unwrap();
        assert!(needs_upgrade(&conn).unwrap());

        assert_eq!(upgrade(&mut conn).unwrap(), 1);
        assert!(table_exists(&conn, "relation"));
    }
}
