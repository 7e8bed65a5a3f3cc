//! Database schema migrations for SQLite.
//!
//! Each migration transforms the schema from version N to N+1.

use rusqlite::Connection;

use crate::error::{Result, StoreError};

/// Current schema version.
pub const CURRENT_VERSION: u32 = 1;

/// Initialize or migrate the database schema. Idempotent.
pub fn migrate(conn: &mut Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
        [],
    )?;

    let current: u32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )?;

    if current > CURRENT_VERSION {
        return Err(StoreError::Migration(format!(
            "database schema version {} is newer than supported version {}",
            current, CURRENT_VERSION
        )));
    }

    if current < CURRENT_VERSION {
        let tx = conn.transaction()?;

        for version in (current + 1)..=CURRENT_VERSION {
            apply_migration(&tx, version)?;

            tx.execute(
                "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
                rusqlite::params![version, crate::now_millis()],
            )?;
        }

        tx.commit()?;
        tracing::debug!(from = current, to = CURRENT_VERSION, "migrated session store schema");
    }

    Ok(())
}

fn apply_migration(conn: &Connection, version: u32) -> Result<()> {
    match version {
        1 => apply_v1(conn),
        _ => Err(StoreError::Migration(format!(
            "unknown migration version: {}",
            version
        ))),
    }
}

/// Migration v1: Initial schema.
///
/// Chain ids are TEXT so values above `i64::MAX` survive exactly.
fn apply_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- One session key per account, sealed at rest
        CREATE TABLE session_keys (
            chain_id TEXT NOT NULL,           -- decimal chain id
            account BLOB NOT NULL,            -- 20 bytes
            address BLOB NOT NULL,            -- 20 bytes, session key address
            sealed_secret BLOB NOT NULL,      -- CBOR SealedSecret
            updated_at INTEGER NOT NULL,

            PRIMARY KEY (chain_id, account)
        );

        -- One current grant per account
        CREATE TABLE session_grants (
            chain_id TEXT NOT NULL,
            account BLOB NOT NULL,
            grant_id BLOB NOT NULL,           -- 32 bytes, Blake3 content address
            redeemer BLOB NOT NULL,           -- 20 bytes
            grant_cbor BLOB NOT NULL,         -- PermissionGrant, verbatim
            updated_at INTEGER NOT NULL,

            PRIMARY KEY (chain_id, account)
        );

        -- Grants confirmed active on-chain. Rows are never deleted.
        CREATE TABLE activations (
            chain_id TEXT NOT NULL,
            account BLOB NOT NULL,
            redeemer BLOB NOT NULL,
            grant_id BLOB NOT NULL,
            activated_at INTEGER NOT NULL,

            PRIMARY KEY (chain_id, account, redeemer, grant_id)
        );
        "#,
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migration_creates_tables() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate(&mut conn).unwrap();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<Vec<_>, _>>()
            .unwrap();

        assert!(tables.contains(&"session_keys".to_string()));
        assert!(tables.contains(&"session_grants".to_string()));
        assert!(tables.contains(&"activations".to_string()));
        assert!(tables.contains(&"schema_migrations".to_string()));
    }

    #[test]
    fn test_migration_idempotent() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate(&mut conn).unwrap();
        migrate(&mut conn).unwrap();

        let version: u32 = conn
            .query_row("SELECT MAX(version) FROM schema_migrations", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(version, CURRENT_VERSION);
    }

    #[test]
    fn test_newer_schema_rejected() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate(&mut conn).unwrap();
        conn.execute(
            "INSERT INTO schema_migrations (version, applied_at) VALUES (99, 0)",
            [],
        )
        .unwrap();
        assert!(matches!(migrate(&mut conn), Err(StoreError::Migration(_))));
    }
}
