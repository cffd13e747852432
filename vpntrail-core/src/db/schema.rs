//! Output database schema
//!
//! Every run writes a fresh SQLite file. The table and column names match what
//! existing forensic reports query, including the `startTS`/`stopTS`/`Proxy`
//! casing. Versioned via PRAGMA user_version like any other migration set.

use rusqlite::Connection;

/// Current schema version
pub const SCHEMA_VERSION: i32 = 1;

/// SQL migrations, indexed by version number
const MIGRATIONS: &[&str] = &[
    // Version 1: result tables
    r#"
    -- Visit timeline copied out of the browser
    CREATE TABLE IF NOT EXISTS history (
        id               INTEGER,
        visit_time       INTEGER,
        url              TEXT,
        title            TEXT
    );

    -- Reconstructed VPN sessions
    CREATE TABLE IF NOT EXISTS vpn (
        id               INTEGER,
        startTS          INTEGER,
        stopTS           INTEGER,
        Proxy            LONGVARCHAR
    );

    -- Visits made while a session was active
    CREATE TABLE IF NOT EXISTS vpn_history (
        visit_time       TEXT,
        url              TEXT,
        title            TEXT,
        Proxy            LONGVARCHAR
    );

    CREATE INDEX IF NOT EXISTS idx_history_visit_time ON history(visit_time);
    "#,
];

/// ZenMate node reference table, created only for ZenMate runs.
pub const PROXY_LIST_DDL: &str = r#"
    CREATE TABLE IF NOT EXISTS proxy_list (
        id               INTEGER,
        country_code     LONGVARCHAR,
        URLs             LONGVARCHAR,
        IPs              LONGVARCHAR
    );
"#;

/// Run all pending migrations
pub fn run_migrations(conn: &Connection) -> crate::error::Result<()> {
    let current_version = get_schema_version(conn)?;

    tracing::debug!(
        current_version,
        target_version = SCHEMA_VERSION,
        "Checking database migrations"
    );

    for (i, migration) in MIGRATIONS.iter().enumerate() {
        let version = (i + 1) as i32;
        if version > current_version {
            tracing::debug!(version, "Running migration");
            conn.execute_batch(migration)?;
            conn.execute_batch(&format!("PRAGMA user_version = {}", version))?;
        }
    }

    Ok(())
}

/// Get the current schema version from the database
pub fn get_schema_version(conn: &Connection) -> crate::error::Result<i32> {
    let version: i32 = conn.query_row("PRAGMA user_version", [], |r| r.get(0))?;
    Ok(version)
}
