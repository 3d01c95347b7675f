//! Database schema definitions
//!
//! This module contains the SQL schema for the checkpoint database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- One row per code: the resume cursor and its status
CREATE TABLE IF NOT EXISTS progress (
    code TEXT PRIMARY KEY,
    status TEXT NOT NULL,
    current_page INTEGER NOT NULL DEFAULT 0,
    variant TEXT,
    attempts INTEGER NOT NULL DEFAULT 0,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_progress_status ON progress(status);

-- One row per failing (code, variant); deleted when the variant succeeds
CREATE TABLE IF NOT EXISTS failures (
    code TEXT NOT NULL,
    variant TEXT NOT NULL,
    error_message TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (code, variant)
);
"#;

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
