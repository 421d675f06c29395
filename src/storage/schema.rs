//! Database schema constants.
//!
//! All SQL DDL for the SQLite storage backend lives here. Statements are
//! idempotent so the migration runner can re-apply them safely.

/// SQL schema for creating the jobs table.
pub const CREATE_JOBS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS jobs (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    job_type TEXT NOT NULL,
    status TEXT NOT NULL,
    title TEXT NOT NULL,
    payload TEXT NOT NULL,
    progress INTEGER NOT NULL DEFAULT 0,
    result TEXT,
    error_message TEXT,
    error_code TEXT,
    retried_as TEXT,
    reclaims INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    started_at TEXT,
    completed_at TEXT
)
"#;

/// Index used by the dispatcher's FIFO scans.
pub const CREATE_STATUS_CREATED_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_jobs_status_created ON jobs(status, created_at)
"#;

/// Index used by per-user quota counts.
pub const CREATE_USER_STATUS_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_jobs_user_status ON jobs(user_id, status)
"#;

/// Returns all schema statements in application order.
pub fn all_schema_statements() -> Vec<&'static str> {
    vec![
        CREATE_JOBS_TABLE,
        CREATE_STATUS_CREATED_INDEX,
        CREATE_USER_STATUS_INDEX,
    ]
}
