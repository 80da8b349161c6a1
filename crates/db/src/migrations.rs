/// Inline SQL migrations for the jobtrail database schema.
///
/// We use simple inline migrations rather than sqlx migration files
/// because the schema is small and self-contained.

pub const MIGRATIONS: &[&str] = &[
    // Migration 1: jobs event log. Append-only — rows are never updated
    // or deleted; the largest id per message_id is the current snapshot.
    r#"
CREATE TABLE IF NOT EXISTS jobs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    message_id TEXT NOT NULL,
    account_id INTEGER NOT NULL,
    payload TEXT NOT NULL DEFAULT '{}',
    status TEXT,
    created_at INTEGER NOT NULL
);
"#,
    // Migration 2: jobs indexes
    r#"CREATE INDEX IF NOT EXISTS idx_jobs_message ON jobs(message_id, id DESC);"#,
    r#"CREATE INDEX IF NOT EXISTS idx_jobs_account ON jobs(account_id);"#,
    // Migration 3: service registry
    r#"
CREATE TABLE IF NOT EXISTS services (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    description TEXT,
    created_at INTEGER NOT NULL
);
"#,
];
