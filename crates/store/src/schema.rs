/// DDL applied once at connect time. Plain `CREATE TABLE IF NOT EXISTS`
/// rather than `sqlx::migrate!` — this keeps the store self-contained
/// without a migrations directory to version alongside the binary.
pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id          TEXT PRIMARY KEY,
    tier        TEXT NOT NULL,
    is_verified INTEGER NOT NULL DEFAULT 0,
    is_admin    INTEGER NOT NULL DEFAULT 0,
    created_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS jobs (
    id               TEXT PRIMARY KEY,
    user_id          TEXT NOT NULL,
    status           TEXT NOT NULL,
    topic            TEXT NOT NULL,
    requested_types  TEXT NOT NULL,
    fingerprint      TEXT NOT NULL,
    created_at       TEXT NOT NULL,
    started_at       TEXT,
    finished_at      TEXT,
    cancel_flag      INTEGER NOT NULL DEFAULT 0,
    last_event_seq   INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_jobs_user_id ON jobs(user_id);

CREATE TABLE IF NOT EXISTS artifacts (
    id          TEXT PRIMARY KEY,
    job_id      TEXT NOT NULL,
    user_id     TEXT NOT NULL,
    type        TEXT NOT NULL,
    content     TEXT,
    asset_uri   TEXT,
    fingerprint TEXT NOT NULL,
    metrics     TEXT NOT NULL,
    created_at  TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_artifacts_job_id ON artifacts(job_id);

CREATE TABLE IF NOT EXISTS settings (
    id                  INTEGER PRIMARY KEY CHECK (id = 1),
    moderation_version  INTEGER NOT NULL DEFAULT 0
);

INSERT OR IGNORE INTO settings (id, moderation_version) VALUES (1, 0);
"#;
