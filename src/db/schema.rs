//! SQL schema for the persistent store.

/// Four durable containers. The two outbox tables use AUTOINCREMENT so ids are
/// never reused and id order equals append order.
pub const SCHEMA: &str = r#"
-- Pending order writes
CREATE TABLE IF NOT EXISTS orders (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    payload TEXT NOT NULL,
    created_at TEXT NOT NULL,
    attempts INTEGER NOT NULL DEFAULT 0
);

-- Pending activity writes
CREATE TABLE IF NOT EXISTS user_activity (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    payload TEXT NOT NULL,
    created_at TEXT NOT NULL,
    attempts INTEGER NOT NULL DEFAULT 0
);

-- Read entities mirrored from the server, keyed by product id
CREATE TABLE IF NOT EXISTS products (
    key TEXT PRIMARY KEY,
    idx TEXT,
    data BLOB NOT NULL,
    stored_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_products_idx ON products(idx);

-- Local-only cart, never synced
CREATE TABLE IF NOT EXISTS cart (
    key TEXT PRIMARY KEY,
    idx TEXT,
    data BLOB NOT NULL,
    stored_at TEXT NOT NULL
);
"#;
