//! SQL schema for the VM store.

pub const SCHEMA_VERSION: i32 = 1;

pub fn all_schemas() -> &'static [&'static str] {
    &[
        "CREATE TABLE IF NOT EXISTS schema_version (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            version INTEGER NOT NULL,
            updated_at TEXT NOT NULL
        );",
        "CREATE TABLE IF NOT EXISTS vms (
            id TEXT PRIMARY KEY,
            language TEXT NOT NULL,
            status TEXT NOT NULL,
            created_at TEXT NOT NULL,
            data TEXT NOT NULL
        );",
    ]
}
