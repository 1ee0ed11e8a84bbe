//! `DatabaseAdapter` backed by the workspace's SQLite pool.

mod sqlite_native;

pub use sqlite_native::SqliteAdapter;
