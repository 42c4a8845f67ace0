// Findoc Infrastructure - SQLite Adapter
// Implements: WorkQueue, Maintenance

mod connection;
mod error;
mod maintenance_impl;
mod migration;
mod work_queue;

pub use connection::create_pool;
pub use maintenance_impl::SqliteMaintenance;
pub use migration::run_migrations;
pub use work_queue::SqliteWorkQueue;

// Note: sqlx::Error conversion is handled by wrapping in helper functions
// due to Rust's orphan rules (cannot implement From<sqlx::Error> for AppError here)
