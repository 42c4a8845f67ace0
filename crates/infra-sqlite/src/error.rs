// sqlx::Error -> AppError / EnqueueError mapping

use findoc_core::error::AppError;
use findoc_core::port::EnqueueError;

/// Convert sqlx::Error to AppError with the SQLite result code when present
pub(crate) fn map_sqlx_error(err: sqlx::Error) -> AppError {
    match &err {
        sqlx::Error::Database(db_err) => {
            // SQLite result codes: https://www.sqlite.org/rescode.html
            match db_err.code().as_deref() {
                Some("2067") | Some("1555") => AppError::Database(format!(
                    "Unique constraint violation: {}",
                    db_err.message()
                )),
                Some("5") => AppError::Database(format!(
                    "Database locked (SQLITE_BUSY): {}",
                    db_err.message()
                )),
                Some("13") => AppError::Database(format!("Database full: {}", db_err.message())),
                Some(code) => {
                    AppError::Database(format!("Database error [{}]: {}", code, db_err.message()))
                }
                None => AppError::Database(format!("Database error: {}", db_err.message())),
            }
        }
        sqlx::Error::RowNotFound => AppError::Database("Row not found".to_string()),
        sqlx::Error::ColumnNotFound(col) => AppError::Database(format!("Column not found: {}", col)),
        // Connection, pool, protocol errors
        _ => AppError::Database(err.to_string()),
    }
}

/// Enqueue failures: constraint violations are rejections, the rest means
/// the queue is not reachable
pub(crate) fn map_enqueue_error(err: sqlx::Error) -> EnqueueError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_unique_violation() || db_err.is_check_violation() {
            return EnqueueError::Rejected(db_err.message().to_string());
        }
    }
    EnqueueError::Unavailable(map_sqlx_error(err).to_string())
}
