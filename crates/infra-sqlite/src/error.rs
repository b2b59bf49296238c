// sqlx::Error -> AppError mapping

use bookdigest_core::error::AppError;

/// Convert sqlx::Error to AppError, naming the SQLite result code where known
pub(crate) fn map_sqlx_error(err: sqlx::Error) -> AppError {
    match &err {
        sqlx::Error::Database(db_err) => {
            let message = db_err.message();

            // Extended result codes: https://www.sqlite.org/rescode.html
            match db_err.code().as_deref() {
                Some(code @ ("2067" | "1555")) => {
                    AppError::Database(format!("Unique constraint violation ({}): {}", code, message))
                }
                Some("1299") => AppError::Database(format!("Missing required column: {}", message)),
                Some("5" | "517") => AppError::Database(format!("Database locked (SQLITE_BUSY): {}", message)),
                Some("13") => AppError::Database(format!("Database full: {}", message)),
                Some(code) => AppError::Database(format!("Database error [{}]: {}", code, message)),
                None => AppError::Database(format!("Database error: {}", message)),
            }
        }
        sqlx::Error::PoolTimedOut => {
            AppError::Database("Timed out waiting for a database connection".to_string())
        }
        sqlx::Error::ColumnDecode { index, source } => {
            AppError::Database(format!("Cannot decode column {}: {}", index, source))
        }
        _ => AppError::Database(err.to_string()),
    }
}
