//! Mapping of SQLx failures onto the driver error taxonomy.

use crate::error::DriverError;
use crate::traits::BackendKind;

/// SQLSTATE classes that mean the session itself is unusable.
///
/// `08` connection exception, `28` invalid authorization, `57P` operator
/// intervention (admin shutdown, crash shutdown, cannot connect now).
fn is_connectivity_sqlstate(code: &str) -> bool {
    code.starts_with("08") || code.starts_with("28") || code.starts_with("57P")
}

/// MySQL server error numbers that mean the session is gone.
fn is_connectivity_mysql_errno(errno: u16) -> bool {
    matches!(
        errno,
        1040 // too many connections
            | 1045 // access denied
            | 1152 // aborted connection
            | 1153 // packet too large, connection dropped
            | 1158..=1161 // network read/write errors
            | 2006 // server has gone away
            | 2013 // lost connection during query
    )
}

/// Classify a SQLx error.
///
/// # Arguments
///
/// * `backend` - Backend the error came from
/// * `err` - The SQLx error
/// * `sql` - The statement being run, if any
pub(crate) fn classify_sqlx(backend: BackendKind, err: sqlx::Error, sql: Option<&str>) -> DriverError {
    match err {
        sqlx::Error::Database(db) => {
            let sqlstate = db.code().map(|c| c.into_owned()).unwrap_or_default();
            let errno = db
                .try_downcast_ref::<sqlx::mysql::MySqlDatabaseError>()
                .map(|e| e.number());

            let connectivity = is_connectivity_sqlstate(&sqlstate)
                || errno.is_some_and(is_connectivity_mysql_errno);

            let message = if sqlstate.is_empty() {
                db.message().to_string()
            } else {
                format!("{} (SQLSTATE {})", db.message(), sqlstate)
            };

            if connectivity {
                DriverError::connectivity(backend, message, sql)
            } else {
                DriverError::syntax(backend, message, sql.unwrap_or_default())
            }
        }
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::Protocol(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => DriverError::connectivity(backend, err.to_string(), sql),
        sqlx::Error::Configuration(e) => DriverError::Config(e.to_string()),
        other => DriverError::protocol(backend, other.to_string()),
    }
}
