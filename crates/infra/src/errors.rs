//! Conversions from infrastructure error types into the domain error.

use calbridge_domain::CalbridgeError;

/// Newtype bridging foreign error types into [`CalbridgeError`].
#[derive(Debug)]
pub struct InfraError(pub CalbridgeError);

impl From<rusqlite::Error> for InfraError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(code, _)
                if code.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                InfraError(CalbridgeError::Conflict(err.to_string()))
            }
            _ => InfraError(CalbridgeError::Database(err.to_string())),
        }
    }
}

impl From<r2d2::Error> for InfraError {
    fn from(err: r2d2::Error) -> Self {
        InfraError(CalbridgeError::Database(format!("connection pool: {err}")))
    }
}

impl From<serde_json::Error> for InfraError {
    fn from(err: serde_json::Error) -> Self {
        InfraError(CalbridgeError::Database(format!("column serialization: {err}")))
    }
}

impl From<InfraError> for CalbridgeError {
    fn from(err: InfraError) -> Self {
        err.0
    }
}
