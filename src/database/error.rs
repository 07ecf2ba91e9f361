use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[error("{kind}")]
pub struct DatabaseError {
    pub kind: DatabaseErrorKind,
}

#[derive(Debug, Clone, Error)]
pub enum DatabaseErrorKind {
    #[error("database connection error: {message}")]
    ConnectionError { message: String },

    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    #[error("unique constraint violated: {message}")]
    UniqueViolation { message: String },

    #[error("query failed: {message}")]
    QueryError { message: String },

    #[error("database error: {message}")]
    Unknown { message: String },
}

impl DatabaseError {
    pub fn new(kind: DatabaseErrorKind) -> Self {
        Self { kind }
    }

    pub fn not_found(entity: &str, id: impl ToString) -> Self {
        Self::new(DatabaseErrorKind::NotFound {
            entity: entity.to_string(),
            id: id.to_string(),
        })
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self.kind, DatabaseErrorKind::ConnectionError { .. })
    }

    #[cfg(feature = "database")]
    pub fn from_sqlx(err: sqlx::Error) -> Self {
        let kind = match &err {
            sqlx::Error::RowNotFound => DatabaseErrorKind::NotFound {
                entity: "row".to_string(),
                id: "unknown".to_string(),
            },
            sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::Io(_)
            | sqlx::Error::Tls(_) => DatabaseErrorKind::ConnectionError {
                message: err.to_string(),
            },
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                DatabaseErrorKind::UniqueViolation {
                    message: db_err.message().to_string(),
                }
            }
            sqlx::Error::Database(db_err) => DatabaseErrorKind::QueryError {
                message: db_err.message().to_string(),
            },
            _ => DatabaseErrorKind::Unknown {
                message: err.to_string(),
            },
        };
        Self::new(kind)
    }
}

impl From<DatabaseError> for crate::error::AppError {
    fn from(err: DatabaseError) -> Self {
        use crate::error::{AppError, AppErrorKind, DomainError, InfrastructureError};

        match err.kind {
            DatabaseErrorKind::NotFound { id, .. } => AppError::new(AppErrorKind::Domain(
                DomainError::TransactionNotFound { transaction_id: id },
            )),
            _ => AppError::new(AppErrorKind::Infrastructure(InfrastructureError::Database {
                is_retryable: err.is_retryable(),
                message: err.to_string(),
            })),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_errors_are_retryable() {
        let err = DatabaseError::new(DatabaseErrorKind::ConnectionError {
            message: "refused".to_string(),
        });
        assert!(err.is_retryable());
        assert!(!DatabaseError::not_found("transaction", "abc").is_retryable());
    }

    #[test]
    fn not_found_maps_to_domain_error() {
        let app: crate::error::AppError = DatabaseError::not_found("transaction", "abc").into();
        assert_eq!(app.status_code(), 404);
    }
}
