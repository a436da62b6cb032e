use crate::Error;
use std::io;
use thiserror::Error as ThisError;

/// Failures raised by tally itself, they travel inside [`crate::Error`] and can be
/// recovered with `error.downcast_ref::<DataError>()`.
#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
pub enum DataError {
    /// Order direction other than ASC or DESC, raised while building the statement.
    #[error("Order must be ASC or DESC, found `{0}`")]
    InvalidOrder(String),
    #[error("Multiple rows found.")]
    MultipleRows,
    #[error("The count query did not return a numeric `count` column")]
    MissingCount,
    #[error("Cannot update `{0}` without any column to set")]
    EmptyRecord(String),
}

/// Error reported by an executor that carries a driver error code
/// (`PROTOCOL_CONNECTION_LOST`, `EPIPE`, `ER_DUP_ENTRY`...).
#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
#[error("{code}: {message}")]
pub struct TransportError {
    pub code: String,
    pub message: String,
}

impl TransportError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

/// How the database reacts to an execution error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// The logical connection is gone, reconnect right away.
    ConnectionLost,
    /// Broken pipe or refused connection, reconnect after a delay.
    Transient,
    /// Constraint violations (duplicate key, not null), nothing to do.
    Benign,
    Unknown,
}

impl ErrorClass {
    pub fn from_code(code: &str) -> Self {
        match code {
            "PROTOCOL_CONNECTION_LOST" => ErrorClass::ConnectionLost,
            "EPIPE" | "ECONNREFUSED" => ErrorClass::Transient,
            "ER_DUP_ENTRY" | "ER_BAD_NULL_ERROR" => ErrorClass::Benign,
            _ => ErrorClass::Unknown,
        }
    }

    pub fn from_io_kind(kind: io::ErrorKind) -> Self {
        match kind {
            io::ErrorKind::BrokenPipe | io::ErrorKind::ConnectionRefused => ErrorClass::Transient,
            io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected
            | io::ErrorKind::UnexpectedEof => ErrorClass::ConnectionLost,
            _ => ErrorClass::Unknown,
        }
    }

    /// Walks the error chain and returns the first known classification.
    pub fn of(error: &Error) -> Self {
        error
            .chain()
            .map(|cause| {
                if let Some(e) = cause.downcast_ref::<TransportError>() {
                    ErrorClass::from_code(&e.code)
                } else if let Some(e) = cause.downcast_ref::<io::Error>() {
                    ErrorClass::from_io_kind(e.kind())
                } else {
                    ErrorClass::Unknown
                }
            })
            .find(|v| *v != ErrorClass::Unknown)
            .unwrap_or(ErrorClass::Unknown)
    }
}
