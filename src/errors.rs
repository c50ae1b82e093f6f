use std::time::Duration;

use aws_sdk_rds::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("AWS authentication failed during {operation}: {message}")]
    Auth {
        operation: &'static str,
        message: String,
    },

    #[error("AWS API error during {operation}: {message}")]
    Api {
        operation: &'static str,
        code: Option<String>,
        message: String,
    },

    #[error("Invalid AWS request for {operation}: {message}")]
    InvalidRequest {
        operation: &'static str,
        message: String,
    },

    #[error("Resource not found during {operation}: {message}")]
    NotFound {
        operation: &'static str,
        message: String,
    },

    #[error("Command execution failed: {program} exited with {status}")]
    Command { program: String, status: String },

    #[error("No snapshots found for instance \"{0}\"")]
    NoSnapshot(String),

    #[error("Instance \"{instance_id}\" did not become available within {}s", timeout.as_secs())]
    AvailabilityTimeout {
        instance_id: String,
        timeout: Duration,
    },

    #[error("Can't handle databases of engine \"{0}\"")]
    UnsupportedEngine(String),

    #[error("No database names given, configured, or reported by instance \"{0}\"")]
    NoDatabases(String),

    #[error("Instance \"{instance_id}\" is not usable: {reason}")]
    InvalidInstance { instance_id: String, reason: String },

    #[error("Archive creation failed: {0}")]
    Archive(String),

    #[error("Temporary instance \"{instance_id}\" may still be running: {source}")]
    CleanupFailed {
        instance_id: String,
        #[source]
        source: Box<AppError>,
    },

    #[error("Interrupted by signal")]
    Interrupted,

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl AppError {
    /// Failures the retry wrapper is allowed to try again.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AppError::Auth { .. } | AppError::Api { .. } | AppError::Command { .. }
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, AppError::NotFound { .. })
    }

    /// Process exit status reported to the operator.
    pub fn exit_code(&self) -> u8 {
        match self {
            AppError::NoSnapshot(_) => 2,
            AppError::AvailabilityTimeout { .. } => 3,
            AppError::UnsupportedEngine(_) => 4,
            AppError::CleanupFailed { .. } => 5,
            AppError::Interrupted => 130,
            _ => 1,
        }
    }
}

/// Error codes RDS returns when the request signature or keys are rejected.
const AUTH_CODES: &[&str] = &[
    "InvalidClientTokenId",
    "SignatureDoesNotMatch",
    "UnrecognizedClientException",
    "ExpiredToken",
    "ExpiredTokenException",
    "IncompleteSignature",
    "MissingAuthenticationToken",
    "AuthFailure",
];

const NOT_FOUND_CODES: &[&str] = &["DBInstanceNotFound", "DBSnapshotNotFound"];

/// Classify an RDS SDK error by its service error code.
pub fn classify_sdk_error<E, R>(operation: &'static str, err: SdkError<E, R>) -> AppError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
    R: std::fmt::Debug,
{
    if let SdkError::ConstructionFailure(_) = &err {
        return AppError::InvalidRequest {
            operation,
            message: DisplayErrorContext(&err).to_string(),
        };
    }

    let code = err.code().map(str::to_string);
    let message = err
        .message()
        .map(str::to_string)
        .unwrap_or_else(|| DisplayErrorContext(&err).to_string());

    classify_error_code(operation, code, message)
}

fn classify_error_code(operation: &'static str, code: Option<String>, message: String) -> AppError {
    match code.as_deref() {
        Some(c) if AUTH_CODES.contains(&c) => AppError::Auth { operation, message },
        Some(c) if NOT_FOUND_CODES.contains(&c) => AppError::NotFound { operation, message },
        _ => AppError::Api {
            operation,
            code,
            message,
        },
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
