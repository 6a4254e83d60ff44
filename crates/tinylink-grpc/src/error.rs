use thiserror::Error;
use tinylink_core::{ShortenerError, StorageError};
use tinylink_proto_schema::v1::ConversionError;
use tinylink_session::SessionError;
use tonic::{Code, Status};

#[derive(Debug, Error)]
pub enum GrpcError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// Carries the existing short url.
    #[error("{0}")]
    AlreadyExists(String),
    #[error("short code not found")]
    NotFound,
    #[error("short code has been deleted")]
    Deleted,
    #[error("the client IP address is not on a trusted subnet")]
    PermissionDenied,
    #[error(transparent)]
    Shortener(#[from] ShortenerError),
    #[error(transparent)]
    Session(#[from] SessionError),
}

impl From<ConversionError> for GrpcError {
    fn from(error: ConversionError) -> Self {
        GrpcError::InvalidArgument(error.to_string())
    }
}

fn storage_code(error: &StorageError) -> Code {
    match error {
        StorageError::Timeout(_) => Code::DeadlineExceeded,
        StorageError::Unavailable(_) | StorageError::NotApplicable(_) => Code::Unavailable,
        StorageError::Conflict { .. } => Code::AlreadyExists,
        _ => Code::Internal,
    }
}

impl GrpcError {
    pub fn code(&self) -> Code {
        match self {
            GrpcError::InvalidArgument(_) => Code::InvalidArgument,
            GrpcError::AlreadyExists(_) => Code::AlreadyExists,
            GrpcError::NotFound => Code::NotFound,
            GrpcError::Deleted => Code::FailedPrecondition,
            GrpcError::PermissionDenied => Code::PermissionDenied,
            GrpcError::Shortener(err) => match err {
                ShortenerError::InvalidUrl(_) | ShortenerError::InvalidShortCode(_) => {
                    Code::InvalidArgument
                }
                ShortenerError::QueueClosed => Code::Unavailable,
                ShortenerError::Storage(source) => storage_code(source),
            },
            GrpcError::Session(SessionError::Storage(source)) => storage_code(source),
            GrpcError::Session(_) => Code::Internal,
        }
    }
}

impl From<GrpcError> for Status {
    fn from(error: GrpcError) -> Self {
        Status::new(error.code(), error.to_string())
    }
}
