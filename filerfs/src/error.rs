use std::io;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FilerError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("directory listing is disabled")]
    DirListingDisabled,

    #[error("range not satisfiable: {0}")]
    RangeUnsatisfiable(String),

    #[error("lookup file id {file_id}: {reason}")]
    Location { file_id: String, reason: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("decrypt {file_id}: {reason}")]
    Decrypt { file_id: String, reason: String },

    #[error("chunk layout error: {0}")]
    Integrity(String),

    #[error("fail to dial {addr}: {reason}")]
    Dial { addr: String, reason: String },

    #[error("internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("http error: {0}")]
    Http(#[from] axum::http::Error),
}

impl FilerError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            // Location and decrypt failures are reported as missing content.
            Self::NotFound(_) | Self::Location { .. } | Self::Decrypt { .. } => {
                StatusCode::NOT_FOUND
            }
            Self::DirListingDisabled => StatusCode::METHOD_NOT_ALLOWED,
            Self::RangeUnsatisfiable(_) => StatusCode::RANGE_NOT_SATISFIABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Maps the error onto the errno reported through the FUSE channel.
    pub fn errno(&self) -> libc::c_int {
        match self {
            Self::NotFound(_) => libc::ENOENT,
            Self::DirListingDisabled => libc::EACCES,
            _ => libc::EIO,
        }
    }

    /// True when the failure only means the peer hung up mid-stream.
    pub fn is_disconnect(&self) -> bool {
        matches!(self, Self::Io(e) if e.kind() == io::ErrorKind::BrokenPipe)
    }
}

impl From<reqwest::Error> for FilerError {
    fn from(e: reqwest::Error) -> Self {
        FilerError::Transport(e.to_string())
    }
}

impl IntoResponse for FilerError {
    fn into_response(self) -> Response {
        let status_code = self.status_code();
        match status_code {
            StatusCode::INTERNAL_SERVER_ERROR => {
                tracing::error!("Generating response for FilerError: {:?}", self)
            }
            _ => tracing::debug!("Generating response for FilerError: {:?}", self),
        }

        let message = match &self {
            Self::NotFound(_) | Self::Location { .. } | Self::Decrypt { .. } => "not found",
            Self::DirListingDisabled => "directory listing is disabled",
            Self::RangeUnsatisfiable(_) => "requested range not satisfiable",
            _ => "an internal server error occurred",
        };
        (status_code, message).into_response()
    }
}

pub type FilerResult<T> = Result<T, FilerError>;
