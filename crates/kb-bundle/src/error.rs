//! Bundle and source error types.

use thiserror::Error;

pub type BundleResult<T> = Result<T, BundleError>;

#[derive(Debug, Error)]
pub enum BundleError {
    #[error("bundle not found: {0}")]
    NotFound(String),

    #[error("operation not implemented for {0}")]
    NotImplemented(String),

    #[error("invalid bundle archive: {0}")]
    Archive(String),

    #[error("invalid application document: {0}")]
    Document(String),

    #[error("invalid source: {0}")]
    InvalidSource(String),

    #[error("http error: {0}")]
    Http(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl BundleError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, BundleError::NotFound(_))
    }
}

impl From<zip::result::ZipError> for BundleError {
    fn from(e: zip::result::ZipError) -> Self {
        BundleError::Archive(e.to_string())
    }
}

impl From<reqwest::Error> for BundleError {
    fn from(e: reqwest::Error) -> Self {
        BundleError::Http(e.to_string())
    }
}
