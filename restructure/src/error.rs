use std::{error, fmt, result};

/// Type alias for convenience when using the Result type with our error.
pub type RestructureResult<T> = result::Result<T, RestructureError>;

/// Internal error representation with kind, description and optional source.
///
/// Boxed so the public error type stays one pointer wide on the success path.
struct ErrorInner {
    kind: ErrorKind,
    description: &'static str,
    detail: Option<String>,
    source: Option<Box<dyn error::Error + Send + Sync>>,
}

/// Classification of restructure pipeline failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// Source storage listing or read failure.
    SourceIo,
    /// Target storage write, move or delete failure.
    TargetIo,
    /// Local staging file failure.
    StagingIo,
    /// A source Avro file could not be decoded.
    CorruptSource,
    /// A pre-existing target file could not be read back.
    CorruptTarget,
    /// A source file name does not carry a valid offset range.
    InvalidFileName,
    /// A record is missing the fields the path factory needs.
    MalformedRecord,
    /// Durable offset or bin state could not be written.
    AccountantWriteFailed,
    /// Durable offset or bin state could not be read back.
    AccountantReadFailed,
    /// Redis lock acquisition or release failed at the transport level.
    LockUnavailable,
    /// A worker task panicked or was cancelled.
    WorkerFailed,
    /// Configuration rejected at startup.
    InvalidConfiguration,
    /// The operation cannot run in the current state.
    InvalidState,
}

/// A stable error type for the restructure library.
///
/// Carries a machine-readable [`ErrorKind`], a static description, optional
/// dynamic detail, and an optional source error.
pub struct RestructureError(Box<ErrorInner>);

impl RestructureError {
    /// Returns the error kind.
    pub fn kind(&self) -> ErrorKind {
        self.0.kind
    }

    /// Attaches a source error, keeping kind and description.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: Into<Box<dyn error::Error + Send + Sync>>,
    {
        self.0.source = Some(source.into());
        self
    }

    /// Returns true when retrying the whole pass may succeed.
    ///
    /// Transient storage and lock transport failures qualify; corrupt data and
    /// configuration problems do not.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.0.kind,
            ErrorKind::SourceIo
                | ErrorKind::TargetIo
                | ErrorKind::StagingIo
                | ErrorKind::LockUnavailable
        )
    }
}

impl From<(ErrorKind, &'static str)> for RestructureError {
    fn from((kind, description): (ErrorKind, &'static str)) -> Self {
        RestructureError(Box::new(ErrorInner {
            kind,
            description,
            detail: None,
            source: None,
        }))
    }
}

impl From<(ErrorKind, &'static str, String)> for RestructureError {
    fn from((kind, description, detail): (ErrorKind, &'static str, String)) -> Self {
        RestructureError(Box::new(ErrorInner {
            kind,
            description,
            detail: Some(detail),
            source: None,
        }))
    }
}

impl From<std::io::Error> for RestructureError {
    fn from(err: std::io::Error) -> Self {
        RestructureError::from((ErrorKind::StagingIo, "i/o operation failed")).with_source(err)
    }
}

impl fmt::Debug for RestructureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RestructureError")
            .field("kind", &self.0.kind)
            .field("description", &self.0.description)
            .field("detail", &self.0.detail)
            .field("source", &self.0.source)
            .finish()
    }
}

impl fmt::Display for RestructureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.description)?;
        if let Some(detail) = &self.0.detail {
            write!(f, ": {detail}")?;
        }
        Ok(())
    }
}

impl error::Error for RestructureError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        self.0
            .source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn error::Error + 'static))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::restructure_error;

    #[test]
    fn display_includes_detail() {
        let err = restructure_error!(
            ErrorKind::InvalidFileName,
            "invalid source file name",
            "missing offsets"
        );
        assert_eq!(
            err.to_string(),
            "invalid source file name: missing offsets"
        );
        assert_eq!(err.kind(), ErrorKind::InvalidFileName);
    }

    #[test]
    fn io_errors_are_retryable() {
        let err: RestructureError = std::io::Error::other("disk unhappy").into();
        assert!(err.is_retryable());
    }

    #[test]
    fn corrupt_source_is_not_retryable() {
        let err = restructure_error!(ErrorKind::CorruptSource, "bad avro block");
        assert!(!err.is_retryable());
    }
}
