//! Error types for attribute and dataset marshaling.

use rustyescdf_store::StoreError;

/// Errors returned by every attribute, dataset and storage operation.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Unclassified failure.
    #[error("{0}")]
    Generic(String),
    /// Stored rank or extents differ from what the schema expects.
    #[error("shape mismatch: {0}")]
    Shape(String),
    /// Malformed call arguments, e.g. a dimension bound to the wrong spec.
    #[error("invalid argument: {0}")]
    Argument(String),
    /// An expected entry is absent from the container.
    #[error("not found: {0}")]
    NotFound(String),
    /// The value was never set or read.
    #[error("value not set: {0}")]
    NotSet(String),
    /// A decoded value lies outside its declared bounds.
    #[error("value out of range: {0}")]
    OutOfRange(String),
    /// Unordered storage without a valid reordering table, or unordered
    /// storage on a dataset that forbids it.
    #[error("ordering error: {0}")]
    Ordering(String),
    /// Failure reported by the container backend.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Classification of an [`Error`], for callers that branch on the outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Generic,
    Shape,
    Argument,
    NotFound,
    NotSet,
    OutOfRange,
    Ordering,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Generic(_) => ErrorKind::Generic,
            Error::Shape(_) => ErrorKind::Shape,
            Error::Argument(_) => ErrorKind::Argument,
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::NotSet(_) => ErrorKind::NotSet,
            Error::OutOfRange(_) => ErrorKind::OutOfRange,
            Error::Ordering(_) => ErrorKind::Ordering,
            Error::Store(e) => match e {
                StoreError::NotFound(_) | StoreError::DanglingLink(_) => ErrorKind::NotFound,
                StoreError::ConversionOverflow { .. } => ErrorKind::OutOfRange,
                _ => ErrorKind::Generic,
            },
        }
    }

    /// Whether the caller can recover by falling back to a default or
    /// supplying the value itself.
    pub fn is_recoverable(&self) -> bool {
        matches!(self.kind(), ErrorKind::NotFound | ErrorKind::NotSet)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Keeps the first error of a multi-step operation.
///
/// Cleanup steps run after a failure are recorded too, but never replace
/// the error that caused the cleanup.
#[derive(Debug, Default)]
pub struct FirstError {
    first: Option<Error>,
}

impl FirstError {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the outcome of one step, returning its value on success.
    pub fn record<T, E: Into<Error>>(&mut self, result: std::result::Result<T, E>) -> Option<T> {
        match result {
            Ok(v) => Some(v),
            Err(e) => {
                if self.first.is_none() {
                    self.first = Some(e.into());
                }
                None
            }
        }
    }

    pub fn is_err(&self) -> bool {
        self.first.is_some()
    }

    /// The first recorded error, or `value` when every step succeeded.
    pub fn finish<T>(self, value: T) -> Result<T> {
        match self.first {
            Some(e) => Err(e),
            None => Ok(value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rustyescdf_store::Datatype;

    #[test]
    fn store_errors_classify() {
        let e: Error = StoreError::NotFound("x".into()).into();
        assert_eq!(e.kind(), ErrorKind::NotFound);
        let e: Error = StoreError::DanglingLink("x".into()).into();
        assert_eq!(e.kind(), ErrorKind::NotFound);
        let e: Error = StoreError::ConversionOverflow {
            index: 0,
            to: Datatype::UInt32,
        }
        .into();
        assert_eq!(e.kind(), ErrorKind::OutOfRange);
        let e: Error = StoreError::ReadOnly.into();
        assert_eq!(e.kind(), ErrorKind::Generic);
    }

    #[test]
    fn recoverable_kinds() {
        assert!(Error::NotSet("n".into()).is_recoverable());
        assert!(Error::NotFound("n".into()).is_recoverable());
        assert!(!Error::Shape("n".into()).is_recoverable());
    }

    #[test]
    fn first_error_wins() {
        let mut errors = FirstError::new();
        assert_eq!(errors.record(Ok::<_, Error>(1)), Some(1));
        assert!(!errors.is_err());
        errors.record::<(), _>(Err(Error::Shape("first".into())));
        errors.record::<(), _>(Err(StoreError::ReadOnly));
        let err = errors.finish(()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Shape);
    }

    #[test]
    fn finish_without_errors() {
        let errors = FirstError::new();
        assert_eq!(errors.finish(7).unwrap(), 7);
    }
}
