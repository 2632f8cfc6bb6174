//! Error types and result definitions for payment coordination operations.
//!
//! [`PaymentsError`] carries a classification, a static description, optional dynamic detail,
//! the originating error and the callsite where it was raised. Several errors can be aggregated
//! into one when more than one collaborator fails.

use std::backtrace::Backtrace;
use std::borrow::Cow;
use std::error;
use std::fmt;
use std::panic::Location;
use std::sync::Arc;

/// Convenient result type for operations failing with [`PaymentsError`].
pub type PaymentsResult<T> = Result<T, PaymentsError>;

/// Detailed payload stored for single [`PaymentsError`] instances.
#[derive(Debug, Clone)]
struct ErrorPayload {
    kind: ErrorKind,
    description: Cow<'static, str>,
    detail: Option<Cow<'static, str>>,
    source: Option<Arc<dyn error::Error + Send + Sync>>,
    location: &'static Location<'static>,
    backtrace: Arc<Backtrace>,
}

/// Main error type of the `payments` crate.
#[derive(Debug, Clone)]
pub struct PaymentsError {
    repr: ErrorRepr,
}

#[derive(Debug, Clone)]
enum ErrorRepr {
    Single(ErrorPayload),
    Many {
        errors: Vec<PaymentsError>,
        location: &'static Location<'static>,
    },
}

/// Categories of failures raised by the coordination core and its collaborators.
#[derive(PartialEq, Eq, Copy, Clone, Debug, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    // Collaborator failures
    QueueReadFailed,
    FlushFailed,
    TransportPublishFailed,
    TransportSubscribeFailed,

    // Data errors
    SerializationError,
    DeserializationError,

    // State & workflow errors
    InvalidState,
    TaskPanicked,

    // Unknown / uncategorized
    Unknown,
}

impl PaymentsError {
    /// Returns the [`ErrorKind`] of this error.
    ///
    /// For aggregated errors, returns the kind of the first error or [`ErrorKind::Unknown`] when
    /// the aggregate is empty.
    pub fn kind(&self) -> ErrorKind {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.kind,
            ErrorRepr::Many { ref errors, .. } => errors
                .first()
                .map(|err| err.kind())
                .unwrap_or(ErrorKind::Unknown),
        }
    }

    /// Returns all [`ErrorKind`]s present in this error, flattening aggregates.
    pub fn kinds(&self) -> Vec<ErrorKind> {
        match self.repr {
            ErrorRepr::Single(ref payload) => vec![payload.kind],
            ErrorRepr::Many { ref errors, .. } => {
                errors.iter().flat_map(|err| err.kinds()).collect()
            }
        }
    }

    /// Returns the dynamic detail, if any.
    pub fn detail(&self) -> Option<&str> {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.detail.as_deref(),
            ErrorRepr::Many { ref errors, .. } => errors.iter().find_map(|e| e.detail()),
        }
    }

    /// Returns the callsite where this error was created.
    pub fn location(&self) -> &'static Location<'static> {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.location,
            ErrorRepr::Many { location, .. } => location,
        }
    }

    /// Attaches an originating error and returns the modified instance.
    ///
    /// Has no effect on aggregated errors, which forward their first error as the source.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: error::Error + Send + Sync + 'static,
    {
        if let ErrorRepr::Single(ref mut payload) = self.repr {
            payload.source = Some(Arc::new(source));
        }

        self
    }

    #[track_caller]
    fn from_components(
        kind: ErrorKind,
        description: Cow<'static, str>,
        detail: Option<Cow<'static, str>>,
        source: Option<Arc<dyn error::Error + Send + Sync>>,
    ) -> Self {
        PaymentsError {
            repr: ErrorRepr::Single(ErrorPayload {
                kind,
                description,
                detail,
                source,
                location: Location::caller(),
                backtrace: Arc::new(Backtrace::capture()),
            }),
        }
    }
}

impl PartialEq for PaymentsError {
    fn eq(&self, other: &PaymentsError) -> bool {
        match (&self.repr, &other.repr) {
            (ErrorRepr::Single(a), ErrorRepr::Single(b)) => a.kind == b.kind,
            (ErrorRepr::Many { errors: a, .. }, ErrorRepr::Many { errors: b, .. }) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for PaymentsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.repr {
            ErrorRepr::Single(payload) => {
                let location = payload.location;
                write!(
                    f,
                    "[{:?}] {} @ {}:{}",
                    payload.kind,
                    payload.description,
                    location.file(),
                    location.line()
                )?;

                if let Some(detail) = &payload.detail {
                    write!(f, "\n  Detail: {detail}")?;
                }

                let backtrace = payload.backtrace.to_string();
                if !backtrace.trim().is_empty() && !backtrace.contains("disabled backtrace") {
                    write!(f, "\n  Backtrace:")?;
                    for line in backtrace.lines() {
                        write!(f, "\n    {line}")?;
                    }
                }

                Ok(())
            }
            ErrorRepr::Many { errors, location } => {
                write!(
                    f,
                    "[Many] {} error{} aggregated @ {}:{}",
                    errors.len(),
                    if errors.len() == 1 { "" } else { "s" },
                    location.file(),
                    location.line()
                )?;

                for (index, error) in errors.iter().enumerate() {
                    for (line_index, line) in error.to_string().lines().enumerate() {
                        if line_index == 0 {
                            write!(f, "\n  {}. {line}", index + 1)?;
                        } else {
                            write!(f, "\n     {line}")?;
                        }
                    }
                }

                Ok(())
            }
        }
    }
}

impl error::Error for PaymentsError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match &self.repr {
            ErrorRepr::Single(payload) => payload
                .source
                .as_ref()
                .map(|source| source.as_ref() as &(dyn error::Error + 'static)),
            ErrorRepr::Many { errors, .. } => errors
                .first()
                .map(|error| error as &(dyn error::Error + 'static)),
        }
    }
}

/// Creates a [`PaymentsError`] from an error kind and static description.
impl From<(ErrorKind, &'static str)> for PaymentsError {
    #[track_caller]
    fn from((kind, desc): (ErrorKind, &'static str)) -> PaymentsError {
        PaymentsError::from_components(kind, Cow::Borrowed(desc), None, None)
    }
}

/// Creates a [`PaymentsError`] from an error kind, static description and dynamic detail.
impl<D> From<(ErrorKind, &'static str, D)> for PaymentsError
where
    D: Into<Cow<'static, str>>,
{
    #[track_caller]
    fn from((kind, desc, detail): (ErrorKind, &'static str, D)) -> PaymentsError {
        PaymentsError::from_components(kind, Cow::Borrowed(desc), Some(detail.into()), None)
    }
}

/// Aggregates several errors, returning a lone error unchanged.
impl<E> From<Vec<E>> for PaymentsError
where
    E: Into<PaymentsError>,
{
    #[track_caller]
    fn from(errors: Vec<E>) -> PaymentsError {
        let location = Location::caller();
        let mut errors: Vec<PaymentsError> = errors.into_iter().map(Into::into).collect();

        if errors.len() == 1
            && let Some(error) = errors.pop()
        {
            return error;
        }

        PaymentsError {
            repr: ErrorRepr::Many { errors, location },
        }
    }
}

/// Converts [`serde_json::Error`] into a serialization or deserialization failure.
impl From<serde_json::Error> for PaymentsError {
    #[track_caller]
    fn from(err: serde_json::Error) -> PaymentsError {
        let (kind, description) = match err.classify() {
            serde_json::error::Category::Io => {
                (ErrorKind::SerializationError, "JSON I/O operation failed")
            }
            serde_json::error::Category::Syntax
            | serde_json::error::Category::Data
            | serde_json::error::Category::Eof => (
                ErrorKind::DeserializationError,
                "JSON deserialization failed",
            ),
        };

        let detail = err.to_string();
        PaymentsError::from_components(
            kind,
            Cow::Borrowed(description),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

/// Converts a failed [`tokio::task::JoinHandle`] into [`ErrorKind::TaskPanicked`].
impl From<tokio::task::JoinError> for PaymentsError {
    #[track_caller]
    fn from(err: tokio::task::JoinError) -> PaymentsError {
        let description = if err.is_cancelled() {
            "Background task was cancelled"
        } else {
            "Background task panicked"
        };

        let detail = err.to_string();
        PaymentsError::from_components(
            ErrorKind::TaskPanicked,
            Cow::Borrowed(description),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}
