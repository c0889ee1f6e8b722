//! Typed errors with a kind tag, a context bag, and a cause chain.
//!
//! Every error in the scheduler carries a [`Kind`] so callers can branch on
//! the failure class without string matching, plus key/value context that
//! ends up in the logs.

use std::collections::BTreeMap;
use std::fmt;

/// Failure class of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    /// Bad user input (malformed repository, corrupt config).
    Validation,
    /// A referenced resource does not exist.
    NotFound,
    /// A bug in this program.
    Internal,
    /// The operation collides with existing state (already running).
    Conflict,
    /// The operation did not finish in time or was cancelled.
    Timeout,
    /// An upstream system failed (GitHub, tmux, git).
    External,
    /// Anything that fits none of the above.
    Unknown,
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Kind::Validation => "validation",
            Kind::NotFound => "not-found",
            Kind::Internal => "internal",
            Kind::Conflict => "conflict",
            Kind::Timeout => "timeout",
            Kind::External => "external",
            Kind::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

type BoxedCause = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Scheduler error: kind tag, human message, context bag, optional cause.
#[derive(Debug)]
pub struct Error {
    kind: Kind,
    message: String,
    context: BTreeMap<&'static str, String>,
    source: Option<BoxedCause>,
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn new(kind: Kind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            context: BTreeMap::new(),
            source: None,
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(Kind::Validation, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(Kind::NotFound, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(Kind::Internal, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(Kind::Conflict, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(Kind::Timeout, message)
    }

    pub fn external(message: impl Into<String>) -> Self {
        Self::new(Kind::External, message)
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(Kind::Unknown, message)
    }

    /// Wrap a cause, preserving its kind when the cause is itself tagged.
    ///
    /// A plain (untagged) cause yields `Kind::Unknown`; use [`Error::wrap_as`]
    /// to assign an explicit tag in that case.
    pub fn wrap(message: impl Into<String>, cause: impl Into<BoxedCause>) -> Self {
        let cause = cause.into();
        let kind = cause.downcast_ref::<Error>().map(|e| e.kind).unwrap_or(Kind::Unknown);
        Self {
            kind,
            message: message.into(),
            context: BTreeMap::new(),
            source: Some(cause),
        }
    }

    /// Wrap a cause under an explicit kind, regardless of the cause's own tag.
    pub fn wrap_as(kind: Kind, message: impl Into<String>, cause: impl Into<BoxedCause>) -> Self {
        Self {
            kind,
            message: message.into(),
            context: BTreeMap::new(),
            source: Some(cause.into()),
        }
    }

    /// Attach a key/value pair to the context bag.
    pub fn context(mut self, key: &'static str, value: impl fmt::Display) -> Self {
        self.context.insert(key, value.to_string());
        self
    }

    pub fn kind(&self) -> Kind {
        self.kind
    }

    pub fn is(&self, kind: Kind) -> bool {
        self.kind == kind
    }

    /// Walk the cause chain looking for a tagged error of the given kind.
    pub fn has_kind(&self, kind: Kind) -> bool {
        if self.kind == kind {
            return true;
        }
        let mut cause: Option<&(dyn std::error::Error + 'static)> =
            self.source.as_deref().map(|e| e as &(dyn std::error::Error + 'static));
        while let Some(err) = cause {
            if let Some(tagged) = err.downcast_ref::<Error>()
                && tagged.kind == kind
            {
                return true;
            }
            cause = err.source();
        }
        false
    }

    /// The innermost error in the cause chain.
    pub fn root_cause(&self) -> &(dyn std::error::Error + 'static) {
        let mut current: &(dyn std::error::Error + 'static) = self;
        while let Some(next) = current.source() {
            current = next;
        }
        current
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)?;
        if !self.context.is_empty() {
            let pairs: Vec<String> = self.context.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
            write!(f, " ({})", pairs.join(", "))?;
        }
        Ok(())
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}
