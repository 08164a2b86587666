//! Error types for the sender/receiver error channel.
//!
//! Every sender's error channel carries a [`Error`]: a known set of error
//! kinds plus deterministic context and an optional source chain. Errors are
//! first-class values; contract violations (illegal scope destruction,
//! misuse of a consumed operation) are panics, not `Error`s.
//!
//! User callables that panic inside an adaptor are caught at the adaptor
//! boundary and redirected to the error channel as [`ErrorKind::Panic`],
//! carrying a [`PanicPayload`].

use core::fmt;
use std::any::Any;
use std::sync::Arc;

/// The kind of error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Non-blocking submission would have blocked (queue saturated).
    ///
    /// Only ever produced by `try_schedule` senders.
    WouldBlock,
    /// A user callable panicked inside an adaptor.
    Panic,
    /// Scheduling a continuation failed (e.g. the target context is gone).
    Scheduling,
    /// The operation observed a stop request and could not proceed.
    Stopped,
    /// An async scope refused the association (already closed).
    ScopeClosed,
    /// Internal invariant failure (a bug in this crate).
    Internal,
    /// User-provided error.
    User,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WouldBlock => write!(f, "would block"),
            Self::Panic => write!(f, "panic"),
            Self::Scheduling => write!(f, "scheduling failure"),
            Self::Stopped => write!(f, "stopped"),
            Self::ScopeClosed => write!(f, "scope closed"),
            Self::Internal => write!(f, "internal error"),
            Self::User => write!(f, "user error"),
        }
    }
}

/// Payload from a caught panic.
///
/// Wraps the panic value for transport along the error channel. Only the
/// message is preserved; arbitrary payloads are rendered as an opaque
/// placeholder.
#[derive(Debug, Clone)]
pub struct PanicPayload {
    message: String,
}

impl PanicPayload {
    /// Creates a new panic payload with the given message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Extracts a payload from the boxed value returned by `catch_unwind`.
    #[must_use]
    pub fn from_unwind(payload: Box<dyn Any + Send>) -> Self {
        if let Some(s) = payload.downcast_ref::<&'static str>() {
            Self::new(*s)
        } else if let Some(s) = payload.downcast_ref::<String>() {
            Self::new(s.clone())
        } else {
            Self::new("non-string panic payload")
        }
    }

    /// Returns the panic message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for PanicPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "panic: {}", self.message)
    }
}

/// The error type carried on every sender's error channel.
#[derive(Debug, Clone)]
pub struct Error {
    kind: ErrorKind,
    context: Option<String>,
    source: Option<Arc<dyn std::error::Error + Send + Sync>>,
}

impl Error {
    /// Creates a new error with the given kind.
    #[must_use]
    pub const fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            context: None,
            source: None,
        }
    }

    /// Returns the error kind.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns true if this is the `try_schedule` saturation error.
    #[must_use]
    pub const fn is_would_block(&self) -> bool {
        matches!(self.kind, ErrorKind::WouldBlock)
    }

    /// Returns true if this error wraps a caught panic.
    #[must_use]
    pub const fn is_panic(&self) -> bool {
        matches!(self.kind, ErrorKind::Panic)
    }

    /// Returns the context text, if any.
    #[must_use]
    pub fn context(&self) -> Option<&str> {
        self.context.as_deref()
    }

    /// Adds deterministic context text to the error.
    #[must_use]
    pub fn with_context(mut self, ctx: impl Into<String>) -> Self {
        self.context = Some(ctx.into());
        self
    }

    /// Adds a source error to the chain.
    #[must_use]
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Arc::new(source));
        self
    }

    /// The distinguished non-blocking-submission failure.
    #[must_use]
    pub fn would_block() -> Self {
        Self::new(ErrorKind::WouldBlock)
    }

    /// Creates an error from a panic payload captured by `catch_unwind`.
    #[must_use]
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let payload = PanicPayload::from_unwind(payload);
        Self::new(ErrorKind::Panic).with_context(payload.message().to_owned())
    }

    /// Creates a user error with a message.
    #[must_use]
    pub fn user(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::User).with_context(message)
    }

    /// Creates a scheduling failure with a message.
    #[must_use]
    pub fn scheduling(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Scheduling).with_context(message)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(ctx) = &self.context {
            write!(f, ": {ctx}")?;
        }
        Ok(())
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|e| e.as_ref() as _)
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
