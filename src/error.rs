//! Stable error taxonomy for the crate, per the protocol's error handling design.
//!
//! Every fallible operation in this crate returns [`Error`], never a bare
//! `anyhow`/`Box<dyn Error>`. Callers that want to retry dial failures or
//! surface protocol corruption to a dashboard can match on [`Error::kind`]
//! without string-matching a message.

use std::fmt;

/// The result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// A stable, matchable error kind, independent of the underlying cause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    /// Malformed symbol, `count > 800` for K-line requests, an unparsable date string.
    InvalidArgument,
    /// Operation attempted on a closed session or pool.
    NotConnected,
    /// A waiter did not resolve within the configured window.
    Timeout,
    /// Short header, length mismatch, decompression failure, or a decoder that
    /// consumed past the end of its buffer.
    Protocol,
    /// Socket read/write error or dial failure.
    Transport,
    /// An HTTP scraper returned a non-2xx status or unparsable JSONP/JSON.
    Upstream,
    /// A database error from the catalog/workday persistence layer.
    Persistence,
    /// The operation was explicitly cancelled.
    Cancelled,
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Kind::InvalidArgument => "invalid argument",
            Kind::NotConnected => "not connected",
            Kind::Timeout => "timed out",
            Kind::Protocol => "protocol error",
            Kind::Transport => "transport error",
            Kind::Upstream => "upstream error",
            Kind::Persistence => "persistence error",
            Kind::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// The crate's unified error type.
#[derive(thiserror::Error, Debug)]
#[error("{kind}: {message}")]
pub struct Error {
    kind: Kind,
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl Error {
    /// Constructs a new error of the given kind with a static or owned message.
    pub fn new(kind: Kind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    /// Attaches a source error, preserving the causal chain.
    #[must_use]
    pub fn with_source(
        mut self,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// The stable [`Kind`] of this error.
    #[must_use]
    pub fn kind(&self) -> Kind {
        self.kind
    }

    pub(crate) fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(Kind::InvalidArgument, message)
    }

    pub(crate) fn not_connected(message: impl Into<String>) -> Self {
        Self::new(Kind::NotConnected, message)
    }

    pub(crate) fn timeout(message: impl Into<String>) -> Self {
        Self::new(Kind::Timeout, message)
    }

    pub(crate) fn protocol(message: impl Into<String>) -> Self {
        Self::new(Kind::Protocol, message)
    }

    pub(crate) fn transport(message: impl Into<String>) -> Self {
        Self::new(Kind::Transport, message)
    }

    pub(crate) fn upstream(message: impl Into<String>) -> Self {
        Self::new(Kind::Upstream, message)
    }

    pub(crate) fn persistence(message: impl Into<String>) -> Self {
        Self::new(Kind::Persistence, message)
    }

    pub(crate) fn cancelled(message: impl Into<String>) -> Self {
        Self::new(Kind::Cancelled, message)
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::transport("I/O error").with_source(e)
    }
}

impl From<sqlx::Error> for Error {
    fn from(e: sqlx::Error) -> Self {
        Error::persistence("database error").with_source(e)
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::upstream("http request failed").with_source(e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::upstream("could not parse JSON payload").with_source(e)
    }
}
