use std::fmt;

use thiserror::Error;

/// Why a backend could not produce an execution result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// The container engine or remote endpoint could not be reached
    BackendUnavailable,
    /// The execution ran past its deadline and was terminated
    Timeout,
    /// Network fault or non-success status from the remote endpoint
    TransportError,
    /// Anything unexpected inside a backend
    InternalError,
    /// Every slot is busy and the waiting queue is full
    Overloaded,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureKind::BackendUnavailable => "backend unavailable",
            FailureKind::Timeout => "timeout",
            FailureKind::TransportError => "transport error",
            FailureKind::InternalError => "internal error",
            FailureKind::Overloaded => "overloaded",
        };
        f.write_str(s)
    }
}

/// A backend failure. Never mixed with a result: a call yields one or the other.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct Failure {
    pub kind: FailureKind,
    pub message: String,
}

impl Failure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(FailureKind::BackendUnavailable, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Timeout, message)
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(FailureKind::TransportError, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(FailureKind::InternalError, message)
    }

    pub fn overloaded(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Overloaded, message)
    }
}
