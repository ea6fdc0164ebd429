//! Host-side error types for the Harbor boundary.
//!
//! `HostError` is what a host function returns to refuse a call.
//! `TypeMismatch` and `ContractViolation` are the two ways a value list can
//! fail a signature check: on the way in (caller arguments) and on the way
//! out (results written by a host function).

use std::error::Error as StdError;
use std::fmt;

use crate::types::ValKind;

/// Discriminant carried by every failure the embedding layer reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed or unsupported input to compilation.
    Compile,
    /// Imports did not match an artifact's declarations.
    Link,
    /// Runtime fault in sandboxed code.
    Trap,
    /// A host function returned an error.
    Host,
    /// Caller arguments did not match the target signature.
    TypeMismatch,
    /// A host function broke its result contract.
    Contract,
    /// A handle was used with a context that does not own it.
    ForeignHandle,
    /// Engine failure that fits none of the above.
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Compile => "compile",
            Self::Link => "link",
            Self::Trap => "trap",
            Self::Host => "host",
            Self::TypeMismatch => "type-mismatch",
            Self::Contract => "contract",
            Self::ForeignHandle => "foreign-handle",
            Self::Internal => "internal",
        };
        f.write_str(name)
    }
}

/// Error returned by a host-defined function.
///
/// Propagated unchanged to whoever triggered the call, including through
/// any guest frames in between.
#[derive(Debug, thiserror::Error)]
pub enum HostError {
    /// The host function refused the call.
    #[error("{0}")]
    Failed(String),

    /// A re-entrant call made by the host function failed.
    #[error("re-entrant call failed: {0}")]
    Reentrant(#[source] Box<dyn StdError + Send + Sync + 'static>),
}

impl HostError {
    /// Create a `Failed` error from any message.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }

    /// Wrap the error of a nested call.
    pub fn reentrant(source: impl StdError + Send + Sync + 'static) -> Self {
        Self::Reentrant(Box::new(source))
    }

    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Host
    }
}

/// Caller-supplied arguments do not match the callee's parameters.
///
/// Always detected before any execution starts.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TypeMismatch {
    #[error("expected {expected} arguments, got {found}")]
    ArgumentCount { expected: usize, found: usize },

    #[error("argument {index}: expected {expected}, got {found}")]
    ArgumentKind {
        index: usize,
        expected: ValKind,
        found: ValKind,
    },
}

impl TypeMismatch {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::TypeMismatch
    }
}

/// A host function returned success without honoring its declared results.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ContractViolation {
    #[error("expected {expected} result slots, got {found}")]
    ResultCount { expected: usize, found: usize },

    #[error("result {index} ({expected}) was never written")]
    MissingResult { index: usize, expected: ValKind },

    #[error("result {index}: expected {expected}, wrote {found}")]
    ResultKind {
        index: usize,
        expected: ValKind,
        found: ValKind,
    },

    #[error("result {index} references a function from another context")]
    ForeignReference { index: usize },
}

impl ContractViolation {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Contract
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_error_display() {
        let err = HostError::failed("disk full");
        assert_eq!(err.to_string(), "disk full");
        assert_eq!(err.kind(), ErrorKind::Host);
    }

    #[test]
    fn test_reentrant_keeps_source() {
        let inner = TypeMismatch::ArgumentCount {
            expected: 2,
            found: 0,
        };
        let err = HostError::reentrant(inner.clone());
        assert!(err.to_string().contains("expected 2 arguments"));
        let source = err.source().unwrap();
        assert_eq!(source.to_string(), inner.to_string());
    }

    #[test]
    fn test_type_mismatch_display() {
        let err = TypeMismatch::ArgumentKind {
            index: 3,
            expected: ValKind::I64,
            found: ValKind::F32,
        };
        assert_eq!(err.to_string(), "argument 3: expected i64, got f32");
        assert_eq!(err.kind(), ErrorKind::TypeMismatch);
    }

    #[test]
    fn test_contract_violation_display() {
        let err = ContractViolation::MissingResult {
            index: 0,
            expected: ValKind::I32,
        };
        assert_eq!(err.to_string(), "result 0 (i32) was never written");
        assert_eq!(err.kind(), ErrorKind::Contract);
    }
}
