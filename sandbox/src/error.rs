//! Sandbox error types.
//!
//! One error type per fallible operation: [`CompileError`] for
//! compilation, [`LinkError`] for instantiation, [`CallError`] for
//! invocation. [`SandboxError`] wraps all of them for hosts that prefer a
//! single `?` type.

use std::fmt;

use harbor_hostapi::{
    ContractViolation, ErrorKind, ExternKind, ExternType, FuncType, HostError, TypeMismatch,
};

/// Compilation failed; nothing was produced.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CompileError {
    /// The engine rejected the environment configuration.
    #[error("engine configuration rejected: {0}")]
    Config(String),

    /// The input is not a well-formed module.
    #[error("malformed module: {0}")]
    Malformed(String),

    /// The module is valid but declares a boundary item that cannot cross
    /// this layer.
    #[error("unsupported {item}: {reason}")]
    Unsupported { item: String, reason: String },
}

impl CompileError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Compile
    }
}

/// Instantiation failed; no instance was registered in the context.
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("artifact was compiled by a different environment than the context")]
    EnvironmentMismatch,

    #[error("missing import #{index} `{module}::{name}`: expected {expected}")]
    MissingImport {
        index: usize,
        module: String,
        name: String,
        expected: ExternType,
    },

    #[error("artifact declares {declared} imports but {provided} were provided")]
    UnexpectedImports { declared: usize, provided: usize },

    #[error("import `{module}::{name}` belongs to another execution context")]
    ForeignImport { module: String, name: String },

    #[error("import `{module}::{name}`: expected {expected}, provided {provided}")]
    KindMismatch {
        module: String,
        name: String,
        expected: ExternKind,
        provided: ExternKind,
    },

    #[error("import `{module}::{name}`: expected signature {expected}, provided {provided}")]
    SignatureMismatch {
        module: String,
        name: String,
        expected: FuncType,
        provided: FuncType,
    },

    #[error("import `{module}::{name}`: expected {expected}, provided {provided}")]
    IncompatibleType {
        module: String,
        name: String,
        expected: ExternType,
        provided: ExternType,
    },

    #[error("`{module}::{name}` is already defined")]
    Duplicate { module: String, name: String },

    /// The start routine or segment initialization faulted.
    #[error("instantiation aborted: {0}")]
    Trapped(#[source] CallError),

    /// The engine refused the instance (resource limits and the like).
    #[error("instantiation failed: {0}")]
    Instantiate(String),
}

impl LinkError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Link
    }

    /// The trap that aborted instantiation, if that is why it failed.
    pub fn trap(&self) -> Option<&Trap> {
        match self {
            Self::Trapped(CallError::Trap(trap)) => Some(trap),
            _ => None,
        }
    }

    /// Name of the offending import, for the variants that identify one.
    pub fn import_name(&self) -> Option<(&str, &str)> {
        match self {
            Self::MissingImport { module, name, .. }
            | Self::ForeignImport { module, name }
            | Self::KindMismatch { module, name, .. }
            | Self::SignatureMismatch { module, name, .. }
            | Self::IncompatibleType { module, name, .. }
            | Self::Duplicate { module, name } => Some((module, name)),
            _ => None,
        }
    }

    /// Classify an engine instantiation error.
    ///
    /// Traps and host failures raised while running the start routine
    /// become `Trapped`; anything else is `Instantiate`.
    pub(crate) fn from_instantiation(err: anyhow::Error) -> Self {
        if err.is::<CallError>() || err.is::<wasmtime::Trap>() {
            Self::Trapped(CallError::from_wasmtime(err))
        } else {
            Self::Instantiate(format!("{:#}", err))
        }
    }
}

/// Invocation failed. The context remains usable.
#[derive(Debug, thiserror::Error)]
pub enum CallError {
    #[error(transparent)]
    TypeMismatch(#[from] TypeMismatch),

    #[error(transparent)]
    Trap(#[from] Trap),

    #[error("host function failed: {0}")]
    Host(#[from] HostError),

    #[error("host function broke its result contract: {0}")]
    Contract(#[from] ContractViolation),

    #[error("handle does not belong to this execution context")]
    ForeignHandle,

    #[error("internal runtime error: {0}")]
    Internal(String),
}

impl CallError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::TypeMismatch(_) => ErrorKind::TypeMismatch,
            Self::Trap(_) => ErrorKind::Trap,
            Self::Host(_) => ErrorKind::Host,
            Self::Contract(_) => ErrorKind::Contract,
            Self::ForeignHandle => ErrorKind::ForeignHandle,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    pub fn trap(&self) -> Option<&Trap> {
        match self {
            Self::Trap(trap) => Some(trap),
            _ => None,
        }
    }

    /// Classify an error returned by the engine from a guest call.
    ///
    /// Host trampolines raise `CallError` values, which are recovered
    /// unchanged so host failures keep their attribution after unwinding
    /// through guest frames. Engine traps become [`Trap`].
    pub(crate) fn from_wasmtime(err: anyhow::Error) -> Self {
        let err = match err.downcast::<CallError>() {
            Ok(inner) => return inner,
            Err(err) => err,
        };
        if let Some(code) = err.downcast_ref::<wasmtime::Trap>() {
            let backtrace = err
                .downcast_ref::<wasmtime::WasmBacktrace>()
                .map(|bt| bt.to_string())
                .filter(|bt| !bt.is_empty());
            return Self::Trap(Trap {
                code: TrapCode::from(*code),
                message: code.to_string(),
                backtrace,
            });
        }
        Self::Internal(format!("{:#}", err))
    }
}

impl From<CallError> for HostError {
    fn from(err: CallError) -> Self {
        HostError::reentrant(err)
    }
}

/// The reason a runtime fault occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrapCode {
    MemoryOutOfBounds,
    MisalignedAccess,
    TableOutOfBounds,
    IndirectCallToNull,
    IndirectCallTypeMismatch,
    NullReference,
    IntegerOverflow,
    IntegerDivisionByZero,
    BadConversionToInteger,
    Unreachable,
    StackOverflow,
    OutOfFuel,
    Interrupt,
    CallDepthExceeded,
    Other,
}

impl From<wasmtime::Trap> for TrapCode {
    fn from(trap: wasmtime::Trap) -> Self {
        use wasmtime::Trap as W;
        match trap {
            W::MemoryOutOfBounds => Self::MemoryOutOfBounds,
            W::HeapMisaligned => Self::MisalignedAccess,
            W::TableOutOfBounds => Self::TableOutOfBounds,
            W::IndirectCallToNull => Self::IndirectCallToNull,
            W::BadSignature => Self::IndirectCallTypeMismatch,
            W::NullReference => Self::NullReference,
            W::IntegerOverflow => Self::IntegerOverflow,
            W::IntegerDivisionByZero => Self::IntegerDivisionByZero,
            W::BadConversionToInteger => Self::BadConversionToInteger,
            W::UnreachableCodeReached => Self::Unreachable,
            W::StackOverflow => Self::StackOverflow,
            W::OutOfFuel => Self::OutOfFuel,
            W::Interrupt => Self::Interrupt,
            _ => Self::Other,
        }
    }
}

impl fmt::Display for TrapCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::MemoryOutOfBounds => "memory out of bounds",
            Self::MisalignedAccess => "misaligned memory access",
            Self::TableOutOfBounds => "table out of bounds",
            Self::IndirectCallToNull => "indirect call to null",
            Self::IndirectCallTypeMismatch => "indirect call type mismatch",
            Self::NullReference => "null reference",
            Self::IntegerOverflow => "integer overflow",
            Self::IntegerDivisionByZero => "integer division by zero",
            Self::BadConversionToInteger => "invalid conversion to integer",
            Self::Unreachable => "unreachable",
            Self::StackOverflow => "stack overflow",
            Self::OutOfFuel => "out of fuel",
            Self::Interrupt => "interrupted",
            Self::CallDepthExceeded => "call depth exceeded",
            Self::Other => "trap",
        };
        f.write_str(name)
    }
}

/// A runtime fault that aborted one call or instantiation.
#[derive(Debug, Clone, thiserror::Error)]
#[error("trap ({code}): {message}")]
pub struct Trap {
    code: TrapCode,
    message: String,
    backtrace: Option<String>,
}

impl Trap {
    pub(crate) fn new(code: TrapCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            backtrace: None,
        }
    }

    pub fn code(&self) -> TrapCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Guest backtrace, when capture is enabled and frames were available.
    pub fn backtrace(&self) -> Option<&str> {
        self.backtrace.as_deref()
    }

    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Trap
    }
}

/// Linear memory access or creation failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MemoryError {
    #[error("access [{offset}, {offset}+{len}) out of bounds of {size}-byte memory")]
    OutOfBounds { offset: usize, len: usize, size: usize },

    #[error("memory does not belong to this execution context")]
    ForeignHandle,

    #[error("memory grow failed: {0}")]
    Grow(String),

    #[error("invalid memory limits: {0}")]
    Limits(String),
}

/// Top-level error type for the sandbox crate.
#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Link(#[from] LinkError),

    #[error(transparent)]
    Call(#[from] CallError),

    #[error(transparent)]
    Memory(#[from] MemoryError),

    #[error("fuel metering is disabled for this environment")]
    FuelDisabled,
}

impl SandboxError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Compile(e) => e.kind(),
            Self::Link(e) => e.kind(),
            Self::Call(e) => e.kind(),
            Self::Memory(MemoryError::ForeignHandle) => ErrorKind::ForeignHandle,
            Self::Memory(_) | Self::FuelDisabled => ErrorKind::Internal,
        }
    }
}
