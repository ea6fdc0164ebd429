//! `harbor-sandbox`: embedding layer between a host and sandboxed bytecode.
//!
//! Built on Wasmtime, which stays an implementation detail: hosts only see
//! the types below. The layer enforces:
//!
//! - **Isolation:** every handle is bound to the context that created it
//! - **Checked calls:** argument and result kinds are verified at the boundary
//! - **Attributable failures:** compile, link, trap, host and type errors stay distinct
//! - **Resource limits:** memory size, instance count, fuel, call depth
//!
//! Typical flow: create an [`Environment`], [`compile`](Environment::compile)
//! an [`Artifact`], create a [`Context`], register host functions with
//! [`Func::new`], link with [`Instance::new`] (or a [`Linker`]), then call
//! exported functions through [`Func::call`].

pub mod artifact;
pub mod config;
pub mod context;
pub mod environment;
pub mod error;
pub mod externals;
pub mod func;
pub mod instance;
pub mod linker;
pub mod memory;
pub mod value;
mod validation;

pub use artifact::Artifact;
pub use config::SandboxConfig;
pub use context::{AsContext, AsContextMut, Context, ContextData, ContextId};
pub use environment::Environment;
pub use error::{CallError, CompileError, LinkError, MemoryError, SandboxError, Trap, TrapCode};
pub use externals::{Extern, Global, Memory, Table};
pub use func::{Caller, Func};
pub use instance::Instance;
pub use linker::Linker;
pub use value::Val;

pub use harbor_hostapi::{
    ContractViolation, ErrorKind, ExportType, ExternKind, ExternType, FuncType, GlobalType,
    HostError, ImportType, MemoryType, TableType, TypeMismatch, ValKind,
};
