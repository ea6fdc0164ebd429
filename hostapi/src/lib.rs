//! `harbor-hostapi`: boundary type system for the Harbor embedding layer.
//!
//! This crate has no engine dependency. It defines what may cross the
//! boundary between a host and sandboxed code:
//!
//! - `ValKind`: the closed set of value kinds
//! - `FuncType`: structural function signatures and their checks
//! - `ExternType` / `ImportType` / `ExportType`: an artifact's surface
//! - `HostError`: what a host function returns to refuse a call
//! - `TypeMismatch` / `ContractViolation`: signature check failures
//! - `ErrorKind`: the discriminant shared by every reported failure

pub mod error;
pub mod types;

// Re-export commonly used types at the crate root.
pub use error::{ContractViolation, ErrorKind, HostError, TypeMismatch};
pub use types::{
    limits_match, ExportType, ExternKind, ExternType, FuncType, GlobalType, ImportType,
    MemoryType, TableType, ValKind,
};
