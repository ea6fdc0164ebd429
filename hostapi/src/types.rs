//! Boundary types shared by the host and the sandbox.
//!
//! Everything that crosses the embedding boundary is described with these
//! types: the kind of each value, the signature of each function, and the
//! type of each importable/exportable item. They are engine-independent so
//! a host can inspect an artifact's surface without touching the runtime.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ContractViolation, TypeMismatch};

/// The kind of a value that may cross the boundary.
///
/// The set is closed. `FuncRef` is the opaque reference kind: a nullable
/// handle to a callable entity owned by the same execution context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValKind {
    I32,
    I64,
    F32,
    F64,
    FuncRef,
}

impl ValKind {
    /// Returns true for the numeric kinds.
    pub fn is_num(self) -> bool {
        !matches!(self, Self::FuncRef)
    }

    /// Returns true for reference kinds.
    pub fn is_ref(self) -> bool {
        matches!(self, Self::FuncRef)
    }
}

impl fmt::Display for ValKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::I32 => write!(f, "i32"),
            Self::I64 => write!(f, "i64"),
            Self::F32 => write!(f, "f32"),
            Self::F64 => write!(f, "f64"),
            Self::FuncRef => write!(f, "funcref"),
        }
    }
}

/// Writes `(a, b, c)` for a list of kinds.
fn fmt_kinds(f: &mut fmt::Formatter<'_>, kinds: &[ValKind]) -> fmt::Result {
    write!(f, "(")?;
    for (i, kind) in kinds.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}", kind)?;
    }
    write!(f, ")")
}

/// A function signature: ordered parameter kinds and ordered result kinds.
///
/// Equality is structural. Two signatures built independently from the same
/// kinds compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct FuncType {
    params: Vec<ValKind>,
    results: Vec<ValKind>,
}

impl FuncType {
    /// Build a signature from parameter and result kinds.
    pub fn new(
        params: impl IntoIterator<Item = ValKind>,
        results: impl IntoIterator<Item = ValKind>,
    ) -> Self {
        Self {
            params: params.into_iter().collect(),
            results: results.into_iter().collect(),
        }
    }

    pub fn params(&self) -> &[ValKind] {
        &self.params
    }

    pub fn results(&self) -> &[ValKind] {
        &self.results
    }

    /// Check caller-supplied argument kinds against the declared parameters.
    ///
    /// Count is checked first, then each position in order; the first
    /// offending position is reported.
    pub fn check_params(&self, found: &[ValKind]) -> Result<(), TypeMismatch> {
        if found.len() != self.params.len() {
            return Err(TypeMismatch::ArgumentCount {
                expected: self.params.len(),
                found: found.len(),
            });
        }
        for (index, (&expected, &found)) in self.params.iter().zip(found).enumerate() {
            if expected != found {
                return Err(TypeMismatch::ArgumentKind {
                    index,
                    expected,
                    found,
                });
            }
        }
        Ok(())
    }

    /// Check the result slots a host function filled in.
    ///
    /// `written` has one entry per declared result; `None` marks a slot the
    /// host left empty.
    pub fn check_results(&self, written: &[Option<ValKind>]) -> Result<(), ContractViolation> {
        if written.len() != self.results.len() {
            return Err(ContractViolation::ResultCount {
                expected: self.results.len(),
                found: written.len(),
            });
        }
        for (index, (&expected, found)) in self.results.iter().zip(written).enumerate() {
            match found {
                None => return Err(ContractViolation::MissingResult { index, expected }),
                Some(found) if *found != expected => {
                    return Err(ContractViolation::ResultKind {
                        index,
                        expected,
                        found: *found,
                    })
                }
                Some(_) => {}
            }
        }
        Ok(())
    }
}

impl fmt::Display for FuncType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt_kinds(f, &self.params)?;
        write!(f, " -> ")?;
        fmt_kinds(f, &self.results)
    }
}

/// Type of a global: value kind plus mutability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GlobalType {
    pub content: ValKind,
    pub mutable: bool,
}

impl GlobalType {
    pub fn new(content: ValKind, mutable: bool) -> Self {
        Self { content, mutable }
    }
}

impl fmt::Display for GlobalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.mutable {
            write!(f, "(mut {})", self.content)
        } else {
            write!(f, "{}", self.content)
        }
    }
}

/// Limits of a linear memory, in 64 KiB pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MemoryType {
    pub minimum: u64,
    pub maximum: Option<u64>,
}

impl MemoryType {
    pub fn new(minimum: u64, maximum: Option<u64>) -> Self {
        Self { minimum, maximum }
    }
}

/// Element kind and limits of a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableType {
    pub element: ValKind,
    pub minimum: u64,
    pub maximum: Option<u64>,
}

/// Returns true if an item with limits `provided` can satisfy an import
/// declared with limits `declared`.
///
/// The provided minimum must cover the declared minimum, and if the import
/// bounds its maximum the provided item must be bounded at least as tightly.
pub fn limits_match(
    declared_min: u64,
    declared_max: Option<u64>,
    provided_min: u64,
    provided_max: Option<u64>,
) -> bool {
    if provided_min < declared_min {
        return false;
    }
    match (declared_max, provided_max) {
        (None, _) => true,
        (Some(_), None) => false,
        (Some(declared), Some(provided)) => provided <= declared,
    }
}

fn fmt_limits(f: &mut fmt::Formatter<'_>, min: u64, max: Option<u64>) -> fmt::Result {
    match max {
        Some(max) => write!(f, "{}..{}", min, max),
        None => write!(f, "{}..", min),
    }
}

/// The discriminant of an [`ExternType`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExternKind {
    Func,
    Memory,
    Table,
    Global,
}

impl fmt::Display for ExternKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Func => write!(f, "func"),
            Self::Memory => write!(f, "memory"),
            Self::Table => write!(f, "table"),
            Self::Global => write!(f, "global"),
        }
    }
}

/// Type of anything an instance can import or export.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ExternType {
    Func(FuncType),
    Memory(MemoryType),
    Table(TableType),
    Global(GlobalType),
}

impl ExternType {
    pub fn kind(&self) -> ExternKind {
        match self {
            Self::Func(_) => ExternKind::Func,
            Self::Memory(_) => ExternKind::Memory,
            Self::Table(_) => ExternKind::Table,
            Self::Global(_) => ExternKind::Global,
        }
    }

    pub fn func(&self) -> Option<&FuncType> {
        match self {
            Self::Func(ty) => Some(ty),
            _ => None,
        }
    }

    /// Returns true if an item of type `provided` satisfies an import of
    /// this type. Functions and globals must be identical; memories and
    /// tables follow the limits rule of [`limits_match`].
    pub fn accepts(&self, provided: &ExternType) -> bool {
        match (self, provided) {
            (Self::Func(a), Self::Func(b)) => a == b,
            (Self::Global(a), Self::Global(b)) => a == b,
            (Self::Memory(a), Self::Memory(b)) => {
                limits_match(a.minimum, a.maximum, b.minimum, b.maximum)
            }
            (Self::Table(a), Self::Table(b)) => {
                a.element == b.element
                    && limits_match(a.minimum, a.maximum, b.minimum, b.maximum)
            }
            _ => false,
        }
    }
}

impl fmt::Display for ExternType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Func(ty) => write!(f, "func {}", ty),
            Self::Memory(ty) => {
                write!(f, "memory ")?;
                fmt_limits(f, ty.minimum, ty.maximum)
            }
            Self::Table(ty) => {
                write!(f, "table {} ", ty.element)?;
                fmt_limits(f, ty.minimum, ty.maximum)
            }
            Self::Global(ty) => write!(f, "global {}", ty),
        }
    }
}

/// One declared import of an artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportType {
    pub module: String,
    pub name: String,
    pub ty: ExternType,
}

impl fmt::Display for ImportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}: {}", self.module, self.name, self.ty)
    }
}

/// One declared export of an artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportType {
    pub name: String,
    pub ty: ExternType,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sig(params: &[ValKind], results: &[ValKind]) -> FuncType {
        FuncType::new(params.iter().copied(), results.iter().copied())
    }

    #[test]
    fn test_structural_equality() {
        let a = sig(&[ValKind::I32, ValKind::I64], &[ValKind::F32]);
        let b = sig(&[ValKind::I32, ValKind::I64], &[ValKind::F32]);
        let c = sig(&[ValKind::I64, ValKind::I32], &[ValKind::F32]);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_check_params_count() {
        let ty = sig(&[ValKind::I32], &[]);
        let err = ty.check_params(&[]).unwrap_err();
        assert_eq!(
            err,
            TypeMismatch::ArgumentCount {
                expected: 1,
                found: 0
            }
        );
    }

    #[test]
    fn test_check_params_reports_first_bad_position() {
        let ty = sig(&[ValKind::I32, ValKind::F64, ValKind::I64], &[]);
        let err = ty
            .check_params(&[ValKind::I32, ValKind::F32, ValKind::I32])
            .unwrap_err();
        assert_eq!(
            err,
            TypeMismatch::ArgumentKind {
                index: 1,
                expected: ValKind::F64,
                found: ValKind::F32
            }
        );
        ty.check_params(&[ValKind::I32, ValKind::F64, ValKind::I64])
            .unwrap();
    }

    #[test]
    fn test_check_results_missing_slot() {
        let ty = sig(&[], &[ValKind::I32, ValKind::I32]);
        let err = ty
            .check_results(&[Some(ValKind::I32), None])
            .unwrap_err();
        assert_eq!(
            err,
            ContractViolation::MissingResult {
                index: 1,
                expected: ValKind::I32
            }
        );
    }

    #[test]
    fn test_check_results_wrong_kind() {
        let ty = sig(&[], &[ValKind::F64]);
        let err = ty.check_results(&[Some(ValKind::I64)]).unwrap_err();
        assert!(matches!(err, ContractViolation::ResultKind { index: 0, .. }));
        ty.check_results(&[Some(ValKind::F64)]).unwrap();
    }

    #[test]
    fn test_limits_match() {
        assert!(limits_match(1, None, 1, None));
        assert!(limits_match(1, None, 2, Some(4)));
        assert!(!limits_match(2, None, 1, None));
        assert!(!limits_match(1, Some(4), 1, None));
        assert!(limits_match(1, Some(4), 1, Some(3)));
        assert!(!limits_match(1, Some(4), 1, Some(5)));
    }

    #[test]
    fn test_extern_accepts() {
        let func = ExternType::Func(sig(&[], &[]));
        let mem = ExternType::Memory(MemoryType::new(1, None));
        assert!(func.accepts(&func));
        assert!(!func.accepts(&mem));
        assert!(mem.accepts(&ExternType::Memory(MemoryType::new(2, Some(8)))));

        let global = ExternType::Global(GlobalType::new(ValKind::I32, false));
        let mut_global = ExternType::Global(GlobalType::new(ValKind::I32, true));
        assert!(!global.accepts(&mut_global));
    }

    #[test]
    fn test_display() {
        let ty = sig(&[ValKind::I32, ValKind::FuncRef], &[ValKind::F64]);
        assert_eq!(ty.to_string(), "(i32, funcref) -> (f64)");
        assert_eq!(sig(&[], &[]).to_string(), "() -> ()");

        let import = ImportType {
            module: "env".into(),
            name: "adjust".into(),
            ty: ExternType::Func(sig(&[], &[])),
        };
        assert_eq!(import.to_string(), "env::adjust: func () -> ()");
        assert_eq!(
            ExternType::Memory(MemoryType::new(1, Some(2))).to_string(),
            "memory 1..2"
        );
    }
}
