//! Boundary surface extraction: engine types to Harbor types.
//!
//! After the engine has accepted a module, every import and export is
//! described with `harbor_hostapi` types. Anything that cannot cross the
//! boundary is rejected here, so an [`Artifact`](crate::Artifact) only ever
//! exposes items the call routine can marshal:
//!
//! 1. Value kinds other than i32/i64/f32/f64/funcref (v128, GC refs)
//! 2. Shared or 64-bit memories
//! 3. Tables whose elements are not funcref
//! 4. Any extern kind beyond func/memory/table/global

use harbor_hostapi::{
    ExportType, ExternType, FuncType, GlobalType, ImportType, MemoryType, TableType, ValKind,
};
use wasmtime::{Engine, Module, Mutability, ValType};

use crate::error::CompileError;

/// Map an engine value type onto a boundary kind.
pub(crate) fn val_kind(ty: &ValType) -> Option<ValKind> {
    match ty {
        ValType::I32 => Some(ValKind::I32),
        ValType::I64 => Some(ValKind::I64),
        ValType::F32 => Some(ValKind::F32),
        ValType::F64 => Some(ValKind::F64),
        other if other.is_funcref() => Some(ValKind::FuncRef),
        _ => None,
    }
}

/// Map a boundary kind onto the engine value type.
pub(crate) fn wasm_val_type(kind: ValKind) -> ValType {
    match kind {
        ValKind::I32 => ValType::I32,
        ValKind::I64 => ValType::I64,
        ValKind::F32 => ValType::F32,
        ValKind::F64 => ValType::F64,
        ValKind::FuncRef => ValType::FUNCREF,
    }
}

fn kinds(types: impl Iterator<Item = ValType>) -> Result<Vec<ValKind>, String> {
    types
        .map(|ty| val_kind(&ty).ok_or_else(|| format!("value type {} cannot cross the boundary", ty)))
        .collect()
}

/// Describe an engine function type.
pub(crate) fn func_type(ty: &wasmtime::FuncType) -> Result<FuncType, String> {
    Ok(FuncType::new(kinds(ty.params())?, kinds(ty.results())?))
}

/// Build the engine function type for a boundary signature.
pub(crate) fn wasm_func_type(engine: &Engine, ty: &FuncType) -> wasmtime::FuncType {
    wasmtime::FuncType::new(
        engine,
        ty.params().iter().map(|k| wasm_val_type(*k)),
        ty.results().iter().map(|k| wasm_val_type(*k)),
    )
}

pub(crate) fn memory_type(ty: &wasmtime::MemoryType) -> Result<MemoryType, String> {
    if ty.is_shared() {
        return Err("shared memories are not supported".into());
    }
    if ty.is_64() {
        return Err("64-bit memories are not supported".into());
    }
    Ok(MemoryType::new(ty.minimum(), ty.maximum()))
}

pub(crate) fn table_type(ty: &wasmtime::TableType) -> Result<TableType, String> {
    let element = ValType::Ref(ty.element().clone());
    match val_kind(&element) {
        Some(ValKind::FuncRef) => Ok(TableType {
            element: ValKind::FuncRef,
            minimum: u64::from(ty.minimum()),
            maximum: ty.maximum().map(u64::from),
        }),
        _ => Err(format!("table element type {} is not supported", element)),
    }
}

pub(crate) fn global_type(ty: &wasmtime::GlobalType) -> Result<GlobalType, String> {
    let content = val_kind(ty.content())
        .ok_or_else(|| format!("global type {} cannot cross the boundary", ty.content()))?;
    Ok(GlobalType::new(content, ty.mutability() == Mutability::Var))
}

pub(crate) fn wasm_global_type(ty: &GlobalType) -> wasmtime::GlobalType {
    let mutability = if ty.mutable {
        Mutability::Var
    } else {
        Mutability::Const
    };
    wasmtime::GlobalType::new(wasm_val_type(ty.content), mutability)
}

/// Describe any extern type.
pub(crate) fn extern_type(ty: &wasmtime::ExternType) -> Result<ExternType, String> {
    match ty {
        wasmtime::ExternType::Func(f) => func_type(f).map(ExternType::Func),
        wasmtime::ExternType::Memory(m) => memory_type(m).map(ExternType::Memory),
        wasmtime::ExternType::Table(t) => table_type(t).map(ExternType::Table),
        wasmtime::ExternType::Global(g) => global_type(g).map(ExternType::Global),
        #[allow(unreachable_patterns)]
        _ => Err("extern kind is not supported".into()),
    }
}

/// Describe every import of a compiled module, in declaration order.
pub(crate) fn describe_imports(module: &Module) -> Result<Vec<ImportType>, CompileError> {
    module
        .imports()
        .map(|import| {
            let ty = extern_type(&import.ty()).map_err(|reason| CompileError::Unsupported {
                item: format!("import `{}::{}`", import.module(), import.name()),
                reason,
            })?;
            Ok(ImportType {
                module: import.module().to_string(),
                name: import.name().to_string(),
                ty,
            })
        })
        .collect()
}

/// Describe every export of a compiled module, in declaration order.
pub(crate) fn describe_exports(module: &Module) -> Result<Vec<ExportType>, CompileError> {
    module
        .exports()
        .map(|export| {
            let ty = extern_type(&export.ty()).map_err(|reason| CompileError::Unsupported {
                item: format!("export `{}`", export.name()),
                reason,
            })?;
            Ok(ExportType {
                name: export.name().to_string(),
                ty,
            })
        })
        .collect()
}
