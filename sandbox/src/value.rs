//! Runtime values exchanged across the boundary.

use harbor_hostapi::ValKind;
use wasmtime::StoreContextMut;

use crate::context::{ContextData, ContextId};
use crate::error::CallError;
use crate::func::{self, Func};

/// A single value passed to or returned from a callable.
///
/// Floats are carried bit-exact; NaN payloads survive a round trip.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Val {
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    /// A function reference, or null.
    FuncRef(Option<Func>),
}

impl Val {
    pub fn kind(&self) -> ValKind {
        match self {
            Self::I32(_) => ValKind::I32,
            Self::I64(_) => ValKind::I64,
            Self::F32(_) => ValKind::F32,
            Self::F64(_) => ValKind::F64,
            Self::FuncRef(_) => ValKind::FuncRef,
        }
    }

    /// The zero value of `kind`; null for references.
    pub fn default_for(kind: ValKind) -> Self {
        match kind {
            ValKind::I32 => Self::I32(0),
            ValKind::I64 => Self::I64(0),
            ValKind::F32 => Self::F32(0.0),
            ValKind::F64 => Self::F64(0.0),
            ValKind::FuncRef => Self::FuncRef(None),
        }
    }

    pub fn i32(&self) -> Option<i32> {
        match *self {
            Self::I32(v) => Some(v),
            _ => None,
        }
    }

    pub fn i64(&self) -> Option<i64> {
        match *self {
            Self::I64(v) => Some(v),
            _ => None,
        }
    }

    pub fn f32(&self) -> Option<f32> {
        match *self {
            Self::F32(v) => Some(v),
            _ => None,
        }
    }

    pub fn f64(&self) -> Option<f64> {
        match *self {
            Self::F64(v) => Some(v),
            _ => None,
        }
    }

    /// `Some(None)` is a null reference; `None` means not a reference.
    pub fn funcref(&self) -> Option<Option<Func>> {
        match *self {
            Self::FuncRef(f) => Some(f),
            _ => None,
        }
    }

    /// False only for a reference minted by a different context.
    pub(crate) fn belongs_to(&self, id: ContextId) -> bool {
        match self {
            Self::FuncRef(Some(func)) => func.context() == id,
            _ => true,
        }
    }

    /// Lower into the engine's representation.
    pub(crate) fn to_wasm<T>(&self, data: &ContextData<T>) -> Result<wasmtime::Val, CallError> {
        Ok(match *self {
            Self::I32(v) => wasmtime::Val::I32(v),
            Self::I64(v) => wasmtime::Val::I64(v),
            Self::F32(v) => wasmtime::Val::F32(v.to_bits()),
            Self::F64(v) => wasmtime::Val::F64(v.to_bits()),
            Self::FuncRef(None) => wasmtime::Val::FuncRef(None),
            Self::FuncRef(Some(func)) => wasmtime::Val::FuncRef(Some(data.func_entry(&func)?.raw)),
        })
    }

    /// Lift an engine value of the declared `kind`.
    ///
    /// Function references coming out of the engine resolve to the handle
    /// the context already holds for that function, or are registered as
    /// guest callables on first sight.
    pub(crate) fn from_wasm<T>(
        store: &mut StoreContextMut<'_, ContextData<T>>,
        raw: &wasmtime::Val,
        kind: ValKind,
    ) -> Result<Self, CallError> {
        match (raw, kind) {
            (wasmtime::Val::I32(v), ValKind::I32) => Ok(Self::I32(*v)),
            (wasmtime::Val::I64(v), ValKind::I64) => Ok(Self::I64(*v)),
            (wasmtime::Val::F32(bits), ValKind::F32) => Ok(Self::F32(f32::from_bits(*bits))),
            (wasmtime::Val::F64(bits), ValKind::F64) => Ok(Self::F64(f64::from_bits(*bits))),
            (wasmtime::Val::FuncRef(None), ValKind::FuncRef) => Ok(Self::FuncRef(None)),
            (wasmtime::Val::FuncRef(Some(raw)), ValKind::FuncRef) => {
                let func = func::guest_handle(store, *raw, None).map_err(CallError::Internal)?;
                Ok(Self::FuncRef(Some(func)))
            }
            (other, kind) => Err(CallError::Internal(format!(
                "engine produced {:?} where {} was declared",
                other, kind
            ))),
        }
    }
}

impl From<i32> for Val {
    fn from(v: i32) -> Self {
        Self::I32(v)
    }
}

impl From<i64> for Val {
    fn from(v: i64) -> Self {
        Self::I64(v)
    }
}

impl From<f32> for Val {
    fn from(v: f32) -> Self {
        Self::F32(v)
    }
}

impl From<f64> for Val {
    fn from(v: f64) -> Self {
        Self::F64(v)
    }
}

impl From<Func> for Val {
    fn from(f: Func) -> Self {
        Self::FuncRef(Some(f))
    }
}
