//! Importable and exportable items: functions, memories, tables, globals.
//!
//! Like [`Func`], every handle here is stamped with the context that owns
//! it and refuses to operate on any other context.

use harbor_hostapi::{ExternKind, ExternType, GlobalType, MemoryType, TableType, TypeMismatch};
use wasmtime::StoreContextMut;

use crate::context::{AsContext, AsContextMut, ContextData, ContextId};
use crate::error::{CallError, MemoryError};
use crate::func::Func;
use crate::memory;
use crate::validation;
use crate::value::Val;

/// Anything an instance can import or export.
#[derive(Debug, Clone, Copy)]
pub enum Extern {
    Func(Func),
    Memory(Memory),
    Table(Table),
    Global(Global),
}

impl Extern {
    pub fn kind(&self) -> ExternKind {
        match self {
            Self::Func(_) => ExternKind::Func,
            Self::Memory(_) => ExternKind::Memory,
            Self::Table(_) => ExternKind::Table,
            Self::Global(_) => ExternKind::Global,
        }
    }

    /// The context this item belongs to.
    pub fn context(&self) -> ContextId {
        match self {
            Self::Func(f) => f.context(),
            Self::Memory(m) => m.context,
            Self::Table(t) => t.context,
            Self::Global(g) => g.context,
        }
    }

    pub fn into_func(self) -> Option<Func> {
        match self {
            Self::Func(f) => Some(f),
            _ => None,
        }
    }

    pub fn into_memory(self) -> Option<Memory> {
        match self {
            Self::Memory(m) => Some(m),
            _ => None,
        }
    }

    pub fn into_table(self) -> Option<Table> {
        match self {
            Self::Table(t) => Some(t),
            _ => None,
        }
    }

    pub fn into_global(self) -> Option<Global> {
        match self {
            Self::Global(g) => Some(g),
            _ => None,
        }
    }

    /// Current type and engine representation of an item owned by `store`.
    pub(crate) fn lower<T>(
        &self,
        store: &StoreContextMut<'_, ContextData<T>>,
    ) -> Result<(ExternType, wasmtime::Extern), String> {
        match self {
            Self::Func(f) => {
                let entry = store
                    .data()
                    .func_entry(f)
                    .map_err(|e| e.to_string())?;
                Ok((ExternType::Func(entry.ty.clone()), entry.raw.into()))
            }
            Self::Memory(m) => {
                let mut ty = validation::memory_type(&m.raw.ty(store))?;
                ty.minimum = m.raw.size(store);
                Ok((ExternType::Memory(ty), m.raw.into()))
            }
            Self::Table(t) => {
                let mut ty = validation::table_type(&t.raw.ty(store))?;
                ty.minimum = u64::from(t.raw.size(store));
                Ok((ExternType::Table(ty), t.raw.into()))
            }
            Self::Global(g) => Ok((ExternType::Global(g.ty), g.raw.into())),
        }
    }
}

impl From<Func> for Extern {
    fn from(f: Func) -> Self {
        Self::Func(f)
    }
}

impl From<Memory> for Extern {
    fn from(m: Memory) -> Self {
        Self::Memory(m)
    }
}

impl From<Table> for Extern {
    fn from(t: Table) -> Self {
        Self::Table(t)
    }
}

impl From<Global> for Extern {
    fn from(g: Global) -> Self {
        Self::Global(g)
    }
}

// ── Memory ──

/// Handle to a linear memory.
///
/// All byte access is bounds-checked against the memory's current size.
#[derive(Debug, Clone, Copy)]
pub struct Memory {
    context: ContextId,
    raw: wasmtime::Memory,
}

impl Memory {
    pub(crate) fn from_raw(context: ContextId, raw: wasmtime::Memory) -> Self {
        Self { context, raw }
    }

    /// Create a host-owned memory that instances may import.
    pub fn new<T>(mut ctx: impl AsContextMut<Data = T>, ty: MemoryType) -> Result<Memory, MemoryError> {
        let minimum = u32::try_from(ty.minimum)
            .map_err(|_| MemoryError::Limits(format!("minimum {} pages", ty.minimum)))?;
        let maximum = ty
            .maximum
            .map(u32::try_from)
            .transpose()
            .map_err(|_| MemoryError::Limits(format!("maximum {:?} pages", ty.maximum)))?;
        if maximum.is_some_and(|max| max < minimum) {
            return Err(MemoryError::Limits(format!(
                "maximum {:?} below minimum {}",
                ty.maximum, ty.minimum
            )));
        }

        let mut store = ctx.store_mut();
        let raw = wasmtime::Memory::new(&mut store, wasmtime::MemoryType::new(minimum, maximum))
            .map_err(|e| MemoryError::Limits(format!("{:#}", e)))?;
        Ok(Self {
            context: store.data().id,
            raw,
        })
    }

    fn check<T>(&self, data: &ContextData<T>) -> Result<(), MemoryError> {
        if data.id != self.context {
            return Err(MemoryError::ForeignHandle);
        }
        Ok(())
    }

    /// Current limits; the minimum is the current page count.
    pub fn ty<T>(&self, ctx: impl AsContext<Data = T>) -> Result<MemoryType, MemoryError> {
        let store = ctx.store();
        self.check(store.data())?;
        let mut ty = validation::memory_type(&self.raw.ty(&store)).map_err(MemoryError::Limits)?;
        ty.minimum = self.raw.size(&store);
        Ok(ty)
    }

    /// Current size in pages.
    pub fn pages<T>(&self, ctx: impl AsContext<Data = T>) -> Result<u64, MemoryError> {
        let store = ctx.store();
        self.check(store.data())?;
        Ok(self.raw.size(&store))
    }

    /// Current size in bytes.
    pub fn data_size<T>(&self, ctx: impl AsContext<Data = T>) -> Result<usize, MemoryError> {
        let store = ctx.store();
        self.check(store.data())?;
        Ok(self.raw.data_size(&store))
    }

    pub fn read<T>(
        &self,
        ctx: impl AsContext<Data = T>,
        offset: usize,
        buf: &mut [u8],
    ) -> Result<(), MemoryError> {
        let store = ctx.store();
        self.check(store.data())?;
        memory::read_bytes(self.raw.data(&store), offset, buf)
    }

    pub fn write<T>(
        &self,
        mut ctx: impl AsContextMut<Data = T>,
        offset: usize,
        bytes: &[u8],
    ) -> Result<(), MemoryError> {
        let mut store = ctx.store_mut();
        self.check(store.data())?;
        memory::write_bytes(self.raw.data_mut(&mut store), offset, bytes)
    }

    pub fn read_u32<T>(&self, ctx: impl AsContext<Data = T>, offset: usize) -> Result<u32, MemoryError> {
        let store = ctx.store();
        self.check(store.data())?;
        memory::read_u32(self.raw.data(&store), offset)
    }

    pub fn write_u32<T>(
        &self,
        mut ctx: impl AsContextMut<Data = T>,
        offset: usize,
        value: u32,
    ) -> Result<(), MemoryError> {
        let mut store = ctx.store_mut();
        self.check(store.data())?;
        memory::write_u32(self.raw.data_mut(&mut store), offset, value)
    }

    /// Grow by `delta` pages, returning the previous size in pages.
    pub fn grow<T>(&self, mut ctx: impl AsContextMut<Data = T>, delta: u64) -> Result<u64, MemoryError> {
        let mut store = ctx.store_mut();
        self.check(store.data())?;
        self.raw
            .grow(&mut store, delta)
            .map_err(|e| MemoryError::Grow(format!("{:#}", e)))
    }
}

// ── Table ──

/// Handle to a function table.
#[derive(Debug, Clone, Copy)]
pub struct Table {
    context: ContextId,
    raw: wasmtime::Table,
}

impl Table {
    pub(crate) fn from_raw(context: ContextId, raw: wasmtime::Table) -> Self {
        Self { context, raw }
    }

    /// Current limits, or `None` if the handle is foreign to `ctx`.
    pub fn ty<T>(&self, ctx: impl AsContext<Data = T>) -> Option<TableType> {
        let store = ctx.store();
        if store.data().id != self.context {
            return None;
        }
        let mut ty = validation::table_type(&self.raw.ty(&store)).ok()?;
        ty.minimum = u64::from(self.raw.size(&store));
        Some(ty)
    }

    /// Current number of elements, or `None` if the handle is foreign.
    pub fn size<T>(&self, ctx: impl AsContext<Data = T>) -> Option<u64> {
        let store = ctx.store();
        if store.data().id != self.context {
            return None;
        }
        Some(u64::from(self.raw.size(&store)))
    }
}

// ── Global ──

/// Handle to a global variable.
#[derive(Debug, Clone, Copy)]
pub struct Global {
    context: ContextId,
    raw: wasmtime::Global,
    ty: GlobalType,
}

impl Global {
    pub(crate) fn from_raw(context: ContextId, raw: wasmtime::Global, ty: GlobalType) -> Self {
        Self { context, raw, ty }
    }

    /// Create a host-owned global that instances may import.
    pub fn new<T>(
        mut ctx: impl AsContextMut<Data = T>,
        ty: GlobalType,
        init: Val,
    ) -> Result<Global, CallError> {
        check_kind(&ty, &init)?;
        let mut store = ctx.store_mut();
        let id = store.data().id;
        if !init.belongs_to(id) {
            return Err(CallError::ForeignHandle);
        }
        let value = init.to_wasm(store.data())?;
        let raw = wasmtime::Global::new(&mut store, validation::wasm_global_type(&ty), value)
            .map_err(|e| CallError::Internal(format!("{:#}", e)))?;
        Ok(Self { context: id, raw, ty })
    }

    pub fn ty(&self) -> GlobalType {
        self.ty
    }

    pub fn get<T>(&self, mut ctx: impl AsContextMut<Data = T>) -> Result<Val, CallError> {
        let mut store = ctx.store_mut();
        if store.data().id != self.context {
            return Err(CallError::ForeignHandle);
        }
        let raw = self.raw.get(&mut store);
        Val::from_wasm(&mut store, &raw, self.ty.content)
    }

    /// Overwrite the value. Immutable globals refuse.
    pub fn set<T>(&self, mut ctx: impl AsContextMut<Data = T>, value: Val) -> Result<(), CallError> {
        let mut store = ctx.store_mut();
        if store.data().id != self.context || !value.belongs_to(self.context) {
            return Err(CallError::ForeignHandle);
        }
        if !self.ty.mutable {
            return Err(CallError::Internal("global is immutable".into()));
        }
        check_kind(&self.ty, &value)?;
        let raw = value.to_wasm(store.data())?;
        self.raw
            .set(&mut store, raw)
            .map_err(|e| CallError::Internal(format!("{:#}", e)))
    }
}

fn check_kind(ty: &GlobalType, value: &Val) -> Result<(), TypeMismatch> {
    if value.kind() != ty.content {
        return Err(TypeMismatch::ArgumentKind {
            index: 0,
            expected: ty.content,
            found: value.kind(),
        });
    }
    Ok(())
}
