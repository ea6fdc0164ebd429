//! Callable entities and the uniform call routine.
//!
//! A [`Func`] is either a host closure registered with [`Func::new`] or a
//! guest function obtained from an instance export (or a function reference
//! the guest handed back). Callers never see the difference: every call,
//! whether it starts on the host, in a host function re-entering the
//! context, or in guest code calling an import, goes through the same
//! checks:
//!
//! 1. The handle must belong to the context
//! 2. Argument count and kinds must match the signature
//! 3. Argument references must belong to the context
//! 4. The nesting depth must stay under `max_call_depth`
//!
//! Host functions additionally have their result slots checked after they
//! return success.
//!
//! ## Host failures inside guest frames
//!
//! When guest code calls a host import that fails, the engine receives the
//! failure as a [`CallError`] boxed in `anyhow::Error`. It unwinds the guest
//! frames and hands it back untouched, so [`CallError::from_wasmtime`]
//! recovers the original classification at the outer call.

use std::fmt;
use std::sync::Arc;

use harbor_hostapi::{ContractViolation, FuncType, HostError, ValKind};
use wasmtime::{AsContext as _, AsContextMut as _, StoreContext, StoreContextMut};

use crate::context::{AsContext, AsContextMut, ContextData, ContextId};
use crate::error::{CallError, Trap, TrapCode};
use crate::validation;
use crate::value::Val;

/// Boxed host closure.
pub(crate) type HostCallback<T> = Arc<
    dyn Fn(Caller<'_, T>, &[Val], &mut [Option<Val>]) -> Result<(), HostError> + Send + Sync,
>;

pub(crate) enum FuncKind<T> {
    Host(HostCallback<T>),
    Guest,
}

/// Per-context record behind a [`Func`] handle.
pub(crate) struct FuncEntry<T> {
    pub(crate) ty: FuncType,
    pub(crate) raw: wasmtime::Func,
    pub(crate) kind: FuncKind<T>,
}

impl<T> FuncEntry<T> {
    pub(crate) fn guest(ty: FuncType, raw: wasmtime::Func) -> Self {
        Self {
            ty,
            raw,
            kind: FuncKind::Guest,
        }
    }

    fn host_callback(&self) -> Option<HostCallback<T>> {
        match &self.kind {
            FuncKind::Host(callback) => Some(Arc::clone(callback)),
            FuncKind::Guest => None,
        }
    }
}

/// Handle to a callable entity owned by one execution context.
///
/// Cheap to copy. Only meaningful inside the context that created it;
/// everywhere else it is rejected with [`CallError::ForeignHandle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Func {
    context: ContextId,
    index: usize,
}

impl Func {
    pub(crate) fn from_parts(context: ContextId, index: usize) -> Self {
        Self { context, index }
    }

    pub(crate) fn index(&self) -> usize {
        self.index
    }

    /// The context this handle belongs to.
    pub fn context(&self) -> ContextId {
        self.context
    }

    /// Register a host function in the context.
    ///
    /// `func` receives a [`Caller`] token, the checked arguments, and one
    /// empty slot per declared result. Returning `Ok` obliges it to have
    /// filled every slot with a value of the declared kind; returning `Err`
    /// aborts the call with [`CallError::Host`].
    pub fn new<T, F>(mut ctx: impl AsContextMut<Data = T>, ty: FuncType, func: F) -> Func
    where
        T: 'static,
        F: Fn(Caller<'_, T>, &[Val], &mut [Option<Val>]) -> Result<(), HostError>
            + Send
            + Sync
            + 'static,
    {
        let mut store = ctx.store_mut();
        let callback: HostCallback<T> = Arc::new(func);
        let wasm_ty = validation::wasm_func_type(store.engine(), &ty);
        let raw = {
            let ty = ty.clone();
            let callback = Arc::clone(&callback);
            wasmtime::Func::new(
                &mut store,
                wasm_ty,
                move |caller: wasmtime::Caller<'_, ContextData<T>>,
                      params: &[wasmtime::Val],
                      results: &mut [wasmtime::Val]| {
                    host_trampoline(caller, &ty, &callback, params, results)
                },
            )
        };
        let key = raw_key(&mut store, &raw);
        let func = store.data_mut().push_func(
            key,
            FuncEntry {
                ty,
                raw,
                kind: FuncKind::Host(callback),
            },
        );
        tracing::trace!(context = %func.context, index = func.index, "host function registered");
        func
    }

    /// Signature of the callable, or `None` if the handle is foreign to `ctx`.
    pub fn ty<T>(&self, ctx: impl AsContext<Data = T>) -> Option<FuncType> {
        let store = ctx.store();
        store.data().func_entry(self).ok().map(|entry| entry.ty.clone())
    }

    /// Whether the handle was registered with [`Func::new`], or `None` if
    /// the handle is foreign to `ctx`.
    ///
    /// A host function passed into guest code and handed back keeps its
    /// handle and reports `true`. An instance export that re-exports a host
    /// import is a distinct guest-side handle and reports `false`; calling
    /// it still runs the host closure.
    pub fn is_host<T>(&self, ctx: impl AsContext<Data = T>) -> Option<bool> {
        let store = ctx.store();
        store
            .data()
            .func_entry(self)
            .ok()
            .map(|entry| matches!(entry.kind, FuncKind::Host(_)))
    }

    /// Invoke the callable with `args` and return its results.
    ///
    /// Arguments are checked against the signature before anything runs.
    /// On failure the context stays usable; guest state already mutated by
    /// a trapping call is not rolled back.
    pub fn call<T>(
        &self,
        mut ctx: impl AsContextMut<Data = T>,
        args: &[Val],
    ) -> Result<Vec<Val>, CallError> {
        call_func(ctx.store_mut(), *self, args)
    }
}

/// Token handed to a host function for the duration of one invocation.
///
/// Grants access to the invoking context: its host data, and the ability
/// to call back into any callable the context owns.
pub struct Caller<'a, T> {
    store: StoreContextMut<'a, ContextData<T>>,
}

impl<'a, T> Caller<'a, T> {
    pub(crate) fn new(store: StoreContextMut<'a, ContextData<T>>) -> Self {
        Self { store }
    }

    /// The invoking context's identity.
    pub fn context_id(&self) -> ContextId {
        self.store.data().id
    }

    pub fn data(&self) -> &T {
        &self.store.data().data
    }

    pub fn data_mut(&mut self) -> &mut T {
        &mut self.store.data_mut().data
    }

    /// Re-enter the context through the call routine.
    pub fn call(&mut self, func: &Func, args: &[Val]) -> Result<Vec<Val>, CallError> {
        call_func(self.store.as_context_mut(), *func, args)
    }

    /// Remaining fuel, or `None` when metering is disabled.
    pub fn fuel(&self) -> Option<u64> {
        self.store.get_fuel().ok()
    }
}

impl<T> fmt::Debug for Caller<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Caller")
            .field("context", &self.context_id())
            .finish_non_exhaustive()
    }
}

impl<T> AsContext for Caller<'_, T> {
    type Data = T;

    fn store(&self) -> StoreContext<'_, ContextData<T>> {
        self.store.as_context()
    }
}

impl<T> AsContextMut for Caller<'_, T> {
    fn store_mut(&mut self) -> StoreContextMut<'_, ContextData<T>> {
        self.store.as_context_mut()
    }
}

/// Identity of an engine function within its store.
///
/// Every handle the engine produces for one function resolves to the same
/// key for as long as the store lives.
#[allow(unused_unsafe)]
fn raw_key<T>(store: &mut StoreContextMut<'_, ContextData<T>>, raw: &wasmtime::Func) -> usize {
    // SAFETY: the pointer is only compared, never dereferenced or turned
    // back into a function.
    unsafe { raw.to_raw(&mut *store) as usize }
}

/// Handle for a function the engine handed out, registering it as guest
/// code the first time it is seen.
///
/// `ty` is taken from the engine when the caller does not already know it.
pub(crate) fn guest_handle<T>(
    store: &mut StoreContextMut<'_, ContextData<T>>,
    raw: wasmtime::Func,
    ty: Option<FuncType>,
) -> Result<Func, String> {
    let key = raw_key(store, &raw);
    if let Some(func) = store.data().func_by_key(key) {
        return Ok(func);
    }
    let ty = match ty {
        Some(ty) => ty,
        None => validation::func_type(&raw.ty(&*store))?,
    };
    Ok(store.data_mut().push_func(key, FuncEntry::guest(ty, raw)))
}

// ── Call routine ──

/// The single dispatch path for every call.
pub(crate) fn call_func<T>(
    mut store: StoreContextMut<'_, ContextData<T>>,
    func: Func,
    args: &[Val],
) -> Result<Vec<Val>, CallError> {
    let (ty, raw, callback) = {
        let entry = store.data().func_entry(&func)?;
        (entry.ty.clone(), entry.raw, entry.host_callback())
    };

    let kinds: Vec<ValKind> = args.iter().map(Val::kind).collect();
    ty.check_params(&kinds)?;
    let id = store.data().id;
    if args.iter().any(|arg| !arg.belongs_to(id)) {
        return Err(CallError::ForeignHandle);
    }

    let data = store.data_mut();
    if data.depth >= data.max_depth {
        return Err(Trap::new(
            TrapCode::CallDepthExceeded,
            format!("more than {} nested calls", data.max_depth),
        )
        .into());
    }
    data.depth += 1;
    tracing::trace!(
        context = %id,
        index = func.index,
        host = callback.is_some(),
        depth = data.depth,
        "dispatching call"
    );

    let result = match callback {
        Some(callback) => invoke_host(store.as_context_mut(), &ty, &callback, args),
        None => invoke_guest(store.as_context_mut(), &ty, raw, args),
    };

    store.data_mut().depth -= 1;
    result
}

/// Run a host closure and enforce its result contract.
fn invoke_host<T>(
    mut store: StoreContextMut<'_, ContextData<T>>,
    ty: &FuncType,
    callback: &HostCallback<T>,
    args: &[Val],
) -> Result<Vec<Val>, CallError> {
    let mut slots: Vec<Option<Val>> = vec![None; ty.results().len()];
    (**callback)(Caller::new(store.as_context_mut()), args, slots.as_mut_slice())?;

    let written: Vec<Option<ValKind>> = slots.iter().map(|slot| slot.map(|v| v.kind())).collect();
    ty.check_results(&written)?;

    let id = store.data().id;
    if let Some(index) = slots
        .iter()
        .position(|slot| slot.is_some_and(|v| !v.belongs_to(id)))
    {
        return Err(ContractViolation::ForeignReference { index }.into());
    }
    Ok(slots.into_iter().flatten().collect())
}

/// Run guest code through the engine.
fn invoke_guest<T>(
    mut store: StoreContextMut<'_, ContextData<T>>,
    ty: &FuncType,
    raw: wasmtime::Func,
    args: &[Val],
) -> Result<Vec<Val>, CallError> {
    let params = args
        .iter()
        .map(|arg| arg.to_wasm(store.data()))
        .collect::<Result<Vec<_>, _>>()?;
    let mut results = vec![wasmtime::Val::I32(0); ty.results().len()];

    raw.call(&mut store, &params, &mut results)
        .map_err(CallError::from_wasmtime)?;

    results
        .iter()
        .zip(ty.results())
        .map(|(result, kind)| Val::from_wasm(&mut store, result, *kind))
        .collect()
}

/// Engine-facing entry point of a host function called from guest code.
///
/// Arguments were type-checked by the engine against the declared
/// signature; the call routine's result contract still applies.
fn host_trampoline<T>(
    mut caller: wasmtime::Caller<'_, ContextData<T>>,
    ty: &FuncType,
    callback: &HostCallback<T>,
    params: &[wasmtime::Val],
    results: &mut [wasmtime::Val],
) -> anyhow::Result<()> {
    let mut store = caller.as_context_mut();
    let args = params
        .iter()
        .zip(ty.params())
        .map(|(param, kind)| Val::from_wasm(&mut store, param, *kind))
        .collect::<Result<Vec<_>, _>>()?;

    let outputs = invoke_host(store.as_context_mut(), ty, callback, &args)?;
    for (slot, value) in results.iter_mut().zip(&outputs) {
        *slot = value.to_wasm(store.data())?;
    }
    Ok(())
}
