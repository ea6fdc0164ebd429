//! Execution contexts: isolated, single-owner containers of runtime state.
//!
//! A [`Context`] wraps one engine `Store`. Everything created "within" it
//! (host functions, instances, exported handles) lives in [`ContextData`]
//! and is addressed by index from `Copy` handles stamped with the context's
//! [`ContextId`]. A handle presented to any other context is rejected
//! before the engine is touched, so dropping a context leaves its handles
//! inert rather than dangling.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use wasmtime::{
    AsContext as _, AsContextMut as _, Store, StoreContext, StoreContextMut, StoreLimits,
    StoreLimitsBuilder,
};

use crate::environment::Environment;
use crate::error::{CallError, SandboxError};
use crate::func::{Func, FuncEntry};
use crate::instance::InstanceEntry;
use crate::value::Val;

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of an execution context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(u64);

impl ContextId {
    fn next() -> Self {
        Self(NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ctx#{}", self.0)
    }
}

/// State held inside the engine store of one context.
///
/// Opaque to hosts; reachable only through [`Context`] and [`Caller`](crate::Caller).
pub struct ContextData<T> {
    pub(crate) id: ContextId,
    pub(crate) data: T,
    pub(crate) funcs: Vec<FuncEntry<T>>,
    /// Engine function identity to position in `funcs`.
    pub(crate) func_keys: HashMap<usize, usize>,
    pub(crate) instances: Vec<InstanceEntry>,
    pub(crate) limits: StoreLimits,
    pub(crate) depth: u32,
    pub(crate) max_depth: u32,
}

impl<T> ContextData<T> {
    /// Register a callable under its engine identity and hand out its handle.
    pub(crate) fn push_func(&mut self, key: usize, entry: FuncEntry<T>) -> Func {
        let index = self.funcs.len();
        self.funcs.push(entry);
        self.func_keys.insert(key, index);
        Func::from_parts(self.id, index)
    }

    /// Handle of an already registered engine function.
    pub(crate) fn func_by_key(&self, key: usize) -> Option<Func> {
        self.func_keys
            .get(&key)
            .map(|&index| Func::from_parts(self.id, index))
    }

    /// Look up a callable, rejecting handles minted by other contexts.
    pub(crate) fn func_entry(&self, func: &Func) -> Result<&FuncEntry<T>, CallError> {
        if func.context() != self.id {
            return Err(CallError::ForeignHandle);
        }
        self.funcs.get(func.index()).ok_or(CallError::ForeignHandle)
    }
}

/// An isolated execution context carrying host data of type `T`.
///
/// Not shareable between threads without external synchronization; all
/// access goes through `&mut`. Dropping the context releases every
/// instance and function created in it.
pub struct Context<T> {
    store: Store<ContextData<T>>,
    env: Environment,
}

impl<T: 'static> Context<T> {
    /// Create a fresh context seeded with host data.
    pub fn new(env: &Environment, data: T) -> Self {
        let config = env.config();
        let id = ContextId::next();
        let limits = StoreLimitsBuilder::new()
            .memory_size(config.max_memory_bytes())
            .instances(config.max_instances)
            .build();

        let mut store = Store::new(
            env.engine(),
            ContextData {
                id,
                data,
                funcs: Vec::new(),
                func_keys: HashMap::new(),
                instances: Vec::new(),
                limits,
                depth: 0,
                max_depth: config.max_call_depth,
            },
        );
        store.limiter(|data| &mut data.limits);

        if let Some(fuel) = config.fuel_limit {
            if let Err(err) = store.set_fuel(fuel) {
                tracing::warn!(context = %id, error = %err, "could not apply fuel budget");
            }
        }

        tracing::debug!(context = %id, fuel = ?config.fuel_limit, "execution context created");
        Self {
            store,
            env: env.clone(),
        }
    }
}

impl<T> Context<T> {
    pub fn id(&self) -> ContextId {
        self.store.data().id
    }

    /// The environment this context was created from.
    pub fn environment(&self) -> &Environment {
        &self.env
    }

    /// Host-attached data.
    pub fn data(&self) -> &T {
        &self.store.data().data
    }

    pub fn data_mut(&mut self) -> &mut T {
        &mut self.store.data_mut().data
    }

    /// Tear the context down and return the host data.
    pub fn into_data(self) -> T {
        self.store.into_data().data
    }

    /// Remaining fuel, or `None` when metering is disabled.
    pub fn fuel(&self) -> Option<u64> {
        self.store.get_fuel().ok()
    }

    /// Reset the fuel budget.
    pub fn set_fuel(&mut self, fuel: u64) -> Result<(), SandboxError> {
        if self.env.config().fuel_limit.is_none() {
            return Err(SandboxError::FuelDisabled);
        }
        self.store
            .set_fuel(fuel)
            .map_err(|_| SandboxError::FuelDisabled)
    }

    /// Number of distinct callables registered in this context.
    pub fn func_count(&self) -> usize {
        self.store.data().funcs.len()
    }

    /// Number of instances successfully linked in this context.
    pub fn instance_count(&self) -> usize {
        self.store.data().instances.len()
    }

    /// Invoke `func` with `args`. See [`Func::call`].
    pub fn call(&mut self, func: &Func, args: &[Val]) -> Result<Vec<Val>, CallError> {
        func.call(self, args)
    }
}

impl<T: fmt::Debug> fmt::Debug for Context<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("id", &self.id())
            .field("data", self.data())
            .field("funcs", &self.func_count())
            .field("instances", &self.instance_count())
            .finish()
    }
}

/// Read access to an execution context's state.
///
/// Implemented by [`Context`], by the [`Caller`](crate::Caller) token
/// handed to host functions, and by references to either.
pub trait AsContext {
    /// Host data type of the context.
    type Data;

    #[doc(hidden)]
    fn store(&self) -> StoreContext<'_, ContextData<Self::Data>>;
}

/// Mutable access to an execution context's state.
pub trait AsContextMut: AsContext {
    #[doc(hidden)]
    fn store_mut(&mut self) -> StoreContextMut<'_, ContextData<Self::Data>>;
}

impl<T> AsContext for Context<T> {
    type Data = T;

    fn store(&self) -> StoreContext<'_, ContextData<T>> {
        self.store.as_context()
    }
}

impl<T> AsContextMut for Context<T> {
    fn store_mut(&mut self) -> StoreContextMut<'_, ContextData<T>> {
        self.store.as_context_mut()
    }
}

impl<C: AsContext + ?Sized> AsContext for &C {
    type Data = C::Data;

    fn store(&self) -> StoreContext<'_, ContextData<C::Data>> {
        (**self).store()
    }
}

impl<C: AsContext + ?Sized> AsContext for &mut C {
    type Data = C::Data;

    fn store(&self) -> StoreContext<'_, ContextData<C::Data>> {
        (**self).store()
    }
}

impl<C: AsContextMut + ?Sized> AsContextMut for &mut C {
    fn store_mut(&mut self) -> StoreContextMut<'_, ContextData<C::Data>> {
        (**self).store_mut()
    }
}
