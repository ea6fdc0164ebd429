//! Name-based import resolution.
//!
//! [`Instance::new`] takes imports positionally. A [`Linker`] lets hosts
//! register items under `module::name` once and then instantiate any
//! artifact whose imports they cover. Resolution produces the positional
//! list and hands it to `Instance::new`, so all of its checks still apply.

use std::collections::HashMap;
use std::marker::PhantomData;

use harbor_hostapi::{FuncType, HostError};

use crate::artifact::Artifact;
use crate::context::AsContextMut;
use crate::error::LinkError;
use crate::externals::Extern;
use crate::func::{Caller, Func};
use crate::instance::Instance;
use crate::value::Val;

/// Registry of named items for contexts carrying host data `T`.
pub struct Linker<T> {
    definitions: HashMap<(String, String), Extern>,
    allow_shadowing: bool,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Default for Linker<T> {
    fn default() -> Self {
        Self {
            definitions: HashMap::new(),
            allow_shadowing: false,
            _marker: PhantomData,
        }
    }
}

impl<T: 'static> Linker<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Permit later definitions to replace earlier ones with the same name.
    pub fn allow_shadowing(&mut self, allow: bool) -> &mut Self {
        self.allow_shadowing = allow;
        self
    }

    /// Register `item` as `module::name`.
    pub fn define(
        &mut self,
        module: &str,
        name: &str,
        item: impl Into<Extern>,
    ) -> Result<&mut Self, LinkError> {
        let key = (module.to_string(), name.to_string());
        if !self.allow_shadowing && self.definitions.contains_key(&key) {
            return Err(LinkError::Duplicate {
                module: key.0,
                name: key.1,
            });
        }
        self.definitions.insert(key, item.into());
        Ok(self)
    }

    /// Create a host function in `ctx` and register it as `module::name`.
    pub fn func_new<F>(
        &mut self,
        ctx: impl AsContextMut<Data = T>,
        module: &str,
        name: &str,
        ty: FuncType,
        func: F,
    ) -> Result<&mut Self, LinkError>
    where
        F: Fn(Caller<'_, T>, &[Val], &mut [Option<Val>]) -> Result<(), HostError>
            + Send
            + Sync
            + 'static,
    {
        let func = Func::new(ctx, ty, func);
        self.define(module, name, func)
    }

    /// Register every export of `instance` under `module`.
    pub fn instance(
        &mut self,
        mut ctx: impl AsContextMut<Data = T>,
        module: &str,
        instance: Instance,
    ) -> Result<&mut Self, LinkError> {
        for (name, item) in instance.exports(&mut ctx) {
            self.define(module, &name, item)?;
        }
        Ok(self)
    }

    pub fn get(&self, module: &str, name: &str) -> Option<Extern> {
        self.definitions
            .get(&(module.to_string(), name.to_string()))
            .copied()
    }

    /// Build the positional import list for `artifact`.
    pub fn resolve(&self, artifact: &Artifact) -> Result<Vec<Extern>, LinkError> {
        artifact
            .imports()
            .iter()
            .enumerate()
            .map(|(index, import)| {
                self.get(&import.module, &import.name)
                    .ok_or_else(|| LinkError::MissingImport {
                        index,
                        module: import.module.clone(),
                        name: import.name.clone(),
                        expected: import.ty.clone(),
                    })
            })
            .collect()
    }

    /// Resolve `artifact`'s imports by name and link it in `ctx`.
    pub fn instantiate(
        &self,
        ctx: impl AsContextMut<Data = T>,
        artifact: &Artifact,
    ) -> Result<Instance, LinkError> {
        let imports = self.resolve(artifact)?;
        Instance::new(ctx, artifact, &imports)
    }
}
