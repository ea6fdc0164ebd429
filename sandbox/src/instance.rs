//! Linked instances.
//!
//! Instantiation resolves an artifact's imports positionally against the
//! host-supplied externs and then runs the module's initialization. Every
//! import is checked by this layer first, in declaration order, so the
//! reported failure names the first offending import:
//!
//! 1. The artifact's environment must be the context's environment
//! 2. Each declared import needs a provided item (`MissingImport`)
//! 3. The item must belong to the context (`ForeignImport`)
//! 4. The kinds must agree (`KindMismatch`)
//! 5. Function signatures must be identical (`SignatureMismatch`)
//! 6. Memory and table limits must be compatible; globals identical
//!    (`IncompatibleType`)
//! 7. No surplus items (`UnexpectedImports`)
//!
//! Only then is the engine asked to instantiate. If initialization traps,
//! nothing is registered and the failure is reported as
//! [`LinkError::Trapped`].

use std::collections::HashMap;

use harbor_hostapi::ExternType;
use wasmtime::{Engine, StoreContextMut};

use crate::artifact::Artifact;
use crate::context::{AsContext, AsContextMut, ContextData, ContextId};
use crate::error::LinkError;
use crate::externals::{Extern, Global, Memory, Table};
use crate::func::{self, Func};

/// Per-context record behind an [`Instance`] handle.
pub(crate) struct InstanceEntry {
    raw: wasmtime::Instance,
    artifact: Artifact,
    exports: HashMap<String, Extern>,
}

/// Handle to a linked instance owned by one execution context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Instance {
    context: ContextId,
    index: usize,
}

impl Instance {
    /// Link `artifact` in the context using `imports`, one per declared
    /// import, in declaration order.
    pub fn new<T>(
        mut ctx: impl AsContextMut<Data = T>,
        artifact: &Artifact,
        imports: &[Extern],
    ) -> Result<Instance, LinkError> {
        let mut store = ctx.store_mut();
        if !Engine::same(store.engine(), artifact.module().engine()) {
            return Err(LinkError::EnvironmentMismatch);
        }

        let resolved = resolve_imports(&store, artifact, imports)?;
        let raw = wasmtime::Instance::new(&mut store, artifact.module(), &resolved).map_err(|err| {
            let err = LinkError::from_instantiation(err);
            tracing::debug!(artifact = %artifact.digest_hex(), error = %err, "instantiation failed");
            err
        })?;

        let data = store.data_mut();
        let index = data.instances.len();
        data.instances.push(InstanceEntry {
            raw,
            artifact: artifact.clone(),
            exports: HashMap::new(),
        });
        tracing::debug!(
            context = %data.id,
            instance = index,
            artifact = %artifact.digest_hex(),
            "instance linked"
        );
        Ok(Instance {
            context: data.id,
            index,
        })
    }

    /// The context this handle belongs to.
    pub fn context(&self) -> ContextId {
        self.context
    }

    /// Look up an export by name.
    ///
    /// Returns `None` for unknown names and for handles foreign to `ctx`.
    /// Repeated lookups of one name return the same handle.
    pub fn get_export<T>(&self, mut ctx: impl AsContextMut<Data = T>, name: &str) -> Option<Extern> {
        let mut store = ctx.store_mut();
        if store.data().id != self.context {
            return None;
        }

        let (raw, ty) = {
            let entry = store.data().instances.get(self.index)?;
            if let Some(cached) = entry.exports.get(name) {
                return Some(*cached);
            }
            (entry.raw, entry.artifact.export(name)?.ty.clone())
        };

        let id = self.context;
        let ext = match (raw.get_export(&mut store, name)?, ty) {
            (wasmtime::Extern::Func(f), ExternType::Func(ty)) => {
                Extern::Func(func::guest_handle(&mut store, f, Some(ty)).ok()?)
            }
            (wasmtime::Extern::Memory(m), ExternType::Memory(_)) => {
                Extern::Memory(Memory::from_raw(id, m))
            }
            (wasmtime::Extern::Table(t), ExternType::Table(_)) => {
                Extern::Table(Table::from_raw(id, t))
            }
            (wasmtime::Extern::Global(g), ExternType::Global(ty)) => {
                Extern::Global(Global::from_raw(id, g, ty))
            }
            _ => return None,
        };

        if let Some(entry) = store.data_mut().instances.get_mut(self.index) {
            entry.exports.insert(name.to_string(), ext);
        }
        Some(ext)
    }

    pub fn get_func<T>(&self, ctx: impl AsContextMut<Data = T>, name: &str) -> Option<Func> {
        self.get_export(ctx, name)?.into_func()
    }

    pub fn get_memory<T>(&self, ctx: impl AsContextMut<Data = T>, name: &str) -> Option<Memory> {
        self.get_export(ctx, name)?.into_memory()
    }

    pub fn get_global<T>(&self, ctx: impl AsContextMut<Data = T>, name: &str) -> Option<Global> {
        self.get_export(ctx, name)?.into_global()
    }

    /// Every export, in declaration order.
    pub fn exports<T>(&self, mut ctx: impl AsContextMut<Data = T>) -> Vec<(String, Extern)> {
        let Some(artifact) = self.artifact(&ctx) else {
            return Vec::new();
        };
        artifact
            .exports()
            .iter()
            .filter_map(|export| {
                self.get_export(&mut ctx, &export.name)
                    .map(|ext| (export.name.clone(), ext))
            })
            .collect()
    }

    /// The artifact this instance was linked from.
    pub fn artifact<T>(&self, ctx: impl AsContext<Data = T>) -> Option<Artifact> {
        let store = ctx.store();
        if store.data().id != self.context {
            return None;
        }
        store
            .data()
            .instances
            .get(self.index)
            .map(|entry| entry.artifact.clone())
    }
}

/// Check every provided item against the artifact's declared imports and
/// lower them for the engine.
fn resolve_imports<T>(
    store: &StoreContextMut<'_, ContextData<T>>,
    artifact: &Artifact,
    provided: &[Extern],
) -> Result<Vec<wasmtime::Extern>, LinkError> {
    let id = store.data().id;
    let declared = artifact.imports();
    let mut resolved = Vec::with_capacity(declared.len());

    for (index, import) in declared.iter().enumerate() {
        let Some(item) = provided.get(index) else {
            return Err(LinkError::MissingImport {
                index,
                module: import.module.clone(),
                name: import.name.clone(),
                expected: import.ty.clone(),
            });
        };

        if item.context() != id {
            return Err(LinkError::ForeignImport {
                module: import.module.clone(),
                name: import.name.clone(),
            });
        }

        let (ty, raw) = item.lower(store).map_err(LinkError::Instantiate)?;
        if ty.kind() != import.ty.kind() {
            return Err(LinkError::KindMismatch {
                module: import.module.clone(),
                name: import.name.clone(),
                expected: import.ty.kind(),
                provided: ty.kind(),
            });
        }
        if let (ExternType::Func(expected), ExternType::Func(found)) = (&import.ty, &ty) {
            if expected != found {
                return Err(LinkError::SignatureMismatch {
                    module: import.module.clone(),
                    name: import.name.clone(),
                    expected: expected.clone(),
                    provided: found.clone(),
                });
            }
        }
        if !import.ty.accepts(&ty) {
            return Err(LinkError::IncompatibleType {
                module: import.module.clone(),
                name: import.name.clone(),
                expected: import.ty.clone(),
                provided: ty,
            });
        }
        resolved.push(raw);
    }

    if provided.len() > declared.len() {
        return Err(LinkError::UnexpectedImports {
            declared: declared.len(),
            provided: provided.len(),
        });
    }
    Ok(resolved)
}
