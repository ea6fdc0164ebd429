//! Compiled artifacts.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use harbor_hostapi::{ExportType, ImportType};
use wasmtime::Module;

use crate::error::CompileError;
use crate::validation::{describe_exports, describe_imports};

/// Immutable result of compiling a module.
///
/// Cheap to clone and safe to share across threads. Any number of
/// contexts created from the same environment may instantiate it.
#[derive(Clone)]
pub struct Artifact {
    inner: Arc<ArtifactInner>,
}

struct ArtifactInner {
    module: Module,
    digest: blake3::Hash,
    imports: Vec<ImportType>,
    exports: Vec<ExportType>,
    export_index: HashMap<String, usize>,
}

impl Artifact {
    /// Describe the boundary of an engine-accepted module.
    pub(crate) fn from_module(module: Module, digest: blake3::Hash) -> Result<Self, CompileError> {
        let imports = describe_imports(&module)?;
        let exports = describe_exports(&module)?;
        let export_index = exports
            .iter()
            .enumerate()
            .map(|(i, export)| (export.name.clone(), i))
            .collect();
        Ok(Self {
            inner: Arc::new(ArtifactInner {
                module,
                digest,
                imports,
                exports,
                export_index,
            }),
        })
    }

    pub(crate) fn module(&self) -> &Module {
        &self.inner.module
    }

    /// Declared imports, in the order instantiation expects them.
    pub fn imports(&self) -> &[ImportType] {
        &self.inner.imports
    }

    /// Declared exports, in declaration order.
    pub fn exports(&self) -> &[ExportType] {
        &self.inner.exports
    }

    pub fn export(&self, name: &str) -> Option<&ExportType> {
        self.inner
            .export_index
            .get(name)
            .and_then(|&i| self.inner.exports.get(i))
    }

    /// Module name from the name section, if any.
    pub fn name(&self) -> Option<&str> {
        self.inner.module.name()
    }

    /// BLAKE3 digest of the compiled input.
    pub fn digest(&self) -> [u8; 32] {
        *self.inner.digest.as_bytes()
    }

    pub(crate) fn cache_key(&self) -> &blake3::Hash {
        &self.inner.digest
    }

    pub fn digest_hex(&self) -> String {
        self.inner.digest.to_hex().to_string()
    }

    /// True when both handles refer to the same compiled artifact.
    pub fn ptr_eq(a: &Artifact, b: &Artifact) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner)
    }
}

impl fmt::Debug for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Artifact")
            .field("digest", &self.digest_hex())
            .field("imports", &self.inner.imports.len())
            .field("exports", &self.inner.exports.len())
            .finish()
    }
}
