//! Compilation environments: engine configuration plus an artifact cache.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use wasmtime::{Config, Engine, Module};

use crate::artifact::Artifact;
use crate::config::SandboxConfig;
use crate::error::CompileError;

/// Shared compilation environment.
///
/// Cloning is cheap; clones refer to the same engine and cache. Safe to
/// use from many threads at once.
#[derive(Clone)]
pub struct Environment {
    inner: Arc<EnvironmentInner>,
}

struct EnvironmentInner {
    engine: Engine,
    config: SandboxConfig,
    cache: Option<RwLock<HashMap<blake3::Hash, Artifact>>>,
}

impl Environment {
    /// Create an environment. Fails only if the engine rejects the
    /// configuration.
    pub fn new(config: SandboxConfig) -> Result<Self, CompileError> {
        let engine = create_engine(&config)?;
        let cache = config.cache_artifacts.then(|| RwLock::new(HashMap::new()));
        tracing::debug!(
            deterministic = config.deterministic,
            fuel = ?config.fuel_limit,
            max_memory_pages = config.max_memory_pages,
            "environment created"
        );
        Ok(Self {
            inner: Arc::new(EnvironmentInner {
                engine,
                config,
                cache,
            }),
        })
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.inner.config
    }

    pub(crate) fn engine(&self) -> &Engine {
        &self.inner.engine
    }

    /// Compile a module from binary or text form.
    ///
    /// Identical input yields a structurally identical artifact; with the
    /// cache enabled it yields the very same artifact.
    pub fn compile(&self, input: impl AsRef<[u8]>) -> Result<Artifact, CompileError> {
        let input = input.as_ref();
        let digest = blake3::hash(input);

        if let Some(cache) = &self.inner.cache {
            if let Some(hit) = read_lock(cache).get(&digest) {
                tracing::trace!(digest = %digest, "artifact cache hit");
                return Ok(hit.clone());
            }
        }

        let module = Module::new(&self.inner.engine, input)
            .map_err(|e| CompileError::Malformed(format!("{:#}", e)))?;
        let artifact = Artifact::from_module(module, digest)?;
        tracing::debug!(
            digest = %digest,
            imports = artifact.imports().len(),
            exports = artifact.exports().len(),
            "module compiled"
        );

        match &self.inner.cache {
            Some(cache) => Ok(write_lock(cache)
                .entry(digest)
                .or_insert(artifact)
                .clone()),
            None => Ok(artifact),
        }
    }

    /// Drop `artifact` from the cache. Returns whether it was cached.
    ///
    /// Handles already given out stay valid; the next compile of the same
    /// input produces a fresh artifact.
    pub fn evict_artifact(&self, artifact: &Artifact) -> bool {
        let Some(cache) = &self.inner.cache else {
            return false;
        };
        let key = artifact.cache_key();
        let mut cache = write_lock(cache);
        if !cache.get(key).is_some_and(|cached| Artifact::ptr_eq(cached, artifact)) {
            return false;
        }
        cache.remove(key);
        tracing::debug!(digest = %artifact.digest_hex(), "artifact evicted");
        true
    }

    /// Drop every cached artifact.
    pub fn clear_cache(&self) {
        if let Some(cache) = &self.inner.cache {
            let mut cache = write_lock(cache);
            tracing::debug!(evicted = cache.len(), "artifact cache cleared");
            cache.clear();
        }
    }

    /// Number of artifacts held by the cache.
    pub fn cached_artifacts(&self) -> usize {
        self.inner
            .cache
            .as_ref()
            .map_or(0, |cache| read_lock(cache).len())
    }

    /// True when both handles refer to the same environment.
    pub fn same(a: &Environment, b: &Environment) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner)
    }
}

impl std::fmt::Debug for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Environment")
            .field("config", &self.inner.config)
            .field("cached_artifacts", &self.cached_artifacts())
            .finish()
    }
}

// A poisoned cache still holds fully inserted entries.
fn read_lock<V>(lock: &RwLock<V>) -> RwLockReadGuard<'_, V> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write_lock<V>(lock: &RwLock<V>) -> RwLockWriteGuard<'_, V> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Create a Wasmtime engine from the sandbox configuration.
fn create_engine(config: &SandboxConfig) -> Result<Engine, CompileError> {
    let mut wasm_config = Config::new();

    // Fuel metering, only when a budget is configured
    wasm_config.consume_fuel(config.fuel_limit.is_some());

    // Determinism enforcement
    if config.deterministic {
        wasm_config.wasm_threads(false);
        wasm_config.wasm_simd(false);
        wasm_config.wasm_relaxed_simd(false);
        wasm_config.wasm_multi_memory(false);
        wasm_config.cranelift_nan_canonicalization(true);
    }

    wasm_config.max_wasm_stack(config.max_wasm_stack);
    wasm_config.wasm_backtrace(config.capture_backtraces);

    Engine::new(&wasm_config).map_err(|e| CompileError::Config(format!("{:#}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const ADD_WAT: &str = r#"
        (module
            (func (export "add") (param i32 i32) (result i32)
                local.get 0
                local.get 1
                i32.add)
        )
    "#;

    #[test]
    fn test_create_engine() {
        let config = SandboxConfig::default();
        assert!(create_engine(&config).is_ok());
    }

    #[test]
    fn test_compile_rejects_invalid_module() {
        let env = Environment::new(SandboxConfig::default()).unwrap();
        // Body leaves nothing on the stack for the declared result.
        let err = env.compile("(module (func (result i32)))").unwrap_err();
        assert!(matches!(err, CompileError::Malformed(_)));
        assert_eq!(env.cached_artifacts(), 0);
    }

    #[test]
    fn test_compile_rejects_garbage() {
        let env = Environment::new(SandboxConfig::default()).unwrap();
        assert!(env.compile(b"\0asm\x07\0\0\0garbage").is_err());
    }

    #[test]
    fn test_cache_returns_same_artifact() {
        let env = Environment::new(SandboxConfig::default()).unwrap();
        let a = env.compile(ADD_WAT).unwrap();
        let b = env.compile(ADD_WAT).unwrap();
        assert!(Artifact::ptr_eq(&a, &b));
        assert_eq!(env.cached_artifacts(), 1);
    }

    #[test]
    fn test_uncached_compile_is_structurally_identical() {
        let env = Environment::new(SandboxConfig {
            cache_artifacts: false,
            ..SandboxConfig::default()
        })
        .unwrap();
        let a = env.compile(ADD_WAT).unwrap();
        let b = env.compile(ADD_WAT).unwrap();
        assert!(!Artifact::ptr_eq(&a, &b));
        assert_eq!(a.imports(), b.imports());
        assert_eq!(a.exports(), b.exports());
        assert_eq!(a.digest(), b.digest());
        assert_eq!(env.cached_artifacts(), 0);
    }

    #[test]
    fn test_evicted_artifact_stays_usable() {
        let env = Environment::new(SandboxConfig::default()).unwrap();
        let a = env.compile(ADD_WAT).unwrap();
        let other = env.compile("(module)").unwrap();
        assert_eq!(env.cached_artifacts(), 2);

        assert!(env.evict_artifact(&a));
        assert!(!env.evict_artifact(&a));
        assert_eq!(env.cached_artifacts(), 1);
        assert_eq!(a.exports().len(), 1);

        let b = env.compile(ADD_WAT).unwrap();
        assert!(!Artifact::ptr_eq(&a, &b));
        assert_eq!(a.digest(), b.digest());

        env.clear_cache();
        assert_eq!(env.cached_artifacts(), 0);
        assert!(!env.evict_artifact(&other));
    }

    #[test]
    fn test_clones_share_environment() {
        let env = Environment::new(SandboxConfig::default()).unwrap();
        let other = env.clone();
        assert!(Environment::same(&env, &other));
        let fresh = Environment::new(SandboxConfig::default()).unwrap();
        assert!(!Environment::same(&env, &fresh));
    }
}
