//! Sandbox configuration.

/// Configuration for an [`Environment`](crate::Environment).
///
/// Fixed when the environment is created; every context created from the
/// environment inherits these limits.
#[derive(Debug, Clone)]
pub struct SandboxConfig {
    /// Maximum pages (1 page = 64 KiB) any single linear memory may reach.
    /// Default: 256 pages = 16 MiB.
    pub max_memory_pages: u64,

    /// Maximum number of instances one context may hold.
    pub max_instances: usize,

    /// Fuel budget given to each new context. `None` disables fuel
    /// metering entirely.
    pub fuel_limit: Option<u64>,

    /// Maximum native stack, in bytes, that guest code may consume.
    pub max_wasm_stack: usize,

    /// Maximum nesting of host/guest boundary crossings made through
    /// the call routine.
    pub max_call_depth: u32,

    /// Disable nondeterministic proposals (threads, SIMD, multi-memory)
    /// and canonicalize NaNs.
    pub deterministic: bool,

    /// Attach a guest backtrace to traps.
    pub capture_backtraces: bool,

    /// Reuse artifacts compiled from identical input.
    ///
    /// Cached artifacts are retained for the life of the environment
    /// unless released with `Environment::evict_artifact` or
    /// `Environment::clear_cache`.
    pub cache_artifacts: bool,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            max_memory_pages: 256, // 16 MiB
            max_instances: 1000,
            fuel_limit: None,
            max_wasm_stack: 512 * 1024,
            max_call_depth: 256,
            deterministic: true,
            capture_backtraces: true,
            cache_artifacts: true,
        }
    }
}

impl SandboxConfig {
    /// Memory limit in bytes, saturated to the host's address width.
    pub fn max_memory_bytes(&self) -> usize {
        let bytes = self.max_memory_pages.saturating_mul(65536);
        usize::try_from(bytes).unwrap_or(usize::MAX)
    }

    /// Same configuration with fuel metering enabled at `fuel` units per
    /// context.
    pub fn with_fuel(mut self, fuel: u64) -> Self {
        self.fuel_limit = Some(fuel);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SandboxConfig::default();
        assert_eq!(config.max_memory_pages, 256);
        assert_eq!(config.fuel_limit, None);
        assert_eq!(config.max_call_depth, 256);
        assert!(config.deterministic);
        assert!(config.cache_artifacts);
    }

    #[test]
    fn test_max_memory_bytes() {
        let config = SandboxConfig::default();
        assert_eq!(config.max_memory_bytes(), 16 * 1024 * 1024);

        let huge = SandboxConfig {
            max_memory_pages: u64::MAX,
            ..SandboxConfig::default()
        };
        assert_eq!(huge.max_memory_bytes(), usize::MAX);
    }

    #[test]
    fn test_with_fuel() {
        let config = SandboxConfig::default().with_fuel(10_000);
        assert_eq!(config.fuel_limit, Some(10_000));
    }
}
