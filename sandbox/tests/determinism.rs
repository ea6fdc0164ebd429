//! Determinism tests: identical input yields identical boundary surfaces
//! and identical results, across compilations, contexts, and threads.

mod common;

use std::thread;

use harbor_sandbox::{Artifact, Context, Instance, SandboxConfig, Val};

use common::*;

// ── Compilation ──

#[test]
fn test_uncached_compiles_have_identical_surfaces() {
    let env = env_with(SandboxConfig {
        cache_artifacts: false,
        ..SandboxConfig::default()
    });
    for wat in [COUNTER_WAT, ARITH_WAT, MEMORY_WAT] {
        let a = compile(&env, wat);
        let b = compile(&env, wat);
        assert!(!Artifact::ptr_eq(&a, &b));
        assert_eq!(a.imports(), b.imports());
        assert_eq!(a.exports(), b.exports());
        assert_eq!(a.digest(), b.digest());
    }
}

#[test]
fn test_cached_compile_shares_artifact() {
    let env = env();
    let a = compile(&env, ARITH_WAT);
    let b = compile(&env, ARITH_WAT);
    assert!(Artifact::ptr_eq(&a, &b));
    assert_eq!(env.cached_artifacts(), 1);

    compile(&env, COUNTER_WAT);
    assert_eq!(env.cached_artifacts(), 2);
}

#[test]
fn test_separate_environments_agree() {
    let a = compile(&env(), ARITH_WAT);
    let b = compile(&env(), ARITH_WAT);
    assert_eq!(a.exports(), b.exports());
    assert_eq!(a.digest_hex(), b.digest_hex());
}

#[test]
fn test_failed_compile_is_not_cached() {
    let env = env();
    assert!(env.compile("(module (func (result i32)))").is_err());
    assert!(env.compile("(module (func (result i32)))").is_err());
    assert_eq!(env.cached_artifacts(), 0);
}

// ── Execution ──

#[test]
fn test_nan_is_canonical() {
    let env = env();
    let (mut ctx, instance) = arith_instance(&env);
    let nan = instance.get_func(&mut ctx, "nan").unwrap();

    let out = single(nan.call(&mut ctx, &[]).unwrap());
    let bits = out.f32().unwrap().to_bits();
    assert_eq!(bits, 0x7fc0_0000);
}

#[test]
fn test_float_payload_passes_through_unchanged() {
    let env = env();
    let (mut ctx, instance) = arith_instance(&env);
    let id = instance.get_func(&mut ctx, "id_f64").unwrap();

    let payload = f64::from_bits(0x7ff4_0000_0000_0001);
    let out = single(id.call(&mut ctx, &[Val::F64(payload)]).unwrap());
    assert_eq!(out.f64().unwrap().to_bits(), 0x7ff4_0000_0000_0001);
}

#[test]
fn test_threads_share_environment_and_artifact() {
    let env = env();
    let artifact = compile(&env, COUNTER_WAT);

    let totals: Vec<u32> = thread::scope(|scope| {
        let handles: Vec<_> = (1..=4u32)
            .map(|runs| {
                let env = env.clone();
                let artifact = artifact.clone();
                scope.spawn(move || {
                    let mut ctx = Context::new(&env, Counter::default());
                    let adjust = adjust_func(&mut ctx);
                    let instance = Instance::new(&mut ctx, &artifact, &[adjust.into()]).unwrap();
                    let run = instance.get_func(&mut ctx, "run").unwrap();
                    for _ in 0..runs {
                        run.call(&mut ctx, &[]).unwrap();
                    }
                    ctx.into_data().hits
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(totals, vec![1, 2, 3, 4]);
    assert_eq!(env.cached_artifacts(), 1);
}

#[test]
fn test_contexts_are_send() {
    fn assert_send<T: Send>(_: &T) {}
    let env = env();
    let (ctx, _instance) = counter_instance(&env);
    assert_send(&ctx);
    let handle = thread::spawn(move || ctx.data().hits);
    assert_eq!(handle.join().unwrap(), 0);
}
