//! Resource tests: handle lifetimes bounded by their context, linear memory
//! access, and the configured memory and instance limits.

mod common;

use harbor_sandbox::{
    CallError, Context, ErrorKind, Instance, LinkError, MemoryError, SandboxConfig, SandboxError,
    Val,
};

use common::*;

// ── Lifetimes ──

#[test]
fn test_handles_die_with_their_context() {
    let env = env();
    let (mut ctx, instance) = counter_instance(&env);
    let run = instance.get_func(&mut ctx, "run").unwrap();
    run.call(&mut ctx, &[]).unwrap();
    assert_eq!(ctx.into_data().hits, 1);

    // A later context never accepts handles minted by the destroyed one.
    let mut next = Context::new(&env, Counter::default());
    let err = run.call(&mut next, &[]).unwrap_err();
    assert!(matches!(err, CallError::ForeignHandle));
    assert_eq!(err.kind(), ErrorKind::ForeignHandle);
    assert!(instance.get_export(&mut next, "run").is_none());
    assert!(instance.artifact(&next).is_none());
    assert_eq!(next.data().hits, 0);
}

#[test]
fn test_handle_indices_do_not_alias_across_contexts() {
    let env = env();
    let (mut a, inst_a) = counter_instance(&env);
    let (mut b, _inst_b) = counter_instance(&env);

    // Same artifact, same creation order: identical positions, distinct owners.
    let run_a = inst_a.get_func(&mut a, "run").unwrap();
    assert!(run_a.call(&mut b, &[]).is_err());
    assert_eq!(b.data().hits, 0);
    run_a.call(&mut a, &[]).unwrap();
    assert_eq!(a.data().hits, 1);
}

// ── Linear memory ──

#[test]
fn test_guest_and_host_see_same_memory() {
    let env = env();
    let artifact = compile(&env, MEMORY_WAT);
    let mut ctx = Context::new(&env, ());
    let instance = Instance::new(&mut ctx, &artifact, &[]).unwrap();
    let mem = instance.get_memory(&mut ctx, "mem").unwrap();
    let store = instance.get_func(&mut ctx, "store").unwrap();
    let load = instance.get_func(&mut ctx, "load").unwrap();

    store.call(&mut ctx, &[Val::I32(16), Val::I32(0x0102_0304)]).unwrap();
    assert_eq!(mem.read_u32(&ctx, 16).unwrap(), 0x0102_0304);

    mem.write(&mut ctx, 32, &[0xaa, 0xbb, 0xcc, 0xdd]).unwrap();
    let out = single(load.call(&mut ctx, &[Val::I32(32)]).unwrap());
    assert_eq!(out, Val::I32(0xddcc_bbaa_u32 as i32));
}

#[test]
fn test_host_memory_access_is_bounds_checked() {
    let env = env();
    let artifact = compile(&env, MEMORY_WAT);
    let mut ctx = Context::new(&env, ());
    let instance = Instance::new(&mut ctx, &artifact, &[]).unwrap();
    let mem = instance.get_memory(&mut ctx, "mem").unwrap();

    let size = mem.data_size(&ctx).unwrap();
    let mut buf = [0u8; 8];
    let err = mem.read(&ctx, size - 4, &mut buf).unwrap_err();
    assert_eq!(
        err,
        MemoryError::OutOfBounds {
            offset: size - 4,
            len: 8,
            size
        }
    );
    assert!(mem.write(&mut ctx, usize::MAX, &[1]).is_err());
}

#[test]
fn test_memory_growth_capped_by_config() {
    let env = env_with(SandboxConfig {
        max_memory_pages: 2,
        ..SandboxConfig::default()
    });
    let artifact = compile(&env, MEMORY_WAT);
    let mut ctx = Context::new(&env, ());
    let instance = Instance::new(&mut ctx, &artifact, &[]).unwrap();
    let grow = instance.get_func(&mut ctx, "grow").unwrap();
    let mem = instance.get_memory(&mut ctx, "mem").unwrap();

    assert_eq!(single(grow.call(&mut ctx, &[Val::I32(1)]).unwrap()), Val::I32(1));
    assert_eq!(single(grow.call(&mut ctx, &[Val::I32(1)]).unwrap()), Val::I32(-1));
    assert_eq!(mem.pages(&ctx).unwrap(), 2);

    let err = mem.grow(&mut ctx, 1).unwrap_err();
    assert!(matches!(err, MemoryError::Grow(_)));
    assert_eq!(SandboxError::from(err).kind(), ErrorKind::Internal);
}

#[test]
fn test_oversized_initial_memory_fails_link() {
    let env = env_with(SandboxConfig {
        max_memory_pages: 2,
        ..SandboxConfig::default()
    });
    let artifact = compile(&env, "(module (memory 4))");
    let mut ctx = Context::new(&env, ());

    let err = Instance::new(&mut ctx, &artifact, &[]).unwrap_err();
    assert!(matches!(err, LinkError::Instantiate(_)));
    assert_eq!(ctx.instance_count(), 0);
}

#[test]
fn test_instance_limit() {
    let env = env_with(SandboxConfig {
        max_instances: 2,
        ..SandboxConfig::default()
    });
    let artifact = compile(&env, ARITH_WAT);
    let mut ctx = Context::new(&env, ());

    Instance::new(&mut ctx, &artifact, &[]).unwrap();
    Instance::new(&mut ctx, &artifact, &[]).unwrap();
    let err = Instance::new(&mut ctx, &artifact, &[]).unwrap_err();
    assert!(matches!(err, LinkError::Instantiate(_)));
    assert_eq!(ctx.instance_count(), 2);
}
