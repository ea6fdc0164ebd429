//! Shared test helpers for integration tests.
//!
//! Provides module fixtures in text form, environment factories, and the
//! counting host function used across all integration test files.

#![allow(dead_code)]

use harbor_sandbox::{
    Artifact, Caller, Context, Environment, Func, FuncType, HostError, Instance, SandboxConfig,
    Val, ValKind,
};

// ── Module Fixtures ──

/// Imports `env::adjust: () -> ()`; exports `run: () -> ()` calling it once.
pub const COUNTER_WAT: &str = r#"
    (module
        (import "env" "adjust" (func $adjust))
        (func (export "run")
            call $adjust)
    )
"#;

/// Start routine loads from offset 70000 of a one-page memory.
pub const START_OOB_WAT: &str = r#"
    (module
        (memory 1)
        (func $init
            i32.const 70000
            i32.load
            drop)
        (start $init)
    )
"#;

/// Plain arithmetic and faulting exports, no imports.
pub const ARITH_WAT: &str = r#"
    (module
        (func (export "add") (param i32 i32) (result i32)
            local.get 0
            local.get 1
            i32.add)
        (func (export "div") (param i32 i32) (result i32)
            local.get 0
            local.get 1
            i32.div_s)
        (func (export "boom")
            unreachable)
        (func (export "spin")
            (loop $again
                br $again))
        (func $deep (export "deep") (param i64) (result i64)
            local.get 0
            i64.const 1
            i64.add
            call $deep)
        (func (export "nan") (result f32)
            f32.const 0
            f32.const 0
            f32.div)
        (func (export "id_f64") (param f64) (result f64)
            local.get 0)
    )
"#;

/// Exports a memory and a store routine writing through it.
pub const MEMORY_WAT: &str = r#"
    (module
        (memory (export "mem") 1)
        (func (export "store") (param i32 i32)
            local.get 0
            local.get 1
            i32.store)
        (func (export "load") (param i32) (result i32)
            local.get 0
            i32.load)
        (func (export "grow") (param i32) (result i32)
            local.get 0
            memory.grow)
    )
"#;

// ── Environment Factories ──

pub fn env() -> Environment {
    Environment::new(SandboxConfig::default()).expect("default config must be accepted")
}

pub fn env_with(config: SandboxConfig) -> Environment {
    Environment::new(config).expect("config must be accepted")
}

pub fn compile(env: &Environment, wat: &str) -> Artifact {
    env.compile(wat).expect("fixture must compile")
}

// ── Host Data ──

/// Host-attached data counting `adjust` invocations.
#[derive(Debug, Default)]
pub struct Counter {
    pub hits: u32,
}

pub fn unit_type() -> FuncType {
    FuncType::new([], [])
}

/// Host function incrementing the context's counter.
pub fn adjust_func(ctx: &mut Context<Counter>) -> Func {
    Func::new(ctx, unit_type(), |mut caller: Caller<'_, Counter>, _, _| {
        caller.data_mut().hits += 1;
        Ok(())
    })
}

/// Host function that always refuses.
pub fn failing_func(ctx: &mut Context<Counter>, message: &'static str) -> Func {
    Func::new(ctx, unit_type(), move |_, _, _| Err(HostError::failed(message)))
}

/// A fresh context with [`COUNTER_WAT`] linked against [`adjust_func`].
pub fn counter_instance(env: &Environment) -> (Context<Counter>, Instance) {
    let artifact = compile(env, COUNTER_WAT);
    let mut ctx = Context::new(env, Counter::default());
    let adjust = adjust_func(&mut ctx);
    let instance = Instance::new(&mut ctx, &artifact, &[adjust.into()]).expect("counter links");
    (ctx, instance)
}

/// A fresh context with [`ARITH_WAT`] linked.
pub fn arith_instance(env: &Environment) -> (Context<()>, Instance) {
    let artifact = compile(env, ARITH_WAT);
    let mut ctx = Context::new(env, ());
    let instance = Instance::new(&mut ctx, &artifact, &[]).expect("arith links");
    (ctx, instance)
}

pub fn i32_binary() -> FuncType {
    FuncType::new([ValKind::I32, ValKind::I32], [ValKind::I32])
}

pub fn single(values: Vec<Val>) -> Val {
    assert_eq!(values.len(), 1, "expected exactly one result");
    values[0]
}
