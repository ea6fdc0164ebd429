//! Golden vector tests: compile known sources and compare the described
//! boundary surface against recorded JSON.
//!
//! The vectors pin down how artifacts describe their imports and exports.
//! Any change that alters these descriptions changes what hosts must
//! provide to link, and must be reviewed carefully.

mod common;

use harbor_sandbox::{ExportType, ExternKind, ImportType};
use serde::Deserialize;

use common::*;

/// JSON representation of a golden vector test case.
#[derive(Deserialize)]
struct GoldenVector {
    name: String,
    /// Module in text form.
    source: String,
    /// Expected imports, in declaration order.
    imports: Vec<ImportType>,
    /// Expected exports, in declaration order.
    exports: Vec<ExportType>,
}

fn load_vectors() -> Vec<GoldenVector> {
    let json = include_str!("vectors/signatures.json");
    serde_json::from_str(json).unwrap()
}

fn check_vector(vector: &GoldenVector) {
    let env = env();
    let artifact = env
        .compile(&vector.source)
        .unwrap_or_else(|e| panic!("{}: compile failed: {}", vector.name, e));

    assert_eq!(artifact.imports(), vector.imports.as_slice(), "{}: imports", vector.name);
    assert_eq!(artifact.exports(), vector.exports.as_slice(), "{}: exports", vector.name);
}

#[test]
fn test_golden_signatures() {
    let vectors = load_vectors();
    assert!(!vectors.is_empty());
    for vector in &vectors {
        check_vector(vector);
    }
}

#[test]
fn test_golden_counter_vector_matches_fixture() {
    let vectors = load_vectors();
    let counter = vectors.iter().find(|v| v.name == "counter").unwrap();
    let from_fixture = compile(&env(), COUNTER_WAT);
    assert_eq!(from_fixture.imports(), counter.imports.as_slice());
    assert_eq!(from_fixture.exports(), counter.exports.as_slice());
}

#[test]
fn test_golden_vectors_cover_every_extern_kind() {
    let vectors = load_vectors();
    let all = vectors.iter().find(|v| v.name == "all_extern_kinds").unwrap();
    let artifact = compile(&env(), &all.source);

    let kinds: Vec<ExternKind> = artifact
        .imports()
        .iter()
        .map(|i| i.ty.kind())
        .chain(artifact.exports().iter().map(|e| e.ty.kind()))
        .collect();
    for kind in [ExternKind::Func, ExternKind::Memory, ExternKind::Table, ExternKind::Global] {
        assert!(kinds.contains(&kind), "missing {}", kind);
    }
}
