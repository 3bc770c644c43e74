// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

mod common;

use common::{Body, World};
use esm_graph::ecmascript::{
    CyclicModuleRecordStatus, ExceptionType, ImportPhase, ModuleRequest, PromiseSettlement, Value,
};

#[test]
fn link_initializes_dependencies_first() {
    let mut world = World::new();
    let a = world.module("a", &["b"]);
    let b = world.module("b", &["c"]);
    let c = world.module("c", &[]);
    world.load(a);

    a.link(&mut world.agent).unwrap();

    assert_eq!(world.initialized(), ["c", "b", "a"]);
    for module in [a, b, c] {
        assert_eq!(
            module.status(&world.agent),
            Some(CyclicModuleRecordStatus::Linked)
        );
    }
}

#[test]
fn cycle_links_as_one_component() {
    let mut world = World::new();
    let a = world.module("a", &["b"]);
    let b = world.module("b", &["a"]);
    world.load(a);

    a.link(&mut world.agent).unwrap();

    assert_eq!(world.initialized(), ["b", "a"]);
    assert_eq!(a.status(&world.agent), Some(CyclicModuleRecordStatus::Linked));
    assert_eq!(b.status(&world.agent), Some(CyclicModuleRecordStatus::Linked));
    assert_eq!(a.dfs_index(&world.agent), Some(0));
    assert_eq!(b.dfs_index(&world.agent), Some(1));
    assert_eq!(b.dfs_ancestor_index(&world.agent), Some(0));
}

#[test]
fn linking_twice_is_a_no_op() {
    let mut world = World::new();
    let a = world.module("a", &["b"]);
    world.module("b", &[]);
    world.load(a);

    a.link(&mut world.agent).unwrap();
    a.link(&mut world.agent).unwrap();

    assert_eq!(world.initialized(), ["b", "a"]);
}

#[test]
fn failed_link_resets_the_stack_to_unlinked() {
    let mut world = World::new();
    let a = world.module("a", &["b", "c"]);
    let b = world.module("b", &[]);
    let c = world.module_with("c", vec![ModuleRequest::new("d")], Body::FailsToInitialize);
    let d = world.module("d", &[]);
    world.load(a);

    let error = a.link(&mut world.agent).unwrap_err();

    assert_eq!(
        world.error(error.value()),
        (ExceptionType::SyntaxError, "c failed to initialize".to_owned())
    );
    // "b" and "d" closed their own components before "c" failed.
    assert_eq!(b.status(&world.agent), Some(CyclicModuleRecordStatus::Linked));
    assert_eq!(d.status(&world.agent), Some(CyclicModuleRecordStatus::Linked));
    assert_eq!(a.status(&world.agent), Some(CyclicModuleRecordStatus::Unlinked));
    assert_eq!(c.status(&world.agent), Some(CyclicModuleRecordStatus::Unlinked));
}

#[test]
fn failed_link_inside_a_cycle_resets_the_whole_cycle() {
    let mut world = World::new();
    let a = world.module("a", &["b"]);
    let b = world.module("b", &["c"]);
    let c = world.module_with("c", vec![ModuleRequest::new("a")], Body::FailsToInitialize);
    world.load(a);

    assert!(a.link(&mut world.agent).is_err());

    for module in [a, b, c] {
        assert_eq!(
            module.status(&world.agent),
            Some(CyclicModuleRecordStatus::Unlinked)
        );
    }
    assert!(world.initialized().is_empty());
}

#[test]
fn linking_an_unloaded_module_throws() {
    let mut world = World::new();
    let a = world.module("a", &["b"]);

    let error = a.link(&mut world.agent).unwrap_err();

    assert_eq!(world.error(error.value()).0, ExceptionType::TypeError);
    assert_eq!(a.status(&world.agent), Some(CyclicModuleRecordStatus::New));
}

#[test]
fn linking_after_a_failed_load_throws() {
    let mut world = World::new();
    let a = world.module("a", &["b"]);
    let b = world.module("b", &["missing"]);
    world.load(a);

    let error = b.link(&mut world.agent).unwrap_err();

    assert_eq!(world.error(error.value()).0, ExceptionType::TypeError);
}

#[test]
fn source_phase_dependencies_are_not_linked() {
    let mut world = World::new();
    let a = world.module_with(
        "a",
        vec![ModuleRequest::new("s").with_phase(ImportPhase::Source)],
        Body::Sync,
    );
    let s = world.module("s", &["t"]);
    world.module("t", &[]);
    world.load(a);

    a.link(&mut world.agent).unwrap();

    assert_eq!(world.initialized(), ["a"]);
    assert_eq!(s.status(&world.agent), Some(CyclicModuleRecordStatus::New));
}

#[test]
fn linking_a_graph_that_failed_to_load_reports_the_load_error() {
    let mut world = World::new();
    let a = world.module("a", &["b"]);
    let b = world.module("b", &["missing"]);
    let promise = world.load(a);
    let PromiseSettlement::Rejected(load_error) = world.settlement(promise) else {
        panic!("loading 'a' should have failed");
    };

    for module in [a, b] {
        let error = module.link(&mut world.agent).unwrap_err();
        let Value::Error(error) = error.value() else {
            panic!("expected an Error object");
        };
        assert_eq!(error.kind(&world.agent), ExceptionType::TypeError);
        assert_eq!(error.cause(&world.agent), Some(load_error));
    }
    let error = a.evaluate(&mut world.agent).unwrap_err();
    let Value::Error(error) = error.value() else {
        panic!("expected an Error object");
    };
    assert_eq!(error.cause(&world.agent), Some(load_error));

    // Once the graph loads, the recorded error is gone.
    world.module("missing", &[]);
    world.load(a);
    assert_eq!(a.status(&world.agent), Some(CyclicModuleRecordStatus::Unlinked));
    a.link(&mut world.agent).unwrap();
    assert_eq!(world.initialized(), ["missing", "b", "a"]);
}
