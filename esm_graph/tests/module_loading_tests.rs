// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

mod common;

use common::World;
use esm_graph::ecmascript::{
    CyclicModuleRecordStatus, ExceptionType, ImportPhase, ModuleRequest, PromiseSettlement, Value,
};

#[test]
fn loads_every_module_of_the_graph_once() {
    let mut world = World::new();
    let a = world.module("a", &["b", "c"]);
    let b = world.module("b", &["c"]);
    let c = world.module("c", &[]);

    let promise = world.load(a);

    assert_eq!(
        world.settlement(promise),
        PromiseSettlement::Fulfilled(Value::Undefined)
    );
    // "c" is requested once by each importer, but its own requests are only
    // visited once.
    assert_eq!(world.host.requested_specifiers(), ["b", "c", "c"]);
    for module in [a, b, c] {
        assert_eq!(
            module.status(&world.agent),
            Some(CyclicModuleRecordStatus::Unlinked)
        );
    }
    assert_eq!(a.get_loaded_module(&world.agent, &ModuleRequest::new("b")), Some(b));
    assert_eq!(b.get_loaded_module(&world.agent, &ModuleRequest::new("c")), Some(c));
}

#[test]
fn loading_an_already_loaded_graph_resolves_without_host_calls() {
    let mut world = World::new();
    let a = world.module("a", &["b"]);
    world.module("b", &[]);
    world.load(a);
    let requests = world.host.requested_specifiers().len();

    let promise = world.load(a);

    assert_eq!(
        world.settlement(promise),
        PromiseSettlement::Fulfilled(Value::Undefined)
    );
    assert_eq!(world.host.requested_specifiers().len(), requests);
}

#[test]
fn deep_chain_loads_with_a_synchronous_host() {
    const DEPTH: usize = 50_000;
    let mut world = World::new();
    let names: Vec<&'static str> = (0..DEPTH)
        .map(|i| &*Box::leak(format!("m{i}").into_boxed_str()))
        .collect();
    let mut modules = Vec::with_capacity(DEPTH);
    for (i, &name) in names.iter().enumerate() {
        let imports: &[&str] = match names.get(i + 1) {
            Some(next) => std::slice::from_ref(next),
            None => &[],
        };
        modules.push(world.module(name, imports));
    }
    let root = modules[0];

    let promise = world.load(root);

    assert_eq!(
        world.settlement(promise),
        PromiseSettlement::Fulfilled(Value::Undefined)
    );
    assert_eq!(world.host.requested_specifiers().len(), DEPTH - 1);
    for module in [root, modules[DEPTH / 2], modules[DEPTH - 1]] {
        assert_eq!(
            module.status(&world.agent),
            Some(CyclicModuleRecordStatus::Unlinked)
        );
    }

    root.link(&mut world.agent).unwrap();
    let promise = world.evaluate(root);

    assert_eq!(
        world.settlement(promise),
        PromiseSettlement::Fulfilled(Value::Undefined)
    );
    assert_eq!(world.executed().len(), DEPTH);
    assert_eq!(world.executed().first(), Some(&names[DEPTH - 1]));
}

#[test]
fn cyclic_imports_terminate() {
    let mut world = World::new();
    let a = world.module("a", &["b"]);
    let b = world.module("b", &["a"]);

    let promise = world.load(a);

    assert_eq!(
        world.settlement(promise),
        PromiseSettlement::Fulfilled(Value::Undefined)
    );
    assert_eq!(world.host.requested_specifiers(), ["b", "a"]);
    assert_eq!(b.status(&world.agent), Some(CyclicModuleRecordStatus::Unlinked));
}

#[test]
fn out_of_order_host_completions_finish_the_load() {
    let mut world = World::new();
    world.host.set_deferred(true);
    let a = world.module("a", &["b", "c"]);
    let b = world.module("b", &[]);
    let c = world.module("c", &["d"]);
    world.module("d", &[]);

    let promise = world.load(a);
    assert_eq!(world.host.pending_load_count(), 2);
    assert_eq!(world.settlement(promise), PromiseSettlement::Pending);

    world.host.complete_load(&mut world.agent, "c");
    assert_eq!(world.host.pending_load_count(), 2, "'d' is now requested");
    world.host.complete_load(&mut world.agent, "b");
    assert_eq!(world.settlement(promise), PromiseSettlement::Pending);
    assert_eq!(b.status(&world.agent), Some(CyclicModuleRecordStatus::New));

    world.host.complete_load(&mut world.agent, "d");
    assert_eq!(
        world.settlement(promise),
        PromiseSettlement::Fulfilled(Value::Undefined)
    );
    assert_eq!(b.status(&world.agent), Some(CyclicModuleRecordStatus::Unlinked));
    assert_eq!(c.status(&world.agent), Some(CyclicModuleRecordStatus::Unlinked));
}

#[test]
fn missing_module_rejects_the_load() {
    let mut world = World::new();
    let a = world.module("a", &["missing"]);

    let promise = world.load(a);

    assert_eq!(
        world.rejection(promise),
        (
            ExceptionType::TypeError,
            "Cannot find module 'missing'".to_owned()
        )
    );
    assert_eq!(a.status(&world.agent), Some(CyclicModuleRecordStatus::New));
}

#[test]
fn completions_after_a_failure_are_ignored() {
    let mut world = World::new();
    world.host.set_deferred(true);
    let a = world.module("a", &["b", "c"]);
    world.module("b", &[]);
    let c = world.module("c", &["d"]);
    world.module("d", &[]);

    let promise = world.load(a);
    world.host.fail_load(&mut world.agent, "b", "network error");
    world.host.complete_load(&mut world.agent, "c");

    assert_eq!(
        world.rejection(promise),
        (ExceptionType::TypeError, "network error".to_owned())
    );
    // The late result is still recorded, but the graph is not walked further.
    assert_eq!(a.get_loaded_module(&world.agent, &ModuleRequest::new("c")), Some(c));
    assert_eq!(world.host.pending_load_count(), 0);
    assert_eq!(world.host.requested_specifiers(), ["b", "c"]);
    assert_eq!(c.status(&world.agent), Some(CyclicModuleRecordStatus::New));
}

#[test]
fn source_phase_imports_do_not_load_dependencies() {
    let mut world = World::new();
    let a = world.module_with(
        "a",
        vec![ModuleRequest::new("s").with_phase(ImportPhase::Source)],
        common::Body::Sync,
    );
    let s = world.module("s", &["t"]);
    world.module("t", &[]);

    let promise = world.load(a);

    assert_eq!(
        world.settlement(promise),
        PromiseSettlement::Fulfilled(Value::Undefined)
    );
    assert_eq!(world.host.requested_specifiers(), ["s"]);
    assert_eq!(s.status(&world.agent), Some(CyclicModuleRecordStatus::New));
}

#[test]
fn source_and_evaluation_imports_share_one_load() {
    let mut world = World::new();
    let a = world.module_with(
        "a",
        vec![
            ModuleRequest::new("s").with_phase(ImportPhase::Source),
            ModuleRequest::new("s"),
        ],
        common::Body::Sync,
    );
    let s = world.module("s", &["t"]);
    world.module("t", &[]);

    let promise = world.load(a);

    assert_eq!(
        world.settlement(promise),
        PromiseSettlement::Fulfilled(Value::Undefined)
    );
    assert_eq!(world.host.requested_specifiers(), ["s", "t"]);
    assert_eq!(s.status(&world.agent), Some(CyclicModuleRecordStatus::Unlinked));
}

#[test]
fn unsupported_import_attributes_are_dropped() {
    let mut world = World::new();
    let a = world.module_with(
        "a",
        vec![
            ModuleRequest::new("data")
                .with_attribute("type", "json")
                .with_attribute("integrity", "sha384-abc"),
        ],
        common::Body::Sync,
    );
    world.module("data", &[]);

    world.load(a);

    let requests = world.host.load_requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].attribute("type"), Some("json"));
    assert_eq!(requests[0].attribute("integrity"), None);
    assert_eq!(a.requested_modules(&world.agent)[0].attributes().len(), 1);
}

#[test]
fn disabled_import_attributes_are_stripped() {
    let mut world = World::with_options(esm_graph::ecmascript::Options {
        import_attributes: false,
        ..Default::default()
    });
    let a = world.module_with(
        "a",
        vec![ModuleRequest::new("data").with_attribute("type", "json")],
        common::Body::Sync,
    );
    world.module("data", &[]);

    world.load(a);

    assert!(world.host.load_requests()[0].attributes().is_empty());
}

#[test]
fn handles_index_the_agent_heap_from_outside_the_crate() {
    let mut world = World::new();
    let a = world.module("a", &[]);
    let promise = world.load(a);

    let module_record = format!("{:?}", &world.agent[a]);
    let promise_record = format!("{:?}", &world.agent[promise]);
    let realm_record = format!("{:?}", &world.agent[world.realm]);

    assert!(module_record.contains("Cyclic"));
    assert!(promise_record.contains("Fulfilled"));
    assert!(realm_record.contains("loaded_modules"));
}
