// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

mod common;

use std::rc::Rc;

use common::{Body, World};
use esm_graph::ecmascript::{
    Agent, CyclicModuleMethods, CyclicModuleRecordStatus, ExceptionType, ImportPhase, JsResult,
    Module, ModuleRequest, Options, PromiseCapability, PromiseSettlement, Referrer,
    SyntheticModuleEvaluationSteps, Value, evaluate_import_call,
};

#[test]
fn import_loads_links_and_evaluates_the_graph() {
    let mut world = World::new();
    let m = world.module("m", &["d"]);
    world.module("d", &[]);

    let promise = evaluate_import_call(
        &mut world.agent,
        Referrer::Realm(world.realm),
        ModuleRequest::new("m"),
    );
    assert_eq!(world.settlement(promise), PromiseSettlement::Pending);
    world.run_jobs();

    assert_eq!(
        world.settlement(promise),
        PromiseSettlement::Fulfilled(Value::Namespace(m))
    );
    assert_eq!(world.executed(), ["d", "m"]);
    assert!(m.has_namespace(&world.agent));
    assert_eq!(m.status(&world.agent), Some(CyclicModuleRecordStatus::Evaluated));
}

#[test]
fn repeated_import_reuses_the_module_loaded_by_the_realm() {
    let mut world = World::new();
    let m = world.module("m", &[]);
    evaluate_import_call(
        &mut world.agent,
        Referrer::Realm(world.realm),
        ModuleRequest::new("m"),
    );
    world.run_jobs();
    let requests = world.host.requested_specifiers().len();

    let promise = evaluate_import_call(
        &mut world.agent,
        Referrer::Realm(world.realm),
        ModuleRequest::new("m"),
    );
    world.run_jobs();

    assert_eq!(
        world.settlement(promise),
        PromiseSettlement::Fulfilled(Value::Namespace(m))
    );
    // The host is asked again, and the realm keeps its first record.
    assert_eq!(world.host.requested_specifiers().len(), requests + 1);
    assert_eq!(world.executed(), ["m"]);
}

#[test]
fn import_from_a_module_is_cached_on_that_module() {
    let mut world = World::new();
    let a = world.module("a", &[]);
    let lazy = world.module("lazy", &[]);
    world.prepare(a);
    world.evaluate(a);

    let promise = evaluate_import_call(
        &mut world.agent,
        Referrer::Module(a),
        ModuleRequest::new("lazy"),
    );
    world.run_jobs();

    assert_eq!(
        world.settlement(promise),
        PromiseSettlement::Fulfilled(Value::Namespace(lazy))
    );
    assert_eq!(
        a.get_loaded_module(&world.agent, &ModuleRequest::new("lazy")),
        Some(lazy)
    );
}

#[test]
fn import_waits_for_top_level_await() {
    let mut world = World::new();
    let m = world.module_with("m", vec![], Body::Awaits);

    let promise = evaluate_import_call(
        &mut world.agent,
        Referrer::Realm(world.realm),
        ModuleRequest::new("m"),
    );
    world.run_jobs();
    assert_eq!(world.settlement(promise), PromiseSettlement::Pending);

    world.settle("m", Ok(()));
    world.run_jobs();
    assert_eq!(
        world.settlement(promise),
        PromiseSettlement::Fulfilled(Value::Namespace(m))
    );
}

#[test]
fn import_of_a_missing_module_rejects() {
    let mut world = World::new();

    let promise = evaluate_import_call(
        &mut world.agent,
        Referrer::Realm(world.realm),
        ModuleRequest::new("nowhere"),
    );

    assert_eq!(
        world.rejection(promise),
        (
            ExceptionType::TypeError,
            "Cannot find module 'nowhere'".to_owned()
        )
    );
}

#[test]
fn import_rejects_when_a_dependency_fails_to_load() {
    let mut world = World::new();
    world.module("m", &["nowhere"]);

    let promise = evaluate_import_call(
        &mut world.agent,
        Referrer::Realm(world.realm),
        ModuleRequest::new("m"),
    );
    world.run_jobs();

    assert_eq!(world.rejection(promise).0, ExceptionType::TypeError);
    assert!(world.executed().is_empty());
}

#[test]
fn import_rejects_when_linking_fails() {
    let mut world = World::new();
    let m = world.module_with("m", vec![], Body::FailsToInitialize);

    let promise = evaluate_import_call(
        &mut world.agent,
        Referrer::Realm(world.realm),
        ModuleRequest::new("m"),
    );
    world.run_jobs();

    assert_eq!(
        world.rejection(promise),
        (ExceptionType::SyntaxError, "m failed to initialize".to_owned())
    );
    assert_eq!(m.status(&world.agent), Some(CyclicModuleRecordStatus::Unlinked));
}

#[test]
fn import_rejects_with_the_evaluation_error() {
    let mut world = World::new();
    world.module_with("m", vec![], Body::Throws);

    let promise = evaluate_import_call(
        &mut world.agent,
        Referrer::Realm(world.realm),
        ModuleRequest::new("m"),
    );
    world.run_jobs();

    assert_eq!(
        world.rejection(promise),
        (ExceptionType::Error, "m threw".to_owned())
    );
}

#[test]
fn import_evaluates_through_a_promise_without_top_level_await() {
    let mut world = World::with_options(Options {
        top_level_await: false,
        ..Default::default()
    });
    let m = world.module_with("m", vec![], Body::Returns(1.0));

    let promise = evaluate_import_call(
        &mut world.agent,
        Referrer::Realm(world.realm),
        ModuleRequest::new("m"),
    );
    world.run_jobs();

    assert_eq!(
        world.settlement(promise),
        PromiseSettlement::Fulfilled(Value::Namespace(m))
    );
}

#[test]
fn source_phase_import_returns_the_module_source() {
    let mut world = World::new();
    let m = world.module("m", &["d"]);
    world.module("d", &[]);

    let promise = evaluate_import_call(
        &mut world.agent,
        Referrer::Realm(world.realm),
        ModuleRequest::new("m").with_phase(ImportPhase::Source),
    );

    assert_eq!(
        world.settlement(promise),
        PromiseSettlement::Fulfilled(Value::ModuleSource(m))
    );
    assert_eq!(world.host.requested_specifiers(), ["m"]);
    assert_eq!(m.status(&world.agent), Some(CyclicModuleRecordStatus::New));
    assert!(world.executed().is_empty());
}

#[derive(Debug)]
struct Empty;

impl SyntheticModuleEvaluationSteps for Empty {
    fn evaluate(&self, _agent: &mut Agent, _module: Module) -> JsResult<()> {
        Ok(())
    }
}

#[test]
fn source_phase_import_of_a_module_without_source_rejects() {
    let mut world = World::new();
    let synthetic = Module::new_synthetic(&mut world.agent, world.realm, &[], Rc::new(Empty), None);
    world.host.define("synthetic", synthetic);

    let promise = evaluate_import_call(
        &mut world.agent,
        Referrer::Realm(world.realm),
        ModuleRequest::new("synthetic").with_phase(ImportPhase::Source),
    );

    assert_eq!(world.rejection(promise).0, ExceptionType::SyntaxError);
}

#[test]
fn disabled_source_phase_imports_are_syntax_errors() {
    let mut world = World::with_options(Options {
        source_phase_imports: false,
        ..Default::default()
    });
    world.module("m", &[]);

    let promise = evaluate_import_call(
        &mut world.agent,
        Referrer::Realm(world.realm),
        ModuleRequest::new("m").with_phase(ImportPhase::Source),
    );

    assert_eq!(world.rejection(promise).0, ExceptionType::SyntaxError);
    assert!(world.host.requested_specifiers().is_empty());

    let error = Module::new_cyclic(
        &mut world.agent,
        world.realm,
        vec![ModuleRequest::new("m").with_phase(ImportPhase::Source)],
        false,
        Rc::new(NoopModule),
        None,
    )
    .unwrap_err();
    assert_eq!(world.error(error.value()).0, ExceptionType::SyntaxError);
}

#[derive(Debug)]
struct NoopModule;

impl CyclicModuleMethods for NoopModule {
    fn initialize_environment(&self, _agent: &mut Agent, _module: Module) -> JsResult<()> {
        Ok(())
    }

    fn execute_module(
        &self,
        _agent: &mut Agent,
        _module: Module,
        _promise_capability: Option<PromiseCapability>,
    ) -> JsResult<Value> {
        Ok(Value::Undefined)
    }
}

#[test]
fn dynamic_import_drops_unsupported_attributes() {
    let mut world = World::new();
    world.module("data", &[]);

    evaluate_import_call(
        &mut world.agent,
        Referrer::Realm(world.realm),
        ModuleRequest::new("data")
            .with_attribute("type", "json")
            .with_attribute("mode", "strict"),
    );

    let requests = world.host.load_requests();
    assert_eq!(requests[0].attribute("type"), Some("json"));
    assert_eq!(requests[0].attributes().len(), 1);
}
