// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

#![allow(dead_code)]

use std::{
    cell::{Cell, RefCell},
    collections::VecDeque,
    fmt::Debug,
    rc::Rc,
};

use ahash::AHashMap;
use esm_graph::ecmascript::{
    Agent, CyclicModuleMethods, ExceptionType, HostDefined, HostHooks, Job, JsResult, Module,
    ModuleLoadingPayload, ModuleRequest, Options, Promise, PromiseCapability,
    PromiseRejectionTrackerOperation, PromiseSettlement, Realm, Referrer, Value,
    finish_loading_imported_module,
};

/// A host load that has not been completed yet.
#[derive(Debug)]
pub struct PendingLoad {
    pub referrer: Referrer,
    pub request: ModuleRequest,
    pub payload: ModuleLoadingPayload,
}

/// Host that resolves specifiers from a fixed module map. In deferred mode
/// loads are queued until the test completes them, in any order.
#[derive(Default)]
pub struct TestHost {
    modules: RefCell<AHashMap<String, Module>>,
    deferred: Cell<bool>,
    pending_loads: RefCell<VecDeque<PendingLoad>>,
    jobs: RefCell<VecDeque<Job>>,
    load_requests: RefCell<Vec<ModuleRequest>>,
    rejections: RefCell<Vec<(Promise, PromiseRejectionTrackerOperation)>>,
}

impl Debug for TestHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestHost").finish()
    }
}

impl TestHost {
    pub fn leak() -> &'static TestHost {
        Box::leak(Box::default())
    }

    pub fn define(&self, specifier: &str, module: Module) {
        self.modules.borrow_mut().insert(specifier.to_owned(), module);
    }

    pub fn set_deferred(&self, deferred: bool) {
        self.deferred.set(deferred);
    }

    pub fn load_requests(&self) -> Vec<ModuleRequest> {
        self.load_requests.borrow().clone()
    }

    pub fn requested_specifiers(&self) -> Vec<String> {
        self.load_requests
            .borrow()
            .iter()
            .map(|request| request.specifier().to_owned())
            .collect()
    }

    pub fn rejections(&self) -> Vec<(Promise, PromiseRejectionTrackerOperation)> {
        self.rejections.borrow().clone()
    }

    pub fn pending_load_count(&self) -> usize {
        self.pending_loads.borrow().len()
    }

    fn take_pending_load(&self, specifier: &str) -> Option<PendingLoad> {
        let mut pending_loads = self.pending_loads.borrow_mut();
        let index = pending_loads
            .iter()
            .position(|load| load.request.specifier() == specifier)?;
        pending_loads.remove(index)
    }

    fn resolve(&self, agent: &mut Agent, specifier: &str) -> JsResult<Module> {
        let module = self.modules.borrow().get(specifier).copied();
        module.ok_or_else(|| {
            agent.throw_exception(
                ExceptionType::TypeError,
                format!("Cannot find module '{specifier}'"),
            )
        })
    }

    /// Completes the oldest pending load of `specifier` from the module map.
    pub fn complete_load(&self, agent: &mut Agent, specifier: &str) {
        let load = self
            .take_pending_load(specifier)
            .unwrap_or_else(|| panic!("no pending load of '{specifier}'"));
        let result = self.resolve(agent, specifier);
        finish_loading_imported_module(agent, load.referrer, &load.request, load.payload, result);
    }

    /// Fails the oldest pending load of `specifier` with a TypeError.
    pub fn fail_load(&self, agent: &mut Agent, specifier: &str, message: &str) {
        let load = self
            .take_pending_load(specifier)
            .unwrap_or_else(|| panic!("no pending load of '{specifier}'"));
        let error = agent.throw_exception(ExceptionType::TypeError, message);
        finish_loading_imported_module(
            agent,
            load.referrer,
            &load.request,
            load.payload,
            Err(error),
        );
    }

    fn pop_job(&self) -> Option<Job> {
        self.jobs.borrow_mut().pop_front()
    }

    pub fn run_jobs(&self, agent: &mut Agent) -> JsResult<()> {
        while let Some(job) = self.pop_job() {
            job.run(agent)?;
        }
        Ok(())
    }
}

impl HostHooks for TestHost {
    fn host_load_imported_module(
        &self,
        agent: &mut Agent,
        referrer: Referrer,
        module_request: &ModuleRequest,
        _host_defined: Option<HostDefined>,
        payload: ModuleLoadingPayload,
    ) {
        self.load_requests.borrow_mut().push(module_request.clone());
        if self.deferred.get() {
            self.pending_loads.borrow_mut().push_back(PendingLoad {
                referrer,
                request: module_request.clone(),
                payload,
            });
            return;
        }
        let result = self.resolve(agent, module_request.specifier());
        finish_loading_imported_module(agent, referrer, module_request, payload, result);
    }

    fn enqueue_promise_job(&self, job: Job) {
        self.jobs.borrow_mut().push_back(job);
    }

    fn promise_rejection_tracker(
        &self,
        promise: Promise,
        operation: PromiseRejectionTrackerOperation,
    ) {
        self.rejections.borrow_mut().push((promise, operation));
    }
}

/// What a test module does when it is executed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Body {
    Sync,
    Returns(f64),
    Throws,
    FailsToInitialize,
    /// Top-level await: the module stays pending until [`World::settle`].
    Awaits,
}

#[derive(Debug, Default)]
struct Journal {
    initialized: RefCell<Vec<&'static str>>,
    executed: RefCell<Vec<&'static str>>,
    awaiting: RefCell<AHashMap<&'static str, PromiseCapability>>,
}

#[derive(Debug)]
struct TestModule {
    name: &'static str,
    body: Body,
    journal: Rc<Journal>,
}

impl CyclicModuleMethods for TestModule {
    fn initialize_environment(&self, agent: &mut Agent, _module: Module) -> JsResult<()> {
        if self.body == Body::FailsToInitialize {
            return Err(agent.throw_exception(
                ExceptionType::SyntaxError,
                format!("{} failed to initialize", self.name),
            ));
        }
        self.journal.initialized.borrow_mut().push(self.name);
        Ok(())
    }

    fn execute_module(
        &self,
        agent: &mut Agent,
        _module: Module,
        promise_capability: Option<PromiseCapability>,
    ) -> JsResult<Value> {
        self.journal.executed.borrow_mut().push(self.name);
        match self.body {
            Body::Sync | Body::FailsToInitialize => Ok(Value::Undefined),
            Body::Returns(value) => Ok(Value::Number(value)),
            Body::Throws => Err(agent.throw_exception(
                ExceptionType::Error,
                format!("{} threw", self.name),
            )),
            Body::Awaits => {
                let promise_capability =
                    promise_capability.expect("asynchronous module executed without a capability");
                self.journal
                    .awaiting
                    .borrow_mut()
                    .insert(self.name, promise_capability);
                Ok(Value::Undefined)
            }
        }
    }

    fn get_module_source(&self, _agent: &mut Agent, module: Module) -> JsResult<Value> {
        Ok(Value::ModuleSource(module))
    }
}

/// An agent with a [`TestHost`] and a journal of module executions.
pub struct World {
    pub agent: Agent,
    pub host: &'static TestHost,
    pub realm: Realm,
    journal: Rc<Journal>,
}

impl World {
    pub fn new() -> Self {
        Self::with_options(Options::default())
    }

    pub fn with_options(options: Options) -> Self {
        let host = TestHost::leak();
        let mut agent = Agent::new(options, host);
        let realm = agent.create_realm(None);
        Self {
            agent,
            host,
            realm,
            journal: Rc::default(),
        }
    }

    /// A synchronous module importing `imports`, registered under `name`.
    pub fn module(&mut self, name: &'static str, imports: &[&str]) -> Module {
        let requests = imports.iter().map(|specifier| ModuleRequest::new(specifier)).collect();
        self.module_with(name, requests, Body::Sync)
    }

    pub fn module_with(
        &mut self,
        name: &'static str,
        requests: Vec<ModuleRequest>,
        body: Body,
    ) -> Module {
        let methods = Rc::new(TestModule {
            name,
            body,
            journal: self.journal.clone(),
        });
        let module = Module::new_cyclic(
            &mut self.agent,
            self.realm,
            requests,
            body == Body::Awaits,
            methods,
            None,
        )
        .expect("module record creation failed");
        self.host.define(name, module);
        module
    }

    pub fn load(&mut self, module: Module) -> Promise {
        module.load_requested_modules(&mut self.agent, None)
    }

    pub fn run_jobs(&mut self) {
        self.host.run_jobs(&mut self.agent).expect("promise job threw");
    }

    /// Loads and links `module`, panicking on failure.
    pub fn prepare(&mut self, module: Module) {
        let promise = self.load(module);
        self.run_jobs();
        assert_eq!(
            self.settlement(promise),
            PromiseSettlement::Fulfilled(Value::Undefined),
            "module graph failed to load"
        );
        module.link(&mut self.agent).expect("module graph failed to link");
    }

    /// Evaluates a linked module with top-level await enabled.
    pub fn evaluate(&mut self, module: Module) -> Promise {
        match module.evaluate(&mut self.agent) {
            Ok(Value::Promise(promise)) => promise,
            other => panic!("expected an evaluation promise, got {other:?}"),
        }
    }

    pub fn settlement(&self, promise: Promise) -> PromiseSettlement {
        promise.settlement(&self.agent)
    }

    /// Settles the top-level await of the module named `name`.
    pub fn settle(&mut self, name: &'static str, result: Result<(), Value>) {
        let promise_capability = self
            .journal
            .awaiting
            .borrow_mut()
            .remove(name)
            .unwrap_or_else(|| panic!("'{name}' is not awaiting"));
        match result {
            Ok(()) => promise_capability.resolve(&mut self.agent, Value::Undefined),
            Err(reason) => promise_capability.reject(&mut self.agent, reason),
        }
    }

    pub fn executed(&self) -> Vec<&'static str> {
        self.journal.executed.borrow().clone()
    }

    pub fn initialized(&self) -> Vec<&'static str> {
        self.journal.initialized.borrow().clone()
    }

    /// Kind and message of a thrown Error object.
    pub fn error(&self, value: Value) -> (ExceptionType, String) {
        match value {
            Value::Error(error) => (error.kind(&self.agent), error.message(&self.agent).to_owned()),
            other => panic!("expected an Error object, got {other:?}"),
        }
    }

    /// Kind and message of the reason of a rejected promise.
    pub fn rejection(&self, promise: Promise) -> (ExceptionType, String) {
        match self.settlement(promise) {
            PromiseSettlement::Rejected(reason) => self.error(reason),
            other => panic!("expected a rejected promise, got {other:?}"),
        }
    }
}
