// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::{any::Any, rc::Rc};

use super::realm::{Realm, RealmRecord};
use crate::{
    ecmascript::{
        builtins::{
            error::{Error, ErrorHeapData},
            promise::Promise,
            promise_objects::promise_abstract_operations::promise_jobs::{
                PromiseReactionJob, PromiseResolveThenableJob,
            },
        },
        scripts_and_modules::module::module_semantics::{
            ModuleLoadingPayload, ModuleRequest, Referrer,
        },
        types::Value,
    },
    heap::{CreateHeapData, Heap},
};

/// Engine behaviour switches that a host may toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Options {
    /// When true, [`Module::evaluate`](crate::ecmascript::Module::evaluate)
    /// always returns a promise for the root's top-level capability. When
    /// false it returns the completion value synchronously, and falls back
    /// to a promise only when an asynchronous module takes part in the
    /// evaluation.
    pub top_level_await: bool,
    /// When false, import attributes are stripped from every module request
    /// before it reaches the host.
    pub import_attributes: bool,
    /// When false, creating a module record with a source phase import or
    /// performing a source phase `import()` throws a SyntaxError.
    pub source_phase_imports: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            top_level_await: true,
            import_attributes: true,
            source_phase_imports: true,
        }
    }
}

pub type JsResult<T> = std::result::Result<T, JsError>;

/// A thrown ECMAScript value.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct JsError(Value);

impl JsError {
    pub(crate) fn new(value: Value) -> Self {
        Self(value)
    }

    pub fn value(self) -> Value {
        self.0
    }
}

/// Host-owned data attached to realms, modules and graph loads. The module
/// system never looks inside it.
pub type HostDefined = Rc<dyn Any>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromiseRejectionTrackerOperation {
    Reject,
    Handle,
}

pub trait HostHooks: std::fmt::Debug {
    /// ### [16.2.1.10 HostLoadImportedModule ( referrer, moduleRequest, hostDefined, payload )](https://tc39.es/ecma262/#sec-HostLoadImportedModule)
    ///
    /// The host-defined abstract operation HostLoadImportedModule takes
    /// arguments referrer (a Cyclic Module Record or a Realm Record),
    /// moduleRequest (a ModuleRequest Record), hostDefined (anything), and
    /// payload (a GraphLoadingState Record or a PromiseCapability Record) and
    /// returns unused.
    ///
    /// An implementation of HostLoadImportedModule must conform to the
    /// following requirements:
    ///
    /// * The host environment must perform
    ///   [`finish_loading_imported_module`](crate::ecmascript::finish_loading_imported_module)
    ///   with the referrer, module request and payload it was given, and a
    ///   result that is either the loaded Module or a thrown error, either
    ///   synchronously or asynchronously.
    /// * If this operation is called multiple times with two (referrer,
    ///   moduleRequest) pairs such that the specifiers are equal and the
    ///   attributes contain the same entries, and it performs
    ///   FinishLoadingImportedModule with a normal completion, then it must
    ///   perform FinishLoadingImportedModule with the same result each time.
    /// * The operation must treat payload as an opaque value to be passed
    ///   through to FinishLoadingImportedModule.
    ///
    /// The actual process performed is host-defined, but typically consists of
    /// performing whatever I/O operations are necessary to load the
    /// appropriate Module Record. Multiple different (referrer,
    /// moduleRequest.\[\[Specifier\]\], moduleRequest.\[\[Attributes\]\])
    /// triples may map to the same Module Record instance.
    fn host_load_imported_module(
        &self,
        agent: &mut Agent,
        referrer: Referrer,
        module_request: &ModuleRequest,
        host_defined: Option<HostDefined>,
        payload: ModuleLoadingPayload,
    );

    /// ### [9.5.5 HostEnqueuePromiseJob ( job, realm )](https://tc39.es/ecma262/#sec-hostenqueuepromisejob)
    ///
    /// Schedules the job to be performed at some future time. The jobs must
    /// be run in FIFO order.
    fn enqueue_promise_job(&self, job: Job);

    /// ### [27.2.1.9 HostPromiseRejectionTracker ( promise, operation )](https://tc39.es/ecma262/#sec-host-promise-rejection-tracker)
    ///
    /// The default implementation of HostPromiseRejectionTracker is to return
    /// unused.
    fn promise_rejection_tracker(
        &self,
        _promise: Promise,
        _operation: PromiseRejectionTrackerOperation,
    ) {
    }

    /// ### [16.2.1.7 HostGetSupportedImportAttributes ( )](https://tc39.es/ecma262/#sec-hostgetsupportedimportattributes)
    ///
    /// Returns the import attribute keys the host understands. Attributes
    /// with other keys are dropped from module requests.
    fn get_supported_import_attributes(&self) -> &[&'static str] {
        &["type"]
    }
}

/// A unit of work queued through [`HostHooks::enqueue_promise_job`].
#[derive(Debug)]
pub struct Job {
    pub(crate) inner: InnerJob,
}

#[derive(Debug)]
pub(crate) enum InnerJob {
    PromiseResolveThenable(PromiseResolveThenableJob),
    PromiseReaction(PromiseReactionJob),
}

impl Job {
    pub fn run(self, agent: &mut Agent) -> JsResult<()> {
        match self.inner {
            InnerJob::PromiseResolveThenable(job) => job.run(agent),
            InnerJob::PromiseReaction(job) => job.run(agent),
        }
    }
}

/// ### [9.7 Agents](https://tc39.es/ecma262/#sec-agents)
#[derive(Debug)]
pub struct Agent {
    pub(crate) heap: Heap,
    pub(crate) options: Options,
    pub(crate) host_hooks: &'static dyn HostHooks,
    /// \[\[ModuleAsyncEvaluationCount\]\]
    ///
    /// Initially 0, used to assign unique incrementing values to the
    /// \[\[AsyncEvaluationOrder\]\] field of modules that are asynchronous or
    /// have asynchronous dependencies.
    module_async_evaluation_count: u32,
}

impl Agent {
    pub fn new(options: Options, host_hooks: &'static dyn HostHooks) -> Self {
        Self {
            heap: Heap::new(),
            options,
            host_hooks,
            module_async_evaluation_count: 0,
        }
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    /// ### [9.3.1 InitializeHostDefinedRealm ( )](https://tc39.es/ecma262/#sec-initializehostdefinedrealm)
    ///
    /// Creates a realm whose \[\[LoadedModules\]\] list serves as the import
    /// cache for dynamic imports that have no active script or module.
    pub fn create_realm(&mut self, host_defined: Option<HostDefined>) -> Realm {
        self.heap.create(RealmRecord::new(host_defined))
    }

    /// ### [5.2.3.2 Throw an Exception](https://tc39.es/ecma262/#sec-throw-an-exception)
    pub fn throw_exception(&mut self, kind: ExceptionType, message: impl Into<String>) -> JsError {
        let error = self.create_exception(kind, message.into(), None);
        JsError(Value::Error(error))
    }

    /// Throws an error of the given kind whose `cause` is set to the given
    /// value.
    pub fn throw_exception_with_cause(
        &mut self,
        kind: ExceptionType,
        message: impl Into<String>,
        cause: Value,
    ) -> JsError {
        let error = self.create_exception(kind, message.into(), Some(cause));
        JsError(Value::Error(error))
    }

    fn create_exception(
        &mut self,
        kind: ExceptionType,
        message: String,
        cause: Option<Value>,
    ) -> Error {
        self.heap.create(ErrorHeapData::new(kind, message, cause))
    }

    /// ### [16.2.1.6.1.3.4 IncrementModuleAsyncEvaluationCount ( )](https://tc39.es/ecma262/#sec-IncrementModuleAsyncEvaluationCount)
    pub(crate) fn increment_module_async_evaluation_count(&mut self) -> u32 {
        // 1. Let AR be the Agent Record of the surrounding agent.
        // 2. Let count be AR.[[ModuleAsyncEvaluationCount]].
        let count = self.module_async_evaluation_count;
        // 3. Set AR.[[ModuleAsyncEvaluationCount]] to count + 1.
        self.module_async_evaluation_count += 1;
        // 4. Return count.
        count
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExceptionType {
    Error,
    AggregateError,
    EvalError,
    RangeError,
    ReferenceError,
    SyntaxError,
    TypeError,
    UriError,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecmascript::DefaultHostHooks;

    fn agent() -> Agent {
        let host_hooks: &'static DefaultHostHooks = Box::leak(Box::default());
        Agent::new(Options::default(), host_hooks)
    }

    #[test]
    fn async_evaluation_count_is_strictly_increasing() {
        let mut agent = agent();
        assert_eq!(agent.increment_module_async_evaluation_count(), 0);
        assert_eq!(agent.increment_module_async_evaluation_count(), 1);
        assert_eq!(agent.increment_module_async_evaluation_count(), 2);
    }

    #[test]
    fn thrown_errors_keep_their_cause() {
        let mut agent = agent();
        let inner = agent.throw_exception(ExceptionType::SyntaxError, "bad token");
        let outer = agent.throw_exception_with_cause(
            ExceptionType::TypeError,
            "failed to load",
            inner.value(),
        );
        let Value::Error(error) = outer.value() else {
            panic!("expected an Error value");
        };
        assert_eq!(error.kind(&agent), ExceptionType::TypeError);
        assert_eq!(error.message(&agent), "failed to load");
        assert_eq!(error.cause(&agent), Some(inner.value()));
    }
}
