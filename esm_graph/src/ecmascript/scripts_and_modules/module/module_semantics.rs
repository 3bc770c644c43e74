// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! ## [16.2.1 Module Semantics](https://tc39.es/ecma262/#sec-module-semantics)

pub mod abstract_module_records;
pub mod cyclic_module_records;
pub mod graph_loading_state_records;
pub mod synthetic_module_records;

use std::rc::Rc;

use crate::ecmascript::{
    builtins::{
        promise::Promise,
        promise_objects::{
            promise_abstract_operations::{
                promise_capability_records::PromiseCapability,
                promise_reaction_records::PromiseReactionHandler,
            },
            promise_prototype::inner_promise_then,
        },
    },
    execution::{Agent, JsResult, Realm, agent::ExceptionType},
    types::Value,
};

use abstract_module_records::Module;
use graph_loading_state_records::{GraphLoadingState, continue_module_loading};

/// ### [16.2.1.3.1 ModuleRequest Records](https://tc39.es/ecma262/#sec-modulerequest-record)
///
/// A ModuleRequest Record represents the request to import a module with given
/// import attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleRequest {
    /// \[\[Specifier]]
    ///
    /// The module specifier.
    specifier: Rc<str>,
    /// \[\[Attributes]]
    ///
    /// The import attributes.
    attributes: Box<[ImportAttribute]>,
    /// \[\[Phase]]
    ///
    /// The phase of the import.
    phase: ImportPhase,
}

/// ### [ImportAttribute Records](https://tc39.es/ecma262/#table-importattribute-fields)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImportAttribute {
    /// \[\[Key]]
    pub key: Rc<str>,
    /// \[\[Value]]
    pub value: Rc<str>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImportPhase {
    /// `import source x from "specifier"`: the module is loaded but neither
    /// its dependencies nor the module itself are linked or evaluated.
    Source,
    #[default]
    Evaluation,
}

impl ModuleRequest {
    /// A request for the evaluation phase of `specifier` without attributes.
    pub fn new(specifier: &str) -> Self {
        Self {
            specifier: specifier.into(),
            attributes: Box::default(),
            phase: ImportPhase::Evaluation,
        }
    }

    pub fn with_phase(mut self, phase: ImportPhase) -> Self {
        self.phase = phase;
        self
    }

    pub fn with_attribute(self, key: &str, value: &str) -> Self {
        let mut attributes = self.attributes.into_vec();
        attributes.push(ImportAttribute {
            key: key.into(),
            value: value.into(),
        });
        Self {
            attributes: attributes.into_boxed_slice(),
            ..self
        }
    }

    pub fn specifier(&self) -> &str {
        &self.specifier
    }

    pub fn attributes(&self) -> &[ImportAttribute] {
        &self.attributes
    }

    pub fn phase(&self) -> ImportPhase {
        self.phase
    }

    /// Returns the attribute value for the given key.
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|attribute| &*attribute.key == key)
            .map(|attribute| &*attribute.value)
    }

    /// ### [16.2.1.3.2 ModuleRequestsEqual ( left, right )](https://tc39.es/ecma262/#sec-ModuleRequestsEqual)
    ///
    /// The phase does not take part in the comparison: a source phase and an
    /// evaluation phase import of the same specifier resolve to the same
    /// module.
    pub fn is_equal_to(&self, right: &ModuleRequest) -> bool {
        // 1. If left.[[Specifier]] is not right.[[Specifier]], return false.
        if self.specifier != right.specifier {
            return false;
        }
        // 2. Let leftAttrs be left.[[Attributes]].
        // 3. Let rightAttrs be right.[[Attributes]].
        // 4. Let leftAttrsCount be the number of elements in leftAttrs.
        // 5. Let rightAttrsCount be the number of elements in rightAttrs.
        // 6. If leftAttrsCount ≠ rightAttrsCount, return false.
        if self.attributes.len() != right.attributes.len() {
            return false;
        }
        // 7. For each ImportAttribute Record l of leftAttrs, do
        //    a. If rightAttrs does not contain an ImportAttribute Record r
        //       such that l.[[Key]] is r.[[Key]] and l.[[Value]] is
        //       r.[[Value]], return false.
        // 8. Return true.
        self.attributes
            .iter()
            .all(|left| right.attributes.contains(left))
    }

    /// Drops the attributes the host does not support. With import attributes
    /// disabled, all attributes are dropped.
    pub(crate) fn filter_attributes(self, agent: &Agent) -> Self {
        if self.attributes.is_empty() {
            return self;
        }
        if !agent.options.import_attributes {
            return Self {
                attributes: Box::default(),
                ..self
            };
        }
        let supported = agent.host_hooks.get_supported_import_attributes();
        let is_supported =
            |attribute: &ImportAttribute| supported.iter().any(|key| *key == &*attribute.key);
        if self.attributes.iter().all(is_supported) {
            return self;
        }
        let attributes = self
            .attributes
            .iter()
            .filter(|attribute| is_supported(*attribute))
            .cloned()
            .collect();
        Self { attributes, ..self }
    }
}

/// ### [LoadedModuleRequest Records](https://tc39.es/ecma262/#table-loadedmodulerequest-fields)
#[derive(Debug, Clone)]
pub(crate) struct LoadedModuleRequestRecord {
    /// \[\[Specifier]], \[\[Attributes]]
    pub(crate) request: ModuleRequest,
    /// \[\[Module]]
    pub(crate) module: Module,
}

/// The referrer of a module request: the module whose import statement is
/// being resolved, or the realm for a dynamic import performed with no active
/// script or module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Referrer {
    Module(Module),
    Realm(Realm),
}

/// The payload handed through [`HostHooks::host_load_imported_module`] back to
/// [`finish_loading_imported_module`].
///
/// [`HostHooks::host_load_imported_module`]: crate::ecmascript::HostHooks::host_load_imported_module
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleLoadingPayload {
    /// A static import found while loading a module graph.
    GraphLoadingState(GraphLoadingState),
    /// A dynamic `import()`.
    PromiseCapability(PromiseCapability),
}

impl Referrer {
    /// ### \[\[LoadedModules]]
    fn loaded_modules<'a>(self, agent: &'a Agent) -> &'a [LoadedModuleRequestRecord] {
        match self {
            Referrer::Module(module) => agent[module].loaded_modules(),
            Referrer::Realm(realm) => &agent[realm].loaded_modules,
        }
    }

    fn loaded_modules_mut(self, agent: &mut Agent) -> Option<&mut Vec<LoadedModuleRequestRecord>> {
        match self {
            Referrer::Module(module) => agent[module].loaded_modules_mut(),
            Referrer::Realm(realm) => Some(&mut agent[realm].loaded_modules),
        }
    }

    /// Finds a previously loaded module for a request that is
    /// ModuleRequestsEqual to `module_request`.
    pub(crate) fn find_loaded_module(
        self,
        agent: &Agent,
        module_request: &ModuleRequest,
    ) -> Option<Module> {
        self.loaded_modules(agent)
            .iter()
            .find(|record| record.request.is_equal_to(module_request))
            .map(|record| record.module)
    }
}

/// ### [16.2.1.9 GetImportedModule ( referrer, request )](https://tc39.es/ecma262/#sec-GetImportedModule)
///
/// The abstract operation GetImportedModule takes arguments referrer (a
/// Cyclic Module Record) and request (a ModuleRequest Record) and returns a
/// Module Record.
///
/// A request that never finished loading is a TypeError rather than an
/// assertion failure: the embedder may link a graph whose loading failed.
pub(crate) fn get_imported_module(
    agent: &mut Agent,
    referrer: Module,
    request: &ModuleRequest,
) -> JsResult<Module> {
    // 1. Let records be a List consisting of each LoadedModuleRequest Record
    //    r of referrer.[[LoadedModules]] such that ModuleRequestsEqual(r,
    //    request) is true.
    // 2. Assert: records has exactly one element, since LoadRequestedModules
    //    has completed successfully on referrer prior to invoking this
    //    abstract operation.
    // 3. Let record be the sole element of records.
    // 4. Return record.[[Module]].
    match Referrer::Module(referrer).find_loaded_module(agent, request) {
        Some(module) => Ok(module),
        None => Err(agent.throw_exception(
            ExceptionType::TypeError,
            format!(
                "Module '{}' was requested but never loaded",
                request.specifier()
            ),
        )),
    }
}

/// ### [16.2.1.12 FinishLoadingImportedModule ( referrer, moduleRequest, payload, result )](https://tc39.es/ecma262/#sec-FinishLoadingImportedModule)
///
/// The abstract operation FinishLoadingImportedModule takes arguments
/// referrer (a Cyclic Module Record or a Realm Record), moduleRequest (a
/// ModuleRequest Record), payload (a GraphLoadingState Record or a
/// PromiseCapability Record), and result (either a normal completion
/// containing a Module Record or a throw completion) and returns unused.
///
/// The host calls this exactly once for each
/// [`HostHooks::host_load_imported_module`] call, passing the same
/// `referrer`, `module_request` and `payload` back.
///
/// [`HostHooks::host_load_imported_module`]: crate::ecmascript::HostHooks::host_load_imported_module
pub fn finish_loading_imported_module(
    agent: &mut Agent,
    referrer: Referrer,
    module_request: &ModuleRequest,
    payload: ModuleLoadingPayload,
    result: JsResult<Module>,
) {
    // 1. If result is a normal completion, then
    if let Ok(module) = result {
        // a. If referrer.[[LoadedModules]] contains a LoadedModuleRequest
        //    Record record such that ModuleRequestsEqual(record,
        //    moduleRequest) is true, then
        if let Some(existing) = referrer.find_loaded_module(agent, module_request) {
            // i. Assert: record.[[Module]] and result.[[Value]] are the same
            //    Module Record.
            debug_assert_eq!(
                existing, module,
                "host resolved the same module request to two different modules"
            );
        } else if let Some(loaded_modules) = referrer.loaded_modules_mut(agent) {
            // b. Else, append the LoadedModuleRequest Record {
            //    [[Specifier]]: moduleRequest.[[Specifier]], [[Attributes]]:
            //    moduleRequest.[[Attributes]], [[Module]]: result.[[Value]] }
            //    to referrer.[[LoadedModules]].
            loaded_modules.push(LoadedModuleRequestRecord {
                request: module_request.clone(),
                module,
            });
        }
    }
    match payload {
        // 2. If payload is a GraphLoadingState Record, then
        ModuleLoadingPayload::GraphLoadingState(state) => {
            // a. Perform ContinueModuleLoading(payload, result).
            continue_module_loading(agent, state, result, module_request.phase());
        }
        // 3. Else,
        ModuleLoadingPayload::PromiseCapability(promise_capability) => {
            // a. Perform ContinueDynamicImport(payload, moduleRequest.[[Phase]], result).
            continue_dynamic_import(agent, promise_capability, module_request.phase(), result);
        }
    }
    // 4. Return unused.
}

/// ### [13.3.10.1.1 EvaluateImportCall ( specifierExpression \[ , optionsExpression \] )](https://tc39.es/ecma262/#sec-evaluate-import-call)
///
/// Performs a dynamic `import()` of `module_request` on behalf of `referrer`
/// and returns the promise that the expression evaluates to. For the
/// evaluation phase the promise fulfills with the module namespace; for the
/// source phase it fulfills with the module source object.
pub fn evaluate_import_call(
    agent: &mut Agent,
    referrer: Referrer,
    module_request: ModuleRequest,
) -> Promise {
    // 6. Let promiseCapability be ! NewPromiseCapability(%Promise%).
    let promise_capability = PromiseCapability::new(agent);
    let promise = promise_capability.promise();
    if module_request.phase() == ImportPhase::Source && !agent.options.source_phase_imports {
        let error = agent.throw_exception(
            ExceptionType::SyntaxError,
            "Source phase imports are not enabled",
        );
        promise_capability.reject(agent, error.value());
        return promise;
    }
    // 10.f. If AllImportAttributesSupported(attributes) is false, then
    //       i. Let error be a newly created SyntaxError object.
    //       ii. Perform ! Call(promiseCapability.[[Reject]], undefined, « error »).
    //       iii. Return promiseCapability.[[Promise]].
    // NOTE: Unsupported attributes are dropped instead of rejected.
    let module_request = module_request.filter_attributes(agent);
    // 11. Let moduleRequest be a new ModuleRequest Record { [[Specifier]]:
    //     specifierString, [[Attributes]]: attributes, [[Phase]]: phase }.
    // 12. Perform HostLoadImportedModule(referrer, moduleRequest, EMPTY, promiseCapability).
    log::trace!("host load requested for import('{}')", module_request.specifier());
    let host_hooks = agent.host_hooks;
    host_hooks.host_load_imported_module(
        agent,
        referrer,
        &module_request,
        None,
        ModuleLoadingPayload::PromiseCapability(promise_capability),
    );
    // 13. Return promiseCapability.[[Promise]].
    promise
}

/// ### [16.2.1.13 ContinueDynamicImport ( promiseCapability, phase, moduleCompletion )](https://tc39.es/ecma262/#sec-ContinueDynamicImport)
///
/// The abstract operation ContinueDynamicImport takes arguments
/// promiseCapability (a PromiseCapability Record), phase (source or
/// evaluation), and moduleCompletion (either a normal completion containing a
/// Module Record or a throw completion) and returns unused. It completes the
/// process of a dynamic import originally started by an import() call,
/// resolving or rejecting the promise returned by that call as appropriate.
pub(crate) fn continue_dynamic_import(
    agent: &mut Agent,
    promise_capability: PromiseCapability,
    phase: ImportPhase,
    module_completion: JsResult<Module>,
) {
    let module = match module_completion {
        // 2. Let module be moduleCompletion.[[Value]].
        Ok(module) => module,
        // 1. If moduleCompletion is an abrupt completion, then
        Err(error) => {
            // a. Perform ! Call(promiseCapability.[[Reject]], undefined, « moduleCompletion.[[Value]] »).
            promise_capability.reject(agent, error.value());
            // b. Return unused.
            return;
        }
    };
    // 3. If phase is source, then
    if phase == ImportPhase::Source {
        // a. Let moduleSourceObject be Completion(module.GetModuleSource()).
        match module.get_module_source(agent) {
            // c. Else,
            //    i. Perform ! Call(promiseCapability.[[Resolve]], undefined, « moduleSourceObject.[[Value]] »).
            Ok(module_source) => promise_capability.resolve(agent, module_source),
            // b. If moduleSourceObject is an abrupt completion, then
            //    i. Perform ! Call(promiseCapability.[[Reject]], undefined, « moduleSourceObject.[[Value]] »).
            Err(error) => promise_capability.reject(agent, error.value()),
        }
        // d. Return unused.
        return;
    }
    // 4. Let loadPromise be module.LoadRequestedModules().
    let load_promise = module.load_requested_modules(agent, None);
    // 5. Let rejectedClosure be a new Abstract Closure with parameters
    //    (reason) that captures promiseCapability and performs the following
    //    steps when called:
    //    a. Perform ! Call(promiseCapability.[[Reject]], undefined, « reason »).
    //    b. Return NormalCompletion(undefined).
    // 6. Let onRejected be CreateBuiltinFunction(rejectedClosure, 1, "", « »).
    // 7. Let linkAndEvaluateClosure be a new Abstract Closure with no
    //    parameters that captures module, promiseCapability, and onRejected
    //    and performs the following steps when called:
    // 8. Let linkAndEvaluate be CreateBuiltinFunction(linkAndEvaluateClosure, 0, "", « »).
    // 9. Perform PerformPromiseThen(loadPromise, linkAndEvaluate, onRejected).
    let handler = PromiseReactionHandler::DynamicImportLoaded {
        promise_capability,
        module,
    };
    inner_promise_then(agent, load_promise, handler, handler, None);
    // 10. Return unused.
}

/// The linkAndEvaluateClosure of
/// [ContinueDynamicImport](https://tc39.es/ecma262/#sec-ContinueDynamicImport).
pub(crate) fn continue_dynamic_import_link_and_evaluate(
    agent: &mut Agent,
    promise_capability: PromiseCapability,
    module: Module,
) {
    // a. Let link be Completion(module.Link()).
    // b. If link is an abrupt completion, then
    if let Err(error) = module.link(agent) {
        // i. Perform ! Call(promiseCapability.[[Reject]], undefined, « link.[[Value]] »).
        promise_capability.reject(agent, error.value());
        // ii. Return NormalCompletion(undefined).
        return;
    }
    // c. Let evaluatePromise be module.Evaluate().
    let evaluate_promise = module.evaluate_to_promise(agent);
    // d. Let fulfilledClosure be a new Abstract Closure with no parameters
    //    that captures module and promiseCapability and performs the
    //    following steps when called:
    //    i. Let namespace be GetModuleNamespace(module).
    //    ii. Perform ! Call(promiseCapability.[[Resolve]], undefined, « namespace »).
    //    iii. Return NormalCompletion(undefined).
    // e. Let onFulfilled be CreateBuiltinFunction(fulfilledClosure, 0, "", « »).
    // f. Perform PerformPromiseThen(evaluatePromise, onFulfilled, onRejected).
    let handler = PromiseReactionHandler::DynamicImportEvaluated {
        promise_capability,
        module,
    };
    inner_promise_then(agent, evaluate_promise, handler, handler, None);
    // g. Return unused.
}

/// ### [16.2.1.14 GetModuleNamespace ( module )](https://tc39.es/ecma262/#sec-getmodulenamespace)
///
/// The abstract operation GetModuleNamespace takes argument module (an
/// instance of a concrete subclass of Module Record) and returns a Module
/// Namespace Object. It retrieves the Module Namespace Object representing
/// module's exports, lazily creating it the first time it was requested, and
/// storing it in module.\[\[Namespace]] for future retrieval.
pub fn get_module_namespace(agent: &mut Agent, module: Module) -> Value {
    // 1. Assert: If module is a Cyclic Module Record, then module.[[Status]]
    //    is not new or unlinked.
    debug_assert!(module.status(agent).is_none_or(|status| !matches!(
        status,
        cyclic_module_records::CyclicModuleRecordStatus::New
            | cyclic_module_records::CyclicModuleRecordStatus::Unlinked
    )));
    // 2. Let namespace be module.[[Namespace]].
    // 3. If namespace is empty, then
    //    a. Let exportedNames be module.GetExportedNames().
    //    b. Let unambiguousNames be a new empty List.
    //    c. ...
    //    d. Set namespace to ModuleNamespaceCreate(module, unambiguousNames).
    // NOTE: Export resolution belongs to the module bodies; the namespace is
    // identified by its module.
    agent[module].namespace_created = true;
    // 4. Return namespace.
    Value::Namespace(module)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn module_requests_equal_ignores_attribute_order_and_phase() {
        let left = ModuleRequest::new("./data.json")
            .with_attribute("type", "json")
            .with_attribute("integrity", "abc");
        let right = ModuleRequest::new("./data.json")
            .with_attribute("integrity", "abc")
            .with_attribute("type", "json")
            .with_phase(ImportPhase::Source);
        assert!(left.is_equal_to(&right));
        assert!(right.is_equal_to(&left));
    }

    #[test]
    fn module_requests_differ_on_specifier_or_attributes() {
        let plain = ModuleRequest::new("./a.js");
        assert!(!plain.is_equal_to(&ModuleRequest::new("./b.js")));
        assert!(!plain.is_equal_to(&ModuleRequest::new("./a.js").with_attribute("type", "json")));
        assert!(
            !ModuleRequest::new("./a.js")
                .with_attribute("type", "json")
                .is_equal_to(&ModuleRequest::new("./a.js").with_attribute("type", "css"))
        );
    }

    #[test]
    fn attribute_lookup() {
        let request = ModuleRequest::new("./a.json").with_attribute("type", "json");
        assert_eq!(request.attribute("type"), Some("json"));
        assert_eq!(request.attribute("mode"), None);
        assert_eq!(request.phase(), ImportPhase::Evaluation);
    }
}
