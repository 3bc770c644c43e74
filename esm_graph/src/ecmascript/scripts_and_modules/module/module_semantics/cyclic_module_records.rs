// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! ## [16.2.1.6 Cyclic Module Records](https://tc39.es/ecma262/#sec-cyclic-module-records)
//!
//! The depth-first traversals of Link and Evaluate are performed with an
//! explicit stack of [`DfsFrame`]s instead of native recursion, so that deep
//! import chains cannot overflow the call stack. Each frame remembers the
//! module being visited and the index of its next requested module; popping a
//! frame runs the steps that follow the request loop of InnerModuleLinking or
//! InnerModuleEvaluation, after which the parent frame resumes at step 9.c or
//! 11.c respectively.

use std::rc::Rc;

use ahash::AHashSet;

use crate::{
    ecmascript::{
        builtins::promise_objects::{
            promise_abstract_operations::{
                promise_capability_records::PromiseCapability,
                promise_reaction_records::PromiseReactionHandler,
            },
            promise_prototype::inner_promise_then,
        },
        execution::{Agent, HostDefined, JsError, JsResult, Realm, agent::ExceptionType},
        types::Value,
    },
    heap::CreateHeapData,
};

use super::{
    ImportPhase, LoadedModuleRequestRecord, ModuleRequest,
    abstract_module_records::{Module, ModuleRecord, ModuleRecordKind},
    get_imported_module,
};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum CyclicModuleRecordStatus {
    #[default]
    New,
    Unlinked,
    Linking,
    Linked,
    Evaluating,
    EvaluatingAsync,
    Evaluated,
}

/// ### \[\[AsyncEvaluationOrder]]
///
/// unset, an integer, or done
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum AsyncEvaluationOrder {
    #[default]
    Unset,
    Order(u32),
    Done,
}

impl AsyncEvaluationOrder {
    /// True while the module is taking part in an asynchronous evaluation.
    pub fn is_integer(self) -> bool {
        matches!(self, AsyncEvaluationOrder::Order(_))
    }
}

/// ### [Additional Abstract Methods of Cyclic Module Records](https://tc39.es/ecma262/#table-cyclic-module-methods)
///
/// The module body: everything about a module that is not its place in the
/// module graph. Implemented by the embedder.
pub trait CyclicModuleMethods: std::fmt::Debug {
    /// ### InitializeEnvironment()
    ///
    /// Initialize the Environment Record of the module, including resolving
    /// all imported bindings, and create the module's execution context.
    fn initialize_environment(&self, agent: &mut Agent, module: Module) -> JsResult<()>;

    /// ### ExecuteModule(\[promiseCapability])
    ///
    /// Evaluate the module's code within its execution context. If this module
    /// has true in \[\[HasTLA]], then a PromiseCapability Record is passed as
    /// an argument, and the method is expected to resolve or reject the given
    /// capability. In this case, the method must not throw an exception, but
    /// instead reject the PromiseCapability Record if necessary.
    ///
    /// The returned value is the completion value of a synchronous module.
    fn execute_module(
        &self,
        agent: &mut Agent,
        module: Module,
        promise_capability: Option<PromiseCapability>,
    ) -> JsResult<Value>;

    /// ### GetModuleSource()
    ///
    /// Returns the module source object for a source phase import. Modules
    /// without a source representation throw a SyntaxError.
    fn get_module_source(&self, agent: &mut Agent, _module: Module) -> JsResult<Value> {
        Err(agent.throw_exception(
            ExceptionType::SyntaxError,
            "Module has no source phase representation",
        ))
    }
}

#[derive(Debug)]
pub(crate) struct CyclicModuleRecord {
    /// ### \[\[Status]]
    ///
    /// Initially new. Transitions to unlinked, linking, linked, evaluating,
    /// possibly evaluating-async, evaluated (in that order) as the module
    /// progresses throughout its lifecycle. evaluating-async indicates this
    /// module is queued to execute on completion of its asynchronous
    /// dependencies or it is a module whose `[[HasTLA]]` field is true that
    /// has been executed and is pending top-level completion.
    pub(crate) status: CyclicModuleRecordStatus,
    /// ### \[\[EvaluationError]]
    ///
    /// a throw completion or empty
    ///
    /// A throw completion representing the exception that occurred during
    /// evaluation. undefined if no exception occurred or if `[[Status]]` is
    /// not evaluated.
    pub(crate) evaluation_error: Option<JsError>,
    /// ### \[\[DFSIndex]]
    ///
    /// Auxiliary field used during Link and Evaluate only. If `[[Status]]` is
    /// either linking or evaluating, this non-negative number records the
    /// point at which the module was first visited during the depth-first
    /// traversal of the dependency graph.
    pub(crate) dfs_index: Option<u32>,
    /// ### \[\[DFSAncestorIndex]]
    ///
    /// Auxiliary field used during Link and Evaluate only. If `[[Status]]` is
    /// either linking or evaluating, this is either the module's own
    /// `[[DFSIndex]]` or that of an "earlier" module in the same strongly
    /// connected component.
    pub(crate) dfs_ancestor_index: Option<u32>,
    /// ### \[\[RequestedModules]]
    ///
    /// A List of the ModuleRequest Records associated with the imports in this
    /// module. The List is in source text occurrence order of the imports.
    pub(crate) requested_modules: Box<[ModuleRequest]>,
    /// ### \[\[LoadedModules]]
    ///
    /// A map from the specifier strings used by the module represented by this
    /// record to request the importation of a module with the relative import
    /// attributes to the resolved Module Record. The list does not contain two
    /// different Records r1 and r2 such that ModuleRequestsEqual(r1, r2) is true.
    pub(crate) loaded_modules: Vec<LoadedModuleRequestRecord>,
    /// ### \[\[CycleRoot]]
    ///
    /// The first visited module of the cycle, the root DFS ancestor of the
    /// strongly connected component. For a module not in a cycle, this would
    /// be the module itself. Once Evaluate has completed, a module's
    /// `[[DFSAncestorIndex]]` is the `[[DFSIndex]]` of its `[[CycleRoot]]`.
    pub(crate) cycle_root: Option<Module>,
    /// ### \[\[HasTLA]]
    ///
    /// Whether this module is individually asynchronous (for example, if it's
    /// a Source Text Module Record containing a top-level await). Having an
    /// asynchronous dependency does not mean this field is true. This field
    /// must not change after the module is parsed.
    pub(crate) has_tla: bool,
    /// ### \[\[AsyncEvaluationOrder]]
    ///
    /// This field is initially set to unset, and remains unset for fully
    /// synchronous modules. For modules that are either themselves
    /// asynchronous or have an asynchronous dependency, it is set to an
    /// integer that determines the order in which execution of pending modules
    /// is queued by AsyncModuleExecutionFulfilled. Once the pending module is
    /// executed, the field is set to done.
    pub(crate) async_evaluation_order: AsyncEvaluationOrder,
    /// ### \[\[TopLevelCapability]]
    ///
    /// If this module is the `[[CycleRoot]]` of some cycle, and Evaluate() was
    /// called on some module in that cycle, this field contains the
    /// PromiseCapability Record for that entire evaluation. It is used to
    /// settle the Promise object that is returned from the Evaluate() abstract
    /// method. This field will be empty for any dependencies of that module,
    /// unless a top-level Evaluate() has been initiated for some of those
    /// dependencies.
    pub(crate) top_level_capability: Option<PromiseCapability>,
    /// ### \[\[AsyncParentModules]]
    ///
    /// If this module or a dependency has `[[HasTLA]]` true, and execution is
    /// in progress, this tracks the parent importers of this module for the
    /// top-level execution job. These parent modules will not start executing
    /// before this module has successfully completed execution.
    pub(crate) async_parent_modules: Vec<Module>,
    /// ### \[\[PendingAsyncDependencies]]
    ///
    /// If this module has any asynchronous dependencies, this tracks the
    /// number of asynchronous dependency modules remaining to execute for this
    /// module. A module with asynchronous dependencies will be executed when
    /// this field reaches 0 and there are no execution errors.
    pub(crate) pending_async_dependencies: Option<u32>,
    /// Completion value of the last successful synchronous ExecuteModule.
    pub(crate) evaluation_result: Value,
    /// The error of the last graph load that visited this module and failed.
    /// Cleared once a load of the module succeeds.
    pub(crate) load_error: Option<JsError>,
    pub(crate) methods: Rc<dyn CyclicModuleMethods>,
}

impl CyclicModuleRecord {
    pub(crate) fn new(
        requested_modules: Box<[ModuleRequest]>,
        has_tla: bool,
        methods: Rc<dyn CyclicModuleMethods>,
    ) -> Self {
        Self {
            status: CyclicModuleRecordStatus::New,
            evaluation_error: None,
            dfs_index: None,
            dfs_ancestor_index: None,
            requested_modules,
            loaded_modules: Vec::new(),
            cycle_root: None,
            has_tla,
            async_evaluation_order: AsyncEvaluationOrder::Unset,
            top_level_capability: None,
            async_parent_modules: Vec::new(),
            pending_async_dependencies: None,
            evaluation_result: Value::Undefined,
            load_error: None,
            methods,
        }
    }

    /// Set \[\[EvaluationError]] to error and \[\[Status]] to evaluated.
    fn set_evaluation_error(&mut self, error: JsError) {
        debug_assert!(
            self.evaluation_error.is_none(),
            "Attempted to set module [[EvaluationError]] twice"
        );
        debug_assert!(matches!(self.status, CyclicModuleRecordStatus::Evaluating));
        self.evaluation_error = Some(error);
        self.status = CyclicModuleRecordStatus::Evaluated;
    }

    /// Set \[\[DFSIndex]] and \[\[DFSAncestorIndex]] to index.
    fn set_dfs_index(&mut self, index: u32) {
        self.dfs_index = Some(index);
        self.dfs_ancestor_index = Some(index);
    }

    /// Set \[\[DFSAncestorIndex]] to min(\[\[DFSAncestorIndex]], index).
    fn lower_dfs_ancestor_index(&mut self, index: Option<u32>) {
        self.dfs_ancestor_index = self.dfs_ancestor_index.min(index);
    }

    fn is_scc_root(&self) -> bool {
        debug_assert!(self.dfs_ancestor_index <= self.dfs_index);
        self.dfs_ancestor_index == self.dfs_index
    }

    /// Set module.\[\[Status]] to unlinked.
    pub(crate) fn set_unlinked(&mut self) {
        debug_assert!(matches!(
            self.status,
            CyclicModuleRecordStatus::New | CyclicModuleRecordStatus::Linking
        ));
        self.status = CyclicModuleRecordStatus::Unlinked;
    }

    /// Set module.\[\[Status]] to linking.
    fn set_linking(&mut self) {
        debug_assert!(matches!(self.status, CyclicModuleRecordStatus::Unlinked));
        self.status = CyclicModuleRecordStatus::Linking;
    }

    /// Set module.\[\[Status]] to linked.
    fn set_linked(&mut self) {
        debug_assert!(matches!(self.status, CyclicModuleRecordStatus::Linking));
        self.status = CyclicModuleRecordStatus::Linked;
    }

    /// Set module.\[\[Status]] to evaluating.
    fn set_evaluating(&mut self) {
        debug_assert!(matches!(self.status, CyclicModuleRecordStatus::Linked));
        self.status = CyclicModuleRecordStatus::Evaluating;
    }

    /// Set \[\[AsyncEvaluationOrder]] to done and \[\[Status]] to evaluated.
    fn set_async_evaluated(&mut self) {
        debug_assert!(matches!(
            self.status,
            CyclicModuleRecordStatus::EvaluatingAsync
        ));
        debug_assert!(self.async_evaluation_order.is_integer());
        debug_assert!(self.evaluation_error.is_none());
        self.async_evaluation_order = AsyncEvaluationOrder::Done;
        self.status = CyclicModuleRecordStatus::Evaluated;
    }
}

impl Module {
    /// Creates a Cyclic Module Record in the given realm.
    ///
    /// `requested_modules` lists the module's imports in source text order;
    /// unsupported import attributes are dropped from them. `has_tla` marks a
    /// module whose body is asynchronous: its `execute_module` receives a
    /// promise capability that it settles once the body completes.
    pub fn new_cyclic(
        agent: &mut Agent,
        realm: Realm,
        requested_modules: Vec<ModuleRequest>,
        has_tla: bool,
        methods: Rc<dyn CyclicModuleMethods>,
        host_defined: Option<HostDefined>,
    ) -> JsResult<Module> {
        if !agent.options.source_phase_imports
            && requested_modules
                .iter()
                .any(|request| request.phase() == ImportPhase::Source)
        {
            return Err(agent.throw_exception(
                ExceptionType::SyntaxError,
                "Source phase imports are not enabled",
            ));
        }
        let requested_modules = requested_modules
            .into_iter()
            .map(|request| request.filter_attributes(agent))
            .collect();
        let record = CyclicModuleRecord::new(requested_modules, has_tla, methods);
        Ok(agent.heap.create(ModuleRecord::new(
            realm,
            host_defined,
            ModuleRecordKind::Cyclic(record),
        )))
    }
}

/// A module whose requested modules are being visited by Link or Evaluate.
struct DfsFrame {
    module: Module,
    next_request: usize,
}

impl DfsFrame {
    fn new(module: Module) -> Self {
        Self {
            module,
            next_request: 0,
        }
    }
}

/// Advances `cursor` past the next evaluation phase request of `module` and
/// returns it. Source phase imports take no part in linking or evaluation.
fn next_evaluation_phase_request(
    agent: &Agent,
    module: Module,
    cursor: &mut usize,
) -> Option<ModuleRequest> {
    let requested_modules = &agent[module].cyclic().requested_modules;
    while let Some(request) = requested_modules.get(*cursor) {
        *cursor += 1;
        if request.phase() == ImportPhase::Evaluation {
            return Some(request.clone());
        }
    }
    None
}

/// ### [16.2.1.6.1.2 Link ( )](https://tc39.es/ecma262/#sec-moduledeclarationlinking)
///
/// The Link concrete method of a Cyclic Module Record module takes no
/// arguments and returns either a normal completion containing unused or a
/// throw completion. On success, Link transitions this module's \[\[Status]]
/// from unlinked to linked. On failure, an exception is thrown and this
/// module's \[\[Status]] remains unlinked.
pub(crate) fn link(agent: &mut Agent, module: Module) -> JsResult<()> {
    // 1. Assert: module.[[Status]] is one of unlinked, linked,
    //    evaluating-async, or evaluated.
    match agent[module].cyclic().status {
        CyclicModuleRecordStatus::Unlinked
        | CyclicModuleRecordStatus::Linked
        | CyclicModuleRecordStatus::EvaluatingAsync
        | CyclicModuleRecordStatus::Evaluated => {}
        CyclicModuleRecordStatus::New => {
            return Err(not_loaded_error(
                agent,
                module,
                "Cannot link a module whose dependencies have not been loaded",
            ));
        }
        CyclicModuleRecordStatus::Linking | CyclicModuleRecordStatus::Evaluating => {
            return Err(agent.throw_exception(
                ExceptionType::TypeError,
                "Cannot link a module that is being linked or evaluated",
            ));
        }
    }
    // 2. Let stack be a new empty List.
    let mut stack = Vec::with_capacity(8);
    // 3. Let result be Completion(InnerModuleLinking(module, stack, 0)).
    let result = inner_module_linking(agent, module, &mut stack, 0);
    // 4. If result is an abrupt completion, then
    if let Err(error) = result {
        log::debug!(
            "linking {module:?} failed, resetting {} modules to unlinked",
            stack.len()
        );
        // a. For each Cyclic Module Record m of stack, do
        for m in stack {
            // i. Assert: m.[[Status]] is linking.
            // ii. Set m.[[Status]] to unlinked.
            agent[m].cyclic_mut().set_unlinked();
        }
        // b. Assert: module.[[Status]] is unlinked.
        debug_assert_eq!(
            agent[module].cyclic().status,
            CyclicModuleRecordStatus::Unlinked
        );
        // c. Return ? result.
        return Err(error);
    }
    // 5. Assert: module.[[Status]] is one of linked, evaluating-async, or
    //    evaluated.
    debug_assert!(matches!(
        agent[module].cyclic().status,
        CyclicModuleRecordStatus::Linked
            | CyclicModuleRecordStatus::EvaluatingAsync
            | CyclicModuleRecordStatus::Evaluated
    ));
    // 6. Assert: stack is empty.
    debug_assert!(stack.is_empty());
    // 7. Return unused.
    Ok(())
}

/// TypeError for a module that cannot be linked or evaluated yet. If the
/// module's graph failed to load, the load error is its cause.
fn not_loaded_error(agent: &mut Agent, module: Module, message: &str) -> JsError {
    match agent[module].cyclic().load_error {
        Some(load_error) => {
            agent.throw_exception_with_cause(ExceptionType::TypeError, message, load_error.value())
        }
        None => agent.throw_exception(ExceptionType::TypeError, message),
    }
}

/// ### [16.2.1.6.1.2.1 InnerModuleLinking ( module, stack, index )](https://tc39.es/ecma262/#sec-InnerModuleLinking)
///
/// The abstract operation InnerModuleLinking takes arguments module (a Module
/// Record), stack (a List of Cyclic Module Records), and index (a non-negative
/// integer) and returns either a normal completion containing a non-negative
/// integer or a throw completion. It is used by Link to perform the actual
/// linking process for module, as well as recursively on all other modules in
/// the dependency graph. The stack and index parameters, as well as a module's
/// \[\[DFSIndex]] and \[\[DFSAncestorIndex]] fields, keep track of the
/// depth-first search (DFS) traversal. In particular, \[\[DFSAncestorIndex]]
/// is used to discover strongly connected components (SCCs), such that all
/// modules in an SCC transition to linked together.
pub(crate) fn inner_module_linking(
    agent: &mut Agent,
    module: Module,
    stack: &mut Vec<Module>,
    mut index: u32,
) -> JsResult<u32> {
    if !enter_module_linking(agent, module, stack, &mut index)? {
        return Ok(index);
    }
    let mut frames = vec![DfsFrame::new(module)];
    while let Some(frame) = frames.last_mut() {
        let module = frame.module;
        // 9. For each ModuleRequest Record request of
        //    module.[[RequestedModules]], do
        if let Some(request) = next_evaluation_phase_request(agent, module, &mut frame.next_request)
        {
            // a. Let requiredModule be GetImportedModule(module, request).
            let required_module = get_imported_module(agent, module, &request)?;
            // b. Set index to ? InnerModuleLinking(requiredModule, stack, index).
            if enter_module_linking(agent, required_module, stack, &mut index)? {
                frames.push(DfsFrame::new(required_module));
            } else {
                link_required_module(agent, module, required_module);
            }
            continue;
        }
        frames.pop();
        finish_module_linking(agent, module, stack)?;
        if let Some(parent) = frames.last() {
            link_required_module(agent, parent.module, module);
        }
    }
    // 14. Return index.
    Ok(index)
}

/// Steps 1 to 8 of InnerModuleLinking. Returns true if the module was pushed
/// onto the stack and its requested modules must be visited.
fn enter_module_linking(
    agent: &mut Agent,
    module: Module,
    stack: &mut Vec<Module>,
    index: &mut u32,
) -> JsResult<bool> {
    // 1. If module is not a Cyclic Module Record, then
    if !module.is_cyclic_module_record(agent) {
        // a. Perform ? module.Link().
        module.link(agent)?;
        // b. Return index.
        return Ok(false);
    }
    match agent[module].cyclic().status {
        // 2. If module.[[Status]] is one of linking, linked,
        //    evaluating-async, or evaluated, then
        CyclicModuleRecordStatus::Linking
        | CyclicModuleRecordStatus::Linked
        | CyclicModuleRecordStatus::EvaluatingAsync
        | CyclicModuleRecordStatus::Evaluated => {
            // a. Return index.
            return Ok(false);
        }
        // 3. Assert: module.[[Status]] is unlinked.
        CyclicModuleRecordStatus::Unlinked => {}
        CyclicModuleRecordStatus::New | CyclicModuleRecordStatus::Evaluating => {
            return Err(agent.throw_exception(
                ExceptionType::TypeError,
                "Cannot link a module graph that has not finished loading",
            ));
        }
    }
    log::trace!("linking {module:?} at DFS index {index}");
    let record = agent[module].cyclic_mut();
    // 4. Set module.[[Status]] to linking.
    record.set_linking();
    // 5. Set module.[[DFSIndex]] to index.
    // 6. Set module.[[DFSAncestorIndex]] to index.
    record.set_dfs_index(*index);
    // 7. Set index to index + 1.
    *index += 1;
    // 8. Append module to stack.
    stack.push(module);
    Ok(true)
}

/// Step 9.c of InnerModuleLinking, performed once `required_module` has been
/// linked on behalf of `module`.
fn link_required_module(agent: &mut Agent, module: Module, required_module: Module) {
    // c. If requiredModule is a Cyclic Module Record, then
    let Some(required) = agent[required_module].as_cyclic() else {
        return;
    };
    // i. Assert: requiredModule.[[Status]] is one of linking, linked,
    //    evaluating-async, or evaluated.
    debug_assert!(matches!(
        required.status,
        CyclicModuleRecordStatus::Linking
            | CyclicModuleRecordStatus::Linked
            | CyclicModuleRecordStatus::EvaluatingAsync
            | CyclicModuleRecordStatus::Evaluated
    ));
    // ii. Assert: requiredModule.[[Status]] is linking if and only if stack
    //     contains requiredModule.
    // iii. If requiredModule.[[Status]] is linking, then
    if required.status == CyclicModuleRecordStatus::Linking {
        // 1. Set module.[[DFSAncestorIndex]] to
        //    min(module.[[DFSAncestorIndex]], requiredModule.[[DFSAncestorIndex]]).
        let required_ancestor_index = required.dfs_ancestor_index;
        agent[module]
            .cyclic_mut()
            .lower_dfs_ancestor_index(required_ancestor_index);
    }
}

/// Steps 10 to 13 of InnerModuleLinking.
fn finish_module_linking(
    agent: &mut Agent,
    module: Module,
    stack: &mut Vec<Module>,
) -> JsResult<()> {
    // 10. Perform ? module.InitializeEnvironment().
    let methods = agent[module].cyclic().methods.clone();
    methods.initialize_environment(agent, module)?;
    // 11. Assert: module occurs exactly once in stack.
    debug_assert_eq!(stack.iter().filter(|m| **m == module).count(), 1);
    // 12. Assert: module.[[DFSAncestorIndex]] ≤ module.[[DFSIndex]].
    // 13. If module.[[DFSAncestorIndex]] = module.[[DFSIndex]], then
    if agent[module].cyclic().is_scc_root() {
        let mut component_size = 0usize;
        // a. Let done be false.
        // b. Repeat, while done is false,
        //    i. Let requiredModule be the last element of stack.
        //    ii. Remove the last element of stack.
        while let Some(required_module) = stack.pop() {
            // iii. Assert: requiredModule is a Cyclic Module Record.
            // iv. Set requiredModule.[[Status]] to linked.
            agent[required_module].cyclic_mut().set_linked();
            component_size += 1;
            // v. If requiredModule and module are the same Module Record,
            //    set done to true.
            if required_module == module {
                break;
            }
        }
        log::debug!("linked strongly connected component {module:?} of {component_size} modules");
    }
    Ok(())
}

/// ### [16.2.1.6.1.3 Evaluate ( )](https://tc39.es/ecma262/#sec-moduleevaluation)
///
/// The Evaluate concrete method of a Cyclic Module Record module takes no
/// arguments and returns a Promise. Evaluate transitions this module's
/// \[\[Status]] from linked to either evaluating-async or evaluated. The
/// first time it is called on a module in a given strongly connected
/// component, Evaluate creates and returns a Promise which resolves when the
/// module has finished evaluating. This Promise is stored in the
/// \[\[TopLevelCapability]] field of the \[\[CycleRoot]] for the component.
/// Future invocations of Evaluate on any module in the component return the
/// same Promise.
///
/// Without `with_capability` no promise is created up front: a fully
/// synchronous evaluation returns the root's completion value or its thrown
/// error, and a promise is created only if the root is left evaluating-async.
pub(crate) fn evaluate(
    agent: &mut Agent,
    module: Module,
    with_capability: bool,
) -> JsResult<Value> {
    // 1. Assert: This call to Evaluate is not happening at the same time as
    //    another call to Evaluate within the surrounding agent.
    // 2. Assert: module.[[Status]] is one of linked, evaluating-async, or
    //    evaluated.
    let status = agent[module].cyclic().status;
    match status {
        CyclicModuleRecordStatus::Linked
        | CyclicModuleRecordStatus::EvaluatingAsync
        | CyclicModuleRecordStatus::Evaluated => {}
        CyclicModuleRecordStatus::New | CyclicModuleRecordStatus::Unlinked => {
            return Err(not_loaded_error(
                agent,
                module,
                "Cannot evaluate a module that has not been linked",
            ));
        }
        CyclicModuleRecordStatus::Linking | CyclicModuleRecordStatus::Evaluating => {
            return Err(agent.throw_exception(
                ExceptionType::TypeError,
                "Cannot evaluate a module that is being linked or evaluated",
            ));
        }
    }
    // 3. If module.[[Status]] is either evaluating-async or evaluated, then
    let module = if matches!(
        status,
        CyclicModuleRecordStatus::EvaluatingAsync | CyclicModuleRecordStatus::Evaluated
    ) {
        // a. Assert: module.[[CycleRoot]] is not empty.
        // b. Set module to module.[[CycleRoot]].
        agent[module].cyclic().cycle_root.unwrap_or(module)
    } else {
        module
    };
    // 4. If module.[[TopLevelCapability]] is not empty, then
    if let Some(capability) = agent[module].cyclic().top_level_capability {
        // a. Return module.[[TopLevelCapability]].[[Promise]].
        return Ok(Value::Promise(capability.promise()));
    }
    // 5. Let stack be a new empty List.
    let mut stack = Vec::with_capacity(8);
    // 6. Let capability be ! NewPromiseCapability(%Promise%).
    // 7. Set module.[[TopLevelCapability]] to capability.
    let capability = if with_capability {
        let capability = PromiseCapability::new(agent);
        agent[module].cyclic_mut().top_level_capability = Some(capability);
        Some(capability)
    } else {
        None
    };
    // 8. Let result be Completion(InnerModuleEvaluation(module, stack, 0)).
    let result = inner_module_evaluation(agent, module, &mut stack, 0);
    match result {
        // 9. If result is an abrupt completion, then
        Err(error) => {
            log::debug!(
                "evaluation of {module:?} threw, {} modules on the stack record the error",
                stack.len()
            );
            // a. For each Cyclic Module Record m of stack, do
            for m in stack {
                let record = agent[m].cyclic_mut();
                // i. Assert: m.[[Status]] is evaluating.
                // ii. Assert: m.[[AsyncEvaluationOrder]] is unset.
                // NOTE: This does not hold for a module that already started
                // its asynchronous execution, or was waiting on one, while a
                // later module in its component threw. Such a module is done.
                if record.async_evaluation_order.is_integer() {
                    record.async_evaluation_order = AsyncEvaluationOrder::Done;
                }
                // iii. Set m.[[Status]] to evaluated.
                // iv. Set m.[[EvaluationError]] to result.
                record.set_evaluation_error(error);
                // NOTE: The module never closed its component, so it becomes
                // its own cycle root for later error replay.
                if record.cycle_root.is_none() {
                    record.cycle_root = Some(m);
                }
            }
            // b. Assert: module.[[Status]] is evaluated.
            // c. Assert: module.[[EvaluationError]] and result are the same
            //    completion.
            debug_assert_eq!(agent[module].cyclic().evaluation_error, Some(error));
            match capability {
                // d. Perform ! Call(capability.[[Reject]], undefined, « result.[[Value]] »).
                Some(capability) => {
                    capability.reject(agent, error.value());
                    // 11. Return capability.[[Promise]].
                    Ok(Value::Promise(capability.promise()))
                }
                None => Err(error),
            }
        }
        // 10. Else,
        Ok(_) => {
            let record = agent[module].cyclic();
            // a. Assert: module.[[Status]] is either evaluating-async or
            //    evaluated.
            debug_assert!(matches!(
                record.status,
                CyclicModuleRecordStatus::EvaluatingAsync | CyclicModuleRecordStatus::Evaluated
            ));
            // b. Assert: module.[[EvaluationError]] is empty.
            debug_assert!(record.evaluation_error.is_none());
            // d. Assert: stack is empty.
            debug_assert!(stack.is_empty());
            // c. If module.[[Status]] is evaluated, then
            //    i. NOTE: This implies that evaluation of module completed
            //       synchronously.
            let completed = record.status == CyclicModuleRecordStatus::Evaluated;
            let completion_value = record.evaluation_result;
            match capability {
                Some(capability) => {
                    if completed {
                        // ii. Perform ! Call(capability.[[Resolve]], undefined, « undefined »).
                        capability.resolve(agent, Value::Undefined);
                    }
                    // 11. Return capability.[[Promise]].
                    Ok(Value::Promise(capability.promise()))
                }
                None if completed => Ok(completion_value),
                None => {
                    let capability = PromiseCapability::new(agent);
                    agent[module].cyclic_mut().top_level_capability = Some(capability);
                    Ok(Value::Promise(capability.promise()))
                }
            }
        }
    }
}

/// ### [16.2.1.6.1.3.1 InnerModuleEvaluation ( module, stack, index )](https://tc39.es/ecma262/#sec-innermoduleevaluation)
///
/// The abstract operation InnerModuleEvaluation takes arguments module (a
/// Module Record), stack (a List of Cyclic Module Records), and index (a
/// non-negative integer) and returns either a normal completion containing a
/// non-negative integer or a throw completion. It is used by Evaluate to
/// perform the actual evaluation process for module, as well as recursively on
/// all other modules in the dependency graph. The stack and index parameters,
/// as well as module's \[\[DFSIndex]] and \[\[DFSAncestorIndex]] fields, are
/// used the same way as in InnerModuleLinking.
///
/// > NOTE 1: A module is evaluating while it is being traversed by
/// > InnerModuleEvaluation. A module is evaluated on execution completion or
/// > evaluating-async during execution if its \[\[HasTLA]] field is true or if
/// > it has asynchronous dependencies.
///
/// > NOTE 2: Any modules depending on a module of an asynchronous cycle when
/// > that cycle is not evaluating will instead depend on the execution of the
/// > root of the cycle via \[\[CycleRoot]]. This ensures that the cycle state
/// > can be treated as a single strongly connected component through its root
/// > module state.
pub(crate) fn inner_module_evaluation(
    agent: &mut Agent,
    module: Module,
    stack: &mut Vec<Module>,
    mut index: u32,
) -> JsResult<u32> {
    if !enter_module_evaluation(agent, module, stack, &mut index)? {
        return Ok(index);
    }
    let mut frames = vec![DfsFrame::new(module)];
    while let Some(frame) = frames.last_mut() {
        let module = frame.module;
        // 11. For each ModuleRequest Record request of
        //     module.[[RequestedModules]], do
        if let Some(request) = next_evaluation_phase_request(agent, module, &mut frame.next_request)
        {
            // a. Let requiredModule be GetImportedModule(module, request).
            let required_module = get_imported_module(agent, module, &request)?;
            // b. Set index to ? InnerModuleEvaluation(requiredModule, stack, index).
            if enter_module_evaluation(agent, required_module, stack, &mut index)? {
                frames.push(DfsFrame::new(required_module));
            } else {
                evaluate_required_module(agent, module, required_module)?;
            }
            continue;
        }
        frames.pop();
        finish_module_evaluation(agent, module, stack)?;
        if let Some(parent) = frames.last() {
            evaluate_required_module(agent, parent.module, module)?;
        }
    }
    // 17. Return index.
    Ok(index)
}

/// Steps 1 to 10 of InnerModuleEvaluation. Returns true if the module was
/// pushed onto the stack and its requested modules must be visited.
fn enter_module_evaluation(
    agent: &mut Agent,
    module: Module,
    stack: &mut Vec<Module>,
    index: &mut u32,
) -> JsResult<bool> {
    // 1. If module is not a Cyclic Module Record, then
    if !module.is_cyclic_module_record(agent) {
        // a. Perform ? EvaluateModuleSync(module).
        module.evaluate_module_sync(agent)?;
        // b. Return index.
        return Ok(false);
    }
    let record = agent[module].cyclic();
    match record.status {
        // 2. If module.[[Status]] is either evaluating-async or evaluated, then
        CyclicModuleRecordStatus::EvaluatingAsync | CyclicModuleRecordStatus::Evaluated => {
            return match record.evaluation_error {
                // a. If module.[[EvaluationError]] is empty, return index.
                None => Ok(false),
                // b. Otherwise, return ? module.[[EvaluationError]].
                Some(error) => Err(error),
            };
        }
        // 3. If module.[[Status]] is evaluating, return index.
        CyclicModuleRecordStatus::Evaluating => return Ok(false),
        // 4. Assert: module.[[Status]] is linked.
        CyclicModuleRecordStatus::Linked => {}
        CyclicModuleRecordStatus::New
        | CyclicModuleRecordStatus::Unlinked
        | CyclicModuleRecordStatus::Linking => {
            return Err(agent.throw_exception(
                ExceptionType::TypeError,
                "Cannot evaluate a module graph that has not been linked",
            ));
        }
    }
    log::trace!("evaluating {module:?} at DFS index {index}");
    let record = agent[module].cyclic_mut();
    // 5. Set module.[[Status]] to evaluating.
    record.set_evaluating();
    // 6. Set module.[[DFSIndex]] to index.
    // 7. Set module.[[DFSAncestorIndex]] to index.
    record.set_dfs_index(*index);
    // 8. Set module.[[PendingAsyncDependencies]] to 0.
    record.pending_async_dependencies = Some(0);
    // 9. Set index to index + 1.
    *index += 1;
    // 10. Append module to stack.
    stack.push(module);
    Ok(true)
}

/// Step 11.c of InnerModuleEvaluation, performed once `required_module` has
/// been evaluated on behalf of `module`.
fn evaluate_required_module(
    agent: &mut Agent,
    module: Module,
    required_module: Module,
) -> JsResult<()> {
    // c. If requiredModule is a Cyclic Module Record, then
    let Some(required) = agent[required_module].as_cyclic() else {
        return Ok(());
    };
    // i. Assert: requiredModule.[[Status]] is one of evaluating,
    //    evaluating-async, or evaluated.
    // ii. Assert: requiredModule.[[Status]] is evaluating if and only if
    //     stack contains requiredModule.
    debug_assert!(matches!(
        required.status,
        CyclicModuleRecordStatus::Evaluating
            | CyclicModuleRecordStatus::EvaluatingAsync
            | CyclicModuleRecordStatus::Evaluated
    ));
    // iii. If requiredModule.[[Status]] is evaluating, then
    let required_module = if required.status == CyclicModuleRecordStatus::Evaluating {
        // 1. Set module.[[DFSAncestorIndex]] to
        //    min(module.[[DFSAncestorIndex]], requiredModule.[[DFSAncestorIndex]]).
        let required_ancestor_index = required.dfs_ancestor_index;
        agent[module]
            .cyclic_mut()
            .lower_dfs_ancestor_index(required_ancestor_index);
        required_module
    } else {
        // iv. Else,
        //     1. Set requiredModule to requiredModule.[[CycleRoot]].
        let cycle_root = required.cycle_root.unwrap_or(required_module);
        let root = agent[cycle_root].cyclic();
        //     2. Assert: requiredModule.[[Status]] is either evaluating-async
        //        or evaluated.
        debug_assert!(matches!(
            root.status,
            CyclicModuleRecordStatus::EvaluatingAsync | CyclicModuleRecordStatus::Evaluated
        ));
        //     3. If requiredModule.[[EvaluationError]] is not empty, return ?
        //        requiredModule.[[EvaluationError]].
        if let Some(error) = root.evaluation_error {
            return Err(error);
        }
        cycle_root
    };
    // v. If requiredModule.[[AsyncEvaluationOrder]] is an integer, then
    if agent[required_module]
        .cyclic()
        .async_evaluation_order
        .is_integer()
    {
        // 1. Set module.[[PendingAsyncDependencies]] to
        //    module.[[PendingAsyncDependencies]] + 1.
        let record = agent[module].cyclic_mut();
        record.pending_async_dependencies =
            Some(record.pending_async_dependencies.unwrap_or(0) + 1);
        // 2. Append module to requiredModule.[[AsyncParentModules]].
        agent[required_module]
            .cyclic_mut()
            .async_parent_modules
            .push(module);
    }
    Ok(())
}

/// Steps 12 to 16 of InnerModuleEvaluation.
fn finish_module_evaluation(
    agent: &mut Agent,
    module: Module,
    stack: &mut Vec<Module>,
) -> JsResult<()> {
    let record = agent[module].cyclic();
    let pending_async_dependencies = record.pending_async_dependencies.unwrap_or(0);
    // 12. If module.[[PendingAsyncDependencies]] > 0 or module.[[HasTLA]] is
    //     true, then
    if pending_async_dependencies > 0 || record.has_tla {
        // a. Assert: module.[[AsyncEvaluationOrder]] is unset.
        debug_assert_eq!(record.async_evaluation_order, AsyncEvaluationOrder::Unset);
        // b. Set module.[[AsyncEvaluationOrder]] to
        //    IncrementModuleAsyncEvaluationCount().
        let order = agent.increment_module_async_evaluation_count();
        agent[module].cyclic_mut().async_evaluation_order = AsyncEvaluationOrder::Order(order);
        // c. If module.[[PendingAsyncDependencies]] = 0, perform
        //    ExecuteAsyncModule(module).
        if pending_async_dependencies == 0 {
            execute_async_module(agent, module);
        }
    } else {
        // 13. Else,
        //     a. Perform ? module.ExecuteModule().
        let methods = record.methods.clone();
        let completion_value = methods.execute_module(agent, module, None)?;
        agent[module].cyclic_mut().evaluation_result = completion_value;
    }
    // 14. Assert: module occurs exactly once in stack.
    debug_assert_eq!(stack.iter().filter(|m| **m == module).count(), 1);
    // 15. Assert: module.[[DFSAncestorIndex]] ≤ module.[[DFSIndex]].
    // 16. If module.[[DFSAncestorIndex]] = module.[[DFSIndex]], then
    if agent[module].cyclic().is_scc_root() {
        let mut component_size = 0usize;
        // a. Let done be false.
        // b. Repeat, while done is false,
        //    i. Let requiredModule be the last element of stack.
        //    ii. Remove the last element of stack.
        while let Some(required_module) = stack.pop() {
            let required = agent[required_module].cyclic_mut();
            // iii. Assert: requiredModule is a Cyclic Module Record.
            // iv. Assert: requiredModule.[[AsyncEvaluationOrder]] is either
            //     an integer or unset.
            debug_assert_ne!(required.async_evaluation_order, AsyncEvaluationOrder::Done);
            required.status = if required.async_evaluation_order == AsyncEvaluationOrder::Unset {
                // v. If requiredModule.[[AsyncEvaluationOrder]] is unset, set
                //    requiredModule.[[Status]] to evaluated.
                CyclicModuleRecordStatus::Evaluated
            } else {
                // vi. Otherwise, set requiredModule.[[Status]] to
                //     evaluating-async.
                CyclicModuleRecordStatus::EvaluatingAsync
            };
            // viii. Set requiredModule.[[CycleRoot]] to module.
            required.cycle_root = Some(module);
            component_size += 1;
            // vii. If requiredModule and module are the same Module Record,
            //      set done to true.
            if required_module == module {
                break;
            }
        }
        log::debug!(
            "evaluated strongly connected component {module:?} of {component_size} modules"
        );
    }
    Ok(())
}

/// ### [16.2.1.6.1.3.2 ExecuteAsyncModule ( module )](https://tc39.es/ecma262/#sec-execute-async-module)
///
/// The abstract operation ExecuteAsyncModule takes argument module (a Cyclic
/// Module Record) and returns unused.
fn execute_async_module(agent: &mut Agent, module: Module) {
    let record = agent[module].cyclic();
    // 1. Assert: module.[[Status]] is either evaluating or evaluating-async.
    debug_assert!(matches!(
        record.status,
        CyclicModuleRecordStatus::Evaluating | CyclicModuleRecordStatus::EvaluatingAsync
    ));
    // 2. Assert: module.[[HasTLA]] is true.
    debug_assert!(record.has_tla);
    let methods = record.methods.clone();
    log::trace!("executing asynchronous module {module:?}");
    // 3. Let capability be ! NewPromiseCapability(%Promise%).
    let capability = PromiseCapability::new(agent);
    // 4. Let fulfilledClosure be a new Abstract Closure with no parameters
    //    that captures module and performs the following steps when called:
    //    a. Perform AsyncModuleExecutionFulfilled(module).
    //    b. Return NormalCompletion(undefined).
    // 5. Let onFulfilled be CreateBuiltinFunction(fulfilledClosure, 0, "", « »).
    // 6. Let rejectedClosure be a new Abstract Closure with parameters (error)
    //    that captures module and performs the following steps when called:
    //    a. Perform AsyncModuleExecutionRejected(module, error).
    //    b. Return NormalCompletion(undefined).
    // 7. Let onRejected be CreateBuiltinFunction(rejectedClosure, 0, "", « »).
    // 8. Perform PerformPromiseThen(capability.[[Promise]], onFulfilled, onRejected).
    let handler = PromiseReactionHandler::AsyncModule(module);
    inner_promise_then(agent, capability.promise(), handler, handler, None);
    // 9. Perform ! module.ExecuteModule(capability).
    if let Err(error) = methods.execute_module(agent, module, Some(capability)) {
        capability.reject(agent, error.value());
    }
    // 10. Return unused.
}

/// ### [16.2.1.6.1.3.3 GatherAvailableAncestors ( module, execList )](https://tc39.es/ecma262/#sec-gather-available-ancestors)
///
/// The abstract operation GatherAvailableAncestors takes arguments module (a
/// Cyclic Module Record) and execList (a List of Cyclic Module Records) and
/// returns unused.
///
/// > NOTE: When an asynchronous execution for a root module is fulfilled, this
/// > function determines the list of modules which are able to synchronously
/// > execute together on this completion, populating them in execList.
fn gather_available_ancestors(agent: &mut Agent, module: Module, exec_list: &mut Vec<Module>) {
    let mut in_exec_list = AHashSet::with_capacity(exec_list.len());
    in_exec_list.extend(exec_list.iter().copied());
    let mut worklist = vec![module];
    while let Some(module) = worklist.pop() {
        // 1. For each Cyclic Module Record m of module.[[AsyncParentModules]], do
        let async_parent_modules = agent[module].cyclic().async_parent_modules.clone();
        for m in async_parent_modules {
            // a. If execList does not contain m and
            //    m.[[CycleRoot]].[[EvaluationError]] is empty, then
            if in_exec_list.contains(&m) {
                continue;
            }
            let cycle_root = agent[m].cyclic().cycle_root.unwrap_or(m);
            if agent[cycle_root].cyclic().evaluation_error.is_some() {
                continue;
            }
            let record = agent[m].cyclic_mut();
            // i. Assert: m.[[Status]] is evaluating-async.
            debug_assert_eq!(record.status, CyclicModuleRecordStatus::EvaluatingAsync);
            // ii. Assert: m.[[EvaluationError]] is empty.
            debug_assert!(record.evaluation_error.is_none());
            // iii. Assert: m.[[AsyncEvaluationOrder]] is an integer.
            debug_assert!(record.async_evaluation_order.is_integer());
            // iv. Assert: m.[[PendingAsyncDependencies]] > 0.
            debug_assert!(record.pending_async_dependencies.is_some_and(|count| count > 0));
            // v. Set m.[[PendingAsyncDependencies]] to
            //    m.[[PendingAsyncDependencies]] - 1.
            let pending = record
                .pending_async_dependencies
                .map_or(0, |count| count.saturating_sub(1));
            record.pending_async_dependencies = Some(pending);
            // vi. If m.[[PendingAsyncDependencies]] = 0, then
            if pending == 0 {
                // 1. Append m to execList.
                exec_list.push(m);
                in_exec_list.insert(m);
                // 2. If m.[[HasTLA]] is false, perform
                //    GatherAvailableAncestors(m, execList).
                if !record.has_tla {
                    worklist.push(m);
                }
            }
        }
    }
    // 2. Return unused.
}

/// ### [16.2.1.6.1.3.4 AsyncModuleExecutionFulfilled ( module )](https://tc39.es/ecma262/#sec-async-module-execution-fulfilled)
///
/// The abstract operation AsyncModuleExecutionFulfilled takes argument module
/// (a Cyclic Module Record) and returns unused.
pub(crate) fn async_module_execution_fulfilled(agent: &mut Agent, module: Module) {
    let record = agent[module].cyclic_mut();
    // 1. If module.[[Status]] is evaluated, then
    if record.status == CyclicModuleRecordStatus::Evaluated {
        // a. Assert: module.[[EvaluationError]] is not empty.
        debug_assert!(record.evaluation_error.is_some());
        // b. Return unused.
        return;
    }
    // 2. Assert: module.[[Status]] is evaluating-async.
    // 3. Assert: module.[[AsyncEvaluationOrder]] is an integer.
    // 4. Assert: module.[[EvaluationError]] is empty.
    // 5. Set module.[[AsyncEvaluationOrder]] to done.
    // 6. Set module.[[Status]] to evaluated.
    record.set_async_evaluated();
    log::debug!("asynchronous evaluation of {module:?} fulfilled");
    // 7. If module.[[TopLevelCapability]] is not empty, then
    if let Some(capability) = record.top_level_capability {
        // a. Assert: module.[[CycleRoot]] and module are the same Module Record.
        debug_assert_eq!(record.cycle_root, Some(module));
        // b. Perform ! Call(module.[[TopLevelCapability]].[[Resolve]], undefined, « undefined »).
        capability.resolve(agent, Value::Undefined);
    }
    // 8. Let execList be a new empty List.
    let mut exec_list = Vec::new();
    // 9. Perform GatherAvailableAncestors(module, execList).
    gather_available_ancestors(agent, module, &mut exec_list);
    // 10. Assert: All elements of execList have their [[AsyncEvaluationOrder]]
    //     field set to an integer, [[PendingAsyncDependencies]] field set to
    //     0, and [[EvaluationError]] field set to empty.
    // 11. Let sortedExecList be a List whose elements are the elements of
    //     execList, sorted by their [[AsyncEvaluationOrder]] field in
    //     ascending order.
    exec_list.sort_by_key(|m| agent[*m].cyclic().async_evaluation_order);
    // 12. For each Cyclic Module Record m of sortedExecList, do
    for m in exec_list {
        let record = agent[m].cyclic();
        // a. If m.[[Status]] is evaluated, then
        if record.status == CyclicModuleRecordStatus::Evaluated {
            // i. Assert: m.[[EvaluationError]] is not empty.
            debug_assert!(record.evaluation_error.is_some());
        } else if record.has_tla {
            // b. Else if m.[[HasTLA]] is true, then
            //    i. Perform ExecuteAsyncModule(m).
            execute_async_module(agent, m);
        } else {
            // c. Else,
            //    i. Let result be m.ExecuteModule().
            let methods = record.methods.clone();
            match methods.execute_module(agent, m, None) {
                // ii. If result is an abrupt completion, then
                //     1. Perform AsyncModuleExecutionRejected(m, result.[[Value]]).
                Err(error) => async_module_execution_rejected(agent, m, error.value()),
                // iii. Else,
                Ok(completion_value) => {
                    let record = agent[m].cyclic_mut();
                    // 1. Set m.[[AsyncEvaluationOrder]] to done.
                    // 2. Set m.[[Status]] to evaluated.
                    record.set_async_evaluated();
                    record.evaluation_result = completion_value;
                    log::debug!("asynchronous evaluation of {m:?} fulfilled");
                    // 3. If m.[[TopLevelCapability]] is not empty, then
                    if let Some(capability) = record.top_level_capability {
                        // a. Assert: m.[[CycleRoot]] and m are the same
                        //    Module Record.
                        debug_assert_eq!(record.cycle_root, Some(m));
                        // b. Perform ! Call(m.[[TopLevelCapability]].[[Resolve]], undefined, « undefined »).
                        capability.resolve(agent, Value::Undefined);
                    }
                }
            }
        }
    }
    // 13. Return unused.
}

/// A module whose \[\[AsyncParentModules]] are being rejected.
struct RejectionFrame {
    module: Module,
    async_parent_modules: Vec<Module>,
    next_parent: usize,
}

/// ### [16.2.1.6.1.3.5 AsyncModuleExecutionRejected ( module, error )](https://tc39.es/ecma262/#sec-async-module-execution-rejected)
///
/// The abstract operation AsyncModuleExecutionRejected takes arguments module
/// (a Cyclic Module Record) and error (an ECMAScript language value) and
/// returns unused.
///
/// Parents are rejected depth-first before the module's own top-level
/// capability, using an explicit stack of [`RejectionFrame`]s.
pub(crate) fn async_module_execution_rejected(agent: &mut Agent, module: Module, error: Value) {
    let error = JsError::new(error);
    let Some(frame) = enter_async_module_rejection(agent, module, error) else {
        return;
    };
    let mut frames = vec![frame];
    while let Some(frame) = frames.last_mut() {
        // 8. For each Cyclic Module Record m of module.[[AsyncParentModules]], do
        if let Some(&m) = frame.async_parent_modules.get(frame.next_parent) {
            frame.next_parent += 1;
            // a. Perform AsyncModuleExecutionRejected(m, error).
            if let Some(frame) = enter_async_module_rejection(agent, m, error) {
                frames.push(frame);
            }
            continue;
        }
        let module = frame.module;
        frames.pop();
        let record = agent[module].cyclic();
        // 9. If module.[[TopLevelCapability]] is not empty, then
        if let Some(capability) = record.top_level_capability {
            // a. Assert: module.[[CycleRoot]] and module are the same Module Record.
            debug_assert_eq!(record.cycle_root, Some(module));
            // b. Perform ! Call(module.[[TopLevelCapability]].[[Reject]], undefined, « error »).
            capability.reject(agent, error.value());
        }
    }
    // 10. Return unused.
}

/// Steps 1 to 7 of AsyncModuleExecutionRejected. Returns None if the module
/// already holds an evaluation error.
fn enter_async_module_rejection(
    agent: &mut Agent,
    module: Module,
    error: JsError,
) -> Option<RejectionFrame> {
    let record = agent[module].cyclic_mut();
    // 1. If module.[[Status]] is evaluated, then
    if record.status == CyclicModuleRecordStatus::Evaluated {
        // a. Assert: module.[[EvaluationError]] is not empty.
        debug_assert!(record.evaluation_error.is_some());
        // b. Return unused.
        return None;
    }
    // 2. Assert: module.[[Status]] is evaluating-async.
    debug_assert_eq!(record.status, CyclicModuleRecordStatus::EvaluatingAsync);
    // 3. Assert: module.[[AsyncEvaluationOrder]] is an integer.
    debug_assert!(record.async_evaluation_order.is_integer());
    // 4. Assert: module.[[EvaluationError]] is empty.
    debug_assert!(record.evaluation_error.is_none());
    // 5. Set module.[[EvaluationError]] to ThrowCompletion(error).
    record.evaluation_error = Some(error);
    // 6. Set module.[[Status]] to evaluated.
    record.status = CyclicModuleRecordStatus::Evaluated;
    // 7. Set module.[[AsyncEvaluationOrder]] to done.
    record.async_evaluation_order = AsyncEvaluationOrder::Done;
    log::debug!("asynchronous evaluation of {module:?} rejected");
    Some(RejectionFrame {
        module,
        async_parent_modules: record.async_parent_modules.clone(),
        next_parent: 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn async_evaluation_order_sorts_integers_ascending() {
        let mut orders = vec![
            AsyncEvaluationOrder::Order(7),
            AsyncEvaluationOrder::Order(2),
            AsyncEvaluationOrder::Order(5),
        ];
        orders.sort();
        assert_eq!(
            orders,
            vec![
                AsyncEvaluationOrder::Order(2),
                AsyncEvaluationOrder::Order(5),
                AsyncEvaluationOrder::Order(7),
            ]
        );
        assert!(AsyncEvaluationOrder::Order(0).is_integer());
        assert!(!AsyncEvaluationOrder::Unset.is_integer());
        assert!(!AsyncEvaluationOrder::Done.is_integer());
    }
}
