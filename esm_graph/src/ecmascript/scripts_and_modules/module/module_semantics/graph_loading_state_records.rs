// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::ops::{Index, IndexMut};

use ahash::AHashSet;

use crate::{
    ecmascript::{
        builtins::{
            promise::Promise,
            promise_objects::promise_abstract_operations::promise_capability_records::PromiseCapability,
        },
        execution::{Agent, HostDefined, JsResult},
        types::Value,
    },
    heap::{CreateHeapData, Heap, index_of_next},
};

use super::{
    ImportPhase, ModuleLoadingPayload, Referrer,
    abstract_module_records::Module,
    cyclic_module_records::CyclicModuleRecordStatus,
};

/// ### [16.2.1.6.1.1 GraphLoadingState Records](https://tc39.es/ecma262/#graphloadingstate-record)
///
/// Handle to the state of one LoadRequestedModules call. The host receives
/// it inside [`ModuleLoadingPayload::GraphLoadingState`] and passes it back
/// unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct GraphLoadingState(u32);

impl GraphLoadingState {
    pub(crate) const fn get_index(self) -> usize {
        self.0 as usize
    }

    /// \[\[IsLoading]]
    ///
    /// False once the graph has finished loading, successfully or not.
    pub fn is_loading(self, agent: &Agent) -> bool {
        agent[self].is_loading
    }

    /// \[\[PendingModulesCount]]
    pub fn pending_modules_count(self, agent: &Agent) -> u32 {
        agent[self].pending_modules_count
    }

    /// \[\[HostDefined]]
    pub fn host_defined(self, agent: &Agent) -> Option<HostDefined> {
        agent[self].host_defined.clone()
    }
}

#[derive(Debug)]
pub struct GraphLoadingStateRecord {
    /// \[\[PromiseCapability]]
    ///
    /// The promise to resolve when the loading process finishes.
    pub(crate) promise_capability: PromiseCapability,
    /// \[\[IsLoading]]
    ///
    /// It is true if the loading process has not finished yet, neither
    /// successfully nor with an error.
    pub(crate) is_loading: bool,
    /// \[\[PendingModulesCount]]
    ///
    /// It tracks the number of pending HostLoadImportedModule calls.
    pub(crate) pending_modules_count: u32,
    /// \[\[Visited]]
    ///
    /// A list of the Cyclic Module Records that have been already loaded by
    /// the current loading process, to avoid infinite loops with circular
    /// dependencies.
    pub(crate) visited: AHashSet<Module>,
    /// \[\[HostDefined]]
    ///
    /// It contains host-defined data to pass from the LoadRequestedModules
    /// caller to HostLoadImportedModule.
    pub(crate) host_defined: Option<HostDefined>,
    /// True while an InnerModuleLoading call is walking the graph for this
    /// state.
    pub(crate) is_visiting: bool,
    /// Modules loaded by the host while this state was being visited, and
    /// whether their requested modules must be visited in turn. The visiting
    /// InnerModuleLoading call picks these up instead of recursing.
    pub(crate) completed_loads: Vec<(Module, bool)>,
}

impl GraphLoadingStateRecord {
    /// Drops the per-load bookkeeping of a finished loading process.
    fn finish(&mut self) -> AHashSet<Module> {
        self.is_loading = false;
        self.host_defined = None;
        self.completed_loads.clear();
        std::mem::take(&mut self.visited)
    }
}

/// ### [16.2.1.6.1.1 LoadRequestedModules ( \[ hostDefined \] )](https://tc39.es/ecma262/#sec-LoadRequestedModules)
///
/// The LoadRequestedModules concrete method of a Cyclic Module Record module
/// takes optional argument hostDefined (anything) and returns a Promise. It
/// populates the \[\[LoadedModules]] of all the Module Records in the
/// dependency graph of module (most of the work is done by the auxiliary
/// function InnerModuleLoading). It takes an optional hostDefined parameter
/// that is passed to the HostLoadImportedModule hook.
pub(crate) fn load_requested_modules(
    agent: &mut Agent,
    module: Module,
    host_defined: Option<HostDefined>,
) -> Promise {
    // 1. If hostDefined is not present, let hostDefined be empty.
    // 2. Let pc be ! NewPromiseCapability(%Promise%).
    let promise_capability = PromiseCapability::new(agent);
    // 3. Let state be the GraphLoadingState Record { [[IsLoading]]: true,
    //    [[PendingModulesCount]]: 1, [[Visited]]: « », [[PromiseCapability]]:
    //    pc, [[HostDefined]]: hostDefined }.
    let state = agent.heap.create(GraphLoadingStateRecord {
        promise_capability,
        is_loading: true,
        pending_modules_count: 1,
        visited: AHashSet::default(),
        host_defined,
        is_visiting: false,
        completed_loads: Vec::new(),
    });
    log::trace!("loading requested modules of {module:?} with {state:?}");
    // 4. Perform InnerModuleLoading(state, module).
    inner_module_loading(agent, state, module, true);
    // 5. Return pc.[[Promise]].
    promise_capability.promise()
}

/// A module whose requested modules are being visited by InnerModuleLoading.
struct LoadingFrame {
    module: Module,
    next_request: usize,
}

/// ### [16.2.1.6.1.1.1 InnerModuleLoading ( state, module )](https://tc39.es/ecma262/#sec-InnerModuleLoading)
///
/// The abstract operation InnerModuleLoading takes arguments state (a
/// GraphLoadingState Record) and module (a Module Record) and returns unused.
/// It is used by LoadRequestedModules to recursively perform the actual
/// loading process for module's dependency graph.
///
/// A module loaded through a source phase import is only counted: its own
/// requested modules are not loaded, so `visit_requests` is false for it.
///
/// A host that finishes loading synchronously re-enters this function from
/// inside HostLoadImportedModule. The re-entrant call only records the loaded
/// module on the state, and the outer call visits it on its own frame stack,
/// so the native stack does not grow with the depth of the graph.
fn inner_module_loading(
    agent: &mut Agent,
    state: GraphLoadingState,
    module: Module,
    visit_requests: bool,
) {
    // 1. Assert: state.[[IsLoading]] is true.
    debug_assert!(agent[state].is_loading);
    let record = &mut agent[state];
    if record.is_visiting {
        record.completed_loads.push((module, visit_requests));
        return;
    }
    record.is_visiting = true;
    let mut frames = Vec::with_capacity(8);
    visit_module_loading(agent, state, module, visit_requests, &mut frames);
    // iv. If state.[[IsLoading]] is false, return unused.
    while agent[state].is_loading {
        let Some(frame) = frames.last_mut() else {
            break;
        };
        let module = frame.module;
        // c. For each ModuleRequest Record request of module.[[RequestedModules]], do
        let Some(request) = agent[module]
            .cyclic()
            .requested_modules
            .get(frame.next_request)
            .cloned()
        else {
            frames.pop();
            leave_module_loading(agent, state);
            continue;
        };
        frame.next_request += 1;
        // i. If AllImportAttributesSupported(request.[[Attributes]]) is false, then
        //    1. Let error be ThrowCompletion(a newly created SyntaxError object).
        //    2. Perform ContinueModuleLoading(state, error).
        // NOTE: Unsupported attributes were dropped when the module was created.
        // ii. Else if module.[[LoadedModules]] contains a LoadedModuleRequest
        //     Record record such that ModuleRequestsEqual(record, request) is
        //     true, then
        if let Some(loaded) = Referrer::Module(module).find_loaded_module(agent, &request) {
            // 1. Perform InnerModuleLoading(state, record.[[Module]]).
            let visit_requests = request.phase() == ImportPhase::Evaluation;
            visit_module_loading(agent, state, loaded, visit_requests, &mut frames);
        } else {
            // iii. Else,
            //      1. Perform HostLoadImportedModule(module, request,
            //         state.[[HostDefined]], state).
            //      2. NOTE: HostLoadImportedModule will call
            //         FinishLoadingImportedModule, which re-enters the graph
            //         loading process through ContinueModuleLoading.
            log::trace!(
                "host load requested for '{}' imported by {module:?}",
                request.specifier()
            );
            let host_defined = agent[state].host_defined.clone();
            let host_hooks = agent.host_hooks;
            host_hooks.host_load_imported_module(
                agent,
                Referrer::Module(module),
                &request,
                host_defined,
                ModuleLoadingPayload::GraphLoadingState(state),
            );
            let completed_loads = std::mem::take(&mut agent[state].completed_loads);
            for (loaded, visit_requests) in completed_loads {
                if !agent[state].is_loading {
                    break;
                }
                visit_module_loading(agent, state, loaded, visit_requests, &mut frames);
            }
        }
    }
    agent[state].is_visiting = false;
}

/// Steps 2 to 5 of InnerModuleLoading for a module reached during the walk:
/// pushes a frame if its requested modules must be visited, and otherwise
/// counts it as loaded right away.
fn visit_module_loading(
    agent: &mut Agent,
    state: GraphLoadingState,
    module: Module,
    visit_requests: bool,
    frames: &mut Vec<LoadingFrame>,
) {
    let frame = visit_requests
        .then(|| enter_module_loading(agent, state, module))
        .flatten();
    match frame {
        Some(frame) => frames.push(frame),
        None => leave_module_loading(agent, state),
    }
}

/// Step 2 of InnerModuleLoading. Returns a frame if the module's requested
/// modules must be visited.
fn enter_module_loading(
    agent: &mut Agent,
    state: GraphLoadingState,
    module: Module,
) -> Option<LoadingFrame> {
    // 2. If module is a Cyclic Module Record, module.[[Status]] is new, and
    //    state.[[Visited]] does not contain module, then
    let requested_modules_count = match agent[module].as_cyclic() {
        Some(record) if record.status == CyclicModuleRecordStatus::New => {
            record.requested_modules.len()
        }
        _ => return None,
    };
    let record = &mut agent[state];
    // a. Append module to state.[[Visited]].
    if !record.visited.insert(module) {
        return None;
    }
    // b. Let requestedModulesCount be the number of elements in
    //    module.[[RequestedModules]].
    // c. Set state.[[PendingModulesCount]] to
    //    state.[[PendingModulesCount]] + requestedModulesCount.
    record.pending_modules_count += requested_modules_count as u32;
    Some(LoadingFrame {
        module,
        next_request: 0,
    })
}

/// Steps 3 to 5 of InnerModuleLoading.
fn leave_module_loading(agent: &mut Agent, state: GraphLoadingState) {
    let record = &mut agent[state];
    // 3. Assert: state.[[PendingModulesCount]] ≥ 1.
    debug_assert!(record.pending_modules_count >= 1);
    // 4. Set state.[[PendingModulesCount]] to state.[[PendingModulesCount]] - 1.
    record.pending_modules_count -= 1;
    // 5. If state.[[PendingModulesCount]] = 0, then
    if record.pending_modules_count > 0 {
        return;
    }
    // a. Set state.[[IsLoading]] to false.
    let visited = record.finish();
    let promise_capability = record.promise_capability;
    log::debug!("{state:?} finished loading {} modules", visited.len());
    // b. For each Cyclic Module Record loaded of state.[[Visited]], do
    for loaded in visited {
        let loaded = agent[loaded].cyclic_mut();
        // i. If loaded.[[Status]] is new, set loaded.[[Status]] to unlinked.
        if loaded.status == CyclicModuleRecordStatus::New {
            loaded.set_unlinked();
            loaded.load_error = None;
        }
    }
    // c. Perform ! Call(state.[[PromiseCapability]].[[Resolve]], undefined, « undefined »).
    promise_capability.resolve(agent, Value::Undefined);
    // 6. Return unused.
}

/// ### [16.2.1.6.1.1.2 ContinueModuleLoading ( state, moduleCompletion )](https://tc39.es/ecma262/#sec-ContinueModuleLoading)
///
/// The abstract operation ContinueModuleLoading takes arguments state (a
/// GraphLoadingState Record) and moduleCompletion (either a normal completion
/// containing a Module Record or a throw completion) and returns unused. It
/// is used to re-enter the loading process after a call to
/// HostLoadImportedModule.
pub(crate) fn continue_module_loading(
    agent: &mut Agent,
    state: GraphLoadingState,
    module_completion: JsResult<Module>,
    phase: ImportPhase,
) {
    // 1. If state.[[IsLoading]] is false, return unused.
    if !agent[state].is_loading {
        log::trace!("ignoring module load completion for finished {state:?}");
        return;
    }
    match module_completion {
        // 2. If moduleCompletion is a normal completion, then
        //    a. Perform InnerModuleLoading(state, moduleCompletion.[[Value]]).
        Ok(module) => {
            inner_module_loading(agent, state, module, phase == ImportPhase::Evaluation)
        }
        // 3. Else,
        Err(error) => {
            // a. Set state.[[IsLoading]] to false.
            let record = &mut agent[state];
            let visited = record.finish();
            let promise_capability = record.promise_capability;
            log::debug!("{state:?} failed to load a module");
            // NOTE: Visited modules that are still new keep the error, so
            // that linking or evaluating them reports why they never loaded.
            for module in visited {
                let record = agent[module].cyclic_mut();
                if record.status == CyclicModuleRecordStatus::New {
                    record.load_error = Some(error);
                }
            }
            // b. Perform ! Call(state.[[PromiseCapability]].[[Reject]], undefined, « moduleCompletion.[[Value]] »).
            promise_capability.reject(agent, error.value());
        }
    }
    // 4. Return unused.
}

impl Index<GraphLoadingState> for Agent {
    type Output = GraphLoadingStateRecord;

    fn index(&self, index: GraphLoadingState) -> &Self::Output {
        &self.heap.graph_loading_states[index]
    }
}

impl IndexMut<GraphLoadingState> for Agent {
    fn index_mut(&mut self, index: GraphLoadingState) -> &mut Self::Output {
        &mut self.heap.graph_loading_states[index]
    }
}

impl Index<GraphLoadingState> for Vec<GraphLoadingStateRecord> {
    type Output = GraphLoadingStateRecord;

    fn index(&self, index: GraphLoadingState) -> &Self::Output {
        self.get(index.get_index())
            .expect("GraphLoadingState out of bounds")
    }
}

impl IndexMut<GraphLoadingState> for Vec<GraphLoadingStateRecord> {
    fn index_mut(&mut self, index: GraphLoadingState) -> &mut Self::Output {
        self.get_mut(index.get_index())
            .expect("GraphLoadingState out of bounds")
    }
}

impl CreateHeapData<GraphLoadingStateRecord, GraphLoadingState> for Heap {
    fn create(&mut self, data: GraphLoadingStateRecord) -> GraphLoadingState {
        let index = index_of_next(self.graph_loading_states.len());
        self.graph_loading_states.push(data);
        GraphLoadingState(index)
    }
}
