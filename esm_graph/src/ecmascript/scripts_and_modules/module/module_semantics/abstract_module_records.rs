// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! ### [16.2.1.5 Abstract Module Records](https://tc39.es/ecma262/#sec-abstract-module-records)

use std::ops::{Index, IndexMut};

use crate::{
    ecmascript::{
        builtins::promise::{Promise, PromiseSettlement},
        execution::{Agent, HostDefined, JsError, JsResult, Realm, agent::ExceptionType},
        types::Value,
    },
    heap::{CreateHeapData, Heap, index_of_next},
};

use super::{
    LoadedModuleRequestRecord, ModuleRequest,
    cyclic_module_records::{
        AsyncEvaluationOrder, CyclicModuleRecord, CyclicModuleRecordStatus, evaluate, link,
    },
    graph_loading_state_records::load_requested_modules,
    synthetic_module_records::{
        SyntheticModuleRecord, evaluate_synthetic_module, link_synthetic_module,
    },
};

/// A Module Record encapsulates structural information about the imports
/// and exports of a single module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Module(u32);

impl Module {
    pub(crate) const fn get_index(self) -> usize {
        self.0 as usize
    }

    /// ### \[\[Realm]]
    ///
    /// The Realm within which this module was created.
    pub fn realm(self, agent: &Agent) -> Realm {
        agent[self].realm
    }

    /// ### \[\[HostDefined]]
    ///
    /// Field reserved for use by host environments that need to associate
    /// additional information with a module.
    pub fn host_defined(self, agent: &Agent) -> Option<HostDefined> {
        agent[self].host_defined.clone()
    }

    /// True once [`get_module_namespace`](super::get_module_namespace) has
    /// been performed on this module.
    pub fn has_namespace(self, agent: &Agent) -> bool {
        agent[self].namespace_created
    }

    pub fn is_cyclic_module_record(self, agent: &Agent) -> bool {
        matches!(agent[self].kind, ModuleRecordKind::Cyclic(_))
    }

    /// ### LoadRequestedModules(\[hostDefined])
    ///
    /// Prepares the module for linking by recursively loading all its
    /// dependencies, and returns a promise.
    pub fn load_requested_modules(
        self,
        agent: &mut Agent,
        host_defined: Option<HostDefined>,
    ) -> Promise {
        match agent[self].kind {
            ModuleRecordKind::Cyclic(_) => load_requested_modules(agent, self, host_defined),
            // Synthetic Module Records have no dependencies.
            ModuleRecordKind::Synthetic(_) => Promise::new_resolved(agent, Value::Undefined),
        }
    }

    /// ### Link()
    ///
    /// Prepare the module for evaluation by transitively resolving all module
    /// dependencies and creating a Module Environment Record.
    pub fn link(self, agent: &mut Agent) -> JsResult<()> {
        match agent[self].kind {
            ModuleRecordKind::Cyclic(_) => link(agent, self),
            ModuleRecordKind::Synthetic(_) => link_synthetic_module(agent, self),
        }
    }

    /// ### Evaluate()
    ///
    /// Evaluates the module and its dependencies.
    ///
    /// With [`Options::top_level_await`](crate::ecmascript::Options) enabled
    /// this returns `Value::Promise` for the evaluation of the whole graph. If
    /// it is disabled, a synchronous graph produces the completion value of
    /// the root module or its thrown error, and a promise is returned only when
    /// an asynchronous module takes part in the evaluation.
    pub fn evaluate(self, agent: &mut Agent) -> JsResult<Value> {
        match agent[self].kind {
            ModuleRecordKind::Cyclic(_) => {
                let with_capability = agent.options.top_level_await;
                evaluate(agent, self, with_capability)
            }
            ModuleRecordKind::Synthetic(_) => {
                Ok(Value::Promise(evaluate_synthetic_module(agent, self)))
            }
        }
    }

    /// Evaluate() as specified: a promise for the evaluation of the graph,
    /// regardless of host options.
    pub(crate) fn evaluate_to_promise(self, agent: &mut Agent) -> Promise {
        let result = match agent[self].kind {
            ModuleRecordKind::Cyclic(_) => evaluate(agent, self, true),
            ModuleRecordKind::Synthetic(_) => {
                return evaluate_synthetic_module(agent, self);
            }
        };
        match result {
            Ok(Value::Promise(promise)) => promise,
            Ok(value) => Promise::new_resolved(agent, value),
            Err(error) => Promise::new_rejected(agent, error.value()),
        }
    }

    /// Evaluate a module that appears as a dependency of a Cyclic Module
    /// Record.
    ///
    /// ### [16.2.1.5.4 EvaluateModuleSync ( module )](https://tc39.es/ecma262/#sec-EvaluateModuleSync)
    pub(crate) fn evaluate_module_sync(self, agent: &mut Agent) -> JsResult<()> {
        // 1. Assert: module is not a Cyclic Module Record.
        debug_assert!(!self.is_cyclic_module_record(agent));
        // 2. Let promise be module.Evaluate().
        let promise = evaluate_synthetic_module(agent, self);
        // 3. Assert: promise.[[PromiseState]] is either fulfilled or rejected.
        match promise.settlement(agent) {
            // 4. If promise.[[PromiseState]] is rejected, then
            //    a. If promise.[[PromiseIsHandled]] is false, perform HostPromiseRejectionTracker(promise, "handle").
            //    b. Set promise.[[PromiseIsHandled]] to true.
            //    c. Return ThrowCompletion(promise.[[PromiseResult]]).
            PromiseSettlement::Rejected(reason) => {
                promise.mark_handled(agent);
                Err(JsError::new(reason))
            }
            // 5. Return unused.
            PromiseSettlement::Fulfilled(_) => Ok(()),
            PromiseSettlement::Pending => Err(agent.throw_exception(
                ExceptionType::TypeError,
                "Module evaluation did not settle synchronously",
            )),
        }
    }

    /// ### GetModuleSource()
    ///
    /// Returns the module source object of this module, used by source phase
    /// imports.
    pub fn get_module_source(self, agent: &mut Agent) -> JsResult<Value> {
        match &agent[self].kind {
            ModuleRecordKind::Cyclic(record) => {
                let methods = record.methods.clone();
                methods.get_module_source(agent, self)
            }
            ModuleRecordKind::Synthetic(record) => {
                let steps = record.evaluation_steps.clone();
                steps.get_module_source(agent, self)
            }
        }
    }

    /// ### \[\[Status]]
    ///
    /// The status of a Cyclic Module Record, or `None` for other modules.
    pub fn status(self, agent: &Agent) -> Option<CyclicModuleRecordStatus> {
        agent[self].as_cyclic().map(|record| record.status)
    }

    /// ### \[\[EvaluationError]]
    pub fn evaluation_error(self, agent: &Agent) -> Option<Value> {
        agent[self]
            .as_cyclic()
            .and_then(|record| record.evaluation_error)
            .map(|error| error.value())
    }

    /// ### \[\[CycleRoot]]
    pub fn cycle_root(self, agent: &Agent) -> Option<Module> {
        agent[self].as_cyclic().and_then(|record| record.cycle_root)
    }

    /// ### \[\[HasTLA]]
    pub fn has_tla(self, agent: &Agent) -> bool {
        agent[self].as_cyclic().is_some_and(|record| record.has_tla)
    }

    /// ### \[\[DFSIndex]]
    pub fn dfs_index(self, agent: &Agent) -> Option<u32> {
        agent[self].as_cyclic().and_then(|record| record.dfs_index)
    }

    /// ### \[\[DFSAncestorIndex]]
    pub fn dfs_ancestor_index(self, agent: &Agent) -> Option<u32> {
        agent[self]
            .as_cyclic()
            .and_then(|record| record.dfs_ancestor_index)
    }

    /// True while the module has an integer \[\[AsyncEvaluationOrder]], ie.
    /// it or one of its dependencies is still executing asynchronously.
    pub fn is_async_evaluation(self, agent: &Agent) -> bool {
        agent[self]
            .as_cyclic()
            .is_some_and(|record| record.async_evaluation_order.is_integer())
    }

    /// ### \[\[AsyncEvaluationOrder]]
    pub fn async_evaluation_order(self, agent: &Agent) -> Option<AsyncEvaluationOrder> {
        agent[self]
            .as_cyclic()
            .map(|record| record.async_evaluation_order)
    }

    /// ### \[\[PendingAsyncDependencies]]
    pub fn pending_async_dependencies(self, agent: &Agent) -> Option<u32> {
        agent[self]
            .as_cyclic()
            .and_then(|record| record.pending_async_dependencies)
    }

    /// ### \[\[AsyncParentModules]]
    pub fn async_parent_modules(self, agent: &Agent) -> &[Module] {
        match agent[self].as_cyclic() {
            Some(record) => &record.async_parent_modules,
            None => &[],
        }
    }

    /// ### \[\[TopLevelCapability]]
    ///
    /// The promise of the top-level evaluation of the cycle this module is
    /// the root of, if any.
    pub fn top_level_promise(self, agent: &Agent) -> Option<Promise> {
        agent[self]
            .as_cyclic()
            .and_then(|record| record.top_level_capability)
            .map(|capability| capability.promise())
    }

    /// ### \[\[RequestedModules]]
    pub fn requested_modules(self, agent: &Agent) -> &[ModuleRequest] {
        match agent[self].as_cyclic() {
            Some(record) => &record.requested_modules,
            None => &[],
        }
    }

    /// The module that `request` was loaded as, if loading has completed for
    /// it.
    pub fn get_loaded_module(self, agent: &Agent, request: &ModuleRequest) -> Option<Module> {
        agent[self]
            .loaded_modules()
            .iter()
            .find(|record| record.request.is_equal_to(request))
            .map(|record| record.module)
    }
}

/// ### [Table 42: Module Record Fields](https://tc39.es/ecma262/#table-module-record-fields)
#[derive(Debug)]
pub struct ModuleRecord {
    /// \[\[Realm]]
    pub(crate) realm: Realm,
    /// \[\[Namespace]]
    ///
    /// True once the Module Namespace Object has been created for this
    /// module.
    pub(crate) namespace_created: bool,
    /// \[\[HostDefined]]
    pub(crate) host_defined: Option<HostDefined>,
    pub(crate) kind: ModuleRecordKind,
}

#[derive(Debug)]
pub(crate) enum ModuleRecordKind {
    Cyclic(CyclicModuleRecord),
    Synthetic(SyntheticModuleRecord),
}

impl ModuleRecord {
    pub(crate) fn new(
        realm: Realm,
        host_defined: Option<HostDefined>,
        kind: ModuleRecordKind,
    ) -> Self {
        Self {
            realm,
            namespace_created: false,
            host_defined,
            kind,
        }
    }

    pub(crate) fn as_cyclic(&self) -> Option<&CyclicModuleRecord> {
        match &self.kind {
            ModuleRecordKind::Cyclic(record) => Some(record),
            _ => None,
        }
    }

    /// The Cyclic Module Record of a module known to be cyclic.
    pub(crate) fn cyclic(&self) -> &CyclicModuleRecord {
        match &self.kind {
            ModuleRecordKind::Cyclic(record) => record,
            _ => unreachable!("not a Cyclic Module Record"),
        }
    }

    pub(crate) fn cyclic_mut(&mut self) -> &mut CyclicModuleRecord {
        match &mut self.kind {
            ModuleRecordKind::Cyclic(record) => record,
            _ => unreachable!("not a Cyclic Module Record"),
        }
    }

    pub(crate) fn synthetic(&self) -> &SyntheticModuleRecord {
        match &self.kind {
            ModuleRecordKind::Synthetic(record) => record,
            _ => unreachable!("not a Synthetic Module Record"),
        }
    }

    pub(crate) fn synthetic_mut(&mut self) -> &mut SyntheticModuleRecord {
        match &mut self.kind {
            ModuleRecordKind::Synthetic(record) => record,
            _ => unreachable!("not a Synthetic Module Record"),
        }
    }

    /// ### \[\[LoadedModules]]
    pub(crate) fn loaded_modules(&self) -> &[LoadedModuleRequestRecord] {
        match &self.kind {
            ModuleRecordKind::Cyclic(record) => &record.loaded_modules,
            ModuleRecordKind::Synthetic(_) => &[],
        }
    }

    pub(crate) fn loaded_modules_mut(&mut self) -> Option<&mut Vec<LoadedModuleRequestRecord>> {
        match &mut self.kind {
            ModuleRecordKind::Cyclic(record) => Some(&mut record.loaded_modules),
            ModuleRecordKind::Synthetic(_) => None,
        }
    }
}

impl Index<Module> for Agent {
    type Output = ModuleRecord;

    fn index(&self, index: Module) -> &Self::Output {
        &self.heap.modules[index]
    }
}

impl IndexMut<Module> for Agent {
    fn index_mut(&mut self, index: Module) -> &mut Self::Output {
        &mut self.heap.modules[index]
    }
}

impl Index<Module> for Vec<ModuleRecord> {
    type Output = ModuleRecord;

    fn index(&self, index: Module) -> &Self::Output {
        self.get(index.get_index())
            .expect("Module out of bounds")
    }
}

impl IndexMut<Module> for Vec<ModuleRecord> {
    fn index_mut(&mut self, index: Module) -> &mut Self::Output {
        self.get_mut(index.get_index())
            .expect("Module out of bounds")
    }
}

impl CreateHeapData<ModuleRecord, Module> for Heap {
    fn create(&mut self, data: ModuleRecord) -> Module {
        let index = index_of_next(self.modules.len());
        self.modules.push(data);
        Module(index)
    }
}
