// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

pub mod builtins;
pub mod execution;
pub mod scripts_and_modules;
pub mod types;

pub use builtins::{
    error::Error,
    promise::{Promise, PromiseSettlement},
    promise_objects::promise_abstract_operations::promise_capability_records::PromiseCapability,
};
pub use execution::{
    Agent, DefaultHostHooks, ExceptionType, HostDefined, HostHooks, Job, JsError, JsResult,
    Options, PromiseRejectionTrackerOperation, Realm,
};
pub use scripts_and_modules::module::module_semantics::{
    ImportAttribute, ImportPhase, ModuleLoadingPayload, ModuleRequest, Referrer,
    abstract_module_records::Module,
    cyclic_module_records::{AsyncEvaluationOrder, CyclicModuleMethods, CyclicModuleRecordStatus},
    evaluate_import_call, finish_loading_imported_module, get_module_namespace,
    graph_loading_state_records::GraphLoadingState,
    synthetic_module_records::SyntheticModuleEvaluationSteps,
};
pub use types::Value;
