// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! ### [16.2.1.8 Synthetic Module Records](https://tc39.es/ecma262/#sec-synthetic-module-records)
//!
//! A Synthetic Module Record is used to represent information about a module
//! that is defined by specifications. Its exported names are statically
//! defined at creation, while their corresponding values can change over
//! time using SetSyntheticModuleExport. It has no imports or dependencies.

use std::rc::Rc;

use crate::{
    ecmascript::{
        builtins::promise::Promise,
        execution::{Agent, HostDefined, JsResult, Realm, agent::ExceptionType},
        types::Value,
    },
    heap::CreateHeapData,
};

use super::abstract_module_records::{Module, ModuleRecord, ModuleRecordKind};

/// \[\[EvaluationSteps]]
///
/// The initialization logic to perform upon evaluation of the module, taking
/// the Synthetic Module Record as its sole argument. It must not modify
/// \[\[ExportNames]]. It may return an abrupt completion.
pub trait SyntheticModuleEvaluationSteps: std::fmt::Debug {
    fn evaluate(&self, agent: &mut Agent, module: Module) -> JsResult<()>;

    /// The module source object of this module for source phase imports.
    fn get_module_source(&self, agent: &mut Agent, _module: Module) -> JsResult<Value> {
        Err(agent.throw_exception(
            ExceptionType::SyntaxError,
            "Module has no source phase representation",
        ))
    }
}

#[derive(Debug)]
pub(crate) struct SyntheticModuleRecord {
    /// \[\[ExportNames]]
    pub(crate) export_names: Box<[Rc<str>]>,
    /// \[\[Environment]]
    ///
    /// Binding values in \[\[ExportNames]] order; created by Link().
    pub(crate) environment: Option<Box<[Value]>>,
    pub(crate) evaluation_steps: Rc<dyn SyntheticModuleEvaluationSteps>,
    /// The promise returned by the first Evaluate().
    pub(crate) evaluation: Option<Promise>,
}

impl SyntheticModuleRecord {
    fn binding_index(&self, export_name: &str) -> Option<usize> {
        self.export_names
            .iter()
            .position(|name| &**name == export_name)
    }
}

impl Module {
    /// ### [16.2.1.8.1 CreateSyntheticModule ( exportNames, evaluationSteps, realm, hostDefined )](https://tc39.es/ecma262/#sec-createsyntheticmodule)
    pub fn new_synthetic(
        agent: &mut Agent,
        realm: Realm,
        export_names: &[&str],
        evaluation_steps: Rc<dyn SyntheticModuleEvaluationSteps>,
        host_defined: Option<HostDefined>,
    ) -> Module {
        let mut names: Vec<Rc<str>> = Vec::with_capacity(export_names.len());
        for name in export_names {
            if !names.iter().any(|existing| &**existing == *name) {
                names.push((*name).into());
            }
        }
        let record = SyntheticModuleRecord {
            export_names: names.into_boxed_slice(),
            environment: None,
            evaluation_steps,
            evaluation: None,
        };
        agent.heap.create(ModuleRecord::new(
            realm,
            host_defined,
            ModuleRecordKind::Synthetic(record),
        ))
    }

    /// ### [16.2.1.8.3 SetSyntheticModuleExport ( module, exportName, exportValue )](https://tc39.es/ecma262/#sec-setsyntheticmoduleexport)
    ///
    /// Throws a ReferenceError if the module has not been linked or does not
    /// export `export_name`.
    pub fn set_synthetic_module_export(
        self,
        agent: &mut Agent,
        export_name: &str,
        export_value: Value,
    ) -> JsResult<()> {
        let ModuleRecordKind::Synthetic(record) = &mut agent[self].kind else {
            return Err(agent.throw_exception(
                ExceptionType::TypeError,
                "Not a synthetic module",
            ));
        };
        // 1. Assert: module.[[ExportNames]] contains exportName.
        let Some(index) = record.binding_index(export_name) else {
            return Err(agent.throw_exception(
                ExceptionType::ReferenceError,
                format!("Module does not export '{export_name}'"),
            ));
        };
        // 2. Let envRec be module.[[Environment]].
        // 3. Assert: envRec is not empty.
        let Some(environment) = record.environment.as_deref_mut() else {
            return Err(agent.throw_exception(
                ExceptionType::ReferenceError,
                format!("Cannot set export '{export_name}' of a module that has not been linked"),
            ));
        };
        // 4. Perform envRec.SetMutableBinding(exportName, exportValue, true).
        environment[index] = export_value;
        // 5. Return unused.
        Ok(())
    }

    /// Current value of a synthetic module's export binding, or None if the
    /// module is not linked or has no such export.
    pub fn get_synthetic_module_export(self, agent: &Agent, export_name: &str) -> Option<Value> {
        let ModuleRecordKind::Synthetic(record) = &agent[self].kind else {
            return None;
        };
        let index = record.binding_index(export_name)?;
        record
            .environment
            .as_deref()
            .map(|environment| environment[index])
    }
}

/// ### [16.2.1.8.4.3 Link ( )](https://tc39.es/ecma262/#sec-smr-Link)
///
/// Linking an already linked module does nothing.
pub(crate) fn link_synthetic_module(agent: &mut Agent, module: Module) -> JsResult<()> {
    let record = agent[module].synthetic_mut();
    if record.environment.is_some() {
        return Ok(());
    }
    // 1. Let realm be module.[[Realm]].
    // 2. Let env be NewModuleEnvironment(realm.[[GlobalEnv]]).
    // 3. Set module.[[Environment]] to env.
    // 4. For each String exportName of module.[[ExportNames]], do
    //    a. Perform ! env.CreateMutableBinding(exportName, false).
    //    b. Perform ! env.InitializeBinding(exportName, undefined).
    record.environment = Some(vec![Value::Undefined; record.export_names.len()].into_boxed_slice());
    // 5. Return NormalCompletion(unused).
    Ok(())
}

/// ### [16.2.1.8.4.4 Evaluate ( )](https://tc39.es/ecma262/#sec-smr-Evaluate)
///
/// The evaluation steps run once; later calls return the same promise.
pub(crate) fn evaluate_synthetic_module(agent: &mut Agent, module: Module) -> Promise {
    let record = agent[module].synthetic();
    if let Some(promise) = record.evaluation {
        return promise;
    }
    // 1. Let moduleContext be a new ECMAScript code execution context.
    // 2. Set the Function of moduleContext to null.
    // 3. Set the Realm of moduleContext to module.[[Realm]].
    // 4. Set the ScriptOrModule of moduleContext to module.
    // 5. Set the VariableEnvironment of moduleContext to module.[[Environment]].
    // 6. Set the LexicalEnvironment of moduleContext to module.[[Environment]].
    // 7. Suspend the running execution context.
    // 8. Push moduleContext onto the execution context stack; moduleContext is
    //    now the running execution context.
    // 9. Let steps be module.[[EvaluationSteps]].
    let steps = record.evaluation_steps.clone();
    // 10. Let result be Completion(steps(module)).
    let result = steps.evaluate(agent, module);
    // 11. Suspend moduleContext and remove it from the execution context stack.
    // 12. Resume the context that is now on the top of the execution context
    //     stack as the running execution context.
    // 13. Let pc be ! NewPromiseCapability(%Promise%).
    let promise = match result {
        // 15. Perform ! Call(pc.[[Resolve]], undefined, « undefined »).
        Ok(()) => Promise::new_resolved(agent, Value::Undefined),
        // 14. IfAbruptRejectPromise(result, pc).
        Err(error) => {
            log::debug!("synthetic module {module:?} threw during evaluation");
            Promise::new_rejected(agent, error.value())
        }
    };
    agent[module].synthetic_mut().evaluation = Some(promise);
    // 16. Return pc.[[Promise]].
    promise
}
