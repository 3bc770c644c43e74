// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! ## [27.2.2 Promise Jobs](https://tc39.es/ecma262/#sec-promise-jobs)

use crate::ecmascript::{
    builtins::{
        promise::Promise, promise_objects::promise_prototype::inner_promise_then,
    },
    execution::{
        Agent, JsResult,
        agent::{InnerJob, Job, JsError},
    },
    scripts_and_modules::module::module_semantics::{
        continue_dynamic_import_link_and_evaluate,
        cyclic_module_records::{async_module_execution_fulfilled, async_module_execution_rejected},
        get_module_namespace,
    },
    types::Value,
};

use super::{
    promise_capability_records::PromiseCapability,
    promise_reaction_records::{PromiseReaction, PromiseReactionHandler, PromiseReactionType},
};

#[derive(Debug)]
pub(crate) struct PromiseResolveThenableJob {
    promise_to_resolve: Promise,
    thenable: Promise,
}

impl PromiseResolveThenableJob {
    pub(crate) fn run(self, agent: &mut Agent) -> JsResult<()> {
        let Self {
            promise_to_resolve,
            thenable,
        } = self;
        // The following are substeps of point 1 in NewPromiseResolveThenableJob.
        // a. Let resolvingFunctions be CreateResolvingFunctions(promiseToResolve).
        let promise_capability = PromiseCapability::from_promise(promise_to_resolve, false);
        // b. Let thenCallResult be Completion(HostCallJobCallback(then, thenable, « resolvingFunctions.[[Resolve]], resolvingFunctions.[[Reject]] »)).
        // NOTE: The thenable is always a built-in promise, so calling its
        // `then` method is PerformPromiseThen with the resolving functions.
        inner_promise_then(
            agent,
            thenable,
            PromiseReactionHandler::Empty,
            PromiseReactionHandler::Empty,
            Some(promise_capability),
        );
        // c. If thenCallResult is an abrupt completion, then
        // i. Return ? Call(resolvingFunctions.[[Reject]], undefined, « thenCallResult.[[Value]] »).
        // d. Return ? thenCallResult.
        Ok(())
    }
}

/// ### [27.2.2.2 NewPromiseResolveThenableJob ( promiseToResolve, thenable, then )](https://tc39.es/ecma262/#sec-newpromiseresolvethenablejob)
pub(crate) fn new_promise_resolve_thenable_job(
    promise_to_resolve: Promise,
    thenable: Promise,
) -> Job {
    // 2. Let getThenRealmResult be Completion(GetFunctionRealm(then.[[Callback]])).
    // 3. If getThenRealmResult is a normal completion, let thenRealm be getThenRealmResult.[[Value]].
    // 4. Else, let thenRealm be the current Realm Record.
    // 5. NOTE: thenRealm is never null. When then.[[Callback]] is a revoked Proxy and no code runs, thenRealm is used to create error objects.
    // 6. Return the Record { [[Job]]: job, [[Realm]]: thenRealm }.
    Job {
        inner: InnerJob::PromiseResolveThenable(PromiseResolveThenableJob {
            promise_to_resolve,
            thenable,
        }),
    }
}

#[derive(Debug)]
pub(crate) struct PromiseReactionJob {
    reaction: PromiseReaction,
    argument: Value,
}

impl PromiseReactionJob {
    pub(crate) fn run(self, agent: &mut Agent) -> JsResult<()> {
        let Self { reaction, argument } = self;
        let reaction_type = agent[reaction].reaction_type;
        // The following are substeps of point 1 in NewPromiseReactionJob.
        let handler_result = match agent[reaction].handler {
            PromiseReactionHandler::Empty => match reaction_type {
                PromiseReactionType::Fulfill => {
                    // d.i.1. Let handlerResult be NormalCompletion(argument).
                    Ok(argument)
                }
                PromiseReactionType::Reject => {
                    // d.ii.1. Let handlerResult be ThrowCompletion(argument).
                    Err(JsError::new(argument))
                }
            },
            PromiseReactionHandler::AsyncModule(module) => {
                debug_assert!(agent[reaction].capability.is_none());
                match reaction_type {
                    // [16.2.1.6.1.3.2 ExecuteAsyncModule ( module )](https://tc39.es/ecma262/#sec-execute-async-module)
                    // 3. Let fulfilledClosure be a new Abstract Closure with
                    //    no parameters that captures module and performs the
                    //    following steps when called:
                    //    a. Perform AsyncModuleExecutionFulfilled(module).
                    PromiseReactionType::Fulfill => async_module_execution_fulfilled(agent, module),
                    // 5. Let rejectedClosure be a new Abstract Closure with
                    //    parameters (error) that captures module and performs
                    //    the following steps when called:
                    //    a. Perform AsyncModuleExecutionRejected(module, error).
                    PromiseReactionType::Reject => {
                        async_module_execution_rejected(agent, module, argument)
                    }
                }
                // b. Return NormalCompletion(undefined).
                Ok(Value::Undefined)
            }
            PromiseReactionHandler::DynamicImportLoaded {
                promise_capability,
                module,
            } => {
                match reaction_type {
                    // [16.2.1.13 ContinueDynamicImport ( promiseCapability, phase, moduleCompletion )](https://tc39.es/ecma262/#sec-ContinueDynamicImport)
                    // 6. Let linkAndEvaluateClosure be a new Abstract Closure
                    //    with no parameters that captures module,
                    //    promiseCapability, and onRejected...
                    PromiseReactionType::Fulfill => {
                        continue_dynamic_import_link_and_evaluate(agent, promise_capability, module)
                    }
                    // 4. Let rejectedClosure be a new Abstract Closure with
                    //    parameters (reason) that captures promiseCapability
                    //    and performs the following steps when called:
                    //    a. Perform ! Call(promiseCapability.[[Reject]], undefined, « reason »).
                    PromiseReactionType::Reject => promise_capability.reject(agent, argument),
                }
                // b. Return NormalCompletion(undefined).
                Ok(Value::Undefined)
            }
            PromiseReactionHandler::DynamicImportEvaluated {
                promise_capability,
                module,
            } => {
                match reaction_type {
                    // 6.d. Let fulfilledClosure be a new Abstract Closure with
                    //      no parameters that captures module and
                    //      promiseCapability and performs the following steps
                    //      when called:
                    PromiseReactionType::Fulfill => {
                        // i. Let namespace be GetModuleNamespace(module).
                        let namespace = get_module_namespace(agent, module);
                        // ii. Perform ! Call(promiseCapability.[[Resolve]], undefined, « namespace »).
                        promise_capability.resolve(agent, namespace);
                    }
                    PromiseReactionType::Reject => promise_capability.reject(agent, argument),
                }
                // iii. Return NormalCompletion(undefined).
                Ok(Value::Undefined)
            }
        };

        // f. If promiseCapability is undefined, then
        let Some(promise_capability) = agent[reaction].capability else {
            // i. Assert: handlerResult is not an abrupt completion.
            debug_assert!(handler_result.is_ok());
            // ii. Return empty.
            return Ok(());
        };
        match handler_result {
            // h. If handlerResult is an abrupt completion, then
            Err(err) => {
                // i. Return ? Call(promiseCapability.[[Reject]], undefined, « handlerResult.[[Value]] »).
                promise_capability.reject(agent, err.value())
            }
            // i. Else,
            Ok(value) => {
                // i. Return ? Call(promiseCapability.[[Resolve]], undefined, « handlerResult.[[Value]] »).
                promise_capability.resolve(agent, value)
            }
        };
        Ok(())
    }
}

/// ### [27.2.2.1 NewPromiseReactionJob ( reaction, argument )](https://tc39.es/ecma262/#sec-newpromisereactionjob)
pub(crate) fn new_promise_reaction_job(reaction: PromiseReaction, argument: Value) -> Job {
    // 2. Let handlerRealm be null.
    // NOTE: Module system handlers are engine-internal and carry no realm.
    // 4. Return the Record { [[Job]]: job, [[Realm]]: handlerRealm }.
    Job {
        inner: InnerJob::PromiseReaction(PromiseReactionJob { reaction, argument }),
    }
}
