// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! ### [27.2.1.1 PromiseCapability Records](https://tc39.es/ecma262/#sec-promisecapability-records)

use crate::{
    ecmascript::{
        builtins::promise::{Promise, PromiseHeapData, PromiseState},
        execution::{Agent, agent::{ExceptionType, PromiseRejectionTrackerOperation}},
        types::Value,
    },
    heap::CreateHeapData,
};

use super::{
    promise_jobs::{new_promise_reaction_job, new_promise_resolve_thenable_job},
    promise_reaction_records::PromiseReaction,
};

/// A promise capability encapsulates a promise, adding methods that are capable
/// of resolving or rejecting that promise.
///
/// Only built-in promises exist in the module system, so the resolve and
/// reject functions are never materialized; the capability methods act on the
/// promise directly.
///
/// The `must_be_unresolved` boolean is used to map the `AlreadyResolved` state
/// of a pair of resolve/reject functions with the promise state. If
/// `must_be_unresolved` is false, the promise counts as already resolved if its
/// state is Fulfilled or Rejected. If true, it also counts as already resolved
/// if it's Pending but `is_resolved` is set to true.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PromiseCapability {
    pub(crate) promise: Promise,
    pub(crate) must_be_unresolved: bool,
}

impl PromiseCapability {
    ///### [27.2.1.5 NewPromiseCapability ( C )](https://tc39.es/ecma262/#sec-newpromisecapability)
    pub fn new(agent: &mut Agent) -> Self {
        Self::from_promise(agent.heap.create(PromiseHeapData::default()), true)
    }

    pub(crate) fn from_promise(promise: Promise, must_be_unresolved: bool) -> Self {
        Self {
            promise,
            must_be_unresolved,
        }
    }

    pub fn promise(&self) -> Promise {
        self.promise
    }

    fn is_already_resolved(&self, agent: &Agent) -> bool {
        // If `self.must_be_unresolved` is true, then `alreadyResolved`
        // corresponds with the `is_resolved` flag in PromiseState::Pending.
        // Otherwise, it corresponds to `promise_state` not being Pending.
        match agent[self.promise].promise_state {
            PromiseState::Pending { is_resolved, .. } => {
                if self.must_be_unresolved {
                    is_resolved
                } else {
                    false
                }
            }
            _ => true,
        }
    }

    ///### [27.2.1.4 FulfillPromise ( promise, value )](https://tc39.es/ecma262/#sec-fulfillpromise)
    fn internal_fulfill(&self, agent: &mut Agent, value: Value) {
        // 1. Assert: The value of promise.[[PromiseState]] is pending.
        // 2. Let reactions be promise.[[PromiseFulfillReactions]].
        let promise_state = &mut agent[self.promise].promise_state;
        let reactions = match promise_state {
            PromiseState::Pending {
                fulfill_reactions, ..
            } => std::mem::take(fulfill_reactions),
            _ => unreachable!(),
        };
        // 3. Set promise.[[PromiseResult]] to value.
        // 4. Set promise.[[PromiseFulfillReactions]] to undefined.
        // 5. Set promise.[[PromiseRejectReactions]] to undefined.
        // 6. Set promise.[[PromiseState]] to FULFILLED.
        *promise_state = PromiseState::Fulfilled {
            promise_result: value,
        };
        // 7. Perform TriggerPromiseReactions(reactions, value)
        trigger_promise_reactions(agent, reactions, value);
    }

    ///### [27.2.1.7 RejectPromise ( promise, reason )](https://tc39.es/ecma262/#sec-rejectpromise)
    fn internal_reject(&self, agent: &mut Agent, reason: Value) {
        // 1. Assert: The value of promise.[[PromiseState]] is pending.
        // 2. Let reactions be promise.[[PromiseRejectReactions]].
        let promise_state = &mut agent[self.promise].promise_state;
        let reactions = match promise_state {
            PromiseState::Pending {
                reject_reactions, ..
            } => std::mem::take(reject_reactions),
            _ => unreachable!(),
        };
        // 3. Set promise.[[PromiseResult]] to reason.
        // 4. Set promise.[[PromiseFulfillReactions]] to undefined.
        // 5. Set promise.[[PromiseRejectReactions]] to undefined.
        // 6. Set promise.[[PromiseState]] to REJECTED.
        // NOTE: [[PromiseIsHandled]] for pending promises corresponds to
        // whether [[PromiseRejectReactions]] is not empty.
        let is_handled = !reactions.is_empty();
        *promise_state = PromiseState::Rejected {
            promise_result: reason,
            is_handled,
        };

        // 7. If promise.[[PromiseIsHandled]] is false, perform HostPromiseRejectionTracker(promise, "reject").
        if !is_handled {
            agent
                .host_hooks
                .promise_rejection_tracker(self.promise, PromiseRejectionTrackerOperation::Reject);
        }

        // 8. Perform TriggerPromiseReactions(reactions, reason)
        trigger_promise_reactions(agent, reactions, reason);
    }

    ///### [27.2.1.3.2 Promise Resolve Functions](https://tc39.es/ecma262/#sec-promise-resolve-functions)
    pub fn resolve(self, agent: &mut Agent, resolution: Value) {
        // 1. Let F be the active function object.
        // 2. Assert: F has a [[Promise]] internal slot whose value is an Object.
        // 3. Let promise be F.[[Promise]].
        // 4. Let alreadyResolved be F.[[AlreadyResolved]].
        // 5. If alreadyResolved.[[Value]] is true, return undefined.
        if self.is_already_resolved(agent) {
            return;
        }
        // 6. Set alreadyResolved.[[Value]] to true.
        self.promise.set_already_resolved(agent);

        // 7. If SameValue(resolution, promise) is true, then
        if resolution == Value::Promise(self.promise) {
            // a. Let selfResolutionError be a newly created TypeError object.
            // b. Perform RejectPromise(promise, selfResolutionError).
            let exception = agent
                .throw_exception(
                    ExceptionType::TypeError,
                    "Tried to resolve a promise with itself.",
                )
                .value();
            self.internal_reject(agent, exception);
            // c. Return undefined.
            return;
        }

        // 8. If resolution is not an Object, then
        // 12. If IsCallable(thenAction) is false, then
        // NOTE: Promises are the only thenables that exist here.
        let Value::Promise(thenable) = resolution else {
            // a. Perform FulfillPromise(promise, resolution).
            self.internal_fulfill(agent, resolution);
            // b. Return undefined.
            return;
        };

        // 14. Let job be NewPromiseResolveThenableJob(promise, resolution, thenJobCallback).
        let job = new_promise_resolve_thenable_job(self.promise, thenable);
        // 15. Perform HostEnqueuePromiseJob(job.[[Job]], job.[[Realm]]).
        agent.host_hooks.enqueue_promise_job(job);
        // 16. Return undefined.
    }

    ///### [27.2.1.3.1 Promise Reject Functions](https://tc39.es/ecma262/#sec-promise-reject-functions)
    pub fn reject(self, agent: &mut Agent, reason: Value) {
        // 1. Let F be the active function object.
        // 2. Assert: F has a [[Promise]] internal slot whose value is an Object.
        // 3. Let promise be F.[[Promise]].
        // 4. Let alreadyResolved be F.[[AlreadyResolved]].
        // 5. If alreadyResolved.[[Value]] is true, return undefined.
        if self.is_already_resolved(agent) {
            return;
        }

        // 7. Perform RejectPromise(promise, reason).
        self.internal_reject(agent, reason);

        // 6. Set alreadyResolved.[[Value]] to true.
        debug_assert!(matches!(
            agent[self.promise].promise_state,
            PromiseState::Rejected { .. }
        ));
    }
}

/// ### [27.2.1.8 TriggerPromiseReactions ( reactions, argument )](https://tc39.es/ecma262/#sec-triggerpromisereactions)
fn trigger_promise_reactions(agent: &mut Agent, reactions: Vec<PromiseReaction>, argument: Value) {
    // 1. For each element reaction of reactions, do
    for reaction in reactions {
        // a. Let job be NewPromiseReactionJob(reaction, argument).
        let job = new_promise_reaction_job(reaction, argument);
        // b. Perform HostEnqueuePromiseJob(job.[[Job]], job.[[Realm]]).
        agent.host_hooks.enqueue_promise_job(job);
    }
    // 2. Return unused.
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecmascript::{DefaultHostHooks, Options, PromiseSettlement};

    fn agent() -> Agent {
        let host_hooks: &'static DefaultHostHooks = Box::leak(Box::default());
        Agent::new(Options::default(), host_hooks)
    }

    #[test]
    fn resolve_with_plain_value_fulfills_immediately() {
        let mut agent = agent();
        let capability = PromiseCapability::new(&mut agent);
        capability.resolve(&mut agent, Value::Number(3.0));
        assert_eq!(
            capability.promise().settlement(&agent),
            PromiseSettlement::Fulfilled(Value::Number(3.0))
        );
    }

    #[test]
    fn first_settlement_wins() {
        let mut agent = agent();
        let capability = PromiseCapability::new(&mut agent);
        capability.reject(&mut agent, Value::Null);
        capability.resolve(&mut agent, Value::Boolean(true));
        assert_eq!(
            capability.promise().settlement(&agent),
            PromiseSettlement::Rejected(Value::Null)
        );
    }

    #[test]
    fn resolving_with_itself_rejects_with_type_error() {
        let mut agent = agent();
        let capability = PromiseCapability::new(&mut agent);
        let promise = capability.promise();
        capability.resolve(&mut agent, Value::Promise(promise));
        let PromiseSettlement::Rejected(Value::Error(error)) = promise.settlement(&agent) else {
            panic!("expected rejection with an Error");
        };
        assert_eq!(error.kind(&agent), ExceptionType::TypeError);
    }
}
