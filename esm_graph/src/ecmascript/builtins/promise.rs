// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::ops::{Index, IndexMut};

use crate::{
    ecmascript::{
        builtins::promise_objects::promise_abstract_operations::{
            promise_capability_records::PromiseCapability,
            promise_reaction_records::PromiseReaction,
        },
        execution::{Agent, agent::PromiseRejectionTrackerOperation},
        types::Value,
    },
    heap::{CreateHeapData, Heap, index_of_next},
};

/// ### [27.2 Promise Objects](https://tc39.es/ecma262/#sec-promise-objects)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Promise(u32);

impl Promise {
    pub(crate) const fn get_index(self) -> usize {
        self.0 as usize
    }

    /// Create a new resolved Promise.
    pub(crate) fn new_resolved(agent: &mut Agent, value: Value) -> Self {
        let capability = PromiseCapability::new(agent);
        capability.resolve(agent, value);
        capability.promise()
    }

    /// Create a new rejected Promise.
    pub(crate) fn new_rejected(agent: &mut Agent, reason: Value) -> Self {
        let capability = PromiseCapability::new(agent);
        capability.reject(agent, reason);
        capability.promise()
    }

    pub(crate) fn set_already_resolved(self, agent: &mut Agent) {
        match &mut agent[self].promise_state {
            PromiseState::Pending { is_resolved, .. } => *is_resolved = true,
            _ => unreachable!(),
        };
    }

    /// Sets \[\[PromiseIsHandled]] on a rejected promise, notifying the host
    /// if it was not yet handled.
    pub(crate) fn mark_handled(self, agent: &mut Agent) {
        if let PromiseState::Rejected { is_handled, .. } = &mut agent[self].promise_state {
            if !*is_handled {
                *is_handled = true;
                agent
                    .host_hooks
                    .promise_rejection_tracker(self, PromiseRejectionTrackerOperation::Handle);
            }
        }
    }

    /// The current state of the promise as seen from outside of the engine.
    pub fn settlement(self, agent: &Agent) -> PromiseSettlement {
        match agent[self].promise_state {
            PromiseState::Pending { .. } => PromiseSettlement::Pending,
            PromiseState::Fulfilled { promise_result } => {
                PromiseSettlement::Fulfilled(promise_result)
            }
            PromiseState::Rejected { promise_result, .. } => {
                PromiseSettlement::Rejected(promise_result)
            }
        }
    }

    pub fn is_pending(self, agent: &Agent) -> bool {
        matches!(agent[self].promise_state, PromiseState::Pending { .. })
    }
}

/// Observable state of a promise.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PromiseSettlement {
    Pending,
    Fulfilled(Value),
    Rejected(Value),
}

#[derive(Debug, Clone, Default)]
pub struct PromiseHeapData {
    pub(crate) promise_state: PromiseState,
}

#[derive(Debug, Clone)]
pub(crate) enum PromiseState {
    Pending {
        fulfill_reactions: Vec<PromiseReaction>,
        reject_reactions: Vec<PromiseReaction>,
        /// True if the resolution state of this promise depends on another
        /// promise or thenable that hasn't fulfilled or rejected yet.
        is_resolved: bool,
    },
    Fulfilled {
        promise_result: Value,
    },
    Rejected {
        promise_result: Value,
        is_handled: bool,
    },
}

impl Default for PromiseState {
    fn default() -> Self {
        Self::Pending {
            fulfill_reactions: Vec::new(),
            reject_reactions: Vec::new(),
            is_resolved: false,
        }
    }
}

impl Index<Promise> for Agent {
    type Output = PromiseHeapData;

    fn index(&self, index: Promise) -> &Self::Output {
        &self.heap.promises[index]
    }
}

impl IndexMut<Promise> for Agent {
    fn index_mut(&mut self, index: Promise) -> &mut Self::Output {
        &mut self.heap.promises[index]
    }
}

impl Index<Promise> for Vec<PromiseHeapData> {
    type Output = PromiseHeapData;

    fn index(&self, index: Promise) -> &Self::Output {
        self.get(index.get_index())
            .expect("Promise out of bounds")
    }
}

impl IndexMut<Promise> for Vec<PromiseHeapData> {
    fn index_mut(&mut self, index: Promise) -> &mut Self::Output {
        self.get_mut(index.get_index())
            .expect("Promise out of bounds")
    }
}

impl CreateHeapData<PromiseHeapData, Promise> for Heap {
    fn create(&mut self, data: PromiseHeapData) -> Promise {
        let index = index_of_next(self.promises.len());
        self.promises.push(data);
        Promise(index)
    }
}
