// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::ops::{Index, IndexMut};

use crate::{
    ecmascript::{
        execution::Agent,
        scripts_and_modules::module::module_semantics::abstract_module_records::Module,
    },
    heap::{CreateHeapData, Heap, index_of_next},
};

use super::promise_capability_records::PromiseCapability;

/// \[\[Type\]\]
///
/// fulfill or reject
///
/// The \[\[Type\]\] is used when \[\[Handler\]\] is empty to allow for
/// behaviour specific to the settlement type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PromiseReactionType {
    Fulfill,
    Reject,
}

/// \[\[Handler\]\]
///
/// The engine-internal continuation that should be applied to the incoming
/// value. If \[\[Handler\]\] is empty, a function that depends on the value of
/// \[\[Type\]\] will be used instead.
#[derive(Debug, Clone, Copy)]
pub(crate) enum PromiseReactionHandler {
    /// The onFulfilled and onRejected closures created in
    /// [ExecuteAsyncModule](https://tc39.es/ecma262/#sec-execute-async-module).
    AsyncModule(Module),
    /// The onFulfilled and onRejected closures created in
    /// [ContinueDynamicImport](https://tc39.es/ecma262/#sec-ContinueDynamicImport)
    /// for the promise returned by LoadRequestedModules.
    DynamicImportLoaded {
        promise_capability: PromiseCapability,
        module: Module,
    },
    /// The closures created in ContinueDynamicImport for the promise returned
    /// by Evaluate.
    DynamicImportEvaluated {
        promise_capability: PromiseCapability,
        module: Module,
    },
    Empty,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct PromiseReactionRecord {
    /// \[\[Capability\]\]
    ///
    /// a PromiseCapability Record or undefined
    ///
    /// The capabilities of the promise for which this record provides a
    /// reaction handler.
    pub(crate) capability: Option<PromiseCapability>,
    /// \[\[Type\]\]
    pub(crate) reaction_type: PromiseReactionType,
    /// \[\[Handler\]\]
    pub(crate) handler: PromiseReactionHandler,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(transparent)]
pub(crate) struct PromiseReaction(u32);

impl PromiseReaction {
    pub(crate) const fn get_index(self) -> usize {
        self.0 as usize
    }
}

impl Index<PromiseReaction> for Agent {
    type Output = PromiseReactionRecord;

    fn index(&self, index: PromiseReaction) -> &Self::Output {
        &self.heap.promise_reaction_records[index]
    }
}

impl IndexMut<PromiseReaction> for Agent {
    fn index_mut(&mut self, index: PromiseReaction) -> &mut Self::Output {
        &mut self.heap.promise_reaction_records[index]
    }
}

impl Index<PromiseReaction> for Vec<PromiseReactionRecord> {
    type Output = PromiseReactionRecord;

    fn index(&self, index: PromiseReaction) -> &Self::Output {
        self.get(index.get_index())
            .expect("PromiseReaction out of bounds")
    }
}

impl IndexMut<PromiseReaction> for Vec<PromiseReactionRecord> {
    fn index_mut(&mut self, index: PromiseReaction) -> &mut Self::Output {
        self.get_mut(index.get_index())
            .expect("PromiseReaction out of bounds")
    }
}

impl CreateHeapData<PromiseReactionRecord, PromiseReaction> for Heap {
    fn create(&mut self, data: PromiseReactionRecord) -> PromiseReaction {
        let index = index_of_next(self.promise_reaction_records.len());
        self.promise_reaction_records.push(data);
        PromiseReaction(index)
    }
}
