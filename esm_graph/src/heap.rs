// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! All records referenced by the module system live in the [`Heap`] and are
//! addressed through small `Copy` index handles such as
//! [`Module`](crate::ecmascript::Module). Records are never freed: graph
//! loading states that have finished are cleared out but keep their slot so
//! that stale handles held by the host stay valid.

use crate::ecmascript::{
    builtins::{
        error::ErrorHeapData,
        promise::PromiseHeapData,
        promise_objects::promise_abstract_operations::promise_reaction_records::PromiseReactionRecord,
    },
    execution::realm::RealmRecord,
    scripts_and_modules::module::module_semantics::{
        abstract_module_records::ModuleRecord,
        graph_loading_state_records::GraphLoadingStateRecord,
    },
};

#[derive(Debug, Default)]
pub struct Heap {
    pub(crate) errors: Vec<ErrorHeapData>,
    pub(crate) graph_loading_states: Vec<GraphLoadingStateRecord>,
    pub(crate) modules: Vec<ModuleRecord>,
    pub(crate) promise_reaction_records: Vec<PromiseReactionRecord>,
    pub(crate) promises: Vec<PromiseHeapData>,
    pub(crate) realms: Vec<RealmRecord>,
}

/// Allocates `T` on the heap and returns the handle `F` that refers to it.
pub trait CreateHeapData<T, F> {
    fn create(&mut self, data: T) -> F;
}

impl Heap {
    pub fn new() -> Self {
        Self {
            errors: Vec::with_capacity(16),
            graph_loading_states: Vec::with_capacity(4),
            modules: Vec::with_capacity(64),
            promise_reaction_records: Vec::with_capacity(64),
            promises: Vec::with_capacity(64),
            realms: Vec::with_capacity(1),
        }
    }
}

/// Converts a heap vector length into the `u32` index stored in a handle.
pub(crate) fn index_of_next(len: usize) -> u32 {
    u32::try_from(len).expect("Heap vector overflowed u32 indexing")
}
