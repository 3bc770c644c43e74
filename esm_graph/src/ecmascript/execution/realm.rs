// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::ops::{Index, IndexMut};

use crate::{
    ecmascript::{
        execution::{Agent, HostDefined},
        scripts_and_modules::module::module_semantics::LoadedModuleRequestRecord,
    },
    heap::{CreateHeapData, Heap, index_of_next},
};

/// ### [9.3 Realms](https://tc39.es/ecma262/#sec-code-realms)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Realm(u32);

impl Realm {
    pub(crate) const fn get_index(self) -> usize {
        self.0 as usize
    }

    /// \[\[HostDefined]]
    pub fn host_defined(self, agent: &Agent) -> Option<HostDefined> {
        agent[self].host_defined.clone()
    }
}

/// ### [9.3 Realms](https://tc39.es/ecma262/#sec-code-realms)
///
/// Only the parts of a Realm Record that the module system touches.
#[derive(Debug)]
pub struct RealmRecord {
    /// \[\[HostDefined]]
    ///
    /// Field reserved for use by hosts that need to associate additional
    /// information with a Realm Record.
    pub(crate) host_defined: Option<HostDefined>,

    /// \[\[LoadedModules]]
    ///
    /// A map from the specifier strings imported by this realm to the
    /// resolved Module Record. The list does not contain two different
    /// Records r1 and r2 such that ModuleRequestsEqual(r1, r2) is true.
    pub(crate) loaded_modules: Vec<LoadedModuleRequestRecord>,
}

impl RealmRecord {
    pub(crate) fn new(host_defined: Option<HostDefined>) -> Self {
        Self {
            host_defined,
            loaded_modules: Vec::new(),
        }
    }
}

impl Index<Realm> for Agent {
    type Output = RealmRecord;

    fn index(&self, index: Realm) -> &Self::Output {
        &self.heap.realms[index]
    }
}

impl IndexMut<Realm> for Agent {
    fn index_mut(&mut self, index: Realm) -> &mut Self::Output {
        &mut self.heap.realms[index]
    }
}

impl Index<Realm> for Vec<RealmRecord> {
    type Output = RealmRecord;

    fn index(&self, index: Realm) -> &Self::Output {
        self.get(index.get_index())
            .expect("Realm out of bounds")
    }
}

impl IndexMut<Realm> for Vec<RealmRecord> {
    fn index_mut(&mut self, index: Realm) -> &mut Self::Output {
        self.get_mut(index.get_index())
            .expect("Realm out of bounds")
    }
}

impl CreateHeapData<RealmRecord, Realm> for Heap {
    fn create(&mut self, data: RealmRecord) -> Realm {
        let index = index_of_next(self.realms.len());
        self.realms.push(data);
        Realm(index)
    }
}
