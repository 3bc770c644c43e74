// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::ops::{Index, IndexMut};

use crate::{
    ecmascript::{
        execution::{Agent, agent::ExceptionType},
        types::Value,
    },
    heap::{CreateHeapData, Heap, index_of_next},
};

/// ### [20.5 Error Objects](https://tc39.es/ecma262/#sec-error-objects)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Error(u32);

impl Error {
    pub(crate) const fn get_index(self) -> usize {
        self.0 as usize
    }

    pub fn kind(self, agent: &Agent) -> ExceptionType {
        agent[self].kind
    }

    pub fn message(self, agent: &Agent) -> &str {
        &agent[self].message
    }

    /// The `cause` of the error, if one was given when it was thrown.
    pub fn cause(self, agent: &Agent) -> Option<Value> {
        agent[self].cause
    }
}

#[derive(Debug, Clone)]
pub struct ErrorHeapData {
    pub(crate) kind: ExceptionType,
    pub(crate) message: String,
    pub(crate) cause: Option<Value>,
}

impl ErrorHeapData {
    pub(crate) fn new(kind: ExceptionType, message: String, cause: Option<Value>) -> Self {
        Self {
            kind,
            message,
            cause,
        }
    }
}

impl Index<Error> for Agent {
    type Output = ErrorHeapData;

    fn index(&self, index: Error) -> &Self::Output {
        &self.heap.errors[index]
    }
}

impl IndexMut<Error> for Agent {
    fn index_mut(&mut self, index: Error) -> &mut Self::Output {
        &mut self.heap.errors[index]
    }
}

impl Index<Error> for Vec<ErrorHeapData> {
    type Output = ErrorHeapData;

    fn index(&self, index: Error) -> &Self::Output {
        self.get(index.get_index())
            .expect("Error out of bounds")
    }
}

impl IndexMut<Error> for Vec<ErrorHeapData> {
    fn index_mut(&mut self, index: Error) -> &mut Self::Output {
        self.get_mut(index.get_index())
            .expect("Error out of bounds")
    }
}

impl CreateHeapData<ErrorHeapData, Error> for Heap {
    fn create(&mut self, data: ErrorHeapData) -> Error {
        let index = index_of_next(self.errors.len());
        self.errors.push(data);
        Error(index)
    }
}
