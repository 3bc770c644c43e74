// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::{cell::RefCell, collections::VecDeque, fmt::Debug};

use super::{
    Agent, HostDefined,
    agent::{ExceptionType, HostHooks, Job, JsResult},
};
use crate::ecmascript::scripts_and_modules::module::module_semantics::{
    ModuleLoadingPayload, ModuleRequest, Referrer, finish_loading_imported_module,
};

/// Host hooks for an embedding that has no module loader. Every load fails
/// with a TypeError; promise jobs are queued in FIFO order and run through
/// [`DefaultHostHooks::run_promise_jobs`].
#[derive(Default)]
pub struct DefaultHostHooks {
    promise_job_queue: RefCell<VecDeque<Job>>,
}

// RefCell doesn't implement Debug
impl Debug for DefaultHostHooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DefaultHostHooks").finish()
    }
}

impl DefaultHostHooks {
    pub fn pop_promise_job(&self) -> Option<Job> {
        self.promise_job_queue.borrow_mut().pop_front()
    }

    /// Runs queued promise jobs until the queue is empty, including jobs
    /// enqueued while running.
    pub fn run_promise_jobs(&self, agent: &mut Agent) -> JsResult<()> {
        while let Some(job) = self.pop_promise_job() {
            job.run(agent)?;
        }
        Ok(())
    }
}

impl HostHooks for DefaultHostHooks {
    fn host_load_imported_module(
        &self,
        agent: &mut Agent,
        referrer: Referrer,
        module_request: &ModuleRequest,
        _host_defined: Option<HostDefined>,
        payload: ModuleLoadingPayload,
    ) {
        log::trace!(
            "no module loader, rejecting import of '{}'",
            module_request.specifier()
        );
        let error = agent.throw_exception(
            ExceptionType::TypeError,
            format!(
                "Cannot load module '{}': no module loader is installed",
                module_request.specifier()
            ),
        );
        finish_loading_imported_module(agent, referrer, module_request, payload, Err(error));
    }

    fn enqueue_promise_job(&self, job: Job) {
        self.promise_job_queue.borrow_mut().push_back(job);
    }
}
