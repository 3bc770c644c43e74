// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! # esm_graph
//!
//! The module system core of an ECMAScript engine: loading a module graph
//! through host callbacks, linking it and evaluating it, including modules
//! that use top-level await and dynamic `import()`.
//!
//! The embedder provides module records through [`Module::new_cyclic`] and
//! [`Module::new_synthetic`], resolves import requests in its
//! [`HostHooks::host_load_imported_module`] implementation, and drains the
//! promise job queue it is handed through [`HostHooks::enqueue_promise_job`].
//!
//! [`Module::new_cyclic`]: ecmascript::Module::new_cyclic
//! [`Module::new_synthetic`]: ecmascript::Module::new_synthetic
//! [`HostHooks::host_load_imported_module`]: ecmascript::HostHooks::host_load_imported_module
//! [`HostHooks::enqueue_promise_job`]: ecmascript::HostHooks::enqueue_promise_job

pub mod ecmascript;
pub mod heap;
