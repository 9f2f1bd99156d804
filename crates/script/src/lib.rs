// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! The pipeline scripting language and its host.
//!
//! Pipelines are cooperative async programs in a typed JavaScript-subset
//! dialect. The crate is a classic front-to-back language stack — lexer,
//! parser (type annotations discarded), async tree-walking interpreter —
//! plus the host that wires the `runtime`/`assert`/`YAML`/`fetch`/
//! `notify`/`http`/`storage` API over the [`backend::PipelineBackend`]
//! seam.
//!
//! The concurrency model is deliberately narrow: the interpreter is one
//! task, worker tasks perform every blocking operation, and promises are
//! the only bridge between them. See [`promise`] for the drain contract.

pub mod ast;
pub mod backend;
pub mod builtins;
pub mod env;
pub mod error;
pub mod interp;
pub mod lexer;
pub mod parser;
pub mod promise;
pub mod token;
pub mod value;

mod host;

pub use backend::{Notifier, PipelineBackend, TracingNotifier};
pub use builtins::FetchConfig;
pub use error::ScriptError;
pub use host::ScriptHost;
pub use value::Value;
