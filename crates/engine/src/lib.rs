// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! The pipeline engine: runner, resumable decoration, secrets, executor.
//!
//! The [`runner::PipelineRunner`] coordinates one pipeline run against a
//! driver; [`resume::ResumableRunner`] adds durable step state so an
//! interrupted run can skip, reattach, or re-execute; [`executor`] is the
//! top-level glue from a DSN and a script to a finished pipeline.

pub mod bridge;
pub mod executor;
pub mod redact;
pub mod resume;
pub mod runner;
pub mod secrets;

pub use executor::{ExecutionReport, Executor, ExecutorConfig, ExecutorError};
pub use resume::ResumableRunner;
pub use runner::{OutputCallback, OutputStream, PipelineRunner, RunnerError};
pub use secrets::{EnvSecretsManager, SecretScope, SecretsManager, StaticSecretsManager};
