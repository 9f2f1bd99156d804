// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Resumable execution on top of the pipeline runner.
//!
//! Step identity is positional: the Nth `run` call with a given name
//! produces the same step ID on every attempt, so a resumed run walks the
//! same script and (a) returns cached results for completed steps without
//! touching the driver, (b) reattaches to containers that were still
//! running when the previous attempt died, and (c) re-executes everything
//! else — including previously aborted steps, which are terminal but carry
//! nothing worth reusing.
//!
//! State persists synchronously with every transition: a crash between a
//! transition and its persist reads as the transition never happening,
//! which is exactly the at-least-once contract.

use crate::runner::{PipelineRunner, RunReport, RunnerError, StartOutcome};
use kiln_core::{
    sanitize_name, Clock, PipelineState, RunInput, RunResult, RunStatus, StepState, StepStatus,
    SystemClock,
};
use kiln_storage::{keys, StateStore};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Cap applied to the sanitized name inside a step ID.
const STEP_NAME_CAP: usize = 40;

/// Pipeline runner decorated with durable step state.
pub struct ResumableRunner<C: Clock = SystemClock> {
    runner: PipelineRunner<C>,
    store: Arc<dyn StateStore>,
    state: tokio::sync::Mutex<PipelineState>,
    /// Session-local call index; distinct from the inner runner's.
    call_index: Mutex<u64>,
    clock: C,
}

impl ResumableRunner<SystemClock> {
    /// Load (or create) state for `run_id`. With `resume = false` the state
    /// starts fresh even if an old record exists.
    pub async fn load(
        runner: PipelineRunner<SystemClock>,
        store: Arc<dyn StateStore>,
        resume: bool,
    ) -> Result<Self, RunnerError> {
        Self::load_with_clock(runner, store, resume, SystemClock).await
    }
}

impl<C: Clock> ResumableRunner<C> {
    pub async fn load_with_clock(
        runner: PipelineRunner<C>,
        store: Arc<dyn StateStore>,
        resume: bool,
        clock: C,
    ) -> Result<Self, RunnerError> {
        let run_id = runner.run_id().clone();
        let state = if resume {
            match store.get(&keys::resume_state_key(run_id.as_str())).await? {
                Some(value) => match serde_json::from_value::<PipelineState>(value) {
                    Ok(state) => {
                        tracing::info!(
                            run_id = %run_id,
                            steps = state.step_order.len(),
                            "loaded resume state"
                        );
                        state
                    }
                    Err(e) => {
                        tracing::warn!(run_id = %run_id, error = %e, "resume state corrupt, starting fresh");
                        PipelineState::new(run_id.clone(), clock.epoch_ms(), true)
                    }
                },
                None => PipelineState::new(run_id.clone(), clock.epoch_ms(), true),
            }
        } else {
            PipelineState::new(run_id.clone(), clock.epoch_ms(), false)
        };

        let resumable = Self {
            runner,
            store,
            state: tokio::sync::Mutex::new(state),
            call_index: Mutex::new(0),
            clock,
        };
        resumable.persist().await?;
        Ok(resumable)
    }

    pub fn inner(&self) -> &PipelineRunner<C> {
        &self.runner
    }

    /// Snapshot of the current pipeline state (tests, UI).
    pub async fn state(&self) -> PipelineState {
        self.state.lock().await.clone()
    }

    /// Run a step, skipping or reattaching when prior state allows it.
    pub async fn run(
        &self,
        ctx: &CancellationToken,
        input: RunInput,
    ) -> Result<RunResult, RunnerError> {
        let step_id = {
            let mut index = self.call_index.lock();
            let id = format!("{}-{}", *index, sanitize_name(&input.name, STEP_NAME_CAP));
            *index += 1;
            id
        };

        // Skippable: completed with a cached result — zero driver calls.
        let prior = self.state.lock().await.step(&step_id).cloned();
        if let Some(prior) = &prior {
            if prior.is_skippable() {
                if let Some(result) = prior
                    .result
                    .clone()
                    .and_then(|v| serde_json::from_value::<RunResult>(v).ok())
                {
                    tracing::info!(step_id, "skipping completed step");
                    return Ok(result);
                }
            }
            if prior.is_resumable() {
                match self.runner_driver_container(ctx, &prior.container_id).await {
                    Some(container) => {
                        tracing::info!(step_id, container = %prior.container_id, "reattaching to running container");
                        return self.finish(ctx, step_id, prior.clone(), container).await;
                    }
                    None => {
                        tracing::info!(
                            step_id,
                            container = %prior.container_id,
                            "container gone, running step fresh"
                        );
                    }
                }
            }
        }

        self.execute_fresh(ctx, step_id, input).await
    }

    async fn runner_driver_container(
        &self,
        ctx: &CancellationToken,
        container_id: &str,
    ) -> Option<Arc<dyn kiln_driver::Container>> {
        match self.runner.driver().get_container(ctx, container_id).await {
            Ok(container) => Some(container),
            Err(e) if e.is_not_found() => None,
            Err(e) => {
                tracing::warn!(container = %container_id, error = %e, "reattach lookup failed");
                None
            }
        }
    }

    async fn execute_fresh(
        &self,
        ctx: &CancellationToken,
        step_id: String,
        input: RunInput,
    ) -> Result<RunResult, RunnerError> {
        let name = input.name.clone();
        let outcome = self.runner.start_step(ctx, input, &step_id).await;
        let started = match outcome {
            Ok(StartOutcome::Started(started)) => started,
            Ok(StartOutcome::Aborted { .. }) => {
                self.transition(&step_id, &name, |step| {
                    step.status = StepStatus::Aborted;
                    step.completed_at = Some(self.clock.epoch_ms());
                })
                .await?;
                return Ok(RunResult::aborted());
            }
            Err(e) => {
                self.transition(&step_id, &name, |step| {
                    step.status = StepStatus::Failed;
                    step.error = Some(e.to_string());
                    step.completed_at = Some(self.clock.epoch_ms());
                })
                .await?;
                return Err(e);
            }
        };

        // Running, with a container to reattach to. Persist before driving
        // the step further — this is the record a resume needs.
        let container_id = started.container.id().to_string();
        let task_id = started.task_id.clone();
        self.transition(&step_id, &name, |step| {
            step.status = StepStatus::Running;
            step.container_id = container_id.clone();
            step.task_id = task_id.clone();
        })
        .await?;

        let report = self.runner.finish_step(*started).await;
        self.record_report(&step_id, &name, report).await
    }

    /// Drive a reattached container to completion, mirroring the fresh
    /// path's tail: poll, fetch logs, write records, persist state.
    async fn finish(
        &self,
        ctx: &CancellationToken,
        step_id: String,
        prior: StepState,
        container: Arc<dyn kiln_driver::Container>,
    ) -> Result<RunResult, RunnerError> {
        let name = prior.name.clone();
        let report = self.runner.resume_step(ctx, &step_id, &prior, container).await;
        self.record_report(&step_id, &name, report).await
    }

    async fn record_report(
        &self,
        step_id: &str,
        name: &str,
        report: Result<RunReport, RunnerError>,
    ) -> Result<RunResult, RunnerError> {
        match report {
            Ok(report) => {
                let result = report.result.clone();
                self.transition(step_id, name, |step| {
                    step.completed_at = Some(self.clock.epoch_ms());
                    match result.status {
                        RunStatus::Complete => {
                            step.status = if result.code == 0 {
                                StepStatus::Completed
                            } else {
                                StepStatus::Failed
                            };
                            step.exit_code = Some(result.code);
                            if step.status == StepStatus::Completed {
                                step.result = serde_json::to_value(&result).ok();
                            } else {
                                step.error = Some(format!("exit code {}", result.code));
                            }
                        }
                        RunStatus::Abort => {
                            step.status = StepStatus::Aborted;
                        }
                    }
                    if !report.container_id.is_empty() {
                        step.container_id = report.container_id.clone();
                    }
                    if !report.task_id.is_empty() {
                        step.task_id = report.task_id.clone();
                    }
                })
                .await?;
                Ok(report.result)
            }
            Err(e) => {
                self.transition(step_id, name, |step| {
                    step.status = StepStatus::Failed;
                    step.error = Some(e.to_string());
                    step.completed_at = Some(self.clock.epoch_ms());
                })
                .await?;
                Err(e)
            }
        }
    }

    /// Apply a mutation to a step and persist the whole state.
    async fn transition<F>(&self, step_id: &str, name: &str, mutate: F) -> Result<(), RunnerError>
    where
        F: FnOnce(&mut StepState),
    {
        {
            let mut state = self.state.lock().await;
            let mut step = state
                .step(step_id)
                .cloned()
                .unwrap_or_else(|| StepState::new(step_id, name, self.clock.epoch_ms()));
            mutate(&mut step);
            state.upsert_step(step);
        }
        self.persist().await
    }

    /// Mark the run finished and persist.
    pub async fn complete(&self) -> Result<(), RunnerError> {
        {
            let mut state = self.state.lock().await;
            state.completed_at = Some(self.clock.epoch_ms());
        }
        self.persist().await
    }

    async fn persist(&self) -> Result<(), RunnerError> {
        let (key, value) = {
            let state = self.state.lock().await;
            let key = keys::resume_state_key(state.run_id.as_str());
            let value = serde_json::to_value(&*state)
                .map_err(|e| RunnerError::InvalidInput(format!("state encode failed: {}", e)))?;
            (key, value)
        };
        self.store.put(&key, &value).await?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "resume_tests.rs"]
mod tests;
