// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The scripting host: compile, run, drain.
//!
//! One host per pipeline execution. `run_pipeline` parses the source
//! (surfacing syntax errors before any orchestration), installs the
//! runtime API, executes the top level, calls the exported async
//! `pipeline` function, waits for the outstanding-worker counter to reach
//! zero, and only then inspects the pipeline's promise. Workers spawned by
//! un-awaited promises are therefore always drained before the driver is
//! torn down.

use crate::backend::{Notifier, PipelineBackend, TracingNotifier};
use crate::builtins::{self, FetchConfig, HostState, HttpExchange, NotifyState};
use crate::env::Env;
use crate::error::ScriptError;
use crate::interp::{Flow, Interp};
use crate::parser::Parser;
use crate::promise::PendingTasks;
use crate::token::Pos;
use crate::value::Value;
use crate::ast::Stmt;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// The exported entry point every pipeline must define.
const ENTRY: &str = "pipeline";

pub struct ScriptHost {
    state: Arc<HostState>,
}

impl ScriptHost {
    pub fn new(backend: Arc<dyn PipelineBackend>, ctx: CancellationToken) -> Self {
        Self {
            state: Arc::new(HostState {
                backend,
                pending: PendingTasks::new(),
                ctx,
                fetch: FetchConfig::default(),
                notifier: Arc::new(TracingNotifier),
                notify: Mutex::new(NotifyState::default()),
                http: Mutex::new(HttpExchange::default()),
            }),
        }
    }

    /// Replace the fetch limits (or disable fetch entirely).
    pub fn with_fetch_config(mut self, fetch: FetchConfig) -> Self {
        let state = Arc::get_mut(&mut self.state);
        if let Some(state) = state {
            state.fetch = fetch;
        }
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        if let Some(state) = Arc::get_mut(&mut self.state) {
            state.notifier = notifier;
        }
        self
    }

    /// Wire a one-shot HTTP exchange for `http.request`/`http.respond`.
    pub fn set_http_exchange(
        &self,
        request: serde_json::Value,
        responder: tokio::sync::mpsc::Sender<serde_json::Value>,
    ) {
        let mut http = self.state.http.lock();
        http.request = Some(request);
        http.responder = Some(responder);
        http.responded = false;
    }

    /// In-flight worker count (tests, diagnostics).
    pub fn pending(&self) -> &PendingTasks {
        &self.state.pending
    }

    /// Compile and run a pipeline script to completion.
    pub async fn run_pipeline(&self, source: &str) -> Result<Value, ScriptError> {
        let program = Parser::parse(source)?;

        let has_export = program.body.iter().any(|stmt| match stmt {
            Stmt::Function { func, exported } => {
                *exported && func.name.as_deref() == Some(ENTRY)
            }
            Stmt::ExportBinding { name, .. } => name == ENTRY,
            _ => false,
        });
        if !has_export {
            return Err(ScriptError::Entry(format!(
                "script must export an async function named {:?}",
                ENTRY
            )));
        }

        let env = Env::root();
        builtins::install(&env, &self.state);
        let interp = Interp::new(self.state.ctx.clone());

        interp.exec_block(&env, &program.body).await.map_err(flow_to_error)?;

        let entry = env.get(ENTRY).ok_or_else(|| {
            ScriptError::Entry(format!("exported {:?} was never bound", ENTRY))
        })?;
        if !matches!(entry, Value::Closure(_) | Value::Native { .. }) {
            return Err(ScriptError::Entry(format!(
                "exported {:?} is a {}, not a function",
                ENTRY,
                entry.type_name()
            )));
        }

        let returned =
            interp.call(entry, Vec::new(), Pos::default()).await.map_err(flow_to_error)?;
        let Value::Promise(promise) = returned else {
            return Err(ScriptError::Entry(format!(
                "{:?} must be async (it returned a {} instead of a promise)",
                ENTRY,
                returned.type_name()
            )));
        };

        // Drain every spawned worker before inspecting the result, so
        // side effects from un-awaited promises land before teardown.
        tokio::select! {
            _ = self.state.pending.drained() => {}
            _ = self.state.ctx.cancelled() => {
                return Err(ScriptError::Interrupted("context cancelled".to_string()));
            }
        }

        interp
            .await_value(Value::Promise(promise), Pos::default())
            .await
            .map_err(flow_to_error)
    }
}

fn flow_to_error(flow: Flow) -> ScriptError {
    match flow {
        Flow::Throw(value) => {
            let mut message = value.render();
            // Carry the stack when the thrown value has one.
            if let Value::Object(map) = &value {
                if let Some(Value::Str(stack)) = map.lock().get("stack") {
                    if *stack != message {
                        message = format!("{}\n{}", message, stack);
                    }
                }
            }
            ScriptError::Runtime { message }
        }
        Flow::Interrupt(message) => ScriptError::Interrupted(message),
        Flow::Return(_) | Flow::Break | Flow::Continue => ScriptError::Runtime {
            message: "illegal top-level control flow".to_string(),
        },
    }
}

#[cfg(test)]
#[path = "host_tests.rs"]
mod tests;
