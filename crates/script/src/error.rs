// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Host-level script errors.

use crate::token::Pos;
use thiserror::Error;

/// Errors surfaced by the scripting host. Syntax errors appear before any
/// orchestration begins; runtime errors carry the thrown value's rendering.
#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("syntax error at {pos}: {message}")]
    Syntax { pos: Pos, message: String },
    /// An uncaught throw or rejected pipeline promise.
    #[error("script error: {message}")]
    Runtime { message: String },
    /// The VM was interrupted: cancellation, assertion failure, YAML parse
    /// failure. Not catchable from script code.
    #[error("script interrupted: {0}")]
    Interrupted(String),
    #[error("pipeline entry: {0}")]
    Entry(String),
}
