// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Promises and the outstanding-task counter.
//!
//! A [`Promise`] is a shared one-shot cell. Worker tasks complete it from
//! any thread; the interpreter — the only consumer — awaits it at `await`
//! expressions. This is the Rust rendition of the continuation-queue
//! bridge: "post a continuation to the VM thread" becomes "complete the
//! cell the single interpreter task is awaiting".
//!
//! [`PendingTasks`] counts in-flight workers so the host can drain them
//! all before tearing the driver down, whether or not the script awaited
//! every promise it was handed.

use crate::value::Value;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

enum State {
    Pending,
    Resolved(Value),
    Rejected(Value),
}

struct Inner {
    state: Mutex<State>,
    notify: Notify,
}

/// Shared one-shot result cell.
#[derive(Clone)]
pub struct Promise {
    inner: Arc<Inner>,
}

impl Promise {
    pub fn new() -> Self {
        Self { inner: Arc::new(Inner { state: Mutex::new(State::Pending), notify: Notify::new() }) }
    }

    pub fn resolved(value: Value) -> Self {
        let p = Self::new();
        p.resolve(value);
        p
    }

    pub fn rejected(value: Value) -> Self {
        let p = Self::new();
        p.reject(value);
        p
    }

    /// Settle as resolved. Later settlements are ignored.
    pub fn resolve(&self, value: Value) {
        let mut state = self.inner.state.lock();
        if matches!(*state, State::Pending) {
            *state = State::Resolved(value);
            self.inner.notify.notify_waiters();
        }
    }

    /// Settle as rejected. Later settlements are ignored.
    pub fn reject(&self, value: Value) {
        let mut state = self.inner.state.lock();
        if matches!(*state, State::Pending) {
            *state = State::Rejected(value);
            self.inner.notify.notify_waiters();
        }
    }

    /// Wait for settlement. `Err` carries the rejection value.
    pub async fn wait(&self) -> Result<Value, Value> {
        loop {
            let notified = self.inner.notify.notified();
            {
                let state = self.inner.state.lock();
                match &*state {
                    State::Resolved(v) => return Ok(v.clone()),
                    State::Rejected(v) => return Err(v.clone()),
                    State::Pending => {}
                }
            }
            notified.await;
        }
    }
}

impl Default for Promise {
    fn default() -> Self {
        Self::new()
    }
}

/// Counter of spawned-but-unfinished workers.
#[derive(Clone, Default)]
pub struct PendingTasks {
    inner: Arc<PendingInner>,
}

#[derive(Default)]
struct PendingInner {
    count: AtomicUsize,
    notify: Notify,
}

impl PendingTasks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> usize {
        self.inner.count.load(Ordering::SeqCst)
    }

    /// Track one worker; the guard decrements on drop.
    pub fn track(&self) -> PendingGuard {
        self.inner.count.fetch_add(1, Ordering::SeqCst);
        PendingGuard { inner: self.inner.clone() }
    }

    /// Wait until every tracked worker has finished.
    pub async fn drained(&self) {
        loop {
            let notified = self.inner.notify.notified();
            if self.inner.count.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// Drop guard for one in-flight worker.
pub struct PendingGuard {
    inner: Arc<PendingInner>,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.inner.count.fetch_sub(1, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }
}
