// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Native driver — tasks as host processes, no container runtime.
//!
//! Each task runs as a plain child process with an explicit environment
//! (nothing inherited) and a per-task working directory under the driver
//! root. Mounts become symlinks from the task directory into per-namespace
//! volume directories. Image, user identity, and the privileged flag have
//! no host-process equivalent; they are logged as unsupported and ignored.
//!
//! Reattachment only works within one process lifetime: the container map
//! dies with the driver, so a resumed run gets `ContainerNotFound` and
//! falls back to fresh execution.

use crate::registry::DriverInit;
use crate::{backoff, naming, Container, Driver, DriverError, LogSink, Volume};
use async_trait::async_trait;
use kiln_core::{sanitize_name, ContainerStatus, TaskSpec};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

const NAME_CEILING: usize = 128;
const LOG_CHUNK: usize = 4096;

/// Driver that runs tasks as host processes.
pub struct NativeDriver {
    namespace: String,
    root: PathBuf,
    containers: Mutex<HashMap<String, Arc<NativeContainer>>>,
    by_task: Mutex<HashMap<String, String>>,
}

impl NativeDriver {
    pub fn new(init: DriverInit) -> Result<Self, DriverError> {
        let root = match init.params.get("root") {
            Some(dir) => PathBuf::from(dir),
            None => std::env::temp_dir().join(format!("kiln-{}", init.namespace)),
        };
        std::fs::create_dir_all(&root)?;
        Ok(Self {
            namespace: init.namespace,
            root,
            containers: Mutex::new(HashMap::new()),
            by_task: Mutex::new(HashMap::new()),
        })
    }

    fn volume_dir(&self, name: &str) -> PathBuf {
        self.root.join("volumes").join(sanitize_name(name, NAME_CEILING))
    }
}

#[async_trait]
impl Driver for NativeDriver {
    fn name(&self) -> &'static str {
        "native"
    }

    fn namespace(&self) -> &str {
        &self.namespace
    }

    async fn run_container(
        &self,
        ctx: &CancellationToken,
        task: TaskSpec,
    ) -> Result<Arc<dyn Container>, DriverError> {
        if ctx.is_cancelled() {
            return Err(DriverError::Cancelled);
        }
        if let Some(id) = self.by_task.lock().get(&task.id) {
            if let Some(existing) = self.containers.lock().get(id) {
                return Ok(existing.clone() as Arc<dyn Container>);
            }
        }

        if !task.image.is_empty() {
            tracing::debug!(image = %task.image, "native driver ignores images");
        }
        if task.user.is_some() || task.privileged {
            tracing::debug!("native driver ignores user identity and privileged flag");
        }

        let id = naming::container_name(&self.namespace, &task.name, &task.id, NAME_CEILING);
        let workdir = self.root.join("tasks").join(&id);
        tokio::fs::create_dir_all(&workdir).await?;

        // Materialize mounts as symlinks into the namespace volume dirs.
        for mount in &task.mounts {
            let target = self.volume_dir(&mount.volume);
            tokio::fs::create_dir_all(&target).await?;
            let link = workdir.join(mount.path.trim_start_matches('/'));
            if let Some(parent) = link.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            match tokio::fs::symlink(&target, &link).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {}
                Err(e) => return Err(e.into()),
            }
        }

        let container =
            Arc::new(NativeContainer::spawn(&id, workdir, &task).await?);
        self.by_task.lock().insert(task.id.clone(), id.clone());
        self.containers.lock().insert(id.clone(), container.clone());
        tracing::info!(container = %id, "native task started");
        Ok(container as Arc<dyn Container>)
    }

    async fn create_volume(
        &self,
        _ctx: &CancellationToken,
        name: &str,
        _size_bytes: u64,
    ) -> Result<Arc<dyn Volume>, DriverError> {
        let dir = self.volume_dir(name);
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Arc::new(NativeVolume { name: name.to_string(), dir }) as Arc<dyn Volume>)
    }

    async fn get_container(
        &self,
        _ctx: &CancellationToken,
        id: &str,
    ) -> Result<Arc<dyn Container>, DriverError> {
        self.containers
            .lock()
            .get(id)
            .cloned()
            .map(|c| c as Arc<dyn Container>)
            .ok_or_else(|| DriverError::ContainerNotFound(id.to_string()))
    }

    async fn close(&self, ctx: &CancellationToken) -> Result<(), DriverError> {
        let containers: Vec<_> = self.containers.lock().values().cloned().collect();
        let mut first_err = None;
        for container in containers {
            if let Err(e) = container.cleanup(ctx).await {
                tracing::warn!(container = %container.id(), error = %e, "cleanup failed");
                first_err.get_or_insert(e);
            }
        }

        let root = self.root.clone();
        let removed = backoff::retry(backoff::MAX_ATTEMPTS, backoff::INITIAL_DELAY, || {
            let root = root.clone();
            async move {
                match tokio::fs::remove_dir_all(&root).await {
                    Ok(()) => Ok(()),
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                    Err(e) => Err(DriverError::from(e)),
                }
            }
        })
        .await;
        if let Err(e) = removed {
            tracing::warn!(root = %self.root.display(), error = %e, "failed to remove driver root");
            first_err.get_or_insert(e);
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Shared run state between the handle and the pump/wait tasks.
struct ProcState {
    stdout: Mutex<Vec<u8>>,
    stderr: Mutex<Vec<u8>>,
    done: AtomicBool,
    exit_code: AtomicI64,
    progress: Notify,
    child: tokio::sync::Mutex<Option<tokio::process::Child>>,
}

/// One host process behind the container contract.
pub struct NativeContainer {
    id: String,
    workdir: PathBuf,
    state: Arc<ProcState>,
    cleaned: AtomicBool,
}

impl NativeContainer {
    async fn spawn(id: &str, workdir: PathBuf, task: &TaskSpec) -> Result<Self, DriverError> {
        let Some((program, args)) = task.command.split_first() else {
            return Err(DriverError::Config(format!("task {:?} has an empty command", task.name)));
        };
        let cwd = match task.cwd.as_deref() {
            Some(dir) if Path::new(dir).is_absolute() => PathBuf::from(dir),
            _ => workdir.clone(),
        };

        let mut cmd = tokio::process::Command::new(resolve_program(program));
        cmd.args(args)
            .env_clear()
            .envs(task.env.iter())
            .current_dir(&cwd)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(if task.stdin.is_some() { Stdio::piped() } else { Stdio::null() })
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| {
            DriverError::Backend(format!("failed to spawn {:?}: {}", program, e))
        })?;

        let state = Arc::new(ProcState {
            stdout: Mutex::new(Vec::new()),
            stderr: Mutex::new(Vec::new()),
            done: AtomicBool::new(false),
            exit_code: AtomicI64::new(-1),
            progress: Notify::new(),
            child: tokio::sync::Mutex::new(None),
        });

        if let Some(bytes) = task.stdin.clone() {
            if let Some(mut stdin) = child.stdin.take() {
                tokio::spawn(async move {
                    let _ = stdin.write_all(&bytes).await;
                    let _ = stdin.shutdown().await;
                });
            }
        }

        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(pump(stdout, state.clone(), StreamKind::Stdout));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(pump(stderr, state.clone(), StreamKind::Stderr));
        }

        *state.child.lock().await = Some(child);
        tokio::spawn(wait_for_exit(state.clone()));

        Ok(Self {
            id: id.to_string(),
            workdir,
            state,
            cleaned: AtomicBool::new(false),
        })
    }
}

enum StreamKind {
    Stdout,
    Stderr,
}

async fn pump(
    mut reader: impl tokio::io::AsyncRead + Unpin,
    state: Arc<ProcState>,
    kind: StreamKind,
) {
    let mut chunk = [0u8; LOG_CHUNK];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                match kind {
                    StreamKind::Stdout => state.stdout.lock().extend_from_slice(&chunk[..n]),
                    StreamKind::Stderr => state.stderr.lock().extend_from_slice(&chunk[..n]),
                }
                state.progress.notify_waiters();
            }
        }
    }
    state.progress.notify_waiters();
}

/// Poll the child until it exits, then publish the code.
///
/// Polling (rather than an owning `wait`) keeps the child reachable for
/// `cleanup`'s kill without an extra channel.
async fn wait_for_exit(state: Arc<ProcState>) {
    loop {
        {
            let mut guard = state.child.lock().await;
            if let Some(child) = guard.as_mut() {
                match child.try_wait() {
                    Ok(Some(status)) => {
                        // Killed-by-signal has no code; report -1 like a crash.
                        state.exit_code.store(status.code().unwrap_or(-1) as i64, Ordering::SeqCst);
                        state.done.store(true, Ordering::SeqCst);
                        guard.take();
                        state.progress.notify_waiters();
                        return;
                    }
                    Ok(None) => {}
                    Err(e) => {
                        tracing::warn!(error = %e, "wait on native task failed");
                        state.exit_code.store(-1, Ordering::SeqCst);
                        state.done.store(true, Ordering::SeqCst);
                        guard.take();
                        state.progress.notify_waiters();
                        return;
                    }
                }
            } else {
                return;
            }
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

#[async_trait]
impl Container for NativeContainer {
    fn id(&self) -> &str {
        &self.id
    }

    async fn status(&self, ctx: &CancellationToken) -> Result<ContainerStatus, DriverError> {
        if ctx.is_cancelled() {
            return Err(DriverError::Cancelled);
        }
        if self.state.done.load(Ordering::SeqCst) {
            Ok(ContainerStatus::exited(self.state.exit_code.load(Ordering::SeqCst)))
        } else {
            Ok(ContainerStatus::running())
        }
    }

    async fn logs(
        &self,
        ctx: &CancellationToken,
        mut stdout: LogSink,
        mut stderr: LogSink,
        follow: bool,
    ) -> Result<(), DriverError> {
        if !follow {
            let out = self.state.stdout.lock().clone();
            let err = self.state.stderr.lock().clone();
            stdout.write_all(&out).await?;
            stdout.shutdown().await?;
            stderr.write_all(&err).await?;
            stderr.shutdown().await?;
            return Ok(());
        }

        let mut out_off = 0usize;
        let mut err_off = 0usize;
        loop {
            let out_new = {
                let buf = self.state.stdout.lock();
                buf[out_off.min(buf.len())..].to_vec()
            };
            if !out_new.is_empty() {
                out_off += out_new.len();
                stdout.write_all(&out_new).await?;
                stdout.flush().await?;
            }
            let err_new = {
                let buf = self.state.stderr.lock();
                buf[err_off.min(buf.len())..].to_vec()
            };
            if !err_new.is_empty() {
                err_off += err_new.len();
                stderr.write_all(&err_new).await?;
                stderr.flush().await?;
            }

            let drained = self.state.done.load(Ordering::SeqCst)
                && out_off == self.state.stdout.lock().len()
                && err_off == self.state.stderr.lock().len();
            if drained || ctx.is_cancelled() {
                break;
            }

            tokio::select! {
                _ = ctx.cancelled() => break,
                _ = self.state.progress.notified() => {}
                _ = tokio::time::sleep(Duration::from_millis(20)) => {}
            }
        }
        stdout.shutdown().await?;
        stderr.shutdown().await?;
        Ok(())
    }

    async fn cleanup(&self, _ctx: &CancellationToken) -> Result<(), DriverError> {
        if self.cleaned.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        if let Some(child) = self.state.child.lock().await.as_mut() {
            let _ = child.start_kill();
        }
        match tokio::fs::remove_dir_all(&self.workdir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Volume backed by a plain host directory.
pub struct NativeVolume {
    name: String,
    dir: PathBuf,
}

#[async_trait]
impl Volume for NativeVolume {
    fn name(&self) -> &str {
        &self.name
    }

    fn path(&self) -> Option<PathBuf> {
        Some(self.dir.clone())
    }

    async fn cleanup(&self, _ctx: &CancellationToken) -> Result<(), DriverError> {
        match tokio::fs::remove_dir_all(&self.dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Resolve a bare program name against the parent's `PATH`.
///
/// The child environment is explicit (nothing inherited), so spawning
/// `echo` with an empty env must not depend on the child resolving it.
fn resolve_program(program: &str) -> PathBuf {
    if program.contains('/') {
        return PathBuf::from(program);
    }
    if let Some(path) = std::env::var_os("PATH") {
        for dir in std::env::split_paths(&path) {
            let candidate = dir.join(program);
            if candidate.is_file() {
                return candidate;
            }
        }
    }
    PathBuf::from(program)
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
