// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Docker driver — daemon-style backend driven through the `docker` CLI.
//!
//! Every container and volume carries `kiln.namespace` / `kiln.task-id`
//! labels; `close` removes by label, and `run_container` reuses an
//! existing container when a previously-seen task ID shows up (the name
//! is deterministic, so a daemon-side conflict means "already created").
//!
//! Stdin is attached at start time: the container is created with `-i`
//! and started attached, with the bytes piped in before the entrypoint
//! reads — matching the daemon's attach-then-start ordering.

use crate::registry::DriverInit;
use crate::{backoff, naming, Container, Driver, DriverError, LogSink, Volume};
use async_trait::async_trait;
use kiln_core::{ContainerStatus, TaskSpec};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

/// Driver against a Docker-compatible daemon.
pub struct DockerDriver {
    namespace: String,
    host: Option<String>,
    containers: Mutex<HashMap<String, Arc<DockerContainer>>>,
    volumes: Mutex<HashMap<String, Arc<DockerVolume>>>,
}

impl DockerDriver {
    pub fn new(init: DriverInit) -> Result<Self, DriverError> {
        Ok(Self {
            namespace: init.namespace,
            host: init.params.get("host"),
            containers: Mutex::new(HashMap::new()),
            volumes: Mutex::new(HashMap::new()),
        })
    }

    fn namespace_label(&self) -> String {
        format!("kiln.namespace={}", self.namespace)
    }

    fn task_label(task_id: &str) -> String {
        format!("kiln.task-id={}", task_id)
    }
}

#[async_trait]
impl Driver for DockerDriver {
    fn name(&self) -> &'static str {
        "docker"
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
        if let Some(existing) = self.containers.lock().get(&task.id) {
            return Ok(existing.clone() as Arc<dyn Container>);
        }

        let name =
            naming::container_name(&self.namespace, &task.name, &task.id, naming::BACKEND_NAME_CEILING);

        // A container from an earlier run (or a concurrent call) may already
        // exist for this task — reuse it instead of fighting the daemon.
        let existing = run_docker(
            &self.host,
            &[
                "ps",
                "-aq",
                "--filter",
                &format!("label={}", self.namespace_label()),
                "--filter",
                &format!("label={}", Self::task_label(&task.id)),
            ],
        )
        .await?;
        if !existing.trim().is_empty() {
            tracing::info!(container = %name, "reusing existing container for task");
            let handle = Arc::new(DockerContainer::new(&name, self.host.clone()));
            self.containers.lock().insert(task.id.clone(), handle.clone());
            return Ok(handle as Arc<dyn Container>);
        }

        if let Err(e) = run_docker(&self.host, &["pull", &task.image]).await {
            // A locally-built image is fine; create will fail if it truly
            // doesn't exist.
            tracing::warn!(image = %task.image, error = %e, "image pull failed");
        }

        let ns_label = self.namespace_label();
        let task_label = Self::task_label(&task.id);
        let mut args: Vec<String> = vec![
            "create".into(),
            "--name".into(),
            name.clone(),
            "--label".into(),
            ns_label,
            "--label".into(),
            task_label,
        ];
        for (k, v) in &task.env {
            args.push("-e".into());
            args.push(format!("{}={}", k, v));
        }
        if let Some(cwd) = &task.cwd {
            args.push("-w".into());
            args.push(cwd.clone());
        }
        if let Some(user) = task.user {
            args.push("-u".into());
            args.push(user.to_string());
        }
        if task.privileged {
            args.push("--privileged".into());
        }
        if let Some(shares) = task.cpu_shares {
            args.push("--cpu-shares".into());
            args.push(shares.to_string());
        }
        if let Some(memory) = task.memory_bytes {
            args.push("-m".into());
            args.push(memory.to_string());
        }
        for mount in &task.mounts {
            let volume =
                naming::volume_name(&self.namespace, &mount.volume, naming::BACKEND_NAME_CEILING);
            args.push("-v".into());
            args.push(format!("{}:{}", volume, mount.path));
        }
        if task.stdin.is_some() {
            args.push("-i".into());
        }
        args.push(task.image.clone());
        args.extend(task.command.iter().cloned());

        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        run_docker(&self.host, &arg_refs).await?;

        match task.stdin {
            Some(bytes) => start_attached(&self.host, &name, bytes).await?,
            None => {
                run_docker(&self.host, &["start", &name]).await?;
            }
        }

        tracing::info!(container = %name, image = %task.image, "container started");
        let handle = Arc::new(DockerContainer::new(&name, self.host.clone()));
        self.containers.lock().insert(task.id.clone(), handle.clone());
        Ok(handle as Arc<dyn Container>)
    }

    async fn create_volume(
        &self,
        _ctx: &CancellationToken,
        name: &str,
        _size_bytes: u64,
    ) -> Result<Arc<dyn Volume>, DriverError> {
        if let Some(existing) = self.volumes.lock().get(name) {
            return Ok(existing.clone() as Arc<dyn Volume>);
        }

        let backend_name =
            naming::volume_name(&self.namespace, name, naming::BACKEND_NAME_CEILING);
        run_docker(
            &self.host,
            &["volume", "create", "--label", &self.namespace_label(), &backend_name],
        )
        .await?;
        let mountpoint = run_docker(
            &self.host,
            &["volume", "inspect", "-f", "{{.Mountpoint}}", &backend_name],
        )
        .await
        .ok()
        .map(|s| PathBuf::from(s.trim()));

        let volume = Arc::new(DockerVolume {
            name: name.to_string(),
            backend_name,
            host: self.host.clone(),
            mountpoint,
        });
        self.volumes.lock().insert(name.to_string(), volume.clone());
        Ok(volume as Arc<dyn Volume>)
    }

    async fn get_container(
        &self,
        _ctx: &CancellationToken,
        id: &str,
    ) -> Result<Arc<dyn Container>, DriverError> {
        match run_docker(&self.host, &["inspect", "-f", "{{.Id}}", id]).await {
            Ok(_) => Ok(Arc::new(DockerContainer::new(id, self.host.clone())) as Arc<dyn Container>),
            Err(DriverError::Backend(msg)) if msg.contains("No such") => {
                Err(DriverError::ContainerNotFound(id.to_string()))
            }
            Err(e) => Err(e),
        }
    }

    async fn close(&self, _ctx: &CancellationToken) -> Result<(), DriverError> {
        let mut first_err = None;

        let label = format!("label={}", self.namespace_label());
        let containers =
            run_docker(&self.host, &["ps", "-aq", "--filter", &label]).await.unwrap_or_default();
        for id in containers.split_whitespace() {
            let host = self.host.clone();
            let result = backoff::retry(backoff::MAX_ATTEMPTS, backoff::INITIAL_DELAY, || {
                let host = host.clone();
                async move { run_docker(&host, &["rm", "-f", id]).await }
            })
            .await;
            if let Err(e) = result {
                tracing::warn!(container = %id, error = %e, "failed to remove container");
                first_err.get_or_insert(e);
            }
        }

        let volumes = run_docker(&self.host, &["volume", "ls", "-q", "--filter", &label])
            .await
            .unwrap_or_default();
        for name in volumes.split_whitespace() {
            let host = self.host.clone();
            let result = backoff::retry(backoff::MAX_ATTEMPTS, backoff::INITIAL_DELAY, || {
                let host = host.clone();
                async move { run_docker(&host, &["volume", "rm", "-f", name]).await }
            })
            .await;
            if let Err(e) = result {
                tracing::warn!(volume = %name, error = %e, "failed to remove volume");
                first_err.get_or_insert(e);
            }
        }

        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Handle to one daemon-side container, addressed by deterministic name.
pub struct DockerContainer {
    name: String,
    host: Option<String>,
    cleaned: AtomicBool,
}

impl DockerContainer {
    fn new(name: &str, host: Option<String>) -> Self {
        Self { name: name.to_string(), host, cleaned: AtomicBool::new(false) }
    }
}

#[async_trait]
impl Container for DockerContainer {
    fn id(&self) -> &str {
        &self.name
    }

    async fn status(&self, ctx: &CancellationToken) -> Result<ContainerStatus, DriverError> {
        if ctx.is_cancelled() {
            return Err(DriverError::Cancelled);
        }
        let raw = run_docker(
            &self.host,
            &["inspect", "-f", "{{.State.Status}} {{.State.ExitCode}}", &self.name],
        )
        .await?;
        Ok(parse_inspect_state(&raw))
    }

    async fn logs(
        &self,
        ctx: &CancellationToken,
        mut stdout: LogSink,
        mut stderr: LogSink,
        follow: bool,
    ) -> Result<(), DriverError> {
        let mut cmd = docker_command(&self.host);
        cmd.arg("logs");
        if follow {
            cmd.arg("-f");
        }
        cmd.arg(&self.name).stdout(Stdio::piped()).stderr(Stdio::piped()).kill_on_drop(true);

        let mut child = cmd.spawn()?;
        let mut child_out = child.stdout.take();
        let mut child_err = child.stderr.take();

        let copy = async {
            let out = async {
                if let Some(src) = child_out.as_mut() {
                    tokio::io::copy(src, &mut stdout).await?;
                }
                stdout.shutdown().await
            };
            let err = async {
                if let Some(src) = child_err.as_mut() {
                    tokio::io::copy(src, &mut stderr).await?;
                }
                stderr.shutdown().await
            };
            tokio::try_join!(out, err)
        };

        tokio::select! {
            result = copy => {
                result?;
                // `docker logs` exits on its own; reap it.
                let _ = child.wait().await;
                Ok(())
            }
            _ = ctx.cancelled() => {
                let _ = child.start_kill();
                let _ = child.wait().await;
                Ok(())
            }
        }
    }

    async fn cleanup(&self, _ctx: &CancellationToken) -> Result<(), DriverError> {
        if self.cleaned.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        match run_docker(&self.host, &["rm", "-f", &self.name]).await {
            Ok(_) => Ok(()),
            Err(DriverError::Backend(msg)) if msg.contains("No such") => Ok(()),
            Err(e) => Err(e),
        }
    }
}

/// Named daemon-side volume.
pub struct DockerVolume {
    name: String,
    backend_name: String,
    host: Option<String>,
    mountpoint: Option<PathBuf>,
}

#[async_trait]
impl Volume for DockerVolume {
    fn name(&self) -> &str {
        &self.name
    }

    fn path(&self) -> Option<PathBuf> {
        self.mountpoint.clone()
    }

    async fn cleanup(&self, _ctx: &CancellationToken) -> Result<(), DriverError> {
        match run_docker(&self.host, &["volume", "rm", "-f", &self.backend_name]).await {
            Ok(_) => Ok(()),
            Err(DriverError::Backend(msg)) if msg.contains("No such") => Ok(()),
            Err(e) => Err(e),
        }
    }
}

/// Parse `docker inspect -f '{{.State.Status}} {{.State.ExitCode}}'` output.
fn parse_inspect_state(raw: &str) -> ContainerStatus {
    let mut parts = raw.split_whitespace();
    let state = parts.next().unwrap_or_default();
    let code: i64 = parts.next().and_then(|c| c.parse().ok()).unwrap_or(-1);
    match state {
        "exited" | "dead" => ContainerStatus::exited(code),
        _ => ContainerStatus::running(),
    }
}

fn docker_command(host: &Option<String>) -> tokio::process::Command {
    let mut cmd = tokio::process::Command::new("docker");
    if let Some(host) = host {
        cmd.env("DOCKER_HOST", host);
    }
    cmd
}

/// Run a docker CLI command and return stdout on success.
async fn run_docker(host: &Option<String>, args: &[&str]) -> Result<String, DriverError> {
    let output = docker_command(host)
        .args(args)
        .output()
        .await
        .map_err(|e| DriverError::Backend(format!("failed to exec docker: {}", e)))?;

    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(DriverError::Backend(format!(
            "docker {} failed: {}",
            args.first().unwrap_or(&""),
            stderr.trim()
        )))
    }
}

/// Start a created container attached, feeding `bytes` on stdin.
///
/// The attach happens as part of start, so the bytes are available before
/// the entrypoint reads. The attached child is reaped in the background;
/// its output is ignored — logs flow through `docker logs`.
async fn start_attached(
    host: &Option<String>,
    name: &str,
    bytes: Vec<u8>,
) -> Result<(), DriverError> {
    let mut child = docker_command(host)
        .args(["start", "-a", "-i", name])
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| DriverError::Backend(format!("failed to exec docker start: {}", e)))?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin.write_all(&bytes).await?;
        stdin.shutdown().await?;
    }
    tokio::spawn(async move {
        let _ = child.wait().await;
    });
    Ok(())
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
