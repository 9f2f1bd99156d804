// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! QEMU microvm driver — tasks as guest processes behind the guest agent.
//!
//! # Module layout
//!
//! - [`qga`] — guest agent JSON client
//!
//! The guest VM boots lazily, once per driver instance, on the first
//! operation that needs it. Volumes are host directories shared into the
//! guest over virtfs (9p) and bind-mounted to the requested in-guest
//! paths. Commands run through `guest-exec` with captured output; the
//! agent forgets a process after its first exited status report, so the
//! terminal result is cached driver-side to keep exit codes stable.
//!
//! With `accel=hvf` this same driver covers the macOS virtualization
//! sandbox; the contract is identical.

mod qga;

use crate::registry::DriverInit;
use crate::{backoff, naming, Container, Driver, DriverError, LogSink, Volume};
use async_trait::async_trait;
use kiln_core::{sanitize_name, ContainerStatus, TaskSpec};
use parking_lot::Mutex;
use qga::{GuestExecStatus, QgaClient};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

const NAME_CEILING: usize = 128;
const BOOT_ATTEMPTS: usize = 120;
const BOOT_INTERVAL: Duration = Duration::from_millis(500);
/// Guest-side mount point for the virtfs share.
const GUEST_SHARE: &str = "/mnt/kiln";
const SHARE_TAG: &str = "kiln0";

/// Driver that runs tasks inside a QEMU guest via the guest agent.
pub struct QemuDriver {
    namespace: String,
    memory_mb: u64,
    cpus: u64,
    accel: String,
    image: Option<String>,
    qemu_bin: String,
    cache_dir: PathBuf,
    guest: tokio::sync::OnceCell<Arc<Guest>>,
    by_task: Mutex<HashMap<String, Arc<QemuContainer>>>,
    containers: Mutex<HashMap<String, Arc<QemuContainer>>>,
}

/// The booted VM: QGA connection plus the qemu process itself.
struct Guest {
    qga: tokio::sync::Mutex<QgaClient>,
    child: tokio::sync::Mutex<Option<tokio::process::Child>>,
    share_dir: PathBuf,
}

impl Guest {
    /// Run a guest command to completion and return its terminal status.
    async fn exec_and_wait(
        &self,
        ctx: &CancellationToken,
        path: &str,
        args: &[String],
    ) -> Result<GuestExecStatus, DriverError> {
        let pid = self.qga.lock().await.exec(path, args, &[], None).await?;
        loop {
            if ctx.is_cancelled() {
                return Err(DriverError::Cancelled);
            }
            let status = self.qga.lock().await.exec_status(pid).await?;
            if status.exited {
                return Ok(status);
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }
}

impl QemuDriver {
    pub fn new(init: DriverInit) -> Result<Self, DriverError> {
        let cache_dir = match init.params.get("cache_dir") {
            Some(dir) => PathBuf::from(dir),
            None => std::env::temp_dir().join(format!("kiln-qemu-{}", init.namespace)),
        };
        std::fs::create_dir_all(&cache_dir)?;
        Ok(Self {
            namespace: init.namespace,
            memory_mb: init.params.get_u64_or("memory", 2048),
            cpus: init.params.get_u64_or("cpus", 2),
            accel: init.params.get_or("accel", "kvm"),
            image: init.params.get("image"),
            qemu_bin: init.params.get_or("qemu_bin", "qemu-system-x86_64"),
            cache_dir,
            guest: tokio::sync::OnceCell::new(),
            by_task: Mutex::new(HashMap::new()),
            containers: Mutex::new(HashMap::new()),
        })
    }

    fn share_dir(&self) -> PathBuf {
        self.cache_dir.join("share")
    }

    fn volume_host_dir(&self, name: &str) -> PathBuf {
        self.share_dir().join("volumes").join(sanitize_name(name, NAME_CEILING))
    }

    fn volume_guest_dir(name: &str) -> String {
        format!("{}/volumes/{}", GUEST_SHARE, sanitize_name(name, NAME_CEILING))
    }

    /// Boot the guest once; later callers share the same VM.
    async fn guest(&self, ctx: &CancellationToken) -> Result<Arc<Guest>, DriverError> {
        self.guest
            .get_or_try_init(|| self.boot(ctx))
            .await
            .cloned()
    }

    async fn boot(&self, ctx: &CancellationToken) -> Result<Arc<Guest>, DriverError> {
        let image = self.image.clone().ok_or_else(|| {
            DriverError::Config("qemu driver requires an image=<disk image> param".to_string())
        })?;
        let share_dir = self.share_dir();
        tokio::fs::create_dir_all(share_dir.join("volumes")).await?;
        let socket = self.cache_dir.join("qga.sock");
        let _ = tokio::fs::remove_file(&socket).await;

        tracing::info!(
            image = %image,
            memory_mb = self.memory_mb,
            cpus = self.cpus,
            accel = %self.accel,
            "booting guest vm"
        );

        let args: Vec<String> = vec![
            "-m".to_string(),
            self.memory_mb.to_string(),
            "-smp".to_string(),
            self.cpus.to_string(),
            "-accel".to_string(),
            self.accel.clone(),
            "-drive".to_string(),
            format!("file={},if=virtio", image),
            "-snapshot".to_string(),
            "-chardev".to_string(),
            format!("socket,id=qga0,path={},server=on,wait=off", socket.display()),
            "-device".to_string(),
            "virtio-serial".to_string(),
            "-device".to_string(),
            "virtserialport,chardev=qga0,name=org.qemu.guest_agent.0".to_string(),
            "-virtfs".to_string(),
            format!(
                "local,path={},mount_tag={},security_model=mapped-xattr",
                share_dir.display(),
                SHARE_TAG
            ),
            "-display".to_string(),
            "none".to_string(),
        ];
        let child = tokio::process::Command::new(&self.qemu_bin)
            .args(&args)
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| DriverError::Backend(format!("failed to spawn {}: {}", self.qemu_bin, e)))?;

        // Wait for the agent to come up inside the guest.
        let mut qga = None;
        for attempt in 0..BOOT_ATTEMPTS {
            if ctx.is_cancelled() {
                return Err(DriverError::Cancelled);
            }
            if attempt > 0 {
                tokio::time::sleep(BOOT_INTERVAL).await;
            }
            if let Ok(mut client) = QgaClient::connect(&socket).await {
                if client.ping().await.is_ok() {
                    tracing::info!(attempt, "guest agent ready");
                    qga = Some(client);
                    break;
                }
            }
        }
        let qga = qga.ok_or_else(|| {
            DriverError::Backend(format!(
                "guest agent did not respond within {}s",
                BOOT_ATTEMPTS as u64 * BOOT_INTERVAL.as_millis() as u64 / 1000
            ))
        })?;

        let guest = Arc::new(Guest {
            qga: tokio::sync::Mutex::new(qga),
            child: tokio::sync::Mutex::new(Some(child)),
            share_dir,
        });

        // Mount the host share inside the guest.
        let mount = guest
            .exec_and_wait(
                ctx,
                "/bin/sh",
                &[
                    "-c".to_string(),
                    format!(
                        "mkdir -p {share} && mount -t 9p -o trans=virtio,version=9p2000.L {tag} {share}",
                        share = GUEST_SHARE,
                        tag = SHARE_TAG
                    ),
                ],
            )
            .await?;
        if mount.exit_code != 0 {
            return Err(DriverError::Backend(format!(
                "failed to mount guest share: {}",
                String::from_utf8_lossy(&mount.stderr)
            )));
        }

        Ok(guest)
    }
}

#[async_trait]
impl Driver for QemuDriver {
    fn name(&self) -> &'static str {
        "qemu"
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
        if let Some(existing) = self.by_task.lock().get(&task.id) {
            return Ok(existing.clone() as Arc<dyn Container>);
        }

        let guest = self.guest(ctx).await?;
        let id = naming::container_name(&self.namespace, &task.name, &task.id, NAME_CEILING);
        let task_dir = format!("/tmp/{}", id);

        // Task dir plus bind mounts from the share into the requested paths.
        let mut setup = format!("mkdir -p {}", task_dir);
        for mount in &task.mounts {
            tokio::fs::create_dir_all(self.volume_host_dir(&mount.volume)).await?;
            let target = format!("{}/{}", task_dir, mount.path.trim_start_matches('/'));
            setup.push_str(&format!(
                " && mkdir -p {target} && mount --bind {src} {target}",
                src = Self::volume_guest_dir(&mount.volume),
                target = target
            ));
        }
        let prepared = guest
            .exec_and_wait(ctx, "/bin/sh", &["-c".to_string(), setup])
            .await?;
        if prepared.exit_code != 0 {
            return Err(DriverError::Backend(format!(
                "guest task setup failed: {}",
                String::from_utf8_lossy(&prepared.stderr)
            )));
        }

        if !task.image.is_empty() {
            tracing::debug!(image = %task.image, "qemu driver runs the guest image, per-task images are ignored");
        }
        if task.user.is_some() || task.privileged {
            tracing::debug!("qemu driver ignores user identity and privileged flag");
        }

        let cwd = match task.cwd.as_deref() {
            Some(dir) if dir.starts_with('/') => dir.to_string(),
            _ => task_dir.clone(),
        };
        let Some((program, args)) = task.command.split_first() else {
            return Err(DriverError::Config(format!("task {:?} has an empty command", task.name)));
        };

        // guest-exec has no cwd argument; wrap in a shell that cds first.
        let mut sh_args = vec![
            "-c".to_string(),
            format!("cd {} && exec \"$@\"", cwd),
            "sh".to_string(),
            program.clone(),
        ];
        sh_args.extend(args.iter().cloned());
        let env: Vec<String> = task.env.iter().map(|(k, v)| format!("{}={}", k, v)).collect();

        let pid = guest
            .qga
            .lock()
            .await
            .exec("/bin/sh", &sh_args, &env, task.stdin.as_deref())
            .await?;
        tracing::info!(container = %id, pid, "guest task started");

        let container = Arc::new(QemuContainer {
            id: id.clone(),
            pid,
            guest,
            finished: Mutex::new(None),
        });
        self.by_task.lock().insert(task.id.clone(), container.clone());
        self.containers.lock().insert(id, container.clone());
        Ok(container as Arc<dyn Container>)
    }

    async fn create_volume(
        &self,
        _ctx: &CancellationToken,
        name: &str,
        _size_bytes: u64,
    ) -> Result<Arc<dyn Volume>, DriverError> {
        let dir = self.volume_host_dir(name);
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Arc::new(QemuVolume { name: name.to_string(), dir }) as Arc<dyn Volume>)
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

    async fn close(&self, _ctx: &CancellationToken) -> Result<(), DriverError> {
        if let Some(guest) = self.guest.get() {
            if let Some(mut child) = guest.child.lock().await.take() {
                let _ = child.start_kill();
                let _ = child.wait().await;
            }
        }

        let share = self.share_dir();
        backoff::retry(backoff::MAX_ATTEMPTS, backoff::INITIAL_DELAY, || {
            let share = share.clone();
            async move {
                match tokio::fs::remove_dir_all(&share).await {
                    Ok(()) => Ok(()),
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                    Err(e) => Err(DriverError::from(e)),
                }
            }
        })
        .await
    }
}

/// One guest process behind the container contract.
pub struct QemuContainer {
    id: String,
    pid: i64,
    guest: Arc<Guest>,
    /// Terminal result, cached because the agent forgets reaped processes.
    finished: Mutex<Option<GuestExecStatus>>,
}

impl QemuContainer {
    async fn poll(&self, ctx: &CancellationToken) -> Result<Option<GuestExecStatus>, DriverError> {
        if let Some(done) = self.finished.lock().clone() {
            return Ok(Some(done));
        }
        if ctx.is_cancelled() {
            return Err(DriverError::Cancelled);
        }
        let status = self.guest.qga.lock().await.exec_status(self.pid).await?;
        if status.exited {
            *self.finished.lock() = Some(status.clone());
            return Ok(Some(status));
        }
        Ok(None)
    }
}

#[async_trait]
impl Container for QemuContainer {
    fn id(&self) -> &str {
        &self.id
    }

    async fn status(&self, ctx: &CancellationToken) -> Result<ContainerStatus, DriverError> {
        match self.poll(ctx).await? {
            Some(done) => Ok(ContainerStatus::exited(done.exit_code)),
            None => Ok(ContainerStatus::running()),
        }
    }

    async fn logs(
        &self,
        ctx: &CancellationToken,
        mut stdout: LogSink,
        mut stderr: LogSink,
        follow: bool,
    ) -> Result<(), DriverError> {
        // The agent buffers captured output in the guest and releases it
        // with the terminal status; nothing is available before then.
        let done = if follow {
            loop {
                match self.poll(ctx).await? {
                    Some(done) => break Some(done),
                    None => {
                        tokio::select! {
                            _ = ctx.cancelled() => break None,
                            _ = tokio::time::sleep(Duration::from_millis(100)) => {}
                        }
                    }
                }
            }
        } else {
            self.poll(ctx).await?
        };

        if let Some(done) = done {
            stdout.write_all(&done.stdout).await?;
            stderr.write_all(&done.stderr).await?;
        }
        stdout.shutdown().await?;
        stderr.shutdown().await?;
        Ok(())
    }

    async fn cleanup(&self, ctx: &CancellationToken) -> Result<(), DriverError> {
        if self.finished.lock().is_some() {
            return Ok(());
        }
        // Best-effort kill of a still-running guest process.
        let result = self
            .guest
            .exec_and_wait(
                ctx,
                "/bin/sh",
                &["-c".to_string(), format!("kill -9 {} 2>/dev/null || true", self.pid)],
            )
            .await;
        if let Err(e) = result {
            tracing::warn!(container = %self.id, error = %e, "guest kill failed");
        }
        Ok(())
    }
}

/// Volume backed by a host directory shared into the guest via virtfs.
pub struct QemuVolume {
    name: String,
    dir: PathBuf,
}

#[async_trait]
impl Volume for QemuVolume {
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

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
