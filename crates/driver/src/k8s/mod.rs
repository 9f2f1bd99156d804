// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Kubernetes driver — tasks as Jobs, volumes as PVCs.
//!
//! # Module layout
//!
//! - [`job`] — Job and PVC spec construction
//!
//! Each task becomes a Job with `backoff_limit: 0` wrapping a single pod.
//! The Job name is deterministic, so creation conflicts mean the task is
//! already running and the existing Job is reused. Stdin attaches once the
//! pod reaches a running or succeeded phase (bounded wait, 30 s) — the
//! API server cannot attach to a pod that hasn't started.
//!
//! Log streams come back combined on the stdout sink, a known limitation
//! of the log subresource. The `split_streams` param opts into per-stream
//! queries (cluster feature gate `PodLogsQuerySplitStreams`) for
//! non-followed logs.

mod job;

use crate::registry::DriverInit;
use crate::{backoff, naming, Container, Driver, DriverError, LogSink, Volume};
use async_trait::async_trait;
use job::{JobParams, NAMESPACE_LABEL, TASK_CONTAINER};
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::{PersistentVolumeClaim, Pod};
use kiln_core::{ContainerStatus, TaskSpec};
use kube::api::{Api, AttachParams, DeleteParams, ListParams, LogParams, PostParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio_util::compat::FuturesAsyncReadCompatExt;
use tokio_util::sync::CancellationToken;

const POD_WAIT_ATTEMPTS: usize = 60;
const POD_WAIT_INTERVAL: Duration = Duration::from_millis(500);

/// Driver that schedules tasks as Kubernetes Jobs.
pub struct KubernetesDriver {
    namespace: String,
    k8s_namespace: String,
    client: Client,
    split_streams: bool,
    containers: Mutex<HashMap<String, Arc<JobContainer>>>,
    volumes: Mutex<HashMap<String, Arc<ClaimVolume>>>,
}

impl KubernetesDriver {
    /// Connect to the cluster, honoring the `kubeconfig` path override.
    pub async fn connect(init: DriverInit) -> Result<Self, DriverError> {
        let client = match init.params.get("kubeconfig") {
            Some(path) => {
                let kubeconfig = Kubeconfig::read_from(&path).map_err(|e| {
                    DriverError::Config(format!("failed to read kubeconfig {}: {}", path, e))
                })?;
                let config =
                    Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                        .await
                        .map_err(|e| {
                            DriverError::Config(format!("invalid kubeconfig {}: {}", path, e))
                        })?;
                Client::try_from(config)
                    .map_err(|e| DriverError::Config(format!("kube client: {}", e)))?
            }
            None => Client::try_default()
                .await
                .map_err(|e| DriverError::Config(format!("kube client: {}", e)))?,
        };
        Ok(Self {
            namespace: init.namespace,
            k8s_namespace: init.params.get_or("namespace", "default"),
            client,
            split_streams: matches!(
                init.params.get_or("split_streams", "false").as_str(),
                "1" | "true" | "yes"
            ),
            containers: Mutex::new(HashMap::new()),
            volumes: Mutex::new(HashMap::new()),
        })
    }

    fn jobs(&self) -> Api<Job> {
        Api::namespaced(self.client.clone(), &self.k8s_namespace)
    }

    fn pods(&self) -> Api<Pod> {
        Api::namespaced(self.client.clone(), &self.k8s_namespace)
    }

    fn claims(&self) -> Api<PersistentVolumeClaim> {
        Api::namespaced(self.client.clone(), &self.k8s_namespace)
    }

    fn handle(&self, job_name: &str) -> Arc<JobContainer> {
        Arc::new(JobContainer {
            job_name: job_name.to_string(),
            k8s_namespace: self.k8s_namespace.clone(),
            client: self.client.clone(),
            split_streams: self.split_streams,
            cleaned: AtomicBool::new(false),
        })
    }
}

#[async_trait]
impl Driver for KubernetesDriver {
    fn name(&self) -> &'static str {
        "k8s"
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

        // Mounted volumes must exist before the pod references them.
        let mut claim_names = Vec::with_capacity(task.mounts.len());
        for mount in &task.mounts {
            self.create_volume(ctx, &mount.volume, 0).await?;
            claim_names.push(naming::volume_name(
                &self.namespace,
                &mount.volume,
                naming::BACKEND_NAME_CEILING,
            ));
        }

        let job_name = naming::container_name(
            &self.namespace,
            &task.name,
            &task.id,
            naming::BACKEND_NAME_CEILING,
        );
        let spec = job::build_job(&JobParams {
            job_name: job_name.clone(),
            namespace: &self.namespace,
            k8s_namespace: &self.k8s_namespace,
            task: &task,
            claim_names,
        });

        match self.jobs().create(&PostParams::default(), &spec).await {
            Ok(_) => {
                tracing::info!(job = %job_name, image = %task.image, "job created");
            }
            Err(kube::Error::Api(ae)) if ae.code == 409 => {
                tracing::info!(job = %job_name, "job already exists, reusing");
            }
            Err(e) => return Err(DriverError::Backend(format!("job create failed: {}", e))),
        }

        let handle = self.handle(&job_name);
        if let Some(bytes) = task.stdin.clone() {
            handle.feed_stdin(ctx, bytes).await?;
        }

        self.containers.lock().insert(task.id.clone(), handle.clone());
        Ok(handle as Arc<dyn Container>)
    }

    async fn create_volume(
        &self,
        _ctx: &CancellationToken,
        name: &str,
        size_bytes: u64,
    ) -> Result<Arc<dyn Volume>, DriverError> {
        if let Some(existing) = self.volumes.lock().get(name) {
            return Ok(existing.clone() as Arc<dyn Volume>);
        }

        let claim_name = naming::volume_name(&self.namespace, name, naming::BACKEND_NAME_CEILING);
        let claim = job::build_claim(&claim_name, &self.namespace, &self.k8s_namespace, size_bytes);
        match self.claims().create(&PostParams::default(), &claim).await {
            Ok(_) => {}
            Err(kube::Error::Api(ae)) if ae.code == 409 => {}
            Err(e) => return Err(DriverError::Backend(format!("pvc create failed: {}", e))),
        }

        let volume = Arc::new(ClaimVolume {
            name: name.to_string(),
            claim_name,
            k8s_namespace: self.k8s_namespace.clone(),
            client: self.client.clone(),
        });
        self.volumes.lock().insert(name.to_string(), volume.clone());
        Ok(volume as Arc<dyn Volume>)
    }

    async fn get_container(
        &self,
        _ctx: &CancellationToken,
        id: &str,
    ) -> Result<Arc<dyn Container>, DriverError> {
        match self.jobs().get(id).await {
            Ok(_) => Ok(self.handle(id) as Arc<dyn Container>),
            Err(kube::Error::Api(ae)) if ae.code == 404 => {
                Err(DriverError::ContainerNotFound(id.to_string()))
            }
            Err(e) => Err(DriverError::Backend(format!("job lookup failed: {}", e))),
        }
    }

    async fn close(&self, _ctx: &CancellationToken) -> Result<(), DriverError> {
        let mut first_err: Option<DriverError> = None;
        let selector = format!("{}={}", NAMESPACE_LABEL, self.namespace);
        let lp = ListParams::default().labels(&selector);

        let jobs = self.jobs();
        match jobs.list(&lp).await {
            Ok(list) => {
                for item in list {
                    let Some(name) = item.metadata.name else { continue };
                    let result =
                        backoff::retry(backoff::MAX_ATTEMPTS, backoff::INITIAL_DELAY, || {
                            let jobs = jobs.clone();
                            let name = name.clone();
                            async move {
                                match jobs.delete(&name, &DeleteParams::background()).await {
                                    Ok(_) => Ok(()),
                                    Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(()),
                                    Err(e) => Err(DriverError::Backend(format!(
                                        "job delete failed: {}",
                                        e
                                    ))),
                                }
                            }
                        })
                        .await;
                    if let Err(e) = result {
                        tracing::warn!(job = %name, error = %e, "failed to delete job");
                        first_err.get_or_insert(e);
                    }
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to list jobs for cleanup");
                first_err.get_or_insert(DriverError::Backend(e.to_string()));
            }
        }

        let claims = self.claims();
        match claims.list(&lp).await {
            Ok(list) => {
                for item in list {
                    let Some(name) = item.metadata.name else { continue };
                    let result =
                        backoff::retry(backoff::MAX_ATTEMPTS, backoff::INITIAL_DELAY, || {
                            let claims = claims.clone();
                            let name = name.clone();
                            async move {
                                match claims.delete(&name, &DeleteParams::default()).await {
                                    Ok(_) => Ok(()),
                                    Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(()),
                                    Err(e) => Err(DriverError::Backend(format!(
                                        "pvc delete failed: {}",
                                        e
                                    ))),
                                }
                            }
                        })
                        .await;
                    if let Err(e) = result {
                        tracing::warn!(pvc = %name, error = %e, "failed to delete pvc");
                        first_err.get_or_insert(e);
                    }
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to list pvcs for cleanup");
                first_err.get_or_insert(DriverError::Backend(e.to_string()));
            }
        }

        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Handle to one Job and its single pod.
pub struct JobContainer {
    job_name: String,
    k8s_namespace: String,
    client: Client,
    split_streams: bool,
    cleaned: AtomicBool,
}

impl JobContainer {
    fn pods(&self) -> Api<Pod> {
        Api::namespaced(self.client.clone(), &self.k8s_namespace)
    }

    /// Find the Job's pod, if one has been scheduled yet.
    async fn find_pod(&self) -> Result<Option<Pod>, DriverError> {
        let lp = ListParams::default().labels(&format!("job-name={}", self.job_name));
        let pods = self
            .pods()
            .list(&lp)
            .await
            .map_err(|e| DriverError::Backend(format!("pod list failed: {}", e)))?;
        Ok(pods.items.into_iter().next())
    }

    /// Wait (bounded) for the pod to start, then stream stdin to it.
    async fn feed_stdin(&self, ctx: &CancellationToken, bytes: Vec<u8>) -> Result<(), DriverError> {
        let mut pod_name = None;
        for _ in 0..POD_WAIT_ATTEMPTS {
            if ctx.is_cancelled() {
                return Err(DriverError::Cancelled);
            }
            if let Some(pod) = self.find_pod().await? {
                let phase =
                    pod.status.as_ref().and_then(|s| s.phase.clone()).unwrap_or_default();
                if matches!(phase.as_str(), "Running" | "Succeeded") {
                    pod_name = pod.metadata.name;
                    break;
                }
            }
            tokio::time::sleep(POD_WAIT_INTERVAL).await;
        }
        let pod_name = pod_name.ok_or_else(|| {
            DriverError::Backend(format!(
                "pod for job {} did not start within {}s, cannot attach stdin",
                self.job_name,
                POD_WAIT_ATTEMPTS as u64 * POD_WAIT_INTERVAL.as_millis() as u64 / 1000
            ))
        })?;

        let ap = AttachParams::default()
            .stdin(true)
            .stdout(false)
            .stderr(false)
            .container(TASK_CONTAINER);
        let mut attached = self
            .pods()
            .attach(&pod_name, &ap)
            .await
            .map_err(|e| DriverError::Backend(format!("stdin attach failed: {}", e)))?;
        let mut stdin = attached
            .stdin()
            .ok_or_else(|| DriverError::Backend("attach returned no stdin stream".to_string()))?;
        stdin.write_all(&bytes).await?;
        stdin.shutdown().await?;
        drop(stdin);
        tokio::spawn(async move {
            let _ = attached.join().await;
        });
        Ok(())
    }

    /// Fetch one stream via the log subresource's `stream` query parameter.
    async fn fetch_stream(&self, stream: &str) -> Result<String, DriverError> {
        let path = format!(
            "/api/v1/namespaces/{}/pods/{}/log?container={}&stream={}",
            self.k8s_namespace,
            self.pod_name().await?,
            TASK_CONTAINER,
            stream,
        );
        let request = http::Request::get(path)
            .body(Vec::new())
            .map_err(|e| DriverError::Backend(format!("log request build failed: {}", e)))?;
        self.client
            .request_text(request)
            .await
            .map_err(|e| DriverError::Backend(format!("split-stream log fetch failed: {}", e)))
    }

    async fn pod_name(&self) -> Result<String, DriverError> {
        self.find_pod()
            .await?
            .and_then(|p| p.metadata.name)
            .ok_or_else(|| DriverError::Backend(format!("no pod for job {}", self.job_name)))
    }
}

#[async_trait]
impl Container for JobContainer {
    fn id(&self) -> &str {
        &self.job_name
    }

    async fn status(&self, ctx: &CancellationToken) -> Result<ContainerStatus, DriverError> {
        if ctx.is_cancelled() {
            return Err(DriverError::Cancelled);
        }
        let Some(pod) = self.find_pod().await? else {
            // Scheduled but no pod yet.
            return Ok(ContainerStatus::running());
        };
        let status = pod.status.unwrap_or_default();
        if let Some(cs) = status
            .container_statuses
            .as_ref()
            .and_then(|cs| cs.iter().find(|c| c.name == TASK_CONTAINER))
        {
            if let Some(term) = cs.state.as_ref().and_then(|s| s.terminated.as_ref()) {
                return Ok(ContainerStatus::exited(i64::from(term.exit_code)));
            }
        }
        match status.phase.as_deref() {
            Some("Succeeded") => Ok(ContainerStatus::exited(0)),
            Some("Failed") => Ok(ContainerStatus::exited(1)),
            _ => Ok(ContainerStatus::running()),
        }
    }

    async fn logs(
        &self,
        ctx: &CancellationToken,
        mut stdout: LogSink,
        mut stderr: LogSink,
        follow: bool,
    ) -> Result<(), DriverError> {
        if !follow && self.split_streams {
            let out = self.fetch_stream("Stdout").await?;
            let err = self.fetch_stream("Stderr").await?;
            stdout.write_all(out.as_bytes()).await?;
            stdout.shutdown().await?;
            stderr.write_all(err.as_bytes()).await?;
            stderr.shutdown().await?;
            return Ok(());
        }

        let pod_name = self.pod_name().await?;
        let lp = LogParams {
            container: Some(TASK_CONTAINER.to_string()),
            follow,
            ..Default::default()
        };

        if !follow {
            let text = self
                .pods()
                .logs(&pod_name, &lp)
                .await
                .map_err(|e| DriverError::Backend(format!("log fetch failed: {}", e)))?;
            // Combined stream: everything lands on stdout.
            stdout.write_all(text.as_bytes()).await?;
            stdout.shutdown().await?;
            stderr.shutdown().await?;
            return Ok(());
        }

        let stream = self
            .pods()
            .log_stream(&pod_name, &lp)
            .await
            .map_err(|e| DriverError::Backend(format!("log stream failed: {}", e)))?;
        let mut reader = Box::pin(BufReader::new(stream.compat()));

        tokio::select! {
            result = tokio::io::copy_buf(&mut reader, &mut stdout) => {
                result?;
            }
            _ = ctx.cancelled() => {}
        }
        stdout.shutdown().await?;
        stderr.shutdown().await?;
        Ok(())
    }

    async fn cleanup(&self, _ctx: &CancellationToken) -> Result<(), DriverError> {
        if self.cleaned.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let jobs: Api<Job> = Api::namespaced(self.client.clone(), &self.k8s_namespace);
        match jobs.delete(&self.job_name, &DeleteParams::background()).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(()),
            Err(e) => Err(DriverError::Backend(format!("job delete failed: {}", e))),
        }
    }
}

/// Volume backed by a PersistentVolumeClaim. No host path.
pub struct ClaimVolume {
    name: String,
    claim_name: String,
    k8s_namespace: String,
    client: Client,
}

#[async_trait]
impl Volume for ClaimVolume {
    fn name(&self) -> &str {
        &self.name
    }

    fn path(&self) -> Option<PathBuf> {
        None
    }

    async fn cleanup(&self, _ctx: &CancellationToken) -> Result<(), DriverError> {
        let claims: Api<PersistentVolumeClaim> =
            Api::namespaced(self.client.clone(), &self.k8s_namespace);
        match claims.delete(&self.claim_name, &DeleteParams::default()).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(()),
            Err(e) => Err(DriverError::Backend(format!("pvc delete failed: {}", e))),
        }
    }
}
