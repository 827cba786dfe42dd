// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Container Supervisor (C3) — create/start/exec/stop/remove the isolated
//! shell container and stream its stdio.
//!
//! Object-safe trait over the container engine, following the same manual
//! boxed-future shape the local-process backend uses, so tests can swap in
//! a fake supervisor without pulling in a real container engine.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use bollard::container::{
    Config as ContainerConfig, RemoveContainerOptions, StopContainerOptions,
};
use bollard::exec::{CreateExecOptions, ResizeExecOptions, StartExecOptions, StartExecResults};
use bollard::models::HostConfig;
use bollard::Docker;
use bytes::Bytes;
use futures_util::stream::{Stream, StreamExt};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::session::SessionId;

/// Reference to a running, isolated shell container; owned exclusively by
/// one session.
#[derive(Debug, Clone)]
pub struct ContainerHandle {
    pub container_id: String,
}

/// Bidirectional byte stream to the shell's pseudo-terminal.
pub struct ExecHandle {
    exec_id: String,
    stdin: Mutex<Pin<Box<dyn tokio::io::AsyncWrite + Send>>>,
}

impl ExecHandle {
    /// Write bytes verbatim to the shell's stdin.
    pub async fn write_all(&self, data: &[u8]) -> anyhow::Result<()> {
        let mut stdin = self.stdin.lock().await;
        stdin.write_all(data).await?;
        stdin.flush().await?;
        Ok(())
    }

    /// A handle backed by a discarding sink, for tests that exercise
    /// session/broker plumbing without a real container engine.
    #[cfg(test)]
    pub fn for_test() -> Self {
        Self { exec_id: "test-exec".to_owned(), stdin: Mutex::new(Box::pin(tokio::io::sink())) }
    }
}

/// Output side of an opened shell, consumed exactly once by the session's
/// outbound collector task.
pub type OutputStream = Pin<Box<dyn Stream<Item = anyhow::Result<Bytes>> + Send>>;

/// Failure modes for container provisioning (spec §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionFailure {
    ImageUnavailable,
    ResourceExhausted,
    PolicyDenied,
    Transient,
}

impl std::fmt::Display for ProvisionFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::ImageUnavailable => "image unavailable",
            Self::ResourceExhausted => "resource exhausted",
            Self::PolicyDenied => "policy denied",
            Self::Transient => "transient failure",
        };
        f.write_str(s)
    }
}

impl std::error::Error for ProvisionFailure {}

/// Tunables that shape every container this supervisor provisions.
#[derive(Debug, Clone)]
pub struct ContainerSpec {
    pub image: String,
    pub shell_command: String,
    pub memory_bytes: i64,
    pub nano_cpus: u64,
}

/// Object-safe abstraction over the container engine. A session's
/// `containerHandle`/`execStream` are produced and torn down exclusively
/// through this trait.
pub trait ContainerSupervisor: Send + Sync + 'static {
    fn provision(
        &self,
        session_id: SessionId,
        api_key: &str,
        access_token: &str,
        extra_env: &[(String, String)],
    ) -> Pin<Box<dyn Future<Output = Result<ContainerHandle, ProvisionFailure>> + Send + '_>>;

    fn open_shell(
        &self,
        container: &ContainerHandle,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<(ExecHandle, OutputStream)>> + Send + '_>>;

    fn resize(
        &self,
        exec: &ExecHandle,
        cols: u16,
        rows: u16,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>>;

    fn terminate(&self, container: &ContainerHandle) -> Pin<Box<dyn Future<Output = ()> + Send + '_>>;
}

/// `bollard`-backed supervisor. The broker carries exactly one of these.
pub struct DockerSupervisor {
    docker: Docker,
    spec: ContainerSpec,
}

const PROVISION_RETRIES: u32 = 3;
const PROVISION_BASE_BACKOFF: Duration = Duration::from_millis(200);
const STOP_TIMEOUT_SECS: i64 = 5;

impl DockerSupervisor {
    pub fn connect(spec: ContainerSpec) -> anyhow::Result<Self> {
        let docker = Docker::connect_with_local_defaults()?;
        Ok(Self { docker, spec })
    }

    async fn provision_once(
        &self,
        session_id: SessionId,
        api_key: &str,
        access_token: &str,
        extra_env: &[(String, String)],
    ) -> Result<ContainerHandle, ProvisionFailure> {
        let name = format!("termbroker-{session_id}");
        let host_config = HostConfig {
            memory: Some(self.spec.memory_bytes),
            nano_cpus: Some(self.spec.nano_cpus as i64),
            readonly_rootfs: Some(true),
            cap_drop: Some(vec!["ALL".to_owned()]),
            ..Default::default()
        };
        let mut env = vec![format!("ABLY_API_KEY={api_key}"), format!("ABLY_ACCESS_TOKEN={access_token}")];
        env.extend(extra_env.iter().map(|(k, v)| format!("{k}={v}")));
        let config = ContainerConfig {
            image: Some(self.spec.image.clone()),
            env: Some(env),
            tty: Some(true),
            open_stdin: Some(true),
            user: Some("1000:1000".to_owned()),
            cmd: Some(vec!["sleep".to_owned(), "infinity".to_owned()]),
            host_config: Some(host_config),
            ..Default::default()
        };

        let options = bollard::container::CreateContainerOptions { name: name.clone(), platform: None };
        let created = match self.docker.create_container(Some(options), config).await {
            Ok(created) => created,
            Err(err) => return Err(classify_create_error(&err)),
        };

        if let Err(err) =
            self.docker.start_container(&created.id, None::<bollard::container::StartContainerOptions<String>>).await
        {
            warn!(session_id = %session_id, error = %err, "container start failed, removing");
            let _ = self
                .docker
                .remove_container(
                    &created.id,
                    Some(RemoveContainerOptions { force: true, ..Default::default() }),
                )
                .await;
            return Err(ProvisionFailure::Transient);
        }

        debug!(session_id = %session_id, container_id = %created.id, "container provisioned");
        Ok(ContainerHandle { container_id: created.id })
    }
}

fn classify_create_error(err: &bollard::errors::Error) -> ProvisionFailure {
    match err {
        bollard::errors::Error::DockerResponseServerError { status_code, .. } if *status_code == 404 => {
            ProvisionFailure::ImageUnavailable
        }
        bollard::errors::Error::DockerResponseServerError { status_code, .. } if *status_code == 403 => {
            ProvisionFailure::PolicyDenied
        }
        bollard::errors::Error::DockerResponseServerError { status_code, .. }
            if (500..600).contains(status_code) =>
        {
            ProvisionFailure::ResourceExhausted
        }
        _ => ProvisionFailure::Transient,
    }
}

impl ContainerSupervisor for DockerSupervisor {
    fn provision(
        &self,
        session_id: SessionId,
        api_key: &str,
        access_token: &str,
        extra_env: &[(String, String)],
    ) -> Pin<Box<dyn Future<Output = Result<ContainerHandle, ProvisionFailure>> + Send + '_>> {
        let api_key = api_key.to_owned();
        let access_token = access_token.to_owned();
        let extra_env = extra_env.to_vec();
        Box::pin(async move {
            let mut attempt = 0;
            loop {
                match self.provision_once(session_id, &api_key, &access_token, &extra_env).await {
                    Ok(handle) => return Ok(handle),
                    Err(ProvisionFailure::Transient) if attempt + 1 < PROVISION_RETRIES => {
                        attempt += 1;
                        let backoff = PROVISION_BASE_BACKOFF * 2u32.pow(attempt - 1);
                        warn!(session_id = %session_id, attempt, "transient provision failure, retrying");
                        tokio::time::sleep(backoff).await;
                    }
                    Err(other) => return Err(other),
                }
            }
        })
    }

    fn open_shell(
        &self,
        container: &ContainerHandle,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<(ExecHandle, OutputStream)>> + Send + '_>> {
        let container_id = container.container_id.clone();
        let shell_command = self.spec.shell_command.clone();
        Box::pin(async move {
            let exec = self
                .docker
                .create_exec(
                    &container_id,
                    CreateExecOptions {
                        attach_stdin: Some(true),
                        attach_stdout: Some(true),
                        attach_stderr: Some(true),
                        tty: Some(true),
                        cmd: Some(vec![shell_command]),
                        ..Default::default()
                    },
                )
                .await?;

            let started = self
                .docker
                .start_exec(&exec.id, Some(StartExecOptions { detach: false, tty: true, output_capacity: None }))
                .await?;

            match started {
                StartExecResults::Attached { input, output } => {
                    let stream: OutputStream = Box::pin(output.map(|item| {
                        item.map(|log| log.into_bytes()).map_err(anyhow::Error::from)
                    }));
                    let handle = ExecHandle { exec_id: exec.id, stdin: Mutex::new(input) };
                    Ok((handle, stream))
                }
                StartExecResults::Detached => {
                    anyhow::bail!("exec started detached, expected an attached stream")
                }
            }
        })
    }

    fn resize(
        &self,
        exec: &ExecHandle,
        cols: u16,
        rows: u16,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>> {
        let exec_id = exec.exec_id.clone();
        Box::pin(async move {
            self.docker
                .resize_exec(&exec_id, ResizeExecOptions { height: rows, width: cols })
                .await?;
            Ok(())
        })
    }

    fn terminate(&self, container: &ContainerHandle) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        let container_id = container.container_id.clone();
        Box::pin(async move {
            if let Err(err) = self
                .docker
                .stop_container(&container_id, Some(StopContainerOptions { t: STOP_TIMEOUT_SECS }))
                .await
            {
                debug!(container_id = %container_id, error = %err, "stop_container failed, removing anyway");
            }
            if let Err(err) = self
                .docker
                .remove_container(
                    &container_id,
                    Some(RemoveContainerOptions { force: true, ..Default::default() }),
                )
                .await
            {
                warn!(container_id = %container_id, error = %err, "remove_container failed");
            }
        })
    }
}
