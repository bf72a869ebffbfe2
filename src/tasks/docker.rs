//! Runtime adapter over the local Docker daemon.

use std::io::Write;

use async_trait::async_trait;
use bollard::container::{
    Config as ContainerConfig, CreateContainerOptions, InspectContainerOptions, LogsOptions,
    RemoveContainerOptions, StartContainerOptions, StopContainerOptions,
};
use bollard::image::CreateImageOptions;
use bollard::secret::{HostConfig, PortMap, RestartPolicy, RestartPolicyNameEnum};
use futures_util::stream::StreamExt;
use thiserror::Error;
use tracing::debug;

use super::types::Config;

/// Errors surfaced by the runtime adapter. The daemon's own message is
/// carried verbatim in each variant.
#[derive(Debug, Clone, Error)]
pub enum RuntimeError {
    #[error("docker connection failed: {0}")]
    Connect(String),
    #[error("image pull failed: {0}")]
    Pull(String),
    #[error("container create failed: {0}")]
    Create(String),
    #[error("container start failed: {0}")]
    Start(String),
    #[error("container logs failed: {0}")]
    Logs(String),
    #[error("container inspect failed: {0}")]
    Inspect(String),
    #[error("container stop failed: {0}")]
    Stop(String),
    #[error("container remove failed: {0}")]
    Remove(String),
}

pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// What observation needs from the daemon's container descriptor.
#[derive(Debug, Clone, Default)]
pub struct ContainerStatus {
    /// The daemon's `state.status`, e.g. `"running"` or `"exited"`.
    pub status: Option<String>,
    /// Host port map from the descriptor's network settings.
    pub host_ports: Option<PortMap>,
}

/// The operations the worker needs from a container runtime. Tests
/// substitute a scripted fake; production uses [`DockerClient`].
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Pull the image, create and start the container, attach the current
    /// log snapshot to the sink. Returns the runtime-assigned container ID.
    async fn run(&self, config: &Config) -> RuntimeResult<String>;

    /// Fetch the container's descriptor. `Ok(None)` means the daemon no
    /// longer knows the container.
    async fn inspect(&self, container_id: &str) -> RuntimeResult<Option<ContainerStatus>>;

    /// Stop the container, then remove it.
    async fn stop(&self, container_id: &str) -> RuntimeResult<()>;
}

/// One connection to the local Docker daemon. Stateless between calls.
#[derive(Debug, Clone)]
pub struct DockerClient {
    client: bollard::Docker,
}

impl DockerClient {
    pub fn connect() -> RuntimeResult<Self> {
        let client = bollard::Docker::connect_with_unix_defaults()
            .map_err(|e| RuntimeError::Connect(e.to_string()))?;
        Ok(DockerClient { client })
    }
}

fn restart_policy_name(name: &str) -> RestartPolicyNameEnum {
    match name {
        "always" => RestartPolicyNameEnum::ALWAYS,
        "unless-stopped" => RestartPolicyNameEnum::UNLESS_STOPPED,
        "on-failure" => RestartPolicyNameEnum::ON_FAILURE,
        _ => RestartPolicyNameEnum::NO,
    }
}

fn nano_cpus(cpu: f64) -> i64 {
    (cpu * 1_000_000_000.0) as i64
}

#[async_trait]
impl ContainerRuntime for DockerClient {
    async fn run(&self, config: &Config) -> RuntimeResult<String> {
        debug!(image = %config.image, "pulling image");
        let mut pull = self.client.create_image(
            Some(CreateImageOptions {
                from_image: config.image.clone(),
                ..Default::default()
            }),
            None,
            None,
        );
        while let Some(progress) = pull.next().await {
            let info = progress.map_err(|e| RuntimeError::Pull(e.to_string()))?;
            if let Some(status) = info.status {
                print!("\r{status}");
                let _ = std::io::stdout().flush();
            }
        }
        println!();
        debug!(image = %config.image, "image pulled");

        let restart_policy = RestartPolicy {
            name: Some(restart_policy_name(&config.restart_policy)),
            maximum_retry_count: None,
        };

        // Every exposed port is bound to a runtime-chosen host port.
        let host_config = HostConfig {
            restart_policy: Some(restart_policy),
            memory: Some(config.memory),
            nano_cpus: Some(nano_cpus(config.cpu)),
            publish_all_ports: Some(true),
            ..Default::default()
        };

        let container_config = ContainerConfig {
            image: Some(config.image.clone()),
            env: Some(config.env.clone()),
            cmd: if config.cmd.is_empty() {
                None
            } else {
                Some(config.cmd.clone())
            },
            exposed_ports: Some(config.exposed_ports.clone()),
            host_config: Some(host_config),
            ..Default::default()
        };

        let created = self
            .client
            .create_container(
                Some(CreateContainerOptions {
                    name: config.name.clone(),
                    ..Default::default()
                }),
                container_config,
            )
            .await
            .map_err(|e| RuntimeError::Create(e.to_string()))?;
        debug!(container_id = %created.id, "container created");

        self.client
            .start_container(&created.id, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| RuntimeError::Start(e.to_string()))?;
        debug!(container_id = %created.id, name = %config.name, "container started");

        // Snapshot of stdout+stderr so far, copied to our stdout.
        let mut logs = self.client.logs(
            &created.id,
            Some(LogsOptions::<String> {
                stdout: true,
                stderr: true,
                ..Default::default()
            }),
        );
        while let Some(chunk) = logs.next().await {
            let output = chunk.map_err(|e| RuntimeError::Logs(e.to_string()))?;
            print!("{}", String::from_utf8_lossy(&output.into_bytes()));
        }

        Ok(created.id)
    }

    async fn inspect(&self, container_id: &str) -> RuntimeResult<Option<ContainerStatus>> {
        let details = match self
            .client
            .inspect_container(container_id, None::<InspectContainerOptions>)
            .await
        {
            Ok(details) => details,
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => return Ok(None),
            Err(e) => return Err(RuntimeError::Inspect(e.to_string())),
        };

        Ok(Some(ContainerStatus {
            status: details.state.and_then(|s| s.status).map(|s| s.to_string()),
            host_ports: details.network_settings.and_then(|n| n.ports),
        }))
    }

    async fn stop(&self, container_id: &str) -> RuntimeResult<()> {
        self.client
            .stop_container(container_id, None::<StopContainerOptions>)
            .await
            .map_err(|e| RuntimeError::Stop(e.to_string()))?;
        self.client
            .remove_container(container_id, None::<RemoveContainerOptions>)
            .await
            .map_err(|e| RuntimeError::Remove(e.to_string()))?;
        debug!(%container_id, "container stopped and removed");
        Ok(())
    }
}
