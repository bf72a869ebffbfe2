//! Shared test fixtures: an in-memory container runtime.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use bollard::secret::{PortBinding, PortMap};
use gantry::tasks::docker::{ContainerRuntime, ContainerStatus, RuntimeError, RuntimeResult};
use gantry::tasks::types::Config;

/// In-memory runtime: containers start successfully (unless told to fail),
/// always inspect as running with one published port, and record stops.
#[derive(Default)]
pub struct FakeRuntime {
    counter: AtomicUsize,
    pub fail_runs: AtomicBool,
    pub stopped: Mutex<Vec<String>>,
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn run(&self, config: &Config) -> RuntimeResult<String> {
        if self.fail_runs.load(Ordering::SeqCst) {
            return Err(RuntimeError::Start("simulated start failure".to_string()));
        }
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        Ok(format!("fake-{}-{n}", config.name))
    }

    async fn inspect(&self, _container_id: &str) -> RuntimeResult<Option<ContainerStatus>> {
        Ok(Some(ContainerStatus {
            status: Some("running".to_string()),
            host_ports: Some(PortMap::from([(
                "80/tcp".to_string(),
                Some(vec![PortBinding {
                    host_ip: Some("0.0.0.0".to_string()),
                    host_port: Some("49153".to_string()),
                }]),
            )])),
        }))
    }

    async fn stop(&self, container_id: &str) -> RuntimeResult<()> {
        self.stopped.lock().unwrap().push(container_id.to_string());
        Ok(())
    }
}
