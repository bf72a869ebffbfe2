//! Worker internals: intake, the run loop that drives tasks through the
//! runtime adapter, and the observation loop that reconciles container
//! status back into task state.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use sysinfo::System;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::stats::{get_stats, Stats};
use super::types::{Worker, WorkerError, WorkerResult};
use crate::tasks::docker::ContainerRuntime;
use crate::tasks::state::valid_state_transition;
use crate::tasks::types::{new_config, State, Task};

/// How often the run loop drains one task off the intake queue.
pub const RUN_INTERVAL: Duration = Duration::from_secs(10);
/// How often running tasks are reconciled against the runtime.
pub const INSPECT_INTERVAL: Duration = Duration::from_secs(15);

impl Worker {
    pub fn new(name: &str, runtime: Arc<dyn ContainerRuntime>) -> Self {
        Worker {
            name: name.to_string(),
            queue: Default::default(),
            db: Default::default(),
            runtime,
            system: tokio::sync::Mutex::new(System::new_all()),
        }
    }

    /// Accept a task intent. Enqueues even if the worker is idle; the run
    /// loop picks it up on its next tick.
    pub async fn add_task(&self, task: Task) {
        self.queue.lock().await.push_back(task);
    }

    pub async fn get_tasks(&self) -> Vec<Task> {
        self.db.lock().await.values().cloned().collect()
    }

    pub async fn task(&self, id: Uuid) -> Option<Task> {
        self.db.lock().await.get(&id).cloned()
    }

    pub async fn queue_len(&self) -> usize {
        self.queue.lock().await.len()
    }

    /// Enqueue a stop intent for a stored task. Rejects unknown IDs.
    pub async fn enqueue_stop(&self, id: Uuid) -> WorkerResult<Task> {
        let task = self.task(id).await.ok_or(WorkerError::TaskNotFound(id))?;
        let mut stop = task.clone();
        stop.state = State::Completed;
        self.add_task(stop).await;
        Ok(task)
    }

    /// One run-loop tick: dequeue a task snapshot, validate the requested
    /// transition against the persisted state, and dispatch it.
    pub async fn run_next_task(&self) -> WorkerResult<()> {
        let queued = self
            .queue
            .lock()
            .await
            .pop_front()
            .ok_or(WorkerError::QueueEmpty)?;

        let current = {
            let mut db = self.db.lock().await;
            db.entry(queued.id).or_insert_with(|| queued.clone()).state
        };

        if !valid_state_transition(current, queued.state) {
            return Err(WorkerError::InvalidTransition {
                from: current,
                to: queued.state,
            });
        }

        match queued.state {
            State::Scheduled => self.start_task(queued).await,
            State::Completed => self.stop_task(queued).await,
            other => Err(WorkerError::UnexpectedTarget(other)),
        }
    }

    async fn start_task(&self, mut task: Task) -> WorkerResult<()> {
        task.start_time = Some(Utc::now());
        let config = new_config(&task);
        match self.runtime.run(&config).await {
            Ok(container_id) => {
                info!(task_id = %task.id, %container_id, "task started");
                task.container_id = Some(container_id);
                task.state = State::Running;
                self.db.lock().await.insert(task.id, task);
                Ok(())
            }
            Err(e) => {
                error!(task_id = %task.id, error = %e, "error running task");
                task.state = State::Failed;
                self.db.lock().await.insert(task.id, task);
                Err(e.into())
            }
        }
    }

    async fn stop_task(&self, mut task: Task) -> WorkerResult<()> {
        let container_id = match task.container_id.clone() {
            Some(id) => Some(id),
            None => self
                .db
                .lock()
                .await
                .get(&task.id)
                .and_then(|t| t.container_id.clone()),
        };

        // Stop failures are logged but the task still records Completed.
        match container_id {
            Some(container_id) => {
                if let Err(e) = self.runtime.stop(&container_id).await {
                    warn!(task_id = %task.id, %container_id, error = %e, "error stopping container");
                }
            }
            None => warn!(task_id = %task.id, "no container recorded for task"),
        }

        task.finish_time = Some(Utc::now());
        task.state = State::Completed;
        info!(task_id = %task.id, "task stopped");
        self.db.lock().await.insert(task.id, task);
        Ok(())
    }

    /// One observation tick: inspect every task believed Running and fold
    /// the container's actual status back into the table.
    pub async fn update_tasks(&self) {
        let running: Vec<Task> = self
            .db
            .lock()
            .await
            .values()
            .filter(|t| t.state == State::Running)
            .cloned()
            .collect();

        for task in running {
            let Some(container_id) = task.container_id.clone() else {
                warn!(task_id = %task.id, "running task has no container, marking failed");
                self.mark_failed(task.id).await;
                continue;
            };

            let status = match self.runtime.inspect(&container_id).await {
                Ok(status) => status,
                Err(e) => {
                    error!(task_id = %task.id, %container_id, error = %e, "error inspecting container");
                    continue;
                }
            };

            let Some(status) = status else {
                warn!(task_id = %task.id, %container_id, "container no longer exists, marking failed");
                self.mark_failed(task.id).await;
                continue;
            };

            let mut db = self.db.lock().await;
            if let Some(stored) = db.get_mut(&task.id) {
                if status.status.as_deref() == Some("exited") {
                    warn!(task_id = %task.id, %container_id, "container exited, marking failed");
                    stored.state = State::Failed;
                }
                stored.host_ports = status.host_ports;
            }
        }
    }

    async fn mark_failed(&self, id: Uuid) {
        if let Some(stored) = self.db.lock().await.get_mut(&id) {
            stored.state = State::Failed;
        }
    }

    pub async fn stats(&self) -> Stats {
        let task_count = self.db.lock().await.len() as u64;
        let mut system = self.system.lock().await;
        system.refresh_all();
        get_stats(&system, task_count)
    }
}

/// Run loop: drain one task per tick until shutdown.
pub async fn run_task_loop(worker: Arc<Worker>, mut shutdown: watch::Receiver<bool>) {
    loop {
        tokio::select! {
            _ = tokio::time::sleep(RUN_INTERVAL) => {
                match worker.run_next_task().await {
                    Ok(()) => {}
                    Err(WorkerError::QueueEmpty) => debug!("no tasks to process"),
                    Err(e) => error!(error = %e, "error running task"),
                }
                debug!("run loop sleeping");
            }
            _ = shutdown.changed() => break,
        }
    }
    debug!("run loop stopped");
}

/// Observation loop: reconcile running tasks against the runtime until
/// shutdown.
pub async fn run_observation_loop(worker: Arc<Worker>, mut shutdown: watch::Receiver<bool>) {
    loop {
        tokio::select! {
            _ = tokio::time::sleep(INSPECT_INTERVAL) => {
                debug!("checking task status against the runtime");
                worker.update_tasks().await;
                debug!("observation loop sleeping");
            }
            _ = shutdown.changed() => break,
        }
    }
    debug!("observation loop stopped");
}
