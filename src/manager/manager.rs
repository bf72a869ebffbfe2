//! Manager internals: intake, the dispatch tick that drives the pending
//! queue through the scheduler, the observation tick that reconciles worker
//! state, and health-check-driven restarts.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use bollard::secret::PortMap;
use chrono::Utc;
use reqwest::StatusCode;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::types::{Manager, ManagerError, ManagerResult, ManagerState};
use crate::node::Node;
use crate::scheduler::new_scheduler;
use crate::tasks::types::{State, Task, TaskEvent};
use crate::worker::api::ErrResponse;

/// How often one pending event is dispatched.
pub const PROCESS_INTERVAL: Duration = Duration::from_secs(10);
/// How often workers are polled for observed state.
pub const UPDATE_INTERVAL: Duration = Duration::from_secs(15);
/// How often running tasks are health-probed.
pub const HEALTH_INTERVAL: Duration = Duration::from_secs(15);
/// Per-task restart cap; failures beyond this leave the task as it is.
pub const MAX_RESTARTS: u32 = 3;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

impl Manager {
    pub fn new(workers: Vec<String>, scheduler_type: &str) -> Self {
        let nodes = workers
            .iter()
            .map(|w| Node::new(w, &format!("http://{w}"), "worker"))
            .collect();
        let worker_task_map = workers.iter().map(|w| (w.clone(), Vec::new())).collect();

        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("failed to build HTTP client");

        Manager {
            workers,
            nodes,
            state: tokio::sync::Mutex::new(ManagerState {
                pending: VecDeque::new(),
                task_db: Default::default(),
                event_db: Default::default(),
                worker_task_map,
                task_worker_map: Default::default(),
                scheduler: new_scheduler(scheduler_type),
            }),
            client,
        }
    }

    /// Accept a task event. Duplicate events with the same ID are distinct
    /// intents; uniqueness of the embedded task ID is not validated here.
    pub async fn add_task(&self, event: TaskEvent) {
        self.state.lock().await.pending.push_back(event);
    }

    pub async fn get_tasks(&self) -> Vec<Task> {
        self.state.lock().await.task_db.values().cloned().collect()
    }

    pub async fn task(&self, id: Uuid) -> Option<Task> {
        self.state.lock().await.task_db.get(&id).cloned()
    }

    pub async fn pending_len(&self) -> usize {
        self.state.lock().await.pending.len()
    }

    pub async fn event_count(&self) -> usize {
        self.state.lock().await.event_db.len()
    }

    /// Task IDs currently owned by a worker.
    pub async fn worker_tasks(&self, worker: &str) -> Vec<Uuid> {
        self.state
            .lock()
            .await
            .worker_task_map
            .get(worker)
            .cloned()
            .unwrap_or_default()
    }

    /// Synthesize and enqueue a stop event for a known task.
    pub async fn stop_task(&self, id: Uuid) -> ManagerResult<TaskEvent> {
        let mut state = self.state.lock().await;
        let mut task = state
            .task_db
            .get(&id)
            .cloned()
            .ok_or(ManagerError::TaskNotFound(id))?;
        task.state = State::Completed;

        let event = TaskEvent {
            id: Uuid::new_v4(),
            state: State::Completed,
            timestamp: Utc::now(),
            task,
        };
        state.pending.push_back(event.clone());
        Ok(event)
    }

    fn select_worker(state: &mut ManagerState, nodes: &[Node], task: &Task) -> Option<Node> {
        let candidates = state.scheduler.select_candidate_nodes(task, nodes);
        if candidates.is_empty() {
            return None;
        }
        let scores = state.scheduler.score(task, &candidates);
        state.scheduler.pick(&scores, &candidates)
    }

    /// One dispatch tick: pop a pending event, pick a worker, record the
    /// intent, and POST the event. Transport failures re-enqueue the event;
    /// it is never silently dropped.
    pub async fn send_work(&self) {
        let (event, worker) = {
            let mut state = self.state.lock().await;
            let Some(mut event) = state.pending.pop_front() else {
                debug!("no work in the pending queue");
                return;
            };
            let task_id = event.task.id;

            let Some(node) = Self::select_worker(&mut state, &self.nodes, &event.task) else {
                error!(%task_id, "no candidate nodes, requeueing event");
                state.pending.push_back(event);
                return;
            };
            let worker = node.name;

            // Run intents carry the task as Scheduled so the worker's
            // transition check accepts them; stop intents keep Completed.
            if event.state != State::Completed {
                event.task.state = State::Scheduled;
            }

            state.event_db.insert(event.id, event.clone());

            // Re-dispatch may move ownership; drop any stale back-reference
            // so each task is listed under exactly one worker.
            if let Some(previous) = state.task_worker_map.insert(task_id, worker.clone()) {
                if previous != worker {
                    if let Some(owned) = state.worker_task_map.get_mut(&previous) {
                        owned.retain(|id| *id != task_id);
                    }
                }
            }
            let owned = state.worker_task_map.entry(worker.clone()).or_default();
            if !owned.contains(&task_id) {
                owned.push(task_id);
            }

            let mut task = event.task.clone();
            task.state = State::Scheduled;
            state.task_db.insert(task_id, task);

            (event, worker)
        };

        match self.post_event(&worker, &event).await {
            Ok(task) => {
                info!(task_id = %event.task.id, %worker, "task dispatched");
                debug!(?task, "worker accepted task");
            }
            Err(e @ ManagerError::Transport { .. }) => {
                warn!(%worker, error = %e, "dispatch failed, requeueing event");
                self.state.lock().await.pending.push_back(event);
            }
            Err(e) => error!(%worker, error = %e, "dispatch rejected"),
        }
    }

    async fn post_event(&self, worker: &str, event: &TaskEvent) -> ManagerResult<Task> {
        let url = format!("http://{worker}/tasks");
        let response = self
            .client
            .post(&url)
            .json(event)
            .send()
            .await
            .map_err(|source| ManagerError::Transport {
                worker: worker.to_string(),
                source,
            })?;

        let status = response.status();
        if status != StatusCode::CREATED {
            let message = match response.json::<ErrResponse>().await {
                Ok(body) => body.message,
                Err(e) => format!("undecodable error body: {e}"),
            };
            return Err(ManagerError::WorkerRejected {
                worker: worker.to_string(),
                status: status.as_u16(),
                message,
            });
        }

        response
            .json::<Task>()
            .await
            .map_err(|source| ManagerError::Transport {
                worker: worker.to_string(),
                source,
            })
    }

    /// One observation tick: poll every worker and fold observed state into
    /// the task table. A worker that cannot be reached is skipped until the
    /// next cycle.
    pub async fn update_tasks(&self) {
        for worker in &self.workers {
            debug!(%worker, "checking worker for task updates");
            let url = format!("http://{worker}/tasks");

            let response = match self.client.get(&url).send().await {
                Ok(response) => response,
                Err(e) => {
                    warn!(%worker, error = %e, "could not reach worker for updates");
                    continue;
                }
            };
            if response.status() != StatusCode::OK {
                warn!(%worker, status = %response.status(), "unexpected status from worker");
                continue;
            }

            let tasks: Vec<Task> = match response.json().await {
                Ok(tasks) => tasks,
                Err(e) => {
                    warn!(%worker, error = %e, "could not decode worker task list");
                    continue;
                }
            };

            self.apply_task_updates(tasks).await;
        }
    }

    /// Overwrite the observed fields of known tasks. Tasks this manager did
    /// not dispatch are ignored, not adopted.
    pub async fn apply_task_updates(&self, tasks: Vec<Task>) {
        let mut state = self.state.lock().await;
        for observed in tasks {
            let Some(stored) = state.task_db.get_mut(&observed.id) else {
                debug!(task_id = %observed.id, "ignoring update for unknown task");
                continue;
            };
            stored.state = observed.state;
            stored.start_time = observed.start_time;
            stored.finish_time = observed.finish_time;
            stored.container_id = observed.container_id;
            stored.host_ports = observed.host_ports;
        }
    }

    /// One health tick: probe every Running task and remediate it, and any
    /// Failed task, while its restart budget lasts.
    pub async fn do_health_checks(&self) {
        for task in self.get_tasks().await {
            match task.state {
                State::Running => {
                    if let Err(e) = self.check_task_health(&task).await {
                        warn!(task_id = %task.id, error = %e, "task failed its health check");
                        if task.restart_count < MAX_RESTARTS {
                            self.restart_task(task.id).await;
                        }
                    }
                }
                State::Failed if task.restart_count < MAX_RESTARTS => {
                    self.restart_task(task.id).await;
                }
                _ => {}
            }
        }
    }

    async fn check_task_health(&self, task: &Task) -> ManagerResult<()> {
        let Some(url) = self.health_probe_url(task).await else {
            // No published ports yet; nothing to probe.
            return Ok(());
        };

        debug!(task_id = %task.id, %url, "probing task health");
        let response =
            self.client
                .get(&url)
                .send()
                .await
                .map_err(|e| ManagerError::ProbeFailed {
                    task_id: task.id,
                    reason: e.to_string(),
                })?;

        if response.status() != StatusCode::OK {
            return Err(ManagerError::ProbeFailed {
                task_id: task.id,
                reason: format!("status {} where 200 was expected", response.status()),
            });
        }

        debug!(task_id = %task.id, "task passed its health check");
        Ok(())
    }

    /// `http://{workerHost}:{firstHostPort}{healthCheckPath}`, or None when
    /// the task has no published ports or no recorded worker.
    async fn health_probe_url(&self, task: &Task) -> Option<String> {
        let host_port = first_host_port(task.host_ports.as_ref()?)?;
        let worker = self
            .state
            .lock()
            .await
            .task_worker_map
            .get(&task.id)
            .cloned()?;
        let host = worker.split(':').next()?;
        Some(format!("http://{host}:{host_port}{}", task.health_check))
    }

    /// Re-promote a task to Scheduled, spend one restart, and record the
    /// synthesized restart event. Returns the owning worker and the event
    /// to dispatch.
    pub(crate) async fn begin_restart(&self, task_id: Uuid) -> Option<(String, TaskEvent)> {
        let mut state = self.state.lock().await;
        let Some(worker) = state.task_worker_map.get(&task_id).cloned() else {
            warn!(%task_id, "no worker recorded for task, cannot restart");
            return None;
        };
        let task = state.task_db.get_mut(&task_id)?;
        task.state = State::Scheduled;
        task.restart_count += 1;
        let snapshot = task.clone();

        let event = TaskEvent {
            id: Uuid::new_v4(),
            state: State::Running,
            timestamp: Utc::now(),
            task: snapshot,
        };
        state.event_db.insert(event.id, event.clone());
        Some((worker, event))
    }

    /// Restart a task on the worker that already owns it.
    async fn restart_task(&self, task_id: Uuid) {
        let Some((worker, event)) = self.begin_restart(task_id).await else {
            return;
        };
        info!(%task_id, %worker, restart = event.task.restart_count, "restarting task");

        match self.post_event(&worker, &event).await {
            Ok(_) => info!(%task_id, "task restarted"),
            Err(e @ ManagerError::Transport { .. }) => {
                warn!(%task_id, error = %e, "restart dispatch failed, requeueing event");
                self.state.lock().await.pending.push_back(event);
            }
            Err(e) => error!(%task_id, error = %e, "worker rejected restart"),
        }
    }
}

fn first_host_port(ports: &PortMap) -> Option<String> {
    ports
        .values()
        .flatten()
        .flatten()
        .find_map(|binding| binding.host_port.clone())
}

/// Dispatch loop: send one pending event per tick until shutdown.
pub async fn run_process_loop(manager: Arc<Manager>, mut shutdown: watch::Receiver<bool>) {
    loop {
        tokio::select! {
            _ = tokio::time::sleep(PROCESS_INTERVAL) => {
                debug!("processing any tasks in the pending queue");
                manager.send_work().await;
                debug!("process loop sleeping");
            }
            _ = shutdown.changed() => break,
        }
    }
    debug!("process loop stopped");
}

/// Observation loop: poll workers for observed state until shutdown.
pub async fn run_update_loop(manager: Arc<Manager>, mut shutdown: watch::Receiver<bool>) {
    loop {
        tokio::select! {
            _ = tokio::time::sleep(UPDATE_INTERVAL) => {
                debug!("checking for task updates from workers");
                manager.update_tasks().await;
                debug!("update loop sleeping");
            }
            _ = shutdown.changed() => break,
        }
    }
    debug!("update loop stopped");
}

/// Health loop: probe running tasks and remediate until shutdown.
pub async fn run_health_loop(manager: Arc<Manager>, mut shutdown: watch::Receiver<bool>) {
    loop {
        tokio::select! {
            _ = tokio::time::sleep(HEALTH_INTERVAL) => {
                debug!("performing task health checks");
                manager.do_health_checks().await;
                debug!("health loop sleeping");
            }
            _ = shutdown.changed() => break,
        }
    }
    debug!("health loop stopped");
}
