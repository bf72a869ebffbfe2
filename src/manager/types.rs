use std::collections::{HashMap, VecDeque};

use thiserror::Error;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::node::Node;
use crate::scheduler::Scheduler;
use crate::tasks::types::{Task, TaskEvent};

/// The control plane: authoritative intent tables, the pending event queue,
/// and the worker endpoints it dispatches to.
pub struct Manager {
    /// Worker endpoints as `host:port`.
    pub workers: Vec<String>,
    /// One node descriptor per worker, in the same order.
    pub nodes: Vec<Node>,
    pub(crate) state: Mutex<ManagerState>,
    pub(crate) client: reqwest::Client,
}

/// Everything the manager mutates, behind one lock. Never held across
/// network I/O.
pub(crate) struct ManagerState {
    /// Events accepted but not yet dispatched.
    pub pending: VecDeque<TaskEvent>,
    pub task_db: HashMap<Uuid, Task>,
    pub event_db: HashMap<Uuid, TaskEvent>,
    /// Tasks owned by each worker.
    pub worker_task_map: HashMap<String, Vec<Uuid>>,
    /// Owning worker for each task.
    pub task_worker_map: HashMap<Uuid, String>,
    pub scheduler: Box<dyn Scheduler>,
}

#[derive(Debug, Error)]
pub enum ManagerError {
    #[error("task {0} not found")]
    TaskNotFound(Uuid),
    #[error("no candidate nodes available for task {0}")]
    NoCandidates(Uuid),
    #[error("worker {worker} rejected event ({status}): {message}")]
    WorkerRejected {
        worker: String,
        status: u16,
        message: String,
    },
    #[error("request to worker {worker} failed: {source}")]
    Transport {
        worker: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("health probe for task {task_id} failed: {reason}")]
    ProbeFailed { task_id: Uuid, reason: String },
}

pub type ManagerResult<T> = Result<T, ManagerError>;
