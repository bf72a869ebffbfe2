use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::tasks::docker::{ContainerRuntime, RuntimeError};
use crate::tasks::types::{State, Task};

/// A worker agent: an intent queue and an observed-state table for the
/// tasks on one node, bound to one container runtime.
pub struct Worker {
    pub name: String,
    /// Tasks accepted from the manager, waiting to be run.
    pub(crate) queue: Mutex<VecDeque<Task>>,
    /// Observed state of every task this worker has handled.
    pub(crate) db: Mutex<HashMap<Uuid, Task>>,
    pub(crate) runtime: Arc<dyn ContainerRuntime>,
    pub(crate) system: Mutex<sysinfo::System>,
}

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("no tasks in the queue")]
    QueueEmpty,
    #[error("invalid state transition from {from:?} to {to:?}")]
    InvalidTransition { from: State, to: State },
    #[error("task {0} not found")]
    TaskNotFound(Uuid),
    #[error("unexpected target state {0:?}")]
    UnexpectedTarget(State),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

pub type WorkerResult<T> = Result<T, WorkerError>;
