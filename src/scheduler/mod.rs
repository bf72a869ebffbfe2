pub mod scheduler;

pub use scheduler::{new_scheduler, RoundRobin, Scheduler};
