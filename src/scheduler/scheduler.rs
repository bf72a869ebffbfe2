//! Pluggable placement: given a task and a candidate node set, produce a
//! selection.

use std::collections::HashMap;

use crate::node::Node;
use crate::tasks::types::Task;

/// A placement policy. `select_candidate_nodes` filters, `score` rates each
/// candidate, `pick` chooses the candidate with the highest score (ties
/// broken by candidate order).
pub trait Scheduler: Send {
    fn name(&self) -> &str;

    fn select_candidate_nodes<'a>(&self, task: &Task, nodes: &'a [Node]) -> Vec<&'a Node>;

    fn score(&mut self, task: &Task, nodes: &[&Node]) -> HashMap<String, f64>;

    fn pick(&self, scores: &HashMap<String, f64>, candidates: &[&Node]) -> Option<Node>;
}

/// Reference scheduler: rotates through the candidate set. Each `score`
/// call advances an internal index and rates the selected node 1.0,
/// everything else 0.1.
pub struct RoundRobin {
    pub name: String,
    last_worker: usize,
}

impl RoundRobin {
    pub fn new() -> Self {
        RoundRobin {
            name: "roundrobin".to_string(),
            last_worker: 0,
        }
    }
}

impl Default for RoundRobin {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler for RoundRobin {
    fn name(&self) -> &str {
        &self.name
    }

    fn select_candidate_nodes<'a>(&self, _task: &Task, nodes: &'a [Node]) -> Vec<&'a Node> {
        nodes.iter().collect()
    }

    fn score(&mut self, _task: &Task, nodes: &[&Node]) -> HashMap<String, f64> {
        if nodes.is_empty() {
            return HashMap::new();
        }
        self.last_worker = (self.last_worker + 1) % nodes.len();

        nodes
            .iter()
            .enumerate()
            .map(|(idx, node)| {
                let score = if idx == self.last_worker { 1.0 } else { 0.1 };
                (node.name.clone(), score)
            })
            .collect()
    }

    fn pick(&self, scores: &HashMap<String, f64>, candidates: &[&Node]) -> Option<Node> {
        let mut best: Option<&Node> = None;
        let mut best_score = f64::MIN;
        for node in candidates {
            let score = scores.get(&node.name).copied().unwrap_or(0.0);
            if score > best_score {
                best = Some(node);
                best_score = score;
            }
        }
        best.cloned()
    }
}

/// Scheduler selection by type name; unknown names fall back to round-robin.
pub fn new_scheduler(scheduler_type: &str) -> Box<dyn Scheduler> {
    match scheduler_type {
        "roundrobin" => Box::new(RoundRobin::new()),
        _ => Box::new(RoundRobin::new()),
    }
}
