//! Workflow Orchestrator: manages N queued workflows, admitting them against
//! a resource gate and a concurrency cap, one priority-ordered sweep at a
//! time.

use std::sync::Arc;

use dashmap::DashMap;
use recon_concurrency::ResourceMonitor;
use recon_types::{Priority, PriorityWeights, Workflow, WorkflowExecution};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::errors::OrchestrationError;
use crate::executor::WorkflowExecutor;
use crate::status::StatusCallback;

/// One workflow waiting for admission.
struct QueueItem {
    workflow: Workflow,
    target: String,
    priority: i32,
    /// Other workflow names (by `Workflow::name`) that must reach a
    /// terminal state before this one may be admitted. Typically empty.
    dependencies: Vec<String>,
}

/// Point-in-time view of the orchestrator's queue and active map, for
/// external observability (status pages, health checks, tests).
#[derive(Debug, Clone, Default)]
pub struct OrchestratorSnapshot {
    pub queued_count: usize,
    pub active_count: usize,
    pub queued_names: Vec<String>,
    pub active_names: Vec<String>,
}

fn key(workflow: &str, target: &str) -> String {
    format!("{workflow}_{target}")
}

fn compute_priority(workflow: &Workflow, weights: &PriorityWeights) -> i32 {
    let mut priority = 50;
    priority += match workflow.priority {
        Priority::High => weights.high,
        Priority::Medium => weights.medium,
        Priority::Low => weights.low,
    };
    if workflow.independent {
        priority += weights.independent_bonus;
    }
    if workflow.parallel_capable {
        priority += weights.parallel_bonus;
    }
    priority
}

/// Manages the fleet-level queue of workflows, admitting them under a
/// resource gate and a concurrency cap.
///
/// The queue is protected by one lock; the active map is a [`DashMap`],
/// whose per-shard locking never needs to be held across the queue lock,
/// so the two never form an acquisition cycle.
pub struct WorkflowOrchestrator {
    executor: Arc<WorkflowExecutor>,
    resource_monitor: Arc<ResourceMonitor>,
    weights: PriorityWeights,
    max_concurrent_workflows: usize,
    queue: Mutex<Vec<QueueItem>>,
    active: Arc<DashMap<String, WorkflowExecution>>,
}

impl WorkflowOrchestrator {
    pub fn new(
        executor: Arc<WorkflowExecutor>,
        resource_monitor: Arc<ResourceMonitor>,
        weights: PriorityWeights,
        max_concurrent_workflows: usize,
    ) -> Self {
        Self {
            executor,
            resource_monitor,
            weights,
            max_concurrent_workflows,
            queue: Mutex::new(Vec::new()),
            active: Arc::new(DashMap::new()),
        }
    }

    /// Insert a workflow into the admission queue, sorted by computed
    /// priority (highest first). `dependencies` are other workflow names
    /// (by [`Workflow::name`]) this one must wait behind.
    pub async fn queue(&self, workflow: Workflow, target: impl Into<String>, dependencies: Vec<String>) {
        let priority = compute_priority(&workflow, &self.weights);
        let target = target.into();
        debug!(workflow = %workflow.name, %target, priority, "queued workflow");

        let item = QueueItem { workflow, target, priority, dependencies };
        let mut queue = self.queue.lock().await;
        let pos = queue.partition_point(|existing| existing.priority >= item.priority);
        queue.insert(pos, item);
    }

    /// Run one admission sweep: repeatedly admit the highest-priority
    /// eligible queue item while the resource gate and concurrency cap
    /// allow it, then wait for everything admitted during the sweep to
    /// reach a terminal state before returning.
    pub async fn execute_queued(&self, callback: Arc<dyn StatusCallback>, cancellation: CancellationToken) {
        let mut launched = Vec::new();

        loop {
            if cancellation.is_cancelled() {
                break;
            }
            if !self.resource_monitor.can_admit_workflow().await {
                break;
            }
            if self.running_count() >= self.max_concurrent_workflows {
                break;
            }

            let item = {
                let mut queue = self.queue.lock().await;
                let idx = queue.iter().position(|item| self.dependencies_satisfied(&item.dependencies));
                idx.map(|i| queue.remove(i))
            };

            let Some(item) = item else {
                break;
            };

            launched.push(self.admit(item, callback.clone(), cancellation.clone()));
        }

        for handle in launched {
            let _ = handle.await;
        }
    }

    /// Spawn one queue item's run as an independent worker and record its
    /// placeholder execution in the active map immediately, so a dependent
    /// queued behind it sees it as non-terminal right away.
    fn admit(
        &self,
        item: QueueItem,
        callback: Arc<dyn StatusCallback>,
        cancellation: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        let execution_key = key(&item.workflow.name, &item.target);
        let placeholder =
            WorkflowExecution::new(item.workflow.name.clone(), item.target.clone(), item.workflow.steps.len());
        self.active.insert(execution_key.clone(), placeholder);
        info!(workflow = %item.workflow.name, target = %item.target, priority = item.priority, "workflow admitted");

        let executor = self.executor.clone();
        let active = self.active.clone();

        tokio::spawn(async move {
            let execution = executor.run(&item.workflow, &item.target, callback.as_ref(), cancellation).await;
            active.insert(execution_key, execution);
        })
    }

    /// True iff every declared dependency is either absent from the active
    /// map (never queued, nothing to wait for) or terminal everywhere it
    /// appears.
    fn dependencies_satisfied(&self, dependencies: &[String]) -> bool {
        dependencies.iter().all(|dep| {
            !self
                .active
                .iter()
                .any(|entry| entry.value().workflow == *dep && !entry.value().status.is_terminal())
        })
    }

    fn running_count(&self) -> usize {
        self.active.iter().filter(|entry| !entry.value().status.is_terminal()).count()
    }

    /// Look up one execution by workflow name and target.
    pub fn execution(&self, workflow: &str, target: &str) -> Result<WorkflowExecution, OrchestrationError> {
        self.active
            .get(&key(workflow, target))
            .map(|entry| entry.value().clone())
            .ok_or_else(|| OrchestrationError::WorkflowNotFound { name: workflow.to_string() })
    }

    /// A copy of the active map, including terminal entries — nothing is
    /// ever evicted for the lifetime of the process.
    pub fn active_workflows(&self) -> std::collections::HashMap<String, WorkflowExecution> {
        self.active.iter().map(|entry| (entry.key().clone(), entry.value().clone())).collect()
    }

    pub async fn snapshot(&self) -> OrchestratorSnapshot {
        let queue = self.queue.lock().await;
        let queued_names: Vec<String> = queue.iter().map(|item| item.workflow.name.clone()).collect();

        let mut active_names = Vec::new();
        let mut active_count = 0;
        for entry in self.active.iter() {
            if !entry.value().status.is_terminal() {
                active_count += 1;
                active_names.push(entry.key().clone());
            }
        }

        OrchestratorSnapshot {
            queued_count: queued_names.len(),
            active_count,
            queued_names,
            active_names,
        }
    }
}
