//! Concurrency Manager: one priority queue plus three per-class
//! capacity pools, with a learning classifier that reclassifies a tool
//! after every completed run.
//!
//! Implemented as one heap + N counters rather than N semaphores so that a
//! release can scan in strict priority order and admit the first
//! class-admissible request, regardless of which class just freed a slot.

use std::collections::HashMap;

use chrono::Utc;
use recon_types::ToolClass;
use tokio::sync::{oneshot, Mutex, RwLock};
use tracing::{debug, info};
use uuid::Uuid;

use crate::errors::ConcurrencyError;

const CLASSES: [ToolClass; 3] = [ToolClass::Fast, ToolClass::Medium, ToolClass::Heavy];

fn class_index(class: ToolClass) -> usize {
    match class {
        ToolClass::Fast => 0,
        ToolClass::Medium => 1,
        ToolClass::Heavy => 2,
    }
}

/// Per-class capacity derived from a base concurrency figure `n`:
/// `fast = 2n`, `medium = n`, `heavy = max(1, n/2)`.
pub fn class_limits_from_base(n: usize) -> [usize; 3] {
    [n.saturating_mul(2), n.max(1), (n / 2).max(1)]
}

struct ActiveState {
    limits: [usize; 3],
    active: [usize; 3],
    peak: [usize; 3],
    total_admitted: u64,
}

struct PendingRequest {
    id: Uuid,
    tool: String,
    class: ToolClass,
    priority: i32,
    sequence: u64,
    start_tx: Option<oneshot::Sender<()>>,
}

struct QueueState {
    pending: Vec<PendingRequest>,
    next_sequence: u64,
    total_queued: u64,
}

/// A granted slot. Must be released with [`ConcurrencyManager::release`]
/// (passing the observed duration) once the invocation completes — the
/// class recorded here is fixed at acquisition time and is what gets
/// credited back, even if the tool is reclassified while this slot is
/// held.
pub struct Slot {
    pub class: ToolClass,
    pub tool: String,
}

#[derive(Debug, Clone, Copy)]
pub struct ClassMetrics {
    pub class: ToolClass,
    pub active: usize,
    pub available: usize,
    pub total: usize,
    pub utilisation: f64,
    pub peak: usize,
}

#[derive(Debug, Clone)]
pub struct ConcurrencyMetrics {
    pub classes: Vec<ClassMetrics>,
    pub queue_size: usize,
    pub queued_tools: Vec<String>,
    pub total_admitted: u64,
    pub total_queued: u64,
}

/// Governs how many tools may execute simultaneously, across three
/// independent capacity pools, with priority-ordered admission.
pub struct ConcurrencyManager {
    active: Mutex<ActiveState>,
    queue: Mutex<QueueState>,
    performance: RwLock<HashMap<String, recon_types::ToolPerformanceHistory>>,
}

impl ConcurrencyManager {
    pub fn new(base_n: usize) -> Self {
        let limits = class_limits_from_base(base_n);
        Self {
            active: Mutex::new(ActiveState {
                limits,
                active: [0; 3],
                peak: [0; 3],
                total_admitted: 0,
            }),
            queue: Mutex::new(QueueState {
                pending: Vec::new(),
                next_sequence: 0,
                total_queued: 0,
            }),
            performance: RwLock::new(HashMap::new()),
        }
    }

    /// Current classification for `tool`: its last-assigned class from
    /// performance history, or `Medium` if the tool has never run.
    pub async fn classify(&self, tool: &str) -> ToolClass {
        self.performance
            .read()
            .await
            .get(tool)
            .map(|h| h.last_assigned_class)
            .unwrap_or(ToolClass::Medium)
    }

    /// Acquire a slot for `tool` at `priority` (higher admits first; ties
    /// broken FIFO by arrival order). Resolves once admitted, or fails with
    /// [`ConcurrencyError::Cancelled`] if `cancelled` resolves first.
    pub async fn acquire(
        &self,
        tool: &str,
        priority: i32,
        cancelled: impl std::future::Future<Output = ()>,
    ) -> Result<Slot, ConcurrencyError> {
        let class = self.classify(tool).await;
        let idx = class_index(class);

        {
            let mut active = self.active.lock().await;
            if active.active[idx] < active.limits[idx] {
                active.active[idx] += 1;
                active.peak[idx] = active.peak[idx].max(active.active[idx]);
                active.total_admitted += 1;
                debug!(tool, ?class, "slot admitted immediately");
                return Ok(Slot {
                    class,
                    tool: tool.to_string(),
                });
            }
        }

        let (start_tx, start_rx) = oneshot::channel();
        let id = Uuid::new_v4();
        {
            let mut queue = self.queue.lock().await;
            let sequence = queue.next_sequence;
            queue.next_sequence += 1;
            queue.total_queued += 1;
            queue.pending.push(PendingRequest {
                id,
                tool: tool.to_string(),
                class,
                priority,
                sequence,
                start_tx: Some(start_tx),
            });
        }
        debug!(tool, priority, "queued for concurrency slot");

        tokio::select! {
            result = start_rx => {
                result.map_err(|_| ConcurrencyError::Cancelled)?;
                Ok(Slot { class, tool: tool.to_string() })
            }
            _ = cancelled => {
                let mut queue = self.queue.lock().await;
                queue.pending.retain(|r| r.id != id);
                Err(ConcurrencyError::Cancelled)
            }
        }
    }

    /// Release a previously acquired slot and run one admission sweep.
    pub async fn release(&self, slot: Slot) {
        {
            let mut active = self.active.lock().await;
            let idx = class_index(slot.class);
            active.active[idx] = active.active[idx].saturating_sub(1);
        }
        self.sweep().await;
    }

    /// Scan the queue in strict priority order (ties FIFO) and admit every
    /// request whose class currently has capacity. Runs until a full pass
    /// admits nothing.
    async fn sweep(&self) {
        loop {
            let mut queue = self.queue.lock().await;
            if queue.pending.is_empty() {
                return;
            }

            let mut order: Vec<usize> = (0..queue.pending.len()).collect();
            order.sort_by(|&a, &b| {
                let ra = &queue.pending[a];
                let rb = &queue.pending[b];
                rb.priority
                    .cmp(&ra.priority)
                    .then_with(|| ra.sequence.cmp(&rb.sequence))
            });

            let mut admitted_index = None;
            {
                let mut active = self.active.lock().await;
                for idx in order {
                    let request = &queue.pending[idx];
                    let class_idx = class_index(request.class);
                    if active.active[class_idx] < active.limits[class_idx] {
                        active.active[class_idx] += 1;
                        active.peak[class_idx] = active.peak[class_idx].max(active.active[class_idx]);
                        active.total_admitted += 1;
                        admitted_index = Some(idx);
                        break;
                    }
                }
            }

            match admitted_index {
                Some(idx) => {
                    let mut request = queue.pending.remove(idx);
                    drop(queue);
                    if let Some(tx) = request.start_tx.take() {
                        let _ = tx.send(());
                    }
                    info!(tool = %request.tool, "admitted queued request");
                }
                None => return,
            }
        }
    }

    /// Record a completed execution's wall-clock duration and reclassify
    /// the tool for future admissions.
    pub async fn record_duration(&self, tool: &str, duration_seconds: f64) {
        let mut perf = self.performance.write().await;
        let history = perf
            .entry(tool.to_string())
            .or_insert_with(|| recon_types::ToolPerformanceHistory::new(tool));

        history.total_executions += 1;
        history.total_time_seconds += duration_seconds;
        let new_average = history.total_time_seconds / history.total_executions as f64;

        let effective = if history.total_executions <= 5 {
            0.6 * duration_seconds + 0.4 * new_average
        } else {
            new_average
        };

        history.rolling_average_seconds = new_average;
        history.last_assigned_class = classify_effective(effective);
        history.last_update = Utc::now();

        debug!(
            tool,
            duration_seconds,
            effective,
            class = ?history.last_assigned_class,
            "recorded tool performance"
        );
    }

    pub async fn metrics(&self) -> ConcurrencyMetrics {
        let active = self.active.lock().await;
        let queue = self.queue.lock().await;

        let classes = CLASSES
            .iter()
            .map(|&class| {
                let idx = class_index(class);
                ClassMetrics {
                    class,
                    active: active.active[idx],
                    available: active.limits[idx].saturating_sub(active.active[idx]),
                    total: active.limits[idx],
                    utilisation: if active.limits[idx] == 0 {
                        0.0
                    } else {
                        active.active[idx] as f64 / active.limits[idx] as f64
                    },
                    peak: active.peak[idx],
                }
            })
            .collect();

        let mut queued_tools: Vec<String> = queue.pending.iter().map(|r| r.tool.clone()).collect();
        queued_tools.sort();

        ConcurrencyMetrics {
            classes,
            queue_size: queue.pending.len(),
            queued_tools,
            total_admitted: active.total_admitted,
            total_queued: queue.total_queued,
        }
    }
}

fn classify_effective(effective_seconds: f64) -> ToolClass {
    if effective_seconds < 5.0 {
        ToolClass::Fast
    } else if effective_seconds < 30.0 {
        ToolClass::Medium
    } else {
        ToolClass::Heavy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::future::pending;

    #[tokio::test]
    async fn unknown_tool_classifies_as_medium() {
        let manager = ConcurrencyManager::new(2);
        assert_eq!(manager.classify("nmap").await, ToolClass::Medium);
    }

    #[tokio::test]
    async fn class_cap_is_never_exceeded() {
        let manager = ConcurrencyManager::new(1); // fast=2, medium=1, heavy=1
        let s1 = manager.acquire("a", 100, pending()).await.unwrap();
        assert_eq!(s1.class, ToolClass::Medium);

        let manager_ref = &manager;
        let second = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            manager_ref.acquire("b", 100, pending()),
        )
        .await;
        assert!(second.is_err(), "second medium request should still be queued");

        manager.release(s1).await;
    }

    #[tokio::test]
    async fn releasing_a_slot_admits_the_highest_priority_waiter() {
        let manager = ConcurrencyManager::new(1); // medium cap = 1
        let first = manager.acquire("low", 50, pending()).await.unwrap();

        let manager_arc = std::sync::Arc::new(manager);
        let m2 = manager_arc.clone();
        let high_priority_waiter = tokio::spawn(async move { m2.acquire("high", 200, pending()).await });

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        manager_arc.release(first).await;

        let granted = high_priority_waiter.await.unwrap().unwrap();
        assert_eq!(granted.tool, "high");
    }

    #[tokio::test]
    async fn cancellation_removes_request_from_queue() {
        let manager = ConcurrencyManager::new(1);
        let _held = manager.acquire("holder", 100, pending()).await.unwrap();

        let (cancel_tx, cancel_rx) = oneshot::channel::<()>();
        let manager_arc = std::sync::Arc::new(manager);
        let m2 = manager_arc.clone();
        let waiter = tokio::spawn(async move {
            m2.acquire("cancel-me", 100, async {
                let _ = cancel_rx.await;
            })
            .await
        });

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        cancel_tx.send(()).unwrap();
        let result = waiter.await.unwrap();
        assert!(matches!(result, Err(ConcurrencyError::Cancelled)));

        let metrics = manager_arc.metrics().await;
        assert_eq!(metrics.queue_size, 0);
    }

    #[tokio::test]
    async fn performance_learning_reclassifies_after_heavy_runs() {
        let manager = ConcurrencyManager::new(2);
        manager.record_duration("slow-tool", 40.0).await;
        assert_eq!(manager.classify("slow-tool").await, ToolClass::Heavy);

        manager.record_duration("slow-tool", 35.0).await;
        manager.record_duration("slow-tool", 38.0).await;
        assert_eq!(manager.classify("slow-tool").await, ToolClass::Heavy);
    }

    #[tokio::test]
    async fn performance_learning_classifies_fast_tools() {
        let manager = ConcurrencyManager::new(2);
        manager.record_duration("quick-tool", 1.0).await;
        assert_eq!(manager.classify("quick-tool").await, ToolClass::Fast);
    }

    #[test]
    fn class_limits_follow_the_2n_n_half_n_rule() {
        assert_eq!(class_limits_from_base(4), [8, 4, 2]);
        assert_eq!(class_limits_from_base(1), [2, 1, 1]);
    }
}
