//! Resource Monitor: caches the last-sampled system load and exposes a
//! single admission predicate. The actual OS probing is an external
//! collaborator; this component only stores and checks the numbers.

use recon_types::ResourceLimits;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Copy, Default)]
struct Sample {
    cpu_percent: f64,
    memory_percent: f64,
    active_tools: usize,
}

/// Read/write-locked cache of the last sample, checked against configured
/// limits by [`ResourceMonitor::can_admit_workflow`].
pub struct ResourceMonitor {
    limits: ResourceLimits,
    sample: RwLock<Sample>,
}

impl ResourceMonitor {
    pub fn new(limits: ResourceLimits) -> Self {
        Self {
            limits,
            sample: RwLock::new(Sample::default()),
        }
    }

    /// Called periodically by the external updater.
    pub async fn update_sample(&self, cpu_percent: f64, memory_percent: f64, active_tools: usize) {
        let mut sample = self.sample.write().await;
        sample.cpu_percent = cpu_percent;
        sample.memory_percent = memory_percent;
        sample.active_tools = active_tools;
    }

    /// True iff cpu%, memory% and active tool count are all strictly under
    /// their configured caps. Equal-to-cap blocks admission.
    pub async fn can_admit_workflow(&self) -> bool {
        let sample = self.sample.read().await;
        sample.cpu_percent < self.limits.max_cpu_usage
            && sample.memory_percent < self.limits.max_memory_usage
            && sample.active_tools < self.limits.max_active_tools
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits() -> ResourceLimits {
        ResourceLimits {
            max_cpu_usage: 90.0,
            max_memory_usage: 90.0,
            max_active_tools: 4,
        }
    }

    #[tokio::test]
    async fn admits_when_all_under_caps() {
        let monitor = ResourceMonitor::new(limits());
        monitor.update_sample(50.0, 50.0, 2).await;
        assert!(monitor.can_admit_workflow().await);
    }

    #[tokio::test]
    async fn blocks_when_cpu_at_cap() {
        let monitor = ResourceMonitor::new(limits());
        monitor.update_sample(90.0, 10.0, 0).await;
        assert!(!monitor.can_admit_workflow().await);
    }

    #[tokio::test]
    async fn blocks_when_active_tools_at_cap() {
        let monitor = ResourceMonitor::new(limits());
        monitor.update_sample(10.0, 10.0, 4).await;
        assert!(!monitor.can_admit_workflow().await);
    }

    #[tokio::test]
    async fn admits_just_under_cap() {
        let monitor = ResourceMonitor::new(limits());
        monitor.update_sample(89.9, 89.9, 3).await;
        assert!(monitor.can_admit_workflow().await);
    }
}
