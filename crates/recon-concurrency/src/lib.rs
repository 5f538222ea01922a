//! Concurrency Manager and Resource Monitor: the two gates that decide
//! whether an invocation or a workflow may proceed right now.

pub mod errors;
pub mod manager;
pub mod resource_monitor;

pub use errors::ConcurrencyError;
pub use manager::{class_limits_from_base, ClassMetrics, ConcurrencyManager, ConcurrencyMetrics, Slot};
pub use resource_monitor::ResourceMonitor;
