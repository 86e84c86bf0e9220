pub mod backoff;
pub mod cluster;
pub mod liveness;
pub mod logon;
pub mod pipeline;
pub mod scheduler;
pub mod ux;

pub use backoff::BackoffGate;
pub use cluster::ClusterDetector;
pub use liveness::LivenessTracker;
pub use logon::{FailedLogonBreach, FailedLogonMonitor};
pub use pipeline::MonitorPipeline;
pub use scheduler::MonitorScheduler;
pub use ux::{PhaseStats, ScopeFilter, TimeBucket, UxBreach, UxEvaluator};
