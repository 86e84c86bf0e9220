pub mod cluster;
pub mod entity;
pub mod event;

pub use cluster::Cluster;
pub use entity::{EntityKind, MonitoredEntity, TelemetryStream};
pub use event::{parse_phase_duration, Event, EventState, Phase, PhaseTimings};
