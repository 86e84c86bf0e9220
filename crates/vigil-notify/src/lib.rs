pub mod manager;
pub mod message;
pub mod providers;
pub mod sink;

pub use manager::AlertManager;
pub use message::{AlertChannel, AlertLevel, AlertMessage, AlertWindow};
pub use providers::{EmailConfig, EmailSink, LogSink, WebhookConfig, WebhookSink};
pub use sink::{AlertSink, SinkResult};
