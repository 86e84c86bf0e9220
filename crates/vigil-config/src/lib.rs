pub mod file_source;
pub mod manager;
pub mod source;
pub mod thresholds;

pub use file_source::FileSource;
pub use manager::{ConfigChange, ConfigManager};
pub use source::{ConfigSource, ConfigWatcher, StaticSource};
pub use thresholds::{ThresholdError, Thresholds};
