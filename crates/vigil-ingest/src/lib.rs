pub mod ingestor;
pub mod parser;
pub mod payload;
pub mod resolver;

pub use ingestor::{IngestError, Ingestor};
pub use parser::{EventParser, ParseError};
pub use payload::{TelemetryHost, TelemetryRecord};
pub use resolver::{DnsLookup, HickoryDns, HostResolver};
