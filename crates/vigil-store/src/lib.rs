pub mod memory;
pub mod query;
pub mod store;

pub use memory::MemoryEventStore;
pub use query::EventQuery;
pub use store::EventStore;
