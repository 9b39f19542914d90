//! In-memory implementations for testing
pub mod storage;
pub mod transport;

pub use storage::InMemoryStorage;
pub use transport::InMemoryTransport;
