//! persister-middleware: Pluggable middleware abstractions
//!
//! Provides trait-based abstractions for Transport and Storage, a NATS
//! transport, a local filesystem store, and in-memory implementations for
//! testing.

pub mod error;
pub mod local;
pub mod memory;
pub mod nats;
pub mod storage;
pub mod transport;

pub use error::{StorageError, TransportError};
pub use local::LocalStorage;
pub use nats::NatsTransport;
pub use storage::{ObjectMeta, Storage};
pub use transport::{Subscription, Transport, TransportMessage};
