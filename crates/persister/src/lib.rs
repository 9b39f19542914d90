//! persister: NATS queue to filesystem persister for crawled web content
//!
//! Each delivery on the content subject carries a JSON `{url, content}`
//! record. The content is written to `{url without scheme}/{epoch seconds}`
//! under the configured storage root.

pub mod clock;
pub mod config;
pub mod consumer;
pub mod dead_letter;
pub mod error;
pub mod message;
pub mod metrics;
pub mod path;
pub mod server;
pub mod title;

pub use config::Config;
pub use consumer::{DeliveryOutcome, QueueConsumer};
pub use error::{DecodeError, PersisterError};
pub use message::ResourceMessage;
pub use path::derive_path;
