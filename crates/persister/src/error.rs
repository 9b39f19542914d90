use thiserror::Error;

use persister_middleware::TransportError;

/// Fatal startup errors
#[derive(Error, Debug)]
pub enum PersisterError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Inbound payload is not a well-formed resource record
#[derive(Error, Debug)]
#[error("Decode error: {0}")]
pub struct DecodeError(#[from] pub serde_json::Error);
