//! Optional sink for deliveries that could not be persisted
//!
//! The original payload is republished unchanged; the failure is described in
//! headers so an operator can replay or inspect it later.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use persister_middleware::{Transport, TransportError, TransportMessage};

pub const HEADER_FAILURE: &str = "Persister-Failure";
pub const HEADER_ERROR: &str = "Persister-Error";
pub const HEADER_SOURCE_SUBJECT: &str = "Persister-Source-Subject";

/// Stage of the pipeline that rejected a delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Decode,
    Write,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Decode => "decode",
            FailureKind::Write => "write",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub struct DeadLetterSink {
    transport: Arc<dyn Transport>,
    subject: String,
}

impl DeadLetterSink {
    pub fn new(transport: Arc<dyn Transport>, subject: impl Into<String>) -> Self {
        Self {
            transport,
            subject: subject.into(),
        }
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Republish a failed delivery's payload with failure headers
    pub async fn send(
        &self,
        failed: &TransportMessage,
        kind: FailureKind,
        error: &str,
    ) -> Result<(), TransportError> {
        let mut headers = HashMap::with_capacity(3);
        headers.insert(HEADER_FAILURE.to_string(), kind.as_str().to_string());
        // Header values cannot carry line breaks.
        headers.insert(HEADER_ERROR.to_string(), error.replace(['\r', '\n'], " "));
        headers.insert(HEADER_SOURCE_SUBJECT.to_string(), failed.subject.clone());

        self.transport
            .publish_with_headers(&self.subject, failed.payload.clone(), headers)
            .await
    }
}
