use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

use crate::error::PersisterError;

pub const DEFAULT_SUBJECT: &str = "contentSubject";
pub const DEFAULT_QUEUE_GROUP: &str = "contentQueue";
pub const DEFAULT_CONCURRENCY: usize = 16;

/// persister: NATS content queue → filesystem
#[derive(Parser, Debug, Clone)]
#[command(name = "persister")]
#[command(about = "NATS queue to filesystem persister for crawled web content")]
pub struct Config {
    /// NATS server URL
    #[arg(long, env = "NATS_URI")]
    pub nats_url: String,

    /// Root directory under which content is stored
    #[arg(long, env = "STORAGE_PATH")]
    pub storage_path: PathBuf,

    /// Subject carrying crawled resources
    #[arg(long, env = "PERSISTER_SUBJECT", default_value = DEFAULT_SUBJECT)]
    pub subject: String,

    /// Queue group shared with sibling persisters
    #[arg(long, env = "PERSISTER_QUEUE_GROUP", default_value = DEFAULT_QUEUE_GROUP)]
    pub queue_group: String,

    /// Maximum deliveries handled concurrently
    #[arg(long, env = "PERSISTER_CONCURRENCY", default_value_t = DEFAULT_CONCURRENCY)]
    pub concurrency: usize,

    /// Subject that receives payloads which failed to decode or store.
    /// Failed deliveries are dropped when unset.
    #[arg(long, env = "DEAD_LETTER_SUBJECT")]
    pub dead_letter_subject: Option<String>,

    /// Health/metrics listen address (disabled when unset)
    #[arg(long, env = "PERSISTER_LISTEN_ADDR")]
    pub listen_addr: Option<SocketAddr>,

    /// Emit logs as JSON
    #[arg(long, env = "PERSISTER_LOG_JSON")]
    pub log_json: bool,
}

impl Config {
    /// Reject values that would make the process useless. Any failure here is
    /// fatal at startup.
    pub fn validate(&self) -> Result<(), PersisterError> {
        if self.nats_url.trim().is_empty() {
            return Err(PersisterError::Config("NATS URL is empty".to_string()));
        }
        if self.subject.trim().is_empty() {
            return Err(PersisterError::Config("Subject is empty".to_string()));
        }
        if self.queue_group.trim().is_empty() {
            return Err(PersisterError::Config("Queue group is empty".to_string()));
        }
        if self.concurrency == 0 {
            return Err(PersisterError::Config(
                "Concurrency must be greater than zero".to_string(),
            ));
        }
        if let Some(subject) = &self.dead_letter_subject {
            if subject.trim().is_empty() {
                return Err(PersisterError::Config(
                    "Dead-letter subject is empty".to_string(),
                ));
            }
            if *subject == self.subject {
                return Err(PersisterError::Config(
                    "Dead-letter subject must differ from the content subject".to_string(),
                ));
            }
        }
        if !self.storage_path.is_dir() {
            return Err(PersisterError::Config(format!(
                "Storage path is not a directory: {}",
                self.storage_path.display()
            )));
        }
        Ok(())
    }
}
