//! Prometheus metrics for the persister
//!
//! All series are labelled by the subject being consumed.

use once_cell::sync::Lazy;
use prometheus::{
    register_gauge_vec, register_int_counter_vec, register_int_gauge_vec, Encoder, GaugeVec,
    IntCounterVec, IntGaugeVec, TextEncoder,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

const LABEL_SUBJECT: &str = "subject";

static MESSAGES_RECEIVED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "persister_messages_received_total",
        "Total deliveries received from the queue",
        &[LABEL_SUBJECT]
    )
    .expect("Failed to register messages_received_total metric")
});

static MESSAGES_STORED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "persister_messages_stored_total",
        "Total deliveries whose content was written to storage",
        &[LABEL_SUBJECT]
    )
    .expect("Failed to register messages_stored_total metric")
});

static BYTES_STORED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "persister_bytes_stored_total",
        "Total content bytes written to storage",
        &[LABEL_SUBJECT]
    )
    .expect("Failed to register bytes_stored_total metric")
});

static DECODE_FAILURES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "persister_decode_failures_total",
        "Total deliveries dropped because the payload failed to decode",
        &[LABEL_SUBJECT]
    )
    .expect("Failed to register decode_failures_total metric")
});

static WRITE_FAILURES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "persister_write_failures_total",
        "Total deliveries dropped because the storage write failed",
        &[LABEL_SUBJECT]
    )
    .expect("Failed to register write_failures_total metric")
});

static DEAD_LETTERS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "persister_dead_letters_total",
        "Total failed deliveries published to the dead-letter subject",
        &[LABEL_SUBJECT]
    )
    .expect("Failed to register dead_letters_total metric")
});

static IN_FLIGHT: Lazy<IntGaugeVec> = Lazy::new(|| {
    register_int_gauge_vec!(
        "persister_in_flight",
        "Deliveries currently being handled",
        &[LABEL_SUBJECT]
    )
    .expect("Failed to register in_flight metric")
});

static LAST_STORED_TIMESTAMP: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "persister_last_stored_timestamp",
        "Unix timestamp of the last successful write",
        &[LABEL_SUBJECT]
    )
    .expect("Failed to register last_stored_timestamp metric")
});

/// Handle for recording metrics for one consumed subject
#[derive(Clone)]
pub struct ConsumerMetrics {
    subject: String,
    /// Epoch seconds of the last successful write, 0 if none. Shared with
    /// the health server.
    last_stored_epoch_secs: Arc<AtomicU64>,
}

impl ConsumerMetrics {
    pub fn new(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            last_stored_epoch_secs: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn last_stored_handle(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.last_stored_epoch_secs)
    }

    pub fn inc_received(&self) {
        MESSAGES_RECEIVED_TOTAL
            .with_label_values(&[&self.subject])
            .inc();
    }

    /// Record a successful write of `bytes` at `epoch_secs`
    pub fn record_stored(&self, bytes: u64, epoch_secs: i64) {
        MESSAGES_STORED_TOTAL
            .with_label_values(&[&self.subject])
            .inc();
        BYTES_STORED_TOTAL
            .with_label_values(&[&self.subject])
            .inc_by(bytes);
        LAST_STORED_TIMESTAMP
            .with_label_values(&[&self.subject])
            .set(epoch_secs as f64);
        self.last_stored_epoch_secs
            .store(epoch_secs.max(0) as u64, Ordering::SeqCst);
    }

    pub fn inc_decode_failure(&self) {
        DECODE_FAILURES_TOTAL
            .with_label_values(&[&self.subject])
            .inc();
    }

    pub fn inc_write_failure(&self) {
        WRITE_FAILURES_TOTAL
            .with_label_values(&[&self.subject])
            .inc();
    }

    pub fn inc_dead_letter(&self) {
        DEAD_LETTERS_TOTAL
            .with_label_values(&[&self.subject])
            .inc();
    }

    pub fn inc_in_flight(&self) {
        IN_FLIGHT.with_label_values(&[&self.subject]).inc();
    }

    pub fn dec_in_flight(&self) {
        IN_FLIGHT.with_label_values(&[&self.subject]).dec();
    }

    /// Raise the in-flight gauge until the returned guard is dropped,
    /// including when the handler unwinds.
    pub fn track_in_flight(&self) -> InFlightGuard<'_> {
        self.inc_in_flight();
        InFlightGuard { metrics: self }
    }

    pub fn get_received_total(&self) -> u64 {
        MESSAGES_RECEIVED_TOTAL
            .with_label_values(&[&self.subject])
            .get()
    }

    pub fn get_stored_total(&self) -> u64 {
        MESSAGES_STORED_TOTAL
            .with_label_values(&[&self.subject])
            .get()
    }

    pub fn get_bytes_stored(&self) -> u64 {
        BYTES_STORED_TOTAL
            .with_label_values(&[&self.subject])
            .get()
    }

    pub fn get_decode_failures(&self) -> u64 {
        DECODE_FAILURES_TOTAL
            .with_label_values(&[&self.subject])
            .get()
    }

    pub fn get_write_failures(&self) -> u64 {
        WRITE_FAILURES_TOTAL
            .with_label_values(&[&self.subject])
            .get()
    }

    pub fn get_dead_letters(&self) -> u64 {
        DEAD_LETTERS_TOTAL
            .with_label_values(&[&self.subject])
            .get()
    }

    pub fn get_in_flight(&self) -> i64 {
        IN_FLIGHT.with_label_values(&[&self.subject]).get()
    }
}

/// Lowers the in-flight gauge on drop
pub struct InFlightGuard<'a> {
    metrics: &'a ConsumerMetrics,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.metrics.dec_in_flight();
    }
}

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| {
        prometheus::Error::Msg(format!("Failed to encode metrics as UTF-8: {}", e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_consumer_metrics() {
        let metrics = ConsumerMetrics::new("metrics-test-subject");

        metrics.inc_received();
        metrics.inc_received();
        metrics.record_stored(1024, 1570788418);
        metrics.inc_decode_failure();
        metrics.inc_write_failure();
        metrics.inc_dead_letter();
        metrics.inc_in_flight();
        metrics.dec_in_flight();

        assert_eq!(metrics.get_received_total(), 2);
        assert_eq!(metrics.get_stored_total(), 1);
        assert_eq!(metrics.get_bytes_stored(), 1024);
        assert_eq!(metrics.get_decode_failures(), 1);
        assert_eq!(metrics.get_write_failures(), 1);
        assert_eq!(metrics.get_dead_letters(), 1);
        assert_eq!(metrics.get_in_flight(), 0);
        assert_eq!(
            metrics.last_stored_handle().load(Ordering::SeqCst),
            1570788418
        );
    }

    #[test]
    fn test_in_flight_guard_lowers_gauge_on_drop() {
        let metrics = ConsumerMetrics::new("metrics-guard-subject");
        {
            let _first = metrics.track_in_flight();
            let _second = metrics.track_in_flight();
            assert_eq!(metrics.get_in_flight(), 2);
        }
        assert_eq!(metrics.get_in_flight(), 0);

        let unwound = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = metrics.track_in_flight();
            panic!("handler failed");
        }));
        assert!(unwound.is_err());
        assert_eq!(metrics.get_in_flight(), 0);
    }

    #[test]
    fn test_encode_metrics() {
        ConsumerMetrics::new("metrics-encode-subject").inc_received();
        let body = encode_metrics().unwrap();
        assert!(body.contains("persister_messages_received_total"));
    }
}
