use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_histogram_vec, register_int_counter, CounterVec, Encoder,
    HistogramVec, IntCounter, TextEncoder,
};

lazy_static! {
    // Intake metrics
    pub static ref INTAKE_COUNTER: CounterVec = register_counter_vec!(
        "orders_intake_requests_total",
        "Total number of order intake requests by outcome",
        &["outcome"]
    )
    .expect("metric cannot be created");

    // Stream metrics
    pub static ref STREAM_RECORD_COUNTER: CounterVec = register_counter_vec!(
        "orders_stream_records_total",
        "Total number of change-stream records handled by the notifier",
        &["event_name", "outcome"]
    )
    .expect("metric cannot be created");

    pub static ref NOTIFICATION_COUNTER: CounterVec = register_counter_vec!(
        "orders_notifications_total",
        "Total number of status notifications published",
        &["status"]
    )
    .expect("metric cannot be created");

    pub static ref DEAD_LETTER_COUNTER: IntCounter = register_int_counter!(
        "orders_dead_lettered_records_total",
        "Total number of stream records redirected to the dead-letter queue"
    )
    .expect("metric cannot be created");

    pub static ref HANDLER_DURATION: HistogramVec = register_histogram_vec!(
        "orders_handler_duration_seconds",
        "Handler invocation duration in seconds",
        &["handler"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    )
    .expect("metric cannot be created");
}

/// Get all metrics in Prometheus text format
pub fn gather_metrics() -> Result<String, Box<dyn std::error::Error + Send + Sync>> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

/// Record the outcome of one intake request
pub fn record_intake(outcome: &str, duration_secs: f64) {
    INTAKE_COUNTER.with_label_values(&[outcome]).inc();
    HANDLER_DURATION
        .with_label_values(&["intake"])
        .observe(duration_secs);
}

/// Record how one change-stream record was handled
pub fn record_stream_record(event_name: &str, outcome: &str) {
    STREAM_RECORD_COUNTER
        .with_label_values(&[event_name, outcome])
        .inc();
}

/// Record one notifier batch invocation
pub fn record_batch(duration_secs: f64) {
    HANDLER_DURATION
        .with_label_values(&["notifier"])
        .observe(duration_secs);
}

pub fn record_notification(status: &str) {
    NOTIFICATION_COUNTER.with_label_values(&[status]).inc();
}

pub fn record_dead_letters(count: usize) {
    DEAD_LETTER_COUNTER.inc_by(count as u64);
}
