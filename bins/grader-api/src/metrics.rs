// Prometheus metrics for the HTTP adapter

use grader_common::types::Status;
use lazy_static::lazy_static;
use prometheus::{
    register_histogram, register_int_counter_vec, Encoder, Histogram, IntCounterVec, TextEncoder,
};
use std::time::Duration;

lazy_static! {
    pub static ref RUNS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "grader_runs_total",
        "Grading runs by verdict status",
        &["status"]
    )
    .expect("grader_runs_total registers once");
    pub static ref RUN_DURATION: Histogram = register_histogram!(
        "grader_run_duration_seconds",
        "Wall-clock duration of a grading run",
        vec![0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]
    )
    .expect("grader_run_duration_seconds registers once");
}

/// Record one finished run
pub fn observe_run(status: Status, elapsed: Duration) {
    RUNS_TOTAL.with_label_values(&[status.as_str()]).inc();
    RUN_DURATION.observe(elapsed.as_secs_f64());
}

/// Render the default registry in the text exposition format
pub fn render() -> Result<(String, String), prometheus::Error> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&prometheus::gather(), &mut buffer)?;
    let body = String::from_utf8_lossy(&buffer).into_owned();
    Ok((encoder.format_type().to_string(), body))
}
