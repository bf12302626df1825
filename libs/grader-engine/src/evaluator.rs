/// Verdict Aggregator - Pure Reduction of Case Results
///
/// **Core Responsibility:**
/// Reduce the per-case records of a completed run into one Verdict.
///
/// **Critical Properties:**
/// - Knows nothing about the script runtime
/// - Knows nothing about isolation or transport
/// - Pure function: (case results, report policy) → verdict
///
/// **Aggregation Rules:**
/// - averageTimeMs / averageMemoryBytes = arithmetic means, 0 for an empty run
/// - status = FAILED if any case did not pass, otherwise PASSED
/// - failingCaseNumber = last failing case (or first, per policy); -1 when PASSED
///
/// A run that faulted never reaches this module; the caller builds the ERROR
/// verdict directly.

use crate::config::FailureReport;
use grader_common::types::{CaseResult, Status, Verdict, NO_FAILING_CASE};

/// Aggregate case results into the final verdict
pub fn aggregate(case_results: Vec<CaseResult>, report: FailureReport) -> Verdict {
    let count = case_results.len();

    let (average_time_ms, average_memory_bytes) = if count == 0 {
        (0.0, 0.0)
    } else {
        let total_time: f64 = case_results.iter().map(|r| r.elapsed_time_ms as f64).sum();
        let total_memory: f64 = case_results.iter().map(|r| r.memory_delta_bytes as f64).sum();
        (total_time / count as f64, total_memory / count as f64)
    };

    let mut failing = case_results.iter().filter(|r| !r.passed);
    let failing_case = match report {
        FailureReport::Last => failing.last(),
        FailureReport::First => failing.next(),
    };

    let (status, failing_case_number) = match failing_case {
        Some(result) => (Status::Failed, result.case_number as i64),
        None => (Status::Passed, NO_FAILING_CASE),
    };

    Verdict {
        status,
        failing_case_number,
        average_time_ms,
        average_memory_bytes,
        case_results,
        message: None,
    }
}
