/// Grading Executor - High-Level Orchestration
///
/// **Responsibility:**
/// Turn one GradeRequest into one GradeResponse.
///
/// **Architecture:**
/// 1. Validate the request against the configured limits
/// 2. Synthesize the unit (synthesizer.rs) and load it on the selected backend (engine.rs / isolation.rs)
/// 3. Run every test case under instrumentation (runner.rs)
/// 4. Reduce the case results into a verdict (evaluator.rs)
///
/// Any fault that escapes steps 1-3 becomes an ERROR verdict with zeroed metrics
/// and no case results. This module never panics on user input and never returns
/// a transport-level error.

use crate::config::{ExecutionLimits, GraderConfig, Isolation};
use crate::engine::{Backend, ScriptBackend};
use crate::error::ExecutionFault;
use crate::evaluator;
use crate::isolation::SubprocessBackend;
use crate::runner;
use crate::synthesizer::synthesize;
use grader_common::types::{GradeRequest, GradeResponse, Submission, Verdict};
use std::time::Instant;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

/// Select the backend for the configured isolation mode
pub fn backend_for(config: &GraderConfig) -> Box<dyn Backend> {
    match config.isolation {
        Isolation::InProcess => Box::new(ScriptBackend::new(config.binding, config.limits.clone())),
        Isolation::Subprocess => {
            let program = config
                .child_program
                .clone()
                .or_else(|| std::env::current_exe().ok())
                .unwrap_or_else(|| "grader-worker".into());
            Box::new(SubprocessBackend::new(
                program,
                config.binding,
                config.limits.clone(),
            ))
        }
    }
}

/// Reject requests that exceed the configured limits
pub fn validate(request: &GradeRequest, limits: &ExecutionLimits) -> Result<(), ExecutionFault> {
    if request.function_name.trim().is_empty() {
        return Err(ExecutionFault::Rejected("functionName is empty".to_string()));
    }

    if request.function_body.len() > limits.max_body_bytes {
        return Err(ExecutionFault::Rejected(format!(
            "functionBody is {} bytes (limit {})",
            request.function_body.len(),
            limits.max_body_bytes
        )));
    }

    if request.test_cases.len() > limits.max_test_cases {
        return Err(ExecutionFault::Rejected(format!(
            "{} test cases submitted (limit {})",
            request.test_cases.len(),
            limits.max_test_cases
        )));
    }

    Ok(())
}

fn try_grade(request: &GradeRequest, config: &GraderConfig) -> Result<Verdict, ExecutionFault> {
    validate(request, &config.limits)?;

    let unit = synthesize(&Submission::from(request));
    let executable = backend_for(config).load(&unit)?;

    let case_results = runner::run(
        executable.as_ref(),
        &unit.entry,
        &request.test_cases,
        config.fault_policy,
    )?;

    Ok(evaluator::aggregate(case_results, config.failure_report))
}

/// Grade one request
///
/// Control flow:
/// validate → synthesize → load (once) → run each case in order → aggregate
#[instrument(
    skip(request, config),
    fields(run_id = %Uuid::new_v4(), function = %request.function_name, cases = request.test_cases.len())
)]
pub fn grade(request: &GradeRequest, config: &GraderConfig) -> GradeResponse {
    info!(
        isolation = ?config.isolation,
        binding = ?config.binding,
        fault_policy = ?config.fault_policy,
        "Starting run"
    );
    let start = Instant::now();

    let verdict = match try_grade(request, config) {
        Ok(verdict) => verdict,
        Err(fault) => {
            match &fault {
                ExecutionFault::Rejected(_) => warn!(error = %fault, "Request rejected"),
                _ => error!(error = %fault, "Run aborted"),
            }
            Verdict::error(fault.to_string())
        }
    };

    info!(
        status = %verdict.status,
        failed_case = verdict.failing_case_number,
        avg_time_ms = verdict.average_time_ms,
        avg_memory = verdict.average_memory_bytes,
        total_ms = start.elapsed().as_millis() as u64,
        "Run completed"
    );

    verdict.into()
}

/// Decode and grade a raw request payload. Decode failures become ERROR responses.
pub fn grade_payload(payload: &[u8], config: &GraderConfig) -> GradeResponse {
    match serde_json::from_slice::<GradeRequest>(payload) {
        Ok(request) => grade(&request, config),
        Err(e) => {
            warn!(error = %e, "Undecodable grade request");
            Verdict::error(format!("Invalid request: {}", e)).into()
        }
    }
}
