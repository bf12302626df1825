// Test case orchestration: one invocation per case, strictly in input order

use crate::config::FaultPolicy;
use crate::engine::Executable;
use crate::error::ExecutionFault;
use grader_common::types::{CaseResult, TestCase};
use grader_common::value::structural_eq;
use tracing::{debug, warn};

/// Run every test case against a loaded unit.
///
/// Under `FaultPolicy::AbortRun` the first fault stops the run and is returned;
/// results of cases that already ran are dropped. Under `FaultPolicy::RecordCase`
/// a faulted case becomes a failing result carrying the fault text.
pub fn run(
    executable: &dyn Executable,
    function_name: &str,
    test_cases: &[TestCase],
    policy: FaultPolicy,
) -> Result<Vec<CaseResult>, ExecutionFault> {
    let mut results = Vec::with_capacity(test_cases.len());

    for (idx, test_case) in test_cases.iter().enumerate() {
        let case_number = idx + 1;
        let measured = executable.invoke_measured(function_name, &test_case.input);

        let result = match measured.value {
            Ok(invocation) => {
                let passed = structural_eq(&invocation.output, &test_case.expected_output);
                debug!(
                    case = case_number,
                    passed,
                    elapsed_ms = measured.elapsed_ms,
                    memory_delta = measured.memory_delta_bytes,
                    "Case executed"
                );
                CaseResult {
                    case_number,
                    elapsed_time_ms: measured.elapsed_ms,
                    memory_delta_bytes: measured.memory_delta_bytes,
                    passed,
                    actual_output: Some(invocation.output),
                    console_output: invocation.console,
                    error: None,
                }
            }
            Err(fault) => match policy {
                FaultPolicy::AbortRun => {
                    warn!(case = case_number, error = %fault, "Case faulted; aborting run");
                    return Err(fault);
                }
                FaultPolicy::RecordCase => {
                    warn!(case = case_number, error = %fault, "Case faulted; recorded as failed");
                    CaseResult {
                        case_number,
                        elapsed_time_ms: measured.elapsed_ms,
                        memory_delta_bytes: measured.memory_delta_bytes,
                        passed: false,
                        actual_output: None,
                        console_output: Vec::new(),
                        error: Some(fault.to_string()),
                    }
                }
            },
        };

        results.push(result);
    }

    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Invocation;
    use grader_common::value::Value;
    use serde_json::json;
    use std::cell::RefCell;

    /// Doubles its single argument; faults on zero
    struct Doubler {
        calls: RefCell<Vec<Value>>,
    }

    impl Doubler {
        fn new() -> Self {
            Self {
                calls: RefCell::new(Vec::new()),
            }
        }
    }

    impl Executable for Doubler {
        fn invoke(&self, name: &str, args: &[Value]) -> Result<Invocation, ExecutionFault> {
            assert_eq!(name, "double");
            self.calls.borrow_mut().push(args[0].clone());
            match args[0].as_i64() {
                Some(0) => Err(ExecutionFault::Invocation("Division by zero".to_string())),
                Some(n) => Ok(Invocation {
                    output: json!(n * 2),
                    console: vec![format!("n={}", n)],
                }),
                None => Err(ExecutionFault::Invocation("not a number".to_string())),
            }
        }
    }

    fn case(input: i64, expected: i64) -> TestCase {
        TestCase {
            input: vec![json!(input)],
            expected_output: json!(expected),
        }
    }

    #[test]
    fn test_results_follow_input_order() {
        let exe = Doubler::new();
        let cases = vec![case(1, 2), case(2, 5), case(3, 6)];

        let results = run(&exe, "double", &cases, FaultPolicy::AbortRun).unwrap();

        assert_eq!(results.len(), 3);
        assert_eq!(
            results.iter().map(|r| r.case_number).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
        assert_eq!(
            results.iter().map(|r| r.passed).collect::<Vec<_>>(),
            vec![true, false, true]
        );
        assert_eq!(results[1].actual_output, Some(json!(4)));
        assert_eq!(results[2].console_output, vec!["n=3"]);
        assert_eq!(*exe.calls.borrow(), vec![json!(1), json!(2), json!(3)]);
    }

    #[test]
    fn test_fault_aborts_run() {
        let exe = Doubler::new();
        let cases = vec![case(1, 2), case(0, 0), case(3, 6)];

        let err = run(&exe, "double", &cases, FaultPolicy::AbortRun).unwrap_err();

        assert_eq!(err, ExecutionFault::Invocation("Division by zero".to_string()));
        // Case 3 never ran
        assert_eq!(exe.calls.borrow().len(), 2);
    }

    #[test]
    fn test_fault_recorded_per_case() {
        let exe = Doubler::new();
        let cases = vec![case(1, 2), case(0, 0), case(3, 6)];

        let results = run(&exe, "double", &cases, FaultPolicy::RecordCase).unwrap();

        assert_eq!(results.len(), 3);
        assert!(results[0].passed);
        assert!(!results[1].passed);
        assert_eq!(results[1].actual_output, None);
        assert_eq!(
            results[1].error.as_deref(),
            Some("Invocation error: Division by zero")
        );
        assert!(results[2].passed);
    }

    #[test]
    fn test_empty_case_list() {
        let exe = Doubler::new();
        let results = run(&exe, "double", &[], FaultPolicy::AbortRun).unwrap();
        assert!(results.is_empty());
    }
}
