use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Grading request as delivered by the hosting platform
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeRequest {
    pub function_name: String,
    /// Parameter declarations, order-significant
    #[serde(default)]
    pub function_args: Vec<String>,
    pub function_body: String,
    pub test_cases: Vec<TestCase>,
}

/// One input/expected-output pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCase {
    pub input: Vec<Value>,
    #[serde(rename = "output")]
    pub expected_output: Value,
}

/// The function under grade: name, parameter declarations and body text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    pub name: String,
    pub parameters: Vec<String>,
    pub body: String,
}

impl From<&GradeRequest> for Submission {
    fn from(request: &GradeRequest) -> Self {
        Self {
            name: request.function_name.clone(),
            parameters: request.function_args.clone(),
            body: request.function_body.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Status {
    Passed,
    Failed,
    Error,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Passed => "PASSED",
            Status::Failed => "FAILED",
            Status::Error => "ERROR",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of running one test case
#[derive(Debug, Clone, PartialEq)]
pub struct CaseResult {
    /// 1-based position of the case in the request
    pub case_number: usize,
    pub elapsed_time_ms: u64,
    /// Live-heap delta around the call; may be negative
    pub memory_delta_bytes: i64,
    pub passed: bool,
    /// Absent when the case faulted
    pub actual_output: Option<Value>,
    pub console_output: Vec<String>,
    pub error: Option<String>,
}

/// Sentinel for "no failing case"
pub const NO_FAILING_CASE: i64 = -1;

/// Final grading outcome of a run
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    pub status: Status,
    pub failing_case_number: i64,
    pub average_time_ms: f64,
    pub average_memory_bytes: f64,
    pub case_results: Vec<CaseResult>,
    pub message: Option<String>,
}

impl Verdict {
    /// Run-level fault: zeroed metrics and no per-case results
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: Status::Error,
            failing_case_number: NO_FAILING_CASE,
            average_time_ms: 0.0,
            average_memory_bytes: 0.0,
            case_results: Vec::new(),
            message: Some(message.into()),
        }
    }
}

/// Grading response as returned to the hosting platform
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeResponse {
    #[serde(rename = "STATUS")]
    pub status: Status,
    pub failed_case_no: i64,
    pub avg_time: f64,
    pub avg_memory: f64,
    pub results: Vec<CaseReport>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseReport {
    pub case_no: usize,
    pub time: u64,
    pub memory: i64,
    pub passed: bool,
    pub output: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub console_output: Vec<String>,
}

impl From<CaseResult> for CaseReport {
    fn from(result: CaseResult) -> Self {
        Self {
            case_no: result.case_number,
            time: result.elapsed_time_ms,
            memory: result.memory_delta_bytes,
            passed: result.passed,
            output: result.actual_output.unwrap_or(Value::Null),
            error: result.error,
            console_output: result.console_output,
        }
    }
}

impl From<Verdict> for GradeResponse {
    fn from(verdict: Verdict) -> Self {
        Self {
            status: verdict.status,
            failed_case_no: verdict.failing_case_number,
            avg_time: verdict.average_time_ms,
            avg_memory: verdict.average_memory_bytes,
            results: verdict.case_results.into_iter().map(CaseReport::from).collect(),
            message: verdict.message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_wire_names() {
        let request: GradeRequest = serde_json::from_value(json!({
            "functionName": "add",
            "functionArgs": ["a", "b"],
            "functionBody": "a + b",
            "testCases": [{ "input": [2, 3], "output": 5 }]
        }))
        .unwrap();

        assert_eq!(request.function_name, "add");
        assert_eq!(request.function_args, vec!["a", "b"]);
        assert_eq!(request.test_cases[0].input, vec![json!(2), json!(3)]);
        assert_eq!(request.test_cases[0].expected_output, json!(5));
    }

    #[test]
    fn test_request_requires_expected_output() {
        let parsed = serde_json::from_value::<GradeRequest>(json!({
            "functionName": "f",
            "functionBody": "1",
            "testCases": [{ "input": [] }]
        }));
        assert!(parsed.is_err());
    }

    #[test]
    fn test_error_verdict_wire_shape() {
        let response = GradeResponse::from(Verdict::error("boom"));
        let wire = serde_json::to_value(&response).unwrap();

        assert_eq!(wire["STATUS"], "ERROR");
        assert_eq!(wire["failedCaseNo"], -1);
        assert_eq!(wire["avgTime"], 0.0);
        assert_eq!(wire["avgMemory"], 0.0);
        assert_eq!(wire["results"], json!([]));
        assert_eq!(wire["message"], "boom");
    }

    #[test]
    fn test_case_report_omits_empty_extras() {
        let report = CaseReport::from(CaseResult {
            case_number: 1,
            elapsed_time_ms: 3,
            memory_delta_bytes: -16,
            passed: true,
            actual_output: Some(json!(5)),
            console_output: Vec::new(),
            error: None,
        });
        let wire = serde_json::to_value(&report).unwrap();

        assert_eq!(
            wire,
            json!({ "caseNo": 1, "time": 3, "memory": -16, "passed": true, "output": 5 })
        );
    }

    #[test]
    fn test_faulted_case_reports_null_output() {
        let report = CaseReport::from(CaseResult {
            case_number: 2,
            elapsed_time_ms: 0,
            memory_delta_bytes: 0,
            passed: false,
            actual_output: None,
            console_output: vec!["hi".to_string()],
            error: Some("Division by zero".to_string()),
        });
        let wire = serde_json::to_value(&report).unwrap();

        assert_eq!(wire["output"], Value::Null);
        assert_eq!(wire["error"], "Division by zero");
        assert_eq!(wire["consoleOutput"], json!(["hi"]));
    }

    #[test]
    fn test_status_display() {
        assert_eq!(Status::Passed.to_string(), "PASSED");
        assert_eq!(serde_json::to_value(Status::Failed).unwrap(), "FAILED");
    }
}
