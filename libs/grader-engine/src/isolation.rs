/// Per-invocation process isolation
///
/// The parent compile-checks the unit once in process, then runs every
/// invocation in a fresh child process (`<program> invoke-child`):
///
/// ```text
/// parent --ChildRequest (JSON, stdin)--> child
/// parent <--ChildResponse (JSON, stdout)-- child
/// ```
///
/// The child measures its own elapsed time and heap delta, so one case cannot
/// inflate the numbers of another. The parent enforces the deadline plus a grace
/// period and kills the child when it overruns.

use crate::config::{ArgumentBinding, ExecutionLimits};
use crate::engine::{Backend, Executable, Invocation, ScriptBackend};
use crate::error::ExecutionFault;
use crate::instrument::Measured;
use crate::synthesizer::UnitDefinition;
use anyhow::{Context, Result};
use grader_common::value::Value;
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Argument that switches a grader binary into child mode
pub const CHILD_SUBCOMMAND: &str = "invoke-child";

/// Extra time granted to the child on top of the case deadline
const CHILD_GRACE_MS: u64 = 500;
const POLL_INTERVAL: Duration = Duration::from_millis(2);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChildRequest {
    pub unit: UnitDefinition,
    pub function_name: String,
    pub args: Vec<Value>,
    pub binding: ArgumentBinding,
    pub limits: ExecutionLimits,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ChildOutcome {
    Completed { output: Value, console: Vec<String> },
    Faulted { fault: ExecutionFault },
}

impl From<Result<Invocation, ExecutionFault>> for ChildOutcome {
    fn from(result: Result<Invocation, ExecutionFault>) -> Self {
        match result {
            Ok(invocation) => ChildOutcome::Completed {
                output: invocation.output,
                console: invocation.console,
            },
            Err(fault) => ChildOutcome::Faulted { fault },
        }
    }
}

impl ChildOutcome {
    pub fn into_result(self) -> Result<Invocation, ExecutionFault> {
        match self {
            ChildOutcome::Completed { output, console } => Ok(Invocation { output, console }),
            ChildOutcome::Faulted { fault } => Err(fault),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChildResponse {
    pub outcome: ChildOutcome,
    pub elapsed_ms: u64,
    pub memory_delta_bytes: i64,
}

/// Backend that runs each invocation in its own process
#[derive(Debug, Clone)]
pub struct SubprocessBackend {
    program: PathBuf,
    binding: ArgumentBinding,
    limits: ExecutionLimits,
}

impl SubprocessBackend {
    pub fn new(program: PathBuf, binding: ArgumentBinding, limits: ExecutionLimits) -> Self {
        Self {
            program,
            binding,
            limits,
        }
    }
}

impl Backend for SubprocessBackend {
    fn load(&self, unit: &UnitDefinition) -> Result<Box<dyn Executable>, ExecutionFault> {
        // Surface load errors once, before any child is spawned
        ScriptBackend::new(self.binding, self.limits.clone()).compile(unit)?;

        Ok(Box::new(SubprocessUnit {
            program: self.program.clone(),
            unit: unit.clone(),
            binding: self.binding,
            limits: self.limits.clone(),
        }))
    }
}

/// When the parent gives up on a child; None when there is no deadline
fn child_deadline(start: Instant, timeout_ms: u64) -> Option<Instant> {
    if timeout_ms == 0 {
        return None;
    }
    start.checked_add(Duration::from_millis(timeout_ms.saturating_add(CHILD_GRACE_MS)))
}

/// Kills and reaps the child unless disarmed
struct ChildGuard {
    child: Child,
    armed: bool,
}

impl ChildGuard {
    fn new(child: Child) -> Self {
        Self { child, armed: true }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for ChildGuard {
    fn drop(&mut self) {
        if self.armed {
            if let Err(e) = self.child.kill() {
                warn!(pid = self.child.id(), error = %e, "Failed to kill isolated child");
            }
            let _ = self.child.wait();
        }
    }
}

pub struct SubprocessUnit {
    program: PathBuf,
    unit: UnitDefinition,
    binding: ArgumentBinding,
    limits: ExecutionLimits,
}

impl SubprocessUnit {
    fn run_child(&self, request: &ChildRequest) -> Result<ChildResponse, ExecutionFault> {
        let payload = serde_json::to_vec(request).map_err(|e| {
            ExecutionFault::Invocation(format!("Failed to encode child request: {}", e))
        })?;

        let child = Command::new(&self.program)
            .arg(CHILD_SUBCOMMAND)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| {
                ExecutionFault::Invocation(format!(
                    "Failed to spawn {}: {}",
                    self.program.display(),
                    e
                ))
            })?;
        let mut guard = ChildGuard::new(child);
        debug!(pid = guard.child.id(), "Isolated child spawned");

        if let Some(mut stdin) = guard.child.stdin.take() {
            stdin.write_all(&payload).map_err(|e| {
                ExecutionFault::Invocation(format!("Failed to send request to child: {}", e))
            })?;
        }

        let mut stdout = guard
            .child
            .stdout
            .take()
            .ok_or_else(|| ExecutionFault::Invocation("Child stdout unavailable".to_string()))?;
        let reader = thread::spawn(move || {
            let mut buf = Vec::new();
            stdout.read_to_end(&mut buf).map(|_| buf)
        });

        let timeout_ms = self.limits.case_timeout_ms;
        let deadline = child_deadline(Instant::now(), timeout_ms);
        let status = loop {
            match guard.child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) if deadline.is_some_and(|d| Instant::now() >= d) => {
                    warn!(pid = guard.child.id(), timeout_ms, "Isolated child overran its deadline; killing");
                    return Err(ExecutionFault::Timeout(timeout_ms));
                }
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Err(e) => {
                    return Err(ExecutionFault::Invocation(format!(
                        "Failed to wait for child: {}",
                        e
                    )))
                }
            }
        };
        guard.disarm();

        let output = reader
            .join()
            .map_err(|_| ExecutionFault::Invocation("Child output reader panicked".to_string()))?
            .map_err(|e| ExecutionFault::Invocation(format!("Failed to read child output: {}", e)))?;

        if output.is_empty() {
            return Err(ExecutionFault::Invocation(format!(
                "Isolated invocation exited ({}) without a response",
                status
            )));
        }

        serde_json::from_slice(&output)
            .map_err(|e| ExecutionFault::Invocation(format!("Malformed child response: {}", e)))
    }
}

impl Executable for SubprocessUnit {
    fn invoke(&self, name: &str, args: &[Value]) -> Result<Invocation, ExecutionFault> {
        self.invoke_measured(name, args).value
    }

    fn invoke_measured(
        &self,
        name: &str,
        args: &[Value],
    ) -> Measured<Result<Invocation, ExecutionFault>> {
        let request = ChildRequest {
            unit: self.unit.clone(),
            function_name: name.to_string(),
            args: args.to_vec(),
            binding: self.binding,
            limits: self.limits.clone(),
        };

        let started = Instant::now();
        match self.run_child(&request) {
            Ok(response) => Measured {
                value: response.outcome.into_result(),
                elapsed_ms: response.elapsed_ms,
                memory_delta_bytes: response.memory_delta_bytes,
            },
            Err(fault) => Measured {
                value: Err(fault),
                elapsed_ms: started.elapsed().as_millis() as u64,
                memory_delta_bytes: 0,
            },
        }
    }
}

/// Child side: compile, invoke once under instrumentation, report
pub fn handle_child(request: ChildRequest) -> ChildResponse {
    let backend = ScriptBackend::new(request.binding, request.limits);
    let measured = match backend.compile(&request.unit) {
        Ok(unit) => unit.invoke_measured(&request.function_name, &request.args),
        Err(fault) => Measured {
            value: Err(fault),
            elapsed_ms: 0,
            memory_delta_bytes: 0,
        },
    };

    ChildResponse {
        outcome: ChildOutcome::from(measured.value),
        elapsed_ms: measured.elapsed_ms,
        memory_delta_bytes: measured.memory_delta_bytes,
    }
}

/// Read one ChildRequest from `input` and write its ChildResponse to `output`
pub fn serve_child<R: Read, W: Write>(input: R, mut output: W) -> Result<()> {
    let request: ChildRequest =
        serde_json::from_reader(input).context("Failed to decode child request")?;
    let response = handle_child(request);
    serde_json::to_writer(&mut output, &response).context("Failed to encode child response")?;
    output.flush().context("Failed to flush child response")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthesizer::synthesize;
    use grader_common::types::Submission;
    use serde_json::json;

    fn unit(params: &[&str], body: &str) -> UnitDefinition {
        synthesize(&Submission {
            name: "f".to_string(),
            parameters: params.iter().map(|p| p.to_string()).collect(),
            body: body.to_string(),
        })
    }

    fn request(unit: UnitDefinition, args: Vec<Value>) -> ChildRequest {
        ChildRequest {
            unit,
            function_name: "f".to_string(),
            args,
            binding: ArgumentBinding::Declared,
            limits: ExecutionLimits::default(),
        }
    }

    #[test]
    fn test_handle_child_completes() {
        let response = handle_child(request(unit(&["a"], "print(a); a * 10"), vec![json!(4)]));
        assert_eq!(
            response.outcome,
            ChildOutcome::Completed {
                output: json!(40),
                console: vec!["4".to_string()],
            }
        );
    }

    #[test]
    fn test_handle_child_reports_fault() {
        let response = handle_child(request(unit(&["a"], "a / 0"), vec![json!(4)]));
        match response.outcome {
            ChildOutcome::Faulted { fault } => assert!(fault.is_invocation()),
            other => panic!("expected fault, got {:?}", other),
        }
    }

    #[test]
    fn test_serve_child_round_trip() {
        let payload = serde_json::to_vec(&request(unit(&["a", "b"], "a + b"), vec![json!(2), json!(3)]))
            .unwrap();
        let mut out = Vec::new();

        serve_child(payload.as_slice(), &mut out).unwrap();

        let response: ChildResponse = serde_json::from_slice(&out).unwrap();
        assert_eq!(response.outcome.into_result().unwrap().output, json!(5));
    }

    #[test]
    fn test_serve_child_rejects_garbage() {
        let mut out = Vec::new();
        assert!(serve_child(&b"not json"[..], &mut out).is_err());
        assert!(out.is_empty());
    }

    #[test]
    fn test_outcome_wire_format() {
        let wire = serde_json::to_value(ChildOutcome::Faulted {
            fault: ExecutionFault::Timeout(50),
        })
        .unwrap();
        assert_eq!(wire, json!({"status": "faulted", "fault": {"Timeout": 50}}));
    }

    #[test]
    fn test_child_deadline() {
        let start = Instant::now();
        assert_eq!(child_deadline(start, 0), None);
        assert_eq!(
            child_deadline(start, 100),
            Some(start + Duration::from_millis(100 + CHILD_GRACE_MS))
        );
        // Huge timeouts never wrap into an early kill
        let far = child_deadline(start, u64::MAX);
        assert!(far.map_or(true, |d| d > start + Duration::from_secs(86_400)));
    }

    #[test]
    fn test_load_error_surfaces_before_spawning() {
        let backend = SubprocessBackend::new(
            PathBuf::from("/nonexistent/grader-worker"),
            ArgumentBinding::Declared,
            ExecutionLimits::default(),
        );
        let err = backend.load(&unit(&["a"], "a +")).err().unwrap();
        assert!(err.is_load());
    }

    #[test]
    fn test_missing_child_program_is_invocation_error() {
        let backend = SubprocessBackend::new(
            PathBuf::from("/nonexistent/grader-worker"),
            ArgumentBinding::Declared,
            ExecutionLimits::default(),
        );
        let exe = backend.load(&unit(&["a"], "a")).unwrap();

        let err = exe.invoke("f", &[json!(1)]).unwrap_err();
        assert!(err.to_string().contains("Failed to spawn"), "{}", err);
    }
}
