/// Execution Engine - Abstraction for Code Execution
///
/// **Core Responsibility:**
/// Load a synthesized unit once, then invoke its entry function with concrete
/// argument tuples and hand back the raw output.
///
/// **Critical Architectural Boundary:**
/// - Engine knows HOW to execute (embedded script runtime, isolated child process)
/// - Engine does NOT compare outputs
/// - Engine does NOT decide pass/fail
/// - Engine reports every failure as an `ExecutionFault`
///
/// **Why This Exists:**
/// The runner only sees `Backend` and `Executable`, so the isolation strategy can
/// change without touching grading logic.

use crate::binding::{bind_arguments, dynamic_to_value};
use crate::config::{ArgumentBinding, ExecutionLimits};
use crate::error::ExecutionFault;
use crate::instrument::{measure, Measured};
use crate::synthesizer::UnitDefinition;
use grader_common::value::Value;
use rhai::{Dynamic, Engine, EvalAltResult, Scope, AST};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::debug;

/// Operations between two deadline checks
const DEADLINE_CHECK_INTERVAL: u64 = 256;

/// Output of one successful invocation
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub output: Value,
    /// Lines printed by the submitted code during this call
    pub console: Vec<String>,
}

/// Loads unit definitions into executables
pub trait Backend {
    /// Compile a unit. Nothing is registered when this fails.
    fn load(&self, unit: &UnitDefinition) -> Result<Box<dyn Executable>, ExecutionFault>;
}

/// A loaded, callable unit
pub trait Executable {
    /// Resolve `name` and call it with `args`
    fn invoke(&self, name: &str, args: &[Value]) -> Result<Invocation, ExecutionFault>;

    /// Invoke under the instrumentation wrapper
    fn invoke_measured(
        &self,
        name: &str,
        args: &[Value],
    ) -> Measured<Result<Invocation, ExecutionFault>> {
        measure(|| self.invoke(name, args))
    }
}

/// In-process backend on the embedded script runtime
#[derive(Debug, Clone, Default)]
pub struct ScriptBackend {
    binding: ArgumentBinding,
    limits: ExecutionLimits,
}

impl ScriptBackend {
    pub fn new(binding: ArgumentBinding, limits: ExecutionLimits) -> Self {
        Self { binding, limits }
    }

    /// Compile a unit into a concrete `ScriptUnit`
    pub fn compile(&self, unit: &UnitDefinition) -> Result<ScriptUnit, ExecutionFault> {
        for param in &unit.params {
            if let Some(name) = param.ty.as_ref().and_then(|ty| ty.unknown_name()) {
                return Err(ExecutionFault::Load(format!(
                    "Cannot resolve type '{}' of parameter '{}'",
                    name, param.name
                )));
            }
        }

        let deadline = Arc::new(AtomicU64::new(0));
        let console = Arc::new(Mutex::new(Vec::new()));
        let epoch = Instant::now();
        let engine = build_engine(&self.limits, epoch, deadline.clone(), console.clone());

        let ast = engine
            .compile(&unit.source)
            .map_err(|e| ExecutionFault::Load(e.to_string()))?;

        let defined = ast
            .iter_functions()
            .any(|f| f.name == unit.entry && f.params.len() == unit.params.len());
        if !defined {
            return Err(ExecutionFault::Load(format!(
                "Unit does not define {} with {} parameter(s)",
                unit.entry,
                unit.params.len()
            )));
        }

        debug!(entry = %unit.entry, signature = %unit.signature(), "Unit compiled");

        Ok(ScriptUnit {
            engine,
            ast,
            unit: unit.clone(),
            binding: self.binding,
            timeout_ms: self.limits.case_timeout_ms,
            epoch,
            deadline,
            console,
        })
    }
}

impl Backend for ScriptBackend {
    fn load(&self, unit: &UnitDefinition) -> Result<Box<dyn Executable>, ExecutionFault> {
        Ok(Box::new(self.compile(unit)?))
    }
}

/// Sandboxed engine with resource limits, deadline hook and console capture
fn build_engine(
    limits: &ExecutionLimits,
    epoch: Instant,
    deadline: Arc<AtomicU64>,
    console: Arc<Mutex<Vec<String>>>,
) -> Engine {
    let mut engine = Engine::new();

    engine
        .set_max_operations(limits.max_operations)
        .set_max_call_levels(limits.max_call_depth)
        .set_max_string_size(limits.max_string_size)
        .set_max_array_size(limits.max_array_size)
        .set_max_map_size(limits.max_map_size);
    engine.disable_symbol("eval");
    // Undefined names fail at compile time, i.e. at load
    engine.set_strict_variables(true);

    // Deadline is stored as nanoseconds since `epoch`; zero means none
    engine.on_progress(move |ops| {
        if ops % DEADLINE_CHECK_INTERVAL != 0 {
            return None;
        }
        let limit = deadline.load(Ordering::Relaxed);
        if limit != 0 && epoch.elapsed().as_nanos() as u64 >= limit {
            Some(Dynamic::from("deadline exceeded"))
        } else {
            None
        }
    });

    let max_lines = limits.max_console_lines;
    let print_sink = console.clone();
    engine.on_print(move |line| capture(&print_sink, max_lines, line));
    let debug_sink = console;
    engine.on_debug(move |line, _source, _pos| capture(&debug_sink, max_lines, line));

    engine
}

fn capture(sink: &Mutex<Vec<String>>, max_lines: usize, line: &str) {
    if let Ok(mut lines) = sink.lock() {
        if lines.len() < max_lines {
            lines.push(line.to_string());
        }
    }
}

/// Compiled unit on the embedded runtime
pub struct ScriptUnit {
    engine: Engine,
    ast: AST,
    unit: UnitDefinition,
    binding: ArgumentBinding,
    timeout_ms: u64,
    epoch: Instant,
    deadline: Arc<AtomicU64>,
    console: Arc<Mutex<Vec<String>>>,
}

impl ScriptUnit {
    fn arm_deadline(&self) {
        let limit = if self.timeout_ms == 0 {
            0
        } else {
            let now = self.epoch.elapsed().as_nanos() as u64;
            now.saturating_add(self.timeout_ms.saturating_mul(1_000_000)).max(1)
        };
        self.deadline.store(limit, Ordering::Relaxed);
    }

    fn take_console(&self) -> Vec<String> {
        self.console
            .lock()
            .map(|mut lines| std::mem::take(&mut *lines))
            .unwrap_or_default()
    }

    fn classify(&self, err: &EvalAltResult) -> ExecutionFault {
        match err {
            EvalAltResult::ErrorTerminated(..) => ExecutionFault::Timeout(self.timeout_ms),
            EvalAltResult::ErrorInFunctionCall(_, _, inner, ..) => self.classify(inner),
            other => ExecutionFault::Invocation(other.to_string()),
        }
    }
}

impl Executable for ScriptUnit {
    fn invoke(&self, name: &str, args: &[Value]) -> Result<Invocation, ExecutionFault> {
        let bound = bind_arguments(&self.unit, name, args, self.binding)?;

        self.take_console();
        self.arm_deadline();
        let mut scope = Scope::new();
        let result = self
            .engine
            .call_fn::<Dynamic>(&mut scope, &self.ast, name, bound);
        self.deadline.store(0, Ordering::Relaxed);
        let console = self.take_console();

        let output = result.map_err(|err| self.classify(&err))?;
        Ok(Invocation {
            output: dynamic_to_value(&output)?,
            console,
        })
    }
}
