// Grader configuration management
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_PATH: &str = "config/grader.json";

/// Script call depth that fits a 2 MiB thread stack. Unoptimized builds use far
/// larger frames per script call.
#[cfg(debug_assertions)]
pub const DEFAULT_MAX_CALL_DEPTH: usize = 24;
#[cfg(not(debug_assertions))]
pub const DEFAULT_MAX_CALL_DEPTH: usize = 64;

/// How arguments are bound to the declared parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ArgumentBinding {
    /// Coerce each argument to its declared parameter type
    #[default]
    Declared,
    /// Resolve the callable by the runtime types of the argument values
    Runtime,
}

/// What a single-case execution fault does to the run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FaultPolicy {
    /// Any fault aborts the run and the verdict becomes ERROR
    #[default]
    AbortRun,
    /// The faulted case is recorded as failing and the run continues
    RecordCase,
}

/// Which failing case the verdict points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FailureReport {
    #[default]
    Last,
    First,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Isolation {
    #[default]
    InProcess,
    /// One child process per invocation
    Subprocess,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionLimits {
    pub case_timeout_ms: u64,
    pub max_operations: u64,
    pub max_call_depth: usize,
    pub max_string_size: usize,
    pub max_array_size: usize,
    pub max_map_size: usize,
    pub max_console_lines: usize,
    pub max_body_bytes: usize,
    pub max_test_cases: usize,
}

impl Default for ExecutionLimits {
    fn default() -> Self {
        Self {
            case_timeout_ms: 5000,
            max_operations: 0,
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
            max_string_size: 1024 * 1024,
            max_array_size: 1_000_000,
            max_map_size: 100_000,
            max_console_lines: 100,
            max_body_bytes: 50 * 1024,
            max_test_cases: 1000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct GraderConfig {
    pub binding: ArgumentBinding,
    pub fault_policy: FaultPolicy,
    pub failure_report: FailureReport,
    pub isolation: Isolation,
    /// Program spawned for isolated invocations; defaults to the current executable
    pub child_program: Option<PathBuf>,
    pub limits: ExecutionLimits,
}

impl GraderConfig {
    /// Per-case fault isolation and first-failure reporting
    pub fn hardened() -> Self {
        Self {
            binding: ArgumentBinding::Declared,
            fault_policy: FaultPolicy::RecordCase,
            failure_report: FailureReport::First,
            ..Self::default()
        }
    }

    /// Load configuration from a JSON file
    pub fn load(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            bail!("Grader config file not found: {}", config_path.display());
        }

        let content = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read {}", config_path.display()))?;

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", config_path.display()))
    }

    /// Load from an explicit path, or from config/grader.json when present,
    /// then apply environment overrides
    pub fn load_default(explicit: Option<&Path>) -> Result<Self> {
        let mut config = match explicit {
            Some(path) => Self::load(path)?,
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_PATH);
                if default_path.exists() {
                    Self::load(default_path)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply GRADER_* overrides from the given lookup
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(mode) = lookup("GRADER_MODE") {
            match mode.to_lowercase().as_str() {
                "compat" => {
                    self.fault_policy = FaultPolicy::AbortRun;
                    self.failure_report = FailureReport::Last;
                }
                // Same policies as `hardened()`; GRADER_BINDING below still wins
                "hardened" => {
                    let hardened = Self::hardened();
                    self.binding = hardened.binding;
                    self.fault_policy = hardened.fault_policy;
                    self.failure_report = hardened.failure_report;
                }
                other => bail!("Invalid GRADER_MODE '{}' (expected compat or hardened)", other),
            }
        }

        if let Some(binding) = lookup("GRADER_BINDING") {
            self.binding = match binding.to_lowercase().as_str() {
                "declared" => ArgumentBinding::Declared,
                "runtime" => ArgumentBinding::Runtime,
                other => bail!("Invalid GRADER_BINDING '{}' (expected declared or runtime)", other),
            };
        }

        if let Some(isolation) = lookup("GRADER_ISOLATION") {
            self.isolation = match isolation.to_lowercase().as_str() {
                "in_process" => Isolation::InProcess,
                "subprocess" => Isolation::Subprocess,
                other => bail!(
                    "Invalid GRADER_ISOLATION '{}' (expected in_process or subprocess)",
                    other
                ),
            };
        }

        if let Some(timeout) = lookup("GRADER_CASE_TIMEOUT_MS") {
            self.limits.case_timeout_ms = timeout
                .parse()
                .with_context(|| format!("Invalid GRADER_CASE_TIMEOUT_MS '{}'", timeout))?;
        }

        if let Some(program) = lookup("GRADER_CHILD_PROGRAM") {
            self.child_program = Some(PathBuf::from(program));
        }

        Ok(())
    }
}
