//! Execution sandbox for learner submissions.
//!
//! Each submission runs in its own `python3` worker process:
//!
//! 1. Isolated interpreter (`-I -S -B`), empty environment
//! 2. Globals built from an explicit built-in allow-list (no `open`,
//!    no `__import__`, no `eval`/`exec`)
//! 3. Address-space cap set inside the worker before learner code runs
//! 4. Wall-clock timeout; the worker is killed when it expires
//! 5. Captured stdout, capped while it is read; the worker keeps running
//!
//! Known limitation: the allow-list is enforced by the interpreter, not the
//! kernel. A determined script can still reach object internals through
//! introspection helpers; there is no seccomp or namespace isolation here.

pub mod executor;

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

pub use executor::SafeCodeExecutor;

/// Why a sandboxed run failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExecutionError {
    /// The worker did not finish within the wall-clock bound.
    #[error("Timeout: code execution timed out ({} seconds limit)", .0.as_secs())]
    Timeout(Duration),

    /// The script raised, e.g. `NameError: name 'x' is not defined`.
    /// Exceptions raised without a message display as the bare kind.
    #[error("{kind}{}", fault_suffix(.message))]
    Fault { kind: String, message: String },
}

impl ExecutionError {
    /// Fault category: `Timeout`, `NameError`, `SyntaxError`, ...
    pub fn kind(&self) -> &str {
        match self {
            ExecutionError::Timeout(_) => "Timeout",
            ExecutionError::Fault { kind, .. } => kind,
        }
    }

    /// Parses the `Kind: message` line the worker writes on failure. The
    /// message may be empty (`AssertionError: `). Anything unrecognizable
    /// becomes a `RuntimeError`.
    pub fn from_fault_line(line: &str) -> Self {
        let line = line.trim();
        let (kind, message) = match line.split_once(':') {
            Some((kind, message)) => (kind, message.trim_start()),
            None => (line, ""),
        };
        if is_identifier(kind) {
            return ExecutionError::Fault {
                kind: kind.to_string(),
                message: message.to_string(),
            };
        }
        ExecutionError::Fault {
            kind: "RuntimeError".to_string(),
            message: if line.is_empty() {
                "script exited abnormally".to_string()
            } else {
                line.to_string()
            },
        }
    }
}

fn fault_suffix(message: &str) -> String {
    if message.is_empty() {
        String::new()
    } else {
        format!(": {message}")
    }
}

fn is_identifier(s: &str) -> bool {
    !s.is_empty()
        && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !s.starts_with(|c: char| c.is_ascii_digit())
}

/// Outcome of one sandboxed run.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionResult {
    pub success: bool,
    /// Captured stdout. Always empty on failure.
    pub output: String,
    pub error: Option<ExecutionError>,
}

impl ExecutionResult {
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
            error: None,
        }
    }

    pub fn failed(error: ExecutionError) -> Self {
        Self {
            success: false,
            output: String::new(),
            error: Some(error),
        }
    }

    /// `Kind: message` for failed runs, empty otherwise.
    pub fn error_text(&self) -> String {
        self.error.as_ref().map(|e| e.to_string()).unwrap_or_default()
    }
}

impl Serialize for ExecutionResult {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;
        let mut state = serializer.serialize_struct("ExecutionResult", 4)?;
        state.serialize_field("success", &self.success)?;
        state.serialize_field("output", &self.output)?;
        state.serialize_field("error_kind", &self.error.as_ref().map(|e| e.kind().to_string()))?;
        state.serialize_field("error", &self.error.as_ref().map(|e| e.to_string()))?;
        state.end()
    }
}

/// Anything that can run a learner script. The dispatch policy only
/// depends on this, so tests can substitute scripted results.
#[async_trait]
pub trait CodeRunner: Send + Sync {
    /// Runs `source` and reports what happened. Never fails: every problem
    /// (including a missing interpreter) is folded into the result.
    async fn execute(&self, source: &str) -> ExecutionResult;
}
