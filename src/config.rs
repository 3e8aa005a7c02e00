use serde::Deserialize;
use std::time::Duration;

use crate::tutor::problems::{HeuristicSet, Marker};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub llm: LlmConfig,
    #[serde(default)]
    pub sandbox: SandboxConfig,
    #[serde(default)]
    pub tutor: TutorConfig,
    /// Extra problems on top of the built-in catalog
    #[serde(default)]
    pub problems: Vec<ProblemConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    /// "anthropic", "ollama" or "offline"
    pub provider: String,
    #[serde(default)]
    pub model: String,
    /// Supports ${ENV_VAR} substitution
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens_per_request: u32,
    /// Ollama base URL, defaults to http://localhost:11434
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SandboxConfig {
    #[serde(default = "default_interpreter")]
    pub interpreter: String,
    #[serde(default = "default_sandbox_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_output")]
    pub max_output_bytes: usize,
    /// Address-space cap applied inside the worker. 0 disables it.
    #[serde(default = "default_memory_limit")]
    pub memory_limit_mb: u64,
    #[serde(default = "default_allowed_builtins")]
    pub allowed_builtins: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TutorConfig {
    #[serde(default = "default_tutor_name")]
    pub name: String,
    /// Key of the problem a fresh session starts on
    #[serde(default = "default_problem")]
    pub problem: String,
    /// How many past interactions are quoted in prompts
    #[serde(default = "default_max_history")]
    pub max_history: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProblemConfig {
    pub key: String,
    pub title: String,
    pub description: String,
    #[serde(default = "default_difficulty")]
    pub difficulty: String,
    #[serde(default)]
    pub concepts: Vec<String>,
    #[serde(default)]
    pub markers: Vec<Marker>,
    #[serde(default)]
    pub heuristics: HeuristicSet,
}

/// Built-ins a learner script may call. Anything missing here (open,
/// __import__, eval, exec, compile, ...) is simply not defined in the sandbox.
pub const DEFAULT_ALLOWED_BUILTINS: &[&str] = &[
    // Core
    "print", "input", "len", "range", "reversed", "slice",
    // Conversions
    "str", "int", "float", "bool", "bytes", "bytearray",
    // Collections
    "list", "dict", "tuple", "set", "frozenset",
    // Math
    "abs", "min", "max", "sum", "round", "pow", "divmod",
    // Iteration
    "sorted", "enumerate", "zip", "map", "filter", "iter", "next", "all", "any",
    // Introspection
    "type", "isinstance", "issubclass", "callable", "dir", "vars", "getattr", "setattr",
    "hasattr", "delattr",
    // Formatting
    "format", "chr", "ord", "ascii", "repr", "bin", "hex", "oct",
    // Classes
    "object", "property", "classmethod", "staticmethod",
    // Misc
    "id", "hash", "help",
];

fn default_max_tokens() -> u32 {
    1024
}

fn default_llm_timeout() -> u64 {
    30
}

fn default_interpreter() -> String {
    "python3".to_string()
}

fn default_sandbox_timeout() -> u64 {
    5
}

fn default_max_output() -> usize {
    64 * 1024
}

fn default_memory_limit() -> u64 {
    256
}

fn default_allowed_builtins() -> Vec<String> {
    DEFAULT_ALLOWED_BUILTINS.iter().map(|s| s.to_string()).collect()
}

fn default_tutor_name() -> String {
    "CodeMentor".to_string()
}

fn default_problem() -> String {
    "fizzbuzz".to_string()
}

fn default_max_history() -> usize {
    5
}

fn default_difficulty() -> String {
    "Easy".to_string()
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            interpreter: default_interpreter(),
            timeout_secs: default_sandbox_timeout(),
            max_output_bytes: default_max_output(),
            memory_limit_mb: default_memory_limit(),
            allowed_builtins: default_allowed_builtins(),
        }
    }
}

impl SandboxConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for TutorConfig {
    fn default() -> Self {
        Self {
            name: default_tutor_name(),
            problem: default_problem(),
            max_history: default_max_history(),
        }
    }
}

impl LlmConfig {
    /// Human-readable provider description, e.g. "anthropic (claude-haiku-4-5)"
    pub fn description(&self) -> String {
        if self.model.is_empty() {
            self.provider.clone()
        } else {
            format!("{} ({})", self.provider, self.model)
        }
    }
}

impl Config {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        // Expand environment variables like ${ANTHROPIC_API_KEY}
        let expanded = shellexpand::env(content)?;
        let config: Config = toml::from_str(&expanded)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        match self.llm.provider.as_str() {
            "anthropic" | "ollama" => {
                if self.llm.model.is_empty() {
                    anyhow::bail!("[llm] model is required for provider '{}'", self.llm.provider);
                }
            }
            "offline" => {}
            other => anyhow::bail!(
                "Unknown LLM provider '{other}' (expected anthropic, ollama or offline)"
            ),
        }
        if self.sandbox.timeout_secs == 0 {
            anyhow::bail!("[sandbox] timeout_secs must be at least 1");
        }
        for problem in &self.problems {
            if problem.key.trim().is_empty() {
                anyhow::bail!("[[problems]] entries need a non-empty key");
            }
        }
        Ok(())
    }
}
