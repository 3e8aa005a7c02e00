use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tracing::{debug, warn};

use super::{CodeRunner, ExecutionError, ExecutionResult};
use crate::config::SandboxConfig;

/// Worker-side script: builds the restricted globals, runs the source read
/// from stdin and reports faults on stderr after [`FAULT_MARKER`].
const PRELUDE: &str = include_str!("prelude.py");

const FAULT_MARKER: &str = "@@fault@@ ";

/// How much of the worker's stderr is kept. Only the final fault line matters.
const STDERR_TAIL_BYTES: usize = 16 * 1024;

const READ_CHUNK: usize = 8 * 1024;

/// Runs learner Python in a throwaway interpreter process.
pub struct SafeCodeExecutor {
    config: SandboxConfig,
}

impl SafeCodeExecutor {
    pub fn new(config: SandboxConfig) -> Self {
        Self { config }
    }

    pub fn timeout(&self) -> Duration {
        self.config.timeout()
    }

    /// Check if the interpreter can be spawned at all
    pub async fn is_available(&self) -> bool {
        Command::new(&self.config.interpreter)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|s| s.success())
            .unwrap_or(false)
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.config.interpreter);
        cmd.args(["-I", "-S", "-B", "-c", PRELUDE])
            .arg(self.config.memory_limit_mb.to_string())
            .arg(self.config.allowed_builtins.join(","))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .env_clear()
            .kill_on_drop(true);
        // The interpreter itself is still looked up through the caller's PATH
        if let Some(path) = std::env::var_os("PATH") {
            cmd.env("PATH", path);
        }
        cmd
    }

    async fn run(&self, source: &str) -> ExecutionResult {
        let mut child = match self.command().spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!("Failed to spawn sandbox interpreter '{}': {e}", self.config.interpreter);
                return ExecutionResult::failed(ExecutionError::Fault {
                    kind: "SandboxError".to_string(),
                    message: format!("could not start {}: {e}", self.config.interpreter),
                });
            }
        };

        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let max_output = self.config.max_output_bytes;
        let source = source.to_string();

        // Dropping this future on timeout drops the child, and kill_on_drop
        // takes the worker down with it.
        let finished = async move {
            let feed = async {
                if let Some(mut stdin) = stdin {
                    match stdin.write_all(source.as_bytes()).await {
                        // The worker may exit before reading all of its input
                        Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {}
                        other => other?,
                    }
                    let _ = stdin.shutdown().await;
                }
                Ok::<(), std::io::Error>(())
            };
            let (fed, stdout, stderr) = tokio::join!(
                feed,
                read_head(stdout, max_output),
                read_tail(stderr, STDERR_TAIL_BYTES),
            );
            fed?;
            let status = child.wait().await?;
            Ok::<_, std::io::Error>((status, stdout?, stderr?))
        };

        let (status, stdout, stderr) = match tokio::time::timeout(self.timeout(), finished).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                warn!("Sandbox I/O failure: {e}");
                return ExecutionResult::failed(ExecutionError::Fault {
                    kind: "SandboxError".to_string(),
                    message: e.to_string(),
                });
            }
            Err(_) => return ExecutionResult::failed(ExecutionError::Timeout(self.timeout())),
        };

        if status.success() {
            if stdout.overflowed {
                debug!("Sandbox output capped at {max_output} bytes");
            }
            return ExecutionResult::ok(render_output(&stdout, max_output));
        }

        let stderr = String::from_utf8_lossy(&stderr.bytes);
        let error = match stderr.rfind(FAULT_MARKER) {
            Some(idx) => ExecutionError::from_fault_line(&stderr[idx + FAULT_MARKER.len()..]),
            // Killed by a signal or died before reaching learner code
            None => ExecutionError::from_fault_line(stderr.lines().last().unwrap_or("")),
        };
        ExecutionResult::failed(error)
    }
}

#[async_trait]
impl CodeRunner for SafeCodeExecutor {
    async fn execute(&self, source: &str) -> ExecutionResult {
        let start = Instant::now();
        let result = self.run(source).await;
        debug!(
            "Sandbox run finished in {}ms: {}",
            start.elapsed().as_millis(),
            if result.success {
                "ok".to_string()
            } else {
                result.error_text()
            }
        );
        result
    }
}

/// Bytes kept from one of the worker's pipes.
#[derive(Debug, Default)]
struct Captured {
    bytes: Vec<u8>,
    /// More was written than was kept.
    overflowed: bool,
}

/// Reads a pipe to EOF keeping only the first `cap` bytes. The rest is
/// drained so the worker never blocks on a full pipe.
async fn read_head<R: AsyncRead + Unpin>(pipe: Option<R>, cap: usize) -> std::io::Result<Captured> {
    let mut captured = Captured::default();
    let Some(mut pipe) = pipe else {
        return Ok(captured);
    };
    let mut buf = [0u8; READ_CHUNK];
    loop {
        let n = pipe.read(&mut buf).await?;
        if n == 0 {
            return Ok(captured);
        }
        let room = cap.saturating_sub(captured.bytes.len());
        if n > room {
            captured.overflowed = true;
        }
        captured.bytes.extend_from_slice(&buf[..n.min(room)]);
    }
}

/// Reads a pipe to EOF keeping only the last `cap` bytes, where the fault
/// line ends up.
async fn read_tail<R: AsyncRead + Unpin>(pipe: Option<R>, cap: usize) -> std::io::Result<Captured> {
    let mut captured = Captured::default();
    let Some(mut pipe) = pipe else {
        return Ok(captured);
    };
    let mut buf = [0u8; READ_CHUNK];
    loop {
        let n = pipe.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        captured.bytes.extend_from_slice(&buf[..n]);
        if captured.bytes.len() > 2 * cap {
            let excess = captured.bytes.len() - cap;
            captured.bytes.drain(..excess);
            captured.overflowed = true;
        }
    }
    if captured.bytes.len() > cap {
        let excess = captured.bytes.len() - cap;
        captured.bytes.drain(..excess);
        captured.overflowed = true;
    }
    Ok(captured)
}

/// Renders captured stdout, noting the cap when output was cut.
fn render_output(captured: &Captured, max_bytes: usize) -> String {
    let text = String::from_utf8_lossy(&captured.bytes);
    if !captured.overflowed {
        return text.into_owned();
    }
    // The cut may have split a multi-byte char
    let text = text.trim_end_matches('\u{FFFD}');
    format!("{text}\n... [output truncated at {max_bytes} bytes]")
}
