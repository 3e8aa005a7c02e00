use std::time::Instant;

use anyhow::Result;
use tokio::sync::mpsc;
use tracing::{info, warn};

use super::context::SessionContext;
use super::policy::{DispatchDecision, Tutor};
use super::problems::{Catalog, Problem};

/// Something the learner did at the console.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LearnerEvent {
    /// A plain question or remark, no code.
    Message(String),
    /// Code entered between `/code` and `/end`.
    Submission { message: String, source: String },
    /// Any other line starting with `/`.
    Command(String),
}

/// Turns console lines into [`LearnerEvent`]s.
///
/// `/code [message]` opens a code block that runs until a line reading
/// `/end`. Lines inside the block are kept verbatim so indentation
/// survives.
#[derive(Debug, Default)]
pub struct ConsoleParser {
    pending: Option<(String, Vec<String>)>,
}

impl ConsoleParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn in_submission(&self) -> bool {
        self.pending.is_some()
    }

    pub fn feed(&mut self, line: &str) -> Option<LearnerEvent> {
        let line = line.trim_end_matches(['\r', '\n']);

        if let Some((_, lines)) = self.pending.as_mut() {
            if line.trim() == "/end" {
                return self.finish();
            }
            lines.push(line.to_string());
            return None;
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            return None;
        }
        let mut parts = trimmed.splitn(2, char::is_whitespace);
        let word = parts.next().unwrap_or_default();
        if word.eq_ignore_ascii_case("/code") {
            let message = parts.next().unwrap_or_default().trim().to_string();
            self.pending = Some((message, Vec::new()));
            return None;
        }
        if trimmed.starts_with('/') {
            return Some(LearnerEvent::Command(trimmed.to_string()));
        }
        Some(LearnerEvent::Message(trimmed.to_string()))
    }

    /// Closes an open code block, e.g. at end of input.
    pub fn finish(&mut self) -> Option<LearnerEvent> {
        self.pending.take().map(|(message, lines)| LearnerEvent::Submission {
            message,
            source: lines.join("\n"),
        })
    }
}

/// The tutoring runtime.
///
/// Owns the learner's [`SessionContext`], receives console events,
/// runs them through the [`Tutor`] and sends back rendered replies.
pub struct TutorRuntime {
    name: String,
    tutor: Tutor,
    catalog: Catalog,
    problem_key: String,
    start_time: Instant,
}

impl TutorRuntime {
    pub fn new(name: String, tutor: Tutor, catalog: Catalog, problem_key: String) -> Self {
        Self {
            name,
            tutor,
            catalog,
            problem_key,
            start_time: Instant::now(),
        }
    }

    /// Fresh session on the configured problem, or the default one when
    /// the key is unknown.
    pub fn new_session(&self) -> SessionContext {
        let problem = match self.catalog.get(&self.problem_key) {
            Some(problem) => problem,
            None => {
                warn!(
                    "Unknown problem '{}', using '{}'",
                    self.problem_key,
                    self.catalog.default_problem().key
                );
                self.catalog.default_problem()
            }
        };
        SessionContext::new(problem.clone())
    }

    /// Main loop. Returns when the event channel closes.
    pub async fn run(
        &self,
        mut event_rx: mpsc::Receiver<LearnerEvent>,
        reply_tx: mpsc::Sender<String>,
    ) -> Result<()> {
        let mut ctx = self.new_session();
        info!(
            "Tutor runtime started: session {} on '{}'",
            ctx.session_id, ctx.problem.key
        );

        let welcome = format!(
            "{} is ready.\n\n{}\n\nType /help for commands.",
            self.name,
            problem_intro(&ctx.problem)
        );
        if reply_tx.send(welcome).await.is_err() {
            return Ok(());
        }

        while let Some(event) = event_rx.recv().await {
            let reply = match event {
                LearnerEvent::Message(text) => {
                    info!("Question: {text}");
                    render(&self.tutor.handle(&text, "", &mut ctx).await)
                }
                LearnerEvent::Submission { message, source } => {
                    info!("Submission: {} lines", source.lines().count());
                    render(&self.tutor.handle(&message, &source, &mut ctx).await)
                }
                LearnerEvent::Command(body) => self.handle_command(&body, &mut ctx).await,
            };

            if reply_tx.send(reply).await.is_err() {
                warn!("Console output closed, stopping runtime");
                break;
            }
        }

        info!(
            "Tutor runtime stopped after {} attempts",
            ctx.attempt_count()
        );
        Ok(())
    }

    // ── Slash commands ────────────────────────────────────

    /// Handles a slash command. Returns the reply text.
    /// These are answered by the runtime and never reach the policy.
    async fn handle_command(&self, body: &str, ctx: &mut SessionContext) -> String {
        let mut parts = body.splitn(2, char::is_whitespace);
        let command = parts.next().unwrap_or_default().to_lowercase();
        let arg = parts.next().unwrap_or_default().trim();

        info!("Slash command: {command}");

        match command.as_str() {
            "/new" | "/reset" => self.cmd_new_session(ctx),
            "/problem" => self.cmd_problem(arg, ctx),
            "/problems" => self.cmd_problems(ctx),
            "/explain" => self.cmd_explain(arg).await,
            "/status" => self.cmd_status(ctx),
            "/help" => cmd_help(),
            "/ping" => "pong".to_string(),
            "/end" => "No code block is open. Start one with /code.".to_string(),
            _ => format!("Unknown command: {command}\nType /help for available commands."),
        }
    }

    /// /new — Drop the session and start over on the same problem
    fn cmd_new_session(&self, ctx: &mut SessionContext) -> String {
        let problem = ctx.problem.clone();
        info!(
            "Session {} reset after {} attempts",
            ctx.session_id,
            ctx.attempt_count()
        );
        *ctx = SessionContext::new(problem);
        format!("Started a new session.\n\n{}", problem_intro(&ctx.problem))
    }

    /// /problem <key> — Switch problems (starts a new session)
    fn cmd_problem(&self, key: &str, ctx: &mut SessionContext) -> String {
        if key.is_empty() {
            return problem_intro(&ctx.problem);
        }
        match self.catalog.get(key) {
            Some(problem) => {
                *ctx = SessionContext::new(problem.clone());
                info!("Switched to problem '{}'", problem.key);
                format!("Switched problem.\n\n{}", problem_intro(problem))
            }
            None => format!("Unknown problem: {key}\nType /problems for the list."),
        }
    }

    /// /problems — List the catalog
    fn cmd_problems(&self, ctx: &SessionContext) -> String {
        let lines: Vec<String> = self
            .catalog
            .problems()
            .iter()
            .map(|p| {
                let current = if p.key == ctx.problem.key { " (current)" } else { "" };
                format!("  {} — {} [{}]{current}", p.key, p.title, p.difficulty)
            })
            .collect();
        format!("Problems:\n{}", lines.join("\n"))
    }

    /// /explain <concept> — Explain a concept on demand
    async fn cmd_explain(&self, concept: &str) -> String {
        if concept.is_empty() {
            return "Usage: /explain <concept>  (e.g. /explain modulo)".to_string();
        }
        self.tutor.explain_concept(concept, None).await
    }

    /// /status — Session overview
    fn cmd_status(&self, ctx: &SessionContext) -> String {
        let uptime = self.start_time.elapsed();
        let hours = uptime.as_secs() / 3600;
        let minutes = (uptime.as_secs() % 3600) / 60;

        let join = |items: Vec<String>| {
            if items.is_empty() {
                "none".to_string()
            } else {
                items.join(", ")
            }
        };
        let gaps = join(ctx.identified_gaps().iter().map(|c| c.to_string()).collect());
        let covered = join(ctx.concepts_covered().iter().map(|c| c.to_string()).collect());
        let store = self.tutor.store();
        let mastery = join(
            ctx.problem
                .concepts
                .iter()
                .map(|c| format!("{c} {:.0}%", store.concept_mastery(c.as_str()) * 100.0))
                .collect(),
        );

        format!(
            "{} — status\n\
             Uptime: {hours}h {minutes}m\n\
             LLM: {}\n\
             Problem: {}\n\
             Session: {}\n\
             Attempts: {}\n\
             Concept gaps: {gaps}\n\
             Concepts covered: {covered}\n\
             Mastery: {mastery}\n\
             Sessions stored: {}",
            self.name,
            self.tutor.llm_description(),
            ctx.problem.title,
            ctx.session_id,
            ctx.attempt_count(),
            store.session_count(),
        )
    }
}

/// /help — List available commands
fn cmd_help() -> String {
    "\
Commands:\n\
  /code [message]   — Start a code submission; finish it with /end\n\
  /new, /reset      — Start a new session on the current problem\n\
  /problem [key]    — Show the current problem, or switch to another\n\
  /problems         — List available problems\n\
  /explain <topic>  — Explain a programming concept\n\
  /status           — Attempts, concepts and session info\n\
  /ping             — Check if the tutor is alive\n\
  /help             — This message\n\
Anything else is a question for the tutor."
        .to_string()
}

fn problem_intro(problem: &Problem) -> String {
    format!(
        "📝 **{}** ({})\n{}",
        problem.title, problem.difficulty, problem.description
    )
}

/// Console rendering: strategy label, then the message.
pub fn render(decision: &DispatchDecision) -> String {
    format!("[{}]\n{}", decision.strategy, decision.message)
}
