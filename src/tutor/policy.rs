//! The dispatch policy: picks a teaching strategy for each learner turn
//! and assembles the reply.
//!
//! ```text
//! source empty? ── yes ──▶ Clarify
//!      │ no
//!   execute
//!      ├─ failed ── concept rule matches? ── yes ──▶ Explain
//!      │                    └─ no ──▶ Hint (error surfaced verbatim)
//!      └─ succeeded ── review + heuristics
//!             ├─ attempt ≥ 2, issues, incomplete ──▶ Hint
//!             ├─ complete ──▶ Critique (celebratory)
//!             └─ otherwise ──▶ Critique (formative)
//! ```
//!
//! Nothing in here fails: collaborator errors are logged and replaced
//! by the canned fallback for the strategy.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use super::concepts::Concept;
use super::context::SessionContext;
use super::memory::SessionStore;
use super::prompts::{self, MAX_HINT_LEVEL};
use super::review::{static_observations, Issue, Review};
use super::rules::{apply_heuristics, classify_error};
use super::TutorError;
use crate::llm::LlmClient;
use crate::sandbox::{CodeRunner, ExecutionResult};

/// How many review issues a hint reply lists.
const HINT_ISSUE_LIMIT: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    Clarify,
    Hint,
    Critique,
    Explain,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Clarify => "clarify",
            Strategy::Hint => "hint",
            Strategy::Critique => "critique",
            Strategy::Explain => "explain",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DecisionMetadata {
    pub attempt: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint_level: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub concept: Option<Concept>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution: Option<ExecutionResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub review: Option<Review>,
    /// True only when the submission solved the problem.
    pub success: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct DispatchDecision {
    pub strategy: Strategy,
    pub message: String,
    pub metadata: DecisionMetadata,
}

pub struct Tutor {
    llm: Arc<dyn LlmClient>,
    runner: Arc<dyn CodeRunner>,
    store: Arc<dyn SessionStore>,
    history_limit: usize,
}

impl Tutor {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        runner: Arc<dyn CodeRunner>,
        store: Arc<dyn SessionStore>,
        history_limit: usize,
    ) -> Self {
        Self {
            llm,
            runner,
            store,
            history_limit,
        }
    }

    pub fn llm_description(&self) -> String {
        self.llm.description()
    }

    pub fn store(&self) -> &dyn SessionStore {
        self.store.as_ref()
    }

    /// Processes one learner turn. `source` may be empty for a plain
    /// question. Always counts as one attempt.
    pub async fn handle(
        &self,
        input: &str,
        source: &str,
        ctx: &mut SessionContext,
    ) -> DispatchDecision {
        let attempt = ctx.begin_attempt(input, source);

        let decision = if source.trim().is_empty() {
            self.clarify(input, ctx).await
        } else {
            let execution = self.runner.execute(source).await;
            debug!(
                "Attempt {attempt}: execution success={} ({} bytes of output)",
                execution.success,
                execution.output.len()
            );
            if execution.success {
                self.assess(source, execution, ctx).await
            } else {
                self.diagnose(source, execution, ctx).await
            }
        };

        info!(
            "Session {}: attempt {attempt} → {}{}",
            ctx.session_id,
            decision.strategy,
            if decision.metadata.success { " (solved)" } else { "" }
        );
        self.remember(ctx);
        decision
    }

    /// Explains a concept by name. Known concepts use their canned card,
    /// anything else goes to the LLM.
    pub async fn explain_concept(&self, name: &str, reason: Option<&str>) -> String {
        let name = name.trim();
        self.store.track_concept_mastery(name, 0.0);
        if let Ok(concept) = name.parse::<Concept>() {
            return concept.explanation();
        }
        let prompt = prompts::explain_prompt(name, reason);
        match self.llm.generate(&prompt, prompts::EXPLAINER_INSTRUCTION).await {
            Ok(text) => text,
            Err(e) => {
                warn!("Explanation of '{name}' failed, using fallback: {e:#}");
                prompts::explain_fallback(name)
            }
        }
    }

    // ── Strategies ───────────────────────────────────────

    async fn clarify(&self, input: &str, ctx: &SessionContext) -> DispatchDecision {
        let prompt = prompts::clarify_prompt(ctx, input, self.history_limit);
        let question = self
            .guarded_generate(&prompt, prompts::SOCRATIC_INSTRUCTION, prompts::CLARIFY_FALLBACK)
            .await;
        DispatchDecision {
            strategy: Strategy::Clarify,
            message: question,
            metadata: DecisionMetadata {
                attempt: ctx.attempt_count(),
                ..DecisionMetadata::default()
            },
        }
    }

    /// Failed run: explain a recognised concept gap, otherwise hint.
    async fn diagnose(
        &self,
        source: &str,
        execution: ExecutionResult,
        ctx: &mut SessionContext,
    ) -> DispatchDecision {
        let error = execution.error_text();
        let attempt = ctx.attempt_count();

        if let Some(rule) = classify_error(&error, source) {
            let concept = rule.concept;
            debug!("Error matched rule {} → {concept}", rule.name);
            ctx.record_gap(concept);
            ctx.mark_covered(concept);
            self.store.track_concept_mastery(concept.as_str(), 0.0);

            let message = format!(
                "I noticed you might need help with **{concept}**. Let me explain:\n\n\
                 {}\n\n\
                 **Error details:** {error}\n\n\
                 **Now try fixing your code!**",
                concept.explanation()
            );
            return DispatchDecision {
                strategy: Strategy::Explain,
                message,
                metadata: DecisionMetadata {
                    attempt,
                    concept: Some(concept),
                    execution: Some(execution),
                    ..DecisionMetadata::default()
                },
            };
        }

        let level = prompts::hint_level(attempt);
        let hint = self.hint(ctx, source, &error, &[], level).await;
        let message = format!(
            "{}\n\n**💡 Hint (Level {level}/{MAX_HINT_LEVEL}):**\n{hint}\n\n**Error details:** {error}",
            prompts::encouragement(attempt)
        );
        DispatchDecision {
            strategy: Strategy::Hint,
            message,
            metadata: DecisionMetadata {
                attempt,
                hint_level: Some(level),
                execution: Some(execution),
                ..DecisionMetadata::default()
            },
        }
    }

    /// Successful run: critique it and decide whether it is solved.
    async fn assess(
        &self,
        source: &str,
        execution: ExecutionResult,
        ctx: &mut SessionContext,
    ) -> DispatchDecision {
        let attempt = ctx.attempt_count();

        let mut review = self.review(ctx, source, &execution).await;
        review.merge_observations(static_observations(source));

        let findings = apply_heuristics(&ctx.problem, source, &execution.output);
        for finding in &findings {
            debug!("Heuristic {} fired", finding.rule);
            review.add_finding(finding);
            if let Some(concept) = finding.concept {
                ctx.mark_covered(concept);
            }
        }

        let has_issues = review.has_issues();
        let complete = findings.is_empty() && ctx.problem.is_solved_by(&execution.output, &review);

        if attempt >= 2 && has_issues && !complete {
            let level = prompts::hint_level(attempt);
            let top_issues = &review.issues[..review.issues.len().min(HINT_ISSUE_LIMIT)];
            let hint = self
                .hint(ctx, source, "Code runs but may need improvement", top_issues, level)
                .await;
            let listed = top_issues
                .iter()
                .map(|i| format!("- {}: {}", i.locator(), i.issue))
                .collect::<Vec<_>>()
                .join("\n");
            let message = format!(
                "{}\n\n**💡 Hint (Level {level}/{MAX_HINT_LEVEL}):**\n{hint}\n\n⚠️ **Issues found:**\n{listed}",
                prompts::encouragement(attempt)
            );
            return DispatchDecision {
                strategy: Strategy::Hint,
                message,
                metadata: DecisionMetadata {
                    attempt,
                    hint_level: Some(level),
                    execution: Some(execution),
                    review: Some(review),
                    ..DecisionMetadata::default()
                },
            };
        }

        let message = if complete {
            if review.working_well.is_empty() {
                review
                    .working_well
                    .push("Your program prints exactly what the problem asks for".to_string());
            }
            for concept in ctx.problem.concepts.clone() {
                ctx.mark_covered(concept);
                self.store.track_concept_mastery(concept.as_str(), 1.0);
            }
            celebrate(&review)
        } else {
            formative(&review)
        };

        DispatchDecision {
            strategy: Strategy::Critique,
            message,
            metadata: DecisionMetadata {
                attempt,
                execution: Some(execution),
                review: Some(review),
                success: complete,
                ..DecisionMetadata::default()
            },
        }
    }

    // ── Collaborator calls ───────────────────────────────

    async fn hint(
        &self,
        ctx: &SessionContext,
        source: &str,
        error: &str,
        issues: &[Issue],
        level: u8,
    ) -> String {
        let prompt = prompts::hint_prompt(ctx, source, error, issues, level);
        self.guarded_generate(&prompt, prompts::HINT_INSTRUCTION, prompts::hint_fallback(level))
            .await
    }

    async fn review(&self, ctx: &SessionContext, source: &str, execution: &ExecutionResult) -> Review {
        match self.request_review(ctx, source, execution).await {
            Ok(mut review) => {
                let redacted = review.redact(prompts::leaks_code);
                if redacted > 0 {
                    warn!("Review contained code in {redacted} place(s), redacted");
                }
                review
            }
            Err(e) => {
                warn!("Code review unavailable, using fallback: {e}");
                Review::fallback(execution)
            }
        }
    }

    async fn request_review(
        &self,
        ctx: &SessionContext,
        source: &str,
        execution: &ExecutionResult,
    ) -> Result<Review, TutorError> {
        let prompt = prompts::review_prompt(ctx, source, execution);
        let raw = self
            .llm
            .generate(&prompt, prompts::REVIEW_INSTRUCTION)
            .await
            .map_err(|e| TutorError::Generation(format!("{e:#}")))?;
        Review::parse(&raw)
    }

    /// Generates learner-facing text that must not hand over code. Falls
    /// back on any failure or when the text looks like a solution.
    async fn guarded_generate(&self, prompt: &str, instruction: &str, fallback: &str) -> String {
        match self.llm.generate(prompt, instruction).await {
            Ok(text) if prompts::leaks_code(&text) => {
                warn!("Generated text contained code, using fallback");
                fallback.to_string()
            }
            Ok(text) => text,
            Err(e) => {
                warn!("Generation failed, using fallback: {e:#}");
                fallback.to_string()
            }
        }
    }

    fn remember(&self, ctx: &SessionContext) {
        match serde_json::to_value(ctx) {
            Ok(snapshot) => self.store.store(&ctx.session_id.to_string(), snapshot),
            Err(e) => warn!("Could not snapshot session {}: {e}", ctx.session_id),
        }
    }
}

fn bullet_list(items: &[String]) -> String {
    items
        .iter()
        .map(|item| format!("- {item}"))
        .collect::<Vec<_>>()
        .join("\n")
}

fn celebrate(review: &Review) -> String {
    let mut parts = vec!["🎉 **Excellent work! Your solution is correct!**\n".to_string()];
    parts.push(format!("✅ **What's working well:**\n{}", bullet_list(&review.working_well)));
    if !review.suggestions.is_empty() {
        parts.push(format!(
            "\n💡 **Optional improvements:**\n{}",
            bullet_list(&review.suggestions)
        ));
    }
    parts.push("\n\n🏆 **Congratulations on solving the problem!**".to_string());
    parts.join("\n")
}

fn formative(review: &Review) -> String {
    let mut parts = Vec::new();
    if !review.working_well.is_empty() {
        parts.push(format!("✅ **What's working well:**\n{}", bullet_list(&review.working_well)));
    }
    if !review.issues.is_empty() {
        parts.push("\n⚠️ **Areas to improve:**".to_string());
        for issue in &review.issues {
            let explanation = if issue.explanation.is_empty() {
                String::new()
            } else {
                format!(" - {}", issue.explanation)
            };
            parts.push(format!("- {}: {}{explanation}", issue.locator(), issue.issue));
        }
    }
    if !review.suggestions.is_empty() {
        parts.push(format!("\n💡 **Suggestions:**\n{}", bullet_list(&review.suggestions)));
    }
    if parts.is_empty() {
        return prompts::FORMATIVE_FALLBACK.to_string();
    }
    parts.join("\n")
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::config::SandboxConfig;
    use crate::llm::{LlmResponse, Message, OfflineClient};
    use crate::sandbox::{ExecutionError, SafeCodeExecutor};
    use crate::tutor::memory::InMemoryStore;
    use crate::tutor::problems::Catalog;

    // ── Doubles ──────────────────────────────────────────

    /// Returns the same result for every run and counts the calls.
    struct ScriptedRunner {
        result: ExecutionResult,
        calls: AtomicUsize,
    }

    impl ScriptedRunner {
        fn new(result: ExecutionResult) -> Arc<Self> {
            Arc::new(Self {
                result,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl CodeRunner for ScriptedRunner {
        async fn execute(&self, _source: &str) -> ExecutionResult {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.result.clone()
        }
    }

    /// Answers review requests with `review` and everything else with
    /// `text`; `None` means the call fails.
    struct StubLlm {
        review: Option<String>,
        text: Option<String>,
    }

    #[async_trait]
    impl LlmClient for StubLlm {
        async fn complete(&self, system_prompt: &str, _messages: &[Message]) -> anyhow::Result<LlmResponse> {
            let reply = if system_prompt == prompts::REVIEW_INSTRUCTION {
                &self.review
            } else {
                &self.text
            };
            match reply {
                Some(text) => Ok(LlmResponse {
                    text: text.clone(),
                    input_tokens: 10,
                    output_tokens: 10,
                }),
                None => anyhow::bail!("stub failure"),
            }
        }

        fn description(&self) -> String {
            "stub".to_string()
        }
    }

    fn stub(review: Option<&str>, text: Option<&str>) -> Arc<dyn LlmClient> {
        Arc::new(StubLlm {
            review: review.map(str::to_string),
            text: text.map(str::to_string),
        })
    }

    fn tutor_with(llm: Arc<dyn LlmClient>, runner: Arc<dyn CodeRunner>) -> (Tutor, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        let tutor = Tutor::new(llm, runner, store.clone(), 5);
        (tutor, store)
    }

    fn offline_tutor(result: ExecutionResult) -> (Tutor, Arc<InMemoryStore>) {
        tutor_with(Arc::new(OfflineClient), ScriptedRunner::new(result))
    }

    fn fizzbuzz_context() -> SessionContext {
        SessionContext::new(Catalog::builtin().default_problem().clone())
    }

    fn fault(line: &str) -> ExecutionResult {
        ExecutionResult::failed(ExecutionError::from_fault_line(line))
    }

    fn fizzbuzz_output() -> String {
        (1..=100)
            .map(|i| match (i % 3, i % 5) {
                (0, 0) => "FizzBuzz".to_string(),
                (0, _) => "Fizz".to_string(),
                (_, 0) => "Buzz".to_string(),
                _ => i.to_string(),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    const FIZZBUZZ: &str = "\
def fizzbuzz():
    for i in range(1, 101):
        if i % 15 == 0:
            print('FizzBuzz')
        elif i % 3 == 0:
            print('Fizz')
        elif i % 5 == 0:
            print('Buzz')
        else:
            print(i)

fizzbuzz()";

    const NO_COMBINED_BRANCH: &str = "\
for i in range(1, 101):
    if i % 3 == 0:
        print('Fizz')
    elif i % 5 == 0:
        print('Buzz')
    else:
        print(i)";

    // ── Clarify ──────────────────────────────────────────

    #[tokio::test]
    async fn test_empty_source_always_clarifies() {
        let runner = ScriptedRunner::new(ExecutionResult::ok("unused"));
        let (tutor, _) = tutor_with(Arc::new(OfflineClient), runner.clone());
        let mut ctx = fizzbuzz_context();

        for attempt in 1..=8 {
            let source = if attempt % 2 == 0 { "" } else { "  \n\t " };
            let decision = tutor.handle("I'm stuck", source, &mut ctx).await;
            assert_eq!(decision.strategy, Strategy::Clarify);
            assert_eq!(decision.message, prompts::CLARIFY_FALLBACK);
            assert_eq!(decision.metadata.attempt, attempt);
        }
        assert_eq!(runner.calls.load(Ordering::SeqCst), 0);
        assert_eq!(ctx.history().len(), 8);
    }

    #[tokio::test]
    async fn test_clarify_uses_generated_question() {
        let llm = stub(None, Some("What should your program print for 3?"));
        let (tutor, _) = tutor_with(llm, ScriptedRunner::new(ExecutionResult::ok("")));
        let mut ctx = fizzbuzz_context();
        let decision = tutor.handle("where do I start?", "", &mut ctx).await;
        assert_eq!(decision.message, "What should your program print for 3?");
    }

    #[tokio::test]
    async fn test_clarify_never_passes_code_through() {
        let leaky = "Just write:\n```python\nfor i in range(1, 101):\n    print(i)\n```";
        let (tutor, _) = tutor_with(stub(None, Some(leaky)), ScriptedRunner::new(ExecutionResult::ok("")));
        let mut ctx = fizzbuzz_context();
        let decision = tutor.handle("give me the answer", "", &mut ctx).await;
        assert_eq!(decision.message, prompts::CLARIFY_FALLBACK);
    }

    // ── Failed runs ──────────────────────────────────────

    #[tokio::test]
    async fn test_name_error_explains_variables() {
        let (tutor, store) = offline_tutor(fault("NameError: name 'x' is not defined"));
        let mut ctx = fizzbuzz_context();

        let decision = tutor.handle("", "print(x)", &mut ctx).await;

        assert_eq!(decision.strategy, Strategy::Explain);
        assert_eq!(decision.metadata.concept, Some(Concept::Variables));
        assert!(decision.message.contains("help with **variables**"));
        assert!(decision.message.contains("NameError: name 'x' is not defined"));
        assert!(decision.message.ends_with("**Now try fixing your code!**"));
        assert!(ctx.identified_gaps().contains(&Concept::Variables));
        assert!(ctx.concepts_covered().contains(&Concept::Variables));
        let history = store.mastery_history();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].concept, "variables");
        assert_eq!(history[0].level, 0.0);
    }

    #[tokio::test]
    async fn test_indentation_and_division_syntax_are_explained() {
        let (tutor, _) = offline_tutor(fault("IndentationError: expected an indented block"));
        let mut ctx = fizzbuzz_context();
        let decision = tutor.handle("", "for i in range(3):\nprint(i)", &mut ctx).await;
        assert_eq!(decision.metadata.concept, Some(Concept::Indentation));

        let (tutor, _) = offline_tutor(fault("SyntaxError: invalid syntax"));
        let decision = tutor.handle("", "if i / 3 % == 0:", &mut ctx).await;
        assert_eq!(decision.metadata.concept, Some(Concept::Modulo));
        let gaps: Vec<_> = ctx.identified_gaps().iter().copied().collect();
        assert_eq!(gaps, vec![Concept::Indentation, Concept::Modulo]);
    }

    #[tokio::test]
    async fn test_unclassified_fault_gives_hint_with_error() {
        let (tutor, _) = offline_tutor(fault("ZeroDivisionError: division by zero"));
        let mut ctx = fizzbuzz_context();

        let decision = tutor.handle("why?", "print(1 / 0)", &mut ctx).await;

        assert_eq!(decision.strategy, Strategy::Hint);
        assert_eq!(decision.metadata.hint_level, Some(1));
        assert!(decision.message.contains("**💡 Hint (Level 1/4):**"));
        assert!(decision.message.contains(prompts::hint_fallback(1)));
        assert!(decision
            .message
            .ends_with("**Error details:** ZeroDivisionError: division by zero"));
        assert!(ctx.identified_gaps().is_empty());
    }

    #[tokio::test]
    async fn test_timeout_gives_hint() {
        let timeout = ExecutionResult::failed(ExecutionError::Timeout(std::time::Duration::from_secs(5)));
        let (tutor, _) = offline_tutor(timeout);
        let mut ctx = fizzbuzz_context();
        let decision = tutor.handle("", "while True: pass", &mut ctx).await;
        assert_eq!(decision.strategy, Strategy::Hint);
        assert!(decision.message.contains("Timeout: code execution timed out (5 seconds limit)"));
    }

    #[tokio::test]
    async fn test_hint_level_grows_with_attempts() {
        let (tutor, _) = offline_tutor(fault("TypeError: unsupported operand"));
        let mut ctx = fizzbuzz_context();
        let mut levels = Vec::new();
        for _ in 0..7 {
            let decision = tutor.handle("", "print('a' - 1)", &mut ctx).await;
            levels.push(decision.metadata.hint_level.unwrap());
        }
        assert_eq!(levels, vec![1, 2, 2, 3, 3, 4, 4]);
    }

    #[tokio::test]
    async fn test_leaky_hint_replaced_by_level_fallback() {
        let leaky = "Change it to:\nif i % 3 == 0:\n    print('Fizz')";
        let llm = stub(None, Some(leaky));
        let (tutor, _) = tutor_with(llm, ScriptedRunner::new(fault("TypeError: bad")));
        let mut ctx = fizzbuzz_context();
        let decision = tutor.handle("", "x", &mut ctx).await;
        assert!(decision.message.contains(prompts::hint_fallback(1)));
        assert!(!decision.message.contains("print('Fizz')"));
    }

    #[tokio::test]
    async fn test_repeated_calls_grow_attempts_and_keep_gaps() {
        let (tutor, _) = offline_tutor(fault("NameError: name 'y' is not defined"));
        let mut ctx = fizzbuzz_context();
        let mut previous_gaps = 0;
        for attempt in 1..=4 {
            tutor.handle("again", "print(y)", &mut ctx).await;
            assert_eq!(ctx.attempt_count(), attempt);
            assert_eq!(ctx.history().len(), attempt as usize);
            assert!(ctx.identified_gaps().len() >= previous_gaps);
            previous_gaps = ctx.identified_gaps().len();
        }
        assert_eq!(previous_gaps, 1);
    }

    // ── Successful runs ──────────────────────────────────

    #[tokio::test]
    async fn test_complete_fizzbuzz_first_attempt_is_celebrated() {
        let (tutor, store) = offline_tutor(ExecutionResult::ok(fizzbuzz_output()));
        let mut ctx = fizzbuzz_context();

        let decision = tutor.handle("done?", FIZZBUZZ, &mut ctx).await;

        assert_eq!(decision.strategy, Strategy::Critique);
        assert!(decision.metadata.success);
        assert!(!decision.metadata.review.unwrap().working_well.is_empty());
        assert!(decision.message.starts_with("🎉 **Excellent work!"));
        assert!(decision.message.contains("Congratulations"));
        assert_eq!(store.concept_mastery("modulo"), 1.0);
        assert_eq!(store.concept_mastery("loops"), 1.0);
    }

    #[tokio::test]
    async fn test_complete_even_if_reviewer_complains() {
        let review = r#"{"working_well": [], "issues": [{"line": 2, "issue": "Could use a helper", "explanation": "style"}], "suggestions": [], "overall_assessment": "ok"}"#;
        let llm = stub(Some(review), None);
        let (tutor, _) = tutor_with(llm, ScriptedRunner::new(ExecutionResult::ok(fizzbuzz_output())));
        let mut ctx = fizzbuzz_context();
        ctx.begin_attempt("warm-up", "");

        let decision = tutor.handle("", FIZZBUZZ, &mut ctx).await;

        assert_eq!(decision.strategy, Strategy::Critique);
        assert!(decision.metadata.success);
    }

    #[tokio::test]
    async fn test_division_instead_of_modulo_never_completes() {
        let source = "\
for i in range(1, 101):
    if i / 15 == i // 15:
        print('FizzBuzz')
    elif i / 3 == i // 3:
        print('Fizz')
    elif i / 5 == i // 5:
        print('Buzz')
    else:
        print(i)";
        let (tutor, _) = offline_tutor(ExecutionResult::ok(fizzbuzz_output()));
        let mut ctx = fizzbuzz_context();

        let first = tutor.handle("", source, &mut ctx).await;
        assert_eq!(first.strategy, Strategy::Critique);
        assert!(!first.metadata.success);
        assert!(first.message.contains("Using division (/) instead of modulo (%)"));

        for _ in 0..4 {
            let next = tutor.handle("", source, &mut ctx).await;
            assert_eq!(next.strategy, Strategy::Hint);
            assert!(!next.metadata.success);
        }
        assert!(ctx.concepts_covered().contains(&Concept::Modulo));
    }

    #[tokio::test]
    async fn test_incomplete_first_attempt_is_formative() {
        let output = "1\n2\nFizz\n4\nBuzz\nFizz\n7\n8\nFizz\nBuzz\n11\nFizz\n13\n14\nFizz";
        let (tutor, _) = offline_tutor(ExecutionResult::ok(output));
        let mut ctx = fizzbuzz_context();

        let decision = tutor.handle("", NO_COMBINED_BRANCH, &mut ctx).await;

        assert_eq!(decision.strategy, Strategy::Critique);
        assert!(!decision.metadata.success);
        assert!(decision.message.contains("⚠️ **Areas to improve:**"));
        assert!(decision
            .message
            .contains("- Line ?: Missing the FizzBuzz case (divisible by both 3 AND 5)"));
        assert!(decision.message.contains("Good use of a loop"));
    }

    #[tokio::test]
    async fn test_second_attempt_with_issues_hints_top_two() {
        let review = r#"```json
{"working_well": ["Clear loop"],
 "issues": [
   {"line": 1, "issue": "first"},
   {"line": 2, "issue": "second"},
   {"line": 3, "issue": "third"}
 ],
 "suggestions": []}
```"#;
        let llm = stub(Some(review), Some("Think about the case where both divide evenly."));
        let (tutor, _) = tutor_with(llm, ScriptedRunner::new(ExecutionResult::ok("1\n2\nFizz")));
        let mut ctx = fizzbuzz_context();

        let first = tutor.handle("", NO_COMBINED_BRANCH, &mut ctx).await;
        assert_eq!(first.strategy, Strategy::Critique);
        assert!(first.message.contains("- Line 3: third"));

        let second = tutor.handle("", NO_COMBINED_BRANCH, &mut ctx).await;
        assert_eq!(second.strategy, Strategy::Hint);
        assert_eq!(second.metadata.hint_level, Some(2));
        assert!(second.message.starts_with(prompts::encouragement(2)));
        assert!(second.message.contains("Think about the case where both divide evenly."));
        assert!(second.message.contains("⚠️ **Issues found:**\n- Line 1: first\n- Line 2: second"));
        assert!(!second.message.contains("third"));
    }

    #[tokio::test]
    async fn test_code_in_review_issues_never_reaches_the_learner() {
        let review = r#"{"working_well": [],
 "issues": [
   {"line": 2, "issue": "Add the combined case:\n```python\nif i % 15 == 0:\n    print('FizzBuzz')\n```", "explanation": "Order matters"},
   {"line": 4, "issue": "Branch order", "explanation": "if i % 15 == 0:\n    print('FizzBuzz')"}
 ],
 "suggestions": ["```python\nprint('FizzBuzz')\n```"]}"#;
        let llm = stub(Some(review), Some("Which numbers are divisible by both 3 and 5?"));
        let (tutor, _) = tutor_with(llm, ScriptedRunner::new(ExecutionResult::ok("1\n2\nFizz")));
        let mut ctx = fizzbuzz_context();

        let first = tutor.handle("", NO_COMBINED_BRANCH, &mut ctx).await;
        assert_eq!(first.strategy, Strategy::Critique);
        assert!(!first.message.contains("```"));
        assert!(!first.message.contains("print('FizzBuzz')"));

        let second = tutor.handle("", NO_COMBINED_BRANCH, &mut ctx).await;
        assert_eq!(second.strategy, Strategy::Hint);
        assert!(!second.message.contains("```"));
        assert!(!second.message.contains("print('FizzBuzz')"));
        assert!(second.message.contains("- Line 2: Something in this part of your code needs another look"));
        assert!(second.message.contains("- Line 4: Branch order"));
        let review = second.metadata.review.unwrap();
        assert!(review.suggestions.is_empty());
        assert!(review.issues[1].explanation.is_empty());
    }

    #[tokio::test]
    async fn test_malformed_review_falls_back() {
        let llm = stub(Some("Looks good to me!"), None);
        let (tutor, _) = tutor_with(llm, ScriptedRunner::new(ExecutionResult::ok("1\n2\n")));
        let mut ctx = fizzbuzz_context();

        let decision = tutor.handle("", "for i in range(1, 3):\n    print(i)", &mut ctx).await;

        assert_eq!(decision.strategy, Strategy::Critique);
        let review = decision.metadata.review.unwrap();
        assert!(review.working_well.contains(&"Code structure is clear".to_string()));
        assert!(review.issues.iter().any(|i| i.issue.contains("doesn't output")));
    }

    #[tokio::test]
    async fn test_markerless_problem_completes_on_clean_review() {
        let review = r#"{"working_well": ["Handles both cases"], "issues": [], "suggestions": []}"#;
        let llm = stub(Some(review), None);
        let (tutor, _) = tutor_with(llm, ScriptedRunner::new(ExecutionResult::ok("True\nFalse\nTrue\n")));
        let catalog = Catalog::builtin();
        let mut ctx = SessionContext::new(catalog.get("palindrome").unwrap().clone());

        let decision = tutor.handle("", "print(is_palindrome('racecar'))", &mut ctx).await;

        assert_eq!(decision.strategy, Strategy::Critique);
        assert!(decision.metadata.success);
    }

    #[tokio::test]
    async fn test_markerless_problem_needs_a_real_review() {
        // Wrong answers, but offline there is nobody to notice
        let (tutor, store) = offline_tutor(ExecutionResult::ok("False\nFalse\nFalse\n"));
        let catalog = Catalog::builtin();
        let mut ctx = SessionContext::new(catalog.get("palindrome").unwrap().clone());

        for _ in 0..3 {
            let decision = tutor.handle("", "print(False)\nprint(False)\nprint(False)", &mut ctx).await;
            assert_eq!(decision.strategy, Strategy::Critique);
            assert!(!decision.metadata.success);
            assert!(!decision.message.contains("Congratulations"));
        }
        assert!(store.mastery_history().is_empty());
    }

    #[tokio::test]
    async fn test_silent_run_on_markerless_problem_is_formative() {
        let (tutor, _) = offline_tutor(ExecutionResult::ok(""));
        let catalog = Catalog::builtin();
        let mut ctx = SessionContext::new(catalog.get("sum_list").unwrap().clone());

        let decision = tutor.handle("", "x = 1", &mut ctx).await;

        assert_eq!(decision.strategy, Strategy::Critique);
        assert!(!decision.metadata.success);
    }

    #[test]
    fn test_formative_without_content_uses_encouragement() {
        assert_eq!(formative(&Review::default()), prompts::FORMATIVE_FALLBACK);
    }

    // ── Side effects ─────────────────────────────────────

    #[tokio::test]
    async fn test_every_turn_stores_a_snapshot() {
        let (tutor, store) = offline_tutor(fault("NameError: name 'z' is not defined"));
        let mut ctx = fizzbuzz_context();
        tutor.handle("hi", "", &mut ctx).await;
        tutor.handle("", "print(z)", &mut ctx).await;

        assert_eq!(store.session_count(), 1);
        assert_eq!(store.write_count(), 2);
        let snapshot = store.snapshot(&ctx.session_id.to_string()).unwrap();
        assert_eq!(snapshot["attempt_count"], 2);
        assert_eq!(snapshot["identified_gaps"][0], "variables");
    }

    #[tokio::test]
    async fn test_explain_concept_known_and_unknown() {
        let (tutor, store) = offline_tutor(ExecutionResult::ok(""));
        let loops = tutor.explain_concept("Loops", None).await;
        assert!(loops.starts_with("**Understanding: Loops**"));

        let unknown = tutor.explain_concept("recursion", None).await;
        assert!(unknown.contains("**recursion**"));
        assert!(unknown.contains("trouble reaching my knowledge base"));
        assert_eq!(store.mastery_history().len(), 2);

        let llm = stub(None, Some("Recursion is a function calling itself."));
        let (tutor, _) = tutor_with(llm, ScriptedRunner::new(ExecutionResult::ok("")));
        assert_eq!(
            tutor.explain_concept("recursion", None).await,
            "Recursion is a function calling itself."
        );
    }

    #[test]
    fn test_decision_serializes_with_strategy_label() {
        let decision = DispatchDecision {
            strategy: Strategy::Hint,
            message: "m".to_string(),
            metadata: DecisionMetadata {
                attempt: 3,
                hint_level: Some(2),
                ..DecisionMetadata::default()
            },
        };
        let json = serde_json::to_value(&decision).unwrap();
        assert_eq!(json["strategy"], "hint");
        assert_eq!(json["metadata"]["hint_level"], 2);
        assert!(json["metadata"].get("review").is_none());
    }

    // ── With the real sandbox ────────────────────────────

    #[tokio::test]
    async fn test_end_to_end_with_real_executor() {
        let executor = SafeCodeExecutor::new(SandboxConfig::default());
        if !executor.is_available().await {
            eprintln!("python3 not available, skipping end-to-end test");
            return;
        }
        let store = Arc::new(InMemoryStore::new());
        let tutor = Tutor::new(Arc::new(OfflineClient), Arc::new(executor), store, 5);
        let mut ctx = fizzbuzz_context();

        let broken = tutor.handle("", "print(undefined_name)", &mut ctx).await;
        assert_eq!(broken.strategy, Strategy::Explain);

        let solved = tutor.handle("", FIZZBUZZ, &mut ctx).await;
        assert_eq!(solved.strategy, Strategy::Critique);
        assert!(solved.metadata.success);
    }
}
