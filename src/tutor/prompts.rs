//! Prompt templates, hint graduation and the deterministic fallbacks used
//! whenever generated text is unavailable or unusable.

use super::context::SessionContext;
use super::review::Issue;
use crate::sandbox::ExecutionResult;

pub const SOCRATIC_INSTRUCTION: &str = "\
You are the Socratic mentor of a programming tutor for beginners.

Guide through questions, never through answers:
- Help the student discover the solution themselves
- Break the problem into smaller questions
- Move from understanding the problem, to inputs and outputs, to an approach,
  to edge cases

Rules:
- NEVER write code for the student
- NEVER say \"the answer is...\"
- Celebrate attempts, even incorrect ones

Reply with a single question of one or two sentences. Be warm and encouraging.";

pub const HINT_INSTRUCTION: &str = "\
You are the hint provider of a programming tutor for beginners.

Give just enough information to unblock the student without solving the problem.
The hint level tells you how specific to be:
- Level 1: the high-level approach only
- Level 2: name the concept, not the code
- Level 3: describe the code structure, not the implementation
- Level 4: point at the region or line that needs fixing

Rules:
- NEVER provide complete code, at any level
- No code blocks
- Two to four sentences, always encouraging";

pub const REVIEW_INSTRUCTION: &str = "\
You are the code reviewer of a programming tutor for beginners.

Analyse the student's code for functionality (does it solve the problem, logic
errors, edge cases), quality (names, readability) and common mistakes
(off-by-one ranges, wrong conditional order, missing returns).

Point out what works before what is wrong, and explain why each issue matters.
Never rewrite the code or provide a corrected version.

Respond with ONLY a JSON object with the keys working_well (list of strings),
issues (list of objects with line, issue and explanation), suggestions (list of
strings) and overall_assessment (string).";

pub const EXPLAINER_INSTRUCTION: &str = "\
You are the concept explainer of a programming tutor for beginners.

Start with intuition, not jargon. Use an everyday analogy, then a short
annotated example, then the mistakes students typically make. Keep it between
200 and 300 words and use Markdown.";

pub const CLARIFY_FALLBACK: &str =
    "Let's break this down: What's the first step you think you should take?";

pub const FORMATIVE_FALLBACK: &str = "Good start! Your code runs successfully. Keep refining!";

const ENCOURAGEMENTS: [&str; 5] = [
    "You're making progress! Keep going.",
    "Good attempt! You're thinking in the right direction.",
    "Nice try! You're getting closer.",
    "I can see you're learning from each attempt!",
    "You're doing great! Just a bit more refinement needed.",
];

pub const MAX_HINT_LEVEL: u8 = 4;

/// Maps the attempt index onto hint levels 1..=4.
pub fn hint_level(attempt: u32) -> u8 {
    match attempt {
        0..=1 => 1,
        2..=3 => 2,
        4..=5 => 3,
        _ => 4,
    }
}

pub fn encouragement(attempt: u32) -> &'static str {
    let index = (attempt as usize).min(ENCOURAGEMENTS.len() - 1);
    ENCOURAGEMENTS[index]
}

pub fn hint_fallback(level: u8) -> &'static str {
    match level {
        0 | 1 => "Try breaking the problem into smaller steps.",
        2 => "Think about which concept from the problem statement your code still needs. \
              Which operator or statement would help?",
        3 => "Look at the structure of your code: does every case in the problem have its own \
              branch, and are the branches checked in the right order?",
        _ => "Walk through your code by hand for a value where the output is wrong. \
              The line where your trace goes off track is the one to fix.",
    }
}

pub fn explain_fallback(concept: &str) -> String {
    format!(
        "**Understanding: {}**\n\n\
         I'm having trouble reaching my knowledge base right now, but here's what I can tell you:\n\n\
         The concept of **{concept}** is fundamental in Python programming.\n\n\
         🔍 **Quick tip:** Try writing a simple example and submit it for review. \
         I'll be able to give you specific feedback on your code!\n\n\
         💡 **In the meantime:** Think about what you're trying to accomplish. \
         What should your code do? Break it down into small steps.",
        title_case(concept)
    )
}

fn title_case(text: &str) -> String {
    text.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

// ── Prompt builders ──────────────────────────────────────

fn format_history(ctx: &SessionContext, limit: usize) -> String {
    let recent = ctx.recent_history(limit);
    if recent.is_empty() {
        return "(none)".to_string();
    }
    recent
        .iter()
        .map(|i| {
            let message = if i.message.trim().is_empty() { "(no message)" } else { i.message.trim() };
            let code = if i.source.trim().is_empty() { "" } else { " [submitted code]" };
            format!("- Attempt {}: {message}{code}", i.attempt)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn or_placeholder<'a>(text: &'a str, placeholder: &'a str) -> &'a str {
    if text.trim().is_empty() {
        placeholder
    } else {
        text
    }
}

pub fn clarify_prompt(ctx: &SessionContext, message: &str, history_limit: usize) -> String {
    format!(
        "Problem: {}\n\n\
         Student's latest code: {}\n\
         Number of attempts: {}\n\
         Student's question: {}\n\n\
         Recent interactions:\n{}\n\n\
         Ask one Socratic question that builds on what they have tried so far \
         without giving away the answer, for example \
         \"What should your code output for the number 15?\".\n\
         Respond with ONLY the question.",
        ctx.problem.description,
        or_placeholder(ctx.last_source(), "No code yet"),
        ctx.attempt_count(),
        or_placeholder(message, "(none)"),
        format_history(ctx, history_limit),
    )
}

pub fn hint_prompt(
    ctx: &SessionContext,
    source: &str,
    error: &str,
    issues: &[Issue],
    level: u8,
) -> String {
    let mut prompt = format!(
        "Problem: {}\n\n\
         Student's latest code:\n{}\n\n\
         Error message: {}\n\
         Attempt number: {}\n\
         Hint level: {level}/{MAX_HINT_LEVEL}\n",
        ctx.problem.description,
        or_placeholder(source, "No code yet"),
        or_placeholder(error, "No error"),
        ctx.attempt_count(),
    );
    if !issues.is_empty() {
        prompt.push_str("\nIssues spotted in the code:\n");
        for issue in issues {
            prompt.push_str(&format!("- {}: {}\n", issue.locator(), issue.issue));
        }
    }
    prompt.push_str(&format!(
        "\nGenerate a hint at level {level}. NEVER write the complete solution, \
         only enough guidance for the next step. Respond with 2-3 sentences."
    ));
    prompt
}

pub fn review_prompt(ctx: &SessionContext, source: &str, execution: &ExecutionResult) -> String {
    format!(
        "Review this student code for the following problem:\n\n\
         Problem: {}\n\n\
         Student's code:\n```python\n{source}\n```\n\n\
         Execution result:\n\
         - Success: {}\n\
         - Output: {}\n\
         - Error: {}\n\n\
         Respond with ONLY valid JSON of the form:\n\
         {{\"working_well\": [\"...\"], \
         \"issues\": [{{\"line\": 3, \"issue\": \"...\", \"explanation\": \"...\"}}], \
         \"suggestions\": [\"...\"], \"overall_assessment\": \"...\"}}",
        ctx.problem.description,
        execution.success,
        or_placeholder(&execution.output, "No output"),
        or_placeholder(&execution.error_text(), "No errors"),
    )
}

pub fn explain_prompt(concept: &str, reason: Option<&str>) -> String {
    let mut prompt = format!(
        "Explain the programming concept \"{concept}\" to a beginner student.\n\n"
    );
    if let Some(reason) = reason {
        prompt.push_str(&format!("The student got this error: {reason}\n\n"));
    }
    prompt.push_str(
        "Cover:\n\
         📖 What is it? (one sentence, no jargon)\n\
         🤔 Analogy (a simple real-world comparison)\n\
         💻 Code example (Python with comments)\n\
         🎯 When to use it\n\
         ⚠️ Common mistakes",
    );
    prompt
}

// ── Output guard ─────────────────────────────────────────

const SOLUTION_LINE_PREFIXES: [&str; 8] = [
    "def ", "for ", "while ", "if ", "elif ", "else:", "print(", "return ",
];

/// True when generated hint or question text looks like it hands over
/// code: any fenced block, or two or more lines shaped like Python
/// statements.
pub fn leaks_code(text: &str) -> bool {
    if text.contains("```") {
        return true;
    }
    let code_lines = text
        .lines()
        .map(str::trim_start)
        .filter(|line| SOLUTION_LINE_PREFIXES.iter().any(|p| line.starts_with(p)))
        .count();
    code_lines >= 2
}
