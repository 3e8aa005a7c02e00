//! Pattern rules the dispatch policy applies to error text and source text.
//!
//! These are plain substring / regex checks tuned for Python and for the
//! FizzBuzz family of problems. They misfire easily (a `/` inside a string
//! literal counts as division, for instance), so they are kept here as
//! ordered tables where each rule can be read and tested on its own.

use std::sync::LazyLock;

use regex::Regex;

use super::concepts::Concept;
use super::problems::{HeuristicSet, Problem};

// ── Error classification ─────────────────────────────────

/// Maps a failed run to the concept the learner is most likely missing.
pub struct ErrorRule {
    pub name: &'static str,
    pub concept: Concept,
    /// Receives the lowercased error text and the raw source.
    matches: fn(&str, &str) -> bool,
}

fn missing_name(error: &str, _source: &str) -> bool {
    error.contains("nameerror") || error.contains("not defined")
}

fn division_syntax(error: &str, source: &str) -> bool {
    error.contains("syntaxerror") && source.contains('%') && source.contains('/')
}

fn indentation(error: &str, _source: &str) -> bool {
    error.contains("indentationerror")
}

/// Checked top to bottom; the first match wins.
pub static ERROR_RULES: &[ErrorRule] = &[
    ErrorRule {
        name: "missing-name",
        concept: Concept::Variables,
        matches: missing_name,
    },
    ErrorRule {
        name: "division-syntax",
        concept: Concept::Modulo,
        matches: division_syntax,
    },
    ErrorRule {
        name: "indentation",
        concept: Concept::Indentation,
        matches: indentation,
    },
];

/// Returns the first rule matching `error_text` (e.g. `NameError: ...`).
pub fn classify_error(error_text: &str, source: &str) -> Option<&'static ErrorRule> {
    let error = error_text.to_lowercase();
    ERROR_RULES.iter().find(|rule| (rule.matches)(&error, source))
}

// ── Problem heuristics ───────────────────────────────────

/// A problem-specific mistake spotted in a run that otherwise succeeded.
#[derive(Debug, Clone, PartialEq)]
pub struct Finding {
    pub rule: &'static str,
    pub issue: String,
    pub hint: String,
    /// Concept the finding touches on, recorded as covered.
    pub concept: Option<Concept>,
}

type HeuristicCheck = fn(&Problem, &str, &str) -> Option<Finding>;

static REMAINDER_3: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"%\s*3\b").unwrap());
static REMAINDER_5: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"%\s*5\b").unwrap());
static REMAINDER_15: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"%\s*15\b").unwrap());
static AND_KEYWORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\band\b").unwrap());

fn division_for_remainder(_problem: &Problem, source: &str, _output: &str) -> Option<Finding> {
    (source.contains('/') && !source.contains('%')).then(|| Finding {
        rule: "division-for-remainder",
        issue: "Using division (/) instead of modulo (%) for divisibility check".to_string(),
        hint: "Remember: To check if a number is divisible, use the modulo operator %"
            .to_string(),
        concept: Some(Concept::Modulo),
    })
}

fn missing_combined_branch(_problem: &Problem, source: &str, output: &str) -> Option<Finding> {
    let checks_both_separately = REMAINDER_3.is_match(source) && REMAINDER_5.is_match(source);
    let checks_combined = REMAINDER_15.is_match(source) || AND_KEYWORD.is_match(source);
    (!output.contains("FizzBuzz") && checks_both_separately && !checks_combined).then(|| {
        Finding {
            rule: "missing-combined-branch",
            issue: "Missing the FizzBuzz case (divisible by both 3 AND 5)".to_string(),
            hint: "What should happen when a number is divisible by BOTH 3 and 5?".to_string(),
            concept: Some(Concept::Conditionals),
        }
    })
}

fn missing_output_markers(problem: &Problem, _source: &str, output: &str) -> Option<Finding> {
    if problem.markers.is_empty() || problem.markers.iter().any(|m| output.contains(&m.text)) {
        return None;
    }
    let names = problem
        .markers
        .iter()
        .map(|m| m.text.as_str())
        .collect::<Vec<_>>()
        .join(" or ");
    Some(Finding {
        rule: "missing-output-markers",
        issue: format!("Code doesn't output {names} yet"),
        hint: "Your loop is working! Now add conditions to check divisibility.".to_string(),
        concept: None,
    })
}

static DIVISIBILITY_RULES: &[HeuristicCheck] = &[
    division_for_remainder,
    missing_combined_branch,
    missing_output_markers,
];

/// Runs the problem's heuristic set over a successful submission.
pub fn apply_heuristics(problem: &Problem, source: &str, output: &str) -> Vec<Finding> {
    let rules: &[HeuristicCheck] = match problem.heuristics {
        HeuristicSet::None => &[],
        HeuristicSet::Divisibility => DIVISIBILITY_RULES,
    };
    rules
        .iter()
        .filter_map(|check| check(problem, source, output))
        .collect()
}
