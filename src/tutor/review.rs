//! Code critique: structured review of a submission that ran.

use serde::{Deserialize, Deserializer, Serialize};

use super::rules::Finding;
use super::TutorError;
use crate::sandbox::ExecutionResult;

/// One thing to fix, located in the source where possible.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    /// 1-based line number; `None` when the issue is not tied to a line.
    #[serde(default, deserialize_with = "lenient_line")]
    pub line: Option<u32>,
    pub issue: String,
    #[serde(default)]
    pub explanation: String,
}

impl Issue {
    pub fn locator(&self) -> String {
        match self.line {
            Some(n) => format!("Line {n}"),
            None => "Line ?".to_string(),
        }
    }
}

impl From<&Finding> for Issue {
    fn from(finding: &Finding) -> Self {
        Issue {
            line: None,
            issue: finding.issue.clone(),
            explanation: finding.hint.clone(),
        }
    }
}

/// Accepts `3`, `"3"`, `"?"`, `0` or `null`; only positive numbers survive.
fn lenient_line<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u32>, D::Error> {
    let value = serde_json::Value::deserialize(deserializer)?;
    let line = match value {
        serde_json::Value::Number(n) => n.as_u64(),
        serde_json::Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    };
    Ok(line
        .filter(|&n| n > 0)
        .and_then(|n| u32::try_from(n).ok()))
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Review {
    #[serde(default)]
    pub working_well: Vec<String>,
    #[serde(default)]
    pub issues: Vec<Issue>,
    #[serde(default)]
    pub suggestions: Vec<String>,
    #[serde(default)]
    pub overall_assessment: String,
    /// Set when the review came back from the model rather than
    /// [`Review::fallback`].
    #[serde(skip)]
    generated: bool,
}

impl Review {
    /// Parses a model reply that should be a JSON review, tolerating
    /// Markdown fences and chatter around the object.
    pub fn parse(raw: &str) -> Result<Self, TutorError> {
        let payload = extract_json_object(raw)
            .ok_or_else(|| TutorError::MalformedResponse("no JSON object in reply".to_string()))?;
        let mut review: Review = serde_json::from_str(payload)
            .map_err(|e| TutorError::MalformedResponse(e.to_string()))?;
        review.generated = true;
        Ok(review)
    }

    /// Deterministic review used when the model is unavailable or its
    /// reply cannot be parsed.
    pub fn fallback(execution: &ExecutionResult) -> Self {
        if execution.success {
            Review {
                working_well: vec!["Code structure is clear".to_string()],
                issues: Vec::new(),
                suggestions: vec!["Keep refining your solution".to_string()],
                overall_assessment: "You're on the right track! Keep going.".to_string(),
                generated: false,
            }
        } else {
            Review {
                working_well: Vec::new(),
                issues: vec![Issue {
                    line: None,
                    issue: execution.error_text(),
                    explanation: "Fix this error first".to_string(),
                }],
                suggestions: vec!["Keep refining your solution".to_string()],
                overall_assessment: "You're on the right track! Keep going.".to_string(),
                generated: false,
            }
        }
    }

    pub fn is_generated(&self) -> bool {
        self.generated
    }

    /// Blanks out every part of the review that `is_code` flags, so a
    /// model that pasted a solution into an issue cannot reach the
    /// learner. Returns how many parts were touched.
    pub fn redact(&mut self, is_code: impl Fn(&str) -> bool) -> usize {
        let mut redacted = 0;
        for issue in &mut self.issues {
            if is_code(&issue.issue) {
                issue.issue = REDACTED_ISSUE.to_string();
                redacted += 1;
            }
            if is_code(&issue.explanation) {
                issue.explanation.clear();
                redacted += 1;
            }
        }
        for list in [&mut self.working_well, &mut self.suggestions] {
            let before = list.len();
            list.retain(|item| !is_code(item));
            redacted += before - list.len();
        }
        if is_code(&self.overall_assessment) {
            self.overall_assessment.clear();
            redacted += 1;
        }
        redacted
    }

    /// Adds positives that can be read straight off the source, skipping
    /// any the review already lists.
    pub fn merge_observations(&mut self, observations: Vec<String>) {
        let mut merged = observations;
        merged.retain(|o| !self.working_well.contains(o));
        merged.extend(self.working_well.drain(..));
        self.working_well = merged;
    }

    pub fn add_finding(&mut self, finding: &Finding) {
        self.issues.push(Issue::from(finding));
    }

    pub fn has_issues(&self) -> bool {
        !self.issues.is_empty()
    }
}

const REDACTED_ISSUE: &str = "Something in this part of your code needs another look";

/// Finds the outermost `{ ... }` in `raw`, after stripping a code fence.
fn extract_json_object(raw: &str) -> Option<&str> {
    let text = strip_code_fence(raw.trim());
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

/// ```` ```json\n{...}\n``` ```` → `{...}`
fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // Drop the info string ("json", "JSON", ...) on the opening line
    let body = rest.split_once('\n').map(|(_, body)| body).unwrap_or("");
    body.rsplit_once("```").map(|(inner, _)| inner).unwrap_or(body).trim()
}

/// Positives that are visible without running anything.
pub fn static_observations(source: &str) -> Vec<String> {
    let mut found = Vec::new();
    let has_line_starting = |prefix: &str| source.lines().any(|l| l.trim_start().starts_with(prefix));

    if has_line_starting("for ") || has_line_starting("while ") {
        found.push("Good use of a loop to repeat work".to_string());
    }
    if has_line_starting("def ") {
        found.push("Nice job organizing the code in a function".to_string());
    }
    if has_line_starting("if ") {
        found.push("Uses conditionals to make decisions".to_string());
    }
    if source.contains('%') {
        found.push("Uses the modulo operator to check divisibility".to_string());
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::ExecutionError;

    const REVIEW_JSON: &str = r#"{
        "working_well": ["Clear loop"],
        "issues": [{"line": 3, "issue": "Off by one", "explanation": "range stops early"}],
        "suggestions": ["Use range(1, 101)"],
        "overall_assessment": "Close!"
    }"#;

    #[test]
    fn test_parse_plain_json() {
        let review = Review::parse(REVIEW_JSON).unwrap();
        assert_eq!(review.working_well, vec!["Clear loop"]);
        assert_eq!(review.issues[0].line, Some(3));
        assert_eq!(review.issues[0].locator(), "Line 3");
        assert_eq!(review.suggestions.len(), 1);
        assert_eq!(review.overall_assessment, "Close!");
    }

    #[test]
    fn test_parse_fenced_json() {
        let raw = format!("```json\n{REVIEW_JSON}\n```");
        let review = Review::parse(&raw).unwrap();
        assert_eq!(review.issues.len(), 1);
    }

    #[test]
    fn test_parse_json_with_chatter() {
        let raw = format!("Here is my review:\n{REVIEW_JSON}\nHope that helps!");
        assert!(Review::parse(&raw).is_ok());
    }

    #[test]
    fn test_parse_lenient_line_numbers() {
        let raw = r#"{"issues": [
            {"line": "7", "issue": "a"},
            {"line": "?", "issue": "b"},
            {"line": 0, "issue": "c"},
            {"issue": "d"}
        ]}"#;
        let review = Review::parse(raw).unwrap();
        let lines: Vec<_> = review.issues.iter().map(|i| i.line).collect();
        assert_eq!(lines, vec![Some(7), None, None, None]);
        assert_eq!(review.issues[1].locator(), "Line ?");
        assert!(review.working_well.is_empty());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(
            Review::parse("I think your code is great!"),
            Err(TutorError::MalformedResponse(_))
        ));
        assert!(matches!(
            Review::parse("```json\n{\"issues\": [oops]}\n```"),
            Err(TutorError::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_fallback_for_success_has_a_positive() {
        let review = Review::fallback(&ExecutionResult::ok("1\n"));
        assert!(!review.working_well.is_empty());
        assert!(!review.has_issues());
    }

    #[test]
    fn test_only_parsed_reviews_count_as_generated() {
        assert!(Review::parse(REVIEW_JSON).unwrap().is_generated());
        assert!(!Review::fallback(&ExecutionResult::ok("1\n")).is_generated());
        assert!(!Review::default().is_generated());
    }

    #[test]
    fn test_redact_strips_pasted_solutions() {
        let raw = r#"{
            "working_well": ["Clear loop", "```python\nfor i in range(1, 101):\n    print(i)\n```"],
            "issues": [
                {"line": 4, "issue": "Replace it with:\n```python\nif i % 15 == 0:\n    print('FizzBuzz')\n```", "explanation": "Check 15 first"},
                {"line": 2, "issue": "Off by one", "explanation": "for i in range(1, 101):\n    print(i)"}
            ],
            "suggestions": ["Name the loop variable"],
            "overall_assessment": "Close!"
        }"#;
        let mut review = Review::parse(raw).unwrap();
        assert_eq!(review.redact(crate::tutor::prompts::leaks_code), 3);

        assert_eq!(review.working_well, vec!["Clear loop"]);
        assert_eq!(review.issues.len(), 2);
        assert_eq!(review.issues[0].issue, REDACTED_ISSUE);
        assert_eq!(review.issues[0].explanation, "Check 15 first");
        assert_eq!(review.issues[1].issue, "Off by one");
        assert!(review.issues[1].explanation.is_empty());
        assert_eq!(review.suggestions, vec!["Name the loop variable"]);
        assert!(!serde_json::to_string(&review).unwrap().contains("FizzBuzz"));
    }

    #[test]
    fn test_fallback_for_failure_lists_error() {
        let failed = ExecutionResult::failed(ExecutionError::from_fault_line("TypeError: nope"));
        let review = Review::fallback(&failed);
        assert_eq!(review.issues[0].issue, "TypeError: nope");
    }

    #[test]
    fn test_static_observations() {
        let source = "def fizzbuzz():\n    for i in range(1, 101):\n        if i % 3 == 0:\n            print('Fizz')";
        let found = static_observations(source);
        assert_eq!(found.len(), 4);
        assert!(static_observations("print('hi')").is_empty());
    }

    #[test]
    fn test_merge_observations_dedupes_and_leads() {
        let mut review = Review {
            working_well: vec!["Clear names".to_string(), "Uses conditionals to make decisions".to_string()],
            ..Review::default()
        };
        review.merge_observations(vec![
            "Good use of a loop to repeat work".to_string(),
            "Uses conditionals to make decisions".to_string(),
        ]);
        assert_eq!(
            review.working_well,
            vec![
                "Good use of a loop to repeat work",
                "Clear names",
                "Uses conditionals to make decisions"
            ]
        );
    }
}
