//! Practice problems and their per-problem completion rules.

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::concepts::Concept;
use super::review::Review;
use crate::config::ProblemConfig;

/// Text that must show up in the program output at least `min` times.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Marker {
    pub text: String,
    #[serde(default = "default_min")]
    pub min: usize,
}

fn default_min() -> usize {
    1
}

impl Marker {
    pub fn new(text: &str, min: usize) -> Self {
        Self {
            text: text.to_string(),
            min,
        }
    }

    pub fn count_in(&self, output: &str) -> usize {
        if self.text.is_empty() {
            return 0;
        }
        output.matches(self.text.as_str()).count()
    }

    pub fn is_met(&self, output: &str) -> bool {
        self.count_in(output) >= self.min
    }
}

/// Which source/output heuristics apply on top of the generic critique.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeuristicSet {
    #[default]
    None,
    /// FizzBuzz-shaped problems: remainder checks on 3, 5 and both.
    Divisibility,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Problem {
    pub key: String,
    pub title: String,
    pub description: String,
    pub difficulty: String,
    pub concepts: Vec<Concept>,
    /// Output markers that define a complete solution. When empty, a run
    /// counts once it prints something and a model review of it found no
    /// issues. The canned fallback review never completes such a problem.
    pub markers: Vec<Marker>,
    pub heuristics: HeuristicSet,
}

impl Problem {
    /// Per-problem completion predicate over a successful run.
    pub fn is_solved_by(&self, output: &str, review: &Review) -> bool {
        if self.markers.is_empty() {
            !output.trim().is_empty() && review.is_generated() && !review.has_issues()
        } else {
            self.markers.iter().all(|m| m.is_met(output))
        }
    }
}

impl From<&ProblemConfig> for Problem {
    fn from(cfg: &ProblemConfig) -> Self {
        let concepts = cfg
            .concepts
            .iter()
            .filter_map(|name| match name.parse::<Concept>() {
                Ok(concept) => Some(concept),
                Err(e) => {
                    warn!("Problem '{}': {e}, ignoring", cfg.key);
                    None
                }
            })
            .collect();
        Problem {
            key: cfg.key.trim().to_lowercase(),
            title: cfg.title.clone(),
            description: cfg.description.clone(),
            difficulty: cfg.difficulty.clone(),
            concepts,
            markers: cfg.markers.clone(),
            heuristics: cfg.heuristics,
        }
    }
}

/// The set of problems a session can be started on.
#[derive(Debug, Clone)]
pub struct Catalog {
    problems: Vec<Problem>,
}

impl Catalog {
    pub fn builtin() -> Self {
        Self {
            problems: vec![fizzbuzz(), palindrome(), sum_list(), reverse_string()],
        }
    }

    /// Built-in problems plus configured ones. A configured problem with
    /// the key of a built-in one replaces it.
    pub fn with_custom(custom: &[ProblemConfig]) -> Self {
        let mut catalog = Self::builtin();
        for cfg in custom {
            let problem = Problem::from(cfg);
            match catalog.problems.iter_mut().find(|p| p.key == problem.key) {
                Some(existing) => *existing = problem,
                None => catalog.problems.push(problem),
            }
        }
        catalog
    }

    pub fn get(&self, key: &str) -> Option<&Problem> {
        let key = key.trim().to_lowercase();
        self.problems.iter().find(|p| p.key == key)
    }

    pub fn default_problem(&self) -> &Problem {
        &self.problems[0]
    }

    pub fn problems(&self) -> &[Problem] {
        &self.problems
    }
}

fn fizzbuzz() -> Problem {
    Problem {
        key: "fizzbuzz".to_string(),
        title: "FizzBuzz".to_string(),
        description: "Write a function fizzbuzz() that prints numbers from 1 to 100.\n\
                      - For multiples of 3, print \"Fizz\"\n\
                      - For multiples of 5, print \"Buzz\"\n\
                      - For multiples of both 3 and 5, print \"FizzBuzz\"\n\
                      - Otherwise, print the number"
            .to_string(),
        difficulty: "Easy".to_string(),
        concepts: vec![Concept::Loops, Concept::Conditionals, Concept::Modulo],
        markers: vec![
            Marker::new("Fizz", 2),
            Marker::new("Buzz", 2),
            Marker::new("FizzBuzz", 1),
        ],
        heuristics: HeuristicSet::Divisibility,
    }
}

fn palindrome() -> Problem {
    Problem {
        key: "palindrome".to_string(),
        title: "Palindrome Checker".to_string(),
        description: "Write a function is_palindrome(s) that returns True if the string s is a \
                      palindrome (reads the same forwards and backwards), False otherwise.\n\
                      Ignore spaces and capitalization.\n\n\
                      Examples:\n\
                      - is_palindrome(\"racecar\") → True\n\
                      - is_palindrome(\"hello\") → False\n\
                      - is_palindrome(\"A man a plan a canal Panama\") → True"
            .to_string(),
        difficulty: "Easy".to_string(),
        concepts: vec![Concept::Conditionals, Concept::Loops],
        markers: Vec::new(),
        heuristics: HeuristicSet::None,
    }
}

fn sum_list() -> Problem {
    Problem {
        key: "sum_list".to_string(),
        title: "Sum of List".to_string(),
        description: "Write a function sum_list(numbers) that takes a list of integers and \
                      returns their sum.\nDo NOT use the built-in sum() function.\n\n\
                      Example:\n\
                      - sum_list([1, 2, 3, 4]) → 10\n\
                      - sum_list([]) → 0"
            .to_string(),
        difficulty: "Easy".to_string(),
        concepts: vec![Concept::Loops, Concept::Variables],
        markers: Vec::new(),
        heuristics: HeuristicSet::None,
    }
}

fn reverse_string() -> Problem {
    Problem {
        key: "reverse_string".to_string(),
        title: "Reverse String".to_string(),
        description: "Write a function reverse_string(s) that returns the reverse of string s.\n\
                      Do NOT use slicing ([::-1]).\n\n\
                      Example:\n\
                      - reverse_string(\"hello\") → \"olleh\"\n\
                      - reverse_string(\"Python\") → \"nohtyP\""
            .to_string(),
        difficulty: "Easy".to_string(),
        concepts: vec![Concept::Loops, Concept::Functions],
        markers: Vec::new(),
        heuristics: HeuristicSet::None,
    }
}
