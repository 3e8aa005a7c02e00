//! Programming concepts the tutor can name as gaps and explain.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Concept {
    Variables,
    Modulo,
    Indentation,
    Conditionals,
    Loops,
    Functions,
    Operators,
}

impl Concept {
    pub const ALL: [Concept; 7] = [
        Concept::Variables,
        Concept::Modulo,
        Concept::Indentation,
        Concept::Conditionals,
        Concept::Loops,
        Concept::Functions,
        Concept::Operators,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Concept::Variables => "variables",
            Concept::Modulo => "modulo",
            Concept::Indentation => "indentation",
            Concept::Conditionals => "conditionals",
            Concept::Loops => "loops",
            Concept::Functions => "functions",
            Concept::Operators => "operators",
        }
    }

    fn title(&self) -> &'static str {
        match self {
            Concept::Variables => "Variables",
            Concept::Modulo => "Modulo",
            Concept::Indentation => "Indentation",
            Concept::Conditionals => "Conditionals",
            Concept::Loops => "Loops",
            Concept::Functions => "Functions",
            Concept::Operators => "Operators",
        }
    }

    pub fn card(&self) -> &'static ConceptCard {
        match self {
            Concept::Variables => &VARIABLES,
            Concept::Modulo => &MODULO,
            Concept::Indentation => &INDENTATION,
            Concept::Conditionals => &CONDITIONALS,
            Concept::Loops => &LOOPS,
            Concept::Functions => &FUNCTIONS,
            Concept::Operators => &OPERATORS,
        }
    }

    /// Markdown explanation built from the canned card.
    pub fn explanation(&self) -> String {
        let card = self.card();
        format!(
            "**Understanding: {}**\n\n\
             📖 **What is it?**\n{}\n\n\
             🤔 **Think of it like this:**\n{}\n\n\
             💻 **Example:**\n```python\n{}\n```\n\n\
             🎯 **When to use it:**\n{}\n\n\
             ⚠️ **Common Mistakes:**\n{}",
            self.title(),
            card.definition,
            card.analogy,
            card.example,
            card.use_case,
            card.common_mistakes,
        )
    }
}

impl fmt::Display for Concept {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Concept {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Concept::ALL
            .into_iter()
            .find(|c| c.as_str() == wanted)
            .ok_or_else(|| format!("unknown concept '{s}'"))
    }
}

/// Canned teaching material for one concept.
pub struct ConceptCard {
    pub definition: &'static str,
    pub analogy: &'static str,
    pub example: &'static str,
    pub use_case: &'static str,
    pub common_mistakes: &'static str,
}

static MODULO: ConceptCard = ConceptCard {
    definition: "The modulo operator (%) returns the remainder after division",
    analogy: "Like sharing cookies: 7 cookies ÷ 3 people = 2 cookies per person with 1 left over. \
              That leftover is the modulo: 7 % 3 = 1",
    example: "# Check if number is divisible by 3\n\
              if num % 3 == 0:\n    print('Divisible by 3')\n\n\
              # Check if even or odd\n\
              if num % 2 == 0:\n    print('Even')\nelse:\n    print('Odd')",
    use_case: "Checking divisibility: a number is divisible by n when num % n == 0",
    common_mistakes: "Don't use / (division) when you mean % (modulo). \
                      `if num / 3 == 0` is WRONG, use `num % 3 == 0`",
};

static CONDITIONALS: ConceptCard = ConceptCard {
    definition: "if/elif/else statements let your code make decisions",
    analogy: "Like a choose-your-own-adventure book: if this happens, do that; \
              otherwise, do something else",
    example: "# Simple if-else\n\
              if temperature > 30:\n    print('Hot')\nelse:\n    print('Not hot')\n\n\
              # Multiple conditions\n\
              if score >= 90:\n    print('A')\nelif score >= 80:\n    print('B')\nelse:\n    print('C')",
    use_case: "Execute different code based on conditions",
    common_mistakes: "Order matters! Check the most specific condition first, \
                      otherwise a broader branch swallows it",
};

static LOOPS: ConceptCard = ConceptCard {
    definition: "Loops repeat code multiple times",
    analogy: "Like doing jumping jacks: you repeat the same motion 10 times",
    example: "# For loop with range\n\
              for i in range(5):\n    print(i)  # Prints 0, 1, 2, 3, 4\n\n\
              # For loop from 1 to 10\n\
              for i in range(1, 11):\n    print(i)  # Prints 1, 2, ..., 10",
    use_case: "When you need to do something repeatedly",
    common_mistakes: "range(100) gives 0-99, NOT 1-100. Use range(1, 101) for 1-100",
};

static INDENTATION: ConceptCard = ConceptCard {
    definition: "Python uses indentation (spaces/tabs) to define code blocks",
    analogy: "Like organizing folders: items inside a folder are indented \
              to show they belong to that folder",
    example: "# CORRECT - code inside if is indented\n\
              if x > 5:\n    print('Greater than 5')  # 4 spaces indent\n    print('This also runs')\n\n\
              # WRONG - missing indent\n\
              if x > 5:\nprint('Error!')  # This causes IndentationError",
    use_case: "Every if, elif, else, for, while, def needs indented code below it",
    common_mistakes: "Mixing tabs and spaces causes errors. Use 4 spaces consistently \
                      and indent ALL lines inside a block",
};

static VARIABLES: ConceptCard = ConceptCard {
    definition: "Variables store values that you can use and change later",
    analogy: "Like labeled boxes: you put something in a box and give it a name \
              so you can find it later",
    example: "# Create variables\n\
              name = 'Alice'\nage = 25\n\n\
              # Use variables\n\
              print(name)  # Prints: Alice\nage = age + 1  # Now age is 26",
    use_case: "Store data you need to remember and use multiple times",
    common_mistakes: "NameError means you're using a name that doesn't exist. \
                      Define it before using it, and check the spelling!",
};

static FUNCTIONS: ConceptCard = ConceptCard {
    definition: "Functions are reusable blocks of code that perform a specific task",
    analogy: "Like a recipe: write it once, use it many times",
    example: "# Define function\n\
              def greet(name):\n    print('Hello, ' + name + '!')\n\n\
              # Call function\n\
              greet('Alice')  # Prints: Hello, Alice!",
    use_case: "Organize code and avoid repetition",
    common_mistakes: "Don't forget the () when calling a function: greet('Alice') not greet",
};

static OPERATORS: ConceptCard = ConceptCard {
    definition: "Operators perform operations on values: +, -, *, /, %, ==, !=, <, >",
    analogy: "Like math symbols: + adds, - subtracts, etc.",
    example: "# Arithmetic\n\
              result = 10 + 5  # 15\nresult = 10 % 3  # 1 (remainder)\n\n\
              # Comparison and logic\n\
              if age >= 18 and age < 65:\n    print('Working age')",
    use_case: "Perform calculations and comparisons",
    common_mistakes: "Use == for comparison (if x == 5), not = which is for assignment (x = 5)",
};
