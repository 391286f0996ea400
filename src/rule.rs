//! Rule identifiers and rule metadata

use crate::diagnostic::Severity;
use crate::resolver::CollectionKind;
use crate::syntax::LoopForm;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The fixed set of loop-form rules
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RuleId {
    /// Indexed `for` over an array
    LoopPrefersForeachForArray,
    /// `foreach` over a list
    LoopPrefersForForList,
    /// `foreach` over an array
    LoopPrefersForForArray,
    /// Read-only indexed `for` over a list
    LoopPrefersForeachForList,
}

impl RuleId {
    /// Every rule in registration order
    pub const ALL: [RuleId; 4] = [
        RuleId::LoopPrefersForeachForArray,
        RuleId::LoopPrefersForForList,
        RuleId::LoopPrefersForForArray,
        RuleId::LoopPrefersForeachForList,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RuleId::LoopPrefersForeachForArray => "loop-prefers-foreach-for-array",
            RuleId::LoopPrefersForForList => "loop-prefers-for-for-list",
            RuleId::LoopPrefersForForArray => "loop-prefers-for-for-array",
            RuleId::LoopPrefersForeachForList => "loop-prefers-foreach-for-list",
        }
    }

    /// Short code kept stable across renames
    pub fn code(&self) -> &'static str {
        match self {
            RuleId::LoopPrefersForeachForArray => "LOOP001",
            RuleId::LoopPrefersForForList => "LOOP002",
            RuleId::LoopPrefersForForArray => "LOOP003",
            RuleId::LoopPrefersForeachForList => "LOOP004",
        }
    }

    pub fn default_severity(&self) -> Severity {
        match self {
            RuleId::LoopPrefersForeachForArray => Severity::Warning,
            _ => Severity::Info,
        }
    }

    /// Form the rule recommends
    pub fn recommended(&self) -> LoopForm {
        match self {
            RuleId::LoopPrefersForeachForArray | RuleId::LoopPrefersForeachForList => {
                LoopForm::ElementForeach
            }
            RuleId::LoopPrefersForForList | RuleId::LoopPrefersForForArray => LoopForm::IndexedFor,
        }
    }

    /// Form the rule flags
    pub fn flagged(&self) -> LoopForm {
        self.recommended().opposite()
    }

    pub fn collection(&self) -> CollectionKind {
        match self {
            RuleId::LoopPrefersForeachForArray | RuleId::LoopPrefersForForArray => {
                CollectionKind::Array
            }
            RuleId::LoopPrefersForForList | RuleId::LoopPrefersForeachForList => {
                CollectionKind::List
            }
        }
    }

    /// Rule that fires for a loop of `flagged` form over `collection`
    pub fn for_case(flagged: LoopForm, collection: CollectionKind) -> Option<Self> {
        RuleId::ALL
            .into_iter()
            .find(|rule| rule.flagged() == flagged && rule.collection() == collection)
    }

    /// Diagnostic message, e.g. `Prefer 'foreach' over 'for' for 'Array' iteration`
    pub fn message(&self) -> String {
        format!(
            "Prefer '{}' over '{}' for '{}' iteration",
            self.recommended(),
            self.flagged(),
            self.collection()
        )
    }
}

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RuleId {
    type Err = String;

    /// Accepts the kebab-case id or the short code, case-insensitively
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        RuleId::ALL
            .into_iter()
            .find(|rule| {
                rule.as_str().eq_ignore_ascii_case(wanted) || rule.code().eq_ignore_ascii_case(wanted)
            })
            .ok_or_else(|| format!("Unknown rule: {}", s))
    }
}

/// Rule category for grouping related rules
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RuleCategory {
    /// Rules that improve runtime performance
    #[default]
    Perf,
    /// Idiomatic and consistent style rules
    Style,
}

impl fmt::Display for RuleCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleCategory::Perf => write!(f, "perf"),
            RuleCategory::Style => write!(f, "style"),
        }
    }
}

impl std::str::FromStr for RuleCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "perf" | "performance" => Ok(RuleCategory::Perf),
            "style" => Ok(RuleCategory::Style),
            _ => Err(format!("Unknown category: {}", s)),
        }
    }
}

/// Documentation and defaults for one rule
#[derive(Debug, Clone, Serialize)]
pub struct Rule {
    pub id: RuleId,

    /// Human-readable name
    pub name: String,

    /// Detailed description
    pub description: String,

    /// Default severity level
    pub severity: Severity,

    pub category: RuleCategory,

    /// Rationale explaining why this rule exists
    pub rationale: Option<String>,

    /// Example of code that violates this rule
    pub example_bad: Option<String>,

    /// Example of correct code
    pub example_good: Option<String>,

    /// Related rule IDs
    pub related: Vec<RuleId>,
}

impl Rule {
    /// Create rule metadata with defaults derived from the id
    pub fn new(id: RuleId, name: &str, description: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            description: description.to_string(),
            severity: id.default_severity(),
            category: RuleCategory::default(),
            rationale: None,
            example_bad: None,
            example_good: None,
            related: Vec::new(),
        }
    }

    pub fn with_category(mut self, category: RuleCategory) -> Self {
        self.category = category;
        self
    }

    pub fn with_rationale(mut self, rationale: &str) -> Self {
        self.rationale = Some(rationale.to_string());
        self
    }

    pub fn with_example_bad(mut self, example: &str) -> Self {
        self.example_bad = Some(example.to_string());
        self
    }

    pub fn with_example_good(mut self, example: &str) -> Self {
        self.example_good = Some(example.to_string());
        self
    }

    pub fn with_related(mut self, rule: RuleId) -> Self {
        self.related.push(rule);
        self
    }

    pub fn code(&self) -> &'static str {
        self.id.code()
    }
}
