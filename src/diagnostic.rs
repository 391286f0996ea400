//! Diagnostic types for linting results

use crate::syntax::NodeId;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Severity level for diagnostics
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational suggestion
    Info,
    /// Likely suboptimal code
    #[default]
    Warning,
    /// Definite problem
    Error,
}

/// Fix safety classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FixSafety {
    /// Preserves behavior, can be applied automatically
    #[default]
    Safe,
    /// May change behavior, applied only on request
    Unsafe,
}

impl std::fmt::Display for FixSafety {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FixSafety::Safe => write!(f, "safe"),
            FixSafety::Unsafe => write!(f, "unsafe"),
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Info => write!(f, "info"),
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
        }
    }
}

impl std::str::FromStr for Severity {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "info" | "hint" | "note" => Ok(Severity::Info),
            "warning" | "warn" => Ok(Severity::Warning),
            "error" | "err" => Ok(Severity::Error),
            _ => Err(()),
        }
    }
}

/// Source code location
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Location {
    /// Tree file path
    pub file: PathBuf,
    /// Line number (1-based)
    pub line: usize,
    /// Column number (1-based)
    pub column: usize,
    /// Length of the highlighted region
    pub length: usize,
}

impl Location {
    pub fn new(file: PathBuf, line: usize, column: usize) -> Self {
        Self {
            file,
            line,
            column,
            length: 0,
        }
    }

    pub fn with_length(mut self, length: usize) -> Self {
        self.length = length;
        self
    }
}

/// A suggested loop replacement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fix {
    /// Description of the fix
    pub description: String,
    /// Rendered replacement loop
    pub replacement: String,
    /// Safety classification of this fix
    #[serde(default)]
    pub safety: FixSafety,
}

impl Fix {
    pub fn new(description: &str, replacement: &str, safety: FixSafety) -> Self {
        Self {
            description: description.to_string(),
            replacement: replacement.to_string(),
            safety,
        }
    }

    pub fn is_safe(&self) -> bool {
        self.safety == FixSafety::Safe
    }

    pub fn is_unsafe(&self) -> bool {
        self.safety == FixSafety::Unsafe
    }
}

/// A lint diagnostic
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Rule ID that triggered this diagnostic
    pub rule_id: String,
    /// Short rule code (e.g. `LOOP001`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    pub severity: Severity,
    pub message: String,
    pub location: Location,
    /// Flagged loop, absent for document-level diagnostics
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loop_id: Option<NodeId>,
    /// The source line (for display)
    pub source_line: Option<String>,
    /// Help text (usually rule description)
    pub help: Option<String>,
    pub fix: Option<Fix>,
    pub notes: Vec<String>,
}

impl Diagnostic {
    pub fn new(rule_id: &str, severity: Severity, message: &str, location: Location) -> Self {
        Self {
            rule_id: rule_id.to_string(),
            code: None,
            severity,
            message: message.to_string(),
            location,
            loop_id: None,
            source_line: None,
            help: None,
            fix: None,
            notes: Vec::new(),
        }
    }

    pub fn with_code(mut self, code: &str) -> Self {
        self.code = Some(code.to_string());
        self
    }

    pub fn with_loop(mut self, id: NodeId) -> Self {
        self.loop_id = Some(id);
        self
    }

    pub fn with_source_line(mut self, line: &str) -> Self {
        self.source_line = Some(line.to_string());
        self
    }

    pub fn with_help(mut self, help: &str) -> Self {
        self.help = Some(help.to_string());
        self
    }

    pub fn with_fix(mut self, fix: Fix) -> Self {
        self.fix = Some(fix);
        self
    }

    pub fn with_note(mut self, note: &str) -> Self {
        self.notes.push(note.to_string());
        self
    }

    pub fn has_fix(&self) -> bool {
        self.fix.is_some()
    }

    pub fn has_safe_fix(&self) -> bool {
        self.fix.as_ref().is_some_and(|f| f.is_safe())
    }

    pub fn has_unsafe_fix(&self) -> bool {
        self.fix.as_ref().is_some_and(|f| f.is_unsafe())
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }

    pub fn is_warning(&self) -> bool {
        self.severity == Severity::Warning
    }
}

/// Receiver of diagnostics produced by the engine
pub trait DiagnosticSink {
    fn report(&mut self, diagnostic: Diagnostic);
}

impl DiagnosticSink for Vec<Diagnostic> {
    fn report(&mut self, diagnostic: Diagnostic) {
        self.push(diagnostic);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Error > Severity::Warning);
        assert!(Severity::Warning > Severity::Info);
    }

    #[test]
    fn test_severity_from_str() {
        assert_eq!("error".parse::<Severity>(), Ok(Severity::Error));
        assert_eq!("Warning".parse::<Severity>(), Ok(Severity::Warning));
        assert_eq!("info".parse::<Severity>(), Ok(Severity::Info));
        assert_eq!("hint".parse::<Severity>(), Ok(Severity::Info));
        assert!("fatal".parse::<Severity>().is_err());
    }

    #[test]
    fn test_diagnostic_builder() {
        let loc = Location::new(PathBuf::from("sum.json"), 3, 9).with_length(3);
        let diag = Diagnostic::new(
            "loop-prefers-foreach-for-array",
            Severity::Warning,
            "Prefer 'foreach' over 'for' for 'Array' iteration",
            loc,
        )
        .with_code("LOOP001")
        .with_loop(NodeId(2))
        .with_source_line("        for (int i = 0; i < arr.Length; i++)")
        .with_fix(Fix::new(
            "Convert to 'foreach'",
            "foreach (var item in arr)",
            FixSafety::Safe,
        ))
        .with_note("see rule docs");

        assert!(diag.is_warning());
        assert!(!diag.is_error());
        assert!(diag.has_safe_fix());
        assert!(!diag.has_unsafe_fix());
        assert_eq!(diag.code.as_deref(), Some("LOOP001"));
        assert_eq!(diag.location.length, 3);
        assert_eq!(diag.notes.len(), 1);
    }

    #[test]
    fn test_vec_sink_collects() {
        let mut sink: Vec<Diagnostic> = Vec::new();
        sink.report(Diagnostic::new(
            "load-error",
            Severity::Error,
            "unreadable",
            Location::default(),
        ));
        assert_eq!(sink.len(), 1);
        assert!(sink[0].is_error());
    }

    #[test]
    fn test_serialize_skips_missing_code() {
        let diag = Diagnostic::new("load-error", Severity::Error, "x", Location::default());
        let json = serde_json::to_string(&diag).unwrap();
        assert!(!json.contains("\"code\""));
        assert!(!json.contains("\"loop_id\""));
    }
}
