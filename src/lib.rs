//! loopwise - loop-form advisory linter
//!
//! Recommends one of two loop forms for iterating a sized collection:
//! an indexed `for` bounded by the collection's size, or an element-wise
//! `foreach`. Arrays favor `foreach`; lists favor indexed `for` unless the
//! loop writes elements back through the index, in which case `foreach`
//! cannot express it. A companion rewriter converts a flagged loop into the
//! recommended form.
//!
//! # Architecture
//!
//! ```text
//! CLI/API -> Engine -> Document (loops) -> registry -> classify -> Diagnostic
//!                                                   \-> rewrite -> Fixer -> TreeEditor
//! ```
//!
//! Loops are read from tree files (JSON or YAML) that carry the syntax tree,
//! declared collection types and optionally the original source text used
//! for display and inline suppressions:
//!
//! ```yaml
//! symbols:
//!   arr: int[]
//! source: |
//!   foreach (var x in arr) { sum += x; } // loopwise-disable LOOP003
//! statements:
//!   - node: loop
//!     kind:
//!       form: element_foreach
//!       element: x
//!       source: { node: identifier, name: arr }
//!     body: { node: block, statements: [] }
//! ```

pub mod classify;
pub mod config;
pub mod diagnostic;
pub mod document;
pub mod engine;
pub mod fixer;
pub mod output;
pub mod registry;
pub mod resolver;
pub mod rewrite;
pub mod rule;
pub mod syntax;

// Re-export main types
pub use classify::{classify, Finding};
pub use config::Config;
pub use diagnostic::{Diagnostic, DiagnosticSink, Fix, FixSafety, Location, Severity};
pub use document::{Document, TreeDocument, TreeEditor};
pub use engine::{Engine, LintResult, RuleTiming};
pub use fixer::{FixMode, FixResult, Fixer, PendingFix};
pub use output::{JsonFormatter, OutputFormatter, TextFormatter};
pub use registry::{builtin_rules, RuleEntry};
pub use resolver::{CollectionKind, Symbol, SymbolTable, TypeResolver};
pub use rewrite::{rewrite, RewriteError, RewriteResult};
pub use rule::{Rule, RuleCategory, RuleId};
pub use syntax::{Expr, LoopForm, LoopKind, LoopNode, NodeId, Span, Stmt};
