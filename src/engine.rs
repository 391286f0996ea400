//! Core lint engine

use crate::classify::{classify, Finding};
use crate::config::Config;
use crate::diagnostic::{Diagnostic, DiagnosticSink, Fix, Location, Severity};
use crate::document::{Document, TreeDocument};
use crate::registry::{builtin_rules, RuleEntry};
use crate::resolver::TypeResolver;
use crate::rewrite::rewrite;
use crate::syntax::LoopNode;
use rayon::prelude::*;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Rule id used for documents that fail to load
pub const LOAD_ERROR: &str = "load-error";

/// Per-rule timing statistics
#[derive(Debug, Clone, Default)]
pub struct RuleTiming {
    pub rule_id: String,
    /// Share of classification time for the loops this rule could flag
    pub total_time: Duration,
    /// Number of loops the rule was evaluated on
    pub evaluation_count: usize,
    /// Number of findings produced
    pub match_count: usize,
}

impl RuleTiming {
    pub fn new(rule_id: &str) -> Self {
        Self {
            rule_id: rule_id.to_string(),
            ..Default::default()
        }
    }

    /// Average time per evaluation
    pub fn avg_time(&self) -> Duration {
        if self.evaluation_count > 0 {
            self.total_time / self.evaluation_count as u32
        } else {
            Duration::ZERO
        }
    }
}

/// Result of linting operation
#[derive(Debug, Default)]
pub struct LintResult {
    /// All diagnostics
    pub diagnostics: Vec<Diagnostic>,

    pub files_processed: usize,

    pub files_with_errors: usize,

    pub files_with_warnings: usize,

    pub loops_analyzed: usize,

    pub error_count: usize,

    pub warning_count: usize,

    pub info_count: usize,

    /// Processing duration
    pub duration: Duration,

    /// Per-rule timing statistics (rule_id -> timing)
    pub rule_timings: HashMap<String, RuleTiming>,
}

impl LintResult {
    pub fn has_errors(&self) -> bool {
        self.error_count > 0
    }

    pub fn has_warnings(&self) -> bool {
        self.warning_count > 0
    }

    /// Check if result is clean (no errors or warnings)
    pub fn is_clean(&self) -> bool {
        self.error_count == 0 && self.warning_count == 0
    }

    /// Get exit code (0 = success, 1 = warnings, 2 = errors)
    pub fn exit_code(&self) -> i32 {
        if self.error_count > 0 {
            2
        } else if self.warning_count > 0 {
            1
        } else {
            0
        }
    }

    fn count(&mut self, severity: Severity) {
        match severity {
            Severity::Error => self.error_count += 1,
            Severity::Warning => self.warning_count += 1,
            Severity::Info => self.info_count += 1,
        }
    }

    /// Merge another result into this one
    pub fn merge(&mut self, other: LintResult) {
        self.diagnostics.extend(other.diagnostics);
        self.files_processed += other.files_processed;
        self.files_with_errors += other.files_with_errors;
        self.files_with_warnings += other.files_with_warnings;
        self.loops_analyzed += other.loops_analyzed;
        self.error_count += other.error_count;
        self.warning_count += other.warning_count;
        self.info_count += other.info_count;

        for (rule_id, timing) in other.rule_timings {
            let entry = self
                .rule_timings
                .entry(rule_id)
                .or_insert_with(|| RuleTiming::new(&timing.rule_id));
            entry.total_time += timing.total_time;
            entry.evaluation_count += timing.evaluation_count;
            entry.match_count += timing.match_count;
        }
    }

    /// Get rule timings sorted by total time (descending)
    pub fn sorted_timings(&self) -> Vec<&RuleTiming> {
        let mut timings: Vec<_> = self.rule_timings.values().collect();
        timings.sort_by(|a, b| b.total_time.cmp(&a.total_time));
        timings
    }

    /// Format timing statistics as a string
    pub fn format_timings(&self) -> String {
        let timings = self.sorted_timings();
        if timings.is_empty() {
            return "No timing data available".to_string();
        }

        let mut output = String::new();
        output.push_str("Rule Timing Statistics:\n");
        output.push_str(&format!(
            "{:<34} {:>12} {:>12} {:>10} {:>10}\n",
            "Rule ID", "Total", "Avg", "Evals", "Matches"
        ));
        output.push_str(&"-".repeat(82));
        output.push('\n');

        for timing in timings {
            let total_ms = timing.total_time.as_secs_f64() * 1000.0;
            let avg_us = timing.avg_time().as_secs_f64() * 1_000_000.0;

            output.push_str(&format!(
                "{:<34} {:>10.2}ms {:>10.2}µs {:>10} {:>10}\n",
                timing.rule_id, total_ms, avg_us, timing.evaluation_count, timing.match_count
            ));
        }

        output
    }
}

/// A finding accepted by configuration and inline suppressions
#[derive(Debug, Clone, Copy)]
pub struct Accepted<'d> {
    pub finding: Finding,
    pub node: &'d LoopNode,
    pub entry: &'static RuleEntry,
}

/// The main lint engine
pub struct Engine {
    config: Config,
}

impl Engine {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Rules enabled by configuration
    pub fn enabled_rules(&self) -> Vec<&'static RuleEntry> {
        builtin_rules()
            .iter()
            .filter(|entry| {
                self.config
                    .is_rule_enabled(entry.id(), entry.rule.category)
            })
            .collect()
    }

    /// Lint multiple tree files
    pub fn lint_files(&self, files: &[PathBuf]) -> LintResult {
        let start = Instant::now();

        let results: Vec<LintResult> = if self.config.engine.parallel && files.len() > 1 {
            let jobs = if self.config.engine.jobs > 0 {
                self.config.engine.jobs
            } else {
                num_cpus::get()
            };
            match rayon::ThreadPoolBuilder::new().num_threads(jobs).build() {
                Ok(pool) => pool.install(|| files.par_iter().map(|f| self.lint_file(f)).collect()),
                Err(e) => {
                    log::warn!("Falling back to sequential linting: {}", e);
                    files.iter().map(|f| self.lint_file(f)).collect()
                }
            }
        } else {
            files.iter().map(|f| self.lint_file(f)).collect()
        };

        let mut combined = LintResult::default();
        for result in results {
            combined.merge(result);
        }

        combined.duration = start.elapsed();
        combined
    }

    /// Lint a single tree file
    pub fn lint_file(&self, path: &Path) -> LintResult {
        match TreeDocument::load(path) {
            Ok(document) => self.lint_document(&document, document.symbols()),
            Err(e) => {
                log::warn!("Skipping {}: {}", path.display(), e);
                let mut result = LintResult {
                    files_processed: 1,
                    files_with_errors: 1,
                    ..LintResult::default()
                };
                result.count(Severity::Error);
                result.diagnostics.push(Diagnostic::new(
                    LOAD_ERROR,
                    Severity::Error,
                    &format!("Failed to load tree file: {}", e),
                    Location::new(path.to_path_buf(), 0, 0),
                ));
                result
            }
        }
    }

    /// Lint a document, collecting diagnostics into the result
    pub fn lint_document(&self, document: &dyn Document, resolver: &dyn TypeResolver) -> LintResult {
        let mut diagnostics = Vec::new();
        let mut result = self.lint_document_into(document, resolver, &mut diagnostics);
        result.diagnostics = diagnostics;
        result
    }

    /// Lint a document, forwarding each diagnostic to `sink`
    pub fn lint_document_into(
        &self,
        document: &dyn Document,
        resolver: &dyn TypeResolver,
        sink: &mut dyn DiagnosticSink,
    ) -> LintResult {
        let mut result = LintResult {
            files_processed: 1,
            ..LintResult::default()
        };

        let (accepted, timings) = self.evaluate(document, resolver);
        result.loops_analyzed = document.loops().count();
        result.rule_timings = timings;

        for item in accepted {
            result.count(item.finding.severity);
            sink.report(self.to_diagnostic(document, &item));
        }

        if result.error_count > 0 {
            result.files_with_errors = 1;
        }
        if result.warning_count > 0 {
            result.files_with_warnings = 1;
        }
        result
    }

    /// Findings that survive configuration and inline suppressions
    pub fn findings<'d>(
        &self,
        document: &'d dyn Document,
        resolver: &dyn TypeResolver,
    ) -> Vec<Accepted<'d>> {
        self.evaluate(document, resolver).0
    }

    fn evaluate<'d>(
        &self,
        document: &'d dyn Document,
        resolver: &dyn TypeResolver,
    ) -> (Vec<Accepted<'d>>, HashMap<String, RuleTiming>) {
        let mut accepted = Vec::new();
        let mut timings: HashMap<String, RuleTiming> = HashMap::new();

        let rules: Vec<&'static RuleEntry> = self
            .enabled_rules()
            .into_iter()
            .filter(|entry| {
                let id = entry.id();
                !self.config.should_ignore_rule_for_file(id, document.path())
                    && !document.is_rule_disabled_for_file(id.as_str())
            })
            .collect();

        for node in document.loops() {
            let line = node.keyword.line;
            let candidates: Vec<&'static RuleEntry> = rules
                .iter()
                .copied()
                .filter(|entry| entry.id().flagged() == node.form())
                .filter(|entry| {
                    let id = entry.id();
                    let suppressed = line > 0 && document.is_rule_disabled(id.as_str(), line);
                    if suppressed {
                        log::trace!("{}: {} suppressed on line {}", document.path().display(), id, line);
                    }
                    !suppressed
                })
                .collect();
            if candidates.is_empty() {
                continue;
            }

            // one classification per loop, shared by the rules that could fire on it
            let start = Instant::now();
            let finding = classify(node, resolver);
            let share = start.elapsed() / candidates.len() as u32;

            for &entry in &candidates {
                let timing = timings
                    .entry(entry.id().as_str().to_string())
                    .or_insert_with(|| RuleTiming::new(entry.id().as_str()));
                timing.total_time += share;
                timing.evaluation_count += 1;
            }

            let Some(mut finding) = finding else {
                continue;
            };
            let Some(&entry) = candidates.iter().find(|entry| entry.id() == finding.rule) else {
                continue;
            };
            if let Some(timing) = timings.get_mut(entry.id().as_str()) {
                timing.match_count += 1;
            }
            if let Some(severity) = self.config.get_severity_override(entry.id()) {
                finding.severity = severity;
            }
            accepted.push(Accepted {
                finding,
                node,
                entry,
            });
        }

        (accepted, timings)
    }

    fn to_diagnostic(&self, document: &dyn Document, item: &Accepted<'_>) -> Diagnostic {
        let finding = &item.finding;
        let span = finding.location;
        let length = if span.length() > 0 {
            span.length()
        } else {
            finding.recommended.opposite().keyword().len()
        };
        let location =
            Location::new(document.path().to_path_buf(), span.line, span.column).with_length(length);

        let mut diag = Diagnostic::new(
            finding.rule.as_str(),
            finding.severity,
            &finding.message(),
            location,
        )
        .with_code(finding.rule.code())
        .with_loop(finding.loop_id)
        .with_help(&item.entry.rule.description);

        if let Some(line) = document.get_source_line(span.line) {
            diag = diag.with_source_line(line);
        }

        match rewrite(item.node, finding) {
            Ok(result) => {
                let description = format!("Convert to '{}'", result.form());
                diag = diag.with_fix(Fix::new(
                    &description,
                    &result.node.to_string(),
                    result.safety(),
                ));
            }
            Err(e) => {
                log::debug!("loop {}: no fix offered: {}", finding.loop_id, e);
                diag = diag.with_note(&format!("No automatic fix: {}", e));
            }
        }

        diag
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostic::FixSafety;
    use crate::document::{TreeFile, TreeFormat};
    use crate::resolver::SymbolTable;
    use crate::rule::RuleId;
    use crate::syntax::{AssignOp, BinaryOp, Expr, Span, Stmt};
    use pretty_assertions::assert_eq;

    const SOURCE: &str = "\
int sum = 0;
for (int i = 0; i < arr.Length; i++) { sum += arr[i]; }
for (int i = 0; i < list.Count; i++) { list[i] = list[i] * 2; }
foreach (var x in list) { sum += x; }
";

    fn at(name: &str) -> Expr {
        Expr::element(Expr::ident(name), Expr::ident("i"))
    }

    fn keyword(line: usize, len: usize) -> Span {
        Span::new(0, len, line, 1)
    }

    fn sample_tree(source: &str) -> TreeFile {
        let sum_array = LoopNode::indexed_for(
            Some("int"),
            "i",
            Expr::member(Expr::ident("arr"), "Length"),
            Stmt::block(vec![Stmt::expr(Expr::assign(
                AssignOp::AddAssign,
                Expr::ident("sum"),
                at("arr"),
            ))]),
        )
        .with_span(Span::default(), keyword(2, 3));

        let double_list = LoopNode::indexed_for(
            Some("int"),
            "i",
            Expr::member(Expr::ident("list"), "Count"),
            Stmt::block(vec![Stmt::expr(Expr::assign(
                AssignOp::Assign,
                at("list"),
                Expr::binary(BinaryOp::Mul, at("list"), Expr::literal("2")),
            ))]),
        )
        .with_span(Span::default(), keyword(3, 3));

        let sum_list = LoopNode::foreach(
            Some("var"),
            "x",
            Expr::ident("list"),
            Stmt::block(vec![Stmt::expr(Expr::assign(
                AssignOp::AddAssign,
                Expr::ident("sum"),
                Expr::ident("x"),
            ))]),
        )
        .with_span(Span::default(), keyword(4, 7));

        TreeFile {
            symbols: SymbolTable::new()
                .with_symbol("arr", "int[]")
                .with_symbol("list", "List<int>"),
            source: Some(source.to_string()),
            statements: vec![
                Stmt::Local {
                    ty: Some("int".to_string()),
                    name: "sum".to_string(),
                    init: Some(Expr::literal("0")),
                },
                Stmt::Loop(Box::new(sum_array)),
                Stmt::Loop(Box::new(double_list)),
                Stmt::Loop(Box::new(sum_list)),
            ],
        }
    }

    fn sample_document(source: &str) -> TreeDocument {
        TreeDocument::from_tree(sample_tree(source), TreeFormat::Json, Path::new("sample.json"))
    }

    #[test]
    fn test_lint_result_exit_code() {
        let mut result = LintResult::default();
        assert_eq!(result.exit_code(), 0);

        result.info_count = 3;
        assert_eq!(result.exit_code(), 0);

        result.warning_count = 1;
        assert_eq!(result.exit_code(), 1);

        result.error_count = 1;
        assert_eq!(result.exit_code(), 2);
    }

    #[test]
    fn test_lint_result_merge() {
        let mut result1 = LintResult {
            files_processed: 1,
            error_count: 2,
            ..LintResult::default()
        };
        let mut result2 = LintResult {
            files_processed: 1,
            warning_count: 3,
            ..LintResult::default()
        };
        result2
            .rule_timings
            .insert("r".to_string(), RuleTiming::new("r"));
        result1.rule_timings.insert("r".to_string(), RuleTiming::new("r"));

        result1.merge(result2);
        assert_eq!(result1.files_processed, 2);
        assert_eq!(result1.error_count, 2);
        assert_eq!(result1.warning_count, 3);
        assert_eq!(result1.rule_timings.len(), 1);
    }

    #[test]
    fn test_lint_document_worked_examples() {
        let doc = sample_document(SOURCE);
        let result = Engine::new(Config::default()).lint_document(&doc, doc.symbols());

        let found: Vec<(String, Severity, usize)> = result
            .diagnostics
            .iter()
            .map(|d| (d.rule_id.clone(), d.severity, d.location.line))
            .collect();
        assert_eq!(
            found,
            vec![
                ("loop-prefers-foreach-for-array".to_string(), Severity::Warning, 2),
                ("loop-prefers-for-for-list".to_string(), Severity::Info, 4),
            ]
        );
        assert_eq!(result.warning_count, 1);
        assert_eq!(result.info_count, 1);
        assert_eq!(result.loops_analyzed, 3);
        assert_eq!(result.exit_code(), 1);

        let array = &result.diagnostics[0];
        assert_eq!(array.code.as_deref(), Some("LOOP001"));
        assert_eq!(array.location.length, 3);
        assert_eq!(
            array.source_line.as_deref(),
            Some("for (int i = 0; i < arr.Length; i++) { sum += arr[i]; }")
        );
        let fix = array.fix.as_ref().unwrap();
        assert_eq!(fix.safety, FixSafety::Safe);
        assert_eq!(fix.replacement, "foreach (var item in arr) {\n    sum += item;\n}");

        let list = &result.diagnostics[1];
        assert!(list.has_unsafe_fix());
        assert_eq!(
            list.fix.as_ref().unwrap().replacement,
            "for (int i = 0; i < list.Count; i++) {\n    sum += list[i];\n}"
        );
    }

    #[test]
    fn test_each_loop_is_timed_once_per_candidate_rule() {
        let doc = sample_document(SOURCE);
        let result = Engine::new(Config::default()).lint_document(&doc, doc.symbols());

        let counts = |id: RuleId| {
            let timing = &result.rule_timings[id.as_str()];
            (timing.evaluation_count, timing.match_count)
        };
        assert_eq!(counts(RuleId::LoopPrefersForeachForArray), (2, 1));
        assert_eq!(counts(RuleId::LoopPrefersForeachForList), (2, 0));
        assert_eq!(counts(RuleId::LoopPrefersForForList), (1, 1));
        assert_eq!(counts(RuleId::LoopPrefersForForArray), (1, 0));
    }

    #[test]
    fn test_config_disables_and_overrides() {
        let doc = sample_document(SOURCE);
        let mut config = Config::default();
        config.rules.disabled.push("LOOP001".to_string());
        config
            .rules
            .severity
            .insert("loop-prefers-for-for-list".to_string(), Severity::Error);

        let result = Engine::new(config).lint_document(&doc, doc.symbols());
        assert_eq!(result.diagnostics.len(), 1);
        assert_eq!(result.diagnostics[0].severity, Severity::Error);
        assert_eq!(result.exit_code(), 2);
        assert!(!result.rule_timings.contains_key("loop-prefers-foreach-for-array"));
    }

    #[test]
    fn test_inline_suppression() {
        let source = SOURCE.replace(
            "foreach (var x in list) { sum += x; }",
            "foreach (var x in list) { sum += x; } // loopwise-disable LOOP002",
        );
        let doc = sample_document(&source);
        let result = Engine::new(Config::default()).lint_document(&doc, doc.symbols());
        let ids: Vec<&str> = result.diagnostics.iter().map(|d| d.rule_id.as_str()).collect();
        assert_eq!(ids, vec!["loop-prefers-foreach-for-array"]);

        let file_wide = format!("// loopwise-disable-file all\n{}", SOURCE);
        let doc = sample_document(&file_wide);
        let result = Engine::new(Config::default()).lint_document(&doc, doc.symbols());
        assert!(result.diagnostics.is_empty());
    }

    #[test]
    fn test_per_file_ignore() {
        let doc = sample_document(SOURCE);
        let mut config = Config::default();
        config
            .rules
            .per_file
            .insert("sample.*".to_string(), vec!["LOOP002".to_string()]);

        let result = Engine::new(config).lint_document(&doc, doc.symbols());
        assert_eq!(result.diagnostics.len(), 1);
        assert_eq!(result.diagnostics[0].rule_id, "loop-prefers-foreach-for-array");
    }

    #[test]
    fn test_refused_rewrite_becomes_note() {
        let node = LoopNode::foreach(
            None,
            "x",
            Expr::ident("arr"),
            Stmt::block(vec![Stmt::expr(Expr::assign(
                AssignOp::Assign,
                Expr::ident("x"),
                Expr::literal("0"),
            ))]),
        );
        let tree = TreeFile {
            symbols: SymbolTable::new().with_symbol("arr", "int[]"),
            source: None,
            statements: vec![Stmt::Loop(Box::new(node))],
        };
        let doc = TreeDocument::from_tree(tree, TreeFormat::Json, Path::new("n.json"));

        let result = Engine::new(Config::default()).lint_document(&doc, doc.symbols());
        let diag = &result.diagnostics[0];
        assert_eq!(diag.rule_id, RuleId::LoopPrefersForForArray.as_str());
        assert!(!diag.has_fix());
        assert_eq!(
            diag.notes,
            vec!["No automatic fix: element variable 'x' is assigned in the loop body".to_string()]
        );
        assert_eq!(diag.location.line, 0);
        assert_eq!(diag.location.length, "foreach".len());
    }

    #[test]
    fn test_lint_files_reports_load_errors_and_continues() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.json");
        std::fs::write(&good, serde_json::to_string(&sample_tree(SOURCE)).unwrap()).unwrap();
        let broken = dir.path().join("broken.json");
        std::fs::write(&broken, "{ not json").unwrap();
        let missing = dir.path().join("missing.yaml");

        let engine = Engine::new(Config::default());
        let result = engine.lint_files(&[good, broken, missing]);

        assert_eq!(result.files_processed, 3);
        assert_eq!(result.files_with_errors, 2);
        assert_eq!(result.error_count, 2);
        assert_eq!(result.warning_count, 1);
        let load_errors = result
            .diagnostics
            .iter()
            .filter(|d| d.rule_id == LOAD_ERROR)
            .count();
        assert_eq!(load_errors, 2);
        assert_eq!(result.loops_analyzed, 3);
    }

    #[test]
    fn test_sink_receives_diagnostics() {
        struct Counter(usize);
        impl DiagnosticSink for Counter {
            fn report(&mut self, _diagnostic: Diagnostic) {
                self.0 += 1;
            }
        }

        let doc = sample_document(SOURCE);
        let mut sink = Counter(0);
        let result =
            Engine::new(Config::default()).lint_document_into(&doc, doc.symbols(), &mut sink);
        assert_eq!(sink.0, 2);
        assert!(result.diagnostics.is_empty());
        assert!(result.format_timings().contains("loop-prefers-for-for-list"));
    }
}
