//! Auto-fix system for rewriting flagged loops
//!
//! Fixes are whole-loop replacements produced by the rewriter and applied
//! through a [`TreeEditor`]. They are classified as safe or unsafe:
//! - Safe fixes (indexed `for` to `foreach`) preserve behavior
//! - Unsafe fixes (`foreach` to indexed `for`) stop observing modification
//!   of the collection during iteration and require explicit opt-in

use crate::diagnostic::{FixSafety, Location};
use crate::document::{Document, TreeDocument, TreeEditor};
use crate::engine::{Accepted, Engine};
use crate::rewrite::rewrite;
use crate::syntax::{LoopNode, NodeId};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Lines of context around a diff hunk
const DIFF_CONTEXT: usize = 3;

/// A rewrite waiting to be applied
#[derive(Debug, Clone)]
pub struct PendingFix {
    pub file: PathBuf,
    pub location: Location,
    pub loop_id: NodeId,
    /// Rule ID that generated this fix
    pub rule_id: String,
    pub description: String,
    pub replacement: LoopNode,
    pub safety: FixSafety,
}

/// Result of applying fixes
#[derive(Debug, Default)]
pub struct FixResult {
    /// Number of files modified
    pub files_modified: usize,
    /// Number of fixes applied
    pub fixes_applied: usize,
    pub safe_fixes_applied: usize,
    pub unsafe_fixes_applied: usize,
    /// Number of fixes that failed
    pub fixes_failed: usize,
    /// Number of fixes skipped (unsafe when not allowed)
    pub fixes_skipped: usize,
    /// Errors encountered
    pub errors: Vec<String>,
    /// Fixes applied, or listed in show-only mode
    pub fixes: Vec<PendingFix>,
    /// Rendered document before and after fixing
    pub renderings: HashMap<PathBuf, (String, String)>,
    /// Diff output (if diff mode enabled)
    pub diffs: HashMap<PathBuf, String>,
}

impl FixResult {
    pub fn merge(&mut self, other: FixResult) {
        self.files_modified += other.files_modified;
        self.fixes_applied += other.fixes_applied;
        self.safe_fixes_applied += other.safe_fixes_applied;
        self.unsafe_fixes_applied += other.unsafe_fixes_applied;
        self.fixes_failed += other.fixes_failed;
        self.fixes_skipped += other.fixes_skipped;
        self.errors.extend(other.errors);
        self.fixes.extend(other.fixes);
        self.renderings.extend(other.renderings);
        self.diffs.extend(other.diffs);
    }

    fn record(&mut self, fix: PendingFix) {
        match fix.safety {
            FixSafety::Safe => self.safe_fixes_applied += 1,
            FixSafety::Unsafe => self.unsafe_fixes_applied += 1,
        }
        self.fixes_applied += 1;
        self.fixes.push(fix);
    }
}

/// Fix mode options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FixMode {
    /// Apply only safe fixes (default)
    #[default]
    SafeOnly,
    /// Apply all fixes including unsafe
    All,
    /// Diff mode - show changes without writing
    Diff,
    /// Show fixes without applying
    ShowOnly,
}

/// Auto-fixer that rewrites loops through a tree editor
pub struct Fixer {
    /// Dry run mode (don't write changes)
    dry_run: bool,
    mode: FixMode,
    include_unsafe: bool,
    /// Fixes collected for the current document
    pending: Vec<PendingFix>,
}

impl Fixer {
    pub fn new(dry_run: bool) -> Self {
        Self {
            dry_run,
            mode: FixMode::SafeOnly,
            include_unsafe: false,
            pending: Vec::new(),
        }
    }

    pub fn with_mode(mut self, mode: FixMode) -> Self {
        self.mode = mode;
        self
    }

    /// Include unsafe fixes
    pub fn with_unsafe_fixes(mut self, include: bool) -> Self {
        self.include_unsafe = include;
        if include && self.mode == FixMode::SafeOnly {
            self.mode = FixMode::All;
        }
        self
    }

    pub fn with_diff_mode(mut self) -> Self {
        self.mode = FixMode::Diff;
        self
    }

    pub fn with_show_only(mut self) -> Self {
        self.mode = FixMode::ShowOnly;
        self
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    pub fn mode(&self) -> FixMode {
        self.mode
    }

    pub fn pending(&self) -> &[PendingFix] {
        &self.pending
    }

    /// Rewrite each accepted finding and queue the result.
    /// Returns the number of fixes queued.
    pub fn collect(&mut self, document: &dyn Document, findings: &[Accepted<'_>]) -> usize {
        let before = self.pending.len();
        for accepted in findings {
            let finding = &accepted.finding;
            match rewrite(accepted.node, finding) {
                Ok(result) => {
                    let span = finding.location;
                    self.pending.push(PendingFix {
                        file: document.path().to_path_buf(),
                        location: Location::new(
                            document.path().to_path_buf(),
                            span.line,
                            span.column,
                        )
                        .with_length(span.length()),
                        loop_id: result.replaces,
                        rule_id: finding.rule.as_str().to_string(),
                        description: format!("Convert to '{}'", result.form()),
                        safety: result.safety(),
                        replacement: result.node,
                    });
                }
                Err(e) => {
                    log::debug!(
                        "{}: loop {} not fixable: {}",
                        document.path().display(),
                        finding.loop_id,
                        e
                    );
                }
            }
        }
        self.pending.len() - before
    }

    fn should_apply_fix(&self, fix: &PendingFix) -> bool {
        match self.mode {
            FixMode::All => true,
            FixMode::SafeOnly => fix.safety == FixSafety::Safe,
            FixMode::Diff | FixMode::ShowOnly => {
                self.include_unsafe || fix.safety == FixSafety::Safe
            }
        }
    }

    /// Apply the queued fixes one at a time
    pub fn apply(&mut self, editor: &mut dyn TreeEditor) -> FixResult {
        let mut result = FixResult::default();

        for fix in std::mem::take(&mut self.pending) {
            if !self.should_apply_fix(&fix) {
                result.fixes_skipped += 1;
                continue;
            }

            if self.mode == FixMode::ShowOnly {
                result.record(fix);
                continue;
            }

            match editor.replace(fix.loop_id, fix.replacement.clone()) {
                Ok(()) => result.record(fix),
                Err(e) => {
                    result.fixes_failed += 1;
                    result.errors.push(format!("{}: {}", fix.file.display(), e));
                }
            }
        }

        result
    }

    /// Lint, rewrite and (unless dry-run or diff mode) save one document
    pub fn fix_document(&mut self, engine: &Engine, document: &mut TreeDocument) -> FixResult {
        {
            let findings = engine.findings(&*document, document.symbols());
            self.collect(&*document, &findings);
        }

        let path = document.path().to_path_buf();
        let before = document.render();
        let mut result = self.apply(document);

        if self.mode == FixMode::ShowOnly || result.fixes_applied == 0 {
            return result;
        }

        let after = document.render();
        if self.mode == FixMode::Diff {
            result
                .diffs
                .insert(path.clone(), generate_unified_diff(&path, &before, &after));
        } else if !self.dry_run {
            if let Err(e) = document.save() {
                result.errors.push(format!("{}: {}", path.display(), e));
                result.fixes_failed += result.fixes_applied;
                result.fixes_applied = 0;
                result.safe_fixes_applied = 0;
                result.unsafe_fixes_applied = 0;
                result.fixes.clear();
                return result;
            }
        }
        result.files_modified = 1;
        result.renderings.insert(path, (before, after));
        result
    }

    /// Fix every file in turn
    pub fn fix_files(&mut self, engine: &Engine, files: &[PathBuf]) -> FixResult {
        let mut result = FixResult::default();
        for file in files {
            match TreeDocument::load(file) {
                Ok(mut document) => result.merge(self.fix_document(engine, &mut document)),
                Err(e) => {
                    log::warn!("Skipping {}: {}", file.display(), e);
                    result.errors.push(format!("{}: {}", file.display(), e));
                }
            }
        }
        result
    }

    /// Format fixes for display (--show-fixes)
    pub fn format_fixes(result: &FixResult) -> String {
        if result.fixes.is_empty() {
            return "No fixes available.\n".to_string();
        }

        let mut fixes: Vec<&PendingFix> = result.fixes.iter().collect();
        fixes.sort_by(|a, b| {
            a.file
                .cmp(&b.file)
                .then(a.location.line.cmp(&b.location.line))
        });

        let mut output = format!("Found {} fix(es):\n\n", fixes.len());
        let mut current_file: Option<&PathBuf> = None;
        for fix in fixes {
            if current_file != Some(&fix.file) {
                current_file = Some(&fix.file);
                output.push_str(&format!("{}:\n", fix.file.display()));
            }

            let safety_marker = match fix.safety {
                FixSafety::Safe => "[safe]",
                FixSafety::Unsafe => "[unsafe]",
            };

            output.push_str(&format!(
                "  Line {}: {} {} - {}\n",
                fix.location.line, safety_marker, fix.rule_id, fix.description
            ));
            for line in fix.replacement.to_string().lines() {
                output.push_str(&format!("      {}\n", line));
            }
        }

        output
    }

    /// Format diff output for display
    pub fn format_diffs(result: &FixResult) -> String {
        let mut files: Vec<&PathBuf> = result.diffs.keys().collect();
        files.sort();

        let mut output = String::new();
        for file in files {
            output.push_str(&format!(
                "diff --loopwise a/{} b/{}\n",
                file.display(),
                file.display()
            ));
            output.push_str(&result.diffs[file]);
            output.push('\n');
        }
        output
    }
}

/// Unified diff with a single hunk spanning the changed lines
fn generate_unified_diff(file: &Path, original: &str, modified: &str) -> String {
    let old: Vec<&str> = original.lines().collect();
    let new: Vec<&str> = modified.lines().collect();
    if old == new {
        return String::new();
    }

    let prefix = old.iter().zip(&new).take_while(|(a, b)| a == b).count();
    let suffix = old[prefix..]
        .iter()
        .rev()
        .zip(new[prefix..].iter().rev())
        .take_while(|(a, b)| a == b)
        .count();

    let start = prefix.saturating_sub(DIFF_CONTEXT);
    let old_changed_end = old.len() - suffix;
    let new_changed_end = new.len() - suffix;
    let trailing = suffix.min(DIFF_CONTEXT);
    let old_end = old_changed_end + trailing;
    let new_end = new_changed_end + trailing;

    let mut diff = format!("--- a/{}\n+++ b/{}\n", file.display(), file.display());
    diff.push_str(&format!(
        "@@ -{},{} +{},{} @@\n",
        start + 1,
        old_end - start,
        start + 1,
        new_end - start
    ));
    for line in &old[start..prefix] {
        diff.push_str(&format!(" {}\n", line));
    }
    for line in &old[prefix..old_changed_end] {
        diff.push_str(&format!("-{}\n", line));
    }
    for line in &new[prefix..new_changed_end] {
        diff.push_str(&format!("+{}\n", line));
    }
    for line in &old[old_changed_end..old_end] {
        diff.push_str(&format!(" {}\n", line));
    }
    diff
}
