//! Human-readable text output formatter

use super::OutputFormatter;
use crate::diagnostic::{Diagnostic, Severity};
use crate::engine::LintResult;
use colored::*;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Text formatter with optional color support
pub struct TextFormatter {
    /// Enable colored output
    pub colored: bool,

    /// Show source context
    pub show_source: bool,

    pub show_help: bool,

    /// Show fix suggestions
    pub show_fixes: bool,

    /// Show statistics
    pub show_stats: bool,
}

impl Default for TextFormatter {
    fn default() -> Self {
        Self {
            colored: true,
            show_source: true,
            show_help: true,
            show_fixes: true,
            show_stats: true,
        }
    }
}

impl TextFormatter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Disable colors
    pub fn without_color(mut self) -> Self {
        self.colored = false;
        self
    }

    pub fn without_stats(mut self) -> Self {
        self.show_stats = false;
        self
    }

    fn paint(&self, text: &str, style: fn(&str) -> ColoredString) -> String {
        if self.colored {
            style(text).to_string()
        } else {
            text.to_string()
        }
    }

    fn gutter(&self, marker: &str) -> String {
        self.paint(marker, |s| s.blue())
    }

    fn severity_str(&self, severity: Severity) -> String {
        let s = severity.to_string();
        match severity {
            Severity::Error => self.paint(&s, |s| s.red().bold()),
            Severity::Warning => self.paint(&s, |s| s.yellow().bold()),
            Severity::Info => self.paint(&s, |s| s.blue()),
        }
    }

    fn format_location(&self, diag: &Diagnostic) -> String {
        format!(
            "{}:{}:{}",
            diag.location.file.display(),
            diag.location.line,
            diag.location.column
        )
    }

    fn count_str(count: usize, singular: &str, plural: &str) -> String {
        format!("{} {}", count, if count == 1 { singular } else { plural })
    }
}

impl OutputFormatter for TextFormatter {
    fn format(&self, result: &LintResult) -> String {
        let mut output = String::new();

        let mut by_file: BTreeMap<PathBuf, Vec<&Diagnostic>> = BTreeMap::new();
        for diag in &result.diagnostics {
            by_file
                .entry(diag.location.file.clone())
                .or_default()
                .push(diag);
        }

        for (file, mut diagnostics) in by_file {
            diagnostics.sort_by_key(|d| (d.location.line, d.location.column));
            output.push_str(&self.paint(&file.display().to_string(), |s| s.underline()));
            output.push('\n');

            for diag in diagnostics {
                output.push_str(&self.format_diagnostic(diag));
                output.push('\n');
            }
        }

        if self.show_stats {
            output.push_str(&format!(
                "\n{} processed, {} analyzed",
                Self::count_str(result.files_processed, "file", "files"),
                Self::count_str(result.loops_analyzed, "loop", "loops")
            ));

            let mut counts = Vec::new();
            if result.error_count > 0 {
                let s = Self::count_str(result.error_count, "error", "errors");
                counts.push(self.paint(&s, |s| s.red()));
            }
            if result.warning_count > 0 {
                let s = Self::count_str(result.warning_count, "warning", "warnings");
                counts.push(self.paint(&s, |s| s.yellow()));
            }
            if result.info_count > 0 {
                let s = Self::count_str(result.info_count, "info", "infos");
                counts.push(self.paint(&s, |s| s.blue()));
            }

            if !counts.is_empty() {
                output.push_str(&format!(": {}", counts.join(", ")));
            }
            output.push('\n');

            output.push_str(&format!(
                "Finished in {:.2}s\n",
                result.duration.as_secs_f64()
            ));
        }

        output
    }

    fn format_diagnostic(&self, diag: &Diagnostic) -> String {
        let mut output = String::new();

        let rule = match &diag.code {
            Some(code) => format!("{}/{}", code, diag.rule_id),
            None => diag.rule_id.clone(),
        };
        output.push_str(&format!(
            "{}: {}[{}]: {}\n",
            self.format_location(diag),
            self.severity_str(diag.severity),
            self.paint(&rule, |s| s.cyan()),
            diag.message
        ));

        if self.show_source {
            if let Some(source) = &diag.source_line {
                let bar = self.gutter("|");
                output.push_str(&format!("     {}\n", bar));
                let line_num = format!("{:>4}", diag.location.line);
                output.push_str(&format!(
                    "{} {} {}\n",
                    self.gutter(&line_num),
                    bar,
                    source
                ));

                // Underline the loop keyword
                if diag.location.column > 0 {
                    let padding = " ".repeat(diag.location.column - 1);
                    let underline = "^".repeat(diag.location.length.max(1));
                    output.push_str(&format!(
                        "     {} {}{}\n",
                        bar,
                        padding,
                        self.paint(&underline, |s| s.red())
                    ));
                }
            }
        }

        if self.show_help {
            if let Some(help) = &diag.help {
                output.push_str(&format!("   {} help: {}\n", self.gutter("="), help));
            }
        }

        if self.show_fixes {
            if let Some(fix) = &diag.fix {
                output.push_str(&format!(
                    "   {} fix ({}): {}\n",
                    self.paint("=", |s| s.green()),
                    fix.safety,
                    fix.description
                ));
                for line in fix.replacement.lines() {
                    output.push_str(&format!("       {}\n", self.paint(line, |s| s.green())));
                }
            }
        }

        for note in &diag.notes {
            output.push_str(&format!("   {} note: {}\n", self.gutter("="), note));
        }

        output
    }
}
