//! loopwise CLI - loop-form linter for collection iteration
//!
//! Lints loop trees (JSON/YAML) and recommends `foreach` or indexed `for`
//! loops per collection type, with auto-fix support.

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use colored::Colorize;
use globset::{Glob, GlobSet, GlobSetBuilder};
use loopwise::config::{ColorMode, Config, FilesConfig, OutputFormat};
use loopwise::engine::{Engine, LintResult};
use loopwise::fixer::{FixResult, Fixer};
use loopwise::output::{JsonFormatter, OutputFormatter, TextFormatter};
use loopwise::registry::{builtin_rules, find_rule};
use loopwise::{Rule, Severity};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(
    name = "loopwise",
    version,
    about = "Loop-form linter",
    long_about = "Recommends 'foreach' or indexed 'for' loops depending on whether an Array or a List is iterated, and rewrites loops between the two forms."
)]
struct Cli {
    /// Tree files, directories or glob patterns to lint
    files: Vec<String>,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum)]
    format: Option<Format>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,

    /// Number of parallel jobs (0 = auto)
    #[arg(short, long)]
    jobs: Option<usize>,

    /// Disable specific rules (comma-separated ids or codes)
    #[arg(long, value_delimiter = ',')]
    disable: Option<Vec<String>>,

    /// Only enable specific rules (comma-separated ids or codes)
    #[arg(long, value_delimiter = ',')]
    select: Option<Vec<String>>,

    /// Minimum severity to report
    #[arg(long, value_enum)]
    min_severity: Option<MinSeverity>,

    /// List available rules and exit
    #[arg(long)]
    list_rules: bool,

    /// Show detailed information about a specific rule
    #[arg(long)]
    explain: Option<String>,

    /// Auto-fix issues where possible (dry-run by default, use with --write to apply)
    #[arg(long)]
    fix: bool,

    /// Write fixes to files (requires --fix)
    #[arg(long, requires = "fix")]
    write: bool,

    /// Show diff of changes instead of applying fixes
    #[arg(long)]
    diff: bool,

    /// Show all fixes that would be applied
    #[arg(long)]
    show_fixes: bool,

    /// Include unsafe fixes ('foreach' to indexed 'for')
    #[arg(long)]
    unsafe_fixes: bool,

    /// Exit with 0 even if issues are found
    #[arg(long)]
    exit_zero: bool,

    /// Show per-rule timing statistics
    #[arg(long)]
    stats: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Text,
    Json,
}

#[derive(Clone, Copy, ValueEnum)]
enum MinSeverity {
    Info,
    Warning,
    Error,
}

impl From<MinSeverity> for Severity {
    fn from(value: MinSeverity) -> Self {
        match value {
            MinSeverity::Info => Severity::Info,
            MinSeverity::Warning => Severity::Warning,
            MinSeverity::Error => Severity::Error,
        }
    }
}

fn severity_label(severity: Severity) -> colored::ColoredString {
    match severity {
        Severity::Error => "error".red(),
        Severity::Warning => "warning".yellow(),
        Severity::Info => "info".blue(),
    }
}

fn print_rule(rule: &Rule) {
    println!(
        "    {} {} [{}] ({})",
        rule.code().bold(),
        rule.id.as_str().cyan(),
        severity_label(rule.severity),
        rule.category
    );
    println!("      {}", rule.description);
}

/// Print detailed rule explanation
fn explain_rule(rule: &Rule) {
    println!("{}", "Rule Details".bold());
    println!();
    println!("  {}: {}", "ID".bold(), rule.id.as_str().cyan());
    println!("  {}: {}", "Code".bold(), rule.code());
    println!("  {}: {}", "Name".bold(), rule.name);
    println!("  {}: {}", "Severity".bold(), severity_label(rule.severity));
    println!("  {}: {}", "Category".bold(), rule.category);

    println!();
    println!("  {}", "Description".bold());
    println!("  {}", rule.description);

    if let Some(rationale) = &rule.rationale {
        println!();
        println!("  {}", "Rationale".bold());
        println!("  {}", rationale);
    }

    if let Some(bad) = &rule.example_bad {
        println!();
        println!("  {} {}", "Example".bold(), "(flagged)".red());
        for line in bad.lines() {
            println!("    {}", line);
        }
    }

    if let Some(good) = &rule.example_good {
        println!();
        println!("  {} {}", "Example".bold(), "(preferred)".green());
        for line in good.lines() {
            println!("    {}", line);
        }
    }

    println!();
    println!("  {}", "Auto-fix Available".bold());
    let safety = if rule.id.recommended() == loopwise::LoopForm::ElementForeach {
        "safe"
    } else {
        "unsafe, requires --unsafe-fixes"
    };
    println!("  Rewrites the loop as '{}' ({})", rule.id.recommended(), safety);

    if !rule.related.is_empty() {
        let related: Vec<&str> = rule.related.iter().map(|r| r.as_str()).collect();
        println!();
        println!("  {}: {}", "Related Rules".bold(), related.join(", "));
    }
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern).with_context(|| format!("Invalid pattern '{}'", pattern))?);
    }
    Ok(builder.build()?)
}

fn push_unique(found: &mut Vec<PathBuf>, path: PathBuf) {
    if !found.contains(&path) {
        found.push(path);
    }
}

/// Expand CLI inputs into tree files
fn discover_files(inputs: &[String], files: &FilesConfig) -> Result<Vec<PathBuf>> {
    let include = build_globset(&files.include)?;
    let exclude = build_globset(&files.exclude)?;
    let mut found: Vec<PathBuf> = Vec::new();

    for input in inputs {
        let path = Path::new(input);
        if path.is_dir() {
            let pattern = path.join("**").join("*");
            let pattern = pattern.to_string_lossy();
            for entry in glob::glob(&pattern)
                .with_context(|| format!("Invalid directory '{}'", input))?
                .flatten()
            {
                if entry.is_file() && include.is_match(&entry) && !exclude.is_match(&entry) {
                    push_unique(&mut found, entry);
                }
            }
        } else if path.is_file() {
            push_unique(&mut found, path.to_path_buf());
        } else {
            let paths =
                glob::glob(input).with_context(|| format!("Invalid pattern '{}'", input))?;
            for entry in paths.flatten() {
                if entry.is_file() && !exclude.is_match(&entry) {
                    push_unique(&mut found, entry);
                }
            }
        }
    }

    Ok(found)
}

fn retain_min_severity(result: &mut LintResult, min: Severity) {
    result.diagnostics.retain(|d| d.severity >= min);

    // Recalculate counts
    let count = |severity: Severity| {
        result
            .diagnostics
            .iter()
            .filter(|d| d.severity == severity)
            .count()
    };
    let (errors, warnings, infos) = (
        count(Severity::Error),
        count(Severity::Warning),
        count(Severity::Info),
    );
    result.error_count = errors;
    result.warning_count = warnings;
    result.info_count = infos;
}

fn report_fixes(cli: &Cli, fix_result: &FixResult, dry_run: bool) {
    if cli.show_fixes {
        println!("{}", Fixer::format_fixes(fix_result));
    } else if cli.diff {
        println!("{}", Fixer::format_diffs(fix_result));
    } else if dry_run {
        eprintln!(
            "{}: {} fixes available ({} safe, {} unsafe)",
            "dry-run".cyan(),
            fix_result.fixes_applied,
            fix_result.safe_fixes_applied,
            fix_result.unsafe_fixes_applied
        );
        eprintln!("Use --write to apply fixes");
    } else {
        eprintln!(
            "Applied {} fixes to {} files ({} safe, {} unsafe)",
            fix_result.fixes_applied,
            fix_result.files_modified,
            fix_result.safe_fixes_applied,
            fix_result.unsafe_fixes_applied
        );
    }

    if fix_result.fixes_failed > 0 {
        eprintln!(
            "{}: {} fixes failed",
            "warning".yellow(),
            fix_result.fixes_failed
        );
    }
    for error in &fix_result.errors {
        eprintln!("{}: {}", "warning".yellow(), error);
    }
    if fix_result.fixes_skipped > 0 {
        eprintln!(
            "{}: {} unsafe fixes skipped (use --unsafe-fixes to include)",
            "note".blue(),
            fix_result.fixes_skipped
        );
    }
}

fn run(cli: Cli) -> Result<i32> {
    if let Some(name) = &cli.explain {
        let Some(entry) = find_rule(name) else {
            eprintln!("{}: Rule '{}' not found", "error".red().bold(), name);
            eprintln!();
            eprintln!("Use {} to see all available rules", "--list-rules".cyan());
            return Ok(1);
        };
        explain_rule(&entry.rule);
        return Ok(0);
    }

    if cli.list_rules {
        println!("{}", "Available rules:".bold());
        println!();
        for entry in builtin_rules() {
            print_rule(&entry.rule);
        }
        return Ok(0);
    }

    if cli.files.is_empty() {
        eprintln!("{}: No files specified", "error".red().bold());
        eprintln!();
        eprintln!("Usage: loopwise [OPTIONS] <FILES>...");
        eprintln!();
        eprintln!("For more information, try '--help'");
        return Ok(2);
    }

    let mut config = match &cli.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => Config::load_default().context("Failed to load config")?,
    };

    let format = cli.format.map(|f| match f {
        Format::Text => OutputFormat::Text,
        Format::Json => OutputFormat::Json,
    });
    config.merge_cli(
        format,
        cli.verbose.then_some(true),
        cli.jobs,
        cli.disable.clone(),
        cli.select.clone(),
    );

    match config.output.color {
        _ if cli.no_color => colored::control::set_override(false),
        ColorMode::Never => colored::control::set_override(false),
        ColorMode::Always => colored::control::set_override(true),
        ColorMode::Auto => {}
    }

    let files = discover_files(&cli.files, &config.files)?;
    if files.is_empty() {
        bail!("No files found to lint");
    }
    log::info!("Linting {} files", files.len());

    let engine = Engine::new(config.clone());
    let mut result = engine.lint_files(&files);

    if let Some(min) = cli.min_severity {
        retain_min_severity(&mut result, min.into());
    }

    if cli.fix || cli.diff || cli.show_fixes {
        let dry_run = !cli.write;
        let mut fixer = Fixer::new(dry_run);
        if cli.diff {
            fixer = fixer.with_diff_mode();
        } else if cli.show_fixes {
            fixer = fixer.with_show_only();
        }
        if cli.unsafe_fixes || config.fix.unsafe_fixes {
            fixer = fixer.with_unsafe_fixes(true);
        }

        let fix_result = fixer.fix_files(&engine, &files);
        if fix_result.fixes_applied == 0 && fix_result.fixes_skipped == 0 {
            log::info!("No auto-fixes available");
        } else {
            report_fixes(&cli, &fix_result, dry_run);
        }
    }

    let formatter: Box<dyn OutputFormatter> = match config.output.format {
        OutputFormat::Text => {
            let mut f = TextFormatter::new();
            if cli.no_color || config.output.color == ColorMode::Never {
                f = f.without_color();
            }
            f.show_stats = config.output.statistics;
            Box::new(f)
        }
        OutputFormat::Json => Box::new(JsonFormatter::new().pretty()),
    };
    print!("{}", formatter.format(&result));

    if cli.stats {
        eprintln!();
        eprintln!("{}", result.format_timings());
    }

    Ok(if cli.exit_zero { 0 } else { result.exit_code() })
}

fn main() {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    if cli.no_color {
        colored::control::set_override(false);
    }

    let code = match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{}: {:#}", "error".red().bold(), e);
            2
        }
    };
    std::process::exit(code);
}
