//! Configuration system for the lint engine
//!
//! Reads configuration from:
//! - `.loopwise.yaml` / `.loopwise.yml` / `.loopwise.json` (project-level)
//! - the same names in the home directory (user-level)
//!
//! Rules may be referenced by id (`loop-prefers-for-for-list`) or by code
//! (`LOOP002`) anywhere a rule name is accepted.

use crate::diagnostic::Severity;
use crate::rule::{RuleCategory, RuleId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration file names, in lookup order
pub const CONFIG_FILE_NAMES: &[&str] = &[".loopwise.yaml", ".loopwise.yml", ".loopwise.json"];

/// Configuration error
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Engine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Lint documents in parallel
    pub parallel: bool,

    /// Number of parallel jobs (0 = auto-detect)
    pub jobs: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            parallel: true,
            jobs: 0,
        }
    }
}

/// Output settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub format: OutputFormat,

    pub color: ColorMode,

    pub verbose: bool,

    /// Show statistics
    pub statistics: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: OutputFormat::Text,
            color: ColorMode::Auto,
            verbose: false,
            statistics: true,
        }
    }
}

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Unknown output format: {}", s)),
        }
    }
}

/// Color mode options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorMode {
    #[default]
    Auto,
    Always,
    Never,
}

/// File handling settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilesConfig {
    /// Patterns picked up when a directory is linted
    pub include: Vec<String>,

    /// Patterns skipped when a directory is linted
    pub exclude: Vec<String>,
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            include: vec![
                "**/*.json".to_string(),
                "**/*.yaml".to_string(),
                "**/*.yml".to_string(),
            ],
            exclude: vec![
                "**/node_modules/**".to_string(),
                "**/target/**".to_string(),
                "**/.loopwise.*".to_string(),
            ],
        }
    }
}

/// Rule configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RulesConfig {
    /// Disabled rules
    pub disabled: Vec<String>,

    /// Enabled rules (empty = all)
    pub enabled: Vec<String>,

    /// Select rules by id or code prefix (e.g. "LOOP00")
    pub extend: Vec<String>,

    /// Ignore rules by id or code prefix
    pub ignore: Vec<String>,

    /// Severity overrides (rule -> severity)
    pub severity: HashMap<String, Severity>,

    /// Per-file rule ignores (glob pattern -> rules)
    pub per_file: HashMap<String, Vec<String>>,
}

/// Fix settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FixConfig {
    /// Apply fixes that may change behavior
    pub unsafe_fixes: bool,
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Presets or other configuration files this one builds on
    pub extends: Vec<String>,

    pub engine: EngineConfig,

    pub output: OutputConfig,

    pub files: FilesConfig,

    pub rules: RulesConfig,

    pub fix: FixConfig,

    /// Rule categories to enable (empty = all)
    pub categories: Vec<RuleCategory>,
}

/// Whether a configured rule name refers to `rule`
fn names_rule(name: &str, rule: RuleId) -> bool {
    name.parse::<RuleId>() == Ok(rule)
}

fn extend_unique(into: &mut Vec<String>, from: Vec<String>) {
    for item in from {
        if !into.contains(&item) {
            into.push(item);
        }
    }
}

fn matches_prefix(prefix: &str, rule: RuleId) -> bool {
    let prefix = prefix.to_lowercase();
    rule.as_str().starts_with(&prefix) || rule.code().to_lowercase().starts_with(&prefix)
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a preset configuration by name
    pub fn preset(name: &str) -> Option<Self> {
        match name {
            "recommended" => Some(Self::preset_recommended()),
            "strict" => Some(Self::preset_strict()),
            "minimal" => Some(Self::preset_minimal()),
            _ => None,
        }
    }

    /// Every rule at its default severity
    fn preset_recommended() -> Self {
        Self::default()
    }

    /// Every rule, none below warning
    fn preset_strict() -> Self {
        let mut config = Self::default();
        for rule in RuleId::ALL {
            let severity = rule.default_severity().max(Severity::Warning);
            config.rules.severity.insert(rule.as_str().to_string(), severity);
        }
        config.fix.unsafe_fixes = true;
        config
    }

    /// Only the performance rules
    fn preset_minimal() -> Self {
        Self {
            categories: vec![RuleCategory::Perf],
            ..Self::default()
        }
    }

    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        Self::load_with_depth(path, 0)
    }

    /// Load with recursion depth limit
    fn load_with_depth(path: &Path, depth: usize) -> Result<Self, ConfigError> {
        const MAX_DEPTH: usize = 10;
        if depth >= MAX_DEPTH {
            return Err(ConfigError::Invalid(
                "Maximum config inheritance depth exceeded".to_string(),
            ));
        }

        let content = std::fs::read_to_string(path)?;

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

        let mut config: Self = match ext {
            "yaml" | "yml" => serde_yaml::from_str(&content)?,
            "json" => serde_json::from_str(&content)?,
            _ => {
                return Err(ConfigError::Invalid(format!(
                    "Unknown config file format: {}",
                    ext
                )))
            }
        };
        config.validate()?;

        if !config.extends.is_empty() {
            let base_dir = path.parent().unwrap_or(Path::new("."));
            let mut base_config = Self::default();

            for extend in &config.extends {
                let extended = match Self::preset(extend) {
                    Some(preset) => preset,
                    None => {
                        let extend_path = if Path::new(extend).is_absolute() {
                            PathBuf::from(extend)
                        } else {
                            base_dir.join(extend)
                        };
                        Self::load_with_depth(&extend_path, depth + 1)?
                    }
                };
                base_config.merge(extended);
            }

            base_config.merge(config);
            config = base_config;
        }

        log::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Reject rule names that match no rule
    fn validate(&self) -> Result<(), ConfigError> {
        let named = self
            .rules
            .disabled
            .iter()
            .chain(&self.rules.enabled)
            .chain(self.rules.severity.keys());
        for name in named {
            if name.parse::<RuleId>().is_err() {
                return Err(ConfigError::Invalid(format!("Unknown rule: {}", name)));
            }
        }
        Ok(())
    }

    /// Merge another config into this one (other takes precedence)
    pub fn merge(&mut self, other: Self) {
        if other.engine.jobs != 0 {
            self.engine.jobs = other.engine.jobs;
        }
        self.engine.parallel = other.engine.parallel;

        if other.output.format != OutputFormat::Text {
            self.output.format = other.output.format;
        }
        if other.output.verbose {
            self.output.verbose = true;
        }
        if other.output.color != ColorMode::Auto {
            self.output.color = other.output.color;
        }
        self.output.statistics = other.output.statistics;

        extend_unique(&mut self.files.include, other.files.include);
        extend_unique(&mut self.files.exclude, other.files.exclude);

        self.rules.disabled.extend(other.rules.disabled);
        if !other.rules.enabled.is_empty() {
            self.rules.enabled = other.rules.enabled;
        }
        self.rules.extend.extend(other.rules.extend);
        self.rules.ignore.extend(other.rules.ignore);
        self.rules.severity.extend(other.rules.severity);
        for (pattern, rules) in other.rules.per_file {
            self.rules.per_file.entry(pattern).or_default().extend(rules);
        }

        if other.fix.unsafe_fixes {
            self.fix.unsafe_fixes = true;
        }
        if !other.categories.is_empty() {
            self.categories = other.categories;
        }
    }

    /// Load configuration from default locations
    pub fn load_default() -> Result<Self, ConfigError> {
        for name in CONFIG_FILE_NAMES {
            let path = PathBuf::from(name);
            if path.exists() {
                return Self::load(&path);
            }
        }

        if let Some(home) = dirs::home_dir() {
            for name in CONFIG_FILE_NAMES {
                let path = home.join(name);
                if path.exists() {
                    return Self::load(&path);
                }
            }
        }

        Ok(Self::default())
    }

    /// Merge CLI arguments into configuration
    pub fn merge_cli(
        &mut self,
        format: Option<OutputFormat>,
        verbose: Option<bool>,
        jobs: Option<usize>,
        disabled_rules: Option<Vec<String>>,
        enabled_rules: Option<Vec<String>>,
    ) {
        if let Some(f) = format {
            self.output.format = f;
        }
        if let Some(v) = verbose {
            self.output.verbose = v;
        }
        if let Some(j) = jobs {
            self.engine.jobs = j;
        }
        if let Some(disabled) = disabled_rules {
            self.rules.disabled.extend(disabled);
        }
        if let Some(enabled) = enabled_rules {
            self.rules.enabled = enabled;
        }
    }

    /// Check if a rule is enabled
    pub fn is_rule_enabled(&self, rule: RuleId, category: RuleCategory) -> bool {
        if self.rules.disabled.iter().any(|name| names_rule(name, rule)) {
            return false;
        }

        if self.rules.ignore.iter().any(|p| matches_prefix(p, rule)) {
            return false;
        }

        if !self.categories.is_empty() && !self.categories.contains(&category) {
            return false;
        }

        if !self.rules.enabled.is_empty() {
            return self.rules.enabled.iter().any(|name| names_rule(name, rule));
        }

        if !self.rules.extend.is_empty() {
            return self.rules.extend.iter().any(|p| matches_prefix(p, rule));
        }

        true
    }

    /// Get severity override for a rule
    pub fn get_severity_override(&self, rule: RuleId) -> Option<Severity> {
        self.rules
            .severity
            .iter()
            .find(|(name, _)| names_rule(name, rule))
            .map(|(_, severity)| *severity)
    }

    /// Check if a rule should be ignored for a file
    pub fn should_ignore_rule_for_file(&self, rule: RuleId, file_path: &Path) -> bool {
        let file_str = file_path.to_string_lossy();

        for (pattern, rules) in &self.rules.per_file {
            if let Ok(glob) = globset::Glob::new(pattern) {
                let matcher = glob.compile_matcher();
                if matcher.is_match(file_str.as_ref())
                    && rules
                        .iter()
                        .any(|name| name.eq_ignore_ascii_case("all") || names_rule(name, rule))
                {
                    return true;
                }
            }
        }

        false
    }
}
