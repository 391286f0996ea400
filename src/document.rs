//! Loop tree documents
//!
//! A tree file is an already-parsed syntax tree serialized as JSON or YAML:
//!
//! ```yaml
//! symbols:
//!   arr: int[]
//! source: |
//!   for (int i = 0; i < arr.Length; i++) { sum += arr[i]; }
//! statements:
//!   - node: loop
//!     kind: { form: indexed_for, ... }
//!     body: { node: block, statements: [...] }
//! ```
//!
//! `source` is optional. When present it is used for source lines in
//! diagnostics and for inline suppression comments, and replacing a loop
//! rewrites the loop's text in it.

use crate::resolver::SymbolTable;
use crate::syntax::{
    walk_loop, walk_loop_mut, LoopNode, NodeId, Span, Stmt, Visitor, VisitorMut,
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use thiserror::Error;

/// Error loading or saving a tree file
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Unsupported tree file: {0}")]
    UnsupportedFormat(String),
}

/// Error applying an edit
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EditError {
    #[error("loop {0} not found")]
    NodeNotFound(NodeId),
}

/// Source of loop nodes for the engine
pub trait Document: Send + Sync {
    /// Path of the document
    fn path(&self) -> &Path;

    /// Every loop in the document, outer loops before the loops they contain
    fn loops(&self) -> Box<dyn Iterator<Item = &LoopNode> + '_>;

    /// Get source line at line number (1-based)
    fn get_source_line(&self, line: usize) -> Option<&str>;

    /// Check if a rule is disabled at a specific line (inline comments)
    fn is_rule_disabled(&self, rule_id: &str, line: usize) -> bool;

    /// Check if a rule is disabled for the entire file
    fn is_rule_disabled_for_file(&self, rule_id: &str) -> bool;
}

/// Receiver of loop replacements
pub trait TreeEditor {
    fn replace(&mut self, original: NodeId, replacement: LoopNode) -> Result<(), EditError>;
}

/// Serialization format of a tree file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeFormat {
    Json,
    Yaml,
}

impl TreeFormat {
    /// Detect the format from the file extension
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()?.to_lowercase().as_str() {
            "json" => Some(TreeFormat::Json),
            "yaml" | "yml" => Some(TreeFormat::Yaml),
            _ => None,
        }
    }
}

/// On-disk layout of a tree file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TreeFile {
    /// Declared types of the identifiers the loops iterate
    #[serde(default)]
    pub symbols: SymbolTable,

    /// Original source text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,

    #[serde(default)]
    pub statements: Vec<Stmt>,
}

/// A loaded tree file
pub struct TreeDocument {
    path: PathBuf,
    format: TreeFormat,
    tree: TreeFile,

    /// Source lines for display
    source_lines: Vec<String>,

    /// Lines with disable comments (rule_id -> set of lines)
    disabled_lines: HashMap<String, HashSet<usize>>,

    /// Rules disabled for the entire file
    disabled_file_rules: HashSet<String>,
}

impl TreeDocument {
    /// Load a tree file, choosing the format from its extension
    pub fn load(path: &Path) -> Result<Self, LoadError> {
        let format = TreeFormat::from_path(path)
            .ok_or_else(|| LoadError::UnsupportedFormat(path.display().to_string()))?;
        let content = std::fs::read_to_string(path)?;
        let doc = Self::parse(&content, format, path)?;
        log::debug!(
            "Loaded {} ({} loops, {} symbols)",
            path.display(),
            doc.loop_count(),
            doc.tree.symbols.len()
        );
        Ok(doc)
    }

    /// Parse tree file content
    pub fn parse(content: &str, format: TreeFormat, path: &Path) -> Result<Self, LoadError> {
        let tree: TreeFile = match format {
            TreeFormat::Json => serde_json::from_str(content)?,
            TreeFormat::Yaml => serde_yaml::from_str(content)?,
        };
        Ok(Self::from_tree(tree, format, path))
    }

    /// Wrap an in-memory tree, numbering its loops in pre-order
    pub fn from_tree(mut tree: TreeFile, format: TreeFormat, path: &Path) -> Self {
        let mut numbering = LoopNumbering { next: 1 };
        for stmt in &mut tree.statements {
            numbering.visit_stmt_mut(stmt);
        }

        let mut doc = Self {
            path: path.to_path_buf(),
            format,
            tree,
            source_lines: Vec::new(),
            disabled_lines: HashMap::new(),
            disabled_file_rules: HashSet::new(),
        };
        doc.index_source();
        doc
    }

    /// Rebuild source lines and inline suppressions from `source`
    fn index_source(&mut self) {
        self.source_lines = self
            .tree
            .source
            .as_deref()
            .map(|s| s.lines().map(String::from).collect())
            .unwrap_or_default();
        let (disabled_lines, disabled_file_rules) = parse_disable_comments(&self.source_lines);
        self.disabled_lines = disabled_lines;
        self.disabled_file_rules = disabled_file_rules;
    }

    /// Splice the text of a replaced loop into `source` and move the spans
    /// after it. A loop without a usable range leaves the source text out of
    /// step with the tree, so the text and all spans are dropped instead.
    fn resync_source(&mut self, replaced: Span, id: NodeId) {
        if self.tree.source.is_none() {
            return;
        }
        let rendered = self.find_loop(id).map(|node| (node.to_string(), node.form().keyword()));
        let TreeFile {
            source, statements, ..
        } = &mut self.tree;
        let (Some(text), Some((rendered, keyword))) = (source.as_mut(), rendered) else {
            return;
        };

        let usable = replaced.start < replaced.end && text.get(replaced.start..replaced.end).is_some();
        if !usable {
            log::debug!(
                "{}: loop {} has no source range, dropping source text",
                self.path.display(),
                id
            );
            *source = None;
            let mut clear = SpanClearer;
            for stmt in statements.iter_mut() {
                clear.visit_stmt_mut(stmt);
            }
            self.index_source();
            return;
        }

        let indent = line_indent(text, replaced.start).to_string();
        let rendered = rendered.replace('\n', &format!("\n{}", indent));
        text.replace_range(replaced.start..replaced.end, &rendered);

        let mut shift = SpanShift {
            source: text.as_str(),
            target: id,
            start: replaced.start,
            old_end: replaced.end,
            new_end: replaced.start + rendered.len(),
            keyword_len: keyword.len(),
        };
        for stmt in statements.iter_mut() {
            shift.visit_stmt_mut(stmt);
        }
        self.index_source();
    }

    pub fn symbols(&self) -> &SymbolTable {
        &self.tree.symbols
    }

    pub fn statements(&self) -> &[Stmt] {
        &self.tree.statements
    }

    pub fn format(&self) -> TreeFormat {
        self.format
    }

    pub fn loop_count(&self) -> usize {
        self.collect_loops().len()
    }

    /// Find a loop by id
    pub fn find_loop(&self, id: NodeId) -> Option<&LoopNode> {
        self.collect_loops().into_iter().find(|node| node.id == id)
    }

    /// Render all statements as source text
    pub fn render(&self) -> String {
        let mut out = String::new();
        for stmt in &self.tree.statements {
            out.push_str(&stmt.to_string());
            out.push('\n');
        }
        out
    }

    /// Serialize the tree back in its original format
    pub fn to_content(&self) -> Result<String, LoadError> {
        Ok(match self.format {
            TreeFormat::Json => serde_json::to_string_pretty(&self.tree)? + "\n",
            TreeFormat::Yaml => serde_yaml::to_string(&self.tree)?,
        })
    }

    /// Write the tree back to its path
    pub fn save(&self) -> Result<(), LoadError> {
        std::fs::write(&self.path, self.to_content()?)?;
        Ok(())
    }

    fn collect_loops(&self) -> Vec<&LoopNode> {
        let mut collector = LoopCollector::default();
        for stmt in &self.tree.statements {
            collector.visit_stmt(stmt);
        }
        collector.loops
    }
}

impl Document for TreeDocument {
    fn path(&self) -> &Path {
        &self.path
    }

    fn loops(&self) -> Box<dyn Iterator<Item = &LoopNode> + '_> {
        Box::new(self.collect_loops().into_iter())
    }

    fn get_source_line(&self, line: usize) -> Option<&str> {
        if line > 0 && line <= self.source_lines.len() {
            Some(&self.source_lines[line - 1])
        } else {
            None
        }
    }

    fn is_rule_disabled(&self, rule_id: &str, line: usize) -> bool {
        ["all", rule_id].iter().any(|key| {
            self.disabled_lines
                .get(*key)
                .is_some_and(|lines| lines.contains(&line))
        })
    }

    fn is_rule_disabled_for_file(&self, rule_id: &str) -> bool {
        self.disabled_file_rules.contains("all") || self.disabled_file_rules.contains(rule_id)
    }
}

impl TreeEditor for TreeDocument {
    fn replace(&mut self, original: NodeId, replacement: LoopNode) -> Result<(), EditError> {
        let mut replacer = LoopReplacer {
            target: original,
            replacement: Some(replacement),
            replaced: None,
        };
        for stmt in &mut self.tree.statements {
            if replacer.replacement.is_none() {
                break;
            }
            replacer.visit_stmt_mut(stmt);
        }

        match replacer.replaced {
            Some(span) => {
                self.resync_source(span, original);
                Ok(())
            }
            None => Err(EditError::NodeNotFound(original)),
        }
    }
}

struct LoopNumbering {
    next: u32,
}

impl VisitorMut for LoopNumbering {
    fn visit_loop_mut(&mut self, node: &mut LoopNode) {
        node.id = NodeId(self.next);
        self.next += 1;
        walk_loop_mut(self, node);
    }
}

#[derive(Default)]
struct LoopCollector<'ast> {
    loops: Vec<&'ast LoopNode>,
}

impl<'ast> Visitor<'ast> for LoopCollector<'ast> {
    fn visit_loop(&mut self, node: &'ast LoopNode) {
        self.loops.push(node);
        walk_loop(self, node);
    }
}

struct LoopReplacer {
    target: NodeId,
    replacement: Option<LoopNode>,
    /// Span of the loop that was replaced
    replaced: Option<Span>,
}

impl VisitorMut for LoopReplacer {
    fn visit_loop_mut(&mut self, node: &mut LoopNode) {
        if self.replacement.is_none() {
            return;
        }
        if node.id == self.target {
            if let Some(replacement) = self.replacement.take() {
                self.replaced = Some(node.span);
                *node = replacement;
            }
        } else {
            walk_loop_mut(self, node);
        }
    }
}

struct SpanClearer;

impl VisitorMut for SpanClearer {
    fn visit_loop_mut(&mut self, node: &mut LoopNode) {
        node.span = Span::default();
        node.keyword = Span::default();
        walk_loop_mut(self, node);
    }
}

/// Moves spans past a spliced range
struct SpanShift<'a> {
    /// Source text after the splice
    source: &'a str,
    target: NodeId,
    start: usize,
    old_end: usize,
    new_end: usize,
    keyword_len: usize,
}

impl SpanShift<'_> {
    fn shift(&self, span: &mut Span) {
        if span.end <= span.start {
            return;
        }
        if span.start >= self.old_end {
            span.start = span.start - self.old_end + self.new_end;
            span.end = span.end - self.old_end + self.new_end;
            (span.line, span.column) = position(self.source, span.start);
        } else if span.end >= self.old_end {
            span.end = span.end - self.old_end + self.new_end;
        }
    }
}

impl VisitorMut for SpanShift<'_> {
    fn visit_loop_mut(&mut self, node: &mut LoopNode) {
        if node.id == self.target {
            let (line, column) = position(self.source, self.start);
            node.span = Span::new(self.start, self.new_end, line, column);
            node.keyword = Span::new(self.start, self.start + self.keyword_len, line, column);
            let mut clear = SpanClearer;
            clear.visit_stmt_mut(&mut node.body);
            return;
        }
        self.shift(&mut node.span);
        self.shift(&mut node.keyword);
        walk_loop_mut(self, node);
    }
}

/// 1-based line and column of a byte offset
fn position(source: &str, offset: usize) -> (usize, usize) {
    let before = source.get(..offset).unwrap_or(source);
    let line_start = before.rfind('\n').map_or(0, |p| p + 1);
    (
        before.matches('\n').count() + 1,
        before[line_start..].chars().count() + 1,
    )
}

/// Leading whitespace of the line containing `offset`
fn line_indent(source: &str, offset: usize) -> &str {
    let line_start = source[..offset].rfind('\n').map_or(0, |p| p + 1);
    let line = &source[line_start..];
    let width = line.len() - line.trim_start_matches([' ', '\t']).len();
    &line[..width]
}

fn disable_patterns() -> &'static [Regex; 3] {
    static PATTERNS: OnceLock<[Regex; 3]> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            Regex::new(r"//\s*loopwise-disable\s+([\w,-]+)").expect("static regex"),
            Regex::new(r"//\s*loopwise-disable-next-line\s+([\w,-]+)").expect("static regex"),
            Regex::new(r"//\s*loopwise-disable-file\s+([\w,-]+)").expect("static regex"),
        ]
    })
}

/// Rule names in a comment, normalized to rule ids where they parse
fn comment_rules(list: &str) -> impl Iterator<Item = String> + '_ {
    list.split(',').filter(|s| !s.is_empty()).map(|name| {
        name.parse::<crate::rule::RuleId>()
            .map(|id| id.as_str().to_string())
            .unwrap_or_else(|_| name.to_lowercase())
    })
}

/// Parse inline disable comments from source
fn parse_disable_comments(lines: &[String]) -> (HashMap<String, HashSet<usize>>, HashSet<String>) {
    let mut disabled_lines: HashMap<String, HashSet<usize>> = HashMap::new();
    let mut disabled_file_rules: HashSet<String> = HashSet::new();
    let [disable_re, disable_next_re, disable_file_re] = disable_patterns();

    for (i, line) in lines.iter().enumerate() {
        let line_num = i + 1;

        for cap in disable_file_re.captures_iter(line) {
            disabled_file_rules.extend(comment_rules(&cap[1]));
        }

        for cap in disable_re.captures_iter(line) {
            for rule in comment_rules(&cap[1]) {
                disabled_lines.entry(rule).or_default().insert(line_num);
            }
        }

        for cap in disable_next_re.captures_iter(line) {
            for rule in comment_rules(&cap[1]) {
                disabled_lines.entry(rule).or_default().insert(line_num + 1);
            }
        }
    }

    (disabled_lines, disabled_file_rules)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::{Expr, LoopForm};
    use pretty_assertions::assert_eq;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const NESTED_JSON: &str = r#"{
        "symbols": { "arr": "int[]", "grid": "int[][]" },
        "statements": [
            { "node": "loop",
              "kind": { "form": "element_foreach", "element": "row",
                        "source": { "node": "identifier", "name": "grid" } },
              "body": { "node": "block", "statements": [
                  { "node": "loop",
                    "kind": { "form": "element_foreach", "element": "x",
                              "source": { "node": "identifier", "name": "row" } },
                    "body": { "node": "block", "statements": [] } }
              ] } },
            { "node": "loop",
              "kind": { "form": "element_foreach", "element": "y",
                        "source": { "node": "identifier", "name": "arr" } },
              "body": { "node": "break" } }
        ]
    }"#;

    fn parse_source(source: &str) -> TreeDocument {
        let tree = TreeFile {
            source: Some(source.to_string()),
            ..TreeFile::default()
        };
        TreeDocument::from_tree(tree, TreeFormat::Json, Path::new("test.json"))
    }

    #[test]
    fn test_loops_are_numbered_in_pre_order() {
        let doc = TreeDocument::parse(NESTED_JSON, TreeFormat::Json, Path::new("n.json")).unwrap();
        let ids: Vec<(NodeId, String)> = doc
            .loops()
            .map(|node| (node.id, node.header()))
            .collect();

        assert_eq!(
            ids,
            vec![
                (NodeId(1), "foreach (var row in grid)".to_string()),
                (NodeId(2), "foreach (var x in row)".to_string()),
                (NodeId(3), "foreach (var y in arr)".to_string()),
            ]
        );
        assert_eq!(doc.symbols().type_of("grid"), Some("int[][]"));
    }

    #[test]
    fn test_replace_nested_loop() {
        let mut doc =
            TreeDocument::parse(NESTED_JSON, TreeFormat::Json, Path::new("n.json")).unwrap();
        let replacement = LoopNode::foreach(None, "z", Expr::ident("row"), Stmt::block(vec![]))
            .with_id(NodeId(2));

        doc.replace(NodeId(2), replacement).unwrap();
        assert_eq!(
            doc.find_loop(NodeId(2)).map(LoopNode::header),
            Some("foreach (var z in row)".to_string())
        );
        assert_eq!(doc.loop_count(), 3);
        assert_eq!(
            doc.replace(NodeId(42), LoopNode::foreach(None, "z", Expr::ident("a"), Stmt::Break)),
            Err(EditError::NodeNotFound(NodeId(42)))
        );
    }

    #[test]
    fn test_replace_splices_indented_source() {
        let source = "if (ok) {\n    foreach (var x in arr) { }\n}\nforeach (var y in arr) { }\n";
        let inner = LoopNode::foreach(None, "x", Expr::ident("arr"), Stmt::block(vec![]))
            .with_span(Span::new(14, 39, 2, 5), Span::new(14, 21, 2, 5));
        let outer = LoopNode::foreach(None, "y", Expr::ident("arr"), Stmt::block(vec![]))
            .with_span(Span::new(42, 67, 4, 1), Span::new(42, 49, 4, 1));
        let tree = TreeFile {
            source: Some(source.to_string()),
            statements: vec![
                Stmt::If {
                    condition: Expr::ident("ok"),
                    then_branch: Box::new(Stmt::block(vec![Stmt::Loop(Box::new(inner))])),
                    else_branch: None,
                },
                Stmt::Loop(Box::new(outer)),
            ],
            ..TreeFile::default()
        };
        let mut doc = TreeDocument::from_tree(tree, TreeFormat::Json, Path::new("s.json"));

        let replacement = LoopNode::indexed_for(
            Some("int"),
            "i",
            Expr::member(Expr::ident("arr"), "Length"),
            Stmt::block(vec![Stmt::Break]),
        )
        .with_id(NodeId(1));
        doc.replace(NodeId(1), replacement).unwrap();

        assert_eq!(doc.get_source_line(2), Some("    for (int i = 0; i < arr.Length; i++) {"));
        assert_eq!(doc.get_source_line(3), Some("        break;"));
        assert_eq!(doc.get_source_line(4), Some("    }"));
        assert_eq!(doc.get_source_line(6), Some("foreach (var y in arr) { }"));
        assert_eq!(doc.find_loop(NodeId(1)).map(|n| n.keyword.line), Some(2));
        assert_eq!(doc.find_loop(NodeId(2)).map(|n| n.keyword.line), Some(6));
    }

    #[test]
    fn test_replace_without_range_drops_source() {
        let looped = LoopNode::foreach(None, "x", Expr::ident("arr"), Stmt::block(vec![]))
            .with_span(Span::default(), Span::new(0, 7, 1, 1));
        let tree = TreeFile {
            source: Some("foreach (var x in arr) { }\n".to_string()),
            statements: vec![Stmt::Loop(Box::new(looped))],
            ..TreeFile::default()
        };
        let mut doc = TreeDocument::from_tree(tree, TreeFormat::Json, Path::new("d.json"));

        let replacement = LoopNode::foreach(None, "z", Expr::ident("arr"), Stmt::block(vec![]))
            .with_id(NodeId(1));
        doc.replace(NodeId(1), replacement).unwrap();

        assert_eq!(doc.get_source_line(1), None);
        assert_eq!(doc.find_loop(NodeId(1)).map(|n| n.keyword), Some(Span::default()));
    }

    #[test]
    fn test_load_yaml_file() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        write!(
            file,
            r#"
symbols:
  list: List<int>
source: |
  foreach (var x in list) {{ sum += x; }}
statements:
  - node: loop
    keyword: {{ start: 0, end: 7, line: 1, column: 1 }}
    kind:
      form: element_foreach
      element: x
      source: {{ node: identifier, name: list }}
    body:
      node: block
      statements: []
"#
        )
        .unwrap();

        let doc = TreeDocument::load(file.path()).unwrap();
        let node = doc.loops().next().unwrap();
        assert_eq!(node.form(), LoopForm::ElementForeach);
        assert_eq!(node.keyword.line, 1);
        assert_eq!(
            doc.get_source_line(1),
            Some("foreach (var x in list) { sum += x; }")
        );
        assert_eq!(doc.format(), TreeFormat::Yaml);
    }

    #[test]
    fn test_save_round_trips() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        file.write_all(NESTED_JSON.as_bytes()).unwrap();

        let doc = TreeDocument::load(file.path()).unwrap();
        doc.save().unwrap();
        let reloaded = TreeDocument::load(file.path()).unwrap();
        assert_eq!(reloaded.statements(), doc.statements());
        assert_eq!(reloaded.render(), doc.render());
    }

    #[test]
    fn test_unsupported_extension() {
        let file = NamedTempFile::new().unwrap();
        let err = TreeDocument::load(file.path()).err().unwrap();
        assert!(matches!(err, LoadError::UnsupportedFormat(_)));
    }

    #[test]
    fn test_disable_comment() {
        let doc = parse_source(
            "int sum = 0;\nfor (int i = 0; i < a.Length; i++) // loopwise-disable loop-prefers-foreach-for-array\n",
        );
        assert!(doc.is_rule_disabled("loop-prefers-foreach-for-array", 2));
        assert!(!doc.is_rule_disabled("loop-prefers-foreach-for-array", 1));
        assert!(!doc.is_rule_disabled("loop-prefers-for-for-list", 2));
    }

    #[test]
    fn test_disable_next_line_by_code() {
        let doc = parse_source("// loopwise-disable-next-line LOOP003,LOOP002\nforeach (var x in a) { }\n");
        assert!(doc.is_rule_disabled("loop-prefers-for-for-array", 2));
        assert!(doc.is_rule_disabled("loop-prefers-for-for-list", 2));
        assert!(!doc.is_rule_disabled("loop-prefers-for-for-array", 1));
    }

    #[test]
    fn test_disable_file_and_all() {
        let doc = parse_source("// loopwise-disable-file loop-prefers-for-for-list\n// loopwise-disable-next-line all\nfor (;;) { }\n");
        assert!(doc.is_rule_disabled_for_file("loop-prefers-for-for-list"));
        assert!(!doc.is_rule_disabled_for_file("loop-prefers-for-for-array"));
        assert!(doc.is_rule_disabled("anything", 3));
    }
}
