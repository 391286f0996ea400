//! Loop rewriting
//!
//! Builds the replacement for a flagged loop in the recommended form. The
//! body is carried over with canonical references substituted:
//!
//! - `for` → `foreach`: reads of `coll[i]` become the new element variable.
//! - `foreach` → `for`: reads of the element variable become `source[i]`.
//!
//! Any other use of the loop variable makes the conversion unsound, and the
//! rewrite is refused rather than producing code with different behavior.
//! The same holds for a `for` body that reassigns the collection or changes
//! its size: the indexed loop observes either, an enumerator does not.

use crate::classify::Finding;
use crate::diagnostic::FixSafety;
use crate::resolver::CollectionKind;
use crate::syntax::{
    walk_expr, walk_expr_mut, walk_stmt, AssignOp, Declarator, Expr, LoopForm, LoopKind,
    LoopNode, NodeId, Stmt, UnaryOp, Visitor, VisitorMut,
};
use std::collections::HashSet;
use thiserror::Error;

/// Name of a fresh `foreach` element variable, suffixed on collision
const ELEMENT_NAME: &str = "item";

/// Candidate names for a fresh `for` index variable, tried in order
const INDEX_NAMES: &[&str] = &["i", "j", "k"];

/// Methods that leave an array or list unchanged
const READ_ONLY_METHODS: &[&str] = &[
    "BinarySearch",
    "Contains",
    "CopyTo",
    "Equals",
    "Exists",
    "Find",
    "FindAll",
    "FindIndex",
    "FindLast",
    "FindLastIndex",
    "GetHashCode",
    "GetLength",
    "GetRange",
    "GetValue",
    "IndexOf",
    "LastIndexOf",
    "ToArray",
    "ToString",
    "TrueForAll",
];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RewriteError {
    #[error("index variable '{index}' is used other than to read '{collection}[{index}]'")]
    IndexVariableEscapes { index: String, collection: String },

    #[error("element variable '{0}' is assigned in the loop body")]
    ElementVariableAssigned(String),

    #[error("collection '{0}' is reassigned or modified in the loop body")]
    CollectionModified(String),

    #[error("source '{0}' would be re-evaluated on every iteration")]
    UnstableSource(String),

    #[error("loop header is not a plain ascending walk: {0}")]
    UnsupportedHeader(String),

    #[error("loop body contains a nested loop")]
    NestedLoop,

    #[error("rewrite contract violated: {0}")]
    ContractViolation(String),
}

/// A replacement loop ready for the tree editor
#[derive(Debug, Clone, PartialEq)]
pub struct RewriteResult {
    /// Node the replacement is installed over
    pub replaces: NodeId,
    pub node: LoopNode,
}

impl RewriteResult {
    pub fn form(&self) -> LoopForm {
        self.node.form()
    }

    /// Converting to `foreach` preserves behavior; converting to `for` stops
    /// observing concurrent modification of the collection
    pub fn safety(&self) -> FixSafety {
        match self.form() {
            LoopForm::ElementForeach => FixSafety::Safe,
            LoopForm::IndexedFor => FixSafety::Unsafe,
        }
    }
}

/// Build the replacement loop for `original` as recommended by `finding`
pub fn rewrite(original: &LoopNode, finding: &Finding) -> Result<RewriteResult, RewriteError> {
    if finding.loop_id != original.id {
        return Err(RewriteError::ContractViolation(format!(
            "finding refers to loop {}, got loop {}",
            finding.loop_id, original.id
        )));
    }
    if finding.recommended != original.form().opposite() {
        return Err(RewriteError::ContractViolation(format!(
            "cannot convert '{}' into '{}'",
            original.form(),
            finding.recommended
        )));
    }
    if original.body.contains_loop() {
        return Err(RewriteError::NestedLoop);
    }

    let node = match &original.kind {
        LoopKind::IndexedFor {
            index, increment, ..
        } => to_foreach(original, index, increment)?,
        LoopKind::ElementForeach {
            element, source, ..
        } => to_indexed_for(original, element, source, finding.collection)?,
    };

    log::trace!("loop {}: rewritten as '{}'", original.id, node.header());

    Ok(RewriteResult {
        replaces: original.id,
        node: node
            .with_id(original.id)
            .with_span(original.span, original.keyword),
    })
}

fn to_foreach(
    original: &LoopNode,
    index: &Declarator,
    increment: &[Expr],
) -> Result<LoopNode, RewriteError> {
    let (collection_expr, _) = original.sized_collection().ok_or_else(|| {
        RewriteError::ContractViolation(format!(
            "'{}' has no size-bounded condition",
            original.header()
        ))
    })?;
    let collection = collection_expr
        .as_identifier()
        .unwrap_or_default()
        .to_string();

    // an index declared outside the loop stays observable after it
    if index.ty.is_none() {
        return Err(RewriteError::UnsupportedHeader(format!(
            "'{}' is declared outside the loop",
            index.name
        )));
    }
    if !index.init.as_ref().is_some_and(|init| is_literal(init, "0")) {
        return Err(RewriteError::UnsupportedHeader(format!(
            "'{}' does not start at 0",
            index.name
        )));
    }
    if !is_unit_step(increment, &index.name) {
        return Err(RewriteError::UnsupportedHeader(format!(
            "'{}' does not advance by one",
            index.name
        )));
    }

    let mut escape = IndexEscapeScan {
        index: &index.name,
        collection: &collection,
        escaped: false,
    };
    escape.visit_stmt(&original.body);
    if escape.escaped {
        return Err(RewriteError::IndexVariableEscapes {
            index: index.name.clone(),
            collection,
        });
    }

    let mut modified = CollectionWriteScan {
        collection: &collection,
        modified: false,
    };
    modified.visit_stmt(&original.body);
    if modified.modified {
        return Err(RewriteError::CollectionModified(collection));
    }

    let mut taken = original.body.identifiers();
    taken.insert(collection.clone());
    taken.insert(index.name.clone());
    let element = fresh_name(&taken, std::iter::once(ELEMENT_NAME), ELEMENT_NAME);

    let mut body = (*original.body).clone();
    ElementReadSubst {
        collection: &collection,
        index: &index.name,
        element: &element,
    }
    .visit_stmt_mut(&mut body);

    Ok(LoopNode::foreach(None, &element, Expr::ident(&collection), body))
}

fn to_indexed_for(
    original: &LoopNode,
    element: &str,
    source: &Expr,
    collection: CollectionKind,
) -> Result<LoopNode, RewriteError> {
    let size_property = match collection {
        CollectionKind::Array => "Length",
        CollectionKind::List => "Count",
        CollectionKind::Other => {
            return Err(RewriteError::ContractViolation(
                "no size accessor for an unrecognized collection".to_string(),
            ))
        }
    };

    if source.contains_call() {
        return Err(RewriteError::UnstableSource(source.to_string()));
    }

    let mut writes = VariableWriteScan {
        name: element,
        written: false,
    };
    writes.visit_stmt(&original.body);
    if writes.written {
        return Err(RewriteError::ElementVariableAssigned(element.to_string()));
    }

    let mut taken = original.body.identifiers();
    taken.extend(Stmt::expr(source.clone()).identifiers());
    taken.insert(element.to_string());
    let index = fresh_name(&taken, INDEX_NAMES.iter().copied(), "i");

    let mut body = (*original.body).clone();
    ElementVariableSubst {
        element,
        replacement: Expr::element(source.clone(), Expr::ident(&index)),
    }
    .visit_stmt_mut(&mut body);

    Ok(LoopNode::indexed_for(
        Some("int"),
        &index,
        Expr::member(source.clone(), size_property),
        body,
    ))
}

/// First candidate not in `taken`, then `<stem>1`, `<stem>2`, ...
fn fresh_name<'a>(
    taken: &HashSet<String>,
    candidates: impl IntoIterator<Item = &'a str>,
    stem: &str,
) -> String {
    candidates
        .into_iter()
        .map(String::from)
        .chain((1..).map(|n| format!("{}{}", stem, n)))
        .find(|name| !taken.contains(name))
        .unwrap_or_else(|| stem.to_string())
}

fn is_literal(expr: &Expr, value: &str) -> bool {
    matches!(expr, Expr::Literal { value: v } if v == value)
}

/// `i++`, `++i` or `i += 1`
fn is_unit_step(increment: &[Expr], index: &str) -> bool {
    let [step] = increment else {
        return false;
    };
    match step {
        Expr::Unary { op, operand } => {
            matches!(op, UnaryOp::PostIncrement | UnaryOp::PreIncrement)
                && operand.is_identifier(index)
        }
        Expr::Assignment { op, target, value } => {
            *op == AssignOp::AddAssign
                && target.is_identifier(index)
                && is_literal(value, "1")
        }
        _ => false,
    }
}

fn is_canonical_read(expr: &Expr, collection: &str, index: &str) -> bool {
    matches!(
        expr,
        Expr::ElementAccess { target, index: at }
            if target.is_identifier(collection) && at.is_identifier(index)
    )
}

/// Detects uses of the index other than reading `collection[index]`
struct IndexEscapeScan<'a> {
    index: &'a str,
    collection: &'a str,
    escaped: bool,
}

impl<'ast> Visitor<'ast> for IndexEscapeScan<'_> {
    fn visit_expr(&mut self, expr: &'ast Expr) {
        if self.escaped {
            return;
        }
        match expr {
            // write-back through the element
            Expr::Assignment { target, .. }
                if is_canonical_read(target, self.collection, self.index) =>
            {
                self.escaped = true;
            }
            Expr::Unary { op, operand }
                if op.is_mutation() && is_canonical_read(operand, self.collection, self.index) =>
            {
                self.escaped = true;
            }
            _ if is_canonical_read(expr, self.collection, self.index) => {}
            Expr::Identifier { name } if name == self.index => self.escaped = true,
            _ => walk_expr(self, expr),
        }
    }

    fn visit_stmt(&mut self, stmt: &'ast Stmt) {
        if let Stmt::Local { name, .. } = stmt {
            if name == self.index || name == self.collection {
                self.escaped = true;
                return;
            }
        }
        walk_stmt(self, stmt);
    }
}

/// Detects assignment or increment of a plain variable
struct VariableWriteScan<'a> {
    name: &'a str,
    written: bool,
}

impl<'ast> Visitor<'ast> for VariableWriteScan<'_> {
    fn visit_expr(&mut self, expr: &'ast Expr) {
        match expr {
            Expr::Assignment { target, .. } if target.is_identifier(self.name) => {
                self.written = true
            }
            Expr::Unary { op, operand } if op.is_mutation() && operand.is_identifier(self.name) => {
                self.written = true
            }
            _ => walk_expr(self, expr),
        }
    }
}

/// Detects reassignment of the collection or calls that may change it
struct CollectionWriteScan<'a> {
    collection: &'a str,
    modified: bool,
}

impl<'ast> Visitor<'ast> for CollectionWriteScan<'_> {
    fn visit_expr(&mut self, expr: &'ast Expr) {
        if self.modified {
            return;
        }
        match expr {
            Expr::Assignment { target, .. } if target.is_identifier(self.collection) => {
                self.modified = true
            }
            Expr::Unary { op, operand } if op.is_mutation() && operand.is_identifier(self.collection) => {
                self.modified = true
            }
            Expr::Call { callee, .. } => match callee.as_ref() {
                Expr::MemberAccess { target, member }
                    if target.is_identifier(self.collection)
                        && !READ_ONLY_METHODS.contains(&member.as_str()) =>
                {
                    self.modified = true
                }
                _ => walk_expr(self, expr),
            },
            _ => walk_expr(self, expr),
        }
    }
}

struct ElementReadSubst<'a> {
    collection: &'a str,
    index: &'a str,
    element: &'a str,
}

impl VisitorMut for ElementReadSubst<'_> {
    fn visit_expr_mut(&mut self, expr: &mut Expr) {
        if is_canonical_read(expr, self.collection, self.index) {
            *expr = Expr::ident(self.element);
        } else {
            walk_expr_mut(self, expr);
        }
    }
}

struct ElementVariableSubst<'a> {
    element: &'a str,
    replacement: Expr,
}

impl VisitorMut for ElementVariableSubst<'_> {
    fn visit_expr_mut(&mut self, expr: &mut Expr) {
        if expr.is_identifier(self.element) {
            *expr = self.replacement.clone();
        } else {
            walk_expr_mut(self, expr);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::classify;
    use crate::resolver::SymbolTable;
    use crate::rule::RuleId;
    use crate::syntax::BinaryOp;
    use pretty_assertions::assert_eq;

    fn table() -> SymbolTable {
        SymbolTable::new()
            .with_symbol("arr", "int[]")
            .with_symbol("list", "List<int>")
            .with_symbol("items", "List<string>")
    }

    fn at(name: &str, index: &str) -> Expr {
        Expr::element(Expr::ident(name), Expr::ident(index))
    }

    fn sum_into(value: Expr) -> Stmt {
        Stmt::expr(Expr::assign(AssignOp::AddAssign, Expr::ident("sum"), value))
    }

    fn flagged(node: &LoopNode) -> Finding {
        classify(node, &table()).expect("loop should be flagged")
    }

    #[test]
    fn test_worked_example_array_sum_to_foreach() {
        let node = LoopNode::indexed_for(
            Some("int"),
            "i",
            Expr::member(Expr::ident("arr"), "Length"),
            Stmt::block(vec![sum_into(at("arr", "i"))]),
        )
        .with_id(NodeId(3));

        let result = rewrite(&node, &flagged(&node)).unwrap();
        assert_eq!(result.replaces, NodeId(3));
        assert_eq!(result.node.id, NodeId(3));
        assert_eq!(result.form(), LoopForm::ElementForeach);
        assert_eq!(result.safety(), FixSafety::Safe);
        assert_eq!(
            result.node.to_string(),
            "foreach (var item in arr) {\n    sum += item;\n}"
        );
    }

    #[test]
    fn test_foreach_to_for_over_list() {
        let node = LoopNode::foreach(
            Some("var"),
            "x",
            Expr::ident("list"),
            Stmt::block(vec![sum_into(Expr::ident("x"))]),
        );

        let result = rewrite(&node, &flagged(&node)).unwrap();
        assert_eq!(result.safety(), FixSafety::Unsafe);
        assert_eq!(
            result.node.to_string(),
            "for (int i = 0; i < list.Count; i++) {\n    sum += list[i];\n}"
        );
    }

    #[test]
    fn test_foreach_to_for_over_array_uses_length() {
        let node = LoopNode::foreach(
            None,
            "x",
            Expr::ident("arr"),
            Stmt::expr(Expr::call(Expr::ident("Print"), vec![Expr::ident("x")])),
        );

        let result = rewrite(&node, &flagged(&node)).unwrap();
        assert_eq!(
            result.node.to_string(),
            "for (int i = 0; i < arr.Length; i++)\n    Print(arr[i]);"
        );
    }

    #[test]
    fn test_fresh_names_avoid_collisions() {
        let node = LoopNode::indexed_for(
            Some("int"),
            "i",
            Expr::member(Expr::ident("arr"), "Length"),
            Stmt::block(vec![
                Stmt::Local {
                    ty: Some("int".to_string()),
                    name: "item".to_string(),
                    init: Some(at("arr", "i")),
                },
                sum_into(Expr::ident("item1")),
            ]),
        );
        let result = rewrite(&node, &flagged(&node)).unwrap();
        assert_eq!(result.node.header(), "foreach (var item2 in arr)");

        let node = LoopNode::foreach(
            None,
            "x",
            Expr::ident("items"),
            Stmt::block(vec![Stmt::expr(Expr::call(
                Expr::ident("Put"),
                vec![Expr::ident("i"), Expr::ident("j"), Expr::ident("x")],
            ))]),
        );
        let result = rewrite(&node, &flagged(&node)).unwrap();
        assert_eq!(result.node.header(), "for (int k = 0; k < items.Count; k++)");
    }

    #[test]
    fn test_bare_index_use_is_refused() {
        let node = LoopNode::indexed_for(
            Some("int"),
            "i",
            Expr::member(Expr::ident("arr"), "Length"),
            Stmt::block(vec![Stmt::expr(Expr::call(
                Expr::ident("Print"),
                vec![Expr::ident("i"), at("arr", "i")],
            ))]),
        );

        assert_eq!(
            rewrite(&node, &flagged(&node)),
            Err(RewriteError::IndexVariableEscapes {
                index: "i".to_string(),
                collection: "arr".to_string(),
            })
        );
    }

    #[test]
    fn test_write_back_through_index_is_refused() {
        let node = LoopNode::indexed_for(
            Some("int"),
            "i",
            Expr::member(Expr::ident("arr"), "Length"),
            Stmt::block(vec![Stmt::expr(Expr::assign(
                AssignOp::Assign,
                at("arr", "i"),
                Expr::literal("0"),
            ))]),
        );

        assert!(matches!(
            rewrite(&node, &flagged(&node)),
            Err(RewriteError::IndexVariableEscapes { .. })
        ));
    }

    #[test]
    fn test_growing_the_list_is_refused() {
        let node = LoopNode::indexed_for(
            Some("int"),
            "i",
            Expr::member(Expr::ident("list"), "Count"),
            Stmt::block(vec![Stmt::expr(Expr::call(
                Expr::member(Expr::ident("list"), "Add"),
                vec![at("list", "i")],
            ))]),
        );

        assert_eq!(
            rewrite(&node, &flagged(&node)),
            Err(RewriteError::CollectionModified("list".to_string()))
        );
    }

    #[test]
    fn test_reassigning_the_array_is_refused() {
        let node = LoopNode::indexed_for(
            Some("int"),
            "i",
            Expr::member(Expr::ident("arr"), "Length"),
            Stmt::block(vec![
                sum_into(at("arr", "i")),
                Stmt::expr(Expr::assign(
                    AssignOp::Assign,
                    Expr::ident("arr"),
                    Expr::ident("other"),
                )),
            ]),
        );

        assert_eq!(
            rewrite(&node, &flagged(&node)),
            Err(RewriteError::CollectionModified("arr".to_string()))
        );
    }

    #[test]
    fn test_read_only_calls_on_the_list_are_kept() {
        let node = LoopNode::indexed_for(
            Some("int"),
            "i",
            Expr::member(Expr::ident("list"), "Count"),
            Stmt::block(vec![Stmt::expr(Expr::call(
                Expr::ident("Print"),
                vec![Expr::call(
                    Expr::member(Expr::ident("list"), "IndexOf"),
                    vec![at("list", "i")],
                )],
            ))]),
        );

        let result = rewrite(&node, &flagged(&node)).unwrap();
        assert_eq!(
            result.node.to_string(),
            "foreach (var item in list) {\n    Print(list.IndexOf(item));\n}"
        );
    }

    #[test]
    fn test_index_declared_outside_the_loop_is_refused() {
        let node = LoopNode::indexed_for(
            None,
            "i",
            Expr::member(Expr::ident("arr"), "Length"),
            Stmt::block(vec![sum_into(at("arr", "i"))]),
        );

        assert_eq!(
            rewrite(&node, &flagged(&node)),
            Err(RewriteError::UnsupportedHeader(
                "'i' is declared outside the loop".to_string()
            ))
        );
    }

    #[test]
    fn test_other_collection_indexed_by_i_is_refused() {
        let node = LoopNode::indexed_for(
            Some("int"),
            "i",
            Expr::member(Expr::ident("arr"), "Length"),
            Stmt::block(vec![sum_into(at("other", "i"))]),
        );

        assert!(matches!(
            rewrite(&node, &flagged(&node)),
            Err(RewriteError::IndexVariableEscapes { .. })
        ));
    }

    #[test]
    fn test_non_unit_step_is_refused() {
        let node = LoopNode::new(
            LoopKind::IndexedFor {
                index: Declarator {
                    ty: Some("int".to_string()),
                    name: "i".to_string(),
                    init: Some(Expr::literal("0")),
                },
                condition: Some(Expr::binary(
                    BinaryOp::Lt,
                    Expr::ident("i"),
                    Expr::member(Expr::ident("arr"), "Length"),
                )),
                increment: vec![Expr::assign(
                    AssignOp::AddAssign,
                    Expr::ident("i"),
                    Expr::literal("2"),
                )],
            },
            Stmt::block(vec![sum_into(at("arr", "i"))]),
        );

        assert!(matches!(
            rewrite(&node, &flagged(&node)),
            Err(RewriteError::UnsupportedHeader(_))
        ));
    }

    #[test]
    fn test_element_assignment_is_refused() {
        let node = LoopNode::foreach(
            None,
            "x",
            Expr::ident("list"),
            Stmt::block(vec![Stmt::expr(Expr::unary(
                UnaryOp::PostIncrement,
                Expr::ident("x"),
            ))]),
        );

        assert_eq!(
            rewrite(&node, &flagged(&node)),
            Err(RewriteError::ElementVariableAssigned("x".to_string()))
        );
    }

    #[test]
    fn test_call_source_is_refused() {
        let node = LoopNode::foreach(
            None,
            "x",
            Expr::call(Expr::ident("Load"), vec![]),
            Stmt::block(vec![]),
        );
        let finding = classify(&node, &|_: &Expr| CollectionKind::List).unwrap();

        assert_eq!(
            rewrite(&node, &finding),
            Err(RewriteError::UnstableSource("Load()".to_string()))
        );
    }

    #[test]
    fn test_nested_loop_is_refused() {
        let inner = LoopNode::foreach(None, "y", Expr::ident("items"), Stmt::block(vec![]));
        let node = LoopNode::foreach(
            None,
            "x",
            Expr::ident("list"),
            Stmt::block(vec![Stmt::Loop(Box::new(inner))]),
        );

        assert_eq!(
            rewrite(&node, &flagged(&node)),
            Err(RewriteError::NestedLoop)
        );
    }

    #[test]
    fn test_mismatched_finding_is_a_contract_violation() {
        let for_loop = LoopNode::indexed_for(
            Some("int"),
            "i",
            Expr::member(Expr::ident("arr"), "Length"),
            Stmt::block(vec![]),
        );
        let foreach = LoopNode::foreach(None, "x", Expr::ident("arr"), Stmt::block(vec![]));

        let foreach_finding = flagged(&foreach);
        assert!(matches!(
            rewrite(&for_loop, &foreach_finding),
            Err(RewriteError::ContractViolation(_))
        ));

        let other_loop = foreach.clone().with_id(NodeId(9));
        assert!(matches!(
            rewrite(&other_loop, &foreach_finding),
            Err(RewriteError::ContractViolation(_))
        ));
    }

    #[test]
    fn test_round_trip_never_reflags_same_rule() {
        let cases = vec![
            LoopNode::indexed_for(
                Some("int"),
                "i",
                Expr::member(Expr::ident("arr"), "Length"),
                Stmt::block(vec![sum_into(at("arr", "i"))]),
            ),
            LoopNode::indexed_for(
                Some("int"),
                "i",
                Expr::member(Expr::ident("list"), "Count"),
                Stmt::block(vec![Stmt::expr(Expr::call(
                    Expr::ident("Print"),
                    vec![at("list", "i")],
                ))]),
            ),
        ];

        for node in cases {
            let finding = flagged(&node);
            let result = rewrite(&node, &finding).unwrap();
            assert_eq!(result.form(), finding.recommended);

            let again = classify(&result.node, &table()).unwrap();
            assert_ne!(again.rule, finding.rule);
            assert_eq!(again.recommended, LoopForm::IndexedFor);
            assert_eq!(again.collection, finding.collection);
            assert!(matches!(
                again.rule,
                RuleId::LoopPrefersForForArray | RuleId::LoopPrefersForForList
            ));
        }
    }
}
