//! Loop classification
//!
//! One decision procedure covers all four rules. Each loop is judged on its
//! own: there is no state across loops and nothing here can fail. Shapes the
//! classifier cannot interpret simply produce no finding.

use crate::diagnostic::Severity;
use crate::resolver::{CollectionKind, Symbol, TypeResolver};
use crate::rule::RuleId;
use crate::syntax::{walk_expr, Expr, LoopKind, LoopForm, LoopNode, NodeId, Span, Visitor};
use serde::Serialize;

/// Advisory result for one flagged loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Finding {
    pub rule: RuleId,
    pub severity: Severity,
    /// Span of the loop keyword
    pub location: Span,
    pub loop_id: NodeId,
    /// Always the opposite of the flagged loop's form
    pub recommended: LoopForm,
    /// Collection kind observed for the iterated expression
    pub collection: CollectionKind,
}

impl Finding {
    fn new(rule: RuleId, node: &LoopNode, collection: CollectionKind) -> Self {
        Self {
            rule,
            severity: rule.default_severity(),
            location: node.keyword,
            loop_id: node.id,
            recommended: rule.recommended(),
            collection,
        }
    }

    pub fn message(&self) -> String {
        self.rule.message()
    }
}

/// Classify a single loop
pub fn classify(node: &LoopNode, resolver: &dyn TypeResolver) -> Option<Finding> {
    match &node.kind {
        LoopKind::IndexedFor { .. } => classify_indexed_for(node, resolver),
        LoopKind::ElementForeach { source, .. } => {
            let collection = resolver.resolve(source);
            let rule = RuleId::for_case(LoopForm::ElementForeach, collection)?;
            Some(Finding::new(rule, node, collection))
        }
    }
}

fn classify_indexed_for(node: &LoopNode, resolver: &dyn TypeResolver) -> Option<Finding> {
    let (collection_expr, _) = node.sized_collection()?;
    let collection = resolver.resolve(collection_expr);

    match collection {
        CollectionKind::Array => {}
        CollectionKind::List => {
            let Some(symbol) = resolver.symbol(collection_expr) else {
                log::trace!("loop {}: list symbol unresolved, skipped", node.id);
                return None;
            };
            if writes_back(node, &symbol, resolver) {
                log::trace!("loop {}: writes back into '{}'", node.id, symbol.0);
                return None;
            }
        }
        CollectionKind::Other => return None,
    }

    let rule = RuleId::for_case(LoopForm::IndexedFor, collection)?;
    Some(Finding::new(rule, node, collection))
}

/// Whether the body stores into an element of `symbol`
///
/// Element writes whose collection cannot be resolved to a symbol count as
/// writes back, so ambiguous bodies are not flagged.
fn writes_back(node: &LoopNode, symbol: &Symbol, resolver: &dyn TypeResolver) -> bool {
    let mut scan = ElementWriteScan {
        symbol,
        resolver,
        found: false,
    };
    scan.visit_stmt(&node.body);
    scan.found
}

struct ElementWriteScan<'a> {
    symbol: &'a Symbol,
    resolver: &'a dyn TypeResolver,
    found: bool,
}

impl ElementWriteScan<'_> {
    fn check_target(&mut self, target: &Expr) {
        if let Expr::ElementAccess { target: collection, .. } = target {
            match self.resolver.symbol(collection) {
                Some(written) if written != *self.symbol => {}
                _ => self.found = true,
            }
        }
    }
}

impl<'ast> Visitor<'ast> for ElementWriteScan<'_> {
    fn visit_expr(&mut self, expr: &'ast Expr) {
        if self.found {
            return;
        }
        match expr {
            Expr::Assignment { target, .. } => self.check_target(target),
            Expr::Unary { op, operand } if op.is_mutation() => self.check_target(operand),
            _ => {}
        }
        walk_expr(self, expr);
    }
}
