//! Syntax model for already-parsed loop trees
//!
//! Trees are produced by an external parser and handed to the linter as
//! plain data. Every node type is a closed enum, so adding a new statement
//! or expression shape is a compile-time checked change across the
//! classifier, the rewriter and the printer.

mod print;
mod visit;

pub use visit::{
    walk_expr, walk_expr_mut, walk_loop, walk_loop_mut, walk_stmt, walk_stmt_mut, Visitor,
    VisitorMut,
};

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Size properties recognized as the upper bound of an indexed loop
pub const SIZE_PROPERTIES: &[&str] = &["Length", "Count"];

/// Stable identifier of a loop node within one document
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct NodeId(pub u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Source range of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Span {
    /// Byte offset of the first character
    pub start: usize,
    /// Byte offset one past the last character
    pub end: usize,
    /// Line number (1-based, 0 = unknown)
    pub line: usize,
    /// Column number (1-based, 0 = unknown)
    pub column: usize,
}

impl Span {
    pub fn new(start: usize, end: usize, line: usize, column: usize) -> Self {
        Self {
            start,
            end,
            line,
            column,
        }
    }

    /// Length of the range in bytes
    pub fn length(&self) -> usize {
        self.end.saturating_sub(self.start)
    }
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOp {
    #[serde(rename = "+")]
    Add,
    #[serde(rename = "-")]
    Sub,
    #[serde(rename = "*")]
    Mul,
    #[serde(rename = "/")]
    Div,
    #[serde(rename = "%")]
    Rem,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = "&&")]
    And,
    #[serde(rename = "||")]
    Or,
}

impl BinaryOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
        }
    }

    /// Binding strength, higher binds tighter
    pub fn precedence(&self) -> u8 {
        match self {
            BinaryOp::Or => 1,
            BinaryOp::And => 2,
            BinaryOp::Eq | BinaryOp::Ne => 3,
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => 4,
            BinaryOp::Add | BinaryOp::Sub => 5,
            BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => 6,
        }
    }
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnaryOp {
    PreIncrement,
    PreDecrement,
    PostIncrement,
    PostDecrement,
    Negate,
    Not,
}

impl UnaryOp {
    /// Whether the operator writes back to its operand
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            UnaryOp::PreIncrement
                | UnaryOp::PreDecrement
                | UnaryOp::PostIncrement
                | UnaryOp::PostDecrement
        )
    }
}

/// Assignment operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AssignOp {
    #[default]
    #[serde(rename = "=")]
    Assign,
    #[serde(rename = "+=")]
    AddAssign,
    #[serde(rename = "-=")]
    SubAssign,
    #[serde(rename = "*=")]
    MulAssign,
    #[serde(rename = "/=")]
    DivAssign,
}

impl AssignOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssignOp::Assign => "=",
            AssignOp::AddAssign => "+=",
            AssignOp::SubAssign => "-=",
            AssignOp::MulAssign => "*=",
            AssignOp::DivAssign => "/=",
        }
    }
}

/// Expression node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "node", rename_all = "snake_case")]
pub enum Expr {
    Identifier {
        name: String,
    },
    Literal {
        value: String,
    },
    MemberAccess {
        target: Box<Expr>,
        member: String,
    },
    ElementAccess {
        target: Box<Expr>,
        index: Box<Expr>,
    },
    Call {
        callee: Box<Expr>,
        #[serde(default)]
        args: Vec<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Assignment {
        #[serde(default)]
        op: AssignOp,
        target: Box<Expr>,
        value: Box<Expr>,
    },
}

impl Expr {
    pub fn ident(name: &str) -> Self {
        Expr::Identifier {
            name: name.to_string(),
        }
    }

    pub fn literal(value: &str) -> Self {
        Expr::Literal {
            value: value.to_string(),
        }
    }

    pub fn member(target: Expr, member: &str) -> Self {
        Expr::MemberAccess {
            target: Box::new(target),
            member: member.to_string(),
        }
    }

    pub fn element(target: Expr, index: Expr) -> Self {
        Expr::ElementAccess {
            target: Box::new(target),
            index: Box::new(index),
        }
    }

    pub fn call(callee: Expr, args: Vec<Expr>) -> Self {
        Expr::Call {
            callee: Box::new(callee),
            args,
        }
    }

    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Self {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn unary(op: UnaryOp, operand: Expr) -> Self {
        Expr::Unary {
            op,
            operand: Box::new(operand),
        }
    }

    pub fn assign(op: AssignOp, target: Expr, value: Expr) -> Self {
        Expr::Assignment {
            op,
            target: Box::new(target),
            value: Box::new(value),
        }
    }

    /// Name of a bare identifier expression
    pub fn as_identifier(&self) -> Option<&str> {
        match self {
            Expr::Identifier { name } => Some(name),
            _ => None,
        }
    }

    /// Check whether this expression is the identifier `name`
    pub fn is_identifier(&self, name: &str) -> bool {
        self.as_identifier() == Some(name)
    }

    /// Check whether evaluating this expression may call into user code
    pub fn contains_call(&self) -> bool {
        struct CallFinder(bool);
        impl<'ast> Visitor<'ast> for CallFinder {
            fn visit_expr(&mut self, expr: &'ast Expr) {
                if matches!(expr, Expr::Call { .. }) {
                    self.0 = true;
                } else {
                    walk_expr(self, expr);
                }
            }
        }

        let mut finder = CallFinder(false);
        finder.visit_expr(self);
        finder.0
    }
}

/// Statement node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "node", rename_all = "snake_case")]
pub enum Stmt {
    Block {
        #[serde(default)]
        statements: Vec<Stmt>,
    },
    Expression {
        expr: Expr,
    },
    Local {
        #[serde(default)]
        ty: Option<String>,
        name: String,
        #[serde(default)]
        init: Option<Expr>,
    },
    If {
        condition: Expr,
        then_branch: Box<Stmt>,
        #[serde(default)]
        else_branch: Option<Box<Stmt>>,
    },
    While {
        condition: Expr,
        body: Box<Stmt>,
    },
    Return {
        #[serde(default)]
        value: Option<Expr>,
    },
    Break,
    Continue,
    Loop(Box<LoopNode>),
}

impl Stmt {
    pub fn block(statements: Vec<Stmt>) -> Self {
        Stmt::Block { statements }
    }

    pub fn expr(expr: Expr) -> Self {
        Stmt::Expression { expr }
    }

    /// Every identifier name referenced or declared in this statement
    pub fn identifiers(&self) -> HashSet<String> {
        let mut collector = IdentifierCollector::default();
        collector.visit_stmt(self);
        collector.names
    }

    /// Check whether a loop appears anywhere inside this statement
    pub fn contains_loop(&self) -> bool {
        struct LoopFinder(bool);
        impl<'ast> Visitor<'ast> for LoopFinder {
            fn visit_loop(&mut self, _node: &'ast LoopNode) {
                self.0 = true;
            }
        }

        let mut finder = LoopFinder(false);
        finder.visit_stmt(self);
        finder.0
    }
}

#[derive(Default)]
struct IdentifierCollector {
    names: HashSet<String>,
}

impl<'ast> Visitor<'ast> for IdentifierCollector {
    fn visit_stmt(&mut self, stmt: &'ast Stmt) {
        if let Stmt::Local { name, .. } = stmt {
            self.names.insert(name.clone());
        }
        walk_stmt(self, stmt);
    }

    fn visit_loop(&mut self, node: &'ast LoopNode) {
        match &node.kind {
            LoopKind::IndexedFor { index, .. } => {
                self.names.insert(index.name.clone());
            }
            LoopKind::ElementForeach { element, .. } => {
                self.names.insert(element.clone());
            }
        }
        walk_loop(self, node);
    }

    fn visit_expr(&mut self, expr: &'ast Expr) {
        if let Expr::Identifier { name } = expr {
            self.names.insert(name.clone());
        }
        walk_expr(self, expr);
    }
}

/// Declaration of an indexed loop's counter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Declarator {
    /// Declared type, absent for `for (i = 0; ...)`
    #[serde(default)]
    pub ty: Option<String>,
    pub name: String,
    #[serde(default)]
    pub init: Option<Expr>,
}

/// The two loop forms the linter reasons about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopForm {
    IndexedFor,
    ElementForeach,
}

impl LoopForm {
    /// The form a flagged loop of this form is converted into
    pub fn opposite(&self) -> Self {
        match self {
            LoopForm::IndexedFor => LoopForm::ElementForeach,
            LoopForm::ElementForeach => LoopForm::IndexedFor,
        }
    }

    /// Keyword used in messages
    pub fn keyword(&self) -> &'static str {
        match self {
            LoopForm::IndexedFor => "for",
            LoopForm::ElementForeach => "foreach",
        }
    }
}

impl fmt::Display for LoopForm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

/// Header fields of a loop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "form", rename_all = "snake_case")]
pub enum LoopKind {
    IndexedFor {
        index: Declarator,
        #[serde(default)]
        condition: Option<Expr>,
        #[serde(default)]
        increment: Vec<Expr>,
    },
    ElementForeach {
        #[serde(default)]
        element_type: Option<String>,
        element: String,
        source: Expr,
    },
}

/// A single iteration construct
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoopNode {
    #[serde(default)]
    pub id: NodeId,
    /// Range of the whole statement
    #[serde(default)]
    pub span: Span,
    /// Range of the `for` / `foreach` keyword
    #[serde(default)]
    pub keyword: Span,
    pub kind: LoopKind,
    pub body: Box<Stmt>,
}

impl LoopNode {
    pub fn new(kind: LoopKind, body: Stmt) -> Self {
        Self {
            id: NodeId::default(),
            span: Span::default(),
            keyword: Span::default(),
            kind,
            body: Box::new(body),
        }
    }

    /// Build `for (<ty> <index> = 0; <index> < <bound>; <index>++) <body>`
    pub fn indexed_for(ty: Option<&str>, index: &str, bound: Expr, body: Stmt) -> Self {
        Self::new(
            LoopKind::IndexedFor {
                index: Declarator {
                    ty: ty.map(String::from),
                    name: index.to_string(),
                    init: Some(Expr::literal("0")),
                },
                condition: Some(Expr::binary(BinaryOp::Lt, Expr::ident(index), bound)),
                increment: vec![Expr::unary(UnaryOp::PostIncrement, Expr::ident(index))],
            },
            body,
        )
    }

    /// Build `foreach (<ty> <element> in <source>) <body>`
    pub fn foreach(ty: Option<&str>, element: &str, source: Expr, body: Stmt) -> Self {
        Self::new(
            LoopKind::ElementForeach {
                element_type: ty.map(String::from),
                element: element.to_string(),
                source,
            },
            body,
        )
    }

    pub fn with_id(mut self, id: NodeId) -> Self {
        self.id = id;
        self
    }

    pub fn with_span(mut self, span: Span, keyword: Span) -> Self {
        self.span = span;
        self.keyword = keyword;
        self
    }

    pub fn form(&self) -> LoopForm {
        match self.kind {
            LoopKind::IndexedFor { .. } => LoopForm::IndexedFor,
            LoopKind::ElementForeach { .. } => LoopForm::ElementForeach,
        }
    }

    /// Upper bound of the canonical `index < bound` test
    pub fn bound_expression(&self) -> Option<&Expr> {
        let LoopKind::IndexedFor {
            index,
            condition: Some(condition),
            ..
        } = &self.kind
        else {
            return None;
        };

        match condition {
            Expr::Binary {
                op: BinaryOp::Lt,
                left,
                right,
            } if left.is_identifier(&index.name) => Some(right),
            _ => None,
        }
    }

    /// The collection whose size bounds this loop, for `i < xs.Length`
    /// shaped loops
    ///
    /// Returns the identifier expression (`xs`) and the size property.
    pub fn sized_collection(&self) -> Option<(&Expr, &str)> {
        match self.bound_expression()? {
            Expr::MemberAccess { target, member }
                if matches!(**target, Expr::Identifier { .. })
                    && SIZE_PROPERTIES.contains(&member.as_str()) =>
            {
                Some((&**target, member.as_str()))
            }
            _ => None,
        }
    }

    /// Header text without the body, e.g. `foreach (var x in xs)`
    pub fn header(&self) -> String {
        print::loop_header(self)
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&print::expr_to_string(self))
    }
}

impl fmt::Display for Stmt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&print::stmt_to_string(self))
    }
}

impl fmt::Display for LoopNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&print::loop_to_string(self))
    }
}
