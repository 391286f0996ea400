//! Read-only and mutating tree walkers
//!
//! Override the `visit_*` hook for the node you care about and call the
//! matching `walk_*` function to keep descending.

use super::{Expr, LoopKind, LoopNode, Stmt};

/// Read-only visitor over a borrowed tree
pub trait Visitor<'ast> {
    fn visit_stmt(&mut self, stmt: &'ast Stmt) {
        walk_stmt(self, stmt);
    }

    fn visit_expr(&mut self, expr: &'ast Expr) {
        walk_expr(self, expr);
    }

    fn visit_loop(&mut self, node: &'ast LoopNode) {
        walk_loop(self, node);
    }
}

pub fn walk_stmt<'ast, V: Visitor<'ast> + ?Sized>(visitor: &mut V, stmt: &'ast Stmt) {
    match stmt {
        Stmt::Block { statements } => {
            for inner in statements {
                visitor.visit_stmt(inner);
            }
        }
        Stmt::Expression { expr } => visitor.visit_expr(expr),
        Stmt::Local { init, .. } => {
            if let Some(init) = init {
                visitor.visit_expr(init);
            }
        }
        Stmt::If {
            condition,
            then_branch,
            else_branch,
        } => {
            visitor.visit_expr(condition);
            visitor.visit_stmt(then_branch);
            if let Some(else_branch) = else_branch {
                visitor.visit_stmt(else_branch);
            }
        }
        Stmt::While { condition, body } => {
            visitor.visit_expr(condition);
            visitor.visit_stmt(body);
        }
        Stmt::Return { value } => {
            if let Some(value) = value {
                visitor.visit_expr(value);
            }
        }
        Stmt::Break | Stmt::Continue => {}
        Stmt::Loop(node) => visitor.visit_loop(node),
    }
}

pub fn walk_loop<'ast, V: Visitor<'ast> + ?Sized>(visitor: &mut V, node: &'ast LoopNode) {
    match &node.kind {
        LoopKind::IndexedFor {
            index,
            condition,
            increment,
        } => {
            if let Some(init) = &index.init {
                visitor.visit_expr(init);
            }
            if let Some(condition) = condition {
                visitor.visit_expr(condition);
            }
            for expr in increment {
                visitor.visit_expr(expr);
            }
        }
        LoopKind::ElementForeach { source, .. } => visitor.visit_expr(source),
    }
    visitor.visit_stmt(&node.body);
}

pub fn walk_expr<'ast, V: Visitor<'ast> + ?Sized>(visitor: &mut V, expr: &'ast Expr) {
    match expr {
        Expr::Identifier { .. } | Expr::Literal { .. } => {}
        Expr::MemberAccess { target, .. } => visitor.visit_expr(target),
        Expr::ElementAccess { target, index } => {
            visitor.visit_expr(target);
            visitor.visit_expr(index);
        }
        Expr::Call { callee, args } => {
            visitor.visit_expr(callee);
            for arg in args {
                visitor.visit_expr(arg);
            }
        }
        Expr::Binary { left, right, .. } => {
            visitor.visit_expr(left);
            visitor.visit_expr(right);
        }
        Expr::Unary { operand, .. } => visitor.visit_expr(operand),
        Expr::Assignment { target, value, .. } => {
            visitor.visit_expr(target);
            visitor.visit_expr(value);
        }
    }
}

/// Visitor that may rewrite nodes in place
pub trait VisitorMut {
    fn visit_stmt_mut(&mut self, stmt: &mut Stmt) {
        walk_stmt_mut(self, stmt);
    }

    fn visit_expr_mut(&mut self, expr: &mut Expr) {
        walk_expr_mut(self, expr);
    }

    fn visit_loop_mut(&mut self, node: &mut LoopNode) {
        walk_loop_mut(self, node);
    }
}

pub fn walk_stmt_mut<V: VisitorMut + ?Sized>(visitor: &mut V, stmt: &mut Stmt) {
    match stmt {
        Stmt::Block { statements } => {
            for inner in statements {
                visitor.visit_stmt_mut(inner);
            }
        }
        Stmt::Expression { expr } => visitor.visit_expr_mut(expr),
        Stmt::Local { init, .. } => {
            if let Some(init) = init {
                visitor.visit_expr_mut(init);
            }
        }
        Stmt::If {
            condition,
            then_branch,
            else_branch,
        } => {
            visitor.visit_expr_mut(condition);
            visitor.visit_stmt_mut(then_branch);
            if let Some(else_branch) = else_branch {
                visitor.visit_stmt_mut(else_branch);
            }
        }
        Stmt::While { condition, body } => {
            visitor.visit_expr_mut(condition);
            visitor.visit_stmt_mut(body);
        }
        Stmt::Return { value } => {
            if let Some(value) = value {
                visitor.visit_expr_mut(value);
            }
        }
        Stmt::Break | Stmt::Continue => {}
        Stmt::Loop(node) => visitor.visit_loop_mut(node),
    }
}

pub fn walk_loop_mut<V: VisitorMut + ?Sized>(visitor: &mut V, node: &mut LoopNode) {
    match &mut node.kind {
        LoopKind::IndexedFor {
            index,
            condition,
            increment,
        } => {
            if let Some(init) = &mut index.init {
                visitor.visit_expr_mut(init);
            }
            if let Some(condition) = condition {
                visitor.visit_expr_mut(condition);
            }
            for expr in increment {
                visitor.visit_expr_mut(expr);
            }
        }
        LoopKind::ElementForeach { source, .. } => visitor.visit_expr_mut(source),
    }
    visitor.visit_stmt_mut(&mut node.body);
}

pub fn walk_expr_mut<V: VisitorMut + ?Sized>(visitor: &mut V, expr: &mut Expr) {
    match expr {
        Expr::Identifier { .. } | Expr::Literal { .. } => {}
        Expr::MemberAccess { target, .. } => visitor.visit_expr_mut(target),
        Expr::ElementAccess { target, index } => {
            visitor.visit_expr_mut(target);
            visitor.visit_expr_mut(index);
        }
        Expr::Call { callee, args } => {
            visitor.visit_expr_mut(callee);
            for arg in args {
                visitor.visit_expr_mut(arg);
            }
        }
        Expr::Binary { left, right, .. } => {
            visitor.visit_expr_mut(left);
            visitor.visit_expr_mut(right);
        }
        Expr::Unary { operand, .. } => visitor.visit_expr_mut(operand),
        Expr::Assignment { target, value, .. } => {
            visitor.visit_expr_mut(target);
            visitor.visit_expr_mut(value);
        }
    }
}
