//! C#-style rendering of syntax nodes
//!
//! Used to show replacement loops in diagnostics and fix previews. Output is
//! stable so tests can compare rendered text directly.

use super::{Expr, LoopKind, LoopNode, Stmt, UnaryOp};

const INDENT: &str = "    ";

/// Precedence of postfix, primary and access expressions
const PRIMARY: u8 = 8;
const PREFIX: u8 = 7;

fn precedence(expr: &Expr) -> u8 {
    match expr {
        Expr::Assignment { .. } => 0,
        Expr::Binary { op, .. } => op.precedence(),
        Expr::Unary { op, .. } => match op {
            UnaryOp::PostIncrement | UnaryOp::PostDecrement => PRIMARY,
            _ => PREFIX,
        },
        _ => PRIMARY,
    }
}

pub(super) fn expr_to_string(expr: &Expr) -> String {
    let mut out = String::new();
    write_expr(&mut out, expr);
    out
}

fn write_operand(out: &mut String, expr: &Expr, min_precedence: u8) {
    if precedence(expr) < min_precedence {
        out.push('(');
        write_expr(out, expr);
        out.push(')');
    } else {
        write_expr(out, expr);
    }
}

fn write_expr(out: &mut String, expr: &Expr) {
    match expr {
        Expr::Identifier { name } => out.push_str(name),
        Expr::Literal { value } => out.push_str(value),
        Expr::MemberAccess { target, member } => {
            write_operand(out, target, PRIMARY);
            out.push('.');
            out.push_str(member);
        }
        Expr::ElementAccess { target, index } => {
            write_operand(out, target, PRIMARY);
            out.push('[');
            write_expr(out, index);
            out.push(']');
        }
        Expr::Call { callee, args } => {
            write_operand(out, callee, PRIMARY);
            out.push('(');
            for (i, arg) in args.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_expr(out, arg);
            }
            out.push(')');
        }
        Expr::Binary { op, left, right } => {
            let own = op.precedence();
            write_operand(out, left, own);
            out.push(' ');
            out.push_str(op.as_str());
            out.push(' ');
            // Left-associative: an equal-precedence right operand needs parens
            write_operand(out, right, own + 1);
        }
        Expr::Unary { op, operand } => match op {
            UnaryOp::PostIncrement | UnaryOp::PostDecrement => {
                write_operand(out, operand, PRIMARY);
                out.push_str(if *op == UnaryOp::PostIncrement {
                    "++"
                } else {
                    "--"
                });
            }
            UnaryOp::PreIncrement | UnaryOp::PreDecrement | UnaryOp::Negate | UnaryOp::Not => {
                out.push_str(match op {
                    UnaryOp::PreIncrement => "++",
                    UnaryOp::PreDecrement => "--",
                    UnaryOp::Negate => "-",
                    _ => "!",
                });
                write_operand(out, operand, PREFIX);
            }
        },
        Expr::Assignment { op, target, value } => {
            write_expr(out, target);
            out.push(' ');
            out.push_str(op.as_str());
            out.push(' ');
            write_expr(out, value);
        }
    }
}

pub(super) fn loop_header(node: &LoopNode) -> String {
    let mut out = String::new();
    match &node.kind {
        LoopKind::IndexedFor {
            index,
            condition,
            increment,
        } => {
            out.push_str("for (");
            if let Some(ty) = &index.ty {
                out.push_str(ty);
                out.push(' ');
            }
            if index.ty.is_some() || index.init.is_some() {
                out.push_str(&index.name);
            }
            if let Some(init) = &index.init {
                out.push_str(" = ");
                write_expr(&mut out, init);
            }
            out.push(';');
            if let Some(condition) = condition {
                out.push(' ');
                write_expr(&mut out, condition);
            }
            out.push(';');
            for (i, expr) in increment.iter().enumerate() {
                out.push_str(if i == 0 { " " } else { ", " });
                write_expr(&mut out, expr);
            }
            out.push(')');
        }
        LoopKind::ElementForeach {
            element_type,
            element,
            source,
        } => {
            out.push_str("foreach (");
            out.push_str(element_type.as_deref().unwrap_or("var"));
            out.push(' ');
            out.push_str(element);
            out.push_str(" in ");
            write_expr(&mut out, source);
            out.push(')');
        }
    }
    out
}

pub(super) fn stmt_to_string(stmt: &Stmt) -> String {
    let mut printer = Printer::default();
    printer.stmt(stmt);
    printer.out
}

pub(super) fn loop_to_string(node: &LoopNode) -> String {
    let mut printer = Printer::default();
    printer.loop_node(node);
    printer.out
}

#[derive(Default)]
struct Printer {
    out: String,
    indent: usize,
}

impl Printer {
    fn newline(&mut self) {
        self.out.push('\n');
        for _ in 0..self.indent {
            self.out.push_str(INDENT);
        }
    }

    fn stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Block { statements } => self.block(statements),
            Stmt::Expression { expr } => {
                write_expr(&mut self.out, expr);
                self.out.push(';');
            }
            Stmt::Local { ty, name, init } => {
                self.out.push_str(ty.as_deref().unwrap_or("var"));
                self.out.push(' ');
                self.out.push_str(name);
                if let Some(init) = init {
                    self.out.push_str(" = ");
                    write_expr(&mut self.out, init);
                }
                self.out.push(';');
            }
            Stmt::If {
                condition,
                then_branch,
                else_branch,
            } => {
                self.out.push_str("if (");
                write_expr(&mut self.out, condition);
                self.out.push(')');
                self.body(then_branch);
                if let Some(else_branch) = else_branch {
                    if matches!(**then_branch, Stmt::Block { .. }) {
                        self.out.push_str(" else");
                    } else {
                        self.newline();
                        self.out.push_str("else");
                    }
                    self.body(else_branch);
                }
            }
            Stmt::While { condition, body } => {
                self.out.push_str("while (");
                write_expr(&mut self.out, condition);
                self.out.push(')');
                self.body(body);
            }
            Stmt::Return { value } => {
                self.out.push_str("return");
                if let Some(value) = value {
                    self.out.push(' ');
                    write_expr(&mut self.out, value);
                }
                self.out.push(';');
            }
            Stmt::Break => self.out.push_str("break;"),
            Stmt::Continue => self.out.push_str("continue;"),
            Stmt::Loop(node) => self.loop_node(node),
        }
    }

    fn loop_node(&mut self, node: &LoopNode) {
        self.out.push_str(&loop_header(node));
        self.body(&node.body);
    }

    /// Body attached to a header: blocks stay on the header line
    fn body(&mut self, stmt: &Stmt) {
        if let Stmt::Block { statements } = stmt {
            self.out.push(' ');
            self.block(statements);
        } else {
            self.indent += 1;
            self.newline();
            self.stmt(stmt);
            self.indent -= 1;
        }
    }

    fn block(&mut self, statements: &[Stmt]) {
        if statements.is_empty() {
            self.out.push_str("{ }");
            return;
        }
        self.out.push('{');
        self.indent += 1;
        for stmt in statements {
            self.newline();
            self.stmt(stmt);
        }
        self.indent -= 1;
        self.newline();
        self.out.push('}');
    }
}
