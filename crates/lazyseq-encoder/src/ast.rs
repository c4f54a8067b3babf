//! Flattened-program representation
//!
//! The encoder receives programs that have already been parsed, inlined and
//! unrolled upstream, so the node set is deliberately small: expressions,
//! straight-line statements, `if` (loops survive unrolling only as a guarded
//! residue marked `loop_head`), `goto`, and user labels. Every statement
//! carries the input line that produced it.

use serde::{Deserialize, Serialize};

/// Expression of the flattened input
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    /// Identifier
    Id(String),
    /// Integer literal
    Num(i64),
    /// String literal (kept verbatim, quotes excluded)
    Str(String),
    /// Prefix unary operator
    Unary { op: String, expr: Box<Expr> },
    /// Binary operator
    Binary {
        op: String,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    /// Assignment
    Assign { lhs: Box<Expr>, rhs: Box<Expr> },
    /// Call to a named function
    Call { callee: String, args: Vec<Expr> },
    /// Array subscript
    Index { base: Box<Expr>, index: Box<Expr> },
}

impl Expr {
    pub fn id(name: impl Into<String>) -> Self {
        Expr::Id(name.into())
    }

    pub fn num(value: i64) -> Self {
        Expr::Num(value)
    }

    pub fn unary(op: impl Into<String>, expr: Expr) -> Self {
        Expr::Unary {
            op: op.into(),
            expr: Box::new(expr),
        }
    }

    pub fn binary(op: impl Into<String>, lhs: Expr, rhs: Expr) -> Self {
        Expr::Binary {
            op: op.into(),
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    pub fn assign(lhs: Expr, rhs: Expr) -> Self {
        Expr::Assign {
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    pub fn call(callee: impl Into<String>, args: Vec<Expr>) -> Self {
        Expr::Call {
            callee: callee.into(),
            args,
        }
    }

    pub fn index(base: Expr, index: Expr) -> Self {
        Expr::Index {
            base: Box::new(base),
            index: Box::new(index),
        }
    }

    /// Render as C source text
    #[must_use]
    pub fn render(&self) -> String {
        match self {
            Expr::Id(name) => name.clone(),
            Expr::Num(value) => value.to_string(),
            Expr::Str(text) => format!("\"{text}\""),
            Expr::Unary { op, expr } => format!("{op}{}", parenthesized(expr)),
            Expr::Binary { op, lhs, rhs } => {
                format!("{} {op} {}", parenthesized(lhs), parenthesized(rhs))
            }
            Expr::Assign { lhs, rhs } => format!("{} = {}", lhs.render(), rhs.render()),
            Expr::Call { callee, args } => {
                let args: Vec<String> = args.iter().map(Expr::render).collect();
                format!("{callee}({})", args.join(", "))
            }
            Expr::Index { base, index } => {
                format!("{}[{}]", parenthesized(base), index.render())
            }
        }
    }

    /// Visit every identifier in the expression, callees included.
    pub fn visit_idents(&self, f: &mut dyn FnMut(&str)) {
        match self {
            Expr::Id(name) => f(name),
            Expr::Num(_) | Expr::Str(_) => {}
            Expr::Unary { expr, .. } => expr.visit_idents(f),
            Expr::Binary { lhs, rhs, .. } => {
                lhs.visit_idents(f);
                rhs.visit_idents(f);
            }
            Expr::Assign { lhs, rhs } => {
                lhs.visit_idents(f);
                rhs.visit_idents(f);
            }
            Expr::Call { callee, args } => {
                f(callee);
                for arg in args {
                    arg.visit_idents(f);
                }
            }
            Expr::Index { base, index } => {
                base.visit_idents(f);
                index.visit_idents(f);
            }
        }
    }

    /// Whether any subexpression dereferences a pointer.
    #[must_use]
    pub fn has_deref(&self) -> bool {
        match self {
            Expr::Id(_) | Expr::Num(_) | Expr::Str(_) => false,
            Expr::Unary { op, expr } => op == "*" || expr.has_deref(),
            Expr::Binary { lhs, rhs, .. } | Expr::Assign { lhs, rhs } => {
                lhs.has_deref() || rhs.has_deref()
            }
            Expr::Call { args, .. } => args.iter().any(Expr::has_deref),
            Expr::Index { base, index } => base.has_deref() || index.has_deref(),
        }
    }

    /// Rename every occurrence of identifier `from` (callees included).
    pub fn rename_ident(&mut self, from: &str, to: &str) {
        match self {
            Expr::Id(name) => {
                if name == from {
                    *name = to.to_string();
                }
            }
            Expr::Num(_) | Expr::Str(_) => {}
            Expr::Unary { expr, .. } => expr.rename_ident(from, to),
            Expr::Binary { lhs, rhs, .. } | Expr::Assign { lhs, rhs } => {
                lhs.rename_ident(from, to);
                rhs.rename_ident(from, to);
            }
            Expr::Call { callee, args } => {
                if callee == from {
                    *callee = to.to_string();
                }
                for arg in args {
                    arg.rename_ident(from, to);
                }
            }
            Expr::Index { base, index } => {
                base.rename_ident(from, to);
                index.rename_ident(from, to);
            }
        }
    }

    /// First call (in evaluation order) whose callee satisfies `pred`.
    #[must_use]
    pub fn find_call(&self, pred: &dyn Fn(&str) -> bool) -> Option<&Expr> {
        match self {
            Expr::Id(_) | Expr::Num(_) | Expr::Str(_) => None,
            Expr::Unary { expr, .. } => expr.find_call(pred),
            Expr::Binary { lhs, rhs, .. } | Expr::Assign { lhs, rhs } => {
                lhs.find_call(pred).or_else(|| rhs.find_call(pred))
            }
            Expr::Call { callee, args } => {
                if pred(callee) {
                    Some(self)
                } else {
                    args.iter().find_map(|arg| arg.find_call(pred))
                }
            }
            Expr::Index { base, index } => {
                base.find_call(pred).or_else(|| index.find_call(pred))
            }
        }
    }

    /// Rename the callee of every call whose current callee satisfies the
    /// mapping (returns the new name).
    pub fn rename_calls(&mut self, f: &mut dyn FnMut(&str) -> Option<String>) {
        match self {
            Expr::Id(_) | Expr::Num(_) | Expr::Str(_) => {}
            Expr::Unary { expr, .. } => expr.rename_calls(f),
            Expr::Binary { lhs, rhs, .. } | Expr::Assign { lhs, rhs } => {
                lhs.rename_calls(f);
                rhs.rename_calls(f);
            }
            Expr::Call { callee, args } => {
                if let Some(new) = f(callee) {
                    *callee = new;
                }
                for arg in args {
                    arg.rename_calls(f);
                }
            }
            Expr::Index { base, index } => {
                base.rename_calls(f);
                index.rename_calls(f);
            }
        }
    }
}

fn parenthesized(expr: &Expr) -> String {
    match expr {
        Expr::Id(_) | Expr::Num(_) | Expr::Str(_) | Expr::Call { .. } | Expr::Index { .. } => {
            expr.render()
        }
        _ => format!("({})", expr.render()),
    }
}

/// Statement of the flattened input
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stmt {
    pub kind: StmtKind,
    /// Input line the statement came from
    pub line: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StmtKind {
    /// Expression statement
    Expr(Expr),
    /// Variable declaration
    Decl {
        ty: String,
        name: String,
        init: Option<Expr>,
    },
    /// Conditional; `loop_head` marks the guard residue of an unrolled loop
    If {
        cond: Expr,
        then_branch: Vec<Stmt>,
        else_branch: Vec<Stmt>,
        loop_head: bool,
    },
    /// Jump to a user label
    Goto(String),
    /// User-labeled statement (unrolling introduces these as goto targets)
    Labeled { label: String, stmt: Box<Stmt> },
    /// Function return
    Return(Option<Expr>),
    /// No-op (left behind by rewrites)
    Nop,
}

impl Stmt {
    pub fn expr(line: u32, expr: Expr) -> Self {
        Self {
            kind: StmtKind::Expr(expr),
            line,
        }
    }

    pub fn call(line: u32, callee: impl Into<String>, args: Vec<Expr>) -> Self {
        Self::expr(line, Expr::call(callee, args))
    }

    pub fn decl(line: u32, ty: impl Into<String>, name: impl Into<String>, init: Option<Expr>) -> Self {
        Self {
            kind: StmtKind::Decl {
                ty: ty.into(),
                name: name.into(),
                init,
            },
            line,
        }
    }

    pub fn goto(line: u32, label: impl Into<String>) -> Self {
        Self {
            kind: StmtKind::Goto(label.into()),
            line,
        }
    }

    pub fn labeled(line: u32, label: impl Into<String>, stmt: Stmt) -> Self {
        Self {
            kind: StmtKind::Labeled {
                label: label.into(),
                stmt: Box::new(stmt),
            },
            line,
        }
    }

    pub fn ret(line: u32, value: Option<Expr>) -> Self {
        Self {
            kind: StmtKind::Return(value),
            line,
        }
    }

    /// The expression statement's call, if this is a plain call statement.
    /// Looks through one user label.
    #[must_use]
    pub fn as_call(&self) -> Option<(&str, &[Expr])> {
        match &self.kind {
            StmtKind::Expr(Expr::Call { callee, args }) => Some((callee.as_str(), args)),
            StmtKind::Labeled { stmt, .. } => stmt.as_call(),
            _ => None,
        }
    }

    /// Visit every identifier occurring in the statement (not recursing
    /// into nested statements).
    pub fn visit_own_idents(&self, f: &mut dyn FnMut(&str)) {
        match &self.kind {
            StmtKind::Expr(expr) => expr.visit_idents(f),
            StmtKind::Decl { init, .. } => {
                if let Some(init) = init {
                    init.visit_idents(f);
                }
            }
            StmtKind::If { cond, .. } => cond.visit_idents(f),
            StmtKind::Return(Some(expr)) => expr.visit_idents(f),
            StmtKind::Labeled { stmt, .. } => stmt.visit_own_idents(f),
            StmtKind::Goto(_) | StmtKind::Return(None) | StmtKind::Nop => {}
        }
    }
}

/// Function definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Function {
    pub name: String,
    pub ret_type: String,
    /// (type, name) pairs
    pub params: Vec<(String, String)>,
    pub body: Vec<Stmt>,
    pub line: u32,
}

impl Function {
    pub fn new(name: impl Into<String>, ret_type: impl Into<String>, line: u32) -> Self {
        Self {
            name: name.into(),
            ret_type: ret_type.into(),
            params: Vec::new(),
            body: Vec::new(),
            line,
        }
    }

    #[must_use]
    pub fn with_body(mut self, body: Vec<Stmt>) -> Self {
        self.body = body;
        self
    }

    #[must_use]
    pub fn with_params(mut self, params: Vec<(String, String)>) -> Self {
        self.params = params;
        self
    }
}

/// A whole flattened program
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Program {
    /// File-scope declarations
    pub globals: Vec<Stmt>,
    pub functions: Vec<Function>,
}

impl Program {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn function(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|f| f.name == name)
    }
}
