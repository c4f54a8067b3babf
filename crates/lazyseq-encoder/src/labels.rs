//! Statement visibility and label bookkeeping
//!
//! A statement is visible when a context switch may happen immediately
//! before it. Visibility is decided conservatively: whenever the analysis
//! cannot prove a statement touches no shared state, it gets a label.

use crate::ast::{Expr, Stmt, StmtKind};
use crate::symtab::SymbolQuery;
use serde::{Deserialize, Serialize};

/// Calls that are always context-switch points.
const VISIBLE_CALLS: &[&str] = &[
    "pthread_create",
    "pthread_join",
    "pthread_mutex_lock",
    "pthread_mutex_unlock",
    "pthread_mutex_destroy",
    "pthread_cond_wait_2",
];

/// What a labeled statement does, recorded for the decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LabelKind {
    Plain,
    BranchCond,
    LoopCond,
    Lock,
    Unlock,
    MutexDestroy,
    Create,
    Join,
    CondWait,
    CondSignal,
    Message,
    Exit,
}

/// One assigned label
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelRecord {
    /// 0-based, contiguous per thread
    pub index: u32,
    /// Input line of the labeled statement
    pub line: u32,
    pub kind: LabelKind,
}

/// Kind of the statement at a label, from its callee when it is a call.
#[must_use]
pub fn label_kind(stmt: &Stmt) -> LabelKind {
    match stmt.as_call() {
        Some(("pthread_mutex_lock", _)) => LabelKind::Lock,
        Some(("pthread_mutex_unlock", _)) => LabelKind::Unlock,
        Some(("pthread_mutex_destroy", _)) => LabelKind::MutexDestroy,
        Some(("pthread_create", _)) => LabelKind::Create,
        Some(("pthread_join", _)) => LabelKind::Join,
        Some(("pthread_cond_wait_2", _)) => LabelKind::CondWait,
        Some(("pthread_cond_signal", _)) | Some(("pthread_cond_broadcast", _)) => {
            LabelKind::CondSignal
        }
        Some(("pthread_exit", _)) => LabelKind::Exit,
        Some((callee, _)) if callee.starts_with("__CSEQ_message") => LabelKind::Message,
        _ => LabelKind::Plain,
    }
}

/// Does the call name force a context-switch point on its own?
#[must_use]
pub fn visible_call(callee: &str) -> bool {
    VISIBLE_CALLS.contains(&callee)
        || (callee.starts_with("__VERIFIER_atomic") && callee != "__VERIFIER_atomic_end")
        || callee.starts_with("__VERIFIER_assume")
}

/// Conservative shared-state check: the statement reads or writes a global,
/// goes through a pointer, or mentions a pointer variable at all.
#[must_use]
pub fn global_access(stmt: &Stmt, scope: &str, sym: &dyn SymbolQuery) -> bool {
    let mut shared = false;
    stmt.visit_own_idents(&mut |name| {
        if sym.is_global(name) || sym.is_pointer(scope, name) {
            shared = true;
        }
    });
    if shared {
        return true;
    }
    match &stmt.kind {
        StmtKind::Expr(expr) => expr.has_deref(),
        StmtKind::Decl {
            init: Some(init), ..
        } => init.has_deref(),
        StmtKind::If { cond, .. } => cond.has_deref(),
        StmtKind::Return(Some(expr)) => expr.has_deref(),
        StmtKind::Labeled { stmt, .. } => global_access(stmt, scope, sym),
        _ => false,
    }
}

/// Whether the call statement opens an atomic section.
#[must_use]
pub fn is_atomic_begin(stmt: &Stmt) -> bool {
    matches!(stmt.as_call(), Some(("__VERIFIER_atomic_begin", _)))
}

/// Whether the call statement closes an atomic section.
#[must_use]
pub fn is_atomic_end(stmt: &Stmt) -> bool {
    matches!(stmt.as_call(), Some(("__VERIFIER_atomic_end", _)))
}

/// Does a bare call statement force visibility, looking through labels?
#[must_use]
pub fn is_visible_call_stmt(stmt: &Stmt) -> bool {
    match stmt.as_call() {
        Some((callee, _)) => visible_call(callee),
        None => false,
    }
}

#[must_use]
pub fn is_pthread_exit(stmt: &Stmt) -> bool {
    matches!(stmt.as_call(), Some(("pthread_exit", _)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symtab::SymbolTable;

    #[test]
    fn test_visible_call_set() {
        assert!(visible_call("pthread_mutex_lock"));
        assert!(visible_call("pthread_cond_wait_2"));
        assert!(!visible_call("pthread_cond_wait_1"));
        assert!(visible_call("__VERIFIER_atomic_begin"));
        assert!(!visible_call("__VERIFIER_atomic_end"));
        assert!(visible_call("__VERIFIER_assume"));
        assert!(!visible_call("printf"));
    }

    #[test]
    fn test_global_access_on_global_write() {
        let mut sym = SymbolTable::new();
        sym.add_global("x");

        let write_global = Stmt::expr(1, Expr::assign(Expr::id("x"), Expr::num(1)));
        let write_local = Stmt::expr(2, Expr::assign(Expr::id("y"), Expr::num(1)));
        assert!(global_access(&write_global, "main", &sym));
        assert!(!global_access(&write_local, "main", &sym));
    }

    #[test]
    fn test_global_access_through_pointer() {
        let mut sym = SymbolTable::new();
        sym.add_pointer("worker", "p");

        let through_named = Stmt::expr(1, Expr::assign(Expr::id("p"), Expr::num(0)));
        assert!(global_access(&through_named, "worker", &sym));
        assert!(!global_access(&through_named, "main", &sym));

        let deref = Stmt::expr(
            2,
            Expr::assign(Expr::unary("*", Expr::id("q")), Expr::num(1)),
        );
        assert!(global_access(&deref, "main", &sym));
    }

    #[test]
    fn test_label_kind_from_callee() {
        let lock = Stmt::call(1, "pthread_mutex_lock", vec![Expr::id("m")]);
        assert_eq!(label_kind(&lock), LabelKind::Lock);
        let exit = Stmt::call(2, "pthread_exit", vec![Expr::num(0)]);
        assert_eq!(label_kind(&exit), LabelKind::Exit);
        let plain = Stmt::expr(3, Expr::assign(Expr::id("x"), Expr::num(1)));
        assert_eq!(label_kind(&plain), LabelKind::Plain);
    }
}
