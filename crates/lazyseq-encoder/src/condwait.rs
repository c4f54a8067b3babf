//! Condition-wait splitting
//!
//! `pthread_cond_wait(c, m)` blocks and must release the mutex before the
//! scheduler can hand control to the signalling thread. Splitting it into
//! `pthread_cond_wait_1(c, m)` (release and record the wait) and
//! `pthread_cond_wait_2(c, m)` (reacquire after wakeup) lets the encoder
//! place a context-switch boundary between the halves. Barrier waits split
//! the same way.

use crate::ast::{Expr, Stmt, StmtKind};

const SPLITTABLE: &[&str] = &[
    "pthread_cond_wait",
    "pthread_cond_timedwait",
    "pthread_barrier_wait",
];

fn splittable(name: &str) -> bool {
    SPLITTABLE.contains(&name)
}

/// Split every blocking wait in `body` into its two halves, in place.
pub fn split_waits(body: &mut Vec<Stmt>) {
    let mut out: Vec<Stmt> = Vec::with_capacity(body.len());

    for mut stmt in body.drain(..) {
        match &mut stmt.kind {
            // Direct call statement: replace with the two halves inline.
            StmtKind::Expr(Expr::Call { callee, args }) if splittable(callee) => {
                let line = stmt.line;
                out.push(Stmt::call(line, format!("{callee}_1"), args.clone()));
                out.push(Stmt::call(line, format!("{callee}_2"), args.clone()));
            }
            StmtKind::If {
                then_branch,
                else_branch,
                ..
            } => {
                split_waits(then_branch);
                split_waits(else_branch);
                out.push(stmt);
            }
            StmtKind::Labeled { stmt: inner, .. } => {
                // A labeled direct wait keeps its label on the first half.
                if let StmtKind::Expr(Expr::Call { callee, args }) = &inner.kind {
                    if splittable(callee) {
                        let line = inner.line;
                        let second = Stmt::call(line, format!("{callee}_2"), args.clone());
                        let (callee, args) = (callee.clone(), args.clone());
                        **inner = Stmt::call(line, format!("{callee}_1"), args);
                        out.push(stmt);
                        out.push(second);
                        continue;
                    }
                }
                hoist_nested(&mut stmt, &mut out);
            }
            _ => hoist_nested(&mut stmt, &mut out),
        }
    }

    *body = out;
}

/// A wait nested inside a larger expression cannot be split inline; the
/// first half is hoisted immediately before the enclosing statement and the
/// embedded call becomes the second half.
fn hoist_nested(stmt: &mut Stmt, out: &mut Vec<Stmt>) {
    fn embedded_expr(kind: &mut StmtKind) -> Option<&mut Expr> {
        match kind {
            StmtKind::Expr(expr) => Some(expr),
            StmtKind::Decl {
                init: Some(init), ..
            } => Some(init),
            StmtKind::Return(Some(expr)) => Some(expr),
            StmtKind::Labeled { stmt, .. } => embedded_expr(&mut stmt.kind),
            _ => None,
        }
    }

    let expr = embedded_expr(&mut stmt.kind);

    if let Some(expr) = expr {
        if let Some(Expr::Call { callee, args }) = expr.find_call(&splittable) {
            let first = Stmt::call(stmt.line, format!("{callee}_1"), args.clone());
            expr.rename_calls(&mut |name| {
                splittable(name).then(|| format!("{name}_2"))
            });
            out.push(first);
        }
    }

    out.push(stmt.clone());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Expr;

    fn wait_args() -> Vec<Expr> {
        vec![Expr::unary("&", Expr::id("c")), Expr::unary("&", Expr::id("m"))]
    }

    #[test]
    fn test_direct_wait_splits_in_two() {
        let mut body = vec![Stmt::call(5, "pthread_cond_wait", wait_args())];
        split_waits(&mut body);
        assert_eq!(body.len(), 2);
        assert_eq!(body[0].as_call().unwrap().0, "pthread_cond_wait_1");
        assert_eq!(body[1].as_call().unwrap().0, "pthread_cond_wait_2");
        assert_eq!(body[0].line, 5);
        assert_eq!(body[1].line, 5);
    }

    #[test]
    fn test_barrier_wait_splits() {
        let mut body = vec![Stmt::call(3, "pthread_barrier_wait", vec![Expr::id("b")])];
        split_waits(&mut body);
        assert_eq!(body[0].as_call().unwrap().0, "pthread_barrier_wait_1");
        assert_eq!(body[1].as_call().unwrap().0, "pthread_barrier_wait_2");
    }

    #[test]
    fn test_nested_wait_hoists_first_half() {
        // r = pthread_cond_wait(&c, &m);
        let mut body = vec![Stmt::expr(
            7,
            Expr::assign(Expr::id("r"), Expr::call("pthread_cond_wait", wait_args())),
        )];
        split_waits(&mut body);
        assert_eq!(body.len(), 2);
        assert_eq!(body[0].as_call().unwrap().0, "pthread_cond_wait_1");
        match &body[1].kind {
            StmtKind::Expr(expr) => {
                assert!(expr.find_call(&|n| n == "pthread_cond_wait_2").is_some());
                assert!(expr.find_call(&|n| n == "pthread_cond_wait").is_none());
            }
            other => panic!("unexpected statement: {other:?}"),
        }
    }

    #[test]
    fn test_splits_inside_branches() {
        let mut body = vec![Stmt {
            kind: StmtKind::If {
                cond: Expr::id("flag"),
                then_branch: vec![Stmt::call(9, "pthread_cond_wait", wait_args())],
                else_branch: vec![],
                loop_head: false,
            },
            line: 8,
        }];
        split_waits(&mut body);
        match &body[0].kind {
            StmtKind::If { then_branch, .. } => assert_eq!(then_branch.len(), 2),
            other => panic!("unexpected statement: {other:?}"),
        }
    }

    #[test]
    fn test_labeled_wait_keeps_label_on_first_half() {
        let mut body = vec![Stmt::labeled(
            2,
            "l1",
            Stmt::call(2, "pthread_cond_wait", wait_args()),
        )];
        split_waits(&mut body);
        assert_eq!(body.len(), 2);
        match &body[0].kind {
            StmtKind::Labeled { label, stmt } => {
                assert_eq!(label, "l1");
                assert_eq!(stmt.as_call().unwrap().0, "pthread_cond_wait_1");
            }
            other => panic!("unexpected statement: {other:?}"),
        }
        assert_eq!(body[1].as_call().unwrap().0, "pthread_cond_wait_2");
    }

    #[test]
    fn test_unrelated_statements_untouched() {
        let mut body = vec![
            Stmt::expr(1, Expr::assign(Expr::id("x"), Expr::num(1))),
            Stmt::call(2, "pthread_mutex_lock", vec![Expr::id("m")]),
        ];
        let before = body.clone();
        split_waits(&mut body);
        assert_eq!(body, before);
    }
}
