//! Thread duplication
//!
//! Lazy sequentialization runs every thread instance as its own function, so
//! each `pthread_create` call site must refer to a private copy of the start
//! routine. A function spawned `k` times becomes `k` renamed copies
//! `f_0 .. f_{k-1}`; the original definition survives only if it is also
//! referenced outside thread creation. With a thread bound in force, join
//! sites past the bound are rewritten to a no-op call.

use crate::ast::{Expr, Function, Program, Stmt, StmtKind};
use crate::error::EncodeError;
use crate::symtab::SymbolQuery;
use lazyseq_core::{idents, ThreadMap};
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

/// Outcome of the duplication pass
#[derive(Debug)]
pub struct DuplicationResult {
    pub program: Program,
    pub threads: ThreadMap,
}

/// The duplication pass
pub struct Duplicator<'a> {
    sym: &'a dyn SymbolQuery,
    /// Maximum thread creations, 0 = unbounded
    max_threads: u32,
}

impl<'a> Duplicator<'a> {
    pub fn new(sym: &'a dyn SymbolQuery, max_threads: u32) -> Self {
        Self { sym, max_threads }
    }

    /// Duplicate spawned functions and bind every creation site to its copy.
    pub fn run(&self, program: Program) -> Result<DuplicationResult, EncodeError> {
        let existing: HashSet<String> =
            program.functions.iter().map(|f| f.name.clone()).collect();

        let mut functions: Vec<Function> = Vec::with_capacity(program.functions.len());

        for function in program.functions {
            let creations = self.sym.creation_count(&function.name);
            if creations == 0 {
                functions.push(function);
                continue;
            }

            for copy_index in 0..creations {
                let copy_name = format!("{}_{}", function.name, copy_index);
                if existing.contains(&copy_name) {
                    return Err(EncodeError::NameCollision { name: copy_name });
                }
                functions.push(rename_function(&function, &copy_name));
            }

            // The unrenamed original survives only when something other than
            // thread creation still refers to it.
            if self.sym.occurrence_count(&function.name) > creations {
                warn!(
                    "function {} is both spawned and referenced directly, keeping original",
                    function.name
                );
                functions.push(function);
            } else {
                debug!("dropping fully duplicated function {}", function.name);
            }
        }

        let mut program = Program {
            globals: program.globals,
            functions,
        };

        // Bind creation sites to copies in program order; thread indices
        // follow the same order, main being implicitly index 0.
        let mut binder = SiteBinder {
            threads: ThreadMap::new(),
            next_copy: HashMap::new(),
            max_threads: self.max_threads,
            joins: 0,
        };

        for function in &mut program.functions {
            binder.bind_body(&mut function.body)?;
        }

        Ok(DuplicationResult {
            program,
            threads: binder.threads,
        })
    }
}

/// Clone `function` under `copy_name`, renaming internal self-references.
fn rename_function(function: &Function, copy_name: &str) -> Function {
    let mut copy = function.clone();
    let original = function.name.clone();
    copy.name = copy_name.to_string();
    rename_in_body(&mut copy.body, &original, copy_name);
    copy
}

fn rename_in_body(body: &mut [Stmt], from: &str, to: &str) {
    for stmt in body {
        match &mut stmt.kind {
            StmtKind::Expr(expr) => expr.rename_ident(from, to),
            StmtKind::Decl { init: Some(init), .. } => init.rename_ident(from, to),
            StmtKind::If {
                cond,
                then_branch,
                else_branch,
                ..
            } => {
                cond.rename_ident(from, to);
                rename_in_body(then_branch, from, to);
                rename_in_body(else_branch, from, to);
            }
            StmtKind::Return(Some(expr)) => expr.rename_ident(from, to),
            StmtKind::Labeled { stmt, .. } => {
                rename_in_body(std::slice::from_mut(stmt), from, to);
            }
            _ => {}
        }
    }
}

/// Walks every body once, rewriting creation and join sites.
struct SiteBinder {
    threads: ThreadMap,
    next_copy: HashMap<String, u32>,
    /// Maximum thread creations, 0 = unbounded
    max_threads: u32,
    /// Joins seen so far; at most `max_threads` are kept
    joins: u32,
}

impl SiteBinder {
    fn bind_body(&mut self, body: &mut [Stmt]) -> Result<(), EncodeError> {
        for stmt in body {
            match &mut stmt.kind {
                StmtKind::Expr(expr) => self.bind_expr(expr, stmt.line)?,
                StmtKind::If {
                    then_branch,
                    else_branch,
                    ..
                } => {
                    self.bind_body(then_branch)?;
                    self.bind_body(else_branch)?;
                }
                StmtKind::Labeled { stmt: inner, .. } => {
                    self.bind_body(std::slice::from_mut(inner))?;
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn bind_expr(&mut self, expr: &mut Expr, line: u32) -> Result<(), EncodeError> {
        if let Expr::Call { callee, args } = expr {
            if callee == "pthread_create" && args.len() >= 3 {
                let original = match start_routine_name(&args[2]) {
                    Some(name) => name,
                    None => return Ok(()),
                };

                let copy_index = self.next_copy.entry(original.clone()).or_insert(0);
                let copy_name = format!("{original}_{copy_index}");
                *copy_index += 1;

                let snippet = Expr::call("pthread_create", args.clone()).render();
                let thread_index = self.threads.register(copy_name.clone(), original.clone());
                if self.max_threads > 0 && thread_index > self.max_threads {
                    return Err(EncodeError::ThreadBoundExceeded {
                        max: self.max_threads,
                        coord: lazyseq_core::Coord::line(line),
                        snippet,
                    });
                }

                args[2].rename_ident(&original, &copy_name);
            } else if callee == "pthread_join" {
                if self.max_threads > 0 && self.joins >= self.max_threads {
                    warn!("join at line {line} exceeds the thread bound, rewritten to a no-op");
                    *callee = idents::NOOP.to_string();
                } else {
                    self.joins += 1;
                }
            }
        }
        Ok(())
    }
}

/// Extract the spawned function's name from the third `pthread_create`
/// argument, looking through an address-of.
fn start_routine_name(arg: &Expr) -> Option<String> {
    match arg {
        Expr::Id(name) => Some(name.clone()),
        Expr::Unary { op, expr } if op == "&" => start_routine_name(expr),
        _ => None,
    }
}
