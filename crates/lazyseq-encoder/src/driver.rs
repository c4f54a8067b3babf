//! Driver intermediate representation
//!
//! The synthesized `main` is built as a list of typed statements and
//! rendered by a small pretty-printer, keeping the scheduler logic apart
//! from its textual form.

use lazyseq_core::{idents, RoundRestriction, Schedule, ThreadMap, ThreadMeta};

/// One statement of the driver `main`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverStmt {
    Comment(String),
    /// `unsigned int <name>;`
    Decl { name: String },
    /// `unsigned int <name>[<len>];`
    DeclArray { name: String, len: u32 },
    /// `int <name>;`
    DeclInt { name: String },
    Assign { lhs: String, rhs: String },
    Assume(String),
    /// Call with zero or one argument
    Call { callee: String, arg: Option<String> },
    If { cond: String, body: Vec<DriverStmt> },
    Return(i32),
}

/// The driver `main` as structured statements
#[derive(Debug, Clone, Default)]
pub struct Driver {
    pub stmts: Vec<DriverStmt>,
}

impl Driver {
    /// Render the driver as C source lines.
    #[must_use]
    pub fn render(&self) -> Vec<String> {
        let mut lines = vec!["int main(void) {".to_string()];
        render_into(&self.stmts, 1, &mut lines);
        lines.push("}".to_string());
        lines
    }
}

fn render_into(stmts: &[DriverStmt], depth: usize, lines: &mut Vec<String>) {
    let pad = "   ".repeat(depth);
    for stmt in stmts {
        match stmt {
            DriverStmt::Comment(text) => lines.push(format!("{pad}/* {text} */")),
            DriverStmt::Decl { name } => lines.push(format!("{pad}unsigned int {name};")),
            DriverStmt::DeclArray { name, len } => {
                lines.push(format!("{pad}unsigned int {name}[{len}];"));
            }
            DriverStmt::DeclInt { name } => lines.push(format!("{pad}int {name};")),
            DriverStmt::Assign { lhs, rhs } => lines.push(format!("{pad}{lhs} = {rhs};")),
            DriverStmt::Assume(cond) => {
                lines.push(format!("{pad}__VERIFIER_assume({cond});"));
            }
            DriverStmt::Call { callee, arg } => match arg {
                Some(arg) => lines.push(format!("{pad}{callee}({arg});")),
                None => lines.push(format!("{pad}{callee}();")),
            },
            DriverStmt::If { cond, body } => {
                lines.push(format!("{pad}if ({cond}) {{"));
                render_into(body, depth + 1, lines);
                lines.push(format!("{pad}}}"));
            }
            DriverStmt::Return(value) => lines.push(format!("{pad}return {value};")),
        }
    }
}

fn thread_call(threads: &ThreadMap, t: u32) -> DriverStmt {
    if t == 0 {
        DriverStmt::Call {
            callee: "main_thread".to_string(),
            arg: None,
        }
    } else {
        DriverStmt::Call {
            callee: threads
                .copy_name_of(t)
                .unwrap_or("main_thread")
                .to_string(),
            arg: Some(format!("{}[{t}]", idents::THREAD_ARGS)),
        }
    }
}

/// One round-robin scheduling slot for thread `t` in round `r`.
fn round_slot(
    t: u32,
    round: u32,
    size: u32,
    threads: &ThreadMap,
    monotone: bool,
    deadlock: bool,
) -> Vec<DriverStmt> {
    let tmp = format!("__cs_tmp_t{t}_r{round}");
    let mut body = vec![
        DriverStmt::Assign {
            lhs: idents::THREAD_INDEX.to_string(),
            rhs: t.to_string(),
        },
        DriverStmt::Assign {
            lhs: format!("{}[{t}]", idents::PC_CS),
            rhs: tmp.clone(),
        },
    ];
    if monotone {
        body.push(DriverStmt::Assume(format!(
            "{pcs}[{t}] >= {pc}[{t}]",
            pcs = idents::PC_CS,
            pc = idents::PC
        )));
    }
    body.push(DriverStmt::Assume(format!(
        "{}[{t}] <= {size}",
        idents::PC_CS
    )));
    body.push(thread_call(threads, t));
    body.push(DriverStmt::Assign {
        lhs: format!("{}[{t}]", idents::PC),
        rhs: format!("{}[{t}]", idents::PC_CS),
    });
    if deadlock {
        body.push(DriverStmt::Assign {
            lhs: idents::LAST_THREAD.to_string(),
            rhs: t.to_string(),
        });
    }

    vec![
        DriverStmt::Decl { name: tmp },
        DriverStmt::If {
            cond: format!("{}[{t}]", idents::ACTIVE_THREAD),
            body,
        },
    ]
}

/// Round-robin driver: `rounds` rounds over every eligible thread, then one
/// closing call to main.
#[must_use]
pub fn round_robin_driver(
    schedule: &Schedule,
    threads: &ThreadMap,
    meta: &ThreadMeta,
    deadlock: bool,
) -> Driver {
    let rounds = schedule.round_count();
    let thread_count = threads.count();
    let mut stmts = Vec::new();

    let size = |t: u32| meta.size(t).unwrap_or(0);

    // Round 0: main runs unconditionally and must make progress.
    stmts.push(DriverStmt::Comment("round 0".to_string()));
    stmts.push(DriverStmt::Comment("main".to_string()));
    stmts.push(DriverStmt::Assign {
        lhs: idents::THREAD_INDEX.to_string(),
        rhs: "0".to_string(),
    });
    stmts.push(DriverStmt::Decl {
        name: "__cs_tmp_t0_r0".to_string(),
    });
    stmts.push(DriverStmt::Assign {
        lhs: format!("{}[0]", idents::PC_CS),
        rhs: "__cs_tmp_t0_r0".to_string(),
    });
    stmts.push(DriverStmt::Assume(format!("{}[0] > 0", idents::PC_CS)));
    stmts.push(DriverStmt::Assume(format!(
        "{}[0] <= {}",
        idents::PC_CS,
        size(0)
    )));
    stmts.push(DriverStmt::Call {
        callee: "main_thread".to_string(),
        arg: None,
    });
    stmts.push(DriverStmt::Assign {
        lhs: format!("{}[0]", idents::PC),
        rhs: format!("{}[0]", idents::PC_CS),
    });

    for t in 1..thread_count {
        if schedule.round(0).admits(t) {
            stmts.push(DriverStmt::Comment(
                threads.copy_name_of(t).unwrap_or("?").to_string(),
            ));
            stmts.extend(round_slot(t, 0, size(t), threads, false, deadlock));
        }
    }

    // Remaining rounds: every eligible thread, main included, is gated on
    // its active flag and on counter monotonicity.
    for round in 1..rounds {
        stmts.push(DriverStmt::Comment(format!("round {round}")));
        for t in 0..thread_count {
            if schedule.round(round).admits(t) {
                stmts.push(DriverStmt::Comment(
                    threads.copy_name_of(t).unwrap_or("?").to_string(),
                ));
                stmts.extend(round_slot(t, round, size(t), threads, true, deadlock));
            }
        }
    }

    // Closing call to main.
    stmts.push(DriverStmt::Comment("closing main call".to_string()));
    let tmp = format!("__cs_tmp_t0_r{rounds}");
    stmts.push(DriverStmt::Decl { name: tmp.clone() });
    stmts.push(DriverStmt::If {
        cond: format!("{}[0]", idents::ACTIVE_THREAD),
        body: vec![
            DriverStmt::Assign {
                lhs: idents::THREAD_INDEX.to_string(),
                rhs: "0".to_string(),
            },
            DriverStmt::Assign {
                lhs: format!("{}[0]", idents::PC_CS),
                rhs: tmp,
            },
            DriverStmt::Assume(format!(
                "{pcs}[0] >= {pc}[0]",
                pcs = idents::PC_CS,
                pc = idents::PC
            )),
            DriverStmt::Assume(format!("{}[0] <= {}", idents::PC_CS, size(0))),
            DriverStmt::Call {
                callee: "main_thread".to_string(),
                arg: None,
            },
        ],
    });

    stmts.push(DriverStmt::Return(0));
    Driver { stmts }
}

/// Context-bounded driver: `contexts` resumptions, context 0 hard-wired to
/// main, later contexts selected by the nondeterministic `__cs_tid` array.
#[must_use]
pub fn context_bounded_driver(
    contexts: u32,
    threads: &ThreadMap,
    meta: &ThreadMeta,
    deadlock: bool,
) -> Driver {
    let thread_count = threads.count();
    let mut stmts = vec![
        DriverStmt::DeclArray {
            name: idents::TID.to_string(),
            len: contexts,
        },
        DriverStmt::DeclArray {
            name: idents::CS.to_string(),
            len: contexts,
        },
        DriverStmt::DeclInt {
            name: "k".to_string(),
        },
        DriverStmt::Assign {
            lhs: format!("{}[0]", idents::TID),
            rhs: "0".to_string(),
        },
    ];
    let _ = meta;

    for k in 0..contexts {
        stmts.push(DriverStmt::Comment(format!("context {k}")));
        stmts.push(DriverStmt::Assign {
            lhs: "k".to_string(),
            rhs: k.to_string(),
        });

        if k == 0 {
            stmts.push(DriverStmt::Assign {
                lhs: idents::THREAD_INDEX.to_string(),
                rhs: "0".to_string(),
            });
            stmts.extend(context_slot(0, k, threads, deadlock, false));
        } else {
            for t in 0..thread_count {
                let mut body = vec![DriverStmt::Assign {
                    lhs: idents::THREAD_INDEX.to_string(),
                    rhs: t.to_string(),
                }];
                body.extend(context_slot(t, k, threads, deadlock, true));
                stmts.push(DriverStmt::If {
                    cond: format!("{}[{k}] == {t}", idents::TID),
                    body,
                });
            }
        }
    }

    stmts.push(DriverStmt::Return(0));
    Driver { stmts }
}

fn context_slot(
    t: u32,
    k: u32,
    threads: &ThreadMap,
    deadlock: bool,
    check_active: bool,
) -> Vec<DriverStmt> {
    let mut body = Vec::new();
    if check_active {
        body.push(DriverStmt::Assume(format!(
            "{}[{t}]",
            idents::ACTIVE_THREAD
        )));
    }
    body.push(DriverStmt::Assume(format!(
        "{cs}[{k}] >= {pcs}[{t}]",
        cs = idents::CS,
        pcs = idents::PC_CS
    )));
    body.push(DriverStmt::Assume(format!(
        "{cs}[{k}] <= {lines}[{t}]",
        cs = idents::CS,
        lines = idents::THREAD_LINES
    )));
    body.push(DriverStmt::Assign {
        lhs: format!("{}[{t}]", idents::PC_CS),
        rhs: format!("{}[{k}]", idents::CS),
    });
    body.push(thread_call(threads, t));
    body.push(DriverStmt::Assign {
        lhs: format!("{}[{t}]", idents::PC),
        rhs: format!("{}[{t}]", idents::PC_CS),
    });
    if deadlock {
        body.push(DriverStmt::Assign {
            lhs: idents::LAST_THREAD.to_string(),
            rhs: t.to_string(),
        });
    }
    body
}

/// Per-restriction eligibility as the schedule module computes it, re-used
/// by tests to cross-check emitted slots.
#[must_use]
pub fn eligible(restriction: &RoundRestriction, t: u32) -> bool {
    restriction.admits(t)
}
