//! Scheduler-program synthesis
//!
//! Walks every thread body assigning context-switch labels, emits the
//! labeled bodies plus a preamble with the concurrency model, and appends
//! the driver `main` built by the `driver` module. Alongside the text it
//! produces the stage's line map, per-thread sizes and end lines, and
//! bit-width hints for the injected control variables.

use crate::ast::{Expr, Function, Program, Stmt, StmtKind};
use crate::driver::{context_bounded_driver, round_robin_driver};
use crate::error::EncodeError;
use crate::labels::{
    global_access, is_atomic_begin, is_atomic_end, is_pthread_exit, is_visible_call_stmt,
    label_kind, LabelKind, LabelRecord,
};
use crate::symtab::SymbolQuery;
use lazyseq_core::{
    idents, width_for_count, width_for_max, EncodeConfig, LineMap, Schedule, ScheduleMode,
    ThreadMap, ThreadMeta,
};
use std::collections::HashMap;
use tracing::warn;

/// Bit-width hints keyed by (scope, variable); scope "" is file scope.
pub type BitwidthMap = HashMap<(String, String), u32>;

/// Everything the synthesizer hands downstream
#[derive(Debug)]
pub struct EncodeOutput {
    /// The sequentialized program text
    pub text: String,
    /// Output line to input line map for this stage
    pub line_map: LineMap,
    pub threads: ThreadMap,
    pub meta: ThreadMeta,
    pub bitwidths: BitwidthMap,
    /// Per-thread assigned labels, for diagnostics and tests
    pub labels: HashMap<u32, Vec<LabelRecord>>,
}

/// The synthesis pass
pub struct Synthesizer<'a> {
    sym: &'a dyn SymbolQuery,
    config: &'a EncodeConfig,
}

/// One line of the output under construction
#[derive(Debug, Clone)]
struct OutLine {
    text: String,
    /// Input line this output line came from, when it came from one
    src: Option<u32>,
}

impl OutLine {
    fn new(text: impl Into<String>, src: Option<u32>) -> Self {
        Self {
            text: text.into(),
            src,
        }
    }
}

impl<'a> Synthesizer<'a> {
    pub fn new(sym: &'a dyn SymbolQuery, config: &'a EncodeConfig) -> Self {
        Self { sym, config }
    }

    /// Synthesize the sequentialized program for a duplicated input.
    pub fn run(
        &self,
        program: &Program,
        threads: &ThreadMap,
    ) -> Result<EncodeOutput, EncodeError> {
        program.function("main").ok_or(EncodeError::NoMain)?;

        let thread_count = threads.count();
        let mut meta = ThreadMeta::new();
        let mut bitwidths: BitwidthMap = HashMap::new();
        let mut labels_by_thread: HashMap<u32, Vec<LabelRecord>> = HashMap::new();
        let mut function_lines: Vec<OutLine> = Vec::new();

        for function in &program.functions {
            let index = if function.name == "main" {
                Some(0)
            } else {
                threads.index_of(&function.name)
            };

            match index {
                Some(index) => {
                    let enc = ThreadEncoder::new(self.sym, threads, function, index, self.config)
                        .encode()?;
                    meta.set_size(index, enc.size);
                    meta.set_end_line(index, enc.end_line);
                    labels_by_thread.insert(index, enc.labels);
                    bitwidths.extend(enc.bitwidths);
                    function_lines.extend(enc.lines);
                }
                None => render_plain_function(function, &mut function_lines),
            }
        }

        let max_size = meta.max_size();

        // Control-variable widths shared by both modes.
        let pc_width = width_for_max(u64::from(max_size));
        for name in [idents::PC, idents::PC_CS, idents::THREAD_LINES] {
            bitwidths.insert((String::new(), name.to_string()), pc_width);
        }
        bitwidths.insert((String::new(), idents::ACTIVE_THREAD.to_string()), 1);
        let index_width = width_for_max(u64::from(thread_count));
        bitwidths.insert((String::new(), idents::THREAD_INDEX.to_string()), index_width);
        bitwidths.insert((String::new(), idents::LAST_THREAD.to_string()), index_width);

        let size = |t: u32| meta.size(t).unwrap_or(0);

        let driver = match self.config.mode {
            ScheduleMode::RoundRobin { rounds } => {
                let schedule = Schedule::parse(
                    self.config.schedule.as_deref(),
                    rounds,
                    thread_count.saturating_sub(1),
                );
                for round in 0..schedule.round_count() {
                    for t in 0..thread_count {
                        if schedule.round(round).admits(t) {
                            bitwidths.insert(
                                ("main".to_string(), format!("__cs_tmp_t{t}_r{round}")),
                                width_for_max(u64::from(size(t))),
                            );
                        }
                    }
                }
                bitwidths.insert(
                    (
                        "main".to_string(),
                        format!("__cs_tmp_t0_r{}", schedule.round_count()),
                    ),
                    width_for_max(u64::from(size(0))),
                );
                round_robin_driver(&schedule, threads, &meta, self.config.deadlock)
            }
            ScheduleMode::ContextBounded { contexts } => {
                bitwidths.insert(
                    ("main".to_string(), idents::TID.to_string()),
                    width_for_count(u64::from(thread_count)),
                );
                bitwidths.insert(
                    ("main".to_string(), idents::CS.to_string()),
                    width_for_count(u64::from(max_size) + 1),
                );
                context_bounded_driver(contexts, threads, &meta, self.config.deadlock)
            }
        };

        // Assemble: preamble, globals, bodies, driver.
        let mut lines = preamble(thread_count, &meta, self.config);
        render_globals(&program.globals, &mut lines);
        lines.extend(function_lines);
        lines.extend(
            driver
                .render()
                .into_iter()
                .map(|text| OutLine::new(text, None)),
        );

        let mut line_map = LineMap::new();
        let mut text = String::with_capacity(lines.len() * 32);
        for (offset, line) in lines.iter().enumerate() {
            if let Some(src) = line.src {
                line_map.insert(offset as u32 + 1, src);
            }
            text.push_str(&line.text);
            text.push('\n');
        }

        Ok(EncodeOutput {
            text,
            line_map,
            threads: threads.clone(),
            meta,
            bitwidths,
            labels: labels_by_thread,
        })
    }
}

/// Concurrency model and control state emitted before everything else.
fn preamble(thread_count: u32, meta: &ThreadMeta, config: &EncodeConfig) -> Vec<OutLine> {
    let n = thread_count;
    let sizes: Vec<String> = (0..n)
        .map(|t| meta.size(t).unwrap_or(0).to_string())
        .collect();
    let sizes = sizes.join(", ");

    let mut out: Vec<String> = vec![
        "#define IF(T,A,B) if (__cs_pc[T] > A || A >= __cs_pc_cs[T]) goto B;".into(),
        "extern void __VERIFIER_error(void);".into(),
        "extern void __VERIFIER_assume(int);".into(),
        "typedef unsigned int pthread_t;".into(),
        "typedef unsigned int pthread_mutex_t;".into(),
        "typedef unsigned int pthread_cond_t;".into(),
        format!("unsigned int {};", idents::THREAD_INDEX),
        format!("unsigned int {}[{n}];", idents::PC),
        format!("unsigned int {}[{n}];", idents::PC_CS),
        format!("unsigned int {}[{n}] = {{ 1 }};", idents::ACTIVE_THREAD),
        format!("unsigned int {}[{n}] = {{ {sizes} }};", idents::THREAD_LINES),
        format!("void *{}[{n}];", idents::THREAD_ARGS),
        format!("unsigned int {};", idents::THREAD_CREATED),
        format!("unsigned int {};", idents::MUTEX_TO_LOCK),
        format!("unsigned int {};", idents::MUTEX_TO_UNLOCK),
        format!("unsigned int {};", idents::MUTEX_TO_DESTROY),
        format!("unsigned int {};", idents::COND_TO_SIGNAL),
        format!("unsigned int {};", idents::COND_TO_WAIT_FOR),
        format!("unsigned int {};", idents::MESSAGE),
    ];
    if config.deadlock {
        out.push(format!("unsigned int {};", idents::LAST_THREAD));
    }

    out.push(
        "int pthread_create(pthread_t *__cs_id, void *__cs_attr, void *(*__cs_f)(void *), \
         void *__cs_arg, unsigned int __cs_idx) { __cs_threadID = __cs_idx; *__cs_id = __cs_idx; \
         __cs_active_thread[__cs_idx] = 1; __cs_threadargs[__cs_idx] = __cs_arg; return 0; }"
            .into(),
    );
    out.push(
        "int pthread_join(pthread_t __cs_id, void **__cs_value) { \
         __VERIFIER_assume(__cs_pc[__cs_id] == __cs_thread_lines[__cs_id]); return 0; }"
            .into(),
    );
    out.push(
        "void pthread_exit(void *__cs_value) { __cs_active_thread[__cs_thread_index] = 0; }"
            .into(),
    );
    out.push(format!(
        "int {}(pthread_t __cs_id, void **__cs_value) {{ return 0; }}",
        idents::NOOP
    ));
    out.push(
        "int pthread_mutex_init(pthread_mutex_t *__cs_m, void *__cs_attr) { *__cs_m = 0; return 0; }"
            .into(),
    );
    out.push(
        "int pthread_mutex_lock(pthread_mutex_t *__cs_m) { __cs_mutex_to_lock = *__cs_m; \
         __VERIFIER_assume(*__cs_m == 0); *__cs_m = __cs_thread_index + 1; return 0; }"
            .into(),
    );
    out.push(
        "int pthread_mutex_unlock(pthread_mutex_t *__cs_m) { __cs_mutex_to_unlock = *__cs_m; \
         *__cs_m = 0; return 0; }"
            .into(),
    );
    out.push(
        "int pthread_mutex_destroy(pthread_mutex_t *__cs_m) { __cs_mutex_to_destroy = *__cs_m; \
         *__cs_m = 0; return 0; }"
            .into(),
    );
    out.push(
        "int pthread_cond_signal(pthread_cond_t *__cs_c) { __cs_cond_to_signal = *__cs_c; \
         *__cs_c = 1; return 0; }"
            .into(),
    );
    out.push(
        "int pthread_cond_broadcast(pthread_cond_t *__cs_c) { __cs_cond_to_signal = *__cs_c; \
         *__cs_c = 1; return 0; }"
            .into(),
    );
    out.push(
        "int pthread_cond_wait_1(pthread_cond_t *__cs_c, pthread_mutex_t *__cs_m) { \
         __cs_cond_to_wait_for = *__cs_c; *__cs_m = 0; return 0; }"
            .into(),
    );
    // Spurious wakeups: the strict model only wakes after a signal, the
    // relaxed one may resume regardless.
    if config.nondet_condvar_wakeups {
        out.push(
            "int pthread_cond_wait_2(pthread_cond_t *__cs_c, pthread_mutex_t *__cs_m) { \
             __VERIFIER_assume(*__cs_m == 0); *__cs_m = __cs_thread_index + 1; return 0; }"
                .into(),
        );
    } else {
        out.push(
            "int pthread_cond_wait_2(pthread_cond_t *__cs_c, pthread_mutex_t *__cs_m) { \
             __VERIFIER_assume(*__cs_c == 1); __VERIFIER_assume(*__cs_m == 0); \
             *__cs_m = __cs_thread_index + 1; return 0; }"
                .into(),
        );
    }

    out.into_iter().map(|text| OutLine::new(text, None)).collect()
}

fn render_globals(globals: &[Stmt], out: &mut Vec<OutLine>) {
    for stmt in globals {
        match &stmt.kind {
            StmtKind::Decl { ty, name, init } => {
                let text = match init {
                    Some(init) => format!("{ty} {name} = {};", init.render()),
                    None => format!("{ty} {name};"),
                };
                out.push(OutLine::new(text, Some(stmt.line)));
            }
            StmtKind::Expr(expr) => {
                out.push(OutLine::new(format!("{};", expr.render()), Some(stmt.line)));
            }
            _ => {}
        }
    }
}

/// Functions that are not thread bodies are emitted without labels.
fn render_plain_function(function: &Function, out: &mut Vec<OutLine>) {
    out.push(OutLine::new(signature(function), Some(function.line)));
    render_plain_block(&function.body, out);
    out.push(OutLine::new("}", None));
}

fn signature(function: &Function) -> String {
    let params: Vec<String> = function
        .params
        .iter()
        .map(|(ty, name)| format!("{ty} {name}"))
        .collect();
    let params = if params.is_empty() {
        "void".to_string()
    } else {
        params.join(", ")
    };
    format!("{} {}({params}) {{", function.ret_type, function.name)
}

fn render_plain_block(body: &[Stmt], out: &mut Vec<OutLine>) {
    for stmt in body {
        render_plain_stmt(stmt, out);
    }
}

fn render_plain_stmt(stmt: &Stmt, out: &mut Vec<OutLine>) {
    let src = Some(stmt.line);
    match &stmt.kind {
        StmtKind::Expr(expr) => out.push(OutLine::new(format!("{};", expr.render()), src)),
        StmtKind::Decl { ty, name, init } => {
            let text = match init {
                Some(init) => format!("{ty} {name} = {};", init.render()),
                None => format!("{ty} {name};"),
            };
            out.push(OutLine::new(text, src));
        }
        StmtKind::If {
            cond,
            then_branch,
            else_branch,
            ..
        } => {
            out.push(OutLine::new(format!("if ({}) {{", cond.render()), src));
            render_plain_block(then_branch, out);
            if !else_branch.is_empty() {
                out.push(OutLine::new("} else {", None));
                render_plain_block(else_branch, out);
            }
            out.push(OutLine::new("}", None));
        }
        StmtKind::Goto(label) => out.push(OutLine::new(format!("goto {label};"), src)),
        StmtKind::Labeled { label, stmt } => {
            out.push(OutLine::new(format!("{label}:"), src));
            render_plain_stmt(stmt, out);
        }
        StmtKind::Return(value) => {
            let text = match value {
                Some(value) => format!("return {};", value.render()),
                None => "return;".to_string(),
            };
            out.push(OutLine::new(text, src));
        }
        StmtKind::Nop => out.push(OutLine::new(";", src)),
    }
}

/// What the encoder produced for one thread body
struct ThreadEncoding {
    lines: Vec<OutLine>,
    size: u32,
    /// Input line of the thread's last statement
    end_line: u32,
    labels: Vec<LabelRecord>,
    bitwidths: BitwidthMap,
}

/// Per-thread encoding context: label counter, atomic-section depth, user
/// label positions and pending goto fixups.
struct ThreadEncoder<'a> {
    sym: &'a dyn SymbolQuery,
    threads: &'a ThreadMap,
    function: &'a Function,
    index: u32,
    extra_tracking: bool,
    count: i64,
    atomic: u32,
    first_thread_created: bool,
    end_line: u32,
    if_temps: u32,
    loop_temps: u32,
    labels: Vec<LabelRecord>,
    /// user label -> number of the first label at or after it
    user_labels: HashMap<String, u32>,
    /// (position, target label, label counter at the goto)
    gotos: Vec<(usize, String, i64)>,
    bitwidths: BitwidthMap,
    out: Vec<OutLine>,
}

impl<'a> ThreadEncoder<'a> {
    fn new(
        sym: &'a dyn SymbolQuery,
        threads: &'a ThreadMap,
        function: &'a Function,
        index: u32,
        config: &EncodeConfig,
    ) -> Self {
        Self {
            sym,
            threads,
            function,
            index,
            extra_tracking: config.extra_tracking,
            count: -1,
            atomic: 0,
            first_thread_created: false,
            end_line: function.line,
            if_temps: 0,
            loop_temps: 0,
            labels: Vec::new(),
            user_labels: HashMap::new(),
            gotos: Vec::new(),
            bitwidths: HashMap::new(),
            out: Vec::new(),
        }
    }

    fn is_main(&self) -> bool {
        self.index == 0
    }

    fn encode(mut self) -> Result<ThreadEncoding, EncodeError> {
        let sig = if self.is_main() {
            format!("{} main_thread(void) {{", self.function.ret_type)
        } else {
            format!("void *{}(void *__cs_arg) {{", self.function.name)
        };
        self.push(sig, Some(self.function.line));

        for stmt in &self.function.body {
            self.visit_stmt(stmt)?;
        }

        // Terminal label: IF chains land here once the chosen bound is
        // exhausted. Non-main threads go inactive when they fall off the end.
        let terminal = self.count + 1;
        if self.is_main() {
            self.push(format!("{}: ;", self.label_name(terminal)), None);
            self.push("return 0;", None);
        } else {
            self.push(
                format!(
                    "{}: {}[{}] = 0;",
                    self.label_name(terminal),
                    idents::ACTIVE_THREAD,
                    self.index
                ),
                None,
            );
            self.push("return 0;", None);
        }
        self.push("}", None);

        self.patch_gotos()?;

        Ok(ThreadEncoding {
            lines: self.out,
            size: (self.count + 1) as u32,
            end_line: self.end_line,
            labels: self.labels,
            bitwidths: self.bitwidths,
        })
    }

    fn push(&mut self, text: impl Into<String>, src: Option<u32>) {
        self.out.push(OutLine::new(text, src));
    }

    fn label_name(&self, n: i64) -> String {
        format!("t{}_{n}", self.function.name)
    }

    /// Allocate the next label and emit its stamp.
    fn stamp(&mut self, line: u32, kind: LabelKind) {
        self.count += 1;
        let n = self.count;
        self.labels.push(LabelRecord {
            index: n as u32,
            line,
            kind,
        });
        if n == 0 {
            // Thread entry: no jump target needed in front of label 0.
            self.push(
                format!("IF({},0,{})", self.index, self.label_name(1)),
                Some(line),
            );
        } else {
            self.push(
                format!(
                    "{}: IF({},{n},{})",
                    self.label_name(n),
                    self.index,
                    self.label_name(n + 1)
                ),
                Some(line),
            );
        }
    }

    /// Visibility of a candidate statement at the current position.
    fn visible(&self, stmt: &Stmt) -> bool {
        if self.atomic > 0 {
            return false;
        }
        if self.count == -1 {
            return true;
        }
        // No context switching in main before the first thread exists.
        if self.is_main() && !self.first_thread_created {
            return false;
        }
        global_access(stmt, &self.function.name, self.sym) || is_visible_call_stmt(stmt)
    }

    fn visit_stmt(&mut self, stmt: &Stmt) -> Result<(), EncodeError> {
        self.end_line = stmt.line;
        match &stmt.kind {
            StmtKind::If {
                cond,
                then_branch,
                else_branch,
                loop_head,
            } => self.visit_if(stmt, cond, then_branch, else_branch, *loop_head),
            StmtKind::Goto(label) => {
                self.gotos.push((self.out.len(), label.clone(), self.count));
                self.push(format!("goto {label};"), Some(stmt.line));
                Ok(())
            }
            StmtKind::Labeled { label, stmt: inner } => {
                self.user_labels
                    .insert(label.clone(), (self.count + 1) as u32);
                let at = self.out.len();
                self.visit_stmt(inner)?;
                let guard = if self.atomic == 0 {
                    format!(
                        " __VERIFIER_assume({}[{}] >= {});",
                        idents::PC_CS,
                        self.index,
                        self.count + 1
                    )
                } else {
                    String::new()
                };
                self.out
                    .insert(at, OutLine::new(format!("{label}:{guard}"), Some(stmt.line)));
                // The insert shifted everything at or after `at` down one.
                for goto in &mut self.gotos {
                    if goto.0 >= at {
                        goto.0 += 1;
                    }
                }
                Ok(())
            }
            StmtKind::Decl { ty, name, init } => {
                // Thread bodies are re-entered through the label dispatch,
                // so locals must persist across scheduler calls.
                self.push(format!("static {ty} {name};"), Some(stmt.line));
                if let Some(init) = init {
                    warn!(
                        "local {} in {} made static, initializer split off",
                        name, self.function.name
                    );
                    let assign =
                        Stmt::expr(stmt.line, Expr::assign(Expr::id(name.clone()), init.clone()));
                    self.visit_simple(&assign)?;
                }
                Ok(())
            }
            StmtKind::Return(_) if !self.is_main() => Err(EncodeError::ReturnInThread {
                thread: self.function.name.clone(),
                coord: lazyseq_core::Coord::line(stmt.line),
            }),
            _ => self.visit_simple(stmt),
        }
    }

    /// Straight-line candidate statement: decide visibility, stamp, emit.
    fn visit_simple(&mut self, stmt: &Stmt) -> Result<(), EncodeError> {
        if let Some((callee, _)) = stmt.as_call() {
            match callee {
                "pthread_mutex_trylock" => {
                    return Err(EncodeError::unsupported(
                        "pthread_mutex_trylock",
                        stmt.line,
                        self.snippet(stmt),
                    ));
                }
                "pthread_cond_wait" | "pthread_cond_timedwait" => {
                    return Err(EncodeError::unsupported(
                        "unsplit condition wait",
                        stmt.line,
                        self.snippet(stmt),
                    ));
                }
                _ => {}
            }

            if is_atomic_begin(stmt) {
                if self.atomic == 0 {
                    self.stamp(stmt.line, LabelKind::Plain);
                }
                self.atomic += 1;
                self.push(";", Some(stmt.line));
                return Ok(());
            }
            if is_atomic_end(stmt) {
                self.atomic = self.atomic.saturating_sub(1);
                self.push(";", Some(stmt.line));
                return Ok(());
            }
        }

        // Render first: a pthread_create flips first_thread_created and
        // must count as visible itself.
        let text = self.render_simple(stmt)?;
        let visible = self.visible(stmt);

        if is_pthread_exit(stmt) && self.atomic == 0 {
            // Always labeled, and never a jump target of the IF chain:
            // a bare label is enough.
            self.count += 1;
            let n = self.count;
            self.labels.push(LabelRecord {
                index: n as u32,
                line: stmt.line,
                kind: LabelKind::Exit,
            });
            self.push(format!("{}: {text}", self.label_name(n)), Some(stmt.line));
        } else if visible {
            self.stamp(stmt.line, label_kind(stmt));
            self.push(text, Some(stmt.line));
        } else {
            self.push(text, Some(stmt.line));
        }
        Ok(())
    }

    fn visit_if(
        &mut self,
        stmt: &Stmt,
        cond: &Expr,
        then_branch: &[Stmt],
        else_branch: &[Stmt],
        loop_head: bool,
    ) -> Result<(), EncodeError> {
        let mut cond_text = cond.render();

        if self.extra_tracking && self.atomic == 0 {
            // Condition evaluation becomes its own labeled event so the
            // decoder can report the branch outcome.
            let (tmp, kind) = if loop_head {
                let tmp = format!("{}{}", idents::LOOP_PREFIX, self.loop_temps);
                self.loop_temps += 1;
                (tmp, LabelKind::LoopCond)
            } else {
                let tmp = format!("{}{}", idents::IF_COND_PREFIX, self.if_temps);
                self.if_temps += 1;
                (tmp, LabelKind::BranchCond)
            };
            self.push(format!("static unsigned int {tmp};"), None);
            self.bitwidths
                .insert((self.function.name.clone(), tmp.clone()), 1);
            self.stamp(stmt.line, kind);
            self.push(format!("{tmp} = ({cond_text});"), Some(stmt.line));
            cond_text = tmp;
        } else if self.visible(stmt) {
            self.stamp(stmt.line, LabelKind::Plain);
        }

        // Labels allocated from here on belong to the branches; the join
        // guards below only care about those.
        let if_start = self.count;
        self.push(format!("if ({cond_text}) {{"), Some(stmt.line));
        for s in then_branch {
            self.visit_stmt(s)?;
        }
        let if_end = self.count;

        if !else_branch.is_empty() {
            self.push("} else {", None);
            // Entering the else branch: the chosen bound must clear the
            // labels allocated by the then branch.
            if if_start < if_end && self.atomic == 0 {
                self.push(
                    format!(
                        "__VERIFIER_assume({}[{}] >= {});",
                        idents::PC_CS,
                        self.index,
                        if_end + 1
                    ),
                    None,
                );
            }
            for s in else_branch {
                self.visit_stmt(s)?;
            }
        }
        self.push("}", None);

        let next_label = self.count + 1;
        if if_start + 1 < next_label && self.atomic == 0 {
            self.push(
                format!(
                    "__VERIFIER_assume({}[{}] >= {next_label});",
                    idents::PC_CS,
                    self.index
                ),
                None,
            );
        }
        Ok(())
    }

    /// Render a straight-line statement, rebinding `pthread_create` to its
    /// dense thread index.
    fn render_simple(&mut self, stmt: &Stmt) -> Result<String, EncodeError> {
        match &stmt.kind {
            StmtKind::Expr(Expr::Call { callee, args }) if callee == "pthread_create" => {
                self.first_thread_created = true;
                let index = args
                    .get(2)
                    .and_then(|arg| match arg {
                        Expr::Id(name) => self.threads.index_of(name),
                        Expr::Unary { op, expr } if op == "&" => match expr.as_ref() {
                            Expr::Id(name) => self.threads.index_of(name),
                            _ => None,
                        },
                        _ => None,
                    })
                    .unwrap_or(0);
                let mut args: Vec<String> = args.iter().map(Expr::render).collect();
                args.push(index.to_string());
                Ok(format!("pthread_create({});", args.join(", ")))
            }
            StmtKind::Expr(expr) => Ok(format!("{};", expr.render())),
            StmtKind::Return(Some(expr)) => Ok(format!("return {};", expr.render())),
            StmtKind::Return(None) => Ok("return;".to_string()),
            StmtKind::Nop => Ok(";".to_string()),
            StmtKind::Labeled { stmt, .. } => self.render_simple(stmt),
            other => Ok(format!("/* {other:?} */;")),
        }
    }

    fn snippet(&self, stmt: &Stmt) -> String {
        match &stmt.kind {
            StmtKind::Expr(expr) => expr.render(),
            other => format!("{other:?}"),
        }
    }

    /// Insert goto guards now that every user label's position is known.
    /// A jump straight to the next visible statement needs no guard.
    fn patch_gotos(&mut self) -> Result<(), EncodeError> {
        let fixups: Vec<(usize, String, i64)> = self.gotos.drain(..).rev().collect();
        for (at, label, count_at_goto) in fixups {
            let target =
                *self
                    .user_labels
                    .get(&label)
                    .ok_or_else(|| EncodeError::UndefinedLabel {
                        label: label.clone(),
                        coord: lazyseq_core::Coord::line(
                            self.out[at].src.unwrap_or(0),
                        ),
                    })?;
            if i64::from(target) != count_at_goto + 1 {
                self.out.insert(
                    at,
                    OutLine::new(
                        format!(
                            "__VERIFIER_assume({}[{}] >= {target});",
                            idents::PC_CS,
                            self.index
                        ),
                        None,
                    ),
                );
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symtab::SymbolTable;

    fn config_rr(rounds: u32) -> EncodeConfig {
        EncodeConfig {
            mode: ScheduleMode::RoundRobin { rounds },
            ..EncodeConfig::default()
        }
    }

    fn global_write(line: u32, value: i64) -> Stmt {
        Stmt::expr(line, Expr::assign(Expr::id("x"), Expr::num(value)))
    }

    fn create_call(line: u32, target: &str) -> Stmt {
        Stmt::call(
            line,
            "pthread_create",
            vec![
                Expr::unary("&", Expr::id("t")),
                Expr::num(0),
                Expr::id(target),
                Expr::num(0),
            ],
        )
    }

    /// main spawns one worker; both write the global x.
    fn two_thread_program() -> (Program, ThreadMap, SymbolTable) {
        let mut sym = SymbolTable::new();
        sym.add_global("x");

        let mut threads = ThreadMap::new();
        threads.register("worker_0", "worker");

        let program = Program {
            globals: vec![Stmt::decl(1, "int", "x", Some(Expr::num(0)))],
            functions: vec![
                Function::new("main", "int", 2).with_body(vec![
                    create_call(3, "worker_0"),
                    global_write(4, 1),
                    global_write(5, 2),
                ]),
                Function::new("worker_0", "void *", 10).with_body(vec![
                    global_write(11, 7),
                    global_write(12, 8),
                    Stmt::call(13, "pthread_exit", vec![Expr::num(0)]),
                ]),
            ],
        };
        (program, threads, sym)
    }

    #[test]
    fn test_labels_contiguous_and_size_matches() {
        let (program, threads, sym) = two_thread_program();
        let config = config_rr(1);
        let out = Synthesizer::new(&sym, &config).run(&program, &threads).unwrap();

        for (thread, labels) in &out.labels {
            let size = out.meta.size(*thread).unwrap();
            assert_eq!(labels.len() as u32, size);
            for (i, record) in labels.iter().enumerate() {
                assert_eq!(record.index, i as u32);
            }
        }
        // main: create + 2 global writes; worker: 2 writes + exit
        assert_eq!(out.meta.size(0), Some(3));
        assert_eq!(out.meta.size(1), Some(3));
    }

    #[test]
    fn test_thread_end_lines_recorded() {
        let (program, threads, sym) = two_thread_program();
        let config = config_rr(1);
        let out = Synthesizer::new(&sym, &config).run(&program, &threads).unwrap();
        assert_eq!(out.meta.end_line(0), Some(5));
        assert_eq!(out.meta.end_line(1), Some(13));
    }

    #[test]
    fn test_main_invisible_before_first_create() {
        let mut sym = SymbolTable::new();
        sym.add_global("x");
        let mut threads = ThreadMap::new();
        threads.register("worker_0", "worker");

        let program = Program {
            globals: vec![],
            functions: vec![
                Function::new("main", "int", 1).with_body(vec![
                    global_write(2, 0), // label 0 (first statement)
                    global_write(3, 1), // invisible: no thread yet
                    create_call(4, "worker_0"),
                    global_write(5, 2), // visible again
                ]),
                Function::new("worker_0", "void *", 10).with_body(vec![global_write(11, 7)]),
            ],
        };
        let config = config_rr(1);
        let out = Synthesizer::new(&sym, &config).run(&program, &threads).unwrap();
        assert_eq!(out.meta.size(0), Some(3));
        let lines: Vec<u32> = out.labels[&0].iter().map(|l| l.line).collect();
        assert_eq!(lines, vec![2, 4, 5]);
    }

    #[test]
    fn test_atomic_section_suppresses_labels() {
        let mut sym = SymbolTable::new();
        sym.add_global("x");
        let threads = ThreadMap::new();

        let program = Program {
            globals: vec![],
            functions: vec![Function::new("main", "int", 1).with_body(vec![
                global_write(2, 0),
                Stmt::call(3, "__VERIFIER_atomic_begin", vec![]),
                global_write(4, 1),
                global_write(5, 2),
                Stmt::call(6, "__VERIFIER_atomic_end", vec![]),
            ])],
        };
        let config = config_rr(1);
        let out = Synthesizer::new(&sym, &config).run(&program, &threads).unwrap();
        // first stmt + atomic_begin: the two writes inside are unlabeled
        assert_eq!(out.meta.size(0), Some(2));
    }

    #[test]
    fn test_guard_on_user_label_and_goto() {
        let mut sym = SymbolTable::new();
        sym.add_global("x");
        let threads = ThreadMap::new();

        let program = Program {
            globals: vec![],
            functions: vec![Function::new("main", "int", 1).with_body(vec![
                global_write(2, 0),
                Stmt::goto(3, "done"),
                global_write(4, 1),
                Stmt::labeled(5, "done", global_write(5, 2)),
            ])],
        };
        let config = config_rr(1);
        let out = Synthesizer::new(&sym, &config).run(&program, &threads).unwrap();
        // the goto skips label 1, so it carries a guard for label 2
        assert!(out.text.contains("__VERIFIER_assume(__cs_pc_cs[0] >= 2);\ngoto done;"));
        assert!(out.text.contains("done: __VERIFIER_assume(__cs_pc_cs[0] >= 3);"));
    }

    #[test]
    fn test_goto_to_next_statement_needs_no_guard() {
        let mut sym = SymbolTable::new();
        sym.add_global("x");
        let threads = ThreadMap::new();

        let program = Program {
            globals: vec![],
            functions: vec![Function::new("main", "int", 1).with_body(vec![
                global_write(2, 0),
                Stmt::goto(3, "next"),
                Stmt::labeled(4, "next", global_write(4, 1)),
            ])],
        };
        let config = config_rr(1);
        let out = Synthesizer::new(&sym, &config).run(&program, &threads).unwrap();
        assert!(!out.text.contains(">= 1);\ngoto next;"));
        assert!(out.text.contains("goto next;"));
    }

    #[test]
    fn test_undefined_goto_label_is_fatal() {
        let sym = SymbolTable::new();
        let threads = ThreadMap::new();
        let program = Program {
            globals: vec![],
            functions: vec![Function::new("main", "int", 1)
                .with_body(vec![global_write(2, 0), Stmt::goto(3, "nowhere")])],
        };
        let config = config_rr(1);
        let err = Synthesizer::new(&sym, &config)
            .run(&program, &threads)
            .unwrap_err();
        assert!(matches!(err, EncodeError::UndefinedLabel { .. }));
    }

    #[test]
    fn test_branch_join_guard() {
        let mut sym = SymbolTable::new();
        sym.add_global("x");
        let threads = ThreadMap::new();

        let program = Program {
            globals: vec![],
            functions: vec![Function::new("main", "int", 1).with_body(vec![
                global_write(2, 0),
                Stmt {
                    kind: StmtKind::If {
                        cond: Expr::binary("==", Expr::id("x"), Expr::num(0)),
                        then_branch: vec![global_write(4, 1), global_write(5, 2)],
                        else_branch: vec![global_write(7, 3)],
                        loop_head: false,
                    },
                    line: 3,
                },
            ])],
        };
        let config = config_rr(1);
        let out = Synthesizer::new(&sym, &config).run(&program, &threads).unwrap();
        // cond reads global x: label 1; then branch: labels 2,3; else: 4
        assert_eq!(out.meta.size(0), Some(5));
        // else header clears the then labels, footer clears the whole if
        assert!(out.text.contains("__VERIFIER_assume(__cs_pc_cs[0] >= 4);"));
        assert!(out.text.contains("__VERIFIER_assume(__cs_pc_cs[0] >= 5);"));
    }

    #[test]
    fn test_extra_tracking_labels_branch_condition() {
        let threads = ThreadMap::new();
        let sym = SymbolTable::new();
        let program = Program {
            globals: vec![],
            functions: vec![Function::new("main", "int", 1).with_body(vec![
                Stmt {
                    kind: StmtKind::If {
                        cond: Expr::binary("==", Expr::id("y"), Expr::num(0)),
                        then_branch: vec![Stmt::expr(
                            3,
                            Expr::assign(Expr::id("y"), Expr::num(1)),
                        )],
                        else_branch: vec![],
                        loop_head: false,
                    },
                    line: 2,
                },
                Stmt {
                    kind: StmtKind::If {
                        cond: Expr::binary("<", Expr::id("y"), Expr::num(3)),
                        then_branch: vec![Stmt::expr(
                            5,
                            Expr::assign(Expr::id("y"), Expr::num(2)),
                        )],
                        else_branch: vec![],
                        loop_head: true,
                    },
                    line: 4,
                },
            ])],
        };
        let config = EncodeConfig {
            mode: ScheduleMode::RoundRobin { rounds: 1 },
            extra_tracking: true,
            ..EncodeConfig::default()
        };
        let out = Synthesizer::new(&sym, &config).run(&program, &threads).unwrap();
        assert!(out.text.contains("__cs_tmp_if_cond_0 = ("));
        assert!(out.text.contains("__cs_loop_0 = ("));
        let kinds: Vec<LabelKind> = out.labels[&0].iter().map(|l| l.kind).collect();
        assert!(kinds.contains(&LabelKind::BranchCond));
        assert!(kinds.contains(&LabelKind::LoopCond));
    }

    #[test]
    fn test_trylock_is_fatal_with_snippet() {
        let sym = SymbolTable::new();
        let threads = ThreadMap::new();
        let program = Program {
            globals: vec![],
            functions: vec![Function::new("main", "int", 1).with_body(vec![Stmt::call(
                2,
                "pthread_mutex_trylock",
                vec![Expr::unary("&", Expr::id("m"))],
            )])],
        };
        let config = config_rr(1);
        let err = Synthesizer::new(&sym, &config)
            .run(&program, &threads)
            .unwrap_err();
        match err {
            EncodeError::Unsupported { snippet, coord, .. } => {
                assert!(snippet.contains("pthread_mutex_trylock"));
                assert_eq!(coord.line, 2);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_unsplit_cond_wait_is_fatal() {
        let sym = SymbolTable::new();
        let threads = ThreadMap::new();
        let program = Program {
            globals: vec![],
            functions: vec![Function::new("main", "int", 1).with_body(vec![Stmt::call(
                2,
                "pthread_cond_wait",
                vec![Expr::id("c"), Expr::id("m")],
            )])],
        };
        let config = config_rr(1);
        let err = Synthesizer::new(&sym, &config)
            .run(&program, &threads)
            .unwrap_err();
        assert!(matches!(err, EncodeError::Unsupported { .. }));
    }

    #[test]
    fn test_return_in_thread_is_fatal() {
        let mut sym = SymbolTable::new();
        sym.add_global("x");
        let mut threads = ThreadMap::new();
        threads.register("worker_0", "worker");

        let program = Program {
            globals: vec![],
            functions: vec![
                Function::new("main", "int", 1).with_body(vec![create_call(2, "worker_0")]),
                Function::new("worker_0", "void *", 10)
                    .with_body(vec![Stmt::ret(11, Some(Expr::num(0)))]),
            ],
        };
        let config = config_rr(1);
        let err = Synthesizer::new(&sym, &config)
            .run(&program, &threads)
            .unwrap_err();
        assert!(matches!(err, EncodeError::ReturnInThread { .. }));
    }

    #[test]
    fn test_round_robin_bitwidths() {
        let (program, threads, sym) = two_thread_program();
        let config = config_rr(2);
        let out = Synthesizer::new(&sym, &config).run(&program, &threads).unwrap();

        // max size 3: floor(log2(3)) + 1 = 2
        assert_eq!(out.bitwidths[&(String::new(), idents::PC.to_string())], 2);
        assert_eq!(out.bitwidths[&(String::new(), idents::PC_CS.to_string())], 2);
        assert_eq!(
            out.bitwidths[&("main".to_string(), "__cs_tmp_t1_r1".to_string())],
            2
        );
        // closing main slot
        assert!(out
            .bitwidths
            .contains_key(&("main".to_string(), "__cs_tmp_t0_r2".to_string())));
    }

    #[test]
    fn test_context_bounded_bitwidths() {
        // contexts=3, 2 spawned threads, max thread size 9:
        // tid needs ceil(log2(3)) = 2 bits, cs needs ceil(log2(10)) = 4 bits
        let mut sym = SymbolTable::new();
        sym.add_global("x");
        let mut threads = ThreadMap::new();
        threads.register("worker_0", "worker");
        threads.register("worker_1", "worker");

        let mut main_body = vec![
            global_write(2, 0),
            create_call(3, "worker_0"),
            create_call(4, "worker_1"),
        ];
        for i in 0..6 {
            main_body.push(global_write(5 + i, i64::from(i)));
        }
        let program = Program {
            globals: vec![],
            functions: vec![
                Function::new("main", "int", 1).with_body(main_body),
                Function::new("worker_0", "void *", 20).with_body(vec![global_write(21, 1)]),
                Function::new("worker_1", "void *", 30).with_body(vec![global_write(31, 2)]),
            ],
        };
        let config = EncodeConfig {
            mode: ScheduleMode::ContextBounded { contexts: 3 },
            max_threads: 2,
            ..EncodeConfig::default()
        };
        let out = Synthesizer::new(&sym, &config).run(&program, &threads).unwrap();

        assert_eq!(out.meta.size(0), Some(9));
        assert_eq!(out.meta.max_size(), 9);
        assert_eq!(out.bitwidths[&("main".to_string(), idents::TID.to_string())], 2);
        assert_eq!(out.bitwidths[&("main".to_string(), idents::CS.to_string())], 4);
    }

    #[test]
    fn test_schedule_restriction_flows_to_driver() {
        let (program, threads, sym) = two_thread_program();
        let config = EncodeConfig {
            mode: ScheduleMode::RoundRobin { rounds: 2 },
            schedule: Some("0:+".to_string()),
            ..EncodeConfig::default()
        };
        let out = Synthesizer::new(&sym, &config).run(&program, &threads).unwrap();
        // worker_0 appears once (round 1 only)
        assert_eq!(out.text.matches("worker_0(__cs_threadargs[1]);").count(), 1);
        let round1 = out.text.find("/* round 1 */").unwrap();
        let call = out.text.find("worker_0(__cs_threadargs[1]);").unwrap();
        assert!(call > round1);
    }

    #[test]
    fn test_line_map_covers_statements() {
        let (program, threads, sym) = two_thread_program();
        let config = config_rr(1);
        let out = Synthesizer::new(&sym, &config).run(&program, &threads).unwrap();

        // the worker's write of x=7 at input line 11 appears in the map
        let mut found = false;
        for (offset, line) in out.text.lines().enumerate() {
            if line.contains("x = 7;") {
                assert_eq!(out.line_map.lookup(offset as u32 + 1), Some(11));
                found = true;
            }
        }
        assert!(found);
        // driver lines are unmapped
        for (offset, line) in out.text.lines().enumerate() {
            if line.contains("int main(void)") {
                assert_eq!(out.line_map.lookup(offset as u32 + 1), None);
            }
        }
    }

    #[test]
    fn test_missing_main_is_fatal() {
        let sym = SymbolTable::new();
        let threads = ThreadMap::new();
        let program = Program::new();
        let config = config_rr(1);
        let err = Synthesizer::new(&sym, &config)
            .run(&program, &threads)
            .unwrap_err();
        assert!(matches!(err, EncodeError::NoMain));
    }
}
