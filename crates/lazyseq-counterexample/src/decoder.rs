//! Backend trace decoding
//!
//! Replays the sequentialized program's state trace and rebuilds the
//! concurrent trace it simulates: which thread ran, what it did, and where
//! in the original source. Attribution follows the scheduler's own control
//! variables; everything else is a plain assignment resolved back through
//! the line-map chain.

use crate::event::{TraceCoord, TraceEvent, Violation};
use crate::parse::{parse_trace, RawEntry, RawState, RawViolation};
use lazyseq_core::{
    idents, BackendKind, LineMapChain, ScheduleMode, ThreadMap, ThreadMeta, VarNameMap,
};
use std::collections::{HashMap, HashSet};
use tracing::warn;

/// Soft separator used for scheduler-level events in the rendered trace.
const EVENT_SEPARATOR: &str = "- - - - - - - - - - - - - - - - - - - - - - - - - - ";

/// Hard separator used for plain assignments, same as the backend's.
const BLOCK_SEPARATOR: &str = "----------------------------------------------------";

/// The reconstructed concurrent trace
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodedTrace {
    pub events: Vec<TraceEvent>,
    pub violation: Option<Violation>,
}

/// Trace decoder for one pipeline run
pub struct Decoder {
    chain: LineMapChain,
    threads: ThreadMap,
    meta: ThreadMeta,
    varnames: VarNameMap,
    mode: ScheduleMode,
    backend: BackendKind,
}

/// Mutable attribution state while walking one trace
#[derive(Debug, Default)]
struct Walk {
    last_thread: u32,
    terminated: HashSet<u32>,
}

impl Decoder {
    #[must_use]
    pub fn new(
        chain: LineMapChain,
        threads: ThreadMap,
        meta: ThreadMeta,
        varnames: VarNameMap,
        mode: ScheduleMode,
        backend: BackendKind,
    ) -> Self {
        Self {
            chain,
            threads,
            meta,
            varnames,
            mode,
            backend,
        }
    }

    /// Decode a raw backend trace into events. Backends without a readable
    /// trace format yield an empty result; the short summary still stands.
    #[must_use]
    pub fn decode(&self, raw: &str) -> DecodedTrace {
        if !self.backend.supports_trace() {
            warn!(
                "error trace translation for backend {} is not supported",
                self.backend
            );
            return DecodedTrace::default();
        }

        let mut walk = Walk::default();
        let mut trace = DecodedTrace::default();
        for entry in parse_trace(raw) {
            match entry {
                RawEntry::State(state) => {
                    if let Some(event) = self.classify(&state, &mut walk) {
                        trace.events.push(event);
                    }
                }
                RawEntry::Violation(violation) => {
                    trace.violation = Some(self.map_violation(&violation));
                }
            }
        }
        trace
    }

    fn classify(&self, s: &RawState, walk: &mut Walk) -> Option<TraceEvent> {
        let value = prefix_value(&s.rhs);

        // Context switch: the driver wrote the scheduled thread's index.
        if s.lhs.starts_with(idents::THREAD_INDEX)
            && s.function.as_deref().map_or(false, |f| !f.is_empty())
        {
            let thread: u32 = first_token(&s.rhs).parse().ok()?;
            walk.last_thread = thread;
            let name = self.threads.name_of(thread).unwrap_or("?").to_string();
            return Some(TraceEvent::ContextSwitch {
                state: s.state.clone(),
                thread,
                name,
            });
        }

        // Context-bounded mode: the nondeterministic tid pick precedes the
        // dispatch, so it already moves attribution.
        if matches!(self.mode, ScheduleMode::ContextBounded { .. })
            && s.lhs.starts_with(idents::TID)
        {
            if let Ok(thread) = value.parse() {
                walk.last_thread = thread;
            }
            return None;
        }

        // Thread creation.
        if s.lhs == idents::THREAD_CREATED {
            let created: u32 = value.parse().ok()?;
            let created_name = self.threads.name_of(created).unwrap_or("?").to_string();
            return Some(TraceEvent::ThreadCreated {
                state: s.state.clone(),
                coord: self.resolve(s.line),
                creator: walk.last_thread,
                created,
                created_name,
            });
        }

        // Thread termination: a committed counter reaching the thread's
        // size means that thread ran to the end. Reported once per thread.
        if let (Some(index), Some(counter)) = (pc_index(&s.lhs), value.parse::<u32>().ok()) {
            if index != 0
                && self.meta.size(index) == Some(counter)
                && !walk.terminated.contains(&index)
            {
                walk.terminated.insert(index);
                return Some(TraceEvent::ThreadExited {
                    state: s.state.clone(),
                    line: self.meta.end_line(index).unwrap_or(0),
                    thread: index,
                    function: self.threads.name_of(index).unwrap_or("?").to_string(),
                });
            }
        }

        if s.lhs == idents::COND_TO_SIGNAL {
            return Some(TraceEvent::CondSignal {
                state: s.state.clone(),
                coord: self.resolve(s.line),
                thread: walk.last_thread,
                cond: value.to_string(),
            });
        }

        if s.lhs == idents::COND_TO_WAIT_FOR {
            return Some(TraceEvent::CondWait {
                state: s.state.clone(),
                coord: self.resolve(s.line),
                thread: walk.last_thread,
                cond: value.to_string(),
            });
        }

        // Lock/unlock inside the split wait halves are part of the wait
        // itself, not separate user actions.
        if s.lhs == idents::MUTEX_TO_LOCK
            && s.function.as_deref().map_or(false, |f| f != "pthread_cond_wait_2")
        {
            return Some(TraceEvent::MutexLock {
                state: s.state.clone(),
                coord: self.resolve(s.line),
                thread: walk.last_thread,
                mutex: value.to_string(),
            });
        }

        if s.lhs == idents::MUTEX_TO_UNLOCK
            && s.function.as_deref().map_or(false, |f| f != "pthread_cond_wait_1")
        {
            return Some(TraceEvent::MutexUnlock {
                state: s.state.clone(),
                coord: self.resolve(s.line),
                thread: walk.last_thread,
                mutex: value.to_string(),
            });
        }

        if s.lhs == idents::MUTEX_TO_DESTROY {
            return Some(TraceEvent::MutexDestroy {
                state: s.state.clone(),
                coord: self.resolve(s.line),
                thread: walk.last_thread,
                mutex: value.to_string(),
            });
        }

        // Explicit user message, quotes stripped.
        if s.lhs == idents::MESSAGE {
            let text = value.trim_matches('"').to_string();
            return Some(TraceEvent::Message {
                state: s.state.clone(),
                thread: walk.last_thread,
                text,
            });
        }

        // Branch and loop decisions (extra tracking). The guard temporaries
        // are whole identifiers, so a prefix match; the loop sentinel shares
        // the loop prefix but is not a decision.
        let branch_kind = if s.lhs.starts_with(idents::IF_COND_PREFIX) {
            Some(false)
        } else if s.lhs.starts_with(idents::LOOP_PREFIX) && s.lhs != idents::LOOP_CHECK {
            Some(true)
        } else {
            None
        };
        if let Some(loop_head) = branch_kind {
            let taken = match value {
                "TRUE" => true,
                "FALSE" => false,
                _ => {
                    warn!("unable to convert state {}", s.state);
                    return None;
                }
            };
            return Some(TraceEvent::Branch {
                state: s.state.clone(),
                coord: self.resolve(s.line),
                thread: walk.last_thread,
                taken,
                loop_head,
            });
        }

        self.plain_assignment(s, walk)
    }

    /// The general case: restore variable names, resolve the coordinate,
    /// and filter out simulation-internal noise.
    fn plain_assignment(&self, s: &RawState, walk: &Walk) -> Option<TraceEvent> {
        let coord = self.resolve(s.line);

        let mut thread = None;
        let mut function = None;
        if let Some(f) = &s.function {
            thread = self.threads.index_of(f);
            function = self.threads.original_of(f).map(str::to_string);
        }
        let thread = thread.unwrap_or(walk.last_thread);

        let lhs = self.varnames.original(&s.lhs).to_string();

        let rightvar = s.rhs.rfind(" (").map_or(s.rhs.as_str(), |i| &s.rhs[..i]);
        let rhs = match rightvar.strip_prefix('&') {
            Some(bare) => format!("&{}", self.varnames.original(bare)),
            None => self.varnames.original(rightvar).to_string(),
        };

        // Injected simulation state never reaches the user.
        if lhs.starts_with(idents::INTERNAL_PREFIX) && lhs != idents::MESSAGE {
            return None;
        }
        // A state that cannot be placed anywhere is dropped, not guessed.
        if coord.is_unknown() {
            return None;
        }

        let scope = self.varnames.scope(&s.lhs).map(str::to_string);

        Some(TraceEvent::Assignment {
            state: s.state.clone(),
            coord,
            thread,
            function,
            lhs,
            rhs,
            scope,
        })
    }

    fn map_violation(&self, v: &RawViolation) -> Violation {
        let tokens: Vec<&str> = v.location.split_whitespace().collect();
        let keys: HashMap<&str, &str> = tokens
            .chunks(2)
            .filter(|pair| pair.len() == 2)
            .map(|pair| (pair[0], pair[1]))
            .collect();
        let coord = self.resolve(keys.get("line").and_then(|l| l.parse().ok()));

        Violation {
            location: format!("  file {} line {}", coord.file, coord.line),
            property: v.property.clone(),
            value: v.value.clone(),
            loop_bound: v.value.contains(idents::LOOP_CHECK),
        }
    }

    fn resolve(&self, line: Option<u32>) -> TraceCoord {
        match line.and_then(|l| self.chain.resolve(l)) {
            Some(coord) => TraceCoord::new(
                coord.line.to_string(),
                coord.file.unwrap_or_else(|| "?".to_string()),
            ),
            None => TraceCoord::unknown(),
        }
    }

    /// Render the decoded trace in the line-oriented human-readable form.
    #[must_use]
    pub fn render(&self, trace: &DecodedTrace) -> String {
        let mut body = String::new();

        for event in &trace.events {
            let (header, separator, payload) = render_event(event);
            body.push_str(&header);
            body.push('\n');
            body.push_str(separator);
            body.push('\n');
            body.push_str(&payload);
            body.push_str("\n\n");
        }

        if let Some(v) = &trace.violation {
            body.push_str(&format!(
                "Violated property:\n{}\n{}\n{}\n",
                v.location, v.property, v.value
            ));
            body.push_str(if v.loop_bound {
                "\nLOOP BOUND EXCEEDED"
            } else {
                "\nVERIFICATION FAILED"
            });
        }

        if body.is_empty() {
            String::new()
        } else {
            format!("Counterexample:\n\n{body}\n\n")
        }
    }
}

fn render_event(event: &TraceEvent) -> (String, &'static str, String) {
    match event {
        TraceEvent::ContextSwitch {
            state,
            thread,
            name,
        } => (
            format!("State {state}"),
            EVENT_SEPARATOR,
            format!("  thread {thread} ({name}) scheduled"),
        ),
        TraceEvent::ThreadCreated {
            state,
            coord,
            creator,
            created,
            ..
        } => (
            format!(
                "State {state} file {} line {} thread {creator}",
                coord.file, coord.line
            ),
            EVENT_SEPARATOR,
            format!("  pthread_create(thread {created})"),
        ),
        TraceEvent::ThreadExited {
            state,
            line,
            thread,
            ..
        } => (
            format!("State {state} file  line {line} thread {thread}"),
            EVENT_SEPARATOR,
            format!("  pthread_exit(thread {thread})"),
        ),
        TraceEvent::CondSignal {
            state,
            coord,
            thread,
            cond,
        } => (
            state_header(state, coord, *thread),
            EVENT_SEPARATOR,
            format!("  pthread_cond_signal({cond})"),
        ),
        TraceEvent::CondWait {
            state,
            coord,
            thread,
            cond,
        } => (
            state_header(state, coord, *thread),
            EVENT_SEPARATOR,
            format!("  pthread_cond_wait({cond},?)"),
        ),
        TraceEvent::MutexLock {
            state,
            coord,
            thread,
            mutex,
        } => (
            state_header(state, coord, *thread),
            EVENT_SEPARATOR,
            format!("  pthread_mutex_lock({mutex})"),
        ),
        TraceEvent::MutexUnlock {
            state,
            coord,
            thread,
            mutex,
        } => (
            state_header(state, coord, *thread),
            EVENT_SEPARATOR,
            format!("  pthread_mutex_unlock({mutex})"),
        ),
        TraceEvent::MutexDestroy {
            state,
            coord,
            thread,
            mutex,
        } => (
            state_header(state, coord, *thread),
            EVENT_SEPARATOR,
            format!("  pthread_mutex_destroy({mutex})"),
        ),
        TraceEvent::Message {
            state,
            thread,
            text,
        } => (
            format!("State {state} thread {thread}"),
            EVENT_SEPARATOR,
            format!("  {text}"),
        ),
        TraceEvent::Branch {
            state,
            coord,
            thread,
            taken,
            loop_head,
        } => {
            let outcome = if *taken { "TRUE" } else { "FALSE" };
            let payload = if *loop_head {
                format!("  loop branch {outcome}")
            } else {
                format!("  branch {outcome}")
            };
            (state_header(state, coord, *thread), EVENT_SEPARATOR, payload)
        }
        TraceEvent::Assignment {
            state,
            coord,
            thread,
            function,
            lhs,
            rhs,
            ..
        } => {
            let header = match function {
                Some(function) if !function.is_empty() => format!(
                    "State {state} file {} line {} function {function} thread {thread}",
                    coord.file, coord.line
                ),
                _ => state_header(state, coord, *thread),
            };
            (header, BLOCK_SEPARATOR, format!("  {lhs}={rhs}"))
        }
    }
}

fn state_header(state: &str, coord: &TraceCoord, thread: u32) -> String {
    format!(
        "State {state} file {} line {} thread {thread}",
        coord.file, coord.line
    )
}

/// Value with the binary-encoding suffix stripped.
fn prefix_value(rhs: &str) -> &str {
    rhs.find(" (").map_or(rhs, |i| &rhs[..i])
}

fn first_token(rhs: &str) -> &str {
    rhs.split_whitespace().next().unwrap_or(rhs)
}

/// Thread index of a committed-counter write like `__cs_pc[3]`.
fn pc_index(lhs: &str) -> Option<u32> {
    let rest = lhs.strip_prefix(idents::PC)?.strip_prefix('[')?;
    rest[..rest.find(']')?].parse().ok()
}
