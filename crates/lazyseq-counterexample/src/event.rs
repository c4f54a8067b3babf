//! Decoded trace events
//!
//! One variant per recognized synthetic-identifier class, plus the plain
//! assignment everything else maps to. Events carry display coordinates
//! already resolved against the original input; unresolvable halves render
//! as `?`.

use serde::{Deserialize, Serialize};

/// A display coordinate in the original input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceCoord {
    pub line: String,
    pub file: String,
}

impl TraceCoord {
    #[must_use]
    pub fn new(line: impl Into<String>, file: impl Into<String>) -> Self {
        Self {
            line: line.into(),
            file: file.into(),
        }
    }

    /// Both halves unresolved.
    #[must_use]
    pub fn unknown() -> Self {
        Self::new("?", "?")
    }

    #[must_use]
    pub fn is_unknown(&self) -> bool {
        self.line == "?" && self.file == "?"
    }
}

/// One event of the reconstructed concurrent trace
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TraceEvent {
    /// The scheduler handed control to `thread`
    ContextSwitch {
        state: String,
        thread: u32,
        /// Original start-routine name of the scheduled thread
        name: String,
    },

    /// `pthread_create` ran in `creator`, spawning `created`
    ThreadCreated {
        state: String,
        coord: TraceCoord,
        creator: u32,
        created: u32,
        /// Original start-routine name of the created thread
        created_name: String,
    },

    /// A thread's committed counter reached its size
    ThreadExited {
        state: String,
        /// Input line of the thread's last statement
        line: u32,
        thread: u32,
        /// Original start-routine name, for the witness returnFrom edge
        function: String,
    },

    CondSignal {
        state: String,
        coord: TraceCoord,
        thread: u32,
        cond: String,
    },

    CondWait {
        state: String,
        coord: TraceCoord,
        thread: u32,
        cond: String,
    },

    MutexLock {
        state: String,
        coord: TraceCoord,
        thread: u32,
        mutex: String,
    },

    MutexUnlock {
        state: String,
        coord: TraceCoord,
        thread: u32,
        mutex: String,
    },

    MutexDestroy {
        state: String,
        coord: TraceCoord,
        thread: u32,
        mutex: String,
    },

    /// Explicit user message channel
    Message {
        state: String,
        thread: u32,
        text: String,
    },

    /// Branch or loop decision (extra tracking only)
    Branch {
        state: String,
        coord: TraceCoord,
        thread: u32,
        taken: bool,
        loop_head: bool,
    },

    /// Plain variable assignment, names already restored
    Assignment {
        state: String,
        coord: TraceCoord,
        thread: u32,
        function: Option<String>,
        lhs: String,
        rhs: String,
        /// Owning function when the identifier was a renamed local
        scope: Option<String>,
    },
}

impl TraceEvent {
    /// Thread the event is attributed to.
    #[must_use]
    pub fn thread(&self) -> u32 {
        match self {
            TraceEvent::ContextSwitch { thread, .. }
            | TraceEvent::ThreadExited { thread, .. }
            | TraceEvent::CondSignal { thread, .. }
            | TraceEvent::CondWait { thread, .. }
            | TraceEvent::MutexLock { thread, .. }
            | TraceEvent::MutexUnlock { thread, .. }
            | TraceEvent::MutexDestroy { thread, .. }
            | TraceEvent::Message { thread, .. }
            | TraceEvent::Branch { thread, .. }
            | TraceEvent::Assignment { thread, .. } => *thread,
            TraceEvent::ThreadCreated { creator, .. } => *creator,
        }
    }
}

/// The mapped `Violated property` block closing a trace
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    /// `  file F line L`, already resolved
    pub location: String,
    /// The `assertion ...` line, verbatim
    pub property: String,
    /// The violated expression line, verbatim
    pub value: String,
    /// The assertion mentions the loop-bound sentinel: the bound was too
    /// small, the property itself did not fail
    pub loop_bound: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coord_unknown() {
        assert!(TraceCoord::unknown().is_unknown());
        assert!(!TraceCoord::new("4", "?").is_unknown());
    }

    #[test]
    fn test_event_thread_attribution() {
        let e = TraceEvent::ThreadCreated {
            state: "9".into(),
            coord: TraceCoord::unknown(),
            creator: 0,
            created: 1,
            created_name: "worker".into(),
        };
        assert_eq!(e.thread(), 0);
    }
}
