//! Lazy sequentialization engine
//!
//! Verifies multithreaded C programs by reduction to sequential bounded
//! model checking:
//!
//! - the **encoder** clones each spawned function per creation site, stamps
//!   visible statements with guarded jump labels, and synthesizes a
//!   sequential `main` that replays every interleaving a schedule bound
//!   admits (round-robin rounds or context switches)
//! - the **backend** layer hands the sequentialized program to a CPROVER
//!   family model checker, with timeouts and portfolio racing
//! - the **counterexample** layer maps a violating trace back to the
//!   original threads, lines and variable names, and can emit an SV-COMP
//!   GraphML violation witness
//!
//! The interleaving exploration is symbolic: the scheduler's round and
//! context bounds are nondeterministic variables the backend searches over,
//! so one sequential program covers the whole bounded schedule space.

pub mod engine;

pub use lazyseq_backend as backend;
pub use lazyseq_core::*;
pub use lazyseq_counterexample as counterexample;
pub use lazyseq_encoder as encoder;

pub use engine::{Pipeline, PipelineConfig, PipelineError, PipelineOutcome, WitnessRequest};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
