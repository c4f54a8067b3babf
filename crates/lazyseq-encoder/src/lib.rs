//! Lazy sequentialization encoder
//!
//! Turns a flattened multithreaded program into a single sequential C
//! program whose `main` nondeterministically explores thread interleavings
//! under a schedule bound:
//!
//! - `condwait` splits blocking condition waits into a release half and a
//!   reacquire half so a context switch can fall between them
//! - `duplicator` clones each spawned function once per creation site and
//!   binds every `pthread_create` to its copy
//! - `labels` decides which statements are context-switch points
//! - `synth` stamps the labels, emits the concurrency model and assembles
//!   the output text together with its line map and control metadata
//! - `driver` builds the scheduler `main` (round-robin or context-bounded)
//!
//! The sequentialized text goes to a bounded model checker; the metadata in
//! [`EncodeOutput`] lets the decoder map its trace back to the input.

pub mod ast;
pub mod condwait;
pub mod driver;
pub mod duplicator;
pub mod error;
pub mod labels;
pub mod symtab;
pub mod synth;

pub use ast::{Expr, Function, Program, Stmt, StmtKind};
pub use condwait::split_waits;
pub use duplicator::{DuplicationResult, Duplicator};
pub use error::EncodeError;
pub use labels::{LabelKind, LabelRecord};
pub use symtab::{SymbolQuery, SymbolTable};
pub use synth::{BitwidthMap, EncodeOutput, Synthesizer};

use lazyseq_core::EncodeConfig;

/// Run the whole encoding pipeline on a flattened program.
pub fn encode(
    mut program: Program,
    sym: &dyn SymbolQuery,
    config: &EncodeConfig,
) -> Result<EncodeOutput, EncodeError> {
    for function in &mut program.functions {
        split_waits(&mut function.body);
    }
    let duplicated = Duplicator::new(sym, config.max_threads).run(program)?;
    Synthesizer::new(sym, config).run(&duplicated.program, &duplicated.threads)
}
