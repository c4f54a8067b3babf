//! Shared types for the lazy sequentialization pipeline
//!
//! This crate provides the types every other pipeline crate depends on:
//! - `Coord`: source coordinates carried through every transformation
//! - `LineMap` / `LineMapChain`: per-stage output-to-input line mappings and
//!   their backward composition, used to translate counterexamples back to
//!   the original source
//! - `ThreadMap` / `ThreadMeta` / `VarNameMap`: metadata produced by the
//!   duplicator and the synthesizer, consumed by the decoder
//! - `EncodeConfig` / `ScheduleMode` / `Schedule`: the configuration surface
//! - `BackendKind` / `VerificationStatus`: backend identification and outcome
//!   scanning

mod config;
mod coords;
pub mod idents;
mod linemap;
mod metadata;
mod result;

pub use config::*;
pub use coords::*;
pub use linemap::*;
pub use metadata::*;
pub use result::*;

/// Number of bits needed to store values in `0..=max`: `floor(log2(max)) + 1`.
///
/// This is the width the round-robin scheduler assigns to program counters
/// and per-round jump bounds.
#[must_use]
pub fn width_for_max(max: u64) -> u32 {
    if max == 0 {
        1
    } else {
        64 - max.leading_zeros()
    }
}

/// Number of bits needed to distinguish `count` values: `ceil(log2(count))`.
///
/// This is the width the context-bounded scheduler assigns to the thread
/// selector and the per-context jump bound.
#[must_use]
pub fn width_for_count(count: u64) -> u32 {
    if count <= 1 {
        0
    } else {
        64 - (count - 1).leading_zeros()
    }
}
