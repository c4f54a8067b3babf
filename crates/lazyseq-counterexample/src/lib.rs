//! Counterexample decoding and witness generation
//!
//! Translates a backend's raw counterexample back into the terms of the
//! original concurrent program:
//!
//! - `parse` splits the raw trace into state blocks, best-effort
//! - `decoder` classifies each state into a scheduling event, a
//!   synchronization event, or a plain assignment, resolving coordinates
//!   through the pipeline's line-map chain and undoing variable renamings
//! - `event` is the decoded event vocabulary
//! - `witness` renders the decoded trace as an SV-COMP GraphML violation
//!   witness
//!
//! Decoding is deterministic: the same raw trace and metadata always yield
//! the same events and the same rendered text.

pub mod decoder;
pub mod event;
pub mod parse;
pub mod witness;

pub use decoder::{DecodedTrace, Decoder};
pub use event::{TraceCoord, TraceEvent, Violation};
pub use parse::{parse_trace, RawEntry, RawState, RawViolation};
pub use witness::{now_timestamp, sha256_hex, WitnessBuilder};
