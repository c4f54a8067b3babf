//! Encoder errors

use lazyseq_core::Coord;
use thiserror::Error;

/// Fatal conditions raised while encoding
#[derive(Debug, Error)]
pub enum EncodeError {
    /// A construct the encoder cannot model soundly
    #[error("{construct} not supported at {coord}: {snippet}")]
    Unsupported {
        construct: String,
        coord: Coord,
        snippet: String,
    },

    /// More thread creations than the declared maximum
    #[error("thread bound of {max} exceeded at {coord}: {snippet}")]
    ThreadBoundExceeded {
        max: u32,
        coord: Coord,
        snippet: String,
    },

    /// A duplicated function name already exists in the program
    #[error("duplicated function name collides with existing symbol: {name}")]
    NameCollision { name: String },

    /// `return` inside a thread body (threads must exit via pthread_exit)
    #[error("return statement in thread {thread} at {coord}")]
    ReturnInThread { thread: String, coord: Coord },

    /// A `goto` targets a label that does not exist
    #[error("goto to undefined label {label} at {coord}")]
    UndefinedLabel { label: String, coord: Coord },

    /// The program has no entry function
    #[error("no main function in input program")]
    NoMain,
}

impl EncodeError {
    pub(crate) fn unsupported(construct: &str, line: u32, snippet: String) -> Self {
        Self::Unsupported {
            construct: construct.to_string(),
            coord: Coord::line(line),
            snippet,
        }
    }
}
