//! Backend invocation
//!
//! The sequentialized program is plain C; verifying it means handing it to
//! an external bounded model checker and reading the verdict back:
//!
//! - `runner` does one invocation: temp file, own process group, wall-clock
//!   timeout, output capture and classification
//! - `portfolio` races several differently-parameterized invocations and
//!   keeps the first violation

use thiserror::Error;

pub mod portfolio;
pub mod runner;

pub use portfolio::{PortfolioAnalysis, PortfolioShard};
pub use runner::{BackendConfig, BackendRunner};

/// Failures while trying to run a backend. Verdicts, timeouts and backend
/// crashes are not errors; they come back as a `VerificationResult`.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to spawn backend {0}")]
    Spawn(String),

    #[error("portfolio has no shards")]
    EmptyPortfolio,
}
