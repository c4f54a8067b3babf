//! Backend identification and verification outcomes

use crate::idents;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Supported bounded model checking backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BackendKind {
    /// Stock CBMC
    Cbmc,

    /// CBMC with the extended concurrency-aware instrumentation
    CbmcExt,

    /// CBMC in SV-COMP configuration (witness-oriented output)
    CbmcSvcomp,

    /// ESBMC
    Esbmc,
}

impl BackendKind {
    /// Marker line the backend prints when no property is violated
    #[must_use]
    pub fn ok_marker(&self) -> &'static str {
        match self {
            Self::Cbmc | Self::CbmcExt | Self::CbmcSvcomp => "VERIFICATION SUCCESSFUL",
            Self::Esbmc => "VERIFICATION SUCCESSFUL",
        }
    }

    /// Marker line the backend prints when a violation was found
    #[must_use]
    pub fn ko_marker(&self) -> &'static str {
        match self {
            Self::Cbmc | Self::CbmcExt | Self::CbmcSvcomp => "VERIFICATION FAILED",
            Self::Esbmc => "VERIFICATION FAILED",
        }
    }

    /// Whether this backend emits a state-by-state trace we can decode
    #[must_use]
    pub fn supports_trace(&self) -> bool {
        matches!(self, Self::Cbmc | Self::CbmcExt | Self::CbmcSvcomp)
    }

    /// Command name of the backend binary
    #[must_use]
    pub fn command(&self) -> &'static str {
        match self {
            Self::Cbmc => "cbmc",
            Self::CbmcExt => "cbmc-ext",
            Self::CbmcSvcomp => "cbmc-svcomp",
            Self::Esbmc => "esbmc",
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.command())
    }
}

impl std::str::FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cbmc" => Ok(Self::Cbmc),
            "cbmc-ext" => Ok(Self::CbmcExt),
            "cbmc-svcomp" => Ok(Self::CbmcSvcomp),
            "esbmc" => Ok(Self::Esbmc),
            other => Err(format!("unknown backend: {other}")),
        }
    }
}

/// Outcome of one backend run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum VerificationStatus {
    /// No violation within the explored bounds
    Safe,

    /// A violation was found
    Unsafe,

    /// The loop unwinding bound was too small for a verdict
    LoopBoundExceeded,

    /// The backend produced neither marker
    Unknown { reason: String },

    /// The backend exceeded its time budget
    Timeout,

    /// The backend failed to run or crashed
    Error { message: String },
}

impl VerificationStatus {
    /// Check whether this outcome is definitive (safe or unsafe)
    #[must_use]
    pub fn is_definitive(&self) -> bool {
        matches!(self, Self::Safe | Self::Unsafe)
    }

    /// Check whether a counterexample trace should be decoded
    #[must_use]
    pub fn has_violation(&self) -> bool {
        matches!(self, Self::Unsafe)
    }
}

impl std::fmt::Display for VerificationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Safe => write!(f, "SAFE"),
            Self::Unsafe => write!(f, "UNSAFE"),
            Self::LoopBoundExceeded => write!(f, "LOOP BOUND EXCEEDED"),
            Self::Unknown { reason } => write!(f, "UNKNOWN: {reason}"),
            Self::Timeout => write!(f, "TIMEOUT"),
            Self::Error { message } => write!(f, "ERROR: {message}"),
        }
    }
}

/// Classify a backend's raw output by scanning for its marker lines.
///
/// A violated assertion over the loop unwinding sentinel downgrades a
/// failure to `LoopBoundExceeded`: the bound was too small, the property
/// itself was not refuted.
#[must_use]
pub fn scan_outcome(backend: BackendKind, output: &str) -> VerificationStatus {
    if output.contains(backend.ko_marker()) {
        if output.contains(idents::LOOP_CHECK) {
            VerificationStatus::LoopBoundExceeded
        } else {
            VerificationStatus::Unsafe
        }
    } else if output.contains(backend.ok_marker()) {
        VerificationStatus::Safe
    } else {
        VerificationStatus::Unknown {
            reason: "backend produced no verdict".to_string(),
        }
    }
}

/// Result of a full pipeline run against one backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationResult {
    /// Outcome
    pub status: VerificationStatus,

    /// Backend that produced the outcome
    pub backend: BackendKind,

    /// Raw backend output, kept for decoding and diagnostics
    pub raw_output: String,

    /// Diagnostic messages
    pub diagnostics: Vec<String>,

    /// Time taken by the backend
    pub duration: Duration,
}

impl VerificationResult {
    /// Create a result by scanning the backend's output
    #[must_use]
    pub fn from_output(backend: BackendKind, output: String, duration: Duration) -> Self {
        Self {
            status: scan_outcome(backend, &output),
            backend,
            raw_output: output,
            diagnostics: Vec::new(),
            duration,
        }
    }

    /// Create a timeout result
    #[must_use]
    pub fn timeout(backend: BackendKind, duration: Duration) -> Self {
        Self {
            status: VerificationStatus::Timeout,
            backend,
            raw_output: String::new(),
            diagnostics: vec!["backend timed out".to_string()],
            duration,
        }
    }

    /// Create an error result
    #[must_use]
    pub fn error(backend: BackendKind, message: String, duration: Duration) -> Self {
        Self {
            status: VerificationStatus::Error {
                message: message.clone(),
            },
            backend,
            raw_output: String::new(),
            diagnostics: vec![message],
            duration,
        }
    }

    /// Add a diagnostic message
    #[must_use]
    pub fn with_diagnostic(mut self, diagnostic: String) -> Self {
        self.diagnostics.push(diagnostic);
        self
    }
}

impl std::fmt::Display for VerificationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}, {:?})", self.status, self.backend, self.duration)
    }
}
