//! Pipeline engine
//!
//! Ties the passes together: encode the flattened program, hand the
//! sequentialized text to a backend, and when the backend finds a violation
//! translate its trace back to the original program (optionally as an
//! SV-COMP witness). Each pass hands an immutable artifact plus its line-map
//! stage to the next; there is no concurrency inside the pipeline itself.

use lazyseq_backend::{BackendConfig, BackendError, BackendRunner};
use lazyseq_core::{BackendKind, EncodeConfig, LineMapChain, VarNameMap, VerificationResult};
use lazyseq_counterexample::{
    now_timestamp, sha256_hex, DecodedTrace, Decoder, WitnessBuilder,
};
use lazyseq_encoder::{EncodeError, EncodeOutput, Program, SymbolQuery};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

/// Witness generation parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WitnessRequest {
    /// Path recorded as the witness `programfile`
    pub program_file: String,

    /// Original program text, hashed into `programhash`
    pub program_source: String,

    /// First line of the original `main`
    pub entry_line: u32,

    /// Fixed creation timestamp; wall clock when absent
    pub creation_time: Option<String>,
}

/// Configuration of one pipeline run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub encode: EncodeConfig,

    /// Backend to verify with; `None` stops after encoding
    pub backend: Option<BackendConfig>,

    /// Emit a GraphML witness for violations
    pub witness: Option<WitnessRequest>,
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Everything a pipeline run produced
pub struct PipelineOutcome {
    pub encoded: EncodeOutput,

    /// Prior stages plus the encoder's own stage
    pub chain: LineMapChain,

    pub result: Option<VerificationResult>,

    /// Decoded concurrent trace, when the backend found a violation
    pub trace: Option<DecodedTrace>,

    /// The trace rendered in the line-oriented human-readable form
    pub trace_text: Option<String>,

    /// GraphML violation witness, when requested
    pub witness: Option<String>,
}

pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    #[must_use]
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    /// Run the whole pipeline on a flattened program.
    ///
    /// `prior` carries the line maps of upstream stages (merging,
    /// flattening) so decoded coordinates land in the original input;
    /// `varnames` the upstream scope renamings for the same reason.
    pub async fn run(
        &self,
        program: Program,
        sym: &dyn SymbolQuery,
        varnames: &VarNameMap,
        prior: LineMapChain,
    ) -> Result<PipelineOutcome, PipelineError> {
        let encoded = lazyseq_encoder::encode(program, sym, &self.config.encode)?;
        let mut chain = prior;
        chain.push(encoded.line_map.clone());
        debug!(
            "encoded {} threads, {} line-map stages",
            encoded.threads.count(),
            chain.stage_count()
        );

        let mut outcome = PipelineOutcome {
            encoded,
            chain,
            result: None,
            trace: None,
            trace_text: None,
            witness: None,
        };

        let Some(backend) = &self.config.backend else {
            return Ok(outcome);
        };

        let runner = BackendRunner::new(backend.clone());
        let result = runner.run(&outcome.encoded.text).await?;
        info!("backend verdict: {}", result.status);

        if result.status.has_violation() {
            let decoder = self.decoder(&outcome, varnames, backend.kind);
            let trace = decoder.decode(&result.raw_output);
            outcome.trace_text = Some(decoder.render(&trace));

            if let Some(request) = &self.config.witness {
                let mut builder = WitnessBuilder::new();
                for event in &trace.events {
                    builder.record(event);
                }
                let time = request
                    .creation_time
                    .clone()
                    .unwrap_or_else(now_timestamp);
                outcome.witness = Some(builder.build(
                    &request.program_file,
                    &sha256_hex(request.program_source.as_bytes()),
                    &time,
                    request.entry_line,
                ));
            }
            outcome.trace = Some(trace);
        }

        outcome.result = Some(result);
        Ok(outcome)
    }

    /// Decoder wired up with a run's metadata, for decoding traces obtained
    /// outside `run` (a backend invoked by hand, a saved trace).
    #[must_use]
    pub fn decoder(
        &self,
        outcome: &PipelineOutcome,
        varnames: &VarNameMap,
        backend: BackendKind,
    ) -> Decoder {
        Decoder::new(
            outcome.chain.clone(),
            outcome.encoded.threads.clone(),
            outcome.encoded.meta.clone(),
            varnames.clone(),
            self.config.encode.mode,
            backend,
        )
    }
}
