//! Portfolio analysis
//!
//! Runs several backend invocations of the same sequentialized program
//! concurrently, each shard with its own extra arguments (a search
//! partition, a larger round bound, a different unwinding depth). The first
//! shard to report a violation or a crash wins and the siblings are
//! cancelled; if every shard completes cleanly the last finisher's result
//! stands.

use crate::runner::{BackendConfig, BackendRunner};
use crate::BackendError;
use lazyseq_core::{VerificationResult, VerificationStatus};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info};

/// One portfolio member
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioShard {
    pub name: String,

    /// Arguments appended after the configured backend arguments
    pub extra_args: Vec<String>,
}

impl PortfolioShard {
    #[must_use]
    pub fn new(name: impl Into<String>, extra_args: Vec<String>) -> Self {
        Self {
            name: name.into(),
            extra_args,
        }
    }
}

/// Concurrent multi-shard analysis of one program.
pub struct PortfolioAnalysis {
    config: BackendConfig,
    shards: Vec<PortfolioShard>,
}

impl PortfolioAnalysis {
    #[must_use]
    pub fn new(config: BackendConfig, shards: Vec<PortfolioShard>) -> Self {
        Self { config, shards }
    }

    /// Write `program` once and race every shard over it.
    pub async fn run(&self, program: &str) -> Result<VerificationResult, BackendError> {
        if self.shards.is_empty() {
            return Err(BackendError::EmptyPortfolio);
        }

        let dir = tempfile::tempdir()?;
        let path = dir.path().join("seq.c");
        std::fs::write(&path, program)?;
        self.run_file(&path).await
    }

    async fn run_file(&self, path: &Path) -> Result<VerificationResult, BackendError> {
        let (cancel_tx, _) = broadcast::channel::<()>(1);
        let (done_tx, mut done_rx) =
            mpsc::channel::<(String, Result<VerificationResult, BackendError>)>(self.shards.len());

        let mut handles = Vec::with_capacity(self.shards.len());
        for shard in &self.shards {
            let shard = shard.clone();
            let runner = BackendRunner::new(self.config.clone());
            let path = path.to_path_buf();
            let mut cancel = cancel_tx.subscribe();
            let done = done_tx.clone();

            handles.push(tokio::spawn(async move {
                match runner
                    .run_file_until(&path, &shard.extra_args, &mut cancel)
                    .await
                {
                    Some(result) => {
                        let _ = done.send((shard.name, result)).await;
                    }
                    None => debug!("shard {} cancelled", shard.name),
                }
            }));
        }
        drop(done_tx);

        let mut last: Option<VerificationResult> = None;
        let mut last_error: Option<BackendError> = None;

        while let Some((name, outcome)) = done_rx.recv().await {
            match outcome {
                Ok(result) => {
                    let decisive = matches!(
                        result.status,
                        VerificationStatus::Unsafe | VerificationStatus::Error { .. }
                    );
                    if decisive {
                        info!("shard {name} wins with {}", result.status);
                        let _ = cancel_tx.send(());
                        for handle in handles {
                            let _ = handle.await;
                        }
                        return Ok(result.with_diagnostic(format!("portfolio shard: {name}")));
                    }
                    last = Some(result.with_diagnostic(format!("portfolio shard: {name}")));
                }
                Err(e) => last_error = Some(e),
            }
        }

        match (last, last_error) {
            (Some(result), _) => Ok(result),
            (None, Some(e)) => Err(e),
            (None, None) => Err(BackendError::EmptyPortfolio),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lazyseq_core::BackendKind;
    use std::time::{Duration, Instant};

    fn shell_config() -> BackendConfig {
        BackendConfig {
            kind: BackendKind::Cbmc,
            binary: Some("/bin/sh".to_string()),
            args: vec!["-c".to_string()],
            timeout: Duration::from_secs(30),
        }
    }

    #[tokio::test]
    async fn test_first_violation_wins_and_cancels_siblings() {
        let portfolio = PortfolioAnalysis::new(
            shell_config(),
            vec![
                PortfolioShard::new("slow-safe", vec![
                    "sleep 20; echo VERIFICATION SUCCESSFUL".to_string(),
                ]),
                PortfolioShard::new("fast-unsafe", vec![
                    "echo VERIFICATION FAILED".to_string(),
                ]),
            ],
        );
        let start = Instant::now();
        let result = portfolio.run("int main(void) { return 0; }").await.unwrap();
        assert_eq!(result.status, VerificationStatus::Unsafe);
        assert!(result
            .diagnostics
            .iter()
            .any(|d| d.contains("fast-unsafe")));
        // the sleeping sibling was cancelled, not awaited to completion
        assert!(start.elapsed() < Duration::from_secs(15));
    }

    #[tokio::test]
    async fn test_losing_shard_descendants_are_killed() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("survivor");
        let slow = format!("(sleep 2; touch {}) & sleep 20", marker.display());
        let portfolio = PortfolioAnalysis::new(
            shell_config(),
            vec![
                PortfolioShard::new("slow", vec![slow]),
                PortfolioShard::new("fast-unsafe", vec![
                    "echo VERIFICATION FAILED".to_string(),
                ]),
            ],
        );

        let result = portfolio.run("int main(void) { return 0; }").await.unwrap();
        assert_eq!(result.status, VerificationStatus::Unsafe);

        // nothing forked by the cancelled shard survives to write the marker
        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert!(!marker.exists());
    }

    #[tokio::test]
    async fn test_all_safe_returns_last_finisher() {
        let portfolio = PortfolioAnalysis::new(
            shell_config(),
            vec![
                PortfolioShard::new("a", vec!["echo VERIFICATION SUCCESSFUL".to_string()]),
                PortfolioShard::new("b", vec!["echo VERIFICATION SUCCESSFUL".to_string()]),
            ],
        );
        let result = portfolio.run("int main(void) { return 0; }").await.unwrap();
        assert_eq!(result.status, VerificationStatus::Safe);
    }

    #[tokio::test]
    async fn test_empty_portfolio_is_an_error() {
        let portfolio = PortfolioAnalysis::new(shell_config(), vec![]);
        let err = portfolio.run("int main(void) { return 0; }").await.unwrap_err();
        assert!(matches!(err, BackendError::EmptyPortfolio));
    }

    #[tokio::test]
    async fn test_spawn_failure_surfaces_when_no_shard_finishes() {
        let config = BackendConfig {
            kind: BackendKind::Cbmc,
            binary: Some("/nonexistent/lazyseq-no-such-backend".to_string()),
            args: vec![],
            timeout: Duration::from_secs(1),
        };
        let portfolio = PortfolioAnalysis::new(
            config,
            vec![PortfolioShard::new("only", vec![])],
        );
        let err = portfolio.run("int main(void) { return 0; }").await.unwrap_err();
        assert!(matches!(err, BackendError::Spawn(_)));
    }
}
