//! Async processing orchestrator.
//!
//! Runs [`process_paths`] on a blocking tokio task and forwards its
//! [`ProgressEvent`]s through an `mpsc` channel, so a front end can render
//! progress and request cancellation without sharing mutable state with the
//! engine. A completed run is written to an xlsx report before the task ends.

use std::path::{Path, PathBuf};

use ledger_core::error::{ClaimsError, Result};
use ledger_core::policy::EngineConfig;
use ledger_data::analysis::{
    process_paths, CancelFlag, ProcessingResult, ProgressEvent, ProgressStage, RunOutcome,
};
use ledger_data::report::{write_report, XlsxReportSink};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Progress events buffered before new ones are dropped.
pub const PROGRESS_BUFFER: usize = 64;

// ── Public types ──────────────────────────────────────────────────────────────

/// What a finished run produced.
#[derive(Debug, Clone)]
pub struct ProcessingRun {
    pub result: ProcessingResult,
    /// Where the report was written; `None` when the run found no claims.
    pub report_path: Option<PathBuf>,
}

// ── ProcessingOrchestrator ────────────────────────────────────────────────────

/// One processing run, configured up front.
///
/// Call [`ProcessingOrchestrator::start`] to run it in the background.
pub struct ProcessingOrchestrator {
    inputs: Vec<PathBuf>,
    seed_report: Option<PathBuf>,
    output: PathBuf,
    config: EngineConfig,
}

impl ProcessingOrchestrator {
    /// Create a run over `inputs` (files or directories) writing to `output`.
    pub fn new(inputs: Vec<PathBuf>, output: PathBuf, config: EngineConfig) -> Self {
        Self {
            inputs,
            seed_report: None,
            output,
            config,
        }
    }

    /// Continue from a previously written report.
    pub fn with_seed_report(mut self, seed_report: Option<PathBuf>) -> Self {
        self.seed_report = seed_report;
        self
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    /// Start the run.
    ///
    /// Returns the receiving end of the progress channel and a
    /// [`ProcessingHandle`] for cancelling and awaiting the run. The channel
    /// closes once the run has finished.
    pub fn start(self) -> (mpsc::Receiver<ProgressEvent>, ProcessingHandle) {
        let (tx, rx) = mpsc::channel(PROGRESS_BUFFER);
        let cancel = CancelFlag::new();
        let flag = cancel.clone();

        let handle = tokio::task::spawn_blocking(move || self.run(&flag, &tx));

        (rx, ProcessingHandle { cancel, handle })
    }

    // ── Private implementation ────────────────────────────────────────────

    fn run(self, cancel: &CancelFlag, tx: &mpsc::Sender<ProgressEvent>) -> Result<ProcessingRun> {
        let mut forward = |event: ProgressEvent| send_progress(tx, event);

        let result = process_paths(
            &self.inputs,
            self.seed_report.as_deref(),
            &self.config,
            cancel,
            &mut forward,
        )?;

        if result.outcome == RunOutcome::NoData {
            tracing::warn!("no valid claims found; report not written");
            return Ok(ProcessingRun {
                result,
                report_path: None,
            });
        }

        cancel.check()?;
        let total = result.summaries.len();
        forward(ProgressEvent {
            stage: ProgressStage::Writing,
            current: total,
            total,
            label: self.output.display().to_string(),
        });
        write_report(&mut XlsxReportSink::new(&self.output), &result.summaries)?;

        Ok(ProcessingRun {
            result,
            report_path: Some(self.output),
        })
    }
}

/// Forward one event without blocking the engine on a slow consumer.
fn send_progress(tx: &mpsc::Sender<ProgressEvent>, event: ProgressEvent) {
    if let Err(e) = tx.try_send(event) {
        tracing::debug!(error = %e, "progress event dropped");
    }
}

// ── ProcessingHandle ──────────────────────────────────────────────────────────

/// A handle to the background run.
pub struct ProcessingHandle {
    cancel: CancelFlag,
    handle: JoinHandle<Result<ProcessingRun>>,
}

impl ProcessingHandle {
    /// Ask the run to stop at the next file or period boundary.
    pub fn cancel(&self) {
        tracing::info!("cancellation requested");
        self.cancel.cancel();
    }

    /// A clone of the run's cancel flag, e.g. for a signal handler.
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the run to finish.
    pub async fn join(self) -> Result<ProcessingRun> {
        match self.handle.await {
            Ok(result) => result,
            Err(e) => Err(ClaimsError::Io(e.into())),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
