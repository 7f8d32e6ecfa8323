//! Main processing pipeline.
//!
//! Reads every source, picks and normalises its claims sheet, classifies and
//! sequences the files into periods and folds them through the
//! [`CumulativeAggregator`], returning a [`ProcessingResult`] with the period
//! summaries and a [`RunReport`] of everything that was skipped or flagged.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Local;
use ledger_core::error::{ClaimsError, Result};
use ledger_core::models::{CanonicalField, PeriodSummary};
use ledger_core::policy::EngineConfig;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::aggregator::{CumulativeAggregator, PolicyYearConflict};
use crate::classifier::classify;
use crate::normalizer::select_best_sheet;
use crate::reader::{find_input_files, open_source, SpreadsheetSource};
use crate::seed::load_seed_report;
use crate::sequencer::{group_periods, SequencedFile};

// ── Cancellation & progress ───────────────────────────────────────────────────

/// Shared flag checked between files and between periods.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// `Err(Cancelled)` once [`cancel`](Self::cancel) has been called.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(ClaimsError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Pipeline stage a [`ProgressEvent`] refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ProgressStage {
    Reading,
    Aggregating,
    Writing,
}

impl ProgressStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProgressStage::Reading => "reading",
            ProgressStage::Aggregating => "aggregating",
            ProgressStage::Writing => "writing",
        }
    }
}

/// One unit of progress: `current` of `total` items of `stage` are done.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressEvent {
    pub stage: ProgressStage,
    pub current: usize,
    pub total: usize,
    /// File name or period label just handled.
    pub label: String,
}

// ── Run report ────────────────────────────────────────────────────────────────

/// Why a file (or an already-seeded period) was not processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SkipKind {
    UnresolvedPeriod,
    MissingColumns,
    MissingAmount,
    Unreadable,
    AlreadySeeded,
}

impl SkipKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipKind::UnresolvedPeriod => "unresolved period",
            SkipKind::MissingColumns => "missing columns",
            SkipKind::MissingAmount => "missing amount column",
            SkipKind::Unreadable => "unreadable",
            SkipKind::AlreadySeeded => "already seeded",
        }
    }

    /// Skip kind for an error raised while reading or classifying a file.
    pub fn for_error(err: &ClaimsError) -> Self {
        match err {
            ClaimsError::Schema { missing, .. } if missing.contains(&CanonicalField::Amount) => {
                SkipKind::MissingAmount
            }
            ClaimsError::Schema { .. } => SkipKind::MissingColumns,
            ClaimsError::PeriodUnresolved { .. } => SkipKind::UnresolvedPeriod,
            _ => SkipKind::Unreadable,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedFile {
    pub file: String,
    pub kind: SkipKind,
    pub reason: String,
}

/// Rows of one sheet dropped during normalisation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowRejections {
    pub file: String,
    pub sheet: String,
    pub count: usize,
    pub samples: Vec<String>,
}

/// Everything noteworthy that happened during a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub generated_at: String,
    pub files_seen: usize,
    pub files_processed: usize,
    pub claims_processed: usize,
    pub skipped: Vec<SkippedFile>,
    /// Files whose year was inferred from claim dates.
    pub flagged_for_inspection: Vec<String>,
    pub row_rejections: Vec<RowRejections>,
    pub claims_out_of_window: usize,
    pub conflicts: Vec<PolicyYearConflict>,
    pub seeded_periods: Vec<String>,
}

impl RunReport {
    pub fn rows_rejected(&self) -> usize {
        self.row_rejections.iter().map(|r| r.count).sum()
    }

    fn skip(&mut self, file: &str, kind: SkipKind, reason: String) {
        warn!("Skipping {} ({}): {}", file, kind.as_str(), reason);
        self.skipped.push(SkippedFile {
            file: file.to_string(),
            kind,
            reason,
        });
    }
}

/// Whether the run produced anything worth reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunOutcome {
    Completed,
    /// No processed period contained a single claim.
    NoData,
}

/// The complete output of [`process_sources`].
#[derive(Debug, Clone)]
pub struct ProcessingResult {
    pub outcome: RunOutcome,
    /// Every summary in order, seeded ones included.
    pub summaries: Vec<PeriodSummary>,
    pub report: RunReport,
}

impl ProcessingResult {
    /// [`ClaimsError::NoData`] when no period received a claim.
    pub fn ensure_data(&self) -> Result<()> {
        match self.outcome {
            RunOutcome::Completed => Ok(()),
            RunOutcome::NoData => Err(ClaimsError::NoData),
        }
    }
}

// ── Public functions ──────────────────────────────────────────────────────────

/// Discover input files, load the optional seed report and run
/// [`process_sources`].
pub fn process_paths(
    inputs: &[PathBuf],
    seed_report: Option<&Path>,
    config: &EngineConfig,
    cancel: &CancelFlag,
    progress: &mut dyn FnMut(ProgressEvent),
) -> Result<ProcessingResult> {
    config.validate()?;

    let seed = match seed_report {
        Some(path) => load_seed_report(path, &config.windows)?,
        None => Vec::new(),
    };

    let files = find_input_files(inputs);
    info!("Found {} claim files", files.len());
    let sources: Vec<Box<dyn SpreadsheetSource>> =
        files.iter().map(|p| open_source(p)).collect();

    process_sources(sources, seed, config, cancel, progress)
}

/// Run the full pipeline over `sources`.
///
/// 1. Validate `config` and seed the ledgers from `seed`.
/// 2. Per source: read sheets, select the claims sheet, classify the period.
/// 3. Sequence and group files into periods.
/// 4. Fold every period not already seeded.
///
/// Per-file problems are recorded in the run report; only configuration
/// errors and cancellation abort the run.
pub fn process_sources(
    sources: Vec<Box<dyn SpreadsheetSource>>,
    seed: Vec<PeriodSummary>,
    config: &EngineConfig,
    cancel: &CancelFlag,
    progress: &mut dyn FnMut(ProgressEvent),
) -> Result<ProcessingResult> {
    config.validate()?;

    let mut report = RunReport {
        generated_at: Local::now().to_rfc3339(),
        files_seen: sources.len(),
        ..Default::default()
    };

    let mut aggregator = CumulativeAggregator::new(config.clone());
    for summary in seed {
        report.seeded_periods.push(summary.label.clone());
        aggregator.seed(summary);
    }

    // ── Step 1: read and classify files ───────────────────────────────────────
    let range = config.date_filter.then_some(&config.windows);
    let total = sources.len();
    let mut sequenced: Vec<SequencedFile> = Vec::new();

    for (i, source) in sources.iter().enumerate() {
        cancel.check()?;
        let filename = source.filename().to_string();
        progress(ProgressEvent {
            stage: ProgressStage::Reading,
            current: i + 1,
            total,
            label: filename.clone(),
        });

        let sheets = match source.read_sheets() {
            Ok(s) => s,
            Err(e) => {
                report.skip(&filename, SkipKind::for_error(&e), e.to_string());
                continue;
            }
        };

        let normalized = match select_best_sheet(&filename, &sheets, range) {
            Ok(n) => n,
            Err(e) => {
                report.skip(&filename, SkipKind::for_error(&e), e.to_string());
                continue;
            }
        };
        if normalized.rejected_rows > 0 {
            warn!(
                "{} / '{}': {} rows rejected",
                filename, normalized.sheet_name, normalized.rejected_rows
            );
            report.row_rejections.push(RowRejections {
                file: filename.clone(),
                sheet: normalized.sheet_name.clone(),
                count: normalized.rejected_rows,
                samples: normalized.rejection_samples.clone(),
            });
        }

        let classification = match classify(&filename, &normalized.claims) {
            Ok(c) => c,
            Err(e) => {
                report.skip(&filename, SkipKind::for_error(&e), e.to_string());
                continue;
            }
        };
        if classification.needs_inspection {
            report.flagged_for_inspection.push(filename.clone());
        }

        debug!(
            "{}: {} claims from sheet '{}', period {}-{:02}",
            filename,
            normalized.claims.len(),
            normalized.sheet_name,
            classification.year,
            classification.month
        );
        report.files_processed += 1;
        sequenced.push(SequencedFile {
            filename,
            classification,
            claims: normalized.claims,
        });
    }

    // ── Step 2: group into periods ────────────────────────────────────────────
    let batches = group_periods(
        sequenced,
        config.grouping,
        &config.windows,
        aggregator.next_sequence() - 1,
    );

    // ── Step 3: fold ──────────────────────────────────────────────────────────
    let total = batches.len();
    let mut claims_folded = 0usize;
    for (i, batch) in batches.iter().enumerate() {
        cancel.check()?;
        progress(ProgressEvent {
            stage: ProgressStage::Aggregating,
            current: i + 1,
            total,
            label: batch.label.clone(),
        });

        if aggregator.is_seeded(&batch.label) {
            let files = if batch.files.is_empty() {
                batch.label.clone()
            } else {
                batch.files.join(", ")
            };
            report.skip(
                &files,
                SkipKind::AlreadySeeded,
                format!("period {} is already in the seed report", batch.label),
            );
            continue;
        }

        if batch.is_empty() {
            debug!("{}: no claims, ledger carried forward", batch.label);
        }
        let outcome = aggregator.fold_period(batch);
        claims_folded += outcome.summary.claims_count;
        report.claims_out_of_window += outcome.claims_out_of_window;
        report.conflicts.extend(outcome.conflict);
    }
    report.claims_processed = claims_folded;

    let outcome = if claims_folded == 0 {
        RunOutcome::NoData
    } else {
        RunOutcome::Completed
    };
    info!(
        "Processed {} of {} files, {} claims, {} periods ({:?})",
        report.files_processed,
        report.files_seen,
        claims_folded,
        aggregator.summaries().len(),
        outcome
    );

    Ok(ProcessingResult {
        outcome,
        summaries: aggregator.into_summaries(),
        report,
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
