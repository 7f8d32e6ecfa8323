//! Plain-text rendering of progress, results and the run report.

use std::fmt::Write;

use ledger_core::formatting::{format_amount, format_count, percentage};
use ledger_core::models::PeriodSummary;
use ledger_data::analysis::{ProgressEvent, RunReport};

const AMOUNT_WIDTH: usize = 16;

pub fn render_progress(event: &ProgressEvent) -> String {
    format!(
        "[{:<11}] {}/{} {}",
        event.stage.as_str(),
        event.current,
        event.total,
        event.label
    )
}

/// One line per period with its totals, followed by the grand total of the
/// last period of each policy year.
pub fn render_summaries(summaries: &[PeriodSummary]) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<10} {:<7} {:>4} {:>9} {:>8} {:>w$} {:>w$} {:>w$} {:>w$}",
        "PERIOD",
        "YEAR",
        "SEQ",
        "INSUREDS",
        "CLAIMS",
        "COVID",
        "GENERAL",
        "TOTAL",
        "FINAL",
        w = AMOUNT_WIDTH
    );
    for s in summaries {
        let marker = if s.seeded { "*" } else { "" };
        let _ = writeln!(
            out,
            "{:<10} {:<7} {:>4} {:>9} {:>8} {:>w$} {:>w$} {:>w$} {:>w$}",
            format!("{}{}", s.label, marker),
            s.policy_year.as_str(),
            s.sequence,
            format_count(s.insured_count()),
            format_count(s.claims_count),
            format_amount(s.total_covid()),
            format_amount(s.total_general()),
            format_amount(s.total_amount()),
            format_amount(s.total_final()),
            w = AMOUNT_WIDTH
        );
    }
    if summaries.iter().any(|s| s.seeded) {
        out.push_str("* seeded from a previous report\n");
    }
    out
}

/// Files processed, skipped and flagged, row rejections and conflicts.
pub fn render_run_report(report: &RunReport) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Files processed: {} of {} ({:.1}%), claims folded: {}",
        report.files_processed,
        report.files_seen,
        percentage(report.files_processed, report.files_seen, 1),
        format_count(report.claims_processed)
    );

    if !report.skipped.is_empty() {
        let _ = writeln!(out, "Skipped files:");
        for s in &report.skipped {
            let _ = writeln!(out, "  - {} [{}]: {}", s.file, s.kind.as_str(), s.reason);
        }
    }

    if !report.flagged_for_inspection.is_empty() {
        let _ = writeln!(out, "Check the period of these files manually:");
        for f in &report.flagged_for_inspection {
            let _ = writeln!(out, "  - {f}");
        }
    }

    if !report.row_rejections.is_empty() {
        let _ = writeln!(
            out,
            "Rows rejected: {}",
            format_count(report.rows_rejected())
        );
        for r in &report.row_rejections {
            let _ = writeln!(out, "  - {} / {}: {} rows", r.file, r.sheet, r.count);
            for sample in &r.samples {
                let _ = writeln!(out, "      {sample}");
            }
        }
    }

    if report.claims_out_of_window > 0 {
        let _ = writeln!(
            out,
            "Claims outside their policy window: {}",
            format_count(report.claims_out_of_window)
        );
    }

    for c in &report.conflicts {
        let _ = writeln!(
            out,
            "Policy year conflict in {}: sequence says {}, claim dates say {}; used {}",
            c.label, c.by_sequence, c.by_calendar, c.chosen
        );
    }

    out
}
