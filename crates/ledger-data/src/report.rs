//! Report assembly.
//!
//! A report is one table per period summary plus a `Summary` overview table.
//! [`XlsxReportSink`] writes them as worksheets of an xlsx workbook;
//! [`MemorySink`] keeps them for tests and embedding callers.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use ledger_core::error::{ClaimsError, Result};
use ledger_core::models::PeriodSummary;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_xlsxwriter::{Format, Workbook, Worksheet, XlsxError};
use tracing::{debug, info};

/// Name of the overview sheet.
pub const SUMMARY_SHEET: &str = "Summary";

/// Columns of every period sheet.
pub const PERIOD_COLUMNS: [&str; 6] = [
    "COD_ASEGURADO",
    "NOMBRE_ASEGURADO",
    "COVID_AMOUNT",
    "GENERAL_AMOUNT",
    "TOTAL_AMOUNT",
    "FINAL",
];

/// Columns of the overview sheet.
pub const SUMMARY_COLUMNS: [&str; 9] = [
    "PERIOD",
    "POLICY_YEAR",
    "SEQUENCE",
    "INSUREDS",
    "CLAIMS",
    "COVID_AMOUNT",
    "GENERAL_AMOUNT",
    "TOTAL_AMOUNT",
    "FINAL",
];

/// Excel's limit on worksheet name length.
const MAX_SHEET_NAME_LEN: usize = 31;

// ── ReportSink ────────────────────────────────────────────────────────────────

/// Destination for an ordered sequence of period summaries.
pub trait ReportSink {
    /// Append the table of one period.
    fn add_period(&mut self, summary: &PeriodSummary) -> Result<()>;

    /// Finish the report. No period may be added afterwards.
    fn commit(&mut self) -> Result<()>;
}

/// Write every summary to `sink` in order and commit.
pub fn write_report(sink: &mut dyn ReportSink, summaries: &[PeriodSummary]) -> Result<()> {
    for summary in summaries {
        sink.add_period(summary)?;
    }
    sink.commit()
}

/// Default report file name for a run finished at `timestamp`.
pub fn default_report_name(timestamp: chrono::NaiveDateTime) -> String {
    format!(
        "Processed_Claims_Report_{}.xlsx",
        timestamp.format("%Y-%m-%d_%H-%M-%S")
    )
}

// ── MemorySink ────────────────────────────────────────────────────────────────

/// Keeps the summaries in memory.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    pub periods: Vec<PeriodSummary>,
    pub committed: bool,
}

impl ReportSink for MemorySink {
    fn add_period(&mut self, summary: &PeriodSummary) -> Result<()> {
        if self.committed {
            return Err(ClaimsError::Report("report already committed".to_string()));
        }
        self.periods.push(summary.clone());
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        self.committed = true;
        Ok(())
    }
}

// ── XlsxReportSink ────────────────────────────────────────────────────────────

/// Writes one worksheet per period and a trailing `Summary` sheet.
pub struct XlsxReportSink {
    path: PathBuf,
    workbook: Workbook,
    header: Format,
    money: Format,
    sheet_names: HashSet<String>,
    overview: Vec<PeriodSummary>,
    committed: bool,
}

impl XlsxReportSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let mut sheet_names = HashSet::new();
        sheet_names.insert(SUMMARY_SHEET.to_lowercase());
        Self {
            path: path.into(),
            workbook: Workbook::new(),
            header: Format::new().set_bold(),
            money: Format::new().set_num_format("#,##0.00"),
            sheet_names,
            overview: Vec::new(),
            committed: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A valid, unique worksheet name derived from `label`.
    fn unique_sheet_name(&mut self, label: &str) -> String {
        let base: String = label
            .chars()
            .map(|c| if "[]:*?/\\".contains(c) { '_' } else { c })
            .take(MAX_SHEET_NAME_LEN)
            .collect();
        let base = if base.trim().is_empty() {
            "Period".to_string()
        } else {
            base
        };

        let mut name = base.clone();
        let mut n = 2;
        while self.sheet_names.contains(&name.to_lowercase()) {
            let suffix = format!(" ({n})");
            let keep = MAX_SHEET_NAME_LEN.saturating_sub(suffix.len());
            name = format!("{}{}", base.chars().take(keep).collect::<String>(), suffix);
            n += 1;
        }
        self.sheet_names.insert(name.to_lowercase());
        name
    }
}

fn report_error(e: XlsxError) -> ClaimsError {
    ClaimsError::Report(e.to_string())
}

fn write_money(
    sheet: &mut Worksheet,
    row: u32,
    col: u16,
    value: Decimal,
    format: &Format,
) -> std::result::Result<(), XlsxError> {
    sheet.write_number_with_format(row, col, value.to_f64().unwrap_or_default(), format)?;
    Ok(())
}

fn write_header(
    sheet: &mut Worksheet,
    columns: &[&str],
    format: &Format,
) -> std::result::Result<(), XlsxError> {
    for (col, name) in columns.iter().enumerate() {
        sheet.write_string_with_format(0, col as u16, *name, format)?;
        sheet.set_column_width(col as u16, 18)?;
    }
    sheet.set_freeze_panes(1, 0)?;
    Ok(())
}

impl ReportSink for XlsxReportSink {
    fn add_period(&mut self, summary: &PeriodSummary) -> Result<()> {
        if self.committed {
            return Err(ClaimsError::Report("report already committed".to_string()));
        }
        let name = self.unique_sheet_name(&summary.label);
        let header = self.header.clone();
        let money = self.money.clone();

        let sheet = self.workbook.add_worksheet();
        sheet.set_name(&name).map_err(report_error)?;
        write_header(sheet, &PERIOD_COLUMNS, &header).map_err(report_error)?;

        for (i, row) in summary.rows.iter().enumerate() {
            let r = i as u32 + 1;
            sheet
                .write_string(r, 0, &row.insured_code)
                .map_err(report_error)?;
            sheet
                .write_string(r, 1, &row.insured_name)
                .map_err(report_error)?;
            for (col, value) in [
                (2, row.covid_amount),
                (3, row.general_amount),
                (4, row.total_amount),
                (5, row.final_amount),
            ] {
                write_money(sheet, r, col, value, &money).map_err(report_error)?;
            }
        }

        debug!("Wrote sheet '{}' ({} rows)", name, summary.rows.len());
        self.overview.push(summary.clone());
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        if self.committed {
            return Ok(());
        }
        let header = self.header.clone();
        let money = self.money.clone();

        let sheet = self.workbook.add_worksheet();
        sheet.set_name(SUMMARY_SHEET).map_err(report_error)?;
        write_header(sheet, &SUMMARY_COLUMNS, &header).map_err(report_error)?;
        for (i, s) in self.overview.iter().enumerate() {
            let r = i as u32 + 1;
            sheet.write_string(r, 0, &s.label).map_err(report_error)?;
            sheet
                .write_string(r, 1, s.policy_year.as_str())
                .map_err(report_error)?;
            sheet
                .write_number(r, 2, f64::from(s.sequence))
                .map_err(report_error)?;
            sheet
                .write_number(r, 3, s.insured_count() as f64)
                .map_err(report_error)?;
            sheet
                .write_number(r, 4, s.claims_count as f64)
                .map_err(report_error)?;
            for (col, value) in [
                (5, s.total_covid()),
                (6, s.total_general()),
                (7, s.total_amount()),
                (8, s.total_final()),
            ] {
                write_money(sheet, r, col, value, &money).map_err(report_error)?;
            }
        }

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        self.workbook.save(&self.path).map_err(report_error)?;
        self.committed = true;

        info!(
            "Report written to {} ({} periods)",
            self.path.display(),
            self.overview.len()
        );
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
