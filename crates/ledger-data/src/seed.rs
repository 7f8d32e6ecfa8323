//! Loading period summaries back from a previously written report, so a run
//! can continue where an earlier one stopped.

use std::collections::HashMap;
use std::path::Path;
use std::sync::OnceLock;

use ledger_core::data_processors::{AmountProcessor, TextProcessor};
use ledger_core::error::{ClaimsError, Result};
use ledger_core::models::{PeriodSummary, PolicyYear, RawSheet, SummaryRow, NO_NAME_PROVIDED};
use ledger_core::policy::{policy_year_for_sequence, PolicyWindows};
use ledger_core::time_utils::quarter_sequence;
use regex::Regex;
use rust_decimal::Decimal;
use tracing::{debug, warn};

use crate::reader::{SpreadsheetSource, XlsxSource};
use crate::report::SUMMARY_SHEET;

/// Policy year, sequence and claim count recovered for one period.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PeriodMeta {
    policy_year: PolicyYear,
    sequence: i32,
    claims_count: usize,
}

/// Read the period summaries of the report at `path`.
pub fn load_seed_report(path: &Path, windows: &PolicyWindows) -> Result<Vec<PeriodSummary>> {
    let source = XlsxSource::new(path);
    let sheets = source.read_sheets()?;
    let summaries = summaries_from_sheets(source.filename(), &sheets, windows)?;
    debug!("Loaded {} seed periods from {}", summaries.len(), path.display());
    Ok(summaries)
}

/// Rebuild period summaries from report sheets.
///
/// The `Summary` sheet supplies each period's policy year and sequence; when
/// it is missing or lacks a period, both are derived from the sheet label.
/// Sheets without the period columns, or whose label cannot be interpreted,
/// are skipped with a warning. The result is ordered by sequence.
pub fn summaries_from_sheets(
    file: &str,
    sheets: &[RawSheet],
    windows: &PolicyWindows,
) -> Result<Vec<PeriodSummary>> {
    let meta = sheets
        .iter()
        .find(|s| s.name.eq_ignore_ascii_case(SUMMARY_SHEET))
        .map(read_overview)
        .unwrap_or_default();

    let mut summaries = Vec::new();
    for sheet in sheets {
        if sheet.name.eq_ignore_ascii_case(SUMMARY_SHEET) {
            continue;
        }
        let Some(columns) = PeriodColumns::locate(sheet) else {
            warn!("{}: sheet '{}' is not a period table, skipped", file, sheet.name);
            continue;
        };
        let Some(period) = meta
            .get(&sheet.name)
            .copied()
            .or_else(|| meta_from_label(&sheet.name, windows))
        else {
            warn!("{}: cannot tell the period of sheet '{}', skipped", file, sheet.name);
            continue;
        };

        let rows = columns.rows(sheet);
        summaries.push(PeriodSummary {
            label: sheet.name.clone(),
            sequence: period.sequence,
            policy_year: period.policy_year,
            claims_count: period.claims_count,
            seeded: true,
            rows,
        });
    }

    if summaries.is_empty() {
        return Err(ClaimsError::Report(format!(
            "{file} contains no period sheets to seed from"
        )));
    }

    summaries.sort_by_key(|s| s.sequence);
    Ok(summaries)
}

// ── Period tables ─────────────────────────────────────────────────────────────

struct PeriodColumns {
    code: usize,
    name: Option<usize>,
    covid: Option<usize>,
    general: Option<usize>,
    total: usize,
    final_amount: usize,
}

impl PeriodColumns {
    fn locate(sheet: &RawSheet) -> Option<Self> {
        Some(Self {
            code: sheet.column_index("COD_ASEGURADO")?,
            name: sheet.column_index("NOMBRE_ASEGURADO"),
            covid: sheet.column_index("COVID_AMOUNT"),
            general: sheet.column_index("GENERAL_AMOUNT"),
            total: sheet.column_index("TOTAL_AMOUNT")?,
            final_amount: sheet.column_index("FINAL")?,
        })
    }

    fn rows(&self, sheet: &RawSheet) -> Vec<SummaryRow> {
        let amount = |row: usize, col: Option<usize>| -> Decimal {
            col.and_then(|c| AmountProcessor::parse(sheet.cell(row, c)))
                .unwrap_or(Decimal::ZERO)
        };

        (0..sheet.rows.len())
            .filter_map(|r| {
                let insured_code = TextProcessor::parse(sheet.cell(r, self.code))?;
                Some(SummaryRow {
                    insured_code,
                    insured_name: self
                        .name
                        .and_then(|c| TextProcessor::parse(sheet.cell(r, c)))
                        .unwrap_or_else(|| NO_NAME_PROVIDED.to_string()),
                    covid_amount: amount(r, self.covid),
                    general_amount: amount(r, self.general),
                    total_amount: amount(r, Some(self.total)),
                    final_amount: amount(r, Some(self.final_amount)),
                })
            })
            .collect()
    }
}

// ── Period metadata ───────────────────────────────────────────────────────────

fn read_overview(sheet: &RawSheet) -> HashMap<String, PeriodMeta> {
    let (Some(period), Some(year), Some(seq)) = (
        sheet.column_index("PERIOD"),
        sheet.column_index("POLICY_YEAR"),
        sheet.column_index("SEQUENCE"),
    ) else {
        return HashMap::new();
    };
    let claims = sheet.column_index("CLAIMS");

    (0..sheet.rows.len())
        .filter_map(|r| {
            let label = TextProcessor::parse(sheet.cell(r, period))?;
            let policy_year = PolicyYear::parse_label(&TextProcessor::parse(sheet.cell(r, year))?)?;
            let sequence = TextProcessor::parse(sheet.cell(r, seq))?.parse::<i32>().ok()?;
            let claims_count = claims
                .and_then(|c| TextProcessor::parse(sheet.cell(r, c)))
                .and_then(|s| s.parse::<usize>().ok())
                .unwrap_or(0);
            Some((
                label,
                PeriodMeta {
                    policy_year,
                    sequence,
                    claims_count,
                },
            ))
        })
        .collect()
}

fn label_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^Q(\d+)(?:-(\d{4}))?$").expect("regex is valid"))
}

/// Derive sequence and policy year from a `Q{n}` or `Q{q}-{year}` label.
fn meta_from_label(label: &str, windows: &PolicyWindows) -> Option<PeriodMeta> {
    let caps = label_regex().captures(label.trim())?;
    let n: i32 = caps.get(1)?.as_str().parse().ok()?;

    let sequence = match caps.get(2) {
        Some(year) => {
            let year: i32 = year.as_str().parse().ok()?;
            let first_month = match n {
                1 => 10,
                2 => 1,
                3 => 4,
                4 => 7,
                _ => return None,
            };
            quarter_sequence(year, first_month, windows.year1.start)
        }
        None => n,
    };

    Some(PeriodMeta {
        policy_year: policy_year_for_sequence(sequence),
        sequence,
        claims_count: 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::{write_report, XlsxReportSink};
    use ledger_core::models::CellValue;
    use rust_decimal_macros::dec;
    use tempfile::TempDir;

    fn period_sheet(name: &str, rows: Vec<Vec<CellValue>>) -> RawSheet {
        RawSheet::new(
            name,
            crate::report::PERIOD_COLUMNS.iter().map(|s| s.to_string()).collect(),
            rows,
        )
    }

    fn text(s: &str) -> CellValue {
        CellValue::Text(s.to_string())
    }

    #[test]
    fn test_meta_from_label() {
        let windows = PolicyWindows::default();
        let m = meta_from_label("Q1-2023", &windows).unwrap();
        assert_eq!((m.sequence, m.policy_year), (1, PolicyYear::Year1));
        let m = meta_from_label("Q2-2025", &windows).unwrap();
        assert_eq!((m.sequence, m.policy_year), (6, PolicyYear::Year2));
        let m = meta_from_label("Q5", &windows).unwrap();
        assert_eq!((m.sequence, m.policy_year), (5, PolicyYear::Year2));
        assert!(meta_from_label("Q7-2024", &windows).is_none());
        assert!(meta_from_label("Hoja1", &windows).is_none());
    }

    #[test]
    fn test_summaries_from_sheets_uses_overview() {
        let overview = RawSheet::new(
            "Summary",
            crate::report::SUMMARY_COLUMNS.iter().map(|s| s.to_string()).collect(),
            vec![vec![
                text("Q2"),
                text("Year 2"),
                CellValue::Float(6.0),
                CellValue::Float(1.0),
                CellValue::Float(4.0),
            ]],
        );
        let q2 = period_sheet(
            "Q2",
            vec![vec![
                CellValue::Float(77.0),
                text("Luis"),
                CellValue::Float(0.0),
                CellValue::Float(45000.004),
                CellValue::Float(45000.004),
                CellValue::Float(45000.0),
            ]],
        );
        let summaries =
            summaries_from_sheets("prev.xlsx", &[q2, overview], &PolicyWindows::default()).unwrap();
        assert_eq!(summaries.len(), 1);
        let s = &summaries[0];
        // Label alone would say sequence 2 / year 1.
        assert_eq!(s.sequence, 6);
        assert_eq!(s.policy_year, PolicyYear::Year2);
        assert_eq!(s.claims_count, 4);
        assert!(s.seeded);
        let row = s.row("77").unwrap();
        assert_eq!(row.total_amount, dec!(45000.00));
        assert_eq!(row.final_amount, dec!(45000));
    }

    #[test]
    fn test_summaries_from_sheets_skips_foreign_sheets() {
        let notes = RawSheet::new("Notas", vec!["TEXTO".to_string()], vec![]);
        let unknown = period_sheet("Diciembre", vec![]);
        let q1 = period_sheet("Q1-2023", vec![vec![text("A"), text("Ana")]]);
        let summaries =
            summaries_from_sheets("prev.xlsx", &[notes, unknown, q1], &PolicyWindows::default())
                .unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].rows[0].total_amount, Decimal::ZERO);
    }

    #[test]
    fn test_summaries_from_sheets_requires_a_period() {
        let notes = RawSheet::new("Notas", vec!["TEXTO".to_string()], vec![]);
        let err = summaries_from_sheets("prev.xlsx", &[notes], &PolicyWindows::default()).unwrap_err();
        assert!(matches!(err, ClaimsError::Report(_)));
    }

    #[test]
    fn test_load_seed_report_reads_written_report() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("prev.xlsx");
        let written = vec![
            PeriodSummary {
                label: "Q1-2023".to_string(),
                sequence: 1,
                policy_year: PolicyYear::Year1,
                claims_count: 3,
                seeded: false,
                rows: vec![SummaryRow {
                    insured_code: "A".to_string(),
                    insured_name: "Ana".to_string(),
                    covid_amount: dec!(2000),
                    general_amount: dec!(10000.10),
                    total_amount: dec!(12000.10),
                    final_amount: dec!(12000.10),
                }],
            },
            PeriodSummary {
                label: "Q1-2024".to_string(),
                sequence: 5,
                policy_year: PolicyYear::Year2,
                claims_count: 1,
                seeded: false,
                rows: vec![],
            },
        ];
        write_report(&mut XlsxReportSink::new(&path), &written).unwrap();

        let loaded = load_seed_report(&path, &PolicyWindows::default()).unwrap();
        assert_eq!(loaded.len(), 2);
        for (got, want) in loaded.iter().zip(&written) {
            assert_eq!(got.label, want.label);
            assert_eq!(got.sequence, want.sequence);
            assert_eq!(got.policy_year, want.policy_year);
            assert_eq!(got.claims_count, want.claims_count);
            assert_eq!(got.rows, want.rows);
            assert!(got.seeded);
        }
    }
}
