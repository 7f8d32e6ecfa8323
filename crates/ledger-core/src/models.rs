use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Display name used when a sheet carries no insured-name column or the cell
/// is blank.
pub const NO_NAME_PROVIDED: &str = "No Name Provided";

// ── Canonical fields ──────────────────────────────────────────────────────────

/// The canonical columns every claims sheet is mapped onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CanonicalField {
    InsuredCode,
    InsuredName,
    ClaimDate,
    Amount,
    Diagnosis,
}

impl CanonicalField {
    /// Every field, in detection order.
    pub const ALL: [CanonicalField; 5] = [
        CanonicalField::InsuredCode,
        CanonicalField::InsuredName,
        CanonicalField::ClaimDate,
        CanonicalField::Amount,
        CanonicalField::Diagnosis,
    ];

    /// Canonical (report) header for this field.
    pub fn as_str(&self) -> &'static str {
        match self {
            CanonicalField::InsuredCode => "COD_ASEGURADO",
            CanonicalField::InsuredName => "NOMBRE_ASEGURADO",
            CanonicalField::ClaimDate => "FECHA_RECLAMO",
            CanonicalField::Amount => "MONTO",
            CanonicalField::Diagnosis => "DIAGNOSTICO",
        }
    }

    /// Whether a sheet without this column must be rejected.
    pub fn is_required(&self) -> bool {
        matches!(
            self,
            CanonicalField::InsuredCode | CanonicalField::ClaimDate | CanonicalField::Amount
        )
    }
}

impl fmt::Display for CanonicalField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Raw input ─────────────────────────────────────────────────────────────────

/// A single spreadsheet cell as delivered by a spreadsheet source.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Empty,
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    /// A cell the workbook marked as a date, as an Excel serial number.
    DateSerial(f64),
    DateTime(NaiveDateTime),
}

impl CellValue {
    /// `true` for empty cells and whitespace-only text.
    pub fn is_blank(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }
}

/// One sheet of raw rows. Headers are trimmed and upper-cased on construction
/// so header matching is case-insensitive.
#[derive(Debug, Clone, PartialEq)]
pub struct RawSheet {
    pub name: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<CellValue>>,
}

impl RawSheet {
    pub fn new(name: impl Into<String>, headers: Vec<String>, rows: Vec<Vec<CellValue>>) -> Self {
        Self {
            name: name.into(),
            headers: headers
                .into_iter()
                .map(|h| h.trim().to_uppercase())
                .collect(),
            rows,
        }
    }

    /// Position of `header` (already upper-cased) in the header row.
    pub fn column_index(&self, header: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == header)
    }

    /// Cell at (`row`, `col`); missing trailing cells read as empty.
    pub fn cell(&self, row: usize, col: usize) -> &CellValue {
        static EMPTY: CellValue = CellValue::Empty;
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .unwrap_or(&EMPTY)
    }
}

// ── Claim ─────────────────────────────────────────────────────────────────────

/// One normalised claim row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claim {
    pub insured_code: String,
    pub insured_name: String,
    pub claim_date: NaiveDate,
    /// Signed claim amount, rounded to cents.
    pub amount: Decimal,
    #[serde(default)]
    pub diagnosis: Option<String>,
}

impl Claim {
    /// COVID classification: the diagnosis mentions "COVID" in any case.
    pub fn is_covid(&self) -> bool {
        self.diagnosis
            .as_deref()
            .map(|d| d.to_uppercase().contains("COVID"))
            .unwrap_or(false)
    }
}

// ── Policy years ──────────────────────────────────────────────────────────────

/// The two consecutive coverage years, each with its own capping regime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PolicyYear {
    Year1,
    Year2,
}

impl PolicyYear {
    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyYear::Year1 => "Year 1",
            PolicyYear::Year2 => "Year 2",
        }
    }

    /// Parse the label written into report summaries (`"Year 1"`, `"2"`, ...).
    pub fn parse_label(label: &str) -> Option<Self> {
        let compact: String = label
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>()
            .to_lowercase();
        match compact.as_str() {
            "year1" | "1" | "y1" => Some(PolicyYear::Year1),
            "year2" | "2" | "y2" => Some(PolicyYear::Year2),
            _ => None,
        }
    }
}

impl fmt::Display for PolicyYear {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Periods ───────────────────────────────────────────────────────────────────

/// All claims grouped into one fiscal period, ready to be folded.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PeriodBatch {
    /// Report label, e.g. `"Q1-2024"` or `"Q5"`.
    pub label: String,
    /// Ordinal position; 1 is the first quarter of policy year 1.
    pub sequence: i32,
    /// `(year, month)` of every contributing file.
    pub months: Vec<(i32, u32)>,
    /// Contributing filenames.
    pub files: Vec<String>,
    pub claims: Vec<Claim>,
}

impl PeriodBatch {
    pub fn new(label: impl Into<String>, sequence: i32) -> Self {
        Self {
            label: label.into(),
            sequence,
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.claims.is_empty()
    }
}

// ── Ledger ────────────────────────────────────────────────────────────────────

/// Running per-insured totals carried across periods.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub insured_code: String,
    pub insured_name: String,
    pub covid_amount: Decimal,
    pub general_amount: Decimal,
    pub total_amount: Decimal,
    /// Last triggered payout; only meaningful in policy year 2.
    pub cumulative_payout: Decimal,
}

impl LedgerEntry {
    pub fn new(insured_code: impl Into<String>, insured_name: impl Into<String>) -> Self {
        Self {
            insured_code: insured_code.into(),
            insured_name: insured_name.into(),
            covid_amount: Decimal::ZERO,
            general_amount: Decimal::ZERO,
            total_amount: Decimal::ZERO,
            cumulative_payout: Decimal::ZERO,
        }
    }
}

/// One output row of a period summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryRow {
    pub insured_code: String,
    pub insured_name: String,
    pub covid_amount: Decimal,
    pub general_amount: Decimal,
    pub total_amount: Decimal,
    #[serde(rename = "final")]
    pub final_amount: Decimal,
}

/// The materialised cumulative table for one period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodSummary {
    pub label: String,
    pub sequence: i32,
    pub policy_year: PolicyYear,
    /// Claims folded into this period (after window filtering).
    pub claims_count: usize,
    /// `true` when the summary was loaded from a previous report.
    #[serde(default)]
    pub seeded: bool,
    pub rows: Vec<SummaryRow>,
}

impl PeriodSummary {
    pub fn row(&self, insured_code: &str) -> Option<&SummaryRow> {
        self.rows.iter().find(|r| r.insured_code == insured_code)
    }

    pub fn insured_count(&self) -> usize {
        self.rows.len()
    }

    pub fn total_covid(&self) -> Decimal {
        self.rows.iter().map(|r| r.covid_amount).sum()
    }

    pub fn total_general(&self) -> Decimal {
        self.rows.iter().map(|r| r.general_amount).sum()
    }

    pub fn total_amount(&self) -> Decimal {
        self.rows.iter().map(|r| r.total_amount).sum()
    }

    pub fn total_final(&self) -> Decimal {
        self.rows.iter().map(|r| r.final_amount).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn claim(diagnosis: Option<&str>) -> Claim {
        Claim {
            insured_code: "C1".to_string(),
            insured_name: NO_NAME_PROVIDED.to_string(),
            claim_date: NaiveDate::from_ymd_opt(2023, 11, 2).unwrap(),
            amount: dec!(100),
            diagnosis: diagnosis.map(|d| d.to_string()),
        }
    }

    #[test]
    fn test_is_covid_case_insensitive() {
        assert!(claim(Some("Neumonia por covid-19")).is_covid());
        assert!(claim(Some("COVID")).is_covid());
        assert!(!claim(Some("Gastritis")).is_covid());
        assert!(!claim(None).is_covid());
    }

    #[test]
    fn test_raw_sheet_uppercases_headers() {
        let sheet = RawSheet::new(
            "Hoja1",
            vec![" cod_asegurado ".to_string(), "Monto Pagado".to_string()],
            vec![],
        );
        assert_eq!(sheet.headers, vec!["COD_ASEGURADO", "MONTO PAGADO"]);
        assert_eq!(sheet.column_index("MONTO PAGADO"), Some(1));
        assert_eq!(sheet.column_index("missing"), None);
    }

    #[test]
    fn test_raw_sheet_short_row_reads_empty() {
        let sheet = RawSheet::new(
            "Hoja1",
            vec!["A".to_string(), "B".to_string()],
            vec![vec![CellValue::Int(1)]],
        );
        assert_eq!(sheet.cell(0, 0), &CellValue::Int(1));
        assert_eq!(sheet.cell(0, 1), &CellValue::Empty);
        assert_eq!(sheet.cell(5, 0), &CellValue::Empty);
    }

    #[test]
    fn test_policy_year_parse_label() {
        assert_eq!(PolicyYear::parse_label("Year 1"), Some(PolicyYear::Year1));
        assert_eq!(PolicyYear::parse_label("year2"), Some(PolicyYear::Year2));
        assert_eq!(PolicyYear::parse_label("2"), Some(PolicyYear::Year2));
        assert_eq!(PolicyYear::parse_label("Year 3"), None);
    }

    #[test]
    fn test_canonical_field_required() {
        let required: Vec<_> = CanonicalField::ALL
            .iter()
            .filter(|f| f.is_required())
            .collect();
        assert_eq!(
            required,
            vec![
                &CanonicalField::InsuredCode,
                &CanonicalField::ClaimDate,
                &CanonicalField::Amount
            ]
        );
    }

    #[test]
    fn test_summary_totals() {
        let row = |code: &str, fin: Decimal| SummaryRow {
            insured_code: code.to_string(),
            insured_name: NO_NAME_PROVIDED.to_string(),
            covid_amount: dec!(10),
            general_amount: dec!(5),
            total_amount: dec!(15),
            final_amount: fin,
        };
        let summary = PeriodSummary {
            label: "Q1-2023".to_string(),
            sequence: 1,
            policy_year: PolicyYear::Year1,
            claims_count: 3,
            seeded: false,
            rows: vec![row("A", dec!(15)), row("B", dec!(-4))],
        };
        assert_eq!(summary.insured_count(), 2);
        assert_eq!(summary.total_covid(), dec!(20));
        assert_eq!(summary.total_final(), dec!(11));
        assert!(summary.row("B").is_some());
        assert!(summary.row("Z").is_none());
    }
}
