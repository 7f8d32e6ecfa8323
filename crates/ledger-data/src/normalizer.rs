//! Row normalisation and best-sheet selection.

use ledger_core::data_processors::{AmountProcessor, DateProcessor, TextProcessor};
use ledger_core::error::{ClaimsError, Result};
use ledger_core::models::{CanonicalField, CellValue, Claim, RawSheet, NO_NAME_PROVIDED};
use ledger_core::policy::PolicyWindows;
use tracing::debug;

use crate::schema::{detect_columns, ColumnMapping};

/// Rejected rows kept verbatim per sheet for the run report.
pub const MAX_REJECTION_SAMPLES: usize = 3;

/// Claims extracted from one sheet.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedSheet {
    pub sheet_name: String,
    pub claims: Vec<Claim>,
    /// Rows dropped because a code, amount or date could not be read.
    pub rejected_rows: usize,
    pub rejection_samples: Vec<String>,
    /// Whether the sheet had a diagnosis column at all.
    pub has_diagnosis: bool,
}

/// Convert one data row into a [`Claim`].
///
/// `row_number` is the 1-based spreadsheet row, used in error messages only.
pub fn normalize_row(
    row: &[CellValue],
    row_number: usize,
    mapping: &ColumnMapping,
) -> std::result::Result<Claim, ClaimsError> {
    let cell = |field: CanonicalField| cell_at(row, mapping, field);
    let reject = |field: CanonicalField, value: &CellValue, what: &str| ClaimsError::Parse {
        row: row_number,
        field,
        message: format!("{what} ({value:?})"),
    };

    let code_cell = cell(CanonicalField::InsuredCode);
    let insured_code = TextProcessor::parse(code_cell)
        .ok_or_else(|| reject(CanonicalField::InsuredCode, code_cell, "missing insured code"))?;

    let amount_cell = cell(CanonicalField::Amount);
    let amount = AmountProcessor::parse(amount_cell)
        .ok_or_else(|| reject(CanonicalField::Amount, amount_cell, "not a number"))?;

    let date_cell = cell(CanonicalField::ClaimDate);
    let claim_date = DateProcessor::parse(date_cell)
        .ok_or_else(|| reject(CanonicalField::ClaimDate, date_cell, "not a date"))?;

    let insured_name = TextProcessor::parse(cell(CanonicalField::InsuredName))
        .unwrap_or_else(|| NO_NAME_PROVIDED.to_string());
    let diagnosis = TextProcessor::parse(cell(CanonicalField::Diagnosis));

    Ok(Claim {
        insured_code,
        insured_name,
        claim_date,
        amount,
        diagnosis,
    })
}

fn cell_at<'a>(row: &'a [CellValue], mapping: &ColumnMapping, field: CanonicalField) -> &'a CellValue {
    static EMPTY: CellValue = CellValue::Empty;
    mapping
        .get(field)
        .and_then(|col| row.get(col))
        .unwrap_or(&EMPTY)
}

/// Normalise every non-blank row of `sheet`.
pub fn normalize_sheet(sheet: &RawSheet, mapping: &ColumnMapping) -> NormalizedSheet {
    let mut out = NormalizedSheet {
        sheet_name: sheet.name.clone(),
        has_diagnosis: mapping.contains(CanonicalField::Diagnosis),
        ..Default::default()
    };

    for (idx, row) in sheet.rows.iter().enumerate() {
        if row.iter().all(CellValue::is_blank) {
            continue;
        }
        // +2: one for the header row, one for 1-based numbering.
        match normalize_row(row, idx + 2, mapping) {
            Ok(claim) => out.claims.push(claim),
            Err(e) => {
                out.rejected_rows += 1;
                if out.rejection_samples.len() < MAX_REJECTION_SAMPLES {
                    out.rejection_samples.push(e.to_string());
                }
            }
        }
    }

    out
}

/// Pick the sheet of a workbook that carries the claims.
///
/// Every sheet passing schema validation is normalised and scored by its
/// claims dated inside `windows` (every claim when `windows` is `None`). The
/// highest score wins; ties keep the earlier sheet. When no sheet validates,
/// the schema error of the sheet missing the fewest fields is returned.
pub fn select_best_sheet(
    file: &str,
    sheets: &[RawSheet],
    windows: Option<&PolicyWindows>,
) -> Result<NormalizedSheet> {
    let mut best: Option<(usize, NormalizedSheet)> = None;
    let mut closest_error: Option<(usize, ClaimsError)> = None;

    for sheet in sheets {
        let mapping = detect_columns(&sheet.headers);
        if let Err(e) = mapping.validate(file, &sheet.name) {
            let missing = mapping.missing_required().len();
            if closest_error.as_ref().map_or(true, |(m, _)| missing < *m) {
                closest_error = Some((missing, e));
            }
            continue;
        }

        let normalized = normalize_sheet(sheet, &mapping);
        let score = match windows {
            Some(w) => normalized.claims.iter().filter(|c| w.covers(c.claim_date)).count(),
            None => normalized.claims.len(),
        };
        debug!(
            "{} / '{}': {} claims, {} in range, {} rejected",
            file,
            sheet.name,
            normalized.claims.len(),
            score,
            normalized.rejected_rows
        );
        if best.as_ref().map_or(true, |(s, _)| score > *s) {
            best = Some((score, normalized));
        }
    }

    match (best, closest_error) {
        (Some((_, sheet)), _) => Ok(sheet),
        (None, Some((_, err))) => Err(err),
        (None, None) => Err(ClaimsError::Workbook {
            file: file.to_string(),
            message: "workbook contains no sheets".to_string(),
        }),
    }
}
