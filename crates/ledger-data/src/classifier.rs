//! Fiscal period classification from claim file names.
//!
//! Files are named after the month they cover, in Spanish (`"Reclamos
//! Noviembre 2023.xlsx"`). The month decides the fiscal quarter; the year
//! comes from the name or, failing that, from the claim dates.

use std::sync::OnceLock;

use ledger_core::error::{ClaimsError, Result};
use ledger_core::models::Claim;
use ledger_core::time_utils::{fiscal_quarter, month_from_spanish, most_frequent_year};
use regex::Regex;
use tracing::warn;

/// Month and (optional) year found in a file name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilenamePeriod {
    pub month: u32,
    pub year: Option<i32>,
}

/// A file's resolved fiscal period.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub year: i32,
    pub month: u32,
    pub quarter: u8,
    /// The year had to be inferred from claim dates.
    pub needs_inspection: bool,
}

fn month_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // Letters are the only word characters here: `_`, digits and punctuation
    // all separate tokens.
    RE.get_or_init(|| {
        Regex::new(
            r"(?:^|[^a-zñ])(enero|febrero|marzo|abril|mayo|junio|julio|agosto|septiembre|octubre|noviembre|diciembre)(?:[^a-zñ]|$)",
        )
        .expect("regex is valid")
    })
}

fn year_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?:^|\D)(20\d{2})(?:\D|$)").expect("regex is valid"))
}

/// Extract the Spanish month and a `20xx` year from `name`.
///
/// Returns `None` when no month token is present.
pub fn classify_filename(name: &str) -> Option<FilenamePeriod> {
    let lower = name.to_lowercase();
    let month = month_regex()
        .captures(&lower)
        .and_then(|c| c.get(1))
        .and_then(|m| month_from_spanish(m.as_str()))?;
    let year = year_regex()
        .captures(&lower)
        .and_then(|c| c.get(1))
        .and_then(|y| y.as_str().parse::<i32>().ok());
    Some(FilenamePeriod { month, year })
}

/// Resolve the fiscal period of a file from its name, falling back to the
/// most frequent claim-date year when the name has a month but no year.
pub fn classify(name: &str, claims: &[Claim]) -> Result<Classification> {
    let Some(period) = classify_filename(name) else {
        return Err(ClaimsError::PeriodUnresolved {
            file: name.to_string(),
            reason: "no Spanish month name in file name".to_string(),
        });
    };

    let (year, needs_inspection) = match period.year {
        Some(year) => (year, false),
        None => {
            let Some(year) = most_frequent_year(claims.iter().map(|c| &c.claim_date)) else {
                return Err(ClaimsError::PeriodUnresolved {
                    file: name.to_string(),
                    reason: "no year in file name and no claim dates to infer it from"
                        .to_string(),
                });
            };
            warn!(
                "{}: no year in file name, using {} from claim dates; please inspect",
                name, year
            );
            (year, true)
        }
    };

    Ok(Classification {
        year,
        month: period.month,
        quarter: fiscal_quarter(period.month),
        needs_inspection,
    })
}
