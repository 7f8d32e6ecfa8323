use chrono::NaiveDate;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use std::str::FromStr;

use crate::models::CellValue;
use crate::time_utils::{excel_serial_to_date, parse_date_text};

/// Decimal places kept for monetary amounts.
pub const AMOUNT_SCALE: u32 = 2;

// ── AmountProcessor ───────────────────────────────────────────────────────────

/// Parses claim amounts from numeric cells and loosely formatted text.
pub struct AmountProcessor;

impl AmountProcessor {
    /// Parse a cell into a cent-rounded [`Decimal`].
    ///
    /// Handles:
    /// * numeric cells (integer or float);
    /// * text such as `"1,234.50"`, `"$ 1 234.50"`, `"(250.00)"` (negative)
    ///   and `"-250"`;
    /// * comma-decimal text such as `"1.250,00"` or `"1500,50"`.
    ///
    /// Returns `None` for blanks, booleans, dates, unparseable text and
    /// magnitudes above [`MAX_AMOUNT`].
    pub fn parse(value: &CellValue) -> Option<Decimal> {
        let raw = match value {
            CellValue::Int(n) => Some(Decimal::from(*n)),
            CellValue::Float(f) => Decimal::from_f64(*f),
            CellValue::Text(s) => Self::parse_str(s),
            _ => None,
        }?;
        if raw.abs() > MAX_AMOUNT {
            return None;
        }
        Some(raw.round_dp(AMOUNT_SCALE))
    }

    fn parse_str(s: &str) -> Option<Decimal> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return None;
        }

        let (negative, body) = match trimmed
            .strip_prefix('(')
            .and_then(|rest| rest.strip_suffix(')'))
        {
            Some(inner) => (true, inner),
            None => (false, trimmed),
        };

        let cleaned: String = body
            .chars()
            .filter(|c| !matches!(c, '$' | ' ' | '\u{a0}'))
            .collect();
        let (sign, digits) = match cleaned.strip_prefix('-') {
            Some(rest) => ("-", rest),
            None => ("", cleaned.strip_prefix('+').unwrap_or(&cleaned)),
        };
        let plain = normalize_separators(digits)?;
        if plain.is_empty() {
            return None;
        }

        let number = format!("{sign}{plain}");
        let parsed = Decimal::from_str(&number)
            .or_else(|_| Decimal::from_scientific(&number))
            .ok()?;
        Some(if negative { -parsed } else { parsed })
    }
}

/// Largest accepted claim magnitude. Anything bigger is a misread cell, and
/// running sums of accepted amounts stay far from `Decimal::MAX`.
pub const MAX_AMOUNT: Decimal = Decimal::from_parts(0xA4C6_8000, 0x0003_8D7E, 0, false, 0);

/// Rewrite `s` with `.` as the only decimal separator and no grouping.
///
/// The last of `,` and `.` is the decimal separator when both occur. A lone
/// separator kind is grouping when it repeats or when a single comma is
/// followed by exactly three digits (`"1,250"`); otherwise it is decimal
/// (`"1500,50"`, `"12.5"`). Grouping must come in blocks of three digits.
fn normalize_separators(s: &str) -> Option<String> {
    let commas = s.matches(',').count();
    let dots = s.matches('.').count();

    let (decimal, grouping) = match (s.rfind(','), s.rfind('.')) {
        (Some(c), Some(d)) if c > d => (Some(','), Some('.')),
        (Some(_), Some(_)) => (Some('.'), Some(',')),
        (Some(c), None) => {
            let after = &s[c + 1..];
            let looks_grouped = after.len() == 3 && after.chars().all(|ch| ch.is_ascii_digit());
            if commas > 1 || looks_grouped {
                (None, Some(','))
            } else {
                (Some(','), None)
            }
        }
        (None, Some(_)) if dots > 1 => (None, Some('.')),
        (None, Some(_)) => (Some('.'), None),
        (None, None) => (None, None),
    };

    let (int_part, frac_part) = match decimal {
        Some(sep) => {
            let at = s.rfind(sep)?;
            (&s[..at], Some(&s[at + 1..]))
        }
        None => (s, None),
    };
    if let Some(frac) = frac_part {
        if frac.contains(|c| c == ',' || c == '.') {
            return None;
        }
    }

    let int_digits = match grouping {
        Some(sep) => {
            let groups: Vec<&str> = int_part.split(sep).collect();
            let first_ok = (1..=3).contains(&groups[0].len());
            let rest_ok = groups[1..].iter().all(|g| g.len() == 3);
            let digits_ok = groups.iter().all(|g| g.chars().all(|ch| ch.is_ascii_digit()));
            if !(first_ok && rest_ok && digits_ok) {
                return None;
            }
            groups.concat()
        }
        None => int_part.to_string(),
    };

    Some(match frac_part {
        Some(frac) => format!("{int_digits}.{frac}"),
        None => int_digits,
    })
}

// ── DateProcessor ─────────────────────────────────────────────────────────────

/// Parses claim dates from workbook date cells, serial numbers and text.
pub struct DateProcessor;

impl DateProcessor {
    /// Attempt to read a calendar date from a cell.
    ///
    /// * date cells and date-times → their date;
    /// * numbers → Excel serial dates (sheets often lose the date format);
    /// * text → [`parse_date_text`].
    pub fn parse(value: &CellValue) -> Option<NaiveDate> {
        match value {
            CellValue::DateTime(dt) => Some(dt.date()),
            CellValue::DateSerial(serial) | CellValue::Float(serial) => excel_serial_to_date(*serial),
            CellValue::Int(n) => excel_serial_to_date(*n as f64),
            CellValue::Text(s) => parse_date_text(s),
            _ => None,
        }
    }
}

// ── TextProcessor ─────────────────────────────────────────────────────────────

/// Renders identifier and free-text cells as trimmed strings.
pub struct TextProcessor;

impl TextProcessor {
    /// Render a cell as text; blank cells yield `None`.
    ///
    /// Integral floats lose their fractional part (`123.0` → `"123"`) so
    /// insured codes typed as numbers match the same code typed as text.
    pub fn parse(value: &CellValue) -> Option<String> {
        let text = match value {
            CellValue::Empty => return None,
            CellValue::Text(s) => s.trim().to_string(),
            CellValue::Int(n) => n.to_string(),
            CellValue::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
            CellValue::Float(f) => f.to_string(),
            CellValue::Bool(b) => b.to_string(),
            CellValue::DateSerial(serial) => excel_serial_to_date(*serial)
                .map(|d| d.to_string())
                .unwrap_or_else(|| serial.to_string()),
            CellValue::DateTime(dt) => dt.to_string(),
        };
        if text.is_empty() {
            None
        } else {
            Some(text)
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
