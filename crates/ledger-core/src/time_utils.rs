use chrono::{Datelike, Days, NaiveDate, NaiveDateTime};
use std::collections::BTreeMap;
use tracing::debug;

// ── Spanish month names ───────────────────────────────────────────────────────

/// Spanish month names as they appear in claim file names.
pub const SPANISH_MONTHS: [(&str, u32); 12] = [
    ("enero", 1),
    ("febrero", 2),
    ("marzo", 3),
    ("abril", 4),
    ("mayo", 5),
    ("junio", 6),
    ("julio", 7),
    ("agosto", 8),
    ("septiembre", 9),
    ("octubre", 10),
    ("noviembre", 11),
    ("diciembre", 12),
];

/// Month number for a lowercase Spanish month name.
pub fn month_from_spanish(name: &str) -> Option<u32> {
    SPANISH_MONTHS
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, m)| *m)
}

// ── Fiscal quarters ───────────────────────────────────────────────────────────

/// Fiscal quarter (1–4) of a calendar month; the fiscal year starts in
/// October.
pub fn fiscal_quarter(month: u32) -> u8 {
    match month {
        10..=12 => 1,
        1..=3 => 2,
        4..=6 => 3,
        _ => 4,
    }
}

/// `(year, month)` of the first month of the fiscal quarter containing
/// `(year, month)`.
pub fn quarter_start(year: i32, month: u32) -> (i32, u32) {
    let first = match month {
        10..=12 => 10,
        1..=3 => 1,
        4..=6 => 4,
        _ => 7,
    };
    (year, first)
}

/// Report label of the quarter containing `(year, month)`, keyed by the
/// calendar year of the month, e.g. `"Q1-2023"` for November 2023.
pub fn quarter_label(year: i32, month: u32) -> String {
    format!("Q{}-{}", fiscal_quarter(month), year)
}

/// Months since year 0, used for ordering and distances.
pub fn month_index(year: i32, month: u32) -> i32 {
    year * 12 + month as i32 - 1
}

/// Inverse of [`month_index`].
pub fn from_month_index(index: i32) -> (i32, u32) {
    (index.div_euclid(12), index.rem_euclid(12) as u32 + 1)
}

/// Ordinal of the quarter containing `(year, month)` relative to the quarter
/// containing `anchor`: the anchor's quarter is 1, the next one 2, and
/// earlier quarters are 0 or negative.
pub fn quarter_sequence(year: i32, month: u32, anchor: NaiveDate) -> i32 {
    let (qy, qm) = quarter_start(year, month);
    let (ay, am) = quarter_start(anchor.year(), anchor.month());
    (month_index(qy, qm) - month_index(ay, am)).div_euclid(3) + 1
}

// ── Date parsing ──────────────────────────────────────────────────────────────

/// Convert an Excel (1900 system) serial number to a date.
///
/// Serials below 1 are not dates. The fractional part (time of day) is
/// ignored.
pub fn excel_serial_to_date(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() || !(1.0..=MAX_EXCEL_SERIAL).contains(&serial) {
        return None;
    }
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    epoch.checked_add_days(Days::new(serial.trunc() as u64))
}

/// Serial of 9999-12-31, the last date Excel can represent.
pub const MAX_EXCEL_SERIAL: f64 = 2_958_465.0;

/// Parse a date typed as text in a claims sheet.
///
/// Accepts ISO dates and date-times and day-first dates with `/`, `-` or `.`
/// separators. Returns `None` for anything else.
pub fn parse_date_text(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    const DATETIME_FORMATS: &[&str] = &[
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S",
        "%d/%m/%Y %H:%M:%S",
        "%d/%m/%Y %H:%M",
    ];
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt.date());
        }
    }

    const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%d/%m/%Y", "%d-%m-%Y", "%d.%m.%Y"];
    for fmt in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(s, fmt) {
            return Some(date);
        }
    }

    debug!("time_utils: could not parse date \"{}\"", s);
    None
}

/// Most frequent calendar year among `dates`; ties go to the earliest year.
pub fn most_frequent_year<'a>(dates: impl IntoIterator<Item = &'a NaiveDate>) -> Option<i32> {
    let mut counts: BTreeMap<i32, usize> = BTreeMap::new();
    for date in dates {
        *counts.entry(date.year()).or_default() += 1;
    }
    // BTreeMap iterates in ascending year order, so keeping the first maximum
    // resolves ties towards the earliest year.
    let mut best: Option<(i32, usize)> = None;
    for (year, count) in counts {
        if best.map_or(true, |(_, c)| count > c) {
            best = Some((year, count));
        }
    }
    best.map(|(year, _)| year)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
