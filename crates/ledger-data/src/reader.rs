//! Spreadsheet discovery and loading.
//!
//! Claim files arrive as Excel workbooks (any format `calamine` opens) or CSV
//! exports. Both are read into [`RawSheet`]s: the first non-blank row is the
//! header row and every following row is kept as typed [`CellValue`]s.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use calamine::{open_workbook_auto, Data, Reader};
use ledger_core::error::{ClaimsError, Result};
use ledger_core::models::{CellValue, RawSheet};
use ledger_core::time_utils::parse_date_text;
use tracing::{debug, warn};

/// File extensions picked up when scanning directories.
pub const SUPPORTED_EXTENSIONS: [&str; 6] = ["xlsx", "xlsm", "xls", "xlsb", "ods", "csv"];

// ── SpreadsheetSource ─────────────────────────────────────────────────────────

/// Anything that yields a filename plus one or more named sheets of rows.
pub trait SpreadsheetSource: Send {
    /// Name used for period classification and in the run report.
    fn filename(&self) -> &str;

    /// Read every sheet of the source.
    fn read_sheets(&self) -> Result<Vec<RawSheet>>;
}

/// Workbook on disk read through `calamine` (xlsx, xlsm, xls, xlsb, ods).
#[derive(Debug, Clone)]
pub struct XlsxSource {
    path: PathBuf,
    filename: String,
}

impl XlsxSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let filename = display_name(&path);
        Self { path, filename }
    }
}

impl SpreadsheetSource for XlsxSource {
    fn filename(&self) -> &str {
        &self.filename
    }

    fn read_sheets(&self) -> Result<Vec<RawSheet>> {
        if !self.path.is_file() {
            return Err(ClaimsError::FileRead {
                path: self.path.clone(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "not a readable file"),
            });
        }

        let mut workbook = open_workbook_auto(&self.path).map_err(|e| ClaimsError::Workbook {
            file: self.filename.clone(),
            message: e.to_string(),
        })?;

        let sheet_names: Vec<String> = workbook.sheet_names().to_vec();
        if sheet_names.is_empty() {
            return Err(ClaimsError::Workbook {
                file: self.filename.clone(),
                message: "workbook contains no sheets".to_string(),
            });
        }

        let mut sheets = Vec::with_capacity(sheet_names.len());
        for name in &sheet_names {
            let range = match workbook.worksheet_range(name) {
                Ok(r) => r,
                Err(e) => {
                    warn!("Skipping sheet '{}' in {}: {}", name, self.filename, e);
                    continue;
                }
            };
            let rows: Vec<Vec<CellValue>> = range
                .rows()
                .map(|row| row.iter().map(cell_from_calamine).collect())
                .collect();
            debug!("Read sheet '{}' of {}: {} rows", name, self.filename, rows.len());
            sheets.push(sheet_from_rows(name, rows));
        }

        Ok(sheets)
    }
}

/// CSV export read through the `csv` crate. Yields a single sheet named after
/// the file stem; every cell is text.
#[derive(Debug, Clone)]
pub struct CsvSource {
    path: PathBuf,
    filename: String,
    delimiter: u8,
}

impl CsvSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let filename = display_name(&path);
        Self {
            path,
            filename,
            delimiter: b',',
        }
    }

    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }
}

impl SpreadsheetSource for CsvSource {
    fn filename(&self) -> &str {
        &self.filename
    }

    fn read_sheets(&self) -> Result<Vec<RawSheet>> {
        let content = std::fs::read(&self.path).map_err(|e| ClaimsError::FileRead {
            path: self.path.clone(),
            source: e,
        })?;

        let mut reader = csv::ReaderBuilder::new()
            .delimiter(self.delimiter)
            .has_headers(false)
            .flexible(true)
            .from_reader(content.as_slice());

        let mut rows: Vec<Vec<CellValue>> = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|e| ClaimsError::Workbook {
                file: self.filename.clone(),
                message: e.to_string(),
            })?;
            rows.push(
                record
                    .iter()
                    .map(|field| {
                        if field.trim().is_empty() {
                            CellValue::Empty
                        } else {
                            CellValue::Text(field.to_string())
                        }
                    })
                    .collect(),
            );
        }

        let sheet_name = self
            .path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.filename.clone());
        Ok(vec![sheet_from_rows(&sheet_name, rows)])
    }
}

/// Sheets held in memory; used by tests and embedding callers.
#[derive(Debug, Clone)]
pub struct MemorySource {
    filename: String,
    sheets: Vec<RawSheet>,
}

impl MemorySource {
    pub fn new(filename: impl Into<String>, sheets: Vec<RawSheet>) -> Self {
        Self {
            filename: filename.into(),
            sheets,
        }
    }
}

impl SpreadsheetSource for MemorySource {
    fn filename(&self) -> &str {
        &self.filename
    }

    fn read_sheets(&self) -> Result<Vec<RawSheet>> {
        Ok(self.sheets.clone())
    }
}

// ── Discovery ─────────────────────────────────────────────────────────────────

/// Expand `inputs` into the list of claim files to process.
///
/// Files are kept as given; directories are scanned recursively for
/// [`SUPPORTED_EXTENSIONS`], sorted by path. Office lock files (`~$...`) are
/// ignored and duplicates removed, keeping the first occurrence.
pub fn find_input_files(inputs: &[PathBuf]) -> Vec<PathBuf> {
    let mut seen: HashSet<PathBuf> = HashSet::new();
    let mut files: Vec<PathBuf> = Vec::new();

    for input in inputs {
        if input.is_dir() {
            let mut found: Vec<PathBuf> = walkdir::WalkDir::new(input)
                .follow_links(true)
                .into_iter()
                .filter_map(|entry| entry.ok())
                .filter(|entry| entry.file_type().is_file() && is_supported(entry.path()))
                .map(|entry| entry.into_path())
                .collect();
            found.sort();
            if found.is_empty() {
                warn!("No claim files found in {}", input.display());
            }
            for path in found {
                if seen.insert(path.clone()) {
                    files.push(path);
                }
            }
        } else if input.exists() {
            if seen.insert(input.clone()) {
                files.push(input.clone());
            }
        } else {
            warn!("Input path does not exist: {}", input.display());
        }
    }

    files
}

/// Build the source matching the file extension of `path`.
pub fn open_source(path: &Path) -> Box<dyn SpreadsheetSource> {
    if has_extension(path, "csv") {
        Box::new(CsvSource::new(path).with_delimiter(sniff_delimiter(path)))
    } else {
        Box::new(XlsxSource::new(path))
    }
}

// ── Internal helpers ──────────────────────────────────────────────────────────

/// `;` when the first line of a CSV export has more semicolons than commas,
/// as spreadsheet tools write in comma-decimal locales; `,` otherwise.
fn sniff_delimiter(path: &Path) -> u8 {
    let Ok(content) = std::fs::read(path) else {
        return b',';
    };
    let first_line = content.split(|&b| b == b'\n').next().unwrap_or_default();
    let count = |d: u8| first_line.iter().filter(|&&b| b == d).count();
    if count(b';') > count(b',') {
        b';'
    } else {
        b','
    }
}

fn is_supported(path: &Path) -> bool {
    let is_lock_file = path
        .file_name()
        .map(|n| n.to_string_lossy().starts_with("~$"))
        .unwrap_or(false);
    !is_lock_file && SUPPORTED_EXTENSIONS.iter().any(|ext| has_extension(path, ext))
}

fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension()
        .map(|e| e.to_string_lossy().eq_ignore_ascii_case(ext))
        .unwrap_or(false)
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Split raw rows into a header row (the first row with any content) and data
/// rows.
fn sheet_from_rows(name: &str, rows: Vec<Vec<CellValue>>) -> RawSheet {
    let mut iter = rows.into_iter().skip_while(|row| row.iter().all(CellValue::is_blank));
    let headers = iter
        .next()
        .map(|row| row.iter().map(header_text).collect())
        .unwrap_or_default();
    RawSheet::new(name, headers, iter.collect())
}

fn header_text(cell: &CellValue) -> String {
    match cell {
        CellValue::Empty => String::new(),
        CellValue::Text(s) => s.clone(),
        CellValue::Int(n) => n.to_string(),
        CellValue::Float(f) => f.to_string(),
        CellValue::Bool(b) => b.to_string(),
        CellValue::DateSerial(f) => f.to_string(),
        CellValue::DateTime(dt) => dt.to_string(),
    }
}

fn cell_from_calamine(cell: &Data) -> CellValue {
    match cell {
        Data::Empty => CellValue::Empty,
        Data::String(s) => CellValue::Text(s.clone()),
        Data::Int(n) => CellValue::Int(*n),
        Data::Float(f) => CellValue::Float(*f),
        Data::Bool(b) => CellValue::Bool(*b),
        // calamine does not expose the 1904 flag; the 1900 system is assumed.
        Data::DateTime(dt) => CellValue::DateSerial(dt.as_f64()),
        Data::DateTimeIso(s) => match chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f") {
            Ok(dt) => CellValue::DateTime(dt),
            Err(_) => match parse_date_text(s) {
                Some(d) => CellValue::DateTime(d.and_time(chrono::NaiveTime::MIN)),
                None => CellValue::Text(s.clone()),
            },
        },
        Data::DurationIso(s) => CellValue::Text(s.clone()),
        Data::Error(e) => CellValue::Text(format!("#{:?}", e)),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
