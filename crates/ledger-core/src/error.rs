use std::path::PathBuf;
use thiserror::Error;

use crate::models::CanonicalField;

/// All errors produced by the claim ledger.
#[derive(Error, Debug)]
pub enum ClaimsError {
    /// A file could not be opened or read from disk.
    #[error("Failed to read file {path}: {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A workbook or CSV container could not be decoded.
    #[error("Failed to open workbook {file}: {message}")]
    Workbook { file: String, message: String },

    /// A sheet lacks one or more required columns.
    #[error("Sheet '{sheet}' in {file} is missing required columns: {}", join_fields(.missing))]
    Schema {
        file: String,
        sheet: String,
        missing: Vec<CanonicalField>,
    },

    /// Neither the filename nor the claim dates yield a fiscal period.
    #[error("Could not resolve a period for {file}: {reason}")]
    PeriodUnresolved { file: String, reason: String },

    /// A single row could not be normalised.
    #[error("Row {row}: invalid {field}: {message}")]
    Parse {
        row: usize,
        field: CanonicalField,
        message: String,
    },

    /// A configuration value is missing or invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The report could not be assembled or written.
    #[error("Report error: {0}")]
    Report(String),

    /// No period produced any claim data.
    #[error("No valid claims were found in the supplied files")]
    NoData,

    /// The run was cancelled before it completed.
    #[error("Processing cancelled")]
    Cancelled,

    /// A JSON document could not be parsed.
    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// Pass-through for any raw I/O error that does not carry a path.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Convenience alias used throughout the ledger crates.
pub type Result<T> = std::result::Result<T, ClaimsError>;

fn join_fields(fields: &[CanonicalField]) -> String {
    fields
        .iter()
        .map(|f| f.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_file_read() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        let err = ClaimsError::FileRead {
            path: PathBuf::from("/claims/enero 2024.xlsx"),
            source: io_err,
        };
        let msg = err.to_string();
        assert!(msg.contains("Failed to read file"));
        assert!(msg.contains("enero 2024.xlsx"));
        assert!(msg.contains("no such file"));
    }

    #[test]
    fn test_error_display_schema_lists_fields() {
        let err = ClaimsError::Schema {
            file: "marzo 2024.xlsx".to_string(),
            sheet: "Hoja1".to_string(),
            missing: vec![CanonicalField::ClaimDate, CanonicalField::Amount],
        };
        assert_eq!(
            err.to_string(),
            "Sheet 'Hoja1' in marzo 2024.xlsx is missing required columns: FECHA_RECLAMO, MONTO"
        );
    }

    #[test]
    fn test_error_display_period_unresolved() {
        let err = ClaimsError::PeriodUnresolved {
            file: "reclamos.xlsx".to_string(),
            reason: "no month name in filename".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Could not resolve a period for reclamos.xlsx: no month name in filename"
        );
    }

    #[test]
    fn test_error_display_parse() {
        let err = ClaimsError::Parse {
            row: 7,
            field: CanonicalField::Amount,
            message: "'abc' is not a number".to_string(),
        };
        assert_eq!(err.to_string(), "Row 7: invalid MONTO: 'abc' is not a number");
    }

    #[test]
    fn test_error_display_config() {
        let err = ClaimsError::Config("covid_cap must not be negative".to_string());
        assert_eq!(
            err.to_string(),
            "Configuration error: covid_cap must not be negative"
        );
    }

    #[test]
    fn test_error_display_no_data() {
        let msg = ClaimsError::NoData.to_string();
        assert!(msg.contains("No valid claims"));
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: ClaimsError = io_err.into();
        assert!(err.to_string().contains("denied"));
    }

    #[test]
    fn test_error_from_serde_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("{invalid}").unwrap_err();
        let err: ClaimsError = json_err.into();
        assert!(err.to_string().contains("Failed to parse JSON"));
    }
}
