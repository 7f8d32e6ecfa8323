//! Header detection.
//!
//! Monthly claim files spell the same column many ways. [`COLUMN_PATTERNS`]
//! lists, per canonical field, the header variants in priority order; the
//! first pattern that matches any header wins.

use std::collections::BTreeMap;

use ledger_core::error::{ClaimsError, Result};
use ledger_core::models::CanonicalField;

/// How a header variant is matched against an upper-cased header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderPattern {
    Exact(&'static str),
    Contains(&'static str),
}

impl HeaderPattern {
    pub fn matches(&self, header: &str) -> bool {
        match self {
            HeaderPattern::Exact(p) => header == *p,
            HeaderPattern::Contains(p) => header.contains(p),
        }
    }
}

/// Known header variants for every canonical field.
pub const COLUMN_PATTERNS: &[(CanonicalField, &[HeaderPattern])] = &[
    (
        CanonicalField::InsuredCode,
        &[
            HeaderPattern::Exact("COD_ASEGURADO"),
            HeaderPattern::Exact("COD ASEGURADO"),
            HeaderPattern::Exact("CODIGO_ASEGURADO"),
            HeaderPattern::Exact("CODIGO ASEGURADO"),
        ],
    ),
    (
        CanonicalField::InsuredName,
        &[
            HeaderPattern::Exact("NOMBRES ASEGURADO"),
            HeaderPattern::Exact("NOMBRE ASEGURADO"),
            HeaderPattern::Exact("NOMBRESASEURADO"),
            HeaderPattern::Exact("NOMBRE_ASEGURADO"),
            HeaderPattern::Exact("NOMBRES_ASEGURADO"),
            HeaderPattern::Exact("NOMBRESASEGURADO"),
        ],
    ),
    (
        CanonicalField::ClaimDate,
        &[
            HeaderPattern::Exact("FECHA_RECLAMO"),
            HeaderPattern::Exact("FECHA RECLAMO"),
        ],
    ),
    (CanonicalField::Amount, &[HeaderPattern::Contains("MONTO")]),
    (
        CanonicalField::Diagnosis,
        &[
            HeaderPattern::Exact("DIAGNOSTICOS"),
            HeaderPattern::Exact("DIAGNOSTICO"),
        ],
    ),
];

/// Canonical field → column index for one sheet. Absent optional fields are
/// simply not present.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnMapping {
    columns: BTreeMap<CanonicalField, usize>,
}

impl ColumnMapping {
    pub fn get(&self, field: CanonicalField) -> Option<usize> {
        self.columns.get(&field).copied()
    }

    pub fn contains(&self, field: CanonicalField) -> bool {
        self.columns.contains_key(&field)
    }

    /// Required fields without a column, in canonical order.
    pub fn missing_required(&self) -> Vec<CanonicalField> {
        CanonicalField::ALL
            .iter()
            .copied()
            .filter(|f| f.is_required() && !self.contains(*f))
            .collect()
    }

    /// Fail with [`ClaimsError::Schema`] when a required field is missing.
    pub fn validate(&self, file: &str, sheet: &str) -> Result<()> {
        let missing = self.missing_required();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(ClaimsError::Schema {
                file: file.to_string(),
                sheet: sheet.to_string(),
                missing,
            })
        }
    }
}

/// Map `headers` (already trimmed and upper-cased) onto canonical fields.
pub fn detect_columns(headers: &[String]) -> ColumnMapping {
    let mut columns = BTreeMap::new();
    for (field, patterns) in COLUMN_PATTERNS {
        let found = patterns
            .iter()
            .find_map(|p| headers.iter().position(|h| p.matches(h)));
        if let Some(index) = found {
            columns.insert(*field, index);
        }
    }
    ColumnMapping { columns }
}
