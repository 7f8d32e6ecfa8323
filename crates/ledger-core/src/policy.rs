use crate::error::{ClaimsError, Result};
use crate::models::PolicyYear;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

// ── Shared constants ──────────────────────────────────────────────────────────

/// Default symmetric cap on the running year-1 COVID amount.
pub const DEFAULT_COVID_CAP: Decimal = Decimal::from_parts(2_000, 0, 0, false, 0);

/// Default symmetric cap on the running year-1 total.
pub const DEFAULT_TOTAL_CAP_YEAR1: Decimal = Decimal::from_parts(20_000, 0, 0, false, 0);

/// Default year-2 magnitude that must be exceeded before anything is paid.
pub const DEFAULT_TRIGGER_CAP_YEAR2: Decimal = Decimal::from_parts(40_000, 0, 0, false, 0);

/// Default symmetric cap on the year-2 payout.
pub const DEFAULT_TOTAL_CAP_YEAR2: Decimal = Decimal::from_parts(2_000_000, 0, 0, false, 0);

/// Fiscal quarters per policy year; sequences beyond this belong to year 2.
pub const QUARTERS_PER_YEAR: i32 = 4;

// ── GroupingPolicy ────────────────────────────────────────────────────────────

/// How sequenced files are grouped into periods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum GroupingPolicy {
    /// Key each file by the fiscal quarter its month falls in (`Q1-2024`).
    FilenameQuarter,
    /// Every three consecutive files form one period (`Q1`, `Q2`, ...).
    SequentialTriplet,
}

impl GroupingPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            GroupingPolicy::FilenameQuarter => "filename-quarter",
            GroupingPolicy::SequentialTriplet => "sequential-triplet",
        }
    }
}

impl FromStr for GroupingPolicy {
    type Err = ClaimsError;

    fn from_str(value: &str) -> Result<Self> {
        match value.to_lowercase().replace('_', "-").as_str() {
            "filename-quarter" | "quarter" => Ok(GroupingPolicy::FilenameQuarter),
            "sequential-triplet" | "triplet" => Ok(GroupingPolicy::SequentialTriplet),
            other => Err(ClaimsError::Config(format!("unknown grouping policy: {other}"))),
        }
    }
}

// ── PolicyYearSource ──────────────────────────────────────────────────────────

/// Which evidence decides a period's policy year.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum PolicyYearSource {
    /// Quarter sequence number: 1–4 are year 1, 5 and later are year 2.
    Sequence,
    /// The policy window holding most of the period's claim dates.
    Calendar,
}

impl PolicyYearSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyYearSource::Sequence => "sequence",
            PolicyYearSource::Calendar => "calendar",
        }
    }
}

/// Policy year implied by a quarter sequence number.
pub fn policy_year_for_sequence(sequence: i32) -> PolicyYear {
    if sequence > QUARTERS_PER_YEAR {
        PolicyYear::Year2
    } else {
        PolicyYear::Year1
    }
}

// ── CapLimits ─────────────────────────────────────────────────────────────────

/// Monetary limits of both capping regimes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapLimits {
    pub covid_cap: Decimal,
    pub total_cap_year1: Decimal,
    pub trigger_cap_year2: Decimal,
    pub total_cap_year2: Decimal,
}

impl Default for CapLimits {
    fn default() -> Self {
        Self {
            covid_cap: DEFAULT_COVID_CAP,
            total_cap_year1: DEFAULT_TOTAL_CAP_YEAR1,
            trigger_cap_year2: DEFAULT_TRIGGER_CAP_YEAR2,
            total_cap_year2: DEFAULT_TOTAL_CAP_YEAR2,
        }
    }
}

// ── Windows ───────────────────────────────────────────────────────────────────

/// Inclusive calendar window of one policy year.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl PolicyWindow {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

/// The calendar windows of both policy years.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyWindows {
    pub year1: PolicyWindow,
    pub year2: PolicyWindow,
}

impl Default for PolicyWindows {
    fn default() -> Self {
        // Windows used by the 2023/2024 and 2024/2025 contracts.
        let ymd = |y, m, d| NaiveDate::from_ymd_opt(y, m, d).unwrap_or_default();
        Self {
            year1: PolicyWindow::new(ymd(2023, 10, 1), ymd(2024, 9, 30)),
            year2: PolicyWindow::new(ymd(2024, 10, 1), ymd(2025, 9, 30)),
        }
    }
}

impl PolicyWindows {
    pub fn window(&self, year: PolicyYear) -> &PolicyWindow {
        match year {
            PolicyYear::Year1 => &self.year1,
            PolicyYear::Year2 => &self.year2,
        }
    }

    /// The policy year whose window contains `date`, if any.
    pub fn year_of(&self, date: NaiveDate) -> Option<PolicyYear> {
        if self.year1.contains(date) {
            Some(PolicyYear::Year1)
        } else if self.year2.contains(date) {
            Some(PolicyYear::Year2)
        } else {
            None
        }
    }

    /// `true` when `date` falls inside either window.
    pub fn covers(&self, date: NaiveDate) -> bool {
        self.year_of(date).is_some()
    }
}

// ── EngineConfig ──────────────────────────────────────────────────────────────

/// Every tunable of the aggregation engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub limits: CapLimits,
    pub windows: PolicyWindows,
    pub grouping: GroupingPolicy,
    pub policy_year_source: PolicyYearSource,
    /// Drop claims dated outside the policy window of their period.
    pub date_filter: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            limits: CapLimits::default(),
            windows: PolicyWindows::default(),
            grouping: GroupingPolicy::FilenameQuarter,
            policy_year_source: PolicyYearSource::Calendar,
            date_filter: true,
        }
    }
}

impl EngineConfig {
    /// Check the configuration before any file is processed.
    ///
    /// Rejects negative caps, empty or inverted windows, and a year-2 window
    /// that does not start after year 1 ends.
    pub fn validate(&self) -> Result<()> {
        let caps = [
            ("covid_cap", self.limits.covid_cap),
            ("total_cap_year1", self.limits.total_cap_year1),
            ("trigger_cap_year2", self.limits.trigger_cap_year2),
            ("total_cap_year2", self.limits.total_cap_year2),
        ];
        for (name, value) in caps {
            if value < Decimal::ZERO {
                return Err(ClaimsError::Config(format!(
                    "{name} must not be negative (got {value})"
                )));
            }
        }

        for (name, window) in [("year 1", &self.windows.year1), ("year 2", &self.windows.year2)] {
            if window.start > window.end {
                return Err(ClaimsError::Config(format!(
                    "{name} window starts ({}) after it ends ({})",
                    window.start, window.end
                )));
            }
        }

        if self.windows.year2.start <= self.windows.year1.end {
            return Err(ClaimsError::Config(format!(
                "year 2 window must start after year 1 ends ({} <= {})",
                self.windows.year2.start, self.windows.year1.end
            )));
        }

        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
