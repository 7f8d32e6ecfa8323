use chrono::NaiveDate;
use clap::{CommandFactory, Parser};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::Result;
use crate::policy::{
    CapLimits, EngineConfig, GroupingPolicy, PolicyWindow, PolicyWindows, PolicyYearSource,
};

/// Directory under the home directory holding persisted state, logs and
/// reports.
pub const APP_DIR_NAME: &str = ".claim-ledger";

// ── Settings (CLI) ─────────────────────────────────────────────────────────────

/// Cumulative quarterly claims ledger with policy-year capping
#[derive(Parser, Debug, Clone)]
#[command(
    name = "claim-ledger",
    about = "Cumulative quarterly claims ledger with policy-year capping",
    version
)]
pub struct Settings {
    /// Claim spreadsheets, or directories scanned recursively for them
    #[arg(value_name = "INPUT")]
    pub inputs: Vec<PathBuf>,

    /// Report path (defaults to ~/.claim-ledger/reports/Processed_Claims_Report_<timestamp>.xlsx)
    #[arg(long, short)]
    pub output: Option<PathBuf>,

    /// Previously produced report whose periods seed the ledgers
    #[arg(long)]
    pub seed_report: Option<PathBuf>,

    /// How files are grouped into periods
    #[arg(long, value_enum, default_value_t = GroupingPolicy::FilenameQuarter)]
    pub grouping: GroupingPolicy,

    /// Evidence deciding each period's policy year
    #[arg(long, value_enum, default_value_t = PolicyYearSource::Calendar)]
    pub policy_year_source: PolicyYearSource,

    /// Year 1 cap on the running COVID amount
    #[arg(long, default_value = "2000")]
    pub covid_cap: Decimal,

    /// Year 1 cap on the running total
    #[arg(long, default_value = "20000")]
    pub total_cap_year1: Decimal,

    /// Year 2 total that must be exceeded before anything is paid
    #[arg(long, default_value = "40000")]
    pub trigger_cap_year2: Decimal,

    /// Year 2 cap on the payout
    #[arg(long, default_value = "2000000")]
    pub total_cap_year2: Decimal,

    /// First day of policy year 1 (YYYY-MM-DD)
    #[arg(long, default_value = "2023-10-01")]
    pub year1_start: NaiveDate,

    /// Last day of policy year 1 (YYYY-MM-DD)
    #[arg(long, default_value = "2024-09-30")]
    pub year1_end: NaiveDate,

    /// First day of policy year 2 (YYYY-MM-DD)
    #[arg(long, default_value = "2024-10-01")]
    pub year2_start: NaiveDate,

    /// Last day of policy year 2 (YYYY-MM-DD)
    #[arg(long, default_value = "2025-09-30")]
    pub year2_end: NaiveDate,

    /// Keep claims dated outside their period's policy window
    #[arg(long)]
    pub no_date_filter: bool,

    /// Logging level
    #[arg(long, default_value = "INFO", value_parser = ["DEBUG", "INFO", "WARNING", "ERROR", "CRITICAL"])]
    pub log_level: String,

    /// Log file path
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long)]
    pub debug: bool,

    /// Clear saved configuration
    #[arg(long)]
    pub clear: bool,
}

// ── LastUsedParams ─────────────────────────────────────────────────────────────

/// Persisted last-used engine tunables saved to `~/.claim-ledger/last_used.json`.
#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq)]
pub struct LastUsedParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grouping: Option<GroupingPolicy>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub policy_year_source: Option<PolicyYearSource>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub covid_cap: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_cap_year1: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trigger_cap_year2: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_cap_year2: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year1_start: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year1_end: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year2_start: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year2_end: Option<NaiveDate>,
}

impl LastUsedParams {
    /// Return the default path to the persisted config file.
    /// Uses `~/.claim-ledger/last_used.json`.
    pub fn config_path() -> PathBuf {
        Self::config_path_in(&dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")))
    }

    /// Return the config path rooted at `base_dir` (used for testing).
    pub fn config_path_in(base_dir: &std::path::Path) -> PathBuf {
        base_dir.join(APP_DIR_NAME).join("last_used.json")
    }

    /// Load persisted params from the default path.
    /// Returns `Default` when the file is absent or cannot be parsed.
    pub fn load() -> Self {
        Self::load_from(&Self::config_path())
    }

    /// Load persisted params from an explicit path.
    pub fn load_from(path: &std::path::Path) -> Self {
        let Ok(content) = std::fs::read_to_string(path) else {
            return Self::default();
        };
        serde_json::from_str(&content).unwrap_or_default()
    }

    /// Atomically write params to the default path.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path())
    }

    /// Atomically write params to an explicit path, creating parent
    /// directories if needed.
    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string_pretty(self)?;

        // Write to a temp file then rename for atomicity.
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, &json)?;
        std::fs::rename(&tmp, path)?;

        Ok(())
    }

    /// Delete the default config file if it exists.
    pub fn clear() -> Result<()> {
        Self::clear_at(&Self::config_path())
    }

    /// Delete the config file at an explicit path if it exists.
    pub fn clear_at(path: &std::path::Path) -> Result<()> {
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }
}

// ── Settings impl ──────────────────────────────────────────────────────────────

/// Copy a persisted value into `$settings.$field` unless the flag was given
/// on the command line.
macro_rules! merge_last_used {
    ($matches:expr, $settings:expr, $last:expr, $($field:ident),+ $(,)?) => {
        $(
            if !is_arg_explicitly_set($matches, stringify!($field)) {
                if let Some(v) = $last.$field {
                    $settings.$field = v;
                }
            }
        )+
    };
}

impl Settings {
    /// Parse CLI arguments, merge with last-used params where no explicit CLI
    /// value was provided, and persist the result.
    pub fn load_with_last_used() -> Self {
        Self::load_with_last_used_impl(
            std::env::args_os().collect(),
            &LastUsedParams::config_path(),
        )
    }

    /// Full implementation; accepts args and an explicit config path so that
    /// tests can redirect to a temporary directory.
    pub fn load_with_last_used_impl(
        args: Vec<std::ffi::OsString>,
        config_path: &std::path::Path,
    ) -> Self {
        // Raw ArgMatches are needed to query ValueSource.
        let matches = Settings::command().get_matches_from(args.clone());
        let mut settings = Settings::parse_from(args);

        if settings.clear {
            if let Err(e) = LastUsedParams::clear_at(config_path) {
                tracing::warn!("Failed to clear saved configuration: {}", e);
            }
            return Self::apply_debug(settings);
        }

        let last = LastUsedParams::load_from(config_path);

        // clap stores the arg id under the field name (underscores).
        merge_last_used!(
            &matches,
            settings,
            last,
            grouping,
            policy_year_source,
            covid_cap,
            total_cap_year1,
            trigger_cap_year2,
            total_cap_year2,
            year1_start,
            year1_end,
            year2_start,
            year2_end,
        );

        settings = Self::apply_debug(settings);

        // An invalid combination is not remembered for the next run.
        if settings.engine_config().is_ok() {
            let params = LastUsedParams::from(&settings);
            if let Err(e) = params.save_to(config_path) {
                tracing::warn!("Failed to persist last-used parameters: {}", e);
            }
        }

        settings
    }

    /// `--debug` overrides the log level.
    fn apply_debug(mut settings: Settings) -> Settings {
        if settings.debug {
            settings.log_level = "DEBUG".to_string();
        }
        settings
    }

    /// Build and validate the engine configuration.
    pub fn engine_config(&self) -> Result<EngineConfig> {
        let config = EngineConfig {
            limits: CapLimits {
                covid_cap: self.covid_cap,
                total_cap_year1: self.total_cap_year1,
                trigger_cap_year2: self.trigger_cap_year2,
                total_cap_year2: self.total_cap_year2,
            },
            windows: PolicyWindows {
                year1: PolicyWindow::new(self.year1_start, self.year1_end),
                year2: PolicyWindow::new(self.year2_start, self.year2_end),
            },
            grouping: self.grouping,
            policy_year_source: self.policy_year_source,
            date_filter: !self.no_date_filter,
        };
        config.validate()?;
        Ok(config)
    }
}

// ── Conversion ─────────────────────────────────────────────────────────────────

impl From<&Settings> for LastUsedParams {
    fn from(s: &Settings) -> Self {
        LastUsedParams {
            grouping: Some(s.grouping),
            policy_year_source: Some(s.policy_year_source),
            covid_cap: Some(s.covid_cap),
            total_cap_year1: Some(s.total_cap_year1),
            trigger_cap_year2: Some(s.trigger_cap_year2),
            total_cap_year2: Some(s.total_cap_year2),
            year1_start: Some(s.year1_start),
            year1_end: Some(s.year1_end),
            year2_start: Some(s.year2_start),
            year2_end: Some(s.year2_end),
        }
    }
}

/// Returns `true` when `name` was supplied explicitly on the command line
/// (not via default value or environment variable).
fn is_arg_explicitly_set(matches: &clap::ArgMatches, name: &str) -> bool {
    matches.value_source(name) == Some(clap::parser::ValueSource::CommandLine)
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ClaimsError;
    use rust_decimal_macros::dec;
    use tempfile::TempDir;

    fn tmp_config_path(tmp: &TempDir) -> PathBuf {
        LastUsedParams::config_path_in(tmp.path())
    }

    fn args(list: &[&str]) -> Vec<std::ffi::OsString> {
        list.iter().map(|s| s.into()).collect()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_last_used_params_save_load() {
        let tmp = TempDir::new().expect("tempdir");
        let path = tmp_config_path(&tmp);
        let params = LastUsedParams {
            grouping: Some(GroupingPolicy::SequentialTriplet),
            covid_cap: Some(dec!(2500.50)),
            year2_end: Some(date(2025, 12, 31)),
            ..Default::default()
        };
        params.save_to(&path).expect("save");

        let loaded = LastUsedParams::load_from(&path);
        assert_eq!(loaded, params);
    }

    #[test]
    fn test_last_used_params_clear() {
        let tmp = TempDir::new().expect("tempdir");
        let path = tmp_config_path(&tmp);

        LastUsedParams {
            covid_cap: Some(dec!(1)),
            ..Default::default()
        }
        .save_to(&path)
        .expect("save");
        assert!(path.exists(), "file must exist after save");

        LastUsedParams::clear_at(&path).expect("clear");
        assert!(!path.exists(), "file must be gone after clear");
    }

    #[test]
    fn test_last_used_params_default_when_missing_or_corrupt() {
        let tmp = TempDir::new().expect("tempdir");
        let path = tmp_config_path(&tmp);
        assert_eq!(LastUsedParams::load_from(&path), LastUsedParams::default());

        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "{not json").unwrap();
        assert_eq!(LastUsedParams::load_from(&path), LastUsedParams::default());
    }

    #[test]
    fn test_settings_default_values() {
        let settings = Settings::parse_from(["claim-ledger"]);

        assert!(settings.inputs.is_empty());
        assert!(settings.output.is_none());
        assert!(settings.seed_report.is_none());
        assert_eq!(settings.grouping, GroupingPolicy::FilenameQuarter);
        assert_eq!(settings.policy_year_source, PolicyYearSource::Calendar);
        assert_eq!(settings.covid_cap, dec!(2000));
        assert_eq!(settings.total_cap_year1, dec!(20000));
        assert_eq!(settings.trigger_cap_year2, dec!(40000));
        assert_eq!(settings.total_cap_year2, dec!(2000000));
        assert_eq!(settings.year1_start, date(2023, 10, 1));
        assert_eq!(settings.year2_end, date(2025, 9, 30));
        assert!(!settings.no_date_filter);
        assert_eq!(settings.log_level, "INFO");
        assert!(settings.log_file.is_none());
        assert!(!settings.debug);
        assert!(!settings.clear);
    }

    #[test]
    fn test_settings_default_engine_config_matches_policy_defaults() {
        let settings = Settings::parse_from(["claim-ledger"]);
        assert_eq!(settings.engine_config().unwrap(), EngineConfig::default());
    }

    #[test]
    fn test_settings_cli_parsing() {
        let settings = Settings::parse_from([
            "claim-ledger",
            "enero 2024.xlsx",
            "claims/",
            "--grouping",
            "sequential-triplet",
            "--policy-year-source",
            "sequence",
            "--covid-cap",
            "1500.75",
            "--year1-start",
            "2023-11-01",
            "--no-date-filter",
            "-o",
            "/tmp/out.xlsx",
        ]);
        assert_eq!(
            settings.inputs,
            vec![PathBuf::from("enero 2024.xlsx"), PathBuf::from("claims/")]
        );
        assert_eq!(settings.grouping, GroupingPolicy::SequentialTriplet);
        assert_eq!(settings.policy_year_source, PolicyYearSource::Sequence);
        assert_eq!(settings.covid_cap, dec!(1500.75));
        assert_eq!(settings.year1_start, date(2023, 11, 1));
        assert_eq!(settings.output, Some(PathBuf::from("/tmp/out.xlsx")));

        let config = settings.engine_config().unwrap();
        assert!(!config.date_filter);
        assert_eq!(config.windows.year1.start, date(2023, 11, 1));
    }

    #[test]
    fn test_settings_rejects_malformed_values() {
        assert!(Settings::try_parse_from(["claim-ledger", "--covid-cap", "abc"]).is_err());
        assert!(Settings::try_parse_from(["claim-ledger", "--year1-end", "30/09/2024"]).is_err());
        assert!(Settings::try_parse_from(["claim-ledger", "--grouping", "monthly"]).is_err());
    }

    #[test]
    fn test_engine_config_rejects_negative_cap() {
        let settings = Settings::parse_from(["claim-ledger", "--trigger-cap-year2=-5"]);
        let err = settings.engine_config().unwrap_err();
        assert!(matches!(err, ClaimsError::Config(_)));
    }

    #[test]
    fn test_load_with_last_used_merges_persisted_values() {
        let tmp = TempDir::new().expect("tempdir");
        let config_path = tmp_config_path(&tmp);
        LastUsedParams {
            covid_cap: Some(dec!(3000)),
            grouping: Some(GroupingPolicy::SequentialTriplet),
            ..Default::default()
        }
        .save_to(&config_path)
        .expect("save");

        let settings = Settings::load_with_last_used_impl(args(&["claim-ledger"]), &config_path);
        assert_eq!(settings.covid_cap, dec!(3000));
        assert_eq!(settings.grouping, GroupingPolicy::SequentialTriplet);
        assert_eq!(settings.total_cap_year1, dec!(20000));
    }

    #[test]
    fn test_load_with_last_used_cli_overrides_persisted() {
        let tmp = TempDir::new().expect("tempdir");
        let config_path = tmp_config_path(&tmp);
        LastUsedParams {
            covid_cap: Some(dec!(3000)),
            ..Default::default()
        }
        .save_to(&config_path)
        .expect("save");

        let settings = Settings::load_with_last_used_impl(
            args(&["claim-ledger", "--covid-cap", "1000"]),
            &config_path,
        );
        assert_eq!(settings.covid_cap, dec!(1000));
    }

    #[test]
    fn test_load_with_last_used_clear_removes_file() {
        let tmp = TempDir::new().expect("tempdir");
        let config_path = tmp_config_path(&tmp);
        LastUsedParams {
            covid_cap: Some(dec!(3000)),
            ..Default::default()
        }
        .save_to(&config_path)
        .expect("save");

        let settings =
            Settings::load_with_last_used_impl(args(&["claim-ledger", "--clear"]), &config_path);

        assert!(!config_path.exists(), "file must be gone after --clear");
        assert_eq!(settings.covid_cap, dec!(2000));
    }

    #[test]
    fn test_load_with_last_used_debug_overrides_log_level() {
        let tmp = TempDir::new().expect("tempdir");
        let settings = Settings::load_with_last_used_impl(
            args(&["claim-ledger", "--debug"]),
            &tmp_config_path(&tmp),
        );
        assert_eq!(settings.log_level, "DEBUG");
    }

    #[test]
    fn test_load_with_last_used_persists_after_run() {
        let tmp = TempDir::new().expect("tempdir");
        let config_path = tmp_config_path(&tmp);

        Settings::load_with_last_used_impl(
            args(&["claim-ledger", "--total-cap-year1", "25000"]),
            &config_path,
        );

        assert!(config_path.exists(), "config file must be persisted after run");
        let loaded = LastUsedParams::load_from(&config_path);
        assert_eq!(loaded.total_cap_year1, Some(dec!(25000)));
        assert_eq!(loaded.grouping, Some(GroupingPolicy::FilenameQuarter));
    }

    #[test]
    fn test_load_with_last_used_does_not_persist_invalid_config() {
        let tmp = TempDir::new().expect("tempdir");
        let config_path = tmp_config_path(&tmp);

        Settings::load_with_last_used_impl(
            args(&["claim-ledger", "--year2-start", "2024-01-01"]),
            &config_path,
        );
        assert!(!config_path.exists());
    }
}
