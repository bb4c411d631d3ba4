use chrono::NaiveDate;
use clap::{CommandFactory, Parser};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::DashboardError;
use crate::forecast::ForecastMethod;
use crate::time_utils::{DateRange, Granularity};

// ── Settings (CLI) ─────────────────────────────────────────────────────────────

/// Consultation, revenue and inventory analytics for a community pharmacy
#[derive(Parser, Debug, Clone)]
#[command(
    name = "pharmacy-dashboard",
    about = "Consultation, revenue and inventory analytics for a community pharmacy",
    version
)]
pub struct Settings {
    /// View mode
    #[arg(
        long,
        default_value = "summary",
        value_parser = ["summary", "daily", "weekly", "monthly", "inventory", "forecast", "watch"]
    )]
    pub view: String,

    /// Directory holding `consultations/` and `inventory/` sub-directories
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Consultation JSONL file or directory (overrides --data-dir)
    #[arg(long)]
    pub consultations: Option<PathBuf>,

    /// Inventory JSONL file or directory (overrides --data-dir)
    #[arg(long)]
    pub inventory: Option<PathBuf>,

    /// Timezone used for calendar periods (auto-detected if not specified)
    #[arg(long, default_value = "auto")]
    pub timezone: String,

    /// First local date to include (YYYY-MM-DD)
    #[arg(long)]
    pub since: Option<NaiveDate>,

    /// Last local date to include (YYYY-MM-DD)
    #[arg(long)]
    pub until: Option<NaiveDate>,

    /// Only include the last N days (ignored when --since or --until is set)
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..=3650))]
    pub days_back: Option<u32>,

    /// Period granularity for trend and forecast views
    #[arg(long, default_value = "day", value_parser = ["day", "week", "month"])]
    pub period: String,

    /// Forecast method
    #[arg(long, default_value = "linear", value_parser = ["linear", "moving-average"])]
    pub forecast_method: String,

    /// Window for the moving-average forecast, in periods
    #[arg(long, default_value = "3", value_parser = clap::value_parser!(u32).range(1..=365))]
    pub forecast_window: u32,

    /// Response-time target in minutes (1-240)
    #[arg(long, default_value = "10", value_parser = clap::value_parser!(u32).range(1..=240))]
    pub response_target_mins: u32,

    /// Urgent consultations slower than this raise an alert (1-240)
    #[arg(long, default_value = "10", value_parser = clap::value_parser!(u32).range(1..=240))]
    pub urgent_threshold_mins: u32,

    /// Hours before the same alert is repeated
    #[arg(long, default_value = "24", value_parser = clap::value_parser!(u32).range(1..=720))]
    pub alert_cooldown_hours: u32,

    /// Disable alert evaluation
    #[arg(long)]
    pub no_alerts: bool,

    /// Flat fee charged per consultation, used for the fee-revenue estimate
    #[arg(long, default_value = "1500")]
    pub consultation_fee: f64,

    /// Currency symbol used in text output
    #[arg(long, default_value = "₦")]
    pub currency_symbol: String,

    /// Case-insensitive inventory search on item id or name
    #[arg(long)]
    pub search: Option<String>,

    /// Inventory status filter
    #[arg(long, default_value = "all", value_parser = ["all", "low", "ok"])]
    pub stock_filter: String,

    /// Refresh interval in seconds for the watch view (1-3600)
    #[arg(long, default_value = "60", value_parser = clap::value_parser!(u32).range(1..=3600))]
    pub refresh_rate: u32,

    /// Output format
    #[arg(long, default_value = "text", value_parser = ["text", "json"])]
    pub format: String,

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

/// Persisted last-used parameters saved to `~/.pharmacy-dashboard/last_used.json`.
#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq)]
pub struct LastUsedParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub view: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub period: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub forecast_method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub forecast_window: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_target_mins: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consultation_fee: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency_symbol: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_rate: Option<u32>,
}

impl LastUsedParams {
    /// Default path: `~/.pharmacy-dashboard/last_used.json`.
    pub fn config_path() -> PathBuf {
        Self::config_path_in(&dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")))
    }

    pub fn config_path_in(base_dir: &std::path::Path) -> PathBuf {
        base_dir.join(".pharmacy-dashboard").join("last_used.json")
    }

    /// Returns `Default` when the file is absent or cannot be parsed.
    pub fn load_from(path: &std::path::Path) -> Self {
        let Ok(content) = std::fs::read_to_string(path) else {
            return Self::default();
        };
        serde_json::from_str(&content).unwrap_or_default()
    }

    /// Atomically write params to `path`, creating parent directories.
    pub fn save_to(&self, path: &std::path::Path) -> Result<(), std::io::Error> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;

        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, &json)?;
        std::fs::rename(&tmp, path)?;

        Ok(())
    }

    pub fn clear_at(path: &std::path::Path) -> Result<(), std::io::Error> {
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }
}

// ── Settings impl ──────────────────────────────────────────────────────────────

impl Settings {
    /// Parse process arguments, merge with last-used params, resolve `"auto"`
    /// values and persist the result.
    pub fn load_with_last_used() -> Self {
        Self::load_with_last_used_impl(
            std::env::args_os().collect(),
            &LastUsedParams::config_path(),
        )
    }

    /// Same as [`Settings::load_with_last_used`] with explicit arguments and
    /// config path.
    pub fn load_with_last_used_impl(
        args: Vec<std::ffi::OsString>,
        config_path: &std::path::Path,
    ) -> Self {
        let matches = Settings::command().get_matches_from(args.clone());
        let mut settings = Settings::parse_from(args);

        if settings.clear {
            if let Err(e) = LastUsedParams::clear_at(config_path) {
                tracing::warn!(error = %e, "failed to clear saved configuration");
            }
            return Self::resolve_auto_values(settings);
        }

        let last = LastUsedParams::load_from(config_path);

        // CLI always wins; clap keys args by field name.
        if !is_arg_explicitly_set(&matches, "view") {
            if let Some(v) = last.view {
                settings.view = v;
            }
        }
        if !is_arg_explicitly_set(&matches, "data_dir") && settings.data_dir.is_none() {
            settings.data_dir = last.data_dir;
        }
        if !is_arg_explicitly_set(&matches, "timezone") {
            if let Some(v) = last.timezone {
                settings.timezone = v;
            }
        }
        if !is_arg_explicitly_set(&matches, "period") {
            if let Some(v) = last.period {
                settings.period = v;
            }
        }
        if !is_arg_explicitly_set(&matches, "forecast_method") {
            if let Some(v) = last.forecast_method {
                settings.forecast_method = v;
            }
        }
        if !is_arg_explicitly_set(&matches, "forecast_window") {
            if let Some(v) = last.forecast_window {
                settings.forecast_window = v;
            }
        }
        if !is_arg_explicitly_set(&matches, "response_target_mins") {
            if let Some(v) = last.response_target_mins {
                settings.response_target_mins = v;
            }
        }
        if !is_arg_explicitly_set(&matches, "consultation_fee") {
            if let Some(v) = last.consultation_fee {
                settings.consultation_fee = v;
            }
        }
        if !is_arg_explicitly_set(&matches, "currency_symbol") {
            if let Some(v) = last.currency_symbol {
                settings.currency_symbol = v;
            }
        }
        if !is_arg_explicitly_set(&matches, "refresh_rate") {
            if let Some(v) = last.refresh_rate {
                settings.refresh_rate = v;
            }
        }

        settings = Self::resolve_auto_values(settings);

        let params = LastUsedParams::from(&settings);
        if let Err(e) = params.save_to(config_path) {
            tracing::warn!(error = %e, "failed to persist last-used parameters");
        }

        settings
    }

    /// Resolve the `"auto"` timezone and apply `--debug`.
    fn resolve_auto_values(mut settings: Settings) -> Settings {
        if settings.timezone == "auto" {
            settings.timezone = crate::time_utils::get_system_timezone();
        }
        if settings.debug {
            settings.log_level = "DEBUG".to_string();
        }
        settings
    }

    /// Reject combinations clap cannot check on its own.
    pub fn validate(&self) -> Result<(), DashboardError> {
        if !crate::time_utils::validate_timezone(&self.timezone) {
            return Err(DashboardError::Config(format!(
                "unknown timezone: {}",
                self.timezone
            )));
        }
        if let (Some(since), Some(until)) = (self.since, self.until) {
            if since > until {
                return Err(DashboardError::Config(format!(
                    "--since {} is after --until {}",
                    since, until
                )));
            }
        }
        if !self.consultation_fee.is_finite() || self.consultation_fee < 0.0 {
            return Err(DashboardError::Config(format!(
                "consultation fee must be a non-negative number, got {}",
                self.consultation_fee
            )));
        }
        Ok(())
    }

    /// Period granularity; the daily/weekly/monthly views imply their own.
    pub fn granularity(&self) -> Granularity {
        match self.view.as_str() {
            "daily" => Granularity::Day,
            "weekly" => Granularity::Week,
            "monthly" => Granularity::Month,
            _ => self.period.parse().unwrap_or(Granularity::Day),
        }
    }

    pub fn forecast(&self) -> Result<ForecastMethod, DashboardError> {
        ForecastMethod::from_name(&self.forecast_method, self.forecast_window as usize)
    }

    /// Date filter from `--since`/`--until`, else `--days-back`, else unbounded.
    pub fn date_range(&self, today: NaiveDate) -> DateRange {
        if self.since.is_some() || self.until.is_some() {
            return DateRange::new(self.since, self.until);
        }
        match self.days_back {
            Some(days) => DateRange::last_days(days, today),
            None => DateRange::default(),
        }
    }

    /// Consultation source: explicit flag, else `<data_dir>/consultations`
    /// (or `consultations.jsonl` when only the file exists).
    pub fn consultations_path(&self) -> Option<PathBuf> {
        self.consultations.clone().or_else(|| {
            self.data_dir
                .as_ref()
                .map(|d| source_in(d, "consultations").unwrap_or_else(|| d.join("consultations")))
        })
    }

    /// Inventory source: explicit flag, else `<data_dir>/inventory` or
    /// `inventory.jsonl` when present.
    pub fn inventory_path(&self) -> Option<PathBuf> {
        if self.inventory.is_some() {
            return self.inventory.clone();
        }
        self.data_dir.as_ref().and_then(|d| source_in(d, "inventory"))
    }

    pub fn json_output(&self) -> bool {
        self.format == "json"
    }
}

// ── Conversion ─────────────────────────────────────────────────────────────────

impl From<&Settings> for LastUsedParams {
    fn from(s: &Settings) -> Self {
        LastUsedParams {
            view: Some(s.view.clone()),
            data_dir: s.data_dir.clone(),
            timezone: Some(s.timezone.clone()),
            period: Some(s.period.clone()),
            forecast_method: Some(s.forecast_method.clone()),
            forecast_window: Some(s.forecast_window),
            response_target_mins: Some(s.response_target_mins),
            consultation_fee: Some(s.consultation_fee),
            currency_symbol: Some(s.currency_symbol.clone()),
            refresh_rate: Some(s.refresh_rate),
        }
    }
}

/// `<dir>/<name>` or `<dir>/<name>.jsonl`, whichever exists first.
fn source_in(dir: &std::path::Path, name: &str) -> Option<PathBuf> {
    [dir.join(name), dir.join(format!("{}.jsonl", name))]
        .into_iter()
        .find(|p| p.exists())
}

/// `true` when `name` was supplied on the command line rather than defaulted.
fn is_arg_explicitly_set(matches: &clap::ArgMatches, name: &str) -> bool {
    matches.value_source(name) == Some(clap::parser::ValueSource::CommandLine)
}

// ── Tests ──────────────────────────────────────────────────────────────────────
