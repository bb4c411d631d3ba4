//! One full refresh pass: load, aggregate, forecast and evaluate alerts.
//!
//! The pass is synchronous; the runtime crate decides when to call it.

use std::path::PathBuf;
use std::time::Instant;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use pharmacy_core::alerts::Alert;
use pharmacy_core::error::LoadError;
use pharmacy_core::forecast::{ForecastMethod, RevenueForecast, RevenueForecaster};
use pharmacy_core::models::{ConsultationRecord, InventoryRecord, Severity};
use pharmacy_core::time_utils::{local_date, DateRange, Granularity};
use serde::Serialize;
use tracing::{debug, warn};

use crate::aggregator::{
    MetricsAggregator, MetricsSummary, DEFAULT_CONSULTATION_FEE, DEFAULT_RESPONSE_TARGET_MINUTES,
};
use crate::inventory::{InventoryAnalytics, InventoryFilter, InventorySummary, StockFilter};
use crate::reader::{load_consultations, load_inventory, LoadOptions, RowIssue};

/// Default urgent response threshold in minutes.
pub const DEFAULT_URGENT_THRESHOLD_MINUTES: f64 = 10.0;

// ── Public types ──────────────────────────────────────────────────────────────

/// Everything one refresh pass needs to know.
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub consultations: PathBuf,
    /// No inventory section is produced when `None`.
    pub inventory: Option<PathBuf>,
    pub timezone: Tz,
    pub date_range: DateRange,
    pub granularity: Granularity,
    pub forecast_method: ForecastMethod,
    pub response_target_minutes: f64,
    pub consultation_fee: f64,
    pub urgent_threshold_minutes: f64,
    pub search: Option<String>,
    pub stock_filter: StockFilter,
}

impl AnalysisRequest {
    /// Request with default thresholds for the given consultation source.
    pub fn new(consultations: impl Into<PathBuf>) -> Self {
        Self {
            consultations: consultations.into(),
            inventory: None,
            timezone: Tz::UTC,
            date_range: DateRange::default(),
            granularity: Granularity::Day,
            forecast_method: ForecastMethod::LinearTrend,
            response_target_minutes: DEFAULT_RESPONSE_TARGET_MINUTES,
            consultation_fee: DEFAULT_CONSULTATION_FEE,
            urgent_threshold_minutes: DEFAULT_URGENT_THRESHOLD_MINUTES,
            search: None,
            stock_filter: StockFilter::All,
        }
    }
}

/// Accounting for one pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SnapshotMetadata {
    pub generated_at: DateTime<Utc>,
    pub consultation_files_read: usize,
    pub inventory_files_read: usize,
    pub records_loaded: usize,
    pub skipped_rows: usize,
    pub duplicates_dropped: usize,
    pub filtered_out: usize,
    /// Wall-clock seconds spent reading the sources.
    pub load_time_seconds: f64,
    /// Wall-clock seconds spent aggregating and forecasting.
    pub aggregate_time_seconds: f64,
}

/// The complete output of [`analyze`], ready for rendering.
#[derive(Debug, Clone, Serialize)]
pub struct DashboardSnapshot {
    pub metrics: MetricsSummary,
    pub forecast: RevenueForecast,
    pub inventory: Option<InventorySummary>,
    /// Conditions currently true, before any cooldown is applied.
    pub alerts: Vec<Alert>,
    pub issues: Vec<RowIssue>,
    pub metadata: SnapshotMetadata,
}

// ── Public functions ──────────────────────────────────────────────────────────

/// Run one load → aggregate → estimate pass.
///
/// Any [`LoadError`] aborts the pass; invalid rows only show up in
/// `issues` and `metadata.skipped_rows`.
pub fn analyze(request: &AnalysisRequest) -> Result<DashboardSnapshot, LoadError> {
    let options = LoadOptions {
        timezone: request.timezone,
        date_range: request.date_range,
    };

    // ── Step 1: Load ──────────────────────────────────────────────────────────
    let load_start = Instant::now();
    let consultations = load_consultations(&request.consultations, &options)?;
    let inventory = match &request.inventory {
        Some(path) => Some(load_inventory(path, &options)?),
        None => None,
    };
    let load_time = load_start.elapsed().as_secs_f64();

    // ── Step 2: Aggregate and forecast ────────────────────────────────────────
    let aggregate_start = Instant::now();
    let now = Utc::now();
    let aggregator = MetricsAggregator::new(
        request.granularity,
        request.timezone,
        request.response_target_minutes,
    )
    .with_consultation_fee(request.consultation_fee)
    .with_today(local_date(now, request.timezone));
    let metrics = aggregator.summarize(&consultations.records);
    let forecast = RevenueForecaster::forecast(
        &metrics.periods,
        request.granularity,
        request.forecast_method,
    );

    let inventory_records: &[InventoryRecord] = inventory
        .as_ref()
        .map(|r| r.records.as_slice())
        .unwrap_or(&[]);
    let inventory_summary = inventory.as_ref().map(|report| {
        let filter = build_filter(request);
        InventoryAnalytics::summarize(&report.records, &filter, now)
    });
    let alerts = evaluate_alerts(
        &consultations.records,
        inventory_records,
        request.urgent_threshold_minutes,
    );
    let aggregate_time = aggregate_start.elapsed().as_secs_f64();

    // ── Step 3: Build result ──────────────────────────────────────────────────
    let mut issues = consultations.issues;
    let mut skipped_rows = consultations.skipped;
    let mut inventory_files_read = 0;
    if let Some(report) = inventory {
        skipped_rows += report.skipped;
        inventory_files_read = report.files_read;
        issues.extend(report.issues);
    }

    let metadata = SnapshotMetadata {
        generated_at: now,
        consultation_files_read: consultations.files_read,
        inventory_files_read,
        records_loaded: consultations.records.len(),
        skipped_rows,
        duplicates_dropped: consultations.duplicates,
        filtered_out: consultations.filtered,
        load_time_seconds: load_time,
        aggregate_time_seconds: aggregate_time,
    };

    debug!(
        records = metadata.records_loaded,
        skipped = metadata.skipped_rows,
        load_s = load_time,
        aggregate_s = aggregate_time,
        "analysis pass complete"
    );

    Ok(DashboardSnapshot {
        metrics,
        forecast,
        inventory: inventory_summary,
        alerts,
        issues,
        metadata,
    })
}

/// Alerts for every low-stock item and, when any urgent consultation took
/// longer than `urgent_threshold_minutes`, one slow-response alert.
pub fn evaluate_alerts(
    consultations: &[ConsultationRecord],
    inventory: &[InventoryRecord],
    urgent_threshold_minutes: f64,
) -> Vec<Alert> {
    let mut alerts: Vec<Alert> = InventoryAnalytics::low_stock(inventory)
        .into_iter()
        .map(|r| {
            Alert::low_stock(
                &r.item_id,
                r.display_name(),
                r.stock_level,
                r.reorder_threshold,
            )
        })
        .collect();

    let slow_urgent = consultations
        .iter()
        .filter(|c| {
            c.severity == Severity::VeryStrong && c.response_time_minutes > urgent_threshold_minutes
        })
        .count() as u64;
    if slow_urgent > 0 {
        alerts.push(Alert::slow_urgent_response(
            slow_urgent,
            urgent_threshold_minutes,
        ));
    }
    alerts
}

// ── Private helpers ───────────────────────────────────────────────────────────

fn build_filter(request: &AnalysisRequest) -> InventoryFilter {
    InventoryFilter::new(request.search.as_deref(), request.stock_filter).unwrap_or_else(|e| {
        warn!(error = %e, "invalid inventory search; showing all items");
        InventoryFilter::new(None, request.stock_filter).unwrap_or_default()
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use pharmacy_core::alerts::AlertKind;
    use std::path::Path;
    use tempfile::TempDir;

    fn write(dir: &Path, name: &str, lines: &[String]) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, lines.join("\n")).unwrap();
        path
    }

    fn consultation(day: u32, severity: &str, response: f64, revenue: f64) -> String {
        serde_json::json!({
            "timestamp": format!("2024-01-{:02}T10:00:00Z", day),
            "severity": severity,
            "response_time": response,
            "pharmacist_id": "ph-1",
            "revenue_captured": revenue,
        })
        .to_string()
    }

    fn setup() -> (TempDir, AnalysisRequest) {
        let dir = TempDir::new().unwrap();
        let consultations = write(
            dir.path(),
            "consultations.jsonl",
            &[
                consultation(1, "Mild", 5.0, 1_000.0),
                consultation(2, "Very Strong", 15.0, 2_000.0),
                consultation(3, "Strong", 8.0, 3_000.0),
                r#"{"timestamp": "2024-01-03T11:00:00Z"}"#.to_string(),
            ],
        );
        let inventory = write(
            dir.path(),
            "inventory.jsonl",
            &[
                r#"{"item_id": "ors", "stock_level": 3, "reorder_threshold": 10, "last_restock": "2024-01-01"}"#.to_string(),
                r#"{"item_id": "amox", "stock_level": 30, "reorder_threshold": 10, "last_restock": "2024-01-01"}"#.to_string(),
            ],
        );
        let mut request = AnalysisRequest::new(consultations);
        request.inventory = Some(inventory);
        (dir, request)
    }

    #[test]
    fn test_analyze_full_pass() {
        let (_dir, request) = setup();
        let snapshot = analyze(&request).unwrap();

        assert_eq!(snapshot.metrics.total_consultations, 3);
        assert_eq!(snapshot.metrics.periods.len(), 3);
        assert_eq!(snapshot.forecast.history_len, 3);
        assert_eq!(snapshot.forecast.next_period_key.as_deref(), Some("2024-01-04"));
        assert!((snapshot.forecast.projected_revenue - 4_000.0).abs() < 1e-6);

        let inventory = snapshot.inventory.as_ref().unwrap();
        assert_eq!(inventory.item_count, 2);
        assert_eq!(inventory.low_stock_count, 1);

        assert_eq!(snapshot.metadata.consultation_files_read, 1);
        assert_eq!(snapshot.metadata.inventory_files_read, 1);
        assert_eq!(snapshot.metadata.records_loaded, 3);
        assert_eq!(snapshot.metadata.skipped_rows, 1);
        assert_eq!(snapshot.issues.len(), 1);
        assert_eq!(snapshot.issues[0].line, 4);
        // History predates the clock, so nothing falls on today.
        assert_eq!(snapshot.metrics.kpis.today_consultations, 0);
        assert_eq!(snapshot.metrics.kpis.urgent_consultations, 1);
    }

    #[test]
    fn test_analyze_alerts() {
        let (_dir, request) = setup();
        let snapshot = analyze(&request).unwrap();
        let kinds: Vec<AlertKind> = snapshot.alerts.iter().map(|a| a.kind).collect();
        assert_eq!(kinds, vec![AlertKind::LowStock, AlertKind::SlowUrgentResponse]);
        assert_eq!(snapshot.alerts[0].key, "low_stock:ors");
    }

    #[test]
    fn test_analyze_without_inventory() {
        let (_dir, mut request) = setup();
        request.inventory = None;
        let snapshot = analyze(&request).unwrap();
        assert!(snapshot.inventory.is_none());
        assert_eq!(snapshot.metadata.inventory_files_read, 0);
        assert_eq!(snapshot.alerts.len(), 1);
    }

    #[test]
    fn test_analyze_missing_source_halts() {
        let (dir, mut request) = setup();
        request.inventory = Some(dir.path().join("missing.jsonl"));
        assert!(matches!(
            analyze(&request),
            Err(LoadError::SourceNotFound(_))
        ));
    }

    #[test]
    fn test_analyze_snapshot_serialises() {
        let (_dir, request) = setup();
        let snapshot = analyze(&request).unwrap();
        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["metrics"]["severity"]["Very Strong"], 1);
        assert_eq!(json["forecast"]["method"]["kind"], "linear_trend");
        assert!(json["issues"][0]["reason"].is_string());
        assert_eq!(json["metrics"]["response_by_severity"][2]["priority"], "URGENT");
        assert_eq!(json["metrics"]["kpis"]["avg_urgent_response_minutes"], 15.0);
    }

    #[test]
    fn test_evaluate_alerts_threshold_is_strict() {
        let (_dir, request) = setup();
        let report = load_consultations(&request.consultations, &LoadOptions::default()).unwrap();
        // The only urgent consultation took exactly 15 minutes.
        assert!(evaluate_alerts(&report.records, &[], 15.0).is_empty());
        assert_eq!(evaluate_alerts(&report.records, &[], 14.9).len(), 1);
    }
}
