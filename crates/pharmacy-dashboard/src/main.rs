mod bootstrap;
mod report;

use std::path::Path;

use anyhow::{Context, Result};
use pharmacy_core::alerts::{Alert, AlertManager};
use pharmacy_core::settings::Settings;
use pharmacy_core::time_utils::{local_date, parse_timezone};
use pharmacy_data::analysis::{analyze, AnalysisRequest, DashboardSnapshot};
use pharmacy_data::inventory::StockFilter;
use pharmacy_runtime::orchestrator::{RefreshOrchestrator, RefreshUpdate};
use report::View;

#[tokio::main]
async fn main() -> Result<()> {
    let mut settings = Settings::load_with_last_used();

    let app_dir = bootstrap::ensure_directories()?;
    bootstrap::setup_logging(&settings.log_level, settings.log_file.as_ref())?;
    settings.validate()?;

    tracing::info!("Pharmacy dashboard v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        "View: {}, Timezone: {}, Period: {}",
        settings.view,
        settings.timezone,
        settings.granularity()
    );

    if settings.data_dir.is_none() && settings.consultations.is_none() {
        settings.data_dir = bootstrap::discover_data_dir();
    }
    let request = build_request(&settings)?;

    match settings.view.as_str() {
        "watch" => {
            tracing::info!("Starting watch mode every {}s", settings.refresh_rate);

            let mut orchestrator =
                RefreshOrchestrator::new(u64::from(settings.refresh_rate), request);
            if !settings.no_alerts {
                orchestrator = orchestrator.with_alerts(
                    AlertManager::new(&app_dir),
                    f64::from(settings.alert_cooldown_hours),
                );
            }
            let (mut rx, handle) = orchestrator.start();

            loop {
                tokio::select! {
                    update = rx.recv() => match update {
                        Some(update) => print_update(&settings, &update)?,
                        None => break,
                    },
                    _ = tokio::signal::ctrl_c() => {
                        tracing::info!("Ctrl+C received; stopping refresh task");
                        break;
                    }
                }
            }
            handle.abort();
        }

        name => {
            let view = View::from_name(name);
            let snapshot = analyze(&request)?;
            let due = due_alerts(&settings, &app_dir, snapshot.alerts.clone());
            print_snapshot(&settings, view, &snapshot)?;
            if !due.is_empty() && !settings.json_output() {
                println!();
                println!("{}", report::render_alerts(&due));
            }
        }
    }

    Ok(())
}

/// Translate CLI settings into one analysis request.
fn build_request(settings: &Settings) -> Result<AnalysisRequest> {
    let consultations = settings.consultations_path().context(
        "no consultation data found; pass --consultations, --data-dir, \
         or place files under ./data/consultations",
    )?;

    let tz = parse_timezone(&settings.timezone);
    let today = local_date(chrono::Utc::now(), tz);

    let mut request = AnalysisRequest::new(consultations);
    request.inventory = settings.inventory_path();
    request.timezone = tz;
    request.date_range = settings.date_range(today);
    request.granularity = settings.granularity();
    request.forecast_method = settings.forecast()?;
    request.response_target_minutes = f64::from(settings.response_target_mins);
    request.consultation_fee = settings.consultation_fee;
    request.urgent_threshold_minutes = f64::from(settings.urgent_threshold_mins);
    request.search = settings.search.clone();
    request.stock_filter = settings.stock_filter.parse::<StockFilter>()?;
    Ok(request)
}

/// Alerts past their cooldown; nothing when alerts are disabled.
fn due_alerts(settings: &Settings, app_dir: &Path, alerts: Vec<Alert>) -> Vec<Alert> {
    if settings.no_alerts {
        return Vec::new();
    }
    AlertManager::new(app_dir).take_due(alerts, f64::from(settings.alert_cooldown_hours))
}

fn print_snapshot(settings: &Settings, view: View, snapshot: &DashboardSnapshot) -> Result<()> {
    if settings.json_output() {
        let value = report::to_json(view, snapshot)?;
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        println!(
            "{}",
            report::render(view, snapshot, &settings.currency_symbol)
        );
    }
    Ok(())
}

fn print_update(settings: &Settings, update: &RefreshUpdate) -> Result<()> {
    if update.is_stale() {
        tracing::warn!(
            error = update.last_error.as_deref().unwrap_or("unknown"),
            "refresh failed; showing previous snapshot"
        );
    }

    if settings.json_output() {
        // One compact document per refresh.
        let value = serde_json::json!({
            "refresh": update.refresh_count,
            "stale": update.is_stale(),
            "alerts_due": update.alerts_due,
            "snapshot": update.snapshot,
        });
        println!("{}", serde_json::to_string(&value)?);
    } else {
        println!(
            "\n[refresh #{}{}]",
            update.refresh_count,
            if update.is_stale() { ", stale" } else { "" }
        );
        println!(
            "{}",
            report::render(View::Summary, &update.snapshot, &settings.currency_symbol)
        );
        if !update.alerts_due.is_empty() {
            println!("{}", report::render_alerts(&update.alerts_due));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use clap::Parser;
    use pharmacy_core::alerts::AlertKind;
    use pharmacy_core::forecast::ForecastMethod;
    use pharmacy_core::time_utils::Granularity;
    use tempfile::TempDir;

    fn settings(list: &[&str]) -> Settings {
        let args = std::iter::once("pharmacy-dashboard").chain(list.iter().copied());
        Settings::try_parse_from(args).expect("valid arguments")
    }

    fn write_data(dir: &Path) {
        std::fs::write(
            dir.join("consultations.jsonl"),
            r#"{"timestamp": "2024-01-15T10:00:00Z", "severity": "Very Strong", "response_time": 25, "pharmacist_id": "ph-1", "revenue_captured": 1500}"#,
        )
        .unwrap();
        std::fs::write(
            dir.join("inventory.jsonl"),
            r#"{"item_id": "ors", "stock_level": 2, "reorder_threshold": 10, "last_restock": "2024-01-01"}"#,
        )
        .unwrap();
    }

    #[test]
    fn test_build_request_from_data_dir() {
        let tmp = TempDir::new().unwrap();
        write_data(tmp.path());
        let dir = tmp.path().to_str().unwrap();
        let s = settings(&[
            "--data-dir", dir,
            "--timezone", "Africa/Lagos",
            "--view", "weekly",
            "--since", "2024-01-01",
            "--until", "2024-01-31",
            "--forecast-method", "moving-average",
            "--forecast-window", "4",
            "--stock-filter", "low",
            "--search", "ors",
        ]);

        let request = build_request(&s).unwrap();
        assert_eq!(request.consultations, tmp.path().join("consultations.jsonl"));
        assert_eq!(request.inventory, Some(tmp.path().join("inventory.jsonl")));
        assert_eq!(request.timezone, parse_timezone("Africa/Lagos"));
        assert_eq!(request.granularity, Granularity::Week);
        assert_eq!(request.forecast_method, ForecastMethod::MovingAverage { window: 4 });
        assert_eq!(request.date_range.since, NaiveDate::from_ymd_opt(2024, 1, 1));
        assert_eq!(request.stock_filter, StockFilter::Low);
        assert_eq!(request.search.as_deref(), Some("ors"));

        let snapshot = analyze(&request).unwrap();
        assert_eq!(snapshot.metrics.total_consultations, 1);
    }

    #[test]
    fn test_build_request_without_consultations_fails() {
        let s = settings(&["--timezone", "UTC"]);
        let err = build_request(&s).unwrap_err();
        assert!(err.to_string().contains("no consultation data found"));
    }

    #[test]
    fn test_due_alerts_respect_cooldown_and_opt_out() {
        let tmp = TempDir::new().unwrap();
        write_data(tmp.path());
        let app_dir = tmp.path().join("state");
        let s = settings(&["--data-dir", tmp.path().to_str().unwrap(), "--timezone", "UTC"]);
        let snapshot = analyze(&build_request(&s).unwrap()).unwrap();

        let first = due_alerts(&s, &app_dir, snapshot.alerts.clone());
        let kinds: Vec<AlertKind> = first.iter().map(|a| a.kind).collect();
        assert_eq!(kinds, vec![AlertKind::LowStock, AlertKind::SlowUrgentResponse]);
        assert!(app_dir.join("alert_states.json").exists());

        // Still inside the cooldown window.
        assert!(due_alerts(&s, &app_dir, snapshot.alerts.clone()).is_empty());

        let quiet = settings(&["--timezone", "UTC", "--no-alerts"]);
        let fresh_dir = tmp.path().join("other");
        assert!(due_alerts(&quiet, &fresh_dir, snapshot.alerts).is_empty());
        assert!(!fresh_dir.join("alert_states.json").exists());
    }
}
