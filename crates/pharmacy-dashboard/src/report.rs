//! Plain-text and JSON rendering of dashboard snapshots.

use pharmacy_core::alerts::Alert;
use pharmacy_core::forecast::RevenueForecast;
use pharmacy_core::formatting::{
    fit_width, format_count, format_currency, format_minutes, format_number, percentage,
};
use pharmacy_core::time_utils::hour_label;
use pharmacy_data::aggregator::{MetricsSummary, PeriodSummary};
use pharmacy_data::analysis::DashboardSnapshot;
use pharmacy_data::inventory::InventorySummary;
use serde_json::Value;

const RULE_WIDTH: usize = 78;

/// Which part of the snapshot a view shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    Summary,
    Periods,
    Inventory,
    Forecast,
}

impl View {
    /// `daily`, `weekly` and `monthly` all render the period table.
    pub fn from_name(name: &str) -> Self {
        match name {
            "daily" | "weekly" | "monthly" => View::Periods,
            "inventory" => View::Inventory,
            "forecast" => View::Forecast,
            _ => View::Summary,
        }
    }
}

// ── JSON ──────────────────────────────────────────────────────────────────────

/// JSON document for `view`; the summary view emits the whole snapshot.
pub fn to_json(view: View, snapshot: &DashboardSnapshot) -> serde_json::Result<Value> {
    match view {
        View::Summary => serde_json::to_value(snapshot),
        View::Periods => serde_json::to_value(&snapshot.metrics.periods),
        View::Inventory => serde_json::to_value(&snapshot.inventory),
        View::Forecast => serde_json::to_value(&snapshot.forecast),
    }
}

// ── Text ──────────────────────────────────────────────────────────────────────

pub fn render(view: View, snapshot: &DashboardSnapshot, currency: &str) -> String {
    let mut lines = header(snapshot);
    match view {
        View::Summary => {
            lines.extend(summary_lines(&snapshot.metrics, currency));
            lines.push(String::new());
            lines.extend(forecast_lines(&snapshot.forecast, currency));
            if let Some(inventory) = &snapshot.inventory {
                lines.push(String::new());
                lines.extend(inventory_overview(inventory, currency));
            }
        }
        View::Periods => lines.extend(period_lines(&snapshot.metrics.periods, currency)),
        View::Inventory => match &snapshot.inventory {
            Some(inventory) => {
                lines.extend(inventory_overview(inventory, currency));
                lines.push(String::new());
                lines.extend(inventory_lines(inventory, currency));
            }
            None => lines.push("No inventory source configured.".to_string()),
        },
        View::Forecast => lines.extend(forecast_lines(&snapshot.forecast, currency)),
    }
    lines.join("\n")
}

pub fn render_alerts(alerts: &[Alert]) -> String {
    alerts
        .iter()
        .map(|a| format!("! {}", a.message))
        .collect::<Vec<_>>()
        .join("\n")
}

fn header(snapshot: &DashboardSnapshot) -> Vec<String> {
    let m = &snapshot.metrics;
    let range = match (m.first_consultation, m.last_consultation) {
        (Some(first), Some(last)) => format!(
            "{} to {}",
            first.format("%Y-%m-%d"),
            last.format("%Y-%m-%d")
        ),
        _ => "no consultations".to_string(),
    };
    let meta = &snapshot.metadata;
    let mut lines = vec![
        format!("Pharmacy dashboard ({}), {}", m.timezone, range),
        format!(
            "Generated {} from {} file(s); {} row(s) skipped, {} duplicate(s)",
            meta.generated_at.format("%Y-%m-%d %H:%M:%S UTC"),
            meta.consultation_files_read + meta.inventory_files_read,
            meta.skipped_rows,
            meta.duplicates_dropped,
        ),
        "─".repeat(RULE_WIDTH),
    ];
    if meta.skipped_rows > 0 {
        if let Some(issue) = snapshot.issues.first() {
            lines.insert(
                2,
                format!(
                    "First skipped row: {}:{}: {}",
                    issue.path.display(),
                    issue.line,
                    issue.error
                ),
            );
        }
    }
    lines
}

fn row(label: &str, value: String) -> String {
    format!("{} {}", fit_width(label, 28), value)
}

fn minutes(value: f64) -> String {
    format!("{} min", format_number(value, 1))
}

fn summary_lines(m: &MetricsSummary, currency: &str) -> Vec<String> {
    let k = &m.kpis;
    let total = m.total_consultations as f64;
    let share = |count: u64| format_number(percentage(count as f64, total, 1), 1);
    let wait = |value: Option<f64>| value.map(format_minutes).unwrap_or_else(|| "-".to_string());
    let mut lines = vec![
        row("Consultations", format_count(k.total_consultations)),
        row("Today", format_count(k.today_consultations)),
        row(
            "Avg per active day",
            format!(
                "{} over {} day(s)",
                format_number(k.avg_per_active_day, 1),
                k.active_days
            ),
        ),
        row(
            "Urgent cases",
            format!(
                "{} ({}%)",
                format_count(k.urgent_consultations),
                format_number(k.urgent_share_pct, 1)
            ),
        ),
        row("Avg wait (urgent)", wait(k.avg_urgent_response_minutes)),
        row("Fastest urgent response", wait(k.fastest_urgent_response_minutes)),
        row(
            "Most common severity",
            k.most_common_severity
                .map(|s| s.to_string())
                .unwrap_or_else(|| "-".to_string()),
        ),
        row(
            "Severity mix",
            format!(
                "Mild {} ({}%) / Strong {} ({}%) / Very Strong {} ({}%)",
                m.severity.mild,
                share(m.severity.mild),
                m.severity.strong,
                share(m.severity.strong),
                m.severity.very_strong,
                share(m.severity.very_strong)
            ),
        ),
        row("Avg response", minutes(k.avg_response_minutes)),
        row(
            "Median / p90 response",
            format!("{} / {}", minutes(m.response.median), minutes(m.response.p90)),
        ),
        row(
            &format!("Within {} min target", format_number(m.response_target_minutes, 0)),
            format!("{}%", format_number(k.within_target_pct, 1)),
        ),
        row(
            "Fastest response",
            k.fastest_response_minutes
                .map(minutes)
                .unwrap_or_else(|| "-".to_string()),
        ),
        row(
            "Peak hour",
            k.peak_hour.map(hour_label).unwrap_or_else(|| "-".to_string()),
        ),
        row("Revenue captured", format_currency(k.total_revenue, currency)),
        row(
            "Consultation fee revenue",
            format_currency(k.estimated_fee_revenue, currency),
        ),
        row(
            "Fulfilled / referred",
            format!("{} / {}", format_count(k.fulfilled), format_count(k.referred)),
        ),
    ];

    if m.total_consultations > 0 {
        lines.push(String::new());
        lines.push(format!(
            "{} {} {} {} {}",
            fit_width("Severity", 12),
            fit_width("Priority", 9),
            fit_width("Count", 8),
            fit_width("Mean", 10),
            "p90"
        ));
        for level in &m.response_by_severity {
            lines.push(format!(
                "{} {} {} {} {}",
                fit_width(level.severity.as_str(), 12),
                fit_width(level.priority.as_str(), 9),
                fit_width(&format_count(level.response.count), 8),
                fit_width(&minutes(level.response.mean), 10),
                minutes(level.response.p90)
            ));
        }
    }

    if !m.pharmacists.is_empty() {
        lines.push(String::new());
        lines.push(format!(
            "{} {} {} {} {}",
            fit_width("Pharmacist", 16),
            fit_width("Count", 8),
            fit_width("Mean", 10),
            fit_width("p90", 10),
            "Revenue"
        ));
        for p in &m.pharmacists {
            lines.push(format!(
                "{} {} {} {} {}",
                fit_width(&p.pharmacist_id, 16),
                fit_width(&format_count(p.consultations), 8),
                fit_width(&minutes(p.response.mean), 10),
                fit_width(&minutes(p.response.p90), 10),
                format_currency(p.revenue, currency)
            ));
        }
    }
    lines
}

fn period_lines(periods: &[PeriodSummary], currency: &str) -> Vec<String> {
    if periods.is_empty() {
        return vec!["No consultations in range.".to_string()];
    }
    let mut lines = vec![format!(
        "{} {} {} {} {} {} {}",
        fit_width("Period", 12),
        fit_width("Count", 7),
        fit_width("Mild", 6),
        fit_width("Strong", 7),
        fit_width("V.Strong", 9),
        fit_width("Avg resp", 11),
        "Revenue"
    )];
    for p in periods {
        lines.push(format!(
            "{} {} {} {} {} {} {}",
            fit_width(&p.key, 12),
            fit_width(&format_count(p.consultations), 7),
            fit_width(&p.severity.mild.to_string(), 6),
            fit_width(&p.severity.strong.to_string(), 7),
            fit_width(&p.severity.very_strong.to_string(), 9),
            fit_width(&minutes(p.response.mean), 11),
            format_currency(p.revenue, currency)
        ));
    }
    let total: u64 = periods.iter().map(|p| p.consultations).sum();
    let revenue: f64 = periods.iter().map(|p| p.revenue).sum();
    lines.push("─".repeat(RULE_WIDTH));
    lines.push(format!(
        "{} {} {}",
        fit_width("Total", 12),
        fit_width(&format_count(total), 45),
        format_currency(revenue, currency)
    ));
    lines
}

fn forecast_lines(f: &RevenueForecast, currency: &str) -> Vec<String> {
    let mut lines = vec![
        row(
            "Forecast period",
            f.next_period_key.clone().unwrap_or_else(|| "-".to_string()),
        ),
        row(
            "Projected revenue",
            format_currency(f.projected_revenue, currency),
        ),
        row(
            "Projected consultations",
            format_number(f.projected_consultations, 1),
        ),
        row(
            "Method",
            format!("{} over {} {}(s)", f.method, f.history_len, f.granularity),
        ),
    ];
    if let Some(fit) = f.revenue_fit {
        lines.push(row(
            "Trend per period",
            format_currency(fit.slope, currency),
        ));
    }
    lines.push(format!("Estimate: {}. Illustrative only.", f.method_description));
    lines
}

fn inventory_overview(inv: &InventorySummary, currency: &str) -> Vec<String> {
    vec![
        row("Inventory items", format_count(inv.item_count)),
        row("Low stock", format_count(inv.low_stock_count)),
        row("Inventory value", format_currency(inv.total_value, currency)),
        row(
            "Avg monthly demand",
            inv.avg_monthly_demand
                .map(|d| format!("{} units", format_number(d, 0)))
                .unwrap_or_else(|| "-".to_string()),
        ),
    ]
}

fn inventory_lines(inv: &InventorySummary, currency: &str) -> Vec<String> {
    if inv.items.is_empty() {
        return vec!["No items match the filter.".to_string()];
    }
    let mut lines = vec![format!(
        "{} {} {} {} {} {}",
        fit_width("Item", 24),
        fit_width("Stock", 7),
        fit_width("Reorder", 8),
        fit_width("Status", 10),
        fit_width("Order", 7),
        "Value"
    )];
    for item in &inv.items {
        lines.push(format!(
            "{} {} {} {} {} {}",
            fit_width(&item.name, 24),
            fit_width(&format_count(item.stock_level), 7),
            fit_width(&format_count(item.reorder_threshold), 8),
            fit_width(item.status.as_str(), 10),
            fit_width(
                &item
                    .reorder_quantity
                    .map(format_count)
                    .unwrap_or_else(|| "-".to_string()),
                7
            ),
            format_currency(item.stock_value, currency)
        ));
    }
    lines
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use pharmacy_data::analysis::{analyze, AnalysisRequest};
    use tempfile::TempDir;

    fn snapshot(with_inventory: bool) -> (TempDir, DashboardSnapshot) {
        let dir = TempDir::new().unwrap();
        let consultations = dir.path().join("consultations.jsonl");
        std::fs::write(
            &consultations,
            [
                r#"{"timestamp": "2024-01-15T14:10:00Z", "severity": "Mild", "response_time": 4, "pharmacist_id": "ph-1", "revenue_captured": 1500}"#,
                r#"{"timestamp": "2024-01-16T09:00:00Z", "severity": "Very Strong", "response_time": 12, "pharmacist_id": "ph-2", "revenue_captured": 2500}"#,
            ]
            .join("\n"),
        )
        .unwrap();
        let mut request = AnalysisRequest::new(consultations);
        if with_inventory {
            let inventory = dir.path().join("inventory.jsonl");
            std::fs::write(
                &inventory,
                r#"{"item_id": "para", "name": "Paracetamol 500mg", "stock_level": 12, "reorder_threshold": 15, "last_restock": "2024-01-01", "monthly_demand": 35, "unit_price": 300}"#,
            )
            .unwrap();
            request.inventory = Some(inventory);
        }
        let snapshot = analyze(&request).unwrap();
        (dir, snapshot)
    }

    #[test]
    fn test_view_from_name() {
        assert_eq!(View::from_name("weekly"), View::Periods);
        assert_eq!(View::from_name("inventory"), View::Inventory);
        assert_eq!(View::from_name("watch"), View::Summary);
    }

    #[test]
    fn test_render_summary() {
        let (_dir, snap) = snapshot(true);
        let text = render(View::Summary, &snap, "₦");
        assert!(text.contains("Consultations"));
        assert!(text.contains("₦4,000.00"));
        assert!(text.contains("₦3,000.00"), "fee revenue: {text}");
        assert!(text.contains("09:00-10:00"));
        assert!(text.contains("Low stock"));
        assert!(text.contains("Illustrative only"));
        assert!(text.contains("Mild 1 (50.0%)"), "severity mix: {text}");
        assert!(text.contains("URGENT"));
        assert!(text.contains("Avg wait (urgent)"));
        assert!(text.contains("12m"));
    }

    #[test]
    fn test_render_periods_has_total_row() {
        let (_dir, snap) = snapshot(false);
        let text = render(View::Periods, &snap, "$");
        assert!(text.contains("2024-01-15"));
        assert!(text.contains("2024-01-16"));
        assert!(text.contains("$4,000.00"));
    }

    #[test]
    fn test_render_inventory_without_source() {
        let (_dir, snap) = snapshot(false);
        let text = render(View::Inventory, &snap, "₦");
        assert!(text.contains("No inventory source configured."));

        let (_dir, snap) = snapshot(true);
        let text = render(View::Inventory, &snap, "₦");
        assert!(text.contains("Paracetamol 500mg"));
        assert!(text.contains("Low Stock"));
        assert!(text.contains("23"));
    }

    #[test]
    fn test_to_json_views() {
        let (_dir, snap) = snapshot(true);
        let periods = to_json(View::Periods, &snap).unwrap();
        assert_eq!(periods.as_array().unwrap().len(), 2);
        let forecast = to_json(View::Forecast, &snap).unwrap();
        assert!(forecast["projected_revenue"].is_number());
        let all = to_json(View::Summary, &snap).unwrap();
        assert_eq!(all["metrics"]["total_consultations"], 2);
    }

    #[test]
    fn test_render_alerts() {
        let (_dir, snap) = snapshot(true);
        let text = render_alerts(&snap.alerts);
        assert!(text.starts_with("! Paracetamol 500mg is low"));
        assert!(text.contains("urgent consultation"));
    }
}
