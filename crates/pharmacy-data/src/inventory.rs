//! Stock status, valuation and reorder suggestions for inventory items.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use pharmacy_core::error::DashboardError;
use pharmacy_core::models::{InventoryRecord, StockStatus};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

// ── Filtering ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StockFilter {
    #[default]
    All,
    Low,
    Ok,
}

impl FromStr for StockFilter {
    type Err = DashboardError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_lowercase().as_str() {
            "all" => Ok(StockFilter::All),
            "low" | "low_stock" | "low-stock" => Ok(StockFilter::Low),
            "ok" => Ok(StockFilter::Ok),
            other => Err(DashboardError::Config(format!(
                "unknown stock filter: {}",
                other
            ))),
        }
    }
}

/// Search term plus status filter applied to the item listing.
#[derive(Debug, Clone, Default)]
pub struct InventoryFilter {
    search: Option<Regex>,
    status: StockFilter,
}

impl InventoryFilter {
    /// `search` is matched literally and case-insensitively against the item
    /// id and display name. Blank terms match everything.
    pub fn new(search: Option<&str>, status: StockFilter) -> Result<Self, regex::Error> {
        let search = match search.map(str::trim).filter(|s| !s.is_empty()) {
            Some(term) => Some(
                RegexBuilder::new(&regex::escape(term))
                    .case_insensitive(true)
                    .build()?,
            ),
            None => None,
        };
        Ok(Self { search, status })
    }

    pub fn matches(&self, record: &InventoryRecord) -> bool {
        let status_ok = match self.status {
            StockFilter::All => true,
            StockFilter::Low => record.is_low(),
            StockFilter::Ok => !record.is_low(),
        };
        let search_ok = self.search.as_ref().map_or(true, |re| {
            re.is_match(&record.item_id) || re.is_match(record.display_name())
        });
        status_ok && search_ok
    }
}

// ── Views ─────────────────────────────────────────────────────────────────────

/// One item with its derived figures, as listed by the dashboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemView {
    pub item_id: String,
    pub name: String,
    pub stock_level: u64,
    pub reorder_threshold: u64,
    pub status: StockStatus,
    pub stock_value: f64,
    pub reorder_quantity: Option<u64>,
    pub days_of_cover: Option<f64>,
    pub days_since_restock: i64,
    pub monthly_demand: Option<u64>,
    pub unit_price: Option<f64>,
    pub last_restock: DateTime<Utc>,
}

impl ItemView {
    pub fn from_record(record: &InventoryRecord, now: DateTime<Utc>) -> Self {
        Self {
            item_id: record.item_id.clone(),
            name: record.display_name().to_string(),
            stock_level: record.stock_level,
            reorder_threshold: record.reorder_threshold,
            status: record.status(),
            stock_value: record.stock_value(),
            reorder_quantity: record.reorder_quantity(),
            days_of_cover: record.days_of_cover(),
            days_since_restock: record.days_since_restock(now),
            monthly_demand: record.monthly_demand,
            unit_price: record.unit_price,
            last_restock: record.last_restock,
        }
    }
}

/// Inventory-wide figures. Totals cover every item; `items` holds only the
/// filtered ones, ranked by stock value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InventorySummary {
    pub item_count: u64,
    pub low_stock_count: u64,
    pub total_value: f64,
    /// Mean over items with a known demand.
    pub avg_monthly_demand: Option<f64>,
    pub items: Vec<ItemView>,
}

pub struct InventoryAnalytics;

impl InventoryAnalytics {
    pub fn summarize(
        records: &[InventoryRecord],
        filter: &InventoryFilter,
        now: DateTime<Utc>,
    ) -> InventorySummary {
        let demands: Vec<u64> = records.iter().filter_map(|r| r.monthly_demand).collect();
        let avg_monthly_demand = if demands.is_empty() {
            None
        } else {
            Some(demands.iter().sum::<u64>() as f64 / demands.len() as f64)
        };

        let mut items: Vec<ItemView> = records
            .iter()
            .filter(|r| filter.matches(r))
            .map(|r| ItemView::from_record(r, now))
            .collect();
        items.sort_by(|a, b| {
            b.stock_value
                .partial_cmp(&a.stock_value)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.item_id.cmp(&b.item_id))
        });

        InventorySummary {
            item_count: records.len() as u64,
            low_stock_count: records.iter().filter(|r| r.is_low()).count() as u64,
            total_value: records.iter().map(InventoryRecord::stock_value).sum(),
            avg_monthly_demand,
            items,
        }
    }

    /// Items at or below their reorder threshold, in input order.
    pub fn low_stock(records: &[InventoryRecord]) -> Vec<&InventoryRecord> {
        records.iter().filter(|r| r.is_low()).collect()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
