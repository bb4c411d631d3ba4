use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ValidationError;

/// Consultation urgency as reported by the patient.
///
/// A closed set; ordering follows increasing urgency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    Mild,
    Strong,
    #[serde(rename = "Very Strong")]
    VeryStrong,
}

impl Severity {
    /// Every severity, least urgent first.
    pub const ALL: [Severity; 3] = [Severity::Mild, Severity::Strong, Severity::VeryStrong];

    /// Display label, e.g. `"Very Strong"`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Mild => "Mild",
            Severity::Strong => "Strong",
            Severity::VeryStrong => "Very Strong",
        }
    }

    /// Triage priority used by the live queue.
    pub fn priority(&self) -> Priority {
        match self {
            Severity::Mild => Priority::Low,
            Severity::Strong => Priority::Moderate,
            Severity::VeryStrong => Priority::Urgent,
        }
    }
}

impl FromStr for Severity {
    type Err = ValidationError;

    /// Case-insensitive; `"very strong"`, `"very_strong"`, `"very-strong"`
    /// and `"verystrong"` all map to [`Severity::VeryStrong`].
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalised: String = value
            .trim()
            .to_lowercase()
            .chars()
            .filter(|c| !matches!(c, ' ' | '_' | '-'))
            .collect();
        match normalised.as_str() {
            "mild" => Ok(Severity::Mild),
            "strong" => Ok(Severity::Strong),
            "verystrong" => Ok(Severity::VeryStrong),
            _ => Err(ValidationError::UnknownSeverity(value.to_string())),
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Triage priority derived from [`Severity`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Priority {
    Low,
    Moderate,
    Urgent,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "LOW",
            Priority::Moderate => "MODERATE",
            Priority::Urgent => "URGENT",
        }
    }
}

/// How a consultation was closed by the pharmacist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    /// Medication was in stock and the patient was told to collect it.
    Fulfilled,
    /// The patient was referred to another pharmacy.
    Referred,
}

impl FromStr for Outcome {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "fulfilled" | "confirmed" | "stock_available" => Ok(Outcome::Fulfilled),
            "referred" | "out_of_stock" => Ok(Outcome::Referred),
            _ => Err(ValidationError::InvalidField {
                field: "outcome",
                value: value.to_string(),
            }),
        }
    }
}

/// One consultation handled by a pharmacist. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsultationRecord {
    /// Source-assigned identifier, used to drop duplicates across files.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// UTC time the consultation request arrived.
    pub timestamp: DateTime<Utc>,
    pub severity: Severity,
    /// Minutes between the request and the pharmacist's response.
    pub response_time_minutes: f64,
    pub pharmacist_id: String,
    /// Revenue attributed to this consultation, in the pharmacy's currency.
    pub revenue_captured: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<Outcome>,
}

/// Stock position for a single inventory item.
///
/// Only the external data source changes these; the pipeline reads them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryRecord {
    pub item_id: String,
    /// Human-readable name; falls back to `item_id` when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub stock_level: u64,
    pub reorder_threshold: u64,
    pub last_restock: DateTime<Utc>,
    /// Units dispensed in a typical month.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub monthly_demand: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit_price: Option<f64>,
}

/// Whether an item needs replenishment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StockStatus {
    Low,
    Ok,
}

impl StockStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StockStatus::Low => "Low Stock",
            StockStatus::Ok => "OK",
        }
    }
}

impl InventoryRecord {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.item_id)
    }

    /// `Low` when stock is at or below the reorder threshold.
    pub fn status(&self) -> StockStatus {
        if self.stock_level <= self.reorder_threshold {
            StockStatus::Low
        } else {
            StockStatus::Ok
        }
    }

    pub fn is_low(&self) -> bool {
        self.status() == StockStatus::Low
    }

    /// `stock_level × unit_price`; zero when the price is unknown.
    pub fn stock_value(&self) -> f64 {
        self.unit_price
            .map(|price| self.stock_level as f64 * price)
            .unwrap_or(0.0)
    }

    /// Units needed to cover one month of demand.
    ///
    /// Only low items with a known demand get a suggestion.
    pub fn reorder_quantity(&self) -> Option<u64> {
        if !self.is_low() {
            return None;
        }
        self.monthly_demand
            .map(|demand| demand.saturating_sub(self.stock_level))
    }

    /// Days the current stock lasts at the monthly demand rate (30-day month).
    pub fn days_of_cover(&self) -> Option<f64> {
        match self.monthly_demand {
            Some(0) | None => None,
            Some(demand) => Some(self.stock_level as f64 / (demand as f64 / 30.0)),
        }
    }

    /// Whole days between the last restock and `now`; never negative.
    pub fn days_since_restock(&self, now: DateTime<Utc>) -> i64 {
        (now - self.last_restock).num_days().max(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn item(stock: u64, threshold: u64, demand: Option<u64>, price: Option<f64>) -> InventoryRecord {
        InventoryRecord {
            item_id: "amoxicillin".to_string(),
            name: None,
            stock_level: stock,
            reorder_threshold: threshold,
            last_restock: Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap(),
            monthly_demand: demand,
            unit_price: price,
        }
    }

    // ── Severity ─────────────────────────────────────────────────────────────

    #[test]
    fn test_severity_parse_variants() {
        assert_eq!("Mild".parse::<Severity>().unwrap(), Severity::Mild);
        assert_eq!("STRONG".parse::<Severity>().unwrap(), Severity::Strong);
        assert_eq!("Very Strong".parse::<Severity>().unwrap(), Severity::VeryStrong);
        assert_eq!("very_strong".parse::<Severity>().unwrap(), Severity::VeryStrong);
        assert_eq!("very-strong".parse::<Severity>().unwrap(), Severity::VeryStrong);
        assert_eq!(" mild ".parse::<Severity>().unwrap(), Severity::Mild);
    }

    #[test]
    fn test_severity_parse_rejects_outside_closed_set() {
        let err = "Moderate".parse::<Severity>().unwrap_err();
        assert_eq!(err, ValidationError::UnknownSeverity("Moderate".to_string()));
        assert!("".parse::<Severity>().is_err());
    }

    #[test]
    fn test_severity_ordering_and_priority() {
        assert!(Severity::Mild < Severity::Strong);
        assert!(Severity::Strong < Severity::VeryStrong);
        assert_eq!(Severity::Mild.priority(), Priority::Low);
        assert_eq!(Severity::VeryStrong.priority(), Priority::Urgent);
        assert_eq!(Severity::VeryStrong.priority().as_str(), "URGENT");
    }

    #[test]
    fn test_severity_serde_uses_display_labels() {
        let json = serde_json::to_string(&Severity::VeryStrong).unwrap();
        assert_eq!(json, "\"Very Strong\"");
        let back: Severity = serde_json::from_str("\"Mild\"").unwrap();
        assert_eq!(back, Severity::Mild);
    }

    #[test]
    fn test_outcome_parse_aliases() {
        assert_eq!("confirmed".parse::<Outcome>().unwrap(), Outcome::Fulfilled);
        assert_eq!("Referred".parse::<Outcome>().unwrap(), Outcome::Referred);
        assert!("pending".parse::<Outcome>().is_err());
    }

    // ── InventoryRecord ──────────────────────────────────────────────────────

    #[test]
    fn test_status_low_at_threshold() {
        assert_eq!(item(15, 15, None, None).status(), StockStatus::Low);
        assert_eq!(item(12, 15, None, None).status(), StockStatus::Low);
        assert_eq!(item(16, 15, None, None).status(), StockStatus::Ok);
    }

    #[test]
    fn test_stock_value() {
        assert!((item(12, 15, None, Some(300.0)).stock_value() - 3_600.0).abs() < 1e-9);
        assert_eq!(item(12, 15, None, None).stock_value(), 0.0);
    }

    #[test]
    fn test_reorder_quantity_only_for_low_items() {
        assert_eq!(item(12, 15, Some(35), None).reorder_quantity(), Some(23));
        assert_eq!(item(40, 15, Some(35), None).reorder_quantity(), None);
        assert_eq!(item(12, 15, None, None).reorder_quantity(), None);
        // Demand already covered.
        assert_eq!(item(10, 15, Some(8), None).reorder_quantity(), Some(0));
    }

    #[test]
    fn test_days_of_cover() {
        let cover = item(30, 10, Some(90), None).days_of_cover().unwrap();
        assert!((cover - 10.0).abs() < 1e-9);
        assert!(item(30, 10, Some(0), None).days_of_cover().is_none());
        assert!(item(30, 10, None, None).days_of_cover().is_none());
    }

    #[test]
    fn test_days_since_restock_never_negative() {
        let rec = item(5, 10, None, None);
        let later = Utc.with_ymd_and_hms(2024, 3, 11, 9, 0, 0).unwrap();
        let earlier = Utc.with_ymd_and_hms(2024, 2, 1, 9, 0, 0).unwrap();
        assert_eq!(rec.days_since_restock(later), 10);
        assert_eq!(rec.days_since_restock(earlier), 0);
    }

    #[test]
    fn test_display_name_falls_back_to_id() {
        let mut rec = item(5, 10, None, None);
        assert_eq!(rec.display_name(), "amoxicillin");
        rec.name = Some("Amoxicillin 500mg".to_string());
        assert_eq!(rec.display_name(), "Amoxicillin 500mg");
    }
}
