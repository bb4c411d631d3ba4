//! Alert cooldown state for the dashboard.
//!
//! States are persisted to `alert_states.json` in the app directory and use
//! a cooldown scheme so the same alert is not repeated more often than once
//! per `cooldown_hours`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default cooldown between repeats of the same alert.
pub const DEFAULT_COOLDOWN_HOURS: f64 = 24.0;

// ── Alert ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    /// An item is at or below its reorder threshold.
    LowStock,
    /// Urgent consultations waited longer than the urgent threshold.
    SlowUrgentResponse,
}

/// A condition worth surfacing to the pharmacist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    /// Stable identity used for cooldown tracking.
    pub key: String,
    pub kind: AlertKind,
    pub message: String,
}

impl Alert {
    pub fn low_stock(item_id: &str, name: &str, stock: u64, threshold: u64) -> Self {
        Self {
            key: format!("low_stock:{}", item_id),
            kind: AlertKind::LowStock,
            message: format!(
                "{} is low: {} unit(s) left, reorder point {}",
                name, stock, threshold
            ),
        }
    }

    pub fn slow_urgent_response(count: u64, threshold_minutes: f64) -> Self {
        Self {
            key: "slow_urgent_response".to_string(),
            kind: AlertKind::SlowUrgentResponse,
            message: format!(
                "{} urgent consultation(s) waited longer than {} min",
                count, threshold_minutes
            ),
        }
    }
}

// ── AlertState ────────────────────────────────────────────────────────────────

/// Persisted state for a single alert key.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AlertState {
    pub triggered: bool,
    /// UTC timestamp of the last trigger.
    pub timestamp: Option<DateTime<Utc>>,
}

// ── AlertManager ──────────────────────────────────────────────────────────────

/// Tracks which alerts were shown and when.
///
/// Save errors are logged as warnings and never propagate; the manager keeps
/// working in memory.
pub struct AlertManager {
    state_file: PathBuf,
    states: BTreeMap<String, AlertState>,
}

impl AlertManager {
    /// Create a manager persisting to `config_dir/alert_states.json`.
    pub fn new(config_dir: &Path) -> Self {
        let state_file = config_dir.join("alert_states.json");
        let states = Self::load_states(&state_file);
        Self { state_file, states }
    }

    /// Return `true` when the alert `key` should fire at `now`.
    ///
    /// Fires when the key is unseen, untriggered, has no timestamp, or its
    /// last trigger is at least `cooldown_hours` old.
    pub fn should_notify_at(&self, key: &str, cooldown_hours: f64, now: DateTime<Utc>) -> bool {
        let Some(state) = self.states.get(key) else {
            return true;
        };
        if !state.triggered {
            return true;
        }
        match state.timestamp {
            None => true,
            Some(ts) => {
                let elapsed_secs = (now - ts).num_seconds() as f64;
                elapsed_secs >= cooldown_hours * 3600.0
            }
        }
    }

    pub fn should_notify(&self, key: &str, cooldown_hours: f64) -> bool {
        self.should_notify_at(key, cooldown_hours, Utc::now())
    }

    /// Record that `key` fired at `now` and persist.
    pub fn mark_notified_at(&mut self, key: &str, now: DateTime<Utc>) {
        self.states.insert(
            key.to_string(),
            AlertState {
                triggered: true,
                timestamp: Some(now),
            },
        );
        self.save_states();
    }

    pub fn mark_notified(&mut self, key: &str) {
        self.mark_notified_at(key, Utc::now());
    }

    /// Keep only the alerts past their cooldown and mark them as fired.
    pub fn take_due(&mut self, alerts: Vec<Alert>, cooldown_hours: f64) -> Vec<Alert> {
        let now = Utc::now();
        let due: Vec<Alert> = alerts
            .into_iter()
            .filter(|a| self.should_notify_at(&a.key, cooldown_hours, now))
            .collect();
        if due.is_empty() {
            return due;
        }
        for alert in &due {
            self.states.insert(
                alert.key.clone(),
                AlertState {
                    triggered: true,
                    timestamp: Some(now),
                },
            );
        }
        self.save_states();
        due
    }

    pub fn state(&self, key: &str) -> AlertState {
        self.states.get(key).cloned().unwrap_or_default()
    }

    // ── Private helpers ───────────────────────────────────────────────────────

    fn load_states(path: &Path) -> BTreeMap<String, AlertState> {
        if !path.exists() {
            return BTreeMap::new();
        }
        match std::fs::read_to_string(path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(states) => states,
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        path = %path.display(),
                        "failed to deserialise alert states; starting fresh"
                    );
                    BTreeMap::new()
                }
            },
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    path = %path.display(),
                    "failed to read alert states file; starting fresh"
                );
                BTreeMap::new()
            }
        }
    }

    fn save_states(&self) {
        if let Some(parent) = self.state_file.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                tracing::warn!(error = %e, "failed to create alert state directory");
                return;
            }
        }
        match serde_json::to_string_pretty(&self.states) {
            Ok(json) => {
                if let Err(e) = std::fs::write(&self.state_file, json) {
                    tracing::warn!(
                        error = %e,
                        path = %self.state_file.display(),
                        "failed to save alert states"
                    );
                }
            }
            Err(e) => tracing::warn!(error = %e, "failed to serialise alert states"),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::TempDir;

    #[test]
    fn test_alert_constructors() {
        let a = Alert::low_stock("ors", "ORS sachets", 8, 10);
        assert_eq!(a.key, "low_stock:ors");
        assert_eq!(a.kind, AlertKind::LowStock);
        assert!(a.message.contains("ORS sachets"));

        let b = Alert::slow_urgent_response(3, 10.0);
        assert_eq!(b.key, "slow_urgent_response");
        assert!(b.message.contains("3 urgent"));
    }

    #[test]
    fn test_unknown_key_should_notify() {
        let dir = TempDir::new().unwrap();
        let mgr = AlertManager::new(dir.path());
        assert!(mgr.should_notify("low_stock:x", DEFAULT_COOLDOWN_HOURS));
        assert_eq!(mgr.state("low_stock:x"), AlertState::default());
    }

    #[test]
    fn test_cooldown_window() {
        let dir = TempDir::new().unwrap();
        let mut mgr = AlertManager::new(dir.path());
        let fired = Utc::now() - Duration::hours(2);
        mgr.mark_notified_at("k", fired);

        assert!(!mgr.should_notify_at("k", 24.0, fired + Duration::hours(23)));
        assert!(mgr.should_notify_at("k", 24.0, fired + Duration::hours(24)));
        assert!(mgr.should_notify_at("k", 1.0, Utc::now()));
    }

    #[test]
    fn test_state_persists_across_managers() {
        let dir = TempDir::new().unwrap();
        {
            let mut mgr = AlertManager::new(dir.path());
            mgr.mark_notified("low_stock:ors");
        }
        let mgr = AlertManager::new(dir.path());
        assert!(mgr.state("low_stock:ors").triggered);
        assert!(!mgr.should_notify("low_stock:ors", 24.0));
    }

    #[test]
    fn test_corrupt_state_file_starts_fresh() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("alert_states.json"), "{not json").unwrap();
        let mgr = AlertManager::new(dir.path());
        assert!(mgr.should_notify("anything", 24.0));
    }

    #[test]
    fn test_take_due_filters_and_marks() {
        let dir = TempDir::new().unwrap();
        let mut mgr = AlertManager::new(dir.path());
        let alerts = vec![
            Alert::low_stock("a", "A", 1, 5),
            Alert::low_stock("b", "B", 2, 5),
        ];

        let first = mgr.take_due(alerts.clone(), 24.0);
        assert_eq!(first.len(), 2);

        // Same alerts again inside the cooldown are suppressed.
        let second = mgr.take_due(alerts, 24.0);
        assert!(second.is_empty());
    }

    #[test]
    fn test_save_creates_missing_directory() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("nested").join("config");
        let mut mgr = AlertManager::new(&nested);
        mgr.mark_notified("k");
        assert!(nested.join("alert_states.json").exists());
    }
}
