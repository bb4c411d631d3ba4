//! Periodic refresh loop for the watch view.
//!
//! Runs [`DataManager`] in a tokio task and sends each [`RefreshUpdate`]
//! through an `mpsc` channel. The analysis pass itself stays synchronous;
//! the task only decides when to run it.

use std::time::Duration;

use pharmacy_core::alerts::{Alert, AlertManager, DEFAULT_COOLDOWN_HOURS};
use pharmacy_data::analysis::{AnalysisRequest, DashboardSnapshot};
use tokio::sync::mpsc;
use tokio::time;

use crate::data_manager::DataManager;

// ── Public types ──────────────────────────────────────────────────────────────

/// One refresh result handed to the presentation layer.
#[derive(Debug, Clone)]
pub struct RefreshUpdate {
    pub snapshot: DashboardSnapshot,
    /// Alerts past their cooldown; empty when alerts are disabled.
    pub alerts_due: Vec<Alert>,
    /// Set when this refresh failed and `snapshot` is the previous one.
    pub last_error: Option<String>,
    /// 1 for the initial refresh.
    pub refresh_count: u64,
}

impl RefreshUpdate {
    pub fn is_stale(&self) -> bool {
        self.last_error.is_some()
    }
}

// ── RefreshOrchestrator ───────────────────────────────────────────────────────

pub struct RefreshOrchestrator {
    update_interval: Duration,
    request: AnalysisRequest,
    alerts: Option<(AlertManager, f64)>,
}

impl RefreshOrchestrator {
    pub fn new(update_interval_secs: u64, request: AnalysisRequest) -> Self {
        Self {
            update_interval: Duration::from_secs(update_interval_secs.max(1)),
            request,
            alerts: None,
        }
    }

    /// Filter alerts through `manager` with the given cooldown.
    pub fn with_alerts(mut self, manager: AlertManager, cooldown_hours: f64) -> Self {
        let cooldown = if cooldown_hours > 0.0 {
            cooldown_hours
        } else {
            DEFAULT_COOLDOWN_HOURS
        };
        self.alerts = Some((manager, cooldown));
        self
    }

    /// Spawn the refresh loop.
    ///
    /// The loop stops when the receiver is dropped or the handle is aborted.
    pub fn start(self) -> (mpsc::Receiver<RefreshUpdate>, RefreshHandle) {
        let (tx, rx) = mpsc::channel(16);

        let handle = tokio::spawn(async move {
            self.refresh_loop(tx).await;
        });

        (rx, RefreshHandle { handle })
    }

    // ── Private implementation ────────────────────────────────────────────

    async fn refresh_loop(mut self, tx: mpsc::Sender<RefreshUpdate>) {
        // The interval bounds how often we refresh; the cache must not outlive it.
        let ttl = self.update_interval.as_secs().saturating_sub(1);
        let mut data_manager = DataManager::new(ttl, self.request.clone());
        let mut refresh_count = 0u64;

        let mut interval = time::interval(self.update_interval);
        interval.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

        loop {
            // The first tick completes immediately.
            interval.tick().await;

            if tx.is_closed() {
                tracing::debug!("refresh channel closed; exiting loop");
                break;
            }

            refresh_count += 1;
            let force = refresh_count == 1;
            if !self
                .fetch_and_send(&mut data_manager, &tx, force, refresh_count)
                .await
            {
                break;
            }
        }
    }

    /// Returns `false` once the receiver has gone away.
    async fn fetch_and_send(
        &mut self,
        data_manager: &mut DataManager,
        tx: &mpsc::Sender<RefreshUpdate>,
        force: bool,
        refresh_count: u64,
    ) -> bool {
        let snapshot = match data_manager.get_data(force) {
            Some(s) => s.clone(),
            None => {
                tracing::warn!(
                    error = data_manager.last_error().unwrap_or("unknown"),
                    "no snapshot available; skipping send"
                );
                return true;
            }
        };

        let alerts_due = match self.alerts.as_mut() {
            Some((manager, cooldown)) => manager.take_due(snapshot.alerts.clone(), *cooldown),
            None => Vec::new(),
        };
        for alert in &alerts_due {
            tracing::info!(key = %alert.key, "{}", alert.message);
        }

        let update = RefreshUpdate {
            snapshot,
            alerts_due,
            last_error: data_manager.last_error().map(str::to_string),
            refresh_count,
        };

        if let Err(e) = tx.send(update).await {
            tracing::warn!(error = %e, "failed to send refresh update; receiver dropped");
            return false;
        }
        true
    }
}

// ── RefreshHandle ─────────────────────────────────────────────────────────────

/// Handle to the background refresh task.
pub struct RefreshHandle {
    handle: tokio::task::JoinHandle<()>,
}

impl RefreshHandle {
    pub fn abort(&self) {
        self.handle.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use pharmacy_core::alerts::AlertKind;
    use std::path::{Path, PathBuf};

    fn write_sources(dir: &Path) -> AnalysisRequest {
        let consultations = dir.join("consultations.jsonl");
        let lines = [
            serde_json::json!({
                "timestamp": "2024-01-15T10:00:00Z",
                "severity": "Very Strong",
                "response_time": 25,
                "pharmacist_id": "ph-1",
                "revenue_captured": 1500,
            })
            .to_string(),
            serde_json::json!({
                "timestamp": "2024-01-16T10:00:00Z",
                "severity": "Mild",
                "response_time": 4,
                "pharmacist_id": "ph-2",
                "revenue_captured": 500,
            })
            .to_string(),
        ];
        std::fs::write(&consultations, lines.join("\n")).unwrap();

        let inventory = dir.join("inventory.jsonl");
        std::fs::write(
            &inventory,
            r#"{"item_id": "ors", "stock_level": 2, "reorder_threshold": 10, "last_restock": "2024-01-01"}"#,
        )
        .unwrap();

        let mut request = AnalysisRequest::new(consultations);
        request.inventory = Some(inventory);
        request
    }

    #[test]
    fn test_orchestrator_creation() {
        let orch = RefreshOrchestrator::new(0, AnalysisRequest::new(PathBuf::from("/tmp/x")));
        assert_eq!(orch.update_interval, Duration::from_secs(1));
        assert!(orch.alerts.is_none());
    }

    #[tokio::test]
    async fn test_orchestrator_start_and_abort() {
        let dir = tempfile::TempDir::new().unwrap();
        let orch = RefreshOrchestrator::new(60, write_sources(dir.path()));
        let (_rx, handle) = orch.start();

        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.abort();
    }

    #[tokio::test]
    async fn test_orchestrator_sends_initial_snapshot() {
        let dir = tempfile::TempDir::new().unwrap();
        let orch = RefreshOrchestrator::new(60, write_sources(dir.path()));
        let (mut rx, handle) = orch.start();

        let update = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for update")
            .expect("channel closed before receiving update");

        assert_eq!(update.refresh_count, 1);
        assert!(!update.is_stale());
        assert_eq!(update.snapshot.metrics.total_consultations, 2);
        assert_eq!(update.snapshot.alerts.len(), 2);
        // Alerts are disabled.
        assert!(update.alerts_due.is_empty());

        handle.abort();
    }

    #[tokio::test]
    async fn test_orchestrator_alerts_respect_cooldown() {
        let dir = tempfile::TempDir::new().unwrap();
        let state_dir = dir.path().join("state");
        let request = write_sources(dir.path());

        let orch = RefreshOrchestrator::new(1, request.clone())
            .with_alerts(AlertManager::new(&state_dir), 24.0);
        let (mut rx, handle) = orch.start();

        let first = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out")
            .expect("closed");
        let kinds: Vec<AlertKind> = first.alerts_due.iter().map(|a| a.kind).collect();
        assert_eq!(kinds, vec![AlertKind::LowStock, AlertKind::SlowUrgentResponse]);

        let second = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out")
            .expect("closed");
        assert_eq!(second.refresh_count, 2);
        assert!(second.alerts_due.is_empty());
        assert!(state_dir.join("alert_states.json").exists());

        handle.abort();
    }

    #[tokio::test]
    async fn test_orchestrator_stops_when_receiver_dropped() {
        let dir = tempfile::TempDir::new().unwrap();
        let orch = RefreshOrchestrator::new(1, write_sources(dir.path()));
        let (rx, handle) = orch.start();
        drop(rx);

        tokio::time::timeout(Duration::from_secs(5), async {
            while !handle.is_finished() {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .expect("refresh loop did not stop");
    }
}
