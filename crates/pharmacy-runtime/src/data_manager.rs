//! TTL-cached data manager for the refresh runtime.
//!
//! Wraps [`analyze`] with a time-to-live cache and retry logic. Callers use
//! [`DataManager::get_data`] to obtain a fresh-or-cached
//! [`DashboardSnapshot`]; on repeated failure the last good snapshot is
//! returned and the error is kept for display.

use std::thread;
use std::time::{Duration, Instant};

use pharmacy_data::analysis::{analyze, AnalysisRequest, DashboardSnapshot};

/// Default cache TTL in seconds.
pub const DEFAULT_CACHE_TTL_SECS: u64 = 30;

/// Maximum number of fetch attempts before falling back to the cache.
const MAX_RETRY_ATTEMPTS: u32 = 3;

// ── DataManager ───────────────────────────────────────────────────────────────

/// TTL-cached wrapper around the analysis pass.
///
/// # Example
/// ```no_run
/// use pharmacy_runtime::data_manager::DataManager;
/// use pharmacy_data::analysis::AnalysisRequest;
///
/// let mut mgr = DataManager::new(30, AnalysisRequest::new("data/consultations"));
/// if let Some(snapshot) = mgr.get_data(false) {
///     println!("consultations: {}", snapshot.metrics.total_consultations);
/// }
/// ```
pub struct DataManager {
    cache_ttl: Duration,
    request: AnalysisRequest,
    cache: Option<DashboardSnapshot>,
    cache_timestamp: Option<Instant>,
    last_error: Option<String>,
    last_successful_fetch: Option<Instant>,
}

impl DataManager {
    pub fn new(cache_ttl_secs: u64, request: AnalysisRequest) -> Self {
        Self {
            cache_ttl: Duration::from_secs(cache_ttl_secs),
            request,
            cache: None,
            cache_timestamp: None,
            last_error: None,
            last_successful_fetch: None,
        }
    }

    // ── Public API ────────────────────────────────────────────────────────

    /// Return a snapshot, using the cache while it is within its TTL.
    ///
    /// `force_refresh` bypasses the cache. A failed fetch is retried up to
    /// three times (0 ms, 100 ms, 200 ms back-off); if all attempts fail the
    /// previous snapshot, if any, is returned.
    pub fn get_data(&mut self, force_refresh: bool) -> Option<&DashboardSnapshot> {
        if !force_refresh && self.is_cache_valid() {
            tracing::debug!("returning cached snapshot");
            return self.cache.as_ref();
        }

        match self.fetch_with_retry() {
            Ok(snapshot) => {
                tracing::debug!(
                    consultations = snapshot.metrics.total_consultations,
                    skipped = snapshot.metadata.skipped_rows,
                    "snapshot cache updated"
                );
                let now = Instant::now();
                self.cache = Some(snapshot);
                self.cache_timestamp = Some(now);
                self.last_successful_fetch = Some(now);
                self.last_error = None;
                self.cache.as_ref()
            }
            Err(e) => {
                tracing::warn!(error = %e, "refresh failed; falling back to cached snapshot");
                self.last_error = Some(e);
                self.cache.as_ref()
            }
        }
    }

    /// Discard the cache so the next [`DataManager::get_data`] call fetches.
    pub fn invalidate_cache(&mut self) {
        self.cache = None;
        self.cache_timestamp = None;
        tracing::debug!("cache invalidated");
    }

    pub fn cache_age(&self) -> Option<Duration> {
        self.cache_timestamp.map(|ts| ts.elapsed())
    }

    /// Time since the last successful pass.
    pub fn time_since_success(&self) -> Option<Duration> {
        self.last_successful_fetch.map(|ts| ts.elapsed())
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn request(&self) -> &AnalysisRequest {
        &self.request
    }

    // ── Private helpers ───────────────────────────────────────────────────

    fn is_cache_valid(&self) -> bool {
        match (self.cache.as_ref(), self.cache_timestamp) {
            (Some(_), Some(ts)) => ts.elapsed() < self.cache_ttl,
            _ => false,
        }
    }

    fn fetch_with_retry(&self) -> Result<DashboardSnapshot, String> {
        let mut last_err = String::new();

        for attempt in 0..MAX_RETRY_ATTEMPTS {
            if attempt > 0 {
                let sleep_ms = (attempt as u64) * 100;
                tracing::debug!(attempt, sleep_ms, "retrying analysis after back-off");
                thread::sleep(Duration::from_millis(sleep_ms));
            }

            match analyze(&self.request) {
                Ok(snapshot) => return Ok(snapshot),
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "analysis attempt failed");
                    last_err = e.to_string();
                }
            }
        }

        Err(last_err)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
