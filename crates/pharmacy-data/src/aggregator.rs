//! Consultation metrics grouped by calendar period, severity and pharmacist.
//!
//! Every function here is a pure function of its input slice: the same
//! records always produce the same summary, and an empty slice produces a
//! zero-valued summary rather than an error.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use pharmacy_core::forecast::PeriodSeries;
use pharmacy_core::models::{ConsultationRecord, Outcome, Priority, Severity};
use pharmacy_core::percentile::ResponseStats;
use pharmacy_core::time_utils::{local_date, local_hour, Granularity};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Default flat fee per consultation used for the fee-revenue estimate.
pub const DEFAULT_CONSULTATION_FEE: f64 = 1500.0;

/// Default response-time target in minutes.
pub const DEFAULT_RESPONSE_TARGET_MINUTES: f64 = 10.0;

/// Upper bound on the contiguous period series; ten years of days.
pub const MAX_FILLED_PERIODS: usize = 3660;

// ── SeverityCounts ────────────────────────────────────────────────────────────

/// Consultation counts per severity. Always carries all three levels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityCounts {
    #[serde(rename = "Mild")]
    pub mild: u64,
    #[serde(rename = "Strong")]
    pub strong: u64,
    #[serde(rename = "Very Strong")]
    pub very_strong: u64,
}

impl SeverityCounts {
    pub fn add(&mut self, severity: Severity) {
        match severity {
            Severity::Mild => self.mild += 1,
            Severity::Strong => self.strong += 1,
            Severity::VeryStrong => self.very_strong += 1,
        }
    }

    pub fn get(&self, severity: Severity) -> u64 {
        match severity {
            Severity::Mild => self.mild,
            Severity::Strong => self.strong,
            Severity::VeryStrong => self.very_strong,
        }
    }

    pub fn total(&self) -> u64 {
        self.mild + self.strong + self.very_strong
    }

    /// Highest count; ties go to the less severe level. `None` when empty.
    pub fn most_common(&self) -> Option<Severity> {
        let mut best: Option<(Severity, u64)> = None;
        for severity in Severity::ALL {
            let count = self.get(severity);
            if count > 0 && best.map_or(true, |(_, c)| count > c) {
                best = Some((severity, count));
            }
        }
        best.map(|(s, _)| s)
    }
}

// ── PeriodSummary ─────────────────────────────────────────────────────────────

/// Consultations within one calendar period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodSummary {
    /// `2024-01-15`, `2024-W03` or `2024-01`.
    pub key: String,
    pub start: NaiveDate,
    pub consultations: u64,
    pub severity: SeverityCounts,
    pub revenue: f64,
    pub response: ResponseStats,
}

impl PeriodSeries for PeriodSummary {
    fn period_start(&self) -> NaiveDate {
        self.start
    }
    fn revenue(&self) -> f64 {
        self.revenue
    }
    fn consultations(&self) -> u64 {
        self.consultations
    }
}

// ── PharmacistSummary ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PharmacistSummary {
    pub pharmacist_id: String,
    pub consultations: u64,
    pub severity: SeverityCounts,
    pub revenue: f64,
    pub response: ResponseStats,
}

// ── SeverityResponse ──────────────────────────────────────────────────────────

/// Response times for one severity level and its triage priority.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeverityResponse {
    pub severity: Severity,
    pub priority: Priority,
    pub response: ResponseStats,
}

// ── Kpis ──────────────────────────────────────────────────────────────────────

/// Headline figures shown at the top of the dashboard.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Kpis {
    pub total_consultations: u64,
    /// Distinct local dates with at least one consultation.
    pub active_days: u64,
    pub avg_per_active_day: f64,
    /// Share of Very Strong consultations, in percent.
    pub urgent_share_pct: f64,
    pub avg_response_minutes: f64,
    pub within_target_pct: f64,
    pub fastest_response_minutes: Option<f64>,
    /// Local hour of day with the most consultations; ties go to the earlier hour.
    pub peak_hour: Option<u32>,
    pub most_common_severity: Option<Severity>,
    pub total_revenue: f64,
    /// `total_consultations × consultation_fee`.
    pub estimated_fee_revenue: f64,
    pub fulfilled: u64,
    pub referred: u64,
    /// Consultations on the aggregator's "today"; zero when none is set.
    pub today_consultations: u64,
    /// Very Strong consultations.
    pub urgent_consultations: u64,
    pub avg_urgent_response_minutes: Option<f64>,
    pub fastest_urgent_response_minutes: Option<f64>,
}

// ── MetricsSummary ────────────────────────────────────────────────────────────

/// Everything derived from one consultation table. Recomputed per refresh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSummary {
    pub granularity: Granularity,
    pub timezone: String,
    pub response_target_minutes: f64,
    pub total_consultations: u64,
    pub severity: SeverityCounts,
    pub response: ResponseStats,
    /// One entry per severity, least urgent first.
    pub response_by_severity: Vec<SeverityResponse>,
    pub kpis: Kpis,
    /// Ascending, contiguous.
    pub periods: Vec<PeriodSummary>,
    /// Sorted by pharmacist id.
    pub pharmacists: Vec<PharmacistSummary>,
    pub first_consultation: Option<DateTime<Utc>>,
    pub last_consultation: Option<DateTime<Utc>>,
}

// ── MetricsAggregator ─────────────────────────────────────────────────────────

#[derive(Default)]
struct Bucket {
    consultations: u64,
    severity: SeverityCounts,
    revenue: f64,
    response_samples: Vec<f64>,
}

impl Bucket {
    fn add(&mut self, record: &ConsultationRecord) {
        self.consultations += 1;
        self.severity.add(record.severity);
        self.revenue += record.revenue_captured;
        self.response_samples.push(record.response_time_minutes);
    }
}

/// Groups consultations in a fixed timezone and granularity.
#[derive(Debug, Clone, Copy)]
pub struct MetricsAggregator {
    granularity: Granularity,
    timezone: Tz,
    response_target_minutes: f64,
    consultation_fee: f64,
    today: Option<NaiveDate>,
}

impl MetricsAggregator {
    pub fn new(granularity: Granularity, timezone: Tz, response_target_minutes: f64) -> Self {
        Self {
            granularity,
            timezone,
            response_target_minutes,
            consultation_fee: DEFAULT_CONSULTATION_FEE,
            today: None,
        }
    }

    pub fn with_consultation_fee(mut self, fee: f64) -> Self {
        self.consultation_fee = fee;
        self
    }

    /// Local date counted as "today" in the KPIs.
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = Some(today);
        self
    }

    pub fn granularity(&self) -> Granularity {
        self.granularity
    }

    /// Full summary of `records`.
    pub fn summarize(&self, records: &[ConsultationRecord]) -> MetricsSummary {
        let severity = self.severity_counts(records);
        let samples: Vec<f64> = records.iter().map(|r| r.response_time_minutes).collect();
        let response = ResponseStats::from_samples(&samples, self.response_target_minutes);
        let response_by_severity = self.severity_response(records);

        MetricsSummary {
            granularity: self.granularity,
            timezone: self.timezone.name().to_string(),
            response_target_minutes: self.response_target_minutes,
            total_consultations: records.len() as u64,
            severity,
            kpis: self.kpis(records, &severity, &response, &response_by_severity),
            response,
            response_by_severity,
            periods: self.aggregate_periods(records),
            pharmacists: self.pharmacist_stats(records),
            first_consultation: records.iter().map(|r| r.timestamp).min(),
            last_consultation: records.iter().map(|r| r.timestamp).max(),
        }
    }

    /// Per-period totals in ascending order, with empty periods between the
    /// first and last observed one filled in.
    pub fn aggregate_periods(&self, records: &[ConsultationRecord]) -> Vec<PeriodSummary> {
        let mut buckets: BTreeMap<NaiveDate, Bucket> = BTreeMap::new();
        for record in records {
            let date = local_date(record.timestamp, self.timezone);
            buckets
                .entry(self.granularity.period_start(date))
                .or_default()
                .add(record);
        }
        self.fill_gaps(&mut buckets);

        buckets
            .into_iter()
            .map(|(start, bucket)| PeriodSummary {
                key: self.granularity.key(start),
                start,
                consultations: bucket.consultations,
                severity: bucket.severity,
                revenue: bucket.revenue,
                response: ResponseStats::from_samples(
                    &bucket.response_samples,
                    self.response_target_minutes,
                ),
            })
            .collect()
    }

    pub fn severity_counts(&self, records: &[ConsultationRecord]) -> SeverityCounts {
        let mut counts = SeverityCounts::default();
        for record in records {
            counts.add(record.severity);
        }
        counts
    }

    /// Response-time statistics for each severity, least urgent first.
    pub fn severity_response(&self, records: &[ConsultationRecord]) -> Vec<SeverityResponse> {
        Severity::ALL
            .iter()
            .map(|&severity| {
                let samples: Vec<f64> = records
                    .iter()
                    .filter(|r| r.severity == severity)
                    .map(|r| r.response_time_minutes)
                    .collect();
                SeverityResponse {
                    severity,
                    priority: severity.priority(),
                    response: ResponseStats::from_samples(&samples, self.response_target_minutes),
                }
            })
            .collect()
    }

    /// Per-pharmacist totals sorted by pharmacist id.
    pub fn pharmacist_stats(&self, records: &[ConsultationRecord]) -> Vec<PharmacistSummary> {
        let mut buckets: BTreeMap<&str, Bucket> = BTreeMap::new();
        for record in records {
            buckets
                .entry(record.pharmacist_id.as_str())
                .or_default()
                .add(record);
        }

        buckets
            .into_iter()
            .map(|(id, bucket)| PharmacistSummary {
                pharmacist_id: id.to_string(),
                consultations: bucket.consultations,
                severity: bucket.severity,
                revenue: bucket.revenue,
                response: ResponseStats::from_samples(
                    &bucket.response_samples,
                    self.response_target_minutes,
                ),
            })
            .collect()
    }

    // ── Private ───────────────────────────────────────────────────────────────

    /// Insert empty buckets between the first and last period. Spans longer
    /// than [`MAX_FILLED_PERIODS`] are left sparse.
    fn fill_gaps(&self, buckets: &mut BTreeMap<NaiveDate, Bucket>) {
        let (Some(&first), Some(&last)) = (buckets.keys().next(), buckets.keys().next_back())
        else {
            return;
        };

        let mut missing = Vec::new();
        let mut cursor = first;
        let mut span = 0usize;
        while cursor < last {
            span += 1;
            if span > MAX_FILLED_PERIODS {
                warn!(
                    first = %first,
                    last = %last,
                    granularity = %self.granularity,
                    "period span too long; leaving gaps unfilled"
                );
                return;
            }
            if !buckets.contains_key(&cursor) {
                missing.push(cursor);
            }
            match self.granularity.next_start(cursor) {
                Some(next) => cursor = next,
                None => break,
            }
        }
        for start in missing {
            buckets.entry(start).or_default();
        }
    }

    fn kpis(
        &self,
        records: &[ConsultationRecord],
        severity: &SeverityCounts,
        response: &ResponseStats,
        by_severity: &[SeverityResponse],
    ) -> Kpis {
        let total = records.len() as u64;
        if total == 0 {
            return Kpis::default();
        }

        let active_days: BTreeSet<NaiveDate> = records
            .iter()
            .map(|r| local_date(r.timestamp, self.timezone))
            .collect();

        let mut by_hour = [0u64; 24];
        for record in records {
            by_hour[local_hour(record.timestamp, self.timezone) as usize] += 1;
        }
        let mut peak_hour = 0usize;
        for (hour, &count) in by_hour.iter().enumerate() {
            if count > by_hour[peak_hour] {
                peak_hour = hour;
            }
        }

        let total_revenue: f64 = records.iter().map(|r| r.revenue_captured).sum();
        let count_outcome =
            |o: Outcome| records.iter().filter(|r| r.outcome == Some(o)).count() as u64;
        let today_consultations = match self.today {
            Some(today) => records
                .iter()
                .filter(|r| local_date(r.timestamp, self.timezone) == today)
                .count() as u64,
            None => 0,
        };
        let urgent = by_severity
            .iter()
            .find(|s| s.severity == Severity::VeryStrong)
            .map(|s| &s.response)
            .filter(|stats| stats.count > 0);

        Kpis {
            total_consultations: total,
            active_days: active_days.len() as u64,
            avg_per_active_day: total as f64 / active_days.len() as f64,
            urgent_share_pct: severity.very_strong as f64 / total as f64 * 100.0,
            avg_response_minutes: response.mean,
            within_target_pct: response.within_target_pct,
            fastest_response_minutes: Some(response.min),
            peak_hour: Some(peak_hour as u32),
            most_common_severity: severity.most_common(),
            total_revenue,
            estimated_fee_revenue: total as f64 * self.consultation_fee,
            fulfilled: count_outcome(Outcome::Fulfilled),
            referred: count_outcome(Outcome::Referred),
            today_consultations,
            urgent_consultations: severity.very_strong,
            avg_urgent_response_minutes: urgent.map(|stats| stats.mean),
            fastest_urgent_response_minutes: urgent.map(|stats| stats.min),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
