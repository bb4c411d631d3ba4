use serde::{Deserialize, Serialize};

// ── Percentile helper ─────────────────────────────────────────────────────────

/// Compute the `p`-th percentile of a **sorted** slice using linear
/// interpolation between closest ranks (NumPy's default method).
///
/// Returns `0.0` for an empty slice.
pub fn percentile(sorted_data: &[f64], p: f64) -> f64 {
    if sorted_data.is_empty() {
        return 0.0;
    }
    let len = sorted_data.len();
    if len == 1 {
        return sorted_data[0];
    }
    let rank = (p.clamp(0.0, 100.0) / 100.0) * (len as f64 - 1.0);
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    if lo == hi {
        return sorted_data[lo];
    }
    let frac = rank - lo as f64;
    sorted_data[lo] + frac * (sorted_data[hi] - sorted_data[lo])
}

/// Sort a sample in place; NaNs compare equal so the sort never panics.
pub fn sort_samples(samples: &mut [f64]) {
    samples.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
}

// ── ResponseStats ─────────────────────────────────────────────────────────────

/// Distribution of response times (minutes) for a group of consultations.
///
/// All fields are zero for an empty group.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseStats {
    pub count: u64,
    pub mean: f64,
    pub median: f64,
    pub p90: f64,
    /// Fastest response.
    pub min: f64,
    /// Slowest response.
    pub max: f64,
    /// Share of responses at or under the target, in percent.
    pub within_target_pct: f64,
}

impl ResponseStats {
    /// Summarise `samples` against a response-time target in minutes.
    pub fn from_samples(samples: &[f64], target_minutes: f64) -> Self {
        if samples.is_empty() {
            return Self::default();
        }
        let mut sorted = samples.to_vec();
        sort_samples(&mut sorted);

        let count = sorted.len();
        let within = sorted.iter().filter(|&&v| v <= target_minutes).count();

        Self {
            count: count as u64,
            mean: sorted.iter().sum::<f64>() / count as f64,
            median: percentile(&sorted, 50.0),
            p90: percentile(&sorted, 90.0),
            min: sorted[0],
            max: sorted[count - 1],
            within_target_pct: within as f64 / count as f64 * 100.0,
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentile_empty_returns_zero() {
        assert_eq!(percentile(&[], 90.0), 0.0);
    }

    #[test]
    fn test_percentile_single_element() {
        assert_eq!(percentile(&[42.0], 90.0), 42.0);
        assert_eq!(percentile(&[42.0], 0.0), 42.0);
        assert_eq!(percentile(&[42.0], 100.0), 42.0);
    }

    #[test]
    fn test_percentile_p50_even() {
        let data = vec![1.0, 2.0, 3.0, 4.0];
        // rank = 0.5 * 3 = 1.5 → halfway between 2 and 3
        assert!((percentile(&data, 50.0) - 2.5).abs() < 1e-9);
    }

    #[test]
    fn test_percentile_bounds() {
        let data = vec![10.0, 20.0, 30.0];
        assert!((percentile(&data, 0.0) - 10.0).abs() < 1e-9);
        assert!((percentile(&data, 100.0) - 30.0).abs() < 1e-9);
        // Out-of-range p is clamped.
        assert!((percentile(&data, 150.0) - 30.0).abs() < 1e-9);
    }

    #[test]
    fn test_percentile_p90_ten_elements() {
        // rank = 0.9 * 9 = 8.1 → 9 + 0.1*(10-9) = 9.1
        let data: Vec<f64> = (1..=10).map(|x| x as f64).collect();
        let p90 = percentile(&data, 90.0);
        assert!((p90 - 9.1).abs() < 1e-9, "p90 = {p90}");
    }

    #[test]
    fn test_response_stats_empty() {
        assert_eq!(ResponseStats::from_samples(&[], 10.0), ResponseStats::default());
    }

    #[test]
    fn test_response_stats_unsorted_input() {
        let stats = ResponseStats::from_samples(&[30.0, 5.0, 10.0, 15.0], 10.0);
        assert_eq!(stats.count, 4);
        assert!((stats.mean - 15.0).abs() < 1e-9);
        assert!((stats.median - 12.5).abs() < 1e-9);
        assert_eq!(stats.min, 5.0);
        assert_eq!(stats.max, 30.0);
        // 5 and 10 are within a 10 minute target.
        assert!((stats.within_target_pct - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_response_stats_p90() {
        let samples: Vec<f64> = (1..=10).rev().map(|x| x as f64).collect();
        let stats = ResponseStats::from_samples(&samples, 100.0);
        assert!((stats.p90 - 9.1).abs() < 1e-9);
        assert!((stats.within_target_pct - 100.0).abs() < 1e-9);
    }
}
