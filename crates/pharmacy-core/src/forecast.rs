//! Next-period revenue projection.
//!
//! Two reproducible methods are offered:
//!
//! * **Linear trend**: ordinary least squares of the per-period value on the
//!   period index `0..n`, evaluated at index `n`.
//! * **Moving average**: the mean of the last `window` periods.
//!
//! Both are clamped at zero. The estimates are illustrative only.

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::DashboardError;
use crate::time_utils::Granularity;

/// Interface for any per-period aggregate that can feed a forecast.
pub trait PeriodSeries {
    /// First calendar day of the period.
    fn period_start(&self) -> NaiveDate;
    /// Revenue captured during the period.
    fn revenue(&self) -> f64;
    /// Number of consultations during the period.
    fn consultations(&self) -> u64;
}

// ── ForecastMethod ────────────────────────────────────────────────────────────

/// Projection method applied to the historical series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ForecastMethod {
    LinearTrend,
    MovingAverage { window: usize },
}

impl ForecastMethod {
    /// Build a method from its CLI name (`"linear"` or `"moving-average"`).
    pub fn from_name(name: &str, window: usize) -> Result<Self, DashboardError> {
        match name.to_lowercase().as_str() {
            "linear" | "linear-trend" | "linear_trend" => Ok(ForecastMethod::LinearTrend),
            "moving-average" | "moving_average" | "ma" => Ok(ForecastMethod::MovingAverage {
                window: window.max(1),
            }),
            other => Err(DashboardError::Config(format!(
                "unknown forecast method: {}",
                other
            ))),
        }
    }

    /// One-line description of how the estimate is computed.
    pub fn describe(&self) -> String {
        match self {
            ForecastMethod::LinearTrend => {
                "least-squares linear trend over period index, evaluated one period ahead"
                    .to_string()
            }
            ForecastMethod::MovingAverage { window } => {
                format!("mean of the last {} period(s)", window.max(&1))
            }
        }
    }
}

impl fmt::Display for ForecastMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ForecastMethod::LinearTrend => f.write_str("linear trend"),
            ForecastMethod::MovingAverage { window } => write!(f, "moving average ({})", window),
        }
    }
}

// ── Projection ────────────────────────────────────────────────────────────────

/// Fitted line `value = intercept + slope × index`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinearFit {
    pub slope: f64,
    pub intercept: f64,
}

/// Result of projecting a single series one step ahead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Projection {
    /// Clamped at zero.
    pub estimate: f64,
    /// Present for the linear method with at least one point.
    pub fit: Option<LinearFit>,
    pub history_len: usize,
}

/// Fit `values` against their index with ordinary least squares.
///
/// A single point yields a flat line through it; an empty slice yields `None`.
pub fn linear_fit(values: &[f64]) -> Option<LinearFit> {
    let n = values.len();
    if n == 0 {
        return None;
    }
    if n == 1 {
        return Some(LinearFit {
            slope: 0.0,
            intercept: values[0],
        });
    }
    let n_f = n as f64;
    let mean_x = (n_f - 1.0) / 2.0;
    let mean_y = values.iter().sum::<f64>() / n_f;

    let mut cov = 0.0;
    let mut var = 0.0;
    for (i, &y) in values.iter().enumerate() {
        let dx = i as f64 - mean_x;
        cov += dx * (y - mean_y);
        var += dx * dx;
    }
    let slope = cov / var;
    Some(LinearFit {
        slope,
        intercept: mean_y - slope * mean_x,
    })
}

/// Project `values` one period ahead with `method`.
pub fn project(values: &[f64], method: ForecastMethod) -> Projection {
    let history_len = values.len();
    if values.is_empty() {
        return Projection {
            estimate: 0.0,
            fit: None,
            history_len,
        };
    }

    match method {
        ForecastMethod::LinearTrend => {
            let fit = linear_fit(values);
            let estimate = fit
                .map(|f| f.intercept + f.slope * history_len as f64)
                .unwrap_or(0.0);
            Projection {
                estimate: estimate.max(0.0),
                fit,
                history_len,
            }
        }
        ForecastMethod::MovingAverage { window } => {
            let window = window.clamp(1, history_len);
            let tail = &values[history_len - window..];
            let estimate = tail.iter().sum::<f64>() / window as f64;
            Projection {
                estimate: estimate.max(0.0),
                fit: None,
                history_len,
            }
        }
    }
}

// ── RevenueForecast ───────────────────────────────────────────────────────────

/// Forward estimate for the period after the last observed one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevenueForecast {
    pub method: ForecastMethod,
    /// How the numbers were produced, for reproducibility.
    pub method_description: String,
    pub granularity: Granularity,
    pub history_len: usize,
    pub last_period_key: Option<String>,
    pub next_period_key: Option<String>,
    pub projected_revenue: f64,
    pub projected_consultations: f64,
    /// Linear fit of the revenue series, when the linear method is used.
    pub revenue_fit: Option<LinearFit>,
}

/// Stateless revenue / volume forecaster.
pub struct RevenueForecaster;

impl RevenueForecaster {
    /// Forecast the next period from a contiguous, ascending series.
    pub fn forecast<P: PeriodSeries>(
        periods: &[P],
        granularity: Granularity,
        method: ForecastMethod,
    ) -> RevenueForecast {
        let revenue: Vec<f64> = periods.iter().map(|p| p.revenue()).collect();
        let volume: Vec<f64> = periods.iter().map(|p| p.consultations() as f64).collect();

        let revenue_projection = project(&revenue, method);
        let volume_projection = project(&volume, method);

        let last_start = periods.last().map(|p| p.period_start());
        let next_start = last_start.and_then(|s| granularity.next_start(s));

        RevenueForecast {
            method,
            method_description: method.describe(),
            granularity,
            history_len: periods.len(),
            last_period_key: last_start.map(|s| granularity.key(s)),
            next_period_key: next_start.map(|s| granularity.key(s)),
            projected_revenue: revenue_projection.estimate,
            projected_consultations: volume_projection.estimate,
            revenue_fit: revenue_projection.fit,
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    struct Point {
        start: NaiveDate,
        revenue: f64,
        count: u64,
    }

    impl PeriodSeries for Point {
        fn period_start(&self) -> NaiveDate {
            self.start
        }
        fn revenue(&self) -> f64 {
            self.revenue
        }
        fn consultations(&self) -> u64 {
            self.count
        }
    }

    fn daily(values: &[(f64, u64)]) -> Vec<Point> {
        let first = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        values
            .iter()
            .enumerate()
            .map(|(i, &(revenue, count))| Point {
                start: first + chrono::Duration::days(i as i64),
                revenue,
                count,
            })
            .collect()
    }

    // ── linear_fit / project ─────────────────────────────────────────────────

    #[test]
    fn test_linear_fit_exact_line() {
        let fit = linear_fit(&[10.0, 12.0, 14.0, 16.0]).unwrap();
        assert!((fit.slope - 2.0).abs() < 1e-9);
        assert!((fit.intercept - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_linear_fit_empty_and_single() {
        assert!(linear_fit(&[]).is_none());
        let fit = linear_fit(&[7.0]).unwrap();
        assert_eq!(fit.slope, 0.0);
        assert_eq!(fit.intercept, 7.0);
    }

    #[test]
    fn test_project_linear_extends_trend() {
        let p = project(&[10.0, 12.0, 14.0, 16.0], ForecastMethod::LinearTrend);
        assert!((p.estimate - 18.0).abs() < 1e-9);
        assert_eq!(p.history_len, 4);
        assert!(p.fit.is_some());
    }

    #[test]
    fn test_project_linear_clamps_at_zero() {
        let p = project(&[30.0, 20.0, 10.0, 0.0], ForecastMethod::LinearTrend);
        assert_eq!(p.estimate, 0.0);
    }

    #[test]
    fn test_project_moving_average_window() {
        let method = ForecastMethod::MovingAverage { window: 2 };
        let p = project(&[1.0, 2.0, 3.0, 5.0], method);
        assert!((p.estimate - 4.0).abs() < 1e-9);
        assert!(p.fit.is_none());
    }

    #[test]
    fn test_project_moving_average_window_larger_than_history() {
        let method = ForecastMethod::MovingAverage { window: 10 };
        let p = project(&[2.0, 4.0], method);
        assert!((p.estimate - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_project_moving_average_zero_window_is_one() {
        let method = ForecastMethod::MovingAverage { window: 0 };
        let p = project(&[2.0, 4.0], method);
        assert!((p.estimate - 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_project_empty_history() {
        let p = project(&[], ForecastMethod::LinearTrend);
        assert_eq!(p.estimate, 0.0);
        assert_eq!(p.history_len, 0);
    }

    // ── ForecastMethod ───────────────────────────────────────────────────────

    #[test]
    fn test_method_from_name() {
        assert_eq!(
            ForecastMethod::from_name("linear", 3).unwrap(),
            ForecastMethod::LinearTrend
        );
        assert_eq!(
            ForecastMethod::from_name("moving-average", 0).unwrap(),
            ForecastMethod::MovingAverage { window: 1 }
        );
        assert!(ForecastMethod::from_name("arima", 3).is_err());
    }

    #[test]
    fn test_method_describe_mentions_window() {
        let d = ForecastMethod::MovingAverage { window: 7 }.describe();
        assert!(d.contains("last 7"));
    }

    // ── RevenueForecaster ────────────────────────────────────────────────────

    #[test]
    fn test_forecast_next_period_key_and_values() {
        let series = daily(&[(1_000.0, 2), (2_000.0, 4), (3_000.0, 6)]);
        let f = RevenueForecaster::forecast(&series, Granularity::Day, ForecastMethod::LinearTrend);

        assert_eq!(f.history_len, 3);
        assert_eq!(f.last_period_key.as_deref(), Some("2024-01-03"));
        assert_eq!(f.next_period_key.as_deref(), Some("2024-01-04"));
        assert!((f.projected_revenue - 4_000.0).abs() < 1e-6);
        assert!((f.projected_consultations - 8.0).abs() < 1e-9);
        assert!(f.revenue_fit.is_some());
    }

    #[test]
    fn test_forecast_empty_series() {
        let f = RevenueForecaster::forecast::<Point>(
            &[],
            Granularity::Month,
            ForecastMethod::MovingAverage { window: 3 },
        );
        assert_eq!(f.history_len, 0);
        assert!(f.next_period_key.is_none());
        assert_eq!(f.projected_revenue, 0.0);
    }

    #[test]
    fn test_forecast_is_reproducible() {
        let series = daily(&[(500.0, 1), (900.0, 3), (700.0, 2)]);
        let method = ForecastMethod::MovingAverage { window: 2 };
        let a = RevenueForecaster::forecast(&series, Granularity::Day, method);
        let b = RevenueForecaster::forecast(&series, Granularity::Day, method);
        assert_eq!(a, b);
    }
}
