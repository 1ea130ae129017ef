//! Quarter aggregation: collapse a monthly series into Q1..Q4.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use futures::future::join_all;
use serde::{Deserialize, Serialize};

use crate::date_util::{parse_month_key, quarter_of_month};
use crate::error::{Error, Result};
use crate::metrics::today;
use crate::metrics::types::MetricSeriesPoint;
use crate::period::Period;
use crate::registry::{registry, MetricKey, Source, Unit};
use crate::OkrMetrics;

/// How the monthly values of one quarter collapse into a single figure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuarterAggregation {
    /// Last value in month order.
    QuarterEnd,
    QuarterSum,
    QuarterAvg,
    QuarterMax,
    QuarterMin,
}

impl QuarterAggregation {
    pub const ALL: [QuarterAggregation; 5] = [
        QuarterAggregation::QuarterEnd,
        QuarterAggregation::QuarterSum,
        QuarterAggregation::QuarterAvg,
        QuarterAggregation::QuarterMax,
        QuarterAggregation::QuarterMin,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            QuarterAggregation::QuarterEnd => "quarter_end",
            QuarterAggregation::QuarterSum => "quarter_sum",
            QuarterAggregation::QuarterAvg => "quarter_avg",
            QuarterAggregation::QuarterMax => "quarter_max",
            QuarterAggregation::QuarterMin => "quarter_min",
        }
    }
}

impl fmt::Display for QuarterAggregation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QuarterAggregation {
    type Err = Error;

    /// Accepts both `quarter_sum` and the short form `sum`.
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim().to_lowercase();
        QuarterAggregation::ALL
            .into_iter()
            .find(|a| a.as_str() == s || a.as_str().strip_prefix("quarter_") == Some(s.as_str()))
            .ok_or_else(|| Error::Other(format!("unknown quarter aggregation: {s}")))
    }
}

/// Reduce one quarter's values. `None` when the quarter has no values.
pub fn aggregate_quarter_values(values: &[f64], aggregation: QuarterAggregation) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let v = match aggregation {
        QuarterAggregation::QuarterEnd => *values.last()?,
        QuarterAggregation::QuarterSum => values.iter().sum(),
        QuarterAggregation::QuarterAvg => values.iter().sum::<f64>() / values.len() as f64,
        QuarterAggregation::QuarterMax => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        QuarterAggregation::QuarterMin => values.iter().copied().fold(f64::INFINITY, f64::min),
    };
    Some(v)
}

/// Per-quarter figures. A quarter without data is `None`, never `0`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct QuarterAggResult {
    #[serde(rename = "Q1")]
    pub q1: Option<f64>,
    #[serde(rename = "Q2")]
    pub q2: Option<f64>,
    #[serde(rename = "Q3")]
    pub q3: Option<f64>,
    #[serde(rename = "Q4")]
    pub q4: Option<f64>,
}

impl QuarterAggResult {
    /// Bucket a monthly series into quarters and reduce each bucket. Points
    /// are sorted by month first, so `QuarterEnd` does not depend on input
    /// order.
    pub fn from_series(points: &[MetricSeriesPoint], aggregation: QuarterAggregation) -> Self {
        let mut sorted: Vec<&MetricSeriesPoint> = points.iter().collect();
        sorted.sort_by(|a, b| a.date.cmp(&b.date));

        let mut buckets: [Vec<f64>; 4] = Default::default();
        for p in sorted {
            match parse_month_key(&p.date) {
                Some((_, month)) => buckets[quarter_of_month(month) as usize - 1].push(p.value),
                None => log::warn!("skipping series point with bad month '{}'", p.date),
            }
        }

        let [q1, q2, q3, q4] = buckets.map(|values| aggregate_quarter_values(&values, aggregation));
        Self { q1, q2, q3, q4 }
    }

    /// The same value in every quarter.
    pub fn broadcast(value: Option<f64>) -> Self {
        Self {
            q1: value,
            q2: value,
            q3: value,
            q4: value,
        }
    }

    pub fn get(&self, quarter: u8) -> Option<f64> {
        match quarter {
            1 => self.q1,
            2 => self.q2,
            3 => self.q3,
            4 => self.q4,
            _ => None,
        }
    }

    /// Number of quarters with a value.
    pub fn populated(&self) -> usize {
        [self.q1, self.q2, self.q3, self.q4]
            .iter()
            .filter(|q| q.is_some())
            .count()
    }

    pub fn readiness(&self) -> Readiness {
        match self.populated() {
            4 => Readiness::Ready,
            0 => Readiness::NotReady,
            _ => Readiness::Partial,
        }
    }
}

/// How much of a year a metric can report on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Readiness {
    Ready,
    Partial,
    NotReady,
}

/// One row of the quarterly summary.
#[derive(Debug, Clone, Serialize)]
pub struct QuarterSummaryMetric {
    pub metric_key: MetricKey,
    pub title: &'static str,
    pub unit: Unit,
    pub aggregation: QuarterAggregation,
    pub quarters: QuarterAggResult,
    pub status: Readiness,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Metrics reported by the quarterly summary, in display order.
pub const SUMMARY_METRICS: [MetricKey; 20] = [
    MetricKey::MrrActive,
    MetricKey::ActiveClients,
    MetricKey::NewMrr,
    MetricKey::NewClients,
    MetricKey::ExpansionMrr,
    MetricKey::GrossChurnMrr,
    MetricKey::GrossChurnPct,
    MetricKey::NetChurnMrr,
    MetricKey::LogoChurn,
    MetricKey::RevenueYtd,
    MetricKey::EbitdaYtd,
    MetricKey::MarginPct,
    MetricKey::CashBalance,
    MetricKey::CashGeneration,
    MetricKey::DelinquencyPct,
    MetricKey::Headcount,
    MetricKey::TechProjectsDelivered,
    MetricKey::TechFreelancersCost,
    MetricKey::TurboohVacancyPct,
    MetricKey::StandardizationCompletionPct,
];

impl OkrMetrics {
    /// Quarterly figures of `key` for `year`.
    pub async fn quarter_agg(
        &self,
        key: MetricKey,
        year: i32,
        aggregation: QuarterAggregation,
    ) -> Result<QuarterAggResult> {
        self.quarter_agg_as_of(key, year, aggregation, today())
            .await
    }

    pub async fn quarter_agg_as_of(
        &self,
        key: MetricKey,
        year: i32,
        aggregation: QuarterAggregation,
        as_of: NaiveDate,
    ) -> Result<QuarterAggResult> {
        let spec = registry()
            .metric_spec(key)
            .ok_or_else(|| Error::UnknownMetric(key.to_string()))?;

        match spec.source {
            Source::NotInstrumented => Ok(QuarterAggResult::default()),
            Source::Initiatives => Ok(QuarterAggResult::broadcast(Some(
                self.standardization_completion_pct(),
            ))),
            Source::Database | Source::DatabaseWithManualFallback => {
                let (start, end) = Period::Year(year).date_range_as_of(as_of)?;
                let series = self.metric_series_as_of(key, start, end, as_of).await?;
                Ok(QuarterAggResult::from_series(&series, aggregation))
            }
        }
    }

    /// Quarterly figures for every summary metric, computed concurrently.
    /// `None` uses each metric's default aggregation. A failing metric is
    /// logged and reported as `not_ready` with its error.
    pub async fn quarter_summary(
        &self,
        year: i32,
        aggregation: Option<QuarterAggregation>,
    ) -> Vec<QuarterSummaryMetric> {
        self.quarter_summary_as_of(year, aggregation, today())
            .await
    }

    pub async fn quarter_summary_as_of(
        &self,
        year: i32,
        aggregation: Option<QuarterAggregation>,
        as_of: NaiveDate,
    ) -> Vec<QuarterSummaryMetric> {
        let rows = SUMMARY_METRICS.iter().filter_map(|key| registry().metric_spec(*key)).map(
            |spec| async move {
                let aggregation = aggregation.unwrap_or(spec.quarter_aggregation);
                let (quarters, error) = match self
                    .quarter_agg_as_of(spec.key, year, aggregation, as_of)
                    .await
                {
                    Ok(q) => (q, None),
                    Err(e) => {
                        log::error!("[{}] quarter aggregation failed: {e}", spec.key);
                        (QuarterAggResult::default(), Some(e.to_string()))
                    }
                };
                QuarterSummaryMetric {
                    metric_key: spec.key,
                    title: spec.title,
                    unit: spec.unit,
                    aggregation,
                    status: quarters.readiness(),
                    quarters,
                    error,
                }
            },
        );
        join_all(rows).await
    }
}
