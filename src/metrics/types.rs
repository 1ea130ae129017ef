use std::collections::BTreeMap;

use serde::Serialize;

use crate::registry::MetricKey;

/// One month of a metric series. `date` is `YYYY-MM`.
///
/// Series are sparse: months without underlying rows are omitted, not
/// zero-filled.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricSeriesPoint {
    pub date: String,
    pub value: f64,
}

impl MetricSeriesPoint {
    pub fn new(date: impl Into<String>, value: f64) -> Self {
        Self {
            date: date.into(),
            value,
        }
    }
}

/// A computed metric value.
///
/// `value: None` means "not computable": either the metric is not
/// instrumented, or the calculation failed (then `error` says why). `Some(0.0)`
/// is a real zero.
#[derive(Debug, Clone, Serialize)]
pub struct MetricValue {
    pub key: MetricKey,
    pub value: Option<f64>,
    /// The `as_of` date, `YYYY-MM-DD`.
    pub date: String,
    /// Window the value was computed over (e.g. `2026-ytd`, `2026-10-td`).
    pub period: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub formatted: Option<String>,
    /// True when a manual figure replaced a zero database result.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub manual: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Every metric's current value, computed together.
#[derive(Debug, Clone, Serialize)]
pub struct DashboardMetrics {
    pub as_of: String,
    pub metrics: BTreeMap<MetricKey, MetricValue>,
}

impl DashboardMetrics {
    pub fn get(&self, key: MetricKey) -> Option<&MetricValue> {
        self.metrics.get(&key)
    }

    pub fn value(&self, key: MetricKey) -> Option<f64> {
        self.metrics.get(&key).and_then(|m| m.value)
    }

    /// Keys whose calculation failed.
    pub fn failures(&self) -> Vec<MetricKey> {
        self.metrics
            .values()
            .filter(|m| m.error.is_some())
            .map(|m| m.key)
            .collect()
    }
}
