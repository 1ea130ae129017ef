//! Progress and status of key results against their targets.

use chrono::NaiveDate;
use serde::Serialize;

use crate::date_util::quarter_of;
use crate::error::{Error, Result};
use crate::metrics::today;
use crate::metrics::types::DashboardMetrics;
use crate::registry::{registry, Direction, Kr, MetricKey, Objective, TargetPeriod};
use crate::OkrMetrics;

/// Progress at or above this is green.
pub const GREEN_THRESHOLD: f64 = 100.0;
/// Progress at or above this (and below green) is yellow.
pub const YELLOW_THRESHOLD: f64 = 90.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Green,
    Yellow,
    Red,
    /// Not enough data to evaluate.
    Gray,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Green => "green",
            Status::Yellow => "yellow",
            Status::Red => "red",
            Status::Gray => "gray",
        }
    }
}

/// Progress towards `target` on a 0..=100 scale.
///
/// Higher-is-better: `actual / target`, capped at 100; a zero target gives 0.
/// Lower-is-better: 100 while `actual <= target`, then decreasing by the
/// relative overshoot, floored at 0.
pub fn calculate_progress(actual: f64, target: f64, direction: Direction) -> f64 {
    match direction {
        Direction::Higher => {
            if target == 0.0 {
                0.0
            } else {
                (actual / target * 100.0).min(100.0)
            }
        }
        Direction::Lower => {
            if actual <= target {
                100.0
            } else if target == 0.0 {
                0.0
            } else {
                (100.0 - (actual - target) / target * 100.0).max(0.0)
            }
        }
    }
}

/// Status for a progress value. The thresholds are the same for both
/// directions; `direction` does not change the result.
pub fn get_status(progress: f64, _direction: Direction) -> Status {
    if progress >= GREEN_THRESHOLD {
        Status::Green
    } else if progress >= YELLOW_THRESHOLD {
        Status::Yellow
    } else {
        Status::Red
    }
}

/// A key result evaluated against its resolved target.
#[derive(Debug, Clone, Serialize)]
pub struct KrProgress {
    pub kr_id: &'static str,
    pub objective_id: &'static str,
    pub title: &'static str,
    pub metric_key: MetricKey,
    pub operator: &'static str,
    pub actual: Option<f64>,
    pub target: Option<f64>,
    pub target_period: Option<TargetPeriod>,
    pub progress: Option<f64>,
    pub status: Status,
    /// `actual - target`.
    pub delta: Option<f64>,
    pub formatted_actual: String,
    pub formatted_target: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Evaluate `kr` for `quarter` given its metric's current value. A missing
/// actual or target yields `gray` with no progress.
pub fn evaluate_kr(kr: &Kr, actual: Option<f64>, quarter: u8, error: Option<String>) -> KrProgress {
    let resolved = kr.targets.resolve(quarter);
    let target = resolved.map(|(_, t)| t);

    let (progress, status, delta) = match (actual, target) {
        (Some(a), Some(t)) => {
            let progress = calculate_progress(a, t, kr.direction);
            (Some(progress), get_status(progress, kr.direction), Some(a - t))
        }
        _ => (None, Status::Gray, None),
    };

    let spec = registry().metric_spec(kr.metric_key);
    let format = |v: Option<f64>| match spec {
        Some(spec) => spec.format_opt(v),
        None => v.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string()),
    };

    KrProgress {
        kr_id: kr.id,
        objective_id: kr.objective_id,
        title: kr.title,
        metric_key: kr.metric_key,
        operator: kr.operator.symbol(),
        actual,
        target,
        target_period: resolved.map(|(p, _)| p),
        progress,
        status,
        delta,
        formatted_actual: format(actual),
        formatted_target: format(target),
        error,
    }
}

/// Mean progress of the KRs that could be evaluated.
pub fn mean_progress(krs: &[KrProgress]) -> Option<f64> {
    let values: Vec<f64> = krs.iter().filter_map(|k| k.progress).collect();
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// An objective with all of its key results evaluated.
#[derive(Debug, Clone, Serialize)]
pub struct ObjectiveProgress {
    pub objective: Objective,
    pub progress: Option<f64>,
    pub status: Status,
    pub key_results: Vec<KrProgress>,
}

impl ObjectiveProgress {
    fn from_krs(objective: &Objective, key_results: Vec<KrProgress>) -> Self {
        let progress = mean_progress(&key_results);
        let status = progress
            .map(|p| get_status(p, Direction::Higher))
            .unwrap_or(Status::Gray);
        Self {
            objective: objective.clone(),
            progress,
            status,
            key_results,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OkrOverview {
    pub as_of: String,
    pub quarter: u8,
    pub objectives: Vec<ObjectiveProgress>,
}

fn evaluate_from_dashboard(kr: &Kr, dashboard: &DashboardMetrics, quarter: u8) -> KrProgress {
    let metric = dashboard.get(kr.metric_key);
    evaluate_kr(
        kr,
        metric.and_then(|m| m.value),
        quarter,
        metric.and_then(|m| m.error.clone()),
    )
}

impl OkrMetrics {
    pub async fn kr_progress(&self, kr_id: &str) -> Result<KrProgress> {
        self.kr_progress_as_of(kr_id, today())
            .await
    }

    /// Evaluate one KR against the current quarter's target. Only the KR's
    /// own metric is computed; a failed calculation turns the KR gray.
    pub async fn kr_progress_as_of(&self, kr_id: &str, as_of: NaiveDate) -> Result<KrProgress> {
        let kr = registry()
            .kr_by_id(kr_id)
            .ok_or_else(|| Error::NotFound(format!("KR {kr_id}")))?;
        let value = self.metric_value_degraded(kr.metric_key, as_of).await;
        Ok(evaluate_kr(kr, value.value, quarter_of(as_of), value.error))
    }

    pub async fn objective_progress(&self, objective_id: &str) -> Result<ObjectiveProgress> {
        self.objective_progress_as_of(objective_id, today())
            .await
    }

    pub async fn objective_progress_as_of(
        &self,
        objective_id: &str,
        as_of: NaiveDate,
    ) -> Result<ObjectiveProgress> {
        let objective = registry()
            .objective_by_id(objective_id)
            .ok_or_else(|| Error::NotFound(format!("objective {objective_id}")))?;
        let dashboard = self.dashboard_metrics_as_of(as_of).await;
        let quarter = quarter_of(as_of);
        let krs = registry()
            .krs_by_objective(objective.id)
            .into_iter()
            .map(|kr| evaluate_from_dashboard(kr, &dashboard, quarter))
            .collect();
        Ok(ObjectiveProgress::from_krs(objective, krs))
    }

    pub async fn okr_overview(&self) -> OkrOverview {
        self.okr_overview_as_of(today())
            .await
    }

    /// Every objective with its KRs, from one dashboard computation.
    pub async fn okr_overview_as_of(&self, as_of: NaiveDate) -> OkrOverview {
        let dashboard = self.dashboard_metrics_as_of(as_of).await;
        let quarter = quarter_of(as_of);
        let objectives = registry()
            .all_objectives()
            .iter()
            .map(|objective| {
                let krs = registry()
                    .krs_by_objective(objective.id)
                    .into_iter()
                    .map(|kr| evaluate_from_dashboard(kr, &dashboard, quarter))
                    .collect();
                ObjectiveProgress::from_krs(objective, krs)
            })
            .collect();
        OkrOverview {
            as_of: dashboard.as_of.clone(),
            quarter,
            objectives,
        }
    }
}
