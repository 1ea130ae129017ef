use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::date_util::{months_between, parse_month_key};
use crate::error::{Error, Result};
use crate::metrics::types::MetricSeriesPoint;
use crate::registry::MetricKey;

pub const DEFAULT_DB_FILE: &str = "warehouse.db";
pub const MANUAL_METRICS_FILE: &str = "manual_metrics.json";
pub const INITIATIVES_FILE: &str = "initiatives.json";

/// Initiative type counted by the standardization metric.
pub const STANDARDIZATION_TYPE: &str = "padronizacao";
/// Initiative status that counts as done.
pub const INITIATIVE_DONE: &str = "concluido";

/// Where the warehouse and the static configuration files live.
#[derive(Debug, Clone)]
pub struct Settings {
    pub db_path: PathBuf,
    pub manual_metrics_path: PathBuf,
    pub initiatives_path: PathBuf,
}

impl Settings {
    /// `~/.okrmetrics`
    pub fn default_dir() -> Result<PathBuf> {
        Ok(dirs::home_dir()
            .ok_or_else(|| Error::Config("cannot determine home directory".into()))?
            .join(".okrmetrics"))
    }

    /// All files inside one directory, using the default file names.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            db_path: dir.join(DEFAULT_DB_FILE),
            manual_metrics_path: dir.join(MANUAL_METRICS_FILE),
            initiatives_path: dir.join(INITIATIVES_FILE),
        }
    }

    pub fn with_db_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.db_path = path.into();
        self
    }
}

/// A manually maintained figure for a metric that is not (fully) tracked in
/// the database yet.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ManualMetric {
    #[serde(default)]
    pub value: Option<f64>,
    /// Per-month values keyed `YYYY-MM`.
    #[serde(default)]
    pub monthly: BTreeMap<String, f64>,
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
}

/// Contents of `manual_metrics.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ManualMetrics {
    #[serde(default)]
    pub metrics: HashMap<String, ManualMetric>,
}

impl ManualMetrics {
    /// Load from `path`; a missing file yields an empty set.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        match read_optional(path)? {
            Some(text) => serde_json::from_str(&text)
                .map_err(|e| Error::Config(format!("{}: {e}", path.display()))),
            None => Ok(Self::default()),
        }
    }

    pub fn get(&self, key: MetricKey) -> Option<&ManualMetric> {
        self.metrics.get(key.as_str())
    }

    pub fn value(&self, key: MetricKey) -> Option<f64> {
        self.get(key).and_then(|m| m.value)
    }

    /// Manual monthly points between `start` and `end`, in month order.
    pub fn series(&self, key: MetricKey, start: NaiveDate, end: NaiveDate) -> Vec<MetricSeriesPoint> {
        let Some(manual) = self.get(key) else {
            return Vec::new();
        };
        let months = months_between(start, end);
        let mut points: Vec<MetricSeriesPoint> = manual
            .monthly
            .iter()
            .filter(|(k, _)| parse_month_key(k).is_some_and(|ym| months.contains(&ym)))
            .map(|(k, v)| MetricSeriesPoint::new(k.clone(), *v))
            .collect();
        points.sort_by(|a, b| a.date.cmp(&b.date));
        points
    }
}

/// One entry of `initiatives.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Initiative {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub status: String,
}

/// Load `initiatives.json`; a missing file yields an empty list.
pub fn load_initiatives(path: impl AsRef<Path>) -> Result<Vec<Initiative>> {
    let path = path.as_ref();
    match read_optional(path)? {
        Some(text) => serde_json::from_str(&text)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display()))),
        None => Ok(Vec::new()),
    }
}

/// Percentage of standardization initiatives that are done; `0` when there
/// are none.
pub fn standardization_completion_pct(initiatives: &[Initiative]) -> f64 {
    let standardization: Vec<&Initiative> = initiatives
        .iter()
        .filter(|i| i.kind == STANDARDIZATION_TYPE)
        .collect();
    if standardization.is_empty() {
        return 0.0;
    }
    let done = standardization
        .iter()
        .filter(|i| i.status == INITIATIVE_DONE)
        .count();
    done as f64 / standardization.len() as f64 * 100.0
}

fn read_optional(path: &Path) -> Result<Option<String>> {
    match std::fs::read_to_string(path) {
        Ok(text) => Ok(Some(text)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            log::info!("{} not found, using empty configuration", path.display());
            Ok(None)
        }
        Err(e) => Err(Error::Config(format!("{}: {e}", path.display()))),
    }
}
