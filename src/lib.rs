pub mod config;
pub mod date_util;
pub mod error;
pub mod metrics;
pub mod period;
pub mod registry;
pub mod storage;

pub use config::{Initiative, ManualMetric, ManualMetrics, Settings};
pub use error::{Error, Result};
pub use metrics::calculators::{Calculator, CalculatorRegistry, Rollup, Window};
pub use metrics::progress::{calculate_progress, get_status};
pub use metrics::quarter::aggregate_quarter_values;
pub use metrics::{
    DashboardMetrics, KrProgress, MetricSeriesPoint, MetricValue, ObjectiveProgress, OkrOverview,
    QuarterAggResult, QuarterAggregation, QuarterSummaryMetric, Readiness, Status,
};
pub use period::Period;
pub use registry::{registry, MetricKey, MetricSpec, Registry};
pub use storage::Database;

/// Main entry point: the warehouse plus the static configuration the metrics
/// need. Metric, quarter and KR operations live in [`metrics`].
pub struct OkrMetrics {
    db: Database,
    manual: ManualMetrics,
    initiatives: Vec<Initiative>,
    calculators: CalculatorRegistry,
}

impl OkrMetrics {
    /// Build the service. Fails if the built-in registry is inconsistent.
    pub fn new(db: Database, manual: ManualMetrics, initiatives: Vec<Initiative>) -> Result<Self> {
        registry().validate()?;
        Ok(Self {
            db,
            manual,
            initiatives,
            calculators: CalculatorRegistry::builtin(),
        })
    }

    /// Open the warehouse and load the JSON configuration named by `settings`.
    pub async fn open(settings: &Settings) -> Result<Self> {
        let db = Database::open_at(&settings.db_path).await?;
        let manual = ManualMetrics::load(&settings.manual_metrics_path)?;
        let initiatives = config::load_initiatives(&settings.initiatives_path)?;
        log::debug!(
            "loaded {} manual metric(s), {} initiative(s)",
            manual.metrics.len(),
            initiatives.len()
        );
        Self::new(db, manual, initiatives)
    }

    /// Replace the calculator set.
    pub fn with_calculators(mut self, calculators: CalculatorRegistry) -> Self {
        self.calculators = calculators;
        self
    }

    /// Access the database (for direct queries in the CLI).
    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn manual_metrics(&self) -> &ManualMetrics {
        &self.manual
    }

    pub fn initiatives(&self) -> &[Initiative] {
        &self.initiatives
    }

    pub fn calculators(&self) -> &CalculatorRegistry {
        &self.calculators
    }
}
