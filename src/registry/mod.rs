//! Static catalog of objectives, key results and metric definitions.
//!
//! The catalog is built once per process and never mutated. Referential
//! integrity (KR → objective, KR → metric spec, operator ↔ direction) is
//! checked by [`Registry::validate`], which `OkrMetrics::new` runs before
//! serving anything.

pub mod metrics;
pub mod okrs;

use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

pub use metrics::{Cadence, Category, Direction, MetricKey, MetricSpec, Source, Unit};
pub use okrs::{Kr, KrStatus, Objective, Operator, TargetPeriod, Targets};

use crate::error::{Error, Result};

static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::builtin);

/// The process-wide built-in registry.
pub fn registry() -> &'static Registry {
    &REGISTRY
}

#[derive(Debug, Clone)]
pub struct Registry {
    objectives: Vec<Objective>,
    krs: Vec<Kr>,
    metrics: HashMap<MetricKey, MetricSpec>,
    metric_order: Vec<MetricKey>,
}

impl Registry {
    /// Build the registry from the compiled-in catalog.
    pub fn builtin() -> Self {
        Self::from_parts(okrs::objectives(), okrs::key_results(), metrics::catalog())
    }

    /// Assemble a registry without validating it.
    pub fn from_parts(
        mut objectives: Vec<Objective>,
        krs: Vec<Kr>,
        specs: Vec<MetricSpec>,
    ) -> Self {
        objectives.sort_by_key(|o| o.order);
        let metric_order = specs.iter().map(|s| s.key).collect();
        let metrics = specs.into_iter().map(|s| (s.key, s)).collect();
        Self {
            objectives,
            krs,
            metrics,
            metric_order,
        }
    }

    /// Check every cross-reference in the catalog. Reports all problems at once.
    pub fn validate(&self) -> Result<()> {
        let mut problems = Vec::new();

        let mut seen = HashSet::new();
        for o in &self.objectives {
            if !seen.insert(o.id) {
                problems.push(format!("duplicate objective id {}", o.id));
            }
        }

        let mut seen = HashSet::new();
        for kr in &self.krs {
            if !seen.insert(kr.id) {
                problems.push(format!("duplicate KR id {}", kr.id));
            }
            if self.objective_by_id(kr.objective_id).is_none() {
                problems.push(format!(
                    "{} references unknown objective {}",
                    kr.id, kr.objective_id
                ));
            }
            match self.metrics.get(&kr.metric_key) {
                None => problems.push(format!(
                    "{} references metric {} with no definition",
                    kr.id, kr.metric_key
                )),
                Some(spec) => {
                    if spec.unit != kr.unit {
                        problems.push(format!(
                            "{} unit {:?} differs from metric {} unit {:?}",
                            kr.id, kr.unit, kr.metric_key, spec.unit
                        ));
                    }
                    if spec.direction != kr.direction {
                        problems.push(format!(
                            "{} direction {:?} differs from metric {} direction {:?}",
                            kr.id, kr.direction, kr.metric_key, spec.direction
                        ));
                    }
                }
            }
            if !kr.operator.agrees_with(kr.direction) {
                problems.push(format!(
                    "{} operator {} contradicts direction {:?}",
                    kr.id,
                    kr.operator.symbol(),
                    kr.direction
                ));
            }
            if kr.targets.is_empty() {
                problems.push(format!("{} has no targets", kr.id));
            }
        }

        for key in MetricKey::ALL {
            if !self.metrics.contains_key(&key) {
                problems.push(format!("metric {key} has no definition"));
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(Error::Registry(problems.join("; ")))
        }
    }

    // ── Objectives & KRs ──────────────────────────────────────────

    pub fn objective_by_id(&self, id: &str) -> Option<&Objective> {
        self.objectives.iter().find(|o| o.id == id)
    }

    /// All objectives, sorted by display order.
    pub fn all_objectives(&self) -> &[Objective] {
        &self.objectives
    }

    pub fn kr_by_id(&self, id: &str) -> Option<&Kr> {
        self.krs.iter().find(|kr| kr.id == id)
    }

    pub fn krs_by_objective(&self, objective_id: &str) -> Vec<&Kr> {
        self.krs
            .iter()
            .filter(|kr| kr.objective_id == objective_id)
            .collect()
    }

    pub fn all_krs(&self) -> &[Kr] {
        &self.krs
    }

    // ── Metric specs ──────────────────────────────────────────────

    pub fn metric_spec(&self, key: MetricKey) -> Option<&MetricSpec> {
        self.metrics.get(&key)
    }

    /// Look up a spec by its string key; `None` for unknown keys.
    pub fn metric_spec_by_name(&self, key: &str) -> Option<&MetricSpec> {
        key.parse::<MetricKey>()
            .ok()
            .and_then(|k| self.metrics.get(&k))
    }

    /// All specs in catalog order.
    pub fn all_metrics(&self) -> Vec<&MetricSpec> {
        self.metric_order
            .iter()
            .filter_map(|k| self.metrics.get(k))
            .collect()
    }

    pub fn metrics_by_category(&self, category: Category) -> Vec<&MetricSpec> {
        self.all_metrics()
            .into_iter()
            .filter(|s| s.category == category)
            .collect()
    }

    pub fn required_metrics(&self) -> Vec<&MetricSpec> {
        self.all_metrics().into_iter().filter(|s| s.required).collect()
    }

    /// Format `value` with the metric's formatter. Unregistered keys fall
    /// back to the raw number.
    pub fn format_metric_value(&self, key: &str, value: f64) -> String {
        match self.metric_spec_by_name(key) {
            Some(spec) => spec.format(value),
            None => {
                log::warn!("format_metric_value: unknown metric key '{key}'");
                value.to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_registry_is_valid() {
        registry().validate().unwrap();
    }

    #[test]
    fn test_objectives_sorted_by_order() {
        let orders: Vec<u32> = registry().all_objectives().iter().map(|o| o.order).collect();
        let mut sorted = orders.clone();
        sorted.sort();
        assert_eq!(orders, sorted);
        assert_eq!(registry().all_objectives()[0].id, "O1");
    }

    #[test]
    fn test_from_parts_sorts_objectives() {
        let mut objectives = okrs::objectives();
        objectives.reverse();
        let reg = Registry::from_parts(objectives, okrs::key_results(), metrics::catalog());
        assert_eq!(reg.all_objectives()[0].order, 1);
        reg.validate().unwrap();
    }

    #[test]
    fn test_kr_lookups() {
        let reg = registry();
        let kr = reg.kr_by_id("KR2.1").unwrap();
        assert_eq!(kr.metric_key, MetricKey::GrossChurnPct);
        assert!(reg.kr_by_id("KR9.9").is_none());

        let o2 = reg.krs_by_objective("O2");
        assert!(!o2.is_empty());
        assert!(o2.iter().all(|kr| kr.objective_id == "O2"));
        assert!(reg.krs_by_objective("O99").is_empty());
        assert!(reg.objective_by_id("O3").is_some());
    }

    #[test]
    fn test_metric_lookups() {
        let reg = registry();
        assert_eq!(reg.all_metrics().len(), MetricKey::ALL.len());
        assert_eq!(
            reg.metric_spec_by_name("mrr_active").unwrap().title,
            "MRR Ativo"
        );
        assert!(reg.metric_spec_by_name("nope").is_none());

        let finance = reg.metrics_by_category(Category::Finance);
        assert!(finance.iter().any(|s| s.key == MetricKey::CashBalance));
        assert!(finance.iter().all(|s| s.category == Category::Finance));

        let required = reg.required_metrics();
        assert!(required.iter().all(|s| s.required));
        assert!(required.iter().any(|s| s.key == MetricKey::MrrActive));
    }

    #[test]
    fn test_format_metric_value() {
        let reg = registry();
        assert_eq!(reg.format_metric_value("mrr_active", 1_500_000.0), "R$ 1.500.000");
        assert_eq!(reg.format_metric_value("gross_churn_pct", 5.0), "5,0%");
        // Unregistered keys fall back to the raw number, no error.
        assert_eq!(reg.format_metric_value("unknown_metric", 12.5), "12.5");
    }

    #[test]
    fn test_validate_reports_broken_references() {
        let mut krs = okrs::key_results();
        krs[0].objective_id = "O404";
        krs[1].operator = Operator::Le;
        let reg = Registry::from_parts(okrs::objectives(), krs, metrics::catalog());
        let err = reg.validate().unwrap_err().to_string();
        assert!(err.contains("unknown objective O404"), "{err}");
        assert!(err.contains("contradicts direction"), "{err}");
    }

    #[test]
    fn test_validate_reports_missing_metric_spec() {
        let specs: Vec<MetricSpec> = metrics::catalog()
            .into_iter()
            .filter(|s| s.key != MetricKey::Headcount)
            .collect();
        let reg = Registry::from_parts(okrs::objectives(), okrs::key_results(), specs);
        let err = reg.validate().unwrap_err().to_string();
        assert!(err.contains("KR4.1 references metric headcount with no definition"), "{err}");
    }
}
