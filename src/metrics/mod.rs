pub mod calculators;
pub mod progress;
pub mod quarter;
pub mod types;

pub use progress::{KrProgress, ObjectiveProgress, OkrOverview, Status};
pub use quarter::{QuarterAggResult, QuarterAggregation, QuarterSummaryMetric, Readiness};
pub use types::*;

use chrono::{Datelike, NaiveDate};
use futures::future::join_all;

use crate::config::standardization_completion_pct;
use crate::date_util::{date_key, month_key};
use crate::error::{Error, Result};
use crate::period::Period;
use crate::registry::{registry, MetricKey, MetricSpec, Source};
use crate::OkrMetrics;
use calculators::{total, Calculator, Window};

pub(crate) fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

impl OkrMetrics {
    /// Monthly series of `key` between `start` and `end` (inclusive).
    pub async fn metric_series(
        &self,
        key: MetricKey,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<MetricSeriesPoint>> {
        self.metric_series_as_of(key, start, end, today()).await
    }

    /// Like [`metric_series`](Self::metric_series), with month-walking
    /// calculators capped at `as_of`.
    ///
    /// A key without a registered calculator gives an empty series and a
    /// warning. Database failures are returned as errors.
    pub async fn metric_series_as_of(
        &self,
        key: MetricKey,
        start: NaiveDate,
        end: NaiveDate,
        as_of: NaiveDate,
    ) -> Result<Vec<MetricSeriesPoint>> {
        let spec = spec_for(key)?;
        match spec.source {
            Source::NotInstrumented => Ok(Vec::new()),
            Source::Initiatives => {
                let last = end.min(as_of);
                if start > last {
                    return Ok(Vec::new());
                }
                Ok(vec![MetricSeriesPoint::new(
                    month_key(last.year(), last.month()),
                    self.standardization_completion_pct(),
                )])
            }
            Source::Database | Source::DatabaseWithManualFallback => {
                let Some(calculator) = self.calculators.get(key).copied() else {
                    log::warn!("metric_series: no calculator registered for '{key}'");
                    return Ok(Vec::new());
                };
                let window = Window::new(start, end, as_of);
                let series = self.run_series(key, calculator, window).await?;

                if spec.source == Source::DatabaseWithManualFallback && total(&series) == 0.0 {
                    let manual = self.manual.series(key, start, end);
                    if !manual.is_empty() {
                        log::info!("[{key}] database series is zero, using manual figures");
                        return Ok(manual);
                    }
                }
                Ok(series)
            }
        }
    }

    /// Series lookup by string key. Unknown keys give an empty series and a
    /// warning, not an error.
    pub async fn metric_series_by_name(
        &self,
        key: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<MetricSeriesPoint>> {
        match key.parse::<MetricKey>() {
            Ok(key) => self.metric_series(key, start, end).await,
            Err(_) => {
                log::warn!("metric_series: unknown metric key '{key}'");
                Ok(Vec::new())
            }
        }
    }

    /// Current value of `key` as of today.
    pub async fn metric_value(&self, key: MetricKey) -> Result<MetricValue> {
        self.metric_value_as_of(key, today()).await
    }

    /// Current value of `key`: its calculator rolled up over the window its
    /// cadence implies (month, quarter or year to date; trailing year for
    /// snapshots).
    pub async fn metric_value_as_of(&self, key: MetricKey, as_of: NaiveDate) -> Result<MetricValue> {
        let spec = spec_for(key)?;
        let period = Period::for_cadence(spec.cadence, as_of);
        let mut value = MetricValue {
            key,
            value: None,
            date: date_key(as_of),
            period: period.to_key(),
            formatted: None,
            manual: false,
            error: None,
        };

        match spec.source {
            Source::NotInstrumented => {}
            Source::Initiatives => value.value = Some(self.standardization_completion_pct()),
            Source::Database | Source::DatabaseWithManualFallback => {
                let Some(calculator) = self.calculators.get(key).copied() else {
                    log::warn!("metric_value: no calculator registered for '{key}'");
                    return Ok(value);
                };
                let (start, end) = period.date_range_as_of(as_of)?;
                let window = Window::new(start, end, as_of);
                let mut current = self.run_current(key, calculator, window).await?;

                // A zero here may be a real zero or an untracked metric; the
                // manual figure wins either way.
                if spec.source == Source::DatabaseWithManualFallback && current == 0.0 {
                    if let Some(manual) = self.manual.value(key) {
                        log::info!("[{key}] database value is zero, using manual figure");
                        current = manual;
                        value.manual = true;
                    }
                }
                value.value = Some(current);
            }
        }

        value.formatted = value.value.map(|v| spec.format(v));
        Ok(value)
    }

    /// [`metric_value_as_of`](Self::metric_value_as_of) that never fails: a
    /// calculation error is logged under the metric key and carried in
    /// `error`, with `value: None`.
    pub(crate) async fn metric_value_degraded(&self, key: MetricKey, as_of: NaiveDate) -> MetricValue {
        match self.metric_value_as_of(key, as_of).await {
            Ok(value) => value,
            Err(e) => {
                log::error!("[{key}] calculation failed: {e}");
                let period = spec_for(key)
                    .map(|spec| Period::for_cadence(spec.cadence, as_of).to_key())
                    .unwrap_or_default();
                MetricValue {
                    key,
                    value: None,
                    date: date_key(as_of),
                    period,
                    formatted: None,
                    manual: false,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    /// Every metric's current value, computed concurrently.
    pub async fn dashboard_metrics(&self) -> DashboardMetrics {
        self.dashboard_metrics_as_of(today()).await
    }

    /// Every metric's current value as of `as_of`. Individual failures are
    /// recorded per metric; the bundle itself always comes back.
    pub async fn dashboard_metrics_as_of(&self, as_of: NaiveDate) -> DashboardMetrics {
        let values = join_all(
            MetricKey::ALL
                .into_iter()
                .map(|key| self.metric_value_degraded(key, as_of)),
        )
        .await;

        let metrics = values.into_iter().map(|v| (v.key, v)).collect();
        let dashboard = DashboardMetrics {
            as_of: date_key(as_of),
            metrics,
        };
        let failures = dashboard.failures();
        if !failures.is_empty() {
            log::warn!("dashboard computed with {} failed metric(s)", failures.len());
        }
        dashboard
    }

    pub fn standardization_completion_pct(&self) -> f64 {
        standardization_completion_pct(&self.initiatives)
    }

    async fn run_series(
        &self,
        key: MetricKey,
        calculator: Calculator,
        window: Window,
    ) -> Result<Vec<MetricSeriesPoint>> {
        log::debug!("[{key}] series {} .. {}", window.start_key(), window.end_key());
        self.db
            .reader()
            .call(move |conn| calculator.series(conn, &window))
            .await
            .map_err(|e| Error::Database(format!("{key}: {e}")))
    }

    async fn run_current(&self, key: MetricKey, calculator: Calculator, window: Window) -> Result<f64> {
        log::debug!("[{key}] value {} .. {}", window.start_key(), window.end_key());
        self.db
            .reader()
            .call(move |conn| calculator.current(conn, &window))
            .await
            .map_err(|e| Error::Database(format!("{key}: {e}")))
    }
}

fn spec_for(key: MetricKey) -> Result<&'static MetricSpec> {
    registry()
        .metric_spec(key)
        .ok_or_else(|| Error::UnknownMetric(key.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ManualMetric, ManualMetrics};
    use crate::storage::Database;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    async fn seed(db: &Database, sql: &'static str) {
        db.writer()
            .call(move |conn| {
                conn.execute_batch(sql)?;
                Ok::<(), rusqlite::Error>(())
            })
            .await
            .unwrap();
    }

    fn manual_tech() -> ManualMetrics {
        let mut manual = ManualMetrics::default();
        manual.metrics.insert(
            "tech_projects_delivered".into(),
            ManualMetric {
                value: Some(7.0),
                monthly: [("2026-01".to_string(), 3.0), ("2026-02".to_string(), 4.0)]
                    .into_iter()
                    .collect(),
                ..Default::default()
            },
        );
        manual
    }

    #[tokio::test]
    async fn test_metric_series_dispatches_by_key() {
        let db = Database::open_memory().await.unwrap();
        seed(
            &db,
            "INSERT INTO crm_deal (stage, data_fechamento) VALUES
                ('won', '2026-01-15'), ('won', '2026-03-02'), ('won', '2026-03-20');",
        )
        .await;
        let okr = OkrMetrics::new(db, Default::default(), Vec::new()).unwrap();

        let series = okr
            .metric_series_as_of(MetricKey::NewClients, d(2026, 1, 1), d(2026, 12, 31), d(2026, 12, 31))
            .await
            .unwrap();
        // Sparse: February has no deals and no point.
        assert_eq!(
            series,
            vec![
                MetricSeriesPoint::new("2026-01", 1.0),
                MetricSeriesPoint::new("2026-03", 2.0),
            ]
        );
    }

    #[tokio::test]
    async fn test_unknown_key_gives_empty_series() {
        let okr = OkrMetrics::new(Database::open_memory().await.unwrap(), Default::default(), Vec::new())
            .unwrap();
        let series = okr
            .metric_series_by_name("faturamento_magico", d(2026, 1, 1), d(2026, 12, 31))
            .await
            .unwrap();
        assert!(series.is_empty());

        let turbooh = okr
            .metric_series(MetricKey::TurboohRevenue, d(2026, 1, 1), d(2026, 12, 31))
            .await
            .unwrap();
        assert!(turbooh.is_empty());
    }

    #[tokio::test]
    async fn test_key_without_calculator_gives_empty_series() {
        let okr = OkrMetrics::new(Database::open_memory().await.unwrap(), Default::default(), Vec::new())
            .unwrap()
            .with_calculators(calculators::CalculatorRegistry::new());
        let series = okr
            .metric_series(MetricKey::MrrActive, d(2026, 1, 1), d(2026, 12, 31))
            .await
            .unwrap();
        assert!(series.is_empty());
    }

    #[tokio::test]
    async fn test_metric_value_uses_cadence_window() {
        let db = Database::open_memory().await.unwrap();
        seed(
            &db,
            "INSERT INTO caz_parcelas (tipo_evento, status, valor_pago, data_quitacao) VALUES
                ('RECEITA', 'QUITADO', 1000.0, '2025-12-20'),
                ('RECEITA', 'QUITADO', 2000.0, '2026-01-20'),
                ('RECEITA', 'QUITADO', 3000.0, '2026-03-05'),
                ('RECEITA', 'QUITADO', 9000.0, '2026-03-25');",
        )
        .await;
        let okr = OkrMetrics::new(db, Default::default(), Vec::new()).unwrap();

        // Year to date, up to and including as_of.
        let revenue = okr
            .metric_value_as_of(MetricKey::RevenueYtd, d(2026, 3, 10))
            .await
            .unwrap();
        assert_eq!(revenue.value, Some(5000.0));
        assert_eq!(revenue.period, "2026-ytd");
        assert_eq!(revenue.date, "2026-03-10");
        assert_eq!(revenue.formatted.as_deref(), Some("R$ 5.000"));
        assert!(!revenue.manual);
    }

    #[tokio::test]
    async fn test_snapshot_values_report_current_zeros() {
        let db = Database::open_memory().await.unwrap();
        seed(
            &db,
            "INSERT INTO rh_pessoal (nome, status, admissao, demissao)
                VALUES ('Bruno', 'Desligado', '2025-06-01', '2026-02-10');
             INSERT INTO cup_data_hist (data_snapshot, id_subtask, id_task, status, valorr) VALUES
                ('2026-02-28', 's1', 'c1', 'ativo', 50000.0),
                ('2026-03-31', 's1', 'c1', 'cancelado', 50000.0);",
        )
        .await;
        let okr = OkrMetrics::new(db, Default::default(), Vec::new()).unwrap();
        let as_of = d(2026, 4, 15);

        for key in [MetricKey::Headcount, MetricKey::MrrActive, MetricKey::ActiveClients] {
            let v = okr.metric_value_as_of(key, as_of).await.unwrap();
            assert_eq!(v.value, Some(0.0), "{key}");
        }
        let february = okr.metric_value_as_of(MetricKey::MrrActive, d(2026, 3, 10)).await.unwrap();
        assert_eq!(february.value, Some(50_000.0));
    }

    #[tokio::test]
    async fn test_cash_balance_as_of_past_date() {
        let db = Database::open_memory().await.unwrap();
        seed(
            &db,
            "INSERT INTO caz_bancos (nome, saldo, ativo, data_atualizacao)
                VALUES ('Itaú', 6000.0, 1, '2026-06-01');
             INSERT INTO caz_parcelas (tipo_evento, status, valor_pago, data_quitacao)
                VALUES ('RECEITA', 'QUITADO', 1000.0, '2026-05-10');",
        )
        .await;
        let okr = OkrMetrics::new(db, Default::default(), Vec::new()).unwrap();

        let march = okr.metric_value_as_of(MetricKey::CashBalance, d(2026, 3, 31)).await.unwrap();
        assert_eq!(march.value, Some(5000.0));
        let june = okr.metric_value_as_of(MetricKey::CashBalance, d(2026, 6, 1)).await.unwrap();
        assert_eq!(june.value, Some(6000.0));
    }

    #[tokio::test]
    async fn test_not_instrumented_value_is_null() {
        let okr = OkrMetrics::new(Database::open_memory().await.unwrap(), Default::default(), Vec::new())
            .unwrap();
        let v = okr
            .metric_value_as_of(MetricKey::TurboohVacancyPct, d(2026, 6, 1))
            .await
            .unwrap();
        assert_eq!(v.value, None);
        assert_eq!(v.formatted, None);
        assert!(v.error.is_none());
    }

    /// A database count of exactly zero is indistinguishable from "not tracked
    /// yet": the manual figure replaces it. This also hides a genuine zero.
    #[tokio::test]
    async fn test_manual_fallback_replaces_zero() {
        let okr = OkrMetrics::new(Database::open_memory().await.unwrap(), manual_tech(), Vec::new())
            .unwrap();
        let v = okr
            .metric_value_as_of(MetricKey::TechProjectsDelivered, d(2026, 2, 20))
            .await
            .unwrap();
        assert_eq!(v.value, Some(7.0));
        assert!(v.manual);

        let series = okr
            .metric_series_as_of(
                MetricKey::TechProjectsDelivered,
                d(2026, 1, 1),
                d(2026, 12, 31),
                d(2026, 12, 31),
            )
            .await
            .unwrap();
        assert_eq!(
            series,
            vec![
                MetricSeriesPoint::new("2026-01", 3.0),
                MetricSeriesPoint::new("2026-02", 4.0),
            ]
        );
    }

    #[tokio::test]
    async fn test_manual_fallback_ignored_when_database_has_data() {
        let db = Database::open_memory().await.unwrap();
        seed(
            &db,
            "INSERT INTO cup_contratos (id_subtask, id_task, produto, status, data_entrega) VALUES
                ('s1', 'c1', 'tech', 'entregue', '2026-02-03');",
        )
        .await;
        let okr = OkrMetrics::new(db, manual_tech(), Vec::new()).unwrap();
        let v = okr
            .metric_value_as_of(MetricKey::TechProjectsDelivered, d(2026, 2, 20))
            .await
            .unwrap();
        assert_eq!(v.value, Some(1.0));
        assert!(!v.manual);
    }

    #[tokio::test]
    async fn test_dashboard_has_every_metric() {
        let db = Database::open_memory().await.unwrap();
        seed(
            &db,
            "INSERT INTO caz_bancos (nome, saldo, ativo) VALUES ('Itaú', 250000.0, 1);",
        )
        .await;
        let okr = OkrMetrics::new(db, Default::default(), Vec::new()).unwrap();
        let dashboard = okr.dashboard_metrics_as_of(d(2026, 4, 15)).await;

        assert_eq!(dashboard.metrics.len(), MetricKey::ALL.len());
        assert!(dashboard.failures().is_empty());
        assert_eq!(dashboard.value(MetricKey::CashBalance), Some(250_000.0));
        // Empty tables give real zeros, not nulls.
        assert_eq!(dashboard.value(MetricKey::MrrActive), Some(0.0));
        assert_eq!(dashboard.value(MetricKey::GrossChurnPct), Some(0.0));
        assert_eq!(dashboard.value(MetricKey::TurboohRevenue), None);
        assert_eq!(dashboard.value(MetricKey::StandardizationCompletionPct), Some(0.0));
    }

    #[tokio::test]
    async fn test_dashboard_degrades_per_metric() {
        fn broken(
            conn: &rusqlite::Connection,
            _: &Window,
        ) -> rusqlite::Result<Vec<MetricSeriesPoint>> {
            conn.prepare("SELECT * FROM tabela_inexistente")?;
            Ok(Vec::new())
        }

        let mut calcs = calculators::CalculatorRegistry::builtin();
        calcs.register(
            MetricKey::RevenueYtd,
            Calculator::new(broken, calculators::Rollup::Sum),
        );
        let okr = OkrMetrics::new(Database::open_memory().await.unwrap(), Default::default(), Vec::new())
            .unwrap()
            .with_calculators(calcs);

        let err = okr
            .metric_value_as_of(MetricKey::RevenueYtd, d(2026, 4, 15))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Database(_)), "{err}");

        let dashboard = okr.dashboard_metrics_as_of(d(2026, 4, 15)).await;
        assert_eq!(dashboard.failures(), vec![MetricKey::RevenueYtd]);
        let revenue = dashboard.get(MetricKey::RevenueYtd).unwrap();
        assert_eq!(revenue.value, None);
        assert!(revenue.error.as_deref().unwrap().contains("revenue_ytd"));
        assert_eq!(revenue.period, "2026-ytd");
        // Everything else still computed.
        assert_eq!(dashboard.value(MetricKey::EbitdaYtd), Some(0.0));
    }
}
