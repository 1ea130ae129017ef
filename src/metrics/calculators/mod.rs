//! Range-parameterized metric calculators.
//!
//! Every metric has exactly one SQL-backed function that produces a monthly
//! series for a [`Window`]. The metric's current value is derived from that
//! same function through its [`Rollup`], so there is no separate scalar query
//! to keep in sync.

pub mod finance;
pub mod people;
pub mod revenue;

use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;
use rusqlite::{Connection, Params};

use crate::date_util::{date_key, last_day_of_month, month_key, months_between};
use crate::metrics::types::MetricSeriesPoint;
use crate::registry::MetricKey;

/// Contract statuses that count as an active, billing contract.
pub const ACTIVE_STATUSES: &str = "'ativo', 'onboarding', 'triagem'";
/// Contract statuses that mean the contract was lost.
pub const CANCELLED_STATUSES: &str = "'cancelado', 'encerrado'";

/// Inclusive date bounds of a calculation plus the date it runs "as of".
///
/// `as_of` caps calculators that walk month by month (balances, headcount),
/// so they never report months that have not happened yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub as_of: NaiveDate,
}

impl Window {
    pub fn new(start: NaiveDate, end: NaiveDate, as_of: NaiveDate) -> Self {
        Self { start, end, as_of }
    }

    pub fn start_key(&self) -> String {
        date_key(self.start)
    }

    pub fn end_key(&self) -> String {
        date_key(self.end)
    }

    /// The last day a month-walking calculator should look at.
    pub fn horizon(&self) -> NaiveDate {
        self.end.min(self.as_of)
    }
}

pub type SeriesFn = fn(&Connection, &Window) -> rusqlite::Result<Vec<MetricSeriesPoint>>;

/// How a series collapses into the metric's current value.
#[derive(Debug, Clone, Copy)]
pub enum Rollup {
    /// Last point (balances and snapshots).
    Latest,
    /// Sum of points (flows).
    Sum,
    /// `sum(numerator) / sum(denominator) * 100`, `0` for a zero denominator.
    Ratio {
        numerator: SeriesFn,
        denominator: SeriesFn,
    },
}

#[derive(Debug, Clone, Copy)]
pub struct Calculator {
    pub series: SeriesFn,
    pub rollup: Rollup,
}

impl Calculator {
    pub fn new(series: SeriesFn, rollup: Rollup) -> Self {
        Self { series, rollup }
    }

    /// Monthly series over the window.
    pub fn series(&self, conn: &Connection, window: &Window) -> rusqlite::Result<Vec<MetricSeriesPoint>> {
        (self.series)(conn, window)
    }

    /// Current value over the window. Empty windows give `0`.
    pub fn current(&self, conn: &Connection, window: &Window) -> rusqlite::Result<f64> {
        match self.rollup {
            Rollup::Latest => Ok(latest(&(self.series)(conn, window)?).unwrap_or(0.0)),
            Rollup::Sum => Ok(total(&(self.series)(conn, window)?)),
            Rollup::Ratio {
                numerator,
                denominator,
            } => {
                let num = total(&numerator(conn, window)?);
                let den = total(&denominator(conn, window)?);
                Ok(ratio_pct(num, den))
            }
        }
    }
}

/// Calculators keyed by metric, populated once at startup.
#[derive(Debug, Clone, Default)]
pub struct CalculatorRegistry {
    calculators: HashMap<MetricKey, Calculator>,
}

impl CalculatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every database-backed metric.
    pub fn builtin() -> Self {
        use finance::*;
        use people::*;
        use revenue::*;
        use MetricKey as K;

        let mut reg = Self::new();
        reg.register(K::MrrActive, Calculator::new(mrr_active_series, Rollup::Latest));
        reg.register(K::ActiveClients, Calculator::new(active_clients_series, Rollup::Latest));
        reg.register(K::NewMrr, Calculator::new(new_mrr_series, Rollup::Sum));
        reg.register(K::NewMrrYtd, Calculator::new(new_mrr_series, Rollup::Sum));
        reg.register(K::ExpansionMrr, Calculator::new(expansion_mrr_series, Rollup::Sum));
        reg.register(K::GrossChurnMrr, Calculator::new(gross_churn_mrr_series, Rollup::Sum));
        reg.register(
            K::GrossChurnPct,
            Calculator::new(
                gross_churn_pct_series,
                Rollup::Ratio {
                    numerator: gross_churn_mrr_series,
                    denominator: mrr_start_of_month_series,
                },
            ),
        );
        reg.register(K::NetChurnMrr, Calculator::new(net_churn_mrr_series, Rollup::Sum));
        reg.register(K::LogoChurn, Calculator::new(logo_churn_series, Rollup::Sum));
        reg.register(K::NewClients, Calculator::new(new_clients_series, Rollup::Sum));
        reg.register(K::RevenueYtd, Calculator::new(revenue_series, Rollup::Sum));
        reg.register(K::EbitdaYtd, Calculator::new(ebitda_series, Rollup::Sum));
        reg.register(
            K::MarginPct,
            Calculator::new(
                margin_pct_series,
                Rollup::Ratio {
                    numerator: ebitda_series,
                    denominator: revenue_series,
                },
            ),
        );
        reg.register(K::CashBalance, Calculator::new(cash_balance_series, Rollup::Latest));
        reg.register(K::CashGeneration, Calculator::new(cash_generation_series, Rollup::Sum));
        reg.register(
            K::DelinquencyPct,
            Calculator::new(
                delinquency_pct_series,
                Rollup::Ratio {
                    numerator: overdue_receivables_series,
                    denominator: billed_receivables_series,
                },
            ),
        );
        reg.register(K::Headcount, Calculator::new(headcount_series, Rollup::Latest));
        reg.register(
            K::TechProjectsDelivered,
            Calculator::new(tech_projects_delivered_series, Rollup::Sum),
        );
        reg.register(
            K::TechFreelancersCost,
            Calculator::new(tech_freelancers_cost_series, Rollup::Sum),
        );
        reg
    }

    /// Register (or replace) the calculator for `key`.
    pub fn register(&mut self, key: MetricKey, calculator: Calculator) -> Option<Calculator> {
        let previous = self.calculators.insert(key, calculator);
        if previous.is_some() {
            log::warn!("calculator for {key} replaced");
        }
        previous
    }

    pub fn get(&self, key: MetricKey) -> Option<&Calculator> {
        self.calculators.get(&key)
    }

    pub fn contains(&self, key: MetricKey) -> bool {
        self.calculators.contains_key(&key)
    }

    pub fn len(&self) -> usize {
        self.calculators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calculators.is_empty()
    }
}

// ── Series helpers ────────────────────────────────────────────────

/// Run a `SELECT month, value` query into series points. NULL values read as 0.
pub(crate) fn query_series<P: Params>(
    conn: &Connection,
    sql: &str,
    params: P,
) -> rusqlite::Result<Vec<MetricSeriesPoint>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params, |row| {
        Ok(MetricSeriesPoint {
            date: row.get(0)?,
            value: row.get::<_, Option<f64>>(1)?.unwrap_or(0.0),
        })
    })?;
    rows.collect()
}

/// Percentage `numerator / denominator * 100`; `0` when the denominator is zero.
pub fn ratio_pct(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        0.0
    } else {
        numerator / denominator * 100.0
    }
}

pub fn total(points: &[MetricSeriesPoint]) -> f64 {
    points.iter().map(|p| p.value).sum()
}

pub fn latest(points: &[MetricSeriesPoint]) -> Option<f64> {
    points.last().map(|p| p.value)
}

/// Merge two series month by month over the union of their months. A month
/// missing from one side reads as 0 on that side.
pub fn combine_series(
    a: &[MetricSeriesPoint],
    b: &[MetricSeriesPoint],
    f: impl Fn(f64, f64) -> f64,
) -> Vec<MetricSeriesPoint> {
    let mut months: BTreeMap<&str, (f64, f64)> = BTreeMap::new();
    for p in a {
        months.entry(p.date.as_str()).or_default().0 += p.value;
    }
    for p in b {
        months.entry(p.date.as_str()).or_default().1 += p.value;
    }
    months
        .into_iter()
        .map(|(date, (x, y))| MetricSeriesPoint::new(date, f(x, y)))
        .collect()
}

/// Per-month [`ratio_pct`] of two series.
pub fn ratio_series(
    numerator: &[MetricSeriesPoint],
    denominator: &[MetricSeriesPoint],
) -> Vec<MetricSeriesPoint> {
    combine_series(numerator, denominator, ratio_pct)
}

/// `(YYYY-MM, last day)` for every month of the window up to `as_of`. The
/// current month ends at `as_of`.
pub(crate) fn month_ends(w: &Window) -> Vec<(String, NaiveDate)> {
    let horizon = w.horizon();
    if w.start > horizon {
        return Vec::new();
    }
    months_between(w.start, horizon)
        .into_iter()
        .map(|(y, m)| (month_key(y, m), last_day_of_month(y, m).min(w.as_of)))
        .collect()
}


#[cfg(test)]
mod tests {
    use super::*;

    fn p(date: &str, value: f64) -> MetricSeriesPoint {
        MetricSeriesPoint::new(date, value)
    }

    #[test]
    fn test_ratio_pct_guards_zero_denominator() {
        assert_eq!(ratio_pct(50_000.0, 1_000_000.0), 5.0);
        assert_eq!(ratio_pct(10.0, 0.0), 0.0);
        assert_eq!(ratio_pct(0.0, 0.0), 0.0);
    }

    #[test]
    fn test_combine_series_unions_months() {
        let a = vec![p("2026-01", 10.0), p("2026-03", 30.0)];
        let b = vec![p("2026-01", 4.0), p("2026-02", 5.0)];
        assert_eq!(
            combine_series(&a, &b, |x, y| x - y),
            vec![p("2026-01", 6.0), p("2026-02", -5.0), p("2026-03", 30.0)]
        );
    }

    #[test]
    fn test_ratio_series() {
        let num = vec![p("2026-01", 5.0), p("2026-02", 1.0)];
        let den = vec![p("2026-01", 100.0)];
        assert_eq!(
            ratio_series(&num, &den),
            vec![p("2026-01", 5.0), p("2026-02", 0.0)]
        );
    }

    #[test]
    fn test_builtin_registry_covers_database_metrics() {
        use crate::registry::{registry, Source};

        let calcs = CalculatorRegistry::builtin();
        for spec in registry().all_metrics() {
            let db_backed = matches!(
                spec.source,
                Source::Database | Source::DatabaseWithManualFallback
            );
            assert_eq!(calcs.contains(spec.key), db_backed, "{}", spec.key);
        }
    }

    #[test]
    fn test_register_replaces() {
        let mut reg = CalculatorRegistry::new();
        assert!(reg.is_empty());
        let calc = Calculator::new(revenue::mrr_active_series, Rollup::Latest);
        assert!(reg.register(MetricKey::MrrActive, calc).is_none());
        assert!(reg.register(MetricKey::MrrActive, calc).is_some());
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn test_current_value_rollups() {
        let conn = testing::conn();
        conn.execute_batch(
            "INSERT INTO caz_parcelas (tipo_evento, status, valor_pago, data_quitacao) VALUES
                ('RECEITA', 'QUITADO', 100.0, '2026-01-10'),
                ('RECEITA', 'QUITADO', 300.0, '2026-02-10'),
                ('DESPESA', 'QUITADO', 150.0, '2026-02-15');",
        )
        .unwrap();
        let w = testing::year(2026);

        let sum = Calculator::new(finance::revenue_series, Rollup::Sum);
        assert_eq!(sum.current(&conn, &w).unwrap(), 400.0);

        let last = Calculator::new(finance::revenue_series, Rollup::Latest);
        assert_eq!(last.current(&conn, &w).unwrap(), 300.0);

        let margin = Calculator::new(
            finance::margin_pct_series,
            Rollup::Ratio {
                numerator: finance::ebitda_series,
                denominator: finance::revenue_series,
            },
        );
        // (400 - 150) / 400
        assert_eq!(margin.current(&conn, &w).unwrap(), 62.5);

        let empty = testing::year(2024);
        assert_eq!(sum.current(&conn, &empty).unwrap(), 0.0);
        assert_eq!(last.current(&conn, &empty).unwrap(), 0.0);
        assert_eq!(margin.current(&conn, &empty).unwrap(), 0.0);
    }

    #[test]
    fn test_month_ends_stop_at_as_of() {
        use testing::d;

        let w = Window::new(d(2026, 1, 1), d(2026, 12, 31), d(2026, 2, 10));
        assert_eq!(
            month_ends(&w),
            vec![
                ("2026-01".to_string(), d(2026, 1, 31)),
                ("2026-02".to_string(), d(2026, 2, 10)),
            ]
        );
        let future = Window::new(d(2027, 1, 1), d(2027, 12, 31), d(2026, 2, 10));
        assert!(month_ends(&future).is_empty());
    }
}
