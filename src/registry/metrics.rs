use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::metrics::quarter::QuarterAggregation;

/// Every metric the OKR layer knows how to describe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKey {
    MrrActive,
    ActiveClients,
    NewMrr,
    NewMrrYtd,
    ExpansionMrr,
    GrossChurnMrr,
    GrossChurnPct,
    NetChurnMrr,
    LogoChurn,
    NewClients,
    RevenueYtd,
    EbitdaYtd,
    MarginPct,
    CashBalance,
    CashGeneration,
    DelinquencyPct,
    Headcount,
    TechProjectsDelivered,
    TechFreelancersCost,
    TurboohRevenue,
    TurboohVacancyPct,
    StandardizationCompletionPct,
}

impl MetricKey {
    pub const ALL: [MetricKey; 22] = [
        MetricKey::MrrActive,
        MetricKey::ActiveClients,
        MetricKey::NewMrr,
        MetricKey::NewMrrYtd,
        MetricKey::ExpansionMrr,
        MetricKey::GrossChurnMrr,
        MetricKey::GrossChurnPct,
        MetricKey::NetChurnMrr,
        MetricKey::LogoChurn,
        MetricKey::NewClients,
        MetricKey::RevenueYtd,
        MetricKey::EbitdaYtd,
        MetricKey::MarginPct,
        MetricKey::CashBalance,
        MetricKey::CashGeneration,
        MetricKey::DelinquencyPct,
        MetricKey::Headcount,
        MetricKey::TechProjectsDelivered,
        MetricKey::TechFreelancersCost,
        MetricKey::TurboohRevenue,
        MetricKey::TurboohVacancyPct,
        MetricKey::StandardizationCompletionPct,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKey::MrrActive => "mrr_active",
            MetricKey::ActiveClients => "active_clients",
            MetricKey::NewMrr => "new_mrr",
            MetricKey::NewMrrYtd => "new_mrr_ytd",
            MetricKey::ExpansionMrr => "expansion_mrr",
            MetricKey::GrossChurnMrr => "gross_churn_mrr",
            MetricKey::GrossChurnPct => "gross_churn_pct",
            MetricKey::NetChurnMrr => "net_churn_mrr",
            MetricKey::LogoChurn => "logo_churn",
            MetricKey::NewClients => "new_clients",
            MetricKey::RevenueYtd => "revenue_ytd",
            MetricKey::EbitdaYtd => "ebitda_ytd",
            MetricKey::MarginPct => "margin_pct",
            MetricKey::CashBalance => "cash_balance",
            MetricKey::CashGeneration => "cash_generation",
            MetricKey::DelinquencyPct => "delinquency_pct",
            MetricKey::Headcount => "headcount",
            MetricKey::TechProjectsDelivered => "tech_projects_delivered",
            MetricKey::TechFreelancersCost => "tech_freelancers_cost",
            MetricKey::TurboohRevenue => "turbooh_revenue",
            MetricKey::TurboohVacancyPct => "turbooh_vacancy_pct",
            MetricKey::StandardizationCompletionPct => "standardization_completion_pct",
        }
    }
}

impl fmt::Display for MetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        MetricKey::ALL
            .iter()
            .copied()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| Error::UnknownMetric(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Unit {
    Brl,
    Percent,
    Count,
}

impl Unit {
    /// Format a value for display (pt-BR separators).
    pub fn format(&self, value: f64) -> String {
        match self {
            Unit::Brl => {
                let rounded = value.round() as i64;
                if rounded < 0 {
                    format!("-R$ {}", group_thousands(rounded.unsigned_abs()))
                } else {
                    format!("R$ {}", group_thousands(rounded as u64))
                }
            }
            Unit::Percent => format!("{}%", format!("{value:.1}").replace('.', ",")),
            Unit::Count => {
                if value.fract() == 0.0 {
                    let sign = if value < 0.0 { "-" } else { "" };
                    format!("{sign}{}", group_thousands(value.abs() as u64))
                } else {
                    format!("{value:.1}").replace('.', ",")
                }
            }
        }
    }
}

fn group_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push('.');
        }
        out.push(c);
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Higher,
    Lower,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cadence {
    Monthly,
    Quarterly,
    Annual,
    Snapshot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Revenue,
    Retention,
    Finance,
    People,
    Operations,
    Turbooh,
}

impl FromStr for Category {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "revenue" => Ok(Category::Revenue),
            "retention" => Ok(Category::Retention),
            "finance" => Ok(Category::Finance),
            "people" => Ok(Category::People),
            "operations" => Ok(Category::Operations),
            "turbooh" => Ok(Category::Turbooh),
            other => Err(Error::Other(format!("unknown metric category: {other}"))),
        }
    }
}

/// Where a metric's numbers come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    Database,
    /// Database aggregate, replaced by the manual figure when it comes back as zero.
    DatabaseWithManualFallback,
    Initiatives,
    NotInstrumented,
}

/// Static description of a metric: how it is labelled, formatted and rolled up.
#[derive(Debug, Clone, Serialize)]
pub struct MetricSpec {
    pub key: MetricKey,
    pub title: &'static str,
    pub unit: Unit,
    pub direction: Direction,
    pub cadence: Cadence,
    pub category: Category,
    pub required: bool,
    /// `null` is an expected value, not only a failure signal.
    pub nullable: bool,
    pub source: Source,
    pub quarter_aggregation: QuarterAggregation,
}

impl MetricSpec {
    pub fn format(&self, value: f64) -> String {
        self.unit.format(value)
    }

    /// Format an optional value; `None` renders as `-`.
    pub fn format_opt(&self, value: Option<f64>) -> String {
        value.map(|v| self.format(v)).unwrap_or_else(|| "-".to_string())
    }
}

#[allow(clippy::too_many_arguments)]
fn spec(
    key: MetricKey,
    title: &'static str,
    unit: Unit,
    direction: Direction,
    cadence: Cadence,
    category: Category,
    required: bool,
    source: Source,
    quarter_aggregation: QuarterAggregation,
) -> MetricSpec {
    MetricSpec {
        key,
        title,
        unit,
        direction,
        cadence,
        category,
        required,
        nullable: matches!(source, Source::NotInstrumented),
        source,
        quarter_aggregation,
    }
}

/// The built-in metric catalog.
pub fn catalog() -> Vec<MetricSpec> {
    use Cadence::*;
    use Category::*;
    use Direction::*;
    use MetricKey as K;
    use QuarterAggregation::*;
    use Source::*;
    use Unit::*;

    vec![
        spec(K::MrrActive, "MRR Ativo", Brl, Higher, Snapshot, Revenue, true, Database, QuarterEnd),
        spec(K::ActiveClients, "Clientes Ativos", Count, Higher, Snapshot, Revenue, true, Database, QuarterEnd),
        spec(K::NewMrr, "New MRR", Brl, Higher, Monthly, Revenue, true, Database, QuarterSum),
        spec(K::NewMrrYtd, "New MRR YTD", Brl, Higher, Annual, Revenue, false, Database, QuarterSum),
        spec(K::ExpansionMrr, "Expansion MRR", Brl, Higher, Monthly, Retention, false, Database, QuarterSum),
        spec(K::GrossChurnMrr, "Churn Bruto (R$)", Brl, Lower, Monthly, Retention, true, Database, QuarterSum),
        spec(K::GrossChurnPct, "Churn Bruto %", Percent, Lower, Monthly, Retention, true, Database, QuarterAvg),
        spec(K::NetChurnMrr, "Net Churn (R$)", Brl, Lower, Monthly, Retention, false, Database, QuarterSum),
        spec(K::LogoChurn, "Logo Churn", Count, Lower, Monthly, Retention, false, Database, QuarterSum),
        spec(K::NewClients, "Clientes Novos", Count, Higher, Monthly, Revenue, false, Database, QuarterSum),
        spec(K::RevenueYtd, "Receita YTD", Brl, Higher, Annual, Finance, true, Database, QuarterSum),
        spec(K::EbitdaYtd, "EBITDA YTD", Brl, Higher, Annual, Finance, true, Database, QuarterSum),
        spec(K::MarginPct, "Margem EBITDA %", Percent, Higher, Annual, Finance, true, Database, QuarterAvg),
        spec(K::CashBalance, "Caixa Atual", Brl, Higher, Snapshot, Finance, true, Database, QuarterEnd),
        spec(K::CashGeneration, "Geração de Caixa", Brl, Higher, Monthly, Finance, false, Database, QuarterSum),
        spec(K::DelinquencyPct, "Inadimplência %", Percent, Lower, Monthly, Finance, true, Database, QuarterAvg),
        spec(K::Headcount, "Headcount", Count, Higher, Snapshot, People, true, Database, QuarterEnd),
        spec(K::TechProjectsDelivered, "Tech Projetos Entregues", Count, Higher, Quarterly, Operations, false, DatabaseWithManualFallback, QuarterSum),
        spec(K::TechFreelancersCost, "Tech Freelancers Custo", Brl, Lower, Monthly, Operations, false, DatabaseWithManualFallback, QuarterSum),
        spec(K::TurboohRevenue, "TurboOH Receita", Brl, Higher, Monthly, Turbooh, false, NotInstrumented, QuarterSum),
        spec(K::TurboohVacancyPct, "TurboOH Vacância %", Percent, Lower, Quarterly, Turbooh, false, NotInstrumented, QuarterAvg),
        spec(K::StandardizationCompletionPct, "Padronização Concluída %", Percent, Higher, Snapshot, Operations, false, Initiatives, QuarterEnd),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_key_round_trips_through_str() {
        for key in MetricKey::ALL {
            assert_eq!(key.as_str().parse::<MetricKey>().unwrap(), key);
        }
        assert!("mrr_inexistente".parse::<MetricKey>().is_err());
    }

    #[test]
    fn test_metric_key_serializes_snake_case() {
        let json = serde_json::to_string(&MetricKey::StandardizationCompletionPct).unwrap();
        assert_eq!(json, "\"standardization_completion_pct\"");
    }

    #[test]
    fn test_format_brl() {
        assert_eq!(Unit::Brl.format(1_234_567.4), "R$ 1.234.567");
        assert_eq!(Unit::Brl.format(999.0), "R$ 999");
        assert_eq!(Unit::Brl.format(0.0), "R$ 0");
        assert_eq!(Unit::Brl.format(-5_000.0), "-R$ 5.000");
    }

    #[test]
    fn test_format_percent_and_count() {
        assert_eq!(Unit::Percent.format(5.0), "5,0%");
        assert_eq!(Unit::Percent.format(12.345), "12,3%");
        assert_eq!(Unit::Count.format(1500.0), "1.500");
        assert_eq!(Unit::Count.format(10.5), "10,5");
    }

    #[test]
    fn test_catalog_nullable_only_for_uninstrumented() {
        for spec in catalog() {
            assert_eq!(spec.nullable, spec.source == Source::NotInstrumented, "{}", spec.key);
        }
    }
}
