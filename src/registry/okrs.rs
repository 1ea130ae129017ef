use serde::Serialize;

use super::metrics::{Cadence, Direction, MetricKey, Unit};

/// A strategic goal that groups key results.
#[derive(Debug, Clone, Serialize)]
pub struct Objective {
    pub id: &'static str,
    pub title: &'static str,
    pub owner: &'static str,
    pub narrative: &'static str,
    pub order: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Operator {
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = "=")]
    Eq,
}

impl Operator {
    pub fn symbol(&self) -> &'static str {
        match self {
            Operator::Ge => ">=",
            Operator::Le => "<=",
            Operator::Eq => "=",
        }
    }

    /// Whether this operator can be paired with `direction`.
    pub fn agrees_with(&self, direction: Direction) -> bool {
        matches!(
            (self, direction),
            (Operator::Ge, Direction::Higher) | (Operator::Le, Direction::Lower) | (Operator::Eq, _)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum KrStatus {
    Active,
    Instrumentation,
    Planned,
}

/// Which configured target a KR was compared against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TargetPeriod {
    Q1,
    Q2,
    Q3,
    Q4,
    #[serde(rename = "annual")]
    Annual,
    #[serde(rename = "monthly")]
    Monthly,
}

impl TargetPeriod {
    pub fn quarter(q: u8) -> Self {
        match q {
            1 => TargetPeriod::Q1,
            2 => TargetPeriod::Q2,
            3 => TargetPeriod::Q3,
            _ => TargetPeriod::Q4,
        }
    }
}

/// Target values keyed by period. Unset periods are `None`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Targets {
    #[serde(rename = "Q1", skip_serializing_if = "Option::is_none")]
    pub q1: Option<f64>,
    #[serde(rename = "Q2", skip_serializing_if = "Option::is_none")]
    pub q2: Option<f64>,
    #[serde(rename = "Q3", skip_serializing_if = "Option::is_none")]
    pub q3: Option<f64>,
    #[serde(rename = "Q4", skip_serializing_if = "Option::is_none")]
    pub q4: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annual: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub monthly: Option<f64>,
}

impl Targets {
    pub fn get(&self, period: TargetPeriod) -> Option<f64> {
        match period {
            TargetPeriod::Q1 => self.q1,
            TargetPeriod::Q2 => self.q2,
            TargetPeriod::Q3 => self.q3,
            TargetPeriod::Q4 => self.q4,
            TargetPeriod::Annual => self.annual,
            TargetPeriod::Monthly => self.monthly,
        }
    }

    /// Target for the given quarter: the quarter's own value, then the
    /// monthly value, then annual, then Q4.
    pub fn resolve(&self, quarter: u8) -> Option<(TargetPeriod, f64)> {
        [
            TargetPeriod::quarter(quarter),
            TargetPeriod::Monthly,
            TargetPeriod::Annual,
            TargetPeriod::Q4,
        ]
        .into_iter()
        .find_map(|p| self.get(p).map(|v| (p, v)))
    }

    pub fn is_empty(&self) -> bool {
        [self.q1, self.q2, self.q3, self.q4, self.annual, self.monthly]
            .iter()
            .all(Option::is_none)
    }
}

/// A key result: a measurable target tied to one objective and one metric.
#[derive(Debug, Clone, Serialize)]
pub struct Kr {
    pub id: &'static str,
    pub objective_id: &'static str,
    pub title: &'static str,
    pub metric_key: MetricKey,
    pub operator: Operator,
    pub cadence: Cadence,
    pub targets: Targets,
    pub owner: &'static str,
    pub status: KrStatus,
    pub unit: Unit,
    pub direction: Direction,
}

pub fn objectives() -> Vec<Objective> {
    vec![
        Objective {
            id: "O1",
            title: "Crescer a receita recorrente",
            owner: "CEO",
            narrative: "Aumentar o MRR com novos contratos sem abrir mão da qualidade da carteira.",
            order: 1,
        },
        Objective {
            id: "O2",
            title: "Reter e expandir a base de clientes",
            owner: "Head de CS",
            narrative: "Reduzir cancelamentos e crescer dentro das contas existentes.",
            order: 2,
        },
        Objective {
            id: "O3",
            title: "Eficiência financeira e caixa",
            owner: "CFO",
            narrative: "Operar com margem saudável, caixa protegido e inadimplência sob controle.",
            order: 3,
        },
        Objective {
            id: "O4",
            title: "Escalar operação e time",
            owner: "COO",
            narrative: "Dimensionar o time, padronizar entregas e profissionalizar a frente Tech.",
            order: 4,
        },
        Objective {
            id: "O5",
            title: "Validar o TurboOH",
            owner: "Head TurboOH",
            narrative: "Provar a tese de mídia OOH antes de escalar investimento.",
            order: 5,
        },
    ]
}

fn quarters(q1: f64, q2: f64, q3: f64, q4: f64) -> Targets {
    Targets {
        q1: Some(q1),
        q2: Some(q2),
        q3: Some(q3),
        q4: Some(q4),
        ..Targets::default()
    }
}

pub fn key_results() -> Vec<Kr> {
    use Cadence::*;
    use Direction::*;
    use KrStatus::*;
    use MetricKey as K;
    use Operator::{Ge, Le};

    vec![
        Kr {
            id: "KR1.1",
            objective_id: "O1",
            title: "MRR ativo no fim do trimestre",
            metric_key: K::MrrActive,
            operator: Ge,
            cadence: Quarterly,
            targets: Targets {
                annual: Some(1_650_000.0),
                ..quarters(1_200_000.0, 1_350_000.0, 1_500_000.0, 1_650_000.0)
            },
            owner: "CEO",
            status: Active,
            unit: Unit::Brl,
            direction: Higher,
        },
        Kr {
            id: "KR1.2",
            objective_id: "O1",
            title: "New MRR acumulado no ano",
            metric_key: K::NewMrrYtd,
            operator: Ge,
            cadence: Annual,
            targets: Targets {
                annual: Some(900_000.0),
                ..quarters(200_000.0, 430_000.0, 660_000.0, 900_000.0)
            },
            owner: "Head Comercial",
            status: Active,
            unit: Unit::Brl,
            direction: Higher,
        },
        Kr {
            id: "KR1.3",
            objective_id: "O1",
            title: "Clientes novos por mês",
            metric_key: K::NewClients,
            operator: Ge,
            cadence: Monthly,
            targets: Targets {
                monthly: Some(12.0),
                ..Targets::default()
            },
            owner: "Head Comercial",
            status: Active,
            unit: Unit::Count,
            direction: Higher,
        },
        Kr {
            id: "KR2.1",
            objective_id: "O2",
            title: "Churn bruto mensal",
            metric_key: K::GrossChurnPct,
            operator: Le,
            cadence: Monthly,
            targets: quarters(5.0, 4.5, 4.0, 3.5),
            owner: "Head de CS",
            status: Active,
            unit: Unit::Percent,
            direction: Lower,
        },
        Kr {
            id: "KR2.2",
            objective_id: "O2",
            title: "Net churn mensal (R$)",
            metric_key: K::NetChurnMrr,
            operator: Le,
            cadence: Monthly,
            targets: Targets {
                monthly: Some(20_000.0),
                ..Targets::default()
            },
            owner: "Head de CS",
            status: Active,
            unit: Unit::Brl,
            direction: Lower,
        },
        Kr {
            id: "KR2.3",
            objective_id: "O2",
            title: "Expansion MRR mensal",
            metric_key: K::ExpansionMrr,
            operator: Ge,
            cadence: Monthly,
            targets: Targets {
                monthly: Some(30_000.0),
                ..Targets::default()
            },
            owner: "Head de CS",
            status: Active,
            unit: Unit::Brl,
            direction: Higher,
        },
        Kr {
            id: "KR2.4",
            objective_id: "O2",
            title: "Logo churn mensal",
            metric_key: K::LogoChurn,
            operator: Le,
            cadence: Monthly,
            targets: Targets {
                monthly: Some(3.0),
                ..Targets::default()
            },
            owner: "Head de CS",
            status: Active,
            unit: Unit::Count,
            direction: Lower,
        },
        Kr {
            id: "KR3.1",
            objective_id: "O3",
            title: "Margem EBITDA acumulada",
            metric_key: K::MarginPct,
            operator: Ge,
            cadence: Annual,
            targets: Targets {
                annual: Some(20.0),
                ..quarters(15.0, 17.0, 19.0, 20.0)
            },
            owner: "CFO",
            status: Active,
            unit: Unit::Percent,
            direction: Higher,
        },
        Kr {
            id: "KR3.2",
            objective_id: "O3",
            title: "Caixa mínimo em conta",
            metric_key: K::CashBalance,
            operator: Ge,
            cadence: Snapshot,
            targets: quarters(800_000.0, 900_000.0, 1_000_000.0, 1_200_000.0),
            owner: "CFO",
            status: Active,
            unit: Unit::Brl,
            direction: Higher,
        },
        Kr {
            id: "KR3.3",
            objective_id: "O3",
            title: "Inadimplência mensal",
            metric_key: K::DelinquencyPct,
            operator: Le,
            cadence: Monthly,
            targets: Targets {
                annual: Some(5.0),
                ..Targets::default()
            },
            owner: "CFO",
            status: Active,
            unit: Unit::Percent,
            direction: Lower,
        },
        Kr {
            id: "KR3.4",
            objective_id: "O3",
            title: "Receita acumulada no ano",
            metric_key: K::RevenueYtd,
            operator: Ge,
            cadence: Annual,
            targets: Targets {
                annual: Some(18_000_000.0),
                ..quarters(4_000_000.0, 8_500_000.0, 13_000_000.0, 18_000_000.0)
            },
            owner: "CFO",
            status: Active,
            unit: Unit::Brl,
            direction: Higher,
        },
        Kr {
            id: "KR4.1",
            objective_id: "O4",
            title: "Time dimensionado",
            metric_key: K::Headcount,
            operator: Ge,
            cadence: Snapshot,
            targets: quarters(60.0, 65.0, 70.0, 75.0),
            owner: "COO",
            status: Active,
            unit: Unit::Count,
            direction: Higher,
        },
        Kr {
            id: "KR4.2",
            objective_id: "O4",
            title: "Projetos Tech entregues no trimestre",
            metric_key: K::TechProjectsDelivered,
            operator: Ge,
            cadence: Quarterly,
            targets: quarters(8.0, 10.0, 12.0, 12.0),
            owner: "Head Tech",
            status: Instrumentation,
            unit: Unit::Count,
            direction: Higher,
        },
        Kr {
            id: "KR4.3",
            objective_id: "O4",
            title: "Custo mensal com freelancers Tech",
            metric_key: K::TechFreelancersCost,
            operator: Le,
            cadence: Monthly,
            targets: Targets {
                monthly: Some(40_000.0),
                ..Targets::default()
            },
            owner: "Head Tech",
            status: Instrumentation,
            unit: Unit::Brl,
            direction: Lower,
        },
        Kr {
            id: "KR4.4",
            objective_id: "O4",
            title: "Iniciativas de padronização concluídas",
            metric_key: K::StandardizationCompletionPct,
            operator: Ge,
            cadence: Quarterly,
            targets: Targets {
                annual: Some(100.0),
                ..quarters(25.0, 50.0, 75.0, 100.0)
            },
            owner: "COO",
            status: Active,
            unit: Unit::Percent,
            direction: Higher,
        },
        Kr {
            id: "KR5.1",
            objective_id: "O5",
            title: "Receita mensal TurboOH",
            metric_key: K::TurboohRevenue,
            operator: Ge,
            cadence: Monthly,
            targets: Targets {
                monthly: Some(100_000.0),
                ..Targets::default()
            },
            owner: "Head TurboOH",
            status: Planned,
            unit: Unit::Brl,
            direction: Higher,
        },
        Kr {
            id: "KR5.2",
            objective_id: "O5",
            title: "Vacância do inventário TurboOH",
            metric_key: K::TurboohVacancyPct,
            operator: Le,
            cadence: Quarterly,
            targets: Targets {
                annual: Some(30.0),
                ..Targets::default()
            },
            owner: "Head TurboOH",
            status: Planned,
            unit: Unit::Percent,
            direction: Lower,
        },
    ]
}
