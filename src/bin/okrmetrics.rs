use std::path::PathBuf;

use chrono::{Datelike, NaiveDate};
use clap::{Parser, Subcommand};

use okrmetrics::period::check_year;
use okrmetrics::registry::{registry, Category};
use okrmetrics::{
    DashboardMetrics, KrProgress, MetricKey, ObjectiveProgress, OkrMetrics, Period,
    QuarterAggregation, Settings,
};

#[derive(Parser)]
#[command(name = "okrmetrics", about = "OKR metrics over the operational warehouse")]
struct Cli {
    /// Warehouse database path (default: ~/.okrmetrics/warehouse.db)
    #[arg(long)]
    db: Option<PathBuf>,

    /// Directory holding manual_metrics.json and initiatives.json (default: ~/.okrmetrics)
    #[arg(long)]
    config_dir: Option<PathBuf>,

    /// Increase logging verbosity
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Current value of every metric
    Dashboard {
        /// Evaluate as of this date (YYYY-MM-DD, default: today)
        #[arg(long)]
        as_of: Option<NaiveDate>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Current value of one metric
    Value {
        /// Metric key, e.g. mrr_active
        key: MetricKey,
        #[arg(long)]
        as_of: Option<NaiveDate>,
        #[arg(long)]
        json: bool,
    },
    /// Monthly series of one metric
    Series {
        key: MetricKey,
        /// Period: 2026, 2026-Q1, 2026-03, 90d, ytd, qtd, mtd
        #[arg(long, conflicts_with_all = ["from", "to"])]
        period: Option<String>,
        /// Start date (YYYY-MM-DD, default: January 1st)
        #[arg(long)]
        from: Option<NaiveDate>,
        /// End date (YYYY-MM-DD, default: today)
        #[arg(long)]
        to: Option<NaiveDate>,
        #[arg(long)]
        json: bool,
    },
    /// Quarterly figures of one metric
    Quarters {
        key: MetricKey,
        /// Year (default: current year)
        #[arg(long)]
        year: Option<i32>,
        /// quarter_end, quarter_sum, quarter_avg, quarter_max or quarter_min
        /// (default: the metric's own)
        #[arg(long)]
        agg: Option<QuarterAggregation>,
        #[arg(long)]
        json: bool,
    },
    /// Quarterly summary of all tracked metrics
    Summary {
        #[arg(long)]
        year: Option<i32>,
        #[arg(long)]
        agg: Option<QuarterAggregation>,
        #[arg(long)]
        json: bool,
    },
    /// Progress of one key result
    Kr {
        /// KR id, e.g. KR2.1
        id: String,
        #[arg(long)]
        as_of: Option<NaiveDate>,
        #[arg(long)]
        json: bool,
    },
    /// Progress of every objective (or one)
    Okrs {
        /// Only this objective, e.g. O2
        #[arg(long)]
        objective: Option<String>,
        #[arg(long)]
        as_of: Option<NaiveDate>,
        #[arg(long)]
        json: bool,
    },
    /// List metric definitions
    Catalog {
        /// revenue, retention, finance, people, operations, turbooh
        #[arg(long)]
        category: Option<Category>,
        /// Required metrics only
        #[arg(long)]
        required: bool,
        #[arg(long)]
        json: bool,
    },
    /// Show warehouse and configuration status
    Status,
}

fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

fn settings(cli: &Cli) -> anyhow::Result<Settings> {
    let dir = match &cli.config_dir {
        Some(dir) => dir.clone(),
        None => Settings::default_dir()?,
    };
    let mut settings = Settings::in_dir(dir);
    if let Some(db) = &cli.db {
        settings = settings.with_db_path(db);
    }
    Ok(settings)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let settings = settings(&cli)?;

    // The catalog needs no database.
    if let Commands::Catalog {
        category,
        required,
        json,
    } = cli.command
    {
        return print_catalog(category, required, json);
    }

    let okr = OkrMetrics::open(&settings).await?;

    match cli.command {
        Commands::Dashboard { as_of, json } => {
            let dashboard = okr.dashboard_metrics_as_of(as_of.unwrap_or_else(today)).await;
            if json {
                println!("{}", serde_json::to_string_pretty(&dashboard)?);
            } else {
                print_dashboard(&dashboard);
            }
        }
        Commands::Value { key, as_of, json } => {
            let value = okr.metric_value_as_of(key, as_of.unwrap_or_else(today)).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&value)?);
            } else {
                let title = registry().metric_spec(key).map(|s| s.title).unwrap_or("");
                println!("{title} ({key}, {})", value.period);
                println!("  Value: {}", value.formatted.as_deref().unwrap_or("-"));
                if value.manual {
                    println!("  Source: manual_metrics.json");
                }
            }
        }
        Commands::Series {
            key,
            period,
            from,
            to,
            json,
        } => {
            let (start, end) = match period {
                Some(p) => Period::parse(&p)?.date_range()?,
                None => {
                    let end = to.unwrap_or_else(today);
                    let start = from
                        .or_else(|| NaiveDate::from_ymd_opt(end.year(), 1, 1))
                        .ok_or_else(|| anyhow::anyhow!("invalid --to date"))?;
                    (start, end)
                }
            };
            let series = okr.metric_series(key, start, end).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&series)?);
            } else {
                let spec = registry().metric_spec(key);
                println!("{key}: {start} .. {end}");
                if series.is_empty() {
                    println!("  No data in range");
                }
                for p in &series {
                    let formatted = spec.map(|s| s.format(p.value)).unwrap_or_else(|| p.value.to_string());
                    println!("  {}  {formatted}", p.date);
                }
            }
        }
        Commands::Quarters {
            key,
            year,
            agg,
            json,
        } => {
            let year = check_year(year.unwrap_or_else(|| today().year()))?;
            let spec = registry()
                .metric_spec(key)
                .ok_or_else(|| anyhow::anyhow!("no definition for {key}"))?;
            let agg = agg.unwrap_or(spec.quarter_aggregation);
            let q = okr.quarter_agg(key, year, agg).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&q)?);
            } else {
                println!("{} {year} ({agg})", spec.title);
                for quarter in 1..=4 {
                    println!("  Q{quarter}: {}", spec.format_opt(q.get(quarter)));
                }
            }
        }
        Commands::Summary { year, agg, json } => {
            let year = check_year(year.unwrap_or_else(|| today().year()))?;
            let summary = okr.quarter_summary(year, agg).await;
            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                println!("Quarterly summary {year}");
                for m in &summary {
                    let spec = registry().metric_spec(m.metric_key);
                    let fmt = |v: Option<f64>| {
                        spec.map(|s| s.format_opt(v)).unwrap_or_else(|| "-".to_string())
                    };
                    println!(
                        "  {:<28} {:>14} {:>14} {:>14} {:>14}  {:?}",
                        m.title,
                        fmt(m.quarters.q1),
                        fmt(m.quarters.q2),
                        fmt(m.quarters.q3),
                        fmt(m.quarters.q4),
                        m.status
                    );
                }
            }
        }
        Commands::Kr { id, as_of, json } => {
            let progress = okr.kr_progress_as_of(&id, as_of.unwrap_or_else(today)).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&progress)?);
            } else {
                print_kr(&progress);
            }
        }
        Commands::Okrs {
            objective,
            as_of,
            json,
        } => {
            let as_of = as_of.unwrap_or_else(today);
            let objectives = match objective {
                Some(id) => vec![okr.objective_progress_as_of(&id, as_of).await?],
                None => okr.okr_overview_as_of(as_of).await.objectives,
            };
            if json {
                println!("{}", serde_json::to_string_pretty(&objectives)?);
            } else {
                for o in &objectives {
                    print_objective(o);
                }
            }
        }
        Commands::Status => print_status(&okr, &settings).await?,
        Commands::Catalog { .. } => unreachable!("handled before opening the warehouse"),
    }

    Ok(())
}

fn print_catalog(category: Option<Category>, required: bool, json: bool) -> anyhow::Result<()> {
    let reg = registry();
    let specs: Vec<_> = match category {
        Some(c) => reg.metrics_by_category(c),
        None => reg.all_metrics(),
    }
    .into_iter()
    .filter(|s| !required || s.required)
    .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&specs)?);
    } else {
        for s in specs {
            println!(
                "  {:<32} {:<28} {:?}/{:?}/{:?}{}",
                s.key.as_str(),
                s.title,
                s.unit,
                s.direction,
                s.cadence,
                if s.required { "  required" } else { "" }
            );
        }
    }
    Ok(())
}

fn print_dashboard(d: &DashboardMetrics) {
    println!("Dashboard as of {}", d.as_of);
    for spec in registry().all_metrics() {
        let Some(m) = d.get(spec.key) else { continue };
        let value = m.formatted.as_deref().unwrap_or("-");
        let note = match (&m.error, m.manual) {
            (Some(_), _) => "  (failed)",
            (None, true) => "  (manual)",
            _ => "",
        };
        println!("  {:<28} {:>16}{note}", spec.title, value);
    }
    let failures = d.failures();
    if !failures.is_empty() {
        println!("  {} metric(s) failed, run with -v for details", failures.len());
    }
}

fn print_kr(kr: &KrProgress) {
    let progress = kr
        .progress
        .map(|p| format!("{p:.0}%"))
        .unwrap_or_else(|| "-".to_string());
    println!("  {:<6} {:<44} {:>6}  {}", kr.kr_id, kr.title, progress, kr.status.as_str());
    println!(
        "         actual {} {} target {}",
        kr.formatted_actual, kr.operator, kr.formatted_target
    );
    if let Some(ref err) = kr.error {
        println!("         error: {err}");
    }
}

fn print_objective(o: &ObjectiveProgress) {
    let progress = o
        .progress
        .map(|p| format!("{p:.0}%"))
        .unwrap_or_else(|| "-".to_string());
    println!("{} {} ({progress}, {})", o.objective.id, o.objective.title, o.status.as_str());
    for kr in &o.key_results {
        print_kr(kr);
    }
}

async fn print_status(okr: &OkrMetrics, settings: &Settings) -> anyhow::Result<()> {
    let counts = okr.db().table_counts().await?;
    println!("Warehouse: {}", settings.db_path.display());
    for (table, n) in counts {
        println!("  {table:<14} {n}");
    }
    println!("Configuration:");
    println!(
        "  Manual metrics: {} ({})",
        okr.manual_metrics().metrics.len(),
        settings.manual_metrics_path.display()
    );
    println!(
        "  Initiatives:    {} ({})",
        okr.initiatives().len(),
        settings.initiatives_path.display()
    );
    let reg = registry();
    println!("Catalog:");
    println!("  Objectives:  {}", reg.all_objectives().len());
    println!("  Key results: {}", reg.all_krs().len());
    println!(
        "  Metrics:     {} ({} with calculators)",
        reg.all_metrics().len(),
        okr.calculators().len()
    );
    Ok(())
}
