//! MRR, retention and acquisition series.
//!
//! Recurring revenue comes from the latest contract snapshot of each month in
//! `cup_data_hist`. Churn comes from the closing date of cancelled contracts in
//! `cup_contratos`.

use std::collections::HashMap;

use chrono::Datelike;
use rusqlite::{params, Connection};

use super::{
    combine_series, query_series, ratio_pct, ratio_series, Window, ACTIVE_STATUSES,
    CANCELLED_STATUSES,
};
use crate::date_util::{first_of_prior_month, month_key, months_between, prior_month};
use crate::metrics::types::MetricSeriesPoint;

/// `ultimos`: the last snapshot timestamp of each month between ?1 and ?2.
/// `snap`: the active contracts in each of those snapshots.
fn snapshot_cte() -> String {
    format!(
        "WITH ultimos AS (
             SELECT strftime('%Y-%m', data_snapshot) AS mes, MAX(data_snapshot) AS ultimo
             FROM cup_data_hist
             WHERE date(data_snapshot) BETWEEN ?1 AND ?2
             GROUP BY mes
         ),
         snap AS (
             SELECT u.mes, h.id_subtask, h.id_task, h.valorr
             FROM cup_data_hist h
             JOIN ultimos u ON h.data_snapshot = u.ultimo
             WHERE h.status IN ({ACTIVE_STATUSES})
         )"
    )
}

/// Same window, widened to start on the first day of the prior month, so the
/// first month of the original window has a predecessor snapshot.
fn with_prior_month(window: &Window) -> Window {
    Window {
        start: first_of_prior_month(window.start),
        ..*window
    }
}

/// Active MRR of each month's last snapshot. A snapshot with no active
/// contract reads as 0.
pub fn mrr_active_series(conn: &Connection, w: &Window) -> rusqlite::Result<Vec<MetricSeriesPoint>> {
    let sql = format!(
        "{}
         SELECT u.mes, COALESCE(SUM(s.valorr), 0)
         FROM ultimos u
         LEFT JOIN snap s ON s.mes = u.mes
         GROUP BY u.mes
         ORDER BY u.mes",
        snapshot_cte()
    );
    query_series(conn, &sql, params![w.start_key(), w.end_key()])
}

pub fn active_clients_series(
    conn: &Connection,
    w: &Window,
) -> rusqlite::Result<Vec<MetricSeriesPoint>> {
    let sql = format!(
        "{}
         SELECT u.mes, COUNT(DISTINCT s.id_task)
         FROM ultimos u
         LEFT JOIN snap s ON s.mes = u.mes
         GROUP BY u.mes
         ORDER BY u.mes",
        snapshot_cte()
    );
    query_series(conn, &sql, params![w.start_key(), w.end_key()])
}

/// MRR at the start of each month, i.e. the prior month's closing MRR.
pub fn mrr_start_of_month_series(
    conn: &Connection,
    w: &Window,
) -> rusqlite::Result<Vec<MetricSeriesPoint>> {
    let closing: HashMap<String, f64> = mrr_active_series(conn, &with_prior_month(w))?
        .into_iter()
        .map(|p| (p.date, p.value))
        .collect();

    Ok(months_between(w.start, w.end)
        .into_iter()
        .filter_map(|(y, m)| {
            let (py, pm) = prior_month(y, m);
            closing
                .get(&month_key(py, pm))
                .map(|v| MetricSeriesPoint::new(month_key(y, m), *v))
        })
        .collect())
}

/// Contracts present in a month's snapshot that were not in the prior
/// month's. Months whose prior month has no snapshot at all are skipped, so a
/// first-ever snapshot does not count the whole base as new.
pub fn new_mrr_series(conn: &Connection, w: &Window) -> rusqlite::Result<Vec<MetricSeriesPoint>> {
    let sql = format!(
        "{}
         SELECT cur.mes, SUM(cur.valorr)
         FROM snap cur
         WHERE cur.mes >= ?3
           AND EXISTS (
               SELECT 1 FROM ultimos p
               WHERE p.mes = strftime('%Y-%m', cur.mes || '-01', '-1 month'))
           AND NOT EXISTS (
               SELECT 1 FROM snap prev
               WHERE prev.id_subtask = cur.id_subtask
                 AND prev.mes = strftime('%Y-%m', cur.mes || '-01', '-1 month'))
         GROUP BY cur.mes
         ORDER BY cur.mes",
        snapshot_cte()
    );
    let widened = with_prior_month(w);
    query_series(
        conn,
        &sql,
        params![widened.start_key(), w.end_key(), month_of(w)],
    )
}

/// Month-over-month increases of contracts active in both snapshots.
pub fn expansion_mrr_series(
    conn: &Connection,
    w: &Window,
) -> rusqlite::Result<Vec<MetricSeriesPoint>> {
    let sql = format!(
        "{}
         SELECT cur.mes, SUM(MAX(cur.valorr - prev.valorr, 0))
         FROM snap cur
         JOIN snap prev
           ON prev.id_subtask = cur.id_subtask
          AND prev.mes = strftime('%Y-%m', cur.mes || '-01', '-1 month')
         WHERE cur.mes >= ?3
         GROUP BY cur.mes
         ORDER BY cur.mes",
        snapshot_cte()
    );
    let widened = with_prior_month(w);
    query_series(
        conn,
        &sql,
        params![widened.start_key(), w.end_key(), month_of(w)],
    )
}

/// Recurring value of contracts cancelled in each month.
pub fn gross_churn_mrr_series(
    conn: &Connection,
    w: &Window,
) -> rusqlite::Result<Vec<MetricSeriesPoint>> {
    let sql = format!(
        "SELECT strftime('%Y-%m', data_encerramento) AS mes, SUM(valorr)
         FROM cup_contratos
         WHERE status IN ({CANCELLED_STATUSES})
           AND date(data_encerramento) BETWEEN ?1 AND ?2
         GROUP BY mes
         ORDER BY mes"
    );
    query_series(conn, &sql, params![w.start_key(), w.end_key()])
}

/// Gross churn as a percentage of the MRR at the start of the month.
pub fn gross_churn_pct(gross_churn_mrr: f64, mrr_start_of_month: f64) -> f64 {
    ratio_pct(gross_churn_mrr, mrr_start_of_month)
}

pub fn gross_churn_pct_series(
    conn: &Connection,
    w: &Window,
) -> rusqlite::Result<Vec<MetricSeriesPoint>> {
    let churn = gross_churn_mrr_series(conn, w)?;
    let base = mrr_start_of_month_series(conn, w)?;
    Ok(ratio_series(&churn, &base))
}

/// Gross churn net of expansion. Negative when expansion outgrows churn.
pub fn net_churn_mrr_series(
    conn: &Connection,
    w: &Window,
) -> rusqlite::Result<Vec<MetricSeriesPoint>> {
    let churn = gross_churn_mrr_series(conn, w)?;
    let expansion = expansion_mrr_series(conn, w)?;
    Ok(combine_series(&churn, &expansion, |c, e| c - e))
}

/// Clients whose cancelled contracts left them with no active contract.
pub fn logo_churn_series(conn: &Connection, w: &Window) -> rusqlite::Result<Vec<MetricSeriesPoint>> {
    let sql = format!(
        "SELECT strftime('%Y-%m', c.data_encerramento) AS mes, COUNT(DISTINCT c.id_task)
         FROM cup_contratos c
         WHERE c.status IN ({CANCELLED_STATUSES})
           AND date(c.data_encerramento) BETWEEN ?1 AND ?2
           AND NOT EXISTS (
               SELECT 1 FROM cup_contratos a
               WHERE a.id_task = c.id_task
                 AND a.status IN ({ACTIVE_STATUSES}))
         GROUP BY mes
         ORDER BY mes"
    );
    query_series(conn, &sql, params![w.start_key(), w.end_key()])
}

/// Deals won in each month.
pub fn new_clients_series(conn: &Connection, w: &Window) -> rusqlite::Result<Vec<MetricSeriesPoint>> {
    query_series(
        conn,
        "SELECT strftime('%Y-%m', data_fechamento) AS mes, COUNT(*)
         FROM crm_deal
         WHERE stage = 'won'
           AND date(data_fechamento) BETWEEN ?1 AND ?2
         GROUP BY mes
         ORDER BY mes",
        params![w.start_key(), w.end_key()],
    )
}

fn month_of(w: &Window) -> String {
    month_key(w.start.year(), w.start.month())
}

#[cfg(test)]
mod tests {
    use super::super::testing::{conn, d, year};
    use super::*;

    fn p(date: &str, value: f64) -> MetricSeriesPoint {
        MetricSeriesPoint::new(date, value)
    }

    /// Snapshot rows: (snapshot, subtask, task, status, valorr).
    fn snapshots(conn: &Connection, rows: &[(&str, &str, &str, &str, f64)]) {
        for (snapshot, subtask, task, status, value) in rows {
            conn.execute(
                "INSERT INTO cup_data_hist (data_snapshot, id_subtask, id_task, status, valorr)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![snapshot, subtask, task, status, value],
            )
            .unwrap();
        }
    }

    fn contract(conn: &Connection, subtask: &str, task: &str, status: &str, value: f64, closed: Option<&str>) {
        conn.execute(
            "INSERT INTO cup_contratos (id_subtask, id_task, status, valorr, data_encerramento)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![subtask, task, status, value, closed],
        )
        .unwrap();
    }

    #[test]
    fn test_mrr_uses_latest_snapshot_of_month() {
        let conn = conn();
        snapshots(
            &conn,
            &[
                // Early January snapshot is superseded by the later one.
                ("2026-01-05", "s1", "c1", "ativo", 10_000.0),
                ("2026-01-31", "s1", "c1", "ativo", 40_000.0),
                ("2026-01-31", "s2", "c2", "onboarding", 80_000.0),
                ("2026-01-31", "s3", "c3", "cancelado", 99_000.0),
                ("2026-02-28", "s1", "c1", "ativo", 40_000.0),
                ("2026-02-28", "s4", "c1", "triagem", 5_000.0),
            ],
        );
        let w = year(2026);
        assert_eq!(
            mrr_active_series(&conn, &w).unwrap(),
            vec![p("2026-01", 120_000.0), p("2026-02", 45_000.0)]
        );
        assert_eq!(
            active_clients_series(&conn, &w).unwrap(),
            vec![p("2026-01", 2.0), p("2026-02", 1.0)]
        );
    }

    #[test]
    fn test_snapshot_without_active_contracts_reads_zero() {
        let conn = conn();
        snapshots(
            &conn,
            &[
                ("2026-02-28", "s1", "c1", "ativo", 50_000.0),
                ("2026-03-31", "s1", "c1", "cancelado", 50_000.0),
            ],
        );
        let w = Window::new(d(2026, 1, 1), d(2026, 12, 31), d(2026, 4, 15));
        assert_eq!(
            mrr_active_series(&conn, &w).unwrap(),
            vec![p("2026-02", 50_000.0), p("2026-03", 0.0)]
        );
        assert_eq!(
            active_clients_series(&conn, &w).unwrap(),
            vec![p("2026-02", 1.0), p("2026-03", 0.0)]
        );
    }

    #[test]
    fn test_mrr_start_of_month_is_prior_close() {
        let conn = conn();
        snapshots(
            &conn,
            &[
                ("2025-12-31", "s1", "c1", "ativo", 1_000_000.0),
                ("2026-01-31", "s1", "c1", "ativo", 900_000.0),
            ],
        );
        assert_eq!(
            mrr_start_of_month_series(&conn, &year(2026)).unwrap(),
            vec![p("2026-01", 1_000_000.0), p("2026-02", 900_000.0)]
        );
    }

    #[test]
    fn test_gross_churn_pct() {
        assert_eq!(gross_churn_pct(50_000.0, 1_000_000.0), 5.0);
        assert_eq!(gross_churn_pct(50_000.0, 0.0), 0.0);

        let conn = conn();
        snapshots(&conn, &[("2025-12-31", "s1", "c1", "ativo", 1_000_000.0)]);
        contract(&conn, "s9", "c9", "cancelado", 30_000.0, Some("2026-01-10"));
        contract(&conn, "s8", "c8", "encerrado", 20_000.0, Some("2026-01-20"));
        contract(&conn, "s7", "c7", "ativo", 70_000.0, None);

        let w = year(2026);
        assert_eq!(
            gross_churn_mrr_series(&conn, &w).unwrap(),
            vec![p("2026-01", 50_000.0)]
        );
        let pct = gross_churn_pct_series(&conn, &w).unwrap();
        assert_eq!(pct[0], p("2026-01", 5.0));
    }

    #[test]
    fn test_logo_churn_ignores_clients_with_remaining_contracts() {
        let conn = conn();
        contract(&conn, "s1", "c1", "cancelado", 10_000.0, Some("2026-03-05"));
        contract(&conn, "s2", "c1", "ativo", 10_000.0, None);
        contract(&conn, "s3", "c2", "cancelado", 10_000.0, Some("2026-03-10"));
        contract(&conn, "s4", "c2", "encerrado", 5_000.0, Some("2026-03-11"));
        contract(&conn, "s5", "c3", "cancelado", 10_000.0, Some("2025-03-11"));
        assert_eq!(
            logo_churn_series(&conn, &year(2026)).unwrap(),
            vec![p("2026-03", 1.0)]
        );
    }

    #[test]
    fn test_new_and_expansion_mrr() {
        let conn = conn();
        snapshots(
            &conn,
            &[
                ("2025-12-31", "s1", "c1", "ativo", 10_000.0),
                ("2026-01-31", "s1", "c1", "ativo", 12_000.0),
                ("2026-01-31", "s2", "c2", "onboarding", 8_000.0),
                ("2026-02-28", "s1", "c1", "ativo", 11_000.0),
                ("2026-02-28", "s2", "c2", "ativo", 8_000.0),
            ],
        );
        let w = year(2026);
        assert_eq!(new_mrr_series(&conn, &w).unwrap(), vec![p("2026-01", 8_000.0)]);
        // February's decrease is not negative expansion.
        assert_eq!(
            expansion_mrr_series(&conn, &w).unwrap(),
            vec![p("2026-01", 2_000.0), p("2026-02", 0.0)]
        );
    }

    #[test]
    fn test_first_snapshot_is_not_new_mrr() {
        let conn = conn();
        snapshots(&conn, &[("2026-01-31", "s1", "c1", "ativo", 10_000.0)]);
        assert!(new_mrr_series(&conn, &year(2026)).unwrap().is_empty());
    }

    #[test]
    fn test_net_churn_nets_expansion() {
        let conn = conn();
        snapshots(
            &conn,
            &[
                ("2025-12-31", "s1", "c1", "ativo", 10_000.0),
                ("2026-01-31", "s1", "c1", "ativo", 13_000.0),
            ],
        );
        contract(&conn, "s9", "c9", "cancelado", 5_000.0, Some("2026-01-15"));
        contract(&conn, "s8", "c8", "cancelado", 1_000.0, Some("2026-02-15"));
        assert_eq!(
            net_churn_mrr_series(&conn, &year(2026)).unwrap(),
            vec![p("2026-01", 2_000.0), p("2026-02", 1_000.0)]
        );
    }

    #[test]
    fn test_new_clients_counts_won_deals() {
        let conn = conn();
        conn.execute_batch(
            "INSERT INTO crm_deal (stage, data_fechamento) VALUES
                ('won', '2026-04-02'), ('won', '2026-04-28'),
                ('lost', '2026-04-10'), ('won', '2026-05-01');",
        )
        .unwrap();
        let w = Window::new(d(2026, 4, 1), d(2026, 4, 30), d(2026, 4, 30));
        assert_eq!(new_clients_series(&conn, &w).unwrap(), vec![p("2026-04", 2.0)]);
    }
}
