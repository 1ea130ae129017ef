//! Headcount and delivery series.

use rusqlite::{params, Connection};

use super::{month_ends, query_series, Window};
use crate::date_util::date_key;
use crate::metrics::types::MetricSeriesPoint;

/// People employed at each month end (the current month ends at `as_of`).
/// Months before anyone was ever hired are omitted; a month after everyone
/// left reads as 0.
pub fn headcount_series(conn: &Connection, w: &Window) -> rusqlite::Result<Vec<MetricSeriesPoint>> {
    let mut stmt = conn.prepare(
        "SELECT COUNT(*),
                COALESCE(SUM(CASE WHEN demissao IS NULL OR demissao = ''
                                       OR date(demissao) > ?1 THEN 1 ELSE 0 END), 0)
         FROM rh_pessoal
         WHERE admissao IS NOT NULL
           AND date(admissao) <= ?1",
    )?;

    let mut points = Vec::new();
    for (key, month_end) in month_ends(w) {
        let (hired, employed): (i64, i64) = stmt
            .query_row(params![date_key(month_end)], |row| Ok((row.get(0)?, row.get(1)?)))?;
        if hired > 0 {
            points.push(MetricSeriesPoint::new(key, employed as f64));
        }
    }
    Ok(points)
}

/// Tech-product contracts delivered in each month.
pub fn tech_projects_delivered_series(
    conn: &Connection,
    w: &Window,
) -> rusqlite::Result<Vec<MetricSeriesPoint>> {
    query_series(
        conn,
        "SELECT strftime('%Y-%m', data_entrega) AS mes, COUNT(*)
         FROM cup_contratos
         WHERE produto = 'tech'
           AND date(data_entrega) BETWEEN ?1 AND ?2
         GROUP BY mes
         ORDER BY mes",
        params![w.start_key(), w.end_key()],
    )
}
