//! Cash-basis finance series from ERP installments (`caz_parcelas`) and bank
//! balances (`caz_bancos`).

use rusqlite::{params, Connection};

use super::{month_ends, query_series, ratio_series, Window};
use crate::date_util::date_key;
use crate::metrics::types::MetricSeriesPoint;

/// Categories below the EBITDA line: financing, investment and income tax.
pub const NON_OPERATING_CATEGORIES: &str =
    "'Distribuição de Lucros', 'Investimentos', 'Empréstimos', 'Juros', 'IRPJ/CSLL'";

/// Expense category for contracted tech freelancers.
pub const FREELANCERS_TECH_CATEGORY: &str = "Freelancers Tech";

const SIGNED_SETTLED: &str =
    "SUM(CASE WHEN tipo_evento = 'RECEITA' THEN valor_pago ELSE -valor_pago END)";

/// Settled receipts by settlement month.
pub fn revenue_series(conn: &Connection, w: &Window) -> rusqlite::Result<Vec<MetricSeriesPoint>> {
    query_series(
        conn,
        "SELECT strftime('%Y-%m', data_quitacao) AS mes, SUM(valor_pago)
         FROM caz_parcelas
         WHERE tipo_evento = 'RECEITA'
           AND status = 'QUITADO'
           AND date(data_quitacao) BETWEEN ?1 AND ?2
         GROUP BY mes
         ORDER BY mes",
        params![w.start_key(), w.end_key()],
    )
}

/// Settled operating receipts minus settled operating expenses.
pub fn ebitda_series(conn: &Connection, w: &Window) -> rusqlite::Result<Vec<MetricSeriesPoint>> {
    let sql = format!(
        "SELECT strftime('%Y-%m', data_quitacao) AS mes, {SIGNED_SETTLED}
         FROM caz_parcelas
         WHERE status = 'QUITADO'
           AND tipo_evento IN ('RECEITA', 'DESPESA')
           AND COALESCE(categoria, '') NOT IN ({NON_OPERATING_CATEGORIES})
           AND date(data_quitacao) BETWEEN ?1 AND ?2
         GROUP BY mes
         ORDER BY mes"
    );
    query_series(conn, &sql, params![w.start_key(), w.end_key()])
}

pub fn margin_pct_series(conn: &Connection, w: &Window) -> rusqlite::Result<Vec<MetricSeriesPoint>> {
    let ebitda = ebitda_series(conn, w)?;
    let revenue = revenue_series(conn, w)?;
    Ok(ratio_series(&ebitda, &revenue))
}

/// Net settled cash flow, every category included.
pub fn cash_generation_series(
    conn: &Connection,
    w: &Window,
) -> rusqlite::Result<Vec<MetricSeriesPoint>> {
    let sql = format!(
        "SELECT strftime('%Y-%m', data_quitacao) AS mes, {SIGNED_SETTLED}
         FROM caz_parcelas
         WHERE status = 'QUITADO'
           AND tipo_evento IN ('RECEITA', 'DESPESA')
           AND date(data_quitacao) BETWEEN ?1 AND ?2
         GROUP BY mes
         ORDER BY mes"
    );
    query_series(conn, &sql, params![w.start_key(), w.end_key()])
}

/// Month-end bank balance of active accounts, reconstructed from the balance
/// recorded on their latest `data_atualizacao` by undoing (or replaying) the
/// cash settled between that date and each month end. Accounts with no
/// recorded date are taken as current on `as_of`. Empty when no active
/// account exists.
pub fn cash_balance_series(
    conn: &Connection,
    w: &Window,
) -> rusqlite::Result<Vec<MetricSeriesPoint>> {
    let (balance, accounts, recorded): (f64, i64, Option<String>) = conn.query_row(
        "SELECT COALESCE(SUM(saldo), 0), COUNT(*), MAX(date(data_atualizacao))
         FROM caz_bancos WHERE ativo = 1",
        [],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
    )?;
    if accounts == 0 {
        return Ok(Vec::new());
    }
    let balance_date = recorded.unwrap_or_else(|| date_key(w.as_of));

    let sql = format!(
        "SELECT COALESCE({SIGNED_SETTLED}, 0)
         FROM caz_parcelas
         WHERE status = 'QUITADO'
           AND tipo_evento IN ('RECEITA', 'DESPESA')
           AND date(data_quitacao) > ?1
           AND date(data_quitacao) <= ?2"
    );
    let mut stmt = conn.prepare(&sql)?;

    month_ends(w)
        .into_iter()
        .map(|(key, month_end)| {
            let month_end = date_key(month_end);
            let value = if month_end <= balance_date {
                let settled: f64 =
                    stmt.query_row(params![month_end, balance_date], |row| row.get(0))?;
                balance - settled
            } else {
                let settled: f64 =
                    stmt.query_row(params![balance_date, month_end], |row| row.get(0))?;
                balance + settled
            };
            Ok(MetricSeriesPoint::new(key, value))
        })
        .collect()
}

/// Receivables past due, by due month.
pub fn overdue_receivables_series(
    conn: &Connection,
    w: &Window,
) -> rusqlite::Result<Vec<MetricSeriesPoint>> {
    query_series(
        conn,
        "SELECT strftime('%Y-%m', data_vencimento) AS mes, SUM(valor_bruto)
         FROM caz_parcelas
         WHERE tipo_evento = 'RECEITA'
           AND status = 'ATRASADO'
           AND date(data_vencimento) BETWEEN ?1 AND ?2
         GROUP BY mes
         ORDER BY mes",
        params![w.start_key(), w.end_key()],
    )
}

/// Every non-cancelled receivable, by due month.
pub fn billed_receivables_series(
    conn: &Connection,
    w: &Window,
) -> rusqlite::Result<Vec<MetricSeriesPoint>> {
    query_series(
        conn,
        "SELECT strftime('%Y-%m', data_vencimento) AS mes, SUM(valor_bruto)
         FROM caz_parcelas
         WHERE tipo_evento = 'RECEITA'
           AND status <> 'CANCELADO'
           AND date(data_vencimento) BETWEEN ?1 AND ?2
         GROUP BY mes
         ORDER BY mes",
        params![w.start_key(), w.end_key()],
    )
}

pub fn delinquency_pct_series(
    conn: &Connection,
    w: &Window,
) -> rusqlite::Result<Vec<MetricSeriesPoint>> {
    let overdue = overdue_receivables_series(conn, w)?;
    let billed = billed_receivables_series(conn, w)?;
    Ok(ratio_series(&overdue, &billed))
}

pub fn tech_freelancers_cost_series(
    conn: &Connection,
    w: &Window,
) -> rusqlite::Result<Vec<MetricSeriesPoint>> {
    query_series(
        conn,
        "SELECT strftime('%Y-%m', data_quitacao) AS mes, SUM(valor_pago)
         FROM caz_parcelas
         WHERE tipo_evento = 'DESPESA'
           AND status = 'QUITADO'
           AND categoria = ?3
           AND date(data_quitacao) BETWEEN ?1 AND ?2
         GROUP BY mes
         ORDER BY mes",
        params![w.start_key(), w.end_key(), FREELANCERS_TECH_CATEGORY],
    )
}
