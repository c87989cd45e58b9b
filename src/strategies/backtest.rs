use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use crate::data::sources::ResultStore;
use crate::execution::types::{BacktestRow, HistoryFilter};
use crate::strategies::types::Signal;

/// Descriptive statistics over prior analyses. Recomputed per request, never stored.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BacktestSummary {
    pub total: usize,
    pub pass_rate: f64,
    pub watch_rate: f64,
    pub avg_edge: Option<f64>,
    pub avg_ev_net: Option<f64>,
    pub avg_p_model: Option<f64>,
    /// Sum of net EV over PASS rows: total EV had every PASS been taken.
    pub hypothetical_return: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BacktestReport {
    pub baseline_id: i64,
    pub summary: BacktestSummary,
    pub rows: Vec<BacktestRow>,
}

struct UsableRow<'a> {
    signal: &'a str,
    p_model: f64,
    edge: f64,
    ev_net: f64,
}

fn finite(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite())
}

/// Aggregate historical rows. Rows missing a finite edge, EV or model probability
/// are dropped from every statistic.
pub fn build_backtest_summary(rows: &[BacktestRow]) -> BacktestSummary {
    let usable: Vec<UsableRow<'_>> = rows
        .iter()
        .filter_map(|row| {
            Some(UsableRow {
                signal: row.signal.as_str(),
                p_model: finite(row.p_model)?,
                edge: finite(row.edge)?,
                ev_net: finite(row.ev_net)?,
            })
        })
        .collect();

    let total = usable.len();
    let pass = Signal::Pass.as_str();
    let watch = Signal::Watch.as_str();

    let pass_count = usable.iter().filter(|r| r.signal == pass).count();
    let watch_count = usable.iter().filter(|r| r.signal == watch).count();

    let rate = |count: usize| if total > 0 { count as f64 / total as f64 } else { 0.0 };

    BacktestSummary {
        total,
        pass_rate: rate(pass_count),
        watch_rate: rate(watch_count),
        avg_edge: average(usable.iter().map(|r| r.edge)),
        avg_ev_net: average(usable.iter().map(|r| r.ev_net)),
        avg_p_model: average(usable.iter().map(|r| r.p_model)),
        hypothetical_return: usable
            .iter()
            .filter(|r| r.signal == pass)
            .map(|r| r.ev_net)
            .sum(),
    }
}

fn average(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if count == 0 {
        None
    } else {
        Some(sum / count as f64)
    }
}

/// Backtest a stored analysis against comparable history (same schema side and location).
pub async fn run_backtest(
    store: &dyn ResultStore,
    baseline_id: i64,
    history_limit: usize,
) -> Result<BacktestReport> {
    let baseline = store
        .find_baseline(baseline_id)
        .await?
        .with_context(|| format!("Failed to load baseline analysis {}", baseline_id))?;

    let filter = HistoryFilter {
        schema_side: baseline.schema_side,
        location_key: baseline.location_key.clone(),
        exclude_id: Some(baseline.id),
        limit: history_limit,
    };

    let rows = store
        .list_history_matching(&filter)
        .await
        .context("Failed to load backtest rows")?;
    let summary = build_backtest_summary(&rows);

    info!(
        "Backtest for analysis {}: {} usable rows, pass rate {:.1}%, hypothetical return {:.4}",
        baseline_id,
        summary.total,
        summary.pass_rate * 100.0,
        summary.hypothetical_return
    );

    Ok(BacktestReport {
        baseline_id,
        summary,
        rows,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(id: i64, signal: &str, p: Option<f64>, edge: Option<f64>, ev: Option<f64>) -> BacktestRow {
        BacktestRow {
            id,
            event_title: "Highest temperature in NYC".to_string(),
            market_question: "Will the high be 90°F or above?".to_string(),
            risk_profile: "Balanced".to_string(),
            signal: signal.to_string(),
            price: Some(0.5),
            p_model: p,
            edge,
            ev_net: ev,
            created_at: "2025-06-01T00:00:00Z".to_string(),
        }
    }

    #[test]
    fn test_empty_summary() {
        let summary = build_backtest_summary(&[]);
        assert_eq!(
            summary,
            BacktestSummary {
                total: 0,
                pass_rate: 0.0,
                watch_rate: 0.0,
                avg_edge: None,
                avg_ev_net: None,
                avg_p_model: None,
                hypothetical_return: 0.0,
            }
        );
    }

    #[test]
    fn test_rows_missing_p_model_are_excluded() {
        let rows = vec![
            row(1, "PASS", Some(0.7), Some(0.2), Some(0.18)),
            row(2, "WATCH", None, Some(0.9), Some(0.9)),
            row(3, "NO_TRADE", Some(0.3), Some(-0.2), Some(-0.22)),
        ];
        let summary = build_backtest_summary(&rows);
        assert_eq!(summary.total, 2);
        assert_eq!(summary.watch_rate, 0.0);
        assert!((summary.pass_rate - 0.5).abs() < 1e-12);
        assert!((summary.avg_edge.unwrap() - 0.0).abs() < 1e-12);
        assert!((summary.avg_p_model.unwrap() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_non_finite_values_are_excluded() {
        let rows = vec![
            row(1, "PASS", Some(0.7), Some(f64::NAN), Some(0.1)),
            row(2, "PASS", Some(0.7), Some(0.1), Some(f64::INFINITY)),
            row(3, "WATCH", Some(0.6), Some(0.05), Some(0.03)),
        ];
        let summary = build_backtest_summary(&rows);
        assert_eq!(summary.total, 1);
        assert_eq!(summary.watch_rate, 1.0);
        assert_eq!(summary.hypothetical_return, 0.0);
    }

    #[test]
    fn test_hypothetical_return_sums_pass_rows() {
        let rows = vec![
            row(1, "PASS", Some(0.7), Some(0.2), Some(0.10)),
            row(2, "PASS", Some(0.6), Some(0.1), Some(0.05)),
            row(3, "WATCH", Some(0.55), Some(0.01), Some(-0.01)),
            row(4, "NO_TRADE", Some(0.2), Some(-0.3), Some(-0.32)),
        ];
        let summary = build_backtest_summary(&rows);
        assert_eq!(summary.total, 4);
        assert!((summary.pass_rate - 0.5).abs() < 1e-12);
        assert!((summary.watch_rate - 0.25).abs() < 1e-12);
        assert!((summary.hypothetical_return - 0.15).abs() < 1e-12);
        assert!((summary.avg_ev_net.unwrap() - (-0.045)).abs() < 1e-12);
    }
}
