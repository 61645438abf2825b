use std::collections::BTreeMap;

use statrs::statistics::Statistics;
use tracing::info;

use crate::errors::AppError;
use crate::models::result::{GroupStats, MetricsSnapshot};
use crate::models::trade::{EventKind, TradeEvent};

use super::drawdown::{balance_series, max_drawdown};

/// Label used for trades that carry no symbol.
const NO_SYMBOL: &str = "N/A";

/// Calculate all report metrics from the event sequence.
///
/// With `initial_balance_override`, every balance snapshot is shifted so the
/// first one equals the override before anything is computed.
pub fn compute_metrics(
    trades: &[TradeEvent],
    initial_balance_override: Option<f64>,
    annualization_factor: f64,
) -> Result<MetricsSnapshot, AppError> {
    match initial_balance_override {
        Some(value) => {
            let shifted = shift_balances(trades, value)?;
            Ok(calculate_metrics(&shifted, annualization_factor))
        }
        None => Ok(calculate_metrics(trades, annualization_factor)),
    }
}

/// Move every balance snapshot by `new_initial - old_initial`.
///
/// Profits are untouched; only the balance level changes. Rejects
/// non-positive or non-finite values, and sequences with no balance to rebase.
pub fn shift_balances(trades: &[TradeEvent], new_initial: f64) -> Result<Vec<TradeEvent>, AppError> {
    if !new_initial.is_finite() || new_initial <= 0.0 {
        return Err(AppError::Validation(format!(
            "initial balance must be a positive number, got {}",
            new_initial
        )));
    }
    let Some(old_initial) = trades.iter().find_map(|t| t.balance) else {
        return Err(AppError::Validation("report carries no balance column".into()));
    };
    let offset = new_initial - old_initial;

    Ok(trades
        .iter()
        .map(|t| {
            let mut shifted = t.clone();
            shifted.balance = t.balance.map(|b| b + offset);
            shifted
        })
        .collect())
}

/// Metrics over an already prepared sequence.
pub fn calculate_metrics(trades: &[TradeEvent], annualization_factor: f64) -> MetricsSnapshot {
    let series = balance_series(trades);
    let initial_balance = series.first().map(|&(_, b)| b).unwrap_or(0.0);
    let final_balance = series.last().map(|&(_, b)| b).unwrap_or(initial_balance);
    let total_net_profit = final_balance - initial_balance;

    // ── Trade classification ──
    let countable: Vec<&TradeEvent> = trades.iter().filter(|t| t.is_countable()).collect();
    let profits: Vec<f64> = countable.iter().filter_map(|t| t.profit).collect();
    let total_trades = profits.len();

    let winning_trades = profits.iter().filter(|&&p| p > 0.0).count();
    let losing_trades = profits.iter().filter(|&&p| p < 0.0).count();
    let breakeven_trades = total_trades - winning_trades - losing_trades;
    let win_rate_pct = ratio_pct(winning_trades, total_trades);

    // ── P&L ──
    let gross_profit: f64 = profits.iter().filter(|&&p| p > 0.0).sum();
    let gross_loss: f64 = profits.iter().filter(|&&p| p < 0.0).map(|p| p.abs()).sum();
    let profit_factor = if gross_loss > 0.0 {
        gross_profit / gross_loss
    } else {
        0.0
    };

    let avg_trade = if total_trades > 0 {
        profits.iter().sum::<f64>() / total_trades as f64
    } else {
        0.0
    };
    let avg_win = if winning_trades > 0 {
        gross_profit / winning_trades as f64
    } else {
        0.0
    };
    let avg_loss = if losing_trades > 0 {
        -gross_loss / losing_trades as f64
    } else {
        0.0
    };
    let largest_win = profits.iter().copied().fold(0.0f64, f64::max);
    let largest_loss = profits.iter().copied().fold(0.0f64, f64::min);
    let expectancy = if total_trades > 0 {
        (win_rate_pct / 100.0) * avg_win + (1.0 - win_rate_pct / 100.0) * avg_loss
    } else {
        0.0
    };
    let total_commission: f64 = countable.iter().filter_map(|t| t.commission).sum();
    let total_swap: f64 = countable.iter().filter_map(|t| t.swap).sum();

    // ── Consistency ──
    let (max_consecutive_wins, max_consecutive_losses) = calculate_consecutive(&profits);

    // ── Drawdown ──
    let (max_drawdown, relative_drawdown_pct) = max_drawdown(series.iter().map(|&(_, b)| b));
    let max_drawdown_pct = max_drawdown_pct_of_amount(&series, max_drawdown);
    let recovery_factor = if max_drawdown > 0.0 {
        total_net_profit / max_drawdown
    } else {
        0.0
    };

    // ── Risk-adjusted ──
    let sharpe_ratio = calculate_sharpe(&trade_returns(trades), annualization_factor);

    let snapshot = MetricsSnapshot {
        initial_balance,
        final_balance,
        total_net_profit,
        total_trades,
        winning_trades,
        losing_trades,
        breakeven_trades,
        win_rate_pct,
        gross_profit,
        gross_loss,
        profit_factor,
        avg_trade,
        avg_win,
        avg_loss,
        largest_win,
        largest_loss,
        expectancy,
        total_commission,
        total_swap,
        max_consecutive_wins,
        max_consecutive_losses,
        max_drawdown,
        max_drawdown_pct,
        relative_drawdown_pct,
        recovery_factor,
        sharpe_ratio,
        first_event: trades.first().map(|t| t.time),
        last_event: trades.last().map(|t| t.time),
        by_symbol: symbol_breakdown(trades),
        by_month: monthly_breakdown(trades),
    };

    info!(
        "Metrics: {} trades, net={:.2}, win_rate={:.1}%, pf={:.2}, max_dd={:.2}, sharpe={:.2}",
        snapshot.total_trades,
        snapshot.total_net_profit,
        snapshot.win_rate_pct,
        snapshot.profit_factor,
        snapshot.max_drawdown,
        snapshot.sharpe_ratio
    );

    snapshot
}

fn ratio_pct(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

/// Percent depth of the deepest-by-amount drop, measured against its own peak.
fn max_drawdown_pct_of_amount(series: &[(chrono::NaiveDateTime, f64)], target: f64) -> f64 {
    if target <= 0.0 {
        return 0.0;
    }
    let mut peak = f64::NEG_INFINITY;
    let mut best = 0.0f64;
    let mut best_amount = 0.0f64;
    for &(_, b) in series {
        if b > peak {
            peak = b;
            continue;
        }
        let dd = peak - b;
        if dd > best_amount && peak > 0.0 {
            best_amount = dd;
            best = dd / peak * 100.0;
        }
    }
    best
}

/// Per-event returns between consecutive balance snapshots of trade rows.
/// Funding rows are skipped so deposits do not read as performance.
fn trade_returns(trades: &[TradeEvent]) -> Vec<f64> {
    let balances: Vec<f64> = trades
        .iter()
        .filter(|t| t.kind == EventKind::Trade)
        .filter_map(|t| t.balance)
        .collect();
    balances
        .windows(2)
        .filter(|w| w[0] != 0.0)
        .map(|w| (w[1] - w[0]) / w[0])
        .collect()
}

/// Sharpe Ratio: mean(returns) / std(returns) * sqrt(annualization_factor).
fn calculate_sharpe(returns: &[f64], annualization_factor: f64) -> f64 {
    if returns.len() < 2 {
        return 0.0;
    }
    let mean = returns.iter().mean();
    let std_dev = returns.iter().std_dev();
    if !std_dev.is_finite() || std_dev < 1e-12 {
        return 0.0;
    }
    (mean / std_dev) * annualization_factor.sqrt()
}

/// Longest winning and losing streaks. Breakeven trades end neither streak.
fn calculate_consecutive(profits: &[f64]) -> (usize, usize) {
    let mut max_wins = 0usize;
    let mut max_losses = 0usize;
    let mut current_wins = 0usize;
    let mut current_losses = 0usize;

    for &p in profits {
        if p > 0.0 {
            current_wins += 1;
            current_losses = 0;
        } else if p < 0.0 {
            current_losses += 1;
            current_wins = 0;
        }
        max_wins = max_wins.max(current_wins);
        max_losses = max_losses.max(current_losses);
    }
    (max_wins, max_losses)
}

/// Countable trades grouped by symbol, in symbol order.
pub fn symbol_breakdown(trades: &[TradeEvent]) -> Vec<GroupStats> {
    group_by(trades, |t| {
        t.symbol.clone().unwrap_or_else(|| NO_SYMBOL.to_string())
    })
}

/// Countable trades grouped by calendar month (`YYYY-MM`), in time order.
pub fn monthly_breakdown(trades: &[TradeEvent]) -> Vec<GroupStats> {
    group_by(trades, |t| t.time.format("%Y-%m").to_string())
}

fn group_by(trades: &[TradeEvent], key: impl Fn(&TradeEvent) -> String) -> Vec<GroupStats> {
    let mut groups: BTreeMap<String, Vec<f64>> = BTreeMap::new();
    for t in trades {
        if let Some(p) = t.realized_profit() {
            groups.entry(key(t)).or_default().push(p);
        }
    }
    groups
        .into_iter()
        .map(|(key, profits)| group_stats(key, &profits))
        .collect()
}

fn group_stats(key: String, profits: &[f64]) -> GroupStats {
    let trades = profits.len();
    let winning_trades = profits.iter().filter(|&&p| p > 0.0).count();
    let losing_trades = profits.iter().filter(|&&p| p < 0.0).count();
    let gross_profit: f64 = profits.iter().filter(|&&p| p > 0.0).sum();
    let gross_loss: f64 = profits.iter().filter(|&&p| p < 0.0).map(|p| p.abs()).sum();
    let net_profit = gross_profit - gross_loss;
    let profit_factor = if gross_loss > 0.0 {
        Some(gross_profit / gross_loss)
    } else if gross_profit > 0.0 {
        None
    } else {
        Some(0.0)
    };

    GroupStats {
        key,
        trades,
        winning_trades,
        losing_trades,
        win_rate_pct: ratio_pct(winning_trades, trades),
        gross_profit,
        gross_loss,
        net_profit,
        avg_trade: if trades > 0 { net_profit / trades as f64 } else { 0.0 },
        profit_factor,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::trade::Direction;
    use chrono::{Duration, NaiveDate, NaiveDateTime};

    fn t0() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 30).unwrap().and_hms_opt(9, 0, 0).unwrap()
    }

    fn deposit(balance: f64) -> TradeEvent {
        let mut e = TradeEvent::new(t0(), EventKind::Balance);
        e.balance = Some(balance);
        e
    }

    fn closed(hours: i64, symbol: &str, profit: f64, balance: f64) -> TradeEvent {
        let mut e = TradeEvent::new(t0() + Duration::hours(hours), EventKind::Trade);
        e.symbol = Some(symbol.to_string());
        e.direction = Some(Direction::Out);
        e.profit = Some(profit);
        e.balance = Some(balance);
        e
    }

    fn scenario_a() -> Vec<TradeEvent> {
        vec![
            deposit(10000.0),
            closed(1, "EURUSD", 100.0, 10100.0),
            closed(2, "EURUSD", -50.0, 10050.0),
        ]
    }

    #[test]
    fn test_scenario_a() {
        let m = calculate_metrics(&scenario_a(), 252.0);
        assert!((m.total_net_profit - 50.0).abs() < 1e-9);
        assert!((m.win_rate_pct - 50.0).abs() < 1e-9);
        assert!((m.profit_factor - 2.0).abs() < 1e-9);
        assert!((m.max_drawdown - 50.0).abs() < 1e-9);
        assert!((m.recovery_factor - 1.0).abs() < 1e-9);
        assert_eq!(m.total_trades, 2);
        assert_eq!(m.initial_balance, 10000.0);
        assert_eq!(m.final_balance, 10050.0);
    }

    #[test]
    fn test_empty_sequence() {
        let m = calculate_metrics(&[], 252.0);
        assert_eq!(m.total_trades, 0);
        assert_eq!(m.win_rate_pct, 0.0);
        assert_eq!(m.profit_factor, 0.0);
        assert_eq!(m.sharpe_ratio, 0.0);
        assert!(m.by_symbol.is_empty());
    }

    #[test]
    fn test_balance_and_open_rows_not_counted() {
        let mut open = TradeEvent::new(t0(), EventKind::Trade);
        open.direction = Some(Direction::In);
        let mut funding_out = deposit(500.0);
        funding_out.direction = Some(Direction::Out);
        funding_out.profit = Some(500.0);
        let m = calculate_metrics(&[open, funding_out], 252.0);
        assert_eq!(m.total_trades, 0);
        assert_eq!(m.win_rate_pct, 0.0);
    }

    #[test]
    fn test_profit_factor_zero_when_no_losses() {
        let trades = vec![
            deposit(1000.0),
            closed(1, "XAUUSD", 10.0, 1010.0),
            closed(2, "XAUUSD", 20.0, 1030.0),
        ];
        let m = calculate_metrics(&trades, 252.0);
        assert_eq!(m.profit_factor, 0.0);
        assert!(m.profit_factor.is_finite());
        assert_eq!(m.by_symbol[0].profit_factor, None);
    }

    #[test]
    fn test_single_balance_event_has_zero_sharpe() {
        let m = calculate_metrics(&[deposit(1000.0)], 252.0);
        assert_eq!(m.sharpe_ratio, 0.0);
        assert_eq!(m.max_drawdown, 0.0);
    }

    #[test]
    fn test_sharpe_ratio() {
        let trades = vec![
            deposit(1000.0),
            closed(1, "A", 10.0, 1010.0),
            closed(2, "A", 20.0, 1030.0),
            closed(3, "A", -5.0, 1025.0),
            closed(4, "A", 15.0, 1040.0),
        ];
        let m = calculate_metrics(&trades, 252.0);
        assert!(m.sharpe_ratio > 0.0);

        let returns = [0.01, 0.02, 0.01, 0.03, 0.01];
        assert!(calculate_sharpe(&returns, 252.0) > 0.0);
        assert_eq!(calculate_sharpe(&[0.5, 0.5, 0.5], 252.0), 0.0);
    }

    #[test]
    fn test_override_shift_and_idempotence() {
        let trades = scenario_a();
        let original = compute_metrics(&trades, None, 252.0).unwrap();
        let same = compute_metrics(&trades, Some(10000.0), 252.0).unwrap();
        assert_eq!(original, same);

        let shifted = compute_metrics(&trades, Some(5000.0), 252.0).unwrap();
        assert_eq!(shifted.initial_balance, 5000.0);
        assert_eq!(shifted.final_balance, 5050.0);
        assert!((shifted.total_net_profit - original.total_net_profit).abs() < 1e-9);
        assert!((shifted.max_drawdown - 50.0).abs() < 1e-9);
        assert!(shifted.relative_drawdown_pct > original.relative_drawdown_pct);
    }

    #[test]
    fn test_override_rejects_non_positive() {
        for bad in [0.0, -100.0, f64::NAN] {
            let err = compute_metrics(&scenario_a(), Some(bad), 252.0).unwrap_err();
            assert!(matches!(err, AppError::Validation(_)));
        }
    }

    #[test]
    fn test_override_without_balances_is_rejected() {
        let mut unbalanced = closed(1, "EURUSD", 100.0, 0.0);
        unbalanced.balance = None;
        let err = compute_metrics(&[unbalanced.clone()], Some(10000.0), 252.0).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert!(shift_balances(&[unbalanced], 10000.0).is_err());
    }

    #[test]
    fn test_symbol_and_month_breakdowns() {
        let trades = vec![
            deposit(1000.0),
            closed(1, "EURUSD", 30.0, 1030.0),
            closed(2, "GBPUSD", -10.0, 1020.0),
            // Crosses into February.
            closed(48, "EURUSD", -10.0, 1010.0),
        ];
        let by_symbol = symbol_breakdown(&trades);
        assert_eq!(by_symbol.len(), 2);
        let eur = &by_symbol[0];
        assert_eq!(eur.key, "EURUSD");
        assert_eq!(eur.trades, 2);
        assert!((eur.win_rate_pct - 50.0).abs() < 1e-9);
        assert!((eur.net_profit - 20.0).abs() < 1e-9);
        assert!((eur.avg_trade - 10.0).abs() < 1e-9);
        assert_eq!(eur.profit_factor, Some(3.0));

        let by_month = monthly_breakdown(&trades);
        let keys: Vec<_> = by_month.iter().map(|g| g.key.as_str()).collect();
        assert_eq!(keys, vec!["2024-01", "2024-02"]);
        assert_eq!(by_month[0].trades, 2);
        assert_eq!(by_month[1].profit_factor, Some(0.0));
    }

    #[test]
    fn test_consecutive_wins_losses() {
        let profits = [100.0, 100.0, 100.0, 0.0, -50.0, -50.0, 100.0];
        assert_eq!(calculate_consecutive(&profits), (3, 2));
    }
}
