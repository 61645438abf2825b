use chrono::NaiveDateTime;
use tracing::debug;

use crate::models::result::{DrawdownAnalysis, DrawdownPeriod, EquityPoint};
use crate::models::trade::TradeEvent;

const SECONDS_PER_DAY: i64 = 86_400;

/// Balance-bearing events as `(time, balance)`, in sequence order.
pub fn balance_series(trades: &[TradeEvent]) -> Vec<(NaiveDateTime, f64)> {
    trades
        .iter()
        .filter_map(|t| t.balance.map(|b| (t.time, b)))
        .collect()
}

/// Whole days between two instants, rounded up.
fn ceil_days(from: NaiveDateTime, to: NaiveDateTime) -> i64 {
    let secs = (to - from).num_seconds().max(0);
    (secs + SECONDS_PER_DAY - 1) / SECONDS_PER_DAY
}

fn pct_of(amount: f64, peak: f64) -> f64 {
    if peak > 0.0 {
        amount / peak * 100.0
    } else {
        0.0
    }
}

/// Largest peak-to-trough drop of a value series, as `(amount, percent)`.
///
/// Both maxima are tracked independently, so the percent may come from a
/// different episode than the amount.
pub fn max_drawdown<I>(values: I) -> (f64, f64)
where
    I: IntoIterator<Item = f64>,
{
    let mut iter = values.into_iter();
    let Some(mut peak) = iter.next() else {
        return (0.0, 0.0);
    };
    let mut max_amount = 0.0f64;
    let mut max_pct = 0.0f64;

    for value in iter {
        if value > peak {
            peak = value;
            continue;
        }
        let dd = peak - value;
        max_amount = max_amount.max(dd);
        max_pct = max_pct.max(pct_of(dd, peak));
    }
    (max_amount, max_pct)
}

/// Build the equity curve and enumerate drawdown episodes.
///
/// Episodes at or below `noise_pct` are dropped from the reported list. The
/// rest are sorted by amount, largest first; an episode still open at the end
/// of the series is kept with no recovery.
pub fn compute_drawdowns(trades: &[TradeEvent], noise_pct: f64) -> DrawdownAnalysis {
    let series = balance_series(trades);
    let Some(&(first_time, first_balance)) = series.first() else {
        return DrawdownAnalysis {
            equity_curve: Vec::new(),
            periods: Vec::new(),
        };
    };

    let mut equity_curve = Vec::with_capacity(series.len());
    let mut periods: Vec<DrawdownPeriod> = Vec::new();
    let mut current: Option<DrawdownPeriod> = None;
    let mut peak = first_balance;
    let mut peak_time = first_time;

    for &(time, balance) in &series {
        if balance > peak {
            if let Some(mut open) = current.take() {
                open.recovery_value = Some(balance);
                open.recovery_time = Some(time);
                open.recovery_duration_days = Some(ceil_days(open.bottom_time, time));
                periods.push(open);
            }
            peak = balance;
            peak_time = time;
        } else if balance < peak {
            match current.as_mut() {
                None => {
                    let amount = peak - balance;
                    current = Some(DrawdownPeriod {
                        start: peak_time,
                        peak,
                        peak_time,
                        bottom: balance,
                        bottom_time: time,
                        recovery_value: None,
                        recovery_time: None,
                        drawdown_amount: amount,
                        drawdown_pct: pct_of(amount, peak),
                        duration_days: ceil_days(peak_time, time),
                        recovery_duration_days: None,
                    });
                }
                Some(open) if balance < open.bottom => {
                    open.bottom = balance;
                    open.bottom_time = time;
                    open.drawdown_amount = open.peak - balance;
                    open.drawdown_pct = pct_of(open.drawdown_amount, open.peak);
                    open.duration_days = ceil_days(open.peak_time, time);
                }
                Some(_) => {}
            }
        }

        equity_curve.push(EquityPoint {
            time,
            equity: balance,
            drawdown_pct: pct_of(peak - balance, peak).max(0.0),
        });
    }

    if let Some(open) = current {
        periods.push(open);
    }

    let total = periods.len();
    periods.retain(|p| p.drawdown_pct > noise_pct);
    periods.sort_by(|a, b| {
        b.drawdown_amount
            .partial_cmp(&a.drawdown_amount)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    debug!(
        "Drawdowns: {} curve points, {} episodes ({} above {:.2}% threshold)",
        equity_curve.len(),
        total,
        periods.len(),
        noise_pct
    );

    DrawdownAnalysis {
        equity_curve,
        periods,
    }
}
