use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::config::{ReportDialect, ReportFormat};
use super::trade::{RowWarning, TradeEvent};

/// Output of the report parser.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedReport {
    pub format: ReportFormat,
    pub dialect: ReportDialect,
    pub trades: Vec<TradeEvent>,
    /// Key/value pairs from the report header and footer blocks.
    pub summary: BTreeMap<String, String>,
    pub warnings: Vec<RowWarning>,
}

/// A point on the equity curve.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EquityPoint {
    pub time: NaiveDateTime,
    pub equity: f64,
    /// Distance below the running peak, in percent of the peak.
    pub drawdown_pct: f64,
}

/// One peak → trough → recovery episode of the balance curve.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DrawdownPeriod {
    pub start: NaiveDateTime,
    pub peak: f64,
    pub peak_time: NaiveDateTime,
    pub bottom: f64,
    pub bottom_time: NaiveDateTime,
    pub recovery_value: Option<f64>,
    pub recovery_time: Option<NaiveDateTime>,
    pub drawdown_amount: f64,
    pub drawdown_pct: f64,
    /// Whole days from the peak to the bottom, rounded up.
    pub duration_days: i64,
    /// Whole days from the bottom to the recovery, rounded up. `None` while unrecovered.
    pub recovery_duration_days: Option<i64>,
}

impl DrawdownPeriod {
    pub fn is_recovered(&self) -> bool {
        self.recovery_value.is_some()
    }
}

/// Equity curve plus the reported drawdown episodes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DrawdownAnalysis {
    pub equity_curve: Vec<EquityPoint>,
    /// Sorted by `drawdown_amount`, largest first.
    pub periods: Vec<DrawdownPeriod>,
}

/// Per-group trade statistics (one symbol or one calendar month).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GroupStats {
    pub key: String,
    pub trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    pub win_rate_pct: f64,
    pub gross_profit: f64,
    pub gross_loss: f64,
    pub net_profit: f64,
    pub avg_trade: f64,
    /// `None` when the group has profits but no losses.
    pub profit_factor: Option<f64>,
}

/// Performance statistics over a full trade sequence.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricsSnapshot {
    // Balance
    pub initial_balance: f64,
    pub final_balance: f64,
    pub total_net_profit: f64,

    // Trades
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    pub breakeven_trades: usize,
    pub win_rate_pct: f64,

    // P&L
    pub gross_profit: f64,
    pub gross_loss: f64,
    pub profit_factor: f64,
    pub avg_trade: f64,
    pub avg_win: f64,
    pub avg_loss: f64,
    pub largest_win: f64,
    pub largest_loss: f64,
    pub expectancy: f64,
    pub total_commission: f64,
    pub total_swap: f64,

    // Consistency
    pub max_consecutive_wins: usize,
    pub max_consecutive_losses: usize,

    // Drawdown
    pub max_drawdown: f64,
    pub max_drawdown_pct: f64,
    pub relative_drawdown_pct: f64,
    pub recovery_factor: f64,

    // Risk-adjusted
    pub sharpe_ratio: f64,

    // Time
    pub first_event: Option<NaiveDateTime>,
    pub last_event: Option<NaiveDateTime>,

    // Breakdowns
    pub by_symbol: Vec<GroupStats>,
    pub by_month: Vec<GroupStats>,
}

/// One simulated equity path.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SimulationPath {
    /// Equity before the first sampled trade, then after each one.
    pub equity: Vec<f64>,
    pub final_equity: f64,
    pub max_drawdown_pct: f64,
    /// Set when equity hit zero and the remainder of the path was zero-filled.
    pub ruined: bool,
}

/// Aggregate statistics across all simulated paths.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MonteCarloStatistics {
    pub initial_capital: f64,
    pub simulations: usize,
    pub horizon: usize,
    pub winning_outcomes: usize,
    pub losing_outcomes: usize,
    pub median_final_equity: f64,
    pub mean_final_equity: f64,
    pub best_final_equity: f64,
    pub worst_final_equity: f64,
    /// 25th..75th percentile of final equity.
    pub confidence_50: (f64, f64),
    /// 5th..95th percentile of final equity.
    pub confidence_90: (f64, f64),
    pub median_max_drawdown_pct: f64,
    pub worst_max_drawdown_pct: f64,
    pub probability_of_ruin: f64,
    pub probability_of_profit: f64,
}

/// Complete Monte Carlo run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MonteCarloResult {
    pub paths: Vec<SimulationPath>,
    pub statistics: MonteCarloStatistics,
}

/// Everything the export layer renders.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub format: ReportFormat,
    pub dialect: ReportDialect,
    pub summary: BTreeMap<String, String>,
    pub trades: Vec<TradeEvent>,
    pub metrics: MetricsSnapshot,
    pub drawdowns: DrawdownAnalysis,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub monte_carlo: Option<MonteCarloResult>,
}
