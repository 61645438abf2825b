use std::path::Path;
use std::time::Instant;

use tracing::info;

use crate::data;
use crate::engine::{drawdown, metrics, monte_carlo};
use crate::errors::AppError;
use crate::models::config::{AnalyzerConfig, ReportDialect, ReportFormat};
use crate::models::result::{
    AnalysisReport, DrawdownAnalysis, MetricsSnapshot, MonteCarloResult, ParsedReport,
};
use crate::models::trade::TradeEvent;
use crate::utils::export;

/// State for one uploaded report: the parsed events plus everything derived
/// from them. Nothing is shared between sessions.
#[derive(Debug, Clone)]
pub struct ReportSession {
    config: AnalyzerConfig,
    report: ParsedReport,
    /// Events with the current initial-balance override applied.
    trades: Vec<TradeEvent>,
    metrics: MetricsSnapshot,
    drawdowns: DrawdownAnalysis,
    monte_carlo: Option<MonteCarloResult>,
}

impl ReportSession {
    // ── Import ──

    /// Parse a report and compute metrics and drawdowns.
    pub fn load(
        bytes: &[u8],
        format: ReportFormat,
        dialect: ReportDialect,
        config: AnalyzerConfig,
    ) -> Result<Self, AppError> {
        config.validate()?;
        let report = data::parse_report(bytes, format, dialect, &config.limits)?;
        Self::from_parsed(report, config)
    }

    fn from_parsed(report: ParsedReport, config: AnalyzerConfig) -> Result<Self, AppError> {
        let start = Instant::now();
        let trades = report.trades.clone();
        let metrics = metrics::compute_metrics(&trades, None, config.annualization_factor)?;
        let drawdowns = drawdown::compute_drawdowns(&trades, config.drawdown_noise_pct);

        info!(
            "Report loaded: {} events, {} drawdown periods in {:.1}ms",
            trades.len(),
            drawdowns.periods.len(),
            start.elapsed().as_secs_f64() * 1000.0
        );

        Ok(ReportSession {
            config,
            report,
            trades,
            metrics,
            drawdowns,
            monte_carlo: None,
        })
    }

    /// Read a report from disk, detecting its format from the content.
    pub fn load_file(path: &Path, dialect: ReportDialect, config: AnalyzerConfig) -> Result<Self, AppError> {
        config.validate()?;
        let report = data::parse_report_file(path, dialect, &config.limits)?;
        Self::from_parsed(report, config)
    }

    // ── Recalculation ──

    /// Rebase the balance curve on a new starting balance.
    ///
    /// On error the session is left exactly as it was. A stored Monte Carlo
    /// run is dropped on success since its capital no longer matches.
    pub fn set_initial_balance(&mut self, value: f64) -> Result<&MetricsSnapshot, AppError> {
        let shifted = metrics::shift_balances(&self.report.trades, value)?;
        let metrics = metrics::compute_metrics(&shifted, None, self.config.annualization_factor)?;
        let drawdowns = drawdown::compute_drawdowns(&shifted, self.config.drawdown_noise_pct);

        info!(
            "Initial balance set to {:.2}: net={:.2}, max_dd={:.2}",
            value, metrics.total_net_profit, metrics.max_drawdown
        );

        self.trades = shifted;
        self.metrics = metrics;
        self.drawdowns = drawdowns;
        self.monte_carlo = None;
        Ok(&self.metrics)
    }

    /// Run the Monte Carlo projection, defaulting to the current initial balance.
    pub fn run_monte_carlo(&mut self, initial_capital: Option<f64>) -> Result<&MonteCarloResult, AppError> {
        let capital = initial_capital.unwrap_or(self.metrics.initial_balance);
        let result = monte_carlo::run_monte_carlo(&self.trades, capital, &self.config.monte_carlo)?;
        let stored = self.monte_carlo.insert(result);
        Ok(&*stored)
    }

    // ── Accessors ──

    pub fn parsed(&self) -> &ParsedReport {
        &self.report
    }

    pub fn trades(&self) -> &[TradeEvent] {
        &self.trades
    }

    pub fn metrics(&self) -> &MetricsSnapshot {
        &self.metrics
    }

    pub fn drawdowns(&self) -> &DrawdownAnalysis {
        &self.drawdowns
    }

    pub fn monte_carlo(&self) -> Option<&MonteCarloResult> {
        self.monte_carlo.as_ref()
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    // ── Export ──

    pub fn report(&self) -> AnalysisReport {
        AnalysisReport {
            format: self.report.format,
            dialect: self.report.dialect,
            summary: self.report.summary.clone(),
            trades: self.trades.clone(),
            metrics: self.metrics.clone(),
            drawdowns: self.drawdowns.clone(),
            monte_carlo: self.monte_carlo.clone(),
        }
    }

    /// Serialize the full analysis as JSON for the UI layer.
    pub fn report_json(&self) -> Result<String, AppError> {
        Ok(serde_json::to_string(&self.report())?)
    }

    pub fn export_html(&self, path: &Path) -> Result<(), AppError> {
        export::write_report_html(&self.report(), path)
    }

    pub fn export_trades_csv(&self, path: &Path) -> Result<(), AppError> {
        export::write_trades_csv(&self.trades, path)
    }

    pub fn export_metrics_csv(&self, path: &Path) -> Result<(), AppError> {
        export::write_metrics_csv(&self.metrics, path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::config::MonteCarloConfig;

    const MT5_CSV: &str = "\
Time,Deal,Symbol,Type,Direction,Volume,Price,Commission,Swap,Profit,Balance,Comment
2024.02.01 09:00:00,1,,balance,,,,0.00,0.00,10000.00,10000.00,deposit
2024.02.01 10:00:00,2,EURUSD,buy,in,0.10,1.0800,0.00,0.00,0.00,10000.00,
2024.02.01 14:00:00,3,EURUSD,sell,out,0.10,1.0900,0.00,0.00,100.00,10100.00,
2024.02.02 10:00:00,4,EURUSD,sell,in,0.10,1.0900,0.00,0.00,0.00,10100.00,
2024.02.02 16:00:00,5,EURUSD,buy,out,0.10,1.0950,0.00,0.00,-50.00,10050.00,
";

    fn session() -> ReportSession {
        let config = AnalyzerConfig {
            monte_carlo: MonteCarloConfig {
                seed: Some(11),
                ..MonteCarloConfig::default()
            },
            ..AnalyzerConfig::default()
        };
        ReportSession::load(MT5_CSV.as_bytes(), ReportFormat::Csv, ReportDialect::Mt5, config).unwrap()
    }

    #[test]
    fn test_load_computes_everything() {
        let s = session();
        let m = s.metrics();
        assert_eq!(m.total_trades, 2);
        assert!((m.total_net_profit - 50.0).abs() < 1e-9);
        assert!((m.profit_factor - 2.0).abs() < 1e-9);
        assert!((m.max_drawdown - 50.0).abs() < 1e-9);
        assert_eq!(s.drawdowns().equity_curve.len(), 5);
        assert!(s.monte_carlo().is_none());
    }

    #[test]
    fn test_set_initial_balance() {
        let mut s = session();
        let original = s.metrics().clone();

        let shifted = s.set_initial_balance(20000.0).unwrap().clone();
        assert_eq!(shifted.initial_balance, 20000.0);
        assert_eq!(shifted.final_balance, 20050.0);
        assert!((shifted.total_net_profit - original.total_net_profit).abs() < 1e-9);
        assert_eq!(s.drawdowns().equity_curve[0].equity, 20000.0);

        s.set_initial_balance(10000.0).unwrap();
        assert_eq!(s.metrics(), &original);
    }

    #[test]
    fn test_invalid_balance_keeps_prior_results() {
        let mut s = session();
        s.set_initial_balance(5000.0).unwrap();
        let before = s.metrics().clone();

        let err = s.set_initial_balance(-1.0).unwrap_err();
        assert_eq!(err.category(), "validation");
        assert_eq!(s.metrics(), &before);
        assert_eq!(s.trades()[0].balance, Some(5000.0));
    }

    #[test]
    fn test_balance_override_needs_balance_column() {
        let csv = "\
Time,Deal,Symbol,Type,Direction,Profit
2024.02.01 14:00:00,3,EURUSD,sell,out,100.00
2024.02.02 16:00:00,5,EURUSD,buy,out,-50.00
";
        let mut s = ReportSession::load(csv.as_bytes(), ReportFormat::Csv, ReportDialect::Mt5, AnalyzerConfig::default())
            .unwrap();
        let before = s.metrics().clone();
        assert_eq!(before.total_trades, 2);

        let err = s.set_initial_balance(10000.0).unwrap_err();
        assert_eq!(err.category(), "validation");
        assert_eq!(s.metrics(), &before);

        // Explicit capital still works without balances.
        assert!(s.run_monte_carlo(Some(10000.0)).is_ok());
    }

    #[test]
    fn test_load_file_checks_size_before_reading() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deals.csv");
        std::fs::write(&path, MT5_CSV).unwrap();

        let mut config = AnalyzerConfig::default();
        config.limits.max_file_bytes = 16;
        let err = ReportSession::load_file(&path, ReportDialect::Mt5, config).unwrap_err();
        assert!(matches!(err, AppError::FileTooLarge { .. }));

        let s = ReportSession::load_file(&path, ReportDialect::Mt5, AnalyzerConfig::default()).unwrap();
        assert_eq!(s.parsed().format, ReportFormat::Csv);
        assert_eq!(s.metrics().total_trades, 2);
    }

    #[test]
    fn test_monte_carlo_defaults_to_initial_balance() {
        let mut s = session();
        let stats = s.run_monte_carlo(None).unwrap().statistics.clone();
        assert_eq!(stats.initial_capital, 10000.0);
        assert_eq!(stats.winning_outcomes, 1);
        assert_eq!(stats.losing_outcomes, 1);
        assert!(s.report().monte_carlo.is_some());

        let again = s.run_monte_carlo(Some(500.0)).unwrap();
        assert_eq!(again.statistics.initial_capital, 500.0);
    }

    #[test]
    fn test_load_rejects_empty_report() {
        let err = ReportSession::load(b"", ReportFormat::Csv, ReportDialect::Mt5, AnalyzerConfig::default())
            .unwrap_err();
        assert_eq!(err.category(), "parse");
    }

    #[test]
    fn test_exports() {
        let mut s = session();
        s.run_monte_carlo(None).unwrap();
        let dir = tempfile::tempdir().unwrap();

        let html_path = dir.path().join("report.html");
        s.export_html(&html_path).unwrap();
        let html = std::fs::read_to_string(&html_path).unwrap();
        assert!(html.contains("Monte Carlo (100 paths x 250 trades)"));

        let trades_path = dir.path().join("trades.csv");
        s.export_trades_csv(&trades_path).unwrap();
        assert_eq!(std::fs::read_to_string(&trades_path).unwrap().lines().count(), 6);

        let metrics_path = dir.path().join("metrics.csv");
        s.export_metrics_csv(&metrics_path).unwrap();
        assert!(std::fs::read_to_string(&metrics_path).unwrap().contains("Profit Factor,2.00"));

        let json = s.report_json().unwrap();
        assert!(json.contains("\"dialect\":\"mt5\""));
    }
}
