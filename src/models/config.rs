use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::AppError;

/// Container format of an uploaded report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    Html,
    Csv,
}

impl ReportFormat {
    /// Guess the format from decoded text: any table/html markup means HTML.
    pub fn detect(text: &str) -> ReportFormat {
        let head: String = text.chars().take(64 * 1024).collect::<String>().to_lowercase();
        if head.contains("<table") || head.contains("<html") {
            ReportFormat::Html
        } else {
            ReportFormat::Csv
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReportFormat::Html => "html",
            ReportFormat::Csv => "csv",
        }
    }
}

impl std::fmt::Display for ReportFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ReportFormat {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "html" | "htm" => Ok(ReportFormat::Html),
            "csv" | "txt" => Ok(ReportFormat::Csv),
            _ => Err(AppError::UnsupportedFormat(s.to_string())),
        }
    }
}

/// Broker platform whose column layout the report follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportDialect {
    /// MetaTrader 5 deals table (Time, Deal, Symbol, Type, Direction, ..., Profit, Balance).
    Mt5,
    /// MetaTrader 4 tester report / account statement (#, Time, Type, Order, Size, ..., Profit, Balance).
    Mt4,
}

impl ReportDialect {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportDialect::Mt5 => "mt5",
            ReportDialect::Mt4 => "mt4",
        }
    }
}

impl std::fmt::Display for ReportDialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ReportDialect {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "mt5" | "metatrader5" | "metatrader 5" => Ok(ReportDialect::Mt5),
            "mt4" | "metatrader4" | "metatrader 4" => Ok(ReportDialect::Mt4),
            _ => Err(AppError::UnsupportedFormat(format!("Unknown report dialect: {}", s))),
        }
    }
}

/// Upper bounds on what a single upload may contain.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ParseLimits {
    pub max_file_bytes: usize,
    pub max_rows: usize,
}

impl Default for ParseLimits {
    fn default() -> Self {
        ParseLimits {
            max_file_bytes: 20 * 1024 * 1024,
            max_rows: 200_000,
        }
    }
}

/// Monte Carlo projection settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MonteCarloConfig {
    pub simulations: usize,
    /// Number of sampled trades per path.
    pub horizon: usize,
    /// Share of current equity staked on each sampled trade.
    pub position_fraction: f64,
    /// Return on the stake for a sampled winner.
    pub win_return: f64,
    /// Return on the stake for a sampled loser (negative).
    pub loss_return: f64,
    /// Fixed seed for reproducible runs. `None` seeds from entropy.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl MonteCarloConfig {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.simulations == 0 || self.horizon == 0 {
            return Err(AppError::Validation(
                "Monte Carlo simulations and horizon must be positive".into(),
            ));
        }
        if self.position_fraction.is_nan() || self.position_fraction <= 0.0 || self.position_fraction > 1.0 {
            return Err(AppError::Validation(format!(
                "position fraction must be in (0, 1], got {}",
                self.position_fraction
            )));
        }
        if !self.win_return.is_finite() || !self.loss_return.is_finite() {
            return Err(AppError::Validation("Monte Carlo returns must be finite".into()));
        }
        Ok(())
    }
}

impl Default for MonteCarloConfig {
    fn default() -> Self {
        MonteCarloConfig {
            simulations: 100,
            horizon: 250,
            position_fraction: 0.10,
            win_return: 0.05,
            loss_return: -0.03,
            seed: None,
        }
    }
}

/// Analyzer configuration. Every field has a default, so a partial JSON
/// document is enough to override a single setting.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AnalyzerConfig {
    pub limits: ParseLimits,
    pub monte_carlo: MonteCarloConfig,
    /// Drawdown episodes at or below this percentage are not reported.
    pub drawdown_noise_pct: f64,
    /// Periods per year used to annualize the Sharpe ratio.
    pub annualization_factor: f64,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        AnalyzerConfig {
            limits: ParseLimits::default(),
            monte_carlo: MonteCarloConfig::default(),
            drawdown_noise_pct: 0.5,
            annualization_factor: 252.0,
        }
    }
}

impl AnalyzerConfig {
    pub fn from_json_str(json: &str) -> Result<Self, AppError> {
        let config: AnalyzerConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: &Path) -> Result<Self, AppError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.limits.max_file_bytes == 0 || self.limits.max_rows == 0 {
            return Err(AppError::Validation("parse limits must be positive".into()));
        }
        self.monte_carlo.validate()?;
        if self.drawdown_noise_pct.is_nan() || self.drawdown_noise_pct < 0.0 {
            return Err(AppError::Validation("drawdown noise threshold must be >= 0".into()));
        }
        if self.annualization_factor.is_nan() || self.annualization_factor <= 0.0 {
            return Err(AppError::Validation("annualization factor must be positive".into()));
        }
        Ok(())
    }
}
