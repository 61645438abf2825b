//! Broker strategy-report analyzer: imports MT4/MT5 trade history exports and
//! derives performance metrics, drawdown episodes and Monte Carlo projections.

pub mod commands;
pub mod data;
pub mod engine;
pub mod errors;
pub mod models;
pub mod utils;

use tracing_subscriber::EnvFilter;

pub use commands::ReportSession;
pub use data::parse_report;
pub use engine::drawdown::compute_drawdowns;
pub use engine::metrics::compute_metrics;
pub use engine::monte_carlo::run_monte_carlo;
pub use errors::AppError;

/// Install the global tracing subscriber. Honors `RUST_LOG`, defaults to `info`.
///
/// Safe to call more than once; later calls are ignored.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init()
        .ok();
}
