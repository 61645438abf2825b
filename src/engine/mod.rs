pub mod drawdown;
pub mod metrics;
pub mod monte_carlo;
