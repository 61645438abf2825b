use std::time::Instant;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use tracing::info;

use crate::errors::AppError;
use crate::models::config::MonteCarloConfig;
use crate::models::result::{MonteCarloResult, MonteCarloStatistics, SimulationPath};
use crate::models::trade::TradeEvent;

use super::drawdown::max_drawdown;

/// Project equity paths by resampling historical win/loss outcomes.
///
/// Seeded from `config.seed` when set, otherwise from entropy.
pub fn run_monte_carlo(
    trades: &[TradeEvent],
    initial_capital: f64,
    config: &MonteCarloConfig,
) -> Result<MonteCarloResult, AppError> {
    let mut rng = match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    run_monte_carlo_with_rng(trades, initial_capital, config, &mut rng)
}

/// Same as [`run_monte_carlo`], drawing per-path seeds from `rng`.
///
/// Paths run in parallel; each gets its own generator seeded up front, so a
/// given `rng` state always yields the same result.
pub fn run_monte_carlo_with_rng<R: Rng>(
    trades: &[TradeEvent],
    initial_capital: f64,
    config: &MonteCarloConfig,
    rng: &mut R,
) -> Result<MonteCarloResult, AppError> {
    if !initial_capital.is_finite() || initial_capital <= 0.0 {
        return Err(AppError::Validation(format!(
            "initial capital must be a positive number, got {}",
            initial_capital
        )));
    }
    config.validate()?;

    // Outcome sign only; magnitude comes from the configured returns.
    let outcomes: Vec<bool> = trades
        .iter()
        .filter_map(|t| t.realized_profit())
        .map(|p| p > 0.0)
        .collect();
    if outcomes.is_empty() {
        return Err(AppError::Validation(
            "no closed trades to sample outcomes from".into(),
        ));
    }
    let winning_outcomes = outcomes.iter().filter(|&&w| w).count();
    let losing_outcomes = outcomes.len() - winning_outcomes;

    info!(
        "Monte Carlo: {} paths x {} trades, {} wins / {} losses sampled, capital={:.2}",
        config.simulations, config.horizon, winning_outcomes, losing_outcomes, initial_capital
    );
    let start = Instant::now();

    let seeds: Vec<u64> = (0..config.simulations).map(|_| rng.gen()).collect();
    let paths: Vec<SimulationPath> = seeds
        .par_iter()
        .map(|&seed| {
            let mut path_rng = StdRng::seed_from_u64(seed);
            simulate_path(&outcomes, initial_capital, config, &mut path_rng)
        })
        .collect();

    let statistics = summarize(&paths, initial_capital, config, winning_outcomes, losing_outcomes);

    info!(
        "Monte Carlo complete in {:.1}ms: median={:.2}, 90% CI=[{:.2}, {:.2}], ruin={:.1}%",
        start.elapsed().as_secs_f64() * 1000.0,
        statistics.median_final_equity,
        statistics.confidence_90.0,
        statistics.confidence_90.1,
        statistics.probability_of_ruin * 100.0
    );

    Ok(MonteCarloResult { paths, statistics })
}

fn simulate_path(
    outcomes: &[bool],
    initial_capital: f64,
    config: &MonteCarloConfig,
    rng: &mut impl Rng,
) -> SimulationPath {
    let mut equity = Vec::with_capacity(config.horizon + 1);
    equity.push(initial_capital);
    let mut current = initial_capital;
    let mut ruined = false;

    for _ in 0..config.horizon {
        if ruined {
            equity.push(0.0);
            continue;
        }
        let win = outcomes[rng.gen_range(0..outcomes.len())];
        let stake = current * config.position_fraction;
        let ret = if win { config.win_return } else { config.loss_return };
        current += stake * ret;
        if current <= 0.0 {
            current = 0.0;
            ruined = true;
        }
        equity.push(current);
    }

    let (_, max_drawdown_pct) = max_drawdown(equity.iter().copied());
    SimulationPath {
        final_equity: current,
        max_drawdown_pct,
        ruined,
        equity,
    }
}

fn summarize(
    paths: &[SimulationPath],
    initial_capital: f64,
    config: &MonteCarloConfig,
    winning_outcomes: usize,
    losing_outcomes: usize,
) -> MonteCarloStatistics {
    let n = paths.len() as f64;

    let mut finals: Vec<f64> = paths.iter().map(|p| p.final_equity).collect();
    finals.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mut drawdowns: Vec<f64> = paths.iter().map(|p| p.max_drawdown_pct).collect();
    drawdowns.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    MonteCarloStatistics {
        initial_capital,
        simulations: paths.len(),
        horizon: config.horizon,
        winning_outcomes,
        losing_outcomes,
        median_final_equity: percentile(&finals, 50.0),
        mean_final_equity: finals.iter().sum::<f64>() / n,
        best_final_equity: finals.last().copied().unwrap_or(initial_capital),
        worst_final_equity: finals.first().copied().unwrap_or(initial_capital),
        confidence_50: (percentile(&finals, 25.0), percentile(&finals, 75.0)),
        confidence_90: (percentile(&finals, 5.0), percentile(&finals, 95.0)),
        median_max_drawdown_pct: percentile(&drawdowns, 50.0),
        worst_max_drawdown_pct: drawdowns.last().copied().unwrap_or(0.0),
        probability_of_ruin: paths.iter().filter(|p| p.ruined).count() as f64 / n,
        probability_of_profit: paths
            .iter()
            .filter(|p| p.final_equity > initial_capital)
            .count() as f64
            / n,
    }
}

/// Linear-interpolated percentile of an ascending slice.
fn percentile(sorted: &[f64], pct: f64) -> f64 {
    match sorted.len() {
        0 => 0.0,
        1 => sorted[0],
        len => {
            let rank = (pct / 100.0).clamp(0.0, 1.0) * (len - 1) as f64;
            let lo = rank.floor() as usize;
            let hi = rank.ceil() as usize;
            let weight = rank - lo as f64;
            sorted[lo] + (sorted[hi] - sorted[lo]) * weight
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::trade::{Direction, EventKind};
    use chrono::{Duration, NaiveDate};

    fn closed(profits: &[f64]) -> Vec<TradeEvent> {
        let t0 = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
        profits
            .iter()
            .enumerate()
            .map(|(i, &p)| {
                let mut e = TradeEvent::new(t0 + Duration::hours(i as i64), EventKind::Trade);
                e.direction = Some(Direction::Out);
                e.profit = Some(p);
                e
            })
            .collect()
    }

    fn seeded(seed: u64) -> MonteCarloConfig {
        MonteCarloConfig {
            seed: Some(seed),
            ..MonteCarloConfig::default()
        }
    }

    #[test]
    fn test_all_winners_never_lose() {
        let trades = closed(&[10.0, 25.0, 5.0]);
        let result = run_monte_carlo(&trades, 10000.0, &MonteCarloConfig::default()).unwrap();
        assert_eq!(result.paths.len(), 100);
        assert!(result.paths.iter().all(|p| p.final_equity >= 10000.0));
        assert!(result.paths.iter().all(|p| p.equity.len() == 251));
        let stats = &result.statistics;
        assert!(stats.worst_final_equity >= 10000.0);
        assert_eq!(stats.losing_outcomes, 0);
        assert_eq!(stats.probability_of_ruin, 0.0);
        assert_eq!(stats.worst_max_drawdown_pct, 0.0);
    }

    #[test]
    fn test_seed_is_reproducible() {
        let trades = closed(&[10.0, -5.0, 7.0, -3.0, 0.0]);
        let a = run_monte_carlo(&trades, 5000.0, &seeded(42)).unwrap();
        let b = run_monte_carlo(&trades, 5000.0, &seeded(42)).unwrap();
        assert_eq!(a.statistics, b.statistics);
        assert_eq!(a.paths[17].equity, b.paths[17].equity);

        let c = run_monte_carlo(&trades, 5000.0, &seeded(7)).unwrap();
        assert_ne!(a.statistics.mean_final_equity, c.statistics.mean_final_equity);
    }

    #[test]
    fn test_statistics_are_ordered() {
        let trades = closed(&[10.0, -5.0, 7.0, -3.0]);
        let s = run_monte_carlo(&trades, 1000.0, &seeded(1)).unwrap().statistics;
        assert_eq!(s.winning_outcomes, 2);
        assert_eq!(s.losing_outcomes, 2);
        assert!(s.worst_final_equity <= s.confidence_90.0);
        assert!(s.confidence_90.0 <= s.confidence_50.0);
        assert!(s.confidence_50.0 <= s.median_final_equity);
        assert!(s.median_final_equity <= s.confidence_50.1);
        assert!(s.confidence_50.1 <= s.confidence_90.1);
        assert!(s.confidence_90.1 <= s.best_final_equity);
        assert!(s.median_max_drawdown_pct <= s.worst_max_drawdown_pct);
        assert!((0.0..=1.0).contains(&s.probability_of_profit));
    }

    #[test]
    fn test_ruined_path_is_zero_filled() {
        let trades = closed(&[-1.0]);
        let config = MonteCarloConfig {
            simulations: 3,
            horizon: 10,
            position_fraction: 1.0,
            loss_return: -1.0,
            seed: Some(3),
            ..MonteCarloConfig::default()
        };
        let result = run_monte_carlo(&trades, 100.0, &config).unwrap();
        for path in &result.paths {
            assert!(path.ruined);
            assert_eq!(path.equity[0], 100.0);
            assert!(path.equity[1..].iter().all(|&e| e == 0.0));
            assert!((path.max_drawdown_pct - 100.0).abs() < 1e-9);
        }
        assert_eq!(result.statistics.probability_of_ruin, 1.0);
    }

    #[test]
    fn test_rejects_bad_input() {
        let config = MonteCarloConfig::default();
        let err = run_monte_carlo(&[], 1000.0, &config).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        let err = run_monte_carlo(&closed(&[1.0]), 0.0, &config).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let nan_fraction = MonteCarloConfig {
            position_fraction: f64::NAN,
            ..MonteCarloConfig::default()
        };
        let err = run_monte_carlo(&closed(&[1.0]), 1000.0, &nan_fraction).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let infinite_win = MonteCarloConfig {
            win_return: f64::INFINITY,
            ..MonteCarloConfig::default()
        };
        assert!(run_monte_carlo(&closed(&[1.0]), 1000.0, &infinite_win).is_err());
    }

    #[test]
    fn test_percentile_interpolation() {
        let sorted = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(percentile(&sorted, 50.0), 3.0);
        assert_eq!(percentile(&sorted, 0.0), 1.0);
        assert_eq!(percentile(&sorted, 100.0), 5.0);
        assert!((percentile(&sorted, 25.0) - 2.0).abs() < 1e-12);
        assert!((percentile(&[1.0, 2.0], 50.0) - 1.5).abs() < 1e-12);
        assert_eq!(percentile(&[], 50.0), 0.0);
    }
}
