use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use tracing::{debug, info, warn};

use super::engine::{
    CycleCursor, CycleParams, REPLICATE_STREAM, derive_seed, month_profit, percentile, run_cycle,
};
use super::error::{ConfigError, ensure_nonzero, ensure_positive, ensure_within};
use super::table::WinProbabilityTable;
use super::types::{MonteCarloConfig, MonteCarloSummary, RunResult};

/// Cooperative stop signal for a Monte Carlo batch.
///
/// Checked before each replicate starts; a running replicate always finishes.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

impl MonteCarloConfig {
    pub fn validate(&self) -> Result<WinProbabilityTable, ConfigError> {
        ensure_nonzero("replicates", self.replicates)?;
        ensure_nonzero("sessions", self.sessions)?;
        ensure_positive("base_pool", self.base_pool)?;
        ensure_positive("stake_per_session", self.stake_per_session)?;
        ensure_within("contribute_fraction", self.contribute_fraction, 0.0, 1.0)?;
        WinProbabilityTable::new(self.win_bands.clone())
    }

    fn cycle_params(&self) -> CycleParams {
        CycleParams {
            month: 1,
            num_sessions: self.sessions,
            stake_per_session: self.stake_per_session,
            contribute_fraction: self.contribute_fraction,
            base_pool: self.base_pool,
        }
    }
}

pub fn run_monte_carlo(
    config: &MonteCarloConfig,
    cancel: &CancelToken,
) -> Result<MonteCarloSummary, ConfigError> {
    let table = config.validate()?;
    let seed = config.seed.unwrap_or_else(rand::random);
    let params = config.cycle_params();
    info!(
        seed,
        replicates = config.replicates,
        sessions = config.sessions,
        "starting monte carlo batch"
    );

    let runs = (0..config.replicates)
        .into_par_iter()
        .filter_map(|run_index| {
            if cancel.is_cancelled() {
                return None;
            }
            Some(run_replicate(&params, &table, seed, run_index))
        })
        .collect::<Vec<_>>();

    let cancelled = runs.len() < config.replicates as usize;
    if cancelled {
        warn!(
            completed = runs.len(),
            requested = config.replicates,
            "monte carlo batch cancelled"
        );
    }

    let summary = summarize_runs(seed, config.replicates, cancelled, runs);
    info!(
        seed,
        completed = summary.replicates_completed,
        mean_profit_percent = summary.mean_profit_percent,
        "monte carlo batch finished"
    );
    Ok(summary)
}

pub fn run_replicate(
    params: &CycleParams,
    table: &WinProbabilityTable,
    base_seed: u64,
    run_index: u32,
) -> RunResult {
    let mut rng = ChaCha8Rng::seed_from_u64(derive_seed(base_seed, REPLICATE_STREAM, run_index));
    let mut cursor = CycleCursor::fresh(params.base_pool);
    let cycle = run_cycle(params, table, &mut cursor, &mut rng, None);
    let profit = month_profit(cycle.turnover, params.contribute_fraction, &cycle.hits);

    let hit_count = cycle.hits.len() as u32;
    let (avg_hit_value, max_hit_value, min_hit_value) = if cycle.hits.is_empty() {
        (0.0, 0.0, 0.0)
    } else {
        let values = cycle.hits.iter().map(|hit| hit.value);
        (
            profit.payout / hit_count as f64,
            values.clone().fold(f64::NEG_INFINITY, f64::max),
            values.fold(f64::INFINITY, f64::min),
        )
    };

    debug!(run_index, hit_count, payout = profit.payout, "replicate finished");

    RunResult {
        run_index,
        hit_count,
        avg_hit_value,
        max_hit_value,
        min_hit_value,
        ending_pool: cycle.ending_pool,
        profit_percent: profit.profit_percent,
    }
}

/// Pure reduction over completed replicates.
pub fn summarize_runs(
    seed: u64,
    replicates_requested: u32,
    cancelled: bool,
    runs: Vec<RunResult>,
) -> MonteCarloSummary {
    let mut profits = runs.iter().map(|run| run.profit_percent).collect::<Vec<_>>();
    let mut hit_count_distribution = BTreeMap::new();
    for run in &runs {
        *hit_count_distribution.entry(run.hit_count).or_insert(0_u32) += 1;
    }

    let n = runs.len();
    let (mean_profit_percent, mean_hit_count) = if n == 0 {
        (0.0, 0.0)
    } else {
        (
            profits.iter().sum::<f64>() / n as f64,
            runs.iter().map(|run| run.hit_count as f64).sum::<f64>() / n as f64,
        )
    };
    let min_profit_percent = profits.iter().copied().reduce(f64::min).unwrap_or(0.0);
    let max_profit_percent = profits.iter().copied().reduce(f64::max).unwrap_or(0.0);

    MonteCarloSummary {
        seed,
        replicates_requested,
        replicates_completed: n as u32,
        cancelled,
        mean_profit_percent,
        min_profit_percent,
        max_profit_percent,
        p10_profit_percent: percentile(&mut profits, 10.0),
        median_profit_percent: percentile(&mut profits, 50.0),
        p90_profit_percent: percentile(&mut profits, 90.0),
        mean_hit_count,
        hit_count_distribution,
        runs,
    }
}
