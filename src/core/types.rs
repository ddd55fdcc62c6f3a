use std::collections::BTreeMap;

use serde::Serialize;

use super::table::WinBand;

pub type Money = f64;

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum PoolCarry {
    /// Each month starts from the previous month's ending pool.
    #[default]
    Continuous,
    /// Each month starts from the base pool; months are independent.
    ResetEachMonth,
}

/// Multi-month simulation input. All rates are fractions of 1.0.
#[derive(Debug, Clone)]
pub struct SimulationConfig {
    pub months: u32,
    pub sessions_per_month: u32,
    pub base_pool: Money,
    pub contribute_fraction: f64,
    pub stake_per_session: Money,
    pub growth_rate: f64,
    pub win_bands: Vec<WinBand>,
    pub seed: Option<u64>,
    pub pool_carry: PoolCarry,
    /// Record the pool value every `n` sessions; `None` disables the timeline.
    pub timeline_stride: Option<u32>,
}

/// Single-month replicate input for Monte Carlo batches.
#[derive(Debug, Clone)]
pub struct MonteCarloConfig {
    pub replicates: u32,
    pub sessions: u32,
    pub stake_per_session: Money,
    pub contribute_fraction: f64,
    pub base_pool: Money,
    pub win_bands: Vec<WinBand>,
    pub seed: Option<u64>,
}

/// The accruing jackpot. Owned by exactly one cycle at a time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoolState {
    pub value: Money,
}

impl PoolState {
    pub fn new(value: Money) -> Self {
        Self { value }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionOutcome {
    pub is_hit: bool,
    /// Pool value after the contribution, before any reset.
    pub pool_after: Money,
    pub probability_used: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HitRecord {
    pub cycle_index: u32,
    pub sessions_since_reset: u32,
    pub month: u32,
    pub value: Money,
    pub probability: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelinePoint {
    pub session: u64,
    pub value: Money,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthSummary {
    pub month: u32,
    pub sessions: u32,
    pub stake_per_session: Money,
    pub starting_pool: Money,
    pub ending_pool: Money,
    pub turnover: Money,
    pub hit_count: u32,
    pub payout: Money,
    pub profit_before_payout: Money,
    pub profit_after_payout: Money,
    pub profit_percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunStatistics {
    pub total_hits: u32,
    pub sessions_per_day: f64,
    pub avg_cycle: f64,
    pub avg_jackpot: Money,
    pub total_turnover: Money,
    pub total_payout: Money,
    pub total_profit_after_payout: Money,
    pub profit_percent: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationResult {
    pub seed: u64,
    pub month_summaries: Vec<MonthSummary>,
    pub hits: Vec<HitRecord>,
    pub timeline: Vec<TimelinePoint>,
    pub statistics: RunStatistics,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunResult {
    pub run_index: u32,
    pub hit_count: u32,
    pub avg_hit_value: Money,
    pub max_hit_value: Money,
    pub min_hit_value: Money,
    pub ending_pool: Money,
    pub profit_percent: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonteCarloSummary {
    pub seed: u64,
    pub replicates_requested: u32,
    pub replicates_completed: u32,
    pub cancelled: bool,
    pub mean_profit_percent: f64,
    pub min_profit_percent: f64,
    pub max_profit_percent: f64,
    pub p10_profit_percent: f64,
    pub median_profit_percent: f64,
    pub p90_profit_percent: f64,
    pub mean_hit_count: f64,
    pub hit_count_distribution: BTreeMap<u32, u32>,
    pub runs: Vec<RunResult>,
}
