mod engine;
mod error;
mod monte_carlo;
mod table;
mod types;

pub use engine::{
    CycleCursor, CycleParams, CycleResult, MonthProfit, month_profit, run_cycle, run_simulation,
    stake_for_month, step_session, summarize_month,
};
pub use error::ConfigError;
pub use monte_carlo::{CancelToken, run_monte_carlo, run_replicate, summarize_runs};
pub use table::{WinBand, WinProbabilityTable};
pub use types::{
    HitRecord, Money, MonteCarloConfig, MonteCarloSummary, MonthSummary, PoolCarry, PoolState,
    RunResult, RunStatistics, SessionOutcome, SimulationConfig, SimulationResult, TimelinePoint,
};
