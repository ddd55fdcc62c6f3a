use axum::{
    Router,
    extract::{Json, Query},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::core::{
    CancelToken, MonteCarloConfig, MonteCarloSummary, PoolCarry, SimulationConfig,
    SimulationResult, WinBand, WinProbabilityTable, run_monte_carlo, run_simulation,
};

const MAX_MONTHS: u32 = 36;
const MAX_SESSIONS_PER_MONTH: u32 = 200_000;
const MAX_REPLICATES: u32 = 10_000;
const MAX_TIMELINE_POINTS: u64 = 100_000;

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum CliMode {
    Simulate,
    MonteCarlo,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum CliPoolCarry {
    Continuous,
    ResetEachMonth,
}

impl From<CliPoolCarry> for PoolCarry {
    fn from(value: CliPoolCarry) -> Self {
        match value {
            CliPoolCarry::Continuous => PoolCarry::Continuous,
            CliPoolCarry::ResetEachMonth => PoolCarry::ResetEachMonth,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum CliFormat {
    Json,
    Text,
}

/// A band as given on the command line: probability still in percent.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct CliWinBand {
    pub min: f64,
    pub max: f64,
    pub win_percent: f64,
}

fn parse_win_band(raw: &str) -> Result<CliWinBand, String> {
    let parts = raw.split(':').map(str::trim).collect::<Vec<_>>();
    let [min, max, win_percent] = parts.as_slice() else {
        return Err(format!("expected MIN:MAX:PERCENT, got {raw:?}"));
    };
    let number = |label: &str, v: &str| {
        v.parse::<f64>()
            .map_err(|_| format!("invalid {label} {v:?} in win band {raw:?}"))
    };

    Ok(CliWinBand {
        min: number("min", *min)?,
        max: match *max {
            "" | "inf" | "+inf" | "infinity" => f64::INFINITY,
            v => number("max", v)?,
        },
        win_percent: number("percent", *win_percent)?,
    })
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum ApiPoolCarry {
    Continuous,
    #[serde(alias = "resetEachMonth", alias = "reset_each_month", alias = "reset")]
    ResetEachMonth,
}

impl From<ApiPoolCarry> for CliPoolCarry {
    fn from(value: ApiPoolCarry) -> Self {
        match value {
            ApiPoolCarry::Continuous => CliPoolCarry::Continuous,
            ApiPoolCarry::ResetEachMonth => CliPoolCarry::ResetEachMonth,
        }
    }
}

#[derive(Copy, Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiWinBand {
    min: f64,
    #[serde(default)]
    max: Option<f64>,
    #[serde(alias = "prob")]
    win_percent: f64,
}

impl From<ApiWinBand> for CliWinBand {
    fn from(value: ApiWinBand) -> Self {
        CliWinBand {
            min: value.min,
            max: value.max.unwrap_or(f64::INFINITY),
            win_percent: value.win_percent,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct SimulatePayload {
    months: Option<u32>,
    sessions_per_month: Option<u32>,
    base_pool: Option<f64>,
    contribute_percent: Option<f64>,
    stake_per_session: Option<f64>,
    growth_rate: Option<f64>,
    win_bands: Option<Vec<ApiWinBand>>,
    seed: Option<u64>,
    pool_carry: Option<ApiPoolCarry>,
    timeline_stride: Option<u32>,
    replicates: Option<u32>,
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "jackpot",
    about = "Jackpot pool simulator (banded win probability, compounding turnover, Monte Carlo)"
)]
pub struct Cli {
    #[arg(long, value_enum, default_value_t = CliMode::Simulate)]
    pub mode: CliMode,
    #[arg(long, value_enum, default_value_t = CliFormat::Json)]
    pub format: CliFormat,
    #[arg(long, default_value_t = 6, help = "Months to simulate")]
    pub months: u32,
    #[arg(long, default_value_t = 27_000, help = "Sessions per month")]
    pub sessions_per_month: u32,
    #[arg(long, default_value_t = 10_000_000.0, help = "Pool value after every reset")]
    pub base_pool: f64,
    #[arg(
        long,
        default_value_t = 0.3,
        help = "Share of each stake credited to the pool, in percent (0.3 = 0.3%)"
    )]
    pub contribute_percent: f64,
    #[arg(long, default_value_t = 10_000_000.0, help = "Stake per session in month 1")]
    pub stake_per_session: f64,
    #[arg(
        long,
        default_value_t = 5.0,
        allow_negative_numbers = true,
        help = "Monthly turnover growth in percent, compounding; negative values decay"
    )]
    pub growth_rate: f64,
    #[arg(
        long = "win-band",
        value_parser = parse_win_band,
        default_value = "0:inf:0.08",
        help = "MIN:MAX:PERCENT, repeatable; first matching band wins, MAX may be inf"
    )]
    pub win_bands: Vec<CliWinBand>,
    #[arg(long, help = "Random seed; a fresh one is drawn and reported when omitted")]
    pub seed: Option<u64>,
    #[arg(long, value_enum, default_value_t = CliPoolCarry::Continuous)]
    pub pool_carry: CliPoolCarry,
    #[arg(long, help = "Record the pool value every N sessions")]
    pub timeline_stride: Option<u32>,
    #[arg(long, default_value_t = 1_000, help = "Monte Carlo replicates of month 1")]
    pub replicates: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CoverageGap {
    from: f64,
    /// `None` when the gap is open-ended.
    to: Option<f64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SimulateResponse {
    /// Bands as used by the engine; probabilities are fractions.
    win_bands: Vec<WinBand>,
    coverage_gaps: Vec<CoverageGap>,
    #[serde(flatten)]
    result: SimulationResult,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MonteCarloResponse {
    win_bands: Vec<WinBand>,
    coverage_gaps: Vec<CoverageGap>,
    #[serde(flatten)]
    summary: MonteCarloSummary,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

fn convert_bands(bands: &[CliWinBand]) -> Result<Vec<WinBand>, String> {
    if bands.is_empty() {
        return Err("at least one --win-band is required".to_string());
    }

    bands
        .iter()
        .enumerate()
        .map(|(idx, band)| {
            if !(0.0..=100.0).contains(&band.win_percent) {
                return Err(format!(
                    "--win-band entry {}: percent must be between 0 and 100, got {}",
                    idx,
                    band.win_percent
                ));
            }
            Ok(WinBand::new(band.min, band.max, band.win_percent / 100.0))
        })
        .collect()
}

fn check_shared_flags(cli: &Cli) -> Result<(), String> {
    if cli.sessions_per_month == 0 {
        return Err("--sessions-per-month must be > 0".to_string());
    }

    if cli.sessions_per_month > MAX_SESSIONS_PER_MONTH {
        return Err(format!("--sessions-per-month must be <= {MAX_SESSIONS_PER_MONTH}"));
    }

    if !cli.base_pool.is_finite() || cli.base_pool <= 0.0 {
        return Err("--base-pool must be > 0".to_string());
    }

    if !cli.stake_per_session.is_finite() || cli.stake_per_session <= 0.0 {
        return Err("--stake-per-session must be > 0".to_string());
    }

    if !(0.0..=100.0).contains(&cli.contribute_percent) {
        return Err("--contribute-percent must be between 0 and 100".to_string());
    }

    Ok(())
}

pub fn build_simulation_config(cli: &Cli) -> Result<SimulationConfig, String> {
    check_shared_flags(cli)?;

    if cli.months == 0 {
        return Err("--months must be > 0".to_string());
    }

    if cli.months > MAX_MONTHS {
        return Err(format!("--months must be <= {MAX_MONTHS}"));
    }

    if !cli.growth_rate.is_finite() || cli.growth_rate <= -100.0 {
        return Err("--growth-rate must be > -100".to_string());
    }

    if let Some(stride) = cli.timeline_stride {
        if stride == 0 {
            return Err("--timeline-stride must be > 0".to_string());
        }
        let total_sessions = cli.months as u64 * cli.sessions_per_month as u64;
        if total_sessions / stride as u64 > MAX_TIMELINE_POINTS {
            return Err(format!(
                "--timeline-stride must be >= {} for {total_sessions} sessions",
                total_sessions.div_ceil(MAX_TIMELINE_POINTS)
            ));
        }
    }

    let config = SimulationConfig {
        months: cli.months,
        sessions_per_month: cli.sessions_per_month,
        base_pool: cli.base_pool,
        contribute_fraction: cli.contribute_percent / 100.0,
        stake_per_session: cli.stake_per_session,
        growth_rate: cli.growth_rate / 100.0,
        win_bands: convert_bands(&cli.win_bands)?,
        seed: Some(cli.seed.unwrap_or_else(rand::random)),
        pool_carry: cli.pool_carry.into(),
        timeline_stride: cli.timeline_stride,
    };
    config.validate().map_err(|e| e.to_string())?;
    Ok(config)
}

pub fn build_monte_carlo_config(cli: &Cli) -> Result<MonteCarloConfig, String> {
    check_shared_flags(cli)?;

    if cli.replicates == 0 {
        return Err("--replicates must be > 0".to_string());
    }

    if cli.replicates > MAX_REPLICATES {
        return Err(format!("--replicates must be <= {MAX_REPLICATES}"));
    }

    let config = MonteCarloConfig {
        replicates: cli.replicates,
        sessions: cli.sessions_per_month,
        stake_per_session: cli.stake_per_session,
        contribute_fraction: cli.contribute_percent / 100.0,
        base_pool: cli.base_pool,
        win_bands: convert_bands(&cli.win_bands)?,
        seed: Some(cli.seed.unwrap_or_else(rand::random)),
    };
    config.validate().map_err(|e| e.to_string())?;
    Ok(config)
}

/// Resolved bands plus the pool ranges above `base_pool` they leave uncovered.
fn band_report(
    bands: &[WinBand],
    base_pool: f64,
) -> Result<(Vec<WinBand>, Vec<CoverageGap>), String> {
    let table = WinProbabilityTable::new(bands.to_vec()).map_err(|e| e.to_string())?;

    let gaps = table
        .coverage_gaps(base_pool)
        .into_iter()
        .map(|(from, to)| CoverageGap {
            from,
            to: to.is_finite().then_some(to),
        })
        .collect::<Vec<_>>();
    for gap in &gaps {
        warn!(
            from = gap.from,
            to = ?gap.to,
            "pool values in this range match no win band and can never hit"
        );
    }
    Ok((table.bands().to_vec(), gaps))
}

fn simulate(config: &SimulationConfig) -> Result<SimulateResponse, String> {
    let (win_bands, coverage_gaps) = band_report(&config.win_bands, config.base_pool)?;
    let result = run_simulation(config).map_err(|e| e.to_string())?;
    Ok(SimulateResponse {
        win_bands,
        coverage_gaps,
        result,
    })
}

fn monte_carlo(
    config: &MonteCarloConfig,
    cancel: &CancelToken,
) -> Result<MonteCarloResponse, String> {
    let (win_bands, coverage_gaps) = band_report(&config.win_bands, config.base_pool)?;
    let summary = run_monte_carlo(config, cancel).map_err(|e| e.to_string())?;
    Ok(MonteCarloResponse {
        win_bands,
        coverage_gaps,
        summary,
    })
}

/// Run the engine for a parsed command line and render its output.
pub fn run_cli(cli: &Cli) -> Result<String, String> {
    match cli.mode {
        CliMode::Simulate => {
            let response = simulate(&build_simulation_config(cli)?)?;
            match cli.format {
                CliFormat::Json => serde_json::to_string_pretty(&response).map_err(|e| e.to_string()),
                CliFormat::Text => Ok(render_simulation_report(&response.result)),
            }
        }
        CliMode::MonteCarlo => {
            let response = monte_carlo(&build_monte_carlo_config(cli)?, &CancelToken::new())?;
            match cli.format {
                CliFormat::Json => serde_json::to_string_pretty(&response).map_err(|e| e.to_string()),
                CliFormat::Text => Ok(render_monte_carlo_report(&response.summary)),
            }
        }
    }
}

pub fn format_money(v: f64) -> String {
    let abs = v.abs();
    if abs >= 1e12 {
        return format!("{:.2} T", v / 1e12);
    }
    if abs >= 1e9 {
        return format!("{:.2} B", v / 1e9);
    }
    if abs >= 1e6 {
        return format!("{:.2} M", v / 1e6);
    }
    let rounded = v.round() as i64;
    let digits = rounded.unsigned_abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if rounded < 0 {
        grouped.push('-');
    }
    for (idx, ch) in digits.chars().enumerate() {
        if idx > 0 && (digits.len() - idx) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    grouped
}

fn render_simulation_report(result: &SimulationResult) -> String {
    let mut out = String::new();
    let stats = &result.statistics;
    let _ = writeln!(out, "seed {}", result.seed);
    let _ = writeln!(
        out,
        "{:>5} {:>10} {:>12} {:>5} {:>12} {:>12} {:>9}",
        "month", "stake", "turnover", "hits", "payout", "profit", "profit %"
    );
    for month in &result.month_summaries {
        let _ = writeln!(
            out,
            "{:>5} {:>10} {:>12} {:>5} {:>12} {:>12} {:>8.3}%",
            month.month,
            format_money(month.stake_per_session),
            format_money(month.turnover),
            month.hit_count,
            format_money(month.payout),
            format_money(month.profit_after_payout),
            month.profit_percent
        );
    }
    let _ = writeln!(out);
    let _ = writeln!(out, "total hits      {}", stats.total_hits);
    let _ = writeln!(out, "sessions / day  {:.0}", stats.sessions_per_day);
    let _ = writeln!(out, "avg cycle       {:.0}", stats.avg_cycle);
    let _ = writeln!(out, "avg jackpot     {}", format_money(stats.avg_jackpot));
    let _ = writeln!(out, "profit          {:.3}%", stats.profit_percent);
    out
}

fn render_monte_carlo_report(summary: &MonteCarloSummary) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "seed {}", summary.seed);
    let _ = writeln!(
        out,
        "replicates      {}/{}{}",
        summary.replicates_completed,
        summary.replicates_requested,
        if summary.cancelled { " (cancelled)" } else { "" }
    );
    let _ = writeln!(out, "mean hits       {:.3}", summary.mean_hit_count);
    let _ = writeln!(
        out,
        "profit %        mean {:.4} | p10 {:.4} | median {:.4} | p90 {:.4}",
        summary.mean_profit_percent,
        summary.p10_profit_percent,
        summary.median_profit_percent,
        summary.p90_profit_percent
    );
    let _ = writeln!(
        out,
        "profit % range  {:.4} .. {:.4}",
        summary.min_profit_percent, summary.max_profit_percent
    );
    for (hits, count) in &summary.hit_count_distribution {
        let _ = writeln!(out, "  {hits:>4} hits  {count}");
    }
    out
}

pub fn router() -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route(
            "/api/simulate",
            get(simulate_get_handler).post(simulate_post_handler),
        )
        .route(
            "/api/monte-carlo",
            get(monte_carlo_get_handler).post(monte_carlo_post_handler),
        )
        .fallback(not_found_handler)
}

pub async fn run_http_server(port: u16) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "jackpot HTTP API listening");

    axum::serve(listener, router())
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutting down");
        })
        .await
}

async fn health_handler() -> Response {
    json_response(StatusCode::OK, serde_json::json!({ "status": "ok" }))
}

async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

async fn simulate_get_handler(Query(payload): Query<SimulatePayload>) -> Response {
    simulate_handler_impl(payload).await
}

async fn simulate_post_handler(Json(payload): Json<SimulatePayload>) -> Response {
    simulate_handler_impl(payload).await
}

async fn simulate_handler_impl(payload: SimulatePayload) -> Response {
    let config = match cli_from_payload(payload).and_then(|cli| build_simulation_config(&cli)) {
        Ok(config) => config,
        Err(msg) => return error_response(StatusCode::BAD_REQUEST, &msg),
    };

    match tokio::task::spawn_blocking(move || simulate(&config)).await {
        Ok(Ok(response)) => json_response(StatusCode::OK, response),
        Ok(Err(msg)) => error_response(StatusCode::BAD_REQUEST, &msg),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()),
    }
}

async fn monte_carlo_get_handler(Query(payload): Query<SimulatePayload>) -> Response {
    monte_carlo_handler_impl(payload).await
}

async fn monte_carlo_post_handler(Json(payload): Json<SimulatePayload>) -> Response {
    monte_carlo_handler_impl(payload).await
}

/// Cancels the batch if the request future is dropped (client went away).
struct CancelOnDrop(CancelToken);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.cancel();
    }
}

async fn monte_carlo_handler_impl(payload: SimulatePayload) -> Response {
    let config = match cli_from_payload(payload).and_then(|cli| build_monte_carlo_config(&cli)) {
        Ok(config) => config,
        Err(msg) => return error_response(StatusCode::BAD_REQUEST, &msg),
    };

    let guard = CancelOnDrop(CancelToken::new());
    let cancel = guard.0.clone();
    let result = tokio::task::spawn_blocking(move || monte_carlo(&config, &cancel)).await;
    drop(guard);

    match result {
        Ok(Ok(response)) => json_response(StatusCode::OK, response),
        Ok(Err(msg)) => error_response(StatusCode::BAD_REQUEST, &msg),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()),
    }
}

fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response {
    let mut response = (status, Json(body)).into_response();
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        header::HeaderValue::from_static("no-store"),
    );
    response
}

fn error_response(status: StatusCode, msg: &str) -> Response {
    json_response(
        status,
        ErrorResponse {
            error: msg.to_string(),
        },
    )
}

fn cli_from_payload(payload: SimulatePayload) -> Result<Cli, String> {
    let mut cli = default_cli_for_api();

    if let Some(v) = payload.months {
        cli.months = v;
    }
    if let Some(v) = payload.sessions_per_month {
        cli.sessions_per_month = v;
    }
    if let Some(v) = payload.base_pool {
        cli.base_pool = v;
    }
    if let Some(v) = payload.contribute_percent {
        cli.contribute_percent = v;
    }
    if let Some(v) = payload.stake_per_session {
        cli.stake_per_session = v;
    }
    if let Some(v) = payload.growth_rate {
        cli.growth_rate = v;
    }
    if let Some(bands) = payload.win_bands {
        if bands.is_empty() {
            return Err("winBands must not be empty".to_string());
        }
        cli.win_bands = bands.into_iter().map(Into::into).collect();
    }
    if payload.seed.is_some() {
        cli.seed = payload.seed;
    }
    if let Some(v) = payload.pool_carry {
        cli.pool_carry = v.into();
    }
    if payload.timeline_stride.is_some() {
        cli.timeline_stride = payload.timeline_stride;
    }
    if let Some(v) = payload.replicates {
        cli.replicates = v;
    }

    Ok(cli)
}

fn default_cli_for_api() -> Cli {
    Cli {
        mode: CliMode::Simulate,
        format: CliFormat::Json,
        months: 6,
        sessions_per_month: 27_000,
        base_pool: 10_000_000.0,
        contribute_percent: 0.3,
        stake_per_session: 10_000_000.0,
        growth_rate: 5.0,
        win_bands: vec![CliWinBand {
            min: 0.0,
            max: f64::INFINITY,
            win_percent: 0.08,
        }],
        seed: None,
        pool_carry: CliPoolCarry::Continuous,
        timeline_stride: None,
        replicates: 1_000,
    }
}
