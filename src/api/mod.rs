use axum::{
    Router,
    extract::{Json, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

use crate::core::{
    AssetAllocation, AssetParameters, CancellationToken, ENGINE_VERSION, EngineSettings,
    FinancialInputs, MarketParameters, MonteCarloEngine, RebalancingPolicy, ScenarioComparison,
    ScenarioInput, ScenarioOverrides, SimulationConfig, SimulationError, SimulationReport,
};

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CliRebalancing {
    None,
    Annual,
}

impl From<CliRebalancing> for RebalancingPolicy {
    fn from(value: CliRebalancing) -> Self {
        match value {
            CliRebalancing::None => RebalancingPolicy::None,
            CliRebalancing::Annual => RebalancingPolicy::Annual,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum ApiRebalancing {
    #[serde(alias = "never", alias = "off")]
    None,
    #[serde(alias = "yearly", alias = "annually")]
    Annual,
}

impl From<ApiRebalancing> for RebalancingPolicy {
    fn from(value: ApiRebalancing) -> Self {
        match value {
            ApiRebalancing::None => RebalancingPolicy::None,
            ApiRebalancing::Annual => RebalancingPolicy::Annual,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct ConfigPayload {
    simulation_count: Option<u32>,
    #[serde(alias = "timeHorizonYears")]
    time_horizon: Option<u32>,
    asset_allocation: Option<AssetAllocation>,
    #[serde(alias = "rebalancingPolicy")]
    rebalancing: Option<ApiRebalancing>,
    seed: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct FinancialPayload {
    initial_balance: Option<f64>,
    monthly_contribution: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct MarketPayload {
    stocks_return: Option<f64>,
    stocks_volatility: Option<f64>,
    bonds_return: Option<f64>,
    bonds_volatility: Option<f64>,
    correlation: Option<f64>,
}

impl MarketPayload {
    fn is_empty(&self) -> bool {
        self.stocks_return.is_none()
            && self.stocks_volatility.is_none()
            && self.bonds_return.is_none()
            && self.bonds_volatility.is_none()
            && self.correlation.is_none()
    }

    fn merged_onto(&self, base: &MarketParameters) -> MarketParameters {
        MarketParameters {
            stocks: AssetParameters {
                expected_annual_return: self
                    .stocks_return
                    .unwrap_or(base.stocks.expected_annual_return),
                annual_volatility: self
                    .stocks_volatility
                    .unwrap_or(base.stocks.annual_volatility),
            },
            bonds: AssetParameters {
                expected_annual_return: self
                    .bonds_return
                    .unwrap_or(base.bonds.expected_annual_return),
                annual_volatility: self
                    .bonds_volatility
                    .unwrap_or(base.bonds.annual_volatility),
            },
            correlation: self.correlation.unwrap_or(base.correlation),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct SimulatePayload {
    #[serde(alias = "config")]
    simulation_config: ConfigPayload,
    #[serde(alias = "financial")]
    financial_data: FinancialPayload,
    market: MarketPayload,
    include_paths: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct ScenarioPayload {
    base: SimulatePayload,
    scenarios: BTreeMap<String, SimulatePayload>,
    include_paths: Option<bool>,
}

#[derive(Parser, Debug)]
#[command(
    name = "portfolio-mc",
    about = "Monte Carlo portfolio forecaster (stocks + bonds, contributions, rebalancing)"
)]
pub struct Cli {
    #[arg(long, global = true, help = "JSON file with engine settings")]
    settings: Option<PathBuf>,
    #[arg(long, global = true, help = "Upper bound on simulations per request")]
    max_simulations: Option<u32>,
    #[arg(long, global = true, help = "Run paths on a single thread")]
    sequential: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the JSON API over HTTP.
    Serve {
        #[arg(long, default_value_t = 8080)]
        port: u16,
    },
    /// Run one simulation and print the report as JSON.
    Simulate(SimulateArgs),
}

#[derive(Args, Debug, Clone)]
struct SimulateArgs {
    #[arg(long, default_value_t = 1000)]
    simulations: u32,
    #[arg(long, default_value_t = 30, help = "Time horizon in years (1-50)")]
    years: u32,
    #[arg(long, default_value_t = 60.0, help = "Stock allocation in percent")]
    stocks: f64,
    #[arg(long, default_value_t = 40.0, help = "Bond allocation in percent")]
    bonds: f64,
    #[arg(long, value_enum, default_value_t = CliRebalancing::Annual)]
    rebalancing: CliRebalancing,
    #[arg(long, default_value_t = 10_000.0)]
    initial_balance: f64,
    #[arg(long, default_value_t = 0.0)]
    monthly_contribution: f64,
    #[arg(
        long,
        default_value_t = 10.0,
        help = "Expected annual stock return in percent"
    )]
    stock_return: f64,
    #[arg(
        long,
        default_value_t = 16.0,
        help = "Annual stock return volatility in percent"
    )]
    stock_volatility: f64,
    #[arg(
        long,
        default_value_t = 4.0,
        help = "Expected annual bond return in percent"
    )]
    bond_return: f64,
    #[arg(
        long,
        default_value_t = 5.0,
        help = "Annual bond return volatility in percent"
    )]
    bond_volatility: f64,
    #[arg(
        long,
        default_value_t = 0.0,
        help = "Correlation between stock and bond returns"
    )]
    correlation: f64,
    #[arg(long, help = "Fixed seed for reproducible runs")]
    seed: Option<u64>,
    #[arg(long, help = "Omit individual paths from the output")]
    summary_only: bool,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

#[derive(Clone)]
struct AppState {
    engine: Arc<MonteCarloEngine>,
}

/// Trips the token when the request future is dropped before the batch finishes.
struct CancelOnDrop(CancellationToken);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.cancel();
    }
}

pub async fn run_cli(cli: Cli) -> Result<(), String> {
    let engine = build_engine(&cli)?;
    match cli.command {
        Command::Serve { port } => run_http_server(engine, port)
            .await
            .map_err(|e| format!("Server error: {e}")),
        Command::Simulate(args) => {
            let summary_only = args.summary_only;
            let input = build_input(args);
            let mut report = engine
                .run_input(&input, &CancellationToken::new())
                .map_err(|e| e.to_string())?;
            if summary_only {
                report.simulation_results.clear();
            }
            let json = serde_json::to_string_pretty(&report)
                .map_err(|e| format!("Failed to encode report: {e}"))?;
            println!("{json}");
            Ok(())
        }
    }
}

fn build_engine(cli: &Cli) -> Result<MonteCarloEngine, String> {
    let mut settings = match &cli.settings {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .map_err(|e| format!("Failed to read {}: {e}", path.display()))?;
            serde_json::from_str::<EngineSettings>(&raw)
                .map_err(|e| format!("Invalid settings file {}: {e}", path.display()))?
        }
        None => EngineSettings::default(),
    };
    if let Some(max) = cli.max_simulations {
        settings.max_simulations = max;
        settings.default_simulations = settings.default_simulations.min(max);
    }
    if cli.sequential {
        settings.parallel = false;
    }
    MonteCarloEngine::new(settings, MarketParameters::default()).map_err(|e| e.to_string())
}

fn build_input(args: SimulateArgs) -> ScenarioInput {
    ScenarioInput {
        config: SimulationConfig {
            simulation_count: args.simulations,
            time_horizon_years: args.years,
            asset_allocation: AssetAllocation::new(args.stocks / 100.0, args.bonds / 100.0),
            rebalancing: args.rebalancing.into(),
            seed: args.seed,
        },
        financial: FinancialInputs {
            initial_balance: args.initial_balance,
            monthly_contribution: args.monthly_contribution,
        },
        market: MarketParameters {
            stocks: AssetParameters {
                expected_annual_return: args.stock_return / 100.0,
                annual_volatility: args.stock_volatility / 100.0,
            },
            bonds: AssetParameters {
                expected_annual_return: args.bond_return / 100.0,
                annual_volatility: args.bond_volatility / 100.0,
            },
            correlation: args.correlation,
        },
    }
}

fn router(engine: MonteCarloEngine) -> Router {
    let state = AppState {
        engine: Arc::new(engine),
    };
    Router::new()
        .route("/api/health", get(health_handler))
        .route("/api/simulate", post(simulate_handler))
        .route("/api/scenarios", post(scenarios_handler))
        .fallback(not_found_handler)
        .with_state(state)
}

pub async fn run_http_server(engine: MonteCarloEngine, port: u16) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let app = router(engine);

    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "portfolio simulation API listening");

    axum::serve(listener, app).await
}

async fn health_handler() -> Response {
    json_response(
        StatusCode::OK,
        HealthResponse {
            status: "ok",
            version: ENGINE_VERSION,
        },
    )
}

async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

async fn simulate_handler(
    State(state): State<AppState>,
    Json(payload): Json<SimulatePayload>,
) -> Response {
    let include_paths = payload.include_paths.unwrap_or(true);
    let input = input_from_payload(&state.engine, &payload);

    let cancel = CancellationToken::new();
    let _guard = CancelOnDrop(cancel.clone());
    let engine = Arc::clone(&state.engine);
    let joined = tokio::task::spawn_blocking(move || engine.run_input(&input, &cancel)).await;

    match joined {
        Ok(Ok(mut report)) => {
            if !include_paths {
                strip_paths(&mut report);
            }
            json_response(StatusCode::OK, report)
        }
        Ok(Err(err)) => simulation_error_response(&err),
        Err(e) => error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            &format!("simulation worker failed: {e}"),
        ),
    }
}

async fn scenarios_handler(
    State(state): State<AppState>,
    Json(payload): Json<ScenarioPayload>,
) -> Response {
    let include_paths = payload.include_paths.unwrap_or(true);
    let base = input_from_payload(&state.engine, &payload.base);
    let scenarios = payload
        .scenarios
        .iter()
        .map(|(name, p)| (name.clone(), overrides_from_payload(p, &base.market)))
        .collect::<BTreeMap<_, _>>();

    let cancel = CancellationToken::new();
    let _guard = CancelOnDrop(cancel.clone());
    let engine = Arc::clone(&state.engine);
    let joined = tokio::task::spawn_blocking(move || {
        engine.run_scenario_comparison_with_cancel(&base, &scenarios, &cancel)
    })
    .await;

    match joined {
        Ok(Ok(mut comparison)) => {
            if !include_paths {
                strip_comparison_paths(&mut comparison);
            }
            json_response(StatusCode::OK, comparison)
        }
        Ok(Err(err)) => simulation_error_response(&err),
        Err(e) => error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            &format!("simulation worker failed: {e}"),
        ),
    }
}

fn default_input(engine: &MonteCarloEngine) -> ScenarioInput {
    ScenarioInput {
        config: SimulationConfig {
            simulation_count: engine.settings().default_simulations,
            ..SimulationConfig::default()
        },
        financial: FinancialInputs::default(),
        market: *engine.market(),
    }
}

fn input_from_payload(engine: &MonteCarloEngine, payload: &SimulatePayload) -> ScenarioInput {
    let defaults = default_input(engine);
    overrides_from_payload(payload, &defaults.market).apply(&defaults)
}

fn overrides_from_payload(
    payload: &SimulatePayload,
    market: &MarketParameters,
) -> ScenarioOverrides {
    let config = &payload.simulation_config;
    ScenarioOverrides {
        simulation_count: config.simulation_count,
        time_horizon_years: config.time_horizon,
        asset_allocation: config.asset_allocation,
        rebalancing: config.rebalancing.map(Into::into),
        seed: config.seed,
        initial_balance: payload.financial_data.initial_balance,
        monthly_contribution: payload.financial_data.monthly_contribution,
        market: (!payload.market.is_empty()).then(|| payload.market.merged_onto(market)),
    }
}

fn strip_paths(report: &mut SimulationReport) {
    report.simulation_results.clear();
}

fn strip_comparison_paths(comparison: &mut ScenarioComparison) {
    strip_paths(&mut comparison.base);
    comparison.scenarios.values_mut().for_each(strip_paths);
}

fn status_for(err: &SimulationError) -> StatusCode {
    match err {
        SimulationError::Configuration(_) => StatusCode::BAD_REQUEST,
        SimulationError::Computation(_) => StatusCode::INTERNAL_SERVER_ERROR,
        SimulationError::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
    }
}

fn simulation_error_response(err: &SimulationError) -> Response {
    error_response(status_for(err), err.message())
}

fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response {
    let mut response = (status, Json(body)).into_response();
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        "no-store".parse().expect("valid header"),
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

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use serde_json::Value;

    const EPS: f64 = 1e-9;

    fn assert_approx(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() <= EPS,
            "expected {expected}, got {actual}"
        );
    }

    fn test_state() -> AppState {
        AppState {
            engine: Arc::new(MonteCarloEngine::default()),
        }
    }

    fn sample_args() -> SimulateArgs {
        SimulateArgs {
            simulations: 100,
            years: 10,
            stocks: 70.0,
            bonds: 30.0,
            rebalancing: CliRebalancing::Annual,
            initial_balance: 10_000.0,
            monthly_contribution: 200.0,
            stock_return: 10.0,
            stock_volatility: 16.0,
            bond_return: 4.0,
            bond_volatility: 5.0,
            correlation: 0.2,
            seed: Some(42),
            summary_only: false,
        }
    }

    async fn body_json(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body should be readable");
        serde_json::from_slice(&bytes).expect("body should be JSON")
    }

    #[test]
    fn build_input_converts_percentages() {
        let input = build_input(sample_args());
        assert_approx(input.config.asset_allocation.stocks, 0.7);
        assert_approx(input.config.asset_allocation.bonds, 0.3);
        assert_approx(input.market.stocks.expected_annual_return, 0.10);
        assert_approx(input.market.bonds.annual_volatility, 0.05);
        assert_eq!(input.config.rebalancing, RebalancingPolicy::Annual);
        assert_eq!(input.config.seed, Some(42));
    }

    #[tokio::test]
    async fn simulate_command_reports_engine_market_error() {
        let cli = Cli::try_parse_from([
            "portfolio-mc",
            "simulate",
            "--simulations",
            "10",
            "--correlation",
            "1.5",
        ])
        .expect("cli should parse");
        let err = run_cli(cli).await.expect_err("must reject correlation");
        assert_eq!(
            err,
            "invalid configuration: Return correlation must be between -1 and 1"
        );
    }

    #[test]
    fn cli_parses_simulate_subcommand() {
        let cli = Cli::try_parse_from([
            "portfolio-mc",
            "--sequential",
            "simulate",
            "--simulations",
            "250",
            "--years",
            "15",
            "--rebalancing",
            "none",
            "--seed",
            "9",
        ])
        .expect("cli should parse");
        assert!(cli.sequential);
        match cli.command {
            Command::Simulate(args) => {
                assert_eq!(args.simulations, 250);
                assert_eq!(args.years, 15);
                assert_eq!(args.rebalancing, CliRebalancing::None);
                assert_eq!(args.seed, Some(9));
            }
            other => panic!("expected simulate, got {other:?}"),
        }
    }

    #[test]
    fn build_engine_applies_ceiling_and_sequential_flags() {
        let cli = Cli::try_parse_from([
            "portfolio-mc",
            "--max-simulations",
            "500",
            "--sequential",
            "serve",
        ])
        .expect("cli should parse");
        let engine = build_engine(&cli).expect("valid engine");
        assert_eq!(engine.settings().max_simulations, 500);
        assert_eq!(engine.settings().default_simulations, 500);
        assert!(!engine.settings().parallel);
    }

    #[test]
    fn payload_parses_web_keys_and_merges_defaults() {
        let json = r#"{
          "simulationConfig": {
            "simulationCount": 100,
            "timeHorizon": 10,
            "assetAllocation": { "stocks": 0.7, "bonds": 0.3 },
            "rebalancing": "annual",
            "seed": 5
          },
          "financialData": { "initialBalance": 10000, "monthlyContribution": 200 },
          "market": { "stocksReturn": 0.08 }
        }"#;
        let payload: SimulatePayload = serde_json::from_str(json).expect("json should parse");
        let engine = MonteCarloEngine::default();
        let input = input_from_payload(&engine, &payload);

        assert_eq!(input.config.simulation_count, 100);
        assert_eq!(input.config.time_horizon_years, 10);
        assert_approx(input.config.asset_allocation.stocks, 0.7);
        assert_eq!(input.config.rebalancing, RebalancingPolicy::Annual);
        assert_eq!(input.config.seed, Some(5));
        assert_approx(input.financial.initial_balance, 10_000.0);
        assert_approx(input.financial.monthly_contribution, 200.0);
        assert_approx(input.market.stocks.expected_annual_return, 0.08);
        assert_approx(
            input.market.stocks.annual_volatility,
            MarketParameters::default().stocks.annual_volatility,
        );
    }

    #[test]
    fn empty_payload_uses_engine_defaults() {
        let payload: SimulatePayload = serde_json::from_str("{}").expect("json should parse");
        let engine = MonteCarloEngine::default();
        let input = input_from_payload(&engine, &payload);
        assert_eq!(input.config.simulation_count, 1_000);
        assert_eq!(input.config.time_horizon_years, 30);
        assert_eq!(input.market, MarketParameters::default());
    }

    #[test]
    fn rebalancing_aliases_are_accepted() {
        let payload: SimulatePayload =
            serde_json::from_str(r#"{ "config": { "rebalancingPolicy": "yearly" } }"#)
                .expect("json should parse");
        assert_eq!(
            payload.simulation_config.rebalancing,
            Some(ApiRebalancing::Annual)
        );
    }

    #[tokio::test]
    async fn simulate_handler_returns_report_fields() {
        let payload: SimulatePayload = serde_json::from_str(
            r#"{
              "simulationConfig": { "simulationCount": 100, "timeHorizon": 10, "seed": 1 },
              "financialData": { "initialBalance": 10000, "monthlyContribution": 200 }
            }"#,
        )
        .expect("json should parse");
        let response = simulate_handler(State(test_state()), Json(payload)).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CACHE_CONTROL).map(|v| v.as_bytes()),
            Some(&b"no-store"[..])
        );

        let body = body_json(response).await;
        for key in [
            "simulationResults",
            "statisticalAnalysis",
            "confidenceIntervals",
            "insights",
            "summary",
            "timestamp",
            "version",
        ] {
            assert!(body.get(key).is_some(), "missing {key}");
        }
        assert_eq!(body["simulationResults"].as_array().map(Vec::len), Some(100));
        assert!(body["confidenceIntervals"]["95"]["finalValue"].is_number());
        assert!(body["summary"]["worstCase"].is_number());
        assert!(body["summary"]["medianReturn"].is_number());

        let insight = &body["insights"][0];
        for key in ["type", "title", "description", "confidenceLabel", "metric"] {
            assert!(insight.get(key).is_some(), "insight missing {key}");
        }
        assert!(insight.get("confidence").is_none());
    }

    #[tokio::test]
    async fn simulate_handler_rejects_bad_horizon_with_400() {
        let payload: SimulatePayload =
            serde_json::from_str(r#"{ "simulationConfig": { "timeHorizon": 51 } }"#)
                .expect("json should parse");
        let response = simulate_handler(State(test_state()), Json(payload)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(
            body["error"],
            "Time horizon must be between 1 and 50 years"
        );
    }

    #[tokio::test]
    async fn scenarios_handler_runs_named_variants() {
        let payload: ScenarioPayload = serde_json::from_str(
            r#"{
              "base": {
                "simulationConfig": { "simulationCount": 50, "timeHorizon": 5, "seed": 3 },
                "financialData": { "initialBalance": 5000 }
              },
              "scenarios": {
                "aggressive": { "simulationConfig": { "assetAllocation": { "stocks": 1.0, "bonds": 0.0 } } },
                "saver": { "financialData": { "monthlyContribution": 400 } }
              },
              "includePaths": false
            }"#,
        )
        .expect("json should parse");
        let response = scenarios_handler(State(test_state()), Json(payload)).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["base"]["summary"]["simulationCount"], 50);
        assert_eq!(body["scenarios"]["saver"]["summary"]["monthlyContribution"], 400.0);
        assert_eq!(body["scenarios"]["aggressive"]["summary"]["timeHorizonYears"], 5);
        assert_eq!(body["base"]["simulationResults"].as_array().map(Vec::len), Some(0));
    }

    #[tokio::test]
    async fn health_handler_reports_version() {
        let body = body_json(health_handler().await).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["version"], ENGINE_VERSION);
    }

    #[test]
    fn error_statuses_follow_taxonomy() {
        assert_eq!(
            status_for(&SimulationError::Configuration("x".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for(&SimulationError::Computation("x".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            status_for(&SimulationError::Cancelled),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn dropping_guard_cancels_token() {
        let token = CancellationToken::new();
        {
            let _guard = CancelOnDrop(token.clone());
        }
        assert!(token.is_cancelled());
    }
}
