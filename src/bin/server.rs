use std::sync::Arc;

use axum::{
    Json, Router,
    http::StatusCode,
    routing::{get, post},
};
use bar_optimizer::cache::PatternCache;
use bar_optimizer::engine::Optimizer;
use bar_optimizer::error::Error;
use bar_optimizer::progress::TracingSink;
use bar_optimizer::types::{
    CuttingSpec, DistributionPlan, Pattern, PieceDef, deserialize_u64_from_number,
};
use serde::{Deserialize, Serialize};
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

#[derive(Deserialize, Serialize)]
struct OptimizeRequest {
    stock_length: f64,
    pieces: Vec<PieceRequest>,
    #[serde(default)]
    blade_width: f64,
    #[serde(default)]
    trim_allowance: f64,
    #[serde(default = "default_factors")]
    bundle_factors: Vec<u32>,
    /// Unlimited manual cuts unless the client caps them.
    #[serde(default)]
    manual_cut_cap: Option<u64>,
    #[serde(default)]
    max_surplus: u64,
    #[serde(default = "default_time_budget")]
    time_budget_secs: u64,
}

#[derive(Deserialize, Serialize)]
struct PieceRequest {
    name: String,
    length: f64,
    #[serde(deserialize_with = "deserialize_u64_from_number")]
    demand: u64,
}

fn default_factors() -> Vec<u32> {
    vec![1]
}

fn default_time_budget() -> u64 {
    30
}

#[derive(Serialize)]
struct OptimizeResponse {
    patterns: Vec<PatternResponse>,
    plan: DistributionPlan,
    total_bars: u64,
}

#[derive(Serialize)]
struct PatternResponse {
    counts: Vec<u32>,
    used_length: f64,
    waste: f64,
}

fn error_response(err: Error) -> (StatusCode, String) {
    let status = match err {
        Error::InvalidSpecification(_) => StatusCode::BAD_REQUEST,
        Error::NoFeasiblePattern { .. } | Error::NoFeasibleDistribution { .. } => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
    };
    (status, err.to_string())
}

async fn optimize(
    Json(req): Json<OptimizeRequest>,
) -> Result<Json<OptimizeResponse>, (StatusCode, String)> {
    tracing::info!(
        body = serde_json::to_string(&req).unwrap_or_default(),
        "POST /optimize"
    );

    let spec = CuttingSpec {
        stock_length: req.stock_length,
        blade_width: req.blade_width,
        trim_allowance: req.trim_allowance,
        pieces: req
            .pieces
            .into_iter()
            .map(|p| PieceDef {
                name: p.name,
                length: p.length,
                demand: p.demand,
            })
            .collect(),
        bundle_factors: req.bundle_factors,
        manual_cut_cap: req.manual_cut_cap.unwrap_or(u64::MAX),
        max_surplus: req.max_surplus,
        time_budget_secs: req.time_budget_secs,
    };

    let cache_dir =
        std::env::var("PATTERN_CACHE_DIR").unwrap_or_else(|_| "pattern_cache".to_string());
    let optimizer = Optimizer::new(
        spec.clone(),
        PatternCache::new(cache_dir),
        Arc::new(TracingSink),
    )
    .map_err(error_response)?;

    // The run blocks for up to the time budget; keep it off the async workers.
    let outcome = tokio::task::spawn_blocking(move || optimizer.run())
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?
        .map_err(error_response)?;

    let response = OptimizeResponse {
        patterns: outcome
            .patterns
            .iter()
            .map(|p: &Pattern| PatternResponse {
                counts: p.counts.clone(),
                used_length: p.used_length,
                waste: p.waste(spec.stock_length),
            })
            .collect(),
        total_bars: outcome.plan.total_bars(),
        plan: outcome.plan,
    };

    Ok(Json(response))
}

#[tokio::main]
async fn main() {
    let _sentry = std::env::var("SENTRY_DSN").ok().map(|dsn| {
        sentry::init((
            dsn,
            sentry::ClientOptions {
                release: sentry::release_name!(),
                ..Default::default()
            },
        ))
    });

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open("development.log")
        .expect("failed to open development.log");

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_target(false)
        .with_ansi(false)
        .with_max_level(Level::INFO)
        .init();

    let port = std::env::var("PORT").unwrap_or_else(|_| "3001".to_string());
    let addr = format!("0.0.0.0:{port}");

    let app = Router::new()
        .route("/up", get(|| async { "ok" }))
        .route("/optimize", post(optimize))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        );

    let listener = tokio::net::TcpListener::bind(&addr).await.unwrap();
    eprintln!("Listening on {addr}");
    axum::serve(listener, app).await.unwrap();
}
