//! Axum demo for mining-session-engine
//!
//! Serves a tiny HTTP API over a [`MiningEngine`] persisted with Sea-ORM, and
//! logs every unattended completion.
//!
//! # Running the demo
//!
//! 1. Optionally point DATABASE_URL at a database (defaults to a local SQLite
//!    file):
//!    ```bash
//!    export DATABASE_URL=sqlite://mining.db?mode=rwc
//!    ```
//! 2. Run the demo:
//!    ```bash
//!    cargo run --example axum_demo
//!    ```
//!
//! # Trying it out
//!
//! ```bash
//! curl -X POST "http://127.0.0.1:3000/start?entity=main&rate=1000&account=user-1"
//! curl "http://127.0.0.1:3000/status"
//! curl -X POST "http://127.0.0.1:3000/collect?entity=main"
//! curl -X POST "http://127.0.0.1:3000/reset"
//! ```

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use dotenvy::dotenv;
use mining_session_engine::bonus::FixedBonus;
use mining_session_engine::migration::{Migrator, MigratorTrait};
use mining_session_engine::store::SeaOrmStore;
use mining_session_engine::{EngineConfig, MiningEngine};
use sea_orm::{ConnectOptions, Database};
use std::{
    collections::{BTreeMap, HashMap},
    env,
    net::SocketAddr,
    time::Duration,
};
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    dotenv().ok();

    let database_url =
        env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://mining.db?mode=rwc".to_string());
    info!("Connecting to database: {}", database_url);

    let mut opt = ConnectOptions::new(database_url);
    opt.max_connections(5)
        .connect_timeout(Duration::from_secs(10))
        .acquire_timeout(Duration::from_secs(10));
    let db = Database::connect(opt).await?;
    Migrator::up(&db, None).await?;

    // Clan members mine 20% faster
    let bonus = FixedBonus::new(1.0).with_account("user-1", 1.2);
    let session_minutes = env::var("SESSION_MINUTES")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(8 * 60);
    let engine = MiningEngine::builder(SeaOrmStore::new(db), bonus)
        .with_config(
            EngineConfig::default().with_session_duration(time::Duration::minutes(session_minutes)),
        )
        .build();

    let mut completions = engine.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = completions.recv().await {
            info!(
                "{} finished mining, {:.2} coins ready to sync",
                event.entity_id, event.reward_amount
            );
        }
    });

    let report = engine.recover_on_startup().await;
    info!(
        "Recovered {} running and {} finished sessions",
        report.resumed.len(),
        report.expired.len()
    );

    let app = Router::new()
        .route("/start", post(start))
        .route("/collect", post(collect))
        .route("/status", get(status))
        .route("/reset", post(reset))
        .with_state(engine.clone());

    let addr = SocketAddr::from(([127, 0, 0, 1], 3000));
    info!("Server starting on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app.into_make_service()).await?;

    engine.shutdown().await;
    Ok(())
}

/// Example: POST /start?entity=main&rate=1000&account=user-1
async fn start(
    State(engine): State<MiningEngine>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let entity = params.get("entity").map(String::as_str).unwrap_or("main");
    let Some(rate) = params.get("rate").and_then(|r| r.parse::<f64>().ok()) else {
        return (StatusCode::BAD_REQUEST, "Missing or invalid rate".to_string());
    };

    match engine
        .start(entity, rate, params.get("account").map(String::as_str))
        .await
    {
        Ok(true) => (StatusCode::OK, format!("Started mining for '{}'", entity)),
        Ok(false) => (
            StatusCode::CONFLICT,
            format!("'{}' is already mining", entity),
        ),
        Err(e) => (
            StatusCode::BAD_GATEWAY,
            format!("Failed to start mining: {}", e),
        ),
    }
}

/// Example: POST /collect?entity=main
async fn collect(
    State(engine): State<MiningEngine>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let entity = params.get("entity").map(String::as_str).unwrap_or("main");
    let reward = engine.collect(entity).await;
    (StatusCode::OK, format!("Collected {:.2} from '{}'", reward, entity))
}

/// Example: GET /status or GET /status?entity=main
async fn status(
    State(engine): State<MiningEngine>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let statuses = match params.get("entity") {
        Some(entity) => BTreeMap::from([(entity.clone(), engine.status(entity).await)]),
        None => engine.status_all().await,
    };

    let body = statuses
        .iter()
        .map(|(entity, status)| {
            format!(
                "{}: active={} remaining={:.0}s accrued={:.2}",
                entity, status.is_active, status.time_remaining_secs, status.accrued_estimate
            )
        })
        .collect::<Vec<_>>()
        .join("\n");
    (StatusCode::OK, body)
}

/// Example: POST /reset or POST /reset?entity=main
async fn reset(
    State(engine): State<MiningEngine>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    match params.get("entity") {
        Some(entity) => {
            engine.reset(entity).await;
            (StatusCode::OK, format!("Reset '{}'", entity))
        }
        None => {
            engine.reset_all().await;
            (StatusCode::OK, "Reset all sessions".to_string())
        }
    }
}
