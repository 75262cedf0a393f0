//! Questline Engine - Main entry point.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::{HeaderValue, Method};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use questline_engine::app::{App, GameRules, Repositories};
use questline_engine::infrastructure::{
    catalog::{builtin_catalog, load_catalog},
    clock::{SeededRandom, SystemClock, SystemRandom},
    ports::RandomPort,
    settings::EngineSettings,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment from repo root (the engine may run from `crates/engine`).
    load_dotenv_from_repo_root();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "questline_engine=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Questline Engine");

    // Load configuration
    let settings = EngineSettings::from_env()?;

    let catalog = match &settings.catalog_path {
        Some(path) => load_catalog(path).await?,
        None => builtin_catalog()?,
    };

    let repositories = if settings.uses_memory_store() {
        tracing::warn!("SESSION_DB=:memory:, characters and sessions will not survive a restart");
        Repositories::in_memory()
    } else {
        tracing::info!(path = %settings.session_db, "Opening database");
        Repositories::sqlite(&settings.session_db).await?
    };

    let random: Arc<dyn RandomPort> = match settings.random_seed {
        Some(seed) => {
            tracing::info!(seed, "Using seeded randomness");
            Arc::new(SeededRandom::new(seed))
        }
        None => Arc::new(SystemRandom::new()),
    };

    tracing::info!(
        defeat_penalty = %settings.defeat_penalty,
        max_auto_turns = settings.max_auto_turns,
        "Game rules configured"
    );

    // Create application
    let app = Arc::new(App::new(
        repositories,
        catalog,
        Arc::new(SystemClock::new()),
        random,
        GameRules {
            defeat_penalty: settings.defeat_penalty,
            max_auto_turns: settings.max_auto_turns,
        },
    ));

    let mut router = questline_engine::api::http::routes()
        .with_state(app)
        .layer(TraceLayer::new_for_http());

    if let Some(cors) = build_cors_layer(settings.cors_allowed_origins.as_deref()) {
        router = router.layer(cors);
    }

    // Start server
    let addr: SocketAddr = format!("{}:{}", settings.server_host, settings.server_port).parse()?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}

fn load_dotenv_from_repo_root() {
    let repo_root = std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("..");

    // Prefer local overrides.
    for filename in [".env.local", ".env"] {
        let path = repo_root.join(filename);
        if path.exists() {
            let _ = dotenvy::from_path(path);
        }
    }
}

fn build_cors_layer(allowed_origins: Option<&str>) -> Option<CorsLayer> {
    let allowed_origins = allowed_origins.map(str::trim).filter(|s| !s.is_empty())?;

    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([axum::http::header::CONTENT_TYPE]);

    if allowed_origins == "*" {
        return Some(cors.allow_origin(Any));
    }

    let origins: Vec<HeaderValue> = allowed_origins
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|s| HeaderValue::from_str(s).ok())
        .collect();

    if origins.is_empty() {
        return None;
    }
    Some(cors.allow_origin(origins))
}
