use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use axum::{
    routing::{get, patch, post},
    Router,
};
use tokio::sync::Mutex;
use tracing::info;
use tracing_subscriber::EnvFilter;

use stratosphere_common::Config;
use stratosphere_scout::adapters::{
    AnnouncementSearchAdapter, SocialFirehoseAdapter, SourceAdapter, TrendingMarketAdapter,
};
use stratosphere_scout::controller::{Controller, RunConfig};
use stratosphere_scout::drafter::TemplateDrafter;
use stratosphere_scout::enrich::HttpEnricher;
use stratosphere_store::PgLeadStore;

mod rest;

pub struct AppState {
    pub store: Arc<PgLeadStore>,
    pub controller: Arc<Controller>,
    pub rate_limiter: Mutex<HashMap<IpAddr, Vec<Instant>>>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("stratosphere=info".parse()?),
        )
        .init();

    let config = Config::from_env();

    let store = Arc::new(PgLeadStore::connect(&config.database_url).await?);
    store.migrate().await?;

    let adapters: Vec<Arc<dyn SourceAdapter>> = vec![
        Arc::new(TrendingMarketAdapter::new(&config.market_api_key)),
        Arc::new(AnnouncementSearchAdapter::new(store.clone())),
        Arc::new(SocialFirehoseAdapter::new(&config.apify_api_token)),
    ];
    let controller = Arc::new(Controller::new(
        store.clone(),
        adapters,
        Arc::new(HttpEnricher::new()),
        Arc::new(TemplateDrafter::default()),
        RunConfig::from(&config),
    ));

    let state = Arc::new(AppState {
        store,
        controller,
        rate_limiter: Mutex::new(HashMap::new()),
    });

    let app = Router::new()
        .route("/pipeline/run", post(rest::run_pipeline))
        .route("/pipeline/stop", post(rest::stop_pipeline))
        .route("/pipeline/status", get(rest::pipeline_status))
        .route("/pipeline/logs", get(rest::pipeline_logs))
        .route("/leads", get(rest::list_leads))
        .route("/leads/stats", get(rest::lead_stats))
        .route("/leads/export.csv", get(rest::export_csv))
        .route("/leads/{id}", patch(rest::update_lead))
        .route("/health", get(rest::health))
        .with_state(state)
        .layer(
            tower_http::cors::CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
        // Method + path + status + latency only.
        .layer(
            tower_http::trace::TraceLayer::new_for_http().make_span_with(
                |request: &axum::http::Request<_>| {
                    tracing::info_span!(
                        "http_request",
                        method = %request.method(),
                        path = %request.uri().path(),
                    )
                },
            ),
        );

    let addr = format!("{}:{}", config.web_host, config.web_port);
    info!("Stratosphere API starting on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .await?;

    Ok(())
}
