use axum::{
    middleware::from_fn_with_state,
    response::Redirect,
    routing::{get, post},
    Router,
};

use std::net::SocketAddr;
use tower_http::{
    services::ServeDir,
    trace::{DefaultOnFailure, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use uuid::Uuid;

use tracing::Level;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod error;
mod schedule;
mod state;

mod crypto {
    pub mod rsa;
    pub mod token;
}

mod models {
    pub mod class;
    pub mod exam;
    pub mod score;
    pub mod term;
}

mod services {
    pub mod calendar;
    pub mod feed;
    pub mod portal;
    pub mod sso;
}

mod handlers {
    pub mod feed;
    pub mod setup;
}

mod middleware_layer {
    pub mod rate_limit;
}

mod stores {
    pub mod cache;
    pub mod rate_limit;
}

mod validation {
    pub mod setup;
}

use config::Config;
use state::AppState;

/// Assembles the full route tree around one `AppState`.
///
/// The rate limiter wraps only the routes that reach the portal (the feeds
/// and setup); the liveness probe and static page stay outside it. The trace
/// span carries a request id and the path, deliberately not the query
/// string, tokens must never reach the logs.
pub fn build_router(state: AppState) -> Router {
    let feed_routes = Router::new()
        .route("/sub", get(handlers::feed::sub_calendar))
        .route("/ical", get(handlers::feed::fetch_calendar))
        .route("/subScore", get(handlers::feed::sub_score_calendar))
        .route("/score", get(handlers::feed::fetch_score_calendar))
        .route("/setup", post(handlers::setup::setup))
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware_layer::rate_limit::rate_limit,
        ))
        .with_state(state);

    Router::new()
        .route("/", get(|| async { Redirect::to("/static/") }))
        .route("/ping", get(handlers::feed::ping))
        .merge(feed_routes)
        .nest_service("/static", ServeDir::new("web/app"))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &axum::extract::Request| {
                    tracing::info_span!(
                        "request",
                        reqid = %Uuid::new_v4(),
                        method = %request.method(),
                        path = %request.uri().path(),
                    )
                })
                .on_request(DefaultOnRequest::default().level(Level::DEBUG))
                .on_response(DefaultOnResponse::default().level(Level::DEBUG))
                .on_failure(DefaultOnFailure::default().level(Level::ERROR)),
        )
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    dotenvy::dotenv().ok();

    let config = Config::from_env()?;
    tracing::info!("✅ Configuration loaded successfully");
    if let Some(header) = &config.ip_header {
        tracing::info!("🔎 Client identity read from the {} header", header.as_str());
    }

    let state = AppState::new(&config).await?;
    tracing::info!("✅ AppState initialized");

    let app = build_router(state);

    let addr = config.bind_addr;
    tracing::info!("🚀 Server listening on http://{}", addr);
    tracing::info!("📝 Setup page at http://{}/static/", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
