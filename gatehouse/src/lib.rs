//! # gatehouse: visitor management for gated residences
//!
//! `gatehouse` runs the front gate of a residential community. Visitors register themselves
//! through a web form, residents approve or reject the visit from a link in an email, and guards
//! check approved visitors in with a 4-digit verification code and check them out again when
//! they leave.
//!
//! ## Lifecycle
//!
//! ```text
//!  submit ──► pending ──approve──► approved ──verify(code)──► inside ──check out──► completed
//!                │
//!                └──reject──► rejected
//! ```
//!
//! The state machine lives in [`lifecycle`]. Status (`pending`, `approved`, `rejected`) is a
//! column; being inside or done is tracked by the entry/exit timestamps. Residents are created
//! on first mention by a visitor ([`db::handlers::Residents::ensure`]).
//!
//! Two events send email through [`notifications`]: a new request (to the resident, with
//! approve/reject links) and an approval (to the visitor, with their code). Delivery is
//! best-effort and never holds up or fails the HTTP request.
//!
//! ## Architecture
//!
//! The HTTP layer is [Axum](https://github.com/tokio-rs/axum); all state is in PostgreSQL,
//! accessed through repositories in [`db`]. Routes are nested under `/api`:
//!
//! | Method | Path | |
//! |---|---|---|
//! | POST | `/api/visitor-request` | submit a request |
//! | GET | `/api/visitors` | list requests, newest first |
//! | PUT | `/api/visitor-status/{id}` | approve or reject |
//! | POST | `/api/guard-verify` | check in with a code |
//! | PUT | `/api/visitor-exit/{id}` | check out |
//!
//! ## Quick Start
//!
//! ```no_run
//! use clap::Parser;
//! use gatehouse::{Application, Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let args = gatehouse::config::Args::parse();
//!     let config = Config::load(&args)?;
//!
//!     gatehouse::telemetry::init_telemetry(config.enable_otel_export)?;
//!
//!     let app = Application::new(config).await?;
//!     app.serve(async {
//!         let _ = tokio::signal::ctrl_c().await;
//!     })
//!     .await?;
//!
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod config;
pub mod db;
mod email;
pub mod errors;
pub mod lifecycle;
pub mod notifications;
mod openapi;
pub mod telemetry;
pub mod types;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

use axum::{
    Json, Router,
    http::{HeaderValue, Method, header},
    routing::{get, post, put},
};
use bon::Builder;
pub use config::Config;
use config::CorsOrigin;
use lifecycle::VisitorLifecycle;
use notifications::NotificationDispatcher;
use openapi::ApiDoc;
use sqlx::{PgPool, postgres::PgPoolOptions};
use tokio::net::TcpListener;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{Level, debug, info, instrument};
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

pub use types::{ResidentId, VisitorId};

/// Application state shared across all request handlers.
///
/// ```ignore
/// let state = AppState::builder()
///     .db(pool)
///     .config(config)
///     .notifications(dispatcher)
///     .build();
/// ```
#[derive(Clone, Builder)]
pub struct AppState {
    pub db: PgPool,
    pub config: Config,
    #[builder(default)]
    pub notifications: NotificationDispatcher,
}

impl AppState {
    /// A lifecycle controller over this state's pool, notifier and lifecycle settings
    pub fn lifecycle(&self) -> VisitorLifecycle {
        VisitorLifecycle::new(self.db.clone(), self.notifications.clone(), self.config.lifecycle.clone())
    }
}

/// Get the gatehouse database migrator
pub fn migrator() -> sqlx::migrate::Migrator {
    sqlx::migrate!("./migrations")
}

#[instrument(skip_all)]
async fn setup_database(config: &Config) -> anyhow::Result<PgPool> {
    let settings = &config.database.pool;
    let pool = PgPoolOptions::new()
        .max_connections(settings.max_connections)
        .min_connections(settings.min_connections)
        .acquire_timeout(settings.acquire_timeout())
        .idle_timeout(settings.idle_timeout())
        .max_lifetime(settings.max_lifetime())
        .connect(&config.database.url)
        .await?;

    migrator().run(&pool).await?;
    info!(max_connections = settings.max_connections, "Database ready");

    Ok(pool)
}

/// Create CORS layer from configuration
fn create_cors_layer(config: &Config) -> anyhow::Result<CorsLayer> {
    let cors_config = &config.cors;

    let allow_origin = if cors_config.allowed_origins.iter().any(|o| matches!(o, CorsOrigin::Wildcard)) {
        AllowOrigin::any()
    } else {
        let mut origins = Vec::new();
        for origin in &cors_config.allowed_origins {
            if let CorsOrigin::Url(url) = origin {
                // Origins never carry the trailing slash `Url` adds
                origins.push(url.as_str().trim_end_matches('/').parse::<HeaderValue>()?);
            }
        }
        AllowOrigin::list(origins)
    };

    let mut cors = CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::PUT])
        .allow_headers([header::CONTENT_TYPE])
        .allow_credentials(cors_config.allow_credentials);

    if let Some(max_age) = cors_config.max_age {
        cors = cors.max_age(std::time::Duration::from_secs(max_age));
    }

    Ok(cors)
}

/// Build the application router: lifecycle routes under `/api`, health check, OpenAPI
/// document and docs UI, wrapped in CORS and request tracing.
#[instrument(skip_all)]
pub fn build_router(state: AppState) -> anyhow::Result<Router> {
    let cors_layer = create_cors_layer(&state.config)?;

    let api_routes = Router::new()
        .route("/visitor-request", post(api::handlers::visitors::create_visitor_request))
        .route("/visitors", get(api::handlers::visitors::list_visitors))
        .route("/visitor-status/{id}", put(api::handlers::visitors::update_visitor_status))
        .route("/guard-verify", post(api::handlers::visitors::guard_verify))
        .route("/visitor-exit/{id}", put(api::handlers::visitors::visitor_exit))
        .with_state(state);

    let router = Router::new()
        .route("/healthz", get(|| async { "OK" }))
        .route("/api-docs/openapi.json", get(|| async { Json(ApiDoc::openapi()) }))
        .merge(Scalar::with_url("/docs", ApiDoc::openapi()))
        .nest("/api", api_routes)
        .layer(cors_layer)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        );

    Ok(router)
}

pub struct Application {
    router: Router,
    config: Config,
    pool: PgPool,
}

impl Application {
    /// Connect to the database, run migrations and set up notifications from `config`
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        debug!("Starting gatehouse with configuration: {:#?}", config);

        let pool = setup_database(&config).await?;
        let notifications = NotificationDispatcher::from_config(&config)?;

        Self::new_with_pool(config, pool, notifications).await
    }

    /// Build around an existing, already migrated pool
    pub async fn new_with_pool(config: Config, pool: PgPool, notifications: NotificationDispatcher) -> anyhow::Result<Self> {
        let state = AppState::builder()
            .db(pool.clone())
            .config(config.clone())
            .notifications(notifications)
            .build();

        let router = build_router(state)?;

        Ok(Self { router, config, pool })
    }

    /// Convert application into a test server (for tests)
    #[cfg(any(test, feature = "test-utils"))]
    pub fn into_test_server(self) -> axum_test::TestServer {
        axum_test::TestServer::new(self.router).expect("Failed to create test server")
    }

    /// Start serving the application
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!("Gatehouse listening on http://{}", bind_addr);

        axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(shutdown)
            .await?;

        info!("Closing database connections...");
        self.pool.close().await;

        info!("Shutting down telemetry...");
        telemetry::shutdown_telemetry();

        Ok(())
    }
}
