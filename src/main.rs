mod auth;
mod config;
mod db;
mod docs;
mod handlers;
mod models;
mod routes;
mod services;
mod ws;

use axum::{routing::get, Router};
use std::panic;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use config::Config;
use db::memory::MemoryStore;
use db::ResponseStore;
use docs::ApiDoc;
use routes::create_api_routes;
use services::directory::{Directory, FormCatalog};
use ws::collab::Collab;
use ws::handler::formanswer_handler;
use ws::lease::InMemoryLeaseStore;
use ws::room::RoomRegistry;

/// Shared state behind every HTTP handler and websocket session.
pub struct AppState {
    pub catalog: Arc<dyn FormCatalog>,
    pub directory: Arc<dyn Directory>,
    pub collab: Arc<Collab>,
    pub rooms: Arc<RoomRegistry>,
}

#[tokio::main]
async fn main() {
    // Set panic hook for better error messages
    panic::set_hook(Box::new(|info| {
        eprintln!("PANIC: {info}");
    }));

    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            // Default to info level, but allow debug for our app
            "colabri_form=debug,tower_http=debug,axum::rejection=trace,info".into()
        }))
        .init();

    info!("Starting server...");

    // Load configuration
    let config = Config::load().unwrap_or_else(|e| {
        error!("Failed to load configuration: {}", e);
        warn!("Using default configuration");
        Config::default()
    });
    config::set_config(config.clone());
    if config.jwt_secret.is_none() {
        warn!("No JWT secret configured - all authenticated requests will fail");
    }

    ws::userctx::init_user_name_cache();

    // Pick the backing store: Postgres when a URL is configured, the
    // in-memory store otherwise.
    let (store, catalog, directory): (
        Arc<dyn ResponseStore>,
        Arc<dyn FormCatalog>,
        Arc<dyn Directory>,
    ) = match &config.db_url {
        Some(db_url) => match db::dbform::init_db(db_url).await {
            Ok(()) => {
                info!("Database initialized successfully");
                let db = db::dbform::get_db().expect("Database initialized above");
                (db.clone(), db.clone(), db)
            }
            Err(e) => {
                error!("Failed to initialize database: {}", e);
                warn!("Falling back to the in-memory store - data will not survive restarts");
                memory_backend()
            }
        },
        None => {
            warn!("No database URL configured - using the in-memory store");
            memory_backend()
        }
    };

    let rooms = Arc::new(RoomRegistry::new());
    let collab = Arc::new(Collab::new(
        Arc::new(InMemoryLeaseStore::with_system_clock()),
        store,
        directory.clone(),
        rooms.clone(),
        chrono::Duration::seconds(config.lease_ttl_secs as i64),
    ));
    let app_state = Arc::new(AppState {
        catalog,
        directory,
        collab,
        rooms,
    });

    // Combine all routes
    let app_routes = Router::new()
        // Mount API routes
        .nest("/api", create_api_routes(app_state.clone()))
        // Mount the collaboration websocket
        .route(
            "/formanswer",
            get(formanswer_handler).with_state(app_state),
        )
        // Mount Swagger UI
        .merge(SwaggerUi::new("/swagger").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(cors_layer(&config))
        // Add tracing layer
        .layer(TraceLayer::new_for_http());

    // Start the HTTP/API server
    let listener = tokio::net::TcpListener::bind(config.server_address())
        .await
        .unwrap_or_else(|_| panic!("Failed to bind to {}", config.server_address()));

    info!("🚀 Server running on http://{}", config.server_address());
    info!(
        "📡 WebSocket available at ws://{}/formanswer",
        config.server_address()
    );
    info!(
        "📚 Swagger UI available at http://{}/swagger",
        config.server_address()
    );

    axum::serve(listener, app_routes)
        .await
        .expect("Server failed to start");
}

fn memory_backend() -> (
    Arc<dyn ResponseStore>,
    Arc<dyn FormCatalog>,
    Arc<dyn Directory>,
) {
    let store = Arc::new(MemoryStore::new());
    (store.clone(), store.clone(), store)
}

fn cors_layer(config: &Config) -> CorsLayer {
    match &config.cors_origins {
        Some(origins) => {
            let origins: Vec<axum::http::HeaderValue> = origins
                .split(',')
                .filter_map(|origin| origin.trim().parse().ok())
                .collect();
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods(Any)
                .allow_headers(Any)
        }
        None => CorsLayer::permissive(),
    }
}
