pub mod api;
mod config;
mod feed;
mod shapes;
mod tracker;

use std::sync::Arc;

use axum::{routing::get, Router};
use geojson::FeatureCollection;
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use config::Config;
use tracker::VehicleTracker;

#[derive(OpenApi)]
#[openapi(
    info(title = "Trolley API", version = "0.1.0"),
    paths(
        api::vehicles::list_vehicles,
        api::vehicles::stream_status,
        api::shapes::list_shapes,
        api::health::health_check,
    ),
    components(schemas(
        api::vehicles::StreamStatusResponse,
        api::health::HealthResponse,
        feed::types::ConnectionState,
    )),
    tags(
        (name = "vehicles", description = "Live vehicle positions"),
        (name = "shapes", description = "Route shape layer"),
        (name = "health", description = "Service health check")
    )
)]
struct ApiDoc;

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=info".into()),
        )
        .init();

    // Load config
    let config_path =
        std::env::var("TROLLEY_CONFIG").unwrap_or_else(|_| "config.yaml".to_string());
    let config = Config::load(&config_path).expect("Failed to load config");
    tracing::info!(endpoint = %config.feed.endpoint, "Loaded configuration");

    // Build CORS layer based on config
    let cors_layer = if config.cors_permissive {
        tracing::warn!("CORS: Permissive mode explicitly enabled (all origins allowed) - DO NOT USE IN PRODUCTION");
        CorsLayer::permissive()
    } else if !config.cors_origins.is_empty() {
        tracing::info!(origins = ?config.cors_origins, "CORS: Restricting to configured origins");
        let origins: Vec<_> = config
            .cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([
                axum::http::Method::GET,
                axum::http::Method::POST,
                axum::http::Method::OPTIONS,
            ])
            .allow_headers([axum::http::header::CONTENT_TYPE])
    } else {
        panic!("CORS configuration error: Either set 'cors_origins' with allowed origins, or set 'cors_permissive: true' for development");
    };

    // Build the route shape layer
    let shape_layer = match &config.shapes.document {
        Some(path) => {
            let document = shapes::load_document(path).expect("Failed to load shape document");
            let layer = shapes::build_layer(&document);
            tracing::info!(shapes = layer.features.len(), "Loaded route shape layer");
            Arc::new(layer)
        }
        None => {
            tracing::info!("No shape document configured, serving an empty layer");
            Arc::new(FeatureCollection {
                bbox: None,
                features: vec![],
                foreign_members: None,
            })
        }
    };

    // Start the stream consumer in background
    let tracker = Arc::new(VehicleTracker::new(config.feed.clone()));
    let endpoint = config
        .feed
        .api_key
        .is_some()
        .then(|| config.feed.endpoint.clone());
    let tracker_clone = tracker.clone();
    tokio::spawn(async move {
        tracker_clone.run().await;
    });

    // Build the app
    let app = Router::new()
        .route("/", get(root))
        .nest("/api", api::router(&tracker, shape_layer, endpoint))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer);

    // Start server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind server address");

    tracing::info!("Server running on http://{}", addr);
    tracing::info!("Swagger UI: http://{}/swagger-ui", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Failed to start server");

    // Close the stream so anyone still watching sees it reported closed
    tracker.stop().await;
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
}

async fn root() -> &'static str {
    "Trolley API"
}
