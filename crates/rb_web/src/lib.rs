use std::sync::Arc;

use axum::http::HeaderValue;
use axum::routing::{delete, get, post};
use axum::Router;
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub mod error;
pub mod handlers;
pub mod jobs;
pub mod state;

pub use error::{ApiError, ApiResult};
pub use state::{AppState, ServerConfig};

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if allowed_origins.iter().any(|o| o == "*") {
        return layer.allow_origin(Any);
    }
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin.trim()) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(origins))
}

pub fn create_app(state: AppState) -> Router {
    let cors = cors_layer(&state.config.allowed_origins);

    Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        .route("/sources", get(handlers::list_sources))
        .route("/analyze/papers-with-ai", post(handlers::analyze_papers))
        .route("/analyze/research-gaps", post(handlers::research_gaps))
        .route("/analyze/research-scope", post(handlers::research_scope))
        .route("/generate/comprehensive-report", post(handlers::comprehensive_report))
        .route("/search", post(handlers::start_search))
        .route("/search/status/:session_id", get(handlers::search_status))
        .route("/search/results/:session_id", get(handlers::search_results))
        .route("/sessions", get(handlers::list_sessions))
        .route("/sessions/:session_id", delete(handlers::delete_session))
        .route("/papers/:paper_id/chat", post(handlers::chat_with_paper))
        .route("/papers/:paper_id/chat/history", get(handlers::chat_history))
        .fallback(handlers::not_found)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(cors))
        .with_state(Arc::new(state))
}

pub mod prelude {
    pub use crate::{create_app, AppState, ServerConfig};
    pub use rb_core::{Error, Result};
}
