use axum::http::{header, HeaderName, HeaderValue, Method};
use axum::Router;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::ai_routes::SESSION_HEADER;
use crate::config::GatewayConfig;
use crate::state::AppState;
use crate::{
    ai_routes, builder_routes, campaign_routes, dashboard_routes, health, rule_routes,
    segment_routes,
};

pub fn build_app(state: AppState, config: &GatewayConfig) -> Router {
    Router::new()
        .merge(health::router(state.clone()))
        .merge(segment_routes::router(state.clone()))
        .merge(campaign_routes::router(state.clone()))
        .merge(rule_routes::router(state.clone()))
        .merge(ai_routes::router(state.clone()))
        .merge(dashboard_routes::router(state.clone()))
        .merge(builder_routes::router(state))
        .layer(cors_layer(&config.allowed_origins))
        .layer(TraceLayer::new_for_http())
}

/// `*` anywhere in the list allows every origin.
pub fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let allow_origin = if allowed_origins.iter().any(|origin| origin == "*") {
        AllowOrigin::any()
    } else {
        let origins: Vec<HeaderValue> = allowed_origins
            .iter()
            .filter_map(|origin| match origin.parse::<HeaderValue>() {
                Ok(value) => Some(value),
                Err(err) => {
                    warn!(%origin, ?err, "ignoring invalid CORS origin");
                    None
                }
            })
            .collect();
        if origins.is_empty() {
            AllowOrigin::any()
        } else {
            AllowOrigin::list(origins)
        }
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(AllowMethods::list([Method::GET, Method::POST, Method::OPTIONS]))
        .allow_headers(AllowHeaders::list([
            header::CONTENT_TYPE,
            header::ACCEPT,
            HeaderName::from_static(SESSION_HEADER),
        ]))
}
