use axum::{middleware as axum_middleware, Router};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::{
    handlers::proxy::{forward, Upstream},
    middleware::gate::request_gate,
    state::GateState,
};

/// Every request goes through the gate; whatever passes is proxied upstream.
pub fn build_router(gate: GateState, upstream: Upstream) -> Router {
    Router::new()
        .fallback(forward)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(axum_middleware::from_fn_with_state(gate, request_gate)),
        )
        .with_state(upstream)
}
