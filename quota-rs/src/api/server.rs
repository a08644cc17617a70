//! API Server - HTTP server for REST API

use axum::{
    extract::{FromRequestParts, State},
    http::{header::AUTHORIZATION, request::Parts, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::api::handlers::{self, ApiError, AppState};
use crate::context::RequestContext;

/// API Server configuration
pub struct ApiServer {
    state: Arc<AppState>,
    addr: String,
}

impl ApiServer {
    /// Create a new API server
    pub fn new(state: AppState, addr: String) -> Self {
        Self {
            state: Arc::new(state),
            addr,
        }
    }

    pub fn router(&self) -> Router {
        build_router(self.state.clone())
    }

    /// Start the API server
    pub async fn run(&self) -> std::io::Result<()> {
        let router = self.router();

        info!("Starting API server on {}", self.addr);

        let listener = tokio::net::TcpListener::bind(&self.addr).await?;
        axum::serve(listener, router).await?;

        Ok(())
    }
}

/// Build the router with all routes
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Public routes (no auth required)
    let public_routes = Router::new().route("/health", get(handlers::health));

    // Protected routes (auth required)
    let protected_routes = Router::new()
        .route("/quota-status/:user_id", get(handlers::get_quota_status))
        .route(
            "/quota-status/:user_id/validate",
            get(handlers::validate_quota),
        )
        .route("/quota-status/:user_id/repair", post(handlers::repair_quota))
        .route(
            "/posts",
            get(handlers::list_posts).post(handlers::create_post),
        )
        .route("/posts/:id/approve", post(handlers::approve_post))
        .route("/posts/:id/publish-confirm", post(handlers::publish_confirm))
        .route("/posts/:id/publish-failed", post(handlers::publish_failed))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new()
        .merge(public_routes)
        .nest("/api", protected_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

fn unauthorized(msg: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(ApiError::new(msg, "UNAUTHORIZED")),
    )
        .into_response()
}

/// Authentication middleware - turns a bearer JWT into a [`RequestContext`]
async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Response {
    let auth_header = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok());

    let token = match auth_header.and_then(|h| h.strip_prefix("Bearer ")) {
        Some(token) => token,
        None => {
            warn!("Missing or invalid Authorization header");
            return unauthorized("Missing or invalid Authorization header");
        }
    };

    match state.jwt_config.validate_token(token) {
        Ok(claims) => {
            req.extensions_mut().insert(RequestContext::from(claims));
            next.run(req).await
        }
        Err(e) => {
            warn!("Invalid JWT token: {}", e);
            unauthorized("Invalid or expired token")
        }
    }
}

/// Extract the caller's context (set by the auth middleware)
#[axum::async_trait]
impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, Json<ApiError>);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<RequestContext>()
            .cloned()
            .ok_or((
                StatusCode::UNAUTHORIZED,
                Json(ApiError::new("Not authenticated", "UNAUTHORIZED")),
            ))
    }
}
