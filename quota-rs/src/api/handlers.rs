//! API request handlers

use axum::{
    extract::{FromRequest, FromRequestParts, Path, Query, Request, State},
    http::{request::Parts, StatusCode},
    Json,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;

use crate::api::auth::JwtConfig;
use crate::context::RequestContext;
use crate::error::QuotaError;
use crate::quota::{
    NewPost, Post, PostStatus, PublishConfirmation, QuotaService, QuotaStatus, QuotaValidation,
};

/// Shared application state
pub struct AppState {
    pub quota: QuotaService,
    pub jwt_config: JwtConfig,
}

/// API error response: `{error, code}`, plus the findings of a failed integrity check
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub error: String,
    pub code: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub issues: Vec<String>,
}

impl ApiError {
    pub fn new(msg: &str, code: &str) -> Self {
        Self {
            error: msg.to_string(),
            code: code.to_string(),
            issues: Vec::new(),
        }
    }
}

pub type ApiResult<T> = Result<T, (StatusCode, Json<ApiError>)>;

/// Map a service error onto its HTTP status and error body
pub fn api_error(err: QuotaError) -> (StatusCode, Json<ApiError>) {
    let status = match &err {
        QuotaError::NotFound(_) => StatusCode::NOT_FOUND,
        QuotaError::QuotaExceeded { .. } => StatusCode::FORBIDDEN,
        QuotaError::Integrity { .. } => StatusCode::CONFLICT,
        QuotaError::InvalidTransition { .. } => StatusCode::CONFLICT,
        QuotaError::Validation(_) => StatusCode::BAD_REQUEST,
        QuotaError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
        QuotaError::Forbidden(_) => StatusCode::FORBIDDEN,
        QuotaError::Database(_) | QuotaError::Config(_) | QuotaError::Parse(_) => {
            error!("Internal error: {}", err);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiError::new("Internal server error", err.code())),
            );
        }
    };

    let mut body = ApiError::new(&err.to_string(), err.code());
    if let QuotaError::Integrity { issues, .. } = err {
        body.issues = issues;
    }

    (status, Json(body))
}

fn bad_request(msg: &str) -> (StatusCode, Json<ApiError>) {
    (
        StatusCode::BAD_REQUEST,
        Json(ApiError::new(msg, "VALIDATION_ERROR")),
    )
}

/// JSON body extractor that rejects with the API error body
pub struct ApiJson<T>(pub T);

#[axum::async_trait]
impl<T, S> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = (StatusCode, Json<ApiError>);

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(bad_request(&rejection.body_text())),
        }
    }
}

/// Query string extractor that rejects with the API error body
pub struct ApiQuery<T>(pub T);

#[axum::async_trait]
impl<T, S> FromRequestParts<S> for ApiQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = (StatusCode, Json<ApiError>);

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Query::<T>::from_request_parts(parts, state).await {
            Ok(Query(value)) => Ok(Self(value)),
            Err(rejection) => Err(bad_request(&rejection.body_text())),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

#[derive(Debug, Deserialize)]
pub struct ListPostsQuery {
    pub status: Option<PostStatus>,
}

/// GET /health
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// GET /api/quota-status/:user_id - Quota snapshot
pub async fn get_quota_status(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    Path(user_id): Path<String>,
) -> ApiResult<Json<QuotaStatus>> {
    ctx.ensure_user(&user_id).map_err(api_error)?;

    let status = state
        .quota
        .get_quota_status(&user_id)
        .await
        .map_err(api_error)?;

    Ok(Json(status))
}

/// GET /api/quota-status/:user_id/validate - Integrity check
pub async fn validate_quota(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    Path(user_id): Path<String>,
) -> ApiResult<Json<QuotaValidation>> {
    ctx.ensure_user(&user_id).map_err(api_error)?;

    let validation = state
        .quota
        .ensure_consistent(&user_id)
        .await
        .map_err(api_error)?;

    Ok(Json(validation))
}

/// POST /api/quota-status/:user_id/repair - Rebuild the cached count
pub async fn repair_quota(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    Path(user_id): Path<String>,
) -> ApiResult<Json<QuotaStatus>> {
    ctx.ensure_user(&user_id).map_err(api_error)?;

    let status = state
        .quota
        .repair_quota(&user_id)
        .await
        .map_err(api_error)?;

    Ok(Json(status))
}

/// GET /api/posts - List the caller's posts
pub async fn list_posts(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    ApiQuery(query): ApiQuery<ListPostsQuery>,
) -> ApiResult<Json<Vec<Post>>> {
    let posts = state
        .quota
        .list_posts(&ctx.user_id, query.status)
        .await
        .map_err(api_error)?;

    Ok(Json(posts))
}

/// POST /api/posts - Store a generated draft
pub async fn create_post(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    ApiJson(new_post): ApiJson<NewPost>,
) -> ApiResult<(StatusCode, Json<Post>)> {
    let post = state
        .quota
        .create_draft(&ctx.user_id, new_post)
        .await
        .map_err(api_error)?;

    Ok((StatusCode::CREATED, Json(post)))
}

/// POST /api/posts/:id/approve
pub async fn approve_post(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    Path(post_id): Path<String>,
) -> ApiResult<Json<Post>> {
    let post = state
        .quota
        .approve_post(&ctx.user_id, &post_id)
        .await
        .map_err(api_error)?;

    Ok(Json(post))
}

/// POST /api/posts/:id/publish-confirm - Platform accepted the post
pub async fn publish_confirm(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    Path(post_id): Path<String>,
) -> ApiResult<Json<PublishConfirmation>> {
    let confirmation = state
        .quota
        .post_approved(&ctx.user_id, &post_id)
        .await
        .map_err(api_error)?;

    Ok(Json(confirmation))
}

/// POST /api/posts/:id/publish-failed - Platform rejected the post
pub async fn publish_failed(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    Path(post_id): Path<String>,
) -> ApiResult<Json<Post>> {
    let post = state
        .quota
        .mark_failed(&ctx.user_id, &post_id)
        .await
        .map_err(api_error)?;

    Ok(Json(post))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_status_mapping() {
        let (status, body) = api_error(QuotaError::QuotaExceeded {
            user_id: "u1".to_string(),
            total_posts: 52,
        });
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body.code, "QUOTA_EXCEEDED");

        let (status, body) = api_error(QuotaError::NotFound("Post p1".to_string()));
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body.code, "NOT_FOUND");
    }

    #[test]
    fn test_integrity_error_carries_issues() {
        let (status, body) = api_error(QuotaError::Integrity {
            user_id: "u1".to_string(),
            issues: vec!["count mismatch".to_string()],
        });
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body.code, "INTEGRITY_ERROR");
        assert_eq!(body.issues, vec!["count mismatch".to_string()]);
    }

    #[test]
    fn test_internal_errors_are_not_leaked() {
        let (status, body) = api_error(QuotaError::Parse("secret detail".to_string()));
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body.code, "INTERNAL_ERROR");
        assert!(!body.error.contains("secret detail"));
    }
}
