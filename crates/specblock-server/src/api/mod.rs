mod assignments;
mod catalog;
mod plans;
mod storefront;
mod templates;
mod webhooks;

use axum::{
    extract::State,
    http::{header, HeaderName, HeaderValue, Method, StatusCode},
    response::IntoResponse,
    routing::{get, post, put},
    Extension, Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, set_header::SetResponseHeaderLayer, trace::TraceLayer};
use uuid::Uuid;

use specblock_core::ValidationError;
use specblock_db::DbError;

use crate::middleware::{
    enforce_rate_limit, request_id, require_bearer_auth, AuthState, RateLimitState, RequestId,
};
use crate::shop_cache::ShopCache;

const ADMIN_RATE_LIMIT_PER_MIN: usize = 120;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub shops: ShopCache,
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub data: T,
    pub meta: ResponseMeta,
}

#[derive(Debug, Serialize)]
pub struct ResponseMeta {
    pub request_id: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: ErrorBody,
    pub meta: ResponseMeta,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
struct HealthData {
    status: &'static str,
    database: &'static str,
}

/// Separate budgets for the admin API and the public storefront endpoint.
#[derive(Debug, Clone)]
pub struct RateLimits {
    pub admin: RateLimitState,
    pub storefront: RateLimitState,
}

impl RateLimits {
    #[must_use]
    pub fn from_storefront_limit(storefront_per_min: usize) -> Self {
        Self {
            admin: RateLimitState::per_minute(ADMIN_RATE_LIMIT_PER_MIN),
            storefront: RateLimitState::per_minute(storefront_per_min),
        }
    }
}

impl ResponseMeta {
    pub(super) fn new(request_id: String) -> Self {
        Self {
            request_id,
            timestamp: Utc::now(),
        }
    }
}

impl<T: Serialize> ApiResponse<T> {
    pub(super) fn new(data: T, request_id: String) -> Self {
        Self {
            data,
            meta: ResponseMeta::new(request_id),
        }
    }
}

impl ApiError {
    pub fn new(
        request_id: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            error: ErrorBody {
                code: code.into(),
                message: message.into(),
            },
            meta: ResponseMeta::new(request_id.into()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = match self.error.code.as_str() {
            "not_found" => StatusCode::NOT_FOUND,
            "unauthorized" => StatusCode::UNAUTHORIZED,
            "bad_request" | "validation_error" => StatusCode::BAD_REQUEST,
            "conflict" => StatusCode::CONFLICT,
            "rate_limited" => StatusCode::TOO_MANY_REQUESTS,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(self)).into_response()
    }
}

pub(super) fn normalize_limit(limit: Option<i64>) -> i64 {
    limit.unwrap_or(50).clamp(1, 200)
}

pub(super) fn validation_error(request_id: String, error: &ValidationError) -> ApiError {
    let code = match error {
        ValidationError::DuplicateDefault { .. } | ValidationError::TargetConflict { .. } => {
            "conflict"
        }
        _ => "validation_error",
    };
    ApiError::new(request_id, code, error.to_string())
}

pub(super) fn map_db_error(request_id: String, error: &DbError) -> ApiError {
    match error {
        DbError::NotFound => ApiError::new(request_id, "not_found", "record not found"),
        DbError::Validation(e) => validation_error(request_id, e),
        DbError::Sqlx(sqlx::Error::Database(db_err))
            if db_err.code().as_deref() == Some("23505") =>
        {
            ApiError::new(request_id, "conflict", "a conflicting record already exists")
        }
        _ => {
            tracing::error!(error = %error, "database query failed");
            ApiError::new(request_id, "internal_error", "database query failed")
        }
    }
}

pub(super) fn parse_template_id(request_id: &str, raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| {
        ApiError::new(
            request_id,
            "bad_request",
            format!("'{raw}' is not a valid template id"),
        )
    })
}

/// Shop id for an admin request; the shop is registered on first contact.
pub(super) async fn admin_shop_id(
    state: &AppState,
    request_id: &str,
    shop: &str,
) -> Result<i64, ApiError> {
    let shop = shop.trim();
    if shop.is_empty() {
        return Err(ApiError::new(request_id, "bad_request", "shop is required"));
    }
    state
        .shops
        .ensure(&state.pool, shop)
        .await
        .map_err(|e| map_db_error(request_id.to_owned(), &e))
}

fn build_cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static("x-request-id"),
        ])
}

fn protected_router(auth: AuthState, rate_limit: RateLimitState) -> Router<AppState> {
    Router::new()
        .route(
            "/api/v1/shops/{shop}/templates",
            get(templates::list_templates).post(templates::create_template),
        )
        .route(
            "/api/v1/shops/{shop}/templates/{template_id}",
            get(templates::get_template)
                .put(templates::update_template)
                .delete(templates::delete_template),
        )
        .route(
            "/api/v1/shops/{shop}/templates/{template_id}/duplicate",
            post(templates::duplicate_template),
        )
        .route(
            "/api/v1/shops/{shop}/templates/{template_id}/toggle",
            post(templates::toggle_template),
        )
        .route(
            "/api/v1/shops/{shop}/templates/{template_id}/assignment",
            put(assignments::save_assignment),
        )
        .route(
            "/api/v1/shops/{shop}/assignments",
            get(assignments::list_assignments),
        )
        .route(
            "/api/v1/shops/{shop}/products",
            get(catalog::search_products),
        )
        .route(
            "/api/v1/shops/{shop}/collections",
            get(catalog::search_collections),
        )
        .route(
            "/api/v1/shops/{shop}/metafield-definitions",
            get(catalog::list_metafield_definitions),
        )
        .route("/api/v1/shops/{shop}/catalog", post(catalog::apply_batch))
        .route(
            "/api/v1/shops/{shop}/lookup/rebuild",
            post(catalog::rebuild_lookup),
        )
        .route(
            "/api/v1/shops/{shop}/webhooks",
            get(webhooks::list_webhook_events),
        )
        .route(
            "/api/v1/shops/{shop}/plans",
            get(plans::list_plans).post(plans::select_plan),
        )
        .layer(
            ServiceBuilder::new()
                .layer(build_cors())
                .layer(axum::middleware::from_fn_with_state(
                    rate_limit,
                    enforce_rate_limit,
                ))
                .layer(axum::middleware::from_fn_with_state(
                    auth,
                    require_bearer_auth,
                )),
        )
}

/// The theme extension calls this from any storefront origin, so every
/// response carries the same fixed CORS headers, including rate-limit
/// rejections.
fn storefront_router(rate_limit: RateLimitState) -> Router<AppState> {
    Router::new()
        .route(
            "/template",
            get(storefront::get_template).options(storefront::preflight),
        )
        .layer(
            ServiceBuilder::new()
                .layer(SetResponseHeaderLayer::overriding(
                    header::ACCESS_CONTROL_ALLOW_ORIGIN,
                    HeaderValue::from_static("*"),
                ))
                .layer(SetResponseHeaderLayer::overriding(
                    header::ACCESS_CONTROL_ALLOW_METHODS,
                    HeaderValue::from_static("GET, OPTIONS"),
                ))
                .layer(SetResponseHeaderLayer::overriding(
                    header::ACCESS_CONTROL_ALLOW_HEADERS,
                    HeaderValue::from_static("Content-Type"),
                ))
                .layer(axum::middleware::from_fn_with_state(
                    rate_limit,
                    enforce_rate_limit,
                )),
        )
}

pub fn build_app(state: AppState, auth: AuthState, rate_limits: RateLimits) -> Router {
    let public_routes = Router::new()
        .route("/api/v1/health", get(health))
        .route("/webhooks/{*topic}", post(webhooks::receive_webhook));

    Router::new()
        .merge(public_routes)
        .merge(storefront_router(rate_limits.storefront))
        .merge(protected_router(auth, rate_limits.admin))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(axum::middleware::from_fn(request_id)),
        )
        .with_state(state)
}

async fn health(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> impl IntoResponse {
    let meta = ResponseMeta::new(req_id.0);

    match specblock_db::health_check(&state.pool).await {
        Ok(()) => (
            StatusCode::OK,
            Json(ApiResponse {
                data: HealthData {
                    status: "ok",
                    database: "ok",
                },
                meta,
            }),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "health check: database unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ApiResponse {
                    data: HealthData {
                        status: "degraded",
                        database: "unavailable",
                    },
                    meta,
                }),
            )
        }
    }
}
