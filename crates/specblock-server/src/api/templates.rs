//! Template CRUD handlers. Request bodies are the camelCase drafts the admin
//! editor submits; responses use the snake_case envelope.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use specblock_core::TemplateDraft;
use specblock_db::TemplateDetail;

use crate::middleware::RequestId;

use super::{admin_shop_id, map_db_error, parse_template_id, ApiError, ApiResponse, AppState};

#[derive(Debug, Serialize)]
pub(super) struct TemplateItem {
    id: Uuid,
    name: String,
    is_active: bool,
    section_count: i64,
    assignment_type: Option<String>,
    is_excluded: bool,
    target_count: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub(super) struct TemplateIdResponse {
    id: Uuid,
}

#[derive(Debug, Serialize)]
pub(super) struct ToggleResponse {
    id: Uuid,
    is_active: bool,
}

/// GET /api/v1/shops/{shop}/templates
pub(super) async fn list_templates(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(shop): Path<String>,
) -> Result<Json<ApiResponse<Vec<TemplateItem>>>, ApiError> {
    let shop_id = admin_shop_id(&state, &req_id.0, &shop).await?;
    let rows = specblock_db::list_templates(&state.pool, shop_id)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    let data = rows
        .into_iter()
        .map(|row| TemplateItem {
            id: row.id,
            name: row.name,
            is_active: row.is_active,
            section_count: row.section_count,
            assignment_type: row.assignment_type,
            is_excluded: row.is_excluded.unwrap_or(false),
            target_count: row.target_count,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
        .collect();

    Ok(Json(ApiResponse::new(data, req_id.0)))
}

/// POST /api/v1/shops/{shop}/templates
pub(super) async fn create_template(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(shop): Path<String>,
    Json(draft): Json<TemplateDraft>,
) -> Result<(StatusCode, Json<ApiResponse<TemplateIdResponse>>), ApiError> {
    let shop_id = admin_shop_id(&state, &req_id.0, &shop).await?;
    let id = specblock_db::create_template(&state.pool, shop_id, draft)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    tracing::info!(shop_id, template_id = %id, "template created");
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::new(TemplateIdResponse { id }, req_id.0)),
    ))
}

/// GET /api/v1/shops/{shop}/templates/{template_id}
pub(super) async fn get_template(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path((shop, template_id)): Path<(String, String)>,
) -> Result<Json<ApiResponse<TemplateDetail>>, ApiError> {
    let template_id = parse_template_id(&req_id.0, &template_id)?;
    let shop_id = admin_shop_id(&state, &req_id.0, &shop).await?;
    let detail = specblock_db::get_template_detail(&state.pool, shop_id, template_id)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse::new(detail, req_id.0)))
}

/// PUT /api/v1/shops/{shop}/templates/{template_id}
pub(super) async fn update_template(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path((shop, template_id)): Path<(String, String)>,
    Json(draft): Json<TemplateDraft>,
) -> Result<Json<ApiResponse<TemplateIdResponse>>, ApiError> {
    let template_id = parse_template_id(&req_id.0, &template_id)?;
    let shop_id = admin_shop_id(&state, &req_id.0, &shop).await?;
    specblock_db::update_template(&state.pool, shop_id, template_id, draft)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse::new(
        TemplateIdResponse { id: template_id },
        req_id.0,
    )))
}

/// DELETE /api/v1/shops/{shop}/templates/{template_id}
pub(super) async fn delete_template(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path((shop, template_id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    let template_id = parse_template_id(&req_id.0, &template_id)?;
    let shop_id = admin_shop_id(&state, &req_id.0, &shop).await?;
    specblock_db::delete_template(&state.pool, shop_id, template_id)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    tracing::info!(shop_id, template_id = %template_id, "template deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/shops/{shop}/templates/{template_id}/duplicate
pub(super) async fn duplicate_template(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path((shop, template_id)): Path<(String, String)>,
) -> Result<(StatusCode, Json<ApiResponse<TemplateIdResponse>>), ApiError> {
    let template_id = parse_template_id(&req_id.0, &template_id)?;
    let shop_id = admin_shop_id(&state, &req_id.0, &shop).await?;
    let id = specblock_db::duplicate_template(&state.pool, shop_id, template_id)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::new(TemplateIdResponse { id }, req_id.0)),
    ))
}

/// POST /api/v1/shops/{shop}/templates/{template_id}/toggle
pub(super) async fn toggle_template(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path((shop, template_id)): Path<(String, String)>,
) -> Result<Json<ApiResponse<ToggleResponse>>, ApiError> {
    let template_id = parse_template_id(&req_id.0, &template_id)?;
    let shop_id = admin_shop_id(&state, &req_id.0, &shop).await?;
    let is_active = specblock_db::toggle_template_active(&state.pool, shop_id, template_id)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse::new(
        ToggleResponse {
            id: template_id,
            is_active,
        },
        req_id.0,
    )))
}
