use axum::{
    extract::{Path, State},
    Extension, Json,
};
use serde::Deserialize;

use specblock_core::{AssignmentRequest, AssignmentType};
use specblock_db::{AssignmentView, SaveOutcome};

use crate::middleware::RequestId;

use super::{
    admin_shop_id, map_db_error, parse_template_id, validation_error, ApiError, ApiResponse,
    AppState,
};

/// Body of `PUT .../templates/{id}/assignment`. A missing or `"NONE"`
/// assignment type unassigns the template.
#[derive(Debug, Deserialize)]
pub(super) struct SaveAssignmentBody {
    pub assignment_type: Option<String>,
    #[serde(default)]
    pub target_ids: Vec<String>,
    #[serde(default)]
    pub is_excluded: bool,
}

/// GET /api/v1/shops/{shop}/assignments
pub(super) async fn list_assignments(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(shop): Path<String>,
) -> Result<Json<ApiResponse<Vec<AssignmentView>>>, ApiError> {
    let shop_id = admin_shop_id(&state, &req_id.0, &shop).await?;
    let views = specblock_db::list_assignments(&state.pool, shop_id)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse::new(views, req_id.0)))
}

/// PUT /api/v1/shops/{shop}/templates/{template_id}/assignment
pub(super) async fn save_assignment(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path((shop, template_id)): Path<(String, String)>,
    Json(body): Json<SaveAssignmentBody>,
) -> Result<Json<ApiResponse<SaveOutcome>>, ApiError> {
    let template_id = parse_template_id(&req_id.0, &template_id)?;
    let assignment_type = AssignmentType::parse_optional(body.assignment_type.as_deref())
        .map_err(|e| validation_error(req_id.0.clone(), &e))?;
    let shop_id = admin_shop_id(&state, &req_id.0, &shop).await?;

    let request = AssignmentRequest {
        assignment_type,
        target_ids: body.target_ids,
        is_excluded: body.is_excluded,
    };
    let outcome = specblock_db::save_assignment(&state.pool, shop_id, template_id, &request)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    tracing::info!(
        shop_id,
        template_id = %template_id,
        auto_added = outcome.auto_added_count,
        "assignment saved"
    );
    Ok(Json(ApiResponse::new(outcome, req_id.0)))
}
