use axum::{
    extract::{Path, State},
    Extension, Json,
};
use serde::{Deserialize, Serialize};

use specblock_core::{recommended_plan, Plan, PLANS};
use specblock_db::ShopPlanRow;

use crate::middleware::RequestId;

use super::{admin_shop_id, map_db_error, ApiError, ApiResponse, AppState};

#[derive(Debug, Serialize)]
pub(super) struct PlansResponse {
    plans: &'static [Plan],
    current: Option<ShopPlanRow>,
    product_count: i64,
    recommended: &'static str,
}

#[derive(Debug, Deserialize)]
pub(super) struct SelectPlanBody {
    pub plan: String,
}

/// GET /api/v1/shops/{shop}/plans
pub(super) async fn list_plans(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(shop): Path<String>,
) -> Result<Json<ApiResponse<PlansResponse>>, ApiError> {
    let shop_id = admin_shop_id(&state, &req_id.0, &shop).await?;
    let current = specblock_db::get_shop_plan(&state.pool, shop_id)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;
    let product_count = specblock_db::count_products(&state.pool, shop_id)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse::new(
        PlansResponse {
            plans: PLANS,
            current,
            product_count,
            recommended: recommended_plan(product_count).key,
        },
        req_id.0,
    )))
}

/// POST /api/v1/shops/{shop}/plans
pub(super) async fn select_plan(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(shop): Path<String>,
    Json(body): Json<SelectPlanBody>,
) -> Result<Json<ApiResponse<ShopPlanRow>>, ApiError> {
    let shop_id = admin_shop_id(&state, &req_id.0, &shop).await?;
    let row = specblock_db::select_shop_plan(&state.pool, shop_id, body.plan.trim())
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse::new(row, req_id.0)))
}
