//! Catalog mirror handlers: picker search, metafield definitions, and the
//! batch endpoint the external sync job posts to.

use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use serde::{Deserialize, Serialize};

use specblock_db::{CatalogBatch, CatalogBatchSummary, CatalogItemRow, MetafieldDefinitionRow};

use crate::middleware::RequestId;

use super::{admin_shop_id, map_db_error, ApiError, ApiResponse, AppState};

#[derive(Debug, Deserialize)]
pub(super) struct SearchQuery {
    pub search: Option<String>,
}

#[derive(Debug, Serialize)]
pub(super) struct RebuildResponse {
    rows_written: usize,
}

/// GET /api/v1/shops/{shop}/products?search=
pub(super) async fn search_products(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(shop): Path<String>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<ApiResponse<Vec<CatalogItemRow>>>, ApiError> {
    let shop_id = admin_shop_id(&state, &req_id.0, &shop).await?;
    let rows = specblock_db::search_products(&state.pool, shop_id, query.search.as_deref())
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse::new(rows, req_id.0)))
}

/// GET /api/v1/shops/{shop}/collections?search=
pub(super) async fn search_collections(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(shop): Path<String>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<ApiResponse<Vec<CatalogItemRow>>>, ApiError> {
    let shop_id = admin_shop_id(&state, &req_id.0, &shop).await?;
    let rows = specblock_db::search_collections(&state.pool, shop_id, query.search.as_deref())
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse::new(rows, req_id.0)))
}

/// GET /api/v1/shops/{shop}/metafield-definitions
pub(super) async fn list_metafield_definitions(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(shop): Path<String>,
) -> Result<Json<ApiResponse<Vec<MetafieldDefinitionRow>>>, ApiError> {
    let shop_id = admin_shop_id(&state, &req_id.0, &shop).await?;
    let rows = specblock_db::list_metafield_definitions(&state.pool, shop_id)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse::new(rows, req_id.0)))
}

/// POST /api/v1/shops/{shop}/catalog
pub(super) async fn apply_batch(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(shop): Path<String>,
    Json(batch): Json<CatalogBatch>,
) -> Result<Json<ApiResponse<CatalogBatchSummary>>, ApiError> {
    let shop_id = admin_shop_id(&state, &req_id.0, &shop).await?;
    let summary = specblock_db::apply_catalog_batch(&state.pool, shop_id, &batch)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    tracing::info!(
        shop_id,
        products = summary.products_upserted,
        collections = summary.collections_upserted,
        skipped = summary.skipped,
        "catalog batch applied"
    );
    Ok(Json(ApiResponse::new(summary, req_id.0)))
}

/// POST /api/v1/shops/{shop}/lookup/rebuild
pub(super) async fn rebuild_lookup(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(shop): Path<String>,
) -> Result<Json<ApiResponse<RebuildResponse>>, ApiError> {
    let shop_id = admin_shop_id(&state, &req_id.0, &shop).await?;
    let rows_written = specblock_db::rebuild_lookup_for_shop(&state.pool, shop_id)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse::new(
        RebuildResponse { rows_written },
        req_id.0,
    )))
}
