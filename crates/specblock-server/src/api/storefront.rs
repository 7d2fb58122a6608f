//! `GET /template`: the public endpoint the theme extension calls on product
//! pages. Errors use a flat `{ "error": message }` body instead of the admin
//! envelope.

use axum::{
    extract::{rejection::QueryRejection, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use specblock_core::{MetafieldDefinitionPayload, StorefrontResponse};
use specblock_db::DbError;

use super::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct TemplateQuery {
    pub shop: Option<String>,
    pub product_id: Option<String>,
    pub collection_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct StorefrontError {
    error: &'static str,
}

fn storefront_error(status: StatusCode, message: &'static str) -> Response {
    (status, Json(StorefrontError { error: message })).into_response()
}

pub(super) async fn get_template(
    State(state): State<AppState>,
    query: Result<Query<TemplateQuery>, QueryRejection>,
) -> Response {
    let query = match query {
        Ok(Query(query)) => query,
        Err(rejection) => {
            tracing::debug!(error = %rejection, "malformed storefront query string");
            return storefront_error(StatusCode::BAD_REQUEST, "Invalid query string");
        }
    };

    let Some(shop) = query
        .shop
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
    else {
        return storefront_error(StatusCode::BAD_REQUEST, "Missing shop parameter");
    };

    match load_storefront_template(
        &state,
        shop,
        query.product_id.as_deref(),
        query.collection_id.as_deref(),
    )
    .await
    {
        Ok(body) => Json(body).into_response(),
        Err(e) => {
            tracing::error!(shop, error = %e, "storefront template resolution failed");
            storefront_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to load template")
        }
    }
}

pub(super) async fn preflight() -> StatusCode {
    StatusCode::OK
}

async fn load_storefront_template(
    state: &AppState,
    shop: &str,
    product_id: Option<&str>,
    collection_id: Option<&str>,
) -> Result<StorefrontResponse, DbError> {
    let Some(shop_id) = state.shops.find(&state.pool, shop).await? else {
        return Ok(StorefrontResponse::empty());
    };

    let all_metafield_definitions: Vec<MetafieldDefinitionPayload> =
        specblock_db::list_metafield_definitions(&state.pool, shop_id)
            .await?
            .into_iter()
            .map(Into::into)
            .collect();

    let resolution =
        specblock_db::resolve_template_id(&state.pool, shop_id, product_id, collection_id).await?;

    let template = match resolution {
        None => None,
        Some(resolution) => {
            match specblock_db::get_template_detail(&state.pool, shop_id, resolution.template_id)
                .await
            {
                Ok(detail) => Some(detail.into_payload()),
                // Deleted between the lookup and the load.
                Err(DbError::NotFound) => None,
                Err(e) => return Err(e),
            }
        }
    };

    if let Some(template) = &template {
        tracing::debug!(shop_id, template_id = %template.id, "storefront template resolved");
    }

    Ok(StorefrontResponse {
        template,
        all_metafield_definitions,
    })
}
