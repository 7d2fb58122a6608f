//! Shopify webhook deliveries and the admin view of their log.
//!
//! Deliveries are always acknowledged with 200 so the platform does not
//! retry; failures are recorded in `webhook_events` and logged.

use std::time::Instant;

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use specblock_core::normalize_id;
use specblock_db::{CatalogItem, WebhookEventRow, WebhookStats, WebhookStatus};

use crate::middleware::RequestId;

use super::{admin_shop_id, map_db_error, normalize_limit, ApiError, ApiResponse, AppState};

const SHOP_DOMAIN_HEADER: &str = "x-shopify-shop-domain";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WebhookTopic {
    ProductUpsert,
    ProductDelete,
    CollectionUpsert,
    CollectionDelete,
    AppUninstalled,
    Other,
}

impl WebhookTopic {
    fn parse(topic: &str) -> Self {
        match topic {
            "products/create" | "products/update" => Self::ProductUpsert,
            "products/delete" => Self::ProductDelete,
            "collections/create" | "collections/update" => Self::CollectionUpsert,
            "collections/delete" => Self::CollectionDelete,
            "app/uninstalled" => Self::AppUninstalled,
            _ => Self::Other,
        }
    }
}

/// The resource id of a payload: `admin_graphql_api_id` when present,
/// otherwise the numeric or string `id`, normalized.
fn payload_id(payload: &Value) -> Option<String> {
    let raw = payload
        .get("admin_graphql_api_id")
        .and_then(Value::as_str)
        .map(ToOwned::to_owned)
        .or_else(|| match payload.get("id") {
            Some(Value::Number(n)) => Some(n.to_string()),
            Some(Value::String(s)) => Some(s.clone()),
            _ => None,
        })?;
    normalize_id(&raw)
}

fn payload_item(payload: &Value) -> Option<CatalogItem> {
    Some(CatalogItem {
        id: payload_id(payload)?,
        title: payload
            .get("title")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        handle: payload
            .get("handle")
            .and_then(Value::as_str)
            .map(ToOwned::to_owned),
    })
}

async fn apply_webhook(
    state: &AppState,
    shop_id: i64,
    topic: WebhookTopic,
    payload: &Value,
) -> anyhow::Result<()> {
    let pool = &state.pool;
    match topic {
        WebhookTopic::ProductUpsert => {
            let item = payload_item(payload).ok_or_else(|| anyhow::anyhow!("payload has no id"))?;
            specblock_db::upsert_product(pool, shop_id, &item).await?;
        }
        WebhookTopic::CollectionUpsert => {
            let item = payload_item(payload).ok_or_else(|| anyhow::anyhow!("payload has no id"))?;
            specblock_db::upsert_collection(pool, shop_id, &item).await?;
        }
        WebhookTopic::ProductDelete => {
            let id = payload_id(payload).ok_or_else(|| anyhow::anyhow!("payload has no id"))?;
            specblock_db::delete_product(pool, shop_id, &id).await?;
        }
        WebhookTopic::CollectionDelete => {
            let id = payload_id(payload).ok_or_else(|| anyhow::anyhow!("payload has no id"))?;
            specblock_db::delete_collection(pool, shop_id, &id).await?;
        }
        WebhookTopic::AppUninstalled | WebhookTopic::Other => {}
    }
    Ok(())
}

/// POST /webhooks/{*topic}
pub(super) async fn receive_webhook(
    State(state): State<AppState>,
    Path(topic): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    let started = Instant::now();

    let Some(shop) = headers
        .get(SHOP_DOMAIN_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
    else {
        tracing::warn!(topic, "webhook without shop domain header ignored");
        return StatusCode::OK;
    };

    let shop_id = match state.shops.find(&state.pool, shop).await {
        Ok(Some(id)) => id,
        Ok(None) => {
            tracing::info!(shop, topic, "webhook for unknown shop ignored");
            return StatusCode::OK;
        }
        Err(e) => {
            tracing::error!(shop, topic, error = %e, "webhook shop lookup failed");
            return StatusCode::OK;
        }
    };

    let kind = WebhookTopic::parse(&topic);
    if kind == WebhookTopic::AppUninstalled {
        // The event log cascades away with the shop, so there is nothing to record.
        match specblock_db::delete_shop(&state.pool, shop).await {
            Ok(_) => tracing::info!(shop, "app uninstalled; shop data deleted"),
            Err(e) => tracing::error!(shop, error = %e, "failed to delete uninstalled shop"),
        }
        state.shops.evict(shop).await;
        return StatusCode::OK;
    }

    let payload: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
    let result = apply_webhook(&state, shop_id, kind, &payload).await;
    let response_time_ms = i32::try_from(started.elapsed().as_millis()).unwrap_or(i32::MAX);

    let (status, error_message) = match &result {
        Ok(()) => (WebhookStatus::Success, None),
        Err(e) => {
            tracing::error!(shop, topic, error = %e, "webhook processing failed");
            (WebhookStatus::Error, Some(e.to_string()))
        }
    };
    if kind == WebhookTopic::Other {
        tracing::info!(shop, topic, "unhandled webhook topic acknowledged");
    }

    specblock_db::log_webhook_event(
        &state.pool,
        shop_id,
        &topic,
        status,
        error_message.as_deref(),
        Some(&payload),
        Some(response_time_ms),
    )
    .await;

    StatusCode::OK
}

#[derive(Debug, Deserialize)]
pub(super) struct WebhookEventsQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub(super) struct WebhookEventsResponse {
    events: Vec<WebhookEventRow>,
    stats: WebhookStats,
}

/// GET /api/v1/shops/{shop}/webhooks
pub(super) async fn list_webhook_events(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(shop): Path<String>,
    Query(query): Query<WebhookEventsQuery>,
) -> Result<Json<ApiResponse<WebhookEventsResponse>>, ApiError> {
    let shop_id = admin_shop_id(&state, &req_id.0, &shop).await?;
    let (events, stats) =
        specblock_db::webhook_stats(&state.pool, shop_id, normalize_limit(query.limit))
            .await
            .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse::new(
        WebhookEventsResponse { events, stats },
        req_id.0,
    )))
}
