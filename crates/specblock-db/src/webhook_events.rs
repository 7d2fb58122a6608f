//! Database operations for `webhook_events`, the delivery log shown in the
//! admin UI.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use sqlx::PgPool;

use crate::DbError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WebhookStatus {
    Success,
    Error,
}

impl WebhookStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            WebhookStatus::Success => "success",
            WebhookStatus::Error => "error",
        }
    }
}

/// A row from the `webhook_events` table, without its payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct WebhookEventRow {
    pub id: i64,
    pub topic: String,
    pub status: String,
    pub error_message: Option<String>,
    pub response_time_ms: Option<i32>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TopicStats {
    pub total: usize,
    pub success: usize,
    pub error: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WebhookStats {
    pub total: usize,
    pub success: usize,
    pub error: usize,
    pub by_topic: BTreeMap<String, TopicStats>,
    /// Rounded mean over events that recorded a response time; 0 when none did.
    pub avg_response_time_ms: i64,
}

impl WebhookStats {
    #[must_use]
    pub fn from_events(events: &[WebhookEventRow]) -> Self {
        let mut stats = Self {
            total: events.len(),
            ..Self::default()
        };

        for event in events {
            let topic = stats.by_topic.entry(event.topic.clone()).or_default();
            topic.total += 1;
            if event.status == WebhookStatus::Success.as_str() {
                stats.success += 1;
                topic.success += 1;
            } else {
                stats.error += 1;
                topic.error += 1;
            }
        }

        let times: Vec<i64> = events
            .iter()
            .filter_map(|e| e.response_time_ms.map(i64::from))
            .collect();
        if let Ok(count) = i64::try_from(times.len()) {
            if count > 0 {
                let sum: i64 = times.iter().sum();
                stats.avg_response_time_ms = (sum + count / 2) / count;
            }
        }

        stats
    }
}

/// Records a webhook delivery. Never fails the caller: storage errors are
/// logged and dropped so webhook handling always acknowledges.
pub async fn log_webhook_event(
    pool: &PgPool,
    shop_id: i64,
    topic: &str,
    status: WebhookStatus,
    error_message: Option<&str>,
    payload: Option<&Value>,
    response_time_ms: Option<i32>,
) {
    let result = sqlx::query(
        "INSERT INTO webhook_events \
             (shop_id, topic, status, error_message, payload, response_time_ms) \
         VALUES ($1, $2, $3, $4, $5, $6)",
    )
    .bind(shop_id)
    .bind(topic)
    .bind(status.as_str())
    .bind(error_message)
    .bind(payload)
    .bind(response_time_ms)
    .execute(pool)
    .await;

    if let Err(e) = result {
        tracing::error!(shop_id, topic, error = %e, "failed to record webhook event");
    }
}

/// The most recent `limit` events of the shop, newest first, with stats over
/// those events.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn webhook_stats(
    pool: &PgPool,
    shop_id: i64,
    limit: i64,
) -> Result<(Vec<WebhookEventRow>, WebhookStats), DbError> {
    let events = sqlx::query_as::<_, WebhookEventRow>(
        "SELECT id, topic, status, error_message, response_time_ms, created_at \
         FROM webhook_events \
         WHERE shop_id = $1 \
         ORDER BY created_at DESC, id DESC \
         LIMIT $2",
    )
    .bind(shop_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    let stats = WebhookStats::from_events(&events);
    Ok((events, stats))
}
