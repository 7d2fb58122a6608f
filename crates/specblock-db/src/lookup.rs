//! Database operations for `template_lookup`, the materialized resolution
//! cache.
//!
//! Rows are derived from assignments by [`specblock_core::build_lookup_rows`]
//! and fully replaced on every rebuild.

use serde::Serialize;
use sqlx::{PgConnection, PgExecutor, PgPool};
use uuid::Uuid;

use specblock_core::{build_lookup_rows, normalize_opt, LookupRow, MatchKind, Resolution};

use crate::assignments::load_assignments;
use crate::DbError;

/// A row from the `template_lookup` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct LookupTableRow {
    pub product_id: Option<String>,
    pub collection_id: Option<String>,
    pub is_default: bool,
    pub rule_kind: String,
    pub template_id: Uuid,
    pub priority: i16,
}

impl From<&LookupRow> for LookupTableRow {
    fn from(row: &LookupRow) -> Self {
        Self {
            product_id: row.product_id.clone(),
            collection_id: row.collection_id.clone(),
            is_default: row.is_default,
            rule_kind: row.kind.as_str().to_string(),
            template_id: row.template_id,
            priority: row.priority,
        }
    }
}

/// Takes the shop's write lock, held until the surrounding transaction ends.
///
/// Every path that rebuilds the lookup table takes it before its first read,
/// so concurrent writers in one shop run one after the other.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the lock query fails.
pub async fn lock_shop_for_write(conn: &mut PgConnection, shop_id: i64) -> Result<(), DbError> {
    sqlx::query("SELECT pg_advisory_xact_lock($1)")
        .bind(shop_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Replaces every lookup row of the shop with rows derived from its current
/// assignments, and stamps `shops.lookup_rebuilt_at`.
///
/// Runs on the caller's connection so it joins the caller's transaction.
/// Returns the number of rows written.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if any statement fails.
pub async fn rebuild_lookup(conn: &mut PgConnection, shop_id: i64) -> Result<usize, DbError> {
    let assignments = load_assignments(&mut *conn, shop_id).await?;
    let rows = build_lookup_rows(&assignments);

    sqlx::query("DELETE FROM template_lookup WHERE shop_id = $1")
        .bind(shop_id)
        .execute(&mut *conn)
        .await?;

    if !rows.is_empty() {
        let mut product_ids = Vec::with_capacity(rows.len());
        let mut collection_ids = Vec::with_capacity(rows.len());
        let mut is_defaults = Vec::with_capacity(rows.len());
        let mut kinds = Vec::with_capacity(rows.len());
        let mut template_ids = Vec::with_capacity(rows.len());
        let mut priorities = Vec::with_capacity(rows.len());
        for row in &rows {
            product_ids.push(row.product_id.clone());
            collection_ids.push(row.collection_id.clone());
            is_defaults.push(row.is_default);
            kinds.push(row.kind.as_str().to_string());
            template_ids.push(row.template_id);
            priorities.push(row.priority);
        }

        sqlx::query(
            "INSERT INTO template_lookup \
                 (shop_id, product_id, collection_id, is_default, rule_kind, template_id, priority) \
             SELECT $1, * FROM UNNEST($2::text[], $3::text[], $4::bool[], $5::text[], \
                                      $6::uuid[], $7::int2[])",
        )
        .bind(shop_id)
        .bind(product_ids)
        .bind(collection_ids)
        .bind(is_defaults)
        .bind(kinds)
        .bind(template_ids)
        .bind(priorities)
        .execute(&mut *conn)
        .await?;
    }

    sqlx::query("UPDATE shops SET lookup_rebuilt_at = NOW(), updated_at = NOW() WHERE id = $1")
        .bind(shop_id)
        .execute(&mut *conn)
        .await?;

    Ok(rows.len())
}

/// [`rebuild_lookup`] in its own transaction.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if any statement fails; the previous rows are
/// kept then.
pub async fn rebuild_lookup_for_shop(pool: &PgPool, shop_id: i64) -> Result<usize, DbError> {
    let mut tx = pool.begin().await?;
    lock_shop_for_write(&mut *tx, shop_id).await?;
    let written = rebuild_lookup(&mut *tx, shop_id).await?;
    tx.commit().await?;

    tracing::debug!(shop_id, rows = written, "lookup table rebuilt");
    Ok(written)
}

/// Every lookup row of the shop in a stable order.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_lookup_rows(
    executor: impl PgExecutor<'_>,
    shop_id: i64,
) -> Result<Vec<LookupTableRow>, DbError> {
    let rows = sqlx::query_as::<_, LookupTableRow>(
        "SELECT product_id, collection_id, is_default, rule_kind, template_id, priority \
         FROM template_lookup \
         WHERE shop_id = $1 \
         ORDER BY priority, rule_kind, template_id, \
                  product_id NULLS FIRST, collection_id NULLS FIRST",
    )
    .bind(shop_id)
    .fetch_all(executor)
    .await?;

    Ok(rows)
}

/// Answers a resolution from the lookup table alone: one prioritized query,
/// first candidate wins.
///
/// Ids may be bare or resource URIs.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails, or [`DbError::InvalidRow`]
/// if a stored priority is out of range.
pub async fn lookup_template_id(
    executor: impl PgExecutor<'_>,
    shop_id: i64,
    product_id: Option<&str>,
    collection_id: Option<&str>,
) -> Result<Option<Resolution>, DbError> {
    let product = normalize_opt(product_id);
    let collection = normalize_opt(collection_id);

    let found = sqlx::query_as::<_, (Uuid, i16)>(
        "SELECT template_id, priority FROM ( \
             SELECT l.template_id, l.priority FROM template_lookup l \
             WHERE l.shop_id = $1 AND l.rule_kind = 'product' AND l.product_id = $2 \
           UNION ALL \
             SELECT m.template_id, m.priority FROM template_lookup m \
             WHERE m.shop_id = $1 AND m.rule_kind = 'product_except' AND $2::text IS NOT NULL \
               AND NOT EXISTS ( \
                   SELECT 1 FROM template_lookup x \
                   WHERE x.shop_id = $1 AND x.rule_kind = 'product_excluded' \
                     AND x.template_id = m.template_id AND x.product_id = $2) \
           UNION ALL \
             SELECT l.template_id, l.priority FROM template_lookup l \
             WHERE l.shop_id = $1 AND l.rule_kind = 'collection' AND l.collection_id = $3 \
           UNION ALL \
             SELECT m.template_id, m.priority FROM template_lookup m \
             WHERE m.shop_id = $1 AND m.rule_kind = 'collection_except' AND $3::text IS NOT NULL \
               AND NOT EXISTS ( \
                   SELECT 1 FROM template_lookup x \
                   WHERE x.shop_id = $1 AND x.rule_kind = 'collection_excluded' \
                     AND x.template_id = m.template_id AND x.collection_id = $3) \
           UNION ALL \
             SELECT l.template_id, l.priority FROM template_lookup l \
             WHERE l.shop_id = $1 AND l.is_default \
         ) candidates \
         ORDER BY priority ASC, template_id ASC \
         LIMIT 1",
    )
    .bind(shop_id)
    .bind(product)
    .bind(collection)
    .fetch_optional(executor)
    .await?;

    found
        .map(|(template_id, priority)| {
            MatchKind::from_priority(priority)
                .map(|matched| Resolution {
                    template_id,
                    matched,
                })
                .ok_or_else(|| DbError::InvalidRow(format!("lookup priority {priority}")))
        })
        .transpose()
}

/// Resolves through the lookup table, healing it once if it is stale.
///
/// When nothing matched and the shop has no lookup rows even though its
/// assignments would produce some, the table is rebuilt and the query retried.
/// A shop without assignments resolves to `None`.
///
/// # Errors
///
/// Returns [`DbError`] if a query or the rebuild fails.
pub async fn resolve_template_id(
    pool: &PgPool,
    shop_id: i64,
    product_id: Option<&str>,
    collection_id: Option<&str>,
) -> Result<Option<Resolution>, DbError> {
    if let Some(found) = lookup_template_id(pool, shop_id, product_id, collection_id).await? {
        return Ok(Some(found));
    }

    let has_rows = sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS (SELECT 1 FROM template_lookup WHERE shop_id = $1)",
    )
    .bind(shop_id)
    .fetch_one(pool)
    .await?;
    if has_rows {
        return Ok(None);
    }

    let assignments = load_assignments(pool, shop_id).await?;
    if build_lookup_rows(&assignments).is_empty() {
        return Ok(None);
    }

    tracing::warn!(shop_id, "lookup table empty while assignments exist; rebuilding");
    rebuild_lookup_for_shop(pool, shop_id).await?;
    lookup_template_id(pool, shop_id, product_id, collection_id).await
}
