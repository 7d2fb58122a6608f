//! Database operations for the mirrored catalog: `catalog_products`,
//! `catalog_collections`, and `metafield_definitions`.
//!
//! External ids are normalized before they are written, so rows are keyed the
//! same way whether an id arrived as a bare number or a resource URI.

use serde::{Deserialize, Serialize};
use sqlx::{PgExecutor, PgPool};

use specblock_core::{normalize_id, MetafieldDefinitionPayload};

use crate::DbError;

const SEARCH_LIMIT: i64 = 100;

// ---------------------------------------------------------------------------
// Row and input types
// ---------------------------------------------------------------------------

/// A product or collection as returned by title search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct CatalogItemRow {
    pub external_id: String,
    pub title: String,
    pub handle: Option<String>,
}

/// A row from the `metafield_definitions` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct MetafieldDefinitionRow {
    pub id: i64,
    pub namespace: String,
    pub key: String,
    pub owner_type: String,
    pub name: Option<String>,
    pub value_type: String,
}

impl From<MetafieldDefinitionRow> for MetafieldDefinitionPayload {
    fn from(row: MetafieldDefinitionRow) -> Self {
        Self {
            namespace: row.namespace,
            key: row.key,
            owner_type: row.owner_type,
            name: row.name,
            value_type: row.value_type,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CatalogItem {
    /// Bare id or resource URI.
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub handle: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetafieldDefinitionInput {
    pub namespace: String,
    pub key: String,
    pub owner_type: String,
    #[serde(default)]
    pub name: Option<String>,
    pub value_type: String,
}

/// A batch of catalog changes pushed by the sync job.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CatalogBatch {
    #[serde(default)]
    pub products: Vec<CatalogItem>,
    #[serde(default)]
    pub collections: Vec<CatalogItem>,
    #[serde(default)]
    pub deleted_product_ids: Vec<String>,
    #[serde(default)]
    pub deleted_collection_ids: Vec<String>,
    #[serde(default)]
    pub metafield_definitions: Vec<MetafieldDefinitionInput>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CatalogBatchSummary {
    pub products_upserted: usize,
    pub collections_upserted: usize,
    pub products_deleted: usize,
    pub collections_deleted: usize,
    pub metafield_definitions_upserted: usize,
    /// Entries skipped because their id was blank.
    pub skipped: usize,
}

#[derive(Debug, Clone, Copy)]
enum CatalogTable {
    Products,
    Collections,
}

impl CatalogTable {
    fn name(self) -> &'static str {
        match self {
            CatalogTable::Products => "catalog_products",
            CatalogTable::Collections => "catalog_collections",
        }
    }
}

// ---------------------------------------------------------------------------
// products / collections
// ---------------------------------------------------------------------------

async fn upsert_item(
    executor: impl PgExecutor<'_>,
    table: CatalogTable,
    shop_id: i64,
    item: &CatalogItem,
) -> Result<bool, DbError> {
    let Some(external_id) = normalize_id(&item.id) else {
        return Ok(false);
    };

    let sql = format!(
        "INSERT INTO {} (shop_id, external_id, title, handle) \
         VALUES ($1, $2, $3, $4) \
         ON CONFLICT (shop_id, external_id) DO UPDATE SET \
             title      = EXCLUDED.title, \
             handle     = EXCLUDED.handle, \
             updated_at = NOW()",
        table.name()
    );
    sqlx::query(&sql)
        .bind(shop_id)
        .bind(external_id)
        .bind(&item.title)
        .bind(&item.handle)
        .execute(executor)
        .await?;

    Ok(true)
}

async fn delete_item(
    executor: impl PgExecutor<'_>,
    table: CatalogTable,
    shop_id: i64,
    raw_id: &str,
) -> Result<bool, DbError> {
    let Some(external_id) = normalize_id(raw_id) else {
        return Ok(false);
    };

    let sql = format!(
        "DELETE FROM {} WHERE shop_id = $1 AND external_id = $2",
        table.name()
    );
    let result = sqlx::query(&sql)
        .bind(shop_id)
        .bind(external_id)
        .execute(executor)
        .await?;

    Ok(result.rows_affected() > 0)
}

async fn search_items(
    pool: &PgPool,
    table: CatalogTable,
    shop_id: i64,
    search: Option<&str>,
) -> Result<Vec<CatalogItemRow>, DbError> {
    let pattern = search
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| format!("%{}%", escape_like(s)));

    let sql = format!(
        "SELECT external_id, title, handle FROM {} \
         WHERE shop_id = $1 AND ($2::text IS NULL OR title ILIKE $2) \
         ORDER BY title ASC, external_id ASC \
         LIMIT $3",
        table.name()
    );
    let rows = sqlx::query_as::<_, CatalogItemRow>(&sql)
        .bind(shop_id)
        .bind(pattern)
        .bind(SEARCH_LIMIT)
        .fetch_all(pool)
        .await?;

    Ok(rows)
}

fn escape_like(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Inserts or updates a mirrored product. Returns `false` if the id was blank.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the upsert fails.
pub async fn upsert_product(
    executor: impl PgExecutor<'_>,
    shop_id: i64,
    item: &CatalogItem,
) -> Result<bool, DbError> {
    upsert_item(executor, CatalogTable::Products, shop_id, item).await
}

/// Inserts or updates a mirrored collection. Returns `false` if the id was blank.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the upsert fails.
pub async fn upsert_collection(
    executor: impl PgExecutor<'_>,
    shop_id: i64,
    item: &CatalogItem,
) -> Result<bool, DbError> {
    upsert_item(executor, CatalogTable::Collections, shop_id, item).await
}

/// Removes a mirrored product. Returns whether a row was deleted.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the delete fails.
pub async fn delete_product(
    executor: impl PgExecutor<'_>,
    shop_id: i64,
    raw_id: &str,
) -> Result<bool, DbError> {
    delete_item(executor, CatalogTable::Products, shop_id, raw_id).await
}

/// Removes a mirrored collection. Returns whether a row was deleted.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the delete fails.
pub async fn delete_collection(
    executor: impl PgExecutor<'_>,
    shop_id: i64,
    raw_id: &str,
) -> Result<bool, DbError> {
    delete_item(executor, CatalogTable::Collections, shop_id, raw_id).await
}

/// Products whose title contains `search` (case-insensitive), ordered by
/// title and capped at 100. `None` or blank lists the first 100.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn search_products(
    pool: &PgPool,
    shop_id: i64,
    search: Option<&str>,
) -> Result<Vec<CatalogItemRow>, DbError> {
    search_items(pool, CatalogTable::Products, shop_id, search).await
}

/// Collections whose title contains `search`; same rules as
/// [`search_products`].
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn search_collections(
    pool: &PgPool,
    shop_id: i64,
    search: Option<&str>,
) -> Result<Vec<CatalogItemRow>, DbError> {
    search_items(pool, CatalogTable::Collections, shop_id, search).await
}

/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn count_products(executor: impl PgExecutor<'_>, shop_id: i64) -> Result<i64, DbError> {
    let count =
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM catalog_products WHERE shop_id = $1")
            .bind(shop_id)
            .fetch_one(executor)
            .await?;

    Ok(count)
}

// ---------------------------------------------------------------------------
// metafield_definitions
// ---------------------------------------------------------------------------

/// Inserts or updates a metafield definition keyed on
/// `(shop_id, namespace, key, owner_type)`. Returns its id.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the upsert fails, including when `owner_type`
/// is not `PRODUCT` or `VARIANT`.
pub async fn upsert_metafield_definition(
    executor: impl PgExecutor<'_>,
    shop_id: i64,
    input: &MetafieldDefinitionInput,
) -> Result<i64, DbError> {
    let id = sqlx::query_scalar::<_, i64>(
        "INSERT INTO metafield_definitions (shop_id, namespace, key, owner_type, name, value_type) \
         VALUES ($1, $2, $3, $4, $5, $6) \
         ON CONFLICT (shop_id, namespace, key, owner_type) DO UPDATE SET \
             name       = EXCLUDED.name, \
             value_type = EXCLUDED.value_type, \
             updated_at = NOW() \
         RETURNING id",
    )
    .bind(shop_id)
    .bind(&input.namespace)
    .bind(&input.key)
    .bind(&input.owner_type)
    .bind(&input.name)
    .bind(&input.value_type)
    .fetch_one(executor)
    .await?;

    Ok(id)
}

/// All metafield definitions for a shop, ordered by owner type, namespace, key.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_metafield_definitions(
    executor: impl PgExecutor<'_>,
    shop_id: i64,
) -> Result<Vec<MetafieldDefinitionRow>, DbError> {
    let rows = sqlx::query_as::<_, MetafieldDefinitionRow>(
        "SELECT id, namespace, key, owner_type, name, value_type \
         FROM metafield_definitions \
         WHERE shop_id = $1 \
         ORDER BY owner_type ASC, namespace ASC, key ASC",
    )
    .bind(shop_id)
    .fetch_all(executor)
    .await?;

    Ok(rows)
}

/// Applies a sync batch in one transaction.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if any statement fails; nothing is applied then.
pub async fn apply_catalog_batch(
    pool: &PgPool,
    shop_id: i64,
    batch: &CatalogBatch,
) -> Result<CatalogBatchSummary, DbError> {
    let mut summary = CatalogBatchSummary::default();
    let mut tx = pool.begin().await?;

    for item in &batch.products {
        if upsert_product(&mut *tx, shop_id, item).await? {
            summary.products_upserted += 1;
        } else {
            summary.skipped += 1;
        }
    }
    for item in &batch.collections {
        if upsert_collection(&mut *tx, shop_id, item).await? {
            summary.collections_upserted += 1;
        } else {
            summary.skipped += 1;
        }
    }
    for id in &batch.deleted_product_ids {
        if delete_product(&mut *tx, shop_id, id).await? {
            summary.products_deleted += 1;
        }
    }
    for id in &batch.deleted_collection_ids {
        if delete_collection(&mut *tx, shop_id, id).await? {
            summary.collections_deleted += 1;
        }
    }
    for definition in &batch.metafield_definitions {
        upsert_metafield_definition(&mut *tx, shop_id, definition).await?;
        summary.metafield_definitions_upserted += 1;
    }

    tx.commit().await?;
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn like_metacharacters_are_escaped() {
        assert_eq!(escape_like("50%_off\\"), "50\\%\\_off\\\\");
        assert_eq!(escape_like("shirt"), "shirt");
    }
}
