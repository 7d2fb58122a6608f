//! Database operations for `shops`.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::DbError;

/// A row from the `shops` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ShopRow {
    pub id: i64,
    pub shop_domain: String,
    /// Set by every lookup rebuild; `NULL` until the first one.
    pub lookup_rebuilt_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Returns the id of the shop with `shop_domain`, creating it if needed.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the upsert fails.
pub async fn ensure_shop(pool: &PgPool, shop_domain: &str) -> Result<i64, DbError> {
    // DO UPDATE (rather than DO NOTHING) so RETURNING yields the existing id.
    let id = sqlx::query_scalar::<_, i64>(
        "INSERT INTO shops (shop_domain) VALUES ($1) \
         ON CONFLICT (shop_domain) DO UPDATE SET shop_domain = EXCLUDED.shop_domain \
         RETURNING id",
    )
    .bind(shop_domain)
    .fetch_one(pool)
    .await?;

    Ok(id)
}

/// Returns the id of the shop with `shop_domain`, if it exists.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn find_shop_id(pool: &PgPool, shop_domain: &str) -> Result<Option<i64>, DbError> {
    let id = sqlx::query_scalar::<_, i64>("SELECT id FROM shops WHERE shop_domain = $1")
        .bind(shop_domain)
        .fetch_optional(pool)
        .await?;

    Ok(id)
}

/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_shop(pool: &PgPool, shop_domain: &str) -> Result<Option<ShopRow>, DbError> {
    let row = sqlx::query_as::<_, ShopRow>(
        "SELECT id, shop_domain, lookup_rebuilt_at, created_at, updated_at \
         FROM shops WHERE shop_domain = $1",
    )
    .bind(shop_domain)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Deletes a shop and, through cascades, everything it owns.
///
/// Returns `false` when no such shop existed.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the delete fails.
pub async fn delete_shop(pool: &PgPool, shop_domain: &str) -> Result<bool, DbError> {
    let result = sqlx::query("DELETE FROM shops WHERE shop_domain = $1")
        .bind(shop_domain)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}
