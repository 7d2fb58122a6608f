//! Database operations for `shop_plans`.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;

use specblock_core::find_plan;

use crate::catalog::count_products;
use crate::DbError;

/// A row from the `shop_plans` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct ShopPlanRow {
    pub shop_id: i64,
    pub plan_key: String,
    pub products_count_at_selection: i64,
    pub selected_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_shop_plan(pool: &PgPool, shop_id: i64) -> Result<Option<ShopPlanRow>, DbError> {
    let row = sqlx::query_as::<_, ShopPlanRow>(
        "SELECT shop_id, plan_key, products_count_at_selection, selected_at, updated_at \
         FROM shop_plans WHERE shop_id = $1",
    )
    .bind(shop_id)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Selects a plan for the shop, checked against the mirrored product count.
///
/// # Errors
///
/// Returns [`DbError::Validation`] for an unknown plan or one the store is
/// too large for, or [`DbError::Sqlx`].
pub async fn select_shop_plan(
    pool: &PgPool,
    shop_id: i64,
    plan_key: &str,
) -> Result<ShopPlanRow, DbError> {
    let plan = find_plan(plan_key)?;
    let product_count = count_products(pool, shop_id).await?;
    plan.check_eligible(product_count)?;

    let row = sqlx::query_as::<_, ShopPlanRow>(
        "INSERT INTO shop_plans (shop_id, plan_key, products_count_at_selection) \
         VALUES ($1, $2, $3) \
         ON CONFLICT (shop_id) DO UPDATE SET \
             plan_key                    = EXCLUDED.plan_key, \
             products_count_at_selection = EXCLUDED.products_count_at_selection, \
             updated_at                  = NOW() \
         RETURNING shop_id, plan_key, products_count_at_selection, selected_at, updated_at",
    )
    .bind(shop_id)
    .bind(plan.key)
    .bind(product_count)
    .fetch_one(pool)
    .await?;

    tracing::info!(shop_id, plan = plan.key, product_count, "plan selected");
    Ok(row)
}
