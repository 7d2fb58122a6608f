//! Lookup-table commands. Each looks the shop up by domain and fails when it
//! has never been registered.

use sqlx::PgPool;

use specblock_db::LookupTableRow;

async fn shop_id(pool: &PgPool, shop: &str) -> anyhow::Result<i64> {
    specblock_db::find_shop_id(pool, shop)
        .await?
        .ok_or_else(|| anyhow::anyhow!("shop '{shop}' not found"))
}

/// Rebuild the lookup table for one shop.
///
/// # Errors
///
/// Returns an error if the shop is unknown or the rebuild fails.
pub(crate) async fn run_rebuild(pool: &PgPool, shop: &str) -> anyhow::Result<()> {
    let shop_id = shop_id(pool, shop).await?;
    let rows = specblock_db::rebuild_lookup_for_shop(pool, shop_id).await?;
    tracing::info!(shop, shop_id, rows, "lookup rebuilt");
    println!("{shop}: {rows} lookup row(s) written");
    Ok(())
}

/// Resolve through the lookup table, healing it if it is empty.
///
/// # Errors
///
/// Returns an error if the shop is unknown or a query fails.
pub(crate) async fn run_resolve(
    pool: &PgPool,
    shop: &str,
    product: Option<&str>,
    collection: Option<&str>,
) -> anyhow::Result<()> {
    let shop_id = shop_id(pool, shop).await?;
    match specblock_db::resolve_template_id(pool, shop_id, product, collection).await? {
        Some(resolution) => println!(
            "{} ({})",
            resolution.template_id,
            match_label(resolution.matched)
        ),
        None => println!("no template"),
    }
    Ok(())
}

/// Print every lookup row of the shop.
///
/// # Errors
///
/// Returns an error if the shop is unknown or the query fails.
pub(crate) async fn run_dump(pool: &PgPool, shop: &str) -> anyhow::Result<()> {
    let shop_id = shop_id(pool, shop).await?;
    let rows = specblock_db::list_lookup_rows(pool, shop_id).await?;

    if rows.is_empty() {
        println!("no lookup rows for {shop}; run `rebuild-lookup` if assignments exist");
        return Ok(());
    }

    println!(
        "{:<4}{:<22}{:<16}{:<16}TEMPLATE",
        "PRI", "KIND", "PRODUCT", "COLLECTION"
    );
    for row in &rows {
        println!("{}", format_row(row));
    }
    Ok(())
}

fn match_label(kind: specblock_core::MatchKind) -> &'static str {
    use specblock_core::MatchKind;
    match kind {
        MatchKind::ProductDirect => "product",
        MatchKind::ProductExcept => "all products except",
        MatchKind::CollectionDirect => "collection",
        MatchKind::CollectionExcept => "all collections except",
        MatchKind::Default => "default",
    }
}

fn format_row(row: &LookupTableRow) -> String {
    format!(
        "{:<4}{:<22}{:<16}{:<16}{}",
        row.priority,
        row.rule_kind,
        row.product_id.as_deref().unwrap_or("-"),
        row.collection_id.as_deref().unwrap_or("-"),
        row.template_id
    )
}
