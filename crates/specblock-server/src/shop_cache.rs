//! Process-local map from shop domain to shop id.
//!
//! Shop ids never change once assigned, so entries stay valid until the shop
//! is deleted on uninstall, which evicts it here.

use std::{collections::HashMap, sync::Arc};

use sqlx::PgPool;
use tokio::sync::RwLock;

use specblock_db::DbError;

#[derive(Debug, Clone, Default)]
pub struct ShopCache {
    ids: Arc<RwLock<HashMap<String, i64>>>,
}

impl ShopCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    async fn cached(&self, shop_domain: &str) -> Option<i64> {
        self.ids.read().await.get(shop_domain).copied()
    }

    async fn remember(&self, shop_domain: &str, shop_id: i64) {
        self.ids
            .write()
            .await
            .insert(shop_domain.to_string(), shop_id);
    }

    /// The id of an existing shop; unknown domains are not cached.
    pub async fn find(&self, pool: &PgPool, shop_domain: &str) -> Result<Option<i64>, DbError> {
        if let Some(id) = self.cached(shop_domain).await {
            return Ok(Some(id));
        }

        let found = specblock_db::find_shop_id(pool, shop_domain).await?;
        if let Some(id) = found {
            self.remember(shop_domain, id).await;
        }
        Ok(found)
    }

    /// The id of the shop, registering it on first contact.
    pub async fn ensure(&self, pool: &PgPool, shop_domain: &str) -> Result<i64, DbError> {
        if let Some(id) = self.cached(shop_domain).await {
            return Ok(id);
        }

        let id = specblock_db::ensure_shop(pool, shop_domain).await?;
        self.remember(shop_domain, id).await;
        Ok(id)
    }

    pub async fn evict(&self, shop_domain: &str) {
        self.ids.write().await.remove(shop_domain);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn remembered_ids_are_served_until_evicted() {
        let cache = ShopCache::new();
        cache.remember("a.myshopify.com", 7).await;
        assert_eq!(cache.cached("a.myshopify.com").await, Some(7));

        cache.evict("a.myshopify.com").await;
        assert_eq!(cache.cached("a.myshopify.com").await, None);
    }

    #[tokio::test]
    async fn clones_share_entries() {
        let cache = ShopCache::new();
        let clone = cache.clone();
        clone.remember("b.myshopify.com", 3).await;
        assert_eq!(cache.cached("b.myshopify.com").await, Some(3));
    }
}
