//! Static plan catalog used to gate plan selection by catalog size.

use serde::Serialize;

use crate::ValidationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    pub key: &'static str,
    pub title: &'static str,
    /// Monthly price in US cents.
    pub price_cents: u32,
    /// `None` means unlimited.
    pub max_products: Option<i64>,
    pub max_templates: Option<u32>,
}

pub const PLANS: &[Plan] = &[
    Plan {
        key: "free",
        title: "Free",
        price_cents: 0,
        max_products: Some(5),
        max_templates: Some(1),
    },
    Plan {
        key: "starter",
        title: "Starter",
        price_cents: 599,
        max_products: Some(300),
        max_templates: Some(10),
    },
    Plan {
        key: "growth",
        title: "Growth",
        price_cents: 999,
        max_products: Some(1000),
        max_templates: Some(50),
    },
    Plan {
        key: "scale",
        title: "Scale",
        price_cents: 1999,
        max_products: Some(10_000),
        max_templates: Some(200),
    },
    Plan {
        key: "unlimited",
        title: "Unlimited",
        price_cents: 2999,
        max_products: None,
        max_templates: None,
    },
];

impl Plan {
    #[must_use]
    pub fn is_eligible(&self, product_count: i64) -> bool {
        self.max_products.is_none_or(|max| product_count <= max)
    }

    /// Checks that a store with `product_count` products may select this plan.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::PlanNotEligible`] when the store is too large.
    pub fn check_eligible(&self, product_count: i64) -> Result<(), ValidationError> {
        match self.max_products {
            Some(max_products) if product_count > max_products => {
                Err(ValidationError::PlanNotEligible {
                    plan: self.key.to_string(),
                    product_count,
                    max_products,
                })
            }
            _ => Ok(()),
        }
    }
}

/// Looks up a plan by key.
///
/// # Errors
///
/// Returns [`ValidationError::UnknownPlan`] for an unknown key.
pub fn find_plan(key: &str) -> Result<&'static Plan, ValidationError> {
    PLANS
        .iter()
        .find(|p| p.key == key)
        .ok_or_else(|| ValidationError::UnknownPlan(key.to_string()))
}

/// The smallest plan that fits `product_count`.
#[must_use]
pub fn recommended_plan(product_count: i64) -> &'static Plan {
    PLANS
        .iter()
        .find(|p| p.is_eligible(product_count))
        .unwrap_or(&PLANS[PLANS.len() - 1])
}
