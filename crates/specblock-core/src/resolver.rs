//! Priority resolution of a product/collection pair to a single template.
//!
//! Evaluated in strict order, first match wins:
//!
//! 1. product direct rule
//! 2. product except rule
//! 3. collection direct rule
//! 4. collection except rule
//! 5. shop default
//!
//! Only assignments of active templates take part. This is the live
//! recomputation path; the materialized lookup table in [`crate::lookup`]
//! must always agree with it.

use serde::Serialize;
use uuid::Uuid;

use crate::assignment::{Assignment, AssignmentRule, TargetType};
use crate::ids::normalize_opt;

/// Which rule produced a resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    ProductDirect,
    ProductExcept,
    CollectionDirect,
    CollectionExcept,
    Default,
}

impl MatchKind {
    /// Lookup priority; lower wins.
    #[must_use]
    pub fn priority(self) -> i16 {
        match self {
            MatchKind::ProductDirect => 1,
            MatchKind::ProductExcept => 2,
            MatchKind::CollectionDirect => 3,
            MatchKind::CollectionExcept => 4,
            MatchKind::Default => 5,
        }
    }

    #[must_use]
    pub fn from_priority(priority: i16) -> Option<Self> {
        match priority {
            1 => Some(MatchKind::ProductDirect),
            2 => Some(MatchKind::ProductExcept),
            3 => Some(MatchKind::CollectionDirect),
            4 => Some(MatchKind::CollectionExcept),
            5 => Some(MatchKind::Default),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Resolution {
    pub template_id: Uuid,
    pub matched: MatchKind,
}

/// Resolves the template for a product and/or collection.
///
/// Ids may be given bare or as resource URIs. When several rules of the same
/// step claim an id, the lowest template id wins, as in the lookup table.
#[must_use]
pub fn resolve(
    assignments: &[Assignment],
    product_id: Option<&str>,
    collection_id: Option<&str>,
) -> Option<Resolution> {
    let active: Vec<&Assignment> = assignments.iter().filter(|a| a.template_active).collect();

    let for_target = |target_type: TargetType, id: &str| -> Option<Resolution> {
        let (direct, except) = match target_type {
            TargetType::Product => (MatchKind::ProductDirect, MatchKind::ProductExcept),
            TargetType::Collection => (MatchKind::CollectionDirect, MatchKind::CollectionExcept),
        };

        if let Some(template_id) = active
            .iter()
            .filter(|a| a.rule.owns_directly(target_type, id))
            .map(|a| a.template_id)
            .min()
        {
            return Some(Resolution {
                template_id,
                matched: direct,
            });
        }

        active
            .iter()
            .filter(|a| a.rule.claims_by_exception(target_type, id))
            .map(|a| a.template_id)
            .min()
            .map(|template_id| Resolution {
                template_id,
                matched: except,
            })
    };

    if let Some(product) = normalize_opt(product_id) {
        if let Some(found) = for_target(TargetType::Product, &product) {
            return Some(found);
        }
    }

    if let Some(collection) = normalize_opt(collection_id) {
        if let Some(found) = for_target(TargetType::Collection, &collection) {
            return Some(found);
        }
    }

    active
        .iter()
        .filter(|a| a.rule == AssignmentRule::Global)
        .map(|a| a.template_id)
        .min()
        .map(|template_id| Resolution {
            template_id,
            matched: MatchKind::Default,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assignment::AssignmentType;

    fn id(n: u128) -> Uuid {
        Uuid::from_u128(n)
    }

    fn direct(template: u128, kind: AssignmentType, ids: &[&str]) -> Assignment {
        Assignment::from_parts(id(template), true, kind, false, ids.iter().copied())
    }

    fn except(template: u128, kind: AssignmentType, ids: &[&str]) -> Assignment {
        Assignment::from_parts(id(template), true, kind, true, ids.iter().copied())
    }

    fn global(template: u128) -> Assignment {
        Assignment::from_parts(
            id(template),
            true,
            AssignmentType::Default,
            false,
            std::iter::empty::<&str>(),
        )
    }

    fn template_of(r: Option<Resolution>) -> Option<Uuid> {
        r.map(|r| r.template_id)
    }

    #[test]
    fn no_assignments_resolves_to_none() {
        assert_eq!(resolve(&[], Some("1"), Some("2")), None);
        assert_eq!(resolve(&[], None, None), None);
    }

    #[test]
    fn product_direct_beats_default() {
        let all = [global(9), direct(1, AssignmentType::Product, &["111"])];
        let r = resolve(&all, Some("111"), None).expect("resolves");
        assert_eq!(r.template_id, id(1));
        assert_eq!(r.matched, MatchKind::ProductDirect);
    }

    #[test]
    fn uri_and_bare_product_ids_are_equivalent() {
        let all = [direct(1, AssignmentType::Product, &["gid://shopify/Product/111"])];
        assert_eq!(template_of(resolve(&all, Some("111"), None)), Some(id(1)));
        assert_eq!(
            template_of(resolve(&all, Some("gid://shopify/Product/111"), None)),
            Some(id(1))
        );
    }

    #[test]
    fn except_rule_matches_everything_but_its_exclusions() {
        let all = [except(2, AssignmentType::Product, &["A", "B"])];
        assert_eq!(template_of(resolve(&all, Some("C"), None)), Some(id(2)));
        assert_eq!(template_of(resolve(&all, Some("A"), None)), None);
        assert_eq!(template_of(resolve(&all, Some("B"), None)), None);
    }

    #[test]
    fn empty_except_rule_matches_nothing() {
        let all = [except(2, AssignmentType::Product, &[])];
        assert_eq!(resolve(&all, Some("1"), None), None);
    }

    #[test]
    fn product_rules_take_precedence_over_collection_rules() {
        let all = [
            direct(1, AssignmentType::Collection, &["10"]),
            except(2, AssignmentType::Product, &["999"]),
        ];
        let r = resolve(&all, Some("5"), Some("10")).expect("resolves");
        assert_eq!(r.template_id, id(2));
        assert_eq!(r.matched, MatchKind::ProductExcept);
    }

    #[test]
    fn collection_rule_applies_when_no_product_rule_matches() {
        let all = [
            global(9),
            direct(1, AssignmentType::Collection, &["10"]),
            direct(3, AssignmentType::Product, &["77"]),
        ];
        let r = resolve(&all, Some("5"), Some("gid://shopify/Collection/10")).expect("resolves");
        assert_eq!(r.template_id, id(1));
        assert_eq!(r.matched, MatchKind::CollectionDirect);
    }

    #[test]
    fn falls_back_to_default() {
        let all = [global(9), direct(1, AssignmentType::Product, &["111"])];
        let r = resolve(&all, Some("222"), None).expect("resolves");
        assert_eq!(r.template_id, id(9));
        assert_eq!(r.matched, MatchKind::Default);
    }

    #[test]
    fn inactive_templates_never_resolve() {
        let mut product = direct(1, AssignmentType::Product, &["111"]);
        product.template_active = false;
        let mut default = global(9);
        default.template_active = false;
        assert_eq!(resolve(&[product, default], Some("111"), None), None);
    }

    #[test]
    fn competing_except_rules_resolve_deterministically() {
        let all = [
            except(5, AssignmentType::Product, &["1"]),
            except(3, AssignmentType::Product, &["2"]),
        ];
        assert_eq!(template_of(resolve(&all, Some("9"), None)), Some(id(3)));
        assert_eq!(template_of(resolve(&all, Some("2"), None)), Some(id(5)));
    }

    #[test]
    fn double_booked_direct_target_resolves_to_lowest_template() {
        let all = [
            direct(7, AssignmentType::Product, &["1"]),
            direct(4, AssignmentType::Product, &["1"]),
        ];
        let found = resolve(&all, Some("1"), None);
        assert_eq!(template_of(found), Some(id(4)));

        let index = crate::LookupIndex::from_rows(&crate::build_lookup_rows(&all));
        assert_eq!(index.resolve(Some("1"), None), found);
    }

    #[test]
    fn except_rule_leaves_auto_excluded_ids_to_their_owner() {
        let all = [
            direct(1, AssignmentType::Product, &["gid://shopify/Product/111"]),
            except(2, AssignmentType::Product, &["222", "111"]),
        ];
        assert_eq!(template_of(resolve(&all, Some("333"), None)), Some(id(2)));
        assert_eq!(template_of(resolve(&all, Some("111"), None)), Some(id(1)));
        assert_eq!(template_of(resolve(&all, Some("222"), None)), None);
    }
}
