//! Materialized lookup rows derived from the assignment model.
//!
//! Except rules are stored by shape rather than enumerated over the catalog:
//! one marker row per rule plus one row per excluded id. A query for an id
//! then needs a keyed probe per priority step, independent of catalog size.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::str::FromStr;

use serde::Serialize;
use uuid::Uuid;

use crate::assignment::{Assignment, AssignmentRule, TargetType};
use crate::ids::normalize_opt;
use crate::resolver::{MatchKind, Resolution};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LookupKind {
    Product,
    ProductExcept,
    ProductExcluded,
    Collection,
    CollectionExcept,
    CollectionExcluded,
    Default,
}

impl LookupKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            LookupKind::Product => "product",
            LookupKind::ProductExcept => "product_except",
            LookupKind::ProductExcluded => "product_excluded",
            LookupKind::Collection => "collection",
            LookupKind::CollectionExcept => "collection_except",
            LookupKind::CollectionExcluded => "collection_excluded",
            LookupKind::Default => "default",
        }
    }

    #[must_use]
    pub fn priority(self) -> i16 {
        match self {
            LookupKind::Product => MatchKind::ProductDirect.priority(),
            LookupKind::ProductExcept | LookupKind::ProductExcluded => {
                MatchKind::ProductExcept.priority()
            }
            LookupKind::Collection => MatchKind::CollectionDirect.priority(),
            LookupKind::CollectionExcept | LookupKind::CollectionExcluded => {
                MatchKind::CollectionExcept.priority()
            }
            LookupKind::Default => MatchKind::Default.priority(),
        }
    }
}

impl FromStr for LookupKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "product" => Ok(LookupKind::Product),
            "product_except" => Ok(LookupKind::ProductExcept),
            "product_excluded" => Ok(LookupKind::ProductExcluded),
            "collection" => Ok(LookupKind::Collection),
            "collection_except" => Ok(LookupKind::CollectionExcept),
            "collection_excluded" => Ok(LookupKind::CollectionExcluded),
            "default" => Ok(LookupKind::Default),
            other => Err(format!("unknown lookup kind '{other}'")),
        }
    }
}

/// One row of the lookup table for a shop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LookupRow {
    pub product_id: Option<String>,
    pub collection_id: Option<String>,
    pub is_default: bool,
    pub kind: LookupKind,
    pub template_id: Uuid,
    pub priority: i16,
}

impl LookupRow {
    fn new(kind: LookupKind, template_id: Uuid, target: Option<&str>) -> Self {
        let (product_id, collection_id) = match kind {
            LookupKind::Product | LookupKind::ProductExcluded => {
                (target.map(ToOwned::to_owned), None)
            }
            LookupKind::Collection | LookupKind::CollectionExcluded => {
                (None, target.map(ToOwned::to_owned))
            }
            LookupKind::ProductExcept | LookupKind::CollectionExcept | LookupKind::Default => {
                (None, None)
            }
        };
        Self {
            product_id,
            collection_id,
            is_default: kind == LookupKind::Default,
            kind,
            template_id,
            priority: kind.priority(),
        }
    }

    fn sort_key(&self) -> (i16, LookupKind, Uuid, Option<&str>, Option<&str>) {
        (
            self.priority,
            self.kind,
            self.template_id,
            self.product_id.as_deref(),
            self.collection_id.as_deref(),
        )
    }
}

/// Derives the full, sorted set of lookup rows for a shop.
///
/// Inactive templates contribute nothing. Except rules with no exclusions are
/// skipped, matching the resolver. At most one default row is produced.
#[must_use]
pub fn build_lookup_rows(assignments: &[Assignment]) -> Vec<LookupRow> {
    let mut rows = Vec::new();
    let mut default_template: Option<Uuid> = None;

    for assignment in assignments.iter().filter(|a| a.template_active) {
        let template_id = assignment.template_id;
        match &assignment.rule {
            AssignmentRule::Global => {
                default_template = Some(match default_template {
                    Some(existing) => existing.min(template_id),
                    None => template_id,
                });
            }
            AssignmentRule::Direct { target_type, ids } => {
                let kind = match target_type {
                    TargetType::Product => LookupKind::Product,
                    TargetType::Collection => LookupKind::Collection,
                };
                rows.extend(
                    ids.iter()
                        .map(|id| LookupRow::new(kind, template_id, Some(id))),
                );
            }
            AssignmentRule::AllExcept {
                target_type,
                excluded,
            } => {
                if excluded.is_empty() {
                    continue;
                }
                let (marker, exclusion) = match target_type {
                    TargetType::Product => (LookupKind::ProductExcept, LookupKind::ProductExcluded),
                    TargetType::Collection => (
                        LookupKind::CollectionExcept,
                        LookupKind::CollectionExcluded,
                    ),
                };
                rows.push(LookupRow::new(marker, template_id, None));
                rows.extend(
                    excluded
                        .iter()
                        .map(|id| LookupRow::new(exclusion, template_id, Some(id))),
                );
            }
        }
    }

    if let Some(template_id) = default_template {
        rows.push(LookupRow::new(LookupKind::Default, template_id, None));
    }

    rows.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
    rows
}

#[derive(Debug, Default)]
struct TypeIndex {
    direct: HashMap<String, Uuid>,
    except: BTreeSet<Uuid>,
    excluded: HashSet<(Uuid, String)>,
}

impl TypeIndex {
    fn resolve(&self, id: &str) -> Option<(Uuid, bool)> {
        if let Some(template_id) = self.direct.get(id) {
            return Some((*template_id, true));
        }
        self.except
            .iter()
            .find(|template_id| !self.excluded.contains(&(**template_id, id.to_string())))
            .map(|template_id| (*template_id, false))
    }
}

/// In-memory index over lookup rows, answering the same queries as the
/// table in storage.
#[derive(Debug, Default)]
pub struct LookupIndex {
    products: TypeIndex,
    collections: TypeIndex,
    default: Option<Uuid>,
}

impl LookupIndex {
    #[must_use]
    pub fn from_rows(rows: &[LookupRow]) -> Self {
        let mut index = Self::default();
        for row in rows {
            let target = row.product_id.clone().or_else(|| row.collection_id.clone());
            match row.kind {
                LookupKind::Product | LookupKind::Collection => {
                    let Some(target) = target else { continue };
                    let slot = if row.kind == LookupKind::Product {
                        &mut index.products
                    } else {
                        &mut index.collections
                    };
                    slot.direct
                        .entry(target)
                        .and_modify(|existing| *existing = (*existing).min(row.template_id))
                        .or_insert(row.template_id);
                }
                LookupKind::ProductExcept => {
                    index.products.except.insert(row.template_id);
                }
                LookupKind::CollectionExcept => {
                    index.collections.except.insert(row.template_id);
                }
                LookupKind::ProductExcluded => {
                    if let Some(target) = target {
                        index.products.excluded.insert((row.template_id, target));
                    }
                }
                LookupKind::CollectionExcluded => {
                    if let Some(target) = target {
                        index.collections.excluded.insert((row.template_id, target));
                    }
                }
                LookupKind::Default => {
                    index.default = Some(match index.default {
                        Some(existing) => existing.min(row.template_id),
                        None => row.template_id,
                    });
                }
            }
        }
        index
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.default.is_none()
            && self.products.direct.is_empty()
            && self.products.except.is_empty()
            && self.collections.direct.is_empty()
            && self.collections.except.is_empty()
    }

    #[must_use]
    pub fn resolve(&self, product_id: Option<&str>, collection_id: Option<&str>) -> Option<Resolution> {
        if let Some(product) = normalize_opt(product_id) {
            if let Some((template_id, direct)) = self.products.resolve(&product) {
                let matched = if direct {
                    MatchKind::ProductDirect
                } else {
                    MatchKind::ProductExcept
                };
                return Some(Resolution {
                    template_id,
                    matched,
                });
            }
        }

        if let Some(collection) = normalize_opt(collection_id) {
            if let Some((template_id, direct)) = self.collections.resolve(&collection) {
                let matched = if direct {
                    MatchKind::CollectionDirect
                } else {
                    MatchKind::CollectionExcept
                };
                return Some(Resolution {
                    template_id,
                    matched,
                });
            }
        }

        self.default.map(|template_id| Resolution {
            template_id,
            matched: MatchKind::Default,
        })
    }
}

#[cfg(test)]
#[path = "lookup_test.rs"]
mod tests;
