//! Assignment model: which products, collections, or the whole catalog a
//! template applies to.
//!
//! Storage keeps one assignment row per template with an explicit
//! `is_excluded` flag; in memory that becomes the tagged [`AssignmentRule`],
//! so "except" mode is never inferred from the shape of the target list.

use std::collections::BTreeSet;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ids::normalize_id;
use crate::ValidationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AssignmentType {
    Default,
    Product,
    Collection,
}

impl AssignmentType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            AssignmentType::Default => "DEFAULT",
            AssignmentType::Product => "PRODUCT",
            AssignmentType::Collection => "COLLECTION",
        }
    }

    /// The kind of id this assignment targets; `None` for the global default.
    #[must_use]
    pub fn target_type(self) -> Option<TargetType> {
        match self {
            AssignmentType::Default => None,
            AssignmentType::Product => Some(TargetType::Product),
            AssignmentType::Collection => Some(TargetType::Collection),
        }
    }

    /// Parses the admin form value, where `"NONE"` or an empty value means
    /// "leave the template unassigned".
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::UnknownAssignmentType`] for any other value.
    pub fn parse_optional(raw: Option<&str>) -> Result<Option<Self>, ValidationError> {
        match raw.map(str::trim) {
            None | Some("" | "NONE") => Ok(None),
            Some(value) => value.parse().map(Some),
        }
    }
}

impl FromStr for AssignmentType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DEFAULT" => Ok(AssignmentType::Default),
            "PRODUCT" => Ok(AssignmentType::Product),
            "COLLECTION" => Ok(AssignmentType::Collection),
            other => Err(ValidationError::UnknownAssignmentType(other.to_string())),
        }
    }
}

impl std::fmt::Display for AssignmentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TargetType {
    Product,
    Collection,
}

impl TargetType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            TargetType::Product => "PRODUCT",
            TargetType::Collection => "COLLECTION",
        }
    }
}

impl From<TargetType> for AssignmentType {
    fn from(value: TargetType) -> Self {
        match value {
            TargetType::Product => AssignmentType::Product,
            TargetType::Collection => AssignmentType::Collection,
        }
    }
}

impl FromStr for TargetType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PRODUCT" => Ok(TargetType::Product),
            "COLLECTION" => Ok(TargetType::Collection),
            other => Err(ValidationError::UnknownAssignmentType(other.to_string())),
        }
    }
}

/// The rule a template's assignment expresses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AssignmentRule {
    /// Catch-all for the shop.
    Global,
    /// Exactly the listed ids.
    Direct {
        target_type: TargetType,
        ids: BTreeSet<String>,
    },
    /// Every id of the type except the listed ones.
    AllExcept {
        target_type: TargetType,
        excluded: BTreeSet<String>,
    },
}

impl AssignmentRule {
    #[must_use]
    pub fn assignment_type(&self) -> AssignmentType {
        match self {
            AssignmentRule::Global => AssignmentType::Default,
            AssignmentRule::Direct { target_type, .. }
            | AssignmentRule::AllExcept { target_type, .. } => (*target_type).into(),
        }
    }

    #[must_use]
    pub fn target_type(&self) -> Option<TargetType> {
        self.assignment_type().target_type()
    }

    #[must_use]
    pub fn is_excluded(&self) -> bool {
        matches!(self, AssignmentRule::AllExcept { .. })
    }

    /// Whether `id` is one of this rule's explicit direct targets.
    #[must_use]
    pub fn owns_directly(&self, target_type: TargetType, id: &str) -> bool {
        matches!(self, AssignmentRule::Direct { target_type: t, ids } if *t == target_type && ids.contains(id))
    }

    /// Whether an except rule of this type claims `id` through its implicit
    /// inclusion set. An except rule with an empty exclusion list never claims.
    #[must_use]
    pub fn claims_by_exception(&self, target_type: TargetType, id: &str) -> bool {
        matches!(
            self,
            AssignmentRule::AllExcept { target_type: t, excluded }
                if *t == target_type && !excluded.is_empty() && !excluded.contains(id)
        )
    }

    /// Target rows to persist for this rule.
    #[must_use]
    pub fn targets(&self) -> Vec<AssignmentTarget> {
        match self {
            AssignmentRule::Global => Vec::new(),
            AssignmentRule::Direct { target_type, ids } => ids
                .iter()
                .map(|id| AssignmentTarget {
                    target_id: id.clone(),
                    target_type: *target_type,
                    is_excluded: false,
                })
                .collect(),
            AssignmentRule::AllExcept {
                target_type,
                excluded,
            } => excluded
                .iter()
                .map(|id| AssignmentTarget {
                    target_id: id.clone(),
                    target_type: *target_type,
                    is_excluded: true,
                })
                .collect(),
        }
    }
}

/// One stored `(assignment, external id, type, excluded)` tuple.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentTarget {
    pub target_id: String,
    pub target_type: TargetType,
    pub is_excluded: bool,
}

/// A template's assignment together with the template's active flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub template_id: Uuid,
    pub template_active: bool,
    pub rule: AssignmentRule,
}

impl Assignment {
    /// Rebuilds an assignment from its stored row and target ids.
    ///
    /// Ids are normalized on the way in; empty ids are dropped.
    #[must_use]
    pub fn from_parts<I, S>(
        template_id: Uuid,
        template_active: bool,
        assignment_type: AssignmentType,
        is_excluded: bool,
        target_ids: I,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let ids: BTreeSet<String> = target_ids
            .into_iter()
            .filter_map(|id| normalize_id(id.as_ref()))
            .collect();

        let rule = match assignment_type.target_type() {
            None => AssignmentRule::Global,
            Some(target_type) if is_excluded => AssignmentRule::AllExcept {
                target_type,
                excluded: ids,
            },
            Some(target_type) => AssignmentRule::Direct { target_type, ids },
        };

        Self {
            template_id,
            template_active,
            rule,
        }
    }
}

/// What the admin submitted for a template's assignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssignmentRequest {
    /// `None` leaves the template unassigned.
    pub assignment_type: Option<AssignmentType>,
    pub target_ids: Vec<String>,
    pub is_excluded: bool,
}

impl AssignmentRequest {
    #[must_use]
    pub fn none() -> Self {
        Self {
            assignment_type: None,
            target_ids: Vec::new(),
            is_excluded: false,
        }
    }

    #[must_use]
    pub fn global() -> Self {
        Self {
            assignment_type: Some(AssignmentType::Default),
            target_ids: Vec::new(),
            is_excluded: false,
        }
    }

    #[must_use]
    pub fn direct(target_type: TargetType, ids: &[&str]) -> Self {
        Self {
            assignment_type: Some(target_type.into()),
            target_ids: ids.iter().map(|s| (*s).to_string()).collect(),
            is_excluded: false,
        }
    }

    #[must_use]
    pub fn all_except(target_type: TargetType, ids: &[&str]) -> Self {
        Self {
            is_excluded: true,
            ..Self::direct(target_type, ids)
        }
    }
}
