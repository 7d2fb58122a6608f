//! Validation and normalization of an assignment save, before anything is
//! written.

use std::collections::BTreeSet;

use uuid::Uuid;

use crate::assignment::{Assignment, AssignmentRequest, AssignmentRule, AssignmentType, TargetType};
use crate::error::{TargetConflict, ValidationError};
use crate::ids::normalize_id;

/// What a save will persist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssignmentPlan {
    /// `None` leaves the template unassigned.
    pub rule: Option<AssignmentRule>,
    /// Exclusions added to an except rule because other templates own them.
    pub auto_added: usize,
}

impl AssignmentPlan {
    #[must_use]
    pub fn auto_added_type(&self) -> Option<TargetType> {
        match &self.rule {
            Some(rule @ AssignmentRule::AllExcept { .. }) if self.auto_added > 0 => rule.target_type(),
            _ => None,
        }
    }
}

/// Plans the assignment for `template_id` against every other template's
/// assignment in the shop.
///
/// Entries in `existing` belonging to `template_id` itself are ignored, since
/// the save replaces them. Active and inactive templates are both considered.
///
/// # Errors
///
/// - [`ValidationError::DuplicateDefault`] when another template already owns
///   the shop default.
/// - [`ValidationError::TargetConflict`] when a direct save requests ids that
///   another template claims directly or through an except rule.
/// - [`ValidationError::EmptyExceptRule`] when an except save ends up with no
///   exclusions.
pub fn plan_assignment(
    template_id: Uuid,
    request: &AssignmentRequest,
    existing: &[Assignment],
) -> Result<AssignmentPlan, ValidationError> {
    let others: Vec<&Assignment> = existing
        .iter()
        .filter(|a| a.template_id != template_id)
        .collect();

    let Some(assignment_type) = request.assignment_type else {
        return Ok(AssignmentPlan {
            rule: None,
            auto_added: 0,
        });
    };

    let Some(target_type) = assignment_type.target_type() else {
        if let Some(owner) = others
            .iter()
            .filter(|a| a.rule.assignment_type() == AssignmentType::Default)
            .map(|a| a.template_id)
            .min()
        {
            return Err(ValidationError::DuplicateDefault {
                template_id: owner,
            });
        }
        return Ok(AssignmentPlan {
            rule: Some(AssignmentRule::Global),
            auto_added: 0,
        });
    };

    let requested: BTreeSet<String> = request
        .target_ids
        .iter()
        .filter_map(|id| normalize_id(id))
        .collect();

    if request.is_excluded {
        plan_except(target_type, requested, &others)
    } else {
        plan_direct(target_type, requested, &others)
    }
}

fn plan_direct(
    target_type: TargetType,
    ids: BTreeSet<String>,
    others: &[&Assignment],
) -> Result<AssignmentPlan, ValidationError> {
    let conflicts: Vec<TargetConflict> = ids
        .iter()
        .filter_map(|id| {
            let owner = others
                .iter()
                .find(|a| a.rule.owns_directly(target_type, id))
                .or_else(|| {
                    others
                        .iter()
                        .filter(|a| a.rule.claims_by_exception(target_type, id))
                        .min_by_key(|a| a.template_id)
                })?;
            Some(TargetConflict {
                target_id: id.clone(),
                template_id: owner.template_id,
            })
        })
        .collect();

    if !conflicts.is_empty() {
        return Err(ValidationError::TargetConflict { conflicts });
    }

    Ok(AssignmentPlan {
        rule: Some(AssignmentRule::Direct { target_type, ids }),
        auto_added: 0,
    })
}

fn plan_except(
    target_type: TargetType,
    mut excluded: BTreeSet<String>,
    others: &[&Assignment],
) -> Result<AssignmentPlan, ValidationError> {
    let before = excluded.len();
    for other in others {
        if let AssignmentRule::Direct {
            target_type: t,
            ids,
        } = &other.rule
        {
            if *t == target_type {
                excluded.extend(ids.iter().cloned());
            }
        }
    }
    let auto_added = excluded.len() - before;

    if excluded.is_empty() {
        return Err(ValidationError::EmptyExceptRule { target_type });
    }

    Ok(AssignmentPlan {
        rule: Some(AssignmentRule::AllExcept {
            target_type,
            excluded,
        }),
        auto_added,
    })
}

#[cfg(test)]
#[path = "planner_test.rs"]
mod tests;
