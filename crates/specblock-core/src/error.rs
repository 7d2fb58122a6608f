use thiserror::Error;
use uuid::Uuid;

use crate::assignment::TargetType;

/// A requested target that another template already claims.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetConflict {
    pub target_id: String,
    pub template_id: Uuid,
}

/// Input rejected before any mutation. Messages are shown to the merchant verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("template name cannot be empty")]
    EmptyTemplateName,

    #[error("section {position} heading cannot be empty")]
    EmptySectionHeading { position: usize },

    #[error("metafield definition {0} does not exist for this shop")]
    UnknownMetafieldDefinition(i64),

    #[error("another template ({template_id}) is already assigned globally")]
    DuplicateDefault { template_id: Uuid },

    #[error("some targets are already assigned to other templates: {}", format_conflicts(.conflicts))]
    TargetConflict { conflicts: Vec<TargetConflict> },

    #[error("an except rule needs at least one excluded {}", .target_type.as_str().to_lowercase())]
    EmptyExceptRule { target_type: TargetType },

    #[error("unknown assignment type '{0}'")]
    UnknownAssignmentType(String),

    #[error("invalid plan selected: '{0}'")]
    UnknownPlan(String),

    #[error("plan '{plan}' allows up to {max_products} products but the store has {product_count}")]
    PlanNotEligible {
        plan: String,
        product_count: i64,
        max_products: i64,
    },
}

fn format_conflicts(conflicts: &[TargetConflict]) -> String {
    conflicts
        .iter()
        .map(|c| format!("{} (template {})", c.target_id, c.template_id))
        .collect::<Vec<_>>()
        .join(", ")
}
