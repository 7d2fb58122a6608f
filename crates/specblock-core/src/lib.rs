pub mod app_config;
pub mod assignment;
pub mod config;
pub mod error;
pub mod ids;
pub mod lookup;
pub mod payload;
pub mod planner;
pub mod plans;
pub mod resolver;
pub mod template;

pub use app_config::{AppConfig, Environment};
pub use assignment::{
    Assignment, AssignmentRequest, AssignmentRule, AssignmentTarget, AssignmentType, TargetType,
};
pub use config::{load_app_config, load_app_config_from_env};
pub use error::{TargetConflict, ValidationError};
pub use ids::{normalize_id, normalize_opt};
pub use lookup::{build_lookup_rows, LookupIndex, LookupKind, LookupRow};
pub use payload::{
    MetafieldDefinitionPayload, SectionPayload, SlotPayload, StorefrontResponse, TemplatePayload,
};
pub use planner::{plan_assignment, AssignmentPlan};
pub use plans::{find_plan, recommended_plan, Plan, PLANS};
pub use resolver::{resolve, MatchKind, Resolution};
pub use template::{display_name, SectionDraft, SlotDraft, TemplateDraft};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },
}
