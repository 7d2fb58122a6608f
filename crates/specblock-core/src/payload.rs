//! Wire shapes returned by the public storefront endpoint. Keys are camelCase
//! and every visibility flag is a plain boolean.

use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StorefrontResponse {
    pub template: Option<TemplatePayload>,
    pub all_metafield_definitions: Vec<MetafieldDefinitionPayload>,
}

impl StorefrontResponse {
    /// The normal "nothing configured" answer.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            template: None,
            all_metafield_definitions: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplatePayload {
    pub id: Uuid,
    pub name: String,
    pub is_accordion: bool,
    #[serde(rename = "isAccordionHideFromPC")]
    pub accordion_hide_on_desktop: bool,
    #[serde(rename = "isAccordionHideFromMobile")]
    pub accordion_hide_on_mobile: bool,
    pub see_more_enabled: bool,
    #[serde(rename = "seeMoreHideFromPC")]
    pub see_more_hide_on_desktop: bool,
    #[serde(rename = "seeMoreHideFromMobile")]
    pub see_more_hide_on_mobile: bool,
    pub styling: Value,
    pub sections: Vec<SectionPayload>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SectionPayload {
    pub heading: String,
    pub metafields: Vec<SlotPayload>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotPayload {
    pub namespace: String,
    pub key: String,
    pub owner_type: String,
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub value_type: String,
    pub custom_name: Option<String>,
    pub display_name: String,
    pub tooltip_enabled: bool,
    pub tooltip_text: Option<String>,
    #[serde(rename = "hideFromPC")]
    pub hide_from_pc: bool,
    pub hide_from_mobile: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetafieldDefinitionPayload {
    pub namespace: String,
    pub key: String,
    pub owner_type: String,
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub value_type: String,
}
