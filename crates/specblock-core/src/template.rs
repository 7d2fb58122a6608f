//! Template drafts as submitted by the admin UI, and their validation.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ValidationError;

/// A template as the merchant edits it. Sections and slots are ordered by
/// their position in the vectors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateDraft {
    pub name: String,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(default)]
    pub is_accordion: bool,
    #[serde(default)]
    pub accordion_hide_on_desktop: bool,
    #[serde(default)]
    pub accordion_hide_on_mobile: bool,
    #[serde(default)]
    pub see_more_enabled: bool,
    #[serde(default)]
    pub see_more_hide_on_desktop: bool,
    #[serde(default)]
    pub see_more_hide_on_mobile: bool,
    #[serde(default = "empty_object")]
    pub styling: Value,
    #[serde(default)]
    pub sections: Vec<SectionDraft>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionDraft {
    pub heading: String,
    #[serde(default)]
    pub slots: Vec<SlotDraft>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotDraft {
    pub metafield_definition_id: i64,
    #[serde(default)]
    pub custom_name: Option<String>,
    #[serde(default)]
    pub tooltip_enabled: bool,
    #[serde(default)]
    pub tooltip_text: Option<String>,
    #[serde(default)]
    pub hide_on_desktop: bool,
    #[serde(default)]
    pub hide_on_mobile: bool,
}

fn default_active() -> bool {
    true
}

fn empty_object() -> Value {
    Value::Object(serde_json::Map::new())
}

fn trimmed(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl TemplateDraft {
    /// Trims user-entered text and checks the draft can be stored.
    ///
    /// The per-slot desktop and mobile hide flags are mutually exclusive: a
    /// slot with both set keeps `hide_on_desktop` only. Positions in errors
    /// are 1-based, as the merchant sees them.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] for an empty name or an empty section
    /// heading.
    pub fn validate(self) -> Result<Self, ValidationError> {
        let name = self.name.trim().to_string();
        if name.is_empty() {
            return Err(ValidationError::EmptyTemplateName);
        }

        let sections = self
            .sections
            .into_iter()
            .enumerate()
            .map(|(section_idx, section)| {
                let heading = section.heading.trim().to_string();
                if heading.is_empty() {
                    return Err(ValidationError::EmptySectionHeading {
                        position: section_idx + 1,
                    });
                }
                let slots = section
                    .slots
                    .into_iter()
                    .map(|slot| SlotDraft {
                        custom_name: trimmed(slot.custom_name),
                        tooltip_text: trimmed(slot.tooltip_text),
                        hide_on_mobile: slot.hide_on_mobile && !slot.hide_on_desktop,
                        ..slot
                    })
                    .collect();
                Ok(SectionDraft { heading, slots })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let styling = if self.styling.is_null() {
            empty_object()
        } else {
            self.styling
        };

        Ok(Self {
            name,
            styling,
            sections,
            ..self
        })
    }

    /// The copy made by "duplicate": same layout, renamed, inactive.
    #[must_use]
    pub fn duplicate(&self) -> Self {
        Self {
            name: format!("{} duplicate", self.name),
            is_active: false,
            ..self.clone()
        }
    }
}

/// The label shown for a slot: its custom name, else the definition's name,
/// else `namespace.key`.
#[must_use]
pub fn display_name(
    custom_name: Option<&str>,
    definition_name: Option<&str>,
    namespace: &str,
    key: &str,
) -> String {
    custom_name
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .or_else(|| definition_name.map(str::trim).filter(|s| !s.is_empty()))
        .map_or_else(|| format!("{namespace}.{key}"), ToOwned::to_owned)
}
