//! Database operations for `templates`, `template_sections`, and
//! `template_slots`.
//!
//! Every write that can change what resolves (delete, toggle, an update that
//! flips `is_active`) rebuilds the shop's lookup table in the same
//! transaction.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use specblock_core::{
    display_name, SectionDraft, SectionPayload, SlotDraft, SlotPayload, TemplateDraft,
    TemplatePayload, ValidationError,
};

use crate::lookup::{lock_shop_for_write, rebuild_lookup};
use crate::DbError;

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// A row from the `templates` table.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct TemplateRow {
    pub id: Uuid,
    pub shop_id: i64,
    pub name: String,
    pub is_active: bool,
    pub is_accordion: bool,
    pub accordion_hide_on_desktop: bool,
    pub accordion_hide_on_mobile: bool,
    pub see_more_enabled: bool,
    pub see_more_hide_on_desktop: bool,
    pub see_more_hide_on_mobile: bool,
    pub styling: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A template in the admin list, with counts and its assignment kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct TemplateSummaryRow {
    pub id: Uuid,
    pub name: String,
    pub is_active: bool,
    pub section_count: i64,
    /// `NULL` when the template is unassigned.
    pub assignment_type: Option<String>,
    pub is_excluded: Option<bool>,
    pub target_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A slot joined with its metafield definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct SlotDetailRow {
    pub section_id: i64,
    pub position: i32,
    pub metafield_definition_id: i64,
    pub custom_name: Option<String>,
    pub tooltip_enabled: bool,
    pub tooltip_text: Option<String>,
    pub hide_on_desktop: bool,
    pub hide_on_mobile: bool,
    pub namespace: String,
    pub key: String,
    pub owner_type: String,
    pub definition_name: Option<String>,
    pub value_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SectionDetail {
    pub id: i64,
    pub heading: String,
    pub position: i32,
    pub slots: Vec<SlotDetailRow>,
}

/// A template with its ordered sections and slots.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TemplateDetail {
    pub template: TemplateRow,
    pub sections: Vec<SectionDetail>,
}

impl TemplateDetail {
    /// The editable form of this template.
    #[must_use]
    pub fn to_draft(&self) -> TemplateDraft {
        let t = &self.template;
        TemplateDraft {
            name: t.name.clone(),
            is_active: t.is_active,
            is_accordion: t.is_accordion,
            accordion_hide_on_desktop: t.accordion_hide_on_desktop,
            accordion_hide_on_mobile: t.accordion_hide_on_mobile,
            see_more_enabled: t.see_more_enabled,
            see_more_hide_on_desktop: t.see_more_hide_on_desktop,
            see_more_hide_on_mobile: t.see_more_hide_on_mobile,
            styling: t.styling.clone(),
            sections: self
                .sections
                .iter()
                .map(|section| SectionDraft {
                    heading: section.heading.clone(),
                    slots: section
                        .slots
                        .iter()
                        .map(|slot| SlotDraft {
                            metafield_definition_id: slot.metafield_definition_id,
                            custom_name: slot.custom_name.clone(),
                            tooltip_enabled: slot.tooltip_enabled,
                            tooltip_text: slot.tooltip_text.clone(),
                            hide_on_desktop: slot.hide_on_desktop,
                            hide_on_mobile: slot.hide_on_mobile,
                        })
                        .collect(),
                })
                .collect(),
        }
    }

    /// The storefront display payload.
    #[must_use]
    pub fn into_payload(self) -> TemplatePayload {
        let t = self.template;
        TemplatePayload {
            id: t.id,
            name: t.name,
            is_accordion: t.is_accordion,
            accordion_hide_on_desktop: t.accordion_hide_on_desktop,
            accordion_hide_on_mobile: t.accordion_hide_on_mobile,
            see_more_enabled: t.see_more_enabled,
            see_more_hide_on_desktop: t.see_more_hide_on_desktop,
            see_more_hide_on_mobile: t.see_more_hide_on_mobile,
            styling: t.styling,
            sections: self
                .sections
                .into_iter()
                .map(|section| SectionPayload {
                    heading: section.heading,
                    metafields: section
                        .slots
                        .into_iter()
                        .map(|slot| SlotPayload {
                            display_name: display_name(
                                slot.custom_name.as_deref(),
                                slot.definition_name.as_deref(),
                                &slot.namespace,
                                &slot.key,
                            ),
                            namespace: slot.namespace,
                            key: slot.key,
                            owner_type: slot.owner_type,
                            name: slot.definition_name,
                            value_type: slot.value_type,
                            custom_name: slot.custom_name,
                            tooltip_enabled: slot.tooltip_enabled,
                            tooltip_text: slot.tooltip_text,
                            hide_from_pc: slot.hide_on_desktop,
                            hide_from_mobile: slot.hide_on_mobile,
                        })
                        .collect(),
                })
                .collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// Write helpers
// ---------------------------------------------------------------------------

fn position(index: usize) -> i32 {
    i32::try_from(index).unwrap_or(i32::MAX)
}

async fn insert_template_row(
    conn: &mut PgConnection,
    shop_id: i64,
    template_id: Uuid,
    draft: &TemplateDraft,
) -> Result<(), DbError> {
    sqlx::query(
        "INSERT INTO templates \
             (id, shop_id, name, is_active, is_accordion, accordion_hide_on_desktop, \
              accordion_hide_on_mobile, see_more_enabled, see_more_hide_on_desktop, \
              see_more_hide_on_mobile, styling) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
    )
    .bind(template_id)
    .bind(shop_id)
    .bind(&draft.name)
    .bind(draft.is_active)
    .bind(draft.is_accordion)
    .bind(draft.accordion_hide_on_desktop)
    .bind(draft.accordion_hide_on_mobile)
    .bind(draft.see_more_enabled)
    .bind(draft.see_more_hide_on_desktop)
    .bind(draft.see_more_hide_on_mobile)
    .bind(&draft.styling)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Inserts sections and slots in draft order. Slots may only reference the
/// shop's own metafield definitions.
async fn insert_sections(
    conn: &mut PgConnection,
    shop_id: i64,
    template_id: Uuid,
    sections: &[SectionDraft],
) -> Result<(), DbError> {
    for (section_idx, section) in sections.iter().enumerate() {
        let section_id = sqlx::query_scalar::<_, i64>(
            "INSERT INTO template_sections (template_id, heading, position) \
             VALUES ($1, $2, $3) RETURNING id",
        )
        .bind(template_id)
        .bind(&section.heading)
        .bind(position(section_idx))
        .fetch_one(&mut *conn)
        .await?;

        for (slot_idx, slot) in section.slots.iter().enumerate() {
            let result = sqlx::query(
                "INSERT INTO template_slots \
                     (section_id, metafield_definition_id, position, custom_name, \
                      tooltip_enabled, tooltip_text, hide_on_desktop, hide_on_mobile) \
                 SELECT $1, d.id, $3, $4, $5, $6, $7, $8 \
                 FROM metafield_definitions d \
                 WHERE d.id = $2 AND d.shop_id = $9",
            )
            .bind(section_id)
            .bind(slot.metafield_definition_id)
            .bind(position(slot_idx))
            .bind(&slot.custom_name)
            .bind(slot.tooltip_enabled)
            .bind(&slot.tooltip_text)
            .bind(slot.hide_on_desktop)
            .bind(slot.hide_on_mobile)
            .bind(shop_id)
            .execute(&mut *conn)
            .await?;

            if result.rows_affected() == 0 {
                return Err(ValidationError::UnknownMetafieldDefinition(
                    slot.metafield_definition_id,
                )
                .into());
            }
        }
    }

    Ok(())
}

async fn create_from_draft(
    pool: &PgPool,
    shop_id: i64,
    draft: &TemplateDraft,
) -> Result<Uuid, DbError> {
    let template_id = Uuid::new_v4();

    let mut tx = pool.begin().await?;
    insert_template_row(&mut *tx, shop_id, template_id, draft).await?;
    insert_sections(&mut *tx, shop_id, template_id, &draft.sections).await?;
    tx.commit().await?;

    Ok(template_id)
}

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

/// Creates a template. New templates have no assignment, so nothing resolves
/// to them yet and the lookup table is left alone.
///
/// # Errors
///
/// Returns [`DbError::Validation`] for an invalid draft or a slot referencing
/// an unknown metafield definition, or [`DbError::Sqlx`] on failure.
pub async fn create_template(
    pool: &PgPool,
    shop_id: i64,
    draft: TemplateDraft,
) -> Result<Uuid, DbError> {
    let draft = draft.validate()?;
    create_from_draft(pool, shop_id, &draft).await
}

/// Replaces a template's fields and its sections wholesale.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the template does not belong to the shop,
/// [`DbError::Validation`] for an invalid draft, or [`DbError::Sqlx`].
pub async fn update_template(
    pool: &PgPool,
    shop_id: i64,
    template_id: Uuid,
    draft: TemplateDraft,
) -> Result<(), DbError> {
    let draft = draft.validate()?;
    let mut tx = pool.begin().await?;
    lock_shop_for_write(&mut *tx, shop_id).await?;

    let was_active = sqlx::query_scalar::<_, bool>(
        "SELECT is_active FROM templates WHERE id = $1 AND shop_id = $2 FOR UPDATE",
    )
    .bind(template_id)
    .bind(shop_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(DbError::NotFound)?;

    sqlx::query(
        "UPDATE templates SET \
             name = $2, is_active = $3, is_accordion = $4, \
             accordion_hide_on_desktop = $5, accordion_hide_on_mobile = $6, \
             see_more_enabled = $7, see_more_hide_on_desktop = $8, \
             see_more_hide_on_mobile = $9, styling = $10, updated_at = NOW() \
         WHERE id = $1",
    )
    .bind(template_id)
    .bind(&draft.name)
    .bind(draft.is_active)
    .bind(draft.is_accordion)
    .bind(draft.accordion_hide_on_desktop)
    .bind(draft.accordion_hide_on_mobile)
    .bind(draft.see_more_enabled)
    .bind(draft.see_more_hide_on_desktop)
    .bind(draft.see_more_hide_on_mobile)
    .bind(&draft.styling)
    .execute(&mut *tx)
    .await?;

    sqlx::query("DELETE FROM template_sections WHERE template_id = $1")
        .bind(template_id)
        .execute(&mut *tx)
        .await?;
    insert_sections(&mut *tx, shop_id, template_id, &draft.sections).await?;

    if was_active != draft.is_active {
        rebuild_lookup(&mut *tx, shop_id).await?;
    }

    tx.commit().await?;
    Ok(())
}

/// Deletes a template with its sections, slots, assignment, and lookup rows.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the template does not belong to the shop,
/// or [`DbError::Sqlx`].
pub async fn delete_template(pool: &PgPool, shop_id: i64, template_id: Uuid) -> Result<(), DbError> {
    let mut tx = pool.begin().await?;
    lock_shop_for_write(&mut *tx, shop_id).await?;

    let result = sqlx::query("DELETE FROM templates WHERE id = $1 AND shop_id = $2")
        .bind(template_id)
        .bind(shop_id)
        .execute(&mut *tx)
        .await?;
    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }

    rebuild_lookup(&mut *tx, shop_id).await?;
    tx.commit().await?;
    Ok(())
}

/// Copies a template's layout into a new, inactive, unassigned template
/// named `"<name> duplicate"`. Returns the new id.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the template does not belong to the shop,
/// or [`DbError::Sqlx`].
pub async fn duplicate_template(
    pool: &PgPool,
    shop_id: i64,
    template_id: Uuid,
) -> Result<Uuid, DbError> {
    let original = get_template_detail(pool, shop_id, template_id).await?;
    let copy = original.to_draft().duplicate();
    create_from_draft(pool, shop_id, &copy).await
}

/// Flips `is_active` and rebuilds the lookup table. Returns the new state.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the template does not belong to the shop,
/// or [`DbError::Sqlx`].
pub async fn toggle_template_active(
    pool: &PgPool,
    shop_id: i64,
    template_id: Uuid,
) -> Result<bool, DbError> {
    let mut tx = pool.begin().await?;
    lock_shop_for_write(&mut *tx, shop_id).await?;

    let is_active = sqlx::query_scalar::<_, bool>(
        "UPDATE templates SET is_active = NOT is_active, updated_at = NOW() \
         WHERE id = $1 AND shop_id = $2 \
         RETURNING is_active",
    )
    .bind(template_id)
    .bind(shop_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(DbError::NotFound)?;

    rebuild_lookup(&mut *tx, shop_id).await?;
    tx.commit().await?;
    Ok(is_active)
}

/// Loads a template with sections ordered by position and slots ordered by
/// position within their section.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the template does not belong to the shop,
/// or [`DbError::Sqlx`].
pub async fn get_template_detail(
    pool: &PgPool,
    shop_id: i64,
    template_id: Uuid,
) -> Result<TemplateDetail, DbError> {
    let template = sqlx::query_as::<_, TemplateRow>(
        "SELECT id, shop_id, name, is_active, is_accordion, accordion_hide_on_desktop, \
                accordion_hide_on_mobile, see_more_enabled, see_more_hide_on_desktop, \
                see_more_hide_on_mobile, styling, created_at, updated_at \
         FROM templates WHERE id = $1 AND shop_id = $2",
    )
    .bind(template_id)
    .bind(shop_id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)?;

    let sections = sqlx::query_as::<_, (i64, String, i32)>(
        "SELECT id, heading, position FROM template_sections \
         WHERE template_id = $1 ORDER BY position",
    )
    .bind(template_id)
    .fetch_all(pool)
    .await?;

    let mut slots = sqlx::query_as::<_, SlotDetailRow>(
        "SELECT s.section_id, s.position, s.metafield_definition_id, s.custom_name, \
                s.tooltip_enabled, s.tooltip_text, s.hide_on_desktop, s.hide_on_mobile, \
                d.namespace, d.key, d.owner_type, d.name AS definition_name, d.value_type \
         FROM template_slots s \
         JOIN template_sections sec ON sec.id = s.section_id \
         JOIN metafield_definitions d ON d.id = s.metafield_definition_id \
         WHERE sec.template_id = $1 \
         ORDER BY sec.position, s.position",
    )
    .bind(template_id)
    .fetch_all(pool)
    .await?
    .into_iter()
    .peekable();

    let sections = sections
        .into_iter()
        .map(|(id, heading, position)| {
            let mut section_slots = Vec::new();
            while let Some(slot) = slots.next_if(|s| s.section_id == id) {
                section_slots.push(slot);
            }
            SectionDetail {
                id,
                heading,
                position,
                slots: section_slots,
            }
        })
        .collect();

    Ok(TemplateDetail { template, sections })
}

/// All templates of the shop, oldest first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_templates(pool: &PgPool, shop_id: i64) -> Result<Vec<TemplateSummaryRow>, DbError> {
    let rows = sqlx::query_as::<_, TemplateSummaryRow>(
        "SELECT t.id, t.name, t.is_active, \
                (SELECT COUNT(*) FROM template_sections s WHERE s.template_id = t.id) \
                    AS section_count, \
                a.assignment_type, a.is_excluded, \
                (SELECT COUNT(*) FROM assignment_targets tg WHERE tg.assignment_id = a.id) \
                    AS target_count, \
                t.created_at, t.updated_at \
         FROM templates t \
         LEFT JOIN assignments a ON a.template_id = t.id \
         WHERE t.shop_id = $1 \
         ORDER BY t.created_at ASC, t.id ASC",
    )
    .bind(shop_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
