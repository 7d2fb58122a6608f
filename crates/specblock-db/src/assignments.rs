//! Database operations for `assignments` and `assignment_targets`.

use std::collections::BTreeMap;

use serde::Serialize;
use sqlx::{PgConnection, PgExecutor, PgPool};
use uuid::Uuid;

use specblock_core::{
    plan_assignment, Assignment, AssignmentRequest, AssignmentRule, AssignmentTarget,
    AssignmentType, TargetType,
};

use crate::lookup::{lock_shop_for_write, rebuild_lookup};
use crate::DbError;

#[derive(Debug, sqlx::FromRow)]
struct AssignmentTargetJoinRow {
    template_id: Uuid,
    template_active: bool,
    assignment_type: String,
    is_excluded: bool,
    target_id: Option<String>,
}

/// One template's assignment as listed in the admin UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssignmentView {
    pub template_id: Uuid,
    pub template_name: String,
    pub template_active: bool,
    pub assignment_type: AssignmentType,
    pub is_excluded: bool,
    pub targets: Vec<AssignmentTarget>,
}

/// Result of a successful [`save_assignment`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SaveOutcome {
    /// Ids added to an except rule's exclusions because other templates own them.
    pub auto_added_count: usize,
    pub auto_added_type: Option<TargetType>,
    /// The rule now stored; `None` when the template was left unassigned.
    pub assignment: Option<AssignmentRule>,
}

fn parse_assignment_type(raw: &str) -> Result<AssignmentType, DbError> {
    raw.parse()
        .map_err(|_| DbError::InvalidRow(format!("assignment_type '{raw}'")))
}

/// Loads every assignment of the shop, with each template's active flag.
///
/// Target ids are normalized on load. Results are ordered by template id.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails, or [`DbError::InvalidRow`]
/// for an unknown stored assignment type.
pub async fn load_assignments(
    executor: impl PgExecutor<'_>,
    shop_id: i64,
) -> Result<Vec<Assignment>, DbError> {
    let rows = sqlx::query_as::<_, AssignmentTargetJoinRow>(
        "SELECT a.template_id, t.is_active AS template_active, a.assignment_type, \
                a.is_excluded, tg.target_id \
         FROM assignments a \
         JOIN templates t ON t.id = a.template_id \
         LEFT JOIN assignment_targets tg ON tg.assignment_id = a.id \
         WHERE a.shop_id = $1 \
         ORDER BY a.template_id, tg.target_id",
    )
    .bind(shop_id)
    .fetch_all(executor)
    .await?;

    let mut grouped: BTreeMap<Uuid, (bool, String, bool, Vec<String>)> = BTreeMap::new();
    for row in rows {
        let entry = grouped.entry(row.template_id).or_insert_with(|| {
            (
                row.template_active,
                row.assignment_type.clone(),
                row.is_excluded,
                Vec::new(),
            )
        });
        if let Some(target_id) = row.target_id {
            entry.3.push(target_id);
        }
    }

    grouped
        .into_iter()
        .map(|(template_id, (active, assignment_type, is_excluded, targets))| {
            Ok(Assignment::from_parts(
                template_id,
                active,
                parse_assignment_type(&assignment_type)?,
                is_excluded,
                targets,
            ))
        })
        .collect()
}

/// Lists every assignment of the shop with template names, ordered by name.
///
/// # Errors
///
/// Returns [`DbError`] if the queries fail.
pub async fn list_assignments(pool: &PgPool, shop_id: i64) -> Result<Vec<AssignmentView>, DbError> {
    let names = sqlx::query_as::<_, (Uuid, String)>(
        "SELECT t.id, t.name FROM templates t \
         JOIN assignments a ON a.template_id = t.id \
         WHERE t.shop_id = $1",
    )
    .bind(shop_id)
    .fetch_all(pool)
    .await?;
    let names: BTreeMap<Uuid, String> = names.into_iter().collect();

    let mut views: Vec<AssignmentView> = load_assignments(pool, shop_id)
        .await?
        .into_iter()
        .map(|a| AssignmentView {
            template_id: a.template_id,
            template_name: names.get(&a.template_id).cloned().unwrap_or_default(),
            template_active: a.template_active,
            assignment_type: a.rule.assignment_type(),
            is_excluded: a.rule.is_excluded(),
            targets: a.rule.targets(),
        })
        .collect();
    views.sort_by(|a, b| {
        a.template_name
            .cmp(&b.template_name)
            .then(a.template_id.cmp(&b.template_id))
    });

    Ok(views)
}

async fn insert_assignment(
    conn: &mut PgConnection,
    shop_id: i64,
    template_id: Uuid,
    rule: &AssignmentRule,
) -> Result<(), DbError> {
    let assignment_id = sqlx::query_scalar::<_, i64>(
        "INSERT INTO assignments (shop_id, template_id, assignment_type, is_excluded) \
         VALUES ($1, $2, $3, $4) RETURNING id",
    )
    .bind(shop_id)
    .bind(template_id)
    .bind(rule.assignment_type().as_str())
    .bind(rule.is_excluded())
    .fetch_one(&mut *conn)
    .await?;

    let targets = rule.targets();
    if targets.is_empty() {
        return Ok(());
    }

    let target_ids: Vec<String> = targets.iter().map(|t| t.target_id.clone()).collect();
    let target_types: Vec<String> = targets
        .iter()
        .map(|t| t.target_type.as_str().to_string())
        .collect();
    let excluded: Vec<bool> = targets.iter().map(|t| t.is_excluded).collect();

    sqlx::query(
        "INSERT INTO assignment_targets (assignment_id, target_id, target_type, is_excluded) \
         SELECT $1, * FROM UNNEST($2::text[], $3::text[], $4::bool[])",
    )
    .bind(assignment_id)
    .bind(target_ids)
    .bind(target_types)
    .bind(excluded)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Replaces a template's assignment.
///
/// Everything happens in one transaction, so concurrent readers see either
/// the old or the new state:
///
/// 1. take the shop's write lock and lock the template row;
/// 2. validate against the shop's other assignments (nothing is written on
///    a validation error);
/// 3. delete the existing assignment and rebuild the lookup table;
/// 4. insert the new rule, if any, and rebuild again.
///
/// # Errors
///
/// - [`DbError::NotFound`] if the template does not belong to the shop.
/// - [`DbError::Validation`] for a duplicate default, a target conflict, or an
///   empty except rule.
/// - [`DbError::Sqlx`] if any statement fails.
pub async fn save_assignment(
    pool: &PgPool,
    shop_id: i64,
    template_id: Uuid,
    request: &AssignmentRequest,
) -> Result<SaveOutcome, DbError> {
    let mut tx = pool.begin().await?;
    lock_shop_for_write(&mut *tx, shop_id).await?;

    let exists = sqlx::query_scalar::<_, Uuid>(
        "SELECT id FROM templates WHERE id = $1 AND shop_id = $2 FOR UPDATE",
    )
    .bind(template_id)
    .bind(shop_id)
    .fetch_optional(&mut *tx)
    .await?;
    if exists.is_none() {
        return Err(DbError::NotFound);
    }

    let existing = load_assignments(&mut *tx, shop_id).await?;
    let plan = plan_assignment(template_id, request, &existing)?;

    sqlx::query("DELETE FROM assignments WHERE template_id = $1")
        .bind(template_id)
        .execute(&mut *tx)
        .await?;
    rebuild_lookup(&mut *tx, shop_id).await?;

    if let Some(rule) = &plan.rule {
        insert_assignment(&mut *tx, shop_id, template_id, rule).await?;
        rebuild_lookup(&mut *tx, shop_id).await?;
    }

    tx.commit().await?;

    if plan.auto_added > 0 {
        tracing::info!(
            shop_id,
            %template_id,
            auto_added = plan.auto_added,
            "except rule exclusions auto-expanded"
        );
    }

    Ok(SaveOutcome {
        auto_added_count: plan.auto_added,
        auto_added_type: plan.auto_added_type(),
        assignment: plan.rule,
    })
}
