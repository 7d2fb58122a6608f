//! Live integration tests for specblock-db using `#[sqlx::test]`.
//!
//! Each test gets a fresh, fully-migrated Postgres database spun up by the
//! sqlx test harness. The `migrations` path is relative to the crate root
//! (`crates/specblock-db/`), so `"../../migrations"` resolves to the workspace
//! migration directory.

use serde_json::json;
use specblock_core::{
    resolve, AssignmentRequest, AssignmentType, MatchKind, SectionDraft, SlotDraft, TargetType,
    TemplateDraft, ValidationError,
};
use specblock_db::{
    apply_catalog_batch, create_template, delete_shop, delete_template, duplicate_template,
    ensure_shop, find_shop_id, get_shop, get_template_detail, list_assignments,
    list_lookup_rows, list_metafield_definitions, list_templates, load_assignments,
    log_webhook_event, lookup_template_id, rebuild_lookup_for_shop, resolve_template_id,
    save_assignment, search_products, select_shop_plan, toggle_template_active, update_template,
    upsert_metafield_definition, upsert_product, webhook_stats, CatalogBatch, CatalogItem, DbError,
    MetafieldDefinitionInput, WebhookStatus,
};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn seed_shop(pool: &sqlx::PgPool) -> i64 {
    ensure_shop(pool, "test-shop.myshopify.com")
        .await
        .expect("ensure_shop failed")
}

fn draft(name: &str) -> TemplateDraft {
    TemplateDraft {
        name: name.to_string(),
        is_active: true,
        is_accordion: false,
        accordion_hide_on_desktop: false,
        accordion_hide_on_mobile: false,
        see_more_enabled: false,
        see_more_hide_on_desktop: false,
        see_more_hide_on_mobile: false,
        styling: json!({}),
        sections: vec![],
    }
}

async fn seed_template(pool: &sqlx::PgPool, shop_id: i64, name: &str) -> Uuid {
    create_template(pool, shop_id, draft(name))
        .await
        .unwrap_or_else(|e| panic!("create_template failed for '{name}': {e}"))
}

async fn seed_definition(pool: &sqlx::PgPool, shop_id: i64, namespace: &str, key: &str) -> i64 {
    upsert_metafield_definition(
        pool,
        shop_id,
        &MetafieldDefinitionInput {
            namespace: namespace.to_string(),
            key: key.to_string(),
            owner_type: "PRODUCT".to_string(),
            name: None,
            value_type: "single_line_text_field".to_string(),
        },
    )
    .await
    .expect("upsert_metafield_definition failed")
}

async fn resolved(pool: &sqlx::PgPool, shop_id: i64, product: Option<&str>, collection: Option<&str>) -> Option<Uuid> {
    resolve_template_id(pool, shop_id, product, collection)
        .await
        .expect("resolve_template_id failed")
        .map(|r| r.template_id)
}

// ---------------------------------------------------------------------------
// Section 1: Resolution through the lookup table
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn shop_without_assignments_resolves_to_none(pool: sqlx::PgPool) {
    let shop_id = seed_shop(&pool).await;
    seed_template(&pool, shop_id, "Unassigned").await;

    assert_eq!(resolved(&pool, shop_id, Some("1"), Some("2")).await, None);
    assert_eq!(resolved(&pool, shop_id, None, None).await, None);
    let rows = list_lookup_rows(&pool, shop_id).await.expect("list rows");
    assert!(rows.is_empty());
}

#[sqlx::test(migrations = "../../migrations")]
async fn product_rule_beats_default(pool: sqlx::PgPool) {
    let shop_id = seed_shop(&pool).await;
    let t1 = seed_template(&pool, shop_id, "Product").await;
    let fallback = seed_template(&pool, shop_id, "Fallback").await;

    save_assignment(&pool, shop_id, fallback, &AssignmentRequest::global())
        .await
        .expect("save default");
    save_assignment(
        &pool,
        shop_id,
        t1,
        &AssignmentRequest::direct(TargetType::Product, &["111"]),
    )
    .await
    .expect("save product");

    let r = resolve_template_id(&pool, shop_id, Some("111"), None)
        .await
        .expect("resolve")
        .expect("resolves");
    assert_eq!(r.template_id, t1);
    assert_eq!(r.matched, MatchKind::ProductDirect);
    assert_eq!(resolved(&pool, shop_id, Some("999"), None).await, Some(fallback));
}

#[sqlx::test(migrations = "../../migrations")]
async fn uri_and_bare_product_ids_are_equivalent(pool: sqlx::PgPool) {
    let shop_id = seed_shop(&pool).await;
    let t1 = seed_template(&pool, shop_id, "T1").await;

    save_assignment(
        &pool,
        shop_id,
        t1,
        &AssignmentRequest::direct(TargetType::Product, &["gid://shopify/Product/111"]),
    )
    .await
    .expect("save");

    assert_eq!(resolved(&pool, shop_id, Some("111"), None).await, Some(t1));
    assert_eq!(
        resolved(&pool, shop_id, Some("gid://shopify/Product/111"), None).await,
        Some(t1)
    );
}

#[sqlx::test(migrations = "../../migrations")]
async fn except_rule_auto_excludes_ids_owned_elsewhere(pool: sqlx::PgPool) {
    let shop_id = seed_shop(&pool).await;
    let t1 = seed_template(&pool, shop_id, "T1").await;
    let t2 = seed_template(&pool, shop_id, "T2").await;

    save_assignment(
        &pool,
        shop_id,
        t1,
        &AssignmentRequest::direct(TargetType::Product, &["gid://shopify/Product/111"]),
    )
    .await
    .expect("save T1");

    let outcome = save_assignment(
        &pool,
        shop_id,
        t2,
        &AssignmentRequest::all_except(TargetType::Product, &["222"]),
    )
    .await
    .expect("save T2");
    assert_eq!(outcome.auto_added_count, 1);
    assert_eq!(outcome.auto_added_type, Some(TargetType::Product));

    assert_eq!(resolved(&pool, shop_id, Some("333"), None).await, Some(t2));
    assert_eq!(resolved(&pool, shop_id, Some("111"), None).await, Some(t1));
    assert_eq!(resolved(&pool, shop_id, Some("222"), None).await, None);

    let fallback = seed_template(&pool, shop_id, "Fallback").await;
    save_assignment(&pool, shop_id, fallback, &AssignmentRequest::global())
        .await
        .expect("save default");
    assert_eq!(resolved(&pool, shop_id, Some("222"), None).await, Some(fallback));
}

#[sqlx::test(migrations = "../../migrations")]
async fn collection_rules_apply_after_product_rules(pool: sqlx::PgPool) {
    let shop_id = seed_shop(&pool).await;
    let by_product = seed_template(&pool, shop_id, "By product").await;
    let by_collection = seed_template(&pool, shop_id, "By collection").await;
    let rest = seed_template(&pool, shop_id, "Other collections").await;

    save_assignment(
        &pool,
        shop_id,
        by_product,
        &AssignmentRequest::direct(TargetType::Product, &["1"]),
    )
    .await
    .expect("save product rule");
    save_assignment(
        &pool,
        shop_id,
        by_collection,
        &AssignmentRequest::direct(TargetType::Collection, &["10"]),
    )
    .await
    .expect("save collection rule");
    save_assignment(
        &pool,
        shop_id,
        rest,
        &AssignmentRequest::all_except(TargetType::Collection, &["11"]),
    )
    .await
    .expect("save collection except rule");

    assert_eq!(resolved(&pool, shop_id, Some("1"), Some("10")).await, Some(by_product));
    assert_eq!(resolved(&pool, shop_id, Some("2"), Some("10")).await, Some(by_collection));
    assert_eq!(
        resolved(&pool, shop_id, Some("2"), Some("gid://shopify/Collection/12")).await,
        Some(rest)
    );
    assert_eq!(resolved(&pool, shop_id, Some("2"), Some("11")).await, None);
}

#[sqlx::test(migrations = "../../migrations")]
async fn lookup_table_agrees_with_live_resolver(pool: sqlx::PgPool) {
    let shop_id = seed_shop(&pool).await;
    let a = seed_template(&pool, shop_id, "A").await;
    let b = seed_template(&pool, shop_id, "B").await;
    let c = seed_template(&pool, shop_id, "C").await;
    let d = seed_template(&pool, shop_id, "D").await;

    save_assignment(&pool, shop_id, a, &AssignmentRequest::direct(TargetType::Product, &["1", "2"]))
        .await
        .expect("a");
    save_assignment(&pool, shop_id, b, &AssignmentRequest::all_except(TargetType::Product, &["3"]))
        .await
        .expect("b");
    save_assignment(&pool, shop_id, c, &AssignmentRequest::direct(TargetType::Collection, &["10"]))
        .await
        .expect("c");
    save_assignment(&pool, shop_id, d, &AssignmentRequest::global())
        .await
        .expect("d");

    let assignments = load_assignments(&pool, shop_id).await.expect("load");
    for product in [None, Some("1"), Some("2"), Some("3"), Some("4")] {
        for collection in [None, Some("10"), Some("11")] {
            let from_table = lookup_template_id(&pool, shop_id, product, collection)
                .await
                .expect("lookup");
            assert_eq!(
                from_table,
                resolve(&assignments, product, collection),
                "disagreement for product={product:?} collection={collection:?}"
            );
        }
    }
}

// ---------------------------------------------------------------------------
// Section 2: Assignment writer validation
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn direct_conflict_fails_and_leaves_assignments_unchanged(pool: sqlx::PgPool) {
    let shop_id = seed_shop(&pool).await;
    let t1 = seed_template(&pool, shop_id, "T1").await;
    let t2 = seed_template(&pool, shop_id, "T2").await;

    save_assignment(&pool, shop_id, t1, &AssignmentRequest::direct(TargetType::Product, &["500"]))
        .await
        .expect("save T1");
    save_assignment(&pool, shop_id, t2, &AssignmentRequest::direct(TargetType::Product, &["600"]))
        .await
        .expect("save T2");

    let before = list_assignments(&pool, shop_id).await.expect("list before");
    let lookup_before = list_lookup_rows(&pool, shop_id).await.expect("rows before");

    let err = save_assignment(
        &pool,
        shop_id,
        t2,
        &AssignmentRequest::direct(TargetType::Product, &["gid://shopify/Product/500"]),
    )
    .await
    .expect_err("conflict must fail");
    assert!(
        matches!(err, DbError::Validation(ValidationError::TargetConflict { ref conflicts }) if conflicts[0].template_id == t1),
        "unexpected error: {err:?}"
    );

    assert_eq!(list_assignments(&pool, shop_id).await.expect("list after"), before);
    assert_eq!(list_lookup_rows(&pool, shop_id).await.expect("rows after"), lookup_before);
}

#[sqlx::test(migrations = "../../migrations")]
async fn second_default_is_rejected(pool: sqlx::PgPool) {
    let shop_id = seed_shop(&pool).await;
    let t1 = seed_template(&pool, shop_id, "T1").await;
    let t2 = seed_template(&pool, shop_id, "T2").await;

    save_assignment(&pool, shop_id, t1, &AssignmentRequest::global())
        .await
        .expect("first default");
    let err = save_assignment(&pool, shop_id, t2, &AssignmentRequest::global())
        .await
        .expect_err("second default must fail");
    assert!(matches!(
        err,
        DbError::Validation(ValidationError::DuplicateDefault { template_id }) if template_id == t1
    ));
    assert_eq!(resolved(&pool, shop_id, None, None).await, Some(t1));
}

#[sqlx::test(migrations = "../../migrations")]
async fn empty_except_rule_is_rejected(pool: sqlx::PgPool) {
    let shop_id = seed_shop(&pool).await;
    let t1 = seed_template(&pool, shop_id, "T1").await;

    let err = save_assignment(
        &pool,
        shop_id,
        t1,
        &AssignmentRequest::all_except(TargetType::Product, &[]),
    )
    .await
    .expect_err("empty except must fail");
    assert!(matches!(
        err,
        DbError::Validation(ValidationError::EmptyExceptRule { .. })
    ));
}

#[sqlx::test(migrations = "../../migrations")]
async fn saving_none_unassigns_the_template(pool: sqlx::PgPool) {
    let shop_id = seed_shop(&pool).await;
    let t1 = seed_template(&pool, shop_id, "T1").await;

    save_assignment(&pool, shop_id, t1, &AssignmentRequest::global())
        .await
        .expect("assign");
    let outcome = save_assignment(&pool, shop_id, t1, &AssignmentRequest::none())
        .await
        .expect("unassign");

    assert_eq!(outcome.assignment, None);
    assert!(list_assignments(&pool, shop_id).await.expect("list").is_empty());
    assert_eq!(resolved(&pool, shop_id, Some("1"), None).await, None);
}

#[sqlx::test(migrations = "../../migrations")]
async fn saving_for_unknown_template_is_not_found(pool: sqlx::PgPool) {
    let shop_id = seed_shop(&pool).await;

    let err = save_assignment(&pool, shop_id, Uuid::new_v4(), &AssignmentRequest::global())
        .await
        .expect_err("unknown template");
    assert!(matches!(err, DbError::NotFound));
}

#[sqlx::test(migrations = "../../migrations")]
async fn resaving_replaces_targets(pool: sqlx::PgPool) {
    let shop_id = seed_shop(&pool).await;
    let t1 = seed_template(&pool, shop_id, "T1").await;

    save_assignment(&pool, shop_id, t1, &AssignmentRequest::direct(TargetType::Product, &["1"]))
        .await
        .expect("first");
    save_assignment(&pool, shop_id, t1, &AssignmentRequest::direct(TargetType::Collection, &["9"]))
        .await
        .expect("second");

    let views = list_assignments(&pool, shop_id).await.expect("list");
    assert_eq!(views.len(), 1);
    assert_eq!(views[0].assignment_type, AssignmentType::Collection);
    assert_eq!(views[0].targets.len(), 1);
    assert_eq!(views[0].targets[0].target_id, "9");
    assert_eq!(resolved(&pool, shop_id, Some("1"), None).await, None);
    assert_eq!(resolved(&pool, shop_id, None, Some("9")).await, Some(t1));
}

// ---------------------------------------------------------------------------
// Section 3: Lookup table maintenance
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn rebuild_is_idempotent(pool: sqlx::PgPool) {
    let shop_id = seed_shop(&pool).await;
    let t1 = seed_template(&pool, shop_id, "T1").await;
    let t2 = seed_template(&pool, shop_id, "T2").await;
    let t3 = seed_template(&pool, shop_id, "T3").await;

    save_assignment(&pool, shop_id, t1, &AssignmentRequest::direct(TargetType::Product, &["1", "2"]))
        .await
        .expect("t1");
    save_assignment(&pool, shop_id, t2, &AssignmentRequest::all_except(TargetType::Product, &["7"]))
        .await
        .expect("t2");
    save_assignment(&pool, shop_id, t3, &AssignmentRequest::global())
        .await
        .expect("t3");

    rebuild_lookup_for_shop(&pool, shop_id).await.expect("first rebuild");
    let first = list_lookup_rows(&pool, shop_id).await.expect("first rows");
    rebuild_lookup_for_shop(&pool, shop_id).await.expect("second rebuild");
    let second = list_lookup_rows(&pool, shop_id).await.expect("second rows");

    assert_eq!(first, second);
    let first_json = serde_json::to_vec(&first).expect("serialize");
    let second_json = serde_json::to_vec(&second).expect("serialize");
    assert_eq!(first_json, second_json);
    assert_eq!(first.iter().filter(|r| r.is_default).count(), 1);
}

#[sqlx::test(migrations = "../../migrations")]
async fn empty_lookup_table_heals_on_read(pool: sqlx::PgPool) {
    let shop_id = seed_shop(&pool).await;
    let t1 = seed_template(&pool, shop_id, "T1").await;
    save_assignment(&pool, shop_id, t1, &AssignmentRequest::direct(TargetType::Product, &["111"]))
        .await
        .expect("save");

    sqlx::query("DELETE FROM template_lookup WHERE shop_id = $1")
        .bind(shop_id)
        .execute(&pool)
        .await
        .expect("wipe lookup");
    assert_eq!(
        lookup_template_id(&pool, shop_id, Some("111"), None)
            .await
            .expect("lookup"),
        None
    );

    assert_eq!(resolved(&pool, shop_id, Some("111"), None).await, Some(t1));
    assert!(!list_lookup_rows(&pool, shop_id).await.expect("rows").is_empty());
    let shop = get_shop(&pool, "test-shop.myshopify.com")
        .await
        .expect("get_shop")
        .expect("shop exists");
    assert!(shop.lookup_rebuilt_at.is_some());
}

#[sqlx::test(migrations = "../../migrations")]
async fn inactive_templates_do_not_resolve(pool: sqlx::PgPool) {
    let shop_id = seed_shop(&pool).await;
    let t1 = seed_template(&pool, shop_id, "T1").await;
    save_assignment(&pool, shop_id, t1, &AssignmentRequest::direct(TargetType::Product, &["111"]))
        .await
        .expect("save");

    assert!(!toggle_template_active(&pool, shop_id, t1).await.expect("toggle off"));
    assert_eq!(resolved(&pool, shop_id, Some("111"), None).await, None);

    assert!(toggle_template_active(&pool, shop_id, t1).await.expect("toggle on"));
    assert_eq!(resolved(&pool, shop_id, Some("111"), None).await, Some(t1));
}

#[sqlx::test(migrations = "../../migrations")]
async fn deactivating_through_update_rebuilds_lookup(pool: sqlx::PgPool) {
    let shop_id = seed_shop(&pool).await;
    let t1 = seed_template(&pool, shop_id, "T1").await;
    save_assignment(&pool, shop_id, t1, &AssignmentRequest::global())
        .await
        .expect("save");

    let mut inactive = draft("T1 renamed");
    inactive.is_active = false;
    update_template(&pool, shop_id, t1, inactive)
        .await
        .expect("update");

    assert_eq!(resolved(&pool, shop_id, None, None).await, None);
}

#[sqlx::test(migrations = "../../migrations")]
async fn deleting_a_template_removes_its_rules(pool: sqlx::PgPool) {
    let shop_id = seed_shop(&pool).await;
    let t1 = seed_template(&pool, shop_id, "T1").await;
    save_assignment(&pool, shop_id, t1, &AssignmentRequest::global())
        .await
        .expect("save");

    delete_template(&pool, shop_id, t1).await.expect("delete");

    assert!(list_lookup_rows(&pool, shop_id).await.expect("rows").is_empty());
    assert_eq!(resolved(&pool, shop_id, None, None).await, None);
    assert!(matches!(
        delete_template(&pool, shop_id, t1).await,
        Err(DbError::NotFound)
    ));
}

#[sqlx::test(migrations = "../../migrations")]
async fn concurrent_saves_in_one_shop_all_succeed(pool: sqlx::PgPool) {
    let shop_id = seed_shop(&pool).await;
    let fallback = seed_template(&pool, shop_id, "Fallback").await;
    let t1 = seed_template(&pool, shop_id, "T1").await;
    let t2 = seed_template(&pool, shop_id, "T2").await;
    save_assignment(&pool, shop_id, fallback, &AssignmentRequest::global())
        .await
        .expect("save default");

    for i in 0..20 {
        let first = i.to_string();
        let second = (1000 + i).to_string();
        let first_req = AssignmentRequest::direct(TargetType::Product, &[first.as_str()]);
        let second_req = AssignmentRequest::direct(TargetType::Product, &[second.as_str()]);
        let (a, b) = tokio::join!(
            save_assignment(&pool, shop_id, t1, &first_req),
            save_assignment(&pool, shop_id, t2, &second_req),
        );
        a.unwrap_or_else(|e| panic!("t1 save {i} failed: {e}"));
        b.unwrap_or_else(|e| panic!("t2 save {i} failed: {e}"));
    }

    let toggle_req = AssignmentRequest::direct(TargetType::Product, &["19"]);
    let (toggled, saved) = tokio::join!(
        toggle_template_active(&pool, shop_id, t2),
        save_assignment(&pool, shop_id, t1, &toggle_req),
    );
    assert!(!toggled.expect("toggle"));
    saved.expect("save during toggle");

    let rows = list_lookup_rows(&pool, shop_id).await.expect("rows");
    assert_eq!(rows.iter().filter(|r| r.is_default).count(), 1);
    rebuild_lookup_for_shop(&pool, shop_id).await.expect("rebuild");
    assert_eq!(list_lookup_rows(&pool, shop_id).await.expect("rows"), rows);

    assert_eq!(resolved(&pool, shop_id, Some("19"), None).await, Some(t1));
    assert_eq!(resolved(&pool, shop_id, Some("1019"), None).await, Some(fallback));
}

// ---------------------------------------------------------------------------
// Section 4: Template store
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn template_detail_keeps_section_and_slot_order(pool: sqlx::PgPool) {
    let shop_id = seed_shop(&pool).await;
    let weight = seed_definition(&pool, shop_id, "specs", "weight").await;
    let colour = seed_definition(&pool, shop_id, "specs", "colour").await;

    let mut d = draft("Specs");
    d.sections = vec![
        SectionDraft {
            heading: "First".to_string(),
            slots: vec![
                SlotDraft {
                    metafield_definition_id: weight,
                    custom_name: Some(" Weight (kg) ".to_string()),
                    tooltip_enabled: true,
                    tooltip_text: Some("Net weight".to_string()),
                    hide_on_desktop: false,
                    hide_on_mobile: true,
                },
                SlotDraft {
                    metafield_definition_id: colour,
                    custom_name: None,
                    tooltip_enabled: false,
                    tooltip_text: None,
                    hide_on_desktop: false,
                    hide_on_mobile: false,
                },
            ],
        },
        SectionDraft {
            heading: "Second".to_string(),
            slots: vec![],
        },
    ];
    let id = create_template(&pool, shop_id, d).await.expect("create");

    let detail = get_template_detail(&pool, shop_id, id).await.expect("detail");
    assert_eq!(detail.sections.len(), 2);
    assert_eq!(detail.sections[0].heading, "First");
    assert_eq!(detail.sections[1].heading, "Second");
    assert_eq!(detail.sections[0].slots[0].key, "weight");
    assert_eq!(
        detail.sections[0].slots[0].custom_name.as_deref(),
        Some("Weight (kg)")
    );
    assert_eq!(detail.sections[0].slots[1].key, "colour");

    let payload = detail.into_payload();
    assert_eq!(payload.sections[0].metafields[0].display_name, "Weight (kg)");
    assert_eq!(payload.sections[0].metafields[1].display_name, "specs.colour");
    assert!(payload.sections[0].metafields[0].hide_from_mobile);
}

#[sqlx::test(migrations = "../../migrations")]
async fn invalid_drafts_are_rejected(pool: sqlx::PgPool) {
    let shop_id = seed_shop(&pool).await;

    let err = create_template(&pool, shop_id, draft("  "))
        .await
        .expect_err("blank name");
    assert!(matches!(err, DbError::Validation(ValidationError::EmptyTemplateName)));

    let mut d = draft("Bad slot");
    d.sections = vec![SectionDraft {
        heading: "H".to_string(),
        slots: vec![SlotDraft {
            metafield_definition_id: 987_654,
            custom_name: None,
            tooltip_enabled: false,
            tooltip_text: None,
            hide_on_desktop: false,
            hide_on_mobile: false,
        }],
    }];
    let err = create_template(&pool, shop_id, d)
        .await
        .expect_err("unknown definition");
    assert!(matches!(
        err,
        DbError::Validation(ValidationError::UnknownMetafieldDefinition(987_654))
    ));
    assert!(list_templates(&pool, shop_id).await.expect("list").is_empty());
}

#[sqlx::test(migrations = "../../migrations")]
async fn slot_hidden_on_both_devices_keeps_desktop_only(pool: sqlx::PgPool) {
    let shop_id = seed_shop(&pool).await;
    let weight = seed_definition(&pool, shop_id, "specs", "weight").await;

    let mut d = draft("Hidden");
    d.sections = vec![SectionDraft {
        heading: "H".to_string(),
        slots: vec![SlotDraft {
            metafield_definition_id: weight,
            custom_name: None,
            tooltip_enabled: false,
            tooltip_text: None,
            hide_on_desktop: true,
            hide_on_mobile: true,
        }],
    }];
    let id = create_template(&pool, shop_id, d).await.expect("create");

    let detail = get_template_detail(&pool, shop_id, id).await.expect("detail");
    let slot = &detail.sections[0].slots[0];
    assert!(slot.hide_on_desktop);
    assert!(!slot.hide_on_mobile);
}

#[sqlx::test(migrations = "../../migrations")]
async fn duplicate_is_inactive_and_unassigned(pool: sqlx::PgPool) {
    let shop_id = seed_shop(&pool).await;
    let def = seed_definition(&pool, shop_id, "specs", "size").await;
    let mut d = draft("Main");
    d.sections = vec![SectionDraft {
        heading: "Size".to_string(),
        slots: vec![SlotDraft {
            metafield_definition_id: def,
            custom_name: None,
            tooltip_enabled: false,
            tooltip_text: None,
            hide_on_desktop: false,
            hide_on_mobile: false,
        }],
    }];
    let original = create_template(&pool, shop_id, d).await.expect("create");
    save_assignment(&pool, shop_id, original, &AssignmentRequest::global())
        .await
        .expect("assign");

    let copy = duplicate_template(&pool, shop_id, original)
        .await
        .expect("duplicate");
    let detail = get_template_detail(&pool, shop_id, copy).await.expect("detail");
    assert_eq!(detail.template.name, "Main duplicate");
    assert!(!detail.template.is_active);
    assert_eq!(detail.sections.len(), 1);
    assert_eq!(detail.sections[0].slots.len(), 1);

    let summaries = list_templates(&pool, shop_id).await.expect("list");
    let copy_summary = summaries.iter().find(|s| s.id == copy).expect("copy listed");
    assert_eq!(copy_summary.assignment_type, None);
    assert_eq!(copy_summary.section_count, 1);
}

// ---------------------------------------------------------------------------
// Section 5: Catalog mirror, shops, plans, webhook log
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn product_search_is_case_insensitive_ordered_and_capped(pool: sqlx::PgPool) {
    let shop_id = seed_shop(&pool).await;

    let mut batch = CatalogBatch::default();
    for i in 0..120 {
        batch.products.push(CatalogItem {
            id: format!("gid://shopify/Product/{i}"),
            title: format!("Shirt {i:03}"),
            handle: None,
        });
    }
    batch.products.push(CatalogItem {
        id: "999".to_string(),
        title: "Hat".to_string(),
        handle: Some("hat".to_string()),
    });
    let summary = apply_catalog_batch(&pool, shop_id, &batch)
        .await
        .expect("apply batch");
    assert_eq!(summary.products_upserted, 121);

    let shirts = search_products(&pool, shop_id, Some("sHiRt"))
        .await
        .expect("search");
    assert_eq!(shirts.len(), 100);
    assert_eq!(shirts[0].title, "Shirt 000");
    assert_eq!(shirts[0].external_id, "0");
    assert!(shirts.windows(2).all(|w| w[0].title <= w[1].title));

    let hats = search_products(&pool, shop_id, Some("hat")).await.expect("search");
    assert_eq!(hats.len(), 1);
    assert_eq!(hats[0].external_id, "999");
}

#[sqlx::test(migrations = "../../migrations")]
async fn product_upsert_normalizes_ids(pool: sqlx::PgPool) {
    let shop_id = seed_shop(&pool).await;

    let item = |id: &str, title: &str| CatalogItem {
        id: id.to_string(),
        title: title.to_string(),
        handle: None,
    };
    assert!(upsert_product(&pool, shop_id, &item("gid://shopify/Product/5", "Old"))
        .await
        .expect("upsert"));
    assert!(upsert_product(&pool, shop_id, &item("5", "New")).await.expect("upsert"));
    assert!(!upsert_product(&pool, shop_id, &item(" ", "Blank")).await.expect("upsert"));

    let all = search_products(&pool, shop_id, None).await.expect("search");
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].title, "New");
}

#[sqlx::test(migrations = "../../migrations")]
async fn metafield_definitions_are_ordered(pool: sqlx::PgPool) {
    let shop_id = seed_shop(&pool).await;
    seed_definition(&pool, shop_id, "specs", "weight").await;
    seed_definition(&pool, shop_id, "care", "washing").await;
    upsert_metafield_definition(
        &pool,
        shop_id,
        &MetafieldDefinitionInput {
            namespace: "aaa".to_string(),
            key: "sku_note".to_string(),
            owner_type: "VARIANT".to_string(),
            name: Some("SKU note".to_string()),
            value_type: "single_line_text_field".to_string(),
        },
    )
    .await
    .expect("variant definition");

    let defs = list_metafield_definitions(&pool, shop_id).await.expect("list");
    let keys: Vec<(&str, &str, &str)> = defs
        .iter()
        .map(|d| (d.owner_type.as_str(), d.namespace.as_str(), d.key.as_str()))
        .collect();
    assert_eq!(
        keys,
        vec![
            ("PRODUCT", "care", "washing"),
            ("PRODUCT", "specs", "weight"),
            ("VARIANT", "aaa", "sku_note"),
        ]
    );
}

#[sqlx::test(migrations = "../../migrations")]
async fn deleting_a_shop_cascades(pool: sqlx::PgPool) {
    let shop_id = seed_shop(&pool).await;
    let t1 = seed_template(&pool, shop_id, "T1").await;
    save_assignment(&pool, shop_id, t1, &AssignmentRequest::global())
        .await
        .expect("save");

    assert!(delete_shop(&pool, "test-shop.myshopify.com").await.expect("delete"));
    assert_eq!(
        find_shop_id(&pool, "test-shop.myshopify.com").await.expect("find"),
        None
    );
    let remaining: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM template_lookup")
        .fetch_one(&pool)
        .await
        .expect("count");
    assert_eq!(remaining, 0);
    assert!(!delete_shop(&pool, "test-shop.myshopify.com").await.expect("delete again"));
}

#[sqlx::test(migrations = "../../migrations")]
async fn ensure_shop_is_stable(pool: sqlx::PgPool) {
    let first = seed_shop(&pool).await;
    let second = seed_shop(&pool).await;
    assert_eq!(first, second);
}

#[sqlx::test(migrations = "../../migrations")]
async fn plan_selection_is_gated_by_product_count(pool: sqlx::PgPool) {
    let shop_id = seed_shop(&pool).await;
    let mut batch = CatalogBatch::default();
    for i in 0..6 {
        batch.products.push(CatalogItem {
            id: i.to_string(),
            title: format!("P{i}"),
            handle: None,
        });
    }
    apply_catalog_batch(&pool, shop_id, &batch).await.expect("batch");

    let err = select_shop_plan(&pool, shop_id, "free")
        .await
        .expect_err("free allows 5");
    assert!(matches!(
        err,
        DbError::Validation(ValidationError::PlanNotEligible { product_count: 6, .. })
    ));
    assert!(matches!(
        select_shop_plan(&pool, shop_id, "gold").await,
        Err(DbError::Validation(ValidationError::UnknownPlan(_)))
    ));

    let row = select_shop_plan(&pool, shop_id, "starter")
        .await
        .expect("starter fits");
    assert_eq!(row.plan_key, "starter");
    assert_eq!(row.products_count_at_selection, 6);
}

#[sqlx::test(migrations = "../../migrations")]
async fn webhook_events_are_logged_and_summarized(pool: sqlx::PgPool) {
    let shop_id = seed_shop(&pool).await;

    log_webhook_event(
        &pool,
        shop_id,
        "products/delete",
        WebhookStatus::Success,
        None,
        Some(&json!({"productId": "1"})),
        Some(12),
    )
    .await;
    log_webhook_event(
        &pool,
        shop_id,
        "products/delete",
        WebhookStatus::Error,
        Some("boom"),
        None,
        Some(20),
    )
    .await;

    let (events, stats) = webhook_stats(&pool, shop_id, 100).await.expect("stats");
    assert_eq!(events.len(), 2);
    assert_eq!(stats.total, 2);
    assert_eq!(stats.error, 1);
    assert_eq!(stats.avg_response_time_ms, 16);
    assert_eq!(stats.by_topic["products/delete"].success, 1);
}
