//! Integration tests for the three bundled migration phases.
//!
//! Each phase runs against a mock Flutter project, then runs again to check
//! the second pass changes nothing.

use super::fixture::*;
use std::fs;
use std::path::Path;
use tenant_patcher::config::{load_from_path, MigrationConfig};
use tenant_patcher::engine::PatchStatus;
use tenant_patcher::report::WarningKind;
use tenant_patcher::run::{run, Mode, RunOutcome};

const ORG_FIELD: &str = "\n    @JsonKey(name: 'organization_id') String? organizationId,";

fn phase(name: &str) -> MigrationConfig {
    load_from_path(preset(name)).unwrap()
}

fn apply(root: &Path, names: &[&str]) -> RunOutcome {
    let configs: Vec<_> = names.iter().map(|n| phase(n)).collect();
    let outcome = run(&configs, root, Mode::Apply).unwrap();
    assert!(
        outcome.report.errors().is_empty(),
        "unexpected errors: {:?}",
        outcome.report.errors()
    );
    outcome
}

fn service_details<'a>(outcome: &'a RunOutcome, subject: &str) -> Vec<&'a str> {
    outcome
        .report
        .service_updates()
        .iter()
        .filter(|e| e.subject == subject)
        .map(|e| e.detail.as_str())
        .collect()
}

#[test]
fn test_phase1_models_and_services() {
    let dir = setup_flutter_project();
    let root = dir.path();

    let outcome = apply(root, &["01-models-and-services.toml"]);

    let model = read(root, "lib/core/models/menu_item_model.dart");
    assert_eq!(
        model,
        MENU_ITEM_MODEL.replacen(
            "const factory MenuItemModel({",
            &format!("const factory MenuItemModel({{{ORG_FIELD}"),
            1
        )
    );
    assert_eq!(read(root, "lib/core/models/category_model.dart"), CATEGORY_MODEL);
    assert_eq!(read(root, "lib/core/models/user_model.dart"), USER_MODEL);
    assert!(outcome
        .report
        .warnings_of(WarningKind::AlreadyMigrated)
        .any(|w| w.subject == "lib/core/models/category_model.dart"));
    // 13 listed models, 2 present
    assert_eq!(outcome.report.warnings_of(WarningKind::NotFound).count(), 11);

    let service = read(root, "lib/core/services/database_service.dart");
    assert!(service.contains("// TODO: SAAS MIGRATION - Organization Filtering Required"));
    assert!(service.contains(
        "// =============================================================================\n\nclass DatabaseService {"
    ));
    assert!(service.starts_with("import 'package:supabase_flutter/supabase_flutter.dart';\n\n\n// ===="));

    let audit: Vec<_> = service_details(&outcome, "lib/core/services/database_service.dart")
        .into_iter()
        .filter(|d| d.ends_with("marked for organization filtering"))
        .collect();
    assert_eq!(
        audit,
        vec![
            "menu_items: marked for organization filtering",
            "ordini: marked for organization filtering",
            "business_rules: marked for organization filtering",
        ]
    );

    let provider = read(root, "lib/providers/organization_provider.dart");
    assert!(provider.starts_with("import 'package:riverpod_annotation/riverpod_annotation.dart';"));
    assert!(provider.contains(".select('current_organization_id')"));
    assert!(provider.contains("class CurrentOrganization extends _$CurrentOrganization {"));
    assert!(!provider.contains("isOrganizationMember"));

    let snapshot = outcome.snapshot.unwrap();
    assert_eq!(
        fs::read_to_string(snapshot.location().join("lib/core/models/menu_item_model.dart"))
            .unwrap(),
        MENU_ITEM_MODEL
    );
    assert_eq!(
        fs::read_to_string(snapshot.location().join("lib/core/services/database_service.dart"))
            .unwrap(),
        DATABASE_SERVICE
    );
    assert_eq!(snapshot.files().len(), 2);
}

#[test]
fn test_phase1_second_run_changes_nothing() {
    let dir = setup_flutter_project();
    let root = dir.path();

    apply(root, &["01-models-and-services.toml"]);
    let model = read(root, "lib/core/models/menu_item_model.dart");
    let service = read(root, "lib/core/services/database_service.dart");

    let outcome = apply(root, &["01-models-and-services.toml"]);
    assert_eq!(outcome.count(PatchStatus::Applied), 0);
    assert!(outcome.snapshot.is_none());
    assert_eq!(read(root, "lib/core/models/menu_item_model.dart"), model);
    assert_eq!(read(root, "lib/core/services/database_service.dart"), service);
    assert!(outcome
        .report
        .warnings_of(WarningKind::Exists)
        .any(|w| w.subject == "lib/providers/organization_provider.dart"));
}

#[test]
fn test_phase2_settings_providers_and_helpers() {
    let dir = setup_flutter_project();
    let root = dir.path();

    apply(root, &["01-models-and-services.toml"]);
    let phase1_provider = read(root, "lib/providers/organization_provider.dart");

    let outcome = apply(root, &["02-settings-and-providers.toml"]);

    assert!(read(root, "lib/core/models/settings/business_rules_settings.dart")
        .contains(&format!("const factory BusinessRulesSettings({{{ORG_FIELD}\n    @Default(true) bool isOpen,")));
    assert_eq!(
        read(root, "lib/core/models/settings/display_branding_settings.dart"),
        DISPLAY_BRANDING_SETTINGS
    );
    let no_match: Vec<_> = outcome
        .report
        .warnings_of(WarningKind::NoMatch)
        .map(|w| w.subject.as_str())
        .collect();
    assert_eq!(
        no_match,
        vec!["lib/core/models/settings/display_branding_settings.dart"]
    );

    for provider in ["categories_provider.dart", "menu_provider.dart"] {
        let text = read(root, &format!("lib/providers/{provider}"));
        assert!(
            text.starts_with("import 'organization_provider.dart';\nimport 'package:riverpod_annotation"),
            "{provider} not updated"
        );
    }
    assert_eq!(read(root, "lib/providers/cart_provider.dart"), CART_PROVIDER);
    assert_eq!(read(root, "lib/providers/menu_provider.g.dart"), "// generated\n");

    let provider = read(root, "lib/providers/organization_provider.dart");
    assert!(provider.contains("Future<bool> isOrganizationMember("));
    assert!(provider.contains(".from('organization_members')"));

    let helpers = read(root, "lib/core/utils/org_aware_helpers.dart");
    assert!(helpers.contains("return eq('organization_id', organizationId);"));
    assert!(helpers.contains("this['organization_id'] = organizationId;"));

    // the overwritten provider was backed up first
    let snapshot = outcome.snapshot.unwrap();
    assert!(snapshot
        .location()
        .parent()
        .unwrap()
        .ends_with("migration_backup_phase2"));
    assert_eq!(
        fs::read_to_string(snapshot.location().join("lib/providers/organization_provider.dart"))
            .unwrap(),
        phase1_provider
    );

    let again = apply(root, &["02-settings-and-providers.toml"]);
    assert_eq!(again.count(PatchStatus::Applied), 0);
    assert!(again.snapshot.is_none());
}

#[test]
fn test_phase3_wiring_after_phase2() {
    let dir = setup_flutter_project();
    let root = dir.path();

    apply(root, &["01-models-and-services.toml"]);
    apply(root, &["02-settings-and-providers.toml"]);
    let menu_provider = read(root, "lib/providers/menu_provider.dart");

    let outcome = apply(root, &["03-wire-org-context.toml"]);

    assert_eq!(
        read(root, "lib/providers/categories_provider.dart"),
        "import 'organization_provider.dart';\n\
         import 'package:riverpod_annotation/riverpod_annotation.dart';\n\
         import 'package:supabase_flutter/supabase_flutter.dart';\n\
         \n\
         // TODO: Multi-tenant - Watch currentOrganizationProvider:\n\
         //   final orgId = await ref.watch(currentOrganizationProvider.future);\n\
         //   Add .eq('organization_id', orgId) to queries\n\
         \n\
         part 'categories_provider.g.dart';\n\
         \n\
         @riverpod\n\
         Future<List<Map<String, dynamic>>> categories(CategoriesRef ref) async {\n\
         \x20 return Supabase.instance.client.from('categorie_menu').select();\n\
         }\n"
    );
    // not one of the key providers
    assert_eq!(read(root, "lib/providers/menu_provider.dart"), menu_provider);

    assert!(outcome
        .report
        .warnings_of(WarningKind::AlreadyMigrated)
        .any(|w| w.subject == "lib/providers/categories_provider.dart"));

    let audit = service_details(&outcome, "lib/core/services/database_service.dart");
    assert_eq!(
        audit,
        vec![
            "countOrdersInSlot: needs organizationId parameter",
            "getPizzeria: needs organizationId parameter",
        ]
    );

    let again = apply(root, &["03-wire-org-context.toml"]);
    assert_eq!(again.count(PatchStatus::Applied), 0);
}

#[test]
fn test_phase3_alone_adds_import_after_first() {
    let dir = setup_flutter_project();
    let root = dir.path();

    apply(root, &["03-wire-org-context.toml"]);

    let text = read(root, "lib/providers/categories_provider.dart");
    assert!(text.starts_with(
        "import 'package:riverpod_annotation/riverpod_annotation.dart';\n\
         import 'organization_provider.dart';\n\
         import 'package:supabase_flutter/supabase_flutter.dart';\n\
         \n// TODO: Multi-tenant"
    ));
}

#[test]
fn test_all_phases_in_one_run() {
    let dir = setup_flutter_project();
    let root = dir.path();

    let outcome = apply(
        root,
        &[
            "01-models-and-services.toml",
            "02-settings-and-providers.toml",
            "03-wire-org-context.toml",
        ],
    );

    // the phase 2 provider supersedes the phase 1 one
    let provider = read(root, "lib/providers/organization_provider.dart");
    assert!(provider.contains("isOrganizationMember"));
    assert!(read(root, "lib/providers/categories_provider.dart")
        .contains("// TODO: Multi-tenant - Watch currentOrganizationProvider:"));

    let snapshot = outcome.snapshot.unwrap();
    assert!(snapshot
        .location()
        .parent()
        .unwrap()
        .ends_with("migration_backup"));
    assert_eq!(
        fs::read_to_string(snapshot.location().join("lib/providers/categories_provider.dart"))
            .unwrap(),
        CATEGORIES_PROVIDER
    );

    let again = apply(
        root,
        &[
            "01-models-and-services.toml",
            "02-settings-and-providers.toml",
            "03-wire-org-context.toml",
        ],
    );
    assert_eq!(again.count(PatchStatus::Applied), 0);
    assert!(again.snapshot.is_none());
}

#[test]
fn test_phase1_audit_ignores_inserted_header() {
    let dir = setup_flutter_project();
    let root = dir.path();
    write(
        root,
        "lib/core/services/database_service.dart",
        "class DatabaseService {\n  Future<void> orders() => _client.from('ordini').select();\n}\n",
    );

    let outcome = run(&[phase("01-models-and-services.toml")], root, Mode::Preview).unwrap();

    assert_eq!(
        service_details(&outcome, "lib/core/services/database_service.dart"),
        vec![
            "ordini: marked for organization filtering",
            "would apply: migration TODO header",
        ]
    );
}
