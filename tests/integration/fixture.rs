//! Mock Flutter project shared by the preset and end-to-end tests.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub const MENU_ITEM_MODEL: &str = r#"import 'package:freezed_annotation/freezed_annotation.dart';

part 'menu_item_model.freezed.dart';
part 'menu_item_model.g.dart';

/// Voce di menù (pizza, bibita, dolce…)
@freezed
class MenuItemModel with _$MenuItemModel {
  const factory MenuItemModel({
    required String id,
    required String nome,
    @Default({}) Map<String, double> prezzi,
    @Default(['margherita']) List<String> tags,
  }) = _MenuItemModel;

  factory MenuItemModel.fromJson(Map<String, dynamic> json) =>
      _$MenuItemModelFromJson(json);
}
"#;

pub const CATEGORY_MODEL: &str = r#"@freezed
class CategoryModel with _$CategoryModel {
  const factory CategoryModel({
    @JsonKey(name: 'organization_id') String? organizationId,
    required String id,
  }) = _CategoryModel;
}
"#;

pub const USER_MODEL: &str = r#"@freezed
class UserModel with _$UserModel {
  const factory UserModel({required String id}) = _UserModel;
}
"#;

pub const BUSINESS_RULES_SETTINGS: &str = r#"@freezed
class BusinessRulesSettings with _$BusinessRulesSettings {
  const factory BusinessRulesSettings({
    @Default(true) bool isOpen,
  }) = _BusinessRulesSettings;
}
"#;

pub const DISPLAY_BRANDING_SETTINGS: &str = r#"class DisplayBrandingSettings {
  final String primaryColor;
  const DisplayBrandingSettings(this.primaryColor);
}
"#;

pub const DATABASE_SERVICE: &str = r#"import 'package:supabase_flutter/supabase_flutter.dart';

class DatabaseService {
  final _client = Supabase.instance.client;

  Future<List<Map<String, dynamic>>> getMenuItems({String? organizationId}) async {
    return _client.from('menu_items').select();
  }

  Future<int> countOrdersInSlot(DateTime slot) async {
    final rows = await _client.from('ordini').select('id');
    return rows.length;
  }

  Future<Pizzeria> getPizzeria() async {
    final row = await _client.from('business_rules').select().single();
    return Pizzeria.fromJson(row);
  }
}
"#;

pub const MENU_PROVIDER: &str = r#"import 'package:riverpod_annotation/riverpod_annotation.dart';
import 'package:supabase_flutter/supabase_flutter.dart';

part 'menu_provider.g.dart';

@riverpod
Future<List<Map<String, dynamic>>> menu(MenuRef ref) async {
  return Supabase.instance.client.from('menu_items').select();
}
"#;

pub const CATEGORIES_PROVIDER: &str = r#"import 'package:riverpod_annotation/riverpod_annotation.dart';
import 'package:supabase_flutter/supabase_flutter.dart';

part 'categories_provider.g.dart';

@riverpod
Future<List<Map<String, dynamic>>> categories(CategoriesRef ref) async {
  return Supabase.instance.client.from('categorie_menu').select();
}
"#;

pub const CART_PROVIDER: &str = r#"import 'package:riverpod_annotation/riverpod_annotation.dart';

part 'cart_provider.g.dart';

@riverpod
class Cart extends _$Cart {
  @override
  List<String> build() => [];
}
"#;

pub fn setup_flutter_project() -> TempDir {
    let dir = TempDir::new().unwrap();
    let root = dir.path();

    write(root, "pubspec.yaml", "name: pizzeria\n");
    write(root, "lib/core/models/menu_item_model.dart", MENU_ITEM_MODEL);
    write(root, "lib/core/models/category_model.dart", CATEGORY_MODEL);
    write(root, "lib/core/models/user_model.dart", USER_MODEL);
    write(
        root,
        "lib/core/models/settings/business_rules_settings.dart",
        BUSINESS_RULES_SETTINGS,
    );
    write(
        root,
        "lib/core/models/settings/display_branding_settings.dart",
        DISPLAY_BRANDING_SETTINGS,
    );
    write(root, "lib/core/services/database_service.dart", DATABASE_SERVICE);
    write(root, "lib/providers/menu_provider.dart", MENU_PROVIDER);
    write(root, "lib/providers/menu_provider.g.dart", "// generated\n");
    write(root, "lib/providers/categories_provider.dart", CATEGORIES_PROVIDER);
    write(root, "lib/providers/cart_provider.dart", CART_PROVIDER);

    dir
}

pub fn write(root: &Path, relative: &str, content: &str) {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

pub fn read(root: &Path, relative: &str) -> String {
    fs::read_to_string(root.join(relative)).unwrap()
}

/// Path of a bundled rule preset.
pub fn preset(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("rules")
        .join(name)
}
