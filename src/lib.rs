//! Tenant Patcher: idempotent text patching for multi-tenant migrations
//!
//! Rewrites an application's source files so data access becomes scoped to
//! an organization: adds an organization field to model constructors, plants
//! TODO headers and imports in services and providers, flags queries that
//! need a tenant filter and creates helper files from templates. The tool
//! annotates and scaffolds; threading the tenant through each query is left
//! to a human.
//!
//! # Architecture
//!
//! Everything is driven by rule files (see [`config`]). Each rule pairs a
//! bracket- or line-anchored [`Matcher`] with an [`Insertion`] and a
//! precondition, and [`apply_rule`] decides purely on text whether the rule
//! applies. [`run`](run::run) plans a whole batch in memory, snapshots the
//! files it will change and only then writes.
//!
//! # Safety
//!
//! - Rules are idempotent: text a rule produced always trips its precondition
//! - Backup snapshot before the first write of an apply run
//! - Writes re-check the on-disk text and are atomic (tempfile + fsync + rename)
//! - Paths are confined to the project root and kept out of the backup dir
//!
//! # Example
//!
//! ```
//! use tenant_patcher::{apply_rule, Insertion, Matcher, PatchRule, PatchStatus};
//!
//! let rule = PatchRule::new(
//!     "org-field",
//!     Matcher::block(r"factory\s+\w+\s*\(", '{', None).unwrap(),
//!     Insertion::after_open("\nint? orgId, "),
//!     vec!["orgId".to_string()],
//! )
//! .unwrap();
//!
//! let result = apply_rule("factory Foo({String? a,}) = _Foo;", &rule);
//! assert_eq!(result.status, PatchStatus::Applied);
//! assert_eq!(
//!     result.new_text.as_deref(),
//!     Some("factory Foo({\nint? orgId, String? a,}) = _Foo;")
//! );
//! ```

pub mod audit;
pub mod backup;
pub mod config;
pub mod edit;
pub mod engine;
pub mod logging;
pub mod report;
pub mod run;
pub mod safety;
pub mod template;

// Re-exports
pub use backup::{create_snapshot, BackupError, BackupSnapshot};
pub use config::{load_from_path, load_from_str, ConfigError, MigrationConfig};
pub use edit::{write_if_applied, ContentCheck, EditError, WriteOutcome};
pub use engine::{
    apply_rule, apply_rules, InsertAt, Insertion, Matcher, PatchResult, PatchRule, PatchStatus,
    RuleError,
};
pub use report::{Category, MigrationReport, WarningKind};
pub use run::{Mode, RunError, RunOutcome};
pub use safety::{SafetyError, WorkspaceGuard};
