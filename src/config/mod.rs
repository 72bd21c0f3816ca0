//! Rule files: TOML documents describing targets, audits and generated
//! files for one migration phase.

pub mod compile;
pub mod loader;
pub mod schema;

pub use compile::{compile, AuditTarget, GeneratedFile, MigrationConfig, Target};
pub use loader::{load_from_path, load_from_str, parse_str, ConfigError};
pub use schema::{
    AuditDefinition, GenerateDefinition, InsertDefinition, MatcherDefinition, Metadata,
    RuleDefinition, RuleFile, ScanDefinition, TargetDefinition, ValidationError, ValidationIssue,
    DEFAULT_BACKUP_DIR,
};
