//! Templates for files the migration creates from scratch.
//!
//! Template bodies are data from rule files. Substitution points use
//! `minijinja` syntax (`{{ org_column }}`) and undefined variables are an
//! error, so a typo in a rule file fails at load time instead of producing a
//! file with a blank where a table name should be.

use minijinja::{Environment, UndefinedBehavior};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Error, Debug)]
#[error("template '{name}': {source}")]
pub struct TemplateError {
    pub name: String,
    #[source]
    pub source: minijinja::Error,
}

/// Render `source` with `vars`.
pub fn render(
    name: &str,
    source: &str,
    vars: &BTreeMap<String, String>,
) -> Result<String, TemplateError> {
    let wrap = |source| TemplateError {
        name: name.to_string(),
        source,
    };

    let mut env = Environment::new();
    env.set_undefined_behavior(UndefinedBehavior::Strict);
    // generated source files keep their final newline
    env.set_keep_trailing_newline(true);
    env.add_template(name, source).map_err(wrap)?;

    env.get_template(name).map_err(wrap)?.render(vars).map_err(wrap)
}
