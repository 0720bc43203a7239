//! Environment variable expansion for driver configuration
//!
//! Configuration files may reference secrets or per-node values with the
//! `${VAR_NAME}` syntax. They are expanded before the YAML is parsed.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::config::ConfigError;

/// Matches `${VAR_NAME}` references
static ENV_REF: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid env pattern"));

/// Expand `${VAR_NAME}` references using the process environment.
///
/// Every unset variable is collected so the error names all of them.
pub fn expand_env_refs(input: &str) -> Result<String, ConfigError> {
    expand_with(input, |name| std::env::var(name).ok())
}

/// Expand references using an arbitrary lookup
pub fn expand_with<F>(input: &str, lookup: F) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut missing: Vec<String> = Vec::new();

    let expanded = ENV_REF.replace_all(input, |caps: &Captures| {
        let name = &caps[1];
        match lookup(name) {
            Some(value) => value,
            None => {
                if !missing.iter().any(|m| m == name) {
                    missing.push(name.to_string());
                }
                String::new()
            }
        }
    });

    if !missing.is_empty() {
        return Err(ConfigError::ValidationError(format!(
            "Missing environment variables: {}",
            missing.join(", ")
        )));
    }

    Ok(expanded.into_owned())
}
