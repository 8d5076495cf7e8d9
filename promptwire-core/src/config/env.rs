//! Environment variable interpolation for provider records

use super::error::ConfigError;
use super::schema::ProviderRecord;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde_json::Value;
use std::env;

static ENV_VAR_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").expect("valid env var pattern"));

/// Whether a value still carries a `${NAME}` placeholder
pub fn has_placeholder(value: &str) -> bool {
    ENV_VAR_PATTERN.is_match(value)
}

/// Replace every `${NAME}` placeholder with the variable's value.
///
/// The first unset variable is reported.
pub fn interpolate_env_vars(content: &str) -> Result<String, ConfigError> {
    let mut missing: Option<String> = None;
    let result = ENV_VAR_PATTERN.replace_all(content, |cap: &Captures<'_>| {
        match env::var(&cap[1]) {
            Ok(value) => value,
            Err(_) => {
                missing.get_or_insert_with(|| cap[1].to_string());
                String::new()
            }
        }
    });

    match missing {
        Some(var) => Err(ConfigError::EnvVarNotFound { var }),
        None => Ok(result.into_owned()),
    }
}

/// Interpolate the string settings of a record in place
pub fn interpolate_record(record: &mut ProviderRecord) -> Result<(), ConfigError> {
    for value in record.settings.values_mut() {
        if let Value::String(text) = value {
            if has_placeholder(text) {
                *text = interpolate_env_vars(text)?;
            }
        }
    }
    Ok(())
}
