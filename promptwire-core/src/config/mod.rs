//! Configuration module for promptwire
//!
//! This module provides the persisted record shapes, the typed per-family
//! settings they are read into, and import/export of provider record lists.

mod env;
mod error;
mod schema;
mod secrets;
mod validator;

pub use env::{interpolate_env_vars, interpolate_record};
pub use error::{ConfigError, ConfigResult, ValidationError, ValidationErrorKind};
pub use schema::{
    parse_float_or_none, parse_int_or_none, AzureConfig, ChatBotKitConfig, EndpointConfig,
    GenerationOptions, GenerationParams, ProviderRecord, ProxyRecord, SpellbookConfig,
    SteamShipConfig,
};
pub use secrets::{is_sensitive_field, redact_by_field_name, SecretString};
pub use validator::ConfigValidator;

use std::fs;
use std::path::Path;
use tracing::info;

fn read_file(path: &Path) -> ConfigResult<String> {
    fs::read_to_string(path).map_err(|e| ConfigError::IoError {
        path: path.to_string_lossy().to_string(),
        source: e,
    })
}

fn finish_import(
    path: &Path,
    mut records: Vec<ProviderRecord>,
) -> ConfigResult<Vec<ProviderRecord>> {
    for record in &mut records {
        env::interpolate_record(record)?;
    }

    let validator = ConfigValidator::new();
    validator.validate_providers(&records)?;

    info!(
        "Loaded {} provider records from {}",
        records.len(),
        path.display()
    );
    Ok(records)
}

/// Load a list of provider records from a JSON file
pub fn load_providers_from_json<P: AsRef<Path>>(
    path: P,
) -> ConfigResult<Vec<ProviderRecord>> {
    let path = path.as_ref();
    let content = read_file(path)?;

    let records: Vec<ProviderRecord> =
        serde_json::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_string_lossy().to_string(),
            line: Some(e.line()),
            column: Some(e.column()),
            message: e.to_string(),
        })?;

    finish_import(path, records)
}

/// Load a list of provider records from a YAML file
pub fn load_providers_from_yaml<P: AsRef<Path>>(
    path: P,
) -> ConfigResult<Vec<ProviderRecord>> {
    let path = path.as_ref();
    let content = read_file(path)?;

    let records: Vec<ProviderRecord> =
        serde_yaml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_string_lossy().to_string(),
            line: e.location().map(|l| l.line()),
            column: e.location().map(|l| l.column()),
            message: e.to_string(),
        })?;

    finish_import(path, records)
}

/// Write a list of provider records as pretty-printed JSON
pub fn export_providers_to_json<P: AsRef<Path>>(
    path: P,
    records: &[ProviderRecord],
) -> ConfigResult<()> {
    let path = path.as_ref();
    let content = serde_json::to_string_pretty(records).map_err(|e| ConfigError::Invalid {
        message: format!("Failed to serialize provider records: {}", e),
    })?;

    fs::write(path, content).map_err(|e| ConfigError::IoError {
        path: path.to_string_lossy().to_string(),
        source: e,
    })?;

    info!("Exported {} provider records to {}", records.len(), path.display());
    Ok(())
}
