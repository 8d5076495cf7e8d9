//! Persisted record shapes and typed per-family settings

use super::error::ConfigError;
use super::secrets::{redact_by_field_name, SecretString};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// A persisted provider configuration
///
/// Only `typeId` and `name` are common to every family; the remaining
/// settings are family specific and stay untyped until a connection is
/// built from the record.
#[derive(Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderRecord {
    #[serde(default)]
    pub type_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(flatten)]
    pub settings: Map<String, Value>,
}

impl ProviderRecord {
    pub fn new(type_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            type_id: type_id.into(),
            name: name.into(),
            settings: Map::new(),
        }
    }

    /// Builder-style setter for one family setting
    pub fn with_setting(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.settings.insert(key.into(), value.into());
        self
    }

    /// Read the settings as a typed family config
    pub fn typed<T: DeserializeOwned>(&self) -> Result<T, ConfigError> {
        typed_settings(&self.type_id, &self.settings)
    }
}

impl fmt::Debug for ProviderRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let settings: Map<String, Value> = self
            .settings
            .iter()
            .map(|(key, value)| {
                let value = match value {
                    Value::String(text) => Value::String(redact_by_field_name(key, text)),
                    other => other.clone(),
                };
                (key.clone(), value)
            })
            .collect();
        f.debug_struct("ProviderRecord")
            .field("type_id", &self.type_id)
            .field("name", &self.name)
            .field("settings", &settings)
            .finish()
    }
}

/// A persisted proxy configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyRecord {
    #[serde(default)]
    pub type_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(flatten)]
    pub settings: Map<String, Value>,
}

impl ProxyRecord {
    pub fn new(type_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            type_id: type_id.into(),
            name: name.into(),
            settings: Map::new(),
        }
    }

    pub fn with_setting(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.settings.insert(key.into(), value.into());
        self
    }

    pub fn typed<T: DeserializeOwned>(&self) -> Result<T, ConfigError> {
        typed_settings(&self.type_id, &self.settings)
    }
}

fn typed_settings<T: DeserializeOwned>(
    type_id: &str,
    settings: &Map<String, Value>,
) -> Result<T, ConfigError> {
    serde_json::from_value(Value::Object(settings.clone())).map_err(|source| {
        ConfigError::InvalidSettings {
            type_id: type_id.to_string(),
            source,
        }
    })
}

/// Generation options as the user typed them
///
/// Values may be numbers or free-form strings; anything else is ignored.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GenerationOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<Value>,
}

impl GenerationOptions {
    /// Parse every option leniently
    pub fn params(&self) -> GenerationParams {
        GenerationParams {
            max_tokens: self.max_tokens.as_ref().and_then(parse_int_or_none),
            temperature: self.temperature.as_ref().and_then(parse_float_or_none),
            frequency_penalty: self.frequency_penalty.as_ref().and_then(parse_float_or_none),
            presence_penalty: self.presence_penalty.as_ref().and_then(parse_float_or_none),
        }
    }
}

/// Typed generation parameters passed to adapters
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GenerationParams {
    pub max_tokens: Option<i64>,
    pub temperature: Option<f64>,
    pub frequency_penalty: Option<f64>,
    pub presence_penalty: Option<f64>,
}

static INT_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*([+-]?\d+)").expect("valid integer pattern"));

static FLOAT_PREFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*([+-]?(?:\d+\.?\d*|\.\d+)(?:[eE][+-]?\d+)?)").expect("valid float pattern")
});

/// Integer from the leading numeric prefix of a value, `None` otherwise
pub fn parse_int_or_none(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number.as_i64().or_else(|| {
            number
                .as_f64()
                .filter(|f| f.is_finite() && f.abs() < 1e18)
                .map(|f| f.trunc() as i64)
        }),
        Value::String(text) => INT_PREFIX
            .captures(text)
            .and_then(|cap| cap[1].parse().ok()),
        _ => None,
    }
}

/// Float from the leading numeric prefix of a value, `None` otherwise
pub fn parse_float_or_none(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => FLOAT_PREFIX
            .captures(text)
            .and_then(|cap| cap[1].parse().ok()),
        _ => None,
    }
}

/// Settings shared by the OpenAI and Anthropic HTTP families
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EndpointConfig {
    pub key: SecretString,
    pub url: String,
    pub model: String,
    pub stream: bool,
    /// Use `url` verbatim instead of joining it with the endpoint path
    pub raw_url: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AzureConfig {
    pub key: SecretString,
    pub resource: String,
    pub deployment: String,
    pub api_version: String,
    pub stream: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SteamShipConfig {
    pub key: SecretString,
    pub url: String,
    pub workspace: String,
    pub model: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SpellbookConfig {
    pub key: SecretString,
    pub url: String,
    /// Fish relay endpoint; empty selects the public relay
    pub relay_url: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChatBotKitConfig {
    pub key: SecretString,
    pub url: String,
    pub model: String,
    pub stream: bool,
    /// Pusher websocket endpoint; empty selects the ChatBotKit app
    pub socket_url: String,
}
