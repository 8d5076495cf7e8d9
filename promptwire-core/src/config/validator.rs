//! Configuration validation utilities

use super::error::{ValidationError, ValidationErrorKind};
use super::schema::{GenerationOptions, ProviderRecord, ProxyRecord};
use crate::registry::Registry;
use regex::Regex;
use serde_json::{Map, Value};
use tracing::debug;

/// Settings that hold endpoint URLs
const URL_SETTINGS: [&str; 3] = ["url", "relayUrl", "socketUrl"];

/// Record validator applied to imported configuration files
pub struct ConfigValidator {
    /// Any `${...}` left after interpolation
    placeholder_pattern: Regex,
    registry: &'static Registry,
}

impl Default for ConfigValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigValidator {
    pub fn new() -> Self {
        Self {
            placeholder_pattern: Regex::new(r"\$\{[^}]*\}").expect("valid placeholder pattern"),
            registry: Registry::global(),
        }
    }

    /// Validate a list of provider records
    pub fn validate_providers(&self, records: &[ProviderRecord]) -> Result<(), ValidationError> {
        for (index, record) in records.iter().enumerate() {
            self.validate_provider(&format!("providers[{index}]"), record)?;
        }
        debug!("Validated {} provider records", records.len());
        Ok(())
    }

    /// Validate one provider record
    pub fn validate_provider(
        &self,
        field_path: &str,
        record: &ProviderRecord,
    ) -> Result<(), ValidationError> {
        if self.registry.find_provider(&record.type_id).is_none() {
            return Err(ValidationError::invalid_value(
                format!("{field_path}.typeId"),
                "a registered provider type",
                format!("'{}'", record.type_id),
            ));
        }
        self.validate_settings(field_path, &record.settings)
    }

    /// Validate one proxy record
    pub fn validate_proxy(
        &self,
        field_path: &str,
        record: &ProxyRecord,
    ) -> Result<(), ValidationError> {
        if self.registry.find_proxy(&record.type_id).is_none() {
            return Err(ValidationError::invalid_value(
                format!("{field_path}.typeId"),
                "a registered proxy type",
                format!("'{}'", record.type_id),
            ));
        }
        self.validate_settings(field_path, &record.settings)
    }

    /// Reject generation options that parse to impossible values
    pub fn validate_options(&self, options: &GenerationOptions) -> Result<(), ValidationError> {
        let params = options.params();
        if let Some(max_tokens) = params.max_tokens.filter(|n| *n < 0) {
            return Err(ValidationError::invalid_value(
                "options.maxTokens",
                "a non-negative token count",
                max_tokens.to_string(),
            ));
        }
        Ok(())
    }

    fn validate_settings(
        &self,
        field_path: &str,
        settings: &Map<String, Value>,
    ) -> Result<(), ValidationError> {
        for (key, value) in settings {
            let Value::String(text) = value else {
                continue;
            };

            if let Some(placeholder) = self.placeholder_pattern.find(text) {
                return Err(ValidationError::new(
                    format!("{field_path}.{key}"),
                    ValidationErrorKind::UnresolvedPlaceholder {
                        placeholder: placeholder.as_str().to_string(),
                    },
                ));
            }

            if URL_SETTINGS.contains(&key.as_str()) && !text.is_empty() {
                url::Url::parse(text).map_err(|e| {
                    ValidationError::new(
                        format!("{field_path}.{key}"),
                        ValidationErrorKind::InvalidUrl {
                            message: e.to_string(),
                        },
                    )
                })?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_valid_record() {
        let validator = ConfigValidator::new();
        let record = ProviderRecord::new("openai-chat", "Chat")
            .with_setting("url", "https://api.openai.com/v1")
            .with_setting("stream", true);
        assert!(validator.validate_provider("providers[0]", &record).is_ok());
    }

    #[test]
    fn test_empty_type_is_registered() {
        let validator = ConfigValidator::new();
        assert!(validator
            .validate_provider("providers[0]", &ProviderRecord::new("", "Name"))
            .is_ok());
    }

    #[test]
    fn test_unknown_type() {
        let validator = ConfigValidator::new();
        let err = validator
            .validate_providers(&[ProviderRecord::new("nope", "X")])
            .unwrap_err();
        assert_eq!(err.field_path, "providers[0].typeId");
    }

    #[test]
    fn test_invalid_url() {
        let validator = ConfigValidator::new();
        let record = ProviderRecord::new("chatbotkit", "Bot").with_setting("socketUrl", "not a url");
        let err = validator.validate_provider("providers[2]", &record).unwrap_err();
        assert_eq!(err.field_path, "providers[2].socketUrl");
        assert!(matches!(err.kind, ValidationErrorKind::InvalidUrl { .. }));
    }

    #[test]
    fn test_unresolved_placeholder() {
        let validator = ConfigValidator::new();
        let record = ProviderRecord::new("openai-text", "Text").with_setting("key", "${lowercase}");
        let err = validator.validate_provider("providers[0]", &record).unwrap_err();
        assert!(matches!(err.kind, ValidationErrorKind::UnresolvedPlaceholder { .. }));
    }

    #[test]
    fn test_proxy_validation() {
        let validator = ConfigValidator::new();
        let proxy = ProxyRecord::new("cors-anywhere", "Relay").with_setting("url", "http://localhost:8080/");
        assert!(validator.validate_proxy("proxy", &proxy).is_ok());
        assert!(validator
            .validate_proxy("proxy", &ProxyRecord::new("socks", "X"))
            .is_err());
    }

    #[test]
    fn test_negative_max_tokens() {
        let validator = ConfigValidator::new();
        let options: GenerationOptions = serde_json::from_value(json!({"maxTokens": "-1"})).unwrap();
        assert!(validator.validate_options(&options).is_err());
        assert!(validator.validate_options(&GenerationOptions::default()).is_ok());
    }
}
