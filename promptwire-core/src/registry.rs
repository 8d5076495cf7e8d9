//! Connection factory
//!
//! Static tables of the known provider and proxy families. A [`Connection`]
//! is built from a persisted provider record, an optional proxy record and
//! the user's generation options.

use crate::config::{
    ConfigError, ConfigValidator, GenerationOptions, ProviderRecord, ProxyRecord,
};
use crate::http::HttpClient;
use crate::providers::{
    AnthropicMessagesProvider, AnthropicTextProvider, AzureOpenAIChatProvider,
    ChatBotKitProvider, Connection, OpenAIChatProvider, OpenAITextProvider, Provider,
    ProviderContext, SpellbookProvider, SteamShipPluginProvider,
};
use crate::proxy::Proxy;
use once_cell::sync::{Lazy, OnceCell};
use serde_json::{json, Map, Value};
use tracing::{debug, info};

type ProviderConstructor =
    fn(&ProviderRecord, ProviderContext) -> Result<Box<dyn Provider>, ConfigError>;
type ProxyConstructor = fn(&ProxyRecord) -> Result<Proxy, ConfigError>;

/// One entry of the provider table
pub struct ProviderDescriptor {
    pub id: &'static str,
    pub display_name: &'static str,
    constructor: Option<ProviderConstructor>,
    /// Settings a new record of this family starts with
    pub default_config: Map<String, Value>,
    /// Roles the family's wire format understands natively
    pub message_roles: &'static [&'static str],
    /// Known model names; informational only
    pub models: &'static [&'static str],
}

impl ProviderDescriptor {
    /// The `""` entry that stands for "no provider"
    pub fn is_empty(&self) -> bool {
        self.constructor.is_none()
    }

    /// A fresh record of this family with default settings
    pub fn create_config(&self) -> ProviderRecord {
        ProviderRecord {
            type_id: self.id.to_string(),
            name: "Name".to_string(),
            settings: self.default_config.clone(),
        }
    }

    /// Build the adapter; `None` for the empty entry.
    ///
    /// Settings missing from the record fall back to the family defaults.
    pub fn build(
        &self,
        record: &ProviderRecord,
        context: ProviderContext,
    ) -> Result<Option<Box<dyn Provider>>, ConfigError> {
        let Some(constructor) = self.constructor else {
            return Ok(None);
        };
        let mut merged = self.create_config();
        merged.name = record.name.clone();
        merged
            .settings
            .extend(record.settings.iter().map(|(k, v)| (k.clone(), v.clone())));
        constructor(&merged, context).map(Some)
    }
}

impl std::fmt::Debug for ProviderDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderDescriptor")
            .field("id", &self.id)
            .field("display_name", &self.display_name)
            .finish()
    }
}

/// One entry of the proxy table
pub struct ProxyDescriptor {
    pub id: &'static str,
    pub display_name: &'static str,
    constructor: ProxyConstructor,
    pub default_config: Map<String, Value>,
}

impl ProxyDescriptor {
    pub fn create_config(&self) -> ProxyRecord {
        ProxyRecord {
            type_id: self.id.to_string(),
            name: "Name".to_string(),
            settings: self.default_config.clone(),
        }
    }

    pub fn build(&self, record: Option<&ProxyRecord>) -> Result<Proxy, ConfigError> {
        match record {
            Some(record) => (self.constructor)(record),
            None => (self.constructor)(&self.create_config()),
        }
    }
}

impl std::fmt::Debug for ProxyDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyDescriptor")
            .field("id", &self.id)
            .field("display_name", &self.display_name)
            .finish()
    }
}

/// Process-wide provider and proxy tables
#[derive(Debug)]
pub struct Registry {
    providers: Vec<ProviderDescriptor>,
    proxies: Vec<ProxyDescriptor>,
    client: OnceCell<HttpClient>,
}

static REGISTRY: Lazy<Registry> = Lazy::new(Registry::builtin);

fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

fn endpoint_defaults() -> Map<String, Value> {
    object(json!({ "key": "", "url": "", "model": "", "stream": false, "rawUrl": false }))
}

fn openai_text(
    record: &ProviderRecord,
    context: ProviderContext,
) -> Result<Box<dyn Provider>, ConfigError> {
    Ok(Box::new(OpenAITextProvider::new(record.typed()?, context)))
}

fn openai_chat(
    record: &ProviderRecord,
    context: ProviderContext,
) -> Result<Box<dyn Provider>, ConfigError> {
    Ok(Box::new(OpenAIChatProvider::new(record.typed()?, context)))
}

fn azure_openai_chat(
    record: &ProviderRecord,
    context: ProviderContext,
) -> Result<Box<dyn Provider>, ConfigError> {
    Ok(Box::new(AzureOpenAIChatProvider::new(record.typed()?, context)))
}

fn anthropic_text(
    record: &ProviderRecord,
    context: ProviderContext,
) -> Result<Box<dyn Provider>, ConfigError> {
    Ok(Box::new(AnthropicTextProvider::new(record.typed()?, context)))
}

fn anthropic_messages(
    record: &ProviderRecord,
    context: ProviderContext,
) -> Result<Box<dyn Provider>, ConfigError> {
    Ok(Box::new(AnthropicMessagesProvider::new(record.typed()?, context)))
}

fn steamship_plugin(
    record: &ProviderRecord,
    context: ProviderContext,
) -> Result<Box<dyn Provider>, ConfigError> {
    Ok(Box::new(SteamShipPluginProvider::new(record.typed()?, context)))
}

fn scale_spellbook(
    record: &ProviderRecord,
    context: ProviderContext,
) -> Result<Box<dyn Provider>, ConfigError> {
    Ok(Box::new(SpellbookProvider::new(record.typed()?, context)))
}

fn scale_spellbook_fish(
    record: &ProviderRecord,
    context: ProviderContext,
) -> Result<Box<dyn Provider>, ConfigError> {
    Ok(Box::new(SpellbookProvider::fish(record.typed()?, context)))
}

fn chatbotkit(
    record: &ProviderRecord,
    context: ProviderContext,
) -> Result<Box<dyn Provider>, ConfigError> {
    Ok(Box::new(ChatBotKitProvider::new(record.typed()?, context)))
}

fn direct(_: &ProxyRecord) -> Result<Proxy, ConfigError> {
    Ok(Proxy::Direct)
}

fn cors_anywhere(record: &ProxyRecord) -> Result<Proxy, ConfigError> {
    Ok(Proxy::cors_anywhere(&record.typed()?))
}

impl Registry {
    /// The shared registry
    pub fn global() -> &'static Registry {
        &REGISTRY
    }

    fn builtin() -> Self {
        let providers = vec![
            ProviderDescriptor {
                id: "",
                display_name: "",
                constructor: None,
                default_config: Map::new(),
                message_roles: &[],
                models: &[],
            },
            ProviderDescriptor {
                id: "openai-text",
                display_name: "OpenAI Text",
                constructor: Some(openai_text),
                default_config: endpoint_defaults(),
                message_roles: &[],
                models: &["gpt-3.5-turbo-instruct"],
            },
            ProviderDescriptor {
                id: "openai-chat",
                display_name: "OpenAI Chat",
                constructor: Some(openai_chat),
                default_config: endpoint_defaults(),
                message_roles: &["user", "assistant", "system"],
                models: &[
                    "gpt-4-1106-preview",
                    "gpt-4-vision-preview",
                    "gpt-4",
                    "gpt-4-0314",
                    "gpt-4-0613",
                    "gpt-4-32k",
                    "gpt-4-32k-0314",
                    "gpt-4-32k-0613",
                    "gpt-3.5-turbo-1106",
                    "gpt-3.5-turbo-16k",
                    "gpt-3.5-turbo",
                    "gpt-3.5-turbo-0301",
                    "gpt-3.5-turbo-0613",
                    "gpt-3.5-turbo-16k-0613",
                    "gemini-pro",
                    "mistral-medium",
                ],
            },
            ProviderDescriptor {
                id: "azure-openai-chat",
                display_name: "Azure OpenAI Chat",
                constructor: Some(azure_openai_chat),
                default_config: object(json!({
                    "key": "", "resource": "", "deployment": "", "apiVersion": "", "stream": false,
                })),
                message_roles: &["user", "assistant", "system"],
                models: &[],
            },
            ProviderDescriptor {
                id: "anthropic-text",
                display_name: "Anthropic Text",
                constructor: Some(anthropic_text),
                default_config: endpoint_defaults(),
                message_roles: &["human", "assistant", "system"],
                models: &[
                    "claude-1.0",
                    "claude-1.2",
                    "claude-1.3",
                    "claude-1.3-100k",
                    "claude-instant-1.0",
                    "claude-instant-1.1",
                    "claude-instant-1.2",
                    "claude-instant-1-100k",
                    "claude-instant-1.1-100k",
                    "claude-2.0",
                    "claude-2.1",
                    "anthropic.claude-v1",
                    "anthropic.claude-v2",
                    "anthropic.claude-v2:1",
                ],
            },
            ProviderDescriptor {
                id: "anthropic-messages",
                display_name: "Anthropic Messages",
                constructor: Some(anthropic_messages),
                default_config: endpoint_defaults(),
                message_roles: &["user", "assistant", "system"],
                models: &[
                    "claude-3-opus-20240229",
                    "claude-3-sonnet-20240229",
                    "claude-3-haiku-20240307",
                    "anthropic.claude-v2",
                    "anthropic.claude-v2:1",
                    "anthropic.claude-3-sonnet-20240229-v1:0",
                    "anthropic.claude-3-haiku-20240307-v1:0",
                    "anthropic.claude-instant-v1",
                ],
            },
            ProviderDescriptor {
                id: "steamship-plugin",
                display_name: "SteamShip Plugin",
                constructor: Some(steamship_plugin),
                default_config: object(json!({
                    "key": "", "url": "", "workspace": "", "model": "",
                })),
                message_roles: &[],
                models: &["gpt-3", "gpt-4"],
            },
            ProviderDescriptor {
                id: "scale-spellbook",
                display_name: "Scale Spellbook",
                constructor: Some(scale_spellbook),
                default_config: object(json!({ "key": "", "url": "" })),
                message_roles: &[],
                models: &[],
            },
            ProviderDescriptor {
                id: "scale-spellbook-fish",
                display_name: "Scale Spellbook (Fish proxy)",
                constructor: Some(scale_spellbook_fish),
                default_config: object(json!({ "key": "", "url": "", "relayUrl": "" })),
                message_roles: &[],
                models: &[],
            },
            ProviderDescriptor {
                id: "chatbotkit",
                display_name: "ChatBotKit",
                constructor: Some(chatbotkit),
                default_config: object(json!({
                    "key": "", "url": "", "model": "", "stream": false, "socketUrl": "",
                })),
                message_roles: &["user", "bot", "context", "instruction", "backstory"],
                models: &[
                    "gpt-4",
                    "gpt-3.5-turbo",
                    "text-davinci-003",
                    "text-davinci-002",
                    "text-algo-003",
                    "text-algo-002",
                    "text-algo-001",
                ],
            },
        ];

        let proxies = vec![
            ProxyDescriptor {
                id: "",
                display_name: "Direct",
                constructor: direct,
                default_config: Map::new(),
            },
            ProxyDescriptor {
                id: "cors-anywhere",
                display_name: "CORS Anywhere",
                constructor: cors_anywhere,
                default_config: object(json!({ "url": "" })),
            },
        ];

        Self {
            providers,
            proxies,
            client: OnceCell::new(),
        }
    }

    pub fn providers(&self) -> &[ProviderDescriptor] {
        &self.providers
    }

    pub fn proxies(&self) -> &[ProxyDescriptor] {
        &self.proxies
    }

    /// Exact lookup by type id
    pub fn find_provider(&self, id: &str) -> Option<&ProviderDescriptor> {
        self.providers.iter().find(|p| p.id == id)
    }

    /// Lookup by type id; unknown ids resolve to the empty entry
    pub fn provider(&self, id: &str) -> &ProviderDescriptor {
        self.find_provider(id).unwrap_or(&self.providers[0])
    }

    pub fn find_proxy(&self, id: &str) -> Option<&ProxyDescriptor> {
        self.proxies.iter().find(|p| p.id == id)
    }

    /// Lookup by type id; unknown ids resolve to the direct proxy
    pub fn proxy(&self, id: &str) -> &ProxyDescriptor {
        self.find_proxy(id).unwrap_or(&self.proxies[0])
    }

    pub fn default_provider_config(&self) -> ProviderRecord {
        self.providers[0].create_config()
    }

    pub fn default_proxy_config(&self) -> ProxyRecord {
        self.proxies[0].create_config()
    }

    /// Shared HTTP client, created on first use
    pub fn http_client(&self) -> Result<HttpClient, ConfigError> {
        self.client
            .get_or_try_init(HttpClient::new)
            .cloned()
            .map_err(|e| ConfigError::Invalid {
                message: e.to_string(),
            })
    }

    /// Build a connection; `Ok(None)` when no provider is selected.
    ///
    /// Options that parse to impossible values are rejected.
    pub fn create_connection(
        &self,
        provider: Option<&ProviderRecord>,
        proxy: Option<&ProxyRecord>,
        options: &GenerationOptions,
    ) -> Result<Option<Connection>, ConfigError> {
        let Some(record) = provider else {
            return Ok(None);
        };
        let descriptor = self.provider(&record.type_id);
        if descriptor.is_empty() {
            debug!("No provider selected for record '{}'", record.name);
            return Ok(None);
        }
        ConfigValidator::new().validate_options(options)?;

        let proxy_descriptor = self.proxy(proxy.map(|p| p.type_id.as_str()).unwrap_or_default());
        let proxy = proxy_descriptor.build(proxy.filter(|p| p.type_id == proxy_descriptor.id))?;
        let context = ProviderContext::new(self.http_client()?, proxy, options.params());

        let connection = descriptor.build(record, context)?.map(Connection::new);
        info!(
            "Created {} connection '{}' via {}",
            descriptor.id, record.name, proxy_descriptor.display_name
        );
        Ok(connection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_ids_resolve_to_empty_entries() {
        let registry = Registry::global();
        assert!(registry.provider("does-not-exist").is_empty());
        assert_eq!(registry.proxy("socks5").id, "");
        assert!(registry.find_provider("does-not-exist").is_none());
    }

    #[test]
    fn test_ids_are_unique() {
        let registry = Registry::global();
        let mut ids: Vec<_> = registry.providers().iter().map(|p| p.id).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), registry.providers().len());
    }

    #[test]
    fn test_create_config() {
        let record = Registry::global().provider("openai-chat").create_config();
        assert_eq!(record.type_id, "openai-chat");
        assert_eq!(record.name, "Name");
        assert_eq!(record.settings["stream"], false);
        assert_eq!(record.settings["rawUrl"], false);

        let default = Registry::global().default_provider_config();
        assert_eq!(default.type_id, "");
        assert!(default.settings.is_empty());

        let proxy = Registry::global().default_proxy_config();
        assert_eq!(proxy.type_id, "");
    }

    #[test]
    fn test_missing_or_empty_provider_yields_none() {
        let registry = Registry::global();
        let options = GenerationOptions::default();
        assert!(registry.create_connection(None, None, &options).unwrap().is_none());

        let record = ProviderRecord::new("", "Nothing");
        assert!(registry
            .create_connection(Some(&record), None, &options)
            .unwrap()
            .is_none());

        let record = ProviderRecord::new("retired-provider", "Old");
        assert!(registry
            .create_connection(Some(&record), None, &options)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_every_family_builds() {
        let registry = Registry::global();
        for descriptor in registry.providers().iter().filter(|d| !d.is_empty()) {
            let record = descriptor.create_config();
            let connection = registry
                .create_connection(Some(&record), None, &GenerationOptions::default())
                .unwrap()
                .unwrap();
            assert_eq!(connection.name(), descriptor.id);
        }
    }

    #[test]
    fn test_bad_settings_are_reported() {
        let record = ProviderRecord::new("openai-chat", "Bad").with_setting("stream", "often");
        let err = Registry::global()
            .create_connection(Some(&record), None, &GenerationOptions::default())
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidSettings { .. }));
    }

    #[test]
    fn test_negative_max_tokens_are_rejected() {
        let record = Registry::global().provider("anthropic-messages").create_config();
        let options = GenerationOptions {
            max_tokens: Some(json!("-5")),
            ..Default::default()
        };
        let err = Registry::global()
            .create_connection(Some(&record), None, &options)
            .unwrap_err();
        match err {
            ConfigError::ValidationError(e) => assert_eq!(e.field_path, "options.maxTokens"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_cors_proxy_record() {
        let proxy = Registry::global()
            .proxy("cors-anywhere")
            .build(Some(
                &ProxyRecord::new("cors-anywhere", "Relay").with_setting("url", "http://relay/"),
            ))
            .unwrap();
        assert_eq!(proxy.modify_url("https://x/"), "http://relay/https://x/");
    }
}
