//! Outbound URL rewriting
//!
//! A proxy only rewrites the request URL; headers and payload are untouched.

use serde::{Deserialize, Serialize};

/// Relay used when a CORS Anywhere proxy has no URL configured
pub const CORS_ANYWHERE_URL: &str = "https://cors-anywhere.herokuapp.com/";

/// Settings of the CORS Anywhere proxy record
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorsAnywhereConfig {
    pub url: String,
}

/// URL transform applied to every outbound request
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Proxy {
    /// Send requests as-is
    #[default]
    Direct,
    /// Prefix every URL with a relay base
    CorsAnywhere { base: String },
}

impl Proxy {
    /// CORS relay proxy; an empty URL selects the public relay
    pub fn cors_anywhere(config: &CorsAnywhereConfig) -> Self {
        let base = if config.url.is_empty() {
            CORS_ANYWHERE_URL.to_string()
        } else {
            config.url.clone()
        };
        Proxy::CorsAnywhere { base }
    }

    /// Rewrite an outbound URL
    pub fn modify_url(&self, url: &str) -> String {
        match self {
            Proxy::Direct => url.to_string(),
            Proxy::CorsAnywhere { base } => format!("{}{}", base, url),
        }
    }
}
