// Arbiter configuration and secrets
//
// Provider settings live in the `[arbitration]` section of the run config.
// API keys are looked up in:
// 1. System keychain (with the `keychain` feature)
// 2. Environment variables (STREETLINK_OPENAI_KEY, ...)
//
// Keys are never read from the config file.

use std::env;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ArbiterError;

/// Service name for keychain storage
#[cfg(feature = "keychain")]
const KEYCHAIN_SERVICE: &str = "streetlink";

pub const OPENAI_API_BASE: &str = "https://api.openai.com/v1";
pub const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const OLLAMA_API_BASE: &str = "http://localhost:11434";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// Arbitration disabled (default)
    #[default]
    None,
    #[serde(rename = "openai")]
    OpenAI,
    Gemini,
    /// Local model via Ollama
    #[serde(alias = "ollama")]
    Local,
}

impl Provider {
    pub fn name(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::OpenAI => "openai",
            Self::Gemini => "gemini",
            Self::Local => "local",
        }
    }

    pub fn is_enabled(&self) -> bool {
        !matches!(self, Self::None)
    }

    pub fn needs_api_key(&self) -> bool {
        matches!(self, Self::OpenAI | Self::Gemini)
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            Self::None => "",
            Self::OpenAI => "gpt-4o-mini",
            Self::Gemini => "gemini-2.0-flash",
            Self::Local => "llama3:8b",
        }
    }

    pub fn default_endpoint(&self) -> &'static str {
        match self {
            Self::None | Self::OpenAI => OPENAI_API_BASE,
            Self::Gemini => GEMINI_API_BASE,
            Self::Local => OLLAMA_API_BASE,
        }
    }
}

impl std::str::FromStr for Provider {
    type Err = ArbiterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" | "" => Ok(Self::None),
            "openai" => Ok(Self::OpenAI),
            "gemini" => Ok(Self::Gemini),
            "local" | "ollama" => Ok(Self::Local),
            other => Err(ArbiterError::NotConfigured(format!(
                "unknown provider '{other}' (expected none, openai, gemini or local)"
            ))),
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// The `[arbitration]` section, as far as the arbiter is concerned.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ArbiterSettings {
    pub provider: Provider,
    /// Model identifier; provider default when unset
    pub model: Option<String>,
    /// Base URL override (Ollama host, proxy, test server)
    pub endpoint: Option<String>,
    /// Per-request timeout
    pub timeout_secs: u64,
}

impl Default for ArbiterSettings {
    fn default() -> Self {
        Self {
            provider: Provider::None,
            model: None,
            endpoint: None,
            timeout_secs: 60,
        }
    }
}

impl ArbiterSettings {
    /// Read the `[arbitration]` section out of a full run config.
    pub fn from_toml(input: &str) -> Result<Self, ArbiterError> {
        #[derive(Deserialize)]
        struct Probe {
            #[serde(default)]
            arbitration: ArbiterSettings,
        }

        let probe: Probe = toml::from_str(input)
            .map_err(|e| ArbiterError::NotConfigured(format!("invalid [arbitration] section: {e}")))?;
        Ok(probe.arbitration)
    }
}

// ============================================================================
// Key lookup
// ============================================================================

/// Source of an API key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySource {
    Keychain,
    Environment,
    None,
}

impl KeySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeySource::Keychain => "keychain",
            KeySource::Environment => "environment",
            KeySource::None => "none",
        }
    }
}

#[derive(Debug, Clone)]
pub struct KeyLookup {
    pub key: Option<String>,
    pub source: KeySource,
}

/// Environment variable holding the key for a provider
pub fn env_var_name(provider: &str) -> String {
    format!("STREETLINK_{}_KEY", provider.to_uppercase())
}

#[cfg(feature = "keychain")]
fn keychain_account(provider: &str) -> String {
    format!("arbiter/{}", provider.to_lowercase())
}

/// Get an API key for the provider: keychain first, then
/// `STREETLINK_<PROVIDER>_KEY`. Gemini also honours `GEMINI_API_KEY`.
pub fn get_api_key(provider: &str) -> KeyLookup {
    #[cfg(feature = "keychain")]
    {
        if let Ok(entry) = keyring::Entry::new(KEYCHAIN_SERVICE, &keychain_account(provider)) {
            if let Ok(key) = entry.get_password() {
                return KeyLookup {
                    key: Some(key),
                    source: KeySource::Keychain,
                };
            }
        }
    }

    let mut names = vec![env_var_name(provider)];
    if provider.eq_ignore_ascii_case("gemini") {
        names.push("GEMINI_API_KEY".into());
    }
    for name in names {
        if let Ok(key) = env::var(&name) {
            if !key.trim().is_empty() {
                return KeyLookup {
                    key: Some(key.trim().to_string()),
                    source: KeySource::Environment,
                };
            }
        }
    }

    KeyLookup {
        key: None,
        source: KeySource::None,
    }
}

pub fn keychain_available() -> bool {
    cfg!(feature = "keychain")
}

// ============================================================================
// Resolved configuration
// ============================================================================

/// Effective arbiter configuration: defaults applied, key attached.
#[derive(Debug, Clone)]
pub struct ResolvedArbiterConfig {
    pub provider: Provider,
    pub model: String,
    pub endpoint: String,
    pub api_key: Option<String>,
    pub key_source: KeySource,
    pub timeout: Duration,
}

impl ResolvedArbiterConfig {
    /// Resolve settings using the standard key lookup. `Ok(None)` when the
    /// provider is disabled.
    pub fn resolve(settings: &ArbiterSettings) -> Result<Option<Self>, ArbiterError> {
        Self::resolve_with(settings, get_api_key)
    }

    /// Resolve with a caller-supplied key lookup.
    pub fn resolve_with(
        settings: &ArbiterSettings,
        lookup: impl Fn(&str) -> KeyLookup,
    ) -> Result<Option<Self>, ArbiterError> {
        let provider = settings.provider;
        if !provider.is_enabled() {
            return Ok(None);
        }
        if settings.timeout_secs == 0 {
            return Err(ArbiterError::NotConfigured("timeout_secs must be at least 1".into()));
        }

        let (api_key, key_source) = if provider.needs_api_key() {
            let found = lookup(provider.name());
            match found.key {
                Some(key) => (Some(key), found.source),
                None => {
                    return Err(ArbiterError::MissingKey {
                        provider: provider.name().into(),
                        env_var: env_var_name(provider.name()),
                    })
                }
            }
        } else {
            (None, KeySource::None)
        };

        let model = settings
            .model
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .unwrap_or(provider.default_model())
            .to_string();
        let endpoint = settings
            .endpoint
            .as_deref()
            .map(|e| e.trim().trim_end_matches('/'))
            .filter(|e| !e.is_empty())
            .unwrap_or(provider.default_endpoint())
            .to_string();

        Ok(Some(Self {
            provider,
            model,
            endpoint,
            api_key,
            key_source,
            timeout: Duration::from_secs(settings.timeout_secs),
        }))
    }
}
