/// Error from an arbitration provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArbiterError {
    /// Provider disabled or settings unusable
    NotConfigured(String),
    /// No API key found for a provider that needs one
    MissingKey { provider: String, env_var: String },
    /// Transport failure or timeout
    Network(String),
    /// Non-success HTTP status
    Api { status: u16, message: String },
    /// Reply body or model output could not be parsed
    Parse(String),
    /// Reply parsed but had an unexpected shape
    InvalidResponse(String),
}

impl std::fmt::Display for ArbiterError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotConfigured(msg) => write!(f, "arbiter not configured: {msg}"),
            Self::MissingKey { provider, env_var } => {
                write!(f, "no API key for {provider} (set {env_var} or store one in the keychain)")
            }
            Self::Network(msg) => write!(f, "network error: {msg}"),
            Self::Api { status, message } => write!(f, "API error ({status}): {message}"),
            Self::Parse(msg) => write!(f, "failed to parse reply: {msg}"),
            Self::InvalidResponse(msg) => write!(f, "invalid response: {msg}"),
        }
    }
}

impl std::error::Error for ArbiterError {}
