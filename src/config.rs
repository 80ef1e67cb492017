use anyhow::{anyhow, Result};

pub const GMAIL_API_BASE: &str = "https://gmail.googleapis.com/gmail/v1";
pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

const CLIENT_ID_ENV: &str = "GMAIL_CLIENT_ID";
const CLIENT_SECRET_ENV: &str = "GMAIL_CLIENT_SECRET";
const API_BASE_ENV: &str = "INBOX_PROBE_GMAIL_API_BASE";
const TOKEN_URL_ENV: &str = "INBOX_PROBE_TOKEN_URL";
const AUTH_USER_URL_ENV: &str = "INBOX_PROBE_AUTH_USER_URL";
const AUTH_API_KEY_ENV: &str = "INBOX_PROBE_AUTH_API_KEY";

/// OAuth client identity and endpoints used for Gmail calls.
#[derive(Clone, PartialEq, Eq)]
pub struct GmailOAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub api_base: String,
    pub token_url: String,
}

impl std::fmt::Debug for GmailOAuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GmailOAuthConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("api_base", &self.api_base)
            .field("token_url", &self.token_url)
            .finish()
    }
}

impl GmailOAuthConfig {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            api_base: GMAIL_API_BASE.to_string(),
            token_url: GOOGLE_TOKEN_URL.to_string(),
        }
    }

    pub fn with_endpoints(mut self, api_base: impl Into<String>, token_url: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self.token_url = token_url.into();
        self
    }

    pub fn from_env() -> Result<Self> {
        let client_id = env_string(CLIENT_ID_ENV)
            .ok_or_else(|| anyhow!("missing gmail client id ({CLIENT_ID_ENV})"))?;
        let client_secret = env_string(CLIENT_SECRET_ENV)
            .ok_or_else(|| anyhow!("missing gmail client secret ({CLIENT_SECRET_ENV})"))?;

        Ok(Self::new(client_id, client_secret).with_endpoints(
            env_string(API_BASE_ENV).unwrap_or_else(|| GMAIL_API_BASE.to_string()),
            env_string(TOKEN_URL_ENV).unwrap_or_else(|| GOOGLE_TOKEN_URL.to_string()),
        ))
    }
}

/// Where inbound bearer tokens are verified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthConfig {
    pub user_url: String,
    pub api_key: Option<String>,
}

impl AuthConfig {
    pub fn from_env() -> Result<Self> {
        let user_url = env_string(AUTH_USER_URL_ENV)
            .ok_or_else(|| anyhow!("missing identity endpoint ({AUTH_USER_URL_ENV})"))?;
        Ok(Self {
            user_url,
            api_key: env_string(AUTH_API_KEY_ENV),
        })
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::{GmailOAuthConfig, GMAIL_API_BASE, GOOGLE_TOKEN_URL};

    #[test]
    fn defaults_point_at_google() {
        let config = GmailOAuthConfig::new("id", "secret");
        assert_eq!(config.api_base, GMAIL_API_BASE);
        assert_eq!(config.token_url, GOOGLE_TOKEN_URL);
    }

    #[test]
    fn endpoint_override_drops_trailing_slash() {
        let config = GmailOAuthConfig::new("id", "secret")
            .with_endpoints("http://127.0.0.1:9000/gmail/v1/", "http://127.0.0.1:9000/token");
        assert_eq!(config.api_base, "http://127.0.0.1:9000/gmail/v1");
        assert_eq!(config.token_url, "http://127.0.0.1:9000/token");
    }

    #[test]
    fn debug_redacts_client_secret() {
        let rendered = format!("{:?}", GmailOAuthConfig::new("id", "top-secret"));
        assert!(!rendered.contains("top-secret"));
    }
}
