use log::{debug, warn};
use tokio::sync::Mutex;

use crate::error::{GangplankError, GangplankResult};

/// Credentials for the token-issuing endpoint. Flag values fall back to the
/// matching OS_* environment variables in the supervisor.
#[derive(Clone, Debug, Default)]
pub struct AuthConfig {
    pub auth_url: String,
    pub username: String,
    pub tenant_name: String,
    pub password: String,
    pub token: String,
}

impl AuthConfig {
    /// Print a warning for every empty credential field.
    pub fn warn_empty(&self) {
        for (name, value) in [
            ("auth URL", &self.auth_url),
            ("username", &self.username),
            ("tenant name", &self.tenant_name),
            ("password", &self.password),
            ("token", &self.token),
        ] {
            if value.is_empty() {
                warn!("Auth variable empty: {}", name);
            }
        }
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access: Access,
}

#[derive(Deserialize)]
struct Access {
    token: Token,
}

#[derive(Deserialize)]
struct Token {
    id: String,
}

/// Authenticator for the orchestrator API. Holds the issued token and can
/// be refreshed; callers treat it as a black box.
#[derive(Debug)]
pub struct TokenAuth {
    client: reqwest::Client,
    config: AuthConfig,
    token: Mutex<Option<String>>,
}

impl TokenAuth {
    /// Fails before any network call when the auth URL is empty, which the
    /// token endpoint would otherwise turn into an unrecoverable abort.
    pub fn new(client: reqwest::Client, config: AuthConfig) -> GangplankResult<Self> {
        if config.auth_url.is_empty() {
            return Err(GangplankError::Config("auth URL is empty".to_string()));
        }
        Ok(TokenAuth {
            client,
            config,
            token: Mutex::new(None),
        })
    }

    /// Obtain a token. A pre-issued token short-circuits the password grant.
    pub async fn authenticate(&self) -> GangplankResult<()> {
        if !self.config.token.is_empty() {
            *self.token.lock().await = Some(self.config.token.clone());
            return Ok(());
        }

        let url = format!("{}/tokens", self.config.auth_url.trim_end_matches('/'));
        debug!("Requesting token from {}", url);

        let body = serde_json::json!({
            "auth": {
                "passwordCredentials": {
                    "username": self.config.username,
                    "password": self.config.password,
                },
                "tenantName": self.config.tenant_name,
            }
        });

        let response = self.client.post(&url).json(&body).send().await?;
        if !response.status().is_success() {
            return Err(GangplankError::Config(format!(
                "token service returned {}",
                response.status()
            )));
        }

        let issued: TokenResponse = response.json().await?;
        *self.token.lock().await = Some(issued.access.token.id);
        Ok(())
    }

    /// Drop the cached token and authenticate again.
    pub async fn refresh(&self) -> GangplankResult<()> {
        *self.token.lock().await = None;
        self.authenticate().await
    }

    pub async fn token(&self) -> Option<String> {
        self.token.lock().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_auth_url_fails_before_any_call() {
        let err = TokenAuth::new(reqwest::Client::new(), AuthConfig::default()).unwrap_err();
        assert!(matches!(err, GangplankError::Config(_)));
    }

    #[tokio::test]
    async fn test_preissued_token_skips_password_grant() {
        let config = AuthConfig {
            auth_url: "http://127.0.0.1:5000/v2.0".to_string(),
            token: "issued".to_string(),
            ..Default::default()
        };
        let auth = TokenAuth::new(reqwest::Client::new(), config).unwrap();
        auth.authenticate().await.unwrap();
        assert_eq!(auth.token().await.as_deref(), Some("issued"));
    }
}
