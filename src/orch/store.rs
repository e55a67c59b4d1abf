use std::sync::Arc;

use async_trait::async_trait;
use log::debug;
use reqwest::{Method, StatusCode};
use serde_json::Value;

use crate::error::{GangplankError, GangplankResult};
use crate::orch::auth::{AuthConfig, TokenAuth};

/// Authenticated typed object store. Objects are addressed by REST kind
/// token plus UUID; fully qualified names resolve to UUIDs first.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn find_uuid_by_name(
        &self,
        kind: &str,
        fq_name: &[String],
    ) -> GangplankResult<Option<String>>;
    async fn get(&self, kind: &str, uuid: &str) -> GangplankResult<Option<Value>>;
    /// Create an object and return the stored representation.
    async fn create(&self, kind: &str, body: Value) -> GangplankResult<Value>;
    async fn update(&self, kind: &str, uuid: &str, body: Value) -> GangplankResult<()>;
    /// Delete an object. A refusal because children still reference it is
    /// surfaced as Conflict carrying the server's error text.
    async fn delete(&self, kind: &str, uuid: &str) -> GangplankResult<()>;
}

/// REST implementation of the object store. Bodies travel in a
/// `{"<kind>": {...}}` envelope and name resolution goes through the
/// fqname-to-id endpoint.
pub struct RestStore {
    client: reqwest::Client,
    base_url: String,
    auth: Arc<TokenAuth>,
}

impl RestStore {
    /// Build the store and authenticate immediately.
    pub async fn connect(ip: &str, port: u16, auth_config: AuthConfig) -> GangplankResult<Self> {
        let client = reqwest::Client::new();
        let auth = Arc::new(TokenAuth::new(client.clone(), auth_config)?);
        auth.authenticate().await?;
        Ok(RestStore {
            client,
            base_url: format!("http://{}:{}", ip, port),
            auth,
        })
    }

    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> GangplankResult<reqwest::Response> {
        let url = format!("{}{}", self.base_url, path);
        let mut attempted_refresh = false;
        loop {
            let mut request = self.client.request(method.clone(), &url);
            if let Some(token) = self.auth.token().await {
                request = request.header("X-Auth-Token", token);
            }
            if let Some(body) = body {
                request = request.json(body);
            }

            let response = request.send().await?;
            if response.status() == StatusCode::UNAUTHORIZED && !attempted_refresh {
                debug!("Token rejected, refreshing");
                self.auth.refresh().await?;
                attempted_refresh = true;
                continue;
            }
            return Ok(response);
        }
    }
}

fn unwrap_envelope(kind: &str, mut value: Value) -> GangplankResult<Value> {
    match value.get_mut(kind) {
        Some(inner) => Ok(inner.take()),
        None => Err(GangplankError::msg(format!(
            "response has no {} envelope",
            kind
        ))),
    }
}

#[async_trait]
impl ObjectStore for RestStore {
    async fn find_uuid_by_name(
        &self,
        kind: &str,
        fq_name: &[String],
    ) -> GangplankResult<Option<String>> {
        let body = serde_json::json!({
            "type": kind,
            "fq_name": fq_name,
        });
        let response = self
            .request(Method::POST, "/fqname-to-id", Some(&body))
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let value: Value = response.error_for_status()?.json().await?;
        Ok(value
            .get("uuid")
            .and_then(Value::as_str)
            .map(str::to_string))
    }

    async fn get(&self, kind: &str, uuid: &str) -> GangplankResult<Option<Value>> {
        let path = format!("/{}/{}", kind, uuid);
        let response = self.request(Method::GET, &path, None).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let value: Value = response.error_for_status()?.json().await?;
        Ok(Some(unwrap_envelope(kind, value)?))
    }

    async fn create(&self, kind: &str, body: Value) -> GangplankResult<Value> {
        let path = format!("/{}s", kind);
        let envelope = serde_json::json!({ kind: body });
        let response = self.request(Method::POST, &path, Some(&envelope)).await?;
        let value: Value = response.error_for_status()?.json().await?;
        unwrap_envelope(kind, value)
    }

    async fn update(&self, kind: &str, uuid: &str, body: Value) -> GangplankResult<()> {
        let path = format!("/{}/{}", kind, uuid);
        let envelope = serde_json::json!({ kind: body });
        self.request(Method::PUT, &path, Some(&envelope))
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn delete(&self, kind: &str, uuid: &str) -> GangplankResult<()> {
        let path = format!("/{}/{}", kind, uuid);
        let response = self.request(Method::DELETE, &path, None).await?;
        match response.status() {
            StatusCode::NOT_FOUND => Err(GangplankError::NotFound(format!(
                "404 Resource {}/{}",
                kind, uuid
            ))),
            StatusCode::CONFLICT => {
                let text = response.text().await.unwrap_or_default();
                Err(GangplankError::Conflict(format!("409 Conflict: {}", text)))
            }
            status if status.is_success() => Ok(()),
            status => Err(GangplankError::msg(format!(
                "delete of {}/{} returned {}",
                kind, uuid, status
            ))),
        }
    }
}
