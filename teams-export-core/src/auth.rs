//! Bearer token providers.

use std::time::Duration;

use log::debug;
use reqwest::blocking::Client;
use serde_json::Value;

use crate::config::AuthConfig;
use crate::error::{Error, Result};

/// Scope requesting the application permissions granted to the client.
pub const GRAPH_DEFAULT_SCOPE: &str = "https://graph.microsoft.com/.default";

/// Source of bearer tokens for Graph requests.
pub trait TokenProvider {
    /// Return a bearer token, or [`Error::Auth`].
    fn access_token(&self) -> Result<String>;
}

/// A pre-acquired token.
#[derive(Debug, Clone)]
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

impl TokenProvider for StaticToken {
    fn access_token(&self) -> Result<String> {
        if self.0.trim().is_empty() {
            return Err(Error::Auth("empty access token".to_string()));
        }
        Ok(self.0.clone())
    }
}

/// OAuth2 client-credentials (app-only) flow against the identity platform.
#[derive(Debug, Clone)]
pub struct ClientCredentials {
    http: Client,
    token_url: String,
    client_id: String,
    client_secret: String,
}

impl ClientCredentials {
    pub fn new(
        authority: &str,
        tenant_id: &str,
        client_id: &str,
        client_secret: &str,
        timeout: Option<Duration>,
    ) -> Result<Self> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build()?;
        let token_url = format!(
            "{}/{}/oauth2/v2.0/token",
            authority.trim_end_matches('/'),
            urlencoding::encode(tenant_id)
        );
        Ok(Self {
            http,
            token_url,
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
        })
    }

    pub fn token_url(&self) -> &str {
        &self.token_url
    }
}

impl TokenProvider for ClientCredentials {
    fn access_token(&self) -> Result<String> {
        debug!("requesting token from {}", self.token_url);
        let params = [
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("scope", GRAPH_DEFAULT_SCOPE),
            ("grant_type", "client_credentials"),
        ];
        let resp = self
            .http
            .post(&self.token_url)
            .form(&params)
            .send()
            .map_err(|e| Error::Auth(format!("token request failed: {e}")))?;
        let text = resp
            .text()
            .map_err(|e| Error::Auth(format!("reading token response: {e}")))?;
        let doc: Value = serde_json::from_str(&text)
            .map_err(|e| Error::Auth(format!("parsing token response: {e}")))?;
        parse_token_response(&doc)
    }
}

/// Extract `access_token` from a token endpoint response.
pub fn parse_token_response(doc: &Value) -> Result<String> {
    if let Some(token) = doc
        .get("access_token")
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
    {
        return Ok(token.to_string());
    }
    let reason = doc
        .get("error_description")
        .or_else(|| doc.get("error"))
        .and_then(|v| v.as_str())
        .unwrap_or("Unknown error");
    Err(Error::Auth(reason.to_string()))
}

/// Pick a provider from configuration: an explicit token wins, then client credentials.
pub fn provider_from_config(
    auth: &AuthConfig,
    timeout: Option<Duration>,
) -> Result<Box<dyn TokenProvider>> {
    if let Some(token) = auth.access_token.as_deref().filter(|t| !t.is_empty()) {
        return Ok(Box::new(StaticToken::new(token)));
    }
    match (&auth.tenant_id, &auth.client_id, &auth.client_secret) {
        (Some(tenant), Some(client), Some(secret)) => Ok(Box::new(ClientCredentials::new(
            &auth.authority,
            tenant,
            client,
            secret,
            timeout,
        )?)),
        _ => Err(Error::Auth(
            "no credentials configured (set auth.access_token or auth.tenant_id, auth.client_id and auth.client_secret)"
                .to_string(),
        )),
    }
}

impl<T: TokenProvider + ?Sized> TokenProvider for Box<T> {
    fn access_token(&self) -> Result<String> {
        (**self).access_token()
    }
}
