use async_trait::async_trait;
use castkeeper_core::config::PlatformSettings;
use castkeeper_core::entities::{now_millis, AccessToken};
use castkeeper_core::ports::OauthClient;
use castkeeper_core::Error;
use reqwest::{Client, Url};
use serde::Deserialize;
use tracing::{debug, info, instrument, warn};

use crate::network::build_oauth_client;

/// Token endpoint payload.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<u64>,
    #[serde(default)]
    scope: Vec<String>,
}

impl TokenResponse {
    fn into_access_token(self) -> AccessToken {
        AccessToken {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            scope: self.scope,
            expires_in: self.expires_in,
            obtainment_timestamp: now_millis(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    #[serde(default)]
    status: Option<u16>,
    #[serde(default)]
    message: Option<String>,
}

/// Authorization-code and refresh-token grants against the platform's id service.
pub struct TwitchOauthClient {
    client: Client,
    client_id: String,
    client_secret: String,
    redirect_uri: String,
    scopes: Vec<String>,
    auth_url: String,
    token_url: String,
}

impl TwitchOauthClient {
    pub fn new(settings: &PlatformSettings) -> Result<Self, Error> {
        Ok(Self {
            client: build_oauth_client()?,
            client_id: settings.client_id.clone(),
            client_secret: settings.client_secret.clone(),
            redirect_uri: settings.redirect_uri.clone(),
            scopes: settings.scopes.clone(),
            auth_url: settings.auth_url.clone(),
            token_url: settings.token_url.clone(),
        })
    }

    async fn request_token(&self, form: &[(&str, &str)]) -> Result<AccessToken, Error> {
        let response = self
            .client
            .post(&self.token_url)
            .form(form)
            .send()
            .await
            .map_err(|e| Error::Network(format!("token request failed: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::Network(format!("failed to read token response: {}", e)))?;

        if !status.is_success() {
            let message = serde_json::from_str::<ErrorResponse>(&body)
                .ok()
                .and_then(|e| {
                    e.message
                        .map(|m| format!("{} ({})", m, e.status.unwrap_or(status.as_u16())))
                })
                .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));
            warn!(status = status.as_u16(), "token endpoint refused the request");
            return Err(Error::Authentication(message));
        }

        let token: TokenResponse = serde_json::from_str(&body).map_err(|e| {
            Error::InvalidServerResponse(format!("unexpected token response: {}", e))
        })?;
        Ok(token.into_access_token())
    }
}

#[async_trait]
impl OauthClient for TwitchOauthClient {
    fn authorize_url(&self) -> Result<String, Error> {
        let mut url = Url::parse(&self.auth_url)
            .map_err(|e| Error::Other(format!("invalid authorize url '{}': {}", self.auth_url, e)))?;
        url.query_pairs_mut()
            .append_pair("client_id", self.client_id.as_str())
            .append_pair("redirect_uri", &self.redirect_uri)
            .append_pair("response_type", "code")
            .append_pair("scope", &self.scopes.join(" "))
            .append_pair("force_verify", "true");
        Ok(url.to_string())
    }

    #[instrument(skip(self, code))]
    async fn exchange_code(&self, code: &str) -> Result<AccessToken, Error> {
        if code.trim().is_empty() {
            return Err(Error::Authentication(
                "missing authorization code".to_string(),
            ));
        }

        debug!("exchanging authorization code");
        let token = self
            .request_token(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("code", code),
                ("grant_type", "authorization_code"),
                ("redirect_uri", self.redirect_uri.as_str()),
            ])
            .await?;
        info!(scopes = ?token.scope, "authorization code exchanged");
        Ok(token)
    }

    #[instrument(skip(self, refresh_token))]
    async fn refresh(&self, refresh_token: &str) -> Result<AccessToken, Error> {
        debug!("refreshing access token");
        self.request_token(&[
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ])
        .await
    }
}
