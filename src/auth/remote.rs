//! HTTP adapters for the external identity service.
//!
//! The session endpoint takes the caller's bearer token and answers with
//! `{ "user_id", "expires_at", "role"? }`; 401/403/404 mean "no session".
//! Profiles come from a PostgREST-style table endpoint.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::time::Duration;

use crate::auth::session::{
    Credentials, IdentityServiceError, Profile, ProfileStore, Session, SessionResolver,
};
use crate::config::IdentityConfig;
use crate::data::ErrorEnvelope;

fn build_client(config: &IdentityConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .timeout(Duration::from_millis(config.lookup_timeout_ms))
        .build()
}

#[derive(Debug, Clone)]
pub struct HttpSessionResolver {
    client: Client,
    url: String,
    api_key: String,
}

impl HttpSessionResolver {
    pub fn new(config: &IdentityConfig) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: build_client(config)?,
            url: config.session_url.clone(),
            api_key: config.api_key.clone(),
        })
    }
}

#[async_trait]
impl SessionResolver for HttpSessionResolver {
    async fn resolve(&self, credentials: &Credentials) -> Result<Option<Session>, IdentityServiceError> {
        let response = self
            .client
            .get(&self.url)
            .header("apikey", &self.api_key)
            .bearer_auth(credentials.token())
            .send()
            .await?;

        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => Ok(Some(response.json::<Session>().await?)),
            status => Err(IdentityServiceError::Status(status.as_u16())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpProfileStore {
    client: Client,
    url: String,
    api_key: String,
}

impl HttpProfileStore {
    pub fn new(config: &IdentityConfig) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: build_client(config)?,
            url: config.profiles_url.clone(),
            api_key: config.api_key.clone(),
        })
    }
}

#[async_trait]
impl ProfileStore for HttpProfileStore {
    async fn fetch_profile(&self, user_id: &str) -> Result<Profile, ErrorEnvelope> {
        let filter = format!("eq.{user_id}");
        let response = self
            .client
            .get(&self.url)
            .query(&[("id", filter.as_str()), ("select", "id,role")])
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
            .send()
            .await?;

        let status = response.status();
        let body: serde_json::Value = response.json().await?;
        if !status.is_success() {
            return Err(ErrorEnvelope::from(body));
        }

        let rows: Vec<Profile> = serde_json::from_value(body)
            .map_err(|e| ErrorEnvelope::new(Some("decode"), e.to_string()))?;
        rows.into_iter()
            .next()
            .ok_or_else(|| ErrorEnvelope::new(Some("PGRST116"), format!("no profile for user {user_id}")))
    }
}
