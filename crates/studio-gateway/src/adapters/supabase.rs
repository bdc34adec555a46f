//! Supabase adapters: auth (GoTrue), object storage, and PostgREST rows.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use serde_json::json;
use shared_types::{GeneratedImage, NewImage, User, UserId};
use tracing::{debug, instrument};

use super::{ensure_success, error_message, http_client};
use crate::domain::config::{AuthProviderConfig, StorageConfig, TimeoutConfig};
use crate::domain::ProviderError;
use crate::ports::{AuthProvider, ImageRepository, ObjectStore, ProviderResult, Session};

fn join(base: &str, path: &str) -> String {
    format!("{}{}", base.trim_end_matches('/'), path)
}

// =============================================================================
// AUTH
// =============================================================================

/// Email/password auth against `/auth/v1`.
pub struct SupabaseAuth {
    client: Client,
    config: AuthProviderConfig,
}

impl SupabaseAuth {
    pub fn new(config: AuthProviderConfig, timeouts: &TimeoutConfig) -> ProviderResult<Self> {
        Ok(Self {
            client: http_client(timeouts.connect, timeouts.default)?,
            config,
        })
    }

    fn request(&self, builder: RequestBuilder, bearer: Option<&str>) -> RequestBuilder {
        builder
            .header("apikey", &self.config.anon_key)
            .bearer_auth(bearer.unwrap_or(&self.config.anon_key))
    }

    fn url(&self, path: &str) -> String {
        join(&self.config.base_url, path)
    }

    fn ensure_configured(&self) -> ProviderResult<()> {
        if self.is_configured() {
            Ok(())
        } else {
            Err(ProviderError::NotConfigured("Authentication"))
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct UserMetadata {
    username: Option<String>,
    display_name: Option<String>,
    full_name: Option<String>,
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AuthUser {
    id: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    user_metadata: UserMetadata,
}

impl AuthUser {
    fn into_user(self) -> User {
        let email = self.email.unwrap_or_default();
        let meta = self.user_metadata;
        let username = meta
            .username
            .or(meta.display_name)
            .or(meta.full_name)
            .or(meta.name)
            .unwrap_or_else(|| email.split('@').next().unwrap_or_default().to_string());
        User {
            id: UserId::new(self.id),
            email,
            username,
            created_at: self.created_at.unwrap_or_else(Utc::now),
        }
    }
}

/// `/token` and (auto-confirmed) `/signup` responses.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<u64>,
    user: AuthUser,
}

impl TokenResponse {
    fn into_session(self) -> Session {
        Session {
            user: self.user.into_user(),
            access_token: Some(self.access_token),
            refresh_token: self.refresh_token,
            expires_in: self.expires_in,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SignUpResponse {
    Session(TokenResponse),
    /// Email confirmation pending: just the user.
    User(AuthUser),
}

/// Credential failures become `Unauthorized` with the provider's message.
fn credential_error(err: ProviderError) -> ProviderError {
    match err {
        ProviderError::Http { status, body } if (400..500).contains(&status) && status != 429 => {
            ProviderError::Unauthorized(
                error_message(&body).unwrap_or_else(|| "Invalid login credentials".to_string()),
            )
        }
        other => other,
    }
}

#[async_trait]
impl AuthProvider for SupabaseAuth {
    fn is_configured(&self) -> bool {
        self.config.is_configured()
    }

    #[instrument(skip_all, fields(email = %email))]
    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        username: &str,
    ) -> ProviderResult<Session> {
        self.ensure_configured()?;
        let body = json!({
            "email": email,
            "password": password,
            "data": { "username": username, "display_name": username },
        });
        let response = self
            .request(self.client.post(self.url("/auth/v1/signup")), None)
            .json(&body)
            .send()
            .await?;
        let response = ensure_success(response).await.map_err(credential_error)?;
        let session = match response.json::<SignUpResponse>().await? {
            SignUpResponse::Session(token) => token.into_session(),
            SignUpResponse::User(user) => Session {
                user: user.into_user(),
                access_token: None,
                refresh_token: None,
                expires_in: None,
            },
        };
        debug!(user_id = %session.user.id, confirmed = session.access_token.is_some(), "Signed up");
        Ok(session)
    }

    #[instrument(skip_all, fields(email = %email))]
    async fn sign_in(&self, email: &str, password: &str) -> ProviderResult<Session> {
        self.ensure_configured()?;
        let response = self
            .request(
                self.client
                    .post(self.url("/auth/v1/token"))
                    .query(&[("grant_type", "password")]),
                None,
            )
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await?;
        let response = ensure_success(response).await.map_err(credential_error)?;
        let token: TokenResponse = response.json().await?;
        Ok(token.into_session())
    }

    async fn sign_out(&self, access_token: &str) -> ProviderResult<()> {
        self.ensure_configured()?;
        let response = self
            .request(self.client.post(self.url("/auth/v1/logout")), Some(access_token))
            .send()
            .await?;
        ensure_success(response).await?;
        Ok(())
    }

    async fn user_for_token(&self, access_token: &str) -> ProviderResult<User> {
        self.ensure_configured()?;
        let response = self
            .request(self.client.get(self.url("/auth/v1/user")), Some(access_token))
            .send()
            .await?;
        let response = ensure_success(response).await.map_err(|e| match e {
            ProviderError::Http { status: 401 | 403, body } => ProviderError::Unauthorized(
                error_message(&body).unwrap_or_else(|| "invalid token".to_string()),
            ),
            other => other,
        })?;
        let user: AuthUser = response.json().await?;
        Ok(user.into_user())
    }
}

// =============================================================================
// STORAGE
// =============================================================================

/// Bucket uploads under `/storage/v1`.
pub struct SupabaseStorage {
    client: Client,
    config: StorageConfig,
}

impl SupabaseStorage {
    pub fn new(config: StorageConfig, timeouts: &TimeoutConfig) -> ProviderResult<Self> {
        Ok(Self {
            client: http_client(timeouts.connect, timeouts.default)?,
            config,
        })
    }
}

#[async_trait]
impl ObjectStore for SupabaseStorage {
    fn is_configured(&self) -> bool {
        self.config.is_configured()
    }

    #[instrument(skip(self, bytes), fields(size = bytes.len()))]
    async fn upload(&self, path: &str, bytes: Bytes, content_type: &str) -> ProviderResult<()> {
        if !self.is_configured() {
            return Err(ProviderError::NotConfigured("Image storage"));
        }
        let url = join(
            &self.config.base_url,
            &format!("/storage/v1/object/{}/{}", self.config.bucket, path),
        );
        let response = self
            .client
            .post(url)
            .header("apikey", &self.config.service_key)
            .bearer_auth(&self.config.service_key)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .header("x-upsert", "false")
            .body(bytes)
            .send()
            .await?;
        ensure_success(response).await?;
        Ok(())
    }

    fn public_url(&self, path: &str) -> String {
        join(
            &self.config.base_url,
            &format!("/storage/v1/object/public/{}/{}", self.config.bucket, path),
        )
    }
}

// =============================================================================
// ROWS
// =============================================================================

/// `generated_images` rows through PostgREST.
pub struct SupabaseRows {
    client: Client,
    config: StorageConfig,
}

impl SupabaseRows {
    pub fn new(config: StorageConfig, timeouts: &TimeoutConfig) -> ProviderResult<Self> {
        Ok(Self {
            client: http_client(timeouts.connect, timeouts.default)?,
            config,
        })
    }

    fn table(&self, builder: fn(&Client, String) -> RequestBuilder) -> ProviderResult<RequestBuilder> {
        if !self.config.is_configured() {
            return Err(ProviderError::NotConfigured("Image history"));
        }
        let url = join(
            &self.config.base_url,
            &format!("/rest/v1/{}", self.config.table),
        );
        Ok(builder(&self.client, url)
            .header("apikey", &self.config.service_key)
            .bearer_auth(&self.config.service_key))
    }

    async fn select(&self, query: &[(&str, String)]) -> ProviderResult<Vec<GeneratedImage>> {
        let response = self
            .table(|c, url| c.get(url))?
            .query(&[("select", "*"), ("order", "created_at.desc")])
            .query(query)
            .send()
            .await?;
        let response = ensure_success(response).await?;
        Ok(response.json().await?)
    }
}

#[async_trait]
impl ImageRepository for SupabaseRows {
    fn is_configured(&self) -> bool {
        self.config.is_configured()
    }

    async fn insert(&self, image: NewImage) -> ProviderResult<GeneratedImage> {
        let response = self
            .table(|c, url| c.post(url))?
            .header("Prefer", "return=representation")
            .json(&[&image])
            .send()
            .await?;
        let response = ensure_success(response).await?;
        let mut rows: Vec<GeneratedImage> = response.json().await?;
        rows.pop()
            .ok_or_else(|| ProviderError::Decode("insert returned no rows".to_string()))
    }

    async fn list_by_user(&self, user_id: &UserId) -> ProviderResult<Vec<GeneratedImage>> {
        self.select(&[("user_id", format!("eq.{user_id}"))]).await
    }

    async fn list_recent(&self, limit: usize) -> ProviderResult<Vec<GeneratedImage>> {
        self.select(&[("limit", limit.to_string())]).await
    }
}
