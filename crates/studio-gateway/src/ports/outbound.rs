//! Outbound ports for the studio gateway.
//!
//! Each external dependency sits behind one trait so the service can be
//! exercised against in-memory fakes and the runtime can swap live adapters
//! for offline ones.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use shared_types::{GeneratedImage, GenerationSettings, NewImage, User, UserId};

use crate::domain::{DailyUsage, ProviderError};

/// Result type for adapter calls
pub type ProviderResult<T> = Result<T, ProviderError>;

// =============================================================================
// AUTH
// =============================================================================

/// Outcome of a sign-up or sign-in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub user: User,
    /// Absent after sign-up when the provider requires email confirmation.
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    /// Seconds until `access_token` expires.
    pub expires_in: Option<u64>,
}

#[async_trait]
pub trait AuthProvider: Send + Sync {
    fn is_configured(&self) -> bool;

    async fn sign_up(&self, email: &str, password: &str, username: &str)
        -> ProviderResult<Session>;

    async fn sign_in(&self, email: &str, password: &str) -> ProviderResult<Session>;

    async fn sign_out(&self, access_token: &str) -> ProviderResult<()>;

    /// Resolve a bearer token to its user. `Unauthorized` when invalid.
    async fn user_for_token(&self, access_token: &str) -> ProviderResult<User>;
}

/// Profile claims taken from a verified OAuth ID token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthIdentity {
    pub sub: String,
    pub email: String,
    pub name: String,
    pub picture: Option<String>,
    pub email_verified: bool,
}

#[async_trait]
pub trait OAuthProvider: Send + Sync {
    fn is_configured(&self) -> bool;

    /// Consent page URL carrying `state`.
    fn authorization_url(&self, state: &str) -> ProviderResult<String>;

    async fn exchange_code(&self, code: &str) -> ProviderResult<OAuthIdentity>;
}

// =============================================================================
// GENERATION
// =============================================================================

/// A finished prediction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationOutput {
    /// Provider-hosted image URL.
    pub image_url: String,
    pub prediction_id: String,
    pub model: String,
}

#[async_trait]
pub trait ImageGenerator: Send + Sync {
    fn is_configured(&self) -> bool;

    /// Run one prediction to completion.
    async fn generate(
        &self,
        prompt: &str,
        settings: &GenerationSettings,
    ) -> ProviderResult<GenerationOutput>;
}

#[async_trait]
pub trait PromptEnhancer: Send + Sync {
    fn is_configured(&self) -> bool;

    async fn enhance(&self, prompt: &str) -> ProviderResult<String>;
}

// =============================================================================
// PERSISTENCE
// =============================================================================

/// Downloaded image bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedImage {
    pub bytes: Bytes,
    pub content_type: Option<String>,
}

#[async_trait]
pub trait ImageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> ProviderResult<FetchedImage>;
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    fn is_configured(&self) -> bool;

    /// Store `bytes` at `path`. Existing objects are never overwritten.
    async fn upload(&self, path: &str, bytes: Bytes, content_type: &str) -> ProviderResult<()>;

    fn public_url(&self, path: &str) -> String;
}

#[async_trait]
pub trait ImageRepository: Send + Sync {
    fn is_configured(&self) -> bool;

    async fn insert(&self, image: NewImage) -> ProviderResult<GeneratedImage>;

    /// A user's images, newest first.
    async fn list_by_user(&self, user_id: &UserId) -> ProviderResult<Vec<GeneratedImage>>;

    /// Latest images of every user, newest first.
    async fn list_recent(&self, limit: usize) -> ProviderResult<Vec<GeneratedImage>>;
}

/// Storage for daily quota counters.
pub trait QuotaStore: Send + Sync {
    fn load(&self, user: &UserId) -> Option<DailyUsage>;

    /// Add one generation for `day` unless the count already reached
    /// `limit`, as a single atomic step. Returns the new count, or `None`
    /// when full. A record from another day is replaced. `limit: None`
    /// always succeeds.
    fn try_increment(&self, user: &UserId, day: NaiveDate, limit: Option<u32>) -> Option<u32>;

    /// Give back one generation taken for `day`. A record that has since
    /// rolled over to another day is left alone.
    fn decrement(&self, user: &UserId, day: NaiveDate);

    /// Drop records from days before `today`. Returns how many went.
    fn prune(&self, today: NaiveDate) -> usize;

    /// Write any buffered state out. May block.
    fn flush(&self) {}
}

// =============================================================================
// TIME
// =============================================================================

/// Time source trait for testability
pub trait TimeSource: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }
}

/// System time implementation
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually driven clock for tests.
#[derive(Debug)]
pub struct FixedTimeSource {
    now: RwLock<DateTime<Utc>>,
}

impl FixedTimeSource {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: RwLock::new(now),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.write() = now;
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.now.write();
        *now += by;
    }
}

impl TimeSource for FixedTimeSource {
    fn now(&self) -> DateTime<Utc> {
        *self.now.read()
    }
}
