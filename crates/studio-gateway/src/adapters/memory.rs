//! In-memory adapters.
//!
//! Used by the test suites and by the runtime's offline mode. Each fake can
//! be told to fail so the service's fallback paths can be exercised.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use shared_types::{GeneratedImage, GenerationSettings, ImageId, NewImage, User, UserId};
use uuid::Uuid;

use crate::domain::ProviderError;
use crate::ports::{
    AuthProvider, FetchedImage, GenerationOutput, ImageFetcher, ImageGenerator, ImageRepository,
    OAuthIdentity, OAuthProvider, ObjectStore, PromptEnhancer, ProviderResult, QuotaStore, Session,
    StudioPorts, TimeSource,
};

// =============================================================================
// AUTH
// =============================================================================

struct Account {
    password: String,
    user: User,
}

/// Accounts and bearer tokens held in maps.
#[derive(Default)]
pub struct MemoryAuth {
    accounts: DashMap<String, Account>,
    tokens: DashMap<String, User>,
}

impl MemoryAuth {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an account and return a live token for it.
    pub fn seed_user(&self, email: &str, password: &str, username: &str) -> (User, String) {
        let user = User {
            id: UserId::new(Uuid::new_v4().to_string()),
            email: email.to_string(),
            username: username.to_string(),
            created_at: Utc::now(),
        };
        self.accounts.insert(
            email.to_lowercase(),
            Account {
                password: password.to_string(),
                user: user.clone(),
            },
        );
        let token = self.issue(&user);
        (user, token)
    }

    fn issue(&self, user: &User) -> String {
        let token = format!("mem-{}", Uuid::new_v4().simple());
        self.tokens.insert(token.clone(), user.clone());
        token
    }

    fn session(&self, user: User) -> Session {
        let token = self.issue(&user);
        Session {
            user,
            access_token: Some(token),
            refresh_token: None,
            expires_in: Some(3600),
        }
    }
}

#[async_trait]
impl AuthProvider for MemoryAuth {
    fn is_configured(&self) -> bool {
        true
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        username: &str,
    ) -> ProviderResult<Session> {
        if self.accounts.contains_key(&email.to_lowercase()) {
            return Err(ProviderError::Unauthorized("User already registered".into()));
        }
        let (user, _) = self.seed_user(email, password, username);
        Ok(self.session(user))
    }

    async fn sign_in(&self, email: &str, password: &str) -> ProviderResult<Session> {
        let user = self
            .accounts
            .get(&email.to_lowercase())
            .filter(|account| account.password == password)
            .map(|account| account.user.clone())
            .ok_or_else(|| ProviderError::Unauthorized("Invalid login credentials".into()))?;
        Ok(self.session(user))
    }

    async fn sign_out(&self, access_token: &str) -> ProviderResult<()> {
        self.tokens.remove(access_token);
        Ok(())
    }

    async fn user_for_token(&self, access_token: &str) -> ProviderResult<User> {
        self.tokens
            .get(access_token)
            .map(|user| user.clone())
            .ok_or_else(|| ProviderError::Unauthorized("invalid token".into()))
    }
}

/// OAuth provider that accepts codes registered up front.
#[derive(Default)]
pub struct MemoryOAuth {
    codes: DashMap<String, OAuthIdentity>,
}

impl MemoryOAuth {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `code` exchangeable (once) for `identity`.
    pub fn register_code(&self, code: impl Into<String>, identity: OAuthIdentity) {
        self.codes.insert(code.into(), identity);
    }
}

#[async_trait]
impl OAuthProvider for MemoryOAuth {
    fn is_configured(&self) -> bool {
        true
    }

    fn authorization_url(&self, state: &str) -> ProviderResult<String> {
        Ok(format!("memory://oauth/authorize?response_type=code&state={state}"))
    }

    async fn exchange_code(&self, code: &str) -> ProviderResult<OAuthIdentity> {
        self.codes
            .remove(code)
            .map(|(_, identity)| identity)
            .ok_or_else(|| ProviderError::Unauthorized("Token exchange failed: invalid_grant".into()))
    }
}

// =============================================================================
// GENERATION
// =============================================================================

/// Generator that replays queued outcomes, then succeeds with a synthetic URL.
#[derive(Default)]
pub struct ScriptedGenerator {
    script: Mutex<VecDeque<ProviderResult<GenerationOutput>>>,
    calls: AtomicU64,
    prompts: Mutex<Vec<String>>,
    unconfigured: AtomicBool,
    latency: Mutex<Duration>,
}

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, outcome: ProviderResult<GenerationOutput>) {
        self.script.lock().push_back(outcome);
    }

    pub fn push_error(&self, err: ProviderError) {
        self.push(Err(err));
    }

    pub fn set_configured(&self, configured: bool) {
        self.unconfigured.store(!configured, Ordering::Relaxed);
    }

    /// Delay every call by `latency` before answering.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = latency;
    }

    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    /// Prompts received so far, oldest first.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }
}

#[async_trait]
impl ImageGenerator for ScriptedGenerator {
    fn is_configured(&self) -> bool {
        !self.unconfigured.load(Ordering::Relaxed)
    }

    async fn generate(
        &self,
        prompt: &str,
        settings: &GenerationSettings,
    ) -> ProviderResult<GenerationOutput> {
        let n = self.calls.fetch_add(1, Ordering::Relaxed) + 1;
        self.prompts.lock().push(prompt.to_string());
        let latency = *self.latency.lock();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        if let Some(outcome) = self.script.lock().pop_front() {
            return outcome;
        }
        Ok(GenerationOutput {
            image_url: format!(
                "https://images.invalid/offline/{n}.{}",
                settings.output_format.extension()
            ),
            prediction_id: format!("offline-{n}"),
            model: "offline".to_string(),
        })
    }
}

/// Enhancer that appends a fixed suffix, or fails when told to.
pub struct ScriptedEnhancer {
    suffix: String,
    failure: Mutex<Option<ProviderError>>,
    configured: AtomicBool,
}

impl ScriptedEnhancer {
    pub fn new(suffix: impl Into<String>) -> Self {
        Self {
            suffix: suffix.into(),
            failure: Mutex::new(None),
            configured: AtomicBool::new(true),
        }
    }

    pub fn fail_with(&self, err: ProviderError) {
        *self.failure.lock() = Some(err);
    }

    pub fn set_configured(&self, configured: bool) {
        self.configured.store(configured, Ordering::Relaxed);
    }
}

impl Default for ScriptedEnhancer {
    fn default() -> Self {
        Self::new(", highly detailed, soft natural lighting, 8k resolution")
    }
}

#[async_trait]
impl PromptEnhancer for ScriptedEnhancer {
    fn is_configured(&self) -> bool {
        self.configured.load(Ordering::Relaxed)
    }

    async fn enhance(&self, prompt: &str) -> ProviderResult<String> {
        if let Some(err) = self.failure.lock().clone() {
            return Err(err);
        }
        Ok(format!("{}{}", prompt.trim(), self.suffix))
    }
}

// =============================================================================
// PERSISTENCE
// =============================================================================

/// 1x1 transparent PNG served by [`StaticImageFetcher`].
pub const TINY_PNG: &[u8] = &[
    0x89, 0x50, 0x4e, 0x47, 0x0d, 0x0a, 0x1a, 0x0a, 0x00, 0x00, 0x00, 0x0d, 0x49, 0x48, 0x44,
    0x52, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1f,
    0x15, 0xc4, 0x89, 0x00, 0x00, 0x00, 0x0d, 0x49, 0x44, 0x41, 0x54, 0x78, 0x9c, 0x63, 0x00,
    0x01, 0x00, 0x00, 0x05, 0x00, 0x01, 0x0d, 0x0a, 0x2d, 0xb4, 0x00, 0x00, 0x00, 0x00, 0x49,
    0x45, 0x4e, 0x44, 0xae, 0x42, 0x60, 0x82,
];

/// Fetcher that returns the same bytes for every URL.
pub struct StaticImageFetcher {
    bytes: Bytes,
    fail: AtomicBool,
}

impl StaticImageFetcher {
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self {
            bytes: bytes.into(),
            fail: AtomicBool::new(false),
        }
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::Relaxed);
    }
}

impl Default for StaticImageFetcher {
    fn default() -> Self {
        Self::new(Bytes::from_static(TINY_PNG))
    }
}

#[async_trait]
impl ImageFetcher for StaticImageFetcher {
    async fn fetch(&self, url: &str) -> ProviderResult<FetchedImage> {
        if self.fail.load(Ordering::Relaxed) {
            return Err(ProviderError::Http {
                status: 404,
                body: format!("no such image: {url}"),
            });
        }
        Ok(FetchedImage {
            bytes: self.bytes.clone(),
            content_type: None,
        })
    }
}

/// Object store keyed by path.
pub struct MemoryObjectStore {
    base_url: String,
    objects: DashMap<String, (Bytes, String)>,
    fail: AtomicBool,
}

impl MemoryObjectStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            objects: DashMap::new(),
            fail: AtomicBool::new(false),
        }
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::Relaxed);
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn content_type(&self, path: &str) -> Option<String> {
        self.objects.get(path).map(|entry| entry.1.clone())
    }

    pub fn paths(&self) -> Vec<String> {
        self.objects.iter().map(|entry| entry.key().clone()).collect()
    }
}

impl Default for MemoryObjectStore {
    fn default() -> Self {
        Self::new("memory://generated-images")
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    fn is_configured(&self) -> bool {
        true
    }

    async fn upload(&self, path: &str, bytes: Bytes, content_type: &str) -> ProviderResult<()> {
        if self.fail.load(Ordering::Relaxed) {
            return Err(ProviderError::Http {
                status: 500,
                body: "storage unavailable".into(),
            });
        }
        if self.objects.contains_key(path) {
            return Err(ProviderError::Http {
                status: 409,
                body: "The resource already exists".into(),
            });
        }
        self.objects
            .insert(path.to_string(), (bytes, content_type.to_string()));
        Ok(())
    }

    fn public_url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }
}

/// Image rows in insertion order; listings come back newest first.
pub struct MemoryImageRepository {
    rows: RwLock<Vec<GeneratedImage>>,
    clock: Arc<dyn TimeSource>,
    fail: AtomicBool,
}

impl MemoryImageRepository {
    pub fn new(clock: Arc<dyn TimeSource>) -> Self {
        Self {
            rows: RwLock::new(Vec::new()),
            clock,
            fail: AtomicBool::new(false),
        }
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::Relaxed);
    }

    pub fn all(&self) -> Vec<GeneratedImage> {
        self.rows.read().clone()
    }

    fn check(&self) -> ProviderResult<()> {
        if self.fail.load(Ordering::Relaxed) {
            Err(ProviderError::Network("database unreachable".into()))
        } else {
            Ok(())
        }
    }

    fn newest_first(&self, keep: impl Fn(&GeneratedImage) -> bool) -> Vec<GeneratedImage> {
        let rows = self.rows.read();
        let mut out: Vec<_> = rows.iter().rev().filter(|row| keep(row)).cloned().collect();
        // Stable sort keeps insertion order for equal timestamps.
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        out
    }
}

#[async_trait]
impl ImageRepository for MemoryImageRepository {
    fn is_configured(&self) -> bool {
        true
    }

    async fn insert(&self, image: NewImage) -> ProviderResult<GeneratedImage> {
        self.check()?;
        let stored = image.into_stored(ImageId(Uuid::new_v4().to_string()), self.clock.now());
        self.rows.write().push(stored.clone());
        Ok(stored)
    }

    async fn list_by_user(&self, user_id: &UserId) -> ProviderResult<Vec<GeneratedImage>> {
        self.check()?;
        Ok(self.newest_first(|row| &row.user_id == user_id))
    }

    async fn list_recent(&self, limit: usize) -> ProviderResult<Vec<GeneratedImage>> {
        self.check()?;
        let mut rows = self.newest_first(|_| true);
        rows.truncate(limit);
        Ok(rows)
    }
}

/// In-memory stand-ins for every provider, for running without credentials.
pub fn offline_ports(clock: Arc<dyn TimeSource>, quota_store: Arc<dyn QuotaStore>) -> StudioPorts {
    StudioPorts {
        auth: Arc::new(MemoryAuth::new()),
        oauth: Arc::new(MemoryOAuth::new()),
        generator: Arc::new(ScriptedGenerator::new()),
        enhancer: Arc::new(ScriptedEnhancer::default()),
        fetcher: Arc::new(StaticImageFetcher::default()),
        objects: Arc::new(MemoryObjectStore::default()),
        images: Arc::new(MemoryImageRepository::new(Arc::clone(&clock))),
        quota_store,
        clock,
    }
}
