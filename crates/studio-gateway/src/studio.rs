//! Studio orchestration.
//!
//! `StudioService` is the one place that sequences provider calls for a
//! request: validate, reserve quota, call the provider, commit, persist. Every
//! provider failure is reconciled into an [`ApiError`] here.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use shared_types::{GeneratedImage, GenerationSettings, NewImage, Page, QuotaStatus, User};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::adapters::{reconcile_auth, reconcile_generation, reconcile_storage};
use crate::domain::{
    credentials, paginate, prompt, quota, styles, ApiError, ApiResult, DailyQuota, GatewayConfig,
    ProviderError,
};
use crate::middleware::{CircuitBreakerManager, CircuitStats, GatewayMetrics};
use crate::ports::{GenerationOutput, OAuthIdentity, ProviderResult, Session, StudioPorts};

/// Circuit names.
pub const GENERATION: &str = "generation";
pub const ENHANCEMENT: &str = "enhancement";
pub const STORAGE: &str = "storage";

/// How long an issued OAuth `state` stays redeemable.
const OAUTH_STATE_TTL: Duration = Duration::from_secs(600);

// =============================================================================
// REQUESTS AND RESPONSES
// =============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GenerateRequest {
    pub prompt: String,
    /// Style preset id ("1".."8"); blank or absent means none.
    #[serde(default)]
    pub style_id: Option<String>,
    #[serde(default)]
    pub settings: GenerationSettings,
}

#[derive(Debug, Clone, Serialize)]
pub struct GenerateResponse {
    /// Storage URL, or the provider URL when storing failed.
    pub image_url: String,
    pub provider_url: String,
    pub prediction_id: String,
    pub model: String,
    /// Whether a history row was written.
    pub saved: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<GeneratedImage>,
    pub quota: QuotaStatus,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EnhanceRequest {
    pub prompt: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnhanceResponse {
    /// Enhanced prompt, or the original one when enhancement was skipped.
    pub prompt: String,
    pub enhanced: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SignUpRequest {
    pub email: String,
    pub password: String,
    pub username: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SignInRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct GoogleAuthorization {
    pub url: String,
    pub state: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GoogleCallbackRequest {
    pub code: String,
    pub state: String,
}

/// Which providers have usable credentials.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderStatus {
    pub auth: bool,
    pub google: bool,
    pub generation: bool,
    pub enhancement: bool,
    pub storage: bool,
    pub history: bool,
}

// =============================================================================
// SERVICE
// =============================================================================

pub struct StudioService {
    config: Arc<GatewayConfig>,
    ports: StudioPorts,
    quota: DailyQuota,
    breaker: Arc<CircuitBreakerManager>,
    metrics: Arc<GatewayMetrics>,
    oauth_states: DashMap<String, Instant>,
}

impl StudioService {
    pub fn new(
        config: Arc<GatewayConfig>,
        ports: StudioPorts,
        breaker: Arc<CircuitBreakerManager>,
        metrics: Arc<GatewayMetrics>,
    ) -> Self {
        let quota = DailyQuota::new(config.quota.clone(), Arc::clone(&ports.quota_store));
        Self {
            config,
            ports,
            quota,
            breaker,
            metrics,
            oauth_states: DashMap::new(),
        }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn metrics(&self) -> &GatewayMetrics {
        &self.metrics
    }

    /// Periodically drop quota records from earlier days.
    pub fn quota_cleanup(
        &self,
        interval: Duration,
    ) -> impl std::future::Future<Output = ()> + Send + 'static {
        quota::cleanup_task(self.quota.clone(), Arc::clone(&self.ports.clock), interval)
    }

    /// Write the quota ledger out before exit.
    pub async fn flush_quota(&self) {
        let store = Arc::clone(&self.ports.quota_store);
        if let Err(e) = tokio::task::spawn_blocking(move || store.flush()).await {
            warn!(error = %e, "Quota flush task failed");
        }
    }

    pub fn circuits(&self) -> Vec<CircuitStats> {
        self.breaker.stats()
    }

    pub fn provider_status(&self) -> ProviderStatus {
        ProviderStatus {
            auth: self.ports.auth.is_configured(),
            google: self.ports.oauth.is_configured(),
            generation: self.ports.generator.is_configured(),
            enhancement: self.ports.enhancer.is_configured(),
            storage: self.ports.objects.is_configured(),
            history: self.ports.images.is_configured(),
        }
    }

    // -------------------------------------------------------------------------
    // Generation
    // -------------------------------------------------------------------------

    #[instrument(skip_all, fields(user_id = %user.id, style = ?request.style_id))]
    pub async fn generate(&self, user: &User, request: GenerateRequest) -> ApiResult<GenerateResponse> {
        let limits = &self.config.limits;
        prompt::validate_prompt(&request.prompt, limits.max_prompt_chars)?;

        // held until the image is produced; any early return gives it back
        let reservation = match self.quota.reserve(&user.id, self.ports.clock.today()) {
            Ok(reservation) => reservation,
            Err(e) => {
                self.metrics.record_quota_rejection();
                info!("Daily quota exhausted");
                return Err(e);
            }
        };

        let style = styles::resolve(request.style_id.as_deref())?;
        let full_prompt = prompt::apply_style(request.prompt.trim(), style);

        if !self.ports.generator.is_configured() {
            return Err(ApiError::not_configured("Image generation"));
        }

        self.metrics.record_generation_started();
        info!(prompt = %prompt::preview(&full_prompt), "Generating image");
        let settings = request.settings;
        let output = match self
            .guarded(GENERATION, self.ports.generator.generate(&full_prompt, &settings))
            .await
        {
            Ok(output) => output,
            Err(e) => {
                self.metrics.record_generation_failed();
                let e = e.map_provider(reconcile_generation);
                warn!(code = e.kind.code(), error = %e.message, "Generation failed");
                return Err(e);
            }
        };
        self.metrics.record_generation_succeeded();
        info!(prediction_id = %output.prediction_id, "Image generated");
        let today = reservation.day();
        reservation.commit();

        let image_url = self.persist_image(user, &output, &settings).await;
        let row = NewImage::new(
            user.id.clone(),
            request.prompt.trim(),
            image_url.clone(),
            style.map(|s| s.name.as_str()).unwrap_or_default(),
            &settings,
        );
        let image = self.save_row(row).await;
        let quota = self.quota.status(&user.id, today);

        Ok(GenerateResponse {
            image_url,
            provider_url: output.image_url,
            prediction_id: output.prediction_id,
            model: output.model,
            saved: image.is_some(),
            image,
            quota,
        })
    }

    /// Copy the provider image into our bucket; fall back to the provider URL.
    async fn persist_image(
        &self,
        user: &User,
        output: &GenerationOutput,
        settings: &GenerationSettings,
    ) -> String {
        if !self.ports.objects.is_configured() {
            self.metrics.record_storage_fallback();
            return output.image_url.clone();
        }

        let path = storage_path(user, settings, self.ports.clock.now().timestamp_millis());
        let stored = self
            .guarded(STORAGE, async {
                let fetched = self.ports.fetcher.fetch(&output.image_url).await?;
                let content_type = fetched
                    .content_type
                    .unwrap_or_else(|| settings.output_format.mime_type().to_string());
                self.ports
                    .objects
                    .upload(&path, fetched.bytes, &content_type)
                    .await
            })
            .await;

        match stored {
            Ok(()) => {
                debug!(path = %path, "Stored generated image");
                self.ports.objects.public_url(&path)
            }
            Err(e) => {
                warn!(path = %path, error = %e, "Storing image failed, keeping provider URL");
                self.metrics.record_storage_fallback();
                output.image_url.clone()
            }
        }
    }

    /// Insert the history row. A failure is logged and the image is still
    /// returned to the user.
    async fn save_row(&self, row: NewImage) -> Option<GeneratedImage> {
        if !self.ports.images.is_configured() {
            self.metrics.record_save_failure();
            return None;
        }
        match self.ports.images.insert(row).await {
            Ok(image) => Some(image),
            Err(e) => {
                warn!(error = %e, "Saving image to history failed");
                self.metrics.record_save_failure();
                None
            }
        }
    }

    // -------------------------------------------------------------------------
    // Enhancement
    // -------------------------------------------------------------------------

    #[instrument(skip_all)]
    pub async fn enhance(&self, request: EnhanceRequest) -> ApiResult<EnhanceResponse> {
        let original = request.prompt.trim();
        if original.is_empty() {
            return Err(ApiError::invalid_prompt("Please enter a prompt to enhance"));
        }
        prompt::validate_prompt(original, self.config.limits.max_prompt_chars)?;
        let unchanged = || EnhanceResponse {
            prompt: original.to_string(),
            enhanced: false,
        };

        if !self.ports.enhancer.is_configured() {
            debug!("Enhancement not configured, returning prompt unchanged");
            return Ok(unchanged());
        }

        match self
            .guarded(ENHANCEMENT, self.ports.enhancer.enhance(original))
            .await
        {
            Ok(text) if !text.trim().is_empty() => {
                self.metrics.record_enhancement(true);
                Ok(EnhanceResponse {
                    prompt: prompt::truncate_enhanced(text.trim(), self.config.limits.max_prompt_chars),
                    enhanced: true,
                })
            }
            Ok(_) => {
                self.metrics.record_enhancement(false);
                warn!("Enhancer returned empty text, keeping original prompt");
                Ok(unchanged())
            }
            Err(e) => {
                self.metrics.record_enhancement(false);
                warn!(error = %e, "Enhancement failed, keeping original prompt");
                Ok(unchanged())
            }
        }
    }

    // -------------------------------------------------------------------------
    // Galleries and quota
    // -------------------------------------------------------------------------

    pub async fn history(&self, user: &User, page: usize) -> ApiResult<Page<GeneratedImage>> {
        if !self.ports.images.is_configured() {
            return Err(ApiError::not_configured("Image history"));
        }
        let rows = self
            .ports
            .images
            .list_by_user(&user.id)
            .await
            .map_err(reconcile_storage)?;
        Ok(paginate(rows, page, self.config.limits.images_per_page))
    }

    pub async fn explore(&self, page: usize) -> ApiResult<Page<GeneratedImage>> {
        if !self.ports.images.is_configured() {
            return Err(ApiError::not_configured("Image history"));
        }
        let rows = self
            .ports
            .images
            .list_recent(self.config.limits.explore_limit)
            .await
            .map_err(reconcile_storage)?;
        Ok(paginate(rows, page, self.config.limits.images_per_page))
    }

    pub fn quota(&self, user: &User) -> QuotaStatus {
        self.quota.status(&user.id, self.ports.clock.today())
    }

    // -------------------------------------------------------------------------
    // Authentication
    // -------------------------------------------------------------------------

    fn ensure_auth(&self) -> ApiResult<()> {
        if self.ports.auth.is_configured() {
            Ok(())
        } else {
            Err(ApiError::not_configured("Authentication"))
        }
    }

    #[instrument(skip_all, fields(email = %request.email.trim()))]
    pub async fn sign_up(&self, request: SignUpRequest) -> ApiResult<Session> {
        let email = request.email.trim();
        let username = request.username.trim();
        credentials::validate_sign_up(email, &request.password, username)?;
        self.ensure_auth()?;
        let session = self
            .ports
            .auth
            .sign_up(email, &request.password, username)
            .await
            .map_err(reconcile_auth)?;
        info!(user_id = %session.user.id, "Account created");
        Ok(session)
    }

    #[instrument(skip_all, fields(email = %request.email.trim()))]
    pub async fn sign_in(&self, request: SignInRequest) -> ApiResult<Session> {
        let email = request.email.trim();
        credentials::validate_sign_in(email, &request.password)?;
        self.ensure_auth()?;
        self.ports
            .auth
            .sign_in(email, &request.password)
            .await
            .map_err(reconcile_auth)
    }

    pub async fn sign_out(&self, access_token: &str) -> ApiResult<()> {
        self.ensure_auth()?;
        self.ports
            .auth
            .sign_out(access_token)
            .await
            .map_err(reconcile_auth)
    }

    /// Resolve a bearer token to its user.
    pub async fn authenticate(&self, access_token: &str) -> ApiResult<User> {
        self.ensure_auth()?;
        self.ports
            .auth
            .user_for_token(access_token)
            .await
            .map_err(|e| match e {
                ProviderError::Unauthorized(_) => ApiError::unauthenticated(),
                ProviderError::Http { status, .. } if (400..500).contains(&status) && status != 429 => {
                    ApiError::unauthenticated()
                }
                other => reconcile_auth(other),
            })
    }

    pub fn google_authorization_url(&self) -> ApiResult<GoogleAuthorization> {
        if !self.ports.oauth.is_configured() {
            return Err(ApiError::not_configured("Google sign-in"));
        }
        self.prune_oauth_states();
        let state = Uuid::new_v4().simple().to_string();
        let url = self
            .ports
            .oauth
            .authorization_url(&state)
            .map_err(reconcile_auth)?;
        self.oauth_states.insert(state.clone(), Instant::now());
        Ok(GoogleAuthorization { url, state })
    }

    #[instrument(skip_all)]
    pub async fn google_callback(&self, request: GoogleCallbackRequest) -> ApiResult<OAuthIdentity> {
        if !self.ports.oauth.is_configured() {
            return Err(ApiError::not_configured("Google sign-in"));
        }
        if request.code.trim().is_empty() {
            return Err(ApiError::invalid_request("Missing authorization code"));
        }
        let issued = self
            .oauth_states
            .remove(&request.state)
            .map(|(_, issued)| issued)
            .filter(|issued| issued.elapsed() <= OAUTH_STATE_TTL);
        if issued.is_none() {
            warn!("OAuth callback with unknown or expired state");
            return Err(ApiError::invalid_request("Invalid or expired OAuth state"));
        }
        let identity = self
            .ports
            .oauth
            .exchange_code(request.code.trim())
            .await
            .map_err(reconcile_auth)?;
        info!(sub = %identity.sub, "Google sign-in completed");
        Ok(identity)
    }

    fn prune_oauth_states(&self) {
        self.oauth_states
            .retain(|_, issued| issued.elapsed() <= OAUTH_STATE_TTL);
    }

    // -------------------------------------------------------------------------
    // Circuit breaking
    // -------------------------------------------------------------------------

    /// Run a provider call behind its circuit.
    async fn guarded<T>(
        &self,
        circuit: &'static str,
        call: impl std::future::Future<Output = ProviderResult<T>>,
    ) -> Result<T, Guarded> {
        if let Err(wait) = self.breaker.try_acquire(circuit) {
            return Err(Guarded::Open(wait));
        }
        match call.await {
            Ok(value) => {
                self.breaker.record_success(circuit);
                Ok(value)
            }
            Err(e) => {
                if e.is_upstream_fault() {
                    self.breaker.record_failure(circuit);
                } else {
                    self.breaker.record_success(circuit);
                }
                Err(Guarded::Provider(e))
            }
        }
    }
}

/// Outcome of a failed guarded call.
#[derive(Debug)]
enum Guarded {
    Open(Duration),
    Provider(ProviderError),
}

impl Guarded {
    fn map_provider(self, reconcile: impl FnOnce(ProviderError) -> ApiError) -> ApiError {
        match self {
            Guarded::Open(wait) => ApiError::overloaded().with_retry_after(wait.as_millis() as u64),
            Guarded::Provider(e) => reconcile(e),
        }
    }
}

impl std::fmt::Display for Guarded {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Guarded::Open(wait) => write!(f, "circuit open for {}ms", wait.as_millis()),
            Guarded::Provider(e) => e.fmt(f),
        }
    }
}

/// `{user_id}/{millis}-{random}.{ext}`
fn storage_path(user: &User, settings: &GenerationSettings, millis: i64) -> String {
    let random = Uuid::new_v4().simple().to_string();
    format!(
        "{}/{}-{}.{}",
        user.id,
        millis,
        &random[..8],
        settings.output_format.extension()
    )
}
