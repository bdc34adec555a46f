//! HTTP handlers and the extractors they share.

pub mod auth;
pub mod gallery;
pub mod generate;
pub mod meta;

use axum::{
    async_trait,
    extract::{FromRequest, FromRequestParts, Request},
    http::request::Parts,
    Json,
};
use serde::de::DeserializeOwned;
use shared_types::User;

use crate::domain::ApiError;
use crate::middleware::bearer_token;
use crate::router::AppState;

/// JSON body whose rejections use the studio error shape.
pub struct ApiJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(ApiJson(value)),
            Err(rejection) => Err(ApiError::invalid_request(rejection.body_text())),
        }
    }
}

/// The caller behind a valid bearer token.
pub struct AuthenticatedUser {
    pub user: User,
    pub access_token: String,
}

#[async_trait]
impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers).ok_or_else(ApiError::unauthenticated)?;
        let user = state.studio.authenticate(token).await?;
        Ok(Self {
            user,
            access_token: token.to_string(),
        })
    }
}

/// Lenient `?page=` parsing: anything that is not a positive number is page 1.
pub(crate) fn page_number(raw: Option<&str>) -> usize {
    raw.and_then(|p| p.trim().parse::<usize>().ok())
        .filter(|p| *p >= 1)
        .unwrap_or(1)
}
