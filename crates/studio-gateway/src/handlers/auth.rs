//! Account endpoints, passed through to the auth provider.

use axum::{extract::State, http::StatusCode, Json};
use shared_types::User;

use super::{ApiJson, AuthenticatedUser};
use crate::domain::ApiResult;
use crate::ports::{OAuthIdentity, Session};
use crate::router::AppState;
use crate::studio::{GoogleAuthorization, GoogleCallbackRequest, SignInRequest, SignUpRequest};

pub async fn sign_up(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<SignUpRequest>,
) -> ApiResult<(StatusCode, Json<Session>)> {
    let session = state.studio.sign_up(request).await?;
    Ok((StatusCode::CREATED, Json(session)))
}

pub async fn sign_in(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<SignInRequest>,
) -> ApiResult<Json<Session>> {
    Ok(Json(state.studio.sign_in(request).await?))
}

pub async fn sign_out(State(state): State<AppState>, caller: AuthenticatedUser) -> ApiResult<StatusCode> {
    state.studio.sign_out(&caller.access_token).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn me(caller: AuthenticatedUser) -> Json<User> {
    Json(caller.user)
}

pub async fn google_url(State(state): State<AppState>) -> ApiResult<Json<GoogleAuthorization>> {
    Ok(Json(state.studio.google_authorization_url()?))
}

pub async fn google_callback(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<GoogleCallbackRequest>,
) -> ApiResult<Json<OAuthIdentity>> {
    Ok(Json(state.studio.google_callback(request).await?))
}
