use axum::{extract::State, Json};

use super::{ApiJson, AuthenticatedUser};
use crate::domain::ApiResult;
use crate::router::AppState;
use crate::studio::{EnhanceRequest, EnhanceResponse, GenerateRequest, GenerateResponse};

pub async fn generate(
    State(state): State<AppState>,
    caller: AuthenticatedUser,
    ApiJson(request): ApiJson<GenerateRequest>,
) -> ApiResult<Json<GenerateResponse>> {
    Ok(Json(state.studio.generate(&caller.user, request).await?))
}

pub async fn enhance(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<EnhanceRequest>,
) -> ApiResult<Json<EnhanceResponse>> {
    Ok(Json(state.studio.enhance(request).await?))
}
