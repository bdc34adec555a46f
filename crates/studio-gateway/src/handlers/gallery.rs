//! Personal history, the explore gallery, and quota status.

use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;
use shared_types::{GeneratedImage, Page, QuotaStatus};

use super::{page_number, AuthenticatedUser};
use crate::domain::ApiResult;
use crate::router::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    #[serde(default)]
    pub page: Option<String>,
}

pub async fn history(
    State(state): State<AppState>,
    caller: AuthenticatedUser,
    Query(query): Query<PageQuery>,
) -> ApiResult<Json<Page<GeneratedImage>>> {
    let page = page_number(query.page.as_deref());
    Ok(Json(state.studio.history(&caller.user, page).await?))
}

pub async fn explore(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> ApiResult<Json<Page<GeneratedImage>>> {
    let page = page_number(query.page.as_deref());
    Ok(Json(state.studio.explore(page).await?))
}

pub async fn quota(State(state): State<AppState>, caller: AuthenticatedUser) -> Json<QuotaStatus> {
    Json(state.studio.quota(&caller.user))
}
