/// Access grant endpoints
use super::{required, success};
use crate::{context::AppContext, error::AppResult, sharing::AccessGrant};
use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

/// Build access grant routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/api/child-access", post(grant_access))
        .route("/api/child-access/:child_id", get(list_access))
}

/// Grant request sent after a successful code lookup
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GrantAccessRequest {
    child_id: Option<String>,
    user_id: Option<String>,
    is_read_only: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListAccessQuery {
    owner_id: Option<String>,
}

/// Create or update the grant for (child, user)
async fn grant_access(
    State(ctx): State<AppContext>,
    Json(req): Json<GrantAccessRequest>,
) -> AppResult<Json<serde_json::Value>> {
    let child_id = required(req.child_id, "childId")?;
    let user_id = required(req.user_id, "userId")?;
    // Missing mode means the narrower one
    let read_only = req.is_read_only.unwrap_or(true);

    ctx.redemption
        .grant_access(&child_id, &user_id, read_only)
        .await?;

    Ok(success())
}

/// Everyone the owner has shared a child with
async fn list_access(
    State(ctx): State<AppContext>,
    Path(child_id): Path<String>,
    Query(query): Query<ListAccessQuery>,
) -> AppResult<Json<Vec<AccessGrant>>> {
    let owner_id = required(query.owner_id, "ownerId")?;

    ctx.visibility.require_owner(&child_id, &owner_id).await?;
    let grants = ctx.grants.list_grants_for_child(&child_id).await?;

    Ok(Json(grants))
}
