/// Share code endpoints
use super::{required, required_flag, success};
use crate::{
    children::{parse_birth_date, validate_avatar, ChildSnapshot, ChildView, Sex},
    context::AppContext,
    error::AppResult,
    sharing::{redeem::code_not_found, ShareCode},
};
use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

/// Build share code routes
///
/// `:id` is a code on lookup and redemption, and a child ID on update and
/// revocation; the router needs one parameter name per segment.
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/api/share-codes", post(create_share_code))
        .route("/api/share-codes/child/:child_id", get(get_child_share_code))
        .route(
            "/api/share-codes/:id",
            get(get_share_code)
                .patch(update_share_code)
                .delete(revoke_share_code),
        )
        .route("/api/share-codes/:id/redeem", post(redeem_share_code))
}

/// Request to mint (or fetch) the share code for a child
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateShareCodeRequest {
    child_id: Option<String>,
    owner_id: Option<String>,
    child_name: Option<String>,
    child_birth_date: Option<String>,
    child_sex: Option<String>,
    child_avatar_index: Option<i64>,
    is_read_only: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OwnerQuery {
    owner_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateShareCodeRequest {
    owner_id: Option<String>,
    is_read_only: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RevokeShareCodeRequest {
    owner_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RedeemRequest {
    user_id: Option<String>,
}

/// Snapshot fields sent by the client win over the stored profile
fn merge_snapshot(stored: ChildSnapshot, req: &CreateShareCodeRequest) -> AppResult<ChildSnapshot> {
    let name = match &req.child_name {
        Some(name) if !name.trim().is_empty() => name.trim().to_string(),
        _ => stored.name,
    };
    let birth_date = match &req.child_birth_date {
        Some(raw) => parse_birth_date(raw)?,
        None => stored.birth_date,
    };
    let sex = match &req.child_sex {
        Some(raw) => Sex::from_str(raw)?,
        None => stored.sex,
    };
    let avatar_index = req.child_avatar_index.unwrap_or(stored.avatar_index);
    validate_avatar(avatar_index)?;

    Ok(ChildSnapshot {
        name,
        birth_date,
        sex,
        avatar_index,
    })
}

/// Mint a share code, or return the one the owner already has
async fn create_share_code(
    State(ctx): State<AppContext>,
    Json(req): Json<CreateShareCodeRequest>,
) -> AppResult<Json<ShareCode>> {
    let child_id = required(req.child_id.clone(), "childId")?;
    let owner_id = required(req.owner_id.clone(), "ownerId")?;
    let read_only = req.is_read_only.unwrap_or(true);

    let child = ctx.visibility.require_owner(&child_id, &owner_id).await?;
    let snapshot = merge_snapshot(child.snapshot(), &req)?;

    let share = ctx
        .share_codes
        .mint(&child_id, &owner_id, &snapshot, read_only)
        .await?;

    Ok(Json(share))
}

/// Look up a code before redeeming it
async fn get_share_code(
    State(ctx): State<AppContext>,
    Path(code): Path<String>,
) -> AppResult<Json<ShareCode>> {
    tracing::debug!("share code lookup");

    ctx.share_codes
        .find_by_code(&code)
        .await?
        .map(Json)
        .ok_or_else(code_not_found)
}

/// The owner's current code for a child
async fn get_child_share_code(
    State(ctx): State<AppContext>,
    Path(child_id): Path<String>,
    Query(query): Query<OwnerQuery>,
) -> AppResult<Json<ShareCode>> {
    let owner_id = required(query.owner_id, "ownerId")?;

    ctx.share_codes
        .find_by_child_and_owner(&child_id, &owner_id)
        .await?
        .map(Json)
        .ok_or_else(code_not_found)
}

/// Toggle the mode future redemptions receive
async fn update_share_code(
    State(ctx): State<AppContext>,
    Path(child_id): Path<String>,
    Json(req): Json<UpdateShareCodeRequest>,
) -> AppResult<Json<ShareCode>> {
    let owner_id = required(req.owner_id, "ownerId")?;
    let read_only = required_flag(req.is_read_only, "isReadOnly")?;

    let share = ctx
        .share_codes
        .set_read_only(&child_id, &owner_id, read_only)
        .await?;

    Ok(Json(share))
}

/// Revoke the code for a child. Succeeds whether or not a code existed.
async fn revoke_share_code(
    State(ctx): State<AppContext>,
    Path(child_id): Path<String>,
    Query(query): Query<OwnerQuery>,
    body: Option<Json<RevokeShareCodeRequest>>,
) -> AppResult<Json<serde_json::Value>> {
    let from_body = body.and_then(|Json(req)| req.owner_id);
    let owner_id = required(query.owner_id.or(from_body), "ownerId")?;

    ctx.share_codes.revoke(&child_id, &owner_id).await?;

    Ok(success())
}

/// Look up a code and grant its mode to the caller in one step
async fn redeem_share_code(
    State(ctx): State<AppContext>,
    Path(code): Path<String>,
    Json(req): Json<RedeemRequest>,
) -> AppResult<Json<ChildView>> {
    let user_id = required(req.user_id, "userId")?;

    let view = ctx.redemption.redeem(&code, &user_id).await?;

    Ok(Json(view))
}
