/// Child profile endpoints
use super::{required, success};
use crate::{
    children::{parse_birth_date, ChildUpdate, ChildView, NewChild, Sex},
    context::AppContext,
    error::{AppError, AppResult},
};
use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;

/// Build child routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/api/children", get(list_children).post(create_child))
        .route(
            "/api/children/:id",
            get(get_child).put(update_child).delete(delete_child),
        )
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserQuery {
    user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateChildRequest {
    user_id: Option<String>,
    name: Option<String>,
    birth_date: Option<String>,
    sex: Option<String>,
    avatar_index: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateChildRequest {
    user_id: Option<String>,
    name: Option<String>,
    birth_date: Option<String>,
    sex: Option<String>,
    avatar_index: Option<i64>,
}

/// Every child the caller owns or was granted, with sharing flags
async fn list_children(
    State(ctx): State<AppContext>,
    Query(query): Query<UserQuery>,
) -> AppResult<Json<Vec<ChildView>>> {
    let user_id = required(query.user_id, "userId")?;

    let children = ctx.visibility.list_accessible_children(&user_id).await?;

    Ok(Json(children))
}

async fn create_child(
    State(ctx): State<AppContext>,
    Json(req): Json<CreateChildRequest>,
) -> AppResult<Json<ChildView>> {
    let user_id = required(req.user_id, "userId")?;
    let new = NewChild {
        name: required(req.name, "name")?,
        birth_date: parse_birth_date(&required(req.birth_date, "birthDate")?)?,
        sex: Sex::from_str(&required(req.sex, "sex")?)?,
        avatar_index: req.avatar_index.unwrap_or(0),
    };

    let child = ctx.children.create(&user_id, new).await?;

    Ok(Json(ChildView {
        child,
        is_shared: false,
        is_read_only: false,
    }))
}

async fn get_child(
    State(ctx): State<AppContext>,
    Path(child_id): Path<String>,
    Query(query): Query<UserQuery>,
) -> AppResult<Json<ChildView>> {
    let user_id = required(query.user_id, "userId")?;

    let view = ctx.visibility.require_read(&child_id, &user_id).await?;

    Ok(Json(view))
}

/// Profile edits need write access; owners and read/write grantees qualify
async fn update_child(
    State(ctx): State<AppContext>,
    Path(child_id): Path<String>,
    Json(req): Json<UpdateChildRequest>,
) -> AppResult<Json<ChildView>> {
    let user_id = required(req.user_id, "userId")?;
    let update = ChildUpdate {
        name: req.name,
        birth_date: req.birth_date.as_deref().map(parse_birth_date).transpose()?,
        sex: req.sex.as_deref().map(Sex::from_str).transpose()?,
        avatar_index: req.avatar_index,
    };

    let before = ctx.visibility.require_write(&child_id, &user_id).await?;
    let child = ctx.children.update(&child_id, update).await?;

    Ok(Json(ChildView { child, ..before }))
}

async fn delete_child(
    State(ctx): State<AppContext>,
    Path(child_id): Path<String>,
    Query(query): Query<UserQuery>,
) -> AppResult<Json<serde_json::Value>> {
    let user_id = required(query.user_id, "userId")?;

    ctx.visibility
        .require_owner(&child_id, &user_id)
        .await
        .map_err(|e| match e {
            AppError::Forbidden(_) => {
                AppError::Forbidden("Only the owner can delete a child".to_string())
            }
            other => other,
        })?;
    ctx.children.delete(&child_id).await?;

    Ok(success())
}
