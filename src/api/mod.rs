/// API routes and handlers
pub mod child_access;
pub mod children;
pub mod health;
pub mod records;
pub mod share_codes;

use crate::{
    context::AppContext,
    error::{AppError, AppResult},
};
use axum::{Json, Router};
use serde_json::json;

/// Build API routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .merge(health::routes())
        .merge(share_codes::routes())
        .merge(child_access::routes())
        .merge(children::routes())
        .merge(records::routes())
}

/// Unwrap a required string field, treating blank values as missing
pub(crate) fn required(value: Option<String>, field: &str) -> AppResult<String> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(AppError::missing_field(field)),
    }
}

pub(crate) fn required_flag(value: Option<bool>, field: &str) -> AppResult<bool> {
    value.ok_or_else(|| AppError::missing_field(field))
}

/// `{ "success": true }`
pub(crate) fn success() -> Json<serde_json::Value> {
    Json(json!({ "success": true }))
}
