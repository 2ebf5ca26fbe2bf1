/// Medical record endpoints, one collection per record kind
use super::{required, success};
use crate::{
    children::parse_birth_date,
    context::AppContext,
    error::{AppError, AppResult},
    records::{MedicalRecord, NewRecord, RecordKind, RecordUpdate},
};
use axum::{
    extract::{Path, Query, State},
    routing::{get, put},
    Json, Router,
};
use chrono::NaiveDate;
use serde::Deserialize;

/// Build record routes for every kind (`/api/visits`, `/api/vaccines`, ...)
pub fn routes() -> Router<AppContext> {
    RecordKind::ALL
        .into_iter()
        .fold(Router::new(), |router, kind| router.merge(kind_routes(kind)))
}

fn kind_routes(kind: RecordKind) -> Router<AppContext> {
    let collection = format!("/api/{}", kind.collection());
    let item = format!("/api/{}/:id", kind.collection());

    Router::new()
        .route(
            &collection,
            get(move |State(ctx): State<AppContext>, Query(query): Query<ListRecordsQuery>| {
                list_records(ctx, kind, query)
            })
            .post(move |State(ctx): State<AppContext>, Json(req): Json<CreateRecordRequest>| {
                create_record(ctx, kind, req)
            }),
        )
        .route(
            &item,
            put(
                move |State(ctx): State<AppContext>,
                      Path(id): Path<String>,
                      Json(req): Json<UpdateRecordRequest>| {
                    update_record(ctx, kind, id, req)
                },
            )
            .delete(
                move |State(ctx): State<AppContext>,
                      Path(id): Path<String>,
                      Query(query): Query<UserQuery>| {
                    delete_record(ctx, kind, id, query)
                },
            ),
        )
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListRecordsQuery {
    child_id: Option<String>,
    user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserQuery {
    user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateRecordRequest {
    user_id: Option<String>,
    child_id: Option<String>,
    title: Option<String>,
    occurred_on: Option<String>,
    notes: Option<String>,
    details: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateRecordRequest {
    user_id: Option<String>,
    title: Option<String>,
    occurred_on: Option<String>,
    notes: Option<String>,
    details: Option<serde_json::Value>,
}

fn parse_occurred_on(raw: Option<String>) -> AppResult<Option<NaiveDate>> {
    raw.as_deref()
        .map(|d| {
            parse_birth_date(d).map_err(|_| {
                AppError::Validation(format!("occurredOn must be YYYY-MM-DD, got {}", d))
            })
        })
        .transpose()
}

async fn list_records(
    ctx: AppContext,
    kind: RecordKind,
    query: ListRecordsQuery,
) -> AppResult<Json<Vec<MedicalRecord>>> {
    let child_id = required(query.child_id, "childId")?;
    let user_id = required(query.user_id, "userId")?;

    let records = ctx.records.list(&user_id, &child_id, kind).await?;

    Ok(Json(records))
}

async fn create_record(
    ctx: AppContext,
    kind: RecordKind,
    req: CreateRecordRequest,
) -> AppResult<Json<MedicalRecord>> {
    let user_id = required(req.user_id, "userId")?;
    let child_id = required(req.child_id, "childId")?;
    let new = NewRecord {
        title: required(req.title, "title")?,
        occurred_on: parse_occurred_on(req.occurred_on)?,
        notes: req.notes,
        details: req.details,
    };

    let record = ctx.records.create(&user_id, &child_id, kind, new).await?;

    Ok(Json(record))
}

async fn update_record(
    ctx: AppContext,
    kind: RecordKind,
    record_id: String,
    req: UpdateRecordRequest,
) -> AppResult<Json<MedicalRecord>> {
    let user_id = required(req.user_id, "userId")?;
    let update = RecordUpdate {
        title: req.title,
        occurred_on: parse_occurred_on(req.occurred_on)?,
        notes: req.notes,
        details: req.details,
    };

    let record = ctx.records.update(&user_id, kind, &record_id, update).await?;

    Ok(Json(record))
}

async fn delete_record(
    ctx: AppContext,
    kind: RecordKind,
    record_id: String,
    query: UserQuery,
) -> AppResult<Json<serde_json::Value>> {
    let user_id = required(query.user_id, "userId")?;

    ctx.records.delete(&user_id, kind, &record_id).await?;

    Ok(success())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_occurred_on() {
        assert_eq!(parse_occurred_on(None).unwrap(), None);
        assert_eq!(
            parse_occurred_on(Some("2024-05-06".to_string())).unwrap(),
            NaiveDate::from_ymd_opt(2024, 5, 6)
        );
        match parse_occurred_on(Some("yesterday".to_string())) {
            Err(AppError::Validation(msg)) => assert!(msg.contains("occurredOn")),
            other => panic!("expected validation error, got {:?}", other),
        }
    }
}
