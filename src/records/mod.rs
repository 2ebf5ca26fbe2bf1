/// Child-scoped medical records
///
/// Visits, vaccines, appointments, allergies and diseases share one table
/// and one manager. Every operation takes the acting user and checks it
/// against the visibility resolver before touching storage.

use crate::{
    db::{format_timestamp, now, parse_timestamp},
    error::{AppError, AppResult},
    sharing::VisibilityResolver,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    Visit,
    Vaccine,
    Appointment,
    Allergy,
    Disease,
}

impl RecordKind {
    pub const ALL: [RecordKind; 5] = [
        RecordKind::Visit,
        RecordKind::Vaccine,
        RecordKind::Appointment,
        RecordKind::Allergy,
        RecordKind::Disease,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::Visit => "visit",
            RecordKind::Vaccine => "vaccine",
            RecordKind::Appointment => "appointment",
            RecordKind::Allergy => "allergy",
            RecordKind::Disease => "disease",
        }
    }

    /// Collection name used in API paths
    pub fn collection(&self) -> &'static str {
        match self {
            RecordKind::Visit => "visits",
            RecordKind::Vaccine => "vaccines",
            RecordKind::Appointment => "appointments",
            RecordKind::Allergy => "allergies",
            RecordKind::Disease => "diseases",
        }
    }

    pub fn from_str(s: &str) -> AppResult<Self> {
        RecordKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| AppError::Validation(format!("Invalid record kind: {}", s)))
    }
}

/// Medical record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MedicalRecord {
    pub id: String,
    pub child_id: String,
    pub kind: RecordKind,
    pub title: String,
    pub occurred_on: Option<NaiveDate>,
    pub notes: Option<String>,
    pub details: serde_json::Value,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewRecord {
    pub title: String,
    pub occurred_on: Option<NaiveDate>,
    pub notes: Option<String>,
    pub details: Option<serde_json::Value>,
}

/// Partial update; `None` keeps the stored value
#[derive(Debug, Clone, Default)]
pub struct RecordUpdate {
    pub title: Option<String>,
    pub occurred_on: Option<NaiveDate>,
    pub notes: Option<String>,
    pub details: Option<serde_json::Value>,
}

const RECORD_COLUMNS: &str =
    "id, child_id, kind, title, occurred_on, notes, details, created_by, created_at, updated_at";

fn record_from_row(row: &SqliteRow) -> AppResult<MedicalRecord> {
    let kind: String = row.get("kind");
    let occurred_on: Option<String> = row.get("occurred_on");
    let details: String = row.get("details");
    let created_at: String = row.get("created_at");
    let updated_at: String = row.get("updated_at");

    Ok(MedicalRecord {
        id: row.get("id"),
        child_id: row.get("child_id"),
        kind: RecordKind::from_str(&kind)?,
        title: row.get("title"),
        occurred_on: occurred_on
            .map(|d| NaiveDate::parse_from_str(&d, "%Y-%m-%d"))
            .transpose()
            .map_err(|e| AppError::Internal(format!("Invalid stored date: {}", e)))?,
        notes: row.get("notes"),
        details: serde_json::from_str(&details)
            .map_err(|e| AppError::Internal(format!("Invalid stored details: {}", e)))?,
        created_by: row.get("created_by"),
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
    })
}

fn validate_details(details: &serde_json::Value) -> AppResult<()> {
    if !details.is_object() {
        return Err(AppError::Validation("details must be a JSON object".to_string()));
    }
    Ok(())
}

fn record_not_found(kind: RecordKind) -> AppError {
    AppError::NotFound(format!("{} not found", kind.as_str()))
}

/// Record manager
#[derive(Clone)]
pub struct RecordManager {
    db: SqlitePool,
    visibility: VisibilityResolver,
}

impl RecordManager {
    pub fn new(db: SqlitePool, visibility: VisibilityResolver) -> Self {
        Self { db, visibility }
    }

    /// Records of one kind for a child, newest occurrence first
    pub async fn list(
        &self,
        user_id: &str,
        child_id: &str,
        kind: RecordKind,
    ) -> AppResult<Vec<MedicalRecord>> {
        self.visibility.require_read(child_id, user_id).await?;

        let rows = sqlx::query(&format!(
            "SELECT {} FROM medical_record WHERE child_id = ? AND kind = ? ORDER BY occurred_on DESC, created_at DESC, id ASC",
            RECORD_COLUMNS
        ))
        .bind(child_id)
        .bind(kind.as_str())
        .fetch_all(&self.db)
        .await?;

        rows.iter().map(record_from_row).collect()
    }

    pub async fn create(
        &self,
        user_id: &str,
        child_id: &str,
        kind: RecordKind,
        new: NewRecord,
    ) -> AppResult<MedicalRecord> {
        if new.title.trim().is_empty() {
            return Err(AppError::missing_field("title"));
        }
        let details = new.details.unwrap_or_else(|| serde_json::json!({}));
        validate_details(&details)?;

        self.visibility.require_write(child_id, user_id).await?;

        let created = now();
        let record = MedicalRecord {
            id: Uuid::new_v4().to_string(),
            child_id: child_id.to_string(),
            kind,
            title: new.title.trim().to_string(),
            occurred_on: new.occurred_on,
            notes: new.notes,
            details,
            created_by: user_id.to_string(),
            created_at: created,
            updated_at: created,
        };

        sqlx::query(
            r#"
            INSERT INTO medical_record (id, child_id, kind, title, occurred_on, notes, details, created_by, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.id)
        .bind(&record.child_id)
        .bind(kind.as_str())
        .bind(&record.title)
        .bind(record.occurred_on.map(|d| d.format("%Y-%m-%d").to_string()))
        .bind(&record.notes)
        .bind(record.details.to_string())
        .bind(&record.created_by)
        .bind(format_timestamp(&record.created_at))
        .bind(format_timestamp(&record.updated_at))
        .execute(&self.db)
        .await?;

        tracing::info!(child_id = %child_id, kind = kind.as_str(), record_id = %record.id, "record created");
        Ok(record)
    }

    async fn get(&self, kind: RecordKind, record_id: &str) -> AppResult<MedicalRecord> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM medical_record WHERE id = ? AND kind = ?",
            RECORD_COLUMNS
        ))
        .bind(record_id)
        .bind(kind.as_str())
        .fetch_optional(&self.db)
        .await?;

        row.as_ref()
            .map(record_from_row)
            .transpose()?
            .ok_or_else(|| record_not_found(kind))
    }

    pub async fn update(
        &self,
        user_id: &str,
        kind: RecordKind,
        record_id: &str,
        update: RecordUpdate,
    ) -> AppResult<MedicalRecord> {
        let mut record = self.get(kind, record_id).await?;
        self.write_gate(user_id, &record).await?;

        if let Some(title) = update.title {
            if title.trim().is_empty() {
                return Err(AppError::missing_field("title"));
            }
            record.title = title.trim().to_string();
        }
        if let Some(occurred_on) = update.occurred_on {
            record.occurred_on = Some(occurred_on);
        }
        if let Some(notes) = update.notes {
            record.notes = Some(notes);
        }
        if let Some(details) = update.details {
            validate_details(&details)?;
            record.details = details;
        }
        record.updated_at = now();

        sqlx::query(
            r#"
            UPDATE medical_record
            SET title = ?, occurred_on = ?, notes = ?, details = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&record.title)
        .bind(record.occurred_on.map(|d| d.format("%Y-%m-%d").to_string()))
        .bind(&record.notes)
        .bind(record.details.to_string())
        .bind(format_timestamp(&record.updated_at))
        .bind(record_id)
        .execute(&self.db)
        .await?;

        Ok(record)
    }

    pub async fn delete(&self, user_id: &str, kind: RecordKind, record_id: &str) -> AppResult<()> {
        let record = self.get(kind, record_id).await?;
        self.write_gate(user_id, &record).await?;

        sqlx::query("DELETE FROM medical_record WHERE id = ?")
            .bind(record_id)
            .execute(&self.db)
            .await?;

        tracing::info!(record_id = %record_id, kind = kind.as_str(), "record deleted");
        Ok(())
    }

    /// Write check for an existing record; hidden children hide their records too
    async fn write_gate(&self, user_id: &str, record: &MedicalRecord) -> AppResult<()> {
        match self.visibility.require_write(&record.child_id, user_id).await {
            Ok(_) => Ok(()),
            Err(AppError::NotFound(_)) => Err(record_not_found(record.kind)),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        children::{ChildManager, NewChild, Sex},
        db::connect_in_memory,
        sharing::AccessGrantManager,
    };

    struct Fixture {
        records: RecordManager,
        grants: AccessGrantManager,
        child_id: String,
    }

    async fn setup() -> Fixture {
        let db = connect_in_memory().await.unwrap();
        let children = ChildManager::new(db.clone());
        let grants = AccessGrantManager::new(db.clone());
        let visibility = VisibilityResolver::new(db.clone(), children.clone(), grants.clone());
        let child = children
            .create(
                "owner",
                NewChild {
                    name: "Theo".to_string(),
                    birth_date: NaiveDate::from_ymd_opt(2022, 6, 30).unwrap(),
                    sex: Sex::Male,
                    avatar_index: 0,
                },
            )
            .await
            .unwrap();

        Fixture {
            records: RecordManager::new(db, visibility),
            grants,
            child_id: child.id,
        }
    }

    fn vaccine() -> NewRecord {
        NewRecord {
            title: "MMR".to_string(),
            occurred_on: NaiveDate::from_ymd_opt(2023, 7, 1),
            notes: None,
            details: Some(serde_json::json!({ "dose": 1 })),
        }
    }

    #[test]
    fn test_record_kind_round_trip() {
        for kind in RecordKind::ALL {
            assert_eq!(RecordKind::from_str(kind.as_str()).unwrap(), kind);
        }
        assert_eq!(RecordKind::Allergy.collection(), "allergies");
        assert!(RecordKind::from_str("doctor").is_err());
    }

    #[tokio::test]
    async fn test_owner_creates_and_lists_by_kind() {
        let f = setup().await;

        let created = f
            .records
            .create("owner", &f.child_id, RecordKind::Vaccine, vaccine())
            .await
            .unwrap();
        assert_eq!(created.details["dose"], 1);

        let vaccines = f.records.list("owner", &f.child_id, RecordKind::Vaccine).await.unwrap();
        assert_eq!(vaccines, vec![created]);
        assert!(f
            .records
            .list("owner", &f.child_id, RecordKind::Visit)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_read_only_grantee_can_read_but_not_write() {
        let f = setup().await;
        let record = f
            .records
            .create("owner", &f.child_id, RecordKind::Vaccine, vaccine())
            .await
            .unwrap();
        f.grants.grant(&f.child_id, "viewer", true).await.unwrap();

        assert_eq!(
            f.records.list("viewer", &f.child_id, RecordKind::Vaccine).await.unwrap().len(),
            1
        );
        assert!(matches!(
            f.records.create("viewer", &f.child_id, RecordKind::Vaccine, vaccine()).await,
            Err(AppError::Forbidden(_))
        ));
        assert!(matches!(
            f.records.delete("viewer", RecordKind::Vaccine, &record.id).await,
            Err(AppError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn test_read_write_grantee_can_update() {
        let f = setup().await;
        let record = f
            .records
            .create("owner", &f.child_id, RecordKind::Allergy, vaccine())
            .await
            .unwrap();
        f.grants.grant(&f.child_id, "editor", false).await.unwrap();

        let updated = f
            .records
            .update(
                "editor",
                RecordKind::Allergy,
                &record.id,
                RecordUpdate {
                    title: Some("Peanuts".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.title, "Peanuts");
        assert_eq!(updated.created_by, "owner");
    }

    #[tokio::test]
    async fn test_stranger_sees_nothing() {
        let f = setup().await;
        let record = f
            .records
            .create("owner", &f.child_id, RecordKind::Disease, vaccine())
            .await
            .unwrap();

        assert!(matches!(
            f.records.list("stranger", &f.child_id, RecordKind::Disease).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            f.records.delete("stranger", RecordKind::Disease, &record.id).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_kind_mismatch_is_not_found() {
        let f = setup().await;
        let record = f
            .records
            .create("owner", &f.child_id, RecordKind::Visit, vaccine())
            .await
            .unwrap();

        assert!(matches!(
            f.records.delete("owner", RecordKind::Vaccine, &record.id).await,
            Err(AppError::NotFound(_))
        ));
        f.records.delete("owner", RecordKind::Visit, &record.id).await.unwrap();
    }

    #[tokio::test]
    async fn test_create_validates_input() {
        let f = setup().await;

        let mut blank = vaccine();
        blank.title = " ".to_string();
        assert!(matches!(
            f.records.create("owner", &f.child_id, RecordKind::Visit, blank).await,
            Err(AppError::Validation(_))
        ));

        let mut bad_details = vaccine();
        bad_details.details = Some(serde_json::json!([1, 2]));
        assert!(matches!(
            f.records.create("owner", &f.child_id, RecordKind::Visit, bad_details).await,
            Err(AppError::Validation(_))
        ));
    }
}
