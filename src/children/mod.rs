/// Child profiles
///
/// A child is owned by the user who created it. Ownership never transfers;
/// other users only ever see a child through an access grant.

use crate::{
    db::{format_timestamp, now, parse_timestamp},
    error::{AppError, AppResult},
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sex {
    Male,
    Female,
}

impl Sex {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sex::Male => "male",
            Sex::Female => "female",
        }
    }

    pub fn from_str(s: &str) -> AppResult<Self> {
        match s.to_lowercase().as_str() {
            "male" => Ok(Sex::Male),
            "female" => Ok(Sex::Female),
            _ => Err(AppError::Validation(format!("Invalid sex: {}", s))),
        }
    }
}

/// Child record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Child {
    pub id: String,
    pub name: String,
    pub birth_date: NaiveDate,
    pub sex: Sex,
    pub avatar_index: i64,
    pub owner_id: String,
    pub created_at: DateTime<Utc>,
}

impl Child {
    /// Fields copied onto a share code at mint time
    pub fn snapshot(&self) -> ChildSnapshot {
        ChildSnapshot {
            name: self.name.clone(),
            birth_date: self.birth_date,
            sex: self.sex,
            avatar_index: self.avatar_index,
        }
    }
}

/// Denormalized child fields carried by a share code
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChildSnapshot {
    pub name: String,
    pub birth_date: NaiveDate,
    pub sex: Sex,
    pub avatar_index: i64,
}

/// Child as returned to a specific caller
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChildView {
    #[serde(flatten)]
    pub child: Child,
    pub is_shared: bool,
    pub is_read_only: bool,
}

/// Fields for a new child
#[derive(Debug, Clone)]
pub struct NewChild {
    pub name: String,
    pub birth_date: NaiveDate,
    pub sex: Sex,
    pub avatar_index: i64,
}

/// Partial profile update; `None` keeps the stored value
#[derive(Debug, Clone, Default)]
pub struct ChildUpdate {
    pub name: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub sex: Option<Sex>,
    pub avatar_index: Option<i64>,
}

pub fn parse_birth_date(raw: &str) -> AppResult<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| AppError::Validation(format!("birthDate must be YYYY-MM-DD, got {}", raw)))
}

pub(crate) const CHILD_COLUMNS: &str =
    "c.id, c.name, c.birth_date, c.sex, c.avatar_index, c.owner_id, c.created_at";

pub(crate) fn child_from_row(row: &SqliteRow) -> AppResult<Child> {
    let birth_date: String = row.get("birth_date");
    let sex: String = row.get("sex");
    let created_at: String = row.get("created_at");

    Ok(Child {
        id: row.get("id"),
        name: row.get("name"),
        birth_date: NaiveDate::parse_from_str(&birth_date, "%Y-%m-%d")
            .map_err(|e| AppError::Internal(format!("Invalid stored birth date: {}", e)))?,
        sex: Sex::from_str(&sex)?,
        avatar_index: row.get("avatar_index"),
        owner_id: row.get("owner_id"),
        created_at: parse_timestamp(&created_at)?,
    })
}

/// Child manager
#[derive(Clone)]
pub struct ChildManager {
    db: SqlitePool,
}

impl ChildManager {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Create a child owned by `owner_id`
    pub async fn create(&self, owner_id: &str, new: NewChild) -> AppResult<Child> {
        validate_name(&new.name)?;
        validate_avatar(new.avatar_index)?;

        let child = Child {
            id: Uuid::new_v4().to_string(),
            name: new.name.trim().to_string(),
            birth_date: new.birth_date,
            sex: new.sex,
            avatar_index: new.avatar_index,
            owner_id: owner_id.to_string(),
            created_at: now(),
        };

        sqlx::query(
            r#"
            INSERT INTO child (id, name, birth_date, sex, avatar_index, owner_id, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&child.id)
        .bind(&child.name)
        .bind(child.birth_date.format("%Y-%m-%d").to_string())
        .bind(child.sex.as_str())
        .bind(child.avatar_index)
        .bind(&child.owner_id)
        .bind(format_timestamp(&child.created_at))
        .execute(&self.db)
        .await?;

        tracing::info!(child_id = %child.id, owner_id = %owner_id, "child created");
        Ok(child)
    }

    /// Get a child by ID, regardless of who asks
    pub async fn get(&self, child_id: &str) -> AppResult<Option<Child>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM child c WHERE c.id = ?",
            CHILD_COLUMNS
        ))
        .bind(child_id)
        .fetch_optional(&self.db)
        .await?;

        row.as_ref().map(child_from_row).transpose()
    }

    /// Apply a profile update. Access must already have been checked.
    pub async fn update(&self, child_id: &str, update: ChildUpdate) -> AppResult<Child> {
        let mut child = self
            .get(child_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Child not found".to_string()))?;

        if let Some(name) = update.name {
            validate_name(&name)?;
            child.name = name.trim().to_string();
        }
        if let Some(birth_date) = update.birth_date {
            child.birth_date = birth_date;
        }
        if let Some(sex) = update.sex {
            child.sex = sex;
        }
        if let Some(avatar_index) = update.avatar_index {
            validate_avatar(avatar_index)?;
            child.avatar_index = avatar_index;
        }

        sqlx::query(
            r#"
            UPDATE child
            SET name = ?, birth_date = ?, sex = ?, avatar_index = ?
            WHERE id = ?
            "#,
        )
        .bind(&child.name)
        .bind(child.birth_date.format("%Y-%m-%d").to_string())
        .bind(child.sex.as_str())
        .bind(child.avatar_index)
        .bind(child_id)
        .execute(&self.db)
        .await?;

        Ok(child)
    }

    /// Delete a child; share code, grants and records go with it
    pub async fn delete(&self, child_id: &str) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM child WHERE id = ?")
            .bind(child_id)
            .execute(&self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Child not found".to_string()));
        }

        tracing::info!(child_id = %child_id, "child deleted");
        Ok(())
    }
}

fn validate_name(name: &str) -> AppResult<()> {
    if name.trim().is_empty() {
        return Err(AppError::missing_field("name"));
    }
    Ok(())
}

/// Shared by profile writes and share-code snapshots
pub fn validate_avatar(avatar_index: i64) -> AppResult<()> {
    if avatar_index < 0 {
        return Err(AppError::Validation(
            "avatarIndex cannot be negative".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::connect_in_memory;

    fn ada() -> NewChild {
        NewChild {
            name: "Ada".to_string(),
            birth_date: NaiveDate::from_ymd_opt(2020, 5, 17).unwrap(),
            sex: Sex::Female,
            avatar_index: 2,
        }
    }

    #[test]
    fn test_sex_from_str() {
        assert_eq!(Sex::from_str("male").unwrap(), Sex::Male);
        assert_eq!(Sex::from_str("FEMALE").unwrap(), Sex::Female);
        assert!(Sex::from_str("other").is_err());
    }

    #[test]
    fn test_parse_birth_date() {
        assert_eq!(
            parse_birth_date("2021-02-03").unwrap(),
            NaiveDate::from_ymd_opt(2021, 2, 3).unwrap()
        );
        assert!(parse_birth_date("03/02/2021").is_err());
    }

    #[tokio::test]
    async fn test_create_and_get_child() {
        let manager = ChildManager::new(connect_in_memory().await.unwrap());

        let child = manager.create("u1", ada()).await.unwrap();
        let stored = manager.get(&child.id).await.unwrap().unwrap();

        assert_eq!(stored, child);
        assert_eq!(stored.owner_id, "u1");
        assert!(manager.get("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_create_rejects_blank_name() {
        let manager = ChildManager::new(connect_in_memory().await.unwrap());

        let mut new = ada();
        new.name = "   ".to_string();
        assert!(matches!(
            manager.create("u1", new).await,
            Err(AppError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let manager = ChildManager::new(connect_in_memory().await.unwrap());
        let child = manager.create("u1", ada()).await.unwrap();

        let updated = manager
            .update(
                &child.id,
                ChildUpdate {
                    name: Some("Ada Lovelace".to_string()),
                    avatar_index: Some(4),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.name, "Ada Lovelace");
        assert_eq!(updated.avatar_index, 4);
        assert_eq!(updated.sex, Sex::Female);

        manager.delete(&child.id).await.unwrap();
        assert!(manager.get(&child.id).await.unwrap().is_none());
        assert!(matches!(
            manager.delete(&child.id).await,
            Err(AppError::NotFound(_))
        ));
    }
}
