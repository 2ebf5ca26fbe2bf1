/// Access grants: which non-owners may see a child, and in which mode
use crate::{
    db::{format_timestamp, now, parse_timestamp},
    error::AppResult,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, Row, Sqlite, SqlitePool, Transaction};

/// Access grant record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessGrant {
    pub child_id: String,
    pub user_id: String,
    pub is_read_only: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn grant_from_row(row: &SqliteRow) -> AppResult<AccessGrant> {
    let created_at: String = row.get("created_at");
    let updated_at: String = row.get("updated_at");

    Ok(AccessGrant {
        child_id: row.get("child_id"),
        user_id: row.get("user_id"),
        is_read_only: row.get("is_read_only"),
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
    })
}

/// Access grant manager
#[derive(Clone)]
pub struct AccessGrantManager {
    db: SqlitePool,
}

impl AccessGrantManager {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Insert or overwrite the grant for (child, user) in a single statement
    pub async fn grant(&self, child_id: &str, user_id: &str, read_only: bool) -> AppResult<()> {
        let stamp = format_timestamp(&now());

        sqlx::query(
            r#"
            INSERT INTO child_access (child_id, user_id, is_read_only, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT (child_id, user_id)
            DO UPDATE SET is_read_only = excluded.is_read_only, updated_at = excluded.updated_at
            "#,
        )
        .bind(child_id)
        .bind(user_id)
        .bind(read_only)
        .bind(&stamp)
        .bind(&stamp)
        .execute(&self.db)
        .await?;

        tracing::info!(child_id = %child_id, user_id = %user_id, read_only, "access granted");
        Ok(())
    }

    pub async fn find(&self, child_id: &str, user_id: &str) -> AppResult<Option<AccessGrant>> {
        let row = sqlx::query(
            r#"
            SELECT child_id, user_id, is_read_only, created_at, updated_at
            FROM child_access
            WHERE child_id = ? AND user_id = ?
            "#,
        )
        .bind(child_id)
        .bind(user_id)
        .fetch_optional(&self.db)
        .await?;

        row.as_ref().map(grant_from_row).transpose()
    }

    /// Everyone who was given access to a child
    pub async fn list_grants_for_child(&self, child_id: &str) -> AppResult<Vec<AccessGrant>> {
        let rows = sqlx::query(
            r#"
            SELECT child_id, user_id, is_read_only, created_at, updated_at
            FROM child_access
            WHERE child_id = ?
            ORDER BY created_at ASC, user_id ASC
            "#,
        )
        .bind(child_id)
        .fetch_all(&self.db)
        .await?;

        rows.iter().map(grant_from_row).collect()
    }

    /// Every child a user was given access to
    pub async fn list_grants_for_user(&self, user_id: &str) -> AppResult<Vec<AccessGrant>> {
        let rows = sqlx::query(
            r#"
            SELECT child_id, user_id, is_read_only, created_at, updated_at
            FROM child_access
            WHERE user_id = ?
            ORDER BY created_at ASC, child_id ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.db)
        .await?;

        rows.iter().map(grant_from_row).collect()
    }

    /// Remove every grant on a child, but only if `owner_id` owns it.
    /// Runs inside the caller's transaction.
    pub async fn delete_for_owned_child(
        tx: &mut Transaction<'_, Sqlite>,
        child_id: &str,
        owner_id: &str,
    ) -> AppResult<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM child_access
            WHERE child_id = ?
              AND EXISTS (SELECT 1 FROM child WHERE id = ? AND owner_id = ?)
            "#,
        )
        .bind(child_id)
        .bind(child_id)
        .bind(owner_id)
        .execute(&mut **tx)
        .await?;

        Ok(result.rows_affected())
    }
}
