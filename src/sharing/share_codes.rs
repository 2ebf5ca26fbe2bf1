/// Share code lifecycle: mint, lookup, read-only toggle, revoke
use super::{
    code::{generate_code, is_well_formed, normalize_code},
    grants::AccessGrantManager,
};
use crate::{
    children::{ChildSnapshot, Sex},
    config::RevocationPolicy,
    db::{format_timestamp, is_unique_violation, now, parse_timestamp},
    error::{AppError, AppResult},
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use uuid::Uuid;

/// Share code
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareCode {
    pub id: String,
    pub code: String,
    pub child_id: String,
    pub owner_id: String,
    pub child_name: String,
    pub child_birth_date: NaiveDate,
    pub child_sex: Sex,
    pub child_avatar_index: i64,
    pub is_read_only: bool,
    pub created_at: DateTime<Utc>,
}

const SHARE_CODE_COLUMNS: &str = "id, code, child_id, owner_id, child_name, child_birth_date, child_sex, child_avatar_index, is_read_only, created_at";

fn share_code_from_row(row: &SqliteRow) -> AppResult<ShareCode> {
    let birth_date: String = row.get("child_birth_date");
    let sex: String = row.get("child_sex");
    let created_at: String = row.get("created_at");

    Ok(ShareCode {
        id: row.get("id"),
        code: row.get("code"),
        child_id: row.get("child_id"),
        owner_id: row.get("owner_id"),
        child_name: row.get("child_name"),
        child_birth_date: NaiveDate::parse_from_str(&birth_date, "%Y-%m-%d")
            .map_err(|e| AppError::Internal(format!("Invalid stored birth date: {}", e)))?,
        child_sex: Sex::from_str(&sex)?,
        child_avatar_index: row.get("child_avatar_index"),
        is_read_only: row.get("is_read_only"),
        created_at: parse_timestamp(&created_at)?,
    })
}

/// Share code manager
#[derive(Clone)]
pub struct ShareCodeManager {
    db: SqlitePool,
    revocation_policy: RevocationPolicy,
}

impl ShareCodeManager {
    pub fn new(db: SqlitePool, revocation_policy: RevocationPolicy) -> Self {
        Self {
            db,
            revocation_policy,
        }
    }

    /// Mint the share code for (child, owner), or return the one that exists.
    ///
    /// An existing code keeps its value; only its read-only flag is brought
    /// in line with the request. The caller must have checked ownership.
    pub async fn mint(
        &self,
        child_id: &str,
        owner_id: &str,
        snapshot: &ChildSnapshot,
        read_only: bool,
    ) -> AppResult<ShareCode> {
        self.mint_with(child_id, owner_id, snapshot, read_only, generate_code)
            .await
    }

    /// `mint` with the candidate source pulled out, so collisions are reachable
    async fn mint_with(
        &self,
        child_id: &str,
        owner_id: &str,
        snapshot: &ChildSnapshot,
        read_only: bool,
        mut next_code: impl FnMut() -> String + Send,
    ) -> AppResult<ShareCode> {
        if let Some(existing) = self.find_by_child_and_owner(child_id, owner_id).await? {
            return self.reconcile_read_only(existing, read_only).await;
        }

        loop {
            let share = ShareCode {
                id: Uuid::new_v4().to_string(),
                code: next_code(),
                child_id: child_id.to_string(),
                owner_id: owner_id.to_string(),
                child_name: snapshot.name.clone(),
                child_birth_date: snapshot.birth_date,
                child_sex: snapshot.sex,
                child_avatar_index: snapshot.avatar_index,
                is_read_only: read_only,
                created_at: now(),
            };

            match self.insert(&share).await {
                Ok(()) => {
                    tracing::info!(child_id = %child_id, owner_id = %owner_id, "share code minted");
                    return Ok(share);
                }
                Err(e) if is_unique_violation(&e) => {
                    // Either a concurrent mint for the same pair won, or the
                    // code value collided with another child's code.
                    if let Some(winner) = self.find_by_child_and_owner(child_id, owner_id).await? {
                        tracing::debug!(child_id = %child_id, "concurrent mint already stored a code");
                        return self.reconcile_read_only(winner, read_only).await;
                    }
                    tracing::debug!("share code collision, regenerating");
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    async fn insert(&self, share: &ShareCode) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO share_code (id, code, child_id, owner_id, child_name, child_birth_date, child_sex, child_avatar_index, is_read_only, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&share.id)
        .bind(&share.code)
        .bind(&share.child_id)
        .bind(&share.owner_id)
        .bind(&share.child_name)
        .bind(share.child_birth_date.format("%Y-%m-%d").to_string())
        .bind(share.child_sex.as_str())
        .bind(share.child_avatar_index)
        .bind(share.is_read_only)
        .bind(format_timestamp(&share.created_at))
        .execute(&self.db)
        .await?;

        Ok(())
    }

    async fn reconcile_read_only(&self, existing: ShareCode, read_only: bool) -> AppResult<ShareCode> {
        if existing.is_read_only == read_only {
            return Ok(existing);
        }
        self.set_read_only(&existing.child_id, &existing.owner_id, read_only)
            .await
    }

    /// Look up a code as typed by a grantee (case-insensitive)
    pub async fn find_by_code(&self, code: &str) -> AppResult<Option<ShareCode>> {
        let code = normalize_code(code);
        if !is_well_formed(&code) {
            return Ok(None);
        }

        let row = sqlx::query(&format!(
            "SELECT {} FROM share_code WHERE code = ?",
            SHARE_CODE_COLUMNS
        ))
        .bind(&code)
        .fetch_optional(&self.db)
        .await?;

        row.as_ref().map(share_code_from_row).transpose()
    }

    /// The owner's current code for a child
    pub async fn find_by_child_and_owner(
        &self,
        child_id: &str,
        owner_id: &str,
    ) -> AppResult<Option<ShareCode>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM share_code WHERE child_id = ? AND owner_id = ?",
            SHARE_CODE_COLUMNS
        ))
        .bind(child_id)
        .bind(owner_id)
        .fetch_optional(&self.db)
        .await?;

        row.as_ref().map(share_code_from_row).transpose()
    }

    /// Toggle the visibility mode future redemptions will receive
    pub async fn set_read_only(
        &self,
        child_id: &str,
        owner_id: &str,
        read_only: bool,
    ) -> AppResult<ShareCode> {
        let result = sqlx::query(
            r#"
            UPDATE share_code
            SET is_read_only = ?
            WHERE child_id = ? AND owner_id = ?
            "#,
        )
        .bind(read_only)
        .bind(child_id)
        .bind(owner_id)
        .execute(&self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Share code not found".to_string()));
        }

        tracing::info!(child_id = %child_id, read_only, "share code mode updated");

        self.find_by_child_and_owner(child_id, owner_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Share code not found".to_string()))
    }

    /// Delete the code for (child, owner). Revoking nothing is not an error.
    ///
    /// Under `RevocationPolicy::Cascade` every grant on the child is removed
    /// in the same transaction, provided `owner_id` really owns the child.
    pub async fn revoke(&self, child_id: &str, owner_id: &str) -> AppResult<bool> {
        let mut tx = self.db.begin().await?;

        let removed = sqlx::query("DELETE FROM share_code WHERE child_id = ? AND owner_id = ?")
            .bind(child_id)
            .bind(owner_id)
            .execute(&mut *tx)
            .await?
            .rows_affected()
            > 0;

        let grants_removed = match self.revocation_policy {
            RevocationPolicy::KeepGrants => 0,
            RevocationPolicy::Cascade => {
                AccessGrantManager::delete_for_owned_child(&mut tx, child_id, owner_id).await?
            }
        };

        tx.commit().await?;

        tracing::info!(
            child_id = %child_id,
            removed,
            grants_removed,
            policy = self.revocation_policy.as_str(),
            "share code revoked"
        );
        Ok(removed)
    }
}
