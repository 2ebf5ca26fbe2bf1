/// Visibility resolution for (child, user) pairs
///
/// Every read of child-scoped data goes through [`VisibilityResolver`]:
/// the owner sees everything, a grantee sees what their grant allows, and
/// anyone else is told the child does not exist.

use super::grants::AccessGrantManager;
use crate::{
    children::{child_from_row, Child, ChildManager, ChildView, CHILD_COLUMNS},
    error::{AppError, AppResult},
};
use sqlx::{Row, SqlitePool};

/// Resolved access mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Owner,
    SharedAccess { read_only: bool },
    NoAccess,
}

impl Visibility {
    pub fn is_shared(&self) -> bool {
        matches!(self, Visibility::SharedAccess { .. })
    }

    /// Flag reported to clients; the owner and no-access cases are never read-only
    pub fn is_read_only(&self) -> bool {
        matches!(self, Visibility::SharedAccess { read_only: true })
    }

    pub fn can_read(&self) -> bool {
        !matches!(self, Visibility::NoAccess)
    }

    pub fn can_write(&self) -> bool {
        matches!(
            self,
            Visibility::Owner | Visibility::SharedAccess { read_only: false }
        )
    }

    pub fn view(&self, child: Child) -> ChildView {
        ChildView {
            is_shared: self.is_shared(),
            is_read_only: self.is_read_only(),
            child,
        }
    }
}

fn child_not_found() -> AppError {
    AppError::NotFound("Child not found".to_string())
}

/// Visibility resolver
#[derive(Clone)]
pub struct VisibilityResolver {
    db: SqlitePool,
    children: ChildManager,
    grants: AccessGrantManager,
}

impl VisibilityResolver {
    pub fn new(db: SqlitePool, children: ChildManager, grants: AccessGrantManager) -> Self {
        Self {
            db,
            children,
            grants,
        }
    }

    /// Access mode of `user_id` on `child_id`. Unknown children are `NoAccess`.
    pub async fn resolve(&self, child_id: &str, user_id: &str) -> AppResult<Visibility> {
        Ok(self
            .resolve_child(child_id, user_id)
            .await?
            .map(|(_, visibility)| visibility)
            .unwrap_or(Visibility::NoAccess))
    }

    async fn resolve_child(
        &self,
        child_id: &str,
        user_id: &str,
    ) -> AppResult<Option<(Child, Visibility)>> {
        let Some(child) = self.children.get(child_id).await? else {
            return Ok(None);
        };

        // Ownership is checked first so a stray grant row never demotes the owner
        if child.owner_id == user_id {
            return Ok(Some((child, Visibility::Owner)));
        }

        let visibility = match self.grants.find(child_id, user_id).await? {
            Some(grant) => Visibility::SharedAccess {
                read_only: grant.is_read_only,
            },
            None => Visibility::NoAccess,
        };

        Ok(Some((child, visibility)))
    }

    /// The child as `user_id` may see it, or NotFound
    pub async fn require_read(&self, child_id: &str, user_id: &str) -> AppResult<ChildView> {
        match self.resolve_child(child_id, user_id).await? {
            Some((child, visibility)) if visibility.can_read() => Ok(visibility.view(child)),
            _ => Err(child_not_found()),
        }
    }

    /// Gate for every mutation of child-scoped data
    pub async fn require_write(&self, child_id: &str, user_id: &str) -> AppResult<ChildView> {
        match self.resolve_child(child_id, user_id).await? {
            Some((child, visibility)) if visibility.can_write() => Ok(visibility.view(child)),
            Some((_, Visibility::SharedAccess { .. })) => Err(AppError::Forbidden(
                "Child is shared read-only".to_string(),
            )),
            _ => Err(child_not_found()),
        }
    }

    /// Gate for owner-only actions such as sharing or deleting a child
    pub async fn require_owner(&self, child_id: &str, user_id: &str) -> AppResult<Child> {
        match self.resolve_child(child_id, user_id).await? {
            Some((child, Visibility::Owner)) => Ok(child),
            Some((_, Visibility::SharedAccess { .. })) => Err(AppError::Forbidden(
                "Only the owner can do this".to_string(),
            )),
            _ => Err(child_not_found()),
        }
    }

    /// Owned and shared children of `user_id`, newest first
    pub async fn list_accessible_children(&self, user_id: &str) -> AppResult<Vec<ChildView>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {}, a.is_read_only AS grant_read_only
            FROM child c
            LEFT JOIN child_access a ON a.child_id = c.id AND a.user_id = ?1
            WHERE c.owner_id = ?1 OR a.user_id IS NOT NULL
            ORDER BY c.created_at DESC, c.id ASC
            "#,
            CHILD_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.db)
        .await?;

        rows.iter()
            .map(|row| {
                let child = child_from_row(row)?;
                let visibility = if child.owner_id == user_id {
                    Visibility::Owner
                } else {
                    Visibility::SharedAccess {
                        read_only: row
                            .get::<Option<bool>, _>("grant_read_only")
                            .unwrap_or(true),
                    }
                };
                Ok(visibility.view(child))
            })
            .collect()
    }
}
