/// Code redemption: share code lookup followed by a grant upsert
use super::{grants::AccessGrantManager, share_codes::ShareCodeManager, visibility::VisibilityResolver};
use crate::{
    children::{ChildManager, ChildView},
    error::{AppError, AppResult},
};

/// Same message whether the code never existed or was revoked
pub fn code_not_found() -> AppError {
    AppError::NotFound("Share code not found".to_string())
}

/// Redemption service
#[derive(Clone)]
pub struct RedemptionService {
    share_codes: ShareCodeManager,
    grants: AccessGrantManager,
    children: ChildManager,
    visibility: VisibilityResolver,
}

impl RedemptionService {
    pub fn new(
        share_codes: ShareCodeManager,
        grants: AccessGrantManager,
        children: ChildManager,
        visibility: VisibilityResolver,
    ) -> Self {
        Self {
            share_codes,
            grants,
            children,
            visibility,
        }
    }

    /// Redeem `code` for `user_id` and return the child as they now see it.
    ///
    /// Both steps are idempotent, so a client may resubmit after a failure.
    pub async fn redeem(&self, code: &str, user_id: &str) -> AppResult<ChildView> {
        let share = self
            .share_codes
            .find_by_code(code)
            .await?
            .ok_or_else(code_not_found)?;

        self.grant_access(&share.child_id, user_id, share.is_read_only)
            .await?;

        self.visibility.require_read(&share.child_id, user_id).await
    }

    /// Upsert the grant for (child, user). The owner is left untouched.
    pub async fn grant_access(&self, child_id: &str, user_id: &str, read_only: bool) -> AppResult<()> {
        let child = self
            .children
            .get(child_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Child not found".to_string()))?;

        if child.owner_id == user_id {
            tracing::debug!(child_id = %child_id, "owner redeemed own code, nothing to grant");
            return Ok(());
        }

        self.grants.grant(child_id, user_id, read_only).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        children::{NewChild, Sex},
        config::RevocationPolicy,
        db::connect_in_memory,
        sharing::visibility::Visibility,
    };
    use chrono::NaiveDate;

    struct Fixture {
        children: ChildManager,
        share_codes: ShareCodeManager,
        grants: AccessGrantManager,
        visibility: VisibilityResolver,
        redemption: RedemptionService,
    }

    async fn setup(policy: RevocationPolicy) -> Fixture {
        let db = connect_in_memory().await.unwrap();
        let children = ChildManager::new(db.clone());
        let grants = AccessGrantManager::new(db.clone());
        let share_codes = ShareCodeManager::new(db.clone(), policy);
        let visibility = VisibilityResolver::new(db, children.clone(), grants.clone());
        let redemption = RedemptionService::new(
            share_codes.clone(),
            grants.clone(),
            children.clone(),
            visibility.clone(),
        );
        Fixture {
            children,
            share_codes,
            grants,
            visibility,
            redemption,
        }
    }

    async fn child_of(f: &Fixture, owner: &str) -> crate::children::Child {
        f.children
            .create(
                owner,
                NewChild {
                    name: "Noa".to_string(),
                    birth_date: NaiveDate::from_ymd_opt(2021, 3, 9).unwrap(),
                    sex: Sex::Female,
                    avatar_index: 3,
                },
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_redeem_then_resolve_read_only() {
        let f = setup(RevocationPolicy::KeepGrants).await;
        let child = child_of(&f, "owner").await;
        let share = f.share_codes.mint(&child.id, "owner", &child.snapshot(), true).await.unwrap();

        let view = f.redemption.redeem(&share.code, "grandma").await.unwrap();

        assert!(view.is_shared);
        assert!(view.is_read_only);
        assert_eq!(
            f.visibility.resolve(&child.id, "grandma").await.unwrap(),
            Visibility::SharedAccess { read_only: true }
        );
    }

    #[tokio::test]
    async fn test_re_redeem_after_mode_change_updates_grant() {
        let f = setup(RevocationPolicy::KeepGrants).await;
        let child = child_of(&f, "owner").await;
        let share = f.share_codes.mint(&child.id, "owner", &child.snapshot(), true).await.unwrap();
        f.redemption.redeem(&share.code, "grandma").await.unwrap();

        f.share_codes.set_read_only(&child.id, "owner", false).await.unwrap();
        let again = f.share_codes.mint(&child.id, "owner", &child.snapshot(), false).await.unwrap();
        assert_eq!(again.code, share.code);

        f.redemption.redeem(&share.code, "grandma").await.unwrap();

        assert_eq!(
            f.visibility.resolve(&child.id, "grandma").await.unwrap(),
            Visibility::SharedAccess { read_only: false }
        );
        assert_eq!(f.grants.list_grants_for_child(&child.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_revoked_code_cannot_be_redeemed_but_grants_survive() {
        let f = setup(RevocationPolicy::KeepGrants).await;
        let child = child_of(&f, "owner").await;
        let share = f.share_codes.mint(&child.id, "owner", &child.snapshot(), true).await.unwrap();
        f.redemption.redeem(&share.code, "grandma").await.unwrap();

        f.share_codes.revoke(&child.id, "owner").await.unwrap();

        assert!(matches!(
            f.redemption.redeem(&share.code, "uncle").await,
            Err(AppError::NotFound(_))
        ));
        assert!(f.visibility.resolve(&child.id, "grandma").await.unwrap().is_shared());
        assert_eq!(
            f.visibility.resolve(&child.id, "uncle").await.unwrap(),
            Visibility::NoAccess
        );
    }

    #[tokio::test]
    async fn test_owner_redeeming_own_code_stays_owner() {
        let f = setup(RevocationPolicy::KeepGrants).await;
        let child = child_of(&f, "owner").await;
        let share = f.share_codes.mint(&child.id, "owner", &child.snapshot(), true).await.unwrap();

        let view = f.redemption.redeem(&share.code, "owner").await.unwrap();

        assert!(!view.is_shared);
        assert!(f.grants.list_grants_for_child(&child.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_grant_access_for_unknown_child() {
        let f = setup(RevocationPolicy::KeepGrants).await;

        assert!(matches!(
            f.redemption.grant_access("nope", "u2", true).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_malformed_code_is_not_found() {
        let f = setup(RevocationPolicy::KeepGrants).await;

        assert!(matches!(
            f.redemption.redeem("0000", "u2").await,
            Err(AppError::NotFound(_))
        ));
    }
}
