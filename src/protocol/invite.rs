//! 邀请令牌流程：创建方生成令牌，认领方凭令牌 ID 认领

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::{LinkCoordinator, LinkOutcome};
use crate::core::LinkError;
use crate::model::{InviteToken, MemberId};

impl LinkCoordinator {
    /// 为本地好友（通常是占位成员）生成邀请令牌
    pub async fn create_invite(
        &self,
        target_member_id: MemberId,
        cancel: &CancellationToken,
    ) -> Result<InviteToken, LinkError> {
        let target = self
            .find_friend(target_member_id)
            .await
            .ok_or_else(|| LinkError::NotFound("Friend".to_string()))?;
        if target.is_linked() {
            return Err(LinkError::AlreadyLinkedConflict);
        }

        let token = InviteToken::new(
            &self.auth,
            target.member_id,
            target.display_name.clone(),
            self.clock.now(),
            self.token_ttl,
        );
        let stored = self
            .retry
            .execute(cancel, || self.backend.create_invite(&token))
            .await?;
        tracing::info!(
            "Created invite {} for member {} (expires {})",
            stored.id,
            stored.target_member_id,
            stored.expires_at
        );
        Ok(stored)
    }

    /// 认领邀请：NotFound → Expired → AlreadyTerminal → SelfLinkNotAllowed → AlreadyLinkedConflict，
    /// 通过后远端一次性认领，再走共享合并序列
    pub async fn claim_invite(
        &self,
        token_id: Uuid,
        cancel: &CancellationToken,
    ) -> Result<LinkOutcome, LinkError> {
        let token = self
            .retry
            .execute(cancel, || self.backend.fetch_invite(token_id))
            .await?
            .ok_or_else(|| LinkError::NotFound("Invite".to_string()))?;
        token.check_claimable(&self.auth.account_id, self.clock.now())?;
        self.check_link_target(token.target_member_id).await?;

        if cancel.is_cancelled() {
            return Err(LinkError::Cancelled);
        }
        let claimed = self.backend.claim_invite(token_id, &self.auth).await?;
        tracing::info!(
            "Invite {} claimed by {}",
            claimed.id,
            self.auth.account_id
        );

        self.complete_link(claimed.target_member_id, cancel).await
    }

    /// 查看令牌（展示用），不做任何检查
    pub async fn fetch_invite(
        &self,
        token_id: Uuid,
        cancel: &CancellationToken,
    ) -> Result<InviteToken, LinkError> {
        self.retry
            .execute(cancel, || self.backend.fetch_invite(token_id))
            .await?
            .ok_or_else(|| LinkError::NotFound("Invite".to_string()))
    }
}
