//! 邀请令牌（推送式握手）
//!
//! 生命周期：Created → Claimed（终态）；未认领且超过 expires_at 时派生为 Expired，没有拒绝状态。

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{AccountId, AuthContext, MemberId};
use crate::core::LinkError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InviteToken {
    pub id: Uuid,
    pub creator_id: AccountId,
    pub creator_email: String,
    pub target_member_id: MemberId,
    pub target_member_name: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub claimed_by: Option<AccountId>,
    pub claimed_at: Option<DateTime<Utc>>,
}

/// 令牌状态（由字段派生）
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InviteState {
    Created,
    Claimed { by: AccountId, at: DateTime<Utc> },
    Expired,
}

impl InviteToken {
    pub fn new(
        creator: &AuthContext,
        target_member_id: MemberId,
        target_member_name: impl Into<String>,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            creator_id: creator.account_id.clone(),
            creator_email: creator.email.clone(),
            target_member_id,
            target_member_name: target_member_name.into(),
            created_at: now,
            expires_at: now.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC),
            claimed_by: None,
            claimed_at: None,
        }
    }

    pub fn state(&self, now: DateTime<Utc>) -> InviteState {
        match (&self.claimed_by, self.claimed_at) {
            (Some(by), Some(at)) => InviteState::Claimed { by: by.clone(), at },
            _ if self.is_past_expiry(now) => InviteState::Expired,
            _ => InviteState::Created,
        }
    }

    pub fn is_past_expiry(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    pub fn is_claimed(&self) -> bool {
        self.claimed_by.is_some()
    }

    /// 认领前的令牌自身检查，按派生状态分支：已认领的令牌即使超期也是终态，
    /// 未认领且超期才报过期；之后检查自我链接。
    /// 「目标已链接到其他账户」需要好友数据，由调用方接着检查。
    pub fn check_claimable(&self, claimer: &AccountId, now: DateTime<Utc>) -> Result<(), LinkError> {
        match self.state(now) {
            InviteState::Claimed { .. } => return Err(LinkError::AlreadyTerminal),
            InviteState::Expired => return Err(LinkError::Expired),
            InviteState::Created => {}
        }
        if &self.creator_id == claimer {
            return Err(LinkError::SelfLinkNotAllowed);
        }
        Ok(())
    }

    /// Created → Claimed
    pub fn mark_claimed(&mut self, claimer: &AccountId, now: DateTime<Utc>) -> Result<(), LinkError> {
        self.check_claimable(claimer, now)?;
        self.claimed_by = Some(claimer.clone());
        self.claimed_at = Some(now);
        Ok(())
    }
}
