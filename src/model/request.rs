//! 链接请求（按邮箱拉取式握手）
//!
//! Pending 是唯一非终态；accept / decline 由接收方发起，cancel 只允许请求方在 Pending 时发起。

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{normalize_email, AccountId, AuthContext, MemberId};
use crate::core::LinkError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkRequestStatus {
    Pending,
    Accepted,
    Declined,
    /// 请求方撤回
    Rejected,
    Expired,
}

impl LinkRequestStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, LinkRequestStatus::Pending)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkRequest {
    pub id: Uuid,
    pub requester_id: AccountId,
    pub requester_email: String,
    pub requester_name: String,
    pub recipient_email: String,
    pub target_member_id: MemberId,
    pub target_member_name: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub status: LinkRequestStatus,
    pub rejected_at: Option<DateTime<Utc>>,
}

impl LinkRequest {
    pub fn new(
        requester: &AuthContext,
        recipient_email: impl Into<String>,
        target_member_id: MemberId,
        target_member_name: impl Into<String>,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            requester_id: requester.account_id.clone(),
            requester_email: requester.email.clone(),
            requester_name: requester.display_name.clone(),
            recipient_email: normalize_email(&recipient_email.into()),
            target_member_id,
            target_member_name: target_member_name.into(),
            created_at: now,
            expires_at: now.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC),
            status: LinkRequestStatus::Pending,
            rejected_at: None,
        }
    }

    /// 对外展示的状态：Pending 但已超期的视为 Expired
    pub fn effective_status(&self, now: DateTime<Utc>) -> LinkRequestStatus {
        match self.status {
            LinkRequestStatus::Pending if now > self.expires_at => LinkRequestStatus::Expired,
            status => status,
        }
    }

    fn check_pending(&self, now: DateTime<Utc>) -> Result<(), LinkError> {
        match self.effective_status(now) {
            LinkRequestStatus::Pending => Ok(()),
            LinkRequestStatus::Expired => Err(LinkError::Expired),
            _ => Err(LinkError::AlreadyTerminal),
        }
    }

    /// 接受前的请求自身检查（按顺序）：过期、终态、自我链接
    pub fn check_acceptable(&self, acceptor: &AccountId, now: DateTime<Utc>) -> Result<(), LinkError> {
        self.check_pending(now)?;
        if &self.requester_id == acceptor {
            return Err(LinkError::SelfLinkNotAllowed);
        }
        Ok(())
    }

    pub fn mark_accepted(&mut self, acceptor: &AccountId, now: DateTime<Utc>) -> Result<(), LinkError> {
        self.check_acceptable(acceptor, now)?;
        self.status = LinkRequestStatus::Accepted;
        Ok(())
    }

    /// 只有接收方能拒绝（按邮箱）；重复拒绝视为成功（幂等）
    pub fn mark_declined(&mut self, recipient_email: &str, now: DateTime<Utc>) -> Result<(), LinkError> {
        if !self.is_addressed_to(recipient_email) {
            return Err(LinkError::NotFound("Link request".to_string()));
        }
        if self.status == LinkRequestStatus::Declined {
            return Ok(());
        }
        self.check_pending(now)?;
        self.status = LinkRequestStatus::Declined;
        self.rejected_at = Some(now);
        Ok(())
    }

    /// 只有请求方能撤回；重复撤回视为成功
    pub fn mark_cancelled(&mut self, requester: &AccountId, now: DateTime<Utc>) -> Result<(), LinkError> {
        if &self.requester_id != requester {
            return Err(LinkError::NotFound("Link request".to_string()));
        }
        if self.status == LinkRequestStatus::Rejected {
            return Ok(());
        }
        self.check_pending(now)?;
        self.status = LinkRequestStatus::Rejected;
        self.rejected_at = Some(now);
        Ok(())
    }

    pub fn is_addressed_to(&self, email: &str) -> bool {
        self.recipient_email == normalize_email(email)
    }
}
