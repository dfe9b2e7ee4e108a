//! 链接请求流程：请求方按邮箱发起，接收方接受 / 拒绝，请求方可撤回

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::{LinkCoordinator, LinkOutcome};
use crate::core::LinkError;
use crate::model::{LinkRequest, LinkRequestStatus, MemberId};

/// 列表项：请求 + 对外展示状态（超期的 Pending 显示为 Expired）
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct LinkRequestView {
    pub request: LinkRequest,
    pub status: LinkRequestStatus,
}

impl LinkCoordinator {
    pub async fn create_link_request(
        &self,
        recipient_email: &str,
        target_member_id: MemberId,
        cancel: &CancellationToken,
    ) -> Result<LinkRequest, LinkError> {
        if self.auth.owns_email(recipient_email) {
            return Err(LinkError::SelfLinkNotAllowed);
        }
        let target = self
            .find_friend(target_member_id)
            .await
            .ok_or_else(|| LinkError::NotFound("Friend".to_string()))?;
        if target.is_linked() {
            return Err(LinkError::AlreadyLinkedConflict);
        }

        let request = LinkRequest::new(
            &self.auth,
            recipient_email,
            target.member_id,
            target.display_name.clone(),
            self.clock.now(),
            self.request_ttl,
        );
        let stored = self
            .retry
            .execute(cancel, || self.backend.create_link_request(&request))
            .await?;
        tracing::info!(
            "Link request {} sent to {} for member {}",
            stored.id,
            stored.recipient_email,
            stored.target_member_id
        );
        Ok(stored)
    }

    /// 接受请求：与认领相同的五项检查，通过后远端一次性接受，再走共享合并序列
    pub async fn accept_link_request(
        &self,
        request_id: Uuid,
        cancel: &CancellationToken,
    ) -> Result<LinkOutcome, LinkError> {
        let request = self.fetch_request(request_id, cancel).await?;
        request.check_acceptable(&self.auth.account_id, self.clock.now())?;
        self.check_link_target(request.target_member_id).await?;

        if cancel.is_cancelled() {
            return Err(LinkError::Cancelled);
        }
        let accepted = self
            .backend
            .accept_link_request(request_id, &self.auth)
            .await?;
        tracing::info!(
            "Link request {} accepted by {}",
            accepted.id,
            self.auth.account_id
        );

        self.complete_link(accepted.target_member_id, cancel).await
    }

    /// 接收方拒绝（非接收方得到 NotFound）；重复拒绝视为成功
    pub async fn decline_link_request(
        &self,
        request_id: Uuid,
        cancel: &CancellationToken,
    ) -> Result<LinkRequest, LinkError> {
        let declined = self
            .retry
            .execute(cancel, || self.backend.decline_link_request(request_id, &self.auth))
            .await?;
        tracing::info!("Link request {} declined", request_id);
        Ok(declined)
    }

    /// 请求方撤回（状态记为 rejected）；重复撤回视为成功
    pub async fn cancel_link_request(
        &self,
        request_id: Uuid,
        cancel: &CancellationToken,
    ) -> Result<LinkRequest, LinkError> {
        let cancelled = self
            .retry
            .execute(cancel, || {
                self.backend
                    .cancel_link_request(request_id, &self.auth.account_id)
            })
            .await?;
        tracing::info!("Link request {} cancelled by requester", request_id);
        Ok(cancelled)
    }

    /// 发给当前账户邮箱的请求（邮箱不区分大小写）
    pub async fn incoming_requests(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Vec<LinkRequestView>, LinkError> {
        let requests = self
            .retry
            .execute(cancel, || self.backend.incoming_link_requests(&self.auth.email))
            .await?;
        Ok(self.to_views(requests))
    }

    pub async fn outgoing_requests(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Vec<LinkRequestView>, LinkError> {
        let requests = self
            .retry
            .execute(cancel, || {
                self.backend.outgoing_link_requests(&self.auth.account_id)
            })
            .await?;
        Ok(self.to_views(requests))
    }

    async fn fetch_request(
        &self,
        request_id: Uuid,
        cancel: &CancellationToken,
    ) -> Result<LinkRequest, LinkError> {
        self.retry
            .execute(cancel, || self.backend.fetch_link_request(request_id))
            .await?
            .ok_or_else(|| LinkError::NotFound("Link request".to_string()))
    }

    fn to_views(&self, requests: Vec<LinkRequest>) -> Vec<LinkRequestView> {
        let now = self.clock.now();
        requests
            .into_iter()
            .map(|request| LinkRequestView {
                status: request.effective_status(now),
                request,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, Utc};

    use super::*;
    use crate::core::{ManualClock, RetryPolicy};
    use crate::model::{AuthContext, FriendRecord};
    use crate::protocol::LinkCoordinatorBuilder;
    use crate::remote::InMemoryLinkBackend;

    struct Fixture {
        backend: Arc<InMemoryLinkBackend>,
        clock: Arc<ManualClock>,
        requester: LinkCoordinator,
        recipient: LinkCoordinator,
        placeholder: FriendRecord,
    }

    async fn fixture() -> Fixture {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let backend = Arc::new(InMemoryLinkBackend::with_clock(clock.clone()));
        let build = |auth: AuthContext| {
            LinkCoordinatorBuilder::new(auth, backend.clone())
                .with_clock(clock.clone())
                .with_retry(RetryPolicy::new(
                    3,
                    std::time::Duration::from_millis(1),
                    std::time::Duration::from_millis(2),
                ))
                .build()
        };
        let requester = build(AuthContext::new("alex", "alex@x.com", "Alex"));
        let recipient = build(AuthContext::new("sam", "Sam@X.com", "Sam"));
        let placeholder = requester
            .add_placeholder("Sam", &CancellationToken::new())
            .await;
        Fixture {
            backend,
            clock,
            requester,
            recipient,
            placeholder,
        }
    }

    #[tokio::test]
    async fn test_request_to_own_email_is_self_link() {
        let f = fixture().await;
        let err = f
            .requester
            .create_link_request(" ALEX@x.com ", f.placeholder.member_id, &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err, LinkError::SelfLinkNotAllowed);
    }

    #[tokio::test]
    async fn test_incoming_matches_email_case_insensitively() {
        let f = fixture().await;
        let cancel = CancellationToken::new();
        let sent = f
            .requester
            .create_link_request("sam@x.com", f.placeholder.member_id, &cancel)
            .await
            .unwrap();

        let incoming = f.recipient.incoming_requests(&cancel).await.unwrap();
        assert_eq!(incoming.len(), 1);
        assert_eq!(incoming[0].request.id, sent.id);
        assert_eq!(incoming[0].status, LinkRequestStatus::Pending);

        let outgoing = f.requester.outgoing_requests(&cancel).await.unwrap();
        assert_eq!(outgoing.len(), 1);
        assert!(f.requester.incoming_requests(&cancel).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_accept_links_member() {
        let f = fixture().await;
        let cancel = CancellationToken::new();
        let sent = f
            .requester
            .create_link_request("sam@x.com", f.placeholder.member_id, &cancel)
            .await
            .unwrap();

        let outcome = f.recipient.accept_link_request(sent.id, &cancel).await.unwrap();
        assert!(outcome.confirmed);
        assert_eq!(f.backend.links_applied(), 1);

        let err = f.recipient.accept_link_request(sent.id, &cancel).await.unwrap_err();
        assert_eq!(err, LinkError::AlreadyTerminal);
        assert_eq!(f.backend.links_applied(), 1);
    }

    #[tokio::test]
    async fn test_requester_cannot_accept_own_request() {
        let f = fixture().await;
        let cancel = CancellationToken::new();
        let sent = f
            .requester
            .create_link_request("sam@x.com", f.placeholder.member_id, &cancel)
            .await
            .unwrap();
        let err = f.requester.accept_link_request(sent.id, &cancel).await.unwrap_err();
        assert_eq!(err, LinkError::SelfLinkNotAllowed);
    }

    #[tokio::test]
    async fn test_expired_request_listed_as_expired_and_not_acceptable() {
        let f = fixture().await;
        let cancel = CancellationToken::new();
        let sent = f
            .requester
            .create_link_request("sam@x.com", f.placeholder.member_id, &cancel)
            .await
            .unwrap();
        f.clock.advance(Duration::days(31));

        let incoming = f.recipient.incoming_requests(&cancel).await.unwrap();
        assert_eq!(incoming[0].status, LinkRequestStatus::Expired);
        let err = f.recipient.accept_link_request(sent.id, &cancel).await.unwrap_err();
        assert_eq!(err, LinkError::Expired);
        assert_eq!(f.backend.links_applied(), 0);
    }

    #[tokio::test]
    async fn test_decline_then_accept_is_terminal() {
        let f = fixture().await;
        let cancel = CancellationToken::new();
        let sent = f
            .requester
            .create_link_request("sam@x.com", f.placeholder.member_id, &cancel)
            .await
            .unwrap();

        let declined = f.recipient.decline_link_request(sent.id, &cancel).await.unwrap();
        assert_eq!(declined.status, LinkRequestStatus::Declined);
        assert!(declined.rejected_at.is_some());
        // 重复拒绝
        assert!(f.recipient.decline_link_request(sent.id, &cancel).await.is_ok());

        let err = f.recipient.accept_link_request(sent.id, &cancel).await.unwrap_err();
        assert_eq!(err, LinkError::AlreadyTerminal);
    }

    #[tokio::test]
    async fn test_decline_only_by_recipient() {
        let f = fixture().await;
        let cancel = CancellationToken::new();
        let sent = f
            .requester
            .create_link_request("sam@x.com", f.placeholder.member_id, &cancel)
            .await
            .unwrap();

        let err = f.requester.decline_link_request(sent.id, &cancel).await.unwrap_err();
        assert_eq!(err.kind(), crate::core::ErrorKind::NotFound);

        let incoming = f.recipient.incoming_requests(&cancel).await.unwrap();
        assert_eq!(incoming[0].status, LinkRequestStatus::Pending);
        assert!(f.recipient.accept_link_request(sent.id, &cancel).await.is_ok());
    }

    #[tokio::test]
    async fn test_cancel_only_by_requester() {
        let f = fixture().await;
        let cancel = CancellationToken::new();
        let sent = f
            .requester
            .create_link_request("sam@x.com", f.placeholder.member_id, &cancel)
            .await
            .unwrap();

        let err = f.recipient.cancel_link_request(sent.id, &cancel).await.unwrap_err();
        assert_eq!(err.kind(), crate::core::ErrorKind::NotFound);

        let cancelled = f.requester.cancel_link_request(sent.id, &cancel).await.unwrap();
        assert_eq!(cancelled.status, LinkRequestStatus::Rejected);
        assert!(cancelled.rejected_at.is_some());

        let err = f.recipient.accept_link_request(sent.id, &cancel).await.unwrap_err();
        assert_eq!(err, LinkError::AlreadyTerminal);
    }
}
