//! 客户端前置检查（基于本地缓存）；后端在认领 / 接受时还会原子地再检查一次

use crate::core::LinkError;
use crate::model::MemberId;

use super::LinkCoordinator;

impl LinkCoordinator {
    /// 目标成员（或其任一别名）已链接到其他账户时返回 AlreadyLinkedConflict。
    /// 已链接到当前账户视为通过，后续合并是空操作。
    pub(crate) async fn ensure_not_linked_elsewhere(&self, target: MemberId) -> Result<(), LinkError> {
        let friends = self.friends.read().await;
        for friend in friends.iter() {
            if friend.is_linked_elsewhere(&self.auth.account_id)
                && self.graph.are_equivalent(friend.member_id, target).await
            {
                tracing::debug!(
                    "Member {} already linked to {:?}",
                    target,
                    friend.linked_account_id
                );
                return Err(LinkError::AlreadyLinkedConflict);
            }
        }
        Ok(())
    }

    /// 远端提交前的成环预检；已等价时合并是空操作，视为通过
    pub(crate) async fn ensure_mergeable(&self, target: MemberId) -> Result<(), LinkError> {
        let graph = self.graph.snapshot().await;
        let source = graph.resolve(self.auth.member_id);
        let target = graph.resolve(target);
        if source != target && graph.would_cycle(source, target) {
            return Err(LinkError::CycleRejected);
        }
        Ok(())
    }

    /// 认领 / 接受共用的客户端检查（实体自身的检查由调用方先做）
    pub(crate) async fn check_link_target(&self, target: MemberId) -> Result<(), LinkError> {
        self.ensure_not_linked_elsewhere(target).await?;
        self.ensure_mergeable(target).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::core::LinkError;
    use crate::model::{AccountId, AuthContext, FriendRecord};
    use crate::protocol::LinkCoordinatorBuilder;
    use crate::remote::InMemoryLinkBackend;

    #[tokio::test]
    async fn test_conflict_checks_aliases() {
        let coordinator = LinkCoordinatorBuilder::new(
            AuthContext::new("me", "me@x.com", "Me"),
            Arc::new(InMemoryLinkBackend::new()),
        )
        .build();

        let linked = FriendRecord::placeholder("Sam").linked_to(AccountId::new("other"), "o@x.com");
        let alias = crate::model::MemberId::new();
        coordinator.graph().merge(alias, linked.member_id).await.unwrap();
        coordinator.friends.write().await.push(linked.clone());

        assert_eq!(
            coordinator.ensure_not_linked_elsewhere(alias).await,
            Err(LinkError::AlreadyLinkedConflict)
        );
        assert!(coordinator
            .ensure_not_linked_elsewhere(crate::model::MemberId::new())
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_linked_to_self_is_not_conflict() {
        let me = AuthContext::new("me", "me@x.com", "Me");
        let coordinator =
            LinkCoordinatorBuilder::new(me.clone(), Arc::new(InMemoryLinkBackend::new())).build();
        let mine = FriendRecord::placeholder("Me").linked_to(me.account_id.clone(), me.email.clone());
        coordinator.friends.write().await.push(mine.clone());

        assert!(coordinator.ensure_not_linked_elsewhere(mine.member_id).await.is_ok());
    }
}
