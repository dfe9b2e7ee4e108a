//! 链接协调器：本地好友缓存 + 身份图 + 两个 actor + 远端后端
//!
//! 两条握手流程（邀请令牌 / 链接请求）的成功路径都汇入 `complete_link`：
//! 1. 解析目标成员的规范 ID
//! 2. 把认领账户的规范 ID 合并到目标上（成环则拒绝）
//! 3. 重置对账节流
//! 4. 重新拉取 + 对账，再校验链接后置条件
//! 5. 第 4 步失败（而 1~3 已成功）时记入失败追踪，不向调用方抛硬错误

use std::sync::Arc;

use chrono::Duration;
use serde::Serialize;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::core::{Clock, LinkError, LinkSupervisor, RetryPolicy};
use crate::failures::LinkFailureTracker;
use crate::identity::SharedIdentityGraph;
use crate::model::{AccountId, AuthContext, FriendRecord, LinkFailureRecord, MemberId};
use crate::reconcile::{is_link_confirmed, sort_friends, LinkStateReconciliation};
use crate::remote::LinkBackend;

/// 认领 / 接受的结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkOutcome {
    pub member_id: MemberId,
    pub canonical_id: MemberId,
    pub account_id: AccountId,
    /// false：远端已生效但本地尚未确认，已记入失败追踪等待后台重试
    pub confirmed: bool,
}

/// 一轮后台失败重试的统计
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FailureRetrySummary {
    pub resolved: usize,
    pub still_failing: usize,
    /// 已达到重试上限，只保留记录
    pub skipped: usize,
}

pub struct LinkCoordinator {
    pub(crate) auth: AuthContext,
    pub(crate) backend: Arc<dyn LinkBackend>,
    pub(crate) graph: SharedIdentityGraph,
    pub(crate) reconciliation: LinkStateReconciliation,
    pub(crate) failures: LinkFailureTracker,
    pub(crate) retry: RetryPolicy,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) supervisor: LinkSupervisor,
    pub(crate) token_ttl: Duration,
    pub(crate) request_ttl: Duration,
    pub(crate) max_background_retries: u32,
    pub(crate) timer_interval: std::time::Duration,
    /// 本地好友缓存；每次对账整体替换
    pub(crate) friends: RwLock<Vec<FriendRecord>>,
}

impl LinkCoordinator {
    pub fn auth(&self) -> &AuthContext {
        &self.auth
    }

    pub fn graph(&self) -> &SharedIdentityGraph {
        &self.graph
    }

    pub fn reconciliation(&self) -> &LinkStateReconciliation {
        &self.reconciliation
    }

    pub fn failure_tracker(&self) -> &LinkFailureTracker {
        &self.failures
    }

    pub fn supervisor(&self) -> &LinkSupervisor {
        &self.supervisor
    }

    /// 单个流程用的取消令牌（会话销毁时统一取消）
    pub fn flow_token(&self) -> CancellationToken {
        self.supervisor.child_token()
    }

    /// 当前（已对账）好友列表，供展示
    pub async fn friends(&self) -> Vec<FriendRecord> {
        self.friends.read().await.clone()
    }

    /// 「需要处理」列表
    pub async fn pending_failures(&self) -> Result<Vec<LinkFailureRecord>, LinkError> {
        self.failures.get_pending_failures().await
    }

    /// 按身份等价查找本地好友
    pub async fn find_friend(&self, member_id: MemberId) -> Option<FriendRecord> {
        let friends = self.friends.read().await;
        for friend in friends.iter() {
            if self.graph.are_equivalent(friend.member_id, member_id).await {
                return Some(friend.clone());
            }
        }
        None
    }

    /// 记账时新建占位好友：先写本地缓存，再尽力推送到远端。
    /// 推送失败只记日志；本地独有的记录在对账时会被保留。
    pub async fn add_placeholder(
        &self,
        display_name: impl Into<String>,
        cancel: &CancellationToken,
    ) -> FriendRecord {
        let friend = FriendRecord::placeholder(display_name);
        {
            let mut friends = self.friends.write().await;
            friends.push(friend.clone());
            sort_friends(&mut friends);
        }

        let pushed = self
            .retry
            .execute(cancel, || self.backend.upsert_friend(&self.auth, &friend))
            .await;
        if let Err(e) = pushed {
            tracing::warn!(
                "Placeholder {} kept local only, remote upsert failed: {}",
                friend.member_id,
                e
            );
        }
        friend
    }

    /// 拉取远端（带重试）并与本地缓存对账；整个读改写期间持有缓存写锁
    pub async fn refresh(&self, cancel: &CancellationToken) -> Result<Vec<FriendRecord>, LinkError> {
        let remote = self
            .retry
            .execute(cancel, || self.backend.fetch_friends(&self.auth))
            .await?;

        let mut friends = self.friends.write().await;
        let merged = self
            .reconciliation
            .reconcile(friends.clone(), remote)
            .await?;
        *friends = merged.clone();
        Ok(merged)
    }

    /// 受节流控制的刷新；被节流时返回 None
    pub async fn refresh_if_needed(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Option<Vec<FriendRecord>>, LinkError> {
        if !self.reconciliation.should_reconcile().await? {
            tracing::debug!("Reconciliation throttled, skipping refresh");
            return Ok(None);
        }
        self.refresh(cancel).await.map(Some)
    }

    /// 共享合并序列（邀请认领与请求接受的唯一汇合点）
    pub(crate) async fn complete_link(
        &self,
        target_member_id: MemberId,
        cancel: &CancellationToken,
    ) -> Result<LinkOutcome, LinkError> {
        let merge = self
            .graph
            .merge_canonical(self.auth.member_id, target_member_id)
            .await?;
        if merge.merged {
            tracing::info!(
                "Merged identity of account {} into {}",
                self.auth.account_id,
                merge.canonical
            );
        }

        let confirmed = self.confirm_link(target_member_id, cancel).await?;
        Ok(LinkOutcome {
            member_id: target_member_id,
            canonical_id: merge.canonical,
            account_id: self.auth.account_id.clone(),
            confirmed,
        })
    }

    /// 第 3~5 步。只有取消会作为错误返回（且已先记入失败追踪）
    async fn confirm_link(
        &self,
        member_id: MemberId,
        cancel: &CancellationToken,
    ) -> Result<bool, LinkError> {
        let check = async {
            self.reconciliation.invalidate().await?;
            let merged = self.refresh(cancel).await?;
            self.reconciliation
                .validate_link_completion(member_id, self.auth.account_id.clone(), merged)
                .await
        };

        let reason = match check.await {
            Ok(true) => {
                tracing::info!("Link of member {} to {} confirmed", member_id, self.auth.account_id);
                return Ok(true);
            }
            Ok(false) => "link not visible after reconciliation".to_string(),
            Err(LinkError::Cancelled) => {
                self.record_failure(member_id, "cancelled before confirmation").await;
                return Err(LinkError::Cancelled);
            }
            Err(e) => format!("confirmation failed: {e}"),
        };
        self.record_failure(member_id, reason).await;
        Ok(false)
    }

    async fn record_failure(&self, member_id: MemberId, reason: impl Into<String>) {
        if let Err(e) = self
            .failures
            .record_failure(
                member_id,
                self.auth.account_id.clone(),
                self.auth.email.clone(),
                reason,
            )
            .await
        {
            tracing::error!("Could not record link failure for {}: {}", member_id, e);
        }
    }

    /// 后台重试：对所有待处理记录做一次强制对账并逐条校验
    pub async fn retry_pending_failures(
        &self,
        cancel: &CancellationToken,
    ) -> Result<FailureRetrySummary, LinkError> {
        let pending = self.failures.get_pending_failures().await?;
        let mut summary = FailureRetrySummary::default();
        if pending.is_empty() {
            return Ok(summary);
        }

        let (retryable, exhausted): (Vec<_>, Vec<_>) = pending
            .into_iter()
            .partition(|r| r.retry_count < self.max_background_retries);
        summary.skipped = exhausted.len();
        if retryable.is_empty() {
            return Ok(summary);
        }

        self.reconciliation.invalidate().await?;
        let friends = match self.refresh(cancel).await {
            Ok(friends) => friends,
            Err(LinkError::Cancelled) => return Err(LinkError::Cancelled),
            Err(e) => {
                for record in &retryable {
                    self.bump_failure(record, format!("refresh failed: {e}")).await;
                }
                summary.still_failing = retryable.len();
                return Ok(summary);
            }
        };

        for record in retryable {
            if is_link_confirmed(&friends, record.member_id, &record.account_id) {
                self.failures.mark_resolved(record.member_id).await?;
                tracing::info!("Pending link for member {} now confirmed", record.member_id);
                summary.resolved += 1;
            } else {
                self.bump_failure(&record, "link still not visible after reconciliation")
                    .await;
                summary.still_failing += 1;
            }
        }
        Ok(summary)
    }

    async fn bump_failure(&self, record: &LinkFailureRecord, reason: impl Into<String>) {
        if let Err(e) = self
            .failures
            .record_failure(
                record.member_id,
                record.account_id.clone(),
                record.account_email.clone(),
                reason,
            )
            .await
        {
            tracing::error!("Could not update link failure for {}: {}", record.member_id, e);
        }
    }
}
