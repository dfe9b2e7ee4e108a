//! 链接失败追踪 actor
//!
//! 按 member_id 幂等累积：已有记录时 retry_count + 1 并刷新原因与时间，不重复建档。
//! 所有读改写都在后台任务内完成，并发 record_failure 不会丢失更新。

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};

use crate::core::{Clock, LinkError, SystemClock};
use crate::model::{AccountId, LinkFailureRecord, MemberId};

const ACTOR_NAME: &str = "Link failure tracker";

enum TrackerCommand {
    Record {
        member_id: MemberId,
        account_id: AccountId,
        account_email: String,
        reason: String,
        reply: oneshot::Sender<LinkFailureRecord>,
    },
    Pending {
        reply: oneshot::Sender<Vec<LinkFailureRecord>>,
    },
    Get {
        member_id: MemberId,
        reply: oneshot::Sender<Option<LinkFailureRecord>>,
    },
    Resolve {
        member_id: MemberId,
        reply: oneshot::Sender<bool>,
    },
    ClearAll {
        reply: oneshot::Sender<()>,
    },
}

#[derive(Debug, Clone)]
pub struct LinkFailureTracker {
    tx: mpsc::UnboundedSender<TrackerCommand>,
}

impl LinkFailureTracker {
    pub fn spawn() -> Self {
        Self::spawn_with_clock(Arc::new(SystemClock))
    }

    pub fn spawn_with_clock(clock: Arc<dyn Clock>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<TrackerCommand>();
        tokio::spawn(async move {
            let mut records: HashMap<MemberId, LinkFailureRecord> = HashMap::new();
            while let Some(cmd) = rx.recv().await {
                match cmd {
                    TrackerCommand::Record {
                        member_id,
                        account_id,
                        account_email,
                        reason,
                        reply,
                    } => {
                        let now = clock.now();
                        let record = records
                            .entry(member_id)
                            .and_modify(|r| {
                                r.retry_count += 1;
                                r.reason = reason.clone();
                                r.last_failed_at = now;
                                r.account_id = account_id.clone();
                                r.account_email = account_email.clone();
                            })
                            .or_insert_with(|| LinkFailureRecord {
                                member_id,
                                account_id,
                                account_email,
                                reason,
                                retry_count: 1,
                                first_failed_at: now,
                                last_failed_at: now,
                            });
                        let _ = reply.send(record.clone());
                    }
                    TrackerCommand::Pending { reply } => {
                        let mut pending: Vec<LinkFailureRecord> = records.values().cloned().collect();
                        pending.sort_by_key(|r| (r.first_failed_at, r.member_id));
                        let _ = reply.send(pending);
                    }
                    TrackerCommand::Get { member_id, reply } => {
                        let _ = reply.send(records.get(&member_id).cloned());
                    }
                    TrackerCommand::Resolve { member_id, reply } => {
                        let _ = reply.send(records.remove(&member_id).is_some());
                    }
                    TrackerCommand::ClearAll { reply } => {
                        records.clear();
                        let _ = reply.send(());
                    }
                }
            }
        });
        Self { tx }
    }

    async fn call<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> TrackerCommand,
    ) -> Result<T, LinkError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(make(reply))
            .map_err(|_| LinkError::ActorUnavailable(ACTOR_NAME))?;
        rx.await.map_err(|_| LinkError::ActorUnavailable(ACTOR_NAME))
    }

    /// 记录一次失败，返回更新后的记录
    pub async fn record_failure(
        &self,
        member_id: MemberId,
        account_id: AccountId,
        account_email: impl Into<String>,
        reason: impl Into<String>,
    ) -> Result<LinkFailureRecord, LinkError> {
        let account_email = account_email.into();
        let reason = reason.into();
        let record = self
            .call(|reply| TrackerCommand::Record {
                member_id,
                account_id,
                account_email,
                reason,
                reply,
            })
            .await?;
        tracing::warn!(
            "Link for member {} recorded as failed (retry #{}): {}",
            record.member_id,
            record.retry_count,
            record.reason
        );
        Ok(record)
    }

    /// 快照读取，按首次失败时间排序
    pub async fn get_pending_failures(&self) -> Result<Vec<LinkFailureRecord>, LinkError> {
        self.call(|reply| TrackerCommand::Pending { reply }).await
    }

    pub async fn failure_for(&self, member_id: MemberId) -> Result<Option<LinkFailureRecord>, LinkError> {
        self.call(|reply| TrackerCommand::Get { member_id, reply }).await
    }

    /// 移除记录；不存在时无操作。返回是否确实移除
    pub async fn mark_resolved(&self, member_id: MemberId) -> Result<bool, LinkError> {
        self.call(|reply| TrackerCommand::Resolve { member_id, reply }).await
    }

    pub async fn clear_all(&self) -> Result<(), LinkError> {
        self.call(|reply| TrackerCommand::ClearAll { reply }).await
    }
}
