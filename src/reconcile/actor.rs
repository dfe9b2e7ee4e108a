//! 对账 actor：单一所有者任务 + 命令通道
//!
//! 节流状态只属于后台任务，所有操作经 mpsc 串行执行，回复走 oneshot；
//! 定时对账与链接完成后的显式对账不会交错读改写节流时间戳。

use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;

use super::merge::{is_link_confirmed, merge_friend_lists};
use crate::core::LinkError;
use crate::model::{AccountId, FriendRecord, MemberId};

const ACTOR_NAME: &str = "Reconciliation actor";

enum ReconcileCommand {
    Reconcile {
        local: Vec<FriendRecord>,
        remote: Vec<FriendRecord>,
        reply: oneshot::Sender<Vec<FriendRecord>>,
    },
    ShouldReconcile {
        reply: oneshot::Sender<bool>,
    },
    Invalidate {
        reply: oneshot::Sender<()>,
    },
    ValidateLinkCompletion {
        member_id: MemberId,
        account_id: AccountId,
        friends: Vec<FriendRecord>,
        reply: oneshot::Sender<bool>,
    },
}

struct ReconcileState {
    min_interval: Duration,
    last_reconciled: Option<Instant>,
}

impl ReconcileState {
    fn handle(&mut self, cmd: ReconcileCommand) {
        match cmd {
            ReconcileCommand::Reconcile { local, remote, reply } => {
                let merged = merge_friend_lists(&local, &remote);
                self.last_reconciled = Some(Instant::now());
                tracing::debug!(
                    "Reconciled {} local + {} remote friends into {}",
                    local.len(),
                    remote.len(),
                    merged.len()
                );
                let _ = reply.send(merged);
            }
            ReconcileCommand::ShouldReconcile { reply } => {
                let _ = reply.send(self.should_reconcile());
            }
            ReconcileCommand::Invalidate { reply } => {
                self.last_reconciled = None;
                let _ = reply.send(());
            }
            ReconcileCommand::ValidateLinkCompletion {
                member_id,
                account_id,
                friends,
                reply,
            } => {
                let _ = reply.send(is_link_confirmed(&friends, member_id, &account_id));
            }
        }
    }

    fn should_reconcile(&self) -> bool {
        match self.last_reconciled {
            None => true,
            Some(at) => at.elapsed() >= self.min_interval,
        }
    }
}

/// 对账 actor 的句柄（可克隆，所有克隆共享同一个后台任务）
#[derive(Debug, Clone)]
pub struct LinkStateReconciliation {
    tx: mpsc::UnboundedSender<ReconcileCommand>,
}

impl LinkStateReconciliation {
    /// 启动后台任务；min_interval 为 0 时不节流。需在 tokio 运行时内调用。
    pub fn spawn(min_interval: Duration) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<ReconcileCommand>();
        let mut state = ReconcileState {
            min_interval,
            last_reconciled: None,
        };
        tokio::spawn(async move {
            while let Some(cmd) = rx.recv().await {
                state.handle(cmd);
            }
            tracing::debug!("{} stopped", ACTOR_NAME);
        });
        Self { tx }
    }

    async fn call<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> ReconcileCommand,
    ) -> Result<T, LinkError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(make(reply))
            .map_err(|_| LinkError::ActorUnavailable(ACTOR_NAME))?;
        rx.await.map_err(|_| LinkError::ActorUnavailable(ACTOR_NAME))
    }

    /// 远端优先合并；更新最近对账时间
    pub async fn reconcile(
        &self,
        local: Vec<FriendRecord>,
        remote: Vec<FriendRecord>,
    ) -> Result<Vec<FriendRecord>, LinkError> {
        self.call(|reply| ReconcileCommand::Reconcile { local, remote, reply })
            .await
    }

    /// 节流检查
    pub async fn should_reconcile(&self) -> Result<bool, LinkError> {
        self.call(|reply| ReconcileCommand::ShouldReconcile { reply }).await
    }

    /// 重置节流，下一次检查立即返回 true
    pub async fn invalidate(&self) -> Result<(), LinkError> {
        self.call(|reply| ReconcileCommand::Invalidate { reply }).await
    }

    /// 链接后置条件：对账后的列表里该成员确实链接到了预期账户
    pub async fn validate_link_completion(
        &self,
        member_id: MemberId,
        account_id: AccountId,
        friends: Vec<FriendRecord>,
    ) -> Result<bool, LinkError> {
        self.call(|reply| ReconcileCommand::ValidateLinkCompletion {
            member_id,
            account_id,
            friends,
            reply,
        })
        .await
    }
}
