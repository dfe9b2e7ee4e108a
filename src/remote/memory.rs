//! 内存版后端（用于测试与演示，无需真实服务）
//!
//! 所有表放在一把 Mutex 后面，认领 / 接受在锁内完成「检查 + 修改」，并发重复调用只有一个成功。
//! 提供两个故障注入开关：
//! - `fail_next(n)`：接下来 n 次调用返回 Transient
//! - `set_replication_lag(n)`：每次链接生效后，接下来 n 次好友读取仍返回旧数据（模拟「幻影成功」）

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::LinkBackend;
use crate::core::{Clock, LinkError, SystemClock};
use crate::model::{
    AccountId, AuthContext, FriendRecord, InviteToken, LinkRequest, MemberId,
};

#[derive(Debug, Clone)]
struct FriendRow {
    owner: AccountId,
    record: FriendRecord,
}

#[derive(Debug, Default)]
struct BackendState {
    friends: HashMap<MemberId, FriendRow>,
    invites: HashMap<Uuid, InviteToken>,
    requests: HashMap<Uuid, LinkRequest>,
    fail_next: u32,
    replication_lag: u32,
    /// (剩余陈旧读取次数, 链接生效前的好友表)
    stale_view: Option<(u32, HashMap<MemberId, FriendRow>)>,
}

impl BackendState {
    fn take_injected_failure(&mut self, op: &str) -> Result<(), LinkError> {
        if self.fail_next > 0 {
            self.fail_next -= 1;
            return Err(LinkError::Transient(format!("injected failure in {op}")));
        }
        Ok(())
    }

    /// 目标好友行已链接到其他账户
    fn check_link_conflict(&self, target: MemberId, account: &AccountId) -> Result<(), LinkError> {
        match self.friends.get(&target) {
            Some(row) if row.record.is_linked_elsewhere(account) => Err(LinkError::AlreadyLinkedConflict),
            _ => Ok(()),
        }
    }

    fn link_friend_row(&mut self, owner: &AccountId, target: MemberId, name: &str, account: &AuthContext) {
        if self.replication_lag > 0 {
            self.stale_view = Some((self.replication_lag, self.friends.clone()));
        }
        let row = self.friends.entry(target).or_insert_with(|| FriendRow {
            owner: owner.clone(),
            record: FriendRecord::unlinked(target, name),
        });
        row.record = row
            .record
            .clone()
            .linked_to(account.account_id.clone(), account.email.clone());
    }
}

pub struct InMemoryLinkBackend {
    state: Mutex<BackendState>,
    clock: Arc<dyn Clock>,
    links_applied: AtomicU32,
}

impl Default for InMemoryLinkBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryLinkBackend {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(BackendState::default()),
            clock,
            links_applied: AtomicU32::new(0),
        }
    }

    /// 直接写入一条属于 owner 的好友行
    pub async fn seed_friend(&self, owner: &AccountId, record: FriendRecord) {
        self.state.lock().await.friends.insert(
            record.member_id,
            FriendRow {
                owner: owner.clone(),
                record,
            },
        );
    }

    pub async fn fail_next(&self, calls: u32) {
        self.state.lock().await.fail_next = calls;
    }

    pub async fn set_replication_lag(&self, stale_reads: u32) {
        self.state.lock().await.replication_lag = stale_reads;
    }

    /// 认领 / 接受实际生效的次数
    pub fn links_applied(&self) -> u32 {
        self.links_applied.load(Ordering::SeqCst)
    }

    pub async fn friend_row(&self, member_id: MemberId) -> Option<FriendRecord> {
        self.state
            .lock()
            .await
            .friends
            .get(&member_id)
            .map(|row| row.record.clone())
    }
}

#[async_trait]
impl LinkBackend for InMemoryLinkBackend {
    async fn fetch_friends(&self, caller: &AuthContext) -> Result<Vec<FriendRecord>, LinkError> {
        let mut state = self.state.lock().await;
        state.take_injected_failure("fetch_friends")?;

        let visible = |rows: &HashMap<MemberId, FriendRow>| -> Vec<FriendRecord> {
            rows.values()
                .filter(|row| {
                    row.owner == caller.account_id
                        || row.record.linked_account_id.as_ref() == Some(&caller.account_id)
                })
                .map(|row| row.record.clone())
                .collect()
        };

        if let Some((remaining, rows)) = state.stale_view.as_mut() {
            *remaining -= 1;
            let stale = visible(rows);
            if *remaining == 0 {
                state.stale_view = None;
            }
            return Ok(stale);
        }
        Ok(visible(&state.friends))
    }

    async fn upsert_friend(&self, caller: &AuthContext, friend: &FriendRecord) -> Result<(), LinkError> {
        let mut state = self.state.lock().await;
        state.take_injected_failure("upsert_friend")?;
        let owner = state
            .friends
            .get(&friend.member_id)
            .map(|row| row.owner.clone())
            .unwrap_or_else(|| caller.account_id.clone());
        if owner != caller.account_id {
            return Err(LinkError::NotFound("Friend".to_string()));
        }
        state.friends.insert(
            friend.member_id,
            FriendRow {
                owner,
                record: friend.clone(),
            },
        );
        Ok(())
    }

    async fn create_invite(&self, token: &InviteToken) -> Result<InviteToken, LinkError> {
        let mut state = self.state.lock().await;
        state.take_injected_failure("create_invite")?;
        let stored = state.invites.entry(token.id).or_insert_with(|| token.clone());
        Ok(stored.clone())
    }

    async fn fetch_invite(&self, token_id: Uuid) -> Result<Option<InviteToken>, LinkError> {
        let mut state = self.state.lock().await;
        state.take_injected_failure("fetch_invite")?;
        Ok(state.invites.get(&token_id).cloned())
    }

    async fn claim_invite(&self, token_id: Uuid, claimer: &AuthContext) -> Result<InviteToken, LinkError> {
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        state.take_injected_failure("claim_invite")?;

        let token = state
            .invites
            .get(&token_id)
            .cloned()
            .ok_or_else(|| LinkError::NotFound("Invite".to_string()))?;
        token.check_claimable(&claimer.account_id, now)?;
        state.check_link_conflict(token.target_member_id, &claimer.account_id)?;

        let mut claimed = token;
        claimed.mark_claimed(&claimer.account_id, now)?;
        state.link_friend_row(
            &claimed.creator_id,
            claimed.target_member_id,
            &claimed.target_member_name,
            claimer,
        );
        state.invites.insert(token_id, claimed.clone());
        self.links_applied.fetch_add(1, Ordering::SeqCst);
        Ok(claimed)
    }

    async fn create_link_request(&self, request: &LinkRequest) -> Result<LinkRequest, LinkError> {
        let mut state = self.state.lock().await;
        state.take_injected_failure("create_link_request")?;
        let stored = state
            .requests
            .entry(request.id)
            .or_insert_with(|| request.clone());
        Ok(stored.clone())
    }

    async fn fetch_link_request(&self, request_id: Uuid) -> Result<Option<LinkRequest>, LinkError> {
        let mut state = self.state.lock().await;
        state.take_injected_failure("fetch_link_request")?;
        Ok(state.requests.get(&request_id).cloned())
    }

    async fn incoming_link_requests(&self, recipient_email: &str) -> Result<Vec<LinkRequest>, LinkError> {
        let mut state = self.state.lock().await;
        state.take_injected_failure("incoming_link_requests")?;
        let mut out: Vec<LinkRequest> = state
            .requests
            .values()
            .filter(|r| r.is_addressed_to(recipient_email))
            .cloned()
            .collect();
        out.sort_by_key(|r| (r.created_at, r.id));
        Ok(out)
    }

    async fn outgoing_link_requests(&self, requester: &AccountId) -> Result<Vec<LinkRequest>, LinkError> {
        let mut state = self.state.lock().await;
        state.take_injected_failure("outgoing_link_requests")?;
        let mut out: Vec<LinkRequest> = state
            .requests
            .values()
            .filter(|r| &r.requester_id == requester)
            .cloned()
            .collect();
        out.sort_by_key(|r| (r.created_at, r.id));
        Ok(out)
    }

    async fn accept_link_request(&self, request_id: Uuid, acceptor: &AuthContext) -> Result<LinkRequest, LinkError> {
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        state.take_injected_failure("accept_link_request")?;

        let request = state
            .requests
            .get(&request_id)
            .cloned()
            .ok_or_else(|| LinkError::NotFound("Link request".to_string()))?;
        request.check_acceptable(&acceptor.account_id, now)?;
        state.check_link_conflict(request.target_member_id, &acceptor.account_id)?;

        let mut accepted = request;
        accepted.mark_accepted(&acceptor.account_id, now)?;
        state.link_friend_row(
            &accepted.requester_id,
            accepted.target_member_id,
            &accepted.target_member_name,
            acceptor,
        );
        state.requests.insert(request_id, accepted.clone());
        self.links_applied.fetch_add(1, Ordering::SeqCst);
        Ok(accepted)
    }

    async fn decline_link_request(&self, request_id: Uuid, recipient: &AuthContext) -> Result<LinkRequest, LinkError> {
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        state.take_injected_failure("decline_link_request")?;
        let request = state
            .requests
            .get_mut(&request_id)
            .ok_or_else(|| LinkError::NotFound("Link request".to_string()))?;
        request.mark_declined(&recipient.email, now)?;
        Ok(request.clone())
    }

    async fn cancel_link_request(&self, request_id: Uuid, requester: &AccountId) -> Result<LinkRequest, LinkError> {
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        state.take_injected_failure("cancel_link_request")?;
        let request = state
            .requests
            .get_mut(&request_id)
            .ok_or_else(|| LinkError::NotFound("Link request".to_string()))?;
        request.mark_cancelled(requester, now)?;
        Ok(request.clone())
    }
}
