//! 远端权威后端抽象
//!
//! 好友列表读取与创建 / 拒绝 / 撤回均幂等，可安全重试；认领与接受是一次性的，
//! 对已终态实体重复调用返回稳定的 AlreadyTerminal，绝不重复生效。

use async_trait::async_trait;
use uuid::Uuid;

use crate::core::LinkError;
use crate::model::{AccountId, AuthContext, FriendRecord, InviteToken, LinkRequest};

#[async_trait]
pub trait LinkBackend: Send + Sync {
    /// 调用方可见的好友行（自己创建的，或已链接到自己的）
    async fn fetch_friends(&self, caller: &AuthContext) -> Result<Vec<FriendRecord>, LinkError>;

    /// 按 member_id 写入 / 覆盖一条好友行
    async fn upsert_friend(&self, caller: &AuthContext, friend: &FriendRecord) -> Result<(), LinkError>;

    /// 同 id 重复创建返回已有令牌
    async fn create_invite(&self, token: &InviteToken) -> Result<InviteToken, LinkError>;

    async fn fetch_invite(&self, token_id: Uuid) -> Result<Option<InviteToken>, LinkError>;

    /// 一次性认领；成功时同时把目标好友行链接到 claimer
    async fn claim_invite(&self, token_id: Uuid, claimer: &AuthContext) -> Result<InviteToken, LinkError>;

    async fn create_link_request(&self, request: &LinkRequest) -> Result<LinkRequest, LinkError>;

    async fn fetch_link_request(&self, request_id: Uuid) -> Result<Option<LinkRequest>, LinkError>;

    async fn incoming_link_requests(&self, recipient_email: &str) -> Result<Vec<LinkRequest>, LinkError>;

    async fn outgoing_link_requests(&self, requester: &AccountId) -> Result<Vec<LinkRequest>, LinkError>;

    /// 一次性接受；成功时同时把目标好友行链接到 acceptor
    async fn accept_link_request(&self, request_id: Uuid, acceptor: &AuthContext) -> Result<LinkRequest, LinkError>;

    /// 只有接收方可拒绝；其他调用方得到 NotFound
    async fn decline_link_request(&self, request_id: Uuid, recipient: &AuthContext) -> Result<LinkRequest, LinkError>;

    async fn cancel_link_request(&self, request_id: Uuid, requester: &AccountId) -> Result<LinkRequest, LinkError>;
}
