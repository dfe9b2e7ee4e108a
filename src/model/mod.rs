//! 数据模型：成员 / 账户标识、好友记录、邀请令牌、链接请求、失败记录

pub mod failure;
pub mod friend;
pub mod invite;
pub mod member;
pub mod request;

pub use failure::LinkFailureRecord;
pub use friend::{FriendRecord, LinkStatus};
pub use invite::{InviteState, InviteToken};
pub use member::{normalize_email, AccountId, AuthContext, MemberId};
pub use request::{LinkRequest, LinkRequestStatus};
