//! 成员 / 账户标识

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 一个人（好友、参与者或自己）的稳定标识，创建后不可变
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemberId(pub Uuid);

impl MemberId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MemberId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<Uuid> for MemberId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

/// 远端账户标识（认证系统下发的不透明 uid）
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(pub String);

impl AccountId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 调用方身份（由认证协作方提供）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthContext {
    pub account_id: AccountId,
    pub email: String,
    pub display_name: String,
    /// 账户自身在身份图中的成员标识
    pub member_id: MemberId,
}

impl AuthContext {
    pub fn new(account_id: impl Into<String>, email: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            account_id: AccountId::new(account_id),
            email: email.into(),
            display_name: display_name.into(),
            member_id: MemberId::new(),
        }
    }

    pub fn with_member_id(mut self, member_id: MemberId) -> Self {
        self.member_id = member_id;
        self
    }

    /// 邮箱比较忽略大小写与首尾空白
    pub fn owns_email(&self, email: &str) -> bool {
        normalize_email(&self.email) == normalize_email(email)
    }
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
