//! 链接错误类型与稳定错误分类
//!
//! UI 侧只需按 ErrorKind 分支，无需字符串匹配；每个错误自带简短描述与（可选的）恢复建议。

use thiserror::Error;

/// 链接 / 对账过程中可能出现的错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LinkError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("This link has expired")]
    Expired,

    #[error("This link has already been used")]
    AlreadyTerminal,

    #[error("You cannot link a friend to your own account")]
    SelfLinkNotAllowed,

    #[error("This friend is already linked to another account")]
    AlreadyLinkedConflict,

    #[error("Merging these identities would create a cycle")]
    CycleRejected,

    #[error("Network error: {0}")]
    Transient(String),

    #[error("Operation timed out")]
    Timeout,

    /// 干净地中止，不作为用户可见错误
    #[error("Operation cancelled")]
    Cancelled,

    /// 对账 / 失败追踪 actor 已退出
    #[error("{0} is no longer running")]
    ActorUnavailable(&'static str),

    #[error("Config error: {0}")]
    Config(String),
}

/// 稳定、可枚举的错误类别（供 UI 映射）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    Expired,
    AlreadyTerminal,
    SelfLinkNotAllowed,
    AlreadyLinkedConflict,
    CycleRejected,
    Transient,
    Cancelled,
    Internal,
}

impl LinkError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LinkError::NotFound(_) => ErrorKind::NotFound,
            LinkError::Expired => ErrorKind::Expired,
            LinkError::AlreadyTerminal => ErrorKind::AlreadyTerminal,
            LinkError::SelfLinkNotAllowed => ErrorKind::SelfLinkNotAllowed,
            LinkError::AlreadyLinkedConflict => ErrorKind::AlreadyLinkedConflict,
            LinkError::CycleRejected => ErrorKind::CycleRejected,
            LinkError::Transient(_) | LinkError::Timeout => ErrorKind::Transient,
            LinkError::Cancelled => ErrorKind::Cancelled,
            LinkError::ActorUnavailable(_) | LinkError::Config(_) => ErrorKind::Internal,
        }
    }

    /// 默认重试判定：只有网络类错误（含单次超时）可重试，守卫失败一律终止
    pub fn is_retryable(&self) -> bool {
        matches!(self, LinkError::Transient(_) | LinkError::Timeout)
    }

    /// 守卫检查失败：确定性、终止性
    pub fn is_guard_failure(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::NotFound
                | ErrorKind::Expired
                | ErrorKind::AlreadyTerminal
                | ErrorKind::SelfLinkNotAllowed
                | ErrorKind::AlreadyLinkedConflict
                | ErrorKind::CycleRejected
        )
    }

    /// 面向用户的恢复建议
    pub fn recovery_suggestion(&self) -> Option<&'static str> {
        match self {
            LinkError::NotFound(_) => Some("Check the link and try again."),
            LinkError::Expired => Some("Ask the sender for a new link."),
            LinkError::AlreadyTerminal => {
                Some("This invite was already used. Ask the sender for a new link if needed.")
            }
            LinkError::SelfLinkNotAllowed => {
                Some("Share the link with the friend it was created for.")
            }
            LinkError::AlreadyLinkedConflict => {
                Some("Ask the sender to check which account this friend belongs to.")
            }
            LinkError::Transient(_) | LinkError::Timeout => {
                Some("Check your connection and try again.")
            }
            LinkError::CycleRejected
            | LinkError::Cancelled
            | LinkError::ActorUnavailable(_)
            | LinkError::Config(_) => None,
        }
    }
}
