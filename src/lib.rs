//! Friendlink - 账户链接与身份对账引擎
//!
//! 共享账本中的「占位成员」在对方用真实账户认领后，需要把两个身份合并为一个。
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误分类、时钟、重试策略、取消监管
//! - **model**: 成员 / 账户、好友记录、邀请令牌、链接请求、失败记录
//! - **identity**: 规范身份 / 别名图（带路径压缩的并查集）
//! - **reconcile**: 好友列表合并与串行化对账 actor
//! - **failures**: 链接失败追踪 actor
//! - **remote**: 远端后端抽象与内存实现
//! - **protocol**: 邀请令牌 / 链接请求流程与共享合并序列
//! - **observability**: tracing 初始化

pub mod config;
pub mod core;
pub mod failures;
pub mod identity;
pub mod model;
pub mod observability;
pub mod protocol;
pub mod reconcile;
pub mod remote;

pub use crate::core::{ErrorKind, LinkError, RetryPolicy};
pub use identity::{IdentityGraph, SharedIdentityGraph};
pub use protocol::{spawn_reconciliation_timer, LinkCoordinator, LinkCoordinatorBuilder, LinkOutcome};
