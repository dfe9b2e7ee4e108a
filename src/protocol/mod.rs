//! 链接协议层：邀请令牌与链接请求两条握手流程，共用同一合并序列
//!
//! - **coordinator**: 协调器（本地缓存、刷新、共享合并序列、后台失败重试）
//! - **builder**: 协调器构建器
//! - **guards**: 客户端前置检查
//! - **invite** / **request**: 两条流程
//! - **timer**: 定时对账任务

pub mod builder;
pub mod coordinator;
mod guards;
pub mod invite;
pub mod request;
pub mod timer;

pub use builder::LinkCoordinatorBuilder;
pub use coordinator::{FailureRetrySummary, LinkCoordinator, LinkOutcome};
pub use request::LinkRequestView;
pub use timer::spawn_reconciliation_timer;
