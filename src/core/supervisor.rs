//! 链接会话监管：取消令牌与后台任务生命周期
//!
//! 上层（UI / 会话）销毁时调用 shutdown，所有进行中的重试循环在下一个退避边界或 await 点退出；
//! 每个认领 / 接受流程和对账定时器各自拿一个子 token。

use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
pub struct LinkSupervisor {
    root: CancellationToken,
}

impl LinkSupervisor {
    pub fn new() -> Self {
        Self {
            root: CancellationToken::new(),
        }
    }

    pub fn token(&self) -> CancellationToken {
        self.root.clone()
    }

    /// 为单个流程创建子 token（取消它不影响其他流程）
    pub fn child_token(&self) -> CancellationToken {
        self.root.child_token()
    }

    pub fn shutdown(&self) {
        tracing::info!("Link supervisor shutting down, cancelling in-flight flows");
        self.root.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.root.is_cancelled()
    }
}

impl Default for LinkSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shutdown_cancels_children() {
        let supervisor = LinkSupervisor::new();
        let child = supervisor.child_token();
        assert!(!child.is_cancelled());
        supervisor.shutdown();
        assert!(child.is_cancelled());
        assert!(supervisor.is_shutdown());
    }

    #[test]
    fn test_child_cancel_is_isolated() {
        let supervisor = LinkSupervisor::new();
        let a = supervisor.child_token();
        let b = supervisor.child_token();
        a.cancel();
        assert!(!b.is_cancelled());
        assert!(!supervisor.is_shutdown());
    }
}
