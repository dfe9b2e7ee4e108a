//! 协调器构建器：统一的初始化逻辑（配置 → 重试策略 / 节流 / 有效期 / actor）

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;

use super::LinkCoordinator;
use crate::config::{ttl_from_days, AppConfig};
use crate::core::{Clock, LinkError, LinkSupervisor, RetryPolicy, SystemClock};
use crate::failures::LinkFailureTracker;
use crate::identity::SharedIdentityGraph;
use crate::model::AuthContext;
use crate::reconcile::LinkStateReconciliation;
use crate::remote::LinkBackend;

/// 协调器构建器。`build` 会启动两个 actor，需在 tokio 运行时内调用。
pub struct LinkCoordinatorBuilder {
    auth: AuthContext,
    backend: Arc<dyn LinkBackend>,
    config: AppConfig,
    clock: Arc<dyn Clock>,
    graph: Option<SharedIdentityGraph>,
    retry: Option<RetryPolicy>,
    supervisor: Option<LinkSupervisor>,
    timer_interval: Option<Duration>,
}

impl LinkCoordinatorBuilder {
    pub fn new(auth: AuthContext, backend: Arc<dyn LinkBackend>) -> Self {
        Self {
            auth,
            backend,
            config: AppConfig::default(),
            clock: Arc::new(SystemClock),
            graph: None,
            retry: None,
            supervisor: None,
            timer_interval: None,
        }
    }

    pub fn with_config(mut self, config: AppConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// 共享一张身份图（例如同一设备上的多个会话）
    pub fn with_graph(mut self, graph: SharedIdentityGraph) -> Self {
        self.graph = Some(graph);
        self
    }

    /// 覆盖由配置推导出的重试策略
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = Some(retry);
        self
    }

    /// 挂到已有的监管器下，随其一起取消
    pub fn with_supervisor(mut self, supervisor: LinkSupervisor) -> Self {
        self.supervisor = Some(supervisor);
        self
    }

    /// 覆盖定时对账间隔（配置里按秒计）
    pub fn with_timer_interval(mut self, interval: Duration) -> Self {
        self.timer_interval = Some(interval);
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// 先校验配置再构建；越界配置返回 LinkError::Config
    pub fn try_build(self) -> Result<LinkCoordinator, LinkError> {
        self.config.validate()?;
        Ok(self.build())
    }

    /// 越界的有效期会被收敛到合法范围
    pub fn build(self) -> LinkCoordinator {
        let min_interval = Duration::from_secs(self.config.reconciliation.min_interval_secs);
        let retry = self
            .retry
            .unwrap_or_else(|| RetryPolicy::from_config(&self.config.retry));

        tracing::debug!(
            "Building link coordinator for {} (retry: {:?}, throttle: {:?})",
            self.auth.account_id,
            retry,
            min_interval
        );

        LinkCoordinator {
            backend: self.backend,
            graph: self.graph.unwrap_or_default(),
            reconciliation: LinkStateReconciliation::spawn(min_interval),
            failures: LinkFailureTracker::spawn_with_clock(self.clock.clone()),
            retry,
            clock: self.clock,
            supervisor: self.supervisor.unwrap_or_default(),
            token_ttl: ttl_from_days(self.config.invites.token_ttl_days),
            request_ttl: ttl_from_days(self.config.invites.request_ttl_days),
            max_background_retries: self.config.failures.max_background_retries,
            timer_interval: self
                .timer_interval
                .unwrap_or_else(|| Duration::from_secs(self.config.reconciliation.timer_interval_secs)),
            friends: RwLock::new(Vec::new()),
            auth: self.auth,
        }
    }
}
