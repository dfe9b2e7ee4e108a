//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `FRIENDLINK__*` 覆盖（双下划线表示嵌套，如 `FRIENDLINK__RETRY__MAX_ATTEMPTS=3`）。

use std::path::PathBuf;

use serde::Deserialize;

use crate::core::LinkError;

/// 有效期上限（天）
pub const MAX_TTL_DAYS: i64 = 3650;
/// 退避上限（毫秒）
pub const MAX_DELAY_MS: u64 = 3_600_000;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    #[serde(default)]
    pub retry: RetrySection,
    #[serde(default)]
    pub reconciliation: ReconciliationSection,
    #[serde(default)]
    pub invites: InvitesSection,
    #[serde(default)]
    pub failures: FailuresSection,
}

/// [retry] 段：网络调用的重试预算
#[derive(Debug, Clone, Deserialize)]
pub struct RetrySection {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// 抖动比例，0.0 ~ 1.0
    #[serde(default = "default_jitter_factor")]
    pub jitter_factor: f64,
    /// 单次尝试超时（毫秒），不设则不限
    #[serde(default = "default_per_attempt_timeout_ms")]
    pub per_attempt_timeout_ms: Option<u64>,
}

fn default_max_attempts() -> u32 {
    5
}

fn default_base_delay_ms() -> u64 {
    100
}

fn default_max_delay_ms() -> u64 {
    2000
}

fn default_jitter_factor() -> f64 {
    0.25
}

fn default_per_attempt_timeout_ms() -> Option<u64> {
    Some(10_000)
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            jitter_factor: default_jitter_factor(),
            per_attempt_timeout_ms: default_per_attempt_timeout_ms(),
        }
    }
}

/// [reconciliation] 段：节流间隔与定时对账周期
#[derive(Debug, Clone, Deserialize)]
pub struct ReconciliationSection {
    /// 两次对账之间的最小间隔（秒）
    #[serde(default = "default_min_interval_secs")]
    pub min_interval_secs: u64,
    /// 定时器周期（秒）
    #[serde(default = "default_timer_interval_secs")]
    pub timer_interval_secs: u64,
}

fn default_min_interval_secs() -> u64 {
    30
}

fn default_timer_interval_secs() -> u64 {
    60
}

impl Default for ReconciliationSection {
    fn default() -> Self {
        Self {
            min_interval_secs: default_min_interval_secs(),
            timer_interval_secs: default_timer_interval_secs(),
        }
    }
}

/// [invites] 段：邀请令牌与链接请求的有效期
#[derive(Debug, Clone, Deserialize)]
pub struct InvitesSection {
    #[serde(default = "default_ttl_days")]
    pub token_ttl_days: i64,
    #[serde(default = "default_ttl_days")]
    pub request_ttl_days: i64,
}

fn default_ttl_days() -> i64 {
    30
}

impl Default for InvitesSection {
    fn default() -> Self {
        Self {
            token_ttl_days: default_ttl_days(),
            request_ttl_days: default_ttl_days(),
        }
    }
}

/// [failures] 段：后台重试上限（达到后只保留记录，供「需要处理」界面展示）
#[derive(Debug, Clone, Deserialize)]
pub struct FailuresSection {
    #[serde(default = "default_max_background_retries")]
    pub max_background_retries: u32,
}

fn default_max_background_retries() -> u32 {
    10
}

impl Default for FailuresSection {
    fn default() -> Self {
        Self {
            max_background_retries: default_max_background_retries(),
        }
    }
}

impl AppConfig {
    /// 校验取值范围；越界的时长会让 chrono / Duration 运算溢出
    pub fn validate(&self) -> Result<(), LinkError> {
        for (key, days) in [
            ("invites.token_ttl_days", self.invites.token_ttl_days),
            ("invites.request_ttl_days", self.invites.request_ttl_days),
        ] {
            if !(1..=MAX_TTL_DAYS).contains(&days) {
                return Err(LinkError::Config(format!(
                    "{key} must be between 1 and {MAX_TTL_DAYS}, got {days}"
                )));
            }
        }
        let retry = &self.retry;
        if retry.max_delay_ms > MAX_DELAY_MS || retry.base_delay_ms > retry.max_delay_ms {
            return Err(LinkError::Config(format!(
                "retry delays must satisfy base_delay_ms <= max_delay_ms <= {MAX_DELAY_MS}, got {} / {}",
                retry.base_delay_ms, retry.max_delay_ms
            )));
        }
        if !(0.0..=1.0).contains(&retry.jitter_factor) {
            return Err(LinkError::Config(format!(
                "retry.jitter_factor must be within 0.0..=1.0, got {}",
                retry.jitter_factor
            )));
        }
        Ok(())
    }
}

/// 有效期天数收敛到 [1, MAX_TTL_DAYS]，保证换算不会溢出
pub fn ttl_from_days(days: i64) -> chrono::Duration {
    chrono::Duration::days(days.clamp(1, MAX_TTL_DAYS))
}

/// 从 config 目录加载配置，环境变量 FRIENDLINK__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 FRIENDLINK__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("FRIENDLINK")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    let cfg: AppConfig = c.try_deserialize()?;
    cfg.validate()
        .map_err(|e| config::ConfigError::Message(e.to_string()))?;
    Ok(cfg)
}

/// 直接解析 TOML 文本（嵌入式场景 / 测试）
pub fn parse_config_str(raw: &str) -> Result<AppConfig, toml::de::Error> {
    toml::from_str(raw)
}
