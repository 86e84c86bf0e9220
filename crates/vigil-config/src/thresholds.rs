use chrono::Duration;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use vigil_types::EntityKind;

/// 阈值配置错误
///
/// 评估任务把校验失败当作该轮运行的致命错误上报，
/// 绝不静默回退到默认值。
#[derive(Debug, Error)]
pub enum ThresholdError {
    #[error("threshold `{0}` must be greater than zero")]
    NonPositive(&'static str),

    #[error("cluster_event_ids must not be empty when clustering is enabled")]
    EmptyClusterIds,

    #[error("allow-list `{0}` must not be empty")]
    EmptyAllowList(&'static str),
}

/// 运行时可热更新的阈值配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Thresholds {
    /// bot 静默阈值（秒）
    pub dead_after_bot_secs: u64,

    /// 站点静默阈值（秒）
    pub dead_after_site_secs: u64,

    /// broker 静默阈值（秒），broker 的存活由成功服务的请求定义
    pub dead_after_broker_secs: u64,

    /// 域控制器静默阈值（秒）
    pub dead_after_domain_controller_secs: u64,

    /// 超过该时长的事件不参与任何分析（秒）
    pub ignore_events_older_than_secs: u64,

    /// 参与聚类的 Windows 事件 ID
    pub cluster_event_ids: Vec<u32>,

    /// 聚类时间窗口（秒）
    pub cluster_length_secs: u64,

    /// 触发聚类的失败次数
    pub cluster_size: usize,

    /// 告警抑制窗口（秒）
    pub backoff_time_secs: u64,

    /// 抑制窗口内允许的告警次数
    pub backoff_limit: usize,

    /// UX 降级阈值（秒）
    pub ux_alert_threshold_secs: f64,

    /// UX 聚合检查周期（秒）
    pub ux_alert_interval_secs: u64,

    /// 失败登录告警次数阈值
    pub logon_alert_threshold: usize,

    /// 失败登录统计窗口（秒）
    pub logon_alert_after_secs: u64,

    /// 事件来源白名单
    pub allowed_event_sources: Vec<String>,

    /// Windows 日志名白名单
    pub allowed_windows_logs: Vec<String>,

    /// 属于邮件监控流的事件来源
    pub mail_event_sources: Vec<String>,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            dead_after_bot_secs: 900,
            dead_after_site_secs: 1800,
            dead_after_broker_secs: 600,
            dead_after_domain_controller_secs: 900,
            ignore_events_older_than_secs: 259_200,
            cluster_event_ids: vec![1006, 1007, 1016, 1017],
            cluster_length_secs: 300,
            cluster_size: 5,
            backoff_time_secs: 3600,
            backoff_limit: 3,
            ux_alert_threshold_secs: 15.0,
            ux_alert_interval_secs: 300,
            logon_alert_threshold: 10,
            logon_alert_after_secs: 3600,
            allowed_event_sources: vec![
                "ControlUp Logon Monitor".to_string(),
                "VIGIL Mail Monitor".to_string(),
            ],
            allowed_windows_logs: vec!["Application".to_string()],
            mail_event_sources: vec!["VIGIL Mail Monitor".to_string()],
        }
    }
}

impl Thresholds {
    /// 校验配置
    pub fn validate(&self) -> Result<(), ThresholdError> {
        macro_rules! positive {
            ($field:ident) => {
                if self.$field == 0 {
                    return Err(ThresholdError::NonPositive(stringify!($field)));
                }
            };
        }
        positive!(dead_after_bot_secs);
        positive!(dead_after_site_secs);
        positive!(dead_after_broker_secs);
        positive!(dead_after_domain_controller_secs);
        positive!(ignore_events_older_than_secs);
        positive!(cluster_length_secs);
        positive!(cluster_size);
        positive!(backoff_time_secs);
        positive!(backoff_limit);
        positive!(ux_alert_interval_secs);
        positive!(logon_alert_threshold);
        positive!(logon_alert_after_secs);

        if self.ux_alert_threshold_secs <= 0.0 {
            return Err(ThresholdError::NonPositive("ux_alert_threshold_secs"));
        }
        if self.cluster_event_ids.is_empty() {
            return Err(ThresholdError::EmptyClusterIds);
        }
        if self.allowed_event_sources.is_empty() {
            return Err(ThresholdError::EmptyAllowList("allowed_event_sources"));
        }
        if self.allowed_windows_logs.is_empty() {
            return Err(ThresholdError::EmptyAllowList("allowed_windows_logs"));
        }
        Ok(())
    }

    /// 实体类型对应的静默阈值
    pub fn dead_after(&self, kind: EntityKind) -> Duration {
        let secs = match kind {
            EntityKind::Bot => self.dead_after_bot_secs,
            EntityKind::Site => self.dead_after_site_secs,
            EntityKind::Broker => self.dead_after_broker_secs,
            EntityKind::DomainController => self.dead_after_domain_controller_secs,
        };
        Duration::seconds(secs as i64)
    }

    pub fn ignore_events_older_than(&self) -> Duration {
        Duration::seconds(self.ignore_events_older_than_secs as i64)
    }

    pub fn cluster_length(&self) -> Duration {
        Duration::seconds(self.cluster_length_secs as i64)
    }

    pub fn backoff_time(&self) -> Duration {
        Duration::seconds(self.backoff_time_secs as i64)
    }

    pub fn logon_alert_after(&self) -> Duration {
        Duration::seconds(self.logon_alert_after_secs as i64)
    }
}
