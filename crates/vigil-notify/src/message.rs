use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 告警级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AlertLevel {
    /// 信息
    Info,
    /// 警告
    Warning,
    /// 错误
    Error,
    /// 严重
    Critical,
}

/// 告警渠道
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AlertChannel {
    /// 邮件
    Email,
    /// Webhook
    Webhook,
    /// 日志（运维兜底渠道）
    Log,
}

/// 告警覆盖的时间窗口
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// 告警消息
///
/// AlertSink 的投递契约：作用域、级别、摘要、时间窗口、
/// 受影响实体和样本事件。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertMessage {
    /// 告警作用域（"global"、主机名、站点名等）
    pub scope: String,

    /// 级别
    pub level: AlertLevel,

    /// 摘要
    pub summary: String,

    /// 覆盖的时间窗口
    pub window: Option<AlertWindow>,

    /// 受影响的实体
    pub affected_entities: Vec<String>,

    /// 样本事件 ID
    pub sample_events: Vec<Uuid>,

    /// 发出时间
    pub timestamp: DateTime<Utc>,

    /// 额外数据
    pub metadata: Option<serde_json::Value>,
}

impl AlertMessage {
    pub fn new(scope: impl Into<String>, level: AlertLevel, summary: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
            level,
            summary: summary.into(),
            window: None,
            affected_entities: Vec::new(),
            sample_events: Vec::new(),
            timestamp: Utc::now(),
            metadata: None,
        }
    }

    pub fn with_window(mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        self.window = Some(AlertWindow { start, end });
        self
    }

    pub fn with_entities(mut self, entities: Vec<String>) -> Self {
        self.affected_entities = entities;
        self
    }

    pub fn with_samples(mut self, samples: Vec<Uuid>) -> Self {
        self.sample_events = samples;
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// 创建警告级别告警
    pub fn warning(scope: impl Into<String>, summary: impl Into<String>) -> Self {
        Self::new(scope, AlertLevel::Warning, summary)
    }

    /// 创建错误级别告警
    pub fn error(scope: impl Into<String>, summary: impl Into<String>) -> Self {
        Self::new(scope, AlertLevel::Error, summary)
    }

    /// 创建严重级别告警
    pub fn critical(scope: impl Into<String>, summary: impl Into<String>) -> Self {
        Self::new(scope, AlertLevel::Critical, summary)
    }
}
