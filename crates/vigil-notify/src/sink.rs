use crate::message::AlertMessage;
use anyhow::Result;
use async_trait::async_trait;

/// 投递结果
#[derive(Debug, Clone)]
pub struct SinkResult {
    pub success: bool,
    pub message: String,
}

impl SinkResult {
    pub fn success() -> Self {
        Self {
            success: true,
            message: "Alert delivered".to_string(),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

/// 告警投递 trait
#[async_trait]
pub trait AlertSink: Send + Sync {
    /// 投递告警
    async fn deliver(&self, alert: &AlertMessage) -> Result<SinkResult>;

    /// 渠道名称
    fn name(&self) -> &str;

    /// 是否启用
    fn is_enabled(&self) -> bool {
        true
    }
}
