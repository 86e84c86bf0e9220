use crate::message::{AlertChannel, AlertLevel, AlertMessage};
use crate::sink::AlertSink;
use anyhow::Result;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info};

/// 告警投递管理器
///
/// 投递失败只记录日志，绝不向评估任务传播。
pub struct AlertManager {
    /// 渠道注册表
    sinks: Arc<RwLock<HashMap<AlertChannel, Box<dyn AlertSink>>>>,

    /// 最低投递级别
    min_level: AlertLevel,
}

impl AlertManager {
    pub fn new(min_level: AlertLevel) -> Self {
        Self {
            sinks: Arc::new(RwLock::new(HashMap::new())),
            min_level,
        }
    }

    /// 注册投递渠道
    pub async fn register(&self, channel: AlertChannel, sink: Box<dyn AlertSink>) {
        let mut sinks = self.sinks.write().await;
        info!("Registered alert sink: {}", sink.name());
        sinks.insert(channel, sink);
    }

    /// 投递到指定渠道
    pub async fn deliver(&self, channel: AlertChannel, alert: &AlertMessage) -> Result<()> {
        if !self.should_deliver(alert.level) {
            return Ok(());
        }

        let sinks = self.sinks.read().await;

        if let Some(sink) = sinks.get(&channel) {
            if sink.is_enabled() {
                Self::deliver_via(sink.as_ref(), alert).await;
            }
        }

        Ok(())
    }

    /// 投递到全部渠道
    pub async fn broadcast(&self, alert: &AlertMessage) -> Result<()> {
        if !self.should_deliver(alert.level) {
            return Ok(());
        }

        let sinks = self.sinks.read().await;

        for sink in sinks.values() {
            if sink.is_enabled() {
                Self::deliver_via(sink.as_ref(), alert).await;
            }
        }

        Ok(())
    }

    async fn deliver_via(sink: &dyn AlertSink, alert: &AlertMessage) {
        match sink.deliver(alert).await {
            Ok(result) => {
                if result.success {
                    info!(
                        sink = %sink.name(),
                        scope = %alert.scope,
                        "Alert delivered"
                    );
                } else {
                    error!(
                        sink = %sink.name(),
                        scope = %alert.scope,
                        reason = %result.message,
                        "Alert delivery failed"
                    );
                }
            }
            Err(e) => {
                error!(sink = %sink.name(), scope = %alert.scope, error = %e, "Alert delivery error");
            }
        }
    }

    fn should_deliver(&self, level: AlertLevel) -> bool {
        level >= self.min_level
    }
}

impl Default for AlertManager {
    fn default() -> Self {
        Self::new(AlertLevel::Info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::SinkResult;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSink {
        delivered: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl AlertSink for CountingSink {
        async fn deliver(&self, _alert: &AlertMessage) -> Result<SinkResult> {
            self.delivered.fetch_add(1, Ordering::SeqCst);
            Ok(SinkResult::success())
        }

        fn name(&self) -> &str {
            "counting"
        }
    }

    #[tokio::test]
    async fn test_min_level_filters() {
        let delivered = Arc::new(AtomicUsize::new(0));
        let manager = AlertManager::new(AlertLevel::Warning);
        manager
            .register(
                AlertChannel::Log,
                Box::new(CountingSink {
                    delivered: delivered.clone(),
                }),
            )
            .await;

        manager
            .broadcast(&AlertMessage::new(
                "global",
                AlertLevel::Info,
                "informational",
            ))
            .await
            .unwrap();
        assert_eq!(delivered.load(Ordering::SeqCst), 0);

        manager
            .broadcast(&AlertMessage::warning("global", "degradation"))
            .await
            .unwrap();
        assert_eq!(delivered.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_deliver_to_channel() {
        let delivered = Arc::new(AtomicUsize::new(0));
        let manager = AlertManager::default();
        manager
            .register(
                AlertChannel::Log,
                Box::new(CountingSink {
                    delivered: delivered.clone(),
                }),
            )
            .await;

        // 未注册的渠道静默跳过
        manager
            .deliver(
                AlertChannel::Email,
                &AlertMessage::error("bot-01", "cluster"),
            )
            .await
            .unwrap();
        assert_eq!(delivered.load(Ordering::SeqCst), 0);

        manager
            .deliver(AlertChannel::Log, &AlertMessage::error("bot-01", "cluster"))
            .await
            .unwrap();
        assert_eq!(delivered.load(Ordering::SeqCst), 1);
    }
}
