use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;
use vigil_config::Thresholds;

/// 告警抑制闸门
///
/// 每个作用域维护一份已放行告警的时间戳列表，超过 `backoff_time` 的
/// 条目滚动淘汰。窗口内放行数量达到 `backoff_limit` 后拒绝新的放行。
/// 状态只在放行时记录，被抑制的请求不占用配额。
pub struct BackoffGate {
    scopes: RwLock<HashMap<String, Vec<DateTime<Utc>>>>,
}

impl BackoffGate {
    pub fn new() -> Self {
        Self {
            scopes: RwLock::new(HashMap::new()),
        }
    }

    /// 申请放行一次告警，返回是否允许投递
    pub async fn admit(&self, scope: &str, now: DateTime<Utc>, thresholds: &Thresholds) -> bool {
        let mut scopes = self.scopes.write().await;
        let timestamps = scopes.entry(scope.to_lowercase()).or_default();

        let window_start = now - thresholds.backoff_time();
        timestamps.retain(|&ts| ts > window_start);

        if timestamps.len() >= thresholds.backoff_limit {
            debug!(
                scope = %scope,
                recent = timestamps.len(),
                limit = thresholds.backoff_limit,
                "Alert suppressed by backoff"
            );
            return false;
        }
        timestamps.push(now);
        true
    }
}

impl Default for BackoffGate {
    fn default() -> Self {
        Self::new()
    }
}
