use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use vigil_config::Thresholds;
use vigil_store::{EventQuery, EventStore};
use vigil_types::{EventState, TelemetryStream};

/// 某主机失败登录次数越限
#[derive(Debug, Clone)]
pub struct FailedLogonBreach {
    pub source_host: String,
    pub count: usize,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
}

/// 失败登录监控
///
/// 统计 `logon_alert_after` 窗口内每台主机的失败登录次数，
/// 达到 `logon_alert_threshold` 即上报。
pub struct FailedLogonMonitor {
    store: Arc<dyn EventStore>,
}

impl FailedLogonMonitor {
    pub fn new(store: Arc<dyn EventStore>) -> Self {
        Self { store }
    }

    pub async fn evaluate(
        &self,
        now: DateTime<Utc>,
        thresholds: &Thresholds,
    ) -> anyhow::Result<Vec<FailedLogonBreach>> {
        let window_start = std::cmp::max(
            now - thresholds.logon_alert_after(),
            now - thresholds.ignore_events_older_than(),
        );
        let query = EventQuery::new()
            .after(window_start)
            .until(now)
            .state(EventState::Failed)
            .stream(TelemetryStream::Logon);
        let events = self.store.query(&query).await?;

        let mut counts: BTreeMap<String, usize> = BTreeMap::new();
        for event in &events {
            *counts.entry(event.source_host.to_lowercase()).or_default() += 1;
        }

        Ok(counts
            .into_iter()
            .filter(|(_, count)| *count >= thresholds.logon_alert_threshold)
            .map(|(source_host, count)| FailedLogonBreach {
                source_host,
                count,
                window_start,
                window_end: now,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use vigil_store::MemoryEventStore;
    use vigil_types::Event;

    async fn append_failures(store: &MemoryEventStore, host: &str, now: DateTime<Utc>, n: usize) {
        for i in 0..n {
            store
                .append(Event::failed(
                    host,
                    now - Duration::seconds(i as i64 * 60),
                    "Logon timeout",
                    None,
                    "raw",
                ))
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_threshold_reached_reports_host() {
        let now = Utc::now();
        let store = Arc::new(MemoryEventStore::new());
        append_failures(&store, "bot-01", now, 10).await;
        append_failures(&store, "bot-02", now, 3).await;
        let monitor = FailedLogonMonitor::new(store);

        let breaches = monitor.evaluate(now, &Thresholds::default()).await.unwrap();

        assert_eq!(breaches.len(), 1);
        assert_eq!(breaches[0].source_host, "bot-01");
        assert_eq!(breaches[0].count, 10);
    }

    #[tokio::test]
    async fn test_below_threshold_is_quiet() {
        let now = Utc::now();
        let store = Arc::new(MemoryEventStore::new());
        append_failures(&store, "bot-01", now, 9).await;
        let monitor = FailedLogonMonitor::new(store);

        let breaches = monitor.evaluate(now, &Thresholds::default()).await.unwrap();
        assert!(breaches.is_empty());
    }

    #[tokio::test]
    async fn test_old_failures_age_out() {
        let now = Utc::now();
        let store = Arc::new(MemoryEventStore::new());
        // 窗口外的失败不计入
        append_failures(&store, "bot-01", now - Duration::hours(2), 10).await;
        append_failures(&store, "bot-01", now, 2).await;
        let monitor = FailedLogonMonitor::new(store);

        let breaches = monitor.evaluate(now, &Thresholds::default()).await.unwrap();
        assert!(breaches.is_empty());
    }
}
