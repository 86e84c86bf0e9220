use chrono::{DateTime, Duration, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;
use vigil_config::Thresholds;
use vigil_store::{EventQuery, EventStore};
use vigil_types::{EntityKind, EventState, MonitoredEntity, TelemetryStream};

/// 实体存活追踪器
///
/// dead = 启用实体集合 − 窗口内活跃实体集合（单边差集）。
/// 活跃但未注册或已禁用的实体只记录日志，不参与判定。
pub struct LivenessTracker {
    store: Arc<dyn EventStore>,
}

impl LivenessTracker {
    pub fn new(store: Arc<dyn EventStore>) -> Self {
        Self { store }
    }

    /// 窗口内无事件的启用实体，按 last_seen 升序（最久未见排最前）
    ///
    /// broker 的存活由成功服务的请求定义，只统计 Successful 事件。
    /// 超过 `ignore_events_older_than` 的事件不参与判定。
    pub async fn dead_entities(
        &self,
        kind: EntityKind,
        stream: Option<TelemetryStream>,
        now: DateTime<Utc>,
        window: Duration,
        thresholds: &Thresholds,
    ) -> anyhow::Result<Vec<MonitoredEntity>> {
        let after = std::cmp::max(now - window, now - thresholds.ignore_events_older_than());

        let mut query = EventQuery::new().after(after).until(now);
        if let Some(stream) = stream {
            query = query.stream(stream);
        }
        if kind == EntityKind::Broker {
            query = query.state(EventState::Successful);
        }
        let events = self.store.query(&query).await?;

        let mut live: HashSet<String> = HashSet::new();
        for event in &events {
            match kind {
                EntityKind::Bot | EntityKind::DomainController => {
                    live.insert(event.source_host.to_lowercase());
                }
                EntityKind::Site => {
                    if let Some(site) = &event.site {
                        live.insert(site.to_lowercase());
                    }
                }
                EntityKind::Broker => {
                    if let Some(broker) = &event.broker {
                        live.insert(broker.to_lowercase());
                    }
                }
            }
        }

        let enabled = self.store.list_enabled_entities(kind).await?;
        let enabled_keys: HashSet<String> = enabled.iter().map(|e| e.key.to_lowercase()).collect();
        for key in live.difference(&enabled_keys) {
            debug!(kind = %kind, key = %key, "Active entity not in enabled registry");
        }

        let mut dead: Vec<MonitoredEntity> = enabled
            .into_iter()
            .filter(|entity| !live.contains(&entity.key.to_lowercase()))
            .collect();
        // 从未上报的实体（last_seen 为 None）排最前
        dead.sort_by_key(|entity| match stream {
            Some(stream) => entity.last_seen.get(&stream).copied(),
            None => entity.latest_seen(),
        });
        Ok(dead)
    }
}
