use crate::query::EventQuery;
use crate::store::EventStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;
use vigil_types::{EntityKind, Event, MonitoredEntity, TelemetryStream};

/// 内存事件存储
///
/// 供单进程部署和测试使用；并发 append 安全。
/// 已过期（`is_expired`）的事件不出现在查询结果中。
pub struct MemoryEventStore {
    events: Arc<RwLock<Vec<Event>>>,
    entities: Arc<RwLock<HashMap<(EntityKind, String), MonitoredEntity>>>,
}

impl MemoryEventStore {
    pub fn new() -> Self {
        Self {
            events: Arc::new(RwLock::new(Vec::new())),
            entities: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    fn entity_key(kind: EntityKind, key: &str) -> (EntityKind, String) {
        (kind, key.to_lowercase())
    }
}

impl Default for MemoryEventStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventStore for MemoryEventStore {
    async fn append(&self, event: Event) -> anyhow::Result<()> {
        let mut events = self.events.write().await;
        debug!(
            event_id = %event.id,
            source_host = %event.source_host,
            state = ?event.state,
            "Event appended"
        );
        events.push(event);
        Ok(())
    }

    async fn query(&self, query: &EventQuery) -> anyhow::Result<Vec<Event>> {
        let events = self.events.read().await;

        let mut matched: Vec<Event> = events
            .iter()
            .filter(|e| !e.is_expired && query.matches(e))
            .cloned()
            .collect();

        matched.sort_by_key(|e| e.timestamp);

        if let Some(limit) = query.limit {
            if matched.len() > limit {
                matched = matched.split_off(matched.len() - limit);
            }
        }

        Ok(matched)
    }

    async fn get_event(&self, id: Uuid) -> anyhow::Result<Option<Event>> {
        let events = self.events.read().await;
        Ok(events.iter().find(|e| e.id == id).cloned())
    }

    async fn upsert_entity_last_seen(
        &self,
        kind: EntityKind,
        key: &str,
        stream: TelemetryStream,
        timestamp: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        let mut entities = self.entities.write().await;
        let entity = entities
            .entry(Self::entity_key(kind, key))
            .or_insert_with(|| MonitoredEntity::new(kind, key));
        entity.advance_last_seen(stream, timestamp);
        Ok(())
    }

    async fn register_entity(&self, entity: MonitoredEntity) -> anyhow::Result<()> {
        let mut entities = self.entities.write().await;
        let map_key = Self::entity_key(entity.kind, &entity.key);
        match entities.get_mut(&map_key) {
            Some(existing) => {
                existing.site = entity.site;
                existing.enabled = entity.enabled;
            }
            None => {
                entities.insert(map_key, entity);
            }
        }
        Ok(())
    }

    async fn set_entity_enabled(
        &self,
        kind: EntityKind,
        key: &str,
        enabled: bool,
    ) -> anyhow::Result<()> {
        let mut entities = self.entities.write().await;
        match entities.get_mut(&Self::entity_key(kind, key)) {
            Some(entity) => {
                entity.enabled = enabled;
                Ok(())
            }
            None => anyhow::bail!("entity not found: {} {}", kind, key),
        }
    }

    async fn get_entity(
        &self,
        kind: EntityKind,
        key: &str,
    ) -> anyhow::Result<Option<MonitoredEntity>> {
        let entities = self.entities.read().await;
        Ok(entities.get(&Self::entity_key(kind, key)).cloned())
    }

    async fn list_entities(&self, kind: EntityKind) -> anyhow::Result<Vec<MonitoredEntity>> {
        let entities = self.entities.read().await;
        Ok(entities
            .values()
            .filter(|e| e.kind == kind)
            .cloned()
            .collect())
    }

    async fn list_enabled_entities(
        &self,
        kind: EntityKind,
    ) -> anyhow::Result<Vec<MonitoredEntity>> {
        let entities = self.entities.read().await;
        Ok(entities
            .values()
            .filter(|e| e.kind == kind && e.enabled)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use vigil_types::EventState;

    fn event_at(host: &str, timestamp: DateTime<Utc>) -> Event {
        Event::undetermined(host, timestamp, "raw")
    }

    #[tokio::test]
    async fn test_query_time_range_and_order() {
        let store = MemoryEventStore::new();
        let now = Utc::now();

        store.append(event_at("bot-01", now - Duration::minutes(10))).await.unwrap();
        store.append(event_at("bot-01", now)).await.unwrap();
        store.append(event_at("bot-01", now - Duration::minutes(5))).await.unwrap();

        let query = EventQuery::new().after(now - Duration::minutes(6));
        let result = store.query(&query).await.unwrap();

        assert_eq!(result.len(), 2);
        assert!(result[0].timestamp < result[1].timestamp);
    }

    #[tokio::test]
    async fn test_query_filters() {
        let store = MemoryEventStore::new();
        let now = Utc::now();

        let mut failed = Event::failed("bot-01", now, "Timeout", None, "raw");
        failed.event_code = Some(1006);
        store.append(failed).await.unwrap();
        store.append(event_at("bot-02", now)).await.unwrap();

        let query = EventQuery::new()
            .source_host("BOT-01")
            .state(EventState::Failed)
            .event_codes(vec![1006]);
        let result = store.query(&query).await.unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].source_host, "bot-01");
    }

    #[tokio::test]
    async fn test_expired_events_hidden() {
        let store = MemoryEventStore::new();
        let mut event = event_at("bot-01", Utc::now());
        event.is_expired = true;
        store.append(event).await.unwrap();

        let result = store.query(&EventQuery::new()).await.unwrap();
        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn test_upsert_registers_and_advances() {
        let store = MemoryEventStore::new();
        let now = Utc::now();

        store
            .upsert_entity_last_seen(EntityKind::Bot, "bot-01", TelemetryStream::Logon, now)
            .await
            .unwrap();
        // 回退的时间戳不生效
        store
            .upsert_entity_last_seen(
                EntityKind::Bot,
                "bot-01",
                TelemetryStream::Logon,
                now - Duration::hours(1),
            )
            .await
            .unwrap();

        let entity = store.get_entity(EntityKind::Bot, "bot-01").await.unwrap().unwrap();
        assert!(entity.enabled);
        assert_eq!(entity.last_seen[&TelemetryStream::Logon], now);
    }

    #[tokio::test]
    async fn test_enabled_filter() {
        let store = MemoryEventStore::new();
        store
            .register_entity(MonitoredEntity::new(EntityKind::Bot, "bot-01"))
            .await
            .unwrap();
        store
            .register_entity(MonitoredEntity::new(EntityKind::Bot, "bot-02"))
            .await
            .unwrap();
        store
            .set_entity_enabled(EntityKind::Bot, "bot-02", false)
            .await
            .unwrap();

        let enabled = store.list_enabled_entities(EntityKind::Bot).await.unwrap();
        assert_eq!(enabled.len(), 1);
        assert_eq!(enabled[0].key, "bot-01");

        let all = store.list_entities(EntityKind::Bot).await.unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_append() {
        let store = Arc::new(MemoryEventStore::new());
        let now = Utc::now();

        let mut handles = Vec::new();
        for i in 0..50 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .append(event_at(&format!("bot-{:02}", i % 5), now))
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let result = store.query(&EventQuery::new()).await.unwrap();
        assert_eq!(result.len(), 50);
    }
}
