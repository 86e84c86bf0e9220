use crate::query::EventQuery;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;
use vigil_types::{EntityKind, Event, MonitoredEntity, TelemetryStream};

/// 事件存储 trait
///
/// 持久化引擎本身是外部协作方，这里只定义监控引擎需要的查询面。
#[async_trait]
pub trait EventStore: Send + Sync {
    /// 写入事件
    async fn append(&self, event: Event) -> anyhow::Result<()>;

    /// 查询事件（时间升序）
    async fn query(&self, query: &EventQuery) -> anyhow::Result<Vec<Event>>;

    /// 按 ID 取事件
    async fn get_event(&self, id: Uuid) -> anyhow::Result<Option<Event>>;

    /// 推进实体 last_seen（单调；未注册的实体自动按启用状态注册）
    async fn upsert_entity_last_seen(
        &self,
        kind: EntityKind,
        key: &str,
        stream: TelemetryStream,
        timestamp: DateTime<Utc>,
    ) -> anyhow::Result<()>;

    /// 注册实体（已存在则覆盖站点与启用状态，保留 last_seen）
    async fn register_entity(&self, entity: MonitoredEntity) -> anyhow::Result<()>;

    /// 启用 / 禁用实体
    async fn set_entity_enabled(
        &self,
        kind: EntityKind,
        key: &str,
        enabled: bool,
    ) -> anyhow::Result<()>;

    /// 取单个实体
    async fn get_entity(
        &self,
        kind: EntityKind,
        key: &str,
    ) -> anyhow::Result<Option<MonitoredEntity>>;

    /// 列出某类型全部实体
    async fn list_entities(&self, kind: EntityKind) -> anyhow::Result<Vec<MonitoredEntity>>;

    /// 列出某类型启用的实体
    async fn list_enabled_entities(&self, kind: EntityKind)
        -> anyhow::Result<Vec<MonitoredEntity>>;
}
