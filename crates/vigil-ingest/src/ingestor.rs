use crate::parser::{EventParser, ParseError};
use crate::payload::TelemetryRecord;
use crate::resolver::HostResolver;
use std::net::IpAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error, info};
use vigil_config::{ConfigManager, Thresholds};
use vigil_store::EventStore;
use vigil_types::{EntityKind, Event, TelemetryStream};

/// 入库错误
#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// 白名单外的事件来源：配置漂移，对该条消息致命
    #[error("event source `{0}` is not in the allow-list")]
    DisallowedEventSource(String),

    /// 白名单外的 Windows 日志名
    #[error("windows log `{0}` is not in the allow-list")]
    DisallowedWindowsLog(String),

    #[error("threshold configuration has not been loaded")]
    ConfigUnavailable,

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

/// 入库管道
///
/// 解析 → 白名单校验 → 地址对账 → 站点补充 → 写入存储 →
/// 推进 last_seen → 发布到事件通道。每条入站消息独立处理，
/// 除存储本身外没有共享可变状态，可并发调用。
pub struct Ingestor {
    parser: EventParser,
    resolver: HostResolver,
    store: Arc<dyn EventStore>,
    thresholds: Arc<ConfigManager<Thresholds>>,
    events_tx: Option<mpsc::Sender<Event>>,
}

impl Ingestor {
    pub fn new(
        store: Arc<dyn EventStore>,
        thresholds: Arc<ConfigManager<Thresholds>>,
        resolver: HostResolver,
    ) -> Self {
        Self {
            parser: EventParser::new(),
            resolver,
            store,
            thresholds,
            events_tx: None,
        }
    }

    /// 把入库的事件发布到通道（聚类检测、单事件 UX 检查订阅）
    pub fn with_publisher(mut self, tx: mpsc::Sender<Event>) -> Self {
        self.events_tx = Some(tx);
        self
    }

    pub async fn ingest(&self, record: TelemetryRecord) -> Result<Event, IngestError> {
        let thresholds = self
            .thresholds
            .snapshot()
            .await
            .ok_or(IngestError::ConfigUnavailable)?;

        // 白名单校验：未知来源说明白名单没跟上配置变化，
        // 对这条消息致命，连同完整载荷记录后丢弃
        if !thresholds
            .allowed_event_sources
            .iter()
            .any(|s| s == &record.source_name)
        {
            error!(
                source_name = %record.source_name,
                payload = %serde_json::to_string(&record).unwrap_or_default(),
                "Rejected telemetry from unknown event source"
            );
            return Err(IngestError::DisallowedEventSource(record.source_name));
        }
        if !thresholds
            .allowed_windows_logs
            .iter()
            .any(|l| l == &record.log_name)
        {
            error!(
                log_name = %record.log_name,
                payload = %serde_json::to_string(&record).unwrap_or_default(),
                "Rejected telemetry from unknown windows log"
            );
            return Err(IngestError::DisallowedWindowsLog(record.log_name));
        }

        let stream = if thresholds
            .mail_event_sources
            .iter()
            .any(|s| s == &record.source_name)
        {
            TelemetryStream::Mail
        } else {
            TelemetryStream::Logon
        };

        let mut event = self.parser.parse(&record, stream)?;

        let candidates: Vec<IpAddr> = record
            .host
            .ip
            .iter()
            .filter_map(|text| text.parse().ok())
            .collect();
        event.source_ip = self.resolver.resolve(&record.host.name, &candidates).await;

        // 站点信息来自 bot 注册表
        if let Some(bot) = self
            .store
            .get_entity(EntityKind::Bot, &event.source_host)
            .await?
        {
            event.site = bot.site.clone();
        }

        self.store.append(event.clone()).await?;

        self.store
            .upsert_entity_last_seen(
                EntityKind::Bot,
                &event.source_host,
                stream,
                event.timestamp,
            )
            .await?;
        if let Some(site) = &event.site {
            self.store
                .upsert_entity_last_seen(EntityKind::Site, site, stream, event.timestamp)
                .await?;
        }
        if let Some(broker) = &event.broker {
            self.store
                .upsert_entity_last_seen(
                    EntityKind::Broker,
                    broker,
                    TelemetryStream::Logon,
                    event.timestamp,
                )
                .await?;
        }

        if let Some(tx) = &self.events_tx {
            if tx.send(event.clone()).await.is_err() {
                debug!("Event channel closed, subscribers gone");
            }
        }

        info!(
            event_id = %event.id,
            source_host = %event.source_host,
            state = ?event.state,
            stream = ?stream,
            "Telemetry ingested"
        );

        Ok(event)
    }
}
