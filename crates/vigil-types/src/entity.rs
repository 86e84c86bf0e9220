use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// 被监控实体类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    /// 远程监控 bot
    Bot,
    /// 站点（一组 bot）
    Site,
    /// Citrix XML broker
    Broker,
    /// AD 域控制器
    DomainController,
}

impl EntityKind {
    pub const ALL: [EntityKind; 4] = [
        EntityKind::Bot,
        EntityKind::Site,
        EntityKind::Broker,
        EntityKind::DomainController,
    ];
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            EntityKind::Bot => "bot",
            EntityKind::Site => "site",
            EntityKind::Broker => "broker",
            EntityKind::DomainController => "domain_controller",
        };
        f.write_str(name)
    }
}

/// 遥测流类型
///
/// 同一个 bot 可能同时上报登录监控和邮件监控两路遥测，
/// 每一路单独记录 last_seen。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TelemetryStream {
    /// Citrix 登录监控
    Logon,
    /// Exchange 邮件监控
    Mail,
}

/// 被监控实体
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoredEntity {
    /// 实体类型
    pub kind: EntityKind,

    /// 实体标识（主机名 / 站点名 / broker 名）
    pub key: String,

    /// 所属站点（仅 bot）
    pub site: Option<String>,

    /// 是否启用（禁用的实体缺席不告警）
    pub enabled: bool,

    /// 每路遥测流的最后上报时间
    pub last_seen: HashMap<TelemetryStream, DateTime<Utc>>,
}

impl MonitoredEntity {
    pub fn new(kind: EntityKind, key: impl Into<String>) -> Self {
        Self {
            kind,
            key: key.into(),
            site: None,
            enabled: true,
            last_seen: HashMap::new(),
        }
    }

    pub fn with_site(mut self, site: impl Into<String>) -> Self {
        self.site = Some(site.into());
        self
    }

    /// 推进 last_seen（单调递增，不允许回退）
    pub fn advance_last_seen(&mut self, stream: TelemetryStream, timestamp: DateTime<Utc>) {
        match self.last_seen.get(&stream) {
            Some(existing) if *existing >= timestamp => {}
            _ => {
                self.last_seen.insert(stream, timestamp);
            }
        }
    }

    /// 任意一路遥测流的最新 last_seen
    pub fn latest_seen(&self) -> Option<DateTime<Utc>> {
        self.last_seen.values().max().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_last_seen_monotonic() {
        let mut entity = MonitoredEntity::new(EntityKind::Bot, "bot-01");
        let now = Utc::now();

        entity.advance_last_seen(TelemetryStream::Logon, now);
        // 回退的时间戳被忽略
        entity.advance_last_seen(TelemetryStream::Logon, now - Duration::minutes(5));
        assert_eq!(entity.last_seen[&TelemetryStream::Logon], now);

        entity.advance_last_seen(TelemetryStream::Logon, now + Duration::minutes(1));
        assert_eq!(
            entity.last_seen[&TelemetryStream::Logon],
            now + Duration::minutes(1)
        );
    }

    #[test]
    fn test_streams_tracked_separately() {
        let mut entity = MonitoredEntity::new(EntityKind::Bot, "bot-01");
        let now = Utc::now();

        entity.advance_last_seen(TelemetryStream::Logon, now - Duration::hours(2));
        entity.advance_last_seen(TelemetryStream::Mail, now);

        assert_eq!(entity.last_seen.len(), 2);
        assert_eq!(entity.latest_seen(), Some(now));
    }
}
