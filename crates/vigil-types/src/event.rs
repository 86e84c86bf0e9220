use crate::entity::TelemetryStream;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// 事件状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventState {
    /// 登录测试成功
    Successful,
    /// 登录测试失败
    Failed,
    /// 无法识别的消息格式
    Undetermined,
}

/// 登录阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    StorefrontConnection,
    ReceiverStartup,
    ConnectionAchieved,
    LogonAchieved,
    LogoffAchieved,
}

impl Phase {
    /// 固定顺序（与消息中的行顺序一致）
    pub const ALL: [Phase; 5] = [
        Phase::StorefrontConnection,
        Phase::ReceiverStartup,
        Phase::ConnectionAchieved,
        Phase::LogonAchieved,
        Phase::LogoffAchieved,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Phase::StorefrontConnection => "storefront_connection",
            Phase::ReceiverStartup => "receiver_startup",
            Phase::ConnectionAchieved => "connection_achieved",
            Phase::LogonAchieved => "logon_achieved",
            Phase::LogoffAchieved => "logoff_achieved",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// 五个登录阶段耗时
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseTimings {
    pub storefront_connection: Duration,
    pub receiver_startup: Duration,
    pub connection_achieved: Duration,
    pub logon_achieved: Duration,
    pub logoff_achieved: Duration,
}

impl PhaseTimings {
    pub fn get(&self, phase: Phase) -> Duration {
        match phase {
            Phase::StorefrontConnection => self.storefront_connection,
            Phase::ReceiverStartup => self.receiver_startup,
            Phase::ConnectionAchieved => self.connection_achieved,
            Phase::LogonAchieved => self.logon_achieved,
            Phase::LogoffAchieved => self.logoff_achieved,
        }
    }

    /// 按固定顺序构造（storefront, receiver, connection, logon, logoff）
    pub fn from_ordered(durations: [Duration; 5]) -> Self {
        Self {
            storefront_connection: durations[0],
            receiver_startup: durations[1],
            connection_achieved: durations[2],
            logon_achieved: durations[3],
            logoff_achieved: durations[4],
        }
    }
}

/// 监控事件
///
/// 由 EventParser 创建后不再修改（`is_expired` 由外部保留策略任务设置）。
/// 不变量：`timings` 只在 Successful 状态出现，`failure_reason`/`failure_details`
/// 只在 Failed 状态出现，两组字段互斥。构造函数保证该不变量。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// 事件 ID
    pub id: Uuid,

    /// 上报主机名
    pub source_host: String,

    /// 解析出的主机地址（HostResolver 失败时为 None）
    pub source_ip: Option<std::net::IpAddr>,

    /// 所属站点（入库时由 bot 注册表补充）
    pub site: Option<String>,

    /// 外部序列号（仅供参考）
    pub record_number: i64,

    /// 事件时间
    pub timestamp: DateTime<Utc>,

    /// 事件来源（白名单校验在入库边界完成）
    pub event_source: String,

    /// Windows 日志名（白名单校验在入库边界完成）
    pub windows_log: String,

    /// Windows 事件 ID（聚类判别用）
    pub event_code: Option<u32>,

    /// 遥测流（登录监控 / 邮件监控）
    pub stream: TelemetryStream,

    /// 事件状态
    pub state: EventState,

    /// 处理该登录请求的 XML broker（仅 Successful）
    pub broker: Option<String>,

    /// 测试结果
    pub test_result: Option<bool>,

    /// 阶段耗时（仅 Successful）
    pub timings: Option<PhaseTimings>,

    /// 失败原因（仅 Failed）
    pub failure_reason: Option<String>,

    /// 失败详情（仅 Failed）
    pub failure_details: Option<String>,

    /// 原始消息（始终保留，供人工排查）
    pub raw_message: String,

    /// 是否已过期（外部保留策略任务设置）
    pub is_expired: bool,
}

impl Event {
    fn base(
        source_host: impl Into<String>,
        timestamp: DateTime<Utc>,
        state: EventState,
        raw_message: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            source_host: source_host.into(),
            source_ip: None,
            site: None,
            record_number: 0,
            timestamp,
            event_source: String::new(),
            windows_log: String::new(),
            event_code: None,
            stream: TelemetryStream::Logon,
            state,
            broker: None,
            test_result: None,
            timings: None,
            failure_reason: None,
            failure_details: None,
            raw_message: raw_message.into(),
            is_expired: false,
        }
    }

    /// 创建 Successful 事件
    pub fn successful(
        source_host: impl Into<String>,
        timestamp: DateTime<Utc>,
        broker: impl Into<String>,
        test_result: bool,
        timings: PhaseTimings,
        raw_message: impl Into<String>,
    ) -> Self {
        let mut event = Self::base(source_host, timestamp, EventState::Successful, raw_message);
        event.broker = Some(broker.into());
        event.test_result = Some(test_result);
        event.timings = Some(timings);
        event
    }

    /// 创建 Failed 事件
    pub fn failed(
        source_host: impl Into<String>,
        timestamp: DateTime<Utc>,
        failure_reason: impl Into<String>,
        failure_details: Option<String>,
        raw_message: impl Into<String>,
    ) -> Self {
        let mut event = Self::base(source_host, timestamp, EventState::Failed, raw_message);
        event.test_result = Some(false);
        event.failure_reason = Some(failure_reason.into());
        event.failure_details = failure_details;
        event
    }

    /// 创建 Undetermined 事件（原始消息保留）
    pub fn undetermined(
        source_host: impl Into<String>,
        timestamp: DateTime<Utc>,
        raw_message: impl Into<String>,
    ) -> Self {
        Self::base(source_host, timestamp, EventState::Undetermined, raw_message)
    }
}

/// 解析 `HH:MM:SS.ffffff` 格式的耗时字符串
///
/// 小数部分可以是 1~9 位，按纳秒精度补齐。
pub fn parse_phase_duration(text: &str) -> Option<Duration> {
    let mut parts = text.trim().splitn(3, ':');
    let hours: u64 = parts.next()?.parse().ok()?;
    let minutes: u64 = parts.next()?.parse().ok()?;
    let seconds_part = parts.next()?;

    let (secs_str, frac_str) = match seconds_part.split_once('.') {
        Some((s, f)) => (s, f),
        None => (seconds_part, ""),
    };
    let seconds: u64 = secs_str.parse().ok()?;
    if minutes >= 60 || seconds >= 60 {
        return None;
    }

    let nanos: u32 = if frac_str.is_empty() {
        0
    } else {
        if frac_str.len() > 9 || !frac_str.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        let padded = format!("{:0<9}", frac_str);
        padded.parse().ok()?
    };

    // 敌对或损坏的消息可能带上天文数字的小时数
    let total_secs = hours
        .checked_mul(3600)?
        .checked_add(minutes * 60)?
        .checked_add(seconds)?;
    Some(Duration::new(total_secs, nanos))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_phase_duration() {
        let d = parse_phase_duration("00:00:03.0478000").unwrap();
        assert_eq!(d.as_secs_f64(), 3.0478);

        let d = parse_phase_duration("01:02:03").unwrap();
        assert_eq!(d.as_secs(), 3723);

        let d = parse_phase_duration("00:00:00.5").unwrap();
        assert_eq!(d.as_millis(), 500);
    }

    #[test]
    fn test_parse_phase_duration_invalid() {
        assert!(parse_phase_duration("").is_none());
        assert!(parse_phase_duration("abc").is_none());
        assert!(parse_phase_duration("00:99:00").is_none());
        assert!(parse_phase_duration("00:00:61").is_none());
        assert!(parse_phase_duration("00:00:03.12345678901").is_none());
        // 小时数溢出 u64 秒数时拒绝而不是 panic
        assert!(parse_phase_duration("9999999999999999999:00:00").is_none());
    }

    #[test]
    fn test_event_state_exclusivity() {
        let now = Utc::now();
        let timings = PhaseTimings::from_ordered([Duration::from_secs(1); 5]);

        let ok = Event::successful("bot-01", now, "BROKER01", true, timings, "raw");
        assert_eq!(ok.state, EventState::Successful);
        assert!(ok.timings.is_some());
        assert!(ok.failure_reason.is_none());

        let failed = Event::failed("bot-01", now, "Timeout", None, "raw");
        assert_eq!(failed.state, EventState::Failed);
        assert!(failed.timings.is_none());
        assert_eq!(failed.test_result, Some(false));

        let unknown = Event::undetermined("bot-01", now, "garbage");
        assert_eq!(unknown.state, EventState::Undetermined);
        assert_eq!(unknown.raw_message, "garbage");
    }

    #[test]
    fn test_phase_ordering() {
        assert_eq!(Phase::ALL[0], Phase::StorefrontConnection);
        assert_eq!(Phase::ALL[4], Phase::LogoffAchieved);

        let timings = PhaseTimings::from_ordered([
            Duration::from_secs(1),
            Duration::from_secs(2),
            Duration::from_secs(3),
            Duration::from_secs(4),
            Duration::from_secs(5),
        ]);
        assert_eq!(timings.get(Phase::LogonAchieved), Duration::from_secs(4));
    }

    #[test]
    fn test_event_serialization() {
        let event = Event::undetermined("bot-01", Utc::now(), "raw text");
        let json = serde_json::to_string(&event).unwrap();
        let back: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(back.source_host, "bot-01");
        assert_eq!(back.state, EventState::Undetermined);
    }
}
