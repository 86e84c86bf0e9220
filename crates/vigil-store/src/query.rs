use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use vigil_types::{EventState, TelemetryStream};

/// 事件查询条件
///
/// 结果按时间升序返回；`limit` 保留最近的 N 条。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventQuery {
    /// 只要严格晚于该时间的事件
    pub after: Option<DateTime<Utc>>,

    /// 只要不晚于该时间的事件
    pub until: Option<DateTime<Utc>>,

    /// 按来源主机过滤
    pub source_host: Option<String>,

    /// 按状态过滤
    pub state: Option<EventState>,

    /// 按遥测流过滤
    pub stream: Option<TelemetryStream>,

    /// 按 Windows 事件 ID 过滤
    pub event_codes: Option<Vec<u32>>,

    /// 数量上限
    pub limit: Option<usize>,
}

impl EventQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn after(mut self, timestamp: DateTime<Utc>) -> Self {
        self.after = Some(timestamp);
        self
    }

    pub fn until(mut self, timestamp: DateTime<Utc>) -> Self {
        self.until = Some(timestamp);
        self
    }

    pub fn source_host(mut self, host: impl Into<String>) -> Self {
        self.source_host = Some(host.into());
        self
    }

    pub fn state(mut self, state: EventState) -> Self {
        self.state = Some(state);
        self
    }

    pub fn stream(mut self, stream: TelemetryStream) -> Self {
        self.stream = Some(stream);
        self
    }

    pub fn event_codes(mut self, codes: Vec<u32>) -> Self {
        self.event_codes = Some(codes);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// 事件是否匹配全部条件
    pub fn matches(&self, event: &vigil_types::Event) -> bool {
        if let Some(after) = self.after {
            if event.timestamp <= after {
                return false;
            }
        }
        if let Some(until) = self.until {
            if event.timestamp > until {
                return false;
            }
        }
        if let Some(host) = &self.source_host {
            if !event.source_host.eq_ignore_ascii_case(host) {
                return false;
            }
        }
        if let Some(state) = self.state {
            if event.state != state {
                return false;
            }
        }
        if let Some(stream) = self.stream {
            if event.stream != stream {
                return false;
            }
        }
        if let Some(codes) = &self.event_codes {
            match event.event_code {
                Some(code) if codes.contains(&code) => {}
                _ => return false,
            }
        }
        true
    }
}
