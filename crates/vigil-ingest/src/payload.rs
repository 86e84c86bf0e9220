use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 上报主机信息
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryHost {
    /// 主机名
    pub name: String,

    /// 主机上报的候选地址列表
    #[serde(default)]
    pub ip: Vec<String>,
}

/// 入站遥测记录
///
/// agent 转发的 Windows 事件日志记录（NDJSON，一行一条）。
/// `message` 在字段层面是可选的，缺失是解析器唯一的硬失败。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryRecord {
    pub host: TelemetryHost,

    /// 外部序列号
    #[serde(default)]
    pub record_number: i64,

    #[serde(default)]
    pub opcode: Option<String>,

    #[serde(default)]
    pub level: Option<String>,

    /// 事件来源
    pub source_name: String,

    /// Windows 日志名
    pub log_name: String,

    /// Windows 事件 ID（聚类判别用）
    #[serde(default)]
    pub event_id: Option<u32>,

    /// 事件时间
    #[serde(rename = "@timestamp")]
    pub timestamp: DateTime<Utc>,

    /// 消息体（自由文本）
    #[serde(default)]
    pub message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_minimal() {
        let json = r#"{
            "host": {"name": "bot-01", "ip": ["10.0.0.5"]},
            "record_number": 4211,
            "source_name": "ControlUp Logon Monitor",
            "log_name": "Application",
            "event_id": 1006,
            "@timestamp": "2024-03-01T12:00:00Z",
            "message": "Failed logon"
        }"#;

        let record: TelemetryRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.host.name, "bot-01");
        assert_eq!(record.host.ip, vec!["10.0.0.5"]);
        assert_eq!(record.event_id, Some(1006));
        assert!(record.opcode.is_none());
    }

    #[test]
    fn test_deserialize_missing_message() {
        let json = r#"{
            "host": {"name": "bot-01"},
            "source_name": "ControlUp Logon Monitor",
            "log_name": "Application",
            "@timestamp": "2024-03-01T12:00:00Z"
        }"#;

        let record: TelemetryRecord = serde_json::from_str(json).unwrap();
        assert!(record.message.is_none());
        assert!(record.host.ip.is_empty());
    }
}
