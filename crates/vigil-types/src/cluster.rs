use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 失败事件聚类
///
/// 同一来源在时间上相邻的合格失败事件集合，用于避免对孤立抖动告警。
/// 成员列表只追加、不重排；起止时间始终由成员时间戳推导（min/max），
/// 不单独设置。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cluster {
    /// 聚类 ID
    pub id: Uuid,

    /// 来源主机
    pub source_host: String,

    /// 成员事件 ID（追加顺序）
    pub members: Vec<Uuid>,

    /// 最早成员时间戳
    pub start_time: DateTime<Utc>,

    /// 最晚成员时间戳
    pub end_time: DateTime<Utc>,

    /// 告警是否已发出
    pub alert_sent: bool,
}

impl Cluster {
    /// 由一组成员创建聚类（成员集合即计数窗口内的合格失败）
    pub fn new(source_host: impl Into<String>, members: Vec<(Uuid, DateTime<Utc>)>) -> Self {
        debug_assert!(!members.is_empty());
        let start_time = members.iter().map(|(_, ts)| *ts).min().unwrap_or_else(Utc::now);
        let end_time = members.iter().map(|(_, ts)| *ts).max().unwrap_or_else(Utc::now);
        Self {
            id: Uuid::new_v4(),
            source_host: source_host.into(),
            members: members.into_iter().map(|(id, _)| id).collect(),
            start_time,
            end_time,
            alert_sent: false,
        }
    }

    /// 追加成员并重新推导边界
    ///
    /// 重复的事件 ID 被忽略，保证重放同一事件流得到相同的成员集合。
    pub fn append(&mut self, event_id: Uuid, timestamp: DateTime<Utc>) -> bool {
        if self.members.contains(&event_id) {
            return false;
        }
        self.members.push(event_id);
        if timestamp < self.start_time {
            self.start_time = timestamp;
        }
        if timestamp > self.end_time {
            self.end_time = timestamp;
        }
        true
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}
