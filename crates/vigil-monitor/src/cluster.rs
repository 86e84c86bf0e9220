use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};
use uuid::Uuid;
use vigil_config::Thresholds;
use vigil_store::{EventQuery, EventStore};
use vigil_types::{Cluster, Event, EventState};

/// 失败事件聚类检测器
///
/// 同一来源的判定持同一把锁串行执行，避免并发评估对同一窗口
/// 重复计数或重复建簇。聚类只增不删，删除属于外部保留策略。
pub struct ClusterDetector {
    store: Arc<dyn EventStore>,
    scopes: RwLock<HashMap<String, Arc<Mutex<Vec<Cluster>>>>>,
}

impl ClusterDetector {
    pub fn new(store: Arc<dyn EventStore>) -> Self {
        Self {
            store,
            scopes: RwLock::new(HashMap::new()),
        }
    }

    async fn scope_handle(&self, source_host: &str) -> Arc<Mutex<Vec<Cluster>>> {
        let key = source_host.to_lowercase();
        {
            let scopes = self.scopes.read().await;
            if let Some(handle) = scopes.get(&key) {
                return handle.clone();
            }
        }
        let mut scopes = self.scopes.write().await;
        scopes
            .entry(key)
            .or_insert_with(|| Arc::new(Mutex::new(Vec::new())))
            .clone()
    }

    /// 对一条失败事件做聚类判定
    ///
    /// 合格条件：状态为 Failed 且 `event_code` 属于 `cluster_event_ids`。
    /// 统计窗口为 `(T − cluster_length, T]`；计数达到 `cluster_size` 时，
    /// 最近聚类的 end_time 仍在窗口长度内则扩展，否则以计数集合新建。
    /// 返回事件归入的聚类快照；重放同一事件流得到相同的成员与边界。
    pub async fn on_failure_event(
        &self,
        event: &Event,
        thresholds: &Thresholds,
    ) -> anyhow::Result<Option<Cluster>> {
        if event.state != EventState::Failed {
            return Ok(None);
        }
        match event.event_code {
            Some(code) if thresholds.cluster_event_ids.contains(&code) => {}
            _ => return Ok(None),
        }

        let handle = self.scope_handle(&event.source_host).await;
        let mut clusters = handle.lock().await;

        let query = EventQuery::new()
            .source_host(event.source_host.as_str())
            .state(EventState::Failed)
            .event_codes(thresholds.cluster_event_ids.clone())
            .after(event.timestamp - thresholds.cluster_length())
            .until(event.timestamp);
        let counted = self.store.query(&query).await?;

        let mut members: Vec<(Uuid, DateTime<Utc>)> =
            counted.iter().map(|e| (e.id, e.timestamp)).collect();
        // 事件可能尚未入库（直接投递路径），保证触发事件计入
        if !members.iter().any(|(id, _)| *id == event.id) {
            members.push((event.id, event.timestamp));
        }

        if members.len() < thresholds.cluster_size {
            debug!(
                host = %event.source_host,
                count = members.len(),
                threshold = thresholds.cluster_size,
                "Qualifying failure below cluster size"
            );
            return Ok(None);
        }

        // 只扩展时间范围覆盖该事件的聚类；更早聚类时代的事件重放时
        // 落回自己的聚类，不会把最新聚类的边界往回拖
        let cluster_length = thresholds.cluster_length();
        if let Some(open) = clusters.iter_mut().rev().find(|c| {
            event.timestamp >= c.start_time && event.timestamp <= c.end_time + cluster_length
        }) {
            open.append(event.id, event.timestamp);
            debug!(
                host = %open.source_host,
                cluster_id = %open.id,
                size = open.len(),
                "Extended failure cluster"
            );
            return Ok(Some(open.clone()));
        }

        let cluster = Cluster::new(event.source_host.to_lowercase(), members);
        info!(
            host = %cluster.source_host,
            cluster_id = %cluster.id,
            size = cluster.len(),
            "Failure cluster detected"
        );
        clusters.push(cluster.clone());
        Ok(Some(cluster))
    }

    /// 标记聚类已告警
    pub async fn mark_alert_sent(&self, source_host: &str, cluster_id: Uuid) {
        let handle = self.scope_handle(source_host).await;
        let mut clusters = handle.lock().await;
        if let Some(cluster) = clusters.iter_mut().find(|c| c.id == cluster_id) {
            cluster.alert_sent = true;
        }
    }

    /// 某来源的全部聚类快照
    pub async fn clusters_for(&self, source_host: &str) -> Vec<Cluster> {
        let handle = self.scope_handle(source_host).await;
        let clusters = handle.lock().await;
        clusters.clone()
    }
}
