use crate::backoff::BackoffGate;
use crate::cluster::ClusterDetector;
use crate::liveness::LivenessTracker;
use crate::logon::FailedLogonMonitor;
use crate::ux::{ScopeFilter, TimeBucket, UxEvaluator};
use anyhow::{anyhow, Context};
use chrono::{Duration, Utc};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use vigil_config::{ConfigManager, Thresholds};
use vigil_store::EventStore;
use vigil_notify::{AlertManager, AlertMessage};
use vigil_types::{Cluster, EntityKind, Event, EventState};

/// 监控评估管道
///
/// 聚合全部评估组件，供调度任务与事件订阅两条路径共同调用。
/// 每轮运行取一次配置快照并校验；校验失败是该轮的致命错误，
/// 绝不静默回退到默认值。
pub struct MonitorPipeline {
    store: Arc<dyn EventStore>,
    thresholds: Arc<ConfigManager<Thresholds>>,
    tracker: LivenessTracker,
    detector: ClusterDetector,
    gate: BackoffGate,
    ux: UxEvaluator,
    logons: FailedLogonMonitor,
    alerts: Arc<AlertManager>,
}

impl MonitorPipeline {
    pub fn new(
        store: Arc<dyn EventStore>,
        thresholds: Arc<ConfigManager<Thresholds>>,
        alerts: Arc<AlertManager>,
    ) -> Self {
        Self {
            tracker: LivenessTracker::new(store.clone()),
            detector: ClusterDetector::new(store.clone()),
            gate: BackoffGate::new(),
            ux: UxEvaluator::new(store.clone()),
            logons: FailedLogonMonitor::new(store.clone()),
            store,
            thresholds,
            alerts,
        }
    }

    pub fn store(&self) -> &Arc<dyn EventStore> {
        &self.store
    }

    /// 取本轮运行的配置快照并校验
    async fn thresholds_for_run(&self) -> anyhow::Result<Thresholds> {
        let thresholds = self
            .thresholds
            .snapshot()
            .await
            .ok_or_else(|| anyhow!("threshold configuration not loaded"))?;
        thresholds
            .validate()
            .context("threshold configuration invalid")?;
        Ok(thresholds)
    }

    /// 处理一条新入库的事件（聚类判定 + 单事件 UX 检查）
    pub async fn handle_event(&self, event: &Event) {
        let thresholds = match self.thresholds_for_run().await {
            Ok(thresholds) => thresholds,
            Err(e) => {
                error!(error = %e, "Skipping event evaluation, configuration unusable");
                return;
            }
        };

        match event.state {
            EventState::Failed => {
                if let Err(e) = self.evaluate_failure(event, &thresholds).await {
                    error!(host = %event.source_host, error = %e, "Cluster evaluation failed");
                }
            }
            EventState::Successful => {
                let slow = UxEvaluator::check_event(event, &thresholds);
                if !slow.is_empty() {
                    let phases: Vec<String> = slow.iter().map(|p| p.to_string()).collect();
                    let alert = AlertMessage::warning(
                        event.source_host.to_lowercase(),
                        format!("Logon phase duration above threshold: {}", phases.join(", ")),
                    )
                    .with_samples(vec![event.id])
                    .with_metadata(json!({
                        "phases": phases,
                        "threshold_secs": thresholds.ux_alert_threshold_secs,
                    }));
                    if let Err(e) = self.alerts.broadcast(&alert).await {
                        error!(error = %e, "Failed to broadcast UX alert");
                    }
                }
            }
            EventState::Undetermined => {}
        }
    }

    async fn evaluate_failure(
        &self,
        event: &Event,
        thresholds: &Thresholds,
    ) -> anyhow::Result<()> {
        let cluster = match self.detector.on_failure_event(event, thresholds).await? {
            Some(cluster) => cluster,
            None => return Ok(()),
        };
        if cluster.alert_sent {
            return Ok(());
        }

        // 抑制闸门按来源主机限流；被抑制的聚类保持未告警状态，
        // 后续扩展时还有机会放行
        if !self.gate.admit(&cluster.source_host, Utc::now(), thresholds).await {
            info!(
                host = %cluster.source_host,
                cluster_id = %cluster.id,
                "Cluster alert suppressed by backoff"
            );
            return Ok(());
        }

        self.alerts.broadcast(&cluster_alert(&cluster)).await?;
        self.detector
            .mark_alert_sent(&cluster.source_host, cluster.id)
            .await;
        Ok(())
    }

    /// 存活检查：窗口内无事件的启用实体
    pub async fn run_liveness_check(&self, kind: EntityKind) -> anyhow::Result<()> {
        let thresholds = self.thresholds_for_run().await?;
        let now = Utc::now();
        let window = thresholds.dead_after(kind);

        let dead = self
            .tracker
            .dead_entities(kind, None, now, window, &thresholds)
            .await?;
        if dead.is_empty() {
            return Ok(());
        }

        let keys: Vec<String> = dead.iter().map(|entity| entity.key.clone()).collect();
        warn!(kind = %kind, dead = ?keys, "Entities silent beyond threshold");

        // 同一类实体持续静默时不每轮重复寻呼
        let scope = format!("liveness:{}", kind);
        if !self.gate.admit(&scope, now, &thresholds).await {
            info!(scope = %scope, "Liveness alert suppressed by backoff");
            return Ok(());
        }

        let alert = AlertMessage::error(
            scope,
            format!("{} {}(s) silent beyond threshold", dead.len(), kind),
        )
        .with_window(now - window, now)
        .with_entities(keys);
        self.alerts.broadcast(&alert).await?;
        Ok(())
    }

    /// UX 聚合检查：按主机分组统计阶段耗时
    pub async fn run_ux_check(&self) -> anyhow::Result<()> {
        let thresholds = self.thresholds_for_run().await?;
        let now = Utc::now();
        let window = Duration::seconds(thresholds.ux_alert_interval_secs as i64);

        let breaches = self
            .ux
            .evaluate(now, window, TimeBucket::None, &ScopeFilter::default(), &thresholds)
            .await?;
        for breach in breaches {
            let phases: Vec<String> = breach.breaching.iter().map(|p| p.to_string()).collect();
            let stats: Vec<serde_json::Value> = breach
                .breaching
                .iter()
                .filter_map(|phase| breach.stats.get(phase).map(|s| (phase, s)))
                .map(|(phase, s)| {
                    json!({
                        "phase": phase.to_string(),
                        "count": s.count,
                        "min": s.min,
                        "avg": s.avg,
                        "max": s.max,
                        "stddev": s.stddev,
                    })
                })
                .collect();

            let mut alert = AlertMessage::warning(
                breach.source_host.to_lowercase(),
                format!("Average logon phase duration above threshold: {}", phases.join(", ")),
            )
            .with_window(now - window, now)
            .with_metadata(json!({
                "site": breach.site,
                "stats": stats,
                "threshold_secs": thresholds.ux_alert_threshold_secs,
            }));
            if let Some(site) = &breach.site {
                alert = alert.with_entities(vec![site.clone()]);
            }
            self.alerts.broadcast(&alert).await?;
        }
        Ok(())
    }

    /// 失败登录计数检查
    pub async fn run_failed_logon_check(&self) -> anyhow::Result<()> {
        let thresholds = self.thresholds_for_run().await?;
        let now = Utc::now();

        let breaches = self.logons.evaluate(now, &thresholds).await?;
        for breach in breaches {
            let alert = AlertMessage::error(
                breach.source_host.clone(),
                format!("{} failed logons within window", breach.count),
            )
            .with_window(breach.window_start, breach.window_end)
            .with_entities(vec![breach.source_host]);
            self.alerts.broadcast(&alert).await?;
        }
        Ok(())
    }

    /// 订阅入库事件通道
    pub fn spawn_event_subscriber(
        self: &Arc<Self>,
        mut events_rx: mpsc::Receiver<Event>,
    ) -> tokio::task::JoinHandle<()> {
        let pipeline = self.clone();
        tokio::spawn(async move {
            while let Some(event) = events_rx.recv().await {
                pipeline.handle_event(&event).await;
            }
            info!("Event channel closed, subscriber exiting");
        })
    }
}

fn cluster_alert(cluster: &Cluster) -> AlertMessage {
    // 样本事件最多带 5 条，完整成员可按 cluster_id 回查
    let samples: Vec<_> = cluster.members.iter().take(5).copied().collect();
    AlertMessage::critical(
        cluster.source_host.clone(),
        format!("Failure cluster with {} events", cluster.len()),
    )
    .with_window(cluster.start_time, cluster.end_time)
    .with_entities(vec![cluster.source_host.clone()])
    .with_samples(samples)
    .with_metadata(json!({ "cluster_id": cluster.id }))
}
