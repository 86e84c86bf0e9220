use crate::pipeline::MonitorPipeline;
use std::sync::Arc;
use std::time::Duration;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info};
use vigil_config::Thresholds;
use vigil_types::EntityKind;

/// 单轮评估的最长执行时间，超时整轮作废、等待下一轮重跑
const JOB_DEADLINE: Duration = Duration::from_secs(60);

/// 评估任务类型
#[derive(Debug, Clone, Copy)]
pub enum MonitorTask {
    /// 实体存活检查
    Liveness(EntityKind),
    /// UX 聚合检查
    UxAggregate,
    /// 失败登录计数检查
    FailedLogons,
}

impl MonitorTask {
    fn name(&self) -> String {
        match self {
            MonitorTask::Liveness(kind) => format!("liveness:{}", kind),
            MonitorTask::UxAggregate => "ux-aggregate".to_string(),
            MonitorTask::FailedLogons => "failed-logons".to_string(),
        }
    }
}

/// 调度检查项
#[derive(Debug, Clone, Copy)]
pub struct ScheduledCheck {
    pub interval: Duration,
    pub task: MonitorTask,
}

impl ScheduledCheck {
    pub fn new(interval: Duration, task: MonitorTask) -> Self {
        Self { interval, task }
    }

    /// 按阈值配置生成默认检查集
    ///
    /// 存活检查以对应静默阈值的一半为周期，保证实体最多
    /// 超时半个周期才被发现。
    pub fn defaults(thresholds: &Thresholds) -> Vec<Self> {
        let mut checks: Vec<Self> = EntityKind::ALL
            .into_iter()
            .map(|kind| {
                let silence = thresholds.dead_after(kind).num_seconds().max(2) as u64;
                Self::new(Duration::from_secs(silence / 2), MonitorTask::Liveness(kind))
            })
            .collect();
        checks.push(Self::new(
            Duration::from_secs(thresholds.ux_alert_interval_secs),
            MonitorTask::UxAggregate,
        ));
        checks.push(Self::new(
            Duration::from_secs(thresholds.logon_alert_after_secs.min(900)),
            MonitorTask::FailedLogons,
        ));
        checks
    }
}

/// 评估任务调度器
pub struct MonitorScheduler {
    scheduler: JobScheduler,
    pipeline: Arc<MonitorPipeline>,
}

impl MonitorScheduler {
    pub async fn new(pipeline: Arc<MonitorPipeline>) -> anyhow::Result<Self> {
        let scheduler = JobScheduler::new().await?;
        Ok(Self {
            scheduler,
            pipeline,
        })
    }

    /// 注册检查项
    pub async fn add_check(&self, check: ScheduledCheck) -> anyhow::Result<uuid::Uuid> {
        let pipeline = self.pipeline.clone();
        let task = check.task;

        let job = Job::new_repeated_async(check.interval, move |_uuid, _l| {
            let pipeline = pipeline.clone();
            Box::pin(async move {
                run_task(&pipeline, task).await;
            })
        })?;

        let job_id = self.scheduler.add(job).await?;
        info!(
            task = %task.name(),
            interval_secs = check.interval.as_secs(),
            job_id = %job_id,
            "Check scheduled"
        );
        Ok(job_id)
    }

    /// 启动调度器
    pub async fn start(&mut self) -> anyhow::Result<()> {
        self.scheduler.start().await?;
        info!("Monitor scheduler started");
        Ok(())
    }

    /// 停止调度器
    pub async fn shutdown(&mut self) -> anyhow::Result<()> {
        self.scheduler.shutdown().await?;
        info!("Monitor scheduler stopped");
        Ok(())
    }
}

async fn run_task(pipeline: &MonitorPipeline, task: MonitorTask) {
    let run = async {
        match task {
            MonitorTask::Liveness(kind) => pipeline.run_liveness_check(kind).await,
            MonitorTask::UxAggregate => pipeline.run_ux_check().await,
            MonitorTask::FailedLogons => pipeline.run_failed_logon_check().await,
        }
    };

    match tokio::time::timeout(JOB_DEADLINE, run).await {
        Ok(Ok(())) => info!(task = %task.name(), "Check completed"),
        Ok(Err(e)) => error!(task = %task.name(), error = %e, "Check failed"),
        // 超时的部分结果不可信，丢弃等待下一轮
        Err(_) => error!(task = %task.name(), deadline_secs = JOB_DEADLINE.as_secs(), "Check timed out"),
    }
}
