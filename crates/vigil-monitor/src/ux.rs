use chrono::{DateTime, Duration, DurationRound, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use vigil_config::Thresholds;
use vigil_store::{EventQuery, EventStore};
use vigil_types::{Event, EventState, Phase};

/// 聚合分组的时间粒度
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeBucket {
    /// 不按时间分组
    #[default]
    None,
    Minute,
    Hour,
}

impl TimeBucket {
    fn truncate(&self, timestamp: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            TimeBucket::None => None,
            TimeBucket::Minute => timestamp.duration_trunc(Duration::minutes(1)).ok(),
            TimeBucket::Hour => timestamp.duration_trunc(Duration::hours(1)).ok(),
        }
    }
}

/// 聚合范围过滤
#[derive(Debug, Clone, Default)]
pub struct ScopeFilter {
    pub site: Option<String>,
    pub host: Option<String>,
}

impl ScopeFilter {
    fn matches(&self, event: &Event) -> bool {
        if let Some(host) = &self.host {
            if !event.source_host.eq_ignore_ascii_case(host) {
                return false;
            }
        }
        if let Some(site) = &self.site {
            match &event.site {
                Some(event_site) if event_site.eq_ignore_ascii_case(site) => {}
                _ => return false,
            }
        }
        true
    }
}

/// 单个阶段的耗时统计
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhaseStats {
    pub count: usize,
    pub min: f64,
    pub avg: f64,
    pub max: f64,
    pub stddev: f64,
}

impl PhaseStats {
    fn from_samples(samples: &[f64]) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }
        let count = samples.len();
        let min = samples.iter().copied().fold(f64::INFINITY, f64::min);
        let max = samples.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let avg = samples.iter().sum::<f64>() / count as f64;
        let variance = samples.iter().map(|s| (s - avg).powi(2)).sum::<f64>() / count as f64;
        Some(Self {
            count,
            min,
            avg,
            max,
            stddev: variance.sqrt(),
        })
    }
}

/// 一个聚合分组的降级报告
#[derive(Debug, Clone)]
pub struct UxBreach {
    pub site: Option<String>,
    pub source_host: String,
    pub bucket: Option<DateTime<Utc>>,
    pub stats: HashMap<Phase, PhaseStats>,
    /// 触发降级判定的阶段
    pub breaching: Vec<Phase>,
}

/// UX 阈值评估器
///
/// 两条独立路径共用同一份阈值：事件落库时的单事件即时检查
/// （[`UxEvaluator::check_event`]），与周期性的窗口聚合检查
/// （[`UxEvaluator::evaluate`]）。
pub struct UxEvaluator {
    store: Arc<dyn EventStore>,
}

impl UxEvaluator {
    pub fn new(store: Arc<dyn EventStore>) -> Self {
        Self { store }
    }

    /// 窗口聚合检查
    ///
    /// 按（站点、主机、时间桶）分组统计五个阶段的 min/avg/max/stddev，
    /// storefront_connection 或 logon_achieved 的平均值达到阈值即为降级。
    pub async fn evaluate(
        &self,
        now: DateTime<Utc>,
        window: Duration,
        bucket: TimeBucket,
        filter: &ScopeFilter,
        thresholds: &Thresholds,
    ) -> anyhow::Result<Vec<UxBreach>> {
        let after = std::cmp::max(now - window, now - thresholds.ignore_events_older_than());
        let query = EventQuery::new()
            .after(after)
            .until(now)
            .state(EventState::Successful);
        let events = self.store.query(&query).await?;

        // BTreeMap 保证分组顺序稳定，重跑结果可比对
        let mut groups: BTreeMap<(String, Option<DateTime<Utc>>), GroupSamples> = BTreeMap::new();
        for event in events.iter().filter(|e| filter.matches(e)) {
            let timings = match event.timings {
                Some(timings) => timings,
                None => continue,
            };
            let key = (event.source_host.to_lowercase(), bucket.truncate(event.timestamp));
            let group = groups.entry(key).or_insert_with(|| GroupSamples {
                site: event.site.clone(),
                source_host: event.source_host.clone(),
                samples: HashMap::new(),
            });
            for phase in Phase::ALL {
                group
                    .samples
                    .entry(phase)
                    .or_default()
                    .push(timings.get(phase).as_secs_f64());
            }
        }

        let mut breaches = Vec::new();
        for ((_, bucket_start), group) in groups {
            let mut stats = HashMap::new();
            for (phase, samples) in &group.samples {
                if let Some(phase_stats) = PhaseStats::from_samples(samples) {
                    stats.insert(*phase, phase_stats);
                }
            }

            let breaching: Vec<Phase> = [Phase::StorefrontConnection, Phase::LogonAchieved]
                .into_iter()
                .filter(|phase| {
                    stats
                        .get(phase)
                        .is_some_and(|s| s.avg >= thresholds.ux_alert_threshold_secs)
                })
                .collect();
            if breaching.is_empty() {
                continue;
            }
            breaches.push(UxBreach {
                site: group.site,
                source_host: group.source_host,
                bucket: bucket_start,
                stats,
                breaching,
            });
        }
        Ok(breaches)
    }

    /// 单事件即时检查：五个阶段逐一与阈值比较，返回超标的阶段
    pub fn check_event(event: &Event, thresholds: &Thresholds) -> Vec<Phase> {
        let timings = match event.timings {
            Some(timings) if event.state == EventState::Successful => timings,
            _ => return Vec::new(),
        };
        Phase::ALL
            .into_iter()
            .filter(|phase| timings.get(*phase).as_secs_f64() >= thresholds.ux_alert_threshold_secs)
            .collect()
    }
}

struct GroupSamples {
    site: Option<String>,
    source_host: String,
    samples: HashMap<Phase, Vec<f64>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration as StdDuration;
    use vigil_store::MemoryEventStore;
    use vigil_types::PhaseTimings;

    fn event_with_logon_secs(host: &str, timestamp: DateTime<Utc>, logon_secs: f64) -> Event {
        let timings = PhaseTimings::from_ordered([
            StdDuration::from_secs(1),
            StdDuration::from_secs(1),
            StdDuration::from_secs(1),
            StdDuration::from_secs_f64(logon_secs),
            StdDuration::from_secs(1),
        ]);
        Event::successful(host, timestamp, "BROKER01", true, timings, "raw")
    }

    #[tokio::test]
    async fn test_slow_logon_average_breaches() {
        let now = Utc::now();
        let store = Arc::new(MemoryEventStore::new());
        for i in 0..4 {
            store
                .append(event_with_logon_secs(
                    "bot-01",
                    now - Duration::minutes(i),
                    20.0,
                ))
                .await
                .unwrap();
        }
        let evaluator = UxEvaluator::new(store);

        let breaches = evaluator
            .evaluate(
                now,
                Duration::minutes(10),
                TimeBucket::None,
                &ScopeFilter::default(),
                &Thresholds::default(),
            )
            .await
            .unwrap();

        assert_eq!(breaches.len(), 1);
        let breach = &breaches[0];
        assert_eq!(breach.source_host, "bot-01");
        assert_eq!(breach.breaching, vec![Phase::LogonAchieved]);
        let logon = &breach.stats[&Phase::LogonAchieved];
        assert_eq!(logon.count, 4);
        assert!((logon.avg - 20.0).abs() < 1e-9);
        assert!((logon.stddev).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_fast_logons_do_not_breach() {
        let now = Utc::now();
        let store = Arc::new(MemoryEventStore::new());
        for i in 0..4 {
            store
                .append(event_with_logon_secs("bot-01", now - Duration::minutes(i), 5.0))
                .await
                .unwrap();
        }
        let evaluator = UxEvaluator::new(store);

        let breaches = evaluator
            .evaluate(
                now,
                Duration::minutes(10),
                TimeBucket::None,
                &ScopeFilter::default(),
                &Thresholds::default(),
            )
            .await
            .unwrap();
        assert!(breaches.is_empty());
    }

    #[tokio::test]
    async fn test_one_outlier_does_not_breach_average() {
        let now = Utc::now();
        let store = Arc::new(MemoryEventStore::new());
        // 一次 30s 的慢登录被三次 2s 的快登录摊平（均值 9s < 15s）
        store
            .append(event_with_logon_secs("bot-01", now - Duration::minutes(1), 30.0))
            .await
            .unwrap();
        for i in 2..5 {
            store
                .append(event_with_logon_secs("bot-01", now - Duration::minutes(i), 2.0))
                .await
                .unwrap();
        }
        let evaluator = UxEvaluator::new(store);

        let breaches = evaluator
            .evaluate(
                now,
                Duration::minutes(10),
                TimeBucket::None,
                &ScopeFilter::default(),
                &Thresholds::default(),
            )
            .await
            .unwrap();
        assert!(breaches.is_empty());
    }

    #[tokio::test]
    async fn test_host_filter_limits_groups() {
        let now = Utc::now();
        let store = Arc::new(MemoryEventStore::new());
        store
            .append(event_with_logon_secs("bot-01", now - Duration::minutes(1), 20.0))
            .await
            .unwrap();
        store
            .append(event_with_logon_secs("bot-02", now - Duration::minutes(1), 20.0))
            .await
            .unwrap();
        let evaluator = UxEvaluator::new(store);

        let filter = ScopeFilter {
            host: Some("BOT-02".to_string()),
            site: None,
        };
        let breaches = evaluator
            .evaluate(
                now,
                Duration::minutes(10),
                TimeBucket::None,
                &filter,
                &Thresholds::default(),
            )
            .await
            .unwrap();

        assert_eq!(breaches.len(), 1);
        assert_eq!(breaches[0].source_host, "bot-02");
    }

    #[tokio::test]
    async fn test_minute_buckets_split_groups() {
        let now = Utc::now().duration_trunc(Duration::minutes(1)).unwrap();
        let store = Arc::new(MemoryEventStore::new());
        store
            .append(event_with_logon_secs("bot-01", now - Duration::seconds(90), 20.0))
            .await
            .unwrap();
        store
            .append(event_with_logon_secs("bot-01", now - Duration::seconds(30), 20.0))
            .await
            .unwrap();
        let evaluator = UxEvaluator::new(store);

        let breaches = evaluator
            .evaluate(
                now,
                Duration::minutes(10),
                TimeBucket::Minute,
                &ScopeFilter::default(),
                &Thresholds::default(),
            )
            .await
            .unwrap();

        assert_eq!(breaches.len(), 2);
        assert_ne!(breaches[0].bucket, breaches[1].bucket);
        assert!(breaches.iter().all(|b| b.stats[&Phase::LogonAchieved].count == 1));
    }

    #[test]
    fn test_check_event_flags_slow_phases() {
        let now = Utc::now();
        let thresholds = Thresholds::default();

        let slow = event_with_logon_secs("bot-01", now, 20.0);
        assert_eq!(
            UxEvaluator::check_event(&slow, &thresholds),
            vec![Phase::LogonAchieved]
        );

        let fast = event_with_logon_secs("bot-01", now, 5.0);
        assert!(UxEvaluator::check_event(&fast, &thresholds).is_empty());

        let failed = Event::failed("bot-01", now, "Timeout", None, "raw");
        assert!(UxEvaluator::check_event(&failed, &thresholds).is_empty());
    }

    #[test]
    fn test_phase_stats() {
        let stats = PhaseStats::from_samples(&[2.0, 4.0, 6.0]).unwrap();
        assert_eq!(stats.count, 3);
        assert_eq!(stats.min, 2.0);
        assert_eq!(stats.max, 6.0);
        assert!((stats.avg - 4.0).abs() < 1e-9);
        // 总体标准差 sqrt(8/3)
        assert!((stats.stddev - (8.0f64 / 3.0).sqrt()).abs() < 1e-9);

        assert!(PhaseStats::from_samples(&[]).is_none());
    }
}
