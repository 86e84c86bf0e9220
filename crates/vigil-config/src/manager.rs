use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tracing::{info, warn};

use crate::source::ConfigSource;

/// 配置变更事件
#[derive(Debug, Clone)]
pub enum ConfigChange<T> {
    Loaded(T),
    Updated { old: T, new: T },
}

/// 配置管理器
///
/// 持有当前配置快照并向订阅者广播变更。评估任务每轮运行
/// 取一次快照，整轮使用同一份配置。
pub struct ConfigManager<T>
where
    T: Clone + Serialize + for<'de> Deserialize<'de> + Send + Sync + 'static,
{
    /// 配置源
    source: Arc<dyn ConfigSource<T>>,
    /// 当前配置
    current: Arc<RwLock<Option<T>>>,
    /// 变更通知发送器
    notifiers: Arc<RwLock<Vec<mpsc::Sender<ConfigChange<T>>>>>,
}

impl<T> ConfigManager<T>
where
    T: Clone + Serialize + for<'de> Deserialize<'de> + Send + Sync + 'static,
{
    pub fn new(source: Arc<dyn ConfigSource<T>>) -> Self {
        Self {
            source,
            current: Arc::new(RwLock::new(None)),
            notifiers: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// 加载配置
    pub async fn load(&self) -> Result<T> {
        info!("Loading configuration");

        let config = self.source.load().await?;

        {
            let mut current = self.current.write().await;
            *current = Some(config.clone());
        }

        self.notify(ConfigChange::Loaded(config.clone())).await;

        info!("Configuration loaded");
        Ok(config)
    }

    /// 重新加载配置
    pub async fn reload(&self) -> Result<()> {
        info!("Reloading configuration");

        let new_config = self.source.load().await?;
        let old_config = self.current.read().await.clone();

        {
            let mut current = self.current.write().await;
            *current = Some(new_config.clone());
        }

        match old_config {
            Some(old) => {
                self.notify(ConfigChange::Updated {
                    old,
                    new: new_config,
                })
                .await;
                info!("Configuration reloaded");
            }
            None => {
                self.notify(ConfigChange::Loaded(new_config)).await;
                warn!("Reload before initial load, treating as first load");
            }
        }

        Ok(())
    }

    /// 当前配置快照
    pub async fn snapshot(&self) -> Option<T> {
        self.current.read().await.clone()
    }

    /// 订阅配置变更
    pub async fn subscribe(&self) -> mpsc::Receiver<ConfigChange<T>> {
        let (tx, rx) = mpsc::channel(10);
        self.notifiers.write().await.push(tx);
        rx
    }

    /// 启动热更新任务：文件变更时自动 reload
    pub fn spawn_hot_reload(self: &Arc<Self>) -> Result<()> {
        let manager = self.clone();
        let source = self.source.clone();

        tokio::spawn(async move {
            let mut watcher = match source.watch().await {
                Ok(w) => w,
                Err(e) => {
                    warn!("Hot reload disabled, watch failed: {}", e);
                    return;
                }
            };

            while watcher.changed().await.is_some() {
                if let Err(e) = manager.reload().await {
                    warn!("Hot reload failed, keeping previous snapshot: {}", e);
                }
            }
        });

        Ok(())
    }

    async fn notify(&self, change: ConfigChange<T>) {
        use tokio::sync::mpsc::error::TrySendError;

        let mut notifiers = self.notifiers.write().await;
        // 队列满只丢这一条通知，订阅者继续保留；只有对端关闭才移除
        notifiers.retain(|tx| match tx.try_send(change.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!("Subscriber queue full, dropping config change notification");
                true
            }
            Err(TrySendError::Closed(_)) => false,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file_source::FileSource;
    use crate::thresholds::Thresholds;
    use tempfile::NamedTempFile;

    #[tokio::test]
    async fn test_load_and_snapshot() {
        let temp_file = NamedTempFile::new().unwrap();
        let path = temp_file.path().with_extension("toml");

        let source = FileSource::new(&path);
        let thresholds = Thresholds::default();
        use crate::source::ConfigSource;
        source.save(&thresholds).await.unwrap();

        let manager = ConfigManager::new(Arc::new(source));
        assert!(manager.snapshot().await.is_none());

        manager.load().await.unwrap();
        assert_eq!(manager.snapshot().await, Some(thresholds));

        std::fs::remove_file(&path).ok();
    }

    #[tokio::test]
    async fn test_reload_notifies_subscribers() {
        let temp_file = NamedTempFile::new().unwrap();
        let path = temp_file.path().with_extension("toml");

        let source = FileSource::new(&path);
        use crate::source::ConfigSource;
        source.save(&Thresholds::default()).await.unwrap();

        let manager = ConfigManager::new(Arc::new(FileSource::<Thresholds>::new(&path)));
        manager.load().await.unwrap();

        let mut rx = manager.subscribe().await;

        let updated = Thresholds {
            backoff_limit: 5,
            ..Default::default()
        };
        source.save(&updated).await.unwrap();
        manager.reload().await.unwrap();

        // Loaded 事件在订阅之前发出，这里只关心 Updated
        let change = rx.recv().await.unwrap();
        match change {
            ConfigChange::Updated { new, .. } => assert_eq!(new.backoff_limit, 5),
            other => panic!("unexpected change: {:?}", other),
        }

        assert_eq!(manager.snapshot().await.unwrap().backoff_limit, 5);

        std::fs::remove_file(&path).ok();
    }

    #[tokio::test]
    async fn test_slow_subscriber_survives_full_queue() {
        use crate::source::{ConfigSource, StaticSource};

        let source = Arc::new(StaticSource::new(Thresholds::default()));
        let manager = ConfigManager::new(source.clone());
        manager.load().await.unwrap();

        let mut rx = manager.subscribe().await;

        // 订阅队列容量为 10，塞满后继续 reload 只丢通知、不掉订阅
        for i in 0..12usize {
            let updated = Thresholds {
                backoff_limit: i + 1,
                ..Default::default()
            };
            source.save(&updated).await.unwrap();
            manager.reload().await.unwrap();
        }

        while rx.try_recv().is_ok() {}

        source
            .save(&Thresholds {
                backoff_limit: 99,
                ..Default::default()
            })
            .await
            .unwrap();
        manager.reload().await.unwrap();

        match rx.recv().await.unwrap() {
            ConfigChange::Updated { new, .. } => assert_eq!(new.backoff_limit, 99),
            other => panic!("unexpected change: {:?}", other),
        }
    }
}
