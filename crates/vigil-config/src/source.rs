use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// 配置源抽象
#[async_trait]
pub trait ConfigSource<T>: Send + Sync
where
    T: Clone + Serialize + for<'de> Deserialize<'de> + Send + Sync,
{
    /// 加载配置
    async fn load(&self) -> Result<T>;

    /// 保存配置
    async fn save(&self, config: &T) -> Result<()>;

    /// 监听配置变更
    async fn watch(&self) -> Result<ConfigWatcher>;
}

/// 配置变更监听器
pub struct ConfigWatcher {
    rx: mpsc::Receiver<()>,
}

impl ConfigWatcher {
    pub fn new(rx: mpsc::Receiver<()>) -> Self {
        Self { rx }
    }

    /// 等待下一次变更通知
    pub async fn changed(&mut self) -> Option<()> {
        self.rx.recv().await
    }
}

/// 固定配置源（测试和不需要热更新的部署用）
pub struct StaticSource<T> {
    config: tokio::sync::RwLock<T>,
}

impl<T> StaticSource<T> {
    pub fn new(config: T) -> Self {
        Self {
            config: tokio::sync::RwLock::new(config),
        }
    }
}

#[async_trait]
impl<T> ConfigSource<T> for StaticSource<T>
where
    T: Clone + Serialize + for<'de> Deserialize<'de> + Send + Sync + 'static,
{
    async fn load(&self) -> Result<T> {
        Ok(self.config.read().await.clone())
    }

    async fn save(&self, config: &T) -> Result<()> {
        *self.config.write().await = config.clone();
        Ok(())
    }

    async fn watch(&self) -> Result<ConfigWatcher> {
        // 固定配置不会变更，返回一个永不触发的监听器
        let (_tx, rx) = mpsc::channel(1);
        Ok(ConfigWatcher::new(rx))
    }
}
