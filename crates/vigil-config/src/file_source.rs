use anyhow::Result;
use async_trait::async_trait;
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::fs;
use tokio::sync::mpsc;
use tracing::{debug, error};

use crate::source::{ConfigSource, ConfigWatcher};

/// 文件配置源
///
/// 扩展名为 `.json` 时按 JSON 读写，其余按 TOML。
pub struct FileSource<T> {
    path: PathBuf,
    _phantom: std::marker::PhantomData<T>,
}

impl<T> FileSource<T> {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            _phantom: std::marker::PhantomData,
        }
    }

    fn is_json(&self) -> bool {
        self.path.extension().and_then(|s| s.to_str()) == Some("json")
    }
}

#[async_trait]
impl<T> ConfigSource<T> for FileSource<T>
where
    T: Clone + Serialize + for<'de> Deserialize<'de> + Send + Sync + 'static,
{
    async fn load(&self) -> Result<T> {
        debug!("Loading thresholds from file: {:?}", self.path);

        let content = fs::read_to_string(&self.path).await?;

        let config = if self.is_json() {
            serde_json::from_str(&content)?
        } else {
            toml::from_str(&content)?
        };

        Ok(config)
    }

    async fn save(&self, config: &T) -> Result<()> {
        debug!("Saving thresholds to file: {:?}", self.path);

        let content = if self.is_json() {
            serde_json::to_string_pretty(config)?
        } else {
            toml::to_string_pretty(config)?
        };

        fs::write(&self.path, content).await?;

        Ok(())
    }

    async fn watch(&self) -> Result<ConfigWatcher> {
        let (tx, rx) = mpsc::channel(10);
        let path = self.path.clone();

        std::thread::spawn(move || {
            let (notify_tx, notify_rx) = std::sync::mpsc::channel();

            let mut watcher: RecommendedWatcher =
                match Watcher::new(notify_tx, notify::Config::default()) {
                    Ok(w) => w,
                    Err(e) => {
                        error!("Failed to create file watcher: {}", e);
                        return;
                    }
                };

            if let Err(e) = watcher.watch(&path, RecursiveMode::NonRecursive) {
                error!("Failed to watch {:?}: {}", path, e);
                return;
            }

            debug!("Threshold file watcher started for: {:?}", path);

            loop {
                match notify_rx.recv() {
                    Ok(Ok(Event { kind, .. })) => {
                        use notify::EventKind::*;
                        match kind {
                            Modify(_) | Create(_) => {
                                debug!("Threshold file changed: {:?}", path);
                                if tx.blocking_send(()).is_err() {
                                    break;
                                }
                            }
                            _ => {}
                        }
                    }
                    Ok(Err(e)) => {
                        error!("Watch error: {}", e);
                    }
                    Err(e) => {
                        error!("Channel error: {}", e);
                        break;
                    }
                }
            }
        });

        Ok(ConfigWatcher::new(rx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::thresholds::Thresholds;
    use tempfile::NamedTempFile;

    #[tokio::test]
    async fn test_file_source_toml() {
        let temp_file = NamedTempFile::new().unwrap();
        let path = temp_file.path().with_extension("toml");

        let source = FileSource::new(&path);

        let thresholds = Thresholds {
            cluster_size: 9,
            ..Default::default()
        };

        source.save(&thresholds).await.unwrap();
        let loaded: Thresholds = source.load().await.unwrap();

        assert_eq!(loaded, thresholds);

        std::fs::remove_file(&path).ok();
    }

    #[tokio::test]
    async fn test_file_source_json() {
        let temp_file = NamedTempFile::new().unwrap();
        let path = temp_file.path().with_extension("json");

        let source = FileSource::new(&path);

        let thresholds = Thresholds::default();

        source.save(&thresholds).await.unwrap();
        let loaded: Thresholds = source.load().await.unwrap();

        assert_eq!(loaded, thresholds);

        std::fs::remove_file(&path).ok();
    }
}
