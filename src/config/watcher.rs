//! 配置文件监控模块
//!
//! 监控配置文件变更，重新加载后广播新的配置快照，由订阅方决定是否切换

use crate::config::configuration::Configuration;
use crate::config::loader::{ConfigLoader, TomlConfigLoader};
use anyhow::{Context, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

/// 配置变更事件
#[derive(Debug, Clone)]
pub struct ConfigChangeEvent {
    /// 配置文件路径
    pub config_path: PathBuf,
    /// 新配置
    pub new_config: Arc<Configuration>,
    /// 变更时间
    pub timestamp: Instant,
}

/// 配置文件监控器
pub struct ConfigWatcher {
    /// 配置文件路径
    config_path: PathBuf,
    /// 文件系统监控器
    watcher: Option<RecommendedWatcher>,
    /// 配置加载器
    loader: TomlConfigLoader,
    /// 事件发送器
    event_sender: broadcast::Sender<ConfigChangeEvent>,
    /// 防抖动延迟
    debounce_delay: Duration,
}

impl ConfigWatcher {
    /// 创建新的配置监控器
    ///
    /// # 参数
    /// * `config_path` - 配置文件路径
    /// * `debounce_delay` - 防抖动延迟时间
    /// * `loader` - 重新加载时使用的加载器
    ///
    /// # 返回
    /// * `Result<(Self, broadcast::Receiver<ConfigChangeEvent>)>` - 监控器和事件接收器
    pub fn new<P: AsRef<Path>>(
        config_path: P,
        debounce_delay: Duration,
        loader: TomlConfigLoader,
    ) -> Result<(Self, broadcast::Receiver<ConfigChangeEvent>)> {
        let config_path = config_path.as_ref().to_path_buf();

        Self::validate_config_path(&config_path)?;

        let (event_sender, event_receiver) = broadcast::channel(32);

        let watcher = Self {
            config_path,
            watcher: None,
            loader,
            event_sender,
            debounce_delay,
        };

        Ok((watcher, event_receiver))
    }

    /// 验证配置文件路径
    fn validate_config_path(path: &Path) -> Result<()> {
        if !path.exists() {
            return Err(anyhow::anyhow!("配置文件不存在: {}", path.display()));
        }

        if !path.is_file() {
            return Err(anyhow::anyhow!("路径不是文件: {}", path.display()));
        }

        if path.extension().is_some_and(|ext| ext != "toml") {
            warn!("配置文件扩展名不是.toml: {}", path.display());
        }

        Ok(())
    }

    /// 启动配置文件监控
    pub fn start(&mut self) -> Result<()> {
        info!("启动配置文件监控: {}", self.config_path.display());

        let (tx, rx) = mpsc::unbounded_channel();
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| {
                let _ = tx.send(res);
            },
            notify::Config::default().with_poll_interval(Duration::from_secs(1)),
        )
        .context("创建文件监控器失败")?;

        // 监控所在目录，编辑器替换文件时仍能收到事件
        let watch_path = self
            .config_path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        watcher
            .watch(watch_path, RecursiveMode::NonRecursive)
            .with_context(|| format!("监控目录失败: {}", watch_path.display()))?;

        self.watcher = Some(watcher);

        let config_path = self.config_path.clone();
        let event_sender = self.event_sender.clone();
        let loader = self.loader.clone();
        let debounce_delay = self.debounce_delay;

        tokio::spawn(async move {
            Self::handle_file_events(rx, config_path, event_sender, loader, debounce_delay).await;
        });

        info!("配置文件监控已启动");
        Ok(())
    }

    /// 处理文件系统事件
    async fn handle_file_events(
        mut rx: mpsc::UnboundedReceiver<notify::Result<Event>>,
        config_path: PathBuf,
        event_sender: broadcast::Sender<ConfigChangeEvent>,
        loader: TomlConfigLoader,
        debounce_delay: Duration,
    ) {
        let mut last_event_time: Option<Instant> = None;

        while let Some(res) = rx.recv().await {
            let event = match res {
                Ok(event) => event,
                Err(e) => {
                    error!("文件监控事件错误: {}", e);
                    continue;
                }
            };

            if !Self::is_target_file_event(&event, &config_path) {
                continue;
            }

            debug!("检测到配置文件变更事件: {:?}", event.kind);

            let now = Instant::now();
            if last_event_time.is_some_and(|last| now.duration_since(last) < debounce_delay) {
                debug!("跳过重复事件（防抖动）");
                continue;
            }
            last_event_time = Some(now);

            // 等待写入完成
            tokio::time::sleep(debounce_delay).await;

            match Self::reload_config(&loader, &config_path).await {
                Ok(change_event) => {
                    info!(version = change_event.new_config.version(), "配置重载成功");
                    if event_sender.send(change_event).is_err() {
                        debug!("没有配置变更订阅者");
                    }
                }
                Err(e) => {
                    // 加载失败时保留当前生效配置
                    error!("配置重载失败: {:#}", e);
                }
            }
        }
    }

    /// 检查是否是目标文件的事件
    fn is_target_file_event(event: &Event, target_path: &Path) -> bool {
        match &event.kind {
            EventKind::Modify(_) | EventKind::Create(_) => event
                .paths
                .iter()
                .any(|path| path.file_name() == target_path.file_name()),
            _ => false,
        }
    }

    /// 重新加载配置
    async fn reload_config(
        loader: &TomlConfigLoader,
        config_path: &Path,
    ) -> Result<ConfigChangeEvent> {
        debug!("重新加载配置文件: {}", config_path.display());

        let new_config = loader
            .load_from_file(config_path)
            .await
            .context("重新加载配置失败")?;

        Ok(ConfigChangeEvent {
            config_path: config_path.to_path_buf(),
            new_config: Arc::new(new_config),
            timestamp: Instant::now(),
        })
    }

    /// 停止监控
    pub fn stop(&mut self) {
        if let Some(watcher) = self.watcher.take() {
            drop(watcher);
            info!("配置文件监控已停止");
        }
    }

    /// 订阅配置变更事件
    pub fn subscribe(&self) -> broadcast::Receiver<ConfigChangeEvent> {
        self.event_sender.subscribe()
    }
}

impl Drop for ConfigWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}
