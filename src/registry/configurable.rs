//! 可配置组件契约
//!
//! 每个依赖配置的组件实现 [`Configurable`]，并通常把状态交给一个
//! [`ConfigBinding`] 管理。组件状态机：
//!
//! ```text
//! UNCONFIGURED --set_configuration--> CONFIGURED_UNVERIFIED --is_ready 成功--> READY
//! CONFIGURED_UNVERIFIED --is_ready 失败--> CONFIGURED_UNVERIFIED
//! 任意状态 --set_configuration--> CONFIGURED_UNVERIFIED
//! 任意状态 --invalidate--> UNCONFIGURED
//! ```
//!
//! 不存在终止性的失败状态，任何失败都会在下一次就绪检测或下一次重新配置时重试。

use crate::config::Configuration;
use crate::error::{DeliveryError, ReadinessError};
use async_trait::async_trait;
use std::any::Any;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// 组件状态快照，仅用于试运行后的恢复
pub struct SavedState(Box<dyn Any + Send + Sync>);

impl SavedState {
    /// 包装任意组件状态
    pub fn new<T: Any + Send + Sync>(state: T) -> Self {
        Self(Box::new(state))
    }

    /// 取回原始状态，类型不符时返回 `None`
    pub fn downcast<T: Any>(self) -> Option<T> {
        self.0.downcast::<T>().ok().map(|boxed| *boxed)
    }
}

impl std::fmt::Debug for SavedState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SavedState(..)")
    }
}

/// 可配置组件trait
#[async_trait]
pub trait Configurable: Send + Sync {
    /// 组件名称，用于日志和健康报告
    fn name(&self) -> &str;

    /// 接收新配置
    ///
    /// 保存配置引用并丢弃旧的派生资源，不执行耗时 I/O。
    async fn set_configuration(&self, config: Arc<Configuration>) -> Result<(), DeliveryError>;

    /// 检测组件是否就绪
    ///
    /// 首次调用时构建派生资源，成功后缓存；失败时保持未就绪，下一次调用重试。
    async fn is_ready(&self) -> bool;

    /// 丢弃配置和派生资源
    async fn invalidate(&self);

    /// 保存当前状态
    async fn save_state(&self) -> SavedState;

    /// 恢复 [`Configurable::save_state`] 保存的状态
    async fn restore_state(&self, state: SavedState);
}

/// 组件当前阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BindingPhase {
    Unconfigured,
    ConfiguredUnverified,
    Ready,
}

struct BindingState<R> {
    config: Option<Arc<Configuration>>,
    resource: Option<Arc<R>>,
    generation: u64,
}

impl<R> Clone for BindingState<R> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            resource: self.resource.clone(),
            generation: self.generation,
        }
    }
}

/// 组件的配置绑定
///
/// 持有配置引用和由其派生的资源。资源构建在锁外进行，
/// 只有当构建期间代数未变时才会提交。
pub struct ConfigBinding<R> {
    state: RwLock<BindingState<R>>,
}

impl<R: Send + Sync + 'static> Default for ConfigBinding<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Send + Sync + 'static> ConfigBinding<R> {
    /// 创建未配置的绑定
    pub fn new() -> Self {
        Self {
            state: RwLock::new(BindingState {
                config: None,
                resource: None,
                generation: 0,
            }),
        }
    }

    /// 绑定新配置，丢弃旧资源
    pub async fn bind(&self, config: Arc<Configuration>) {
        let mut state = self.state.write().await;
        state.config = Some(config);
        state.resource = None;
        state.generation += 1;
    }

    /// 清除配置和资源
    pub async fn clear(&self) {
        let mut state = self.state.write().await;
        state.config = None;
        state.resource = None;
        state.generation += 1;
    }

    /// 当前配置
    pub async fn config(&self) -> Option<Arc<Configuration>> {
        self.state.read().await.config.clone()
    }

    /// 已就绪时的派生资源
    pub async fn resource(&self) -> Option<Arc<R>> {
        self.state.read().await.resource.clone()
    }

    /// 当前阶段
    pub async fn phase(&self) -> BindingPhase {
        let state = self.state.read().await;
        match (&state.config, &state.resource) {
            (None, _) => BindingPhase::Unconfigured,
            (Some(_), None) => BindingPhase::ConfiguredUnverified,
            (Some(_), Some(_)) => BindingPhase::Ready,
        }
    }

    /// 获取派生资源，必要时调用 `build` 构建
    ///
    /// `build` 在不持有锁的情况下运行，慢速探测不会阻塞并发的重新配置。
    /// 若构建期间配置被替换或清除，结果被丢弃并返回 [`ReadinessError::Superseded`]。
    pub async fn ensure<F, Fut>(&self, build: F) -> Result<Arc<R>, ReadinessError>
    where
        F: FnOnce(Arc<Configuration>) -> Fut,
        Fut: Future<Output = Result<R, ReadinessError>>,
    {
        let (config, generation) = {
            let state = self.state.read().await;
            if let Some(resource) = &state.resource {
                return Ok(Arc::clone(resource));
            }
            let config = state.config.clone().ok_or(ReadinessError::Unconfigured)?;
            (config, state.generation)
        };

        let built = Arc::new(build(config).await?);

        let mut state = self.state.write().await;
        if state.generation != generation {
            debug!("资源构建期间配置已变更，丢弃构建结果");
            return Err(ReadinessError::Superseded);
        }
        if let Some(existing) = &state.resource {
            return Ok(Arc::clone(existing));
        }
        state.resource = Some(Arc::clone(&built));
        Ok(built)
    }

    /// 保存状态
    pub async fn save(&self) -> SavedState {
        let state = self.state.read().await.clone();
        SavedState::new(state)
    }

    /// 恢复状态，类型不符时退化为清除
    pub async fn restore(&self, saved: SavedState) {
        let mut state = self.state.write().await;
        let next_generation = state.generation + 1;
        match saved.downcast::<BindingState<R>>() {
            Some(restored) => {
                state.config = restored.config;
                state.resource = restored.resource;
            }
            None => {
                warn!("恢复的组件状态类型不匹配，组件将被清除");
                state.config = None;
                state.resource = None;
            }
        }
        // 恢复后代数仍然前进，避免试运行期间启动的构建提交到恢复后的状态
        state.generation = next_generation;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::MemoryConnector;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn config(version: u64) -> Arc<Configuration> {
        Arc::new(
            Configuration::builder(Arc::new(MemoryConnector::new()))
                .version(version)
                .build(),
        )
    }

    #[tokio::test]
    async fn test_binding_lifecycle() {
        let binding: ConfigBinding<String> = ConfigBinding::new();
        assert_eq!(binding.phase().await, BindingPhase::Unconfigured);

        binding.bind(config(1)).await;
        assert_eq!(binding.phase().await, BindingPhase::ConfiguredUnverified);

        let resource = binding
            .ensure(|cfg| async move { Ok(format!("v{}", cfg.version())) })
            .await
            .unwrap();
        assert_eq!(resource.as_str(), "v1");
        assert_eq!(binding.phase().await, BindingPhase::Ready);

        binding.clear().await;
        assert_eq!(binding.phase().await, BindingPhase::Unconfigured);
        binding.clear().await;
        assert_eq!(binding.phase().await, BindingPhase::Unconfigured);
    }

    #[tokio::test]
    async fn test_ensure_caches_resource() {
        let binding: ConfigBinding<usize> = ConfigBinding::new();
        binding.bind(config(1)).await;
        let builds = AtomicUsize::new(0);

        for _ in 0..3 {
            binding
                .ensure(|_| async { Ok(builds.fetch_add(1, Ordering::SeqCst)) })
                .await
                .unwrap();
        }

        assert_eq!(builds.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_build_is_retried() {
        let binding: ConfigBinding<usize> = ConfigBinding::new();
        binding.bind(config(1)).await;

        let failed = binding
            .ensure(|_| async { Err(ReadinessError::ProbeFailed("down".to_string())) })
            .await;
        assert!(failed.is_err());
        assert_eq!(binding.phase().await, BindingPhase::ConfiguredUnverified);

        let ok = binding.ensure(|_| async { Ok(7) }).await.unwrap();
        assert_eq!(*ok, 7);
    }

    #[tokio::test]
    async fn test_ensure_without_config_fails() {
        let binding: ConfigBinding<usize> = ConfigBinding::new();
        let result = binding.ensure(|_| async { Ok(1) }).await;
        assert!(matches!(result, Err(ReadinessError::Unconfigured)));
    }

    #[tokio::test]
    async fn test_build_superseded_by_rebind() {
        let binding = Arc::new(ConfigBinding::<u64>::new());
        binding.bind(config(1)).await;

        let rebinder = Arc::clone(&binding);
        let result = binding
            .ensure(|cfg| async move {
                rebinder.bind(config(2)).await;
                Ok(cfg.version())
            })
            .await;

        assert!(matches!(result, Err(ReadinessError::Superseded)));
        assert_eq!(binding.config().await.unwrap().version(), 2);
        assert!(binding.resource().await.is_none());
    }

    #[tokio::test]
    async fn test_save_and_restore_keep_identity() {
        let binding: ConfigBinding<String> = ConfigBinding::new();
        let original = config(1);
        binding.bind(Arc::clone(&original)).await;
        let resource = binding
            .ensure(|_| async { Ok("live".to_string()) })
            .await
            .unwrap();

        let saved = binding.save().await;
        binding.bind(config(2)).await;
        binding.clear().await;
        binding.restore(saved).await;

        assert!(Arc::ptr_eq(&binding.config().await.unwrap(), &original));
        assert!(Arc::ptr_eq(&binding.resource().await.unwrap(), &resource));
    }

    #[tokio::test]
    async fn test_restore_with_foreign_state_clears() {
        let binding: ConfigBinding<String> = ConfigBinding::new();
        binding.bind(config(1)).await;

        binding.restore(SavedState::new(42_u32)).await;
        assert_eq!(binding.phase().await, BindingPhase::Unconfigured);
    }
}
