//! 配置注册中心
//!
//! 持有当前生效的配置和已注册组件集合，负责配置切换的下发协议：
//!
//! - 正式切换：新配置立即成为生效配置，按注册顺序逐个下发；单个组件的
//!   错误或 panic 被捕获并记录，不影响其余组件，也不回滚切换。
//! - 试运行：保存所有组件状态，下发候选配置并收集就绪结果，随后
//!   `invalidate` 并恢复原状态，生效配置保持不变。
//!
//! 切换与注册共用同一把互斥锁；读取生效配置通过 `ArcSwapOption` 完成，不需要加锁。

use crate::config::Configuration;
use crate::error::DeliveryError;
use crate::registry::configurable::Configurable;
use crate::status::ComponentReadiness;
use arc_swap::ArcSwapOption;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use futures::FutureExt;
use serde::Serialize;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// 切换模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SwitchMode {
    /// 正式切换
    Live,
    /// 试运行，不改变线上状态
    ValidateOnly,
}

/// 单个组件的下发失败
#[derive(Debug, Clone, Serialize)]
pub struct DeliveryFailure {
    /// 组件名称
    pub component: String,
    /// 错误信息
    pub error: String,
}

/// 切换结果
#[derive(Debug, Clone, Serialize)]
pub struct SwitchReport {
    /// 切换模式
    pub mode: SwitchMode,
    /// 下发的配置版本
    pub version: u64,
    /// 成功接收配置的组件数
    pub delivered: usize,
    /// 下发失败的组件
    pub failures: Vec<DeliveryFailure>,
    /// 试运行期间各组件的就绪结果（正式切换时为空）
    pub readiness: Vec<ComponentReadiness>,
    /// 完成时间
    pub completed_at: DateTime<Utc>,
}

impl SwitchReport {
    /// 是否所有组件都接收了配置
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// 试运行时所有组件是否就绪
    pub fn all_ready(&self) -> bool {
        self.readiness.iter().all(|r| r.ready)
    }
}

/// 注册结果
#[derive(Debug, Clone)]
pub enum Registration {
    /// 新注册；若已有生效配置则已成功下发
    Registered,
    /// 新注册，但下发当前配置失败
    Degraded(DeliveryFailure),
    /// 此前已注册，未做任何操作
    AlreadyRegistered,
}

impl Registration {
    /// 是否为新注册
    pub fn is_new(&self) -> bool {
        !matches!(self, Registration::AlreadyRegistered)
    }

    /// 下发失败信息
    pub fn failure(&self) -> Option<&DeliveryFailure> {
        match self {
            Registration::Degraded(failure) => Some(failure),
            _ => None,
        }
    }
}

struct RegistryInner {
    components: Vec<Arc<dyn Configurable>>,
    last_switch: Option<DateTime<Utc>>,
}

/// 配置注册中心
pub struct ConfigurationRegistry {
    inner: Mutex<RegistryInner>,
    active: ArcSwapOption<Configuration>,
}

impl Default for ConfigurationRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigurationRegistry {
    /// 创建空的注册中心
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(RegistryInner {
                components: Vec::new(),
                last_switch: None,
            }),
            active: ArcSwapOption::empty(),
        }
    }

    /// 当前生效的配置
    pub fn active(&self) -> Option<Arc<Configuration>> {
        self.active.load_full()
    }

    /// 最近一次正式切换的时间
    pub async fn last_switch(&self) -> Option<DateTime<Utc>> {
        self.inner.lock().await.last_switch
    }

    /// 已注册组件的快照
    pub async fn components(&self) -> Vec<Arc<dyn Configurable>> {
        self.inner.lock().await.components.clone()
    }

    /// 注册组件
    ///
    /// 若已有生效配置，立即下发给新组件。重复注册同一组件不产生任何效果。
    pub async fn register(&self, component: Arc<dyn Configurable>) -> Registration {
        let mut inner = self.inner.lock().await;

        if inner
            .components
            .iter()
            .any(|existing| same_component(existing, &component))
        {
            debug!(component = component.name(), "组件已注册，忽略重复注册");
            return Registration::AlreadyRegistered;
        }

        let mut registration = Registration::Registered;
        if let Some(active) = self.active() {
            match deliver(component.as_ref(), active).await {
                Ok(()) => debug!(component = component.name(), "已向新注册组件下发当前配置"),
                Err(e) => {
                    error!(
                        component = component.name(),
                        error = %e,
                        "向新注册组件下发配置失败，组件处于降级状态"
                    );
                    registration = Registration::Degraded(DeliveryFailure {
                        component: component.name().to_string(),
                        error: e.to_string(),
                    });
                }
            }
        }

        info!(component = component.name(), "组件已注册");
        inner.components.push(component);
        registration
    }

    /// 注销组件并丢弃其配置
    ///
    /// 与切换共用同一把锁，注销后的组件不会再收到新配置。
    ///
    /// # 返回
    /// * `bool` - 组件此前是否已注册
    pub async fn unregister(&self, component: &Arc<dyn Configurable>) -> bool {
        let mut inner = self.inner.lock().await;
        let Some(position) = inner
            .components
            .iter()
            .position(|existing| same_component(existing, component))
        else {
            return false;
        };

        let removed = inner.components.remove(position);
        removed.invalidate().await;
        info!(component = removed.name(), "组件已注销");
        true
    }

    /// 切换配置
    ///
    /// # 参数
    /// * `new_config` - 新配置
    /// * `mode` - 正式切换或试运行
    ///
    /// # 返回
    /// * `SwitchReport` - 下发结果；单个组件的失败不会作为错误返回
    pub async fn switch_configuration(
        &self,
        new_config: Arc<Configuration>,
        mode: SwitchMode,
    ) -> SwitchReport {
        let mut inner = self.inner.lock().await;
        match mode {
            SwitchMode::Live => self.switch_live(&mut inner, new_config).await,
            SwitchMode::ValidateOnly => Self::validate_only(&inner, new_config).await,
        }
    }

    async fn switch_live(
        &self,
        inner: &mut RegistryInner,
        new_config: Arc<Configuration>,
    ) -> SwitchReport {
        let version = new_config.version();
        info!(version, components = inner.components.len(), "开始切换配置");

        // 旧配置保留到下发结束，正在处理的请求仍可使用
        let previous = self.active.swap(Some(Arc::clone(&new_config)));

        let mut failures = Vec::new();
        for component in &inner.components {
            if let Err(e) = deliver(component.as_ref(), Arc::clone(&new_config)).await {
                error!(
                    component = component.name(),
                    version,
                    error = %e,
                    "配置下发失败，组件处于降级状态"
                );
                failures.push(DeliveryFailure {
                    component: component.name().to_string(),
                    error: e.to_string(),
                });
            }
        }

        let completed_at = Utc::now();
        inner.last_switch = Some(completed_at);
        drop(previous);

        let delivered = inner.components.len() - failures.len();
        if failures.is_empty() {
            info!(version, delivered, "配置切换完成");
        } else {
            warn!(version, delivered, failed = failures.len(), "配置切换完成，部分组件下发失败");
        }

        SwitchReport {
            mode: SwitchMode::Live,
            version,
            delivered,
            failures,
            readiness: Vec::new(),
            completed_at,
        }
    }

    async fn validate_only(inner: &RegistryInner, candidate: Arc<Configuration>) -> SwitchReport {
        let version = candidate.version();
        info!(version, "开始试运行配置");

        let mut saved = Vec::with_capacity(inner.components.len());
        for component in &inner.components {
            saved.push(component.save_state().await);
        }

        let mut failures = Vec::new();
        for component in &inner.components {
            if let Err(e) = deliver(component.as_ref(), Arc::clone(&candidate)).await {
                warn!(component = component.name(), error = %e, "试运行配置下发失败");
                failures.push(DeliveryFailure {
                    component: component.name().to_string(),
                    error: e.to_string(),
                });
            }
        }

        let readiness = poll_readiness(&inner.components).await;

        for component in &inner.components {
            component.invalidate().await;
        }
        for (component, state) in inner.components.iter().zip(saved) {
            component.restore_state(state).await;
        }

        let ready = readiness.iter().filter(|r| r.ready).count();
        info!(version, ready, total = readiness.len(), "试运行结束，组件状态已恢复");

        SwitchReport {
            mode: SwitchMode::ValidateOnly,
            version,
            delivered: inner.components.len() - failures.len(),
            failures,
            readiness,
            completed_at: Utc::now(),
        }
    }
}

/// 并发检测一组组件的就绪状态，组件 panic 视为未就绪
pub async fn poll_readiness(components: &[Arc<dyn Configurable>]) -> Vec<ComponentReadiness> {
    let checks = components.iter().map(|component| async move {
        let ready = match guarded(component.is_ready()).await {
            Ok(ready) => ready,
            Err(message) => {
                error!(component = component.name(), panic = %message, "就绪检测崩溃");
                false
            }
        };
        ComponentReadiness {
            name: component.name().to_string(),
            ready,
        }
    });
    join_all(checks).await
}

/// 向单个组件下发配置，错误和 panic 都转换为 `DeliveryError`
async fn deliver(
    component: &dyn Configurable,
    config: Arc<Configuration>,
) -> Result<(), DeliveryError> {
    match guarded(component.set_configuration(config)).await {
        Ok(result) => result,
        Err(message) => Err(DeliveryError::Panicked(message)),
    }
}

async fn guarded<F: Future>(future: F) -> Result<F::Output, String> {
    AssertUnwindSafe(future)
        .catch_unwind()
        .await
        .map_err(|payload| panic_message(payload.as_ref()))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "未知 panic".to_string()
    }
}

fn same_component(a: &Arc<dyn Configurable>, b: &Arc<dyn Configurable>) -> bool {
    Arc::as_ptr(a).cast::<()>() == Arc::as_ptr(b).cast::<()>()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::MemoryConnector;
    use crate::registry::configurable::{ConfigBinding, SavedState};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// 记录下发次数的测试组件
    struct Recorder {
        name: String,
        binding: ConfigBinding<u64>,
        deliveries: AtomicUsize,
    }

    impl Recorder {
        fn new(name: &str) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                binding: ConfigBinding::new(),
                deliveries: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl Configurable for Recorder {
        fn name(&self) -> &str {
            &self.name
        }

        async fn set_configuration(&self, config: Arc<Configuration>) -> Result<(), DeliveryError> {
            self.deliveries.fetch_add(1, Ordering::SeqCst);
            self.binding.bind(config).await;
            Ok(())
        }

        async fn is_ready(&self) -> bool {
            self.binding
                .ensure(|cfg| async move { Ok(cfg.version()) })
                .await
                .is_ok()
        }

        async fn invalidate(&self) {
            self.binding.clear().await;
        }

        async fn save_state(&self) -> SavedState {
            self.binding.save().await
        }

        async fn restore_state(&self, state: SavedState) {
            self.binding.restore(state).await;
        }
    }

    fn config(version: u64) -> Arc<Configuration> {
        Arc::new(
            Configuration::builder(Arc::new(MemoryConnector::new()))
                .version(version)
                .build(),
        )
    }

    #[tokio::test]
    async fn test_register_is_idempotent() {
        let registry = ConfigurationRegistry::new();
        registry
            .switch_configuration(config(1), SwitchMode::Live)
            .await;

        let component = Recorder::new("a");
        assert!(registry.register(component.clone()).await.is_new());
        assert!(!registry.register(component.clone()).await.is_new());

        assert_eq!(component.deliveries.load(Ordering::SeqCst), 1);
        assert_eq!(registry.components().await.len(), 1);
    }

    #[tokio::test]
    async fn test_register_before_activation_delivers_nothing() {
        let registry = ConfigurationRegistry::new();
        let component = Recorder::new("a");
        registry.register(component.clone()).await;

        assert_eq!(component.deliveries.load(Ordering::SeqCst), 0);
        assert!(!component.is_ready().await);

        registry
            .switch_configuration(config(1), SwitchMode::Live)
            .await;
        assert!(component.is_ready().await);
    }

    #[tokio::test]
    async fn test_live_switch_updates_active() {
        let registry = ConfigurationRegistry::new();
        assert!(registry.active().is_none());

        let report = registry
            .switch_configuration(config(3), SwitchMode::Live)
            .await;

        assert!(report.is_clean());
        assert_eq!(report.version, 3);
        assert_eq!(registry.active().unwrap().version(), 3);
        assert!(registry.last_switch().await.is_some());
    }

    #[tokio::test]
    async fn test_validate_only_keeps_active() {
        let registry = ConfigurationRegistry::new();
        let live = config(1);
        registry
            .switch_configuration(Arc::clone(&live), SwitchMode::Live)
            .await;
        let component = Recorder::new("a");
        registry.register(component.clone()).await;
        assert!(component.is_ready().await);
        let resource = component.binding.resource().await.unwrap();

        let report = registry
            .switch_configuration(config(2), SwitchMode::ValidateOnly)
            .await;

        assert!(report.all_ready());
        assert!(Arc::ptr_eq(&registry.active().unwrap(), &live));
        assert!(Arc::ptr_eq(
            &component.binding.resource().await.unwrap(),
            &resource
        ));
        assert!(registry.last_switch().await.is_some());
    }

    #[tokio::test]
    async fn test_unregister_invalidates_and_stops_delivery() {
        let registry = ConfigurationRegistry::new();
        registry
            .switch_configuration(config(1), SwitchMode::Live)
            .await;
        let component = Recorder::new("a");
        let handle: Arc<dyn Configurable> = component.clone();
        registry.register(Arc::clone(&handle)).await;
        assert!(component.is_ready().await);

        assert!(registry.unregister(&handle).await);
        assert!(!registry.unregister(&handle).await);
        assert!(!component.is_ready().await);
        assert!(registry.components().await.is_empty());

        registry
            .switch_configuration(config(2), SwitchMode::Live)
            .await;
        assert_eq!(component.deliveries.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_panic_message_extraction() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");

        let payload: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "bang");
    }
}
