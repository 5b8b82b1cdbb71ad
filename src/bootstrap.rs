//! 组件装配
//!
//! 先构建组件，再显式注册到注册中心。组件集合按端点组织：
//! 每个端点一个健康探测、一个元数据仓库、一个示例查询提供者，
//! 声明了协议的端点再加一个协议服务。

use crate::components::{
    DatastoreHealthProbe, ExampleQueryProvider, MetadataRepository, ProtocolService,
};
use crate::config::{ConfigLoader, Configuration, Protocol, TomlConfigLoader};
use crate::error::Result;
use crate::registry::{
    poll_readiness, Configurable, ConfigurationRegistry, DeliveryFailure, Registration,
    SwitchMode, SwitchReport,
};
use crate::status::ComponentReadiness;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

/// 配置来源：加载器加配置文件路径
#[derive(Clone)]
pub struct ConfigSource {
    loader: TomlConfigLoader,
    path: PathBuf,
}

impl ConfigSource {
    pub fn new(loader: TomlConfigLoader, path: impl Into<PathBuf>) -> Self {
        Self {
            loader,
            path: path.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn loader(&self) -> &TomlConfigLoader {
        &self.loader
    }

    /// 从文件加载新的配置快照
    pub async fn load(&self) -> Result<Arc<Configuration>> {
        let config = self.loader.load_from_file(&self.path).await?;
        Ok(Arc::new(config))
    }
}

/// 单个端点的组件
pub struct EndpointComponents {
    pub health: Arc<DatastoreHealthProbe>,
    pub metadata: Arc<MetadataRepository>,
    pub examples: Arc<ExampleQueryProvider>,
    pub protocol: Option<Arc<ProtocolService>>,
}

impl EndpointComponents {
    /// 为配置中的端点构建组件，不注册
    pub fn build(config: &Configuration, endpoint: &str) -> Self {
        let protocol = config
            .endpoint(endpoint)
            .and_then(|section| section.protocol)
            .map(|protocol| Arc::new(ProtocolService::new(endpoint, protocol)));

        Self {
            health: Arc::new(DatastoreHealthProbe::new(endpoint)),
            metadata: Arc::new(MetadataRepository::new(endpoint)),
            examples: Arc::new(ExampleQueryProvider::new(endpoint)),
            protocol,
        }
    }

    /// 当前协议服务对应的协议
    pub fn protocol_kind(&self) -> Option<Protocol> {
        self.protocol.as_ref().map(|service| service.protocol())
    }

    /// 保留其余组件，替换协议服务
    fn with_protocol(&self, protocol: Option<Arc<ProtocolService>>) -> Self {
        Self {
            health: Arc::clone(&self.health),
            metadata: Arc::clone(&self.metadata),
            examples: Arc::clone(&self.examples),
            protocol,
        }
    }

    /// 全部组件
    pub fn all(&self) -> Vec<Arc<dyn Configurable>> {
        let mut components: Vec<Arc<dyn Configurable>> = vec![
            self.health.clone(),
            self.metadata.clone(),
            self.examples.clone(),
        ];
        if let Some(protocol) = &self.protocol {
            components.push(protocol.clone());
        }
        components
    }
}

/// 一次装配的结果
#[derive(Debug, Default)]
pub struct WireSummary {
    /// 新注册的组件数
    pub registered: usize,
    /// 注销的组件数
    pub retired: usize,
    /// 注册时下发失败的组件
    pub failures: Vec<DeliveryFailure>,
}

impl WireSummary {
    /// 注册并成功收到配置的组件数
    pub fn delivered(&self) -> usize {
        self.registered - self.failures.len()
    }
}

/// 服务装配
///
/// 持有注册中心和已装配的端点组件。每次正式切换后按新配置调整组件集合：
/// 新端点装配组件，删除的端点注销组件，协议变更的端点替换协议服务。
pub struct ServiceWiring {
    registry: Arc<ConfigurationRegistry>,
    endpoints: RwLock<BTreeMap<String, Arc<EndpointComponents>>>,
}

impl ServiceWiring {
    pub fn new(registry: Arc<ConfigurationRegistry>) -> Self {
        Self {
            registry,
            endpoints: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn registry(&self) -> &Arc<ConfigurationRegistry> {
        &self.registry
    }

    /// 使已装配的组件集合与配置一致
    pub async fn wire(&self, config: &Configuration) -> WireSummary {
        let mut endpoints = self.endpoints.write().await;
        let mut summary = WireSummary::default();

        let removed: Vec<String> = endpoints
            .keys()
            .filter(|name| config.endpoint(name).is_none())
            .cloned()
            .collect();
        for name in removed {
            if let Some(components) = endpoints.remove(&name) {
                for component in components.all() {
                    if self.registry.unregister(&component).await {
                        summary.retired += 1;
                    }
                }
                info!(endpoint = %name, "端点已从配置中删除，组件已注销");
            }
        }

        let mut names: Vec<&str> = config.endpoint_names().collect();
        names.sort_unstable();

        for name in names {
            let declared = config.endpoint(name).and_then(|section| section.protocol);
            let components = match endpoints.get(name) {
                None => {
                    let components = EndpointComponents::build(config, name);
                    for component in components.all() {
                        self.register_into(component, &mut summary).await;
                    }
                    info!(endpoint = name, "端点组件已装配");
                    components
                }
                Some(existing) if existing.protocol_kind() == declared => continue,
                Some(existing) => {
                    if let Some(old) = &existing.protocol {
                        let old: Arc<dyn Configurable> = old.clone();
                        if self.registry.unregister(&old).await {
                            summary.retired += 1;
                        }
                    }
                    let protocol =
                        declared.map(|protocol| Arc::new(ProtocolService::new(name, protocol)));
                    if let Some(service) = &protocol {
                        self.register_into(service.clone(), &mut summary).await;
                    }
                    info!(
                        endpoint = name,
                        from = ?existing.protocol_kind(),
                        to = ?declared,
                        "端点协议已变更，协议服务已替换"
                    );
                    existing.with_protocol(protocol)
                }
            };
            endpoints.insert(name.to_string(), Arc::new(components));
        }

        summary
    }

    async fn register_into(&self, component: Arc<dyn Configurable>, summary: &mut WireSummary) {
        match self.registry.register(component).await {
            Registration::Registered => summary.registered += 1,
            Registration::Degraded(failure) => {
                summary.registered += 1;
                summary.failures.push(failure);
            }
            Registration::AlreadyRegistered => {}
        }
    }

    /// 激活配置
    ///
    /// 正式切换后再调整组件集合，新组件通过注册直接收到当前配置，
    /// 注册时的下发结果并入切换结果。
    /// 试运行时新端点和协议变更后的组件只临时构建并检测，不注册。
    pub async fn activate(&self, config: Arc<Configuration>, mode: SwitchMode) -> SwitchReport {
        match mode {
            SwitchMode::Live => {
                let mut report = self
                    .registry
                    .switch_configuration(Arc::clone(&config), SwitchMode::Live)
                    .await;
                let summary = self.wire(&config).await;
                report.delivered += summary.delivered();
                report.failures.extend(summary.failures);
                report
            }
            SwitchMode::ValidateOnly => {
                let mut report = self
                    .registry
                    .switch_configuration(Arc::clone(&config), SwitchMode::ValidateOnly)
                    .await;
                report
                    .readiness
                    .extend(self.trial_unwired(&config).await);
                report
            }
        }
    }

    /// 重新读取配置文件并激活
    ///
    /// 加载失败时生效配置保持不变。
    pub async fn reload(&self, source: &ConfigSource, mode: SwitchMode) -> Result<SwitchReport> {
        let config = source.load().await?;
        Ok(self.activate(config, mode).await)
    }

    /// 临时检测尚未装配的端点和协议变更后的协议服务
    async fn trial_unwired(&self, config: &Arc<Configuration>) -> Vec<ComponentReadiness> {
        let trial = self.unwired_components(config).await;
        trial_readiness(&trial, config).await
    }

    /// 配置需要、但尚未装配的组件
    async fn unwired_components(&self, config: &Configuration) -> Vec<Arc<dyn Configurable>> {
        let endpoints = self.endpoints.read().await;
        let mut trial: Vec<Arc<dyn Configurable>> = Vec::new();
        for name in config.endpoint_names() {
            match endpoints.get(name) {
                None => trial.extend(EndpointComponents::build(config, name).all()),
                Some(existing) => {
                    let declared = config.endpoint(name).and_then(|section| section.protocol);
                    let changed = declared.filter(|p| existing.protocol_kind() != Some(*p));
                    if let Some(protocol) = changed {
                        trial.push(Arc::new(ProtocolService::new(name, protocol)));
                    }
                }
            }
        }
        trial
    }

    /// 某个端点的组件
    pub async fn endpoint(&self, name: &str) -> Option<Arc<EndpointComponents>> {
        self.endpoints.read().await.get(name).cloned()
    }

    /// 已装配的端点名称
    pub async fn endpoint_names(&self) -> Vec<String> {
        self.endpoints.read().await.keys().cloned().collect()
    }

    /// 刷新所有元数据仓库的缓存
    ///
    /// # 返回
    /// * `usize` - 实际刷新的仓库数
    pub async fn refresh_metadata(&self) -> usize {
        let repositories: Vec<_> = self
            .endpoints
            .read()
            .await
            .values()
            .map(|components| components.metadata.clone())
            .collect();

        let mut refreshed = 0;
        for repository in repositories {
            if repository.refresh().await {
                refreshed += 1;
            }
        }
        refreshed
    }
}

/// 向临时组件下发配置并检测，检测后丢弃它们持有的配置和资源
async fn trial_readiness(
    trial: &[Arc<dyn Configurable>],
    config: &Arc<Configuration>,
) -> Vec<ComponentReadiness> {
    for component in trial {
        if let Err(e) = component.set_configuration(Arc::clone(config)).await {
            warn!(component = component.name(), error = %e, "试运行组件拒绝配置");
        }
    }
    let readiness = poll_readiness(trial).await;
    for component in trial {
        component.invalidate().await;
    }
    readiness
}
