//! 数据存储健康探测组件
//!
//! 为一个端点建立数据存储连接，执行探测语句，并在配置要求时确认
//! 数据存储扩展已启用。探测成功后缓存结果，直到下一次重新配置。

use crate::config::configuration::parse_setting;
use crate::config::Configuration;
use crate::dao::ConfigurationDao;
use crate::error::{DatastoreError, DeliveryError, ReadinessError};
use crate::registry::{BindingPhase, ConfigBinding, Configurable, SavedState};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// 探测语句配置项
pub const PROBE_QUERY: &str = "health.probe_query";
/// 必需的数据存储扩展配置项
pub const REQUIRED_EXTENSION: &str = "health.required_extension";
/// 探测超时配置项（秒）
pub const PROBE_TIMEOUT: &str = "health.timeout_seconds";

const DEFAULT_PROBE_QUERY: &str = "SELECT 1";
const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// 一次成功的探测
#[derive(Debug)]
pub struct ProbeOutcome {
    /// 探测使用的 DAO
    pub dao: ConfigurationDao,
    /// 执行的探测语句
    pub statement: String,
    /// 确认过的扩展
    pub extension: Option<String>,
    /// 探测耗时
    pub response_time: Duration,
    /// 探测时间
    pub checked_at: DateTime<Utc>,
}

/// 数据存储健康探测
pub struct DatastoreHealthProbe {
    name: String,
    endpoint: String,
    binding: ConfigBinding<ProbeOutcome>,
}

impl DatastoreHealthProbe {
    /// 创建端点的健康探测
    pub fn new(endpoint: impl Into<String>) -> Self {
        let endpoint = endpoint.into();
        Self {
            name: format!("{}.health", endpoint),
            endpoint,
            binding: ConfigBinding::new(),
        }
    }

    /// 探测的端点
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// 当前阶段
    pub async fn phase(&self) -> BindingPhase {
        self.binding.phase().await
    }

    /// 最近一次成功的探测
    pub async fn last_outcome(&self) -> Option<Arc<ProbeOutcome>> {
        self.binding.resource().await
    }

    async fn run_probe(&self, config: Arc<Configuration>) -> Result<ProbeOutcome, ReadinessError> {
        let statement = config
            .endpoint_setting(&self.endpoint, PROBE_QUERY)
            .unwrap_or(DEFAULT_PROBE_QUERY)
            .to_string();
        let extension = config
            .endpoint_setting(&self.endpoint, REQUIRED_EXTENSION)
            .map(str::to_string);
        let limit = match config.endpoint_setting(&self.endpoint, PROBE_TIMEOUT) {
            Some(value) => Duration::from_secs(parse_setting(PROBE_TIMEOUT, value)?),
            None => DEFAULT_PROBE_TIMEOUT,
        };

        let start = Instant::now();
        let probe = async {
            let dao = config.init_dao(&self.endpoint).await?;

            if !dao.probe(&statement).await? {
                return Err(ReadinessError::ProbeFailed(format!(
                    "探测语句未返回结果: {}",
                    statement
                )));
            }

            if let Some(name) = &extension {
                if !dao.extension_installed(name).await? {
                    return Err(ReadinessError::ProbeFailed(format!(
                        "数据存储扩展未启用: {}",
                        name
                    )));
                }
            }

            Ok(dao)
        };

        let dao = timeout(limit, probe)
            .await
            .map_err(|_| ReadinessError::Datastore(DatastoreError::Timeout))??;

        let response_time = start.elapsed();
        debug!(
            component = %self.name,
            response_time_ms = response_time.as_millis() as u64,
            "健康探测通过"
        );

        Ok(ProbeOutcome {
            dao,
            statement,
            extension,
            response_time,
            checked_at: Utc::now(),
        })
    }
}

#[async_trait]
impl Configurable for DatastoreHealthProbe {
    fn name(&self) -> &str {
        &self.name
    }

    async fn set_configuration(&self, config: Arc<Configuration>) -> Result<(), DeliveryError> {
        self.binding.bind(config).await;
        Ok(())
    }

    async fn is_ready(&self) -> bool {
        match self.binding.ensure(|config| self.run_probe(config)).await {
            Ok(_) => true,
            Err(e) => {
                warn!(component = %self.name, error = %e, "健康探测未就绪");
                false
            }
        }
    }

    async fn invalidate(&self) {
        self.binding.clear().await;
        info!(component = %self.name, "健康探测已失效");
    }

    async fn save_state(&self) -> SavedState {
        self.binding.save().await
    }

    async fn restore_state(&self, state: SavedState) {
        self.binding.restore(state).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EndpointSection, DB_URL};
    use crate::dao::{MemoryConnector, MemoryDatastore};

    fn config_with(datastore: Arc<MemoryDatastore>, section: EndpointSection) -> Arc<Configuration> {
        let connector = MemoryConnector::new().with_datastore("vo", datastore);
        Arc::new(
            Configuration::builder(Arc::new(connector))
                .version(1)
                .setting(DB_URL, "memory://vo")
                .endpoint(section)
                .build(),
        )
    }

    #[tokio::test]
    async fn test_probe_becomes_ready() {
        let probe = DatastoreHealthProbe::new("tap");
        probe
            .set_configuration(config_with(
                Arc::new(MemoryDatastore::new()),
                EndpointSection::new("tap"),
            ))
            .await
            .unwrap();

        assert_eq!(probe.phase().await, BindingPhase::ConfiguredUnverified);
        assert!(probe.is_ready().await);
        assert_eq!(probe.phase().await, BindingPhase::Ready);

        let outcome = probe.last_outcome().await.unwrap();
        assert_eq!(outcome.statement, "SELECT 1");
        assert_eq!(outcome.dao.config_version(), 1);
    }

    #[tokio::test]
    async fn test_probe_requires_extension() {
        let datastore = Arc::new(MemoryDatastore::new());
        let section = EndpointSection::new("scs").with_setting(REQUIRED_EXTENSION, "pg_sphere");
        let probe = DatastoreHealthProbe::new("scs");
        probe
            .set_configuration(config_with(datastore.clone(), section))
            .await
            .unwrap();

        assert!(!probe.is_ready().await);

        datastore.install_extension("pg_sphere");
        assert!(probe.is_ready().await);
        assert_eq!(
            probe.last_outcome().await.unwrap().extension.as_deref(),
            Some("pg_sphere")
        );
    }

    #[tokio::test]
    async fn test_failing_probe_statement() {
        let datastore = Arc::new(MemoryDatastore::new());
        datastore.set_probe_result("SELECT 1 FROM ivoa.obscore", false);
        let section =
            EndpointSection::new("siap").with_setting(PROBE_QUERY, "SELECT 1 FROM ivoa.obscore");
        let probe = DatastoreHealthProbe::new("siap");
        probe
            .set_configuration(config_with(datastore, section))
            .await
            .unwrap();

        assert!(!probe.is_ready().await);
        assert_eq!(probe.phase().await, BindingPhase::ConfiguredUnverified);
    }

    #[tokio::test]
    async fn test_missing_endpoint_is_not_ready() {
        let probe = DatastoreHealthProbe::new("ssap");
        probe
            .set_configuration(config_with(
                Arc::new(MemoryDatastore::new()),
                EndpointSection::new("tap"),
            ))
            .await
            .unwrap();

        assert!(!probe.is_ready().await);
    }

    #[tokio::test]
    async fn test_invalid_timeout_setting() {
        let section = EndpointSection::new("tap").with_setting(PROBE_TIMEOUT, "soon");
        let probe = DatastoreHealthProbe::new("tap");
        probe
            .set_configuration(config_with(Arc::new(MemoryDatastore::new()), section))
            .await
            .unwrap();

        assert!(!probe.is_ready().await);
    }
}
