//! 元数据仓库组件
//!
//! 持有端点专属的 [`ConfigurationDao`]，供请求处理代码读取缓存的模式元数据。

use crate::config::Configuration;
use crate::dao::ConfigurationDao;
use crate::error::{DeliveryError, ReadinessError};
use crate::registry::{BindingPhase, ConfigBinding, Configurable, SavedState};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// 元数据仓库
pub struct MetadataRepository {
    name: String,
    endpoint: String,
    binding: ConfigBinding<ConfigurationDao>,
}

impl MetadataRepository {
    pub fn new(endpoint: impl Into<String>) -> Self {
        let endpoint = endpoint.into();
        Self {
            name: format!("{}.metadata", endpoint),
            endpoint,
            binding: ConfigBinding::new(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub async fn phase(&self) -> BindingPhase {
        self.binding.phase().await
    }

    /// 获取 DAO，未就绪时尝试构建
    pub async fn dao(&self) -> Option<Arc<ConfigurationDao>> {
        match self.binding.ensure(|config| self.open(config)).await {
            Ok(dao) => Some(dao),
            Err(e) => {
                debug!(component = %self.name, error = %e, "元数据仓库不可用");
                None
            }
        }
    }

    /// 清空已缓存的元数据，不重建连接
    ///
    /// # 返回
    /// * `bool` - 是否存在可刷新的 DAO
    pub async fn refresh(&self) -> bool {
        match self.binding.resource().await {
            Some(dao) => {
                dao.refresh_object_cache().await;
                info!(component = %self.name, "元数据缓存已刷新");
                true
            }
            None => false,
        }
    }

    async fn open(&self, config: Arc<Configuration>) -> Result<ConfigurationDao, ReadinessError> {
        let dao = config.init_dao(&self.endpoint).await?;
        let schemas = dao.find_all_schemas().await?;
        debug!(component = %self.name, schemas = schemas.len(), "模式元数据已加载");
        Ok(dao)
    }
}

#[async_trait]
impl Configurable for MetadataRepository {
    fn name(&self) -> &str {
        &self.name
    }

    async fn set_configuration(&self, config: Arc<Configuration>) -> Result<(), DeliveryError> {
        self.binding.bind(config).await;
        Ok(())
    }

    async fn is_ready(&self) -> bool {
        match self.binding.ensure(|config| self.open(config)).await {
            Ok(_) => true,
            Err(e) => {
                warn!(component = %self.name, error = %e, "元数据仓库未就绪");
                false
            }
        }
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
