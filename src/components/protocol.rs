//! 协议服务组件
//!
//! 每个协议端点在就绪前确认其主表存在于数据存储的元数据中。
//! 主表由端点的 `table` 配置项指定，未指定时使用协议默认值。

use crate::config::{Configuration, Protocol};
use crate::dao::{ConfigurationDao, TableMeta};
use crate::error::{ConfigError, DeliveryError, ReadinessError};
use crate::registry::{ConfigBinding, Configurable, SavedState};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

/// 主表配置项
pub const TABLE_SETTING: &str = "table";

/// 协议服务就绪后的后端
#[derive(Debug)]
pub struct ProtocolBackend {
    /// 端点专属 DAO
    pub dao: ConfigurationDao,
    /// 主表元数据
    pub table: TableMeta,
}

/// 协议服务
pub struct ProtocolService {
    name: String,
    endpoint: String,
    protocol: Protocol,
    binding: ConfigBinding<ProtocolBackend>,
}

impl ProtocolService {
    /// 组件名为 `{端点}.{协议}`
    pub fn new(endpoint: impl Into<String>, protocol: Protocol) -> Self {
        let endpoint = endpoint.into();
        Self {
            name: format!("{}.{}", endpoint, protocol),
            endpoint,
            protocol,
            binding: ConfigBinding::new(),
        }
    }

    /// 所属端点
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// 构建时声明的协议，之后不再改变
    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    /// 就绪后的后端
    pub async fn backend(&self) -> Option<Arc<ProtocolBackend>> {
        self.binding.ensure(|config| self.connect(config)).await.ok()
    }

    async fn connect(&self, config: Arc<Configuration>) -> Result<ProtocolBackend, ReadinessError> {
        let section = config.require_endpoint(&self.endpoint)?;
        if let Some(protocol) = section.protocol {
            if protocol != self.protocol {
                return Err(ConfigError::InvalidSetting {
                    key: format!("endpoints.{}.protocol", self.endpoint),
                    value: protocol.to_string(),
                }
                .into());
            }
        }

        let table_name = config
            .endpoint_setting(&self.endpoint, TABLE_SETTING)
            .unwrap_or_else(|| self.protocol.default_table())
            .to_string();

        let dao = config.init_dao(&self.endpoint).await?;
        let table = dao
            .find_one_table(&table_name)
            .await?
            .ok_or_else(|| ReadinessError::ProbeFailed(format!("主表不存在: {}", table_name)))?;

        debug!(component = %self.name, table = %table.table_name, "协议服务主表已确认");
        Ok(ProtocolBackend { dao, table })
    }
}

#[async_trait]
impl Configurable for ProtocolService {
    fn name(&self) -> &str {
        &self.name
    }

    async fn set_configuration(&self, config: Arc<Configuration>) -> Result<(), DeliveryError> {
        self.binding.bind(config).await;
        Ok(())
    }

    async fn is_ready(&self) -> bool {
        match self.binding.ensure(|config| self.connect(config)).await {
            Ok(_) => true,
            Err(e) => {
                warn!(component = %self.name, error = %e, "协议服务未就绪");
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
