//! 运行时配置快照
//!
//! `Configuration` 一经构建即不可变；需要可变视图的调用方通过
//! [`Configuration::to_builder`] 获得自己的副本。

use crate::config::types::{AdminConfig, ExampleQuery, Protocol};
use crate::dao::{ConfigurationDao, DatastoreConnector};
use crate::error::{ConfigError, ReadinessError};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// 数据存储地址配置键
pub const DB_URL: &str = "db.url";
/// 连接池大小配置键
pub const DB_MAX_CONNECTIONS: &str = "db.max_connections";
/// 获取连接超时配置键
pub const DB_ACQUIRE_TIMEOUT: &str = "db.acquire_timeout_seconds";

const DEFAULT_MAX_CONNECTIONS: u32 = 5;
const DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 10;

/// 端点配置段
#[derive(Debug, Clone, PartialEq)]
pub struct EndpointSection {
    /// 端点名称
    pub name: String,
    /// 端点协议
    pub protocol: Option<Protocol>,
    /// 端点级配置项
    pub settings: HashMap<String, String>,
    /// 示例查询集
    pub examples: Vec<ExampleQuery>,
}

impl EndpointSection {
    /// 创建空的端点配置段
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            protocol: None,
            settings: HashMap::new(),
            examples: Vec::new(),
        }
    }

    pub fn with_protocol(mut self, protocol: Protocol) -> Self {
        self.protocol = Some(protocol);
        self
    }

    pub fn with_setting(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.settings.insert(key.into(), value.into());
        self
    }

    pub fn with_example(mut self, example: ExampleQuery) -> Self {
        self.examples.push(example);
        self
    }
}

/// 数据存储连接设置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatastoreSettings {
    /// 连接地址
    pub url: String,
    /// 最大连接数
    pub max_connections: u32,
    /// 获取连接超时
    pub acquire_timeout: Duration,
}

impl DatastoreSettings {
    /// 使用默认池参数创建设置
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            acquire_timeout: Duration::from_secs(DEFAULT_ACQUIRE_TIMEOUT_SECS),
        }
    }
}

/// 配置快照
pub struct Configuration {
    version: u64,
    loaded_at: DateTime<Utc>,
    settings: HashMap<String, String>,
    endpoints: HashMap<String, EndpointSection>,
    admin: AdminConfig,
    connector: Arc<dyn DatastoreConnector>,
}

impl fmt::Debug for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Configuration")
            .field("version", &self.version)
            .field("loaded_at", &self.loaded_at)
            .field("settings", &self.settings.keys().collect::<Vec<_>>())
            .field("endpoints", &self.endpoints.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl Configuration {
    /// 创建配置构建器
    pub fn builder(connector: Arc<dyn DatastoreConnector>) -> ConfigurationBuilder {
        ConfigurationBuilder {
            version: 0,
            settings: HashMap::new(),
            endpoints: HashMap::new(),
            admin: AdminConfig::default(),
            connector,
        }
    }

    /// 配置版本号
    pub fn version(&self) -> u64 {
        self.version
    }

    /// 加载时间
    pub fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }

    /// 管理端配置
    pub fn admin(&self) -> &AdminConfig {
        &self.admin
    }

    /// 全局配置项
    pub fn setting(&self, key: &str) -> Option<&str> {
        self.settings.get(key).map(String::as_str)
    }

    /// 端点配置段
    pub fn endpoint(&self, name: &str) -> Option<&EndpointSection> {
        self.endpoints.get(name)
    }

    /// 所有端点名称
    pub fn endpoint_names(&self) -> impl Iterator<Item = &str> {
        self.endpoints.keys().map(String::as_str)
    }

    /// 获取必需的端点配置段
    pub fn require_endpoint(&self, name: &str) -> Result<&EndpointSection, ConfigError> {
        self.endpoint(name)
            .ok_or_else(|| ConfigError::MissingEndpoint {
                endpoint: name.to_string(),
            })
    }

    /// 端点级配置项，未设置时回退到全局配置
    pub fn endpoint_setting(&self, endpoint: &str, key: &str) -> Option<&str> {
        self.endpoint(endpoint)
            .and_then(|section| section.settings.get(key))
            .map(String::as_str)
            .or_else(|| self.setting(key))
    }

    /// 解析端点的数据存储设置
    pub fn datastore_settings(&self, endpoint: &str) -> Result<DatastoreSettings, ConfigError> {
        let url = self
            .endpoint_setting(endpoint, DB_URL)
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingSetting {
                endpoint: endpoint.to_string(),
                key: DB_URL.to_string(),
            })?;

        let mut settings = DatastoreSettings::new(url);
        if let Some(value) = self.endpoint_setting(endpoint, DB_MAX_CONNECTIONS) {
            settings.max_connections = parse_setting(DB_MAX_CONNECTIONS, value)?;
        }
        if let Some(value) = self.endpoint_setting(endpoint, DB_ACQUIRE_TIMEOUT) {
            settings.acquire_timeout = Duration::from_secs(parse_setting(DB_ACQUIRE_TIMEOUT, value)?);
        }
        Ok(settings)
    }

    /// 为端点构建绑定到本配置数据存储的 DAO
    ///
    /// 每次调用都会建立新的连接并返回独立的 DAO 实例，
    /// 缓存归调用方独占。
    pub async fn init_dao(&self, endpoint: &str) -> Result<ConfigurationDao, ReadinessError> {
        self.require_endpoint(endpoint)?;
        let settings = self.datastore_settings(endpoint)?;
        debug!(endpoint, version = self.version, "为端点建立数据存储连接");
        let datastore = self.connector.connect(&settings).await?;
        Ok(ConfigurationDao::new(datastore, self.version))
    }

    /// 复制为可变构建器
    pub fn to_builder(&self) -> ConfigurationBuilder {
        ConfigurationBuilder {
            version: self.version,
            settings: self.settings.clone(),
            endpoints: self.endpoints.clone(),
            admin: self.admin.clone(),
            connector: Arc::clone(&self.connector),
        }
    }
}

/// 解析数值型配置项
pub(crate) fn parse_setting<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidSetting {
            key: key.to_string(),
            value: value.to_string(),
        })
}

/// 配置构建器，激活前可变
pub struct ConfigurationBuilder {
    version: u64,
    settings: HashMap<String, String>,
    endpoints: HashMap<String, EndpointSection>,
    admin: AdminConfig,
    connector: Arc<dyn DatastoreConnector>,
}

impl ConfigurationBuilder {
    pub fn version(mut self, version: u64) -> Self {
        self.version = version;
        self
    }

    pub fn setting(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.settings.insert(key.into(), value.into());
        self
    }

    pub fn remove_setting(mut self, key: &str) -> Self {
        self.settings.remove(key);
        self
    }

    pub fn endpoint(mut self, section: EndpointSection) -> Self {
        self.endpoints.insert(section.name.clone(), section);
        self
    }

    pub fn remove_endpoint(mut self, name: &str) -> Self {
        self.endpoints.remove(name);
        self
    }

    pub fn admin(mut self, admin: AdminConfig) -> Self {
        self.admin = admin;
        self
    }

    /// 构建不可变配置快照
    pub fn build(self) -> Configuration {
        Configuration {
            version: self.version,
            loaded_at: Utc::now(),
            settings: self.settings,
            endpoints: self.endpoints,
            admin: self.admin,
            connector: self.connector,
        }
    }
}
