//! 配置加载器实现
//!
//! 提供TOML配置文件解析、环境变量替换和配置快照构建功能

use crate::config::configuration::{Configuration, EndpointSection};
use crate::config::types::{validate_document, ConfigDocument};
use crate::dao::DatastoreConnector;
use crate::error::{ConfigError, Result};
use async_trait::async_trait;
use regex::Regex;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// 配置加载器trait，定义配置加载接口
#[async_trait]
pub trait ConfigLoader: Send + Sync {
    /// 从文件加载配置
    ///
    /// # 参数
    /// * `path` - 配置文件路径
    ///
    /// # 返回
    /// * `Result<Configuration>` - 新构建的配置快照或错误
    async fn load_from_file<P: AsRef<Path> + Send>(&self, path: P) -> Result<Configuration>;

    /// 从字符串加载配置
    ///
    /// # 参数
    /// * `content` - 配置文件内容
    ///
    /// # 返回
    /// * `Result<Configuration>` - 新构建的配置快照或错误
    async fn load_from_string(&self, content: &str) -> Result<Configuration>;

    /// 验证配置文档
    fn validate(&self, document: &ConfigDocument) -> Result<()>;
}

/// TOML配置加载器实现
///
/// 每次加载都构建一个全新的 `Configuration`，并分配递增的版本号。
#[derive(Clone)]
pub struct TomlConfigLoader {
    /// 是否启用环境变量替换
    enable_env_substitution: bool,
    /// 配置快照使用的数据存储连接器
    connector: Arc<dyn DatastoreConnector>,
    /// 版本计数器
    next_version: Arc<AtomicU64>,
}

impl TomlConfigLoader {
    /// 创建新的TOML配置加载器
    ///
    /// # 参数
    /// * `enable_env_substitution` - 是否启用环境变量替换
    /// * `connector` - 数据存储连接器
    pub fn new(enable_env_substitution: bool, connector: Arc<dyn DatastoreConnector>) -> Self {
        Self {
            enable_env_substitution,
            connector,
            next_version: Arc::new(AtomicU64::new(1)),
        }
    }

    /// 替换字符串中的环境变量
    fn substitute_env_vars(&self, content: &str) -> Result<String> {
        if !self.enable_env_substitution {
            return Ok(content.to_string());
        }

        // 匹配 ${VAR_NAME} 格式的环境变量
        let env_var_regex = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}")
            .map_err(|e| ConfigError::ParseError(format!("正则表达式错误: {}", e)))?;

        let mut result = content.to_string();

        for captures in env_var_regex.captures_iter(content) {
            let full_match = &captures[0];
            let var_name = &captures[1];

            match std::env::var(var_name) {
                Ok(value) => {
                    result = result.replace(full_match, &value);
                }
                Err(_) => {
                    return Err(ConfigError::EnvVarError {
                        var: var_name.to_string(),
                    }
                    .into());
                }
            }
        }

        Ok(result)
    }

    /// 解析TOML内容
    pub fn parse_document(&self, content: &str) -> Result<ConfigDocument> {
        let processed_content = self.substitute_env_vars(content)?;

        let document: ConfigDocument = toml::from_str(&processed_content)
            .map_err(|e| ConfigError::ParseError(format!("TOML解析失败: {}", e)))?;

        Ok(document)
    }

    /// 由配置文档构建新的配置快照
    pub fn build(&self, document: ConfigDocument) -> Configuration {
        let version = self.next_version.fetch_add(1, Ordering::SeqCst);

        let mut builder = Configuration::builder(Arc::clone(&self.connector))
            .version(version)
            .admin(document.admin);

        for (key, value) in document.settings {
            builder = builder.setting(key, value);
        }

        for (name, endpoint) in document.endpoints {
            builder = builder.endpoint(EndpointSection {
                name,
                protocol: endpoint.protocol,
                settings: endpoint.settings,
                examples: endpoint.examples,
            });
        }

        builder.build()
    }
}

#[async_trait]
impl ConfigLoader for TomlConfigLoader {
    async fn load_from_file<P: AsRef<Path> + Send>(&self, path: P) -> Result<Configuration> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::FileNotFound {
                path: path.to_string_lossy().to_string(),
            }
            .into());
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ConfigError::ParseError(format!("读取文件失败: {}", e)))?;

        let document = self.parse_document(&content)?;
        self.validate(&document)?;
        let configuration = self.build(document);

        log::info!(
            "成功加载配置文件: {}，版本: {}",
            path.display(),
            configuration.version()
        );
        log::debug!("配置内容: {:?}", configuration);

        Ok(configuration)
    }

    async fn load_from_string(&self, content: &str) -> Result<Configuration> {
        let document = self.parse_document(content)?;
        self.validate(&document)?;

        log::debug!("成功解析配置字符串");

        Ok(self.build(document))
    }

    fn validate(&self, document: &ConfigDocument) -> Result<()> {
        validate_document(document).map_err(|e| ConfigError::ValidationError(e).into())
    }
}

/// 获取默认配置文件路径
pub fn get_default_config_path() -> std::path::PathBuf {
    if std::path::Path::new("vo-reconfig.toml").exists() {
        return std::path::PathBuf::from("vo-reconfig.toml");
    }

    dirs::config_dir()
        .map(|config_dir| config_dir.join("vo-reconfig").join("config.toml"))
        .unwrap_or_else(|| std::path::PathBuf::from("vo-reconfig.toml"))
}
