//! 配置数据结构定义
//!
//! 定义配置文件的结构体和验证逻辑

use crate::config::configuration::{parse_setting, DB_ACQUIRE_TIMEOUT, DB_MAX_CONNECTIONS};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

/// 配置文件结构，包含全局配置项和端点配置段
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ConfigDocument {
    /// 配置版本（仅作记录）
    pub version: Option<u64>,
    /// 全局配置项
    #[serde(default)]
    pub settings: HashMap<String, String>,
    /// 端点配置段
    #[serde(default)]
    pub endpoints: BTreeMap<String, EndpointDocument>,
    /// 管理端配置
    #[serde(default)]
    pub admin: AdminConfig,
}

/// 端点配置段结构
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EndpointDocument {
    /// 端点协议
    pub protocol: Option<Protocol>,
    /// 端点级配置项
    #[serde(default)]
    pub settings: HashMap<String, String>,
    /// 示例查询
    #[serde(default)]
    pub examples: Vec<ExampleQuery>,
}

/// 示例查询
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExampleQuery {
    /// 示例名称
    pub name: String,
    /// 查询语句
    pub query: String,
    /// 描述
    pub description: Option<String>,
}

/// 数据访问协议
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// 表访问协议
    Tap,
    /// 锥形检索
    Scs,
    /// 简单图像访问
    Siap,
    /// 简单光谱访问
    Ssap,
}

impl Protocol {
    /// 协议默认的主表
    pub fn default_table(&self) -> &'static str {
        match self {
            Protocol::Tap => "tap_schema.tables",
            Protocol::Scs | Protocol::Siap | Protocol::Ssap => "ivoa.obscore",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Tap => write!(f, "tap"),
            Protocol::Scs => write!(f, "scs"),
            Protocol::Siap => write!(f, "siap"),
            Protocol::Ssap => write!(f, "ssap"),
        }
    }
}

/// 管理端配置结构
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AdminConfig {
    /// 是否启用管理端 HTTP 服务
    #[serde(default = "default_admin_enabled")]
    pub enabled: bool,
    /// 绑定地址
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// 监听端口
    #[serde(default = "default_admin_port")]
    pub port: u16,
    /// 是否监控配置文件变更
    #[serde(default = "default_watch_config")]
    pub watch_config: bool,
    /// 文件变更防抖动（毫秒）
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: default_admin_enabled(),
            bind_address: default_bind_address(),
            port: default_admin_port(),
            watch_config: default_watch_config(),
            debounce_ms: default_debounce_ms(),
        }
    }
}

// 默认值函数
fn default_admin_enabled() -> bool {
    true
}
fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}
fn default_admin_port() -> u16 {
    8090
}
fn default_watch_config() -> bool {
    true
}
fn default_debounce_ms() -> u64 {
    500
}

/// 配置验证函数
///
/// 只检查结构问题；缺少 `db.url` 等运行期条件由组件的就绪检测报告。
///
/// # 参数
/// * `document` - 要验证的配置
///
/// # 返回
/// * `Result<(), String>` - 验证结果，错误时返回错误信息
pub fn validate_document(document: &ConfigDocument) -> Result<(), String> {
    validate_numeric_settings("settings", &document.settings)?;

    for (name, endpoint) in &document.endpoints {
        if name.trim().is_empty() {
            return Err("端点名称不能为空".to_string());
        }

        validate_numeric_settings(name, &endpoint.settings)?;

        let mut seen = HashSet::new();
        for example in &endpoint.examples {
            if example.name.trim().is_empty() {
                return Err(format!("端点 {} 的示例名称不能为空", name));
            }
            if example.query.trim().is_empty() {
                return Err(format!("端点 {} 的示例 {} 查询语句为空", name, example.name));
            }
            if !seen.insert(example.name.as_str()) {
                return Err(format!("端点 {} 的示例名称重复: {}", name, example.name));
            }
        }
    }

    if document.admin.enabled && document.admin.port == 0 {
        return Err("管理端端口不能为0".to_string());
    }

    Ok(())
}

fn validate_numeric_settings(scope: &str, settings: &HashMap<String, String>) -> Result<(), String> {
    if let Some(value) = settings.get(DB_MAX_CONNECTIONS) {
        let max: u32 = parse_setting(DB_MAX_CONNECTIONS, value).map_err(|e| format!("{}: {}", scope, e))?;
        if max == 0 {
            return Err(format!("{}: 连接池大小不能为0", scope));
        }
    }
    if let Some(value) = settings.get(DB_ACQUIRE_TIMEOUT) {
        parse_setting::<u64>(DB_ACQUIRE_TIMEOUT, value).map_err(|e| format!("{}: {}", scope, e))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_document() -> ConfigDocument {
        let mut endpoint = EndpointDocument {
            protocol: Some(Protocol::Tap),
            ..Default::default()
        };
        endpoint.examples.push(ExampleQuery {
            name: "obscore".to_string(),
            query: "SELECT TOP 10 * FROM ivoa.obscore".to_string(),
            description: None,
        });

        let mut document = ConfigDocument::default();
        document
            .settings
            .insert("db.url".to_string(), "memory://vo".to_string());
        document.endpoints.insert("tap".to_string(), endpoint);
        document
    }

    #[test]
    fn test_document_serialization() {
        let document = create_test_document();

        let serialized = toml::to_string(&document).expect("序列化失败");
        let deserialized: ConfigDocument = toml::from_str(&serialized).expect("反序列化失败");

        assert_eq!(document, deserialized);
    }

    #[test]
    fn test_document_validation() {
        assert!(validate_document(&create_test_document()).is_ok());
    }

    #[test]
    fn test_missing_db_url_is_not_a_structural_error() {
        let mut document = create_test_document();
        document.settings.clear();
        assert!(validate_document(&document).is_ok());
    }

    #[test]
    fn test_duplicate_example_names_rejected() {
        let mut document = create_test_document();
        let endpoint = document.endpoints.get_mut("tap").unwrap();
        let duplicate = endpoint.examples[0].clone();
        endpoint.examples.push(duplicate);

        let result = validate_document(&document);
        assert!(result.unwrap_err().contains("示例名称重复"));
    }

    #[test]
    fn test_invalid_pool_size_rejected() {
        let mut document = create_test_document();
        document
            .settings
            .insert("db.max_connections".to_string(), "0".to_string());

        let result = validate_document(&document);
        assert!(result.unwrap_err().contains("连接池大小不能为0"));
    }

    #[test]
    fn test_admin_defaults() {
        let admin = AdminConfig::default();
        assert!(admin.enabled);
        assert_eq!(admin.port, 8090);
        assert_eq!(admin.bind_address, "127.0.0.1");
        assert!(admin.watch_config);
    }

    #[test]
    fn test_protocol_parses_lowercase() {
        let endpoint: EndpointDocument = toml::from_str("protocol = \"siap\"").unwrap();
        assert_eq!(endpoint.protocol, Some(Protocol::Siap));
        assert_eq!(Protocol::Siap.to_string(), "siap");
    }
}
