//! 配置管理模块
//!
//! 提供配置文件解析、验证、不可变配置快照和热重载功能

pub mod configuration;
pub mod loader;
pub mod types;
pub mod watcher;

// 重新导出主要类型
pub use configuration::{
    Configuration, ConfigurationBuilder, DatastoreSettings, EndpointSection, DB_ACQUIRE_TIMEOUT,
    DB_MAX_CONNECTIONS, DB_URL,
};
pub use loader::{get_default_config_path, ConfigLoader, TomlConfigLoader};
pub use types::{validate_document, AdminConfig, ConfigDocument, ExampleQuery, Protocol};
pub use watcher::{ConfigChangeEvent, ConfigWatcher};
