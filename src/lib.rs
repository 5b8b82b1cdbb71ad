//! vo-reconfig - 天文数据访问服务的在线配置协调
//!
//! 多协议数据访问服务（TAP、SCS、SIAP、SSAP 等）共享一份配置。
//! 本库负责在运行期间安全地切换这份配置：
//! - 配置注册中心：串行化切换，逐个下发新配置
//! - 可配置组件：按配置惰性构建派生资源，不就绪时自动重试
//! - 试运行：对候选配置做完整检测而不影响生效配置
//! - 配置级元数据缓存：每份配置一个独立的数据访问对象
//! - 配置热重载和管理端接口

pub mod bootstrap;
pub mod cli;
pub mod components;
pub mod config;
pub mod dao;
pub mod error;
pub mod logging;
pub mod registry;
pub mod status;
pub mod web;

// 重新导出主要类型
pub use config::Configuration;
pub use dao::ConfigurationDao;
pub use error::VoReconfigError;
pub use registry::{Configurable, ConfigurationRegistry, SwitchMode, SwitchReport};

/// 应用程序版本信息
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// 应用程序名称
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");

/// 应用程序描述
pub const APP_DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");
