//! 错误处理模块
//!
//! 定义配置协调子系统的统一错误类型

use thiserror::Error;

/// VO Reconfig 的主要错误类型
#[derive(Error, Debug)]
pub enum VoReconfigError {
    /// 配置相关错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),

    /// 数据存储相关错误
    #[error("数据存储错误: {0}")]
    Datastore(#[from] DatastoreError),

    /// IO错误
    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),

    /// JSON序列化/反序列化错误
    #[error("JSON错误: {0}")]
    Json(#[from] serde_json::Error),

    /// 其他错误
    #[error("其他错误: {0}")]
    Other(#[from] anyhow::Error),
}

/// 配置错误类型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// 配置文件解析错误
    #[error("配置文件解析失败: {0}")]
    ParseError(String),

    /// 配置验证错误
    #[error("配置验证失败: {0}")]
    ValidationError(String),

    /// 配置文件不存在
    #[error("配置文件不存在: {path}")]
    FileNotFound { path: String },

    /// 环境变量替换错误
    #[error("环境变量替换失败: {var}")]
    EnvVarError { var: String },

    /// 缺少端点配置段
    #[error("缺少端点配置段: {endpoint}")]
    MissingEndpoint { endpoint: String },

    /// 缺少必需的配置项
    #[error("端点 {endpoint} 缺少配置项: {key}")]
    MissingSetting { endpoint: String, key: String },

    /// 配置项取值无效
    #[error("配置项 {key} 取值无效: {value}")]
    InvalidSetting { key: String, value: String },
}

/// 数据存储错误类型
#[derive(Error, Debug)]
pub enum DatastoreError {
    /// 不支持的连接地址
    #[error("不支持的数据存储地址: {url}")]
    UnsupportedUrl { url: String },

    /// 连接失败
    #[error("连接数据存储失败: {0}")]
    Connect(String),

    /// 查询失败
    #[error("查询失败: {0}")]
    Query(String),

    /// 探测超时
    #[error("数据存储探测超时")]
    Timeout,

    /// SQLx 错误
    #[error("SQL错误: {0}")]
    Sql(#[from] sqlx::Error),
}

/// 组件就绪检测错误
///
/// 只在组件内部流转，`is_ready()` 将其折叠为 `false`。
#[derive(Error, Debug)]
pub enum ReadinessError {
    /// 组件尚未收到配置
    #[error("组件尚未配置")]
    Unconfigured,

    /// 配置结构不完整
    #[error("配置不完整: {0}")]
    Incomplete(#[from] ConfigError),

    /// 数据存储不可用
    #[error("数据存储不可用: {0}")]
    Datastore(#[from] DatastoreError),

    /// 探测查询未通过
    #[error("探测失败: {0}")]
    ProbeFailed(String),

    /// 构建资源期间配置已被替换
    #[error("构建资源期间配置已变更")]
    Superseded,
}

/// 配置下发错误
#[derive(Error, Debug, Clone)]
pub enum DeliveryError {
    /// 组件拒绝配置
    #[error("组件拒绝配置: {0}")]
    Rejected(String),

    /// 组件在处理配置时发生 panic
    #[error("组件处理配置时崩溃: {0}")]
    Panicked(String),
}

/// 结果类型别名
pub type Result<T> = std::result::Result<T, VoReconfigError>;
