//! 管理端 HTTP 接口模块
//!
//! 提供健康状态查询、配置重载、试运行和元数据缓存刷新接口

use crate::bootstrap::{ConfigSource, ServiceWiring};
use crate::logging::LoggingSystem;
use serde::Serialize;
use std::sync::Arc;

pub mod handlers;
pub mod server;

pub use server::AdminServer;

/// 管理端共享状态
#[derive(Clone)]
pub struct AdminState {
    /// 组件装配
    pub wiring: Arc<ServiceWiring>,
    /// 配置来源
    pub source: ConfigSource,
    /// 日志系统
    pub logging: Arc<LoggingSystem>,
    /// 启动时间
    pub start_time: chrono::DateTime<chrono::Utc>,
}

impl AdminState {
    pub fn new(wiring: Arc<ServiceWiring>, source: ConfigSource, logging: Arc<LoggingSystem>) -> Self {
        Self {
            wiring,
            source,
            logging,
            start_time: chrono::Utc::now(),
        }
    }
}

/// API响应包装器
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    /// 是否成功
    pub success: bool,
    /// 响应数据
    pub data: Option<T>,
    /// 错误信息
    pub error: Option<String>,
    /// 时间戳
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl<T> ApiResponse<T> {
    /// 创建成功响应
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            timestamp: chrono::Utc::now(),
        }
    }

    /// 创建错误响应
    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
            timestamp: chrono::Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_response_constructors() {
        let ok = ApiResponse::success(3);
        assert!(ok.success);
        assert_eq!(ok.data, Some(3));

        let failed: ApiResponse<()> = ApiResponse::error("bad".to_string());
        assert!(!failed.success);
        assert_eq!(failed.error.as_deref(), Some("bad"));
    }
}
