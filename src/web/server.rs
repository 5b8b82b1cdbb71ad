//! 管理端 HTTP 服务器
//!
//! 基于 axum 提供路由，优雅关闭由调用方传入的信号驱动

use super::{handlers, AdminState};
use crate::config::AdminConfig;
use axum::{
    routing::{get, post},
    Router,
};
use std::future::Future;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

/// 管理端服务器
pub struct AdminServer {
    config: AdminConfig,
    state: AdminState,
}

impl AdminServer {
    pub fn new(config: AdminConfig, state: AdminState) -> Self {
        Self { config, state }
    }

    /// 构建路由
    pub fn router(state: AdminState) -> Router {
        Router::new()
            .route("/health", get(handlers::health))
            .route("/api/v1/components", get(handlers::components))
            .route("/admin/reload", post(handlers::reload))
            .route("/admin/validate", post(handlers::validate))
            .route("/admin/cache/refresh", post(handlers::refresh_cache))
            .layer(
                ServiceBuilder::new()
                    .layer(TraceLayer::new_for_http())
                    .layer(CorsLayer::permissive()),
            )
            .with_state(state)
    }

    /// 启动服务器，直到 `shutdown` 完成
    pub async fn run<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if !self.config.enabled {
            info!("管理端服务器已禁用");
            return Ok(());
        }

        let listener = TcpListener::bind((self.config.bind_address.as_str(), self.config.port))
            .await
            .map_err(|e| {
                anyhow::anyhow!(
                    "绑定管理端地址失败 {}:{}: {}",
                    self.config.bind_address,
                    self.config.port,
                    e
                )
            })?;

        info!(
            "管理端服务器监听 http://{}，健康检查 /health",
            listener.local_addr()?
        );

        axum::serve(listener, Self::router(self.state))
            .with_graceful_shutdown(shutdown)
            .await?;

        info!("管理端服务器已停止");
        Ok(())
    }
}
