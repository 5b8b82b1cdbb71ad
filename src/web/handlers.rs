//! 管理端路由处理函数

use super::{AdminState, ApiResponse};
use crate::registry::SwitchMode;
use crate::status::{readiness_report, HealthReport};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::Serialize;
use tracing::{error, info};

/// 组件列表响应
#[derive(Debug, Serialize)]
struct ComponentsResponse {
    report: HealthReport,
    endpoints: Vec<String>,
    uptime_seconds: i64,
}

/// 缓存刷新响应
#[derive(Debug, Serialize)]
struct RefreshResponse {
    refreshed: usize,
}

/// 健康检查：全部就绪返回 200，否则 503
pub async fn health(State(state): State<AdminState>) -> impl IntoResponse {
    let report = readiness_report(state.wiring.registry()).await;
    let status = if report.is_healthy() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(report))
}

/// 组件就绪详情
pub async fn components(State(state): State<AdminState>) -> impl IntoResponse {
    let report = readiness_report(state.wiring.registry()).await;
    let response = ComponentsResponse {
        report,
        endpoints: state.wiring.endpoint_names().await,
        uptime_seconds: (chrono::Utc::now() - state.start_time).num_seconds(),
    };
    Json(ApiResponse::success(response))
}

/// 重新加载配置文件并正式切换
pub async fn reload(State(state): State<AdminState>) -> impl IntoResponse {
    switch_from_file(state, SwitchMode::Live, "admin-reload").await
}

/// 重新加载配置文件并试运行
pub async fn validate(State(state): State<AdminState>) -> impl IntoResponse {
    switch_from_file(state, SwitchMode::ValidateOnly, "admin-validate").await
}

/// 刷新所有元数据缓存
pub async fn refresh_cache(State(state): State<AdminState>) -> impl IntoResponse {
    let refreshed = state.wiring.refresh_metadata().await;
    info!(refreshed, "管理端触发元数据缓存刷新");
    Json(ApiResponse::success(RefreshResponse { refreshed }))
}

async fn switch_from_file(
    state: AdminState,
    mode: SwitchMode,
    trigger: &str,
) -> axum::response::Response {
    match state.wiring.reload(&state.source, mode).await {
        Ok(report) => {
            state.logging.switch_log(trigger, &report);
            Json(ApiResponse::success(report)).into_response()
        }
        Err(e) => {
            error!(trigger, error = %e, "配置加载失败，生效配置保持不变");
            (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(ApiResponse::<()>::error(e.to_string())),
            )
                .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bootstrap::{ConfigSource, ServiceWiring};
    use crate::config::TomlConfigLoader;
    use crate::dao::{MemoryConnector, MemoryDatastore, SchemaMeta};
    use crate::logging::{LogConfig, LoggingSystem};
    use crate::registry::ConfigurationRegistry;
    use std::fs;
    use std::sync::Arc;
    use tempfile::NamedTempFile;

    const CONFIG: &str = r#"
[settings]
"db.url" = "memory://vo"

[endpoints.tap]
"#;

    fn state(content: &str) -> (AdminState, NamedTempFile) {
        let datastore = Arc::new(MemoryDatastore::new());
        datastore.add_schema(SchemaMeta::new("ivoa"));
        let connector = Arc::new(MemoryConnector::new().with_datastore("vo", datastore));

        let file = NamedTempFile::new().unwrap();
        fs::write(file.path(), content).unwrap();

        let source = ConfigSource::new(TomlConfigLoader::new(false, connector), file.path());
        let wiring = Arc::new(ServiceWiring::new(Arc::new(ConfigurationRegistry::new())));
        let logging = Arc::new(LoggingSystem::new(LogConfig::default()));
        (AdminState::new(wiring, source, logging), file)
    }

    #[tokio::test]
    async fn test_health_unavailable_before_activation() {
        let (state, _file) = state(CONFIG);
        let response = health(State(state)).await.into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_reload_then_healthy() {
        let (state, _file) = state(CONFIG);

        let response = reload(State(state.clone())).await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(state.wiring.registry().active().is_some());

        let response = health(State(state)).await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_validate_does_not_activate() {
        let (state, _file) = state(CONFIG);

        let response = validate(State(state.clone())).await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(state.wiring.registry().active().is_none());
    }

    #[tokio::test]
    async fn test_reload_rejects_invalid_file() {
        let (state, _file) = state("[endpoints.tap\n");
        let response = reload(State(state.clone())).await.into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert!(state.wiring.registry().active().is_none());
    }

    #[tokio::test]
    async fn test_components_and_cache_refresh() {
        let (state, _file) = state(CONFIG);
        reload(State(state.clone())).await;

        let response = components(State(state.clone())).await.into_response();
        assert!(response.status().is_success());

        let response = refresh_cache(State(state)).await.into_response();
        assert!(response.status().is_success());
    }
}
