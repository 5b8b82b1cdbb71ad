//! 运行状态汇总模块
//!
//! 汇总所有已注册组件的就绪状态，供健康接口和命令行输出使用。
//! 只调用组件的 `is_ready()`，不直接访问组件的派生资源。

use crate::registry::{poll_readiness, ConfigurationRegistry};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 单个组件的就绪状态
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentReadiness {
    /// 组件名称
    pub name: String,
    /// 是否就绪
    pub ready: bool,
}

/// 整体健康报告
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    /// 当前生效的配置版本
    pub active_version: Option<u64>,
    /// 配置加载时间
    pub loaded_at: Option<DateTime<Utc>>,
    /// 最后一次配置切换时间
    pub last_switch: Option<DateTime<Utc>>,
    /// 组件总数
    pub total_components: usize,
    /// 就绪组件数
    pub ready_components: usize,
    /// 组件详细状态
    pub components: Vec<ComponentReadiness>,
    /// 生成时间
    pub checked_at: DateTime<Utc>,
}

impl HealthReport {
    /// 所有组件都就绪且已有生效配置
    pub fn is_healthy(&self) -> bool {
        self.active_version.is_some() && self.ready_components == self.total_components
    }

    /// 未就绪的组件名称
    pub fn not_ready(&self) -> impl Iterator<Item = &str> {
        self.components
            .iter()
            .filter(|c| !c.ready)
            .map(|c| c.name.as_str())
    }

    /// 根据就绪列表构建报告
    pub fn from_components(
        components: Vec<ComponentReadiness>,
        active_version: Option<u64>,
        loaded_at: Option<DateTime<Utc>>,
        last_switch: Option<DateTime<Utc>>,
    ) -> Self {
        let ready_components = components.iter().filter(|c| c.ready).count();
        Self {
            active_version,
            loaded_at,
            last_switch,
            total_components: components.len(),
            ready_components,
            components,
            checked_at: Utc::now(),
        }
    }
}

/// 收集注册中心内所有组件的就绪状态
///
/// 组件按名称排序，便于输出比较。
pub async fn readiness_report(registry: &ConfigurationRegistry) -> HealthReport {
    let components = registry.components().await;
    let mut readiness = poll_readiness(&components).await;
    readiness.sort_by(|a, b| a.name.cmp(&b.name));

    let active = registry.active();
    HealthReport::from_components(
        readiness,
        active.as_ref().map(|c| c.version()),
        active.as_ref().map(|c| c.loaded_at()),
        registry.last_switch().await,
    )
}
