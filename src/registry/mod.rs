//! 配置注册中心模块
//!
//! 定义可配置组件契约，并负责在配置切换时向所有组件下发新配置

pub mod configurable;
#[allow(clippy::module_inception)]
pub mod registry;

// 重新导出主要类型
pub use configurable::{BindingPhase, ConfigBinding, Configurable, SavedState};
pub use registry::{
    poll_readiness, ConfigurationRegistry, DeliveryFailure, Registration, SwitchMode,
    SwitchReport,
};
