//! 依赖配置的服务组件
//!
//! 每个组件实现 [`crate::registry::Configurable`]，从生效配置派生并独占自己的资源

pub mod examples;
pub mod health_probe;
pub mod metadata_repository;
pub mod protocol;

// 重新导出主要类型
pub use examples::{ExampleQueryProvider, ExampleSet};
pub use health_probe::{DatastoreHealthProbe, ProbeOutcome};
pub use metadata_repository::MetadataRepository;
pub use protocol::{ProtocolBackend, ProtocolService};
