//! 数据访问模块
//!
//! 提供数据存储边界、配置级元数据缓存以及内存和 PostgreSQL 两种实现

pub mod cache;
pub mod connector;
pub mod datastore;
pub mod memory;
pub mod metadata;
pub mod postgres;

// 重新导出主要类型
pub use cache::{ConfigurationDao, MetadataSet};
pub use connector::SchemeConnector;
pub use datastore::{Datastore, DatastoreConnector, DatastoreResult};
pub use memory::{MemoryConnector, MemoryDatastore};
pub use metadata::{ColumnMeta, KeyColumnMeta, KeyMeta, SchemaMeta, TableMeta};
pub use postgres::{PgConnector, PgDatastore};
