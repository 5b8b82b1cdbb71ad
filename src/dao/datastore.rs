//! 数据存储边界
//!
//! 定义元数据读取与探测查询接口，具体实现见 `memory` 与 `postgres` 模块

use crate::config::DatastoreSettings;
use crate::dao::metadata::{ColumnMeta, KeyColumnMeta, KeyMeta, SchemaMeta, TableMeta};
use crate::error::DatastoreError;
use async_trait::async_trait;
use std::sync::Arc;

/// 数据存储操作结果
pub type DatastoreResult<T> = std::result::Result<T, DatastoreError>;

/// 数据存储trait，定义元数据读取和原始查询接口
#[async_trait]
pub trait Datastore: Send + Sync {
    /// 读取全部模式
    async fn fetch_schemas(&self) -> DatastoreResult<Vec<SchemaMeta>>;

    /// 读取全部表
    async fn fetch_tables(&self) -> DatastoreResult<Vec<TableMeta>>;

    /// 读取全部列
    async fn fetch_columns(&self) -> DatastoreResult<Vec<ColumnMeta>>;

    /// 读取全部外键
    async fn fetch_keys(&self) -> DatastoreResult<Vec<KeyMeta>>;

    /// 读取全部外键列
    async fn fetch_key_columns(&self) -> DatastoreResult<Vec<KeyColumnMeta>>;

    /// 将项目代码转换为项目ID
    ///
    /// # 参数
    /// * `codes` - 项目代码列表
    /// * `schema` - 项目表所在模式
    async fn project_ids(&self, codes: &[String], schema: &str) -> DatastoreResult<Vec<i64>>;

    /// 执行探测语句
    ///
    /// # 返回
    /// * `DatastoreResult<bool>` - 语句返回了至少一行时为 `true`
    async fn probe(&self, statement: &str) -> DatastoreResult<bool>;

    /// 检查数据存储扩展是否已安装
    async fn extension_installed(&self, name: &str) -> DatastoreResult<bool>;
}

/// 数据存储连接器，根据配置建立连接
#[async_trait]
pub trait DatastoreConnector: Send + Sync {
    /// 按设置建立数据存储连接
    async fn connect(&self, settings: &DatastoreSettings) -> DatastoreResult<Arc<dyn Datastore>>;
}
