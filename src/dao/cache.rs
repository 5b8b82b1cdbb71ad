//! 配置级元数据缓存
//!
//! `ConfigurationDao` 只属于一个配置版本。各类元数据在首次访问时整体加载，
//! 之后一直复用，直到调用 [`ConfigurationDao::refresh_object_cache`]。
//! 没有过期或容量淘汰策略。

use crate::dao::datastore::{Datastore, DatastoreResult};
use crate::dao::metadata::{ColumnMeta, KeyColumnMeta, KeyMeta, SchemaMeta, TableMeta};
use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::ops::Deref;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// 按自然主键索引的元数据集合
#[derive(Debug)]
pub struct MetadataSet<K, T> {
    items: Vec<T>,
    index: HashMap<K, usize>,
}

impl<K: Eq + Hash, T> MetadataSet<K, T> {
    fn new(items: Vec<T>, key_of: impl Fn(&T) -> K) -> Self {
        let index = items
            .iter()
            .enumerate()
            .map(|(position, item)| (key_of(item), position))
            .collect();
        Self { items, index }
    }

    /// 按主键查找
    pub fn get(&self, key: &K) -> Option<&T> {
        self.index.get(key).map(|&position| &self.items[position])
    }
}

impl<K, T> Deref for MetadataSet<K, T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        &self.items
    }
}

/// 模式集合
pub type SchemaSet = MetadataSet<String, SchemaMeta>;
/// 表集合，以完整表名为键
pub type TableSet = MetadataSet<String, TableMeta>;
/// 列集合，以 (表名, 列名) 为键
pub type ColumnSet = MetadataSet<(String, String), ColumnMeta>;
/// 外键集合
pub type KeySet = MetadataSet<String, KeyMeta>;

type Slot<T> = RwLock<Option<Arc<T>>>;

/// 配置级数据访问对象
pub struct ConfigurationDao {
    datastore: Arc<dyn Datastore>,
    config_version: u64,
    schemas: Slot<SchemaSet>,
    tables: Slot<TableSet>,
    columns: Slot<ColumnSet>,
    keys: Slot<KeySet>,
    key_columns: Slot<Vec<KeyColumnMeta>>,
}

impl std::fmt::Debug for ConfigurationDao {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigurationDao")
            .field("config_version", &self.config_version)
            .finish_non_exhaustive()
    }
}

impl ConfigurationDao {
    /// 创建绑定到数据存储的 DAO
    pub fn new(datastore: Arc<dyn Datastore>, config_version: u64) -> Self {
        Self {
            datastore,
            config_version,
            schemas: RwLock::new(None),
            tables: RwLock::new(None),
            columns: RwLock::new(None),
            keys: RwLock::new(None),
            key_columns: RwLock::new(None),
        }
    }

    /// 构建本 DAO 的配置版本
    pub fn config_version(&self) -> u64 {
        self.config_version
    }

    /// 全部模式
    pub async fn find_all_schemas(&self) -> DatastoreResult<Arc<SchemaSet>> {
        load_once(&self.schemas, "schemas", || async {
            let items = self.datastore.fetch_schemas().await?;
            Ok(MetadataSet::new(items, |s: &SchemaMeta| s.schema_name.clone()))
        })
        .await
    }

    /// 全部表
    pub async fn find_all_tables(&self) -> DatastoreResult<Arc<TableSet>> {
        load_once(&self.tables, "tables", || async {
            let items = self.datastore.fetch_tables().await?;
            Ok(MetadataSet::new(items, |t: &TableMeta| t.table_name.clone()))
        })
        .await
    }

    /// 全部列
    pub async fn find_all_columns(&self) -> DatastoreResult<Arc<ColumnSet>> {
        load_once(&self.columns, "columns", || async {
            let items = self.datastore.fetch_columns().await?;
            Ok(MetadataSet::new(items, |c: &ColumnMeta| {
                (c.table_name.clone(), c.column_name.clone())
            }))
        })
        .await
    }

    /// 全部外键
    pub async fn find_all_keys(&self) -> DatastoreResult<Arc<KeySet>> {
        load_once(&self.keys, "keys", || async {
            let items = self.datastore.fetch_keys().await?;
            Ok(MetadataSet::new(items, |k: &KeyMeta| k.key_id.clone()))
        })
        .await
    }

    /// 全部外键列
    pub async fn find_all_key_columns(&self) -> DatastoreResult<Arc<Vec<KeyColumnMeta>>> {
        load_once(&self.key_columns, "key_columns", || {
            self.datastore.fetch_key_columns()
        })
        .await
    }

    /// 按名称查找模式，不存在时返回 `None`
    pub async fn find_one_schema(&self, name: &str) -> DatastoreResult<Option<SchemaMeta>> {
        let schemas = self.find_all_schemas().await?;
        Ok(schemas.get(&name.to_string()).cloned())
    }

    /// 按完整表名查找表，不存在时返回 `None`
    pub async fn find_one_table(&self, name: &str) -> DatastoreResult<Option<TableMeta>> {
        let tables = self.find_all_tables().await?;
        Ok(tables.get(&name.to_string()).cloned())
    }

    /// 按表名和列名查找列，不存在时返回 `None`
    pub async fn find_one_column(
        &self,
        table_name: &str,
        column_name: &str,
    ) -> DatastoreResult<Option<ColumnMeta>> {
        let columns = self.find_all_columns().await?;
        Ok(columns
            .get(&(table_name.to_string(), column_name.to_string()))
            .cloned())
    }

    /// 某个外键的全部列映射
    pub async fn find_key_columns(&self, key_id: &str) -> DatastoreResult<Vec<KeyColumnMeta>> {
        let key_columns = self.find_all_key_columns().await?;
        Ok(key_columns
            .iter()
            .filter(|kc| kc.key_id == key_id)
            .cloned()
            .collect())
    }

    /// 丢弃所有已缓存的元数据，下次访问时重新加载
    pub async fn refresh_object_cache(&self) {
        *self.schemas.write().await = None;
        *self.tables.write().await = None;
        *self.columns.write().await = None;
        *self.keys.write().await = None;
        *self.key_columns.write().await = None;
        info!(version = self.config_version, "元数据缓存已清空");
    }

    /// 项目代码转换为ID，不缓存
    pub async fn convert_project_codes_to_ids(
        &self,
        codes: &[String],
        schema: &str,
    ) -> DatastoreResult<Vec<i64>> {
        self.datastore.project_ids(codes, schema).await
    }

    /// 执行原始探测语句
    pub async fn probe(&self, statement: &str) -> DatastoreResult<bool> {
        self.datastore.probe(statement).await
    }

    /// 数据存储是否已启用指定扩展
    pub async fn extension_installed(&self, name: &str) -> DatastoreResult<bool> {
        self.datastore.extension_installed(name).await
    }
}

/// 首次访问时加载集合；写锁贯穿整个加载过程，保证每个集合只加载一次
async fn load_once<T, F, Fut>(slot: &Slot<T>, what: &str, load: F) -> DatastoreResult<Arc<T>>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = DatastoreResult<T>>,
{
    if let Some(cached) = slot.read().await.as_ref() {
        return Ok(Arc::clone(cached));
    }

    let mut guard = slot.write().await;
    if let Some(cached) = guard.as_ref() {
        return Ok(Arc::clone(cached));
    }

    debug!(collection = what, "从数据存储加载元数据");
    let loaded = Arc::new(load().await?);
    *guard = Some(Arc::clone(&loaded));
    Ok(loaded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::memory::MemoryDatastore;
    use crate::dao::metadata::KeyColumnMeta;

    fn seeded_datastore() -> Arc<MemoryDatastore> {
        let datastore = Arc::new(MemoryDatastore::new());
        datastore.add_schema(SchemaMeta::new("ivoa"));
        datastore.add_table(TableMeta::new("ivoa", "ivoa.obscore"));
        datastore.add_column(ColumnMeta::new("ivoa.obscore", "s_ra", "double"));
        datastore.add_key(KeyMeta {
            key_id: "k1".to_string(),
            from_table: "ivoa.obscore".to_string(),
            target_table: "ivoa.collections".to_string(),
            description: None,
            utype: None,
        });
        datastore.add_key_column(KeyColumnMeta {
            key_id: "k1".to_string(),
            from_column: "obs_collection".to_string(),
            target_column: "name".to_string(),
        });
        datastore
    }

    #[tokio::test]
    async fn test_find_all_loads_once() {
        let datastore = seeded_datastore();
        let dao = ConfigurationDao::new(datastore.clone(), 1);

        let first = dao.find_all_tables().await.unwrap();
        let second = dao.find_all_tables().await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(datastore.fetch_count("tables"), 1);
    }

    #[tokio::test]
    async fn test_point_lookups() {
        let dao = ConfigurationDao::new(seeded_datastore(), 1);

        assert!(dao.find_one_schema("ivoa").await.unwrap().is_some());
        assert!(dao.find_one_schema("missing").await.unwrap().is_none());
        assert!(dao.find_one_table("ivoa.obscore").await.unwrap().is_some());
        assert!(dao
            .find_one_column("ivoa.obscore", "s_ra")
            .await
            .unwrap()
            .is_some());
        assert!(dao
            .find_one_column("ivoa.obscore", "s_dec")
            .await
            .unwrap()
            .is_none());
        assert_eq!(dao.find_all_keys().await.unwrap().len(), 1);
        assert_eq!(dao.find_key_columns("k1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_cache_is_stale_until_refresh() {
        let datastore = seeded_datastore();
        let dao = ConfigurationDao::new(datastore.clone(), 1);

        assert_eq!(dao.find_all_tables().await.unwrap().len(), 1);
        datastore.add_table(TableMeta::new("ivoa", "ivoa.collections"));

        assert!(dao.find_one_table("ivoa.collections").await.unwrap().is_none());

        dao.refresh_object_cache().await;
        assert!(dao.find_one_table("ivoa.collections").await.unwrap().is_some());
        assert_eq!(datastore.fetch_count("tables"), 2);
    }

    #[tokio::test]
    async fn test_failed_load_is_not_cached() {
        let datastore = seeded_datastore();
        datastore.set_available(false);
        let dao = ConfigurationDao::new(datastore.clone(), 1);

        assert!(dao.find_all_schemas().await.is_err());

        datastore.set_available(true);
        assert_eq!(dao.find_all_schemas().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_project_codes_pass_through() {
        let datastore = seeded_datastore();
        datastore.add_project("ivoa", "P-001", 11);
        let dao = ConfigurationDao::new(datastore.clone(), 1);

        let codes = vec!["P-001".to_string(), "P-404".to_string()];
        assert_eq!(dao.convert_project_codes_to_ids(&codes, "ivoa").await.unwrap(), vec![11]);

        datastore.add_project("ivoa", "P-404", 12);
        assert_eq!(
            dao.convert_project_codes_to_ids(&codes, "ivoa").await.unwrap(),
            vec![11, 12]
        );
    }
}
