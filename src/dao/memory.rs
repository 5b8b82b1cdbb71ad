//! 进程内数据存储
//!
//! 以 `memory://<名称>` 地址接入，数据全部保存在内存中，可随时修改或置为不可用。

use crate::config::DatastoreSettings;
use crate::dao::datastore::{Datastore, DatastoreConnector, DatastoreResult};
use crate::dao::metadata::{ColumnMeta, KeyColumnMeta, KeyMeta, SchemaMeta, TableMeta};
use crate::error::DatastoreError;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// 内存数据存储地址前缀
pub const MEMORY_SCHEME: &str = "memory://";

#[derive(Debug, Default)]
struct MemoryContents {
    schemas: Vec<SchemaMeta>,
    tables: Vec<TableMeta>,
    columns: Vec<ColumnMeta>,
    keys: Vec<KeyMeta>,
    key_columns: Vec<KeyColumnMeta>,
    /// (模式, 项目代码) -> 项目ID
    projects: HashMap<(String, String), i64>,
    extensions: HashSet<String>,
    probe_overrides: HashMap<String, bool>,
    fetch_counts: HashMap<&'static str, usize>,
}

/// 内存数据存储
#[derive(Debug)]
pub struct MemoryDatastore {
    contents: Mutex<MemoryContents>,
    available: AtomicBool,
}

impl Default for MemoryDatastore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDatastore {
    /// 创建空的可用数据存储
    pub fn new() -> Self {
        Self {
            contents: Mutex::new(MemoryContents::default()),
            available: AtomicBool::new(true),
        }
    }

    fn contents(&self) -> MutexGuard<'_, MemoryContents> {
        self.contents.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 设置是否可达
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    pub fn add_schema(&self, schema: SchemaMeta) {
        self.contents().schemas.push(schema);
    }

    pub fn add_table(&self, table: TableMeta) {
        self.contents().tables.push(table);
    }

    pub fn remove_table(&self, table_name: &str) {
        self.contents().tables.retain(|t| t.table_name != table_name);
    }

    pub fn add_column(&self, column: ColumnMeta) {
        self.contents().columns.push(column);
    }

    pub fn add_key(&self, key: KeyMeta) {
        self.contents().keys.push(key);
    }

    pub fn add_key_column(&self, key_column: KeyColumnMeta) {
        self.contents().key_columns.push(key_column);
    }

    pub fn add_project(&self, schema: &str, code: &str, id: i64) {
        self.contents()
            .projects
            .insert((schema.to_string(), code.to_string()), id);
    }

    pub fn install_extension(&self, name: &str) {
        self.contents().extensions.insert(name.to_string());
    }

    /// 固定某条探测语句的结果
    pub fn set_probe_result(&self, statement: &str, result: bool) {
        self.contents()
            .probe_overrides
            .insert(statement.to_string(), result);
    }

    /// 某类元数据被读取的次数
    pub fn fetch_count(&self, collection: &str) -> usize {
        self.contents()
            .fetch_counts
            .get(collection)
            .copied()
            .unwrap_or(0)
    }

    fn ensure_available(&self) -> DatastoreResult<()> {
        if self.is_available() {
            Ok(())
        } else {
            Err(DatastoreError::Connect("内存数据存储不可用".to_string()))
        }
    }

    fn fetch<T: Clone>(
        &self,
        collection: &'static str,
        select: impl FnOnce(&MemoryContents) -> &Vec<T>,
    ) -> DatastoreResult<Vec<T>> {
        self.ensure_available()?;
        let mut contents = self.contents();
        *contents.fetch_counts.entry(collection).or_insert(0) += 1;
        Ok(select(&*contents).clone())
    }
}

#[async_trait]
impl Datastore for MemoryDatastore {
    async fn fetch_schemas(&self) -> DatastoreResult<Vec<SchemaMeta>> {
        self.fetch("schemas", |c| &c.schemas)
    }

    async fn fetch_tables(&self) -> DatastoreResult<Vec<TableMeta>> {
        self.fetch("tables", |c| &c.tables)
    }

    async fn fetch_columns(&self) -> DatastoreResult<Vec<ColumnMeta>> {
        self.fetch("columns", |c| &c.columns)
    }

    async fn fetch_keys(&self) -> DatastoreResult<Vec<KeyMeta>> {
        self.fetch("keys", |c| &c.keys)
    }

    async fn fetch_key_columns(&self) -> DatastoreResult<Vec<KeyColumnMeta>> {
        self.fetch("key_columns", |c| &c.key_columns)
    }

    async fn project_ids(&self, codes: &[String], schema: &str) -> DatastoreResult<Vec<i64>> {
        self.ensure_available()?;
        let contents = self.contents();
        Ok(codes
            .iter()
            .filter_map(|code| {
                contents
                    .projects
                    .get(&(schema.to_string(), code.clone()))
                    .copied()
            })
            .collect())
    }

    async fn probe(&self, statement: &str) -> DatastoreResult<bool> {
        self.ensure_available()?;
        let contents = self.contents();
        Ok(contents
            .probe_overrides
            .get(statement)
            .copied()
            .unwrap_or(!statement.trim().is_empty()))
    }

    async fn extension_installed(&self, name: &str) -> DatastoreResult<bool> {
        self.ensure_available()?;
        Ok(self.contents().extensions.contains(name))
    }
}

/// 内存数据存储连接器，按名称解析 `memory://<名称>`
#[derive(Debug, Default)]
pub struct MemoryConnector {
    datastores: Mutex<HashMap<String, Arc<MemoryDatastore>>>,
    connects: AtomicUsize,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册命名数据存储
    pub fn insert(&self, name: impl Into<String>, datastore: Arc<MemoryDatastore>) {
        self.datastores
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.into(), datastore);
    }

    pub fn with_datastore(self, name: impl Into<String>, datastore: Arc<MemoryDatastore>) -> Self {
        self.insert(name, datastore);
        self
    }

    /// 成功建立的连接次数
    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DatastoreConnector for MemoryConnector {
    async fn connect(&self, settings: &DatastoreSettings) -> DatastoreResult<Arc<dyn Datastore>> {
        let name = settings
            .url
            .strip_prefix(MEMORY_SCHEME)
            .ok_or_else(|| DatastoreError::UnsupportedUrl {
                url: settings.url.clone(),
            })?;

        let datastore = self
            .datastores
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
            .ok_or_else(|| DatastoreError::Connect(format!("未知的内存数据存储: {}", name)))?;

        datastore.ensure_available()?;
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(datastore)
    }
}
