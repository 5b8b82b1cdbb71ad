//! 按地址协议分派的连接器

use crate::config::DatastoreSettings;
use crate::dao::datastore::{Datastore, DatastoreConnector, DatastoreResult};
use crate::dao::memory::{MemoryConnector, MEMORY_SCHEME};
use crate::dao::postgres::{is_postgres_url, PgConnector};
use crate::error::DatastoreError;
use async_trait::async_trait;
use std::sync::Arc;

/// 根据 `db.url` 的协议选择 PostgreSQL 或内存数据存储
#[derive(Debug, Clone)]
pub struct SchemeConnector {
    memory: Arc<MemoryConnector>,
    postgres: PgConnector,
}

impl Default for SchemeConnector {
    fn default() -> Self {
        Self::new(Arc::new(MemoryConnector::new()))
    }
}

impl SchemeConnector {
    pub fn new(memory: Arc<MemoryConnector>) -> Self {
        Self {
            memory,
            postgres: PgConnector,
        }
    }

    /// 内存数据存储注册表
    pub fn memory(&self) -> &Arc<MemoryConnector> {
        &self.memory
    }
}

#[async_trait]
impl DatastoreConnector for SchemeConnector {
    async fn connect(&self, settings: &DatastoreSettings) -> DatastoreResult<Arc<dyn Datastore>> {
        if settings.url.starts_with(MEMORY_SCHEME) {
            self.memory.connect(settings).await
        } else if is_postgres_url(&settings.url) {
            self.postgres.connect(settings).await
        } else {
            Err(DatastoreError::UnsupportedUrl {
                url: settings.url.clone(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::MemoryDatastore;

    #[tokio::test]
    async fn test_routes_memory_urls() {
        let memory = Arc::new(MemoryConnector::new());
        memory.insert("vo", Arc::new(MemoryDatastore::new()));
        let connector = SchemeConnector::new(memory.clone());

        assert!(connector
            .connect(&DatastoreSettings::new("memory://vo"))
            .await
            .is_ok());
        assert_eq!(memory.connect_count(), 1);
    }

    #[tokio::test]
    async fn test_rejects_unknown_scheme() {
        let connector = SchemeConnector::default();
        let result = connector
            .connect(&DatastoreSettings::new("mysql://localhost/vo"))
            .await;
        assert!(matches!(result, Err(DatastoreError::UnsupportedUrl { .. })));
    }
}
