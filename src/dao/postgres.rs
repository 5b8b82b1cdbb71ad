//! PostgreSQL 数据存储
//!
//! 元数据读取自 `tap_schema` 模式下的标准表

use crate::config::DatastoreSettings;
use crate::dao::datastore::{Datastore, DatastoreConnector, DatastoreResult};
use crate::dao::metadata::{ColumnMeta, KeyColumnMeta, KeyMeta, SchemaMeta, TableMeta};
use crate::error::DatastoreError;
use async_trait::async_trait;
use regex::Regex;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::sync::{Arc, OnceLock};
use tracing::{debug, info};

const SCHEMAS_SQL: &str = "SELECT schema_name, description, utype, schema_index \
     FROM tap_schema.schemas ORDER BY schema_index, schema_name";

const TABLES_SQL: &str = "SELECT schema_name, table_name, table_type, description, utype, table_index \
     FROM tap_schema.tables ORDER BY table_index, table_name";

const COLUMNS_SQL: &str = "SELECT table_name, column_name, datatype, description, unit, ucd, utype, \
     principal, indexed, std, column_index \
     FROM tap_schema.columns ORDER BY table_name, column_index, column_name";

const KEYS_SQL: &str =
    "SELECT key_id, from_table, target_table, description, utype FROM tap_schema.keys ORDER BY key_id";

const KEY_COLUMNS_SQL: &str =
    "SELECT key_id, from_column, target_column FROM tap_schema.key_columns ORDER BY key_id";

const EXTENSION_SQL: &str = "SELECT EXISTS(SELECT 1 FROM pg_extension WHERE extname = $1)";

type ColumnRow = (
    String,
    String,
    String,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<i32>,
    Option<i32>,
    Option<i32>,
    Option<i32>,
);

/// 判断地址是否指向 PostgreSQL
pub fn is_postgres_url(url: &str) -> bool {
    url.starts_with("postgres://") || url.starts_with("postgresql://")
}

/// 模式名只允许普通标识符，避免拼接 SQL 时注入
fn valid_identifier(name: &str) -> bool {
    static IDENTIFIER: OnceLock<Option<Regex>> = OnceLock::new();
    IDENTIFIER
        .get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").ok())
        .as_ref()
        .is_some_and(|re| re.is_match(name))
}

/// 基于 SQLx 连接池的数据存储
#[derive(Debug, Clone)]
pub struct PgDatastore {
    pool: PgPool,
}

impl PgDatastore {
    /// 使用已有连接池
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// 建立连接池
    pub async fn connect(settings: &DatastoreSettings) -> DatastoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(settings.max_connections)
            .acquire_timeout(settings.acquire_timeout)
            .connect(&settings.url)
            .await
            .map_err(|e| DatastoreError::Connect(e.to_string()))?;

        info!(
            max_connections = settings.max_connections,
            "PostgreSQL 连接池已建立"
        );
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Datastore for PgDatastore {
    async fn fetch_schemas(&self) -> DatastoreResult<Vec<SchemaMeta>> {
        let rows: Vec<(String, Option<String>, Option<String>, Option<i32>)> =
            sqlx::query_as(SCHEMAS_SQL).fetch_all(&self.pool).await?;

        Ok(rows
            .into_iter()
            .map(|(schema_name, description, utype, schema_index)| SchemaMeta {
                schema_name,
                description,
                utype,
                schema_index,
            })
            .collect())
    }

    async fn fetch_tables(&self) -> DatastoreResult<Vec<TableMeta>> {
        let rows: Vec<(String, String, String, Option<String>, Option<String>, Option<i32>)> =
            sqlx::query_as(TABLES_SQL).fetch_all(&self.pool).await?;

        Ok(rows
            .into_iter()
            .map(
                |(schema_name, table_name, table_type, description, utype, table_index)| {
                    TableMeta {
                        schema_name,
                        table_name,
                        table_type,
                        description,
                        utype,
                        table_index,
                    }
                },
            )
            .collect())
    }

    async fn fetch_columns(&self) -> DatastoreResult<Vec<ColumnMeta>> {
        let rows: Vec<ColumnRow> = sqlx::query_as(COLUMNS_SQL).fetch_all(&self.pool).await?;

        Ok(rows
            .into_iter()
            .map(
                |(
                    table_name,
                    column_name,
                    datatype,
                    description,
                    unit,
                    ucd,
                    utype,
                    principal,
                    indexed,
                    std,
                    column_index,
                )| ColumnMeta {
                    table_name,
                    column_name,
                    datatype,
                    description,
                    unit,
                    ucd,
                    utype,
                    principal: principal.unwrap_or(0) != 0,
                    indexed: indexed.unwrap_or(0) != 0,
                    std: std.unwrap_or(0) != 0,
                    column_index,
                },
            )
            .collect())
    }

    async fn fetch_keys(&self) -> DatastoreResult<Vec<KeyMeta>> {
        let rows: Vec<(String, String, String, Option<String>, Option<String>)> =
            sqlx::query_as(KEYS_SQL).fetch_all(&self.pool).await?;

        Ok(rows
            .into_iter()
            .map(
                |(key_id, from_table, target_table, description, utype)| KeyMeta {
                    key_id,
                    from_table,
                    target_table,
                    description,
                    utype,
                },
            )
            .collect())
    }

    async fn fetch_key_columns(&self) -> DatastoreResult<Vec<KeyColumnMeta>> {
        let rows: Vec<(String, String, String)> =
            sqlx::query_as(KEY_COLUMNS_SQL).fetch_all(&self.pool).await?;

        Ok(rows
            .into_iter()
            .map(|(key_id, from_column, target_column)| KeyColumnMeta {
                key_id,
                from_column,
                target_column,
            })
            .collect())
    }

    async fn project_ids(&self, codes: &[String], schema: &str) -> DatastoreResult<Vec<i64>> {
        if !valid_identifier(schema) {
            return Err(DatastoreError::Query(format!("非法的模式名: {}", schema)));
        }

        let statement = format!(
            "SELECT project_id FROM {}.projects WHERE code = ANY($1) ORDER BY project_id",
            schema
        );
        let ids: Vec<i64> = sqlx::query_scalar(&statement)
            .bind(codes)
            .fetch_all(&self.pool)
            .await?;
        Ok(ids)
    }

    async fn probe(&self, statement: &str) -> DatastoreResult<bool> {
        debug!(statement, "执行探测语句");
        let row = sqlx::query(statement).fetch_optional(&self.pool).await?;
        Ok(row.is_some())
    }

    async fn extension_installed(&self, name: &str) -> DatastoreResult<bool> {
        let installed: bool = sqlx::query_scalar(EXTENSION_SQL)
            .bind(name)
            .fetch_one(&self.pool)
            .await?;
        Ok(installed)
    }
}

/// PostgreSQL 连接器，每次连接建立独立的连接池
#[derive(Debug, Default, Clone)]
pub struct PgConnector;

#[async_trait]
impl DatastoreConnector for PgConnector {
    async fn connect(&self, settings: &DatastoreSettings) -> DatastoreResult<Arc<dyn Datastore>> {
        if !is_postgres_url(&settings.url) {
            return Err(DatastoreError::UnsupportedUrl {
                url: settings.url.clone(),
            });
        }
        let datastore = PgDatastore::connect(settings).await?;
        Ok(Arc::new(datastore))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_postgres_url_detection() {
        assert!(is_postgres_url("postgres://tap@localhost/vo"));
        assert!(is_postgres_url("postgresql://localhost/vo"));
        assert!(!is_postgres_url("memory://vo"));
    }

    #[test]
    fn test_identifier_validation() {
        assert!(valid_identifier("ivoa"));
        assert!(valid_identifier("_proposals2"));
        assert!(!valid_identifier("ivoa; DROP TABLE x"));
        assert!(!valid_identifier("1abc"));
        assert!(!valid_identifier(""));
    }

    #[tokio::test]
    async fn test_connector_rejects_other_schemes() {
        let result = PgConnector
            .connect(&DatastoreSettings::new("memory://vo"))
            .await;
        assert!(matches!(result, Err(DatastoreError::UnsupportedUrl { .. })));
    }
}
