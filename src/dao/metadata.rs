//! 元数据对象
//!
//! 描述数据存储中的模式、表、列与键，字段对应 TAP_SCHEMA 中的同名列

use serde::{Deserialize, Serialize};

/// 模式元数据
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaMeta {
    pub schema_name: String,
    pub description: Option<String>,
    pub utype: Option<String>,
    pub schema_index: Option<i32>,
}

/// 表元数据
///
/// `table_name` 为带模式前缀的完整名称，例如 `ivoa.obscore`。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableMeta {
    pub schema_name: String,
    pub table_name: String,
    pub table_type: String,
    pub description: Option<String>,
    pub utype: Option<String>,
    pub table_index: Option<i32>,
}

/// 列元数据
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMeta {
    pub table_name: String,
    pub column_name: String,
    pub datatype: String,
    pub description: Option<String>,
    pub unit: Option<String>,
    pub ucd: Option<String>,
    pub utype: Option<String>,
    pub principal: bool,
    pub indexed: bool,
    pub std: bool,
    pub column_index: Option<i32>,
}

/// 外键元数据
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyMeta {
    pub key_id: String,
    pub from_table: String,
    pub target_table: String,
    pub description: Option<String>,
    pub utype: Option<String>,
}

/// 外键列映射
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyColumnMeta {
    pub key_id: String,
    pub from_column: String,
    pub target_column: String,
}

impl TableMeta {
    /// 创建最简表元数据
    pub fn new(schema_name: impl Into<String>, table_name: impl Into<String>) -> Self {
        Self {
            schema_name: schema_name.into(),
            table_name: table_name.into(),
            table_type: "table".to_string(),
            description: None,
            utype: None,
            table_index: None,
        }
    }
}

impl SchemaMeta {
    /// 创建最简模式元数据
    pub fn new(schema_name: impl Into<String>) -> Self {
        Self {
            schema_name: schema_name.into(),
            description: None,
            utype: None,
            schema_index: None,
        }
    }
}

impl ColumnMeta {
    /// 创建最简列元数据
    pub fn new(
        table_name: impl Into<String>,
        column_name: impl Into<String>,
        datatype: impl Into<String>,
    ) -> Self {
        Self {
            table_name: table_name.into(),
            column_name: column_name.into(),
            datatype: datatype.into(),
            description: None,
            unit: None,
            ucd: None,
            utype: None,
            principal: false,
            indexed: false,
            std: false,
            column_index: None,
        }
    }
}
