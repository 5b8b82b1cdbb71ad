//! 示例查询组件
//!
//! 从端点配置段中读取示例查询集合，不访问数据存储。

use crate::config::{Configuration, ExampleQuery};
use crate::error::{DeliveryError, ReadinessError};
use crate::registry::{ConfigBinding, Configurable, SavedState};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

/// 端点的示例查询集合
#[derive(Debug, Clone)]
pub struct ExampleSet {
    examples: Vec<ExampleQuery>,
    by_name: HashMap<String, usize>,
}

impl ExampleSet {
    /// 按名称建立索引，同名示例以后出现的为准
    pub fn new(examples: Vec<ExampleQuery>) -> Self {
        let by_name = examples
            .iter()
            .enumerate()
            .map(|(position, example)| (example.name.clone(), position))
            .collect();
        Self { examples, by_name }
    }

    /// 全部示例，保持配置中的顺序
    pub fn all(&self) -> &[ExampleQuery] {
        &self.examples
    }

    /// 按名称查找
    pub fn get(&self, name: &str) -> Option<&ExampleQuery> {
        self.by_name.get(name).map(|&position| &self.examples[position])
    }

    /// 示例数量
    pub fn len(&self) -> usize {
        self.examples.len()
    }

    /// 是否没有任何示例
    pub fn is_empty(&self) -> bool {
        self.examples.is_empty()
    }
}

/// 示例查询提供者
pub struct ExampleQueryProvider {
    name: String,
    endpoint: String,
    binding: ConfigBinding<ExampleSet>,
}

impl ExampleQueryProvider {
    pub fn new(endpoint: impl Into<String>) -> Self {
        let endpoint = endpoint.into();
        Self {
            name: format!("{}.examples", endpoint),
            endpoint,
            binding: ConfigBinding::new(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// 当前配置下的示例集合
    pub async fn examples(&self) -> Option<Arc<ExampleSet>> {
        self.binding.ensure(|config| self.load(config)).await.ok()
    }

    async fn load(&self, config: Arc<Configuration>) -> Result<ExampleSet, ReadinessError> {
        let section = config.require_endpoint(&self.endpoint)?;
        Ok(ExampleSet::new(section.examples.clone()))
    }
}

#[async_trait]
impl Configurable for ExampleQueryProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn set_configuration(&self, config: Arc<Configuration>) -> Result<(), DeliveryError> {
        self.binding.bind(config).await;
        Ok(())
    }

    async fn is_ready(&self) -> bool {
        match self.binding.ensure(|config| self.load(config)).await {
            Ok(_) => true,
            Err(e) => {
                warn!(component = %self.name, error = %e, "示例查询未就绪");
                false
            }
        }
    }

    async fn invalidate(&self) {
        self.binding.clear().await;
    }

    async fn save_state(&self) -> SavedState {
        self.binding.save().await
    }

    async fn restore_state(&self, state: SavedState) {
        self.binding.restore(state).await;
    }
}
