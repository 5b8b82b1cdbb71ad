//! 命令处理逻辑
//!
//! 实现 validate 和 check 两个一次性命令，serve 由主程序负责

use crate::bootstrap::{ConfigSource, ServiceWiring};
use crate::cli::args::{Args, Commands, OutputFormat};
use crate::config::TomlConfigLoader;
use crate::dao::DatastoreConnector;
use crate::error::Result;
use crate::registry::{ConfigurationRegistry, SwitchMode, SwitchReport};
use crate::status::{readiness_report, ComponentReadiness, HealthReport};
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

/// 命令处理器trait
#[async_trait]
pub trait Command: Send + Sync {
    /// 执行命令
    async fn execute(&self, args: &Args) -> Result<()>;
}

/// 验证命令
///
/// 在一套全新的组件上试运行候选配置，不触碰任何运行中的服务。
pub struct ValidateCommand {
    connector: Arc<dyn DatastoreConnector>,
}

impl ValidateCommand {
    pub fn new(connector: Arc<dyn DatastoreConnector>) -> Self {
        Self { connector }
    }

    /// 试运行配置文件
    pub async fn run(&self, config_path: &Path) -> Result<SwitchReport> {
        let source = ConfigSource::new(
            TomlConfigLoader::new(true, Arc::clone(&self.connector)),
            config_path,
        );
        let wiring = ServiceWiring::new(Arc::new(ConfigurationRegistry::new()));
        wiring.reload(&source, SwitchMode::ValidateOnly).await
    }
}

#[async_trait]
impl Command for ValidateCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        if let Commands::Validate {
            config_path,
            format,
        } = &args.command
        {
            let config_file = config_path
                .clone()
                .unwrap_or_else(|| args.get_config_path());
            println!("验证配置文件: {}", config_file.display());

            let report = self.run(&config_file).await?;
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
                OutputFormat::Text => {
                    println!("配置版本: {}", report.version);
                    print_readiness(&report.readiness);
                }
            }

            ensure_all_ready(&report.readiness)
        } else {
            Ok(())
        }
    }
}

/// 检测命令
///
/// 正式激活一次配置，然后输出所有组件的就绪状态。
pub struct CheckCommand {
    connector: Arc<dyn DatastoreConnector>,
}

impl CheckCommand {
    pub fn new(connector: Arc<dyn DatastoreConnector>) -> Self {
        Self { connector }
    }

    /// 激活配置并汇总就绪状态
    pub async fn run(&self, config_path: &Path) -> Result<HealthReport> {
        let source = ConfigSource::new(
            TomlConfigLoader::new(true, Arc::clone(&self.connector)),
            config_path,
        );
        let wiring = ServiceWiring::new(Arc::new(ConfigurationRegistry::new()));
        wiring.reload(&source, SwitchMode::Live).await?;
        Ok(readiness_report(wiring.registry()).await)
    }
}

#[async_trait]
impl Command for CheckCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        if let Commands::Check { format } = &args.command {
            let report = self.run(&args.get_config_path()).await?;
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
                OutputFormat::Text => {
                    if let Some(version) = report.active_version {
                        println!("生效配置版本: {version}");
                    }
                    print_readiness(&report.components);
                    println!(
                        "就绪: {}/{}",
                        report.ready_components, report.total_components
                    );
                }
            }

            ensure_all_ready(&report.components)
        } else {
            Ok(())
        }
    }
}

fn print_readiness(readiness: &[ComponentReadiness]) {
    for component in readiness {
        let mark = if component.ready { "✓" } else { "✗" };
        println!("  {} {}", mark, component.name);
    }
}

fn ensure_all_ready(readiness: &[ComponentReadiness]) -> Result<()> {
    let not_ready: Vec<&str> = readiness
        .iter()
        .filter(|r| !r.ready)
        .map(|r| r.name.as_str())
        .collect();

    if not_ready.is_empty() {
        Ok(())
    } else {
        Err(anyhow::anyhow!("以下组件未就绪: {}", not_ready.join(", ")).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::{MemoryConnector, MemoryDatastore, SchemaMeta, TableMeta};
    use std::fs;
    use tempfile::NamedTempFile;

    const CONFIG: &str = r#"
[settings]
"db.url" = "memory://vo"

[endpoints.scs]
protocol = "scs"
"#;

    fn connector(available: bool) -> Arc<MemoryConnector> {
        let datastore = Arc::new(MemoryDatastore::new());
        datastore.add_schema(SchemaMeta::new("ivoa"));
        datastore.add_table(TableMeta::new("ivoa", "ivoa.obscore"));
        datastore.set_available(available);
        Arc::new(MemoryConnector::new().with_datastore("vo", datastore))
    }

    fn config_file(content: &str) -> NamedTempFile {
        let file = NamedTempFile::new().unwrap();
        fs::write(file.path(), content).unwrap();
        file
    }

    #[tokio::test]
    async fn test_validate_reports_fresh_components() {
        let file = config_file(CONFIG);
        let command = ValidateCommand::new(connector(true));

        let report = command.run(file.path()).await.unwrap();
        assert_eq!(report.mode, SwitchMode::ValidateOnly);
        assert_eq!(report.readiness.len(), 4);
        assert!(report.all_ready());
        assert!(ensure_all_ready(&report.readiness).is_ok());
    }

    #[tokio::test]
    async fn test_validate_flags_unavailable_datastore() {
        let file = config_file(CONFIG);
        let command = ValidateCommand::new(connector(false));

        let report = command.run(file.path()).await.unwrap();
        assert!(!report.all_ready());
        assert!(ensure_all_ready(&report.readiness).is_err());
    }

    #[tokio::test]
    async fn test_check_activates_configuration() {
        let file = config_file(CONFIG);
        let command = CheckCommand::new(connector(true));

        let report = command.run(file.path()).await.unwrap();
        assert!(report.is_healthy());
        assert_eq!(report.total_components, 4);
    }

    #[tokio::test]
    async fn test_missing_file_is_an_error() {
        let command = CheckCommand::new(connector(true));
        assert!(command
            .run(Path::new("/nonexistent/vo-reconfig.toml"))
            .await
            .is_err());
    }
}
