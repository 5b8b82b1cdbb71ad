//! 命令行参数定义
//!
//! 使用clap定义应用程序的命令行接口

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// vo-reconfig - 天文数据访问服务的在线配置协调工具
#[derive(Parser, Debug, Clone)]
#[command(
    name = "vo-reconfig",
    version = crate::VERSION,
    about = crate::APP_DESCRIPTION,
    long_about = None
)]
pub struct Args {
    /// 配置文件路径
    #[arg(
        short,
        long,
        value_name = "FILE",
        help = "配置文件路径",
        env = "VO_RECONFIG_CONFIG"
    )]
    pub config: Option<PathBuf>,

    /// 日志级别
    #[arg(
        short,
        long,
        value_enum,
        default_value = "info",
        help = "日志级别",
        env = "VO_RECONFIG_LOG_LEVEL"
    )]
    pub log_level: LogLevel,

    /// 以JSON格式输出日志
    #[arg(long, help = "以JSON格式输出日志")]
    pub json_logs: bool,

    /// 子命令
    #[command(subcommand)]
    pub command: Commands,
}

/// 日志级别枚举
#[derive(ValueEnum, Clone, Debug, PartialEq)]
pub enum LogLevel {
    /// 调试级别
    Debug,
    /// 信息级别
    Info,
    /// 警告级别
    Warn,
    /// 错误级别
    Error,
}

impl From<LogLevel> for log::LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Error => log::LevelFilter::Error,
        }
    }
}

/// 子命令
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// 启动服务：激活配置，监控配置文件并提供管理端接口
    Serve {
        /// 不监控配置文件变更
        #[arg(long, help = "不监控配置文件变更")]
        no_watch: bool,
    },

    /// 对一套全新组件试运行配置文件，不影响任何运行中的服务
    Validate {
        /// 配置文件路径（默认使用 --config）
        #[arg(value_name = "FILE", help = "要验证的配置文件")]
        config_path: Option<PathBuf>,

        /// 输出格式
        #[arg(short, long, value_enum, default_value = "text", help = "输出格式")]
        format: OutputFormat,
    },

    /// 正式激活一次配置并输出组件就绪状态
    Check {
        /// 输出格式
        #[arg(short, long, value_enum, default_value = "text", help = "输出格式")]
        format: OutputFormat,
    },
}

/// 输出格式
#[derive(ValueEnum, Clone, Debug, PartialEq)]
pub enum OutputFormat {
    /// 文本格式
    Text,
    /// JSON格式
    Json,
}

impl Args {
    /// 解析命令行参数
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// 获取配置文件路径
    pub fn get_config_path(&self) -> PathBuf {
        self.config
            .clone()
            .unwrap_or_else(crate::config::get_default_config_path)
    }

    /// 是否启用调试输出
    pub fn is_verbose(&self) -> bool {
        matches!(self.log_level, LogLevel::Debug)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_serve() {
        let args = Args::try_parse_from(["vo-reconfig", "--config", "/etc/vo.toml", "serve"]).unwrap();
        assert_eq!(args.get_config_path(), PathBuf::from("/etc/vo.toml"));
        assert!(matches!(args.command, Commands::Serve { no_watch: false }));
        assert_eq!(args.log_level, LogLevel::Info);
    }

    #[test]
    fn test_parse_validate_with_positional_file() {
        let args = Args::try_parse_from([
            "vo-reconfig",
            "validate",
            "candidate.toml",
            "--format",
            "json",
        ])
        .unwrap();

        match args.command {
            Commands::Validate {
                config_path,
                format,
            } => {
                assert_eq!(config_path, Some(PathBuf::from("candidate.toml")));
                assert_eq!(format, OutputFormat::Json);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_log_level_conversion() {
        let args = Args::try_parse_from(["vo-reconfig", "-l", "debug", "check"]).unwrap();
        assert!(args.is_verbose());
        let level: log::LevelFilter = args.log_level.into();
        assert_eq!(level, log::LevelFilter::Debug);
    }

    #[test]
    fn test_subcommand_required() {
        assert!(Args::try_parse_from(["vo-reconfig"]).is_err());
    }
}
