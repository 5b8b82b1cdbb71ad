//! vo-reconfig 主程序入口
//!
//! 天文数据访问服务的在线配置协调

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use vo_reconfig::bootstrap::{ConfigSource, ServiceWiring};
use vo_reconfig::cli::args::{Args, Commands};
use vo_reconfig::cli::commands::{CheckCommand, Command, ValidateCommand};
use vo_reconfig::config::{ConfigWatcher, TomlConfigLoader};
use vo_reconfig::dao::{DatastoreConnector, SchemeConnector};
use vo_reconfig::logging::{LogConfig, LoggingSystem};
use vo_reconfig::registry::{ConfigurationRegistry, SwitchMode};
use vo_reconfig::web::{AdminServer, AdminState};

#[tokio::main]
async fn main() -> Result<()> {
    // 解析命令行参数
    let args = Args::parse();

    // 初始化日志系统
    let log_config = LogConfig {
        level: args.log_level.clone().into(),
        console: true,
        json_format: args.json_logs,
        ..Default::default()
    };

    let logging = LoggingSystem::setup_logging(log_config).context("初始化日志系统失败")?;

    info!("vo-reconfig v{} 启动", vo_reconfig::VERSION);

    // 执行命令
    if let Err(e) = execute_command(&args, logging).await {
        error!("命令执行失败: {}", e);
        std::process::exit(1);
    }

    Ok(())
}

/// 执行CLI命令
async fn execute_command(args: &Args, logging: LoggingSystem) -> Result<()> {
    let connector: Arc<dyn DatastoreConnector> = Arc::new(SchemeConnector::default());

    match &args.command {
        Commands::Serve { no_watch } => serve(args, *no_watch, connector, logging).await,
        Commands::Validate { .. } => {
            let command = ValidateCommand::new(connector);
            command.execute(args).await.map_err(|e| anyhow::anyhow!(e))
        }
        Commands::Check { .. } => {
            let command = CheckCommand::new(connector);
            command.execute(args).await.map_err(|e| anyhow::anyhow!(e))
        }
    }
}

/// 服务主逻辑
async fn serve(
    args: &Args,
    no_watch: bool,
    connector: Arc<dyn DatastoreConnector>,
    logging: LoggingSystem,
) -> Result<()> {
    let config_path = args.get_config_path();
    let loader = TomlConfigLoader::new(true, connector);
    let source = ConfigSource::new(loader.clone(), &config_path);
    let logging = Arc::new(logging);

    // 1. 加载并激活初始配置
    let config = source.load().await.with_context(|| {
        format!(
            "加载配置文件失败: {}\n请检查配置文件格式是否正确",
            config_path.display()
        )
    })?;
    let admin = config.admin().clone();

    let wiring = Arc::new(ServiceWiring::new(Arc::new(ConfigurationRegistry::new())));
    let report = wiring.activate(config, SwitchMode::Live).await;
    logging.switch_log("startup", &report);
    info!(
        "初始配置已激活，版本: {}，端点数量: {}",
        report.version,
        wiring.endpoint_names().await.len()
    );

    // 2. 设置配置热重载
    let _config_watcher = if admin.watch_config && !no_watch {
        Some(setup_config_hot_reload(&source, &wiring, &logging, admin.debounce_ms)?)
    } else {
        info!("配置文件监控已禁用");
        None
    };

    // 3. SIGHUP 触发重载
    #[cfg(unix)]
    setup_sighup_reload(source.clone(), Arc::clone(&wiring), Arc::clone(&logging))?;

    // 4. 设置Ctrl+C信号处理
    let (shutdown_tx, mut shutdown_rx) = broadcast::channel::<()>(1);
    tokio::spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => {
                info!("收到中断信号，正在停止服务...");
                let _ = shutdown_tx.send(());
            }
            Err(err) => {
                error!("监听中断信号失败: {}", err);
            }
        }
    });

    // 5. 运行管理端服务器，直到收到关闭信号
    let state = AdminState::new(Arc::clone(&wiring), source, logging);
    let server = AdminServer::new(admin.clone(), state);
    let shutdown = async move {
        let _ = shutdown_rx.recv().await;
    };

    if admin.enabled {
        server.run(shutdown).await.context("管理端服务器运行失败")?;
    } else {
        info!("管理端服务器已禁用，等待关闭信号");
        shutdown.await;
    }

    info!("服务已停止");
    Ok(())
}

/// 设置配置热重载
///
/// 配置文件变更后重新加载并正式切换。加载失败时监控器只记录日志，
/// 生效配置保持不变。
fn setup_config_hot_reload(
    source: &ConfigSource,
    wiring: &Arc<ServiceWiring>,
    logging: &Arc<LoggingSystem>,
    debounce_ms: u64,
) -> Result<ConfigWatcher> {
    let (mut config_watcher, mut receiver) = ConfigWatcher::new(
        source.path(),
        Duration::from_millis(debounce_ms),
        source.loader().clone(),
    )
    .context("创建配置监控器失败")?;

    // 启动配置文件监控
    config_watcher.start().context("启动配置监控失败")?;

    let wiring = Arc::clone(wiring);
    let logging = Arc::clone(logging);
    tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(change_event) => {
                    info!(
                        "检测到配置变更: {}，版本: {}",
                        change_event.config_path.display(),
                        change_event.new_config.version()
                    );
                    let report = wiring
                        .activate(change_event.new_config, SwitchMode::Live)
                        .await;
                    logging.switch_log("file-watch", &report);
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("配置变更事件积压，跳过 {} 个", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    Ok(config_watcher)
}

/// 收到 SIGHUP 时重新加载配置文件并正式切换
#[cfg(unix)]
fn setup_sighup_reload(
    source: ConfigSource,
    wiring: Arc<ServiceWiring>,
    logging: Arc<LoggingSystem>,
) -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangup = signal(SignalKind::hangup()).context("注册 SIGHUP 处理失败")?;
    tokio::spawn(async move {
        while hangup.recv().await.is_some() {
            info!("收到 SIGHUP，重新加载配置: {}", source.path().display());
            match wiring.reload(&source, SwitchMode::Live).await {
                Ok(report) => logging.switch_log("sighup", &report),
                Err(e) => error!("配置重新加载失败，生效配置保持不变: {}", e),
            }
        }
    });
    Ok(())
}
