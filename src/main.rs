//! addrbook 服务主程序
//!
//! 加载配置、初始化存储与准入网关，启动 HTTP 服务

mod cli;
mod error;
mod observability;
mod process;

use addrbook::service::{RegistryHttpService, ServiceManager};
use addrbook_common::ConfigError;
use addrbook_common::config::AppConfig;
use anyhow::Context;
use clap::Parser;
use gate::{AdmissionGate, IdentityResolver, NonceLedger};
use observability::init_observability;
use registry::RegistryState;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{error, info, warn};

macro_rules! bootstrap_info {
    ($($arg:tt)*) => {
        println!($($arg)*);
    };
}

macro_rules! bootstrap_error {
    ($($arg:tt)*) => {
        eprintln!($($arg)*);
    };
}

use cli::{Cli, Commands};
use error::{Error, Result};

/// Application launcher utilities
struct ApplicationLauncher;

fn main() -> Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        Some(Commands::Test { config_file }) => {
            let config_path =
                ApplicationLauncher::find_config_file(config_file.as_ref().unwrap_or(&cli.config))?;
            ApplicationLauncher::test_config_file(&config_path)
        }
        None => {
            let config_path = ApplicationLauncher::find_config_file(&cli.config)?;

            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()?;

            runtime.block_on(ApplicationLauncher::run_application(&config_path))
        }
    }
}

impl ApplicationLauncher {
    /// Find config file with fallback locations
    fn find_config_file(provided_path: &PathBuf) -> Result<PathBuf> {
        if provided_path != Path::new("config.toml") {
            if provided_path.exists() {
                bootstrap_info!("Using provided config file: {:?}", provided_path);
                return Ok(provided_path.clone());
            } else {
                bootstrap_error!("Provided config file not found: {:?}", provided_path);
                return Err(Error::custom(format!(
                    "Config file not found: {provided_path:?}"
                )));
            }
        }

        let fallback_paths = vec![
            // 1. Current working directory
            PathBuf::from("config.toml"),
            // 2. System config directory
            PathBuf::from("/etc/addrbook/config.toml"),
        ];

        bootstrap_info!("Searching for config file in default locations...");

        for path in &fallback_paths {
            if path.exists() {
                bootstrap_info!("Found config file: {:?}", path);
                return Ok(path.clone());
            } else {
                bootstrap_info!("Config not found at: {:?}", path);
            }
        }

        bootstrap_error!("No configuration file found!");
        bootstrap_error!("Please create a config file in one of these locations:");
        for (i, path) in fallback_paths.iter().enumerate() {
            bootstrap_error!("  {}. {:?}", i + 1, path);
        }
        bootstrap_error!("Or specify a custom path with: addrbook --config <path>");

        Err(Error::custom(
            "No configuration file found. Please create one or specify path with --config",
        ))
    }

    /// 输出校验结果，只有非 `Warning:` 条目才视为失败
    fn report_validation(config: &AppConfig) -> std::result::Result<(), ConfigError> {
        let Err(errors) = config.validate() else {
            return Ok(());
        };

        bootstrap_error!("❌ 配置验证发现问题:");
        for (i, err) in errors.iter().enumerate() {
            if err.starts_with("Warning:") {
                bootstrap_info!("  {}. ⚠️  {}", i + 1, err);
            } else {
                bootstrap_error!("  {}. ❌ {}", i + 1, err);
            }
        }

        match ConfigError::from_validation(errors) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// 测试配置文件是否有效
    fn test_config_file(config_path: &Path) -> Result<()> {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .init();

        let config = match AppConfig::from_file(config_path) {
            Ok(config) => {
                info!("✅ 配置文件解析成功: {:?}", config_path);
                config
            }
            Err(e) => {
                bootstrap_error!("❌ 配置解析失败: {}", e);
                return Err(Error::service_validation(format!("配置解析失败: {e}")));
            }
        };

        if let Err(e) = Self::report_validation(&config) {
            bootstrap_error!("❌ 配置验证失败: {}", e);
            return Err(Error::service_validation(format!("配置验证失败: {e}")));
        }
        info!("✅ 配置验证通过");

        if let Err(e) = config.auth.load_secret() {
            bootstrap_error!("❌ 共享密钥加载失败: {}", e);
            return Err(Error::service_validation(format!("共享密钥加载失败: {e}")));
        }

        info!("✅ 完整配置验证通过");
        Ok(())
    }

    /// 运行应用程序的主入口
    async fn run_application(config_path: &Path) -> Result<()> {
        bootstrap_info!("📄 加载配置文件: {:?}", config_path);

        let config = match AppConfig::from_file(config_path) {
            Ok(config) => {
                bootstrap_info!("✅ 配置加载成功");
                if let Err(e) = Self::report_validation(&config) {
                    bootstrap_error!("❌ 配置验证失败，请修复上述错误");
                    return Err(e.into());
                }
                config
            }
            Err(e) => {
                bootstrap_error!("❌ 配置加载失败: {}", e);
                return Err(e.into());
            }
        };

        if !config.sqlite_path.exists() {
            std::fs::create_dir_all(&config.sqlite_path).with_context(|| {
                format!(
                    "Failed to create SQLite data directory: {}",
                    config.sqlite_path.display()
                )
            })?;
        }

        let _observability_guard = init_observability(&config)?;

        let pid_path = process::ProcessManager::write_pid_file(&config.get_pid_path())?;
        let _pid_guard = process::PidFileGuard::new(pid_path);

        Self::run_services(config).await
    }

    /// 初始化存储和准入网关，运行 HTTP 服务直到收到关闭信号
    async fn run_services(config: AppConfig) -> Result<()> {
        info!("🚀 启动 addrbook 服务");

        let secret = config.auth.load_secret().map_err(|e| {
            error!("Failed to load HMAC secret: {}", e);
            e
        })?;

        // 存储就绪（含迁移）后才接受请求
        let state = registry::create_registry_state(&config.sqlite_path, secret.clone())
            .await
            .map_err(|e| {
                error!(
                    "数据库初始化失败 (sqlite_path={}): {}",
                    config.sqlite_path.display(),
                    e
                );
                e
            })?;
        info!("✅ 数据库初始化完成");

        let (ledger, reaper) =
            NonceLedger::from_config(&config.auth).spawn(config.auth.reaper_interval());
        let resolver: Arc<dyn IdentityResolver> = Arc::new(state.storage.clone());
        let gate = AdmissionGate::from_config(&config.auth, secret, ledger, resolver);

        let (shutdown_tx, _) = tokio::sync::broadcast::channel::<()>(10);
        setup_ctrl_c_handler(shutdown_tx.clone()).await;

        let mut service_manager =
            Self::create_service_manager(&config, state, gate, shutdown_tx.clone());
        let handles = service_manager.start_all().await?;

        Self::display_service_info(&config, &service_manager);

        for handle in handles {
            if let Err(e) = handle.await {
                error!("Service task terminated unexpectedly: {}", e);
                let _ = shutdown_tx.send(());
            }
        }
        service_manager.stop_all().await?;
        reaper.shutdown().await;

        info!("🛑 所有服务已安全关闭");
        Ok(())
    }

    /// 创建服务管理器并注册指标
    fn create_service_manager(
        config: &AppConfig,
        state: RegistryState,
        gate: AdmissionGate,
        shutdown_tx: tokio::sync::broadcast::Sender<()>,
    ) -> ServiceManager {
        let metrics_registry = &addrbook_common::metrics::REGISTRY;
        if let Err(e) = addrbook_common::metrics::register_metrics() {
            warn!(
                "Prometheus metrics registration warning (may already be registered): {}",
                e
            );
        }
        if let Err(e) = registry::register_registry_metrics(metrics_registry) {
            warn!(
                "Registry metrics registration warning (may already be registered): {}",
                e
            );
        }
        info!("✅ Prometheus metrics registry 初始化成功");

        let mut service_manager = ServiceManager::new(config.clone(), shutdown_tx);
        service_manager.add_service(Box::new(RegistryHttpService::new(config, state, gate)));
        service_manager
    }

    /// 显示服务信息
    fn display_service_info(config: &AppConfig, manager: &ServiceManager) {
        let port = manager
            .local_addr()
            .map(|addr| addr.port())
            .unwrap_or(config.bind.http.port);
        let http_url = format!("http://{}:{}", config.bind.http.domain_name, port);

        info!("✅ 所有服务已启动");
        info!("📡 HTTP 服务器监听在: {}", http_url);
        info!("🔧 可用的API端点:");
        info!("  - {}/users/create (public)", http_url);
        info!("  - {}/users/login (public)", http_url);
        info!("  - {}/users/get (signed)", http_url);
        info!("  - {}/address/create (signed)", http_url);
        info!("  - {}/address/update (signed)", http_url);
        info!("  - {}/health", http_url);
        info!("  - {}/metrics", http_url);
    }
}

/// 设置Ctrl-C信号处理程序
async fn setup_ctrl_c_handler(shutdown_tx: tokio::sync::broadcast::Sender<()>) {
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("无法监听Ctrl-C信号: {}", e);
            return;
        }
        info!("收到Ctrl-C信号，开始优雅关闭...");
        let _ = shutdown_tx.send(());
    });
}
