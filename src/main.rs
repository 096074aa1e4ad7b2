//! # Career Connect 主程序
//!
//! 运维入口：启动令牌刷新服务、查看已配置的提供商、生成加密密钥。

use career_connect::{
    AppContext, Result,
    config::{self, TokenCrypto},
    lerror, linfo,
    logging::{self, LogComponent, LogStage},
    provider::ProviderRegistry,
};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "career-connect", about = "OAuth token lifecycle service", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Run migrations and the background refresh task until ctrl-c.
    Serve,
    /// List providers with configured credentials.
    Providers,
    /// Print a new random value for TOKEN_ENCRYPTION_SECRET.
    GenerateSecret,
    /// Show RUST_LOG examples.
    LoggingHelp,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve => {
            logging::init_logging(Some(&cli.log_level));
            if let Err(e) = serve().await {
                lerror!(
                    "system",
                    LogStage::Startup,
                    LogComponent::Main,
                    "service_start_failed",
                    &format!("服务启动失败: {e}")
                );
                std::process::exit(1);
            }
        }
        Commands::Providers => {
            let config = config::load_config()?;
            let registry = ProviderRegistry::from_env(&config.oauth.public_base_url);
            if registry.is_empty() {
                println!("未配置任何提供商凭据");
            }
            for provider_id in registry.list_available() {
                println!("{provider_id}");
            }
        }
        Commands::GenerateSecret => println!("{}", TokenCrypto::generate_secret()),
        Commands::LoggingHelp => logging::print_logging_help(),
    }
    Ok(())
}

async fn serve() -> Result<()> {
    linfo!(
        "system",
        LogStage::Startup,
        LogComponent::Main,
        "service_starting",
        "服务启动"
    );

    let config = config::load_config()?;
    let context = AppContext::initialize(config).await?;

    let cancel = CancellationToken::new();
    let refresh_task = context.start_refresh_task(cancel.clone());

    tokio::signal::ctrl_c()
        .await
        .map_err(|e| career_connect::ConnectError::internal_with_source("等待退出信号失败", e))?;

    cancel.cancel();
    if let Some(task) = refresh_task {
        task.shutdown().await;
    }

    linfo!(
        "system",
        LogStage::Shutdown,
        LogComponent::Main,
        "service_shutdown",
        "服务正常关闭"
    );
    Ok(())
}
