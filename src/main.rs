use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use opsangel::config::Config;
use opsangel::{gateway, observability, wechat};
use std::path::PathBuf;

/// `opsangel` - WeChat Official-Account ops assistant.
#[derive(Parser, Debug)]
#[command(name = "opsangel")]
#[command(author = "xzdbd")]
#[command(version = opsangel::VERSION)]
#[command(about = "WeChat webhook for search, Docker Cloud and transit directions.", long_about = None)]
struct Cli {
    /// Config file; defaults to the platform config dir.
    #[arg(long, global = true, env = "OPSANGEL_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the webhook server
    Serve {
        /// Bind address (overrides gateway.host)
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on (overrides gateway.port)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Print the effective configuration with secrets redacted
    Config,

    /// Print the handshake signature the platform would send
    Signature { timestamp: String, nonce: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_deref())?;
    observability::init_tracing(&config.observability.log_level);
    if config.file_exists() {
        tracing::info!("config loaded from {}", config.config_path.display());
    } else {
        tracing::info!(
            "config file {} not found, using defaults",
            config.config_path.display()
        );
    }

    match cli.command {
        Commands::Serve { host, port } => {
            if let Some(host) = host {
                config.gateway.host = host;
            }
            if let Some(port) = port {
                config.gateway.port = port;
            }
            gateway::run_gateway(&config).await
        }
        Commands::Config => {
            let rendered = toml::to_string_pretty(&config.redacted())
                .context("failed to render config")?;
            println!("# {}", config.config_path.display());
            print!("{rendered}");
            Ok(())
        }
        Commands::Signature { timestamp, nonce } => {
            println!(
                "{}",
                wechat::compute_signature(&config.wechat.token, &timestamp, &nonce)
            );
            Ok(())
        }
    }
}
