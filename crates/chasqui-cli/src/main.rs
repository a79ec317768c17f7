use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "chasqui",
    version,
    about = "chasqui - business messaging hub"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the gateway server
    Start {
        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Port to listen on
        #[arg(long, default_value = "3000")]
        port: u16,
    },

    /// Show current status
    Status,

    /// Create the config and data directories
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level)),
        )
        .init();

    let config_loader = chasqui_config::ConfigLoader::new()?;
    let config = config_loader.load()?;
    config_loader.ensure_dirs(&config)?;

    match cli.command {
        Commands::Start { host, port } => {
            let mut config = config;
            config.gateway.host = host;
            config.gateway.port = port;

            let data_dir = config_loader.data_dir(&config);
            let server = chasqui_gateway::GatewayServer::new(config, data_dir);
            server.run().await?;
        }
        Commands::Status => {
            let url = format!(
                "http://{}:{}/api/status",
                config.gateway.host, config.gateway.port
            );

            let resp = reqwest::get(&url).await.map_err(|_| {
                anyhow::anyhow!(
                    "Gateway is not running at {}:{}",
                    config.gateway.host,
                    config.gateway.port
                )
            })?;

            let body = resp.json::<serde_json::Value>().await?;
            println!("{}", serde_json::to_string_pretty(&body)?);
        }
        Commands::Init => {
            println!("chasqui setup");
            println!("Config directory: {}", config_loader.config_dir().display());
            println!(
                "Data directory: {}",
                config_loader.data_dir(&config).display()
            );
            println!("Directories created. Edit config.yml to add provider credentials.");
        }
    }

    Ok(())
}
