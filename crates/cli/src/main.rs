use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "lineplate")]
#[command(about = "LINE licence plate reader", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Create the configuration directory and a default config file.
    Init {
        /// Config file path (default: LINEPLATE_CONFIG_PATH or ~/.lineplate/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,
    },

    /// Run the webhook gateway (POST /callback, GET / health).
    Serve {
        /// Config file path (default: LINEPLATE_CONFIG_PATH or ~/.lineplate/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,

        /// HTTP port (default from PORT env, config, or 5000)
        #[arg(long, short)]
        port: Option<u16>,
    },

    /// Print the X-Line-Signature for a request body, for local testing.
    Sign {
        /// File holding the exact request body
        #[arg(value_name = "BODY_FILE")]
        body: PathBuf,

        /// Config file path (default: LINEPLATE_CONFIG_PATH or ~/.lineplate/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Version) => {
            println!("lineplate {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Init { config }) => {
            if let Err(e) = run_init(config) {
                log::error!("init failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Serve { config, port }) => {
            if let Err(e) = run_serve(config, port).await {
                log::error!("gateway failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Sign { body, config }) => {
            if let Err(e) = run_sign(body, config) {
                log::error!("sign failed: {:#}", e);
                std::process::exit(1);
            }
        }
        None => {
            println!("Run with --help for usage");
        }
    }
}

fn run_init(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let path = config_path.unwrap_or_else(lib::config::default_config_path);
    let dir = lib::init::init_config_dir(&path)?;
    println!("initialized configuration at {}", dir.display());
    Ok(())
}

async fn run_serve(config_path: Option<PathBuf>, port: Option<u16>) -> anyhow::Result<()> {
    let (config, path) = lib::config::load_config(config_path)?;
    log::info!("using config {}", path.display());
    lib::gateway::run_gateway(config, port).await
}

fn run_sign(body_path: PathBuf, config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let (config, _) = lib::config::load_config(config_path)?;
    let secret = lib::config::resolve_channel_secret(&config)
        .context("channel secret missing (set CHANNEL_SECRET or line.channelSecret)")?;
    let body = std::fs::read(&body_path)
        .with_context(|| format!("reading {}", body_path.display()))?;
    let verifier = lib::gateway::SignatureVerifier::new(&secret)
        .map_err(|e| anyhow::anyhow!("invalid channel secret: {}", e))?;
    println!("{}", verifier.sign(&body));
    Ok(())
}
