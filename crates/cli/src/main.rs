use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use lib::channels::WebhookPayload;
use lib::config::Config;
use lib::digest::{BotResponse, Digester};
use lib::lang::Lang;
use lib::media::HttpMediaFetcher;
use lib::session::Session;

#[derive(Parser)]
#[command(name = "msgbridge")]
#[command(about = "Messenger to conversational-bot bridge", long_about = None)]
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
        /// Config file path (default: MSGBRIDGE_CONFIG_PATH or ~/.msgbridge/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,
    },

    /// Run the webhook gateway.
    Serve {
        /// Config file path (default: MSGBRIDGE_CONFIG_PATH or ~/.msgbridge/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,

        /// HTTP port (default from config or 8080)
        #[arg(long, short)]
        port: Option<u16>,
    },

    /// Print the Messenger payloads a bot response JSON file renders into.
    Render {
        /// Bot response JSON (an `answers` batch or a single message)
        file: PathBuf,

        /// Config file path (default: MSGBRIDGE_CONFIG_PATH or ~/.msgbridge/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,
    },

    /// Print the bot requests a webhook JSON file digests into, starting from an empty session.
    Digest {
        /// Messenger webhook body
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Version) => {
            println!("msgbridge {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Init { config }) => {
            if let Err(e) = run_init(config) {
                log::error!("init failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Serve { config, port }) => {
            if let Err(e) = run_serve(config, port).await {
                log::error!("serve failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Render { file, config }) => {
            if let Err(e) = run_render(file, config) {
                log::error!("render failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Digest { file }) => {
            if let Err(e) = run_digest(file).await {
                log::error!("digest failed: {:#}", e);
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
    let (mut config, path) = lib::config::load_config(config_path)?;
    if let Some(p) = port {
        config.gateway.port = p;
    }
    log::info!("starting gateway on {}:{}", config.gateway.bind, config.gateway.port);
    lib::gateway::run_gateway(config, path).await
}

/// Digester for offline commands; media downloads go over HTTP like the gateway's.
fn offline_digester(config: &Config) -> anyhow::Result<Digester> {
    let lang = Lang::load(&config.conversation.lang, &config.translations)
        .with_context(|| format!("loading language '{}'", config.conversation.lang))?;
    Ok(Digester::new(
        config.digester.clone(),
        Arc::new(lang),
        Arc::new(HttpMediaFetcher::new()),
    ))
}

fn read_json(file: &PathBuf) -> anyhow::Result<serde_json::Value> {
    let s = std::fs::read_to_string(file).with_context(|| format!("reading {}", file.display()))?;
    serde_json::from_str(&s).with_context(|| format!("parsing {}", file.display()))
}

fn run_render(file: PathBuf, config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let (config, _) = lib::config::load_config(config_path)?;
    let digester = offline_digester(&config)?;
    let response = BotResponse::from_value(read_json(&file)?)?;
    let mut session = Session::new();
    let payloads = digester.digest_from_api(&response, "", &mut session);
    println!("{}", serde_json::to_string_pretty(&payloads)?);
    Ok(())
}

async fn run_digest(file: PathBuf) -> anyhow::Result<()> {
    let digester = offline_digester(&Config::default())?;
    let payload: WebhookPayload = serde_json::from_value(read_json(&file)?)
        .with_context(|| format!("{} is not a webhook body", file.display()))?;
    let mut session = Session::new();
    let requests = digester.digest_to_api(&payload, &mut session).await?;
    let values: Vec<serde_json::Value> = requests.iter().map(|r| r.to_value()).collect();
    println!("{}", serde_json::to_string_pretty(&values)?);
    Ok(())
}
