use clap::{Parser, Subcommand};
use relay::nlu::{DialogflowClient, Platform};

#[derive(Parser)]
#[command(name = "relay")]
#[command(about = "Chat relay: Messenger and Telegram to Dialogflow", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Write a default config file if none exists.
    Init {
        /// Config file path (default: RELAY_CONFIG_PATH or ~/.relay/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,
    },

    /// Run the gateway: Messenger webhook, Telegram long-poll, Dialogflow relay.
    Serve {
        /// Config file path (default: RELAY_CONFIG_PATH or ~/.relay/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,

        /// HTTP port (default from PORT env, config, or 3000)
        #[arg(long, short)]
        port: Option<u16>,
    },

    /// Send one text to Dialogflow and print the messages the relay would send.
    Ask {
        /// Text to send.
        text: String,

        /// Platform whose rendering to plan for (telegram or facebook).
        #[arg(long, default_value = "telegram")]
        platform: Platform,

        /// Session token to reuse (default: a fresh one).
        #[arg(long, value_name = "ID")]
        session: Option<String>,

        /// Config file path (default: RELAY_CONFIG_PATH or ~/.relay/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Version) => {
            println!("relay {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Init { config }) => {
            if let Err(e) = run_init(config) {
                log::error!("init failed: {}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Serve { config, port }) => {
            if let Err(e) = run_serve(config, port).await {
                log::error!("gateway failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Ask {
            text,
            platform,
            session,
            config,
        }) => {
            if let Err(e) = run_ask(config, text, platform, session).await {
                log::error!("ask failed: {:#}", e);
                std::process::exit(1);
            }
        }
        None => {
            println!("Run with --help for usage");
        }
    }
}

fn run_init(config_path: Option<std::path::PathBuf>) -> anyhow::Result<()> {
    let path = config_path.unwrap_or_else(relay::config::default_config_path);
    if relay::config::init_config_file(&path)? {
        println!("initialized configuration at {}", path.display());
    } else {
        println!("configuration already exists at {}", path.display());
    }
    Ok(())
}

async fn run_serve(
    config_path: Option<std::path::PathBuf>,
    port: Option<u16>,
) -> anyhow::Result<()> {
    let (mut config, path) = relay::config::load_config(config_path)?;
    if let Some(p) = port {
        config.gateway.port = p;
    }
    log::info!(
        "starting gateway on {}:{} (config {})",
        config.gateway.bind,
        config.gateway.port,
        path.display()
    );
    relay::gateway::run_gateway(config).await
}

/// Session token for `ask`: the given one, or a fresh uuid.
fn ask_session(session: Option<String>) -> String {
    session.unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
}

async fn run_ask(
    config_path: Option<std::path::PathBuf>,
    text: String,
    platform: Platform,
    session: Option<String>,
) -> anyhow::Result<()> {
    let (config, _) = relay::config::load_config(config_path)?;
    let client = DialogflowClient::new(&config.nlu);
    let session = ask_session(session);
    let response = client.detect_intent(&text, &session, platform).await?;
    log::debug!("ask: {:?}", response);
    let planned = relay::dispatch::plan(&response, platform);
    println!("{}", serde_json::to_string_pretty(&planned)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ask_session_is_fresh_unless_given() {
        let a = ask_session(None);
        let b = ask_session(None);
        assert_ne!(a, b);
        assert!(uuid::Uuid::parse_str(&a).is_ok());
        assert_eq!(ask_session(Some("kept".to_string())), "kept");
    }
}
