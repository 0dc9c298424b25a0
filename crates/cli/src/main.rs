use clap::{Parser, Subcommand};
use lib::client::{ChatSession, Poller, RelayClient, TurnOutcome};

#[derive(Parser)]
#[command(name = "agency-chat")]
#[command(about = "Agency chat relay CLI", long_about = None)]
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
        /// Config file path (default: AGENCY_CHAT_CONFIG_PATH or ~/.agency-chat/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,
    },

    /// Run the relay gateway (chat dispatch, webhook callback, poll, lead notification).
    Gateway {
        /// Config file path (default: AGENCY_CHAT_CONFIG_PATH or ~/.agency-chat/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,

        /// HTTP port (default from config or 15151)
        #[arg(long, short)]
        port: Option<u16>,
    },

    /// Chat through a running gateway (interactive).
    Chat {
        /// Config file path (default: AGENCY_CHAT_CONFIG_PATH or ~/.agency-chat/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,

        /// Gateway URL (default: http://<gateway.bind>:<gateway.port> from config)
        #[arg(long, value_name = "URL")]
        url: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Version) => {
            println!("agency-chat {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Init { config }) => {
            if let Err(e) = run_init(config) {
                log::error!("init failed: {}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Gateway { config, port }) => {
            if let Err(e) = run_gateway(config, port).await {
                log::error!("gateway failed: {}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Chat { config, url }) => {
            if let Err(e) = run_chat(config, url).await {
                log::error!("chat failed: {}", e);
                std::process::exit(1);
            }
        }
        None => {
            println!("Run with --help for usage");
        }
    }
}

fn run_init(config_path: Option<std::path::PathBuf>) -> anyhow::Result<()> {
    let path = config_path.unwrap_or_else(lib::config::default_config_path);
    let dir = lib::init::init_config_dir(&path)?;
    println!("initialized configuration at {}", dir.display());
    Ok(())
}

async fn run_gateway(
    config_path: Option<std::path::PathBuf>,
    port: Option<u16>,
) -> anyhow::Result<()> {
    let (mut config, path) = lib::config::load_config(config_path)?;
    if let Some(p) = port {
        config.gateway.port = p;
    }
    log::info!(
        "starting gateway on {}:{} (config {})",
        config.gateway.bind,
        config.gateway.port,
        path.display()
    );
    lib::gateway::run_gateway(config).await
}

async fn run_chat(
    config_path: Option<std::path::PathBuf>,
    url: Option<String>,
) -> anyhow::Result<()> {
    use std::io::{self, Write};

    let base_url = match url {
        Some(u) => u,
        None => {
            let (config, _) = lib::config::load_config(config_path)?;
            config.gateway.local_url()
        }
    };
    let client = RelayClient::new(base_url);
    let poller: Poller = Poller::default();
    let mut session = ChatSession::new();
    log::info!("chatting via {} (session {})", client.base_url(), session.id());

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        write!(stdout, "> ")?;
        stdout.flush()?;
        let mut line = String::new();
        if stdin.read_line(&mut line)? == 0 {
            break;
        }
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if input.eq_ignore_ascii_case("/exit") || input.eq_ignore_ascii_case("/quit") {
            break;
        }

        let outcome = session.send(&client, &poller, input).await;
        println!("< {}", outcome.text().trim());
        if let TurnOutcome::Replied { reply, goodbye, .. } = &outcome {
            if let Some(buttons) = &reply.buttons {
                let labels: Vec<String> = buttons.iter().map(|b| format!("[{}]", b.label)).collect();
                println!("  {}", labels.join(" "));
            }
            if *goodbye {
                break;
            }
        }
    }

    Ok(())
}
