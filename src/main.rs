use std::{io, path::PathBuf, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{error, info};

use sorting_hat::{
    chat, constants, tui,
    web_server::{self, WebConfig},
    ApiConfig, ChatTransport, FlowController, HttpChatTransport,
};

// Define the command-line interface structure using clap
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(flatten)]
    api: ApiArgs,

    #[command(subcommand)]
    command: Commands,
}

/// Where the hat's replies come from.
#[derive(Args, Debug)]
struct ApiArgs {
    #[arg(long, global = true, default_value = constants::API_KEY.as_str(), hide_default_value = true, help = "Bearer token for the chat-completion endpoint [env: SORTING_HAT_API_KEY].")]
    api_key: String,
    #[arg(long, global = true, default_value = constants::API_URL.as_str(), help = "Chat-completion endpoint URL [env: SORTING_HAT_API_URL].")]
    api_url: String,
    #[arg(long, global = true, default_value = constants::API_MODEL.as_str(), help = "Model name sent with every request [env: SORTING_HAT_MODEL].")]
    model: String,
    #[arg(long, global = true, help = "Give up on a request after this many seconds.")]
    timeout_secs: Option<u64>,
}

impl From<ApiArgs> for ApiConfig {
    fn from(args: ApiArgs) -> Self {
        ApiConfig {
            endpoint: args.api_url,
            api_key: args.api_key,
            model: args.model,
            timeout: args.timeout_secs.map(Duration::from_secs),
        }
    }
}

// Define the available subcommands
#[derive(Subcommand, Debug)]
enum Commands {
    /// Meet the Sorting Hat in a full-screen terminal UI.
    Play,
    /// Serve the Sorting Hat as a web page.
    Serve {
        #[arg(long, default_value_t = 9900, help = "Port for the web server.")]
        port: u16,
        #[arg(long, default_value = "templates", help = "Directory holding index.html.")]
        templates: PathBuf,
        #[arg(long, default_value = "static", help = "Directory served under /static.")]
        static_dir: PathBuf,
    },
    /// Talk to the Sorting Hat line by line on stdin/stdout.
    Chat,
}

fn init_stderr_logging() {
    // Reads log level from RUST_LOG (e.g. RUST_LOG=info,sorting_hat=debug)
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (for the API key and endpoint)
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // The TUI owns the terminal, so it logs to a file instead
    let _log_guard = match cli.command {
        Commands::Play => {
            let file_appender = tracing_appender::rolling::never(".", "sorting-hat.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            tracing_subscriber::fmt()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_env_filter(
                    tracing_subscriber::EnvFilter::try_from_default_env()
                        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("sorting_hat=debug")),
                )
                .init();
            Some(guard)
        }
        _ => {
            init_stderr_logging();
            None
        }
    };

    info!("Sorting hat starting with command: {:?}", cli.command);

    let config = ApiConfig::from(cli.api);
    info!(?config, "Using chat-completion endpoint");
    let transport: Arc<dyn ChatTransport> =
        Arc::new(HttpChatTransport::new(config).context("Failed to build HTTP client")?);
    let flow = FlowController::default();

    match cli.command {
        Commands::Play => {
            if let Err(e) = tui::run(flow, transport).await {
                error!("Terminal UI failed: {:?}", e);
                return Err(e);
            }
        }
        Commands::Serve {
            port,
            templates,
            static_dir,
        } => {
            let config = WebConfig {
                port,
                templates_dir: templates,
                static_dir,
            };
            tokio::select! {
                res = web_server::start_web_server(config, flow, transport) => {
                    if let Err(e) = res {
                        error!("Web server failed: {:?}", e);
                        return Err(e);
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Ctrl-C received, shutting down");
                }
            }
        }
        Commands::Chat => {
            let mut flow = flow;
            let stdin = io::stdin();
            let mut stdout = io::stdout();
            let house = chat::run_chat(&mut flow, transport.as_ref(), stdin.lock(), &mut stdout)
                .await
                .context("Chat session failed")?;
            info!(?house, "Chat session finished");
        }
    }

    Ok(())
}
