//! Cirrus CLI: a cloud infrastructure agent with on-demand MCP tools.

mod remote;
mod render;

use std::io::{self, BufRead, Write};
use std::sync::Arc;

use anyhow::{Context, Result};
use cirrus_api::ChatProvider;
use cirrus_config::{CirrusConfig, CliOverrides};
use cirrus_core::{Driver, Mode, Session};
use cirrus_server::AppState;
use cirrus_tools::{Catalog, McpLauncher, ToolManager};
use cirrus_types::Usage;
use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

const DEFAULT_REMOTE_URL: &str = "http://127.0.0.1:8000";

#[derive(Parser)]
#[command(
    name = "cirrus",
    version,
    about = "A cloud infrastructure agent with on-demand MCP tools"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Enable verbose/debug logging
    #[arg(long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    /// Azure OpenAI deployment (overrides AZURE_DEPLOYMENT_NAME)
    #[arg(long, global = true)]
    deployment: Option<String>,

    /// Never start MCP tool providers
    #[arg(long, global = true)]
    no_tools: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP relay and chat page
    Serve {
        /// Address to listen on (overrides CIRRUS_BIND)
        #[arg(long)]
        bind: Option<String>,
        /// Orchestration mode: single, pipeline or team
        #[arg(long)]
        mode: Option<Mode>,
    },
    /// Interactive chat in the terminal (default)
    Chat {
        #[arg(long)]
        mode: Option<Mode>,
    },
    /// Send a single prompt and print the response
    Ask {
        prompt: String,
        #[arg(long)]
        mode: Option<Mode>,
    },
    /// Chat with a running relay
    Remote {
        #[arg(long, default_value = DEFAULT_REMOTE_URL)]
        url: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Command::Chat { mode: None });

    let default_level = match (&command, cli.verbose) {
        (_, true) => "debug",
        (Command::Serve { .. }, false) => "info",
        _ => "warn",
    };
    init_logging(default_level, cli.json_logs);

    let overrides = |mode: Option<Mode>, bind: Option<String>| CliOverrides {
        deployment: cli.deployment.clone(),
        mode,
        bind,
        disable_tools: cli.no_tools,
    };

    match command {
        Command::Serve { bind, mode } => serve(load_config(overrides(mode, bind))?).await,
        Command::Chat { mode } => chat(load_config(overrides(mode, None))?).await,
        Command::Ask { prompt, mode } => ask(load_config(overrides(mode, None))?, &prompt).await,
        Command::Remote { url } => remote::run(&url).await,
    }
}

fn init_logging(default_level: &str, json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_config(overrides: CliOverrides) -> Result<CirrusConfig> {
    CirrusConfig::load(overrides).context("Failed to load configuration")
}

fn build_driver(config: &CirrusConfig) -> Result<Driver> {
    let provider = ChatProvider::new(&config.api_key, &config.endpoint, config.flavor.clone())
        .context("Failed to create chat client")?
        .with_retry_config(config.retry_config());
    Ok(Driver::new(
        config.mode,
        Arc::new(provider),
        config.agent_settings(),
    ))
}

fn new_session(config: &CirrusConfig) -> Session {
    let tools = ToolManager::new(
        Arc::new(Catalog::builtin(&config.catalog)),
        Arc::new(McpLauncher),
    )
    .with_enabled(config.tools_enabled)
    .with_default_category(config.default_category.clone());
    Session::new(tools)
}

async fn serve(config: CirrusConfig) -> Result<()> {
    let driver = build_driver(&config)?;
    let state = AppState::new(
        driver,
        Arc::new(Catalog::builtin(&config.catalog)),
        Arc::new(McpLauncher),
    )
    .with_tools_enabled(config.tools_enabled)
    .with_default_category(config.default_category.clone())
    .with_idle_timeout(config.session_idle_timeout);

    let listener = TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind))?;
    eprintln!(
        "cirrus v{} relay on http://{} ({} mode, model: {})",
        env!("CARGO_PKG_VERSION"),
        config.bind,
        config.mode,
        config.model
    );

    cirrus_server::serve(
        listener,
        Arc::new(state),
        &config.frontend_origins,
        async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutting down");
        },
    )
    .await
    .context("Relay server failed")
}

async fn ask(config: CirrusConfig, prompt: &str) -> Result<()> {
    let driver = build_driver(&config)?;
    let mut session = new_session(&config);
    let result = run_turn(&driver, &mut session, prompt).await;
    session.shutdown().await;
    render::print_usage(&result?);
    Ok(())
}

async fn chat(config: CirrusConfig) -> Result<()> {
    let driver = build_driver(&config)?;
    let mut session = new_session(&config);
    let mut total = Usage::default();

    eprintln!(
        "cirrus v{} ({} mode, model: {}, session: {})",
        env!("CARGO_PKG_VERSION"),
        config.mode,
        config.model,
        session.id()
    );
    eprintln!("Type your message. Commands: tools, /clear, exit. Ctrl+C cancels a turn.\n");

    let stdin = io::stdin();
    loop {
        eprint!("> ");
        io::stderr().flush()?;

        let mut input = String::new();
        let bytes_read = stdin.lock().read_line(&mut input)?;
        if bytes_read == 0 {
            eprintln!();
            break;
        }

        let input = input.trim();
        match input {
            "" => continue,
            "exit" | "quit" | "/exit" | "/quit" => break,
            "tools" | "/tools" => {
                eprintln!("{}", session.tools.summary());
                continue;
            }
            "/clear" => {
                session.conversation.clear();
                eprintln!("Conversation cleared.");
                continue;
            }
            _ => {}
        }

        match run_turn(&driver, &mut session, input).await {
            Ok(usage) => total.add(&usage),
            Err(e) => eprintln!("\nError: {e:#}"),
        }
        println!();
    }

    session.shutdown().await;
    render::print_usage(&total);
    Ok(())
}

/// Answer one prompt, streaming to the terminal. Ctrl+C cancels the turn.
async fn run_turn(driver: &Driver, session: &mut Session, prompt: &str) -> Result<Usage> {
    let cancel = CancellationToken::new();
    let interrupt = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        })
    };

    let result = driver
        .respond(session, prompt, &cancel, render::agent_event)
        .await;
    interrupt.abort();
    Ok(result?)
}
