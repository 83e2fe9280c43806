mod config;
mod console;
mod error;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use runtime::{CapabilityKind, Directory, Session, Sink};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use config::Config;
use console::Console;
use error::Result;

#[derive(Parser)]
#[command(name = "conduit")]
#[command(about = "Chat with a language model that can call MCP tools", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to the configuration file [default: ./conduit.toml]
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start an interactive chat session
    Chat,
    /// List the tools and resources the capability server offers
    Capabilities,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

/// `RUST_LOG` wins over `-v` when set.
fn init_tracing(verbose: u8) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(match verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        })
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = Config::discover(cli.config.as_deref())?;
    config.apply_env(|key| std::env::var(key).ok());

    match cli.command {
        Some(Commands::Chat) | None => cmd_chat(&config).await,
        Some(Commands::Capabilities) => cmd_capabilities(&config).await,
    }
}

async fn cmd_chat(config: &Config) -> Result<()> {
    let backend = config.backend()?;
    let server = mcp::Server::connect(config.server()).await?;

    let mut console = Console::stdio();
    console.system(&format!("conduit v{}", env!("CARGO_PKG_VERSION")));
    console.system(&format!("Model: {backend}"));

    let mut session = Session::connect(backend, server, config.session()).await?;
    info!(
        capabilities = session.directory().len(),
        "connected to capability server"
    );
    console.system("Type 'quit' or 'exit' (or Ctrl+D) to leave.");

    let outcome = session.run(&mut console).await;

    if let Err(e) = session.into_transport().shutdown().await {
        warn!(error = %e, "capability server did not shut down cleanly");
    }
    outcome?;
    Ok(())
}

async fn cmd_capabilities(config: &Config) -> Result<()> {
    let server = mcp::Server::connect(config.server()).await?;
    let directory = Directory::load(&server, &config.session().resource_scheme).await;
    server.shutdown().await?;
    print_directory(&directory?);
    Ok(())
}

fn print_directory(directory: &Directory) {
    if directory.is_empty() {
        println!("No capabilities offered.");
        return;
    }

    for capability in directory.iter() {
        let kind = match capability.kind() {
            CapabilityKind::Tool => "tool",
            CapabilityKind::Resource => "resource",
        };
        println!("{kind:<9} {}  {}", capability.name, capability.description);
        for param in capability.schema.params() {
            let required = if param.required { "" } else { " (optional)" };
            println!(
                "            {}: {}{required}  {}",
                param.name,
                param.ty.as_str(),
                param.description
            );
        }
    }
}
