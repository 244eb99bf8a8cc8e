//! # aitest
//!
//! Runs named prompt templates against JSON test cases on OpenAI and
//! Anthropic models and writes a timestamped report of every response.

mod cases;
mod cli;
mod config;
mod llm;
mod tester;
mod utils;

use clap::Parser;
use cli::{Cli, Commands};
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // RUST_LOG controls verbosity, e.g. RUST_LOG=aitest=debug
    fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli_args = Cli::parse();

    match cli_args.into_command() {
        Commands::Run(args) => {
            if let Err(e) = cli::handle_run(args).await {
                eprintln!("Error running tests: {:?}", e);
                std::process::exit(1);
            }
        }
        Commands::Configure(args) => {
            if let Err(e) = cli::handle_configure(args).await {
                eprintln!("Error configuring API keys: {:?}", e);
                std::process::exit(1);
            }
        }
        Commands::ShowConfig(args) => {
            if let Err(e) = cli::handle_show_config(args).await {
                eprintln!("Error showing config: {:?}", e);
                std::process::exit(1);
            }
        }
        Commands::List(args) => {
            if let Err(e) = cli::handle_list(args).await {
                eprintln!("Error listing prompts: {:?}", e);
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
