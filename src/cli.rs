//! # CLI Module
//!
//! Handles command-line argument parsing and dispatching to appropriate handlers.
//! Running without a subcommand executes the test run.

use crate::cases::{load_prompts, load_test_cases, DEFAULT_CASES_DIR, DEFAULT_PROMPTS_FILE};
use crate::config::{mask_key, Config, DEFAULT_CONFIG_FILE};
use crate::llm::{ClientRegistry, Provider};
use crate::tester::selection::{interactive_select, resolve_requested};
use crate::tester::{PromptTester, RunReport};
use crate::utils::formatters::ReportFormat;
use crate::utils::report_recorder::{ReportRecorder, DEFAULT_OUTPUT_DIR};
use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::io::IsTerminal;
use std::path::PathBuf;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(args_conflicts_with_subcommands = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
    #[command(flatten)]
    pub run: RunArgs,
}

impl Cli {
    /// The subcommand to dispatch; a bare invocation is a run.
    pub fn into_command(self) -> Commands {
        self.command.unwrap_or(Commands::Run(self.run))
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the prompt tests (the default when no subcommand is given)
    Run(RunArgs),
    /// Enter API keys and save them to the config file
    Configure(ConfigureArgs),
    /// Show current configuration settings
    ShowConfig(ShowConfigArgs),
    /// List prompts and how many test cases each has
    List(ListArgs),
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Path to the credentials file
    #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,
    /// Path to the prompt definitions
    #[arg(long, default_value = DEFAULT_PROMPTS_FILE)]
    pub prompts: PathBuf,
    /// Directory of test case files
    #[arg(long, default_value = DEFAULT_CASES_DIR)]
    pub cases_dir: PathBuf,
    /// Directory for result logs
    #[arg(long, default_value = DEFAULT_OUTPUT_DIR)]
    pub output_dir: PathBuf,
    /// Prompt to run; repeat to run several. Skips the selection menu.
    #[arg(short, long = "prompt", value_name = "NAME")]
    pub prompt: Vec<String>,
    /// Run every prompt without asking
    #[arg(short, long)]
    pub all: bool,
    /// Report format
    #[arg(short, long, value_enum, default_value_t = ReportFormat::Html)]
    pub format: ReportFormat,
    /// Hide progress bars
    #[arg(short, long)]
    pub quiet: bool,
}

#[derive(Args, Debug)]
pub struct ConfigureArgs {
    #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,
}

#[derive(Args, Debug)]
pub struct ShowConfigArgs {
    #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,
}

#[derive(Args, Debug)]
pub struct ListArgs {
    #[arg(long, default_value = DEFAULT_PROMPTS_FILE)]
    pub prompts: PathBuf,
    #[arg(long, default_value = DEFAULT_CASES_DIR)]
    pub cases_dir: PathBuf,
}

/// Runs the selected prompts and returns the path of the written report.
pub async fn handle_run(args: RunArgs) -> anyhow::Result<PathBuf> {
    info!("Initializing test environment...");
    let config = Config::load(&args.config)?;
    info!("Configuration loaded from {}", args.config.display());
    run_with_config(args, config).await
}

async fn run_with_config(args: RunArgs, config: Config) -> anyhow::Result<PathBuf> {
    info!("Loading prompts and test cases...");
    let prompts = load_prompts(&args.prompts)?;
    let cases = load_test_cases(&args.cases_dir)?;

    let selected = if !args.prompt.is_empty() {
        resolve_requested(&prompts, &args.prompt)?
    } else if args.all || !std::io::stdin().is_terminal() {
        resolve_requested(&prompts, &[])?
    } else {
        let names: Vec<String> = prompts.iter().map(|p| p.name.clone()).collect();
        interactive_select(&names)?
    };
    info!("Running tests for: {}", selected.join(", "));

    let clients = ClientRegistry::from_config(&config)?;
    if clients.is_empty() {
        bail!(
            "No API keys configured in {} or the environment",
            args.config.display()
        );
    }
    let recorder = ReportRecorder::new(&args.output_dir)?;
    info!("Results will be written to {}", recorder.output_dir().display());

    let tester = PromptTester::new(clients, &config).with_progress(!args.quiet);
    let report = tester.run_all(&prompts, &cases, &selected).await;

    info!("All tests finished, saving results...");
    let report_path = recorder.record(&report, args.format)?;

    print_summary(&report, &report_path);
    Ok(report_path)
}

fn print_summary(report: &RunReport, report_path: &std::path::Path) {
    let failures = report.failures();

    println!("\n--- Test Run Summary ---");
    println!("Prompts: {}", report.prompts.len());
    println!("Test Cases: {}", report.total_cases());
    println!("Succeeded: {}", report.total_cases() - failures.len());
    println!("Failed: {}", failures.len());
    println!("Average Response Time: {:.2}s", report.average_response_secs());
    println!("Total Tokens Used: {}", report.total_tokens());
    if !failures.is_empty() {
        println!("\nFailures:");
        for case in &failures {
            println!(
                "  [{}] {} (ID: {}): {}",
                case.prompt_name,
                case.case_name,
                case.case_id,
                case.output_text()
            );
        }
    }
    println!("\nReport: {}", report_path.display());
}

pub async fn handle_configure(args: ConfigureArgs) -> anyhow::Result<()> {
    let mut config = Config::load_or_default(&args.config)?;
    let mut rl = DefaultEditor::new().context("Failed to create line editor")?;

    println!("Configuring API keys in {}", args.config.display());
    println!("Leave a value empty to keep the current key.");

    for provider in Provider::ALL {
        let current = config
            .api_key(provider)
            .map(|k| mask_key(&k))
            .unwrap_or_else(|| "not set".to_string());
        let prompt = format!("{} API key [{}]: ", provider, current);
        match rl.readline(&prompt) {
            Ok(line) => {
                let key = line.trim();
                if !key.is_empty() {
                    config.set_api_key(provider, Some(key.to_string()));
                }
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => {
                println!("Configuration cancelled; nothing saved.");
                return Ok(());
            }
            Err(err) => return Err(err).context("Failed to read API key"),
        }
    }

    config.save(&args.config)?;
    println!("Saved {}", args.config.display());
    Ok(())
}

pub async fn handle_show_config(args: ShowConfigArgs) -> anyhow::Result<()> {
    println!("Attempting to load config from: {}", args.config.display());
    let config = Config::load(&args.config)?;

    println!("\n--- Configuration ---");
    for provider in Provider::ALL {
        println!("  Provider: {}", provider);
        println!(
            "    API Key: {}",
            config
                .api_key(provider)
                .map(|k| mask_key(&k))
                .unwrap_or_else(|| "Not set".to_string())
        );
        println!(
            "    Base URL: {}",
            config
                .base_url(provider)
                .unwrap_or_else(|| "default".to_string())
        );
    }
    println!("Max Tokens: {}", config.max_tokens);
    println!("Max Retries: {}", config.max_retries);
    println!("Retry Base Delay: {}ms", config.retry_base_delay_ms);
    println!("Request Timeout: {}s", config.request_timeout_secs);
    println!("--- End Configuration ---");
    Ok(())
}

pub async fn handle_list(args: ListArgs) -> anyhow::Result<()> {
    let prompts = load_prompts(&args.prompts)?;
    let cases = match load_test_cases(&args.cases_dir) {
        Ok(cases) => cases,
        Err(e) => {
            error!("Could not load test cases: {:#}", e);
            Default::default()
        }
    };

    let max_name_len = prompts
        .iter()
        .map(|p| p.name.len())
        .max()
        .unwrap_or(6)
        .max("Prompt".len());

    println!("\n--- Prompts ---");
    println!(
        "{:<width$} | Cases | Provider / Model",
        "Prompt",
        width = max_name_len
    );
    println!("{:-<width$}-|-------|-----------------", "-", width = max_name_len);
    for prompt in &prompts {
        println!(
            "{:<width$} | {:>5} | {} / {}",
            prompt.name,
            cases.get(&prompt.name).len(),
            prompt.vendor,
            prompt.model,
            width = max_name_len
        );
    }

    let orphaned: Vec<&str> = cases
        .prompt_names()
        .filter(|name| !prompts.iter().any(|p| p.name == *name))
        .collect();
    if !orphaned.is_empty() {
        println!(
            "\nCase files without a matching prompt: {}",
            orphaned.join(", ")
        );
    }
    if !cases.files().is_empty() {
        println!("\nCase files:");
        for file in cases.files() {
            println!("  {}", file.display());
        }
    }
    println!("--- End Prompts ---");
    Ok(())
}
