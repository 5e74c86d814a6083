//! webpilot CLI.
//!
//! Drives a browser-automation task from the terminal: launches or attaches
//! to Chrome, runs the agent loop for the given task, streams progress
//! events, and prompts on stdin when an action needs confirmation.
//!
//! Usage examples:
//!   $ MODEL_API_KEY=... cargo run --bin webpilot -- \
//!       run "find the pricing page and summarise the tiers" \
//!       --url https://example.com --show-browser
//!   $ WEBPILOT_CDP_URL=ws://localhost:9222/... cargo run --bin webpilot -- \
//!       run "log out of the dashboard" --yes

use std::env;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use log::info;
use tokio::io::{AsyncBufReadExt, BufReader};
use webpilot::agent::{AgentEvent, PilotAgent};
use webpilot::bridge::PageBridge;
use webpilot::capability::CapabilityMatrix;
use webpilot::config::{PilotConfig, Verbosity};
use webpilot::runtime::ChromiumBridge;

#[derive(Parser)]
#[command(name = "webpilot", author, version, about = "Model-driven browser automation")]
struct Cli {
    /// Increase log verbosity (pass multiple times for DEBUG).
    #[arg(long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one automation task against a browser.
    Run(RunArgs),
}

#[derive(Args)]
struct RunArgs {
    /// Natural-language task for the agent.
    task: String,

    /// Page to open before the run starts.
    #[arg(long)]
    url: Option<String>,

    /// Model provider id (capability lookup key).
    #[arg(long)]
    provider: Option<String>,

    /// Model name passed to the inference endpoint.
    #[arg(long)]
    model: Option<String>,

    /// Turn ceiling for the run.
    #[arg(long)]
    max_turns: Option<u32>,

    /// Approve every confirmation prompt without asking.
    #[arg(long)]
    yes: bool,

    /// Show the launched browser window.
    #[arg(long)]
    show_browser: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_env_logger();

    let cli = Cli::parse();
    match cli.command {
        Command::Run(args) => run_task(args, verbosity_from_count(cli.verbose)).await,
    }
}

async fn run_task(args: RunArgs, verbosity: Verbosity) -> Result<()> {
    let mut config = PilotConfig::from_env().context("failed to load configuration")?;
    config.verbose = verbosity;
    if let Some(provider) = args.provider.clone() {
        config.provider = provider;
    }
    if let Some(model) = args.model.clone() {
        config.model = model;
    }
    if let Some(max_turns) = args.max_turns {
        config.max_turns = max_turns;
        config.visual_max_turns = max_turns;
    }
    if args.show_browser {
        config.headless = false;
    }

    let bridge = Arc::new(ChromiumBridge::new());
    bridge
        .connect(&config)
        .await
        .context("failed to start or attach to a browser")?;
    if let Some(url) = &args.url {
        bridge
            .navigate(url)
            .await
            .with_context(|| format!("failed to open {url}"))?;
        bridge.wait_for_load(config.page_load_timeout_ms).await.ok();
    }

    let matrix = CapabilityMatrix::builtin();
    let mut agent = PilotAgent::new(config, bridge.clone(), &matrix);
    info!("running in {:?} mode", agent.mode());

    let mut events = agent.subscribe_events();
    let printer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            print_event(&event);
        }
    });

    let mut confirmations = agent.subscribe_confirmations();
    let auto_approve = args.yes;
    let prompter = tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Some(request) = confirmations.recv().await {
            if auto_approve {
                let _ = request.respond.send(true);
                continue;
            }
            println!("\n{}", request.message);
            println!("Approve? [y/N]");
            let approved = matches!(
                lines.next_line().await,
                Ok(Some(line)) if matches!(line.trim().to_ascii_lowercase().as_str(), "y" | "yes")
            );
            let _ = request.respond.send(approved);
        }
    });

    let stop = agent.stop_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("stopping after the current turn...");
            stop.stop();
        }
    });

    let outcome = agent.run(&args.task).await.context("agent run failed")?;
    println!("\n[{:?}] {}", outcome.status, outcome.message);
    let metrics = agent.metrics();
    info!(
        "tokens: {} prompt / {} completion, inference {} ms over {} turns",
        metrics.total_prompt_tokens,
        metrics.total_completion_tokens,
        metrics.total_inference_time_ms,
        outcome.turns_used
    );

    printer.abort();
    prompter.abort();
    bridge.shutdown().await.ok();
    Ok(())
}

fn print_event(event: &AgentEvent) {
    match event {
        AgentEvent::Turn { turn, max_turns } => info!("turn {turn}/{max_turns}"),
        AgentEvent::Text { text } => println!("{text}"),
        AgentEvent::Action { action } => info!("-> {}", action.kind),
        AgentEvent::ActionResult { action, result } => {
            if result.success {
                info!("   {} ok: {}", action.kind, result.message);
            } else {
                log::warn!("   {} failed: {}", action.kind, result.message);
            }
        }
        AgentEvent::Skipped { action, reason } => {
            log::warn!("   {} skipped: {reason}", action.kind)
        }
        AgentEvent::Complete { status, .. } => info!("run finished: {status:?}"),
    }
}

fn verbosity_from_count(count: u8) -> Verbosity {
    match count {
        0 => Verbosity::Medium,
        _ => Verbosity::Detailed,
    }
}

fn init_env_logger() {
    if env::var("RUST_LOG").is_err() {
        unsafe {
            env::set_var("RUST_LOG", "info");
        }
    }

    let _ = env_logger::Builder::from_env(env_logger::Env::default())
        .format_timestamp_secs()
        .try_init();
}
