//! Robot Conductor - Command-line front end
//!
//! Drives conversational turns against a simulated robot, so the whole
//! lease / speak / interrupt / release cycle can be exercised from a shell.
//!
//! # Usage
//!
//! ```bash
//! # One turn
//! robot-conductor ask "what is the capital of france" --knowledge
//!
//! # Speak fixed text
//! robot-conductor say "Time to charge."
//!
//! # Interactive chat with memory
//! robot-conductor chat
//!
//! # Check the provider
//! robot-conductor check
//!
//! # No network at all
//! robot-conductor --offline chat
//!
//! # Verbose logging
//! RUST_LOG=robot_conductor=debug robot-conductor ask "hello"
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use robot_conductor::device::simulated::SimulatedFleet;
use robot_conductor::{
    default_config_path, load_config_from_path, Conductor, ConfigOverrides, DeviceId, LlmBackend,
    OpenAiBackend, Persona, ResponseMode, ScriptedBackend, TurnError, TurnReport, TurnRequest,
    TurnUpdate,
};

/// Robot Conductor - talk to a desk robot through a language model
#[derive(Parser, Debug)]
#[command(name = "robot-conductor")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Configuration file path
    #[arg(short = 'c', long, env = "ROBOT_CONDUCTOR_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Robot serial number
    #[arg(short = 'd', long, env = "ROBOT_CONDUCTOR_DEVICE", default_value = "00e20100")]
    device: String,

    /// Model override
    #[arg(short = 'm', long)]
    model: Option<String>,

    /// Ask for complete replies instead of streaming
    #[arg(long)]
    batch: bool,

    /// Do not remember the conversation between turns
    #[arg(long)]
    no_save_chat: bool,

    /// Hold still while speaking instead of looping the speaking animation
    #[arg(long)]
    no_speaking_animation: bool,

    /// Answer from a local echo backend instead of the provider
    #[arg(long)]
    offline: bool,

    /// Simulate a touch while the N-th fragment is being spoken
    #[arg(long, value_name = "N")]
    touch_after: Option<usize>,

    /// Command to run
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one conversational turn
    Ask {
        /// What the user said
        text: String,
        /// Use the knowledge persona
        #[arg(short = 'k', long)]
        knowledge: bool,
    },
    /// Speak fixed text without asking the provider
    Say {
        /// Text to speak
        text: String,
    },
    /// Chat interactively, one turn per line
    Chat {
        /// Use the knowledge persona
        #[arg(short = 'k', long)]
        knowledge: bool,
    },
    /// Check that the provider is reachable and list its models
    Check,
}

/// Initialize logging, `RUST_LOG` winning over the defaults
fn init_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new("robot_conductor=info,robot_conductor_daemon=info")
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

fn persona(knowledge: bool) -> Persona {
    if knowledge {
        Persona::Knowledge
    } else {
        Persona::Default
    }
}

/// Print spoken fragments as they are dispatched
fn spawn_printer(mut updates: mpsc::Receiver<TurnUpdate>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(update) = updates.recv().await {
            if let TurnUpdate::FragmentSpoken { text, .. } = update {
                println!("🤖 {text}");
            }
        }
    })
}

fn print_report(report: &TurnReport) {
    info!(
        turn = %report.turn_id,
        outcome = %report.outcome,
        fragments = report.spoken.len(),
        battery_level = report.battery.level,
        elapsed_ms = u64::try_from(report.elapsed.as_millis()).unwrap_or(u64::MAX),
        "Turn report"
    );
}

/// Report a one-shot turn; a turn that fell short fails the command
fn finish(report: TurnReport) -> Result<()> {
    print_report(&report);
    match report.outcome.into_error() {
        None => Ok(()),
        Some(TurnError::Interrupted) => {
            warn!("Robot was interrupted before it finished");
            Ok(())
        }
        Some(e) => Err(e.into()),
    }
}

/// Run a command against a Conductor
async fn run<B: LlmBackend + 'static>(
    conductor: Conductor<B>,
    device: DeviceId,
    command: Command,
) -> Result<()> {
    match command {
        Command::Ask { text, knowledge } => {
            let request = TurnRequest::new(device, text).with_persona(persona(knowledge));
            let report = tokio::select! {
                report = conductor.run_turn(request) => report?,
                _ = tokio::signal::ctrl_c() => {
                    warn!("Interrupted, control released");
                    return Ok(());
                }
            };
            finish(report)?;
        }
        Command::Say { text } => {
            let report = conductor.say(device, &text).await?;
            finish(report)?;
        }
        Command::Chat { knowledge } => {
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            eprintln!("Chatting with {device}. Empty line or Ctrl-C to quit.");

            loop {
                let line = tokio::select! {
                    line = lines.next_line() => line.context("Failed to read stdin")?,
                    _ = tokio::signal::ctrl_c() => break,
                };
                let Some(line) = line else { break };
                let text = line.trim();
                if text.is_empty() {
                    break;
                }

                let request =
                    TurnRequest::new(device.clone(), text).with_persona(persona(knowledge));
                tokio::select! {
                    report = conductor.run_turn(request) => match report {
                        Ok(report) => print_report(&report),
                        Err(e) => error!(error = %e, "Turn failed"),
                    },
                    _ = tokio::signal::ctrl_c() => {
                        warn!("Turn cancelled");
                        break;
                    }
                }
            }
            info!(
                remembered = conductor.memory().get(&device).len(),
                capacity = conductor.memory().max_messages(),
                "Chat ended"
            );
        }
        Command::Check => {
            let backend = conductor.backend();
            if !backend.health_check().await {
                anyhow::bail!("{} is not reachable", backend.name());
            }
            let model = &conductor.config().response.model;
            let models = backend.list_models().await?;
            println!("{} is reachable, {} models available", backend.name(), models.len());
            if models.iter().any(|m| m.name == *model) {
                println!("Configured model {model} is available");
            } else {
                println!("Configured model {model} is NOT listed");
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging();

    let path = args.config.clone().or_else(default_config_path);
    let mut file_config = load_config_from_path(path).context("Failed to load configuration")?;

    let mut overrides = ConfigOverrides::new();
    if let Some(model) = args.model.clone() {
        overrides = overrides.with_model(model);
    }
    if args.batch {
        overrides = overrides.with_mode(ResponseMode::Batch);
    }
    if args.no_save_chat {
        overrides = overrides.with_save_chat(false);
    }
    if args.no_speaking_animation {
        overrides = overrides.with_speaking_animation(false);
    }
    overrides.apply(&mut file_config);
    info!(source = %file_config.source(), provider = %file_config.backend.provider, "Configuration loaded");

    let fleet = Arc::new(SimulatedFleet::new());
    let device = DeviceId::new(args.device.clone());
    if let Some(n) = args.touch_after {
        fleet.robot(&device).interrupt_after_says(n);
    }

    let (tx, rx) = mpsc::channel(64);
    let printer = spawn_printer(rx);
    let config = file_config.conductor_config();

    let result = if args.offline {
        let conductor = Conductor::new(ScriptedBackend::new(), fleet, config).with_updates(tx);
        run(conductor, device, args.command).await
    } else {
        file_config
            .validate_provider()
            .context("Provider is not configured (or pass --offline)")?;
        let backend = OpenAiBackend::from_config(&file_config.backend)?;
        let conductor = Conductor::new(backend, fleet, config).with_updates(tx);
        run(conductor, device, args.command).await
    };

    // Conductor (and its sender) is gone; drain the printer
    let _ = printer.await;
    result
}
