use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use scenemidi::midi::{TracingPort, list_output_ports};
use scenemidi::{AppConfig, MidirOutput, SceneEngine, Sequencer};
use tracing_subscriber::EnvFilter;

type BoxError = Box<dyn std::error::Error>;

fn main() -> Result<(), BoxError> {
    init_tracing();

    let cli = Cli::parse();
    match cli.command {
        Commands::Ports { client } => run_ports(&client),
        Commands::Run {
            config,
            port,
            tick_ms,
            dry_run,
        } => run_scenes(config, port, tick_ms, dry_run),
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

fn run_ports(client: &str) -> Result<(), BoxError> {
    let ports = list_output_ports(client)?;
    if ports.is_empty() {
        println!("No MIDI outputs found");
    }
    for (i, name) in ports.iter().enumerate() {
        println!("  {i}: {name}");
    }
    Ok(())
}

fn run_scenes(
    config_path: Option<PathBuf>,
    port: Option<String>,
    tick_ms: Option<u64>,
    dry_run: bool,
) -> Result<(), BoxError> {
    let mut config = match &config_path {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::default(),
    };
    if let Some(port) = port {
        config.midi.port = Some(port);
    }
    if let Some(tick_ms) = tick_ms {
        config.midi.tick_period_ms = tick_ms;
    }

    let sequencer = Sequencer::new(config.tick_period());
    if dry_run {
        sequencer.set_output(TracingPort)?;
    } else {
        let selector = config.midi.port.clone().unwrap_or_else(|| "0".to_string());
        sequencer.set_output_with(|| MidirOutput::open(&config.midi.client_name, &selector))?;
    }
    sequencer.start()?;

    let engine = SceneEngine::new(
        config.scenes()?,
        sequencer.sender(),
        config.default_channel()?,
    );
    if let Some(scene) = &config.default_scene {
        engine.switch_to(scene)?;
    }

    println!("Type a scene name to switch, `list`, `port <name>`, `reload` or `quit`.");
    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = line?;
        let line = line.trim();
        match line.split_once(' ').unwrap_or((line, "")) {
            ("", _) => {}
            ("quit" | "exit", _) => break,
            ("list", _) => {
                let current = engine.current();
                for scene in engine.scenes().iter() {
                    let marker = if current.as_deref() == Some(scene.name.as_str()) {
                        "*"
                    } else {
                        " "
                    };
                    println!("{marker} {} ({})", scene.name, scene.title);
                }
            }
            ("port", selector) if selector.trim().is_empty() => {
                println!("Usage: port <name, name fragment or index>");
            }
            ("port", selector) => {
                let client = config.midi.client_name.clone();
                match sequencer.set_output_with(|| MidirOutput::open(&client, selector.trim())) {
                    Ok(Some(old)) => old.close(),
                    Ok(None) => {}
                    Err(e) => tracing::error!(error = %e, "could not switch output"),
                }
            }
            ("reload", _) => match &config_path {
                Some(path) => match AppConfig::load(path).and_then(|c| c.scenes()) {
                    Ok(scenes) => engine.reload(scenes),
                    Err(e) => tracing::error!(error = %e, "reload failed"),
                },
                None => println!("No config file to reload"),
            },
            (name, _) => {
                if let Err(e) = engine.switch_to(name) {
                    tracing::error!(error = %e, "scene change failed");
                }
            }
        }
        io::stdout().flush()?;
    }

    sequencer.shutdown()?;
    Ok(())
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Switch MIDI scenes from the terminal", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List the available MIDI output ports.
    Ports {
        #[arg(long, default_value = "scenemidi")]
        client: String,
    },
    /// Load a scene file and switch scenes by typing their names.
    Run {
        /// RON scene configuration.
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Output port name, name fragment or index. Overrides the config.
        #[arg(short, long)]
        port: Option<String>,
        /// Tick period in milliseconds. Overrides the config.
        #[arg(long)]
        tick_ms: Option<u64>,
        /// Log outgoing messages instead of opening a MIDI port.
        #[arg(long)]
        dry_run: bool,
    },
}
