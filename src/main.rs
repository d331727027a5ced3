//! Sensor Orchestrator CLI
//!
//! Runs headless experiments against the built-in sensor plugins.

use anyhow::Context;
use clap::{Parser, Subcommand};
use sensor_orchestrator::{
    activity::create_shared_log_with_persistence,
    builtin_registry,
    sensor::{Query, TagKind},
    ActivityLog, Config, Controller, ExperimentCallbacks, FrontEnd, Notification, VERSION,
};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sensor-orchestrator")]
#[command(version = VERSION)]
#[command(about = "Synchronized recording and tagging across sensor plugins", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a headless experiment
    Run {
        /// Sensor plugin to attach (repeatable)
        #[arg(long = "sensor", short, required = true)]
        sensors: Vec<String>,

        /// Subdirectory of the save root to record into
        #[arg(long, default_value = "session")]
        subdir: String,

        /// Base filename handed to each sensor
        #[arg(long, default_value = "recording")]
        filename: String,

        /// Stop after this many seconds (runs until Ctrl+C otherwise)
        #[arg(long)]
        duration: Option<u64>,

        /// Seconds between impulse tags
        #[arg(long, default_value = "1")]
        tag_interval: u64,

        /// Participant identifier
        #[arg(long)]
        participant: Option<String>,
    },

    /// List available sensor plugins
    Plugins,

    /// Show configuration paths and cumulative activity
    Status,

    /// Show configuration
    Config,

    /// Create the configured directories
    Init,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run {
            sensors,
            subdir,
            filename,
            duration,
            tag_interval,
            participant,
        } => cmd_run(
            &sensors,
            subdir,
            filename,
            duration.map(Duration::from_secs),
            Duration::from_secs(tag_interval.max(1)),
            participant,
        ),
        Commands::Plugins => {
            cmd_plugins();
            Ok(())
        }
        Commands::Status => cmd_status(),
        Commands::Config => cmd_config(),
        Commands::Init => cmd_init(),
    };

    if let Err(e) = result {
        error!("{e:#}");
        std::process::exit(1);
    }
}

/// Prints controller notifications to the terminal.
struct ConsoleFrontEnd;

impl FrontEnd for ConsoleFrontEnd {
    fn notify(&mut self, notification: &Notification) {
        match notification {
            Notification::Error(msg) => eprintln!("[error] {msg}"),
            Notification::LogUpdate(msg) => println!("[log] {msg}"),
            Notification::SensorCountChanged(count) => println!("[sensors] {count} connected"),
            Notification::ParticipantIdUpdated(pid) => println!("[participant] {pid}"),
            Notification::Continue => println!("[continue]"),
        }
    }

    fn show_message_box(&mut self, query: &Query) {
        println!("[{}] {} {:?}", query.title, query.message, query.buttons);
        warn!("No interactive prompt in headless mode, query left unanswered");
    }
}

fn cmd_run(
    sensors: &[String],
    subdir: String,
    filename: String,
    duration: Option<Duration>,
    tag_interval: Duration,
    participant: Option<String>,
) -> anyhow::Result<()> {
    println!("Sensor Orchestrator v{VERSION}");
    println!();

    let mut config = Config::load().unwrap_or_else(|e| {
        warn!("Could not load configuration, using defaults: {e}");
        Config::default()
    });
    if let Some(pid) = participant {
        config.participant_id = pid;
    }
    config
        .ensure_directories()
        .context("Could not create directories")?;

    let activity = create_shared_log_with_persistence(config.activity_path());
    let mut controller =
        Controller::new(config, builtin_registry()).with_activity_log(activity.clone());
    controller.attach_front_end(Box::new(ConsoleFrontEnd));

    for name in sensors {
        if let Err(e) = controller.add_sensor(name) {
            eprintln!("Warning: {e}");
        }
    }

    let handle = controller.handle();
    let play_handle = handle.clone();
    controller.set_callbacks(
        ExperimentCallbacks::new()
            .on_play(move || {
                if play_handle.start_collecting_data(&subdir, &filename).is_err() {
                    warn!("Controller closed before recording started");
                }
            })
            .on_data(|packet| debug!(%packet, "data packet")),
    );

    let signal_handle = handle.clone();
    ctrlc::set_handler(move || {
        let _ = signal_handle.close();
    })
    .context("Error setting Ctrl+C handler")?;

    // Periodic impulse tags, and the end of the run if a duration was given.
    let ticker = thread::spawn(move || {
        let started = Instant::now();
        let mut tick = 0u64;
        loop {
            thread::sleep(tag_interval);
            if let Some(limit) = duration {
                if started.elapsed() >= limit {
                    let close_handle = handle.clone();
                    let _ = handle.stop_collecting_data(Some(Box::new(move || {
                        let _ = close_handle.close();
                    })));
                    break;
                }
            }
            tick += 1;
            if handle.mark(format!("tick-{tick}"), TagKind::Impulse).is_err() {
                break;
            }
        }
    });

    println!("Press Ctrl+C to stop");
    println!();

    // A front end is attached, so play has to be requested explicitly.
    controller.play();
    controller.run();
    let _ = ticker.join();

    info!("run finished");
    println!();
    println!("{}", activity.summary());
    Ok(())
}

fn cmd_plugins() {
    println!("Available sensor plugins:");
    for name in builtin_registry().names() {
        println!("  {name}");
    }
}

fn cmd_status() -> anyhow::Result<()> {
    let config = Config::load().context("Could not load configuration")?;

    println!("Sensor Orchestrator Status");
    println!("==========================");
    println!();
    println!("Save root:   {:?}", config.save_root);
    println!("Plugin root: {:?}", config.plugin_root);
    println!();

    let stats_path = config.activity_path();
    if stats_path.exists() {
        let stats = ActivityLog::with_persistence(stats_path).stats();
        println!("Cumulative Statistics:");
        println!("  Sensors added: {}", stats.sensors_added);
        println!("  Sensors removed: {}", stats.sensors_removed);
        println!("  Sensor errors: {}", stats.sensor_errors);
        println!("  Tags broadcast: {}", stats.tags_broadcast);
        println!("  Recording sessions: {}", stats.sessions_started);
        println!("  Data packets relayed: {}", stats.data_packets);
    } else {
        println!("No previous run data found.");
    }
    Ok(())
}

fn cmd_config() -> anyhow::Result<()> {
    let config = Config::load().context("Could not load configuration")?;

    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {:?}", Config::config_path());
    println!();
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

fn cmd_init() -> anyhow::Result<()> {
    let config = Config::load().context("Could not load configuration")?;
    config
        .ensure_directories()
        .context("Could not create directories")?;
    if !Config::config_path().exists() {
        config.save().context("Could not save configuration")?;
    }
    println!("Save root:   {:?}", config.save_root);
    println!("Plugin root: {:?}", config.plugin_root);
    Ok(())
}
