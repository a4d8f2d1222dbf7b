//! graphene-session - Graphene desktop session manager
//!
//! Entry point for the session manager binary.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use graphene_session::config::Config;
use graphene_session::session::SessionOutcome;

/// Command-line arguments for graphene-session
#[derive(Parser, Debug)]
#[command(name = "graphene-session")]
#[command(version, about = "Graphene desktop session manager", long_about = None)]
pub struct Args {
    /// Configuration file path
    #[arg(short, long, env = "GRAPHENE_SESSION_CONFIG", default_value = "/etc/graphene/session.toml")]
    pub config: String,

    /// Panel command, used to recognize the panel process
    #[arg(long, env = "GRAPHENE_PANEL_COMMAND")]
    pub panel_command: Option<String>,

    /// Additional autostart directory (can be specified multiple times)
    #[arg(long = "autostart-dir")]
    pub autostart_dirs: Vec<PathBuf>,

    /// Keep stdout/stderr of every client
    #[arg(long, env = "GRAPHENE_SHOW_OUTPUT")]
    pub show_output: bool,

    /// Verbose logging (can be specified multiple times)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Log format (json|pretty|compact)
    #[arg(long, default_value = "pretty")]
    pub log_format: String,

    /// Write logs to file (in addition to stderr)
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let config = Config::load(&args.config).or_else(|e| {
        eprintln!("Failed to load config: {:#}, using defaults", e);
        Config::default_config()
    });
    let config = match config {
        Ok(config) => config.with_overrides(
            args.panel_command.clone(),
            args.autostart_dirs.clone(),
            args.show_output,
        ),
        Err(e) => {
            eprintln!("{}", graphene_session::utils::format_user_error(&e));
            return ExitCode::FAILURE;
        }
    };

    let _guard = match init_logging(&args, &config.logging.level) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {:#}", e);
            return ExitCode::FAILURE;
        }
    };

    info!("════════════════════════════════════════════════════════");
    info!("  graphene-session v{}", env!("CARGO_PKG_VERSION"));
    info!("  Built: {} {}", env!("BUILD_DATE"), env!("BUILD_TIME"));
    info!("  Commit: {}", env!("GIT_HASH"));
    info!("════════════════════════════════════════════════════════");

    graphene_session::utils::log_startup_diagnostics();
    tracing::debug!("Config: {:?}", config);

    match graphene_session::daemon::run_session(config).await {
        Ok(exit) if exit.outcome == SessionOutcome::Clean => {
            info!("Session ended");
            ExitCode::SUCCESS
        }
        Ok(_) => {
            tracing::error!("Session ended after a fatal error");
            ExitCode::FAILURE
        }
        Err(e) => {
            eprintln!("{}", graphene_session::utils::format_user_error(&e));
            ExitCode::FAILURE
        }
    }
}

fn init_logging(args: &Args, config_level: &str) -> Result<Option<WorkerGuard>> {
    let log_level = match args.verbose {
        0 => config_level,
        1 => "debug",
        _ => "trace",
    };

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!(
            "graphene_session={level},zbus=warn,warn",
            level = log_level
        ))
    });

    let (file_writer, guard) = match &args.log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            let (writer, guard) = tracing_appender::non_blocking(file);
            (Some(writer), Some(guard))
        }
        None => (None, None),
    };

    let file_layer = file_writer.map(|writer| {
        tracing_subscriber::fmt::layer()
            .with_writer(writer)
            .with_ansi(false)
    });

    let registry = tracing_subscriber::registry().with(env_filter).with(file_layer);
    match args.log_format.as_str() {
        "json" => registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init(),
        "pretty" => registry
            .with(tracing_subscriber::fmt::layer().pretty().with_writer(std::io::stderr))
            .init(),
        _ => registry
            .with(tracing_subscriber::fmt::layer().compact().with_writer(std::io::stderr))
            .init(),
    }

    if let Some(path) = &args.log_file {
        info!("Logging to file: {}", path.display());
    }

    Ok(guard)
}
