//! MemberHub command line front end
//!
//! `memberhub status | connect [--manual] | disconnect | refresh`

use anyhow::Context;
use clap::{Parser, Subcommand};
use memberhub_core::{branding, config, ConnectorConfig};
use tracing::info;

mod commands;
mod state;

#[derive(Parser)]
#[command(name = "memberhub", version, about = "Connect MemberHub to your platform account")]
struct Cli {
    /// Override the loopback callback port
    #[arg(long, global = true, env = "MEMBERHUB_CALLBACK_PORT")]
    port: Option<u16>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show the connection status and cached content
    Status,
    /// Connect an account through the browser
    Connect {
        /// Open nothing; print the authorization URL and read the redirected URL from stdin
        #[arg(long)]
        manual: bool,
    },
    /// Forget the connected account
    Disconnect,
    /// Reload tracks and playlists
    Refresh,
}

fn logs_dir() -> std::path::PathBuf {
    config::data_dir().join("logs")
}

/// Console plus daily rotating file logging.
///
/// The returned guard must be held until exit so buffered file output is flushed.
fn init_tracing() -> anyhow::Result<tracing_appender::non_blocking::WorkerGuard> {
    use tracing_appender::rolling::{RollingFileAppender, Rotation};
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let logs_dir = logs_dir();
    if let Err(e) = std::fs::create_dir_all(&logs_dir) {
        eprintln!("Warning: Failed to create logs directory: {}", e);
    }

    // memberhub.2026-10-15.log
    let file_appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(branding::LOG_PREFIX)
        .filename_suffix("log")
        .build(&logs_dir)
        .context("Failed to create log file appender")?;
    let (non_blocking_file, guard) = tracing_appender::non_blocking(file_appender);

    // RUST_LOG takes precedence
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("warn,memberhub=info,memberhub_core=info,memberhub_connector=info,memberhub_storage=info")
    });

    let console_layer = fmt::layer()
        .with_ansi(true)
        .compact()
        .with_writer(std::io::stderr)
        .with_line_number(false)
        .with_file(false)
        .with_target(false);

    let file_layer = fmt::layer()
        .with_writer(non_blocking_file)
        .with_ansi(false)
        .with_thread_ids(true)
        .with_line_number(true)
        .with_file(true)
        .with_target(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    Ok(guard)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _guard = init_tracing()?;

    let mut config = ConnectorConfig::from_env().context("Invalid configuration")?;
    if cli.port.is_some() {
        config.callback_port = cli.port;
    }
    info!(
        "{} v{} starting, logs in {}",
        branding::DISPLAY_NAME,
        env!("CARGO_PKG_VERSION"),
        logs_dir().display()
    );

    let app = state::AppState::new(&config).await?;
    let result = match cli.command {
        Command::Status => commands::status(&app).await,
        Command::Connect { manual } => commands::connect(&app, manual).await,
        Command::Disconnect => commands::disconnect(&app).await,
        Command::Refresh => commands::refresh(&app).await,
    };
    app.connector.shutdown().await;
    result
}
