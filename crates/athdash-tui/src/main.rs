//! `athdash`: terminal host for the athlete dashboard.
//!
//! Builds the dashboard shell over an in-memory document, mounts the
//! configured features, and drives them from the keyboard and mouse. Number
//! keys jump between features, Tab cycles, and bracketed keys press the
//! buttons a feature or modal renders.
//!
//! Logs go to a file (default `/tmp/athdash.log`) so they never corrupt the
//! terminal. Without an `[api] base_url` the dashboard runs offline and
//! every data request fails with a visible error.

mod action;
mod app;
mod event;
mod features;
mod theme;
mod tui;
mod view;

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use athdash_core::{DashboardShell, DataBoundary, Document, FeatureRegistry, MemoryDocument};
use clap::Parser;
use color_eyre::eyre::Result;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::app::App;

/// Terminal dashboard for tracking workouts, goals and your athlete profile.
#[derive(Parser, Debug)]
#[command(name = "athdash", version, about)]
struct Cli {
    /// Config file (defaults to the platform config directory)
    #[arg(short, long, env = "ATHDASH_CONFIG")]
    config: Option<PathBuf>,

    /// Feature to open first (same as `?dashboard_feature=<id>`)
    #[arg(short, long)]
    feature: Option<String>,

    /// Print the configured features and their accessibility, then exit
    #[arg(long)]
    list_features: bool,

    /// Log file path
    #[arg(long, default_value = "/tmp/athdash.log")]
    log_file: PathBuf,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

/// File-only tracing. Hold the guard for the life of the process.
fn setup_tracing(cli: &Cli) -> WorkerGuard {
    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "athdash={log_level},athdash_tui={log_level},athdash_core={log_level},\
             athdash_api={log_level},athdash_config={log_level}"
        ))
    });

    let log_dir = cli
        .log_file
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or(std::path::Path::new("/tmp"));
    let log_filename = cli
        .log_file
        .file_name()
        .unwrap_or(std::ffi::OsStr::new("athdash.log"));

    let file_appender = tracing_appender::rolling::never(log_dir, log_filename);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_target(true)
                .with_thread_ids(true),
        )
        .init();

    guard
}

fn print_features(registry: &FeatureRegistry) -> Result<()> {
    let mut out = std::io::stdout().lock();
    for entry in registry.get_all() {
        let access = if entry.is_accessible {
            "accessible"
        } else {
            "locked"
        };
        writeln!(
            out,
            "{}\t{}\t{access}",
            entry.descriptor.id(),
            entry.descriptor.title()
        )?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _log_guard = setup_tracing(&cli);

    let config = match &cli.config {
        Some(path) => athdash_config::load_config_from(path)?,
        None => athdash_config::load_config()?,
    };
    let registry = config.build_registry(features::component);

    if cli.list_features {
        return print_features(&registry);
    }

    // Hooks go in before the terminal is touched.
    tui::install_hooks()?;

    let boundary = config
        .api
        .client()?
        .map(|client| -> Arc<dyn DataBoundary> { Arc::new(client) });
    info!(
        user = %config.user.display_name,
        role = %config.user.role,
        online = boundary.is_some(),
        features = registry.len(),
        "starting athdash"
    );

    let document = Arc::new(MemoryDocument::new());
    let view: Arc<dyn Document> = document.clone();
    let shell = DashboardShell::new(
        view,
        registry,
        boundary,
        config.shell_options(),
    );

    let mut app = App::new(shell, document);
    app.run(cli.feature.as_deref()).await?;

    Ok(())
}
