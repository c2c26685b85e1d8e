//! Process bootstrap: parse configuration, install the `tracing` subscriber,
//! and hand control to [`syncd::server::serve`]. Everything else (what a
//! command does, how files merge, how the watcher classifies events) lives
//! in the library crate; this binary only wires it to a process.

use clap::Parser;

use syncd::config::{Args, Settings};

#[tokio::main]
async fn main() -> std::process::ExitCode {
    syncd::config::apply_config_file_defaults(None);
    let args = Args::parse();

    let settings = match Settings::from_args(args) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("syncd: {e}");
            return std::process::ExitCode::FAILURE;
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(settings.log_filter.clone()))
        .init();

    if let Err(e) = syncd::server::serve(settings).await {
        tracing::error!(error = %e, "server exited with error");
        return std::process::ExitCode::FAILURE;
    }

    std::process::ExitCode::SUCCESS
}
