use crate::cli::json_log_behaviour::JsonLogBehaviour;
use std::fs::OpenOptions;
use std::sync::Mutex;
use tracing::Level;
use tracing::debug;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

/// Install the global subscriber: human-readable logs on stderr, plus JSON lines in a file
/// when requested. `RUST_LOG` overrides `level`.
///
/// # Errors
///
/// Returns an error if the log file cannot be opened or a subscriber is already installed.
pub fn init_tracing(level: Level, json_log_behaviour: JsonLogBehaviour) -> eyre::Result<()> {
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false);

    let json_layer = match &json_log_behaviour {
        JsonLogBehaviour::Disabled => None,
        JsonLogBehaviour::File(path) => {
            if let Some(parent) = path.parent()
                && !parent.as_os_str().is_empty()
            {
                std::fs::create_dir_all(parent)?;
            }
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            Some(
                fmt::layer()
                    .json()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            )
        }
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(json_layer)
        .try_init()
        .map_err(|e| eyre::eyre!("Failed to initialize tracing: {}", e))?;

    if let JsonLogBehaviour::File(path) = &json_log_behaviour {
        debug!("Writing JSON logs to {}", path.display());
    }
    Ok(())
}
