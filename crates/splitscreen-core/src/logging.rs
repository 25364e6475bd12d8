//! File logging for the injected DLL.

use std::fs::{File, OpenOptions};
use std::path::Path;
use std::sync::Mutex;

use tracing::Subscriber;
use tracing_subscriber::EnvFilter;

use crate::error::Result;

/// Log targets of this workspace: the core library and the DLL's lib target.
const TARGETS: [&str; 2] = ["splitscreen_core", "uwp_splitscreen"];

/// Route `tracing` output to `path`, appending.
///
/// `level` is used for this workspace's crates when `RUST_LOG` is unset.
/// Returns `false` if a global subscriber was already installed, which
/// happens when the host loads the DLL twice.
pub fn init_file_logging(path: &Path, level: &str) -> Result<bool> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter(level));
    Ok(tracing::subscriber::set_global_default(file_subscriber(file, filter)).is_ok())
}

fn default_filter(level: &str) -> EnvFilter {
    let directives: Vec<String> = TARGETS
        .iter()
        .map(|target| format!("{}={}", target, level))
        .collect();
    EnvFilter::new(format!("warn,{}", directives.join(",")))
}

fn file_subscriber(file: File, filter: EnvFilter) -> impl Subscriber + Send + Sync {
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_thread_ids(true)
        .finish()
}
