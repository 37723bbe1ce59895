// src/logging.rs
//
// tracing subscriber setup.
//
// Every line is prefixed with local wall-clock time (HH:MM:SS.mmm). The -v
// count raises the detail of the session loggers (redirector, rfc2217) while
// everything else stays at info. RUST_LOG replaces the computed filter.
// With a log directory, lines also go to a timestamped file there and a
// `serbridge.log` symlink points at the newest one (Unix only).

use std::fmt;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const SESSION_TARGETS: [&str; 2] = ["serbridge_lib::redirector", "serbridge_lib::io::rfc2217"];

/// Local time with milliseconds, as used throughout the log output
struct LocalClock;

impl FormatTime for LocalClock {
    fn format_time(&self, w: &mut Writer<'_>) -> fmt::Result {
        write!(w, "{}", chrono::Local::now().format("%H:%M:%S%.3f"))
    }
}

/// Level of the session loggers for a -v count
pub fn session_level(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

/// Filter used when RUST_LOG is not set
pub fn default_filter(verbosity: u8) -> String {
    let level = session_level(verbosity);
    let mut filter = "info".to_string();
    for target in SESSION_TARGETS {
        filter.push_str(&format!(",{}={}", target, level));
    }
    filter
}

/// Create `<dir>/YYYYmmdd-HHMMSS-serbridge.log` and point the `serbridge.log`
/// symlink at it.
pub fn open_log_file(dir: &Path) -> io::Result<(File, PathBuf)> {
    std::fs::create_dir_all(dir)?;

    let filename = chrono::Local::now()
        .format("%Y%m%d-%H%M%S-serbridge.log")
        .to_string();
    let log_path = dir.join(&filename);

    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;

    // Windows symlinks require elevated privileges
    #[cfg(unix)]
    {
        let symlink_path = dir.join("serbridge.log");
        let _ = std::fs::remove_file(&symlink_path);
        if let Err(e) = std::os::unix::fs::symlink(&filename, &symlink_path) {
            eprintln!(
                "{} [logging] Failed to create serbridge.log symlink: {}",
                chrono::Local::now().format("%H:%M:%S%.3f"),
                e
            );
        }
    }

    Ok((file, log_path))
}

/// Install the global subscriber. Returns the log file path when file
/// logging is enabled.
pub fn init(verbosity: u8, log_dir: Option<&Path>) -> io::Result<Option<PathBuf>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(verbosity)));

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_timer(LocalClock)
        .with_target(false)
        .with_writer(io::stderr);

    let (file_layer, log_path) = match log_dir {
        Some(dir) => {
            let (file, path) = open_log_file(dir)?;
            let layer = tracing_subscriber::fmt::layer()
                .with_timer(LocalClock)
                .with_target(false)
                .with_ansi(false)
                .with_writer(Mutex::new(file));
            (Some(layer), Some(path))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| io::Error::new(io::ErrorKind::AlreadyExists, e.to_string()))?;

    if let Some(path) = &log_path {
        tracing::info!("[logging] File logging started: {}", path.display());
    }
    Ok(log_path)
}
