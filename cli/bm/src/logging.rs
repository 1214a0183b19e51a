//! Logging initialization.
//!
//! Two layers: stderr, filtered by `RUST_LOG` or the `debug-level` config
//! value, and an append-only debug log in the config directory that always
//! records this crate at debug level.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Debug log file name inside the config directory.
pub const DEBUG_LOG_FILE: &str = "debug.log";

/// Handle describing where logs go.
#[derive(Debug, Clone)]
pub struct Logging {
    debug_log: PathBuf,
}

impl Logging {
    /// Path of the debug log, whether or not it could be opened.
    pub fn debug_log(&self) -> &Path {
        &self.debug_log
    }
}

/// Map a `debug-level` value to a stderr filter directive.
pub fn stderr_directive(debug_level: &str) -> &'static str {
    match debug_level.trim().parse::<u8>() {
        Ok(0) | Err(_) => "warn",
        Ok(1) => "info",
        Ok(2) => "debug",
        Ok(_) => "trace",
    }
}

fn open_debug_log(path: &Path) -> io::Result<File> {
    let mut options = OpenOptions::new();
    options.create(true).append(true);

    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    options.open(path)
}

/// Filter for the stderr layer. A valid `RUST_LOG` wins over `debug-level`.
fn stderr_filter(rust_log: Option<&str>, debug_level: &str) -> EnvFilter {
    rust_log
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(stderr_directive(debug_level)))
}

/// Install the global subscriber.
///
/// `rust_log` is the `RUST_LOG` value from the captured environment.
/// A debug log that cannot be opened is skipped rather than treated as fatal.
/// Installing twice (as tests do) keeps the first subscriber.
pub fn init(config_dir: &Path, rust_log: Option<&str>, debug_level: &str) -> Logging {
    let debug_log = config_dir.join(DEBUG_LOG_FILE);

    let stderr_filter = stderr_filter(rust_log, debug_level);
    let stderr_layer = fmt::layer()
        .with_writer(io::stderr)
        .with_target(false)
        .with_filter(stderr_filter);

    let file_layer = match open_debug_log(&debug_log) {
        Ok(file) => Some(
            fmt::layer()
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .with_filter(EnvFilter::new("bm=debug,warn")),
        ),
        Err(e) => {
            eprintln!(
                "warning: couldn't open debug log {}: {e}",
                debug_log.display()
            );
            None
        }
    };

    let _ = tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .try_init();

    Logging { debug_log }
}
