//! Tracing/logging initialization.
//!
//! JSON-structured logs, filterable via `RUST_LOG`, optionally mirrored to a
//! rolling file under `BUCKLEY_LOG_DIR` (§6).

use std::path::{Path, PathBuf};

use tracing_subscriber::EnvFilter;

/// Resolve `BUCKLEY_LOG_DIR` per §6: absolute values are used verbatim, a
/// leading `~` expands to the home directory, relative values are joined to
/// `cwd`. Returns `None` if the variable is unset.
pub fn resolve_log_dir(cwd: &Path) -> Option<PathBuf> {
    let raw = std::env::var("BUCKLEY_LOG_DIR").ok()?;
    Some(resolve_log_dir_value(&raw, cwd))
}

fn resolve_log_dir_value(raw: &str, cwd: &Path) -> PathBuf {
    if let Some(rest) = raw.strip_prefix('~') {
        let home = dirs::home_dir().unwrap_or_else(|| cwd.to_path_buf());
        return home.join(rest.trim_start_matches('/'));
    }
    let path = Path::new(raw);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        cwd.join(path)
    }
}

/// Initialize tracing for the process. Safe to call multiple times;
/// subsequent calls are no-ops. If `BUCKLEY_LOG_DIR` resolves to a usable
/// directory, logs are additionally written there as daily-rolling files;
/// the returned guard must be kept alive for the life of the process.
pub fn init() -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    match resolve_log_dir(&cwd) {
        Some(dir) if std::fs::create_dir_all(&dir).is_ok() => {
            let file_appender = tracing_appender::rolling::daily(&dir, "buckley.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .json()
                .with_timer(tracing_subscriber::fmt::time::SystemTime)
                .with_target(false)
                .with_writer(non_blocking)
                .try_init();

            Some(guard)
        }
        _ => {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .json()
                .with_timer(tracing_subscriber::fmt::time::SystemTime)
                .with_target(false)
                .try_init();
            None
        }
    }
}
