//! Log output for the `gf` binary.
//!
//! Library crates log through the `log` facade; the subscriber installed here
//! picks those records up and writes them to stderr or to a log file.

use anyhow::{Context, Result};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

use crate::cli::GlobalArgs;

/// Default filter for a `-v` count; `RUST_LOG` takes precedence
fn level_for(verbose: u8) -> &'static str {
    match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

/// Install the global subscriber.
///
/// With `--log-file <dir>` records go to `<dir>/geoflow_<timestamp>.log`
/// at info level or higher; otherwise they go to stderr.
pub(crate) fn init(global: &GlobalArgs) -> Result<Option<PathBuf>> {
    let level = match (&global.log_file, global.verbose) {
        (Some(_), 0) => "info",
        (_, v) => level_for(v),
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match &global.log_file {
        Some(dir) => {
            let path = log_file_path(dir);
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
            let file = File::create(&path)
                .with_context(|| format!("Failed to create log file {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init()
                .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;
            Ok(Some(path))
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .try_init()
                .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;
            Ok(None)
        }
    }
}

fn log_file_path(dir: &Path) -> PathBuf {
    let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    dir.join(format!("geoflow_{}.log", stamp))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levels() {
        assert_eq!(level_for(0), "warn");
        assert_eq!(level_for(1), "info");
        assert_eq!(level_for(2), "debug");
        assert_eq!(level_for(9), "trace");
    }

    #[test]
    fn test_log_file_name() {
        let path = log_file_path(Path::new("logs"));
        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("geoflow_"));
        assert!(name.ends_with(".log"));
        assert_eq!(path.parent().unwrap(), Path::new("logs"));
    }
}
