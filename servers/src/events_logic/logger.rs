use anyhow::Result;
use log::LevelFilter;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

const LOG_PREFIX: &str = "server_events_";

// Crates whose records follow the configured level. Everything else is held
// at `DEPENDENCY_LEVEL`.
const OWN_TARGETS: [&str; 3] = ["lib_eventstream", "servers", "server_events"];
const DEPENDENCY_LEVEL: LevelFilter = LevelFilter::Warn;

/// Installs the global logger: stdout plus a fresh timestamped file under
/// `log_dir`. Older `.log` files in the directory are removed first.
pub fn setup_logging(log_dir: &Path, log_level: &str) -> Result<()> {
    fs::create_dir_all(log_dir)?;
    let removed = cleanup_old_logs(log_dir)?;

    let log_path = log_dir.join(format!(
        "{}{}.log",
        LOG_PREFIX,
        chrono::Local::now().format("%Y-%m-%d_%H-%M-%S")
    ));
    let level = parse_level(log_level);

    dispatch(level)
        .chain(std::io::stdout())
        .chain(fern::log_file(&log_path)?)
        .apply()?;

    log::info!("Logging at {} to {}", level, log_path.display());
    for (path, err) in removed.failed {
        log::warn!("Failed to delete old log file {}: {}", path.display(), err);
    }
    if removed.deleted > 0 {
        log::debug!("Removed {} old log files", removed.deleted);
    }
    Ok(())
}

/// Format and per-target levels, without outputs.
fn dispatch(level: LevelFilter) -> fern::Dispatch {
    let base = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "{} {:<5} {}: {}",
                chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f"),
                record.level(),
                record.target(),
                message
            ))
        })
        .level(DEPENDENCY_LEVEL.min(level));

    OWN_TARGETS
        .iter()
        .fold(base, |dispatch, target| dispatch.level_for(*target, level))
}

fn parse_level(log_level: &str) -> LevelFilter {
    log_level.trim().parse().unwrap_or(LevelFilter::Info)
}

#[derive(Debug, Default)]
struct Cleanup {
    deleted: usize,
    failed: Vec<(PathBuf, std::io::Error)>,
}

/// Deletes every `.log` file in `log_dir` but the most recently modified.
fn cleanup_old_logs(log_dir: &Path) -> Result<Cleanup> {
    let mut entries: Vec<(SystemTime, PathBuf)> = fs::read_dir(log_dir)?
        .filter_map(|res| res.ok())
        .filter(|e| e.path().extension().is_some_and(|ext| ext == "log"))
        .filter_map(|e| {
            let modified = e.metadata().and_then(|m| m.modified()).ok()?;
            Some((modified, e.path()))
        })
        .collect();
    entries.sort_by_key(|(modified, _)| std::cmp::Reverse(*modified));

    let mut cleanup = Cleanup::default();
    for (_, path) in entries.into_iter().skip(1) {
        match fs::remove_file(&path) {
            Ok(()) => cleanup.deleted += 1,
            Err(e) => cleanup.failed.push((path, e)),
        }
    }
    Ok(cleanup)
}

// Lets tests capture formatted output.
#[cfg(test)]
#[derive(Clone, Default)]
struct SharedBuf(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

#[cfg(test)]
impl std::io::Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
