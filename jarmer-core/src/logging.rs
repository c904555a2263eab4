use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::{Duration, SystemTime};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

const LOG_FILE_NAME: &str = "jarmer.log";

static FILE_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

pub fn init_stderr_only(level: &str) -> anyhow::Result<()> {
  tracing_subscriber::registry()
    .with(env_filter(level))
    .with(
      tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(std::io::stderr)
        .with_target(true),
    )
    .try_init()
    .map_err(|e| anyhow::anyhow!("install tracing subscriber: {e}"))
}

pub fn init_file_and_stderr(
  log_dir: &Path,
  level: &str,
  retention_days: u64,
) -> anyhow::Result<()> {
  fs::create_dir_all(log_dir)?;
  cleanup_old_logs(log_dir, retention_days)?;

  let file_appender = tracing_appender::rolling::daily(log_dir, LOG_FILE_NAME);
  let (file_writer, guard) = tracing_appender::non_blocking(file_appender);
  let _ = FILE_GUARD.set(guard);

  let file_layer = tracing_subscriber::fmt::layer()
    .with_ansi(false)
    .with_writer(file_writer)
    .with_target(true);

  let stderr_layer = tracing_subscriber::fmt::layer()
    .with_ansi(false)
    .with_writer(std::io::stderr)
    .with_target(true);

  tracing_subscriber::registry()
    .with(env_filter(level))
    .with(file_layer)
    .with(stderr_layer)
    .try_init()
    .map_err(|e| anyhow::anyhow!("install tracing subscriber: {e}"))
}

fn env_filter(level: &str) -> tracing_subscriber::EnvFilter {
  tracing_subscriber::EnvFilter::try_new(level)
    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
}

fn cleanup_old_logs(log_dir: &Path, retention_days: u64) -> anyhow::Result<()> {
  if retention_days == 0 {
    return Ok(());
  }

  let cutoff = SystemTime::now()
    .checked_sub(Duration::from_secs(retention_days.saturating_mul(24 * 60 * 60)))
    .unwrap_or(SystemTime::UNIX_EPOCH);

  let entries = match fs::read_dir(log_dir) {
    Ok(e) => e,
    Err(_) => return Ok(()),
  };

  for entry in entries.flatten() {
    let path: PathBuf = entry.path();
    if !is_jarmer_log_file(&path) {
      continue;
    }

    let modified = match entry.metadata().and_then(|m| m.modified()) {
      Ok(t) => t,
      Err(_) => continue,
    };

    if modified < cutoff {
      let _ = fs::remove_file(&path);
    }
  }

  Ok(())
}

fn is_jarmer_log_file(path: &Path) -> bool {
  let name = match path.file_name().and_then(|n| n.to_str()) {
    Some(n) => n,
    None => return false,
  };

  name == LOG_FILE_NAME || name.starts_with("jarmer.log.")
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn only_rotated_jarmer_logs_are_cleanup_candidates() {
    assert!(is_jarmer_log_file(Path::new("/tmp/logs/jarmer.log")));
    assert!(is_jarmer_log_file(Path::new("/tmp/logs/jarmer.log.2024-01-01")));
    assert!(!is_jarmer_log_file(Path::new("/tmp/logs/checkpoint.toml")));
    assert!(!is_jarmer_log_file(Path::new("/tmp/logs/other.log")));
  }

  #[test]
  fn zero_retention_keeps_everything() {
    let dir = tempfile::TempDir::new().unwrap();
    let old = dir.path().join("jarmer.log.2020-01-01");
    fs::write(&old, "x").unwrap();

    cleanup_old_logs(dir.path(), 0).unwrap();
    assert!(old.exists());
  }
}
