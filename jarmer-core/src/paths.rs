use std::path::{Path, PathBuf};

pub const ENV_HOME: &str = "JARMER_HOME";

pub fn base_dir() -> anyhow::Result<PathBuf> {
  if let Some(dir) = std::env::var_os(ENV_HOME).filter(|v| !v.is_empty()) {
    return Ok(PathBuf::from(dir));
  }
  if let Some(home) = std::env::var_os("HOME").filter(|v| !v.is_empty()) {
    return Ok(PathBuf::from(home).join(".jarmer"));
  }
  Ok(std::env::current_dir()?.join(".jarmer"))
}

pub fn config_path(base: &Path) -> PathBuf {
  base.join("config.toml")
}

pub fn logs_dir(base: &Path) -> PathBuf {
  base.join("logs")
}

pub fn checkpoint_path(base: &Path) -> PathBuf {
  base.join("checkpoint.toml")
}
