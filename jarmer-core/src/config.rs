use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

pub const ENV_FEED_API_KEY: &str = "THREATFOX_API_KEY";
pub const ENV_COLLECTOR_TOKEN: &str = "JARMER_COLLECTOR_TOKEN";
pub const ENV_MAX_IOC: &str = "JARMER_MAX_IOC";

const MAX_LOOKBACK_DAYS: u32 = 7;

#[derive(Debug, Clone, Default)]
pub struct Config {
  pub logging: LoggingConfig,
  pub feed: FeedConfig,
  pub jarm: JarmConfig,
  pub collector: CollectorConfig,
  pub pipeline: PipelineConfig,
  pub schedule: ScheduleConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
  #[serde(default = "default_log_level")]
  pub level: String,

  #[serde(default = "default_retention_days")]
  pub retention_days: u64,
}

impl Default for LoggingConfig {
  fn default() -> Self {
    Self {
      level: default_log_level(),
      retention_days: default_retention_days(),
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
  #[serde(default = "default_feed_url")]
  pub url: String,

  #[serde(default)]
  pub api_key: String,

  #[serde(default = "default_lookback_days")]
  pub lookback_days: u32,
}

impl Default for FeedConfig {
  fn default() -> Self {
    Self {
      url: default_feed_url(),
      api_key: String::new(),
      lookback_days: default_lookback_days(),
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JarmConfig {
  #[serde(default = "default_scan_url")]
  pub scan_url: String,

  #[serde(default = "default_overlap_url")]
  pub overlap_url: String,

  #[serde(default = "default_timeout_seconds")]
  pub timeout_seconds: u64,
}

impl Default for JarmConfig {
  fn default() -> Self {
    Self {
      scan_url: default_scan_url(),
      overlap_url: default_overlap_url(),
      timeout_seconds: default_timeout_seconds(),
    }
  }
}

// An empty `url` disables forwarding.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CollectorConfig {
  #[serde(default)]
  pub url: String,

  #[serde(default)]
  pub token: String,
}

impl CollectorConfig {
  pub fn enabled(&self) -> bool {
    !self.url.trim().is_empty()
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
  #[serde(default = "default_max_ioc_to_compute")]
  pub max_ioc_to_compute: usize,
}

impl Default for PipelineConfig {
  fn default() -> Self {
    Self {
      max_ioc_to_compute: default_max_ioc_to_compute(),
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
  #[serde(default = "default_interval_minutes")]
  pub interval_minutes: u64,
}

impl Default for ScheduleConfig {
  fn default() -> Self {
    Self {
      interval_minutes: default_interval_minutes(),
    }
  }
}

fn default_log_level() -> String {
  "info".to_string()
}

fn default_retention_days() -> u64 {
  14
}

fn default_feed_url() -> String {
  "https://threatfox-api.abuse.ch/api/v1/".to_string()
}

fn default_lookback_days() -> u32 {
  1
}

fn default_scan_url() -> String {
  "https://jarm.online/api/v1/jarm".to_string()
}

fn default_overlap_url() -> String {
  "https://jarm.online/api/v1/overlapping_domains".to_string()
}

fn default_timeout_seconds() -> u64 {
  30
}

fn default_max_ioc_to_compute() -> usize {
  100
}

fn default_interval_minutes() -> u64 {
  60
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ConfigFile {
  #[serde(default)]
  pub logging: Option<LoggingConfig>,

  #[serde(default)]
  pub feed: Option<FeedConfig>,

  #[serde(default)]
  pub jarm: Option<JarmConfig>,

  #[serde(default)]
  pub collector: Option<CollectorConfig>,

  #[serde(default)]
  pub pipeline: Option<PipelineConfig>,

  #[serde(default)]
  pub schedule: Option<ScheduleConfig>,
}

impl ConfigFile {
  fn normalize(self) -> Config {
    let mut cfg = Config::default();
    if let Some(l) = self.logging {
      cfg.logging = l;
    }
    if let Some(f) = self.feed {
      cfg.feed = f;
    }
    if let Some(j) = self.jarm {
      cfg.jarm = j;
    }
    if let Some(c) = self.collector {
      cfg.collector = c;
    }
    if let Some(p) = self.pipeline {
      cfg.pipeline = p;
    }
    if let Some(s) = self.schedule {
      cfg.schedule = s;
    }
    sanitize(&mut cfg);
    cfg
  }

  fn needs_upgrade(&self) -> bool {
    self.logging.is_none()
      || self.feed.is_none()
      || self.jarm.is_none()
      || self.collector.is_none()
      || self.pipeline.is_none()
      || self.schedule.is_none()
  }
}

pub fn load_or_create_default(path: &Path) -> anyhow::Result<Config> {
  load_impl(path, true)
}

pub fn load_or_default_readonly(path: &Path) -> anyhow::Result<Config> {
  load_impl(path, false)
}

fn load_impl(path: &Path, allow_writes: bool) -> anyhow::Result<Config> {
  let parent = path
    .parent()
    .ok_or_else(|| anyhow::anyhow!("config path has no parent: {}", path.display()))?;
  if allow_writes {
    fs::create_dir_all(parent)?;
  }

  if !path.exists() {
    let cfg = Config::default();
    if allow_writes {
      write_atomic(path, &toml::to_string_pretty(&to_config_file(&cfg))?)?;
    } else {
      eprintln!(
        "jarmer: config missing at {}; using defaults in read-only mode (--dry-run).",
        path.display()
      );
    }
    return Ok(with_env_overrides(cfg));
  }

  let raw = fs::read_to_string(path)?;
  let cfg = match toml::from_str::<ConfigFile>(&raw) {
    Ok(file) => {
      let cfg = file.clone().normalize();
      if allow_writes && file.needs_upgrade() {
        let backup = parent.join(format!("config.toml.bak-{}", now_unix_s()));
        let _ = fs::copy(path, &backup);
        let _ = write_atomic(path, &toml::to_string_pretty(&to_config_file(&cfg))?);
        eprintln!(
          "jarmer: upgraded config defaults written to {} (backup: {})",
          path.display(),
          backup.display()
        );
      }
      cfg
    }
    Err(e) => {
      let cfg = Config::default();
      if allow_writes {
        let backup = parent.join(format!("config.toml.bad-{}", now_unix_s()));
        let _ = fs::rename(path, &backup);
        write_atomic(path, &toml::to_string_pretty(&to_config_file(&cfg))?)?;
        eprintln!(
          "jarmer: invalid config at {} (backed up to {}): {e}",
          path.display(),
          backup.display()
        );
      } else {
        eprintln!(
          "jarmer: invalid config at {}; using defaults in read-only mode (--dry-run): {e}",
          path.display()
        );
      }
      cfg
    }
  };

  Ok(with_env_overrides(cfg))
}

// Runs before logging is installed, so diagnostics go straight to stderr.
// Values taken from the environment are never written back to the file.
fn with_env_overrides(cfg: Config) -> Config {
  apply_overrides(cfg, |name| std::env::var(name).ok())
}

fn apply_overrides(mut cfg: Config, lookup: impl Fn(&str) -> Option<String>) -> Config {
  if let Some(key) = lookup(ENV_FEED_API_KEY).filter(|v| !v.trim().is_empty()) {
    cfg.feed.api_key = key;
  }
  if let Some(token) = lookup(ENV_COLLECTOR_TOKEN).filter(|v| !v.trim().is_empty()) {
    cfg.collector.token = token;
  }
  if let Some(raw) = lookup(ENV_MAX_IOC) {
    match raw.trim().parse::<usize>() {
      Ok(n) if n > 0 => cfg.pipeline.max_ioc_to_compute = n,
      _ => eprintln!("jarmer: {ENV_MAX_IOC}={raw:?} ignored; expected a positive integer"),
    }
  }
  if let Some(reason) = validate_collector_config(&cfg.collector) {
    eprintln!("jarmer: collector config invalid ({reason}); forwarding disabled");
    cfg.collector.url.clear();
  }
  cfg
}

fn to_config_file(cfg: &Config) -> ConfigFile {
  ConfigFile {
    logging: Some(cfg.logging.clone()),
    feed: Some(cfg.feed.clone()),
    jarm: Some(cfg.jarm.clone()),
    collector: Some(cfg.collector.clone()),
    pipeline: Some(cfg.pipeline.clone()),
    schedule: Some(cfg.schedule.clone()),
  }
}

fn write_atomic(path: &Path, contents: &str) -> anyhow::Result<()> {
  let parent = path
    .parent()
    .ok_or_else(|| anyhow::anyhow!("file path has no parent: {}", path.display()))?;
  let tmp = parent.join(format!(
    ".{}.tmp",
    path.file_name().unwrap_or_default().to_string_lossy()
  ));

  fs::write(&tmp, contents)?;
  fs::rename(&tmp, path)?;
  Ok(())
}

fn now_unix_s() -> u64 {
  std::time::SystemTime::now()
    .duration_since(std::time::UNIX_EPOCH)
    .unwrap_or_default()
    .as_secs()
}

fn sanitize(cfg: &mut Config) {
  if let Some(reason) = validate_https_url(&cfg.feed.url) {
    eprintln!("jarmer: feed.url invalid ({reason}); using default");
    cfg.feed.url = default_feed_url();
  }
  if cfg.feed.lookback_days == 0 || cfg.feed.lookback_days > MAX_LOOKBACK_DAYS {
    eprintln!(
      "jarmer: feed.lookback_days = {} must be within 1..={MAX_LOOKBACK_DAYS}; using default",
      cfg.feed.lookback_days
    );
    cfg.feed.lookback_days = default_lookback_days();
  }
  if let Some(reason) = validate_https_url(&cfg.jarm.scan_url) {
    eprintln!("jarmer: jarm.scan_url invalid ({reason}); using default");
    cfg.jarm.scan_url = default_scan_url();
  }
  if let Some(reason) = validate_https_url(&cfg.jarm.overlap_url) {
    eprintln!("jarmer: jarm.overlap_url invalid ({reason}); using default");
    cfg.jarm.overlap_url = default_overlap_url();
  }
  if cfg.jarm.timeout_seconds == 0 {
    eprintln!("jarmer: jarm.timeout_seconds must be > 0; using default");
    cfg.jarm.timeout_seconds = default_timeout_seconds();
  }
  if cfg.pipeline.max_ioc_to_compute == 0 {
    eprintln!("jarmer: pipeline.max_ioc_to_compute must be > 0; using default");
    cfg.pipeline.max_ioc_to_compute = default_max_ioc_to_compute();
  }
  if cfg.schedule.interval_minutes == 0 {
    eprintln!("jarmer: schedule.interval_minutes must be > 0; using default");
    cfg.schedule.interval_minutes = default_interval_minutes();
  }
}

fn validate_collector_config(cfg: &CollectorConfig) -> Option<String> {
  if !cfg.enabled() {
    return None;
  }
  if let Some(reason) = validate_https_url(&cfg.url) {
    return Some(reason);
  }
  if cfg.token.trim().is_empty() {
    return Some(format!("collector.token missing (set it or {ENV_COLLECTOR_TOKEN})"));
  }
  None
}

fn validate_https_url(raw: &str) -> Option<String> {
  let Ok(url) = reqwest::Url::parse(raw.trim()) else {
    return Some(format!("invalid URL: {raw}"));
  };
  if url.scheme() != "https" {
    return Some(format!("URL must use HTTPS: {raw}"));
  }
  if url.host_str().is_none() {
    return Some(format!("URL has no host: {raw}"));
  }
  None
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::collections::HashMap;

  fn overrides(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
      .iter()
      .map(|(k, v)| (k.to_string(), v.to_string()))
      .collect();
    move |name: &str| map.get(name).cloned()
  }

  #[test]
  fn missing_file_is_created_with_defaults() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("config.toml");

    let cfg = load_or_create_default(&path).unwrap();
    assert_eq!(cfg.feed.lookback_days, 1);
    assert_eq!(cfg.pipeline.max_ioc_to_compute, 100);
    assert!(path.exists());

    let written: ConfigFile = toml::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    assert!(!written.needs_upgrade());
  }

  #[test]
  fn partial_file_keeps_values_and_fills_sections() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(&path, "[pipeline]\nmax_ioc_to_compute = 25\n").unwrap();

    let cfg = load_or_create_default(&path).unwrap();
    assert_eq!(cfg.pipeline.max_ioc_to_compute, 25);
    assert_eq!(cfg.jarm.scan_url, default_scan_url());

    let raw = fs::read_to_string(&path).unwrap();
    assert!(raw.contains("[jarm]"));
  }

  #[test]
  fn invalid_file_is_backed_up_and_replaced() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(&path, "pipeline = = 3").unwrap();

    let cfg = load_or_create_default(&path).unwrap();
    assert_eq!(cfg.pipeline.max_ioc_to_compute, 100);

    let backups = fs::read_dir(dir.path())
      .unwrap()
      .flatten()
      .filter(|e| e.file_name().to_string_lossy().starts_with("config.toml.bad-"))
      .count();
    assert_eq!(backups, 1);
  }

  #[test]
  fn out_of_range_values_revert_to_defaults() {
    let file: ConfigFile = toml::from_str(
      r#"
[feed]
url = "http://threatfox-api.abuse.ch/api/v1/"
lookback_days = 30

[jarm]
timeout_seconds = 0

[pipeline]
max_ioc_to_compute = 0
"#,
    )
    .unwrap();

    let cfg = file.normalize();
    assert_eq!(cfg.feed.url, default_feed_url());
    assert_eq!(cfg.feed.lookback_days, 1);
    assert_eq!(cfg.jarm.timeout_seconds, 30);
    assert_eq!(cfg.pipeline.max_ioc_to_compute, 100);
  }

  #[test]
  fn environment_supplies_secrets_and_budget() {
    let mut cfg = Config::default();
    cfg.collector.url = "https://collector.example/api/jarm".to_string();

    let cfg = apply_overrides(
      cfg,
      overrides(&[
        (ENV_FEED_API_KEY, "feed-key"),
        (ENV_COLLECTOR_TOKEN, "secret"),
        (ENV_MAX_IOC, "7"),
      ]),
    );
    assert_eq!(cfg.feed.api_key, "feed-key");
    assert_eq!(cfg.collector.token, "secret");
    assert_eq!(cfg.pipeline.max_ioc_to_compute, 7);
    assert!(cfg.collector.enabled());
  }

  #[test]
  fn collector_without_token_is_disabled() {
    let mut cfg = Config::default();
    cfg.collector.url = "https://collector.example/api/jarm".to_string();

    let cfg = apply_overrides(cfg, overrides(&[(ENV_MAX_IOC, "zero")]));
    assert!(!cfg.collector.enabled());
    assert_eq!(cfg.pipeline.max_ioc_to_compute, 100);
  }
}
