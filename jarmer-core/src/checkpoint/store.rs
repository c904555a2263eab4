use anyhow::Context;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub trait CheckpointStore {
  fn get(&self, key: &str) -> anyhow::Result<Option<String>>;
  fn put(&self, key: &str, value: &str) -> anyhow::Result<()>;
}

impl<T: CheckpointStore + ?Sized> CheckpointStore for std::sync::Arc<T> {
  fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
    (**self).get(key)
  }

  fn put(&self, key: &str, value: &str) -> anyhow::Result<()> {
    (**self).put(key, value)
  }
}

#[derive(Debug, Clone)]
pub struct FileStore {
  path: PathBuf,
}

impl FileStore {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self { path: path.into() }
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  fn read_all(&self) -> anyhow::Result<BTreeMap<String, String>> {
    if !self.path.exists() {
      return Ok(BTreeMap::new());
    }
    let raw = fs::read_to_string(&self.path)
      .with_context(|| format!("read {}", self.path.display()))?;
    toml::from_str(&raw).with_context(|| format!("parse {}", self.path.display()))
  }
}

impl CheckpointStore for FileStore {
  fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
    Ok(self.read_all()?.remove(key))
  }

  fn put(&self, key: &str, value: &str) -> anyhow::Result<()> {
    // A corrupt file is replaced rather than blocking every future write.
    let mut entries = self.read_all().unwrap_or_default();
    entries.insert(key.to_string(), value.to_string());
    let raw = toml::to_string_pretty(&entries)?;
    write_atomic(&self.path, &raw)
  }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
  entries: Mutex<BTreeMap<String, String>>,
}

impl CheckpointStore for MemoryStore {
  fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
    let entries = self
      .entries
      .lock()
      .map_err(|_| anyhow::anyhow!("memory store lock poisoned"))?;
    Ok(entries.get(key).cloned())
  }

  fn put(&self, key: &str, value: &str) -> anyhow::Result<()> {
    let mut entries = self
      .entries
      .lock()
      .map_err(|_| anyhow::anyhow!("memory store lock poisoned"))?;
    entries.insert(key.to_string(), value.to_string());
    Ok(())
  }
}

fn write_atomic(path: &Path, contents: &str) -> anyhow::Result<()> {
  let parent = path
    .parent()
    .ok_or_else(|| anyhow::anyhow!("checkpoint path has no parent: {}", path.display()))?;
  fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;

  let tmp = parent.join(format!(
    ".{}.tmp",
    path.file_name().unwrap_or_default().to_string_lossy()
  ));
  fs::write(&tmp, contents).with_context(|| format!("write {}", tmp.display()))?;
  fs::rename(&tmp, path)
    .with_context(|| format!("rename {} -> {}", tmp.display(), path.display()))?;
  Ok(())
}
