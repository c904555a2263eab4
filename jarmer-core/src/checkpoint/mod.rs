use std::fmt;
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime};

pub mod store;

pub use store::{CheckpointStore, FileStore, MemoryStore};

pub const CHECKPOINT_KEY: &str = "first_seen_processed";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FeedTimestamp(OffsetDateTime);

impl FeedTimestamp {
  pub const EPOCH: Self = Self(OffsetDateTime::UNIX_EPOCH);

  pub fn now() -> Self {
    Self(OffsetDateTime::now_utc())
  }

  pub fn parse(raw: &str) -> anyhow::Result<Self> {
    let format = format_description!("[year]-[month]-[day] [hour]:[minute]:[second] UTC");
    let dt = PrimitiveDateTime::parse(raw.trim(), &format)
      .map_err(|e| anyhow::anyhow!("invalid feed timestamp {raw:?}: {e}"))?;
    Ok(Self(dt.assume_utc()))
  }

  #[cfg(test)]
  pub fn from_unix_nanos(nanos: i128) -> anyhow::Result<Self> {
    let dt = OffsetDateTime::from_unix_timestamp_nanos(nanos)
      .map_err(|e| anyhow::anyhow!("timestamp out of range: {e}"))?;
    Ok(Self(dt))
  }

  pub fn ceil_unix_seconds(&self) -> i64 {
    let secs = self.0.unix_timestamp();
    if self.0.nanosecond() > 0 {
      secs + 1
    } else {
      secs
    }
  }

  pub fn to_feed_string(&self) -> String {
    self.to_string()
  }
}

impl fmt::Display for FeedTimestamp {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let format = format_description!("[year]-[month]-[day] [hour]:[minute]:[second] UTC");
    let plain = PrimitiveDateTime::new(self.0.date(), self.0.time());
    let text = plain.format(&format).map_err(|_| fmt::Error)?;
    f.write_str(&text)
  }
}

pub fn load_checkpoint(store: &dyn CheckpointStore) -> FeedTimestamp {
  match store.get(CHECKPOINT_KEY) {
    Ok(Some(raw)) => match FeedTimestamp::parse(&raw) {
      Ok(ts) => {
        tracing::info!(checkpoint = %ts, "retrieved last 'first_seen' processed");
        ts
      }
      Err(e) => {
        tracing::warn!(raw = %raw, error = %e, "stored checkpoint unparseable; starting from epoch");
        FeedTimestamp::EPOCH
      }
    },
    Ok(None) => {
      tracing::info!("no last 'first_seen' found in checkpoint store");
      FeedTimestamp::EPOCH
    }
    Err(e) => {
      tracing::warn!(error = ?e, "checkpoint store unavailable; starting from epoch");
      FeedTimestamp::EPOCH
    }
  }
}

pub fn save_checkpoint(store: &dyn CheckpointStore, ts: FeedTimestamp) -> anyhow::Result<()> {
  store.put(CHECKPOINT_KEY, &ts.to_feed_string())
}

// `earlier` is the latest timestamp strictly before the candidate: where the
// cursor falls back when a budget cutoff splits a `first_seen` group.
#[derive(Debug, Clone)]
pub struct CursorTracker {
  start: FeedTimestamp,
  candidate: Option<FeedTimestamp>,
  earlier: Option<FeedTimestamp>,
}

impl CursorTracker {
  pub fn new(start: FeedTimestamp) -> Self {
    Self {
      start,
      candidate: None,
      earlier: None,
    }
  }

  pub fn candidate(&self) -> Option<FeedTimestamp> {
    self.candidate
  }

  pub fn is_behind(&self, ts: FeedTimestamp) -> bool {
    ts <= self.start
  }

  pub fn record(&mut self, ts: FeedTimestamp) {
    if ts <= self.start {
      return;
    }
    match self.candidate {
      None => self.candidate = Some(ts),
      Some(current) if ts > current => {
        self.earlier = Some(current);
        self.candidate = Some(ts);
      }
      Some(_) => {}
    }
  }

  // Keeps the candidate when nothing earlier was inspected, so the cursor cannot stall.
  pub fn rollback_split_group(&mut self) -> bool {
    match self.earlier.take() {
      Some(earlier) => {
        self.candidate = Some(earlier);
        true
      }
      None => false,
    }
  }

  pub fn finish(self) -> Option<FeedTimestamp> {
    self.candidate.filter(|ts| *ts > self.start)
  }
}
