use crate::checkpoint::{self, CheckpointStore, CursorTracker, FeedTimestamp, FileStore};
use crate::config::Config;
use crate::dedup::AcknowledgedSet;
use crate::enrich::http::parse_url;
use crate::enrich::{
  CollectorSubmitter, DisabledSubmitter, FingerprintScanner, HttpClient, JarmOnlineOverlap,
  JarmOnlineScanner, OverlapFilter, ScanReply, Submitter,
};
use crate::feed::{self, FeedClient, RawIoc, ThreatFoxClient};
use crate::paths;
use crate::runtime;
use crate::types::{Endpoint, ItemOutcome, SkipReason, SubmissionRecord, C2_THREAT_TYPE};
use anyhow::Context;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSettings {
  pub lookback_days: u32,
  pub max_ioc_to_compute: usize,
}

impl RunSettings {
  pub fn from_config(cfg: &Config) -> Self {
    Self {
      lookback_days: cfg.feed.lookback_days,
      max_ioc_to_compute: cfg.pipeline.max_ioc_to_compute,
    }
  }
}

#[derive(Debug, Clone)]
pub struct RunSummary {
  pub run_id: String,
  pub processed: usize,
  pub submitted: usize,
  pub failed: usize,
  pub skipped: BTreeMap<&'static str, usize>,
  pub checkpoint: Option<FeedTimestamp>,
  pub checkpoint_saved: bool,
  pub budget_exhausted: bool,
  pub duration: Duration,
}

impl RunSummary {
  pub fn skipped_total(&self) -> usize {
    self.skipped.values().sum()
  }
}

struct RunState {
  acknowledged: AcknowledgedSet,
  cursor: CursorTracker,
}

pub struct Jarmer {
  feed: Box<dyn FeedClient>,
  scanner: Box<dyn FingerprintScanner>,
  overlap: Box<dyn OverlapFilter>,
  submitter: Box<dyn Submitter>,
  store: Box<dyn CheckpointStore>,
  settings: RunSettings,
}

impl Jarmer {
  pub fn new(
    feed: Box<dyn FeedClient>,
    scanner: Box<dyn FingerprintScanner>,
    overlap: Box<dyn OverlapFilter>,
    submitter: Box<dyn Submitter>,
    store: Box<dyn CheckpointStore>,
    settings: RunSettings,
  ) -> Self {
    Self {
      feed,
      scanner,
      overlap,
      submitter,
      store,
      settings,
    }
  }

  pub fn from_config(cfg: &Config, base: &Path) -> anyhow::Result<Self> {
    let http = HttpClient::new(Duration::from_secs(cfg.jarm.timeout_seconds))?;

    let feed = ThreatFoxClient::new(
      http.clone(),
      parse_url(&cfg.feed.url).context("feed.url")?,
      Some(cfg.feed.api_key.clone()),
    );
    let scanner = JarmOnlineScanner::new(
      http.clone(),
      parse_url(&cfg.jarm.scan_url).context("jarm.scan_url")?,
    );
    let overlap = JarmOnlineOverlap::new(
      http.clone(),
      parse_url(&cfg.jarm.overlap_url).context("jarm.overlap_url")?,
    );
    let submitter: Box<dyn Submitter> = if cfg.collector.enabled() {
      Box::new(CollectorSubmitter::new(
        http,
        parse_url(&cfg.collector.url).context("collector.url")?,
        cfg.collector.token.clone(),
      ))
    } else {
      Box::new(DisabledSubmitter)
    };
    let store = FileStore::new(paths::checkpoint_path(base));

    Ok(Self::new(
      Box::new(feed),
      Box::new(scanner),
      Box::new(overlap),
      submitter,
      Box::new(store),
      RunSettings::from_config(cfg),
    ))
  }

  pub fn settings(&self) -> RunSettings {
    self.settings
  }

  // Only a feed query failure aborts the run.
  pub fn run(&self) -> anyhow::Result<RunSummary> {
    let started = Instant::now();
    let run_id = uuid::Uuid::new_v4().to_string();
    let span = tracing::info_span!("run", run_id = %run_id);
    let _guard = span.enter();

    let processed_up_to = checkpoint::load_checkpoint(self.store.as_ref());
    let items = self
      .feed
      .fetch_recent(self.settings.lookback_days)
      .context("query threat feed")?;
    let items = feed::chronological(items);
    tracing::info!(
      items = items.len(),
      processed_up_to = %processed_up_to,
      budget = self.settings.max_ioc_to_compute,
      "feed window loaded"
    );

    let mut state = RunState {
      acknowledged: AcknowledgedSet::new(),
      cursor: CursorTracker::new(processed_up_to),
    };
    let mut submitted = 0usize;
    let mut failed = 0usize;
    let mut skipped: BTreeMap<&'static str, usize> = BTreeMap::new();
    let mut budget_exhausted = false;

    for (idx, raw) in items.iter().enumerate() {
      match self.process_item(raw, &mut state) {
        ItemOutcome::Processed { submitted: true } => submitted += 1,
        ItemOutcome::Processed { submitted: false } => {}
        ItemOutcome::Skipped(reason) => *skipped.entry(reason.as_str()).or_default() += 1,
        ItemOutcome::Failed(e) => {
          failed += 1;
          tracing::warn!(ioc = raw.label(), error = ?e, "ioc enrichment failed; continuing");
        }
      }

      if state.acknowledged.len() >= self.settings.max_ioc_to_compute {
        budget_exhausted = true;
        let rest = &items[idx + 1..];
        if splits_timestamp_group(rest, &state) && state.cursor.rollback_split_group() {
          tracing::info!(
            "budget reached inside a group of identical 'first_seen'; checkpoint held before the group"
          );
        }
        tracing::info!(
          processed = state.acknowledged.len(),
          remaining = rest.len(),
          "per-run budget reached"
        );
        break;
      }
    }

    let processed = state.acknowledged.len();
    let checkpoint = state.cursor.finish();
    let checkpoint_saved = match checkpoint {
      Some(ts) => self.persist_checkpoint(ts),
      None => false,
    };

    let summary = RunSummary {
      run_id,
      processed,
      submitted,
      failed,
      skipped,
      checkpoint,
      checkpoint_saved,
      budget_exhausted,
      duration: started.elapsed(),
    };
    tracing::info!(
      processed = summary.processed,
      submitted = summary.submitted,
      failed = summary.failed,
      skipped = summary.skipped_total(),
      duration_ms = summary.duration.as_millis() as u64,
      "run complete"
    );
    Ok(summary)
  }

  fn process_item(&self, raw: &RawIoc, state: &mut RunState) -> ItemOutcome {
    if raw.threat_type.as_deref() != Some(C2_THREAT_TYPE) {
      return ItemOutcome::Skipped(SkipReason::NotC2);
    }

    let Some(first_seen) = raw.parsed_first_seen() else {
      tracing::debug!(ioc = raw.label(), first_seen = ?raw.first_seen, "skipping ioc with unreadable 'first_seen'");
      return ItemOutcome::Skipped(SkipReason::BadTimestamp);
    };
    if state.cursor.is_behind(first_seen) {
      tracing::debug!(ioc = raw.label(), first_seen = %first_seen, "skipping ioc as already processed");
      return ItemOutcome::Skipped(SkipReason::AlreadyProcessed);
    }

    let ioc = raw.clone().into_indicator(first_seen);
    let endpoint = match Endpoint::from_indicator(&ioc) {
      Ok(ep) => ep,
      Err(e) => {
        tracing::debug!(ioc = raw.label(), error = %e, "skipping ioc with unusable value");
        return ItemOutcome::Skipped(SkipReason::BadEndpoint);
      }
    };

    if state.acknowledged.contains(&endpoint) {
      state.cursor.record(first_seen);
      return ItemOutcome::Skipped(SkipReason::Duplicate);
    }
    // Claimed before scanning so a repeat later in the window is never rescanned.
    state.acknowledged.add(&endpoint);

    let fingerprint = match self.scanner.scan(&endpoint) {
      Ok(ScanReply::Fingerprint(fp)) => fp,
      Ok(ScanReply::RemoteError { host, error }) => {
        tracing::info!(host = %host, error = %error, "fingerprint service could not scan endpoint");
        state.cursor.record(first_seen);
        return ItemOutcome::Skipped(SkipReason::RemoteScanError(error));
      }
      Err(e) => {
        let what = if e.is_timeout() {
          format!("scan {endpoint} timed out")
        } else {
          format!("scan {endpoint}")
        };
        return ItemOutcome::Failed(anyhow::Error::new(e).context(what));
      }
    };
    let scanned_at = FeedTimestamp::now();
    tracing::info!(host = %fingerprint.host, jarm_hash = %fingerprint.jarm_hash, "fingerprint computed");
    // A successful scan counts as inspected even if overlap or submit fails.
    state.cursor.record(first_seen);

    match self.overlap.has_overlap(&fingerprint.jarm_hash) {
      Ok(true) => return ItemOutcome::Skipped(SkipReason::CommonFingerprint),
      Ok(false) => {}
      Err(e) => {
        let e = anyhow::Error::new(e).context(format!("overlap check {}", fingerprint.jarm_hash));
        return ItemOutcome::Failed(e);
      }
    }

    let record = SubmissionRecord::new(&ioc, &fingerprint, scanned_at);
    if runtime::is_dry_run() {
      tracing::warn!(
        host = %record.host,
        jarm_hash = %record.jarm_hash,
        "DRY-RUN: would submit confirmed fingerprint"
      );
      return ItemOutcome::Processed { submitted: false };
    }

    match self.submitter.submit(&record) {
      Ok(()) if self.submitter.forwards() => {
        tracing::info!(host = %record.host, port = ?record.port, jarm_hash = %record.jarm_hash, "confirmed fingerprint submitted");
        ItemOutcome::Processed { submitted: true }
      }
      Ok(()) => ItemOutcome::Processed { submitted: false },
      Err(e) => ItemOutcome::Failed(anyhow::Error::new(e).context(format!("submit {endpoint}"))),
    }
  }

  fn persist_checkpoint(&self, ts: FeedTimestamp) -> bool {
    if runtime::is_dry_run() {
      tracing::warn!(checkpoint = %ts, "DRY-RUN: would save last 'first_seen' processed");
      return false;
    }
    match checkpoint::save_checkpoint(self.store.as_ref(), ts) {
      Ok(()) => {
        tracing::info!(checkpoint = %ts, "saved last 'first_seen' processed");
        true
      }
      Err(e) => {
        tracing::warn!(checkpoint = %ts, error = ?e, "checkpoint write failed; next run reprocesses this window");
        false
      }
    }
  }
}

// An unvisited item at the candidate's timestamp that the next run would scan.
fn splits_timestamp_group(rest: &[RawIoc], state: &RunState) -> bool {
  let Some(candidate) = state.cursor.candidate() else {
    return false;
  };
  rest.iter().any(|raw| {
    if raw.threat_type.as_deref() != Some(C2_THREAT_TYPE) || raw.parsed_first_seen() != Some(candidate) {
      return false;
    }
    let ioc = raw.clone().into_indicator(candidate);
    match Endpoint::from_indicator(&ioc) {
      Ok(ep) => !state.acknowledged.contains(&ep),
      Err(_) => false,
    }
  })
}
