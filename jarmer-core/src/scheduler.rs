use crate::pipeline::Jarmer;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::Duration;

pub struct Scheduler {
  jarmer: Jarmer,
  interval: Duration,
}

impl Scheduler {
  pub fn new(jarmer: Jarmer, interval: Duration) -> Self {
    Self { jarmer, interval }
  }

  pub fn run(&self, stop_rx: mpsc::Receiver<()>) -> anyhow::Result<u64> {
    tracing::info!(
      interval_secs = self.interval.as_secs(),
      budget = self.jarmer.settings().max_ioc_to_compute,
      "scheduler started"
    );

    let mut runs = 0u64;
    loop {
      runs += 1;
      match self.jarmer.run() {
        Ok(summary) => tracing::info!(
          processed = summary.processed,
          took_secs = summary.duration.as_secs_f64(),
          "scheduled run finished"
        ),
        Err(e) => tracing::warn!(error = ?e, "scheduled run aborted; checkpoint unchanged"),
      }

      match stop_rx.recv_timeout(self.interval) {
        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        Err(RecvTimeoutError::Timeout) => continue,
      }
    }

    tracing::info!(runs, "scheduler exiting");
    Ok(runs)
  }
}
