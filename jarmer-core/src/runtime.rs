use std::sync::atomic::{AtomicBool, Ordering};

// Dry runs still query the feed and fingerprint endpoints, but neither submit
// nor move the checkpoint.
static DRY_RUN: AtomicBool = AtomicBool::new(false);

pub fn configure_from_args(args: &[String]) -> bool {
  let enabled = args.iter().any(|arg| arg == "--dry-run");
  DRY_RUN.store(enabled, Ordering::SeqCst);
  enabled
}

pub fn is_dry_run() -> bool {
  DRY_RUN.load(Ordering::SeqCst)
}
