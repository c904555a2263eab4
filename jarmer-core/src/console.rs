use crate::checkpoint::{self, CheckpointStore, FeedTimestamp, FileStore, CHECKPOINT_KEY};
use crate::config::Config;
use crate::paths;
use crate::runtime;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleAction {
  RunOnce,
  RunDaemon,
  ExitOk,
}

pub fn run_console_command(cfg: &Config, base: &Path, args: &[String]) -> anyhow::Result<ConsoleAction> {
  if args.iter().any(|a| a == "--help" || a == "-h") {
    print_help(cfg);
    return Ok(ConsoleAction::ExitOk);
  }

  if let Some(i) = args.iter().position(|a| a == "--checkpoint") {
    return run_checkpoint(base, &args[i + 1..]);
  }

  Ok(parse_action(args))
}

fn parse_action(args: &[String]) -> ConsoleAction {
  if args.iter().any(|a| a == "--daemon") {
    ConsoleAction::RunDaemon
  } else {
    ConsoleAction::RunOnce
  }
}

fn run_checkpoint(base: &Path, tail: &[String]) -> anyhow::Result<ConsoleAction> {
  let store = FileStore::new(paths::checkpoint_path(base));

  let sub = tail.first().map(|s| s.as_str()).unwrap_or("show");
  match sub {
    "show" => {
      match store.get(CHECKPOINT_KEY)? {
        Some(raw) => println!("Processed up to: {raw}"),
        None => println!("No checkpoint stored; next run processes the whole feed window."),
      }
      Ok(ConsoleAction::ExitOk)
    }
    "reset" => {
      write_checkpoint(&store, FeedTimestamp::EPOCH)?;
      Ok(ConsoleAction::ExitOk)
    }
    "set" => {
      let raw = tail[1..].join(" ");
      if raw.trim().is_empty() {
        anyhow::bail!("expected: --checkpoint set \"YYYY-MM-DD HH:MM:SS UTC\"");
      }
      let ts = FeedTimestamp::parse(&raw)?;
      write_checkpoint(&store, ts)?;
      Ok(ConsoleAction::ExitOk)
    }
    other => anyhow::bail!("unknown --checkpoint subcommand: {other} (expected show|reset|set)"),
  }
}

fn write_checkpoint(store: &FileStore, ts: FeedTimestamp) -> anyhow::Result<()> {
  if runtime::is_dry_run() {
    println!("DRY-RUN: would set checkpoint to {ts}.");
    return Ok(());
  }
  checkpoint::save_checkpoint(store, ts)?;
  tracing::info!(checkpoint = %ts, "checkpoint set manually");
  println!("Checkpoint set to {ts}.");
  Ok(())
}

fn print_help(cfg: &Config) {
  println!("jarmer {}", env!("CARGO_PKG_VERSION"));
  println!();
  println!("Fingerprints new C2 indicators from the threat feed and forwards the uncommon ones.");
  println!();
  println!("USAGE:");
  println!("  jarmer-core [--once]              run one ingestion pass (default)");
  println!("  jarmer-core --daemon              run every {} minutes until Ctrl-C", cfg.schedule.interval_minutes);
  println!("  jarmer-core --checkpoint show     print the stored cursor");
  println!("  jarmer-core --checkpoint reset    restart from the beginning of the feed window");
  println!("  jarmer-core --checkpoint set <ts> set the cursor (\"YYYY-MM-DD HH:MM:SS UTC\")");
  println!("  jarmer-core --version");
  println!();
  println!("FLAGS:");
  println!("  --dry-run   scan without submitting or moving the checkpoint");
  println!();
  println!("Data directory: ${} (default ~/.jarmer)", paths::ENV_HOME);
}
