pub mod checkpoint;
pub mod config;
pub mod console;
pub mod dedup;
pub mod enrich;
pub mod feed;
pub mod logging;
pub mod paths;
pub mod pipeline;
pub mod runtime;
pub mod scheduler;
pub mod types;

use std::sync::mpsc;
use std::time::Duration;

pub fn run_console(args: &[String]) -> anyhow::Result<()> {
  let dry_run = runtime::configure_from_args(args);
  let base = paths::base_dir()?;
  let config_path = paths::config_path(&base);
  let cfg = if dry_run {
    config::load_or_default_readonly(&config_path)?
  } else {
    config::load_or_create_default(&config_path)?
  };

  if dry_run {
    logging::init_stderr_only(&cfg.logging.level)?;
  } else {
    logging::init_file_and_stderr(
      &paths::logs_dir(&base),
      &cfg.logging.level,
      cfg.logging.retention_days,
    )?;
  }

  let action = console::run_console_command(&cfg, &base, args)?;
  if action == console::ConsoleAction::ExitOk {
    return Ok(());
  }

  let jarmer = pipeline::Jarmer::from_config(&cfg, &base)?;

  if action == console::ConsoleAction::RunOnce {
    let summary = jarmer.run()?;
    println!(
      "Processed: {}, took {:.3} seconds",
      summary.processed,
      summary.duration.as_secs_f64()
    );
    return Ok(());
  }

  tracing::info!("starting jarmer (daemon mode)");
  let (stop_tx, stop_rx) = mpsc::channel::<()>();
  ctrlc::set_handler(move || {
    let _ = stop_tx.send(());
  })?;

  let interval = Duration::from_secs(cfg.schedule.interval_minutes.saturating_mul(60));
  scheduler::Scheduler::new(jarmer, interval).run(stop_rx)?;
  tracing::info!("jarmer stopped");
  Ok(())
}
