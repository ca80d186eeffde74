pub mod ban;
pub mod config;
pub mod console;
pub mod detector;
pub mod ledger;
pub mod logging;
pub mod paths;
pub mod pipeline;
pub mod pump;
pub mod source;
pub mod stats;
pub mod types;

use anyhow::Context;
use ban::{BanDispatcher, BlockList, LogOnly, RetryPolicy, RouterOsRest};
use pipeline::{Control, Outcome, Pipeline, PipelineSettings};
use std::sync::mpsc;

pub fn run(args: &[String]) -> anyhow::Result<()> {
  let opts = match console::parse_args(args)? {
    console::ConsoleAction::ExitOk => return Ok(()),
    console::ConsoleAction::Run(opts) => opts,
  };

  let config_path = opts
    .config_path
    .clone()
    .unwrap_or_else(paths::default_config_path);
  let mut cfg = config::load_or_create_default(&config_path)
    .with_context(|| format!("load config {}", config_path.display()))?;
  opts.overrides.apply(&mut cfg);

  logging::init(
    &paths::logs_dir(&config_path, &cfg.logging.dir),
    &cfg.logging.level,
    cfg.logging.retention_days,
    opts.quiet,
  )?;

  config::validate(&mut cfg)?;
  let cfg = cfg;

  tracing::info!(
    version = env!("CARGO_PKG_VERSION"),
    config = %config_path.display(),
    router = %cfg.router.url,
    username = %cfg.router.username,
    password = types::redact_secret(&cfg.router.password),
    target_list = %cfg.router.target_list,
    source = ?cfg.source.kind,
    container = %cfg.source.container_name,
    reporting = cfg.reporting.enabled,
    interval_s = cfg.reporting.interval_seconds,
    dry_run = opts.dry_run,
    "starting f2b-agent"
  );

  let block_list: Box<dyn BlockList> = if opts.dry_run {
    Box::new(LogOnly)
  } else {
    let rest = RouterOsRest::new(&cfg.router)?;
    tracing::info!(endpoint = %rest.endpoint(), "router block-list client ready");
    Box::new(rest)
  };
  let dispatcher = BanDispatcher::new(
    cfg.router.target_list.clone(),
    block_list,
    RetryPolicy::from_config(&cfg.router),
  );

  let stream = source::open(&cfg.source)?;
  let label = stream.label().to_string();

  let (control_tx, control_rx) = mpsc::channel::<Control>();
  let ctrlc_tx = control_tx.clone();
  ctrlc::set_handler(move || {
    let _ = ctrlc_tx.send(Control::Interrupt);
  })?;

  let pipeline = Pipeline::new(PipelineSettings::from_config(&cfg), dispatcher);
  match pipeline.run(stream, control_tx, control_rx)? {
    Outcome::Interrupted => tracing::info!("f2b-agent stopped"),
    Outcome::StreamClosed(_) => {
      tracing::info!(source = %label, "log stream ended; f2b-agent stopped")
    }
  }
  Ok(())
}
