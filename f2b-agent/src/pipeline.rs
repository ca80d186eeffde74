use crate::ban::{BanDispatcher, BanError};
use crate::config::Config;
use crate::detector;
use crate::ledger::Ledger;
use crate::pump::{self, PumpExit};
use crate::stats::{log_snapshot, Reporter, Snapshot, Stats};
use crate::types::FAILURE_THRESHOLD;
use anyhow::Context;
use std::io::Read;
use std::net::IpAddr;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::time::Duration;

/// Messages the coordinator waits on.
pub enum Control {
  Interrupt,
  PumpFinished(PumpExit),
  ConsumerFinished(anyhow::Result<()>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
  /// Shut down on request; queued lines were abandoned.
  Interrupted,
  /// The log stream ended and every queued line was processed.
  StreamClosed(Snapshot),
}

#[derive(Debug, Clone, Copy)]
pub struct PipelineSettings {
  pub queue_capacity: usize,
  pub report_interval: Option<Duration>,
  pub failure_threshold: u32,
}

impl PipelineSettings {
  pub fn from_config(cfg: &Config) -> Self {
    Self {
      queue_capacity: cfg.pipeline.queue_capacity.max(1),
      report_interval: cfg
        .reporting
        .enabled
        .then(|| Duration::from_secs(cfg.reporting.interval_seconds.max(1))),
      failure_threshold: FAILURE_THRESHOLD,
    }
  }
}

pub struct Pipeline {
  settings: PipelineSettings,
  dispatcher: BanDispatcher,
  stats: Arc<Stats>,
}

impl Pipeline {
  pub fn new(settings: PipelineSettings, dispatcher: BanDispatcher) -> Self {
    Self {
      settings,
      dispatcher,
      stats: Stats::new(),
    }
  }

  /// Runs until `Control::Interrupt` arrives on `control_rx`, the stream
  /// ends, or a fatal error occurs. Worker threads blocked on I/O are left
  /// behind on return; the process is expected to exit right after.
  pub fn run<R>(
    self,
    input: R,
    control_tx: Sender<Control>,
    control_rx: Receiver<Control>,
  ) -> anyhow::Result<Outcome>
  where
    R: Read + Send + 'static,
  {
    let Pipeline {
      settings,
      dispatcher,
      stats,
    } = self;

    let reporter = match settings.report_interval {
      Some(interval) => Some(Reporter::spawn(stats.clone(), interval)?),
      None => None,
    };

    let (queue_tx, queue_rx) = mpsc::sync_channel::<String>(settings.queue_capacity);

    let pump_stats = stats.clone();
    let pump_control = control_tx.clone();
    std::thread::Builder::new()
      .name("stream-pump".to_string())
      .spawn(move || {
        let exit = catch_unwind(AssertUnwindSafe(|| pump::run(input, &queue_tx, &pump_stats)))
          .unwrap_or_else(|_| {
            PumpExit::ReadError(std::io::Error::new(
              std::io::ErrorKind::Other,
              "stream pump panicked",
            ))
          });
        // Report before closing the queue so a read error is seen ahead of
        // the consumer's clean finish.
        let _ = pump_control.send(Control::PumpFinished(exit));
        drop(queue_tx);
      })
      .context("spawn stream pump")?;

    let mut consumer = Consumer::new(
      Ledger::new(settings.failure_threshold),
      dispatcher,
      stats.clone(),
    );
    let consumer_control = control_tx;
    std::thread::Builder::new()
      .name("line-consumer".to_string())
      .spawn(move || {
        let res = catch_unwind(AssertUnwindSafe(|| consumer.drain(&queue_rx)))
          .unwrap_or_else(|_| Err(anyhow::anyhow!("line consumer panicked")));
        let _ = consumer_control.send(Control::ConsumerFinished(res));
      })
      .context("spawn line consumer")?;

    tracing::info!(
      queue_capacity = settings.queue_capacity,
      threshold = settings.failure_threshold,
      reporting = settings.report_interval.is_some(),
      "pipeline started"
    );

    let outcome = wait(&control_rx, &stats);

    if let Some(r) = reporter {
      r.stop();
    }
    outcome
  }
}

fn wait(control_rx: &Receiver<Control>, stats: &Stats) -> anyhow::Result<Outcome> {
  loop {
    let msg = control_rx
      .recv()
      .map_err(|_| anyhow::anyhow!("pipeline control channel closed"))?;

    match msg {
      Control::Interrupt => {
        tracing::info!("interrupt received; exiting without draining the queue");
        return Ok(Outcome::Interrupted);
      }
      Control::PumpFinished(PumpExit::EndOfStream) => {
        tracing::warn!("log stream closed; draining queued lines");
      }
      Control::PumpFinished(PumpExit::ConsumerGone) => {}
      Control::PumpFinished(PumpExit::ReadError(e)) => {
        tracing::error!(error = %e, "log stream read failed");
        return Err(anyhow::Error::new(e).context("read log stream"));
      }
      Control::ConsumerFinished(Ok(())) => {
        let s = stats.snapshot();
        log_snapshot(s);
        return Ok(Outcome::StreamClosed(s));
      }
      Control::ConsumerFinished(Err(e)) => {
        tracing::error!(error = ?e, "line consumer stopped");
        return Err(e);
      }
    }
  }
}

/// Single owner of the ledger. Processes lines strictly in queue order.
struct Consumer {
  ledger: Ledger,
  dispatcher: BanDispatcher,
  stats: Arc<Stats>,
}

impl Consumer {
  fn new(ledger: Ledger, dispatcher: BanDispatcher, stats: Arc<Stats>) -> Self {
    Self {
      ledger,
      dispatcher,
      stats,
    }
  }

  fn drain(&mut self, queue: &Receiver<String>) -> anyhow::Result<()> {
    while let Ok(raw) = queue.recv() {
      self
        .process_line(&raw)
        .with_context(|| format!("ban via list {:?}", self.dispatcher.target_list()))?;
    }
    tracing::info!(
      tracked = self.ledger.len(),
      banned = self.ledger.banned_count(),
      "line consumer finished"
    );
    Ok(())
  }

  /// Returns the address banned by this line, if any.
  fn process_line(&mut self, raw: &str) -> Result<Option<IpAddr>, BanError> {
    let normalized = detector::normalize(raw);
    let m = detector::extract(&normalized);

    let mut banned = None;
    if let Some(token) = m.address.filter(|_| m.is_match) {
      if let Some(rec) = self.ledger.record_failure(token) {
        tracing::debug!(address = %rec.address, count = rec.count, "failed login recorded");
        if rec.crossed_threshold {
          self.dispatcher.ban(rec.address)?;
          self.stats.ban_dispatched();
          banned = Some(rec.address);
        }
      }
    }

    self.stats.line_egested();
    Ok(banned)
  }
}
