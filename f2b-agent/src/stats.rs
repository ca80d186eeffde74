use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::JoinHandle;
use std::time::Duration;

/// Throughput counters. Writers only ever increment; the reporter is the only
/// reader that acts on them.
#[derive(Debug, Default)]
pub struct Stats {
  ingested: AtomicU64,
  egested: AtomicU64,
  bans: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Snapshot {
  pub lines_in: u64,
  pub lines_out: u64,
  pub bans: u64,
}

impl Stats {
  pub fn new() -> Arc<Self> {
    Arc::new(Self::default())
  }

  pub fn line_ingested(&self) {
    self.ingested.fetch_add(1, Ordering::Relaxed);
  }

  pub fn line_egested(&self) {
    self.egested.fetch_add(1, Ordering::Relaxed);
  }

  pub fn ban_dispatched(&self) {
    self.bans.fetch_add(1, Ordering::Relaxed);
  }

  pub fn snapshot(&self) -> Snapshot {
    Snapshot {
      lines_in: self.ingested.load(Ordering::Relaxed),
      lines_out: self.egested.load(Ordering::Relaxed),
      bans: self.bans.load(Ordering::Relaxed),
    }
  }
}

/// Last reported totals. A report is due only when line counts moved.
#[derive(Debug, Default)]
struct Checkpoint {
  last: Snapshot,
}

impl Checkpoint {
  fn observe(&mut self, now: Snapshot) -> Option<Snapshot> {
    if now.lines_in == self.last.lines_in && now.lines_out == self.last.lines_out {
      return None;
    }
    self.last = now;
    Some(now)
  }
}

pub struct Reporter {
  stop_tx: mpsc::Sender<()>,
  handle: JoinHandle<()>,
}

impl Reporter {
  pub fn spawn(stats: Arc<Stats>, interval: Duration) -> anyhow::Result<Self> {
    let (stop_tx, stop_rx) = mpsc::channel::<()>();
    let handle = std::thread::Builder::new()
      .name("stats-reporter".to_string())
      .spawn(move || run(&stats, interval, &stop_rx, log_snapshot))?;
    Ok(Self { stop_tx, handle })
  }

  pub fn stop(self) {
    let _ = self.stop_tx.send(());
    if self.handle.join().is_err() {
      tracing::error!("stats reporter panicked");
    }
  }
}

fn run(
  stats: &Stats,
  interval: Duration,
  stop_rx: &mpsc::Receiver<()>,
  mut report: impl FnMut(Snapshot),
) {
  tracing::debug!(interval_s = interval.as_secs(), "stats reporter started");
  let mut checkpoint = Checkpoint::default();

  loop {
    match stop_rx.recv_timeout(interval) {
      Err(mpsc::RecvTimeoutError::Timeout) => {
        if let Some(s) = checkpoint.observe(stats.snapshot()) {
          report(s);
        }
      }
      Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => break,
    }
  }

  tracing::debug!("stats reporter stopped");
}

pub fn log_snapshot(s: Snapshot) {
  tracing::info!(bans = s.bans, "lines in {} out {}", s.lines_in, s.lines_out);
}
