use crate::config::RouterConfig;
use std::net::IpAddr;
use std::time::Duration;

mod routeros;
pub use routeros::RouterOsRest;

#[derive(Debug, thiserror::Error)]
pub enum BanError {
  #[error("router transport failed: {0}")]
  Transport(String),

  #[error("router rejected append (HTTP {status}): {body}")]
  Rejected { status: u16, body: String },

  #[error("ban failed after {attempts} attempt(s): {last}")]
  Exhausted { attempts: u32, last: Box<BanError> },
}

impl BanError {
  fn is_retryable(&self) -> bool {
    match self {
      BanError::Transport(_) => true,
      BanError::Rejected { status, .. } => *status >= 500,
      BanError::Exhausted { .. } => false,
    }
  }
}

/// Named block-list on the router firewall. Appending an address that is
/// already listed must be a no-op success.
pub trait BlockList: Send {
  fn append(&self, list: &str, address: IpAddr) -> Result<(), BanError>;
}

/// Selected by `--dry-run`: records what would be banned without touching
/// the router.
pub struct LogOnly;

impl BlockList for LogOnly {
  fn append(&self, list: &str, address: IpAddr) -> Result<(), BanError> {
    tracing::warn!(%address, list, "DRY-RUN: would append address to router block-list");
    Ok(())
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
  pub max_attempts: u32,
  pub backoff: Duration,
}

impl RetryPolicy {
  pub fn none() -> Self {
    Self {
      max_attempts: 1,
      backoff: Duration::ZERO,
    }
  }

  pub fn from_config(cfg: &RouterConfig) -> Self {
    Self {
      max_attempts: cfg.max_attempts.max(1),
      backoff: Duration::from_millis(cfg.backoff_ms),
    }
  }

  /// Delay before retry number `retry` (1-based); doubles each time, capped
  /// at eight times the base.
  fn delay(&self, retry: u32) -> Duration {
    let factor = 1u32 << retry.saturating_sub(1).min(3);
    self.backoff.saturating_mul(factor)
  }
}

pub struct BanDispatcher {
  target_list: String,
  block_list: Box<dyn BlockList>,
  retry: RetryPolicy,
}

impl BanDispatcher {
  pub fn new(
    target_list: impl Into<String>,
    block_list: Box<dyn BlockList>,
    retry: RetryPolicy,
  ) -> Self {
    Self {
      target_list: target_list.into(),
      block_list,
      retry,
    }
  }

  pub fn target_list(&self) -> &str {
    &self.target_list
  }

  /// Appends `address` to the target list. Called once per threshold
  /// crossing; retries transient failures before giving up.
  pub fn ban(&self, address: IpAddr) -> Result<(), BanError> {
    let mut attempt = 1;
    loop {
      let err = match self.block_list.append(&self.target_list, address) {
        Ok(()) => {
          tracing::warn!(%address, list = %self.target_list, attempt, "BAD IP banned");
          return Ok(());
        }
        Err(e) => e,
      };

      if !err.is_retryable() || attempt >= self.retry.max_attempts {
        tracing::error!(
          %address,
          list = %self.target_list,
          attempt,
          error = %err,
          "ban dispatch failed"
        );
        if attempt == 1 {
          return Err(err);
        }
        return Err(BanError::Exhausted {
          attempts: attempt,
          last: Box::new(err),
        });
      }

      let delay = self.retry.delay(attempt);
      tracing::warn!(
        %address,
        attempt,
        retry_in_ms = delay.as_millis() as u64,
        error = %err,
        "ban dispatch failed; retrying"
      );
      std::thread::sleep(delay);
      attempt += 1;
    }
  }
}
