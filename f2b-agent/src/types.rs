use std::net::IpAddr;

/// Failures from one address before it is pushed onto the router block-list.
pub const FAILURE_THRESHOLD: u32 = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BadActorRecord {
  pub address: IpAddr,
  pub failure_count: u32,
  pub last_seen_unix_ms: u64,
  pub banned: bool,
}

/// Result of recording one failed login against the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Recorded {
  pub address: IpAddr,
  pub count: u32,
  pub crossed_threshold: bool,
}

pub fn redact_secret(secret: &str) -> &'static str {
  if secret.is_empty() {
    "<empty>"
  } else {
    "<redacted>"
  }
}

pub fn now_unix_ms() -> u64 {
  use std::time::{SystemTime, UNIX_EPOCH};
  SystemTime::now()
    .duration_since(UNIX_EPOCH)
    .unwrap_or_default()
    .as_millis() as u64
}
