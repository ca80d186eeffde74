use crate::types::{now_unix_ms, BadActorRecord, Recorded};
use std::collections::HashMap;
use std::net::IpAddr;

/// In-memory table of addresses seen failing a login.
///
/// Owned by the pipeline consumer and mutated only from that thread, so it
/// carries no lock. Entries are never removed for the life of the process.
pub struct Ledger {
  threshold: u32,
  actors: HashMap<IpAddr, BadActorRecord>,
}

impl Ledger {
  pub fn new(threshold: u32) -> Self {
    Self {
      threshold,
      actors: HashMap::new(),
    }
  }

  /// Records one failure for `address`. Returns `None` (and leaves the ledger
  /// untouched) when the token is not an IPv4/IPv6 literal.
  pub fn record_failure(&mut self, address: &str) -> Option<Recorded> {
    self.record_failure_at(address, now_unix_ms())
  }

  pub fn record_failure_at(&mut self, address: &str, now_unix_ms: u64) -> Option<Recorded> {
    if address.len() < 2 {
      return None;
    }
    let ip: IpAddr = address.parse().ok()?;

    let record = self
      .actors
      .entry(ip)
      .and_modify(|r| {
        r.failure_count = r.failure_count.saturating_add(1);
        r.last_seen_unix_ms = r.last_seen_unix_ms.max(now_unix_ms);
      })
      .or_insert_with(|| BadActorRecord {
        address: ip,
        failure_count: 1,
        last_seen_unix_ms: now_unix_ms,
        banned: false,
      });

    // One-shot: the flag makes the ban edge-triggered regardless of how the
    // count moves afterwards.
    let crossed_threshold = !record.banned && record.failure_count >= self.threshold;
    if crossed_threshold {
      record.banned = true;
    }

    Some(Recorded {
      address: ip,
      count: record.failure_count,
      crossed_threshold,
    })
  }

  pub(crate) fn len(&self) -> usize {
    self.actors.len()
  }

  pub(crate) fn banned_count(&self) -> usize {
    self.actors.values().filter(|r| r.banned).count()
  }

  #[cfg(test)]
  fn get(&self, address: &IpAddr) -> Option<&BadActorRecord> {
    self.actors.get(address)
  }

  #[cfg(test)]
  pub(crate) fn is_empty(&self) -> bool {
    self.actors.is_empty()
  }
}
