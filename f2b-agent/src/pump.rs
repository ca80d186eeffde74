use crate::stats::Stats;
use std::io::{BufRead, BufReader, Read};
use std::sync::mpsc::SyncSender;

#[derive(Debug)]
pub enum PumpExit {
  /// The stream reached end-of-file.
  EndOfStream,
  /// The consumer went away; nothing left to feed.
  ConsumerGone,
  ReadError(std::io::Error),
}

/// Reads newline-delimited lines from `input` and pushes each onto `queue`,
/// blocking while the queue is full. Lines are never dropped.
pub fn run<R: Read>(input: R, queue: &SyncSender<String>, stats: &Stats) -> PumpExit {
  let mut reader = BufReader::new(input);
  let mut buf = Vec::with_capacity(512);

  loop {
    buf.clear();
    match reader.read_until(b'\n', &mut buf) {
      Ok(0) => return PumpExit::EndOfStream,
      Ok(_) => {}
      Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
      Err(e) => return PumpExit::ReadError(e),
    }

    let line = String::from_utf8_lossy(&buf).into_owned();
    // Counted before the hand-off so `lines_in` never trails `lines_out`.
    stats.line_ingested();
    if queue.send(line).is_err() {
      return PumpExit::ConsumerGone;
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::io::Cursor;
  use std::sync::mpsc;
  use std::time::{Duration, Instant};

  fn wait_for(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
      if cond() {
        return true;
      }
      std::thread::sleep(Duration::from_millis(5));
    }
    false
  }

  #[test]
  fn forwards_lines_in_order_including_unterminated_tail() {
    let (tx, rx) = mpsc::sync_channel(16);
    let stats = Stats::new();
    let exit = run(Cursor::new(b"one\ntwo\nthree".to_vec()), &tx, &stats);

    assert!(matches!(exit, PumpExit::EndOfStream));
    let got: Vec<String> = rx.try_iter().collect();
    assert_eq!(got, vec!["one\n", "two\n", "three"]);
    assert_eq!(stats.snapshot().lines_in, 3);
  }

  #[test]
  fn invalid_utf8_is_replaced_not_fatal() {
    let (tx, rx) = mpsc::sync_channel(4);
    let stats = Stats::new();
    let exit = run(Cursor::new(b"a\xffb\n".to_vec()), &tx, &stats);

    assert!(matches!(exit, PumpExit::EndOfStream));
    assert_eq!(rx.recv().unwrap(), "a\u{FFFD}b\n");
  }

  #[test]
  fn read_error_is_reported() {
    struct Broken;
    impl Read for Broken {
      fn read(&mut self, _: &mut [u8]) -> std::io::Result<usize> {
        Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone"))
      }
    }

    let (tx, _rx) = mpsc::sync_channel(1);
    let exit = run(Broken, &tx, &Stats::default());
    assert!(matches!(
      exit,
      PumpExit::ReadError(ref e) if e.kind() == std::io::ErrorKind::BrokenPipe
    ));
  }

  #[test]
  fn stops_when_consumer_is_gone() {
    let (tx, rx) = mpsc::sync_channel(1);
    drop(rx);
    let exit = run(Cursor::new(b"x\n".to_vec()), &tx, &Stats::default());
    assert!(matches!(exit, PumpExit::ConsumerGone));
  }

  #[test]
  fn full_queue_blocks_pump_without_dropping() {
    let (tx, rx) = mpsc::sync_channel(1);
    let stats = Stats::new();
    let pump_stats = stats.clone();
    let handle = std::thread::spawn(move || {
      run(Cursor::new(b"first\nsecond\n".to_vec()), &tx, &pump_stats)
    });

    // The second line is read and counted, then the pump parks in `send`.
    assert!(wait_for(|| stats.snapshot().lines_in == 2));
    std::thread::sleep(Duration::from_millis(100));
    assert!(!handle.is_finished(), "second line must wait for space");

    assert_eq!(rx.recv().unwrap(), "first\n");
    assert_eq!(rx.recv().unwrap(), "second\n");
    let exit = handle.join().unwrap();
    assert!(matches!(exit, PumpExit::EndOfStream));
    assert_eq!(stats.snapshot().lines_in, 2);
  }

  #[test]
  fn ingested_count_never_trails_received_lines() {
    let (tx, rx) = mpsc::sync_channel(1);
    let stats = Stats::new();
    let pump_stats = stats.clone();
    let input: Vec<u8> = (0..200).flat_map(|i| format!("line {i}\n").into_bytes()).collect();
    let handle = std::thread::spawn(move || run(Cursor::new(input), &tx, &pump_stats));

    let mut received = 0u64;
    while rx.recv().is_ok() {
      received += 1;
      stats.line_egested();
      let s = stats.snapshot();
      assert!(s.lines_in >= s.lines_out, "in {} < out {}", s.lines_in, s.lines_out);
      assert!(s.lines_in >= received);
    }

    assert!(matches!(handle.join().unwrap(), PumpExit::EndOfStream));
    assert_eq!(received, 200);
    assert_eq!(stats.snapshot().lines_in, 200);
  }
}
