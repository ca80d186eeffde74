use crate::config::{SourceConfig, SourceKind};
use anyhow::Context;
use std::ffi::OsStr;
use std::io::{self, Read};
use std::process::{Child, ChildStderr, Command, Stdio};
use std::thread::JoinHandle;

const DOCKER_PROGRAM: &str = "docker";
const STDERR_TAIL_BYTES: usize = 2048;

/// Access-log byte stream handed to the pump. Holds the `docker logs` child
/// (if any): its exit status is checked at end-of-file, and it is killed when
/// the stream is dropped early.
pub struct LogStream {
  reader: Box<dyn Read + Send>,
  child: Option<FollowedChild>,
  label: String,
}

struct FollowedChild {
  child: Child,
  stderr: Option<JoinHandle<String>>,
  exited: bool,
}

impl FollowedChild {
  /// Reaps the child once stdout is exhausted. A non-zero exit becomes an
  /// I/O error carrying the tail of its stderr.
  fn finish(&mut self) -> io::Result<()> {
    if self.exited {
      return Ok(());
    }
    let status = self.child.wait()?;
    self.exited = true;

    let tail = self
      .stderr
      .take()
      .and_then(|h| h.join().ok())
      .unwrap_or_default();

    if status.success() {
      return Ok(());
    }
    Err(io::Error::new(
      io::ErrorKind::Other,
      format!("`docker logs` exited with {status}: {}", tail.trim()),
    ))
  }
}

impl LogStream {
  pub fn from_reader(label: impl Into<String>, reader: Box<dyn Read + Send>) -> Self {
    Self {
      reader,
      child: None,
      label: label.into(),
    }
  }

  pub fn label(&self) -> &str {
    &self.label
  }
}

impl Read for LogStream {
  fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
    let n = self.reader.read(buf)?;
    if n == 0 && !buf.is_empty() {
      if let Some(child) = self.child.as_mut() {
        child.finish()?;
      }
    }
    Ok(n)
  }
}

impl Drop for LogStream {
  fn drop(&mut self) {
    if let Some(c) = self.child.as_mut().filter(|c| !c.exited) {
      let _ = c.child.kill();
      let _ = c.child.wait();
    }
  }
}

pub fn open(cfg: &SourceConfig) -> anyhow::Result<LogStream> {
  match cfg.kind {
    SourceKind::Stdin => Ok(LogStream::from_reader("stdin", Box::new(io::stdin()))),
    SourceKind::Docker => follow_container(OsStr::new(DOCKER_PROGRAM), &cfg.container_name),
  }
}

// Only new lines: replaying container history would re-ban from old logs.
fn docker_logs_args(container: &str) -> Vec<String> {
  vec![
    "logs".to_string(),
    "--follow".to_string(),
    "--tail".to_string(),
    "0".to_string(),
    container.to_string(),
  ]
}

fn follow_container(program: &OsStr, container: &str) -> anyhow::Result<LogStream> {
  if container.trim().is_empty() {
    anyhow::bail!("source.container_name must not be empty for the docker source");
  }

  let mut child = Command::new(program)
    .args(docker_logs_args(container))
    .stdin(Stdio::null())
    .stdout(Stdio::piped())
    .stderr(Stdio::piped())
    .spawn()
    .with_context(|| format!("spawn `docker logs --follow {container}`"))?;

  let stdout = child
    .stdout
    .take()
    .ok_or_else(|| anyhow::anyhow!("docker logs child has no stdout"))?;

  // The container's own stderr arrives here too, so keep draining it.
  let stderr = match child.stderr.take() {
    Some(pipe) => Some(
      std::thread::Builder::new()
        .name("docker-stderr".to_string())
        .spawn(move || stderr_tail(pipe))
        .context("spawn docker stderr reader")?,
    ),
    None => None,
  };

  tracing::info!(container, pid = child.id(), "following container logs");

  Ok(LogStream {
    reader: Box::new(stdout),
    child: Some(FollowedChild {
      child,
      stderr,
      exited: false,
    }),
    label: format!("docker:{container}"),
  })
}

fn stderr_tail(mut pipe: ChildStderr) -> String {
  let mut tail: Vec<u8> = Vec::with_capacity(STDERR_TAIL_BYTES * 2);
  let mut chunk = [0u8; 1024];

  loop {
    match pipe.read(&mut chunk) {
      Ok(0) => break,
      Ok(n) => {
        tail.extend_from_slice(&chunk[..n]);
        if tail.len() > STDERR_TAIL_BYTES {
          let excess = tail.len() - STDERR_TAIL_BYTES;
          tail.drain(..excess);
        }
      }
      Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
      Err(_) => break,
    }
  }

  String::from_utf8_lossy(&tail).into_owned()
}
