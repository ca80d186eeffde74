use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default)]
pub struct Config {
  pub router: RouterConfig,
  pub source: SourceConfig,
  pub reporting: ReportingConfig,
  pub pipeline: PipelineConfig,
  pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
  #[serde(default = "default_router_url")]
  pub url: String,

  #[serde(default = "default_username")]
  pub username: String,

  #[serde(default = "default_password")]
  pub password: String,

  #[serde(default = "default_target_list")]
  pub target_list: String,

  #[serde(default = "default_timeout_seconds")]
  pub timeout_seconds: u64,

  #[serde(default)]
  pub accept_invalid_certs: bool,

  #[serde(default = "default_max_attempts")]
  pub max_attempts: u32,

  #[serde(default = "default_backoff_ms")]
  pub backoff_ms: u64,
}

impl Default for RouterConfig {
  fn default() -> Self {
    Self {
      url: default_router_url(),
      username: default_username(),
      password: default_password(),
      target_list: default_target_list(),
      timeout_seconds: default_timeout_seconds(),
      accept_invalid_certs: false,
      max_attempts: default_max_attempts(),
      backoff_ms: default_backoff_ms(),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
  Docker,
  Stdin,
}

impl SourceKind {
  pub fn parse(s: &str) -> Option<Self> {
    match s {
      "docker" => Some(Self::Docker),
      "stdin" | "-" => Some(Self::Stdin),
      _ => None,
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
  #[serde(default = "default_source_kind")]
  pub kind: SourceKind,

  #[serde(default = "default_container_name")]
  pub container_name: String,
}

impl Default for SourceConfig {
  fn default() -> Self {
    Self {
      kind: default_source_kind(),
      container_name: default_container_name(),
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportingConfig {
  #[serde(default = "default_true")]
  pub enabled: bool,

  #[serde(default = "default_interval_seconds")]
  pub interval_seconds: u64,
}

impl Default for ReportingConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      interval_seconds: default_interval_seconds(),
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
  #[serde(default = "default_queue_capacity")]
  pub queue_capacity: usize,
}

impl Default for PipelineConfig {
  fn default() -> Self {
    Self {
      queue_capacity: default_queue_capacity(),
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
  #[serde(default = "default_log_level")]
  pub level: String,

  #[serde(default = "default_retention_days")]
  pub retention_days: u64,

  #[serde(default = "default_log_dir")]
  pub dir: PathBuf,
}

impl Default for LoggingConfig {
  fn default() -> Self {
    Self {
      level: default_log_level(),
      retention_days: default_retention_days(),
      dir: default_log_dir(),
    }
  }
}

fn default_true() -> bool {
  true
}

fn default_router_url() -> String {
  "https://10.0.22.1".to_string()
}

fn default_username() -> String {
  "mikrotik-user".to_string()
}

fn default_password() -> String {
  "mikrotik-password".to_string()
}

fn default_target_list() -> String {
  "f2blist".to_string()
}

fn default_timeout_seconds() -> u64 {
  10
}

fn default_max_attempts() -> u32 {
  3
}

fn default_backoff_ms() -> u64 {
  500
}

fn default_source_kind() -> SourceKind {
  SourceKind::Docker
}

fn default_container_name() -> String {
  "nginx-proxy".to_string()
}

fn default_interval_seconds() -> u64 {
  60
}

fn default_queue_capacity() -> usize {
  1000
}

fn default_log_level() -> String {
  "info".to_string()
}

fn default_retention_days() -> u64 {
  14
}

fn default_log_dir() -> PathBuf {
  PathBuf::from("logs")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ConfigFile {
  #[serde(default)]
  pub router: Option<RouterConfig>,

  #[serde(default)]
  pub source: Option<SourceConfig>,

  #[serde(default)]
  pub reporting: Option<ReportingConfig>,

  #[serde(default)]
  pub pipeline: Option<PipelineConfig>,

  #[serde(default)]
  pub logging: Option<LoggingConfig>,
}

impl ConfigFile {
  fn normalize(self) -> Config {
    let mut cfg = Config::default();
    if let Some(r) = self.router {
      cfg.router = r;
    }
    if let Some(s) = self.source {
      cfg.source = s;
    }
    if let Some(r) = self.reporting {
      cfg.reporting = r;
    }
    if let Some(p) = self.pipeline {
      cfg.pipeline = p;
    }
    if let Some(l) = self.logging {
      cfg.logging = l;
    }
    cfg
  }

  fn needs_upgrade(&self) -> bool {
    self.router.is_none()
      || self.source.is_none()
      || self.reporting.is_none()
      || self.pipeline.is_none()
      || self.logging.is_none()
  }
}

/// Loads the config at `path`, writing defaults there when it is missing and
/// replacing it (with a backup) when it cannot be parsed.
pub fn load_or_create_default(path: &Path) -> anyhow::Result<Config> {
  if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
    fs::create_dir_all(parent)?;
  }

  if !path.exists() {
    let cfg = Config::default();
    write_atomic(path, &toml::to_string_pretty(&to_config_file(&cfg))?)?;
    eprintln!("f2b-agent: default config written to {}", path.display());
    return Ok(cfg);
  }

  let raw = fs::read_to_string(path)?;
  match toml::from_str::<ConfigFile>(&raw) {
    Ok(file) => {
      let upgrade = file.needs_upgrade();
      let cfg = file.normalize();
      if upgrade {
        let backup = sibling(path, &format!("bak-{}", now_unix_s()));
        let _ = fs::copy(path, &backup);
        let _ = write_atomic(path, &toml::to_string_pretty(&to_config_file(&cfg))?);
        eprintln!(
          "f2b-agent: upgraded config defaults written to {} (backup: {})",
          path.display(),
          backup.display()
        );
      }
      Ok(cfg)
    }
    Err(e) => {
      let cfg = Config::default();
      let backup = sibling(path, &format!("bad-{}", now_unix_s()));
      let _ = fs::rename(path, &backup);
      write_atomic(path, &toml::to_string_pretty(&to_config_file(&cfg))?)?;
      eprintln!(
        "f2b-agent: invalid config at {} (backed up to {}): {e}",
        path.display(),
        backup.display()
      );
      Ok(cfg)
    }
  }
}

/// Clamps values the pipeline cannot run with. Returns an error only for
/// settings that make banning impossible.
pub fn validate(cfg: &mut Config) -> anyhow::Result<()> {
  if cfg.reporting.enabled && cfg.reporting.interval_seconds == 0 {
    tracing::warn!("reporting.interval_seconds must be > 0; stats reporting disabled");
    cfg.reporting.enabled = false;
  }
  if cfg.pipeline.queue_capacity == 0 {
    tracing::warn!("pipeline.queue_capacity must be > 0; using 1");
    cfg.pipeline.queue_capacity = 1;
  }
  if cfg.router.max_attempts == 0 {
    cfg.router.max_attempts = 1;
  }

  let url = reqwest::Url::parse(&cfg.router.url)
    .map_err(|e| anyhow::anyhow!("invalid router.url {:?}: {e}", cfg.router.url))?;
  if url.scheme() != "https" && url.scheme() != "http" {
    anyhow::bail!("router.url must use http or https: {}", cfg.router.url);
  }
  if url.host_str().is_none() {
    anyhow::bail!("router.url has no host: {}", cfg.router.url);
  }
  if cfg.router.target_list.trim().is_empty() {
    anyhow::bail!("router.target_list must not be empty");
  }

  Ok(())
}

fn to_config_file(cfg: &Config) -> ConfigFile {
  ConfigFile {
    router: Some(cfg.router.clone()),
    source: Some(cfg.source.clone()),
    reporting: Some(cfg.reporting.clone()),
    pipeline: Some(cfg.pipeline.clone()),
    logging: Some(cfg.logging.clone()),
  }
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
  let name = path.file_name().unwrap_or_default().to_string_lossy();
  path.with_file_name(format!("{name}.{suffix}"))
}

fn write_atomic(path: &Path, contents: &str) -> anyhow::Result<()> {
  let tmp = path.with_file_name(format!(
    ".{}.tmp",
    path.file_name().unwrap_or_default().to_string_lossy()
  ));

  fs::write(&tmp, contents)?;
  fs::rename(&tmp, path)?;
  Ok(())
}

fn now_unix_s() -> u64 {
  crate::types::now_unix_ms() / 1000
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn missing_file_is_created_with_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("f2b-agent.toml");

    let cfg = load_or_create_default(&path).unwrap();
    assert!(path.exists());
    assert_eq!(cfg.router.target_list, "f2blist");
    assert_eq!(cfg.source.kind, SourceKind::Docker);
    assert_eq!(cfg.pipeline.queue_capacity, 1000);

    let again = load_or_create_default(&path).unwrap();
    assert_eq!(again.source.container_name, "nginx-proxy");
  }

  #[test]
  fn partial_file_keeps_values_and_fills_sections() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("f2b-agent.toml");
    fs::write(
      &path,
      "[router]\ntarget_list = \"wp-abusers\"\n\n[reporting]\nenabled = false\n",
    )
    .unwrap();

    let cfg = load_or_create_default(&path).unwrap();
    assert_eq!(cfg.router.target_list, "wp-abusers");
    assert_eq!(cfg.router.username, "mikrotik-user");
    assert!(!cfg.reporting.enabled);
    assert_eq!(cfg.reporting.interval_seconds, 60);

    let rewritten = fs::read_to_string(&path).unwrap();
    assert!(rewritten.contains("[pipeline]"));
    assert!(rewritten.contains("wp-abusers"));
  }

  #[test]
  fn invalid_file_is_backed_up_and_replaced() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("f2b-agent.toml");
    fs::write(&path, "this is = = not toml").unwrap();

    let cfg = load_or_create_default(&path).unwrap();
    assert_eq!(cfg.router.target_list, "f2blist");

    let backups = fs::read_dir(dir.path())
      .unwrap()
      .flatten()
      .filter(|e| e.file_name().to_string_lossy().contains(".bad-"))
      .count();
    assert_eq!(backups, 1);
  }

  #[test]
  fn validate_clamps_and_rejects() {
    let mut cfg = Config::default();
    cfg.reporting.interval_seconds = 0;
    cfg.pipeline.queue_capacity = 0;
    cfg.router.max_attempts = 0;
    validate(&mut cfg).unwrap();
    assert!(!cfg.reporting.enabled);
    assert_eq!(cfg.pipeline.queue_capacity, 1);
    assert_eq!(cfg.router.max_attempts, 1);

    cfg.router.url = "ftp://10.0.22.1".to_string();
    assert!(validate(&mut cfg).is_err());

    cfg.router.url = "not a url".to_string();
    assert!(validate(&mut cfg).is_err());
  }
}
