use std::path::{Path, PathBuf};

pub const CONFIG_ENV: &str = "F2B_AGENT_CONFIG";

pub fn default_config_path() -> PathBuf {
  std::env::var_os(CONFIG_ENV)
    .map(PathBuf::from)
    .unwrap_or_else(|| PathBuf::from("f2b-agent.toml"))
}

/// Relative log directories live next to the config file.
pub fn logs_dir(config_path: &Path, configured: &Path) -> PathBuf {
  if configured.is_absolute() {
    return configured.to_path_buf();
  }
  config_path
    .parent()
    .unwrap_or_else(|| Path::new("."))
    .join(configured)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn relative_log_dir_is_beside_config() {
    assert_eq!(
      logs_dir(Path::new("/etc/f2b/f2b-agent.toml"), Path::new("logs")),
      PathBuf::from("/etc/f2b/logs")
    );
    assert_eq!(
      logs_dir(Path::new("f2b-agent.toml"), Path::new("logs")),
      PathBuf::from("logs")
    );
    assert_eq!(
      logs_dir(Path::new("/etc/f2b/f2b-agent.toml"), Path::new("/var/log/f2b")),
      PathBuf::from("/var/log/f2b")
    );
  }
}
