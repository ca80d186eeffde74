use crate::config::{Config, SourceKind};
use std::path::PathBuf;

pub enum ConsoleAction {
  Run(RunOptions),
  ExitOk,
}

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
  pub config_path: Option<PathBuf>,
  pub dry_run: bool,
  pub quiet: bool,
  pub overrides: Overrides,
}

/// Command-line values that win over the config file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Overrides {
  pub url: Option<String>,
  pub username: Option<String>,
  pub password: Option<String>,
  pub target_list: Option<String>,
  pub container_name: Option<String>,
  pub source: Option<SourceKind>,
  pub report: Option<bool>,
  pub interval_seconds: Option<u64>,
  pub queue_capacity: Option<usize>,
  pub log_level: Option<String>,
}

impl Overrides {
  pub fn apply(&self, cfg: &mut Config) {
    if let Some(v) = &self.url {
      cfg.router.url = v.clone();
    }
    if let Some(v) = &self.username {
      cfg.router.username = v.clone();
    }
    if let Some(v) = &self.password {
      cfg.router.password = v.clone();
    }
    if let Some(v) = &self.target_list {
      cfg.router.target_list = v.clone();
    }
    if let Some(v) = &self.container_name {
      cfg.source.container_name = v.clone();
    }
    if let Some(v) = self.source {
      cfg.source.kind = v;
    }
    if let Some(v) = self.report {
      cfg.reporting.enabled = v;
    }
    if let Some(v) = self.interval_seconds {
      cfg.reporting.interval_seconds = v;
    }
    if let Some(v) = self.queue_capacity {
      cfg.pipeline.queue_capacity = v;
    }
    if let Some(v) = &self.log_level {
      cfg.logging.level = v.clone();
    }
  }
}

const VALUED_FLAGS: &[&str] = &[
  "--config",
  "--address",
  "--username",
  "--password",
  "--target-list",
  "--container-name",
  "--log-level",
  "--source",
  "--report",
  "--interval",
  "--queue-capacity",
];

pub fn parse_args(args: &[String]) -> anyhow::Result<ConsoleAction> {
  let mut opts = RunOptions::default();
  let mut i = 1;

  while i < args.len() {
    let flag = args[i].as_str();
    match flag {
      "--help" | "-h" => {
        print_help();
        return Ok(ConsoleAction::ExitOk);
      }
      "--version" => {
        println!("{}", env!("CARGO_PKG_VERSION"));
        return Ok(ConsoleAction::ExitOk);
      }
      "--dry-run" => opts.dry_run = true,
      "--quiet" => opts.quiet = true,
      _ if !VALUED_FLAGS.contains(&flag) => {
        anyhow::bail!("unknown option `{flag}` (see --help)");
      }
      _ => {
        let value = args
          .get(i + 1)
          .ok_or_else(|| anyhow::anyhow!("missing value for `{flag}`"))?;
        apply_valued_flag(&mut opts, flag, value)?;
        i += 1;
      }
    }
    i += 1;
  }

  Ok(ConsoleAction::Run(opts))
}

fn apply_valued_flag(opts: &mut RunOptions, flag: &str, value: &str) -> anyhow::Result<()> {
  let o = &mut opts.overrides;
  match flag {
    "--config" => opts.config_path = Some(PathBuf::from(value)),
    "--address" => o.url = Some(value.to_string()),
    "--username" => o.username = Some(value.to_string()),
    "--password" => o.password = Some(value.to_string()),
    "--target-list" => o.target_list = Some(value.to_string()),
    "--container-name" => o.container_name = Some(value.to_string()),
    "--log-level" => o.log_level = Some(value.to_string()),
    "--source" => {
      o.source = Some(
        SourceKind::parse(value)
          .ok_or_else(|| anyhow::anyhow!("expected `docker` or `stdin` for `--source`"))?,
      );
    }
    "--report" => {
      o.report = Some(
        parse_bool(value)
          .ok_or_else(|| anyhow::anyhow!("expected `true` or `false` for `--report`"))?,
      );
    }
    "--interval" => {
      o.interval_seconds = Some(
        value
          .parse::<u64>()
          .map_err(|_| anyhow::anyhow!("expected seconds for `--interval`, got {value:?}"))?,
      );
    }
    "--queue-capacity" => {
      o.queue_capacity = Some(
        value
          .parse::<usize>()
          .map_err(|_| anyhow::anyhow!("expected a number for `--queue-capacity`, got {value:?}"))?,
      );
    }
    _ => anyhow::bail!("unknown option `{flag}` (see --help)"),
  }
  Ok(())
}

fn parse_bool(s: &str) -> Option<bool> {
  match s {
    "true" | "1" | "yes" | "on" => Some(true),
    "false" | "0" | "no" | "off" => Some(false),
    _ => None,
  }
}

fn print_help() {
  println!("f2b-agent v{}", env!("CARGO_PKG_VERSION"));
  println!("Bans addresses that repeatedly fail WordPress logins behind nginx-proxy");
  println!("by appending them to a RouterOS firewall address-list.");
  println!();
  println!("Options:");
  println!("  --config <path>           config file (created with defaults if missing)");
  println!("  --address <url>           router REST base URL, e.g. https://10.0.22.1");
  println!("  --username <name>         router user");
  println!("  --password <secret>       router password");
  println!("  --target-list <name>      firewall address-list to append to");
  println!("  --source docker|stdin     where access-log lines come from");
  println!("  --container-name <name>   container to follow with `docker logs`");
  println!("  --report true|false       periodic line throughput stats");
  println!("  --interval <secs>         stats interval");
  println!("  --queue-capacity <n>      lines buffered between reader and detector");
  println!("  --log-level <filter>      tracing filter, e.g. info or f2b_agent=debug");
  println!("  --dry-run                 log bans instead of calling the router");
  println!("  --quiet                   log to file only");
  println!("  --version");
}

#[cfg(test)]
mod tests {
  use super::*;

  fn args(list: &[&str]) -> Vec<String> {
    std::iter::once("f2b-agent")
      .chain(list.iter().copied())
      .map(String::from)
      .collect()
  }

  fn run_opts(list: &[&str]) -> RunOptions {
    match parse_args(&args(list)).unwrap() {
      ConsoleAction::Run(o) => o,
      ConsoleAction::ExitOk => panic!("expected run options"),
    }
  }

  #[test]
  fn overrides_win_over_file_values() {
    let o = run_opts(&[
      "--target-list",
      "wp-abusers",
      "--report",
      "off",
      "--interval",
      "15",
      "--source",
      "stdin",
      "--dry-run",
    ]);
    assert!(o.dry_run);

    let mut cfg = Config::default();
    cfg.router.username = "from-file".to_string();
    o.overrides.apply(&mut cfg);

    assert_eq!(cfg.router.target_list, "wp-abusers");
    assert_eq!(cfg.router.username, "from-file");
    assert!(!cfg.reporting.enabled);
    assert_eq!(cfg.reporting.interval_seconds, 15);
    assert_eq!(cfg.source.kind, SourceKind::Stdin);
  }

  #[test]
  fn container_name_overrides_container_not_username() {
    let o = run_opts(&["--container-name", "proxy-2"]);
    let mut cfg = Config::default();
    o.overrides.apply(&mut cfg);
    assert_eq!(cfg.source.container_name, "proxy-2");
    assert_eq!(cfg.router.username, "mikrotik-user");
  }

  #[test]
  fn config_path_is_captured() {
    let o = run_opts(&["--config", "/etc/f2b-agent.toml", "--quiet"]);
    assert_eq!(o.config_path, Some(PathBuf::from("/etc/f2b-agent.toml")));
    assert!(o.quiet);
    assert_eq!(o.overrides, Overrides::default());
  }

  #[test]
  fn bad_values_are_rejected() {
    assert!(parse_args(&args(&["--interval", "soon"])).is_err());
    assert!(parse_args(&args(&["--report", "maybe"])).is_err());
    assert!(parse_args(&args(&["--source", "kafka"])).is_err());
    assert!(parse_args(&args(&["--target-list"])).is_err());
    assert!(parse_args(&args(&["--frobnicate", "1"])).is_err());
  }

  #[test]
  fn unknown_flag_is_named_even_without_a_value() {
    for list in [&["--frobnicate"][..], &["--dry-run", "--frobnicate"], &["--frobnicate", "1"]] {
      let msg = parse_args(&args(list)).err().unwrap().to_string();
      assert!(msg.contains("unknown option `--frobnicate`"), "{msg}");
    }

    let msg = parse_args(&args(&["--target-list"])).err().unwrap().to_string();
    assert!(msg.contains("missing value for `--target-list`"), "{msg}");
  }
}
