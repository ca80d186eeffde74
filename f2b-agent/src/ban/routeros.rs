use super::{BanError, BlockList};
use crate::config::RouterConfig;
use anyhow::Context;
use reqwest::blocking::Client;
use reqwest::header::USER_AGENT;
use reqwest::redirect::Policy;
use reqwest::Url;
use serde::Serialize;
use std::net::IpAddr;
use std::time::Duration;

const ADDRESS_LIST_PATH: &str = "rest/ip/firewall/address-list";
const MAX_ERROR_BODY_CHARS: usize = 512;

#[derive(Serialize)]
struct AddressListEntry<'a> {
  list: &'a str,
  address: String,
  comment: &'a str,
}

/// RouterOS v7 REST client for `/ip/firewall/address-list`.
pub struct RouterOsRest {
  client: Client,
  endpoint: Url,
  username: String,
  password: String,
}

impl RouterOsRest {
  pub fn new(cfg: &RouterConfig) -> anyhow::Result<Self> {
    let base = Url::parse(&cfg.url).with_context(|| format!("invalid router url: {}", cfg.url))?;
    let endpoint = join_path(&base, ADDRESS_LIST_PATH)?;

    let client = Client::builder()
      .timeout(Duration::from_secs(cfg.timeout_seconds.max(1)))
      .redirect(Policy::none())
      .danger_accept_invalid_certs(cfg.accept_invalid_certs)
      .build()
      .context("build router HTTP client")?;

    Ok(Self {
      client,
      endpoint,
      username: cfg.username.clone(),
      password: cfg.password.clone(),
    })
  }

  pub fn endpoint(&self) -> &Url {
    &self.endpoint
  }
}

impl BlockList for RouterOsRest {
  fn append(&self, list: &str, address: IpAddr) -> Result<(), BanError> {
    let entry = AddressListEntry {
      list,
      address: address.to_string(),
      comment: "f2b-agent",
    };

    let response = self
      .client
      .put(self.endpoint.clone())
      .basic_auth(&self.username, Some(&self.password))
      .header(USER_AGENT, format!("f2b-agent/{}", env!("CARGO_PKG_VERSION")))
      .json(&entry)
      .send()
      .map_err(|e| BanError::Transport(e.without_url().to_string()))?;

    let status = response.status().as_u16();
    if response.status().is_success() {
      return Ok(());
    }

    let body = response.text().unwrap_or_default();
    if is_duplicate_entry(status, &body) {
      tracing::info!(%address, list, "address already present in router block-list");
      return Ok(());
    }

    Err(BanError::Rejected {
      status,
      body: truncate(&body, MAX_ERROR_BODY_CHARS),
    })
  }
}

fn join_path(base: &Url, path: &str) -> anyhow::Result<Url> {
  let mut base = base.clone();
  if !base.path().ends_with('/') {
    let with_slash = format!("{}/", base.path());
    base.set_path(&with_slash);
  }
  base
    .join(path)
    .with_context(|| format!("build address-list URL from {base}"))
}

// RouterOS answers a second add of the same entry with 400 and
// "failure: already have such entry".
fn is_duplicate_entry(status: u16, body: &str) -> bool {
  status == 400 && body.to_ascii_lowercase().contains("already have such entry")
}

fn truncate(s: &str, max_chars: usize) -> String {
  let trimmed = s.trim();
  match trimmed.char_indices().nth(max_chars) {
    Some((idx, _)) => format!("{}...", &trimmed[..idx]),
    None => trimmed.to_string(),
  }
}
