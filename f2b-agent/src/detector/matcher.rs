// Crude heuristic inherited from the deployed tool: WordPress answers a good
// login with a 302 redirect, so any POST to wp-login.php without "302"
// anywhere on the line counts as a failure. A 200 on this endpoint means the
// form was re-rendered, i.e. the password was wrong. A "302" elsewhere on the
// line (byte count, user agent) also hides the attempt.

pub const FAILED_LOGIN_MARKER: &str = "POST /wp-login.php";
pub const SUCCESS_MARKER: &str = "302";

const ADDRESS_TOKEN_INDEX: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchResult<'a> {
  pub is_match: bool,
  /// Source address token; `None` when the line matched but has fewer than
  /// four tokens.
  pub address: Option<&'a str>,
}

impl<'a> MatchResult<'a> {
  const NO_MATCH: Self = Self {
    is_match: false,
    address: None,
  };
}

/// Classifies an already normalized line.
pub fn extract(normalized: &str) -> MatchResult<'_> {
  if !normalized.contains(FAILED_LOGIN_MARKER) || normalized.contains(SUCCESS_MARKER) {
    return MatchResult::NO_MATCH;
  }

  let address = normalized
    .split(' ')
    .nth(ADDRESS_TOKEN_INDEX)
    .filter(|tok| !tok.is_empty());

  MatchResult {
    is_match: true,
    address,
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::detector::normalize;

  const POST_500: &str = "nginx.1     | some-website.co.za 185.211.245.199 - - [22/Mar/2019:21:05:12 +0000] \"POST /wp-login.php HTTP/1.1\" 500 595 \"https://your-website.co.za/wp-login.php\" \"Mozilla/5.0\"";

  #[test]
  fn post_with_200_is_a_failed_login() {
    let line = normalize(
      "nginx.1 | some-website.co.za 10.1.2.3 - - [x] \"POST /wp-login.php HTTP/1.1\" 200 1592",
    );
    let m = extract(&line);
    assert!(m.is_match);
    assert_eq!(m.address, Some("10.1.2.3"));
  }

  #[test]
  fn post_with_500_extracts_fourth_token() {
    let line = normalize(POST_500);
    let m = extract(&line);
    assert!(m.is_match);
    assert_eq!(m.address, Some("185.211.245.199"));
  }

  #[test]
  fn any_302_on_the_line_suppresses_the_match() {
    let redirect = normalize(
      "nginx.1 | site 10.1.2.3 - - [x] \"POST /wp-login.php HTTP/1.1\" 302 0",
    );
    assert!(!extract(&redirect).is_match);

    let trailing = normalize(&format!("{POST_500} 302"));
    assert!(!extract(&trailing).is_match);
  }

  #[test]
  fn get_requests_do_not_match() {
    let line = normalize(
      "nginx.1 | some-website.co.za 139.59.82.21 - - [28/Mar/2019:21:23:11 +0000] \"GET /wp-login.php HTTP/1.1\" 200 1592 \"-\" \"Mozilla/5.0\"",
    );
    assert_eq!(extract(&line), MatchResult::NO_MATCH);
  }

  #[test]
  fn short_line_matches_without_address() {
    let m = extract("x POST /wp-login.php");
    assert!(m.is_match);
    assert_eq!(m.address, None);
  }
}
