/// Collapses every run of ASCII whitespace (space, tab, CR, LF, form feed)
/// into a single space. Leading and trailing runs become one space too, so
/// token positions stay stable for the extractor.
pub fn normalize(raw: &str) -> String {
  let mut out = String::with_capacity(raw.len());
  let mut in_run = false;

  for ch in raw.chars() {
    if ch.is_ascii_whitespace() {
      if !in_run {
        out.push(' ');
        in_run = true;
      }
    } else {
      out.push(ch);
      in_run = false;
    }
  }

  out
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn collapses_mixed_runs() {
    let got = normalize("nginx.1     |\t\tsome-website.co.za \r\n 139.59.82.21");
    assert_eq!(got, "nginx.1 | some-website.co.za 139.59.82.21");
  }

  #[test]
  fn never_leaves_consecutive_whitespace() {
    let inputs = [
      "a  b",
      " \t a\n\n\nb \x0C c   ",
      "\r\n",
      "",
      "no-whitespace-at-all",
    ];
    for raw in inputs {
      let got = normalize(raw);
      let bytes = got.as_bytes();
      assert!(
        !bytes.windows(2).any(|w| w[0].is_ascii_whitespace() && w[1].is_ascii_whitespace()),
        "{raw:?} -> {got:?}"
      );
      let kept: String = got.chars().filter(|c| !c.is_ascii_whitespace()).collect();
      let orig: String = raw.chars().filter(|c| !c.is_ascii_whitespace()).collect();
      assert_eq!(kept, orig);
    }
  }

  #[test]
  fn trailing_newline_becomes_single_space() {
    assert_eq!(normalize("POST /wp-login.php\n"), "POST /wp-login.php ");
  }
}
