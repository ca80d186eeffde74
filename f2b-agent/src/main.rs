use anyhow::Context;

fn main() -> anyhow::Result<()> {
  let args: Vec<String> = std::env::args().collect();
  f2b_agent::run(&args).context("f2b-agent")
}
