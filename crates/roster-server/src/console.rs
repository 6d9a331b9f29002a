//! Line-oriented operator prompts over stdin.

use std::io::Write as _;

use anyhow::Context as _;
use roster_core::record::RecordId;
use tokio::io::{AsyncBufReadExt as _, BufReader, Lines, Stdin};

pub struct Console {
  lines: Lines<BufReader<Stdin>>,
}

impl Console {
  pub fn new() -> Self { Self { lines: BufReader::new(tokio::io::stdin()).lines() } }

  /// Print `label` and read one trimmed line. `None` at end of input.
  pub async fn prompt(&mut self, label: &str) -> anyhow::Result<Option<String>> {
    print!("{label}");
    std::io::stdout().flush().context("flushing stdout")?;
    let line = self.lines.next_line().await.context("reading stdin")?;
    Ok(line.map(|l| l.trim().to_owned()))
  }

  /// Prompt until the operator enters a valid record id.
  pub async fn prompt_id(&mut self, label: &str) -> anyhow::Result<Option<RecordId>> {
    loop {
      let Some(line) = self.prompt(label).await? else {
        return Ok(None);
      };
      match line.parse() {
        Ok(id) => return Ok(Some(id)),
        Err(_) => println!("'{line}' is not a record id"),
      }
    }
  }
}
