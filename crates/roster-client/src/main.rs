//! `client`: connects to a roster server and mirrors its personnel records
//! into a local SQLite store.
//!
//! # Usage
//!
//! ```text
//! client --addr 127.0.0.1:5000 --client-id front-desk
//! client --config ~/.config/roster/client.toml
//! ```

use std::{
  io::Write as _,
  path::PathBuf,
  sync::Arc,
};

use anyhow::{Context, Result};
use clap::Parser;
use roster_client::{Client, spawn_inbound};
use roster_core::{
  record::{NewRecord, RecordId},
  store::PersonnelStore,
};
use roster_store_sqlite::{SqliteStore, expand_home};
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt as _, BufReader, Lines, Stdin};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

// ─── CLI args ─────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "client", about = "Personnel record client")]
struct Args {
  /// Path to a TOML config file (addr, client_id, store_path).
  #[arg(short, long, value_name = "FILE")]
  config: Option<PathBuf>,

  /// Server address (default: 127.0.0.1:5000).
  #[arg(long, env = "ROSTER_ADDR")]
  addr: Option<String>,

  /// Id sent in the identify handshake (default: a random `client-<uuid>`).
  #[arg(long, env = "ROSTER_CLIENT_ID")]
  client_id: Option<String>,

  /// Local mirror database (default: ./data/personnel.sqlite).
  #[arg(long, env = "ROSTER_STORE")]
  store: Option<PathBuf>,
}

// ─── Config file ──────────────────────────────────────────────────────────────

/// Shape of the optional TOML config file.
#[derive(Deserialize, Default)]
struct ConfigFile {
  #[serde(default)]
  addr:       String,
  #[serde(default)]
  client_id:  String,
  #[serde(default)]
  store_path: Option<PathBuf>,
}

const MENU: &str = "\
1) Add personnel
2) Request personnel by id
3) Exit
4) List local records";

// ─── Entry point ──────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let args = Args::parse();

  let file_cfg: ConfigFile = if let Some(path) = &args.config {
    let raw = std::fs::read_to_string(path)
      .with_context(|| format!("reading config file {}", path.display()))?;
    toml::from_str(&raw).context("parsing config file")?
  } else {
    ConfigFile::default()
  };

  // CLI flags override config file, which overrides defaults.
  let addr = args
    .addr
    .or_else(|| (!file_cfg.addr.is_empty()).then(|| file_cfg.addr.clone()))
    .unwrap_or_else(|| "127.0.0.1:5000".to_string());
  let client_id = args
    .client_id
    .or_else(|| (!file_cfg.client_id.is_empty()).then(|| file_cfg.client_id.clone()))
    .unwrap_or_else(|| format!("client-{}", uuid::Uuid::new_v4()));
  let store_path = expand_home(
    &args
      .store
      .or(file_cfg.store_path)
      .unwrap_or_else(|| PathBuf::from("./data/personnel.sqlite")),
  );

  if let Some(parent) = store_path.parent()
    && !parent.as_os_str().is_empty()
  {
    std::fs::create_dir_all(parent)
      .with_context(|| format!("creating store directory {}", parent.display()))?;
  }
  let store = Arc::new(
    SqliteStore::open(&store_path)
      .await
      .with_context(|| format!("failed to open store at {store_path:?}"))?,
  );

  let (mut client, reader) = Client::connect(&addr, client_id).await?;
  let mut inbound = spawn_inbound(reader, Arc::clone(&store));
  let mut lines = BufReader::new(tokio::io::stdin()).lines();

  loop {
    println!("\n{MENU}");
    let choice = tokio::select! {
      line = prompt(&mut lines, "> ") => line?,
      joined = &mut inbound => {
        joined.context("inbound task panicked")??;
        println!("server closed the connection");
        return Ok(());
      }
    };
    let Some(choice) = choice else { break };

    match choice.as_str() {
      "1" => {
        let Some(record) = read_record(&mut lines).await? else { break };
        client.add(record).await?;
      }
      "2" => {
        let Some(id) = read_id(&mut lines).await? else { break };
        client.request(id).await?;
      }
      "3" => break,
      "4" => {
        let records = store.get_all().await.context("reading local store")?;
        if records.is_empty() {
          println!("no local records");
        }
        for r in records {
          println!("{:>5}  {} {}  {}", r.id, r.name, r.surname, r.identity_key);
        }
      }
      other => println!("unknown option '{other}'"),
    }
  }

  client.close().await?;
  inbound.abort();
  Ok(())
}

async fn prompt(lines: &mut Lines<BufReader<Stdin>>, label: &str) -> Result<Option<String>> {
  print!("{label}");
  std::io::stdout().flush().context("flushing stdout")?;
  let line = lines.next_line().await.context("reading stdin")?;
  Ok(line.map(|l| l.trim().to_owned()))
}

async fn read_record(lines: &mut Lines<BufReader<Stdin>>) -> Result<Option<NewRecord>> {
  let Some(name) = prompt(lines, "name: ").await? else { return Ok(None) };
  let Some(surname) = prompt(lines, "surname: ").await? else { return Ok(None) };
  let Some(identity_key) = prompt(lines, "identity key: ").await? else { return Ok(None) };
  Ok(Some(NewRecord::new(name, surname, identity_key)))
}

async fn read_id(lines: &mut Lines<BufReader<Stdin>>) -> Result<Option<RecordId>> {
  loop {
    let Some(line) = prompt(lines, "record id: ").await? else { return Ok(None) };
    match line.parse() {
      Ok(id) => return Ok(Some(id)),
      Err(_) => println!("'{line}' is not a record id"),
    }
  }
}
