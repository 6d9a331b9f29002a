//! roster server binary.
//!
//! Reads `server.toml` (or the path given with `--config`) layered with
//! `ROSTER_*` environment variables, opens the SQLite personnel store, accepts
//! clients in the background and runs the operator menu on stdin.

mod console;

use std::path::PathBuf;

use anyhow::Context as _;
use clap::Parser;
use console::Console;
use roster_server::{Delivery, Listener, Operator, ServerConfig, ServerState, Target};
use roster_store_sqlite::{SqliteStore, expand_home};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Personnel record server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "server.toml")]
  config: PathBuf,
}

const MENU: &str = "\
1) Send a record to one client
2) Send a record to all clients
3) Send all records to all clients
4) Delete a record on one client
5) Delete a record everywhere
6) Delete all records everywhere
7) List connected clients
q) Quit";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  let settings = config::Config::builder()
    .add_source(config::File::from(cli.config).required(false))
    .add_source(config::Environment::with_prefix("ROSTER"))
    .build()
    .context("failed to read config file")?;

  let server_cfg: ServerConfig = settings
    .try_deserialize()
    .context("failed to deserialise ServerConfig")?;

  let store_path = expand_home(&server_cfg.store_path);
  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;

  let state = ServerState::new(store, server_cfg.send_timeout());
  let listener = Listener::bind(&server_cfg.address()).await?;
  tokio::spawn(listener.run(state.clone()));

  let operator = Operator::new(state);
  let mut console = Console::new();

  tokio::select! {
    result = menu(&operator, &mut console) => result?,
    signal = tokio::signal::ctrl_c() => {
      signal.context("listening for ctrl-c")?;
    }
  }

  tracing::info!("shutting down");
  Ok(())
}

async fn menu(operator: &Operator<SqliteStore>, console: &mut Console) -> anyhow::Result<()> {
  loop {
    println!("\n{MENU}");
    let Some(choice) = console.prompt("> ").await? else {
      return Ok(());
    };

    let outcome = match choice.as_str() {
      "1" | "4" => {
        let Some(client_id) = console.prompt("client id: ").await? else {
          return Ok(());
        };
        let Some(id) = console.prompt_id("record id: ").await? else {
          return Ok(());
        };
        let target = Target::One(client_id);
        if choice == "1" {
          operator.send_record(target, id).await
        } else {
          operator.delete_record(target, id).await
        }
      }
      "2" | "5" => {
        let Some(id) = console.prompt_id("record id: ").await? else {
          return Ok(());
        };
        if choice == "2" {
          operator.send_record(Target::All, id).await
        } else {
          operator.delete_record(Target::All, id).await
        }
      }
      "3" => operator.send_all_records().await.map(|(count, report)| {
        println!("sending {count} record(s)");
        report
      }),
      "6" => operator.delete_all_records().await.map(|(removed, report)| {
        println!("deleted {removed} record(s)");
        report
      }),
      "7" => {
        let clients = operator.clients();
        if clients.is_empty() {
          println!("no clients connected");
        }
        for c in clients {
          println!(
            "{}  {}  since {}",
            c.client_id,
            c.connection.peer(),
            c.registered_at.format("%H:%M:%S")
          );
        }
        continue;
      }
      "q" | "Q" => return Ok(()),
      other => {
        println!("unknown option '{other}'");
        continue;
      }
    };

    match outcome {
      Ok(report) => print_report(&report),
      Err(e) => println!("error: {e}"),
    }
  }
}

fn print_report(report: &[Delivery]) {
  if report.is_empty() {
    println!("no recipients");
  }
  for delivery in report {
    match &delivery.outcome {
      Ok(()) => println!("  {}: delivered", delivery.client_id),
      Err(e) => println!("  {}: {e}", delivery.client_id),
    }
  }
}
