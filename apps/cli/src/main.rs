use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use client_core::{
    ActionPhase, BatchTerminal, DirectoryClientConfig, HttpUserDirectory, ManagerEvent,
    StatusSnapshot, UserManager,
};
use serde_json::Value;
use shared::{domain::UserId, protocol::UserRecord};
use tokio::sync::broadcast::{error::RecvError, Receiver};
use tracing::debug;

#[derive(Parser, Debug)]
#[command(name = "users", about = "Manage directory users through the relay")]
struct Args {
    #[arg(long, default_value = client_core::directory::DEFAULT_RELAY_URL)]
    relay_url: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List every user.
    List,
    /// Show one user.
    Get { id: String },
    /// Create a user from `name=value` fields.
    Create {
        #[arg(long = "field", value_parser = parse_field)]
        fields: Vec<(String, Value)>,
    },
    /// Change fields of an existing user.
    Update {
        id: String,
        #[arg(long = "field", value_parser = parse_field)]
        fields: Vec<(String, Value)>,
    },
    /// Delete one or more users.
    Delete {
        #[arg(required = true)]
        ids: Vec<String>,
    },
}

/// `name=value`; the value is taken as JSON when it parses, text otherwise.
fn parse_field(raw: &str) -> Result<(String, Value), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected name=value, got '{raw}'"))?;
    if name.is_empty() {
        return Err(format!("missing field name in '{raw}'"));
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.into()));
    Ok((name.to_string(), value))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("warn")
        .with_writer(std::io::stderr)
        .init();
    let args = Args::parse();

    let directory = HttpUserDirectory::new(&DirectoryClientConfig::new(&args.relay_url))
        .with_context(|| format!("invalid relay url '{}'", args.relay_url))?;
    let mut manager = UserManager::new(Arc::new(directory));
    let printer = tokio::spawn(print_status(manager.subscribe_events()));

    let result = run(&mut manager, args.command).await;

    drop(manager);
    let _ = printer.await;
    result
}

async fn run(manager: &mut UserManager, command: Command) -> Result<()> {
    match command {
        Command::List => {
            expect_success(manager.fetch_all().await)?;
            for user in manager.users().iter() {
                println!("{}", summary_line(user));
            }
        }
        Command::Get { id } => {
            let id = UserId::new(id);
            expect_success(manager.fetch_all().await)?;
            expect_success(manager.fetch_one(&id).await)?;
            let user = manager
                .users()
                .iter()
                .find(|user| user.id.as_ref() == Some(&id))
                .cloned()
                .ok_or_else(|| anyhow!("user {id} is not provisioned"))?;
            println!("{}", serde_json::to_string_pretty(&*user)?);
        }
        Command::Create { fields } => {
            manager.open_new_draft();
            let record = apply_fields(UserRecord::default(), fields);
            expect_success(manager.save_draft(record).await)?;
        }
        Command::Update { id, fields } => {
            let id = UserId::new(id);
            expect_success(manager.fetch_all().await)?;
            if !manager.open_details(&id) {
                bail!("user {id} is not provisioned");
            }
            let current = manager
                .draft()
                .map(|draft| draft.record.clone())
                .unwrap_or_default();
            expect_success(manager.save_draft(apply_fields(current, fields)).await)?;
        }
        Command::Delete { ids } => {
            for id in ids {
                manager.toggle_selection(UserId::new(id), true);
            }
            let report = manager.delete_selected().await;
            match report.terminal {
                BatchTerminal::Succeeded { .. } => {}
                BatchTerminal::PartialFailure { failed, .. } | BatchTerminal::Failed { failed } => {
                    bail!("{failed} delete(s) failed")
                }
            }
        }
    }
    Ok(())
}

fn apply_fields(record: UserRecord, fields: Vec<(String, Value)>) -> UserRecord {
    fields
        .into_iter()
        .fold(record, |record, (name, value)| record.with_field(name, value))
}

fn expect_success(phase: ActionPhase) -> Result<()> {
    match phase {
        ActionPhase::Failed => bail!("operation failed"),
        _ => Ok(()),
    }
}

fn summary_line(user: &UserRecord) -> String {
    format!(
        "{:<28} {:<20} {:<28} {:<30} {}",
        user.id.as_ref().map(UserId::as_str).unwrap_or_default(),
        user.username().unwrap_or_default(),
        user.full_name(),
        user.email().unwrap_or_default(),
        user.status_label(),
    )
}

/// Prints the progress and error lines whenever either changes.
async fn print_status(mut events: Receiver<ManagerEvent>) {
    let mut last = StatusSnapshot::default();
    loop {
        match events.recv().await {
            Ok(ManagerEvent::Status(snapshot)) => {
                if snapshot.progress != last.progress && !snapshot.progress.is_empty() {
                    eprintln!("{}", snapshot.progress);
                }
                if snapshot.error != last.error && !snapshot.error.is_empty() {
                    eprintln!("error: {}", snapshot.error);
                }
                last = snapshot;
            }
            Ok(ManagerEvent::DeleteFailed { id, failure }) => {
                eprintln!("could not delete {id}: {failure}");
            }
            Ok(_) => {}
            Err(RecvError::Lagged(skipped)) => debug!(skipped, "cli: status events dropped"),
            Err(RecvError::Closed) => break,
        }
    }
}
