use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Arg, ArgAction, ArgGroup, Command};
use tokio::io::AsyncReadExt;
use tracing::info;

use gcp_backup_trigger::config::{Config, DEFAULT_ALERT_TOPIC};
use gcp_backup_trigger::dry_run::DryRunClient;
use gcp_backup_trigger::gcp::{AlertPublisher, BackupApi, GcpClient};
use gcp_backup_trigger::handler::{BackupHandler, Outcome};
use gcp_backup_trigger::logging::{self, LogFormat};

fn cli() -> Command {
    Command::new("gcp-backup-trigger")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Run a Cloud SQL backup for one event, retrying and alerting on failure")
        .arg(
            Arg::new("project")
                .long("project")
                .env("BACKUP_PROJECT_ID")
                .required(true)
                .help("GCP project that owns the instance and the alert topic"),
        )
        .arg(
            Arg::new("alert-topic")
                .long("alert-topic")
                .env("BACKUP_ALERT_TOPIC")
                .default_value(DEFAULT_ALERT_TOPIC)
                .help("Pub/Sub topic that receives failure alerts"),
        )
        .arg(
            Arg::new("retry-limit")
                .long("retry-limit")
                .env("BACKUP_RETRY_LIMIT")
                .value_parser(clap::value_parser!(u32))
                .default_value("3")
                .help("Retries after the initial attempt"),
        )
        .arg(
            Arg::new("event")
                .long("event")
                .help("Event JSON, e.g. '{\"instance_id\": \"db-1\"}'"),
        )
        .arg(
            Arg::new("event-file")
                .long("event-file")
                .value_parser(clap::value_parser!(PathBuf))
                .help("Read the event from a file instead of stdin"),
        )
        .group(ArgGroup::new("source").args(["event", "event-file"]))
        .arg(
            Arg::new("dry-run")
                .long("dry-run")
                .help("Simulate backup and alert calls without touching GCP")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("dry-run-fail")
                .long("dry-run-fail")
                .requires("dry-run")
                .help("In dry-run mode, never report the backup as done")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("log-level")
                .long("log-level")
                .default_value("info")
                .help("Log level (trace, debug, info, warn, error)"),
        )
        .arg(
            Arg::new("log-format")
                .long("log-format")
                .value_parser(clap::value_parser!(LogFormat))
                .default_value("text"),
        )
}

#[tokio::main]
async fn main() -> Result<()> {
    let matches = cli().get_matches();

    let log_level = matches
        .get_one::<String>("log-level")
        .map(String::as_str)
        .unwrap_or("info");
    let log_format = matches
        .get_one::<LogFormat>("log-format")
        .copied()
        .unwrap_or(LogFormat::Text);
    logging::init(log_level, log_format);

    let project = matches
        .get_one::<String>("project")
        .context("--project is required")?;
    let mut config = Config::new(project.as_str());
    if let Some(topic) = matches.get_one::<String>("alert-topic") {
        config = config.with_alert_topic(topic.as_str());
    }
    if let Some(limit) = matches.get_one::<u32>("retry-limit") {
        config = config.with_retry_limit(*limit);
    }
    config.validate()?;

    let payload = read_event(&matches).await?;

    let dry_run_mode = matches.get_flag("dry-run");
    let (api, publisher): (Box<dyn BackupApi>, Box<dyn AlertPublisher>) = if dry_run_mode {
        let api = if matches.get_flag("dry-run-fail") {
            DryRunClient::never_done()
        } else {
            DryRunClient::new()
        };
        (Box::new(api), Box::new(DryRunClient::new()))
    } else {
        let client = GcpClient::new();
        (Box::new(client.clone()), Box::new(client))
    };

    let handler = BackupHandler::new(config, api, publisher);

    // The handler never fails; the exit code stays 0 whatever the outcome.
    match handler.handle_event(&payload).await {
        Outcome::Rejected { reason } => info!(%reason, "event rejected"),
        Outcome::Succeeded {
            instance_id,
            retries,
        } => info!(instance_id = %instance_id, retries, "done"),
        Outcome::Exhausted {
            instance_id,
            alert_published,
            ..
        } => info!(instance_id = %instance_id, alert_published, "backup gave up"),
    }

    Ok(())
}

async fn read_event(matches: &clap::ArgMatches) -> Result<Vec<u8>> {
    if let Some(event) = matches.get_one::<String>("event") {
        return Ok(event.clone().into_bytes());
    }

    if let Some(path) = matches.get_one::<PathBuf>("event-file") {
        return tokio::fs::read(path)
            .await
            .with_context(|| format!("failed to read event file {}", path.display()));
    }

    let mut buffer = Vec::new();
    tokio::io::stdin()
        .read_to_end(&mut buffer)
        .await
        .context("failed to read event from stdin")?;
    Ok(buffer)
}
