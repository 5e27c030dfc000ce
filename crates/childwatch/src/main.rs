//! `childwatch` - CLI for the child safety alert service
//!
//! This binary runs the alert intake and gives command-line access to the
//! stored alert history.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use anyhow::{bail, Context};
use clap::Parser;

use childwatch::alert::SystemClock;
use childwatch::broker::publish_alert;
use childwatch::cli::{
    render_alerts, Cli, Command, ConfigCommand, ListCommand, PublishCommand, PurgeCommand,
};
use childwatch::{init_logging, AlertService, AlertStore, Clock, Config, Storage};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbosity());

    let config = Config::load_from(cli.config.clone()).context("loading configuration")?;

    match cli.command {
        Command::Run => handle_run(config).await,
        Command::List(list_cmd) => handle_list(&config, &list_cmd),
        Command::Disclose { id } => handle_disclose(&config, id),
        Command::Delete { id } => handle_delete(&config, id),
        Command::Purge(purge_cmd) => handle_purge(&config, &purge_cmd),
        Command::Publish(publish_cmd) => handle_publish(&config, &publish_cmd).await,
        Command::Status(status_cmd) => handle_status(&config, status_cmd.json),
        Command::Config(config_cmd) => handle_config(&config, config_cmd),
    }
}

fn open_store(config: &Config) -> anyhow::Result<Storage> {
    let path = config.database_path();
    Storage::open_with_limits(&path, config.store_limits())
        .with_context(|| format!("opening alert database {}", path.display()))
}

async fn handle_run(config: Config) -> anyhow::Result<()> {
    let store = open_store(&config)?;
    let endpoint = config.broker.endpoint();
    let topic = config.broker.topic.clone();

    let service = AlertService::with_store(config, store);
    println!("Listening for alerts on {topic} at {endpoint} (Ctrl-C to stop)...");
    let running = service.start();
    let stored = running
        .run_until(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::error!("Cannot listen for Ctrl-C: {}", err);
                std::future::pending::<()>().await;
            }
        })
        .await?;

    println!("Stopped. {stored} alerts stored this session.");
    Ok(())
}

fn handle_list(config: &Config, cmd: &ListCommand) -> anyhow::Result<()> {
    let store = open_store(config)?;
    let mut alerts = if cmd.undisclosed {
        store.list_undisclosed()?
    } else {
        store.list()?
    };
    if let Some(limit) = cmd.limit {
        alerts.truncate(limit);
    }
    println!("{}", render_alerts(&alerts, cmd.format)?);
    Ok(())
}

fn handle_disclose(config: &Config, id: i64) -> anyhow::Result<()> {
    let store = open_store(config)?;
    if store.mark_disclosed(id)? {
        println!("Alert #{id} disclosed.");
    } else {
        println!("No alert with id {id}.");
    }
    Ok(())
}

fn handle_delete(config: &Config, id: i64) -> anyhow::Result<()> {
    let store = open_store(config)?;
    if store.delete(id)? {
        println!("Alert #{id} deleted.");
    } else {
        println!("No alert with id {id}.");
    }
    Ok(())
}

fn handle_purge(config: &Config, cmd: &PurgeCommand) -> anyhow::Result<()> {
    let store = open_store(config)?;
    if cmd.purge_expired() {
        let removed = store.delete_expired(SystemClock.now())?;
        println!(
            "Removed {removed} alerts older than {} hours.",
            config.storage.retention_hours
        );
    }
    if cmd.purge_disclosed() {
        let removed = store.delete_disclosed()?;
        println!("Removed {removed} disclosed alerts.");
    }
    Ok(())
}

async fn handle_publish(config: &Config, cmd: &PublishCommand) -> anyhow::Result<()> {
    let topic = cmd.topic.as_deref().unwrap_or(&config.broker.topic);
    if topic.contains(['+', '#']) {
        bail!("cannot publish to wildcard topic '{topic}'");
    }
    publish_alert(&config.broker, topic, &cmd.message).await?;
    println!("Published to {topic} at {}.", config.broker.endpoint());
    Ok(())
}

fn handle_status(config: &Config, json: bool) -> anyhow::Result<()> {
    let store = open_store(config)?;
    let stats = store.stats()?;

    if json {
        let status = serde_json::json!({
            "database_path": config.database_path(),
            "broker": config.broker.endpoint(),
            "topic": config.broker.topic,
            "retention_hours": config.storage.retention_hours,
            "stats": stats,
        });
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        println!("childwatch status");
        println!("-----------------");
        println!("Database:      {}", config.database_path().display());
        println!("Broker:        {}", config.broker.endpoint());
        println!("Topic:         {}", config.broker.topic);
        println!("Retention:     {} hours", config.storage.retention_hours);
        println!();
        println!("Alerts:        {}", stats.total_alerts);
        println!("  Undisclosed: {}", stats.undisclosed_alerts);
        println!("  Disclosed:   {}", stats.disclosed_alerts);
        if let (Some(oldest), Some(newest)) = (&stats.oldest_alert, &stats.newest_alert) {
            println!("Oldest:        {oldest}");
            println!("Newest:        {newest}");
        }
        println!("Database size: {} bytes", stats.db_size_bytes);
    }
    Ok(())
}

fn handle_config(config: &Config, cmd: ConfigCommand) -> anyhow::Result<()> {
    match cmd {
        ConfigCommand::Show { json } => {
            let shown = config.redacted();
            if json {
                println!("{}", serde_json::to_string_pretty(&shown)?);
            } else {
                println!("Current Configuration");
                println!("=====================");
                println!();
                println!("[Storage]");
                println!("  Database path:      {}", shown.database_path().display());
                println!("  Retention (hours):  {}", shown.storage.retention_hours);
                println!("  Max message length: {}", shown.storage.max_message_length);
                println!("  Overlong messages:  {}", shown.storage.overlong_messages);
                println!(
                    "  Sweep interval:     {}",
                    shown
                        .sweep_interval()
                        .map_or_else(|| "off".to_string(), |d| format!("{} min", d.as_secs() / 60))
                );
                println!();
                println!("[Broker]");
                println!("  Endpoint:           {}", shown.broker.endpoint());
                println!("  Topic:              {}", shown.broker.topic);
                println!(
                    "  Client id:          {}",
                    shown.broker.client_id.as_deref().unwrap_or("(generated)")
                );
                println!("  Keep alive (s):     {}", shown.broker.keep_alive_secs);
                println!("  Reconnect (ms):     {}", shown.broker.reconnect_delay_ms);
                println!(
                    "  Username:           {}",
                    shown.broker.username.as_deref().unwrap_or("(none)")
                );
                println!(
                    "  Password:           {}",
                    shown.broker.password.as_deref().unwrap_or("(none)")
                );
                println!();
                println!("[Notification]");
                println!("  Title:              {}", shown.notification.title);
                println!("  Channel:            {}", shown.notification.channel_id);
            }
        }
        ConfigCommand::Path => {
            println!("{}", Config::default_config_path().display());
        }
        ConfigCommand::Validate { file } => {
            let path = file.unwrap_or_else(Config::default_config_path);
            println!("Validating configuration: {}", path.display());
            match Config::load_from(Some(path)) {
                Ok(_) => println!("Configuration is valid."),
                Err(e) => bail!("configuration error: {e}"),
            }
        }
    }
    Ok(())
}
