//! courier-relay
//!
//! - `listen`：把 Postgres 变更通知以 JSON 行的形式推送到 stdout；
//! - `send`：经命令总线发送一条短信，并打印持久化后的结果。
//!
mod config;
mod logging;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use config::RelaySettings;
use courier_application::command_bus::CommandBus;
use courier_application::context::AppContext;
use courier_application::{InMemoryCommandBus, SendSms, SendSmsHandler};
use courier_domain::delivery::{DeliveryConfig, DeliveryPipeline};
use courier_domain::eventing::{ListenerConfig, SubscriberRegistry};
use courier_domain::infra::{
    CarrierConfig, PgDeliveryOutcomeRepository, PgNotificationSource, TwilioCarrier,
};
use futures_util::StreamExt;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(name = "courier-relay")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Stream change events to stdout until interrupted
    Listen {
        /// Channels to LISTEN on (defaults to message_changes and conversation_changes)
        #[arg(short, long)]
        channel: Vec<String>,
    },
    /// Send one SMS and wait for its delivery outcome
    Send {
        #[arg(long)]
        to: String,
        /// Sender number (defaults to TWILIO_NUMBER)
        #[arg(long)]
        from: Option<String>,
        #[arg(long)]
        body: String,
        #[arg(long)]
        idempotency_key: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = RelaySettings::from_env()?;
    logging::init(settings.log_format)?;

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect_with(settings.database.connect_options()?)
        .await
        .context("failed to connect to Postgres")?;

    match cli.command {
        Commands::Listen { channel } => listen(pool, &settings, channel).await,
        Commands::Send {
            to,
            from,
            body,
            idempotency_key,
        } => send(pool, &settings, to, from, body, idempotency_key).await,
    }
}

async fn listen(pool: PgPool, settings: &RelaySettings, channels: Vec<String>) -> Result<()> {
    let mut config = ListenerConfig {
        reconnect_delay: settings.reconnect_delay,
        ..Default::default()
    };
    if !channels.is_empty() {
        config.channels = channels;
    }

    let registry = SubscriberRegistry::new(Arc::new(PgNotificationSource::new(pool)), config);
    let subscription = registry.subscribe().await;
    let id = subscription.id();
    let mut frames = subscription.into_stream();
    info!(subscriber = %id, "relaying change events to stdout");

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            frame = frames.next() => match frame {
                Some(frame) => println!("{frame}"),
                None => break,
            },
            _ = &mut shutdown => {
                info!("interrupt received, shutting down");
                break;
            }
        }
    }

    registry.remove_subscriber(id).await;
    registry.shutdown().await;
    Ok(())
}

async fn send(
    pool: PgPool,
    settings: &RelaySettings,
    to: String,
    from: Option<String>,
    body: String,
    idempotency_key: Option<String>,
) -> Result<()> {
    let carrier_settings = settings
        .carrier
        .as_ref()
        .context("TWILIO_SID and TWILIO_SECRET must be set to send")?;
    let from = from
        .or_else(|| carrier_settings.number.clone())
        .context("--from or TWILIO_NUMBER is required")?;

    let carrier = TwilioCarrier::new(
        CarrierConfig::builder()
            .maybe_base_url(carrier_settings.base_url.clone())
            .account_sid(carrier_settings.account_sid.clone())
            .auth_token(carrier_settings.auth_token.clone())
            .build(),
    )?;
    let pipeline = DeliveryPipeline::builder()
        .carrier(Arc::new(carrier))
        .repository(Arc::new(PgDeliveryOutcomeRepository::new(pool)))
        .config(DeliveryConfig {
            base_delay: settings.backoff_base,
            ..Default::default()
        })
        .build();

    let bus = InMemoryCommandBus::new();
    bus.register::<SendSms, _>(Arc::new(SendSmsHandler::new(Arc::new(pipeline))))?;

    let ctx = AppContext {
        idempotency_key,
        ..AppContext::correlated()
    };
    let result = bus.dispatch(&ctx, SendSms { to, from, body }).await?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}
