//! StreamLED Server
//!
//! Listens to chat, push notifications and signed webhooks of a live
//! channel and drives an MQTT LED panel from the resulting events.

mod api;
mod bridge;
mod config;
mod server;
mod shutdown;
mod state;

use clap::Parser;
use config::ConfigLoader;
use server::{bind, build_router, run_server};
use shutdown::{join_with_grace, shutdown_signal, signal_stop};
use state::{AppState, WebhookState};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use streamled_core::Context;
use streamled_core::device::{MqttTransport, device_queue};
use streamled_core::sources::{ChatClient, EventSubReceiver, PushMonitor, Registrar};
use tokio::sync::watch;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Time left to the device worker to finish the command in progress.
const DRAIN_GRACE: Duration = Duration::from_secs(15);

/// StreamLED - stream events on an LED panel
#[derive(Parser, Debug)]
#[command(name = "streamled-server")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, env = "STREAMLED_CONFIG", default_value = "./streamled.toml")]
    config: PathBuf,

    /// Override the listen address (e.g., 0.0.0.0:3000)
    #[arg(short, long)]
    listen: Option<SocketAddr>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    init_tracing();

    // Parse command line arguments
    let args = Args::parse();

    tracing::info!("Starting streamled-server v{}", env!("CARGO_PKG_VERSION"));

    // TLS for the chat socket and the websocket session
    if tokio_rustls::rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        tracing::debug!("A TLS crypto provider is already installed");
    }

    // Load configuration
    let config = ConfigLoader::new(&args.config, args.listen)
        .load()
        .map_err(|e| {
            tracing::error!("Failed to load configuration: {}", e);
            e
        })?;
    tracing::info!("Configuration loaded from {:?}", args.config);

    let ctx = Context::default();
    ctx.bus.global().subscribe(|event| {
        tracing::debug!(kind = %event.kind(), channel = %event.channel_id(), "Event");
    });

    // Panel: MQTT transport, the serial worker and the event bridge
    let (bridge_stop_tx, bridge_stop_rx) = watch::channel(false);
    let (transport_stop_tx, transport_stop_rx) = watch::channel(false);
    let (transport, mqtt_task) = MqttTransport::spawn(&config.mqtt, transport_stop_rx);
    let (queue, worker) = device_queue(config.device.clone(), Arc::new(transport));
    let worker_task = tokio::spawn(worker.run());
    let bridge_task =
        bridge::spawn_bridge(ctx.bus.global(), queue, config.rewards.clone(), bridge_stop_rx);

    // Event sources
    let chat = match &config.chat {
        Some(chat_config) => Some(ChatClient::connect(&ctx, chat_config).await.map_err(|e| {
            tracing::error!("Failed to join chat: {}", e);
            e
        })?),
        None => None,
    };

    let monitor = match &config.pubsub {
        Some(pubsub_config) => Some(PushMonitor::start(&ctx, pubsub_config).await.map_err(|e| {
            tracing::error!("Failed to start push monitor: {}", e);
            e
        })?),
        None => None,
    };

    let webhook = config.eventsub.as_ref().map(|settings| {
        WebhookState::new(
            &settings.config.secret,
            EventSubReceiver::new(ctx.bus.clone()),
        )
    });

    // Listening before any subscription is requested
    let router = build_router(AppState::new(webhook));
    let listener = bind(config.listen).await?;

    let registrar_task = config
        .eventsub
        .as_ref()
        .filter(|settings| settings.register)
        .map(|settings| {
            let registrar = Registrar::new(&ctx, &settings.config);
            tokio::spawn(async move {
                if let Err(e) = registrar.register_all().await {
                    tracing::error!("Webhook registration failed: {}", e);
                }
            })
        });

    // Run the server
    let result = run_server(router, listener, shutdown_signal()).await;

    // Stop the sources first, then let the panel drain
    if let Some(task) = registrar_task {
        task.abort();
    }
    if let Some(chat) = &chat {
        chat.stop().await;
    }
    if let Some(monitor) = &monitor {
        monitor.stop().await;
    }

    signal_stop(&bridge_stop_tx);
    join_with_grace("bridge", bridge_task, Duration::from_secs(1)).await;
    join_with_grace("device worker", worker_task, DRAIN_GRACE).await;
    signal_stop(&transport_stop_tx);
    join_with_grace("mqtt", mqtt_task, Duration::from_secs(1)).await;

    tracing::info!("Server shutdown complete");

    result.map_err(Into::into)
}

/// Initialize the tracing subscriber with environment-based filtering.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,rumqttc=warn,tower_http=debug"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
