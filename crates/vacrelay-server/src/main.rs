use std::{net::SocketAddr, path::PathBuf, sync::Arc};

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use clap::Parser;
use futures::{stream::SplitSink, SinkExt, StreamExt};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};
use vacrelay_core::prelude::*;
use vacrelay_core::source::DEFAULT_BAUD_RATE;

/// Relays vacuum pressure readings to connected viewers
#[derive(Debug, Parser)]
#[command(name = "vacrelay-server")]
struct Args {
    /// Generate simulated data instead of reading the serial link
    #[arg(long)]
    simulate: bool,

    /// Serial device the gauge is attached to
    #[arg(long, default_value = "/dev/ttyUSB0")]
    port: String,

    /// Serial baud rate
    #[arg(long, default_value_t = DEFAULT_BAUD_RATE)]
    baud: u32,

    /// Address to listen on
    #[arg(long, default_value = "127.0.0.1:8080")]
    listen: SocketAddr,

    /// Directory session logs are written to
    #[arg(long, default_value = ".")]
    log_dir: PathBuf,
}

#[derive(Clone)]
struct AppState {
    relay: Arc<Relay>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();
    let config = RelayConfig {
        mode: if args.simulate {
            SourceMode::Simulated
        } else {
            SourceMode::Live
        },
        port_name: args.port,
        baud_rate: args.baud,
        log_dir: args.log_dir,
        ..RelayConfig::default()
    };
    match config.mode {
        SourceMode::Simulated => info!("running in simulation mode"),
        SourceMode::Live => {
            info!(port = %config.port_name, baud = config.baud_rate, "running in live mode")
        }
    }

    let relay = Relay::new(config, EventBus::default());
    let app = build_router(AppState {
        relay: Arc::clone(&relay),
    });

    info!(addr = %args.listen, "server listening");
    let listener = tokio::net::TcpListener::bind(args.listen).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    relay.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        warn!(%error, "could not install ctrl-c handler");
    }
}

fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/ws", get(ws_handler))
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| ws_connection(state, socket))
}

async fn ws_connection(state: AppState, socket: WebSocket) {
    let status = state.relay.clone().on_viewer_connect().await;
    let mut events_rx = state.relay.bus().subscribe();
    let (mut sender, mut receiver) = socket.split();

    // Session state first, so the viewer never races the next sample.
    if send_event(&mut sender, &status).await.is_err() {
        return;
    }

    // Requester-only events (command failures) bypass the broadcast channel.
    let (direct_tx, mut direct_rx) = mpsc::unbounded_channel::<RelayEvent>();

    let forward_task = tokio::spawn(async move {
        loop {
            let event = tokio::select! {
                direct = direct_rx.recv() => match direct {
                    Some(event) => event,
                    None => break,
                },
                published = events_rx.recv() => match published {
                    Ok(event) => event,
                    // Best-effort delivery: a lagging viewer just skips ahead.
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            };
            if send_event(&mut sender, &event).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(message)) = receiver.next().await {
        let Message::Text(text) = message else {
            continue;
        };
        match serde_json::from_str::<ViewerCommand>(&text) {
            Ok(command) => dispatch_command(&state, &direct_tx, command).await,
            Err(error) => debug!(%error, frame = %text, "ignoring unrecognized viewer frame"),
        }
    }

    debug!("viewer disconnected");
    forward_task.abort();
}

async fn dispatch_command(
    state: &AppState,
    direct: &mpsc::UnboundedSender<RelayEvent>,
    command: ViewerCommand,
) {
    match command {
        ViewerCommand::StartLogging => {
            if let Err(error) = state.relay.start_logging().await {
                warn!(%error, "start_logging failed");
                let _ = direct.send(RelayEvent::Error {
                    message: error.to_string(),
                });
            }
        }
        ViewerCommand::StopLogging => state.relay.stop_logging().await,
        ViewerCommand::RestartSimulation => state.relay.restart_simulation().await,
    }
}

async fn send_event(
    sender: &mut SplitSink<WebSocket, Message>,
    event: &RelayEvent,
) -> Result<(), axum::Error> {
    let text = match serde_json::to_string(event) {
        Ok(text) => text,
        Err(_) => return Ok(()),
    };
    sender.send(Message::Text(text)).await
}
