use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::Context;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State as AxumState;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use clap::Parser;
use crashline_execution::{FileJournal, MemoryJournal};
use crashline_types::{LedgerMode, RoundSnapshot};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{broadcast, mpsc};
use tokio::time;
use tracing::{error, info, warn, Level};

mod casino;
mod config;
mod messages;

use casino::Casino;
use config::CrashTableConfig;
use messages::{ack, error_response, AckPayload, InboundMessage, OutboundEvent, OutboundResponse};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Host interface to bind.
    #[arg(long, default_value = "0.0.0.0")]
    host: IpAddr,

    #[arg(short, long, default_value_t = 9123)]
    port: u16,

    /// Escrow journal file. Without one, open escrows do not survive a restart.
    #[arg(long)]
    journal: Option<PathBuf>,
}

#[derive(Clone)]
struct AppState {
    casino: Arc<Mutex<Casino>>,
    broadcaster: broadcast::Sender<OutboundEvent>,
}

impl AppState {
    fn casino(&self) -> MutexGuard<'_, Casino> {
        lock_casino(&self.casino)
    }
}

fn lock_casino(casino: &Mutex<Casino>) -> MutexGuard<'_, Casino> {
    casino.lock().unwrap_or_else(PoisonError::into_inner)
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
}

fn init_tracing(level: Level) {
    tracing_subscriber::fmt().with_max_level(level).init();
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    AxumState(state): AxumState<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

    // Subscribe under the lock so every broadcast this socket sees is newer than its first
    // snapshot; late joiners get the current table straight away.
    let mut broadcast_rx = {
        let casino = state.casino();
        send_event(&tx, &table_state(casino.snapshot()));
        state.broadcaster.subscribe()
    };

    let write_task = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            if sender.send(message).await.is_err() {
                break;
            }
        }
    });

    let broadcast_task = {
        let tx = tx.clone();
        tokio::spawn(async move {
            loop {
                match broadcast_rx.recv().await {
                    Ok(event) => {
                        if let Ok(payload) = serde_json::to_string(&event) {
                            let _ = tx.send(Message::Text(payload));
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "slow client skipped table events");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    };

    while let Some(Ok(message)) = receiver.next().await {
        match message {
            Message::Text(text) => match serde_json::from_str::<InboundMessage>(&text) {
                Ok(inbound) => handle_inbound(inbound, &state, &tx),
                Err(err) => {
                    warn!(?err, "invalid inbound message");
                }
            },
            Message::Close(_) => break,
            _ => {}
        }
    }

    write_task.abort();
    broadcast_task.abort();
}

fn handle_inbound(inbound: InboundMessage, state: &AppState, tx: &mpsc::UnboundedSender<Message>) {
    let now = now_ms();
    let mut casino = state.casino();
    let (response, event) = match inbound {
        InboundMessage::Join {
            request_id,
            player_id,
            display_name,
        } => match casino.join(&player_id, display_name) {
            Ok(balance) => (ack(request_id, AckPayload::Balance(balance)), None),
            Err(err) => (error_response(request_id, &err), None),
        },
        InboundMessage::Balance {
            request_id,
            player_id,
        } => (
            ack(request_id, AckPayload::Balance(casino.balance(&player_id))),
            None,
        ),
        InboundMessage::Bet {
            request_id,
            player_id,
            amount,
            mode,
            auto_cashout,
        } => {
            let mode = mode.unwrap_or(LedgerMode::Demo);
            match casino.bet(&player_id, amount, mode, auto_cashout, now) {
                Ok(view) => (
                    ack(request_id, AckPayload::Bet(view)),
                    Some(table_state(casino.snapshot())),
                ),
                Err(err) => (error_response(request_id, &err), None),
            }
        }
        InboundMessage::Cashout {
            request_id,
            player_id,
        } => match casino.cash_out(&player_id, now) {
            Ok(receipt) => (
                ack(request_id, AckPayload::Cashout(receipt)),
                Some(table_state(casino.snapshot())),
            ),
            Err(err) => (error_response(request_id, &err), None),
        },
        InboundMessage::MinesStart {
            request_id,
            player_id,
            amount,
            mode,
            mines,
        } => {
            let mode = mode.unwrap_or(LedgerMode::Demo);
            match casino.mines_start(&player_id, amount, mode, mines, now) {
                Ok(view) => (ack(request_id, AckPayload::Mines(view)), None),
                Err(err) => (error_response(request_id, &err), None),
            }
        }
        InboundMessage::MinesReveal {
            request_id,
            player_id,
            cell,
        } => match casino.mines_reveal(&player_id, cell) {
            Ok(outcome) => (ack(request_id, AckPayload::MinesReveal(outcome)), None),
            Err(err) => (error_response(request_id, &err), None),
        },
        InboundMessage::MinesView {
            request_id,
            player_id,
        } => match casino.mines_view(&player_id) {
            Ok(view) => (ack(request_id, AckPayload::Mines(view)), None),
            Err(err) => (error_response(request_id, &err), None),
        },
        InboundMessage::MinesCashout {
            request_id,
            player_id,
        } => match casino.mines_cash_out(&player_id) {
            Ok(settled) => (ack(request_id, AckPayload::MinesCashout(settled)), None),
            Err(err) => (error_response(request_id, &err), None),
        },
    };

    // Broadcast before releasing the lock so table events keep the order they happened in.
    if let Some(event) = event {
        let _ = state.broadcaster.send(event);
    }
    drop(casino);
    send_response(tx, &response);
}

fn table_state(payload: RoundSnapshot) -> OutboundEvent {
    OutboundEvent::State {
        player_id: None,
        payload,
    }
}

fn send_response(tx: &mpsc::UnboundedSender<Message>, response: &OutboundResponse) {
    match serde_json::to_string(response) {
        Ok(payload) => {
            let _ = tx.send(Message::Text(payload));
        }
        Err(err) => error!(?err, "failed to encode response"),
    }
}

fn send_event(tx: &mpsc::UnboundedSender<Message>, event: &OutboundEvent) {
    if let Ok(payload) = serde_json::to_string(event) {
        let _ = tx.send(Message::Text(payload));
    }
}

async fn healthz() -> &'static str {
    "ok"
}

async fn snapshot(AxumState(state): AxumState<AppState>) -> Json<RoundSnapshot> {
    Json(state.casino().snapshot())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(?err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = CrashTableConfig::from_env();
    config.validate().context("invalid crash table configuration")?;
    init_tracing(config.log_level()?);

    let mut casino = match &args.journal {
        Some(path) => Casino::new(
            &config,
            FileJournal::open(path)
                .with_context(|| format!("failed to open escrow journal {}", path.display()))?,
        ),
        None => {
            warn!("no escrow journal configured; open escrows are lost on restart");
            Casino::new(&config, MemoryJournal::new())
        }
    };
    let report = casino.recover();
    if !report.refunded.is_empty() || !report.unreconciled.is_empty() {
        info!(
            refunded = report.refunded.len(),
            closed = report.closed.len(),
            unreconciled = report.unreconciled.len(),
            "recovered escrow journal"
        );
    }

    let casino = Arc::new(Mutex::new(casino));
    let (broadcaster, _) = broadcast::channel::<OutboundEvent>(1024);
    let state = AppState {
        casino: casino.clone(),
        broadcaster: broadcaster.clone(),
    };

    // Tick loop
    let tick_casino = casino.clone();
    let tick_broadcaster = broadcaster.clone();
    let tick_ms = config.tick_ms;
    let tick_task = tokio::spawn(async move {
        let mut interval = time::interval(Duration::from_millis(tick_ms));
        interval.set_missed_tick_behavior(time::MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            {
                let mut casino = lock_casino(&tick_casino);
                for event in casino.tick(now_ms()) {
                    let _ = tick_broadcaster.send(event);
                }
            }
        }
    });

    let app = Router::new()
        .route("/ws", get(ws_handler))
        .route("/healthz", get(healthz))
        .route("/snapshot", get(snapshot))
        .with_state(state);

    let addr = SocketAddr::new(args.host, args.port);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "crash table service listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    tick_task.abort();
    let (crash, mines) = lock_casino(&casino).shutdown();
    info!(crash, mines, "refunded open wagers on shutdown");
    Ok(())
}
