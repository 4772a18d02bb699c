use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use futures_util::{SinkExt, StreamExt};
use maze_marvels_server::config::{self, GameSettings};
use maze_marvels_server::constants::TICK_MS;
use maze_marvels_server::engine::GameEngine;
use maze_marvels_server::logging::emit_log;
use maze_marvels_server::maze::{self, MazeWorld};
use maze_marvels_server::server_protocol::{parse_client_message, ParsedClientMessage};
use maze_marvels_server::types::Difficulty;
use rand::distr::Alphanumeric;
use rand::Rng;
use serde_json::{json, Value};
use tokio::sync::{mpsc, Mutex};
use tower_http::services::{ServeDir, ServeFile};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

type SharedState = Arc<Mutex<ServerState>>;

struct ClientContext {
    tx: mpsc::Sender<OutboundMessage>,
    name: Option<String>,
    session_token: String,
    game: Option<GameEngine>,
}

#[derive(Clone, Debug)]
enum OutboundMessage {
    Text(String),
    Close { code: u16, reason: String },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum QueuePolicy {
    DropOnFull,
    DisconnectOnFull,
}

struct ServerState {
    clients: HashMap<String, ClientContext>,
    settings: GameSettings,
}

impl ServerState {
    fn new(settings: GameSettings) -> Self {
        Self {
            clients: HashMap::new(),
            settings,
        }
    }
}

#[tokio::main]
async fn main() {
    let port = std::env::var("PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);

    let config_path = std::env::var("CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("game-config.json"));
    let settings = config::load(&config_path);

    let state = Arc::new(Mutex::new(ServerState::new(settings)));
    start_tick_loop(state.clone());

    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/ws", get(ws_handler))
        .with_state(state);

    let app = if let Some(static_dir) = resolve_static_dir() {
        let index_file = static_dir.join("index.html");
        emit_log(
            "info",
            "static_root",
            json!({ "path": static_dir.to_string_lossy() }),
        );
        app.fallback_service(
            ServeDir::new(static_dir).not_found_service(ServeFile::new(index_file)),
        )
    } else {
        emit_log("warn", "static_root_missing", json!({}));
        app
    };

    let bind_addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .expect("failed to bind server socket");

    emit_log("info", "listening", json!({ "port": port }));
    axum::serve(listener, app)
        .await
        .expect("server runtime failed");
}

fn resolve_static_dir() -> Option<PathBuf> {
    if let Ok(raw) = std::env::var("STATIC_DIR") {
        let path = PathBuf::from(raw);
        if path.join("index.html").is_file() {
            return Some(path);
        }
    }

    let candidates = [PathBuf::from("dist/client"), PathBuf::from("../client")];
    candidates
        .into_iter()
        .find(|path| path.join("index.html").is_file())
}

async fn healthz() -> impl IntoResponse {
    Json(json!({ "ok": true }))
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<SharedState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(state, socket))
}

async fn handle_socket(state: SharedState, socket: WebSocket) {
    let client_id = make_id("client");
    let (tx, mut rx) = mpsc::channel::<OutboundMessage>(256);

    {
        let mut guard = state.lock().await;
        guard.clients.insert(
            client_id.clone(),
            ClientContext {
                tx: tx.clone(),
                name: None,
                session_token: make_session_token(),
                game: None,
            },
        );
    }
    emit_log("info", "client_connected", json!({ "client": client_id }));

    let (mut ws_sender, mut ws_receiver) = socket.split();
    let writer = tokio::spawn(async move {
        while let Some(outbound) = rx.recv().await {
            let should_close = matches!(outbound, OutboundMessage::Close { .. });
            let result = match outbound {
                OutboundMessage::Text(payload) => {
                    ws_sender.send(Message::Text(payload.into())).await
                }
                OutboundMessage::Close { code, reason } => {
                    let frame = CloseFrame {
                        code,
                        reason: reason.into(),
                    };
                    ws_sender.send(Message::Close(Some(frame))).await
                }
            };
            if result.is_err() || should_close {
                break;
            }
        }
    });

    while let Some(received) = ws_receiver.next().await {
        let Ok(message) = received else {
            break;
        };

        match message {
            Message::Text(raw) => {
                handle_client_message(state.clone(), &client_id, raw.to_string()).await;
            }
            Message::Binary(raw) => {
                if let Ok(text) = String::from_utf8(raw.to_vec()) {
                    handle_client_message(state.clone(), &client_id, text).await;
                } else {
                    send_error_to_client(&state, &client_id, "invalid utf8 message").await;
                }
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    {
        let mut guard = state.lock().await;
        guard.clients.remove(&client_id);
    }
    emit_log("info", "client_disconnected", json!({ "client": client_id }));
    drop(tx);
    let _ = writer.await;
}

async fn handle_client_message(state: SharedState, client_id: &str, raw: String) {
    let Some(parsed) = parse_client_message(&raw) else {
        send_error_to_client(&state, client_id, "unrecognized message").await;
        return;
    };

    let mut guard = state.lock().await;
    match parsed {
        ParsedClientMessage::Hello { name } => {
            let reply = {
                let Some(client) = guard.clients.get_mut(client_id) else {
                    return;
                };
                client.name = Some(sanitize_name(&name));
                json!({
                    "type": "welcome",
                    "name": client.name.clone(),
                    "sessionToken": client.session_token.clone(),
                })
            };
            send_to_client(&mut guard, client_id, &reply, QueuePolicy::DisconnectOnFull);
        }
        ParsedClientMessage::Start {
            difficulty,
            level,
            preset,
        } => {
            let difficulty = difficulty.unwrap_or(Difficulty::Neutral);
            let level = level.unwrap_or_else(|| "level1".to_string());
            let mut settings = guard.settings.clone();
            if let Some(preset) = preset {
                settings = config::apply_preset(settings, &preset);
            }
            let world = load_level(&level);
            let seed = rand::rng().random::<u32>();
            emit_log(
                "info",
                "session_started",
                json!({
                    "client": client_id,
                    "difficulty": difficulty,
                    "level": level.as_str(),
                    "seed": seed,
                }),
            );
            let mut engine = GameEngine::new(world, settings, difficulty, &level, seed);
            let snapshot = engine.build_snapshot(false);
            if let Some(client) = guard.clients.get_mut(client_id) {
                client.game = Some(engine);
            }
            send_to_client(
                &mut guard,
                client_id,
                &json!({ "type": "state", "snapshot": snapshot }),
                QueuePolicy::DisconnectOnFull,
            );
        }
        ParsedClientMessage::SetDifficulty { difficulty } => {
            if let Some(game) = client_game(&mut guard, client_id) {
                game.set_difficulty(difficulty);
            }
        }
        ParsedClientMessage::Input { dir } => {
            if let Some(game) = client_game(&mut guard, client_id) {
                game.set_player_direction(dir);
            }
        }
        ParsedClientMessage::PuzzleResult { solved } => {
            if let Some(game) = client_game(&mut guard, client_id) {
                game.puzzle_result(solved);
            }
        }
        ParsedClientMessage::DismissCaught => {
            if let Some(game) = client_game(&mut guard, client_id) {
                game.dismiss_caught();
            }
        }
        ParsedClientMessage::DismissDefeated => {
            if let Some(game) = client_game(&mut guard, client_id) {
                game.dismiss_defeated();
            }
        }
        ParsedClientMessage::Ping { t } => {
            send_to_client(
                &mut guard,
                client_id,
                &json!({ "type": "pong", "t": t }),
                QueuePolicy::DropOnFull,
            );
        }
    }
}

fn client_game<'a>(state: &'a mut ServerState, client_id: &str) -> Option<&'a mut GameEngine> {
    state
        .clients
        .get_mut(client_id)
        .and_then(|client| client.game.as_mut())
}

fn load_level(level: &str) -> MazeWorld {
    let dir = std::env::var("LEVELS_DIR").unwrap_or_else(|_| "levels".to_string());
    let path = PathBuf::from(dir).join(format!("{level}.csv"));
    match std::fs::read_to_string(&path) {
        Ok(text) => maze::parse_grid_csv(&text),
        Err(err) => {
            emit_log(
                "warn",
                "level_load_failed",
                json!({ "path": path.to_string_lossy(), "error": err.to_string() }),
            );
            maze::default_level()
        }
    }
}

fn start_tick_loop(state: SharedState) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_millis(TICK_MS));
        loop {
            interval.tick().await;
            let mut guard = state.lock().await;
            tick_sessions(&mut guard);
        }
    });
}

fn tick_sessions(state: &mut ServerState) {
    let client_ids: Vec<String> = state.clients.keys().cloned().collect();
    for client_id in client_ids {
        let Some(client) = state.clients.get_mut(&client_id) else {
            continue;
        };
        let Some(game) = client.game.as_mut() else {
            continue;
        };
        let finished_before = game.is_ended();
        game.step(TICK_MS);
        let snapshot = game.build_snapshot(true);
        let summary = if game.is_ended() && !finished_before {
            Some(game.build_summary())
        } else {
            None
        };

        send_to_client(
            state,
            &client_id,
            &json!({ "type": "state", "snapshot": snapshot }),
            QueuePolicy::DropOnFull,
        );

        if let Some(summary) = summary {
            emit_log(
                "info",
                "session_ended",
                json!({ "client": client_id, "summary": summary }),
            );
            send_to_client(
                state,
                &client_id,
                &json!({ "type": "game_over", "summary": summary }),
                QueuePolicy::DisconnectOnFull,
            );
        }
    }
}

fn send_to_client(state: &mut ServerState, client_id: &str, message: &Value, policy: QueuePolicy) {
    let send_failed = if let Some(client) = state.clients.get(client_id) {
        client
            .tx
            .try_send(OutboundMessage::Text(message.to_string()))
            .is_err()
    } else {
        false
    };
    if send_failed && policy == QueuePolicy::DisconnectOnFull {
        disconnect_client_internal(state, client_id);
    }
}

fn disconnect_client_internal(state: &mut ServerState, client_id: &str) {
    if let Some(client) = state.clients.remove(client_id) {
        let _ = client.tx.try_send(OutboundMessage::Close {
            code: 1011,
            reason: "send queue overflow".to_string(),
        });
    }
}

async fn send_error_to_client(state: &SharedState, client_id: &str, message: &str) {
    let mut guard = state.lock().await;
    send_to_client(
        &mut guard,
        client_id,
        &json!({ "type": "error", "message": message }),
        QueuePolicy::DisconnectOnFull,
    );
}

fn sanitize_name(value: &str) -> String {
    let trimmed: String = value.trim().chars().take(24).collect();
    if trimmed.is_empty() {
        "explorer".to_string()
    } else {
        trimmed
    }
}

fn make_id(prefix: &str) -> String {
    let n = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    format!("{prefix}-{n}")
}

fn make_session_token() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(24)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_name_trims_and_falls_back() {
        assert_eq!(sanitize_name("  Pia  "), "Pia");
        assert_eq!(sanitize_name("   "), "explorer");
        assert_eq!(sanitize_name(&"x".repeat(60)).len(), 24);
    }

    #[test]
    fn make_id_is_monotonic() {
        let a = make_id("client");
        let b = make_id("client");
        assert_ne!(a, b);
    }

    #[test]
    fn session_tokens_are_distinct() {
        assert_ne!(make_session_token(), make_session_token());
        assert_eq!(make_session_token().len(), 24);
    }
}
