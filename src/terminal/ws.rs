//! The terminal WebSocket: one connection multiplexes many agent actions
//! against the terminal registry, each tracked by `action_id` (§5).
//!
//! Grounded on `examples/original_source/app/terminal_socket_server.py`'s
//! `handle_connection`/`_do_handle_msg`: a per-connection map of in-flight
//! tasks keyed by `action_id`, each removed on completion via a done callback.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use crate::terminal::messages::{
    CommandMode, TerminalInputMessage, TerminalInputMessageType, TerminalOutputMessage,
    TerminalOutputMessageType, TerminalStatus,
};
use crate::terminal::registry::TerminalRegistry;

pub fn router(registry: Arc<TerminalRegistry>) -> Router {
    Router::new()
        .route("/terminal", get(upgrade))
        .with_state(registry)
}

async fn upgrade(
    ws: WebSocketUpgrade,
    State(registry): State<Arc<TerminalRegistry>>,
) -> Response {
    ws.on_upgrade(move |socket| handle_connection(socket, registry))
}

type OutSink = futures_util::stream::SplitSink<WebSocket, Message>;

async fn handle_connection(socket: WebSocket, registry: Arc<TerminalRegistry>) {
    let (sink, mut stream) = socket.split();
    let sink = Arc::new(Mutex::new(sink));
    let tasks: Arc<Mutex<HashMap<String, JoinHandle<()>>>> = Arc::new(Mutex::new(HashMap::new()));

    while let Some(frame) = stream.next().await {
        let Ok(Message::Text(text)) = frame else {
            continue;
        };

        match serde_json::from_str::<TerminalInputMessage>(&text) {
            Ok(input) => {
                let action_id = input.action_id.clone();
                let registry = registry.clone();
                let sink = sink.clone();
                let tasks_for_cleanup = tasks.clone();
                let key = action_id.clone();
                let handle = tokio::spawn(async move {
                    handle_msg(input, registry, sink).await;
                    tasks_for_cleanup.lock().await.remove(&action_id);
                });
                tasks.lock().await.insert(key, handle);
            }
            Err(e) => {
                let err = TerminalOutputMessage::protocol_error(
                    "",
                    "",
                    format!("malformed terminal message: {e}"),
                );
                send_frame(&sink, &err).await;
            }
        }
    }

    // Connection closed: cancel every in-flight task for it.
    for (_, handle) in tasks.lock().await.drain() {
        handle.abort();
    }
}

async fn handle_msg(
    input: TerminalInputMessage,
    registry: Arc<TerminalRegistry>,
    sink: Arc<Mutex<OutSink>>,
) {
    match input.kind {
        TerminalInputMessageType::Reset => {
            let result = match registry.get_or_create(&input.terminal).await {
                Ok(session) => session.reset().await,
                Err(e) => Err(e),
            };
            let msg = match result {
                Ok(()) => input.response(
                    TerminalOutputMessageType::ActionFinish,
                    "reset",
                    vec![],
                    TerminalStatus::Idle,
                    None,
                ),
                Err(e) => input.response(
                    TerminalOutputMessageType::Error,
                    e.to_string(),
                    vec![],
                    TerminalStatus::Unknown,
                    None,
                ),
            };
            send_frame(&sink, &msg).await;
        }
        TerminalInputMessageType::ResetAll => {
            let msg = match registry.reset_all().await {
                Ok(()) => input.response(
                    TerminalOutputMessageType::ActionFinish,
                    "reset_all",
                    vec![],
                    TerminalStatus::Idle,
                    None,
                ),
                Err(e) => input.response(
                    TerminalOutputMessageType::Error,
                    e.to_string(),
                    vec![],
                    TerminalStatus::Unknown,
                    None,
                ),
            };
            send_frame(&sink, &msg).await;
        }
        TerminalInputMessageType::View | TerminalInputMessageType::ViewLast => {
            let session = match registry.get_or_create(&input.terminal).await {
                Ok(s) => s,
                Err(e) => {
                    let msg = input.response(
                        TerminalOutputMessageType::Error,
                        e.to_string(),
                        vec![],
                        TerminalStatus::Unknown,
                        None,
                    );
                    send_frame(&sink, &msg).await;
                    return;
                }
            };
            let output = if input.kind == TerminalInputMessageType::View {
                session.view_full().await
            } else {
                session.view_last().await
            };
            let status = if session.is_running() {
                TerminalStatus::Running
            } else {
                TerminalStatus::Idle
            };
            let msg =
                input.response(TerminalOutputMessageType::History, "", output, status, None);
            send_frame(&sink, &msg).await;
        }
        TerminalInputMessageType::KillProcess => {
            let result = match registry.get_or_create(&input.terminal).await {
                Ok(session) => session.kill_process().await,
                Err(e) => Err(e),
            };
            let msg = match result {
                Ok(()) => input.response(
                    TerminalOutputMessageType::ActionFinish,
                    "process killed",
                    vec![],
                    TerminalStatus::Idle,
                    None,
                ),
                Err(e) => input.response(
                    TerminalOutputMessageType::Error,
                    e.to_string(),
                    vec![],
                    TerminalStatus::Unknown,
                    None,
                ),
            };
            send_frame(&sink, &msg).await;
        }
        TerminalInputMessageType::Command => {
            if input.command.is_none() {
                let msg = input.response(
                    TerminalOutputMessageType::Error,
                    "command message missing `command`",
                    vec![],
                    TerminalStatus::Unknown,
                    None,
                );
                send_frame(&sink, &msg).await;
                return;
            }

            let session = match registry.get_or_create(&input.terminal).await {
                Ok(s) => s,
                Err(e) => {
                    let msg = input.response(
                        TerminalOutputMessageType::Error,
                        e.to_string(),
                        vec![],
                        TerminalStatus::Unknown,
                        None,
                    );
                    send_frame(&sink, &msg).await;
                    return;
                }
            };

            match input.mode.unwrap_or(CommandMode::Run) {
                CommandMode::Run => {
                    let (tx, mut rx) = mpsc::unbounded_channel();
                    let exec_session = session.clone();
                    let exec_msg = input.clone();
                    let runner = tokio::spawn(async move {
                        exec_session.execute_command(&exec_msg, tx).await;
                    });
                    while let Some(frame) = rx.recv().await {
                        send_frame(&sink, &frame).await;
                    }
                    let _ = runner.await;
                }
                CommandMode::SendLine | CommandMode::SendKey | CommandMode::SendControl => {
                    let text = input.command.clone().unwrap_or_default();
                    let mode = input.mode.unwrap();
                    let result = match mode {
                        CommandMode::SendLine => session.send_line(&text).await,
                        CommandMode::SendKey => session.send_key(&text).await,
                        CommandMode::SendControl => session.send_control(&text).await,
                        CommandMode::Run => unreachable!(),
                    };
                    let msg = match result {
                        Ok(()) => input.response(
                            TerminalOutputMessageType::ActionFinish,
                            "sent",
                            vec![],
                            TerminalStatus::Running,
                            None,
                        ),
                        Err(e) => input.response(
                            TerminalOutputMessageType::Error,
                            e.to_string(),
                            vec![],
                            TerminalStatus::Unknown,
                            None,
                        ),
                    };
                    send_frame(&sink, &msg).await;
                }
            }
        }
    }
}

async fn send_frame(sink: &Arc<Mutex<OutSink>>, msg: &TerminalOutputMessage) {
    if let Ok(text) = serde_json::to_string(msg) {
        let _ = sink.lock().await.send(Message::Text(text.into())).await;
    }
}
