//! The per-connection session orchestrator.
//!
//! One client WebSocket owns one STT connection and at most one running
//! agent invocation. Three tasks tend the session: audio-forward (client
//! binary frames → STT, gated while the agent speaks), stt-consume (STT
//! events → client, turn detection), and an outbound writer serializing
//! every frame to the client socket. A shared cancellation token tears all
//! of them down on any exit path.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use voxtask_agent::{AgentEvent, TurnOutcome};

use crate::stt::{self, SttConfig, SttSink, SttStream, TurnEvent, TurnInfo};
use crate::AppState;

/// A transcript longer than this interrupts a running agent.
const INTERRUPT_THRESHOLD_CHARS: usize = 5;

/// Text frames sent to the client.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    /// STT passthrough.
    FluxEvent { data: Value },
    /// The agent loop has begun for the just-ended turn.
    AgentStart { query: String },
    /// Agent loop progress.
    AgentEvent { data: AgentEvent },
    /// The agent loop failed after retries; the session stays open.
    AgentError { error: String },
}

/// What to do with a `TurnInfo` event. Pure state so the transitions are
/// testable without sockets.
#[derive(Debug, PartialEq)]
pub(crate) enum TurnAction {
    Ignore,
    Interrupt,
    StartAgent(String),
}

#[derive(Debug, Default)]
pub(crate) struct TurnGate {
    transcript: String,
}

impl TurnGate {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn on_turn_info(&mut self, info: &TurnInfo, agent_running: bool) -> TurnAction {
        let trimmed = info.transcript.trim();
        if !trimmed.is_empty() {
            self.transcript = trimmed.to_string();
        }

        match info.event {
            TurnEvent::EndOfTurn if !self.transcript.is_empty() => {
                TurnAction::StartAgent(std::mem::take(&mut self.transcript))
            }
            TurnEvent::EndOfTurn => TurnAction::Ignore,
            _ if agent_running && trimmed.chars().count() > INTERRUPT_THRESHOLD_CHARS => {
                TurnAction::Interrupt
            }
            _ => TurnAction::Ignore,
        }
    }
}

struct AgentSlot {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Drive one client connection to completion. Cleanup is unconditional:
/// every exit path cancels the session token, which stops the sibling
/// tasks, the running agent invocation, and the STT connection.
pub async fn run_session(socket: WebSocket, state: Arc<AppState>, config: SttConfig) {
    let session_id = Uuid::new_v4();
    info!(%session_id, model = %config.model, "Agent session connected");

    let (mut client_sink, client_stream) = socket.split();

    let (stt_sink, stt_stream) =
        match stt::connect(&state.settings.stt_url, &state.settings.stt_api_key, &config).await {
            Ok(pair) => pair,
            Err(e) => {
                warn!(%session_id, error = %e, "STT connection failed; closing session");
                if let Ok(json) = serde_json::to_string(&ServerFrame::AgentError {
                    error: e.to_string(),
                }) {
                    let _ = client_sink.send(Message::Text(json)).await;
                }
                let _ = client_sink.close().await;
                return;
            }
        };

    let cancel = CancellationToken::new();
    let speaking = Arc::new(AtomicBool::new(false));
    let (out_tx, out_rx) = mpsc::channel::<ServerFrame>(256);

    let writer = tokio::spawn(write_frames(client_sink, out_rx, cancel.clone()));
    let mut audio = tokio::spawn(forward_audio(
        client_stream,
        stt_sink,
        speaking.clone(),
        cancel.clone(),
    ));
    let mut consume = tokio::spawn(consume_stt(
        stt_stream,
        out_tx.clone(),
        state,
        speaking,
        cancel.clone(),
    ));

    // Whichever side finishes first — client close, client error, or STT
    // close — tears down the other.
    let audio_finished_first = tokio::select! {
        _ = &mut audio => true,
        _ = &mut consume => false,
    };
    cancel.cancel();
    if audio_finished_first {
        let _ = consume.await;
    } else {
        let _ = audio.await;
    }
    drop(out_tx);
    let _ = writer.await;

    info!(%session_id, "Agent session closed");
}

/// Serialize outbound frames to the client, preserving send order.
async fn write_frames(
    mut sink: SplitSink<WebSocket, Message>,
    mut frames: mpsc::Receiver<ServerFrame>,
    cancel: CancellationToken,
) {
    while let Some(frame) = frames.recv().await {
        let Ok(json) = serde_json::to_string(&frame) else {
            continue;
        };
        if sink.send(Message::Text(json)).await.is_err() {
            cancel.cancel();
            break;
        }
    }
    let _ = sink.close().await;
}

/// Client audio → STT. Binary frames are discarded while the agent is
/// speaking (echo gate); a text frame `{"type": "close"}` requests
/// teardown.
async fn forward_audio(
    mut client: SplitStream<WebSocket>,
    mut stt_sink: SttSink,
    speaking: Arc<AtomicBool>,
    cancel: CancellationToken,
) {
    loop {
        let message = tokio::select! {
            _ = cancel.cancelled() => break,
            message = client.next() => message,
        };
        let Some(Ok(message)) = message else {
            debug!("Client stream ended");
            break;
        };

        match message {
            Message::Binary(audio) => {
                if speaking.load(Ordering::Relaxed) {
                    continue;
                }
                if stt_sink.send(WsMessage::Binary(audio)).await.is_err() {
                    warn!("STT sink closed while forwarding audio");
                    break;
                }
            }
            Message::Text(text) => {
                let parsed: Value = serde_json::from_str(&text).unwrap_or(Value::Null);
                if parsed["type"] == "close" {
                    info!("Client requested close");
                    break;
                }
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    cancel.cancel();
    let _ = stt_sink.send(WsMessage::Close(None)).await;
}

/// STT events → client, plus turn detection and agent lifecycle.
async fn consume_stt(
    mut stt_stream: SttStream,
    out: mpsc::Sender<ServerFrame>,
    state: Arc<AppState>,
    speaking: Arc<AtomicBool>,
    cancel: CancellationToken,
) {
    let mut gate = TurnGate::new();
    let mut slot: Option<AgentSlot> = None;

    loop {
        let message = tokio::select! {
            _ = cancel.cancelled() => break,
            message = stt_stream.next() => message,
        };
        let Some(Ok(message)) = message else {
            debug!("STT stream ended");
            break;
        };
        let WsMessage::Text(text) = message else {
            continue;
        };
        if text.trim().is_empty() {
            continue;
        }
        let Ok(data) = serde_json::from_str::<Value>(&text) else {
            continue;
        };

        // Forward every STT event to the client verbatim.
        if out
            .send(ServerFrame::FluxEvent { data: data.clone() })
            .await
            .is_err()
        {
            break;
        }

        if data["type"] != "TurnInfo" {
            continue;
        }
        let Ok(info) = serde_json::from_value::<TurnInfo>(data) else {
            continue;
        };

        let agent_running = slot.as_ref().is_some_and(|s| !s.handle.is_finished());
        match gate.on_turn_info(&info, agent_running) {
            TurnAction::Ignore => {}
            TurnAction::Interrupt => {
                debug!("New speech while agent running; interrupting");
                if let Some(slot) = &slot {
                    slot.cancel.cancel();
                }
                speaking.store(false, Ordering::Relaxed);
            }
            TurnAction::StartAgent(query) => {
                // Never overlap invocations on one session.
                if let Some(old) = slot.take() {
                    old.cancel.cancel();
                    let _ = old.handle.await;
                }
                speaking.store(true, Ordering::Relaxed);
                slot = Some(spawn_agent(
                    query,
                    state.clone(),
                    out.clone(),
                    cancel.child_token(),
                    speaking.clone(),
                ));
            }
        }
    }

    if let Some(slot) = slot.take() {
        slot.cancel.cancel();
        let _ = slot.handle.await;
    }
    cancel.cancel();
}

fn spawn_agent(
    query: String,
    state: Arc<AppState>,
    out: mpsc::Sender<ServerFrame>,
    cancel: CancellationToken,
    speaking: Arc<AtomicBool>,
) -> AgentSlot {
    let token = cancel.clone();
    let handle = tokio::spawn(async move {
        info!(query = %query, "Processing turn");
        let _ = out
            .send(ServerFrame::AgentStart {
                query: query.clone(),
            })
            .await;

        // Forwarder keeps event order; it is drained before any error frame.
        let (events_tx, mut events_rx) = mpsc::channel::<AgentEvent>(64);
        let forwarder = {
            let out = out.clone();
            tokio::spawn(async move {
                while let Some(event) = events_rx.recv().await {
                    if out.send(ServerFrame::AgentEvent { data: event }).await.is_err() {
                        break;
                    }
                }
            })
        };

        let result = state.agent.run(&query, &events_tx, &cancel).await;
        drop(events_tx);
        let _ = forwarder.await;

        match result {
            Ok(TurnOutcome::Completed) => {}
            Ok(TurnOutcome::Cancelled) => debug!("Agent invocation cancelled"),
            Err(e) => {
                let _ = out
                    .send(ServerFrame::AgentError {
                        error: e.to_string(),
                    })
                    .await;
                let _ = out.send(ServerFrame::AgentEvent { data: AgentEvent::Done }).await;
            }
        }
        speaking.store(false, Ordering::Relaxed);
    });

    AgentSlot {
        cancel: token,
        handle,
    }
}
