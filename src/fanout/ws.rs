use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use serde::Deserialize;

use super::FanOutBus;
use crate::metrics::MetricsState;
use crate::model::ChannelTag;

#[derive(Clone)]
pub struct WsState {
    pub fanout: FanOutBus,
    pub metrics: Arc<MetricsState>,
}

/// Subscribe/unsubscribe control frame a connected client sends to move
/// itself between channel sets without reconnecting.
#[derive(Deserialize)]
struct ControlFrame {
    action: ControlAction,
    channel: String,
}

#[derive(Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
enum ControlAction {
    Subscribe,
    Unsubscribe,
}

/// `GET /ws` — upgrades to a WebSocket. The connection starts subscribed to
/// no channel; the client moves itself onto one or more of `all` / `backups`
/// / `servers` / `logs` via `{"action":"subscribe","channel":"..."}` frames.
pub async fn progress_ws(ws: WebSocketUpgrade, State(state): State<WsState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: WsState) {
    let (subscriber, mut rx) = state.fanout.connect_detached();
    state
        .metrics
        .set_fanout_subscribers(state.fanout.subscriber_count().await as i64);

    loop {
        tokio::select! {
            event = rx.recv() => {
                match event {
                    Some(event) => {
                        let payload = match serde_json::to_string(&event) {
                            Ok(p) => p,
                            Err(_) => continue,
                        };
                        if socket.send(Message::Text(payload.into())).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(Message::Text(text))) => {
                        handle_control_frame(&state.fanout, &subscriber, &text).await;
                    }
                    Some(Err(_)) => break,
                    _ => {}
                }
            }
        }
    }

    state.fanout.disconnect(&subscriber).await;
    state
        .metrics
        .set_fanout_subscribers(state.fanout.subscriber_count().await as i64);
}

async fn handle_control_frame(fanout: &FanOutBus, subscriber: &super::Subscriber, text: &str) {
    let Ok(frame) = serde_json::from_str::<ControlFrame>(text) else { return };
    let Some(channel) = ChannelTag::parse(&frame.channel) else { return };
    match frame.action {
        ControlAction::Subscribe => fanout.subscribe(subscriber, channel).await,
        ControlAction::Unsubscribe => fanout.unsubscribe(subscriber, channel).await,
    }
}
