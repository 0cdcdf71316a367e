use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use circle_types::events::{GatewayCommand, GatewayEvent};

use crate::dispatcher::Dispatcher;
use crate::presence::PresenceTracker;

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

type Subscriptions = Arc<std::sync::RwLock<HashSet<String>>>;

/// Handle a WebSocket connection whose token was already validated at the
/// HTTP upgrade layer: send Ready, go online, then pump events until either
/// side hangs up.
pub async fn handle_connection(
    socket: WebSocket,
    dispatcher: Dispatcher,
    presence: PresenceTracker,
    user_id: Uuid,
    username: String,
) {
    let (mut sender, receiver) = socket.split();

    info!("{} ({}) connected to gateway", username, user_id);

    let ready = GatewayEvent::Ready {
        user_id,
        username: username.clone(),
    };
    let Some(frame) = encode(&ready) else { return };
    if sender.send(frame).await.is_err() {
        return;
    }

    run_connection_loop(sender, receiver, dispatcher, presence, user_id, username).await;
}

async fn run_connection_loop(
    mut sender: SplitSink<WebSocket, Message>,
    mut receiver: SplitStream<WebSocket>,
    dispatcher: Dispatcher,
    presence: PresenceTracker,
    user_id: Uuid,
    username: String,
) {
    let (conn_id, mut user_rx) = dispatcher.register_user_channel(user_id).await;
    let mut broadcast_rx = dispatcher.subscribe();

    presence.set_online(user_id);

    // Channels this client asked for; shared between send and recv tasks.
    let subscribed_channels: Subscriptions = Arc::new(std::sync::RwLock::new(HashSet::new()));
    let send_subscriptions = subscribed_channels.clone();

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                result = broadcast_rx.recv() => {
                    let event = match result {
                        Ok(event) => event,
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                            warn!("Broadcast receiver lagged by {} messages", n);
                            continue;
                        }
                        Err(_) => break,
                    };

                    let forward = {
                        let subs = send_subscriptions.read().expect("subscription lock poisoned");
                        should_forward(&event, &subs)
                    };
                    if !forward {
                        continue;
                    }

                    let Some(frame) = encode(&event) else { continue };
                    if sender.send(frame).await.is_err() {
                        break;
                    }
                }
                result = user_rx.recv() => {
                    let Some(event) = result else { break };
                    let Some(frame) = encode(&event) else { continue };
                    if sender.send(frame).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("Heartbeat timeout (missed {} pongs), dropping connection", missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    let username_recv = username.clone();
    let presence_recv = presence.clone();
    let recv_subscriptions = subscribed_channels.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<GatewayCommand>(&text) {
                    Ok(cmd) => {
                        handle_command(&presence_recv, user_id, &username_recv, cmd, &recv_subscriptions);
                    }
                    Err(e) => {
                        warn!(
                            "{} ({}) bad command: {} -- raw: {}",
                            username_recv,
                            user_id,
                            e,
                            preview(&text)
                        );
                    }
                },
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    // A newer connection for the same user owns presence now; leave it alone.
    if dispatcher.unregister_user_channel(user_id, conn_id).await {
        let result = tokio::task::spawn_blocking(move || presence.set_offline(user_id)).await;
        match result {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => error!("Failed to mark {} offline: {}", user_id, e),
            Err(e) => error!("spawn_blocking join error: {}", e),
        }
    }
    info!("{} ({}) disconnected from gateway", username, user_id);
}

/// At most the first 200 characters of a frame, for logging.
fn preview(text: &str) -> &str {
    match text.char_indices().nth(200) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}

fn handle_command(
    presence: &PresenceTracker,
    user_id: Uuid,
    username: &str,
    cmd: GatewayCommand,
    subscriptions: &Subscriptions,
) {
    match cmd {
        GatewayCommand::Heartbeat => {
            debug!("{} ({}) heartbeat", username, user_id);
            presence.set_online(user_id);
        }

        GatewayCommand::Subscribe { channels } => {
            info!("{} ({}) subscribing to {:?}", username, user_id, channels);
            let mut subs = subscriptions.write().expect("subscription lock poisoned");
            subs.extend(channels);
        }
    }
}

/// Channel-scoped events go only to clients subscribed to that channel.
fn should_forward(event: &GatewayEvent, subscriptions: &HashSet<String>) -> bool {
    match event.channel() {
        Some(channel) => subscriptions.contains(channel),
        None => true,
    }
}

fn encode(event: &GatewayEvent) -> Option<Message> {
    match event.to_envelope() {
        Ok(value) => Some(Message::Text(value.to_string().into())),
        Err(e) => {
            error!("Failed to serialize gateway event: {}", e);
            None
        }
    }
}
