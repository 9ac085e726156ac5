//! Persistent realtime connection
//!
//! Maintains a long-lived WebSocket joined to the bookmarks channel.
//! Handles reconnection automatically with exponential backoff and keeps
//! the socket alive with heartbeats.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};
use url::Url;

use super::message::{Frame, ServerMessage, BOOKMARKS_TOPIC};
use crate::config::BackendConfig;
use crate::service::ChangeEvent;

/// Commands sent to the realtime task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RealtimeCommand {
    /// Use a refreshed access token (sent to the joined channel and used on reconnect)
    UpdateToken(String),
    /// Leave the channel and stop the task
    Shutdown,
}

/// Events emitted by the realtime task
#[derive(Debug, Clone, PartialEq)]
pub enum RealtimeEvent {
    /// Connection status changed
    StatusChanged(ChannelStatus),
    /// A row changed on the server
    Change(ChangeEvent),
    /// Error occurred
    Error(String),
}

/// Channel status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelStatus {
    /// Not connected, not trying
    Disconnected,
    /// Opening the socket
    Connecting,
    /// Socket open, waiting for the join reply
    Joining,
    /// Receiving changes
    Subscribed,
}

impl ChannelStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelStatus::Disconnected => "disconnected",
            ChannelStatus::Connecting => "connecting",
            ChannelStatus::Joining => "joining",
            ChannelStatus::Subscribed => "subscribed",
        }
    }
}

/// Handle to control the realtime task
pub struct RealtimeHandle {
    /// Send commands to the realtime task
    pub command_tx: mpsc::Sender<RealtimeCommand>,
    /// Receive events from the realtime task
    pub event_rx: mpsc::Receiver<RealtimeEvent>,
    /// Watch channel status
    pub status_rx: watch::Receiver<ChannelStatus>,
}

/// The other ends of a detached handle
pub struct RealtimeFeed {
    pub event_tx: mpsc::Sender<RealtimeEvent>,
    pub command_rx: mpsc::Receiver<RealtimeCommand>,
    pub status_tx: watch::Sender<ChannelStatus>,
}

impl RealtimeHandle {
    /// Build a handle that is fed locally instead of by a socket
    pub fn detached() -> (Self, RealtimeFeed) {
        let (command_tx, command_rx) = mpsc::channel(16);
        let (event_tx, event_rx) = mpsc::channel(64);
        let (status_tx, status_rx) = watch::channel(ChannelStatus::Disconnected);
        (
            Self {
                command_tx,
                event_rx,
                status_rx,
            },
            RealtimeFeed {
                event_tx,
                command_rx,
                status_tx,
            },
        )
    }
}

/// Configuration for the realtime connection
#[derive(Debug, Clone)]
pub struct RealtimeConfig {
    /// WebSocket URL including the api key
    pub url: String,
    /// Initial reconnect delay
    pub initial_reconnect_delay: Duration,
    /// Maximum reconnect delay
    pub max_reconnect_delay: Duration,
    /// Interval between heartbeats
    pub heartbeat_interval: Duration,
    /// How long to wait for the join reply
    pub join_timeout: Duration,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            initial_reconnect_delay: Duration::from_secs(1),
            max_reconnect_delay: Duration::from_secs(30),
            heartbeat_interval: Duration::from_secs(25),
            join_timeout: Duration::from_secs(10),
        }
    }
}

impl RealtimeConfig {
    /// Derive the socket URL from the project URL
    ///
    /// `https://x.supabase.co` becomes
    /// `wss://x.supabase.co/realtime/v1/websocket?apikey=..&vsn=1.0.0`.
    pub fn for_backend(backend: &BackendConfig) -> Result<Self> {
        let mut url = Url::parse(&backend.url)
            .with_context(|| format!("Invalid backend URL: {}", backend.url))?;
        let scheme = match url.scheme() {
            "https" => "wss",
            "http" => "ws",
            other => bail!("Unsupported backend URL scheme: {}", other),
        };
        if url.set_scheme(scheme).is_err() {
            bail!("Cannot derive realtime URL from {}", backend.url);
        }
        url.set_path("/realtime/v1/websocket");
        url.query_pairs_mut()
            .clear()
            .append_pair("apikey", &backend.anon_key)
            .append_pair("vsn", "1.0.0");

        Ok(Self {
            url: url.to_string(),
            ..Self::default()
        })
    }
}

/// Spawn the realtime task
///
/// Returns a handle to control and monitor the task.
/// The task will automatically reconnect on disconnection.
pub fn spawn_realtime_task(config: RealtimeConfig, access_token: String) -> RealtimeHandle {
    let (command_tx, command_rx) = mpsc::channel(16);
    let (event_tx, event_rx) = mpsc::channel(64);
    let (status_tx, status_rx) = watch::channel(ChannelStatus::Disconnected);

    tokio::spawn(realtime_task_loop(
        config,
        access_token,
        command_rx,
        event_tx,
        status_tx,
    ));

    RealtimeHandle {
        command_tx,
        event_rx,
        status_rx,
    }
}

/// Why a connection ended
enum Ended {
    /// Server closed the socket or the channel
    Closed,
    /// Asked to stop
    Shutdown,
}

async fn set_status(
    status: ChannelStatus,
    status_tx: &watch::Sender<ChannelStatus>,
    event_tx: &mpsc::Sender<RealtimeEvent>,
) {
    let _ = status_tx.send(status);
    let _ = event_tx.send(RealtimeEvent::StatusChanged(status)).await;
}

/// Main task loop with reconnection
async fn realtime_task_loop(
    config: RealtimeConfig,
    mut access_token: String,
    mut command_rx: mpsc::Receiver<RealtimeCommand>,
    event_tx: mpsc::Sender<RealtimeEvent>,
    status_tx: watch::Sender<ChannelStatus>,
) {
    let mut reconnect_delay = config.initial_reconnect_delay;

    loop {
        set_status(ChannelStatus::Connecting, &status_tx, &event_tx).await;

        match connect_and_listen(
            &config,
            &mut access_token,
            &mut command_rx,
            &event_tx,
            &status_tx,
        )
        .await
        {
            Ok(Ended::Shutdown) => {
                info!("Realtime channel shut down");
                set_status(ChannelStatus::Disconnected, &status_tx, &event_tx).await;
                break;
            }
            Ok(Ended::Closed) => {
                debug!("Realtime connection closed, resetting backoff");
                reconnect_delay = config.initial_reconnect_delay;
            }
            Err(e) => {
                warn!("Realtime connection error: {:#}", e);
                let _ = event_tx
                    .send(RealtimeEvent::Error(format!("Connection error: {}", e)))
                    .await;
            }
        }

        set_status(ChannelStatus::Disconnected, &status_tx, &event_tx).await;
        debug!("Reconnecting realtime in {:?}", reconnect_delay);

        // Wait before reconnecting, but keep taking commands
        let sleep = tokio::time::sleep(reconnect_delay);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                _ = &mut sleep => {
                    reconnect_delay = (reconnect_delay * 2).min(config.max_reconnect_delay);
                    break;
                }
                cmd = command_rx.recv() => {
                    match cmd {
                        Some(RealtimeCommand::UpdateToken(token)) => access_token = token,
                        Some(RealtimeCommand::Shutdown) | None => return,
                    }
                }
            }
        }
    }
}

/// Connect, join, and relay changes until disconnection or shutdown
async fn connect_and_listen(
    config: &RealtimeConfig,
    access_token: &mut String,
    command_rx: &mut mpsc::Receiver<RealtimeCommand>,
    event_tx: &mpsc::Sender<RealtimeEvent>,
    status_tx: &watch::Sender<ChannelStatus>,
) -> Result<Ended> {
    let (ws_stream, _) = connect_async(&config.url)
        .await
        .context("Failed to open realtime socket")?;
    let (mut write, mut read) = ws_stream.split();

    let mut next_ref: u64 = 0;
    let mut make_ref = move || {
        next_ref += 1;
        next_ref.to_string()
    };

    let join_ref = make_ref();
    write
        .send(Message::Text(Frame::join(access_token, join_ref.clone()).encode()?))
        .await?;
    set_status(ChannelStatus::Joining, status_tx, event_tx).await;
    debug!("Joining {}", BOOKMARKS_TOPIC);

    let join_deadline = tokio::time::sleep(config.join_timeout);
    tokio::pin!(join_deadline);
    let mut joined = false;

    let mut heartbeat = tokio::time::interval(config.heartbeat_interval);
    // first tick completes immediately
    heartbeat.tick().await;

    loop {
        tokio::select! {
            cmd = command_rx.recv() => {
                match cmd {
                    Some(RealtimeCommand::UpdateToken(token)) => {
                        debug!("Forwarding refreshed access token to realtime");
                        *access_token = token;
                        if joined {
                            let frame = Frame::access_token(access_token, make_ref());
                            write.send(Message::Text(frame.encode()?)).await?;
                        }
                    }
                    Some(RealtimeCommand::Shutdown) | None => {
                        if let Ok(text) = Frame::leave(make_ref()).encode() {
                            write.send(Message::Text(text)).await.ok();
                        }
                        write.close().await.ok();
                        return Ok(Ended::Shutdown);
                    }
                }
            }

            _ = heartbeat.tick() => {
                debug!("Realtime heartbeat");
                write.send(Message::Text(Frame::heartbeat(make_ref()).encode()?)).await?;
            }

            _ = &mut join_deadline, if !joined => {
                bail!("Timeout waiting for realtime join reply");
            }

            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        debug!("Realtime frame: {}", text);
                        match ServerMessage::decode(&text) {
                            Ok(ServerMessage::Reply { msg_ref, status, response, .. })
                                if msg_ref.as_deref() == Some(join_ref.as_str()) =>
                            {
                                if status != "ok" {
                                    bail!("Realtime join rejected: {}", response);
                                }
                                info!("Subscribed to {}", BOOKMARKS_TOPIC);
                                joined = true;
                                set_status(ChannelStatus::Subscribed, status_tx, event_tx).await;
                            }
                            Ok(ServerMessage::Reply { status, response, .. }) => {
                                if status != "ok" {
                                    warn!("Realtime request failed: {}", response);
                                }
                            }
                            Ok(ServerMessage::Change(change)) => {
                                let _ = event_tx.send(RealtimeEvent::Change(change)).await;
                            }
                            Ok(ServerMessage::ChannelError { topic })
                            | Ok(ServerMessage::Close { topic }) if topic == BOOKMARKS_TOPIC => {
                                warn!("Realtime channel {} closed by server", topic);
                                return Ok(Ended::Closed);
                            }
                            Ok(ServerMessage::System { status, message }) => {
                                debug!("Realtime system message ({}): {}", status, message);
                                if status == "error" {
                                    let _ = event_tx.send(RealtimeEvent::Error(message)).await;
                                }
                            }
                            Ok(_) => {}
                            Err(e) => warn!("Skipping realtime frame: {}", e),
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        return Ok(Ended::Closed);
                    }
                    Some(Err(e)) => {
                        return Err(e.into());
                    }
                    _ => {}
                }
            }
        }
    }
}
