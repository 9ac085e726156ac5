//! Realtime change feed
//!
//! Subscribes to row changes on the `bookmarks` table over the hosted
//! realtime service.
//!
//! ## Protocol
//!
//! Phoenix channels over a WebSocket:
//! 1. Connect to `/realtime/v1/websocket` with the anon key
//! 2. Join `realtime:bookmarks-realtime` with a `postgres_changes` filter
//! 3. Heartbeat on the `phoenix` topic every 25 seconds
//! 4. Relay each `postgres_changes` frame as a [`ChangeEvent`](crate::service::ChangeEvent)
//!
//! ## Usage
//!
//! ```ignore
//! let config = RealtimeConfig::for_backend(&backend)?;
//! let mut handle = spawn_realtime_task(config, session.access_token);
//! while let Some(event) = handle.event_rx.recv().await { .. }
//! ```

mod client;
mod message;

pub use client::{
    spawn_realtime_task, ChannelStatus, RealtimeCommand, RealtimeConfig, RealtimeEvent,
    RealtimeFeed, RealtimeHandle,
};
pub use message::{Frame, ServerMessage, BOOKMARKS_TOPIC};
