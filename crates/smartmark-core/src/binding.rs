//! Session binding
//!
//! Wires the store to its two push sources for the lifetime of a session:
//! auth state changes from the [`AuthService`] and row changes from the
//! realtime channel. The shell spawns one binding and shuts it down on exit.

use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::realtime::{ChannelStatus, RealtimeCommand, RealtimeEvent, RealtimeHandle};
use crate::service::{AuthChangeKind, AuthEvent, AuthService};
use crate::store::{BookmarkStore, Navigation};

/// Events published to the shell
#[derive(Debug, Clone, PartialEq)]
pub enum BindingEvent {
    /// The initial session was loaded (and bookmarks fetched, if signed in)
    Ready,
    /// The UI should navigate
    Navigate(Navigation),
    /// Realtime channel status changed
    Realtime(ChannelStatus),
    /// A push source reported an error
    Error(String),
}

/// Background task driving the store from auth and realtime events
pub struct SessionBinding {
    shutdown_tx: Option<oneshot::Sender<()>>,
    events_rx: Option<mpsc::UnboundedReceiver<BindingEvent>>,
    task: JoinHandle<()>,
}

impl SessionBinding {
    /// Load the current session and start relaying events into `store`
    pub fn spawn(
        store: Arc<BookmarkStore>,
        auth: Arc<dyn AuthService>,
        realtime: Option<RealtimeHandle>,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let task = tokio::spawn(run(store, auth, realtime, shutdown_rx, events_tx));

        Self {
            shutdown_tx: Some(shutdown_tx),
            events_rx: Some(events_rx),
            task,
        }
    }

    /// Take the event receiver (can only be called once)
    pub fn take_events(&mut self) -> Option<mpsc::UnboundedReceiver<BindingEvent>> {
        self.events_rx.take()
    }

    /// Unsubscribe from both sources and wait for the task to finish
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Err(e) = (&mut self.task).await {
            warn!("Session binding task failed: {}", e);
        }
    }
}

async fn run(
    store: Arc<BookmarkStore>,
    auth: Arc<dyn AuthService>,
    mut realtime: Option<RealtimeHandle>,
    mut shutdown_rx: oneshot::Receiver<()>,
    events_tx: mpsc::UnboundedSender<BindingEvent>,
) {
    // subscribe first so nothing emitted by get_session is missed
    let mut auth_rx = auth.auth_events();

    let session = tokio::select! {
        _ = &mut shutdown_rx => {
            stop(auth_rx, realtime).await;
            return;
        }
        session = auth.get_session() => session,
    };

    match session {
        Ok(Some(session)) => {
            info!("Restored session for {}", session.user.display_name());
            store.set_user(Some(session.user));
            let fetch = spawn_fetch(&store);
            tokio::select! {
                _ = &mut shutdown_rx => {
                    stop(auth_rx, realtime).await;
                    return;
                }
                _ = fetch => {}
            }
        }
        Ok(None) => {
            debug!("No stored session");
            store.set_user(None);
        }
        Err(e) => {
            warn!("Failed to load session: {}", e);
            let _ = events_tx.send(BindingEvent::Error(e.to_string()));
        }
    }
    let _ = events_tx.send(BindingEvent::Ready);

    let mut auth_open = true;
    loop {
        tokio::select! {
            _ = &mut shutdown_rx => break,

            event = auth_rx.recv(), if auth_open => match event {
                Ok(event) => {
                    if let (Some(handle), Some(session)) = (realtime.as_ref(), event.session.as_ref()) {
                        if matches!(event.kind, AuthChangeKind::SignedIn | AuthChangeKind::TokenRefreshed) {
                            let token = session.access_token.clone();
                            let _ = handle.command_tx.send(RealtimeCommand::UpdateToken(token)).await;
                        }
                    }

                    let follow = store.apply_auth_event(event);
                    if follow.fetch_bookmarks {
                        spawn_fetch(&store);
                    }
                    if let Some(navigation) = follow.navigation {
                        let _ = events_tx.send(BindingEvent::Navigate(navigation));
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Missed {} auth events, reloading", skipped);
                    spawn_fetch(&store);
                }
                Err(RecvError::Closed) => {
                    debug!("Auth event stream closed");
                    auth_open = false;
                }
            },

            event = next_realtime(&mut realtime) => match event {
                Some(RealtimeEvent::Change(change)) => {
                    store.apply_change(change);
                }
                Some(RealtimeEvent::StatusChanged(status)) => {
                    let _ = events_tx.send(BindingEvent::Realtime(status));
                }
                Some(RealtimeEvent::Error(message)) => {
                    let _ = events_tx.send(BindingEvent::Error(message));
                }
                None => {
                    debug!("Realtime task ended");
                    realtime = None;
                }
            },
        }
    }

    stop(auth_rx, realtime).await;
}

/// Fetch in its own task so the loop keeps serving shutdown and pushes
///
/// A fetch still in flight at shutdown runs to completion against the store;
/// its result is discarded there if the user changed.
fn spawn_fetch(store: &Arc<BookmarkStore>) -> JoinHandle<()> {
    let store = store.clone();
    tokio::spawn(async move { store.fetch_bookmarks().await })
}

/// Unsubscribe from auth events and stop the realtime channel
async fn stop(auth_rx: broadcast::Receiver<AuthEvent>, realtime: Option<RealtimeHandle>) {
    drop(auth_rx);
    if let Some(handle) = realtime {
        let _ = handle.command_tx.send(RealtimeCommand::Shutdown).await;
    }
    debug!("Session binding stopped");
}

/// Next realtime event, or pending forever without a channel
async fn next_realtime(realtime: &mut Option<RealtimeHandle>) -> Option<RealtimeEvent> {
    match realtime {
        Some(handle) => handle.event_rx.recv().await,
        None => std::future::pending().await,
    }
}
