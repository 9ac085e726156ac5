//! Watch command handler
//!
//! Keeps a session binding running and re-renders the collection whenever
//! the store changes, until interrupted with Ctrl-C.

use anyhow::{bail, Context as _, Result};
use tokio::sync::watch;
use tracing::{debug, info};

use smartmark_core::realtime::{spawn_realtime_task, RealtimeConfig};
use smartmark_core::{AuthService, BindingEvent, Navigation, SessionBinding, StoreState};

use super::Context;
use crate::output::Output;

pub async fn run(ctx: &Context, output: &Output) -> Result<()> {
    // the channel joins with the user's token, so the session comes first
    let session = ctx
        .client
        .get_session()
        .await
        .context("Failed to load session")?;
    let Some(session) = session else {
        bail!("Not signed in. Run `smartmark login` first.");
    };

    let realtime = if ctx.config.realtime_enabled {
        let config = RealtimeConfig::for_backend(ctx.client.backend())?;
        Some(spawn_realtime_task(config, session.access_token))
    } else {
        output.message("Realtime updates are disabled; showing a single snapshot.");
        None
    };

    let mut state_rx = ctx.store.subscribe();
    let mut binding = SessionBinding::spawn(ctx.store.clone(), ctx.client.clone(), realtime);
    let Some(mut events) = binding.take_events() else {
        bail!("Session binding events already taken");
    };
    info!("Watching bookmarks for {}", session.user.display_name());

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let mut ready = false;
    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                debug!("Interrupted");
                break;
            }

            event = events.recv() => match event {
                Some(BindingEvent::Ready) => {
                    ready = true;
                    let state = state_rx.borrow_and_update().clone();
                    render(ctx, &mut state_rx, &state, output);
                }
                Some(BindingEvent::Navigate(Navigation::Landing)) => {
                    output.message("Signed out, stopping.");
                    break;
                }
                Some(BindingEvent::Navigate(Navigation::Refresh)) => {}
                Some(BindingEvent::Realtime(status)) => {
                    output.message(&format!("[realtime: {}]", status.as_str()));
                }
                Some(BindingEvent::Error(error)) => output.banner(&error),
                None => break,
            },

            changed = state_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = state_rx.borrow_and_update().clone();
                if ready && !state.loading {
                    render(ctx, &mut state_rx, &state, output);
                }
            }
        }
    }

    binding.shutdown().await;
    Ok(())
}

/// Print the collection; a shown error banner is dismissed
fn render(
    ctx: &Context,
    state_rx: &mut watch::Receiver<StoreState>,
    state: &StoreState,
    output: &Output,
) {
    if output.should_prompt() {
        println!("\n--- {} ---", chrono::Local::now().format("%H:%M:%S"));
    }
    output.print_state(state);

    if state.error.is_some() {
        ctx.store.clear_error();
        // the dismissal itself needs no re-render
        state_rx.borrow_and_update();
    }
}
