//! Login and logout command handlers

use anyhow::{bail, Result};
use tracing::warn;

use smartmark_core::supabase::{complete_sign_in, BrowserOpener, CallbackOutcome, Opener};
use smartmark_core::ServiceError;

use super::Context;
use crate::output::Output;
use crate::prompt;

/// Prints the sign-in URL and tries to open it in the browser
pub struct TerminalOpener;

impl Opener for TerminalOpener {
    fn open(&self, url: &str) -> Result<(), ServiceError> {
        eprintln!("Sign in with Google at:\n\n  {}\n", url);
        if let Err(e) = BrowserOpener.open(url) {
            // the printed URL still works
            warn!("{}", e);
            eprintln!("Could not open a browser. Open the URL above manually.");
        }
        Ok(())
    }
}

/// Sign in through the OAuth redirect
///
/// The browser ends up on the callback page; its URL is pasted back here
/// (or passed with `--callback`) to finish the code exchange.
pub async fn login(ctx: &Context, callback: Option<String>, output: &Output) -> Result<()> {
    if let Some(user) = ctx.restore().await? {
        output.message(&format!(
            "Already signed in as {}. Run `smartmark logout` to switch accounts.",
            user.display_name()
        ));
        return Ok(());
    }

    ctx.store.sign_in_with_google().await;
    ctx.check_error()?;

    let callback_url = match callback {
        Some(url) => url,
        None => prompt::read_line("Paste the URL your browser was redirected to: ")?,
    };
    if callback_url.is_empty() {
        bail!("No callback URL given, sign-in cancelled.");
    }

    match complete_sign_in(&ctx.client, &callback_url).await {
        CallbackOutcome::Redirect(next) => {
            let user = ctx.require_user().await?;
            if output.is_json() {
                println!(
                    "{}",
                    serde_json::json!({
                        "status": "success",
                        "user_id": user.id,
                        "email": user.email,
                        "next": next,
                    })
                );
            } else {
                output.success(&format!("Signed in as {}", user.display_name()));
            }
            Ok(())
        }
        outcome @ CallbackOutcome::AuthCodeError => {
            bail!("Sign-in failed ({}). Run `smartmark login` to try again.", outcome.path())
        }
    }
}

/// Sign out and remove the stored session
pub async fn logout(ctx: &Context, output: &Output) -> Result<()> {
    if ctx.restore().await?.is_none() {
        output.message("Not signed in.");
        return Ok(());
    }

    ctx.store.sign_out().await;
    ctx.check_error()?;
    output.success("Signed out");
    Ok(())
}
