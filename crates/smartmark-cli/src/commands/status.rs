//! Status command handler

use anyhow::Result;

use smartmark_core::{Config, SessionFile};

use super::Context;
use crate::output::{Output, OutputFormat};

/// Show backend, session and collection status
///
/// Works without a configured backend; the missing settings are reported.
pub async fn show(config: &Config, output: &Output) -> Result<()> {
    let backend = config.backend();
    let session_file = SessionFile::new(config.session_path());

    let mut user = None;
    let mut bookmark_count = None;
    let mut problem = backend.as_ref().err().map(|e| e.to_string());

    if backend.is_ok() {
        let ctx = Context::open(config.clone())?;
        match ctx.restore().await {
            Ok(Some(signed_in)) => {
                match ctx.load_bookmarks().await {
                    Ok(state) => bookmark_count = Some(state.bookmarks.len()),
                    Err(e) => problem = Some(e.to_string()),
                }
                user = Some(signed_in);
            }
            Ok(None) => {}
            Err(e) => problem = Some(format!("{:#}", e)),
        }
    }

    match output.format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::json!({
                    "backend_url": backend.as_ref().ok().map(|b| b.url.clone()),
                    "realtime_enabled": config.realtime_enabled,
                    "redirect_to": config.redirect_to(),
                    "session_file": session_file.path(),
                    "signed_in": user.is_some(),
                    "user": user.as_ref().map(|u| serde_json::json!({
                        "id": u.id,
                        "email": u.email,
                        "name": u.display_name(),
                    })),
                    "bookmarks": bookmark_count,
                    "error": problem,
                })
            );
        }
        OutputFormat::Quiet => {
            println!("{}", if user.is_some() { "signed-in" } else { "signed-out" });
        }
        OutputFormat::Human => {
            println!("Smartmark Status");
            println!("================");
            println!();
            println!("Backend:");
            match backend {
                Ok(ref backend) => println!("  URL:      {}", backend.url),
                Err(_) => println!("  URL:      (not configured)"),
            }
            println!(
                "  Realtime: {}",
                if config.realtime_enabled {
                    "enabled"
                } else {
                    "disabled"
                }
            );
            println!("  Redirect: {}", config.redirect_to());
            println!();
            println!("Session:");
            match user {
                Some(ref user) => {
                    println!("  Signed in as {}", user.display_name());
                    if let Some(ref email) = user.email {
                        println!("  Email:     {}", email);
                    }
                }
                None => println!("  Not signed in"),
            }
            println!("  Stored in: {}", session_file.path().display());
            if let Some(count) = bookmark_count {
                println!();
                println!("Bookmarks: {}", count);
            }
            if let Some(ref problem) = problem {
                println!();
                output.banner(problem);
            }
        }
    }

    Ok(())
}
