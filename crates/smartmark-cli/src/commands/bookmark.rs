//! Bookmark command handlers

use anyhow::{bail, Result};

use smartmark_core::{Bookmark, BookmarkPatch, NewBookmark, StoreError, StoreState};

use super::Context;
use crate::metadata::fetch_metadata;
use crate::output::{short_id, Output};
use crate::prompt;

/// List the signed-in user's bookmarks
pub async fn list(ctx: &Context, output: &Output) -> Result<()> {
    ctx.require_user().await?;
    let state = ctx.load_bookmarks().await?;
    output.print_bookmarks(&state.bookmarks);
    Ok(())
}

/// Save a new bookmark
pub async fn add(
    ctx: &Context,
    url: String,
    title: Option<String>,
    description: Option<String>,
    tags: Vec<String>,
    output: &Output,
) -> Result<()> {
    ctx.require_user().await?;
    // the duplicate check runs against the loaded collection
    ctx.load_bookmarks().await?;

    let (title, description) = match title {
        Some(title) => (title, description),
        None => {
            if !output.is_quiet() {
                eprintln!("Fetching page metadata...");
            }
            let metadata = fetch_metadata(&url).await;
            let title = metadata
                .title
                .or_else(|| hostname(&url))
                .unwrap_or_else(|| url.clone());
            (title, description.or(metadata.description))
        }
    };

    let mut bookmark = NewBookmark::new(url, title);
    if let Some(description) = description {
        bookmark = bookmark.with_description(description);
    }
    if !tags.is_empty() {
        bookmark = bookmark.with_tags(tags);
    }

    match ctx.store.add_bookmark(bookmark.clone()).await {
        Ok(()) => {}
        Err(StoreError::DuplicateUrl) => {
            bail!("{} ({})", StoreError::DuplicateUrl, bookmark.url.trim())
        }
        Err(e) => bail!("Failed to add bookmark: {}", e),
    }

    let state = ctx.store.snapshot();
    match find_added(&state, &bookmark.url) {
        Some(added) => {
            if output.should_prompt() {
                output.success("Bookmark saved");
            }
            output.print_bookmark(added);
        }
        None => output.success("Bookmark saved"),
    }
    Ok(())
}

/// Change a bookmark's title, description or tags
pub async fn edit(
    ctx: &Context,
    id: String,
    title: Option<String>,
    description: Option<String>,
    tags: Vec<String>,
    output: &Output,
) -> Result<()> {
    let patch = edit_patch(title, description, tags)?;
    ctx.require_user().await?;
    let state = ctx.load_bookmarks().await?;
    let id = resolve_id(&state, &id)?;

    ctx.store.update_bookmark(&id, patch).await;
    let state = ctx.check_error()?;

    match state.find(&id) {
        Some(bookmark) => output.print_bookmark(bookmark),
        None => output.success(&format!("Updated bookmark {}", short_id(&id))),
    }
    Ok(())
}

/// Delete a bookmark after confirmation
pub async fn delete(ctx: &Context, id: String, yes: bool, output: &Output) -> Result<()> {
    ctx.require_user().await?;
    let state = ctx.load_bookmarks().await?;
    let id = resolve_id(&state, &id)?;

    if !yes && output.should_prompt() {
        let title = state.find(&id).map(|b| b.title.as_str()).unwrap_or("");
        if !prompt::confirm(&format!("Delete \"{}\"?", title))? {
            output.message("Cancelled");
            return Ok(());
        }
    }

    ctx.store.delete_bookmark(&id).await;
    ctx.check_error()?;
    output.success(&format!("Deleted bookmark {}", short_id(&id)));
    Ok(())
}

/// Build the patch for `edit`, checked like the add form
fn edit_patch(
    title: Option<String>,
    description: Option<String>,
    tags: Vec<String>,
) -> Result<BookmarkPatch> {
    let patch = BookmarkPatch {
        title,
        description,
        tags: (!tags.is_empty()).then_some(tags),
        ..BookmarkPatch::default()
    };
    if patch.is_empty() {
        bail!("Nothing to change. Pass --title, --description or --tag.");
    }
    Ok(patch.validated()?)
}

/// Resolve a full id or a unique prefix
fn resolve_id(state: &StoreState, id: &str) -> Result<String> {
    if state.find(id).is_some() {
        return Ok(id.to_string());
    }

    let matches: Vec<&Bookmark> = state
        .bookmarks
        .iter()
        .filter(|b| b.id.starts_with(id))
        .collect();

    match matches.as_slice() {
        [] => bail!("No bookmark found matching: {}", id),
        [bookmark] => Ok(bookmark.id.clone()),
        _ => {
            eprintln!("Multiple bookmarks match '{}':", id);
            for bookmark in &matches {
                eprintln!("  {} - {}", bookmark.id, bookmark.title);
            }
            bail!("Ambiguous ID. Please provide more characters.");
        }
    }
}

/// The confirmed bookmark saved for `url`
fn find_added<'a>(state: &'a StoreState, url: &str) -> Option<&'a Bookmark> {
    let key = smartmark_core::models::url_key(url);
    state.bookmarks.iter().find(|b| b.url_key() == key)
}

fn hostname(url: &str) -> Option<String> {
    url::Url::parse(url.trim())
        .ok()
        .and_then(|u| u.host_str().map(|h| h.trim_start_matches("www.").to_string()))
}
