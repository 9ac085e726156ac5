//! Output formatting for CLI
//!
//! Provides consistent output formatting across all commands:
//! - Human-readable default output
//! - JSON output (--json flag)
//! - Quiet mode for scripting (--quiet flag)

use serde::Serialize;

use smartmark_core::{Bookmark, StoreState};

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable output (default)
    Human,
    /// JSON output
    Json,
    /// Quiet mode - minimal output
    Quiet,
}

impl OutputFormat {
    /// Create format from CLI flags
    pub fn from_flags(json: bool, quiet: bool) -> Self {
        if quiet {
            OutputFormat::Quiet
        } else if json {
            OutputFormat::Json
        } else {
            OutputFormat::Human
        }
    }
}

/// Output helper for consistent formatting
pub struct Output {
    /// The output format
    pub format: OutputFormat,
}

impl Output {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    pub fn is_quiet(&self) -> bool {
        matches!(self.format, OutputFormat::Quiet)
    }

    pub fn is_json(&self) -> bool {
        matches!(self.format, OutputFormat::Json)
    }

    /// Print a single bookmark
    pub fn print_bookmark(&self, bookmark: &Bookmark) {
        match self.format {
            OutputFormat::Human => {
                println!("ID:          {}", bookmark.id);
                println!("Title:       {}", bookmark.title);
                println!("URL:         {}", bookmark.url);
                if let Some(ref desc) = bookmark.description {
                    println!("Description: {}", desc);
                }
                if !bookmark.tag_list().is_empty() {
                    println!("Tags:        {}", bookmark.tag_list().join(", "));
                }
                println!(
                    "Created:     {}",
                    bookmark.created_at.format("%Y-%m-%d %H:%M")
                );
                println!(
                    "Updated:     {}",
                    bookmark.updated_at.format("%Y-%m-%d %H:%M")
                );
            }
            OutputFormat::Json => println!("{}", to_json(bookmark)),
            OutputFormat::Quiet => println!("{}", bookmark.id),
        }
    }

    /// Print a list of bookmarks
    pub fn print_bookmarks(&self, bookmarks: &[Bookmark]) {
        match self.format {
            OutputFormat::Human => {
                if bookmarks.is_empty() {
                    println!("No bookmarks yet.");
                    return;
                }
                for bookmark in bookmarks {
                    println!("{}", list_line(bookmark, false));
                }
                println!("\n{} bookmark(s)", bookmarks.len());
            }
            OutputFormat::Json => println!("{}", to_json(&bookmarks)),
            OutputFormat::Quiet => {
                for bookmark in bookmarks {
                    println!("{}", bookmark.id);
                }
            }
        }
    }

    /// Print the whole store state, marking optimistic entries
    pub fn print_state(&self, state: &StoreState) {
        match self.format {
            OutputFormat::Human => {
                if state.bookmarks.is_empty() {
                    println!("No bookmarks yet.");
                } else {
                    for bookmark in &state.bookmarks {
                        println!("{}", list_line(bookmark, state.is_pending(&bookmark.id)));
                    }
                    println!("\n{} bookmark(s)", state.bookmarks.len());
                }
                if let Some(ref error) = state.error {
                    self.banner(error);
                }
            }
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::json!({
                        "bookmarks": state.bookmarks,
                        "loading": state.loading,
                        "error": state.error,
                    })
                );
            }
            OutputFormat::Quiet => {
                for bookmark in &state.bookmarks {
                    println!("{}", bookmark.id);
                }
            }
        }
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        match self.format {
            OutputFormat::Human => println!("✓ {}", message),
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::json!({"status": "success", "message": message})
                );
            }
            OutputFormat::Quiet => {}
        }
    }

    /// Print a persistent error banner (to stderr)
    pub fn banner(&self, error: &str) {
        match self.format {
            OutputFormat::Json => {
                eprintln!("{}", serde_json::json!({"status": "error", "message": error}));
            }
            _ => eprintln!("⚠ {}", error),
        }
    }

    /// Check if we should prompt for confirmation
    pub fn should_prompt(&self) -> bool {
        self.format == OutputFormat::Human
    }

    /// Print an informational message
    pub fn message(&self, msg: &str) {
        match self.format {
            OutputFormat::Human => println!("{}", msg),
            OutputFormat::Json => {
                println!("{}", serde_json::json!({"message": msg}));
            }
            OutputFormat::Quiet => {}
        }
    }
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string_pretty(value)
        .unwrap_or_else(|e| serde_json::json!({"error": e.to_string()}).to_string())
}

fn list_line(bookmark: &Bookmark, pending: bool) -> String {
    let marker = if pending { " (saving...)" } else { "" };
    format!(
        "{} | {}{} | {}",
        short_id(&bookmark.id),
        truncate(&bookmark.title, 35),
        marker,
        truncate(&bookmark.url, 45)
    )
}

/// First 8 characters of an id
pub fn short_id(id: &str) -> &str {
    match id.char_indices().nth(8) {
        Some((idx, _)) => &id[..idx],
        None => id,
    }
}

/// Truncate a string to max characters, adding "..." if truncated
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
