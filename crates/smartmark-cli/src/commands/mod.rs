//! Command handlers

pub mod auth;
pub mod bookmark;
pub mod config;
pub mod status;
pub mod watch;

use std::sync::Arc;

use anyhow::{bail, Context as _, Result};

use smartmark_core::{AuthService, BookmarkStore, Config, SessionFile, StoreState, SupabaseClient, User};

/// Everything a command needs: the backend client and the store on top of it
pub struct Context {
    pub config: Config,
    pub client: Arc<SupabaseClient>,
    pub store: Arc<BookmarkStore>,
}

impl Context {
    pub fn open(config: Config) -> Result<Self> {
        let backend = config.backend()?;
        let client = SupabaseClient::new(backend, SessionFile::new(config.session_path()))
            .context("Failed to create backend client")?
            .with_opener(Arc::new(auth::TerminalOpener));
        let client = Arc::new(client);
        let store = Arc::new(BookmarkStore::new(
            client.clone(),
            client.clone(),
            config.redirect_to(),
        ));

        Ok(Self {
            config,
            client,
            store,
        })
    }

    /// Load the stored session into the store
    pub async fn restore(&self) -> Result<Option<User>> {
        let session = self
            .client
            .get_session()
            .await
            .context("Failed to load session")?;
        let user = session.map(|s| s.user);
        self.store.set_user(user.clone());
        Ok(user)
    }

    /// Restore the session, failing when nobody is signed in
    pub async fn require_user(&self) -> Result<User> {
        match self.restore().await? {
            Some(user) => Ok(user),
            None => bail!("Not signed in. Run `smartmark login` first."),
        }
    }

    /// Fetch the signed-in user's bookmarks into the store
    pub async fn load_bookmarks(&self) -> Result<StoreState> {
        self.store.fetch_bookmarks().await;
        let state = self.store.snapshot();
        if let Some(ref error) = state.error {
            bail!("Failed to load bookmarks: {}", error);
        }
        Ok(state)
    }

    /// Fail with the store's error, if an operation recorded one
    pub fn check_error(&self) -> Result<StoreState> {
        let state = self.store.snapshot();
        if let Some(ref error) = state.error {
            bail!("{}", error);
        }
        Ok(state)
    }
}
