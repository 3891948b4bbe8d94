//! Room manager: joins, tracks and leaves rooms for one set of credentials.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use chatango_session::{resolve_shard, AccountService, Credentials, HttpAccountService};
use chatango_transport::Connector;
use futures_util::future::join_all;
use tokio::sync::mpsc;

use crate::room::spawn_room;
use crate::session::RoomSession;
use crate::{RoomConfig, RoomError, RoomHandle, RoomUpdate};

/// Manages every room joined with one identity.
///
/// All rooms report to the single [`RoomUpdate`] receiver returned by
/// [`RoomManager::new`]. Room names are case-insensitive and stored in
/// lowercase.
pub struct RoomManager<C: Connector, A: AccountService = HttpAccountService> {
    connector: Arc<C>,
    accounts: A,
    credentials: Credentials,
    config: RoomConfig,
    events: mpsc::UnboundedSender<RoomUpdate>,
    /// Active rooms, keyed by lowercase name.
    rooms: HashMap<String, RoomHandle>,
}

impl<C: Connector, A: AccountService> RoomManager<C, A> {
    /// Creates a manager with no rooms, and the receiver its rooms report to.
    pub fn new(
        connector: C,
        accounts: A,
        credentials: Credentials,
        config: RoomConfig,
    ) -> (Self, mpsc::UnboundedReceiver<RoomUpdate>) {
        let (events, rx) = mpsc::unbounded_channel();
        let manager = Self {
            connector: Arc::new(connector),
            accounts,
            credentials,
            config,
            events,
            rooms: HashMap::new(),
        };
        (manager, rx)
    }

    /// Starts a session for `name` and returns its handle.
    ///
    /// The session connects in the background; watch the event stream for
    /// [`RoomEvent::Connected`](crate::RoomEvent::Connected) or
    /// [`RoomEvent::ConnectionError`](crate::RoomEvent::ConnectionError).
    /// Must be called from within a Tokio runtime.
    pub fn join_room(&mut self, name: &str) -> Result<RoomHandle, RoomError> {
        let name = name.to_lowercase();
        if self.rooms.contains_key(&name) {
            return Err(RoomError::AlreadyJoined(name));
        }

        let shard = resolve_shard(&name)?;
        let session = RoomSession::new(
            name.clone(),
            shard,
            self.credentials.clone(),
            self.config.clone(),
        );
        let handle = spawn_room(session, Arc::clone(&self.connector), self.events.clone());
        self.rooms.insert(name.clone(), handle.clone());
        tracing::info!(room = %name, shard, "room joined");
        Ok(handle)
    }

    /// Disconnects from `name` and stops its actor.
    pub async fn leave_room(&mut self, name: &str) -> Result<(), RoomError> {
        let name = name.to_lowercase();
        let handle = self
            .rooms
            .remove(&name)
            .ok_or_else(|| RoomError::NotJoined(name.clone()))?;

        match handle.shutdown().await {
            // Already stopped on its own; nothing left to do.
            Ok(()) | Err(RoomError::Unavailable(_)) => {}
            Err(e) => return Err(e),
        }
        tracing::info!(room = %name, "room left");
        Ok(())
    }

    /// Leaves every room concurrently.
    pub async fn leave_all(&mut self) {
        let handles: Vec<RoomHandle> = self.rooms.drain().map(|(_, h)| h).collect();
        let count = handles.len();
        join_all(handles.iter().map(|h| h.shutdown())).await;
        tracing::info!(rooms = count, "left all rooms");
    }

    /// Returns the handle for a joined room.
    pub fn handle(&self, name: &str) -> Option<&RoomHandle> {
        self.rooms.get(&name.to_lowercase())
    }

    /// Names of all joined rooms, sorted.
    pub fn rooms(&self) -> Vec<String> {
        let mut names: Vec<String> = self.rooms.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn config(&self) -> &RoomConfig {
        &self.config
    }

    /// Logs in over HTTP and returns the account's auth token.
    pub async fn request_auth_token(&self) -> Result<String, RoomError> {
        Ok(self.accounts.request_auth_token(&self.credentials).await?)
    }

    /// Replaces the account's avatar with the image at `path`.
    pub async fn upload_avatar(&self, path: impl AsRef<Path>) -> Result<(), RoomError> {
        Ok(self
            .accounts
            .upload_avatar(&self.credentials, path.as_ref())
            .await?)
    }
}
