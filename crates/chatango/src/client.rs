//! Client builder.
//!
//! This is the entry point for applications. It ties the layers together:
//! transport → protocol → session → room.

use chatango_room::{RoomConfig, RoomManager, RoomUpdate};
use chatango_session::{AccountConfig, Credentials, HttpAccountService};
use chatango_transport::{Connector, TcpConnector};
use serde::Deserialize;
use tokio::sync::mpsc;

use crate::ChatangoError;

/// Everything configurable about a client, loadable from any serde format.
///
/// ```toml
/// [room]
/// max_message_length = 1000
/// overflow = "truncate"
///
/// [room.keepalive]
/// interval_secs = 20
///
/// [account]
/// timeout = 30
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub room: RoomConfig,
    pub account: AccountConfig,
}

/// A connected client: the room manager and the stream every room
/// reports to.
pub struct Client<C: Connector = TcpConnector> {
    manager: RoomManager<C>,
    events: mpsc::UnboundedReceiver<RoomUpdate>,
}

impl Client<TcpConnector> {
    /// Creates a new builder with default settings.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }
}

impl<C: Connector> Client<C> {
    pub fn manager(&self) -> &RoomManager<C> {
        &self.manager
    }

    pub fn manager_mut(&mut self) -> &mut RoomManager<C> {
        &mut self.manager
    }

    /// Waits for the next event from any room. Returns `None` once the
    /// manager and every room actor are gone.
    pub async fn next_update(&mut self) -> Option<RoomUpdate> {
        self.events.recv().await
    }

    pub fn into_parts(self) -> (RoomManager<C>, mpsc::UnboundedReceiver<RoomUpdate>) {
        (self.manager, self.events)
    }
}

/// Builder for configuring a [`Client`].
///
/// # Example
///
/// ```rust,ignore
/// use chatango::prelude::*;
///
/// let mut client = Client::builder()
///     .credentials(Credentials::temporary("lurker"))
///     .build()?;
/// client.manager_mut().join_room("monachat")?;
/// while let Some(update) = client.next_update().await {
///     println!("{}: {:?}", update.room, update.event);
/// }
/// ```
#[derive(Debug, Default)]
pub struct ClientBuilder {
    credentials: Credentials,
    config: ClientConfig,
}

impl ClientBuilder {
    /// Anonymous credentials and default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    pub fn room_config(mut self, config: RoomConfig) -> Self {
        self.config.room = config;
        self
    }

    pub fn account_config(mut self, config: AccountConfig) -> Self {
        self.config.account = config;
        self
    }

    /// Builds a client that connects over TCP.
    pub fn build(self) -> Result<Client<TcpConnector>, ChatangoError> {
        let connector = TcpConnector::new(self.config.room.connect_timeout());
        self.build_with(connector)
    }

    /// Builds a client on a custom connector.
    pub fn build_with<C: Connector>(self, connector: C) -> Result<Client<C>, ChatangoError> {
        let accounts = HttpAccountService::new(self.config.account)?;
        let (manager, events) =
            RoomManager::new(connector, accounts, self.credentials, self.config.room);
        tracing::debug!(mode = ?manager.credentials().mode(), "client built");
        Ok(Client { manager, events })
    }
}
