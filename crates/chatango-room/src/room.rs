//! Room actor: an isolated Tokio task that owns one room connection.
//!
//! Each room runs in its own task and talks to the application through an
//! mpsc command channel, the same way every other actor in the stack does.
//! The actor owns a [`RoomSession`] and, while connected, a [`Link`]: a
//! reader task that decodes frames, a writer task that drains an outbound
//! queue, and the keep-alive timer. Its loop waits on three things at once:
//!
//! ```text
//! loop {
//!     select! {
//!         command from a RoomHandle  => apply it to the session
//!         frame from the reader task => feed it to the session
//!         keep-alive deadline        => ping, or drop a silent link
//!     }
//! }
//! ```
//!
//! A lost connection does not stop the actor. The session falls back to
//! `Disconnected` and waits for [`RoomHandle::reconnect`] or
//! [`RoomHandle::shutdown`].

use std::sync::Arc;
use std::time::Duration;

use chatango_keepalive::{KeepAlive, PingDecision};
use chatango_protocol::{Formatting, Frame, FrameDecoder, Post, PostOptions, ProtocolError, PING};
use chatango_transport::{
    ConnectionId, ConnectionReader, ConnectionWriter, Connector, TransportError,
};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::session::{CommandStatus, Operation, Outbox, RoomInfo, RoomSession};
use crate::{DisconnectReason, RoomError, RoomEvent, RoomUpdate};

/// Frames buffered between the reader task and the actor.
const INBOUND_BUFFER: usize = 256;

/// How long the writer gets to flush and close before it is aborted.
const WRITER_GRACE: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// Commands and handle
// ---------------------------------------------------------------------------

/// Commands sent to a room actor through its channel.
pub(crate) enum RoomCommand {
    Operate {
        op: Operation,
        reply: oneshot::Sender<CommandStatus>,
    },
    SetFormatting {
        formatting: Formatting,
        reply: oneshot::Sender<()>,
    },
    Info {
        reply: oneshot::Sender<RoomInfo>,
    },
    Disconnect {
        reply: oneshot::Sender<()>,
    },
    Reconnect {
        reply: oneshot::Sender<()>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Handle to a running room actor.
///
/// Cheap to clone; it is a room name and an `mpsc::Sender`. Every method
/// fails with [`RoomError::Unavailable`] once the actor has stopped.
#[derive(Clone)]
pub struct RoomHandle {
    room: String,
    sender: mpsc::Sender<RoomCommand>,
}

impl RoomHandle {
    /// The room's lowercase name.
    pub fn name(&self) -> &str {
        &self.room
    }

    fn unavailable(&self) -> RoomError {
        RoomError::Unavailable(self.room.clone())
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> RoomCommand,
    ) -> Result<T, RoomError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(make(reply_tx))
            .await
            .map_err(|_| self.unavailable())?;
        reply_rx.await.map_err(|_| self.unavailable())
    }

    async fn operate(&self, op: Operation) -> Result<CommandStatus, RoomError> {
        self.request(|reply| RoomCommand::Operate { op, reply }).await
    }

    /// Posts a message with default options.
    ///
    /// Bodies longer than the configured limit are split or truncated
    /// according to [`RoomConfig::overflow`](crate::RoomConfig::overflow).
    pub async fn post(&self, text: impl Into<String>) -> Result<CommandStatus, RoomError> {
        self.post_with(text, PostOptions::default()).await
    }

    pub async fn post_with(
        &self,
        text: impl Into<String>,
        options: PostOptions,
    ) -> Result<CommandStatus, RoomError> {
        self.operate(Operation::Post {
            text: text.into(),
            options,
        })
        .await
    }

    /// Asks for the next page of older posts. They arrive as one
    /// [`RoomEvent::HistoryDone`] with `initial: false`.
    pub async fn request_more_history(&self) -> Result<CommandStatus, RoomError> {
        self.operate(Operation::RequestMoreHistory).await
    }

    pub async fn flag(&self, post: &Post) -> Result<CommandStatus, RoomError> {
        self.operate(Operation::Flag(post.clone())).await
    }

    pub async fn delete_post(&self, post: &Post) -> Result<CommandStatus, RoomError> {
        self.operate(Operation::Delete(post.clone())).await
    }

    /// Deletes every post by the author of `post`.
    pub async fn delete_all_from(&self, post: &Post) -> Result<CommandStatus, RoomError> {
        self.operate(Operation::DeleteAll(post.clone())).await
    }

    pub async fn ban(&self, post: &Post) -> Result<CommandStatus, RoomError> {
        self.operate(Operation::Ban(post.clone())).await
    }

    /// Lifts the ban on `name`. Returns [`CommandStatus::NotFound`] if the
    /// ban list has no record for it.
    pub async fn unban(&self, name: impl Into<String>) -> Result<CommandStatus, RoomError> {
        self.operate(Operation::Unban(name.into())).await
    }

    pub async fn refresh_ban_list(&self) -> Result<CommandStatus, RoomError> {
        self.operate(Operation::RefreshBanList).await
    }

    pub async fn add_mod(&self, name: impl Into<String>) -> Result<CommandStatus, RoomError> {
        self.operate(Operation::AddMod(name.into())).await
    }

    pub async fn remove_mod(&self, name: impl Into<String>) -> Result<CommandStatus, RoomError> {
        self.operate(Operation::RemoveMod(name.into())).await
    }

    pub async fn clear_all(&self) -> Result<CommandStatus, RoomError> {
        self.operate(Operation::ClearAll).await
    }

    /// Drops a temporary or registered name back to anonymous.
    pub async fn logout(&self) -> Result<CommandStatus, RoomError> {
        self.operate(Operation::Logout).await
    }

    pub async fn set_formatting(&self, formatting: Formatting) -> Result<(), RoomError> {
        self.request(|reply| RoomCommand::SetFormatting { formatting, reply })
            .await
    }

    pub async fn info(&self) -> Result<RoomInfo, RoomError> {
        self.request(|reply| RoomCommand::Info { reply }).await
    }

    /// Closes the connection. The actor keeps running.
    pub async fn disconnect(&self) -> Result<(), RoomError> {
        self.request(|reply| RoomCommand::Disconnect { reply }).await
    }

    /// Closes any open connection and logs in again with a new session id.
    /// Returns once the new socket is open (or failed to open).
    pub async fn reconnect(&self) -> Result<(), RoomError> {
        self.request(|reply| RoomCommand::Reconnect { reply }).await
    }

    /// Closes the connection and stops the actor.
    pub async fn shutdown(&self) -> Result<(), RoomError> {
        self.request(|reply| RoomCommand::Shutdown { reply }).await
    }
}

// ---------------------------------------------------------------------------
// Link: the per-connection tasks
// ---------------------------------------------------------------------------

/// What the reader and writer tasks report to the actor.
#[derive(Debug)]
enum Inbound {
    Frame(Frame),
    Malformed(ProtocolError),
    Closed,
    Failed(TransportError),
}

enum Outgoing {
    Frame(Vec<u8>),
    Close,
}

/// One open connection.
struct Link {
    id: ConnectionId,
    inbound: mpsc::Receiver<Inbound>,
    outgoing: mpsc::Sender<Outgoing>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
    /// Started once login succeeds.
    keepalive: Option<KeepAlive>,
}

impl Link {
    /// Queues one frame. Returns `false` if the writer's queue is full.
    fn send(&self, bytes: Vec<u8>) -> bool {
        match self.outgoing.try_send(Outgoing::Frame(bytes)) {
            Ok(()) => true,
            // The writer already failed and reported it.
            Err(TrySendError::Closed(_)) => true,
            Err(TrySendError::Full(_)) => false,
        }
    }
}

async fn read_loop<S>(
    mut reader: ConnectionReader<S>,
    inbound: mpsc::Sender<Inbound>,
    max_frame_len: usize,
) where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    let mut decoder = FrameDecoder::with_max_frame_len(max_frame_len);
    let last = loop {
        match reader.recv().await {
            Ok(Some(bytes)) => {
                for frame in decoder.feed(&bytes) {
                    let item = match frame {
                        Ok(frame) => Inbound::Frame(frame),
                        Err(e) => Inbound::Malformed(e),
                    };
                    if inbound.send(item).await.is_err() {
                        return;
                    }
                }
            }
            Ok(None) => break Inbound::Closed,
            Err(e) => break Inbound::Failed(e),
        }
    };
    let _ = inbound.send(last).await;
}

async fn write_loop<S>(
    mut writer: ConnectionWriter<S>,
    mut outgoing: mpsc::Receiver<Outgoing>,
    inbound: mpsc::Sender<Inbound>,
) where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    while let Some(item) = outgoing.recv().await {
        match item {
            Outgoing::Frame(bytes) => {
                if let Err(e) = writer.send(&bytes).await {
                    let _ = inbound.send(Inbound::Failed(e)).await;
                    return;
                }
            }
            Outgoing::Close => {
                if let Err(e) = writer.close().await {
                    tracing::debug!(id = %writer.id(), error = %e, "close failed");
                }
                return;
            }
        }
    }
}

async fn next_inbound(inbound: Option<&mut mpsc::Receiver<Inbound>>) -> Option<Inbound> {
    match inbound {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn next_ping(keepalive: Option<&mut KeepAlive>) -> PingDecision {
    match keepalive {
        Some(ka) => ka.wait_for_ping().await,
        None => std::future::pending().await,
    }
}

// ---------------------------------------------------------------------------
// RoomActor
// ---------------------------------------------------------------------------

enum Wake {
    Command(Option<RoomCommand>),
    Inbound(Option<Inbound>),
    Ping(PingDecision),
}

/// The internal room actor state. Runs inside a Tokio task.
struct RoomActor<C: Connector> {
    session: RoomSession,
    connector: Arc<C>,
    commands: mpsc::Receiver<RoomCommand>,
    events: mpsc::UnboundedSender<RoomUpdate>,
    link: Option<Link>,
}

impl<C: Connector> RoomActor<C> {
    async fn run(mut self) {
        tracing::info!(room = %self.session.name(), "room actor started");
        self.connect().await;

        loop {
            let (inbound, keepalive) = match self.link.as_mut() {
                Some(link) => (Some(&mut link.inbound), link.keepalive.as_mut()),
                None => (None, None),
            };
            let wake = tokio::select! {
                cmd = self.commands.recv() => Wake::Command(cmd),
                item = next_inbound(inbound) => Wake::Inbound(item),
                decision = next_ping(keepalive) => Wake::Ping(decision),
            };

            match wake {
                Wake::Command(Some(cmd)) => {
                    if !self.handle_command(cmd).await {
                        break;
                    }
                }
                Wake::Command(None) => {
                    // Every handle is gone; nobody can reach this room.
                    self.teardown(Some(DisconnectReason::Deliberate)).await;
                    break;
                }
                Wake::Inbound(Some(item)) => self.handle_inbound(item).await,
                Wake::Inbound(None) => self.teardown(Some(DisconnectReason::ServerClosed)).await,
                Wake::Ping(PingDecision::Ping) => {
                    tracing::trace!(room = %self.session.name(), "ping");
                    if !self.queue([PING.to_vec()]) {
                        self.teardown(Some(stalled())).await;
                    }
                }
                Wake::Ping(PingDecision::Dead) => {
                    self.teardown(Some(DisconnectReason::KeepAliveTimeout)).await;
                }
            }
        }

        tracing::info!(room = %self.session.name(), "room actor stopped");
    }

    /// Returns `false` when the actor should stop.
    async fn handle_command(&mut self, cmd: RoomCommand) -> bool {
        match cmd {
            RoomCommand::Operate { op, reply } => {
                let status = self.operate(op).await;
                let _ = reply.send(status);
            }
            RoomCommand::SetFormatting { formatting, reply } => {
                self.session.set_formatting(formatting);
                let _ = reply.send(());
            }
            RoomCommand::Info { reply } => {
                let _ = reply.send(self.session.info());
            }
            RoomCommand::Disconnect { reply } => {
                self.teardown(Some(DisconnectReason::Deliberate)).await;
                let _ = reply.send(());
            }
            RoomCommand::Reconnect { reply } => {
                self.session.begin_reconnect();
                self.teardown(None).await;
                self.connect().await;
                let _ = reply.send(());
            }
            RoomCommand::Shutdown { reply } => {
                tracing::info!(room = %self.session.name(), "room shutting down");
                self.teardown(Some(DisconnectReason::Deliberate)).await;
                self.session.clear_history();
                let _ = reply.send(());
                return false;
            }
        }
        true
    }

    async fn operate(&mut self, op: Operation) -> CommandStatus {
        if self.link.is_none() || !self.session.state().is_logged_in() {
            return CommandStatus::NotConnected;
        }

        let mut out = Outbox::default();
        let status = self.session.apply(op, &mut out);
        let frames = out.commands.iter().map(|command| {
            tracing::debug!(room = %self.session.name(), verb = %command.verb, "sending");
            command.encode(false)
        });
        if !self.queue(frames) {
            self.teardown(Some(stalled())).await;
        }
        status
    }

    /// Hands encoded frames to the writer, stopping at the first one that
    /// does not fit. Returns `false` if the queue was full.
    fn queue(&self, frames: impl IntoIterator<Item = Vec<u8>>) -> bool {
        let Some(link) = &self.link else {
            return true;
        };
        let queued = frames.into_iter().all(|bytes| link.send(bytes));
        if !queued {
            tracing::warn!(room = %self.session.name(), id = %link.id, "write queue full");
        }
        queued
    }

    async fn handle_inbound(&mut self, item: Inbound) {
        if let Some(ka) = self.link.as_mut().and_then(|l| l.keepalive.as_mut()) {
            ka.record_activity();
        }

        match item {
            Inbound::Frame(frame) => {
                let mut out = Outbox::default();
                if let Err(e) = self.session.handle_frame(frame, &mut out) {
                    tracing::warn!(room = %self.session.name(), error = %e, "malformed frame skipped");
                }
                self.flush(out).await;
            }
            Inbound::Malformed(e) => {
                tracing::warn!(room = %self.session.name(), error = %e, "undecodable frame skipped");
            }
            Inbound::Closed => self.teardown(Some(DisconnectReason::ServerClosed)).await,
            Inbound::Failed(e) => {
                self.teardown(Some(DisconnectReason::Transport(e.to_string())))
                    .await
            }
        }
    }

    /// Carries out what a frame handler asked for, in order: commands,
    /// events, keep-alive start, then close.
    async fn flush(&mut self, out: Outbox) {
        let Outbox {
            commands,
            events,
            start_keepalive,
            close,
        } = out;

        let queued = self.queue(commands.iter().map(|command| command.encode(false)));
        if let Some(link) = self.link.as_mut() {
            if start_keepalive && link.keepalive.is_none() {
                let keepalive = KeepAlive::new(&self.session.config().keepalive);
                if !keepalive.is_enabled() {
                    tracing::debug!(room = %self.session.name(), id = %link.id, "keep-alive disabled");
                }
                link.keepalive = Some(keepalive);
            }
        }
        for event in events {
            self.emit(event);
        }
        match close {
            Some(reason) => self.teardown(Some(reason)).await,
            None if !queued => self.teardown(Some(stalled())).await,
            None => {}
        }
    }

    fn emit(&self, event: RoomEvent) {
        let update = RoomUpdate {
            room: self.session.name().to_string(),
            event,
        };
        if self.events.send(update).is_err() {
            tracing::trace!(room = %self.session.name(), "event receiver dropped");
        }
    }

    async fn connect(&mut self) {
        let addr = self.session.address();
        let timeout = self.session.config().connect_timeout();
        tracing::info!(room = %self.session.name(), %addr, "connecting");

        let result = match tokio::time::timeout(timeout, self.connector.connect(&addr)).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::ConnectTimedOut(addr.clone())),
        };
        let conn = match result {
            Ok(conn) => conn,
            Err(e) => {
                tracing::warn!(room = %self.session.name(), %addr, error = %e, "connect failed");
                self.session.connection_lost();
                self.emit(RoomEvent::ConnectionError {
                    reason: DisconnectReason::Transport(e.to_string()),
                });
                return;
            }
        };

        let id = conn.id();
        let (reader, writer) = conn.split();
        let config = self.session.config();
        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_BUFFER);
        let (outgoing_tx, outgoing_rx) = mpsc::channel(config.write_queue_size.max(1));
        let link = Link {
            id,
            inbound: inbound_rx,
            outgoing: outgoing_tx,
            reader: tokio::spawn(read_loop(reader, inbound_tx.clone(), config.max_frame_len)),
            writer: tokio::spawn(write_loop(writer, outgoing_rx, inbound_tx)),
            keepalive: None,
        };

        // Holds the password; never log its arguments. The queue is empty,
        // so it always fits.
        let auth = self.session.begin_auth();
        link.send(auth.encode(true));
        tracing::debug!(room = %self.session.name(), %id, "connected, authenticating");
        self.link = Some(link);
    }

    /// Closes the link if there is one. `reason` is reported as the last
    /// event of the connection. `None` closes silently and leaves the
    /// session state to the caller, which is how a reconnect replaces its
    /// link.
    async fn teardown(&mut self, reason: Option<DisconnectReason>) {
        let Some(link) = self.link.take() else {
            return;
        };
        let Link {
            id,
            inbound,
            outgoing,
            reader,
            mut writer,
            keepalive,
        } = link;

        reader.abort();
        drop(inbound);
        let pings = keepalive.as_ref().map_or(0, KeepAlive::pings_sent);
        drop(keepalive);
        // A full queue cannot take the close; dropping the sender still
        // ends the writer once it drains.
        let _ = outgoing.try_send(Outgoing::Close);
        drop(outgoing);
        if tokio::time::timeout(WRITER_GRACE, &mut writer).await.is_err() {
            tracing::warn!(room = %self.session.name(), %id, "writer did not finish, aborting");
            writer.abort();
        }

        tracing::info!(room = %self.session.name(), %id, pings, reason = ?reason, "disconnected");
        if let Some(reason) = reason {
            self.session.connection_lost();
            self.emit(RoomEvent::ConnectionError { reason });
        }
    }
}

fn stalled() -> DisconnectReason {
    DisconnectReason::Transport("write queue full".into())
}

/// Spawns a room actor and returns a handle to it. The actor starts
/// connecting immediately.
pub(crate) fn spawn_room<C: Connector>(
    session: RoomSession,
    connector: Arc<C>,
    events: mpsc::UnboundedSender<RoomUpdate>,
) -> RoomHandle {
    let (tx, rx) = mpsc::channel(session.config().command_channel_size.max(1));
    let room = session.name().to_string();

    let actor = RoomActor {
        session,
        connector,
        commands: rx,
        events,
        link: None,
    };
    tokio::spawn(actor.run());

    RoomHandle { room, sender: tx }
}
