//! The room session state machine.
//!
//! [`RoomSession`] holds everything known about one room and reacts to
//! decoded frames. It never touches a socket: each handler writes what
//! should happen next into an [`Outbox`] (commands to send, events to
//! emit, whether to start the keep-alive or close the link) and the
//! connection actor in [`room`](crate::room) carries it out. That split
//! keeps every protocol rule testable without a runtime.

use std::collections::{BTreeMap, HashMap, VecDeque};

use chatango_protocol::{
    anon_id, anon_seed, fit_body, generate_session_id, parse_post, post_command, Author, AuthorKind,
    BanRecord, Command, Formatting, Frame, Post, PostId, PostOptions, PostSource, ProtocolError,
};
use chatango_session::{Credentials, LoginMode};
use serde::Serialize;

use crate::{DisconnectReason, JoinKind, Moderator, Participant, RoomConfig, RoomEvent, RoomState};

// ---------------------------------------------------------------------------
// Outbox
// ---------------------------------------------------------------------------

/// What a handler wants done, in order.
#[derive(Debug, Default)]
pub struct Outbox {
    /// Commands to write, in order.
    pub commands: Vec<Command>,
    /// Events to emit, in order.
    pub events: Vec<RoomEvent>,
    /// Login succeeded; start the keep-alive timer.
    pub start_keepalive: bool,
    /// Close the connection once the above are done.
    pub close: Option<DisconnectReason>,
}

impl Outbox {
    fn send(&mut self, command: Command) {
        self.commands.push(command);
    }

    fn emit(&mut self, event: RoomEvent) {
        self.events.push(event);
    }
}

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

/// Result of a command-API call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandStatus {
    /// Written to the connection.
    Sent,
    /// Not permitted at our permission level; nothing was sent.
    Denied,
    /// The target post or ban record is unknown; nothing was sent.
    NotFound,
    /// The room is not connected; nothing was sent.
    NotConnected,
}

/// A request from the application.
#[derive(Debug, Clone)]
pub enum Operation {
    Post { text: String, options: PostOptions },
    RequestMoreHistory,
    Flag(Post),
    Delete(Post),
    DeleteAll(Post),
    Ban(Post),
    Unban(String),
    RefreshBanList,
    AddMod(String),
    RemoveMod(String),
    ClearAll,
    Logout,
}

/// Permission needed for an operation.
const MOD_LEVEL: u8 = 1;
const OWNER_LEVEL: u8 = 2;

/// Maximum ban-list entries requested in one `blocklist` call.
const BAN_LIST_PAGE: u32 = 500;

// ---------------------------------------------------------------------------
// Message table
// ---------------------------------------------------------------------------

/// Confirmed posts by permanent id, forgetting the oldest past `cap`.
#[derive(Debug)]
struct MessageTable {
    posts: HashMap<String, Post>,
    order: VecDeque<String>,
    cap: usize,
}

impl MessageTable {
    fn new(cap: usize) -> Self {
        Self {
            posts: HashMap::new(),
            order: VecDeque::new(),
            cap,
        }
    }

    fn insert(&mut self, post: Post) {
        let Some(id) = post.id.permanent().map(str::to_string) else {
            return;
        };
        if self.cap == 0 {
            return;
        }
        if self.posts.insert(id.clone(), post).is_none() {
            self.order.push_back(id);
        }
        while self.order.len() > self.cap {
            if let Some(oldest) = self.order.pop_front() {
                self.posts.remove(&oldest);
            }
        }
    }

    fn remove(&mut self, id: &str) -> Option<Post> {
        let post = self.posts.remove(id)?;
        self.order.retain(|o| o != id);
        Some(post)
    }

    fn find_by_unid(&self, unid: &str) -> Option<&Post> {
        self.order
            .iter()
            .rev()
            .filter_map(|id| self.posts.get(id))
            .find(|p| p.unid == unid)
    }

    fn clear(&mut self) {
        self.posts.clear();
        self.order.clear();
    }
}

// ---------------------------------------------------------------------------
// RoomInfo
// ---------------------------------------------------------------------------

/// A snapshot of a room session's state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoomInfo {
    pub name: String,
    pub shard: u32,
    pub state: RoomState,
    pub session_id: String,
    /// Our display name in this room.
    pub display_name: String,
    pub owner: String,
    pub moderators: Vec<String>,
    pub participants: Vec<Participant>,
    pub user_count: u32,
    pub bans: Vec<BanRecord>,
    pub banned_words: Vec<String>,
    pub rate_limit: u32,
    pub premium: bool,
    pub formatting: Formatting,
    pub pages_fetched: u32,
    /// Newest post timestamp seen, in server seconds.
    pub last_seen: f64,
    /// 0 = member, 1 = moderator, 2 = owner.
    pub permission_level: u8,
}

// ---------------------------------------------------------------------------
// RoomSession
// ---------------------------------------------------------------------------

/// All state for one joined room.
#[derive(Debug)]
pub struct RoomSession {
    name: String,
    shard: u32,
    config: RoomConfig,
    credentials: Credentials,
    state: RoomState,

    session_id: String,
    display_name: String,
    owner: String,
    /// Lowercase name to permission bits.
    moderators: BTreeMap<String, u64>,
    /// Server clock at login, from `ok`.
    server_time: f64,

    participants: Vec<Participant>,
    user_count: u32,
    banned_partial: Vec<String>,
    banned_exact: Vec<String>,
    bans: Vec<BanRecord>,
    rate_limit: u32,
    premium: bool,
    formatting: Formatting,

    /// Posts seen in `b` frames, waiting for their `u`.
    pending: HashMap<String, Post>,
    confirmed: MessageTable,
    /// History posts since the last flush.
    backlog: Vec<Post>,
    pages_fetched: u32,
    last_seen: f64,
}

impl RoomSession {
    pub fn new(name: impl Into<String>, shard: u32, credentials: Credentials, config: RoomConfig) -> Self {
        let confirmed = MessageTable::new(config.tracked_messages);
        Self {
            name: name.into(),
            shard,
            config,
            credentials,
            state: RoomState::Connecting,
            session_id: generate_session_id(),
            display_name: String::new(),
            owner: String::new(),
            moderators: BTreeMap::new(),
            server_time: 0.0,
            participants: Vec::new(),
            user_count: 0,
            banned_partial: Vec::new(),
            banned_exact: Vec::new(),
            bans: Vec::new(),
            rate_limit: 0,
            premium: false,
            formatting: Formatting::default(),
            pending: HashMap::new(),
            confirmed,
            backlog: Vec::new(),
            pages_fetched: 0,
            last_seen: 0.0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> RoomState {
        self.state
    }

    pub fn config(&self) -> &RoomConfig {
        &self.config
    }

    /// The address to dial.
    pub fn address(&self) -> String {
        self.config.address(self.shard)
    }

    fn transition(&mut self, next: RoomState) {
        if !self.state.can_transition_to(next) {
            tracing::debug!(room = %self.name, from = %self.state, to = %next, "unexpected state transition");
        }
        self.state = next;
    }

    // -----------------------------------------------------------------------
    // Connection lifecycle
    // -----------------------------------------------------------------------

    /// The socket is open: builds the `bauth` command and moves to
    /// Authenticating. The command holds the password and must not be
    /// logged.
    pub fn begin_auth(&mut self) -> Command {
        self.transition(RoomState::Authenticating);
        self.credentials.auth_command(&self.name, &self.session_id)
    }

    /// Starts a reconnect with a fresh session id. A live room moves
    /// straight to Reconnecting; the old link's per-connection state is
    /// dropped here rather than through [`connection_lost`](Self::connection_lost).
    pub fn begin_reconnect(&mut self) {
        self.transition(RoomState::Reconnecting);
        self.session_id = generate_session_id();
        self.clear_connection_state();
    }

    /// The connection is gone. Per-connection state is dropped; the room's
    /// history, bans and formatting are kept for a reconnect.
    pub fn connection_lost(&mut self) {
        if self.state != RoomState::Disconnected {
            self.transition(RoomState::Disconnected);
        }
        self.clear_connection_state();
    }

    fn clear_connection_state(&mut self) {
        self.pending.clear();
        self.backlog.clear();
        self.participants.clear();
    }

    // -----------------------------------------------------------------------
    // Inbound
    // -----------------------------------------------------------------------

    /// Applies one decoded frame.
    ///
    /// An `Err` means the frame was malformed and skipped; the session is
    /// unchanged and stays usable.
    pub fn handle_frame(&mut self, frame: Frame, out: &mut Outbox) -> Result<(), ProtocolError> {
        let cmd = match frame {
            Frame::Pong => return Ok(()),
            Frame::Command(cmd) => cmd,
        };
        tracing::debug!(room = %self.name, verb = %cmd.verb, "frame received");

        match cmd.verb.as_str() {
            "ok" => self.on_ok(&cmd, out),
            "denied" => {
                tracing::info!(room = %self.name, "room denied");
                out.emit(RoomEvent::Denied);
                out.close = Some(DisconnectReason::Denied);
                Ok(())
            }
            "inited" => self.on_inited(out),
            "b" => self.on_post(&cmd),
            "u" => self.on_confirm(&cmd, out),
            "i" => self.on_history(&cmd),
            "gotmore" => {
                self.pages_fetched += 1;
                let posts = std::mem::take(&mut self.backlog);
                out.emit(RoomEvent::HistoryDone { posts, initial: false });
                Ok(())
            }
            "n" => self.on_user_count(&cmd, out),
            "bw" => self.on_banned_words(&cmd, out),
            "participant" => self.on_participant(&cmd, out),
            "gparticipants" => self.on_participant_list(&cmd, 1, out),
            "g_participants" => self.on_participant_list(&cmd, 0, out),
            "show_fw" => {
                out.emit(RoomEvent::FloodWarning);
                Ok(())
            }
            "show_tb" => {
                let seconds = number(&cmd, 0, "seconds")?;
                out.emit(RoomEvent::FloodBan { seconds });
                Ok(())
            }
            "tb" => {
                let seconds = number(&cmd, 0, "seconds")?;
                out.emit(RoomEvent::FloodBanRepeat { seconds });
                Ok(())
            }
            "blocklist" => self.on_ban_list(&cmd, out),
            "blocked" => self.on_blocked(&cmd, out),
            "unblocked" => self.on_unblocked(&cmd, out),
            "mods" => {
                self.on_mods(&cmd, out);
                Ok(())
            }
            "delete" => {
                let id = cmd.require(0)?.to_string();
                self.on_delete(id, out);
                Ok(())
            }
            "deleteall" => {
                for id in cmd.args.iter().filter(|id| !id.is_empty()) {
                    self.on_delete(id.clone(), out);
                }
                Ok(())
            }
            "premium" => self.on_premium(&cmd),
            "getratelimit" | "ratelimitset" => {
                let seconds = number(&cmd, 0, "rate limit")?;
                self.rate_limit = seconds;
                out.emit(RoomEvent::RateLimitChanged { seconds });
                Ok(())
            }
            other => {
                tracing::trace!(room = %self.name, verb = other, "unhandled verb");
                Ok(())
            }
        }
    }

    fn on_ok(&mut self, cmd: &Command, out: &mut Outbox) -> Result<(), ProtocolError> {
        let text = move |i: usize| cmd.field(i).unwrap_or_default();
        let status = text(2);
        let mode = self.credentials.mode();

        let expected = match mode {
            LoginMode::Registered => "M",
            LoginMode::Temporary | LoginMode::Anonymous => "C",
        };
        if status != expected {
            tracing::info!(room = %self.name, status, "login failed");
            out.emit(RoomEvent::LoginFailed);
            out.close = Some(DisconnectReason::LoginFailed);
            return Ok(());
        }

        let server_time = text(4);
        self.owner = text(0).to_string();
        if !text(1).is_empty() {
            self.session_id = text(1).to_string();
        }
        self.server_time = server_time.parse().unwrap_or(0.0);
        self.moderators = parse_mod_list(&cmd.rest(6));

        let name = self.credentials.name().unwrap_or_default().to_string();
        self.display_name = match mode {
            LoginMode::Registered => name,
            LoginMode::Temporary => {
                out.send(Command::new("blogin").arg(&name));
                Author::temporary(&name).name
            }
            LoginMode::Anonymous => {
                let whole = server_time.split('.').next().unwrap_or_default();
                let seed = anon_seed(whole);
                let name = Author::anonymous(&anon_id(&seed, &self.session_id)).name;
                self.formatting.name_color = seed;
                name
            }
        };

        tracing::info!(room = %self.name, name = %self.display_name, owner = %self.owner, "logged in");
        self.transition(RoomState::Initializing);
        out.start_keepalive = true;
        Ok(())
    }

    fn on_inited(&mut self, out: &mut Outbox) -> Result<(), ProtocolError> {
        out.send(Command::new("gparticipants"));
        out.send(Command::new("getpremium").arg("1"));
        out.send(Command::new("getbannedwords"));
        out.send(Command::new("getratelimit"));

        self.transition(RoomState::Live);
        tracing::info!(room = %self.name, backlog = self.backlog.len(), "room live");
        out.emit(RoomEvent::Connected);
        let posts = std::mem::take(&mut self.backlog);
        out.emit(RoomEvent::HistoryDone { posts, initial: true });
        Ok(())
    }

    fn saw(&mut self, time: f64) {
        if time > self.last_seen {
            self.last_seen = time;
        }
    }

    fn on_post(&mut self, cmd: &Command) -> Result<(), ProtocolError> {
        let post = parse_post(cmd, PostSource::Live)?;
        self.saw(post.time);
        let provisional = match &post.id {
            PostId::Provisional(id) | PostId::Permanent(id) => id.clone(),
        };
        self.pending.insert(provisional, post);
        Ok(())
    }

    fn on_confirm(&mut self, cmd: &Command, out: &mut Outbox) -> Result<(), ProtocolError> {
        let provisional = cmd.require(0)?.to_string();
        let message_id = cmd.require(1)?.to_string();

        match self.pending.remove(&provisional) {
            Some(post) => {
                let post = post.confirmed(message_id);
                self.confirmed.insert(post.clone());
                out.emit(RoomEvent::Message { post });
            }
            None => {
                tracing::warn!(room = %self.name, %provisional, %message_id, "confirmation for unknown post");
                out.emit(RoomEvent::MessageDropped {
                    provisional_id: provisional,
                    message_id,
                });
            }
        }
        Ok(())
    }

    fn on_history(&mut self, cmd: &Command) -> Result<(), ProtocolError> {
        let post = parse_post(cmd, PostSource::History)?;
        self.saw(post.time);
        self.confirmed.insert(post.clone());
        self.backlog.push(post);
        Ok(())
    }

    fn on_user_count(&mut self, cmd: &Command, out: &mut Outbox) -> Result<(), ProtocolError> {
        let raw = cmd.require(0)?;
        let count = u32::from_str_radix(raw, 16).map_err(|_| ProtocolError::InvalidNumber {
            verb: cmd.verb.clone(),
            field: "user count",
            value: raw.to_string(),
        })?;
        self.user_count = count;
        out.emit(RoomEvent::UserCountChanged { count });
        Ok(())
    }

    fn on_banned_words(&mut self, cmd: &Command, out: &mut Outbox) -> Result<(), ProtocolError> {
        let words = |i: usize| -> Vec<String> {
            cmd.field(i)
                .unwrap_or_default()
                .split("%2C")
                .map(percent_decode)
                .filter(|w| !w.is_empty())
                .collect()
        };
        self.banned_partial = words(0);
        self.banned_exact = words(1);
        out.emit(RoomEvent::BannedWordsChanged {
            partial: self.banned_partial.clone(),
            exact: self.banned_exact.clone(),
        });
        Ok(())
    }

    fn on_participant(&mut self, cmd: &Command, out: &mut Outbox) -> Result<(), ProtocolError> {
        let kind = cmd.require(0)?;
        let text = move |i: usize| cmd.field(i).unwrap_or_default();
        let Some(name) = member_name(text(3), text(4)) else {
            // Anonymous members are only counted, never listed.
            return Ok(());
        };
        let participant = Participant {
            session_id: text(1).to_string(),
            user_id: text(2).to_string(),
            name,
            joined_at: text(6).parse().unwrap_or(0.0),
        };

        match kind {
            "0" => {
                self.participants.retain(|p| p.session_id != participant.session_id);
                out.emit(RoomEvent::MemberLeave { participant });
            }
            "1" | "2" => {
                let kind = if kind == "1" { JoinKind::Join } else { JoinKind::Login };
                self.participants.retain(|p| p.session_id != participant.session_id);
                self.participants.push(participant.clone());
                out.emit(RoomEvent::MemberJoin { participant, kind });
            }
            other => {
                tracing::debug!(room = %self.name, kind = other, "unknown participant change");
            }
        }
        Ok(())
    }

    fn on_participant_list(&mut self, cmd: &Command, skip: usize, out: &mut Outbox) -> Result<(), ProtocolError> {
        let joined = cmd.rest(skip);
        self.participants = joined
            .split(';')
            .filter_map(|entry| {
                let fields: Vec<&str> = entry.split(':').collect();
                let field = |i: usize| fields.get(i).copied().unwrap_or_default();
                Some(Participant {
                    name: member_name(field(3), field(4))?,
                    session_id: field(0).to_string(),
                    user_id: field(2).to_string(),
                    joined_at: field(1).parse().unwrap_or(0.0),
                })
            })
            .collect();
        out.emit(RoomEvent::ParticipantsUpdated {
            participants: self.participants.clone(),
        });
        Ok(())
    }

    fn on_ban_list(&mut self, cmd: &Command, out: &mut Outbox) -> Result<(), ProtocolError> {
        let joined = cmd.rest(0);
        self.bans = joined
            .split(';')
            .filter(|entry| !entry.is_empty())
            .filter_map(|entry| {
                let fields: Vec<&str> = entry.split(':').collect();
                if fields.len() < 5 {
                    tracing::debug!(room = %self.name, entry, "short ban-list entry skipped");
                    return None;
                }
                Some(BanRecord {
                    unid: fields[0].to_string(),
                    ip: fields[1].to_string(),
                    target: fields[2].to_string(),
                    time: fields[3].parse().unwrap_or(0.0),
                    moderator: fields[4].to_string(),
                })
            })
            .collect();
        out.emit(RoomEvent::BanListUpdated { bans: self.bans.clone() });
        Ok(())
    }

    fn ban_record(&self, cmd: &Command) -> Result<BanRecord, ProtocolError> {
        let unid = cmd.require(0)?.to_string();
        let mut target = cmd.field(2).unwrap_or_default().to_string();
        if target.is_empty() {
            target = self
                .confirmed
                .find_by_unid(&unid)
                .map(|p| p.author.name.clone())
                .unwrap_or_else(|| "anon".into());
        }
        Ok(BanRecord {
            unid,
            ip: cmd.field(1).unwrap_or_default().to_string(),
            target,
            moderator: cmd.field(3).unwrap_or_default().to_string(),
            time: cmd
                .field(4)
                .and_then(|t| t.parse().ok())
                .unwrap_or(self.last_seen),
        })
    }

    fn on_blocked(&mut self, cmd: &Command, out: &mut Outbox) -> Result<(), ProtocolError> {
        let record = self.ban_record(cmd)?;
        self.bans.push(record.clone());
        out.emit(RoomEvent::Ban { record });
        Ok(())
    }

    fn on_unblocked(&mut self, cmd: &Command, out: &mut Outbox) -> Result<(), ProtocolError> {
        let record = self.ban_record(cmd)?;
        self.bans.retain(|b| b.unid != record.unid);
        out.emit(RoomEvent::Unban { record });
        Ok(())
    }

    fn on_mods(&mut self, cmd: &Command, out: &mut Outbox) {
        let new = parse_mod_list(&cmd.rest(0));
        let added: Vec<String> = new
            .keys()
            .filter(|name| !self.moderators.contains_key(*name))
            .cloned()
            .collect();
        let removed: Vec<String> = self
            .moderators
            .keys()
            .filter(|name| !new.contains_key(*name))
            .cloned()
            .collect();

        self.moderators = new;
        for name in added {
            out.emit(RoomEvent::ModAdded { name });
        }
        for name in removed {
            out.emit(RoomEvent::ModRemoved { name });
        }
        out.emit(RoomEvent::ModChanged {
            moderators: self.moderator_list(),
        });
    }

    fn moderator_list(&self) -> Vec<Moderator> {
        self.moderators
            .iter()
            .map(|(name, &permissions)| Moderator {
                name: name.clone(),
                permissions,
            })
            .collect()
    }

    fn on_delete(&mut self, message_id: String, out: &mut Outbox) {
        let post = self.confirmed.remove(&message_id);
        out.emit(RoomEvent::MessageDelete { message_id, post });
    }

    fn on_premium(&mut self, cmd: &Command) -> Result<(), ProtocolError> {
        // Second field is the expiry, compared against the server clock.
        let expiry: f64 = cmd.field(1).and_then(|t| t.parse().ok()).unwrap_or(0.0);
        self.premium = expiry > self.server_time;
        tracing::debug!(room = %self.name, premium = self.premium, "premium status");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Outbound
    // -----------------------------------------------------------------------

    /// 2 for the owner, 1 for a moderator, 0 otherwise.
    pub fn permission_level(&self) -> u8 {
        let me = self.display_name.to_lowercase();
        if me.is_empty() {
            return 0;
        }
        if self.owner.to_lowercase() == me {
            OWNER_LEVEL
        } else if self.moderators.contains_key(&me) {
            MOD_LEVEL
        } else {
            0
        }
    }

    fn allowed(&self, level: u8, what: &str) -> bool {
        let ok = self.permission_level() >= level;
        if !ok {
            tracing::debug!(room = %self.name, command = what, "not permitted");
        }
        ok
    }

    /// Replaces our outgoing formatting. Font size is clamped to 9–22.
    pub fn set_formatting(&mut self, formatting: Formatting) {
        let size = formatting.font_size;
        self.formatting = formatting.with_font_size(size);
    }

    /// Carries out an application request.
    pub fn apply(&mut self, op: Operation, out: &mut Outbox) -> CommandStatus {
        match op {
            Operation::Post { text, options } => {
                let bodies = fit_body(&text, options.html, self.config.max_message_length, self.config.overflow);
                for body in bodies {
                    out.send(post_command(&body, &self.formatting, &options));
                }
                CommandStatus::Sent
            }
            Operation::RequestMoreHistory => {
                out.send(
                    Command::new("get_more")
                        .arg(self.config.history_page_size.to_string())
                        .arg(self.pages_fetched.to_string()),
                );
                CommandStatus::Sent
            }
            Operation::Flag(post) => match post.id.permanent() {
                Some(id) => {
                    out.send(Command::new("g_flag").arg(id));
                    CommandStatus::Sent
                }
                None => CommandStatus::NotFound,
            },
            Operation::Delete(post) => {
                if !self.allowed(MOD_LEVEL, "delmsg") {
                    return CommandStatus::Denied;
                }
                match post.id.permanent() {
                    Some(id) => {
                        out.send(Command::new("delmsg").arg(id));
                        CommandStatus::Sent
                    }
                    None => CommandStatus::NotFound,
                }
            }
            Operation::DeleteAll(post) => {
                if !self.allowed(MOD_LEVEL, "delallmsg") {
                    return CommandStatus::Denied;
                }
                out.send(
                    Command::new("delallmsg")
                        .arg(&post.unid)
                        .arg(&post.ip)
                        .arg(moderation_name(&post.author)),
                );
                CommandStatus::Sent
            }
            Operation::Ban(post) => {
                if !self.allowed(MOD_LEVEL, "block") {
                    return CommandStatus::Denied;
                }
                out.send(
                    Command::new("block")
                        .arg(moderation_name(&post.author))
                        .arg(&post.ip)
                        .arg(&post.unid),
                );
                CommandStatus::Sent
            }
            Operation::Unban(name) => {
                if !self.allowed(MOD_LEVEL, "removeblock") {
                    return CommandStatus::Denied;
                }
                let record = self
                    .bans
                    .iter()
                    .rev()
                    .find(|b| b.target.eq_ignore_ascii_case(&name));
                match record {
                    Some(record) => {
                        out.send(
                            Command::new("removeblock")
                                .arg(&record.unid)
                                .arg(&record.ip)
                                .arg(&record.target),
                        );
                        CommandStatus::Sent
                    }
                    None => CommandStatus::NotFound,
                }
            }
            Operation::RefreshBanList => {
                if !self.allowed(MOD_LEVEL, "blocklist") {
                    return CommandStatus::Denied;
                }
                out.send(
                    Command::new("blocklist")
                        .arg("block")
                        .arg("")
                        .arg("next")
                        .arg(BAN_LIST_PAGE.to_string()),
                );
                CommandStatus::Sent
            }
            Operation::AddMod(name) => {
                if !self.allowed(OWNER_LEVEL, "addmod") {
                    return CommandStatus::Denied;
                }
                out.send(Command::new("addmod").arg(name));
                CommandStatus::Sent
            }
            Operation::RemoveMod(name) => {
                if !self.allowed(OWNER_LEVEL, "removemod") {
                    return CommandStatus::Denied;
                }
                out.send(Command::new("removemod").arg(name));
                CommandStatus::Sent
            }
            Operation::ClearAll => {
                if !self.allowed(OWNER_LEVEL, "clearall") {
                    return CommandStatus::Denied;
                }
                out.send(Command::new("clearall"));
                CommandStatus::Sent
            }
            Operation::Logout => {
                out.send(Command::new("blogout"));
                CommandStatus::Sent
            }
        }
    }

    /// Forgets everything tied to the room's history. Used on shutdown.
    pub fn clear_history(&mut self) {
        self.confirmed.clear();
        self.backlog.clear();
        self.pending.clear();
    }

    pub fn info(&self) -> RoomInfo {
        RoomInfo {
            name: self.name.clone(),
            shard: self.shard,
            state: self.state,
            session_id: self.session_id.clone(),
            display_name: self.display_name.clone(),
            owner: self.owner.clone(),
            moderators: self.moderators.keys().cloned().collect(),
            participants: self.participants.clone(),
            user_count: self.user_count,
            bans: self.bans.clone(),
            banned_words: self
                .banned_partial
                .iter()
                .chain(&self.banned_exact)
                .cloned()
                .collect(),
            rate_limit: self.rate_limit,
            premium: self.premium,
            formatting: self.formatting.clone(),
            pages_fetched: self.pages_fetched,
            last_seen: self.last_seen,
            permission_level: self.permission_level(),
        }
    }

    #[cfg(test)]
    fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn number(cmd: &Command, index: usize, field: &'static str) -> Result<u32, ProtocolError> {
    let raw = cmd.require(index)?;
    raw.parse().map_err(|_| ProtocolError::InvalidNumber {
        verb: cmd.verb.clone(),
        field,
        value: raw.to_string(),
    })
}

/// `name,perm;name,perm` → lowercase name to permission bits. A missing
/// or unreadable permission field counts as 0.
fn parse_mod_list(raw: &str) -> BTreeMap<String, u64> {
    raw.split(';')
        .filter_map(|entry| {
            let mut fields = entry.split(',');
            let name = fields.next()?.trim().to_lowercase();
            if name.is_empty() {
                return None;
            }
            let permissions = fields.next().and_then(|p| p.trim().parse().ok()).unwrap_or(0);
            Some((name, permissions))
        })
        .collect()
}

/// A participant's display name, or `None` for an anonymous member.
/// The server writes absent names as the literal `None`.
fn member_name(name: &str, temp_name: &str) -> Option<String> {
    let present = |s: &str| !s.is_empty() && s != "None";
    if present(name) {
        Some(name.to_string())
    } else if present(temp_name) {
        Some(Author::temporary(temp_name).name)
    } else {
        None
    }
}

/// The name field moderation commands expect: registered names as-is,
/// empty for everyone else.
fn moderation_name(author: &Author) -> &str {
    match author.kind {
        AuthorKind::Registered => &author.name,
        AuthorKind::Temporary | AuthorKind::Anonymous => "",
    }
}

/// Decodes `%XX` escapes. Malformed escapes are kept literally.
fn percent_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
            if let Some(v) = hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                out.push(v);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}
