//! Joins one or more rooms and prints their events.
//!
//! ```text
//! room-tail monachat [more rooms...]
//! room-tail --json --name lurker monachat
//! ```
//!
//! Without a name the rooms are joined anonymously. A name without a
//! password logs in under a temporary name. Ctrl-C leaves every room and
//! exits.

use chatango::prelude::*;
use clap::Parser;

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

fn describe(event: &RoomEvent) -> Option<String> {
    let line = match event {
        RoomEvent::Connected => "* connected".to_string(),
        RoomEvent::LoginFailed => "* login failed".to_string(),
        RoomEvent::Denied => "* room denied".to_string(),
        RoomEvent::HistoryDone { posts, .. } => {
            let mut lines: Vec<String> = posts.iter().map(describe_post).collect();
            lines.push(format!("* end of history ({} posts)", posts.len()));
            lines.join("\n")
        }
        RoomEvent::Message { post } => describe_post(post),
        RoomEvent::MemberJoin { participant, .. } => format!("* {} joined", participant.name),
        RoomEvent::MemberLeave { participant } => format!("* {} left", participant.name),
        RoomEvent::UserCountChanged { count } => format!("* {count} users"),
        RoomEvent::MessageDelete { message_id, .. } => format!("* message {message_id} deleted"),
        RoomEvent::FloodBan { seconds } | RoomEvent::FloodBanRepeat { seconds } => {
            format!("* flood banned for {seconds}s")
        }
        RoomEvent::Ban { record } => format!("* {} banned by {}", record.target, record.moderator),
        RoomEvent::Unban { record } => format!("* {} unbanned", record.target),
        RoomEvent::ModAdded { name } => format!("* {name} is now a moderator"),
        RoomEvent::ModRemoved { name } => format!("* {name} is no longer a moderator"),
        RoomEvent::ConnectionError { reason } => format!("* disconnected: {reason:?}"),
        _ => return None,
    };
    Some(line)
}

fn describe_post(post: &Post) -> String {
    format!("<{}> {}", post.author, post.body.replace('\n', " / "))
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(name = "room-tail")]
#[command(about = "Join chatango rooms and print what happens in them")]
struct Args {
    /// Rooms to join
    #[arg(required = true, value_name = "ROOM")]
    rooms: Vec<String>,

    /// Name to log in with (temporary unless a password is given)
    #[arg(short, long, env = "CHATANGO_NAME")]
    name: Option<String>,

    /// Password for a registered account
    #[arg(short, long, env = "CHATANGO_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Print each update as a JSON line
    #[arg(long)]
    json: bool,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, default_value = "warn")]
    log: String,
}

impl Args {
    fn credentials(&self) -> Credentials {
        let present = |v: &Option<String>| v.as_deref().filter(|s| !s.is_empty()).map(str::to_string);
        match (present(&self.name), present(&self.password)) {
            (None, _) => Credentials::anonymous(),
            (Some(name), None) => Credentials::temporary(name),
            (Some(name), Some(password)) => Credentials::registered(name, password),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    chatango::init_tracing(&args.log);

    let mut client = Client::builder().credentials(args.credentials()).build()?;
    for room in &args.rooms {
        client.manager_mut().join_room(room)?;
    }

    loop {
        tokio::select! {
            update = client.next_update() => {
                let Some(update) = update else { break };
                if args.json {
                    println!("{}", serde_json::to_string(&update)?);
                } else if let Some(line) = describe(&update.event) {
                    for l in line.lines() {
                        println!("[{}] {l}", update.room);
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupted, leaving rooms");
                break;
            }
        }
    }

    client.manager_mut().leave_all().await;
    Ok(())
}
