//! Login credentials.
//!
//! A session logs in one of three ways, decided entirely by which parts of
//! the credential pair are present:
//!
//! ```text
//!   name  password   mode
//!   ----  --------   ---------
//!   no    -          Anonymous   (!anonNNNN)
//!   yes   no         Temporary   (#name, via blogin)
//!   yes   yes        Registered  (name, via bauth)
//! ```
//!
//! The password is held in a [`SecretString`] so it never ends up in a
//! `Debug` dump or a log line. It is exposed in exactly two places: the
//! `bauth` command and the account HTTP calls.

use chatango_protocol::Command;
use secrecy::{ExposeSecret, SecretString};

/// How a session presents itself to the room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginMode {
    Anonymous,
    Temporary,
    Registered,
}

/// A name and optional password, shared read-only by every session of a
/// manager.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    name: Option<String>,
    password: Option<SecretString>,
}

impl Credentials {
    /// No name, no password.
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// A session-only name. Shown to others with a `#` prefix.
    pub fn temporary(name: impl Into<String>) -> Self {
        Self {
            name: non_empty(name.into()),
            password: None,
        }
    }

    /// A registered account.
    pub fn registered(name: impl Into<String>, password: impl Into<String>) -> Self {
        let password: String = password.into();
        Self {
            name: non_empty(name.into()),
            password: non_empty(password).map(SecretString::from),
        }
    }

    pub fn mode(&self) -> LoginMode {
        match (&self.name, &self.password) {
            (None, _) => LoginMode::Anonymous,
            (Some(_), None) => LoginMode::Temporary,
            (Some(_), Some(_)) => LoginMode::Registered,
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn password(&self) -> Option<&SecretString> {
        self.password.as_ref()
    }

    /// Builds the `bauth` command that opens a room connection.
    ///
    /// The result contains the password; never log it.
    pub fn auth_command(&self, room: &str, session_id: &str) -> Command {
        let (name, password) = self.bauth_fields();
        Command::new("bauth")
            .arg(room)
            .arg(session_id)
            .arg(name)
            .arg(password)
    }

    /// The `name` and `password` fields of the `bauth` command.
    ///
    /// Only a registered login authenticates here. Temporary names are
    /// claimed afterwards with `blogin`.
    fn bauth_fields(&self) -> (&str, &str) {
        match (&self.name, &self.password) {
            (Some(name), Some(password)) => (name.as_str(), password.expose_secret()),
            _ => ("", ""),
        }
    }
}

fn non_empty(s: String) -> Option<String> {
    (!s.is_empty()).then_some(s)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_follows_present_fields() {
        assert_eq!(Credentials::anonymous().mode(), LoginMode::Anonymous);
        assert_eq!(Credentials::temporary("guest").mode(), LoginMode::Temporary);
        assert_eq!(
            Credentials::registered("alice", "hunter2").mode(),
            LoginMode::Registered
        );
    }

    #[test]
    fn test_empty_strings_count_as_absent() {
        assert_eq!(Credentials::temporary("").mode(), LoginMode::Anonymous);
        assert_eq!(
            Credentials::registered("alice", "").mode(),
            LoginMode::Temporary
        );
    }

    #[test]
    fn test_bauth_fields_only_for_registered() {
        assert_eq!(Credentials::temporary("guest").bauth_fields(), ("", ""));
        assert_eq!(
            Credentials::registered("alice", "hunter2").bauth_fields(),
            ("alice", "hunter2")
        );
    }

    #[test]
    fn test_auth_command_layout() {
        let cmd = Credentials::registered("alice", "pw").auth_command("room", "123");
        assert_eq!(cmd.encode(true), b"bauth:room:123:alice:pw\0");

        let cmd = Credentials::temporary("guest").auth_command("room", "123");
        assert_eq!(cmd.encode(true), b"bauth:room:123::\0");
    }

    #[test]
    fn test_debug_does_not_leak_password() {
        let creds = Credentials::registered("alice", "hunter2");
        let dump = format!("{creds:?}");
        assert!(dump.contains("alice"));
        assert!(!dump.contains("hunter2"));
    }
}
