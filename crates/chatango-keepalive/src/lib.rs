//! Keep-alive timer for a room connection.
//!
//! Every interval the session sends an empty ping frame. The server answers
//! with an empty frame, and any other traffic proves the link is alive
//! just as well. If an entire interval passes with nothing received, the
//! connection is treated as half-open and torn down.
//!
//! # Integration
//!
//! The timer is a branch of the session actor's `tokio::select!` loop, so
//! dropping the `KeepAlive` together with the connection cancels it; no
//! ping can fire against a closed socket.
//!
//! ```ignore
//! loop {
//!     tokio::select! {
//!         frame = reader_rx.recv() => {
//!             keepalive.record_activity();
//!             /* dispatch */
//!         }
//!         decision = keepalive.wait_for_ping() => match decision {
//!             PingDecision::Ping => writer.send(PING),
//!             PingDecision::Dead => break,
//!         }
//!     }
//! }
//! ```

use std::time::Duration;

use rand::Rng;
use serde::Deserialize;
use tokio::time::{self, Instant};
use tracing::{debug, trace, warn};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Keep-alive timing.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct KeepAliveConfig {
    /// Seconds between pings. 0 disables the keep-alive entirely.
    pub interval_secs: u64,
    /// Random delay (0–max ms) added to the *first* ping so sessions
    /// joined together do not ping in lockstep.
    pub initial_jitter_ms: u64,
}

impl Default for KeepAliveConfig {
    fn default() -> Self {
        Self {
            interval_secs: 15,
            initial_jitter_ms: 500,
        }
    }
}

impl KeepAliveConfig {
    /// Interval between pings. `None` when disabled.
    pub fn interval(&self) -> Option<Duration> {
        (self.interval_secs > 0).then(|| Duration::from_secs(self.interval_secs))
    }
}

/// What the session should do when the timer fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PingDecision {
    /// The link showed activity; send a ping.
    Ping,
    /// Nothing arrived during the last interval; close the connection.
    Dead,
}

// ---------------------------------------------------------------------------
// KeepAlive
// ---------------------------------------------------------------------------

/// Liveness-flag keep-alive timer. One per open connection.
#[derive(Debug)]
pub struct KeepAlive {
    interval: Option<Duration>,
    next_ping: Option<Instant>,
    /// Set by any inbound frame, cleared by each ping.
    alive: bool,
    pings_sent: u64,
}

impl KeepAlive {
    /// Starts the timer. The first ping fires after one interval plus jitter.
    pub fn new(config: &KeepAliveConfig) -> Self {
        let interval = config.interval();
        let next_ping = interval.map(|d| {
            let jitter = if config.initial_jitter_ms > 0 {
                Duration::from_millis(rand::rng().random_range(0..config.initial_jitter_ms))
            } else {
                Duration::ZERO
            };
            Instant::now() + d + jitter
        });
        debug!(interval_secs = config.interval_secs, "keep-alive started");

        Self {
            interval,
            next_ping,
            alive: true,
            pings_sent: 0,
        }
    }

    /// Waits until the next ping is due and decides whether the link is
    /// still alive.
    ///
    /// Pends forever when the keep-alive is disabled.
    pub async fn wait_for_ping(&mut self) -> PingDecision {
        let (next, interval) = match (self.next_ping, self.interval) {
            (Some(next), Some(interval)) => (next, interval),
            _ => return std::future::pending().await,
        };

        time::sleep_until(next).await;

        if !self.alive {
            warn!(pings_sent = self.pings_sent, "no traffic since last ping");
            self.next_ping = None;
            return PingDecision::Dead;
        }

        self.alive = false;
        self.pings_sent += 1;
        self.next_ping = Some(Instant::now() + interval);
        trace!(ping = self.pings_sent, "keep-alive ping due");
        PingDecision::Ping
    }

    /// Marks the link alive. Call for every inbound frame, pongs included.
    pub fn record_activity(&mut self) {
        self.alive = true;
    }

    /// Number of pings issued so far.
    pub fn pings_sent(&self) -> u64 {
        self.pings_sent
    }

    pub fn is_enabled(&self) -> bool {
        self.interval.is_some()
    }
}
