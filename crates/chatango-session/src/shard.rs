//! Room name → server shard resolution.
//!
//! Every room lives on exactly one server, `s{N}.chatango.com`. The server
//! computes `N` itself, so the client has to reproduce the same arithmetic
//! exactly, floating point included:
//!
//! 1. A handful of rooms are pinned to a shard ([`SPECIAL_ROOMS`]).
//! 2. Otherwise `-` and `_` become `q` and the name is read as base 36:
//!    the first five characters give `fnv`, characters 6..9 give `lnv`
//!    (at least 1000, and exactly 1000 when absent).
//! 3. `(fnv % lnv) / lnv` is a fraction in `[0, 1)`. Walking
//!    [`SHARD_WEIGHTS`] while accumulating `weight / total` picks the
//!    first shard whose running sum reaches that fraction.

use crate::SessionError;

/// Rooms whose shard is fixed rather than hashed.
pub const SPECIAL_ROOMS: &[(&str, u32)] = &[
    ("mitvcanal", 56),
    ("animeultimacom", 34),
    ("cricket365live", 21),
    ("pokemonepisodeorg", 22),
    ("animelinkz", 20),
    ("sport24lt", 56),
    ("narutowire", 10),
    ("watchanimeonn", 22),
    ("cricvid-hitcric-", 51),
    ("narutochatt", 70),
    ("leeplarp", 27),
    ("stream2watch3", 56),
    ("ttvsports", 56),
    ("ver-anime", 8),
    ("vipstand", 21),
    ("eafangames", 56),
    ("soccerjumbo", 21),
    ("myfoxdfw", 67),
    ("kiiiikiii", 21),
    ("de-livechat", 5),
    ("rgsmotrisport", 51),
    ("dbzepisodeorg", 10),
    ("watch-dragonball", 8),
    ("peliculas-flv", 69),
    ("tvanimefreak", 54),
    ("tvtvanimefreak", 54),
];

/// `(shard, weight)` pairs, in the order they are walked.
#[rustfmt::skip]
pub const SHARD_WEIGHTS: &[(u32, u32)] = &[
    (5, 75), (6, 75), (7, 75), (8, 75), (16, 75), (17, 75), (18, 75),
    (9, 95), (11, 95), (12, 95), (13, 95), (14, 95), (15, 95),
    (19, 110), (23, 110), (24, 110), (25, 110), (26, 110),
    (28, 104), (29, 104), (30, 104), (31, 104), (32, 104), (33, 104),
    (35, 101), (36, 101), (37, 101), (38, 101), (39, 101), (40, 101),
    (41, 101), (42, 101), (43, 101), (44, 101), (45, 101), (46, 101),
    (47, 101), (48, 101), (49, 101), (50, 101),
    (52, 110), (53, 110), (55, 110), (57, 110), (58, 110), (59, 110),
    (60, 110), (61, 110), (62, 110), (63, 110), (64, 110), (65, 110),
    (66, 110),
    (68, 95),
    (71, 116), (72, 116), (73, 116), (74, 116), (75, 116), (76, 116),
    (77, 116), (78, 116), (79, 116), (80, 116), (81, 116), (82, 116),
    (83, 116), (84, 116),
];

/// Computes the shard number hosting `room`.
///
/// # Errors
///
/// [`SessionError::MalformedRoomName`] if the name is empty or contains
/// anything other than ASCII letters, digits, `-` and `_`.
pub fn resolve_shard(room: &str) -> Result<u32, SessionError> {
    if let Some(&(_, shard)) = SPECIAL_ROOMS.iter().find(|(name, _)| *name == room) {
        return Ok(shard);
    }

    let malformed = || SessionError::MalformedRoomName(room.to_string());
    let group = room.replace(['_', '-'], "q");
    if group.is_empty() || !group.bytes().all(|b| b.is_ascii_alphanumeric()) {
        return Err(malformed());
    }

    let len = group.len();
    let fnv = u64::from_str_radix(&group[..len.min(5)], 36).map_err(|_| malformed())? as f64;

    let lnv = match lnv_window(len) {
        Some(range) => {
            let v = u64::from_str_radix(&group[range], 36).map_err(|_| malformed())? as f64;
            v.max(1000.0)
        }
        None => 1000.0,
    };

    let num = (fnv % lnv) / lnv;
    let total: u32 = SHARD_WEIGHTS.iter().map(|&(_, w)| w).sum();
    let mut cumulative = 0.0_f64;
    for &(shard, weight) in SHARD_WEIGHTS {
        cumulative += f64::from(weight) / f64::from(total);
        if num <= cumulative {
            return Ok(shard);
        }
    }
    // Unreachable in practice: `num < 1` and the weights sum to 1.
    Ok(0)
}

/// Characters `6 .. 6 + min(3, len - 5)` of the name, clamped to its
/// length. `None` when that window is empty.
fn lnv_window(len: usize) -> Option<std::ops::Range<usize>> {
    const START: usize = 6;
    let end = START + len.checked_sub(5)?.min(3);
    let end = end.min(len);
    (end > START).then_some(START..end)
}

/// The host name for a shard, e.g. `s12.chatango.com`.
pub fn shard_host(shard: u32, suffix: &str) -> String {
    format!("s{shard}.{suffix}")
}
