//! Anonymous display ids and session ids.

use rand::Rng;

/// Seed used when the server supplies nothing usable.
pub const DEFAULT_ANON_SEED: &str = "3452";

/// Derives the four-digit id shown as `!anonNNNN` for an anonymous user.
///
/// `seed` is the name-colour value from the post (or the server time for
/// our own session), normalised by [`anon_seed`]. Digits 4..8 of
/// `session_id` are added digit by digit, keeping the units digit of each
/// sum. A missing or non-digit character in that window counts as 0.
pub fn anon_id(seed: &str, session_id: &str) -> String {
    let seed = anon_seed(seed);
    let sid: Vec<u32> = session_id
        .chars()
        .skip(4)
        .chain(std::iter::repeat('0'))
        .take(4)
        .map(|c| c.to_digit(10).unwrap_or(0))
        .collect();

    seed.chars()
        .zip(sid)
        .map(|(s, d)| {
            let s = s.to_digit(10).unwrap_or(0);
            char::from_digit((s + d) % 10, 10).unwrap_or('0')
        })
        .collect()
}

/// Normalises a raw seed to exactly four ASCII digits.
///
/// Longer digit strings keep their last four digits and shorter ones are
/// left-padded with zeros. Anything empty or containing a non-digit falls
/// back to [`DEFAULT_ANON_SEED`].
pub fn anon_seed(raw: &str) -> String {
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return DEFAULT_ANON_SEED.to_string();
    }
    // All ASCII, so byte offsets are char boundaries.
    let tail = &raw[raw.len().saturating_sub(4)..];
    format!("{tail:0>4}")
}

/// Generates a random 16-digit session id.
pub fn generate_session_id() -> String {
    let id: u64 = rand::rng().random_range(1_000_000_000_000_000..10_000_000_000_000_000);
    id.to_string()
}
