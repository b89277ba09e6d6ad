//! Session identity: one opaque token per engine instance.

use rand::Rng;

const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const RANDOM_LEN: usize = 9;

/// Generate a session token of the form `sess_{epoch_millis}_{9 base36 chars}`.
///
/// Uniqueness is best-effort. The token only groups events of one page load and
/// is never persisted.
pub fn generate_session_id(now_millis: i64) -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..RANDOM_LEN)
        .map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
        .collect();
    format!("sess_{now_millis}_{suffix}")
}
