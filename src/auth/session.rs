//! OAuth handshake state.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::RngCore;
use serde::{Deserialize, Serialize};

const STATE_BYTES: usize = 32;

/// Produced by `Provider::start_session`, consumed when the identity service
/// redirects back. The caller keeps it (usually in a signed cookie) and must
/// compare `state` with the redirect's `state` parameter before exchanging.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Where to send the user's browser
    pub auth_url: String,

    /// Anti-CSRF nonce embedded in `auth_url`
    pub state: String,
}

impl Session {
    /// 256 bits from the OS RNG, URL-safe base64 without padding.
    pub fn generate_state() -> String {
        let mut bytes = [0u8; STATE_BYTES];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        URL_SAFE_NO_PAD.encode(bytes)
    }

    /// Whether `returned` is the state this session was started with.
    pub fn matches_state(&self, returned: &str) -> bool {
        !self.state.is_empty() && self.state == returned
    }
}
