//! Page-session identifier.
//!
//! A [`SessionId`] is generated for every page load and is sent with every
//! chat request as a correlation token. The console never parses it back.

use std::fmt;

use chrono::Utc;
use rand::Rng;
use serde::Serialize;

/// Default prefix for generated identifiers.
pub const DEFAULT_SESSION_PREFIX: &str = "session_";

/// Length of the random base-36 fragment.
const FRAGMENT_LEN: usize = 9;

const BASE36: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Opaque correlation token: `<prefix><base36 fragment>_<unix millis>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Generate a fresh identifier with the given prefix.
    pub fn generate(prefix: &str) -> Self {
        let fragment = random_fragment(&mut rand::rng(), FRAGMENT_LEN);
        let millis = Utc::now().timestamp_millis();
        Self(format!("{prefix}{fragment}_{millis}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::generate(DEFAULT_SESSION_PREFIX)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn random_fragment<R: Rng + ?Sized>(rng: &mut R, len: usize) -> String {
    (0..len)
        .map(|_| char::from(BASE36[rng.random_range(0..BASE36.len())]))
        .collect()
}
