//! Session token minting and keyed fingerprinting.
//!
//! The plaintext token lives only in the client's cookie. Everything the
//! server persists is a [`Fingerprint`]: the HMAC-SHA256 of the token under a
//! named [`SigningKey`]. A [`Keyring`] holds the active key plus any retired
//! keys that are still honored, so rotating the secret does not log every
//! user out at once.

use std::env;
use std::fmt;
use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;
use time::OffsetDateTime;

type HmacSha256 = Hmac<Sha256>;

/// Random bytes per token. 32 bytes is 256 bits of entropy.
pub const TOKEN_BYTES: usize = 32;

/// Shortest secret accepted for a signing key.
pub const MIN_KEY_BYTES: usize = 32;

const MIN_TOKEN_LEN: usize = 16;
const MAX_TOKEN_LEN: usize = 256;

/// Errors raised while building signing keys.
#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    #[error("signing key id must not be empty")]
    EmptyId,
    #[error("signing key `{id}` is {len} bytes, at least {MIN_KEY_BYTES} are required")]
    TooShort { id: String, len: usize },
    #[error("signing key `{id}` is not valid hex: {source}")]
    Hex {
        id: String,
        #[source]
        source: hex::FromHexError,
    },
    #[error("environment variable `{var}`: {reason}")]
    Env { var: &'static str, reason: String },
}

/// Mints a new plaintext session token.
///
/// The result is unpadded URL-safe base64 and is the only copy of the secret.
/// Never log it.
pub fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Cheap syntactic check applied before any token touches a store.
pub fn is_well_formed(token: &str) -> bool {
    (MIN_TOKEN_LEN..=MAX_TOKEN_LEN).contains(&token.len())
        && token
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

/// The storage form of a token: which key produced it, and the digest.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint {
    key_id: String,
    digest: String,
}

impl Fingerprint {
    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// Lowercase hex HMAC-SHA256, 64 characters.
    pub fn digest(&self) -> &str {
        &self.digest
    }

    pub(crate) fn into_digest(self) -> String {
        self.digest
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.digest)
    }
}

/// A named HMAC key.
#[derive(Clone)]
pub struct SigningKey {
    id: String,
    mac: HmacSha256,
    honored_until: Option<OffsetDateTime>,
}

impl SigningKey {
    pub fn new(id: impl Into<String>, secret: impl AsRef<[u8]>) -> Result<Self, KeyError> {
        let id = id.into();
        let secret = secret.as_ref();
        if id.is_empty() {
            return Err(KeyError::EmptyId);
        }
        if secret.len() < MIN_KEY_BYTES {
            return Err(KeyError::TooShort {
                id,
                len: secret.len(),
            });
        }
        let mac = HmacSha256::new_from_slice(secret).map_err(|_| KeyError::TooShort {
            id: id.clone(),
            len: secret.len(),
        })?;
        Ok(Self {
            id,
            mac,
            honored_until: None,
        })
    }

    pub fn from_hex(id: impl Into<String>, secret_hex: &str) -> Result<Self, KeyError> {
        let id = id.into();
        let secret = hex::decode(secret_hex.trim()).map_err(|source| KeyError::Hex {
            id: id.clone(),
            source,
        })?;
        Self::new(id, secret)
    }

    /// Limits how long a retired key keeps validating old sessions.
    /// Ignored on the active key.
    pub fn honored_until(mut self, until: OffsetDateTime) -> Self {
        self.honored_until = Some(until);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    fn is_honored_at(&self, now: OffsetDateTime) -> bool {
        self.honored_until.is_none_or(|until| now < until)
    }

    fn fingerprint(&self, token: &str) -> Fingerprint {
        let mut mac = self.mac.clone();
        mac.update(token.as_bytes());
        Fingerprint {
            key_id: self.id.clone(),
            digest: hex::encode(mac.finalize().into_bytes()),
        }
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey")
            .field("id", &self.id)
            .field("secret", &"<redacted>")
            .field("honored_until", &self.honored_until)
            .finish()
    }
}

/// The active signing key and the retired keys still accepted for lookups.
#[derive(Debug, Clone)]
pub struct Keyring {
    active: SigningKey,
    retired: Vec<SigningKey>,
}

impl Keyring {
    pub fn new(active: SigningKey) -> Self {
        Self {
            active,
            retired: Vec::new(),
        }
    }

    pub fn with_retired(mut self, key: SigningKey) -> Self {
        self.retired.push(key);
        self
    }

    /// Builds a keyring from `SESSION_KEY_ID`, `SESSION_KEY` (hex) and the
    /// optional `SESSION_RETIRED_KEYS`, a comma separated list of
    /// `id:hexsecret[:unix_until]` entries.
    pub fn from_env() -> Result<Self, KeyError> {
        let id = required_var("SESSION_KEY_ID")?;
        let secret = required_var("SESSION_KEY")?;
        let mut keyring = Self::new(SigningKey::from_hex(id, &secret)?);

        if let Ok(retired) = env::var("SESSION_RETIRED_KEYS") {
            for entry in retired.split(',').map(str::trim).filter(|e| !e.is_empty()) {
                keyring = keyring.with_retired(parse_retired(entry)?);
            }
        }

        Ok(keyring)
    }

    pub fn active(&self) -> &SigningKey {
        &self.active
    }
}

fn required_var(var: &'static str) -> Result<String, KeyError> {
    env::var(var).map_err(|e| KeyError::Env {
        var,
        reason: e.to_string(),
    })
}

fn parse_retired(entry: &str) -> Result<SigningKey, KeyError> {
    let bad = |reason: &str| KeyError::Env {
        var: "SESSION_RETIRED_KEYS",
        reason: format!("`{entry}`: {reason}"),
    };

    let mut parts = entry.splitn(3, ':');
    let id = parts.next().unwrap_or_default();
    let secret = parts.next().ok_or_else(|| bad("expected id:hexsecret"))?;
    let key = SigningKey::from_hex(id, secret)?;

    match parts.next() {
        Some(until) => {
            let secs: i64 = until.parse().map_err(|_| bad("invalid unix timestamp"))?;
            let until = OffsetDateTime::from_unix_timestamp(secs)
                .map_err(|_| bad("unix timestamp out of range"))?;
            Ok(key.honored_until(until))
        }
        None => Ok(key),
    }
}

/// Keyed one-way transform from plaintext token to [`Fingerprint`].
#[derive(Debug, Clone)]
pub struct TokenHasher {
    keyring: Arc<Keyring>,
}

impl TokenHasher {
    pub fn new(keyring: Keyring) -> Self {
        Self {
            keyring: Arc::new(keyring),
        }
    }

    /// Fingerprint under the active key. Used for every write.
    pub fn hash(&self, token: &str) -> Fingerprint {
        self.keyring.active.fingerprint(token)
    }

    /// Every fingerprint the token may have been stored under at `now`:
    /// the active key first, then each retired key still in its grace window.
    pub fn candidates(&self, token: &str, now: OffsetDateTime) -> Vec<Fingerprint> {
        std::iter::once(&self.keyring.active)
            .chain(self.keyring.retired.iter().filter(|k| k.is_honored_at(now)))
            .map(|key| key.fingerprint(token))
            .collect()
    }

    pub fn active_key_id(&self) -> &str {
        self.keyring.active.id()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use time::Duration;

    use super::*;

    fn key(id: &str, fill: u8) -> SigningKey {
        SigningKey::new(id, [fill; 32]).unwrap()
    }

    #[test]
    fn generated_tokens_are_url_safe_and_long_enough() {
        let token = generate_token();
        assert_eq!(token.len(), 43);
        assert!(is_well_formed(&token));
    }

    #[test]
    fn hashing_is_deterministic() {
        let hasher = TokenHasher::new(Keyring::new(key("k1", 7)));
        let token = generate_token();

        assert_eq!(hasher.hash(&token), hasher.hash(&token));
        assert_eq!(hasher.hash(&token).digest().len(), 64);
        assert_eq!(hasher.hash(&token).key_id(), "k1");
    }

    #[test]
    fn distinct_tokens_have_distinct_fingerprints() {
        let hasher = TokenHasher::new(Keyring::new(key("k1", 7)));
        let digests: HashSet<String> = (0..2_000)
            .map(|_| hasher.hash(&generate_token()).into_digest())
            .collect();
        assert_eq!(digests.len(), 2_000);
    }

    #[test]
    fn fingerprint_depends_on_key() {
        let token = generate_token();
        let a = TokenHasher::new(Keyring::new(key("k1", 1)));
        let b = TokenHasher::new(Keyring::new(key("k1", 2)));
        assert_ne!(a.hash(&token).digest(), b.hash(&token).digest());
    }

    #[test]
    fn candidates_list_active_then_honored_retired_keys() {
        let now = OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap();
        let keyring = Keyring::new(key("new", 1))
            .with_retired(key("old", 2).honored_until(now + Duration::hours(1)))
            .with_retired(key("ancient", 3).honored_until(now));
        let hasher = TokenHasher::new(keyring);

        let ids: Vec<String> = hasher
            .candidates("some-session-token-value", now)
            .iter()
            .map(|f| f.key_id().to_owned())
            .collect();

        assert_eq!(ids, ["new", "old"]);
    }

    #[test]
    fn short_or_unnamed_keys_are_rejected() {
        assert!(matches!(
            SigningKey::new("k", [0u8; 16]),
            Err(KeyError::TooShort { len: 16, .. })
        ));
        assert!(matches!(SigningKey::new("", [0u8; 32]), Err(KeyError::EmptyId)));
        assert!(matches!(
            SigningKey::from_hex("k", "zz"),
            Err(KeyError::Hex { .. })
        ));
    }

    #[test]
    fn retired_entry_parses_grace_deadline() {
        let secret = "ab".repeat(32);
        let parsed = parse_retired(&format!("old:{secret}:1700000000")).unwrap();
        assert_eq!(parsed.id(), "old");
        assert_eq!(
            parsed.honored_until,
            Some(OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap())
        );
        assert!(parse_retired("old").is_err());
    }

    #[test]
    fn malformed_tokens_are_rejected() {
        assert!(!is_well_formed(""));
        assert!(!is_well_formed("short"));
        assert!(!is_well_formed("has spaces in the token value"));
        assert!(!is_well_formed("padded+base64/token=value=="));
        assert!(!is_well_formed(&"a".repeat(257)));
        assert!(is_well_formed("abcdefghijklmnop"));
    }

    #[test]
    fn debug_output_hides_secret() {
        let rendered = format!("{:?}", key("k1", 0xAB));
        assert!(rendered.contains("<redacted>"));
        assert!(!rendered.to_lowercase().contains("abab"));
    }
}
