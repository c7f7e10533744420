//! Query-string token check for the quiz channel. Tokens are minted by the
//! account service; this side only has to verify them before the WebSocket
//! upgrade happens. Format: `<player_id>.<expiry_unix>.<signature>` with the
//! signature being base64url(SHA-256(payload + secret)).

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};

use questline_core::ids::PlayerId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("malformed token")]
    Malformed,
    #[error("token expired")]
    Expired,
    #[error("invalid token signature")]
    BadSignature,
}

pub struct TokenVerifier {
    secret: SecretString,
}

impl TokenVerifier {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: SecretString::from(secret.into()),
        }
    }

    /// Mint a token. Used by tests and the dev tooling; production tokens
    /// come from the account service sharing the same secret.
    pub fn issue(&self, player_id: &PlayerId, ttl: Duration) -> String {
        let expiry = now_secs() + ttl.as_secs();
        let payload = format!("{}.{expiry}", player_id.as_str());
        let signature = self.sign(&payload);
        format!("{payload}.{signature}")
    }

    pub fn verify(&self, token: &str) -> Result<PlayerId, AuthError> {
        let parts: Vec<&str> = token.split('.').collect();
        let [player, expiry, signature] = parts.as_slice() else {
            return Err(AuthError::Malformed);
        };

        let payload = format!("{player}.{expiry}");
        if self.sign(&payload) != *signature {
            return Err(AuthError::BadSignature);
        }

        let expiry: u64 = expiry.parse().map_err(|_| AuthError::Malformed)?;
        if expiry < now_secs() {
            return Err(AuthError::Expired);
        }

        Ok(PlayerId::from_raw(*player))
    }

    fn sign(&self, payload: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(payload.as_bytes());
        hasher.update(b".");
        hasher.update(self.secret.expose_secret().as_bytes());
        URL_SAFE_NO_PAD.encode(hasher.finalize())
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issue_verify_roundtrip() {
        let verifier = TokenVerifier::new("test-secret");
        let player_id = PlayerId::new();
        let token = verifier.issue(&player_id, Duration::from_secs(600));
        assert_eq!(verifier.verify(&token).unwrap(), player_id);
    }

    #[test]
    fn expired_token_rejected() {
        let verifier = TokenVerifier::new("test-secret");
        // Already-expired payload, correctly signed.
        let payload = "plr_x.1000";
        let token = format!("{payload}.{}", verifier.sign(payload));
        assert_eq!(verifier.verify(&token), Err(AuthError::Expired));
    }

    #[test]
    fn tampered_player_rejected() {
        let verifier = TokenVerifier::new("test-secret");
        let token = verifier.issue(&PlayerId::from_raw("plr_alice"), Duration::from_secs(600));
        let forged = token.replacen("plr_alice", "plr_mallory", 1);
        assert_eq!(verifier.verify(&forged), Err(AuthError::BadSignature));
    }

    #[test]
    fn wrong_secret_rejected() {
        let issuer = TokenVerifier::new("secret-a");
        let verifier = TokenVerifier::new("secret-b");
        let token = issuer.issue(&PlayerId::new(), Duration::from_secs(600));
        assert_eq!(verifier.verify(&token), Err(AuthError::BadSignature));
    }

    #[test]
    fn malformed_tokens_rejected() {
        let verifier = TokenVerifier::new("test-secret");
        assert_eq!(verifier.verify(""), Err(AuthError::Malformed));
        assert_eq!(verifier.verify("no-dots-here"), Err(AuthError::Malformed));
        assert_eq!(verifier.verify("a.b.c.d"), Err(AuthError::Malformed));
    }
}
