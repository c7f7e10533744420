use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

macro_rules! branded_id {
    ($name:ident, $prefix:expr) => {
        #[derive(Clone, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new() -> Self {
                Self(format!("{}_{}", $prefix, Uuid::now_v7()))
            }

            pub fn from_raw(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $name {
            type Err = std::convert::Infallible;
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(s.to_owned()))
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

branded_id!(PlayerId, "plr");
branded_id!(SessionId, "sess");
branded_id!(QuestionId, "q");
branded_id!(TaskId, "task");

/// Fully-qualified session address: (namespace, player, session).
/// The namespace keeps quiz sessions separate from any other consumer of the
/// same store process.
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct SessionKey {
    pub namespace: String,
    pub player_id: PlayerId,
    pub session_id: SessionId,
}

impl SessionKey {
    pub fn new(namespace: impl Into<String>, player_id: PlayerId, session_id: SessionId) -> Self {
        Self {
            namespace: namespace.into(),
            player_id,
            session_id,
        }
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}#{}", self.namespace, self.player_id, self.session_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn player_id_has_prefix() {
        let id = PlayerId::new();
        assert!(id.as_str().starts_with("plr_"), "got: {id}");
    }

    #[test]
    fn session_id_has_prefix() {
        let id = SessionId::new();
        assert!(id.as_str().starts_with("sess_"), "got: {id}");
    }

    #[test]
    fn question_id_has_prefix() {
        let id = QuestionId::new();
        assert!(id.as_str().starts_with("q_"), "got: {id}");
    }

    #[test]
    fn task_id_has_prefix() {
        let id = TaskId::new();
        assert!(id.as_str().starts_with("task_"), "got: {id}");
    }

    #[test]
    fn ids_are_unique() {
        let a = SessionId::new();
        let b = SessionId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn display_and_from_str_roundtrip() {
        let id = PlayerId::new();
        let s = id.to_string();
        let parsed: PlayerId = s.parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn serde_roundtrip() {
        let id = SessionId::new();
        let json = serde_json::to_string(&id).unwrap();
        let parsed: SessionId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn from_raw_preserves_value() {
        let id = SessionId::from_raw("custom-session-7");
        assert_eq!(id.as_str(), "custom-session-7");
    }

    #[test]
    fn session_key_display() {
        let key = SessionKey::new(
            "questline",
            PlayerId::from_raw("plr_a"),
            SessionId::from_raw("sess_b"),
        );
        assert_eq!(key.to_string(), "questline#plr_a#sess_b");
    }

    #[test]
    fn session_keys_differ_by_component() {
        let player = PlayerId::from_raw("plr_a");
        let a = SessionKey::new("questline", player.clone(), SessionId::from_raw("sess_1"));
        let b = SessionKey::new("questline", player.clone(), SessionId::from_raw("sess_2"));
        let c = SessionKey::new("other", player, SessionId::from_raw("sess_1"));
        assert_ne!(a, b);
        assert_ne!(a, c);
    }
}
