use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Key into a story's character table.
///
/// Story content files are inconsistent about speaker keys: some use
/// strings, others bare numbers (`"user": 0`). Both deserialize to the
/// string form so lookups against the character map always agree.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct CharacterId(pub String);

impl CharacterId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CharacterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for CharacterId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct KeyVisitor;

        impl Visitor<'_> for KeyVisitor {
            type Value = CharacterId;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a character key (string or integer)")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<CharacterId, E> {
                Ok(CharacterId(v.to_string()))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<CharacterId, E> {
                Ok(CharacterId(v.to_string()))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<CharacterId, E> {
                Ok(CharacterId(v.to_string()))
            }
        }

        deserializer.deserialize_any(KeyVisitor)
    }
}

/// A speaker in a story. At most one character per story should carry
/// `is_self = true`; that character is the player's own identity and its
/// messages render as outgoing chat bubbles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Character {
    pub name: String,
    #[serde(rename = "isSelf", default)]
    pub is_self: bool,
}

impl Character {
    /// Stand-in for a speaker key with no entry in the character table.
    /// Content validation flags the key; playback still renders the message.
    pub fn unknown() -> Self {
        Self {
            name: "Unknown".to_string(),
            is_self: false,
        }
    }

    /// Stand-in player identity for stories that never flag a character
    /// as `isSelf`. Choice echoes must never fail for that reason alone.
    pub fn fallback_self() -> Self {
        Self {
            name: "You".to_string(),
            is_self: true,
        }
    }
}
