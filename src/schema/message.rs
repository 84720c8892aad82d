use serde::{Deserialize, Serialize};
use std::fmt;

use super::character::CharacterId;

/// Newtype wrapper for message ids, unique within one story graph.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub String);

impl MessageId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One branching choice offered by a message. The content format calls the
/// target field `next`, same as the linear continuation on the node itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageOption {
    pub text: String,
    #[serde(rename = "next")]
    pub target: MessageId,
}

/// One unit of narrative content: a chat message attributed to a speaker,
/// linked onward either linearly (`next`) or through branching `options`.
///
/// A node with neither is terminal and ends the story. A node with both is
/// malformed content; the engine resolves it by letting options win (see
/// [`MessageNode::can_advance`]) and validation warns on the shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageNode {
    #[serde(rename = "_id")]
    pub id: MessageId,
    #[serde(rename = "user")]
    pub speaker: CharacterId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<MessageId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<MessageOption>,
}

impl MessageNode {
    /// True if this node ends the story: no continuation, no choices.
    pub fn is_terminal(&self) -> bool {
        self.next.is_none() && self.options.is_empty()
    }

    /// True if a tap moves past this node. Options take precedence over
    /// `next`: a node offering choices never advances by tap.
    pub fn can_advance(&self) -> bool {
        self.options.is_empty() && self.next.is_some()
    }

    pub fn has_choices(&self) -> bool {
        !self.options.is_empty()
    }
}
