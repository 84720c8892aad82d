use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use thiserror::Error;

use super::character::{Character, CharacterId};
use super::message::{MessageId, MessageNode};

#[derive(Debug, Error)]
pub enum StoryParseError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON deserialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Newtype wrapper for story ids.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StoryId(pub String);

impl StoryId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Catalog metadata for one story, consumed by browsing screens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorySummary {
    pub id: StoryId,
    pub category: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub rating: f32,
    #[serde(default)]
    pub image: String,
}

/// One story's message graph: entry point plus id-to-node map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoryData {
    #[serde(rename = "firstMessage")]
    pub first_message: MessageId,
    #[serde(rename = "messageMap")]
    pub message_map: FxHashMap<MessageId, MessageNode>,
}

impl StoryData {
    pub fn node(&self, id: &MessageId) -> Option<&MessageNode> {
        self.message_map.get(id)
    }

    pub fn entry(&self) -> Option<&MessageNode> {
        self.node(&self.first_message)
    }
}

/// A complete story content file: summary metadata, character table, and
/// graphs keyed by story id (the content format nests graphs under
/// `storyData` even though files in practice carry exactly one).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoryFile {
    pub story: StorySummary,
    pub characters: FxHashMap<CharacterId, Character>,
    #[serde(rename = "storyData")]
    pub story_data: FxHashMap<StoryId, StoryData>,
}

impl StoryFile {
    /// Parse a story from its JSON content format.
    pub fn parse_json(input: &str) -> Result<StoryFile, StoryParseError> {
        Ok(serde_json::from_str(input)?)
    }

    /// Load and parse a story content file from disk.
    pub fn load_from_json(path: &Path) -> Result<StoryFile, StoryParseError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse_json(&contents)
    }

    /// The graph belonging to this file's own story id.
    pub fn graph(&self) -> Option<&StoryData> {
        self.story_data.get(&self.story.id)
    }

    /// Check graph consistency: dangling links, missing entry node, nodes
    /// with both `next` and options, unknown speakers, missing `isSelf`.
    ///
    /// All findings are tolerated at runtime; callers decide whether to
    /// warn or reject.
    pub fn validate(&self) -> Vec<ContentIssue> {
        let mut issues = Vec::new();

        let Some(graph) = self.graph() else {
            issues.push(ContentIssue::MissingGraph {
                story: self.story.id.clone(),
            });
            return issues;
        };

        if graph.entry().is_none() {
            issues.push(ContentIssue::DanglingEntry {
                id: graph.first_message.clone(),
            });
        }

        for node in graph.message_map.values() {
            if node.next.is_some() && !node.options.is_empty() {
                issues.push(ContentIssue::AmbiguousContinuation {
                    id: node.id.clone(),
                });
            }
            if let Some(ref next) = node.next {
                if graph.node(next).is_none() {
                    issues.push(ContentIssue::DanglingNext {
                        from: node.id.clone(),
                        to: next.clone(),
                    });
                }
            }
            for option in &node.options {
                if graph.node(&option.target).is_none() {
                    issues.push(ContentIssue::DanglingOption {
                        from: node.id.clone(),
                        text: option.text.clone(),
                        to: option.target.clone(),
                    });
                }
            }
            if !self.characters.contains_key(&node.speaker) {
                issues.push(ContentIssue::UnknownSpeaker {
                    id: node.id.clone(),
                    speaker: node.speaker.clone(),
                });
            }
        }

        if !self.characters.values().any(|c| c.is_self) {
            issues.push(ContentIssue::NoSelfCharacter);
        }

        issues
    }
}

/// A content problem found by [`StoryFile::validate`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ContentIssue {
    #[error("story '{story}' has no graph under storyData")]
    MissingGraph { story: StoryId },
    #[error("entry message '{id}' is not in the message map")]
    DanglingEntry { id: MessageId },
    #[error("message '{from}' links to unknown message '{to}'")]
    DanglingNext { from: MessageId, to: MessageId },
    #[error("option '{text}' on message '{from}' targets unknown message '{to}'")]
    DanglingOption {
        from: MessageId,
        text: String,
        to: MessageId,
    },
    #[error("message '{id}' has both a next link and options; options win")]
    AmbiguousContinuation { id: MessageId },
    #[error("message '{id}' names unknown speaker '{speaker}'")]
    UnknownSpeaker { id: MessageId, speaker: CharacterId },
    #[error("no character is flagged isSelf")]
    NoSelfCharacter,
}

impl ContentIssue {
    /// Findings that break traversal outright, as opposed to ones playback
    /// papers over with fallbacks.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::MissingGraph { .. }
                | Self::DanglingEntry { .. }
                | Self::DanglingNext { .. }
                | Self::DanglingOption { .. }
        )
    }
}
