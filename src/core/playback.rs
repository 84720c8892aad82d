/// Playback engine — the traversal state machine over one story's graph.
///
/// Wires together the story catalog, the progress store, and the
/// presentation layer's two intents: tap-to-advance and pick-an-option.
use log::{debug, error, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::catalog::StoryCatalog;
use crate::core::progress::{progress_key, ProgressStore};
use crate::schema::character::{Character, CharacterId};
use crate::schema::message::{MessageId, MessageNode, MessageOption};
use crate::schema::story::{StoryData, StoryFile, StoryId, StorySummary};

#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("story not found: {0}")]
    StoryNotFound(StoryId),
    #[error("message not found: {0}")]
    NodeNotFound(MessageId),
    #[error("option targeting '{0}' is not offered by the current message")]
    InvalidChoice(MessageId),
}

/// One rendered transcript row. The speaker's [`Character`] is embedded by
/// value so a persisted transcript replays without the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayEntry {
    #[serde(rename = "_id")]
    pub id: MessageId,
    #[serde(rename = "user")]
    pub speaker: CharacterId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    pub character: Character,
}

/// The whole mutable state of one playback session. Serializes directly as
/// the persisted snapshot, so the in-memory and on-disk representations
/// never diverge.
///
/// `transcript` is newest-first: index 0 is the most recently shown
/// message, matching an inverted chat list. It is an append-only log;
/// graphs may contain cycles, so no cycle detection is attempted and the
/// transcript grows without bound if content loops.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybackState {
    #[serde(rename = "currentMessageId")]
    pub current: Option<MessageId>,
    #[serde(rename = "displayedMessages")]
    pub transcript: Vec<DisplayEntry>,
    #[serde(rename = "storyEnded")]
    pub ended: bool,
}

/// What a mutation did, for the presentation layer to react to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The transcript grew and the story continues.
    Advanced,
    /// The story reached its end in this call (the transcript may or may
    /// not have grown; check the session).
    Ended,
    /// The current message offers choices; a tap does nothing.
    ChoicesPending,
    /// Nothing to do: the story had already ended. No snapshot is written.
    Idle,
}

/// A playback session for one story.
///
/// Single-threaded and input-driven: every mutation is one `&mut self`
/// call, applied as an indivisible state update before the snapshot write
/// is attempted. The snapshot write is best-effort; a failure is logged
/// and playback continues from memory.
///
/// Presentation contract: once [`ended`](Self::ended) is true, a screen
/// tap means "leave the session", not a call into this type; and taps
/// during an active scroll gesture must be suppressed by the UI so a drag
/// is never misread as an advance.
pub struct PlaybackSession<'a, S: ProgressStore> {
    story: &'a StoryFile,
    graph: &'a StoryData,
    store: S,
    key: String,
    state: PlaybackState,
}

impl<'a, S: ProgressStore> PlaybackSession<'a, S> {
    /// Open a session for `story_id`, restoring saved progress when a
    /// well-formed snapshot exists and starting fresh otherwise.
    ///
    /// An unknown story id fails before the store is touched. Unreadable
    /// or malformed snapshots are logged and discarded, never surfaced.
    /// Nothing is written until the first mutation.
    pub fn load(
        catalog: &'a StoryCatalog,
        store: S,
        story_id: &StoryId,
    ) -> Result<Self, PlaybackError> {
        let story = catalog
            .get_by_id(story_id)
            .ok_or_else(|| PlaybackError::StoryNotFound(story_id.clone()))?;
        let graph = story
            .graph()
            .ok_or_else(|| PlaybackError::StoryNotFound(story_id.clone()))?;

        let key = progress_key(story_id);
        let state = match Self::restore(&store, &key) {
            Some(state) => state,
            None => Self::fresh(story, graph)?,
        };

        Ok(Self {
            story,
            graph,
            store,
            key,
            state,
        })
    }

    fn restore(store: &S, key: &str) -> Option<PlaybackState> {
        let raw = match store.get(key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!("failed to read saved progress under '{key}': {e}");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(state) => {
                debug!("restored progress under '{key}'");
                Some(state)
            }
            Err(e) => {
                warn!("discarding malformed progress snapshot under '{key}': {e}");
                None
            }
        }
    }

    fn fresh(story: &StoryFile, graph: &StoryData) -> Result<PlaybackState, PlaybackError> {
        let entry = graph
            .entry()
            .ok_or_else(|| PlaybackError::NodeNotFound(graph.first_message.clone()))?;
        Ok(PlaybackState {
            current: Some(graph.first_message.clone()),
            transcript: vec![display_entry(story, entry)],
            ended: entry.is_terminal(),
        })
    }

    /// Tap-to-continue. Moves to the current message's `next`, prepends it
    /// to the transcript, and recomputes `ended` in the same transition.
    ///
    /// No-op once ended ([`Outcome::Idle`], no write) and while choices are
    /// pending ([`Outcome::ChoicesPending`]); a tap on a terminal message
    /// settles `ended` and writes the final snapshot once.
    pub fn advance(&mut self) -> Result<Outcome, PlaybackError> {
        if self.state.ended {
            return Ok(Outcome::Idle);
        }

        let graph = self.graph;
        let Some(current_id) = self.state.current.clone() else {
            // A restored snapshot can legitimately hold no current message;
            // there is nowhere to go, so the story is over.
            self.state.ended = true;
            self.persist();
            return Ok(Outcome::Ended);
        };
        let current = graph
            .node(&current_id)
            .ok_or(PlaybackError::NodeNotFound(current_id))?;

        if current.has_choices() {
            return Ok(Outcome::ChoicesPending);
        }
        let Some(next_id) = current.next.clone() else {
            self.state.ended = true;
            self.persist();
            return Ok(Outcome::Ended);
        };
        let next = graph
            .node(&next_id)
            .ok_or_else(|| PlaybackError::NodeNotFound(next_id.clone()))?;

        let entry = display_entry(self.story, next);
        let ended = next.is_terminal();
        self.state.transcript.insert(0, entry);
        self.state.current = Some(next_id);
        self.state.ended = ended;
        self.persist();

        Ok(if ended { Outcome::Ended } else { Outcome::Advanced })
    }

    /// Resolve a branching choice. The option must be one of the current
    /// message's options, validated by target id.
    ///
    /// Prepends exactly two transcript rows as one atomic update: the
    /// target message, then the player's choice echo (the option text,
    /// spoken by the `isSelf` character). A story with no `isSelf`
    /// character still gets an echo from a fallback player identity.
    pub fn choose(&mut self, option: &MessageOption) -> Result<Outcome, PlaybackError> {
        if self.state.ended {
            return Ok(Outcome::Idle);
        }

        let graph = self.graph;
        let offered = self
            .state
            .current
            .as_ref()
            .and_then(|id| graph.node(id))
            .map(|node| node.options.iter().any(|o| o.target == option.target))
            .unwrap_or(false);
        if !offered {
            return Err(PlaybackError::InvalidChoice(option.target.clone()));
        }
        let target = graph
            .node(&option.target)
            .ok_or_else(|| PlaybackError::NodeNotFound(option.target.clone()))?;

        let node_entry = display_entry(self.story, target);
        let echo = self.choice_echo(option);
        let ended = target.is_terminal();
        // Both rows land in one splice so no reader of the transcript can
        // observe a half-applied choice.
        self.state.transcript.splice(0..0, [node_entry, echo]);
        self.state.current = Some(option.target.clone());
        self.state.ended = ended;
        self.persist();

        Ok(if ended { Outcome::Ended } else { Outcome::Advanced })
    }

    fn choice_echo(&self, option: &MessageOption) -> DisplayEntry {
        let (speaker, character) = self.self_speaker();
        DisplayEntry {
            id: MessageId::new(format!("choice-{}", option.target)),
            speaker,
            text: Some(option.text.clone()),
            image: None,
            character,
        }
    }

    fn self_speaker(&self) -> (CharacterId, Character) {
        if let Some((key, ch)) = self.story.characters.iter().find(|(_, c)| c.is_self) {
            return (key.clone(), ch.clone());
        }
        // Content without an isSelf flag: fall back to the conventional
        // "0" key, or a synthesized player identity if even that is absent.
        let fallback = CharacterId::new("0");
        let character = self
            .story
            .characters
            .get(&fallback)
            .cloned()
            .unwrap_or_else(Character::fallback_self);
        (fallback, character)
    }

    /// Best-effort snapshot write. In-memory state is already committed;
    /// a failed write only widens the window lost on process death.
    fn persist(&mut self) {
        let json = match serde_json::to_string(&self.state) {
            Ok(json) => json,
            Err(e) => {
                error!(
                    "failed to serialize progress for '{}': {e}",
                    self.story.story.id
                );
                return;
            }
        };
        if let Err(e) = self.store.set(&self.key, &json) {
            error!("failed to save progress for '{}': {e}", self.story.story.id);
        }
    }

    pub fn state(&self) -> &PlaybackState {
        &self.state
    }

    /// The visible transcript, newest-first.
    pub fn transcript(&self) -> &[DisplayEntry] {
        &self.state.transcript
    }

    pub fn ended(&self) -> bool {
        self.state.ended
    }

    /// The choices currently offered to the player. Empty once ended.
    pub fn current_options(&self) -> &[MessageOption] {
        if self.state.ended {
            return &[];
        }
        self.state
            .current
            .as_ref()
            .and_then(|id| self.graph.node(id))
            .map(|node| node.options.as_slice())
            .unwrap_or(&[])
    }

    /// Whether a tap would move the story forward right now.
    pub fn can_advance(&self) -> bool {
        !self.state.ended
            && self
                .state
                .current
                .as_ref()
                .and_then(|id| self.graph.node(id))
                .map(MessageNode::can_advance)
                .unwrap_or(false)
    }

    pub fn summary(&self) -> &StorySummary {
        &self.story.story
    }

    pub fn story(&self) -> &StoryFile {
        self.story
    }

    /// Hand the store back when the session ends (screen closed).
    pub fn into_store(self) -> S {
        self.store
    }
}

fn display_entry(story: &StoryFile, node: &MessageNode) -> DisplayEntry {
    let character = story
        .characters
        .get(&node.speaker)
        .cloned()
        .unwrap_or_else(Character::unknown);
    DisplayEntry {
        id: node.id.clone(),
        speaker: node.speaker.clone(),
        text: node.text.clone(),
        image: node.image.clone(),
        character,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::progress::MemoryStore;

    fn linear_story() -> StoryCatalog {
        let story = StoryFile::parse_json(
            r#"{
                "story": {
                    "id": "s1", "category": "Horror", "title": "Linear",
                    "rating": 4.0
                },
                "characters": {
                    "0": { "name": "Me", "isSelf": true },
                    "1": { "name": "Caller" }
                },
                "storyData": {
                    "s1": {
                        "firstMessage": "m1",
                        "messageMap": {
                            "m1": { "_id": "m1", "user": 1, "text": "one", "next": "m2" },
                            "m2": { "_id": "m2", "user": 1, "text": "two" }
                        }
                    }
                }
            }"#,
        )
        .unwrap();
        let mut catalog = StoryCatalog::new();
        catalog.insert(story);
        catalog
    }

    fn branching_story() -> StoryCatalog {
        let story = StoryFile::parse_json(
            r#"{
                "story": {
                    "id": "s2", "category": "Love", "title": "Branching",
                    "rating": 3.5
                },
                "characters": {
                    "0": { "name": "Me", "isSelf": true },
                    "1": { "name": "Alex" }
                },
                "storyData": {
                    "s2": {
                        "firstMessage": "m1",
                        "messageMap": {
                            "m1": {
                                "_id": "m1", "user": 1, "text": "Coffee?",
                                "options": [
                                    { "text": "Yes", "next": "m2" },
                                    { "text": "No", "next": "m3" }
                                ]
                            },
                            "m2": { "_id": "m2", "user": 1, "text": "Great!" },
                            "m3": { "_id": "m3", "user": 1, "text": "Oh." }
                        }
                    }
                }
            }"#,
        )
        .unwrap();
        let mut catalog = StoryCatalog::new();
        catalog.insert(story);
        catalog
    }

    #[test]
    fn fresh_load_shows_entry_message() {
        let catalog = linear_story();
        let session =
            PlaybackSession::load(&catalog, MemoryStore::new(), &StoryId::new("s1")).unwrap();

        assert_eq!(session.transcript().len(), 1);
        assert_eq!(session.transcript()[0].id, MessageId::new("m1"));
        assert_eq!(session.transcript()[0].character.name, "Caller");
        assert!(!session.ended());
        assert!(session.can_advance());
    }

    #[test]
    fn load_does_not_write() {
        let catalog = linear_story();
        let session =
            PlaybackSession::load(&catalog, MemoryStore::new(), &StoryId::new("s1")).unwrap();
        let store = session.into_store();
        assert_eq!(store.get("story-progress-s1").unwrap(), None);
    }

    #[test]
    fn unknown_story_is_not_found() {
        let catalog = linear_story();
        let result = PlaybackSession::load(&catalog, MemoryStore::new(), &StoryId::new("nope"));
        assert!(matches!(result, Err(PlaybackError::StoryNotFound(_))));
    }

    #[test]
    fn advance_prepends_and_detects_end() {
        let catalog = linear_story();
        let mut session =
            PlaybackSession::load(&catalog, MemoryStore::new(), &StoryId::new("s1")).unwrap();

        let outcome = session.advance().unwrap();
        assert_eq!(outcome, Outcome::Ended); // m2 is terminal
        assert_eq!(session.transcript().len(), 2);
        assert_eq!(session.transcript()[0].id, MessageId::new("m2"));
        assert_eq!(session.transcript()[1].id, MessageId::new("m1"));
        assert_eq!(session.state().current, Some(MessageId::new("m2")));
        assert!(session.ended());
    }

    #[test]
    fn advance_after_end_is_idle_and_writes_nothing() {
        let catalog = linear_story();
        let mut session =
            PlaybackSession::load(&catalog, MemoryStore::new(), &StoryId::new("s1")).unwrap();
        session.advance().unwrap();
        let saved = session.store.get("story-progress-s1").unwrap();

        for _ in 0..3 {
            assert_eq!(session.advance().unwrap(), Outcome::Idle);
        }
        assert_eq!(session.transcript().len(), 2);
        assert_eq!(session.store.get("story-progress-s1").unwrap(), saved);
    }

    #[test]
    fn advance_with_pending_choices_is_a_no_op() {
        let catalog = branching_story();
        let mut session =
            PlaybackSession::load(&catalog, MemoryStore::new(), &StoryId::new("s2")).unwrap();

        assert_eq!(session.advance().unwrap(), Outcome::ChoicesPending);
        assert_eq!(session.transcript().len(), 1);
        assert!(!session.can_advance());
        assert_eq!(session.current_options().len(), 2);
    }

    #[test]
    fn choose_prepends_target_then_echo() {
        let catalog = branching_story();
        let mut session =
            PlaybackSession::load(&catalog, MemoryStore::new(), &StoryId::new("s2")).unwrap();

        let yes = session.current_options()[0].clone();
        assert_eq!(yes.text, "Yes");
        let outcome = session.choose(&yes).unwrap();
        assert_eq!(outcome, Outcome::Ended); // m2 is terminal

        let transcript = session.transcript();
        assert_eq!(transcript.len(), 3);
        assert_eq!(transcript[0].id, MessageId::new("m2"));
        assert_eq!(transcript[1].id, MessageId::new("choice-m2"));
        assert_eq!(transcript[1].text.as_deref(), Some("Yes"));
        assert!(transcript[1].character.is_self);
        assert_eq!(transcript[2].id, MessageId::new("m1"));
        assert_eq!(session.state().current, Some(MessageId::new("m2")));
    }

    #[test]
    fn choose_rejects_options_not_offered() {
        let catalog = branching_story();
        let mut session =
            PlaybackSession::load(&catalog, MemoryStore::new(), &StoryId::new("s2")).unwrap();

        let forged = MessageOption {
            text: "Cheat".to_string(),
            target: MessageId::new("m99"),
        };
        assert!(matches!(
            session.choose(&forged),
            Err(PlaybackError::InvalidChoice(_))
        ));
        assert_eq!(session.transcript().len(), 1);
    }

    #[test]
    fn choice_echo_falls_back_without_self_character() {
        let story = StoryFile::parse_json(
            r#"{
                "story": {
                    "id": "s3", "category": "Comedy", "title": "No Self",
                    "rating": 2.0
                },
                "characters": { "1": { "name": "Bot" } },
                "storyData": {
                    "s3": {
                        "firstMessage": "m1",
                        "messageMap": {
                            "m1": {
                                "_id": "m1", "user": 1, "text": "Pick",
                                "options": [ { "text": "Go", "next": "m2" } ]
                            },
                            "m2": { "_id": "m2", "user": 1, "text": "Done" }
                        }
                    }
                }
            }"#,
        )
        .unwrap();
        let mut catalog = StoryCatalog::new();
        catalog.insert(story);

        let mut session =
            PlaybackSession::load(&catalog, MemoryStore::new(), &StoryId::new("s3")).unwrap();
        let go = session.current_options()[0].clone();
        session.choose(&go).unwrap();

        let echo = &session.transcript()[1];
        assert_eq!(echo.speaker, CharacterId::new("0"));
        assert_eq!(echo.character.name, "You");
        assert!(echo.character.is_self);
    }

    #[test]
    fn snapshot_state_round_trips() {
        let catalog = linear_story();
        let mut session =
            PlaybackSession::load(&catalog, MemoryStore::new(), &StoryId::new("s1")).unwrap();
        session.advance().unwrap();

        let json = serde_json::to_string(session.state()).unwrap();
        assert!(json.contains(r#""currentMessageId":"m2""#));
        assert!(json.contains(r#""storyEnded":true"#));
        let restored: PlaybackState = serde_json::from_str(&json).unwrap();
        assert_eq!(&restored, session.state());
    }

    #[test]
    fn restores_persisted_progress() {
        let catalog = linear_story();
        let id = StoryId::new("s1");

        let mut session = PlaybackSession::load(&catalog, MemoryStore::new(), &id).unwrap();
        session.advance().unwrap();
        let expected = session.state().clone();
        let store = session.into_store();

        let resumed = PlaybackSession::load(&catalog, store, &id).unwrap();
        assert_eq!(resumed.state(), &expected);
        assert!(resumed.ended());
    }

    #[test]
    fn malformed_snapshot_falls_back_to_fresh() {
        let catalog = linear_story();
        let id = StoryId::new("s1");
        let mut store = MemoryStore::new();
        store.set("story-progress-s1", "{not json").unwrap();

        let session = PlaybackSession::load(&catalog, store, &id).unwrap();
        assert_eq!(session.transcript().len(), 1);
        assert_eq!(session.transcript()[0].id, MessageId::new("m1"));
        assert!(!session.ended());
    }

    #[test]
    fn entry_terminal_story_starts_ended() {
        let story = StoryFile::parse_json(
            r#"{
                "story": {
                    "id": "s4", "category": "Horror", "title": "One Shot",
                    "rating": 1.0
                },
                "characters": { "0": { "name": "Me", "isSelf": true } },
                "storyData": {
                    "s4": {
                        "firstMessage": "m1",
                        "messageMap": {
                            "m1": { "_id": "m1", "user": "0", "text": "The end." }
                        }
                    }
                }
            }"#,
        )
        .unwrap();
        let mut catalog = StoryCatalog::new();
        catalog.insert(story);

        let session =
            PlaybackSession::load(&catalog, MemoryStore::new(), &StoryId::new("s4")).unwrap();
        assert!(session.ended());
        assert!(session.current_options().is_empty());
        assert!(!session.can_advance());
    }
}
