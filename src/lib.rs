//! Chatstory Engine — playback core for interactive chat fiction.
//!
//! Stories are directed graphs of chat messages. A
//! [`core::playback::PlaybackSession`] walks one story's graph in response
//! to user input, accumulating a newest-first transcript, exposing branch
//! choices, and persisting progress through a pluggable
//! [`core::progress::ProgressStore`].

pub mod core;
pub mod schema;
