//! Pronunciation practice core.
//!
//! - [`scoring`]: transcript normalization, similarity and evaluation bands.
//! - [`lesson`]: lesson JSON model and word lookup.
//! - [`platform`]: adapter traits for audio, speech recognition and the
//!   microphone permission.
//! - [`pipeline`]: the lesson state machine and its async orchestrator.
//! - [`config`]: TOML settings and platform paths.

pub mod config;
pub mod lesson;
pub mod pipeline;
pub mod platform;
pub mod scoring;
