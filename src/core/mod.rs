//! Core modules of the Voicebridge Gateway.
//!
//! - `audio`: μ-law companding and sample-rate conversion (pure functions)
//! - `live`: live-conversation session management (Gemini Live client)
//! - `tools`: structured tool-call dispatch against the backing store
//! - `session`: per-call orchestration tying the pieces together

pub mod audio;
pub mod live;
pub mod session;
pub mod tools;
