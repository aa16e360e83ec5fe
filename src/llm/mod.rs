//! Gemini-backed column suggestions (feature `gemini`).

pub mod client;
pub mod prompts;
pub mod suggester;
pub mod types;

pub use client::*;
pub use suggester::*;
pub use types::*;
