// Content generation: prompt composition and backend dispatch.
// All LLM calls go through llm_client; no direct vendor calls here.

pub mod generator;
pub mod handlers;
pub mod prompts;

pub use generator::{ContentGenerator, GenerationError};
