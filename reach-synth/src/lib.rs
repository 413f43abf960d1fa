//! Generative helpers for Reach: natural-language rule synthesis and
//! campaign message suggestions, both backed by a [`TextGenerator`].

mod client;
mod composer;
mod error;
mod extract;
mod flight;
mod prompt;
mod retry;
mod synthesizer;

pub use client::{
    GeminiClient, GeminiConfig, GenerationConfig, TextGenerator, DEFAULT_GEMINI_BASE_URL,
    DEFAULT_GEMINI_MODEL,
};
pub use composer::{MessageComposer, NAME_PLACEHOLDER};
pub use error::{GenerationError, SynthesisError};
pub use extract::{extract_json_object, parse_generated_json};
pub use flight::SingleFlight;
pub use prompt::{message_prompt, rules_prompt, MessageRequest};
pub use retry::RetryPolicy;
pub use synthesizer::{parse_rules_response, RuleSynthesizer, MAX_DESCRIPTION_CHARS};
