//! Research assistant path: grounding facts, depth-scoped prompts, and the
//! LLM call that answers them.

pub mod assistant;
pub mod composer;
pub mod grounding;

pub use assistant::{AssistantReply, ResearchAssistant};
pub use composer::{ComposedPrompt, ResearchContext, compose, fact_limit};
pub use grounding::GroundingBuilder;
