//! Chat turn orchestration: grounding, generation, session persistence.

pub mod events;
pub mod grounding;
pub mod orchestrator;

pub use events::{user_facing_message, StreamEvent};
pub use grounding::{build_system_instruction, DEFAULT_SITE_CONTEXT};
pub use orchestrator::{ChatOrchestrator, ChatReply};
