//! # SiteChat Core
//!
//! Shared foundation for the SiteChat workspace: configuration, the error
//! taxonomy, chat message types, and the `Embedder`/`Generator` provider
//! traits that the Gemini and Ollama backends implement.

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use error::{Result, SiteChatError};
