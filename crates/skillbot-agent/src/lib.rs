//! skillbot-agent: The skill-augmented reasoning-acting loop.
//!
//! Provides:
//! - The [`ChatModel`] capability the loop drives
//! - [`ReactAgent`], which alternates model calls and tool dispatches until
//!   a final answer, a failure or the step budget
//! - An OpenAI-compatible HTTP model client

pub mod agent;
pub mod error;
pub mod model;
pub mod provider;

pub use agent::{AgentOutcome, ReactAgent};
pub use error::{AgentError, ModelError};
pub use model::{ChatModel, TextStream};
pub use provider::OpenAiCompatModel;
