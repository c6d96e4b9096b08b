//! skillbot-skills: Skill discovery, trigger matching and prompt injection.
//!
//! Skills are Markdown files with a frontmatter header that add guidance to
//! the agent's context whenever one of their trigger keywords shows up in a
//! turn.
//!
//! # Skill file format
//!
//! ```markdown
//! ---
//! name: greet
//! description: Friendly greetings
//! triggers: [hello, hi]
//! ---
//!
//! Respond warmly.
//! ```
//!
//! Every file directly under the skills directory is parsed; a direct
//! subdirectory containing `SKILL.md` also counts as one skill.

pub mod frontmatter;
pub mod interceptor;
pub mod loader;
pub mod store;

pub use interceptor::augment;
pub use loader::{LoadError, SkillRecord, SkillSnapshot, load};
pub use store::SkillStore;
