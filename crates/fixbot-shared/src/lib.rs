//! Shared types and pure logic for the Fixbot wizard engine.
//!
//! Everything in this crate is I/O free: the daemon feeds it sessions and
//! reference data, and it answers "which field is next", "is this form
//! submittable" and "what should the chat message look like".

pub mod error;
pub mod field;
pub mod progress;
pub mod render;
pub mod rule;
pub mod schema;
pub mod session;
pub mod ticket;
pub mod token;

pub use error::WizardError;

/// Crate version, single source of truth for the daemon banner.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
