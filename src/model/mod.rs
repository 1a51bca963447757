//! Domain types and the engine that enforces the voting rules.
//!
//! - [`common`]: identifiers, phases and rejection reasons shared by all layers.
//! - [`db`]: records as held by the store.
//! - [`store`]: the transactional store the engine runs against.
//! - [`engine`]: the voting session engine itself.
//! - [`api`]: request and response bodies.

pub mod api;
pub mod clock;
pub mod common;
pub mod db;
pub mod engine;
pub mod store;
