//! Precache Emit
//!
//! Directive emission for signatures captured by `precache_core`.
//! Renders each signature as a compile directive, keeps one ordered,
//! deduplicated list per artifact and optionally persists it as a manifest.

pub mod directive;
pub mod emitter;
pub mod manifest;

pub use directive::Directive;
pub use emitter::{DirectiveEmitter, EmitStats};
pub use manifest::Manifest;
