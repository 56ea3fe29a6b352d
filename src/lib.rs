//! MPD – narrated diagram tours, compiled and played back
//!
//! This crate implements:
//! - A lexer, recursive-descent parser and validator for the MPD language,
//!   producing a span-annotated AST and diagnostics that never throw
//! - A canonical printer that round-trips the AST
//! - Normalization of MPD (or equivalent JSON) into a presentation document
//! - A playback runtime: step controller, action engine and binding engine,
//!   with rendering, camera and overlay supplied by injected collaborators

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

/// MPD compiler front end
pub mod compiler;

/// Presentation runtime
pub mod runtime;

// Re-export key types for convenience
pub use compiler::{Compilation, compile};
pub use runtime::{Controller, ControllerConfig, PlaybackConfig, PresentationDocument};

/// Current version of the crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// MPD language version accepted without a warning
pub const SUPPORTED_MPD_VERSION: &str = "1.0";
