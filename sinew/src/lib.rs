//! The macro expansion pipeline. Given a macro call and what its path resolved to, produce the
//! expansion or say exactly why there isn't one.
//!
//! ```text
//! MacroCall + MacroResolution
//!     -> resolution checks (cfg, unresolved, kind mismatch, ...)
//!     -> memo
//!     -> macro_rules! / built-in / proc macro expander
//! ```
//!
//! Expanders live in `sinew-expand` and `sinew-proc`; this crate only routes and remembers.

#[macro_use]
extern crate quick_error;

pub mod call;
pub mod config;
pub mod engine;
pub mod memo;

pub use call::{DeclMacroData, MacroCall, MacroCallBody, MacroCallKind, MacroResolution, ProcMacroData};
pub use config::{ConfigError, ExpansionConfig};
pub use engine::ExpansionEngine;
pub use sinew_api::errors::GetMacroExpansionError;
