//! Expansion that needs nothing but tokens: `macro_rules!` definitions, the built-in macros
//! that are pure functions of their input, and the syntax fixups applied to an item before an
//! attribute macro sees it.
//!
//! ## Declarative macros
//! Matching is done directly on `sinew_api` token trees, except for fragments like `$e:expr`
//! whose extent depends on Rust's grammar: those are lowered to `proc_macro2` and measured with
//! `syn`. Matched fragments are carried through transcription as-is; non-transparent ones are
//! wrapped in invisible groups so they stay a single unit in whatever macro receives them next.
//!
//! Token ids in an expansion say where each token came from, see [`decl::Origin`].

#[macro_use]
extern crate quick_error;

pub mod builtins;
pub mod decl;
pub mod fixup;

pub use builtins::{expand_builtin, BuiltinMacro};
pub use decl::{DeclLimits, DeclMacroExpander, MacroDef};
pub use fixup::{fixup_syntax, FixupOutcome, SyntaxFixups};
